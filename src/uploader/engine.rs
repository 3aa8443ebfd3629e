// 上传编排器
//
// 单个文件的状态流转：
//   factory -> 解析上传地址 -> 直传（201）
//                          -> 创建分片会话（201）-> 并发上传分片（200 + ETag）
//                             -> 全部成功：合并（200）
//                             -> 任一失败：中止会话（尽力而为）并标记失败
//
// 核心设计：
// - 每次 upload() 只处理等待队列中的一个文件
// - 分片通过有界并发池上传，单个分片失败不重试、不影响其他分片
// - 取消通过令牌逐级传递：会话 -> 文件 -> 单个传输
// - 所有底层传输登记在 TransferRegistry 中，abort() 可一次性中止

use crate::events::{ProgressThrottler, DEFAULT_THROTTLE_INTERVAL_MS};
use crate::uploader::naming::{default_sanitizer, direct_upload_url, multipart_create_url};
use crate::uploader::pool::run_bounded;
use crate::uploader::{
    ActivityCounter, CompleteMultipartRequest, CompletedPart, CreateMultipartRequest,
    CreateMultipartResponse, FactoryOutcome, FileSource, FilenameSanitizer, Header, MultipartUploadSession,
    OptionResolver, PartTask, ProgressAggregator, ProgressFn, TransferGuard, TransferHandle,
    TransferKind, TransferRegistry, TransferRequest, TransferResponse, Transport, UploadError,
    UploadFactory, UploadOverrides, UploadQueue, UploadStep, UploadableFile, UploaderOptions,
    JSON_CONTENT_TYPE,
};
use parking_lot::Mutex;
use reqwest::Method;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 单次 upload() 的结果
#[derive(Debug)]
pub struct UploadReport {
    pub file: UploadableFile,
    pub result: Result<(), UploadError>,
}

impl UploadReport {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// 解析后的单文件请求参数
#[derive(Debug, Clone)]
struct RequestPlan {
    url: String,
    method: Method,
    headers: Vec<Header>,
    max_concurrency: usize,
    multipart_threshold: u64,
}

/// 进度上报：聚合各传输进度，经节流后写入队列
struct ProgressReporter {
    aggregator: ProgressAggregator,
    throttler: ProgressThrottler,
    queue: Arc<UploadQueue>,
    file: UploadableFile,
}

impl ProgressReporter {
    fn new(
        aggregator: ProgressAggregator,
        interval: Duration,
        queue: Arc<UploadQueue>,
        file: UploadableFile,
    ) -> Self {
        Self {
            aggregator,
            throttler: ProgressThrottler::new(interval),
            queue,
            file,
        }
    }

    fn tick(&self, index: usize, loaded: u64) {
        if let Some(total) = self.aggregator.record(index, loaded) {
            let publish = self.throttler.should_emit();
            self.queue.update_progress(&self.file, total, publish);
        }
    }

    /// 某个传输完成，强制发布一次
    fn finish(&self, index: usize) {
        let total = self
            .aggregator
            .complete(index)
            .unwrap_or_else(|| self.aggregator.reported());
        self.queue.update_progress(&self.file, total, false);
        self.throttler.force_emit();
        self.queue.flush_progress(&self.file);
    }

    fn callback(self: &Arc<Self>, index: usize) -> ProgressFn {
        let reporter = Arc::clone(self);
        Arc::new(move |loaded| reporter.tick(index, loaded))
    }
}

/// 分片任务共享的上下文
struct PartContext {
    transport: Arc<dyn Transport>,
    registry: Arc<TransferRegistry>,
    activity: ActivityCounter,
    file: UploadableFile,
    method: Method,
    headers: Vec<Header>,
    token: CancellationToken,
    progress: Arc<ProgressReporter>,
}

/// 多文件分片上传器
pub struct Uploader {
    options: UploaderOptions,
    factory: Option<Arc<dyn UploadFactory>>,
    transport: Arc<dyn Transport>,
    queue: Arc<UploadQueue>,
    registry: Arc<TransferRegistry>,
    /// 活跃异步操作计数
    activity: ActivityCounter,
    /// 尚未返回的 factory 异步结果
    pending_factories: ActivityCounter,
    /// 当前会话的取消令牌，abort() 后替换为新令牌
    session: Mutex<CancellationToken>,
    progress_interval: Duration,
    sanitizer: FilenameSanitizer,
}

impl Uploader {
    /// 创建上传器
    ///
    /// # 参数
    /// * `options` - 全局上传参数
    /// * `transport` - 传输实现
    /// * `queue` - 上传队列
    pub fn new(
        options: UploaderOptions,
        transport: Arc<dyn Transport>,
        queue: Arc<UploadQueue>,
    ) -> Self {
        Self {
            options,
            factory: None,
            transport,
            queue,
            registry: Arc::new(TransferRegistry::new()),
            activity: ActivityCounter::new(),
            pending_factories: ActivityCounter::new(),
            session: Mutex::new(CancellationToken::new()),
            progress_interval: Duration::from_millis(DEFAULT_THROTTLE_INTERVAL_MS),
            sanitizer: default_sanitizer(),
        }
    }

    pub fn with_factory<F>(mut self, factory: F) -> Self
    where
        F: UploadFactory + 'static,
    {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// 进度发布间隔
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn with_sanitizer(mut self, sanitizer: FilenameSanitizer) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    pub fn queue(&self) -> &Arc<UploadQueue> {
        &self.queue
    }

    pub fn enqueue(&self, file: UploadableFile) {
        self.queue.enqueue(file);
    }

    /// 是否有进行中的上传
    pub fn is_uploading(&self) -> bool {
        self.activity.is_active()
    }

    /// 是否在等待 factory 的异步结果
    pub fn is_busy(&self) -> bool {
        self.pending_factories.is_active()
    }

    /// 当前登记中的底层传输数
    pub fn active_transfers(&self) -> usize {
        self.registry.len()
    }

    /// 上传等待队列中的下一个文件
    ///
    /// 界面被禁用或队列为空时直接返回 None
    pub async fn upload(&self) -> Option<UploadReport> {
        let session = self.session.lock().clone();
        self.upload_next(&session).await
    }

    async fn upload_next(&self, session: &CancellationToken) -> Option<UploadReport> {
        if self.queue.is_disabled() {
            debug!("文件列表已禁用，跳过上传");
            return None;
        }

        let file = self.queue.dequeue_next()?;
        let result = self.upload_file(&file, session).await;

        if let Err(e) = &result {
            debug!("文件上传结束: {}, 结果: {}", file.name(), e);
        }

        Some(UploadReport { file, result })
    }

    /// 依次上传调用时已在队列中的文件，每个文件只尝试一次
    ///
    /// 期间调用 abort() 后不再开始新的文件
    pub async fn upload_all(&self) -> Vec<UploadReport> {
        let session = self.session.lock().clone();
        let count = self.queue.queued_len();
        let mut reports = Vec::with_capacity(count);

        for _ in 0..count {
            if session.is_cancelled() {
                warn!("批量上传已中止，剩余 {} 个文件留在队列中", self.queue.queued_len());
                break;
            }
            match self.upload_next(&session).await {
                Some(report) => reports.push(report),
                None => break,
            }
        }

        info!(
            "批量上传结束: 成功 {}/{}",
            reports.iter().filter(|r| r.is_success()).count(),
            reports.len()
        );
        reports
    }

    /// 中止所有进行中的上传
    ///
    /// 已完成的分片不会重新上传；等待中的 factory 结果返回后该文件直接失败
    pub fn abort(&self) {
        let previous = std::mem::replace(&mut *self.session.lock(), CancellationToken::new());
        previous.cancel();
        let aborted = self.registry.abort_all();
        warn!("中止上传: 中止传输 {} 个", aborted);
    }

    async fn upload_file(
        &self,
        file: &UploadableFile,
        session: &CancellationToken,
    ) -> Result<(), UploadError> {
        let _activity = self.activity.enter();

        let token = session.child_token();
        file.attach_cancel(token.clone());

        let overrides = self.run_factory(file, &token).await?;
        let plan = self.resolve_plan(file, &overrides)?;

        if file.size() < plan.multipart_threshold {
            self.upload_direct(file, &plan, &token).await
        } else {
            self.upload_multipart(file, &plan, &token).await
        }
    }

    /// 获取单文件覆盖参数
    async fn run_factory(
        &self,
        file: &UploadableFile,
        token: &CancellationToken,
    ) -> Result<UploadOverrides, UploadError> {
        let Some(factory) = &self.factory else {
            return Ok(UploadOverrides::default());
        };

        match factory.create(file) {
            None => {
                let message = "factory 未返回上传参数";
                error!("{}: {}", message, file.name());
                self.queue.notify_factory_failed(file, message);
                Err(UploadError::Configuration(message.to_string()))
            }
            Some(FactoryOutcome::Immediate(overrides)) => Ok(overrides),
            Some(FactoryOutcome::Deferred(future)) => {
                let settled = {
                    let _pending = self.pending_factories.enter();
                    debug!("等待 factory 异步结果: {}", file.name());
                    future.await
                };

                match settled {
                    Ok(_) if token.is_cancelled() => {
                        warn!("factory 返回前上传已被中止: {}", file.name());
                        self.queue.mark_factory_failed(file, "上传已取消");
                        Err(UploadError::Cancelled)
                    }
                    Ok(overrides) => Ok(overrides),
                    Err(e) => {
                        let message = format!("{:#}", e);
                        error!("factory 执行失败: {}, 错误: {}", file.name(), message);
                        self.queue.mark_factory_failed(file, &message);
                        Err(UploadError::Factory(message))
                    }
                }
            }
        }
    }

    /// 解析请求参数，缺少上传地址时不做任何网络请求
    fn resolve_plan(
        &self,
        file: &UploadableFile,
        overrides: &UploadOverrides,
    ) -> Result<RequestPlan, UploadError> {
        let resolver = OptionResolver::new(&self.options, overrides);

        let Some(url) = resolver.url(file) else {
            warn!("未配置上传地址，跳过: {}", file.name());
            return Err(UploadError::Configuration(format!(
                "未配置上传地址: {}",
                file.name()
            )));
        };

        let method_name = resolver.method(file);
        let method = Method::from_bytes(method_name.trim().to_ascii_uppercase().as_bytes())
            .map_err(|_| UploadError::Configuration(format!("非法 HTTP 方法: {}", method_name)))?;

        debug!(
            "上传参数: file={}, url={}, method={}, batch={}",
            file.name(),
            url,
            method,
            resolver.batch(file)
        );

        Ok(RequestPlan {
            url,
            method,
            headers: resolver.headers(file),
            max_concurrency: resolver.max_concurrency(file),
            multipart_threshold: resolver.multipart_threshold(file),
        })
    }

    /// 整文件直传
    async fn upload_direct(
        &self,
        file: &UploadableFile,
        plan: &RequestPlan,
        token: &CancellationToken,
    ) -> Result<(), UploadError> {
        let target = direct_upload_url(&plan.url, &(self.sanitizer)(file.name()));
        info!("[直传] {} -> {}", file.name(), target);

        let guard = self.registry.register(TransferKind::Direct, token);
        let handle = guard.handle().clone();
        self.queue.mark_uploading(file, &handle);

        let reporter = Arc::new(ProgressReporter::new(
            ProgressAggregator::direct(file.size()),
            self.progress_interval,
            self.queue.clone(),
            file.clone(),
        ));

        let result = self
            .send_direct(file, plan, target, &guard, reporter.callback(0))
            .await;
        drop(guard);

        match result {
            Ok(_) => {
                self.queue.mark_uploaded(file, Some(handle));
                Ok(())
            }
            Err(e) => {
                error!("[直传] 上传失败: {}, 错误: {}", file.name(), e);
                self.queue.mark_failed(file, Some(handle));
                Err(e)
            }
        }
    }

    /// 分片上传
    async fn upload_multipart(
        &self,
        file: &UploadableFile,
        plan: &RequestPlan,
        token: &CancellationToken,
    ) -> Result<(), UploadError> {
        let session = self.create_multipart(file, plan, token).await?;

        let tasks = match session.plan_parts(file.size()) {
            Ok(tasks) => tasks,
            Err(e) => return self.abort_and_fail(file, &session, e).await,
        };

        match self.upload_parts(file, plan, tasks, token).await {
            Ok(parts) => self.complete_multipart(file, &session, parts, token).await,
            Err(e) => self.abort_and_fail(file, &session, e).await,
        }
    }

    /// 创建分片上传会话
    async fn create_multipart(
        &self,
        file: &UploadableFile,
        plan: &RequestPlan,
        token: &CancellationToken,
    ) -> Result<MultipartUploadSession, UploadError> {
        let url = multipart_create_url(&plan.url);
        info!("[分片上传] 创建会话: {} -> {}", file.name(), url);

        let guard = self.registry.register(TransferKind::CreateMultipart, token);
        let handle = guard.handle().clone();
        self.queue.mark_uploading(file, &handle);

        let body = CreateMultipartRequest {
            key: (self.sanitizer)(file.name()),
            size: file.size(),
            multipart_content_type: file.content_type().to_string(),
        };

        let result = self.send_create(plan, url, &body, &guard).await;
        drop(guard);

        match result {
            Ok((raw, session)) => {
                info!(
                    "[分片上传] 会话已创建: {}, 分片数: {}, 分片大小: {}",
                    file.name(),
                    session.num_chunks,
                    session.chunk_size
                );
                self.queue.notify_multipart_created(file, &handle, raw);
                Ok(session)
            }
            Err(e) => {
                error!("[分片上传] 创建会话失败: {}, 错误: {}", file.name(), e);
                self.queue.mark_failed(file, Some(handle));
                Err(e)
            }
        }
    }

    /// 并发上传所有分片，全部成功时返回已上传分片列表
    async fn upload_parts(
        &self,
        file: &UploadableFile,
        plan: &RequestPlan,
        tasks: Vec<PartTask>,
        token: &CancellationToken,
    ) -> Result<Vec<CompletedPart>, UploadError> {
        let total = tasks.len();
        info!(
            "[并发上传] 开始上传 {} 个分片，并发数: {}",
            total, plan.max_concurrency
        );

        let progress = Arc::new(ProgressReporter::new(
            ProgressAggregator::for_parts(file.size(), &tasks),
            self.progress_interval,
            self.queue.clone(),
            file.clone(),
        ));
        let ctx = Arc::new(PartContext {
            transport: self.transport.clone(),
            registry: self.registry.clone(),
            activity: self.activity.clone(),
            file: file.clone(),
            method: plan.method.clone(),
            headers: plan.headers.clone(),
            token: token.clone(),
            progress,
        });

        let output = run_bounded(tasks, plan.max_concurrency, token, |task| {
            upload_part(ctx.clone(), task)
        })
        .await
        .map_err(|e| {
            error!("[并发上传] 并发池异常: {:#}", e);
            UploadError::Aggregate {
                failed: total,
                total,
            }
        })?;

        if token.is_cancelled() {
            warn!("[并发上传] 上传已取消: {}", file.name());
            return Err(UploadError::Cancelled);
        }

        let succeeded = output.succeeded();
        if succeeded != total {
            error!(
                "[并发上传] {} 个分片上传失败: {}",
                total - succeeded,
                file.name()
            );
            return Err(UploadError::Aggregate {
                failed: total - succeeded,
                total,
            });
        }

        info!("[并发上传] 所有 {} 个分片上传完成", total);
        Ok(output.into_successes())
    }

    /// 合并分片
    async fn complete_multipart(
        &self,
        file: &UploadableFile,
        session: &MultipartUploadSession,
        parts: Vec<CompletedPart>,
        token: &CancellationToken,
    ) -> Result<(), UploadError> {
        let _activity = self.activity.enter();
        info!("[分片上传] 合并分片: {}, 分片数: {}", file.name(), parts.len());

        let guard = self.registry.register(TransferKind::Complete, token);
        let result = self
            .send_complete(session, CompleteMultipartRequest::new(parts), &guard)
            .await;
        drop(guard);

        match result {
            Ok(_) => {
                self.queue.mark_uploaded(file, None);
                Ok(())
            }
            Err(e) => {
                error!("[分片上传] 合并失败: {}, 错误: {}", file.name(), e);
                self.queue.mark_failed(file, None);
                Err(e)
            }
        }
    }

    async fn send_direct(
        &self,
        file: &UploadableFile,
        plan: &RequestPlan,
        target: String,
        guard: &TransferGuard,
        progress: ProgressFn,
    ) -> Result<TransferResponse, UploadError> {
        let request =
            TransferRequest::new(plan.method.clone(), target).headers(plan.headers.clone());
        // 磁盘文件由传输层流式读取
        let request = match file.source() {
            FileSource::Disk(path) => request.file(path.clone(), file.size()),
            FileSource::Memory(_) => {
                request.bytes(file.read_all().await.map_err(UploadError::Io)?)
            }
        };
        let response = exchange(
            &self.transport,
            guard,
            UploadStep::Direct,
            request,
            Some(progress),
        )
        .await?;
        expect_status(response, 201, UploadStep::Direct)
    }

    async fn send_create(
        &self,
        plan: &RequestPlan,
        url: String,
        body: &CreateMultipartRequest,
        guard: &TransferGuard,
    ) -> Result<(serde_json::Value, MultipartUploadSession), UploadError> {
        let step = UploadStep::CreateMultipart;
        let body = to_json(body, step)?;
        let request = TransferRequest::new(Method::POST, url)
            .header("Content-Type", JSON_CONTENT_TYPE)
            .headers(plan.headers.clone())
            .json(body);
        let response = exchange(&self.transport, guard, step, request, None).await?;
        let response = expect_status(response, 201, step)?;
        parse_session(&response)
    }

    /// 合并请求只带 JSON 内容类型，不带自定义请求头
    async fn send_complete(
        &self,
        session: &MultipartUploadSession,
        body: CompleteMultipartRequest,
        guard: &TransferGuard,
    ) -> Result<TransferResponse, UploadError> {
        let step = UploadStep::Complete;
        let request = TransferRequest::new(Method::POST, session.complete_url.clone())
            .header("Content-Type", JSON_CONTENT_TYPE)
            .json(to_json(&body, step)?);
        let response = exchange(&self.transport, guard, step, request, None).await?;
        expect_status(response, 200, step)
    }

    /// 中止分片上传会话并标记文件失败
    ///
    /// 中止请求不受当前会话取消的影响，失败只记录日志
    async fn abort_and_fail(
        &self,
        file: &UploadableFile,
        session: &MultipartUploadSession,
        cause: UploadError,
    ) -> Result<(), UploadError> {
        let _activity = self.activity.enter();
        warn!("[分片上传] 中止会话: {}, 原因: {}", file.name(), cause);

        let guard = self
            .registry
            .register(TransferKind::Abort, &CancellationToken::new());
        let request = TransferRequest::new(Method::POST, session.abort_url.clone());
        let result = exchange(&self.transport, &guard, UploadStep::Abort, request, None)
            .await
            .and_then(|response| expect_status(response, 200, UploadStep::Abort));
        drop(guard);

        match result {
            Ok(_) => info!("[分片上传] 会话已中止: {}", file.name()),
            Err(e) => warn!("[分片上传] 中止会话失败（忽略）: {}, 错误: {}", file.name(), e),
        }

        self.queue.mark_failed(file, None);
        Err(cause)
    }
}

/// 发送一次请求，传输被中止时返回 `Cancelled`
async fn exchange(
    transport: &Arc<dyn Transport>,
    guard: &TransferGuard,
    step: UploadStep,
    request: TransferRequest,
    progress: Option<ProgressFn>,
) -> Result<TransferResponse, UploadError> {
    let handle: &TransferHandle = guard.handle();
    if handle.is_aborted() {
        return Err(UploadError::Cancelled);
    }

    tokio::select! {
        biased;
        _ = handle.aborted() => {
            debug!("传输已中止: {}", step);
            Err(UploadError::Cancelled)
        }
        result = transport.send(request, progress) => {
            result.map_err(|source| UploadError::Transport { step, source })
        }
    }
}

fn expect_status(
    response: TransferResponse,
    expected: u16,
    step: UploadStep,
) -> Result<TransferResponse, UploadError> {
    if response.status == expected {
        Ok(response)
    } else {
        Err(UploadError::UnexpectedStatus {
            step,
            status: response.status,
        })
    }
}

fn to_json<T: serde::Serialize>(body: &T, step: UploadStep) -> Result<serde_json::Value, UploadError> {
    serde_json::to_value(body).map_err(|e| UploadError::InvalidResponse {
        step,
        reason: format!("序列化请求体失败: {}", e),
    })
}

/// 解析创建会话的响应，同时保留原始 JSON 供事件使用
fn parse_session(
    response: &TransferResponse,
) -> Result<(serde_json::Value, MultipartUploadSession), UploadError> {
    let invalid = |reason: String| UploadError::InvalidResponse {
        step: UploadStep::CreateMultipart,
        reason,
    };

    let raw: serde_json::Value = response.json().map_err(|e| invalid(format!("{:#}", e)))?;
    let parsed: CreateMultipartResponse =
        serde_json::from_value(raw.clone()).map_err(|e| invalid(e.to_string()))?;

    Ok((raw, parsed.multipart_upload))
}

/// 上传单个分片，失败时返回 None
async fn upload_part(ctx: Arc<PartContext>, task: PartTask) -> Option<CompletedPart> {
    let _activity = ctx.activity.enter();
    let guard = ctx
        .registry
        .register(TransferKind::Part(task.part_id), &ctx.token);

    debug!(
        "[并发上传] 上传分片#{}: bytes={}..{}",
        task.part_id, task.range.start, task.range.end
    );

    match send_part(&ctx, &task, &guard).await {
        Ok(part) => {
            debug!("[并发上传] 分片#{} 上传成功, ETag={}", task.part_id, part.etag);
            ctx.progress.finish(task.index());
            Some(part)
        }
        Err(e) => {
            error!("[并发上传] 分片#{} 上传失败: {}", task.part_id, e);
            None
        }
    }
}

async fn send_part(
    ctx: &PartContext,
    task: &PartTask,
    guard: &TransferGuard,
) -> Result<CompletedPart, UploadError> {
    let step = UploadStep::UploadPart(task.part_id);

    let data = ctx
        .file
        .read_range(task.range.clone())
        .await
        .map_err(UploadError::Io)?;
    let request = TransferRequest::new(ctx.method.clone(), task.part_url.clone())
        .headers(ctx.headers.clone())
        .bytes(data);

    let response = exchange(
        &ctx.transport,
        guard,
        step,
        request,
        Some(ctx.progress.callback(task.index())),
    )
    .await?;
    let response = expect_status(response, 200, step)?;

    let etag = response
        .header("ETag")
        .filter(|etag| !etag.is_empty())
        .ok_or_else(|| UploadError::InvalidResponse {
            step,
            reason: "响应缺少 ETag".to_string(),
        })?;

    Ok(CompletedPart {
        etag: etag.to_string(),
        part_number: task.part_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::UploadEvent;
    use crate::uploader::testing::{session_body, MockReply, MockTransport};
    use crate::uploader::{FileListSurface, FileStatus, TransferBody};
    use std::sync::atomic::{AtomicBool, Ordering};

    const BASE: &str = "https://repo.example.org/api/files";
    const S3: &str = "https://s3.example.org/bucket";

    struct Harness {
        uploader: Arc<Uploader>,
        transport: Arc<MockTransport>,
        events: Arc<Mutex<Vec<UploadEvent>>>,
    }

    impl Harness {
        fn event_names(&self) -> Vec<&'static str> {
            self.events
                .lock()
                .iter()
                .map(|e| e.event_type_name())
                .collect()
        }

        fn progress_values(&self) -> Vec<u64> {
            self.events
                .lock()
                .iter()
                .filter_map(|e| match e {
                    UploadEvent::Progress { file } => Some(file.uploaded_size),
                    _ => None,
                })
                .collect()
        }
    }

    fn options() -> UploaderOptions {
        UploaderOptions::default()
            .with_url(BASE)
            .with_multipart_threshold(100)
    }

    fn harness_with(
        options: UploaderOptions,
        transport: Arc<MockTransport>,
        configure: impl FnOnce(Uploader) -> Uploader,
    ) -> Harness {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let events = events.clone();
            move |event: UploadEvent| events.lock().push(event)
        };
        let queue = Arc::new(UploadQueue::with_events(Arc::new(sink)));
        let uploader = Uploader::new(options, transport.clone(), queue)
            .with_progress_interval(Duration::ZERO);
        Harness {
            uploader: Arc::new(configure(uploader)),
            transport,
            events,
        }
    }

    fn harness(transport: Arc<MockTransport>) -> Harness {
        harness_with(options(), transport, |u| u)
    }

    fn file(name: &str, size: usize) -> UploadableFile {
        UploadableFile::from_bytes(name, None, (0..size).map(|i| i as u8).collect::<Vec<_>>())
    }

    fn part_number(url: &str) -> Option<u32> {
        url.rsplit_once("/part/").and_then(|(_, n)| n.parse().ok())
    }

    /// 600 字节、6 个分片的标准服务端
    fn multipart_server<F>(part_reply: F) -> Arc<MockTransport>
    where
        F: Fn(u32) -> MockReply + Send + Sync + 'static,
    {
        MockTransport::new(move |request| {
            if request.url.ends_with("?multipart=true") {
                MockReply::status(201).json(session_body(S3, 100, 6))
            } else if let Some(n) = part_number(&request.url) {
                part_reply(n)
            } else if request.url.ends_with("/complete") || request.url.ends_with("/abort") {
                MockReply::status(200)
            } else {
                MockReply::status(404)
            }
        })
    }

    fn ok_part(n: u32) -> MockReply {
        MockReply::status(200).header("ETag", &format!("\"etag-{}\"", n))
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    #[tokio::test]
    async fn test_direct_upload_created() {
        let transport = MockTransport::new(|_| MockReply::status(201));
        let h = harness(transport);
        let f = file("my report.txt", 50);
        h.uploader.enqueue(f.clone());

        let report = h.uploader.upload().await.unwrap();

        assert!(report.is_success());
        assert_eq!(f.status(), FileStatus::Uploaded);
        assert_eq!(f.uploaded_size(), 50);

        let requests = h.transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::PUT);
        assert_eq!(requests[0].url, format!("{}/my-report.txt", BASE));
        assert!(h.transport.requests_to("multipart=true").is_empty());

        let names = h.event_names();
        assert_eq!(names.first(), Some(&"uploading"));
        assert_eq!(names.last(), Some(&"uploaded"));
        assert!(!h.uploader.is_uploading());
        assert_eq!(h.uploader.active_transfers(), 0);
        assert_eq!(h.uploader.queue().uploaded().len(), 1);
    }

    #[tokio::test]
    async fn test_direct_upload_failure_requeues_without_retry() {
        let transport = MockTransport::new(|_| MockReply::status(413));
        let h = harness(transport);
        let f = file("a.bin", 10);
        h.uploader.enqueue(f.clone());

        let report = h.uploader.upload().await.unwrap();

        assert!(matches!(
            report.result,
            Err(UploadError::UnexpectedStatus {
                step: UploadStep::Direct,
                status: 413
            })
        ));
        assert_eq!(h.transport.requests().len(), 1);
        assert_eq!(f.status(), FileStatus::Failed);
        assert_eq!(h.uploader.queue().queued(), vec![f]);
        assert_eq!(h.event_names().last(), Some(&"failed"));
    }

    #[tokio::test]
    async fn test_failed_file_appears_once_in_queue() {
        let transport = MockTransport::new(|_| MockReply::network_error("connection reset"));
        let h = harness(transport);
        let f = file("a.bin", 10);
        h.uploader.enqueue(f.clone());

        let first = h.uploader.upload().await.unwrap();
        assert!(matches!(first.result, Err(UploadError::Transport { .. })));
        let second = h.uploader.upload().await.unwrap();
        assert!(second.result.is_err());

        assert_eq!(h.uploader.queue().queued_len(), 1);
        assert_eq!(h.transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_multipart_all_parts_succeed() {
        let transport = multipart_server(|n| ok_part(n).delay_ms(10));
        let h = harness(transport);
        let f = UploadableFile::from_bytes("big video.mp4", Some("video/mp4".into()), vec![7u8; 600]);
        h.uploader.enqueue(f.clone());

        let report = h.uploader.upload().await.unwrap();
        assert!(report.is_success(), "{:?}", report.result);
        assert_eq!(f.status(), FileStatus::Uploaded);

        let create = h.transport.requests_to("multipart=true");
        assert_eq!(create.len(), 1);
        assert_eq!(create[0].method, Method::POST);
        assert_eq!(create[0].url, format!("{}?multipart=true", BASE));
        match &create[0].body {
            TransferBody::Json(body) => {
                assert_eq!(body["key"], "big-video.mp4");
                assert_eq!(body["size"], 600);
                assert_eq!(body["multipart_content_type"], "video/mp4");
            }
            other => panic!("unexpected body: {:?}", other),
        }

        let parts = h.transport.requests_to("/part/");
        assert_eq!(parts.len(), 6);
        assert!(parts.iter().all(|r| r.method == Method::PUT && r.body.len() == 100));
        assert!(h.transport.peak_in_flight() <= 5);

        let complete = h.transport.requests_to("/complete");
        assert_eq!(complete.len(), 1);
        assert!(h.transport.requests_to("/abort").is_empty());

        let names = h.event_names();
        assert!(names.contains(&"multipart-created"));
        assert_eq!(names.last(), Some(&"uploaded"));
        assert_eq!(h.uploader.active_transfers(), 0);
    }

    #[tokio::test]
    async fn test_concurrency_limit_respected() {
        let transport = multipart_server(|n| ok_part(n).delay_ms(15));
        let h = harness_with(options().with_max_concurrency(2), transport, |u| u);
        h.uploader.enqueue(file("a.bin", 600));

        let report = h.uploader.upload().await.unwrap();
        assert!(report.is_success());
        assert!(h.transport.peak_in_flight() <= 2);
        assert_eq!(h.transport.requests_to("/part/").len(), 6);
    }

    #[tokio::test]
    async fn test_out_of_order_completion_sorted_on_complete() {
        // 分片号越小完成越晚
        let transport = multipart_server(|n| ok_part(n).delay_ms(5 * (7 - n as u64)));
        let h = harness_with(options().with_max_concurrency(6), transport, |u| u);
        h.uploader.enqueue(file("a.bin", 600));

        assert!(h.uploader.upload().await.unwrap().is_success());

        let complete = h.transport.requests_to("/complete");
        let TransferBody::Json(body) = &complete[0].body else {
            panic!("complete body is not json");
        };
        let numbers: Vec<u64> = body["parts"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["PartNumber"].as_u64().unwrap())
            .collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(body["parts"][0]["ETag"], "\"etag-1\"");
    }

    #[tokio::test]
    async fn test_failing_parts_abort_without_complete() {
        let transport = multipart_server(|n| {
            if n == 2 || n == 5 {
                MockReply::status(500)
            } else {
                ok_part(n)
            }
        });
        let h = harness(transport);
        let f = file("a.bin", 600);
        h.uploader.enqueue(f.clone());

        let report = h.uploader.upload().await.unwrap();

        assert!(matches!(
            report.result,
            Err(UploadError::Aggregate { failed: 2, total: 6 })
        ));
        // 每个分片只尝试一次
        assert_eq!(h.transport.requests_to("/part/").len(), 6);
        assert!(h.transport.requests_to("/complete").is_empty());
        let aborts = h.transport.requests_to("/abort");
        assert_eq!(aborts.len(), 1);
        assert_eq!(aborts[0].method, Method::POST);
        assert_eq!(aborts[0].url, format!("{}/abort", S3));

        assert_eq!(f.status(), FileStatus::Failed);
        assert_eq!(h.uploader.queue().queued_len(), 1);
        assert!(h.uploader.queue().uploaded().is_empty());
    }

    #[tokio::test]
    async fn test_part_four_server_error_end_to_end() {
        let transport = multipart_server(|n| {
            if n == 4 {
                MockReply::status(500)
            } else {
                ok_part(n)
            }
        });
        let h = harness(transport);
        let f = file("a.bin", 600);
        h.uploader.enqueue(f.clone());

        let report = h.uploader.upload().await.unwrap();
        assert!(report.result.is_err());
        assert_eq!(h.transport.requests_to("/abort").len(), 1);
        assert_eq!(f.status(), FileStatus::Failed);
        assert_eq!(h.uploader.queue().queued(), vec![f]);
        assert_eq!(h.event_names().last(), Some(&"failed"));
    }

    #[tokio::test]
    async fn test_part_without_etag_is_failure() {
        let transport = multipart_server(|n| {
            if n == 3 {
                MockReply::status(200)
            } else {
                ok_part(n)
            }
        });
        let h = harness(transport);
        h.uploader.enqueue(file("a.bin", 600));

        let report = h.uploader.upload().await.unwrap();
        assert!(matches!(
            report.result,
            Err(UploadError::Aggregate { failed: 1, total: 6 })
        ));
        assert_eq!(h.transport.requests_to("/abort").len(), 1);
    }

    #[tokio::test]
    async fn test_abort_failure_is_only_logged() {
        let transport = MockTransport::new(|request| {
            if request.url.ends_with("?multipart=true") {
                MockReply::status(201).json(session_body(S3, 100, 6))
            } else if request.url.ends_with("/abort") {
                MockReply::network_error("abort unreachable")
            } else {
                MockReply::status(500)
            }
        });
        let h = harness(transport);
        let f = file("a.bin", 600);
        h.uploader.enqueue(f.clone());

        let report = h.uploader.upload().await.unwrap();
        assert!(matches!(report.result, Err(UploadError::Aggregate { .. })));
        assert_eq!(f.status(), FileStatus::Failed);
        assert_eq!(h.uploader.queue().queued_len(), 1);
    }

    #[tokio::test]
    async fn test_create_failure_marks_failed_without_parts() {
        let transport = MockTransport::new(|_| MockReply::status(403));
        let h = harness(transport);
        let f = file("a.bin", 600);
        h.uploader.enqueue(f.clone());

        let report = h.uploader.upload().await.unwrap();
        assert!(matches!(
            report.result,
            Err(UploadError::UnexpectedStatus {
                step: UploadStep::CreateMultipart,
                status: 403
            })
        ));
        assert_eq!(h.transport.requests().len(), 1);
        assert_eq!(f.status(), FileStatus::Failed);
        assert_eq!(h.uploader.queue().queued_len(), 1);
    }

    #[tokio::test]
    async fn test_inconsistent_session_is_aborted() {
        let transport = MockTransport::new(|request| {
            if request.url.ends_with("?multipart=true") {
                // 600 字节按 100 字节分片应为 6 片
                MockReply::status(201).json(session_body(S3, 100, 4))
            } else {
                MockReply::status(200)
            }
        });
        let h = harness(transport);
        let f = file("a.bin", 600);
        h.uploader.enqueue(f.clone());

        let report = h.uploader.upload().await.unwrap();
        assert!(matches!(
            report.result,
            Err(UploadError::InvalidResponse { .. })
        ));
        assert!(h.transport.requests_to("/part/").is_empty());
        assert_eq!(h.transport.requests_to("/abort").len(), 1);
        assert_eq!(f.status(), FileStatus::Failed);
    }

    #[tokio::test]
    async fn test_complete_failure_marks_failed() {
        let transport = MockTransport::new(|request| {
            if request.url.ends_with("?multipart=true") {
                MockReply::status(201).json(session_body(S3, 100, 6))
            } else if let Some(n) = part_number(&request.url) {
                ok_part(n)
            } else {
                MockReply::status(500)
            }
        });
        let h = harness(transport);
        let f = file("a.bin", 600);
        h.uploader.enqueue(f.clone());

        let report = h.uploader.upload().await.unwrap();
        assert!(matches!(
            report.result,
            Err(UploadError::UnexpectedStatus {
                step: UploadStep::Complete,
                ..
            })
        ));
        assert!(h.transport.requests_to("/abort").is_empty());
        assert_eq!(f.status(), FileStatus::Failed);
    }

    #[tokio::test]
    async fn test_progress_monotonic_and_bounded() {
        let transport = multipart_server(|n| ok_part(n).delay_ms(3));
        let h = harness(transport);
        h.uploader.enqueue(file("a.bin", 600));

        assert!(h.uploader.upload().await.unwrap().is_success());

        let values = h.progress_values();
        assert!(!values.is_empty());
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        assert!(values.iter().all(|v| *v <= 600));
        assert_eq!(values.last(), Some(&600));
    }

    #[tokio::test]
    async fn test_headers_and_method_overrides() {
        let transport = multipart_server(ok_part);
        let factory = |_: &UploadableFile| {
            Some(FactoryOutcome::immediate(
                UploadOverrides::new()
                    .method("post".to_string())
                    .headers(vec![Header::new("Authorization", "Bearer t")]),
            ))
        };
        let h = harness_with(options(), transport, |u| u.with_factory(factory));
        h.uploader.enqueue(file("a.bin", 600));

        assert!(h.uploader.upload().await.unwrap().is_success());

        let has_auth = |r: &TransferRequest| {
            r.headers
                .iter()
                .any(|header| header.name == "Authorization")
        };
        let create = &h.transport.requests_to("multipart=true")[0];
        assert!(has_auth(create));
        assert!(create.headers.iter().any(|h| h.name == "Content-Type"));

        let parts = h.transport.requests_to("/part/");
        assert!(parts.iter().all(|r| r.method == Method::POST && has_auth(r)));

        let complete = &h.transport.requests_to("/complete")[0];
        assert!(!has_auth(complete));
    }

    #[tokio::test]
    async fn test_missing_url_is_configuration_error() {
        let transport = MockTransport::new(|_| MockReply::status(201));
        let h = harness_with(UploaderOptions::default(), transport, |u| u);
        let f = file("a.bin", 10);
        h.uploader.enqueue(f.clone());

        let report = h.uploader.upload().await.unwrap();
        assert!(matches!(report.result, Err(UploadError::Configuration(_))));
        assert!(h.transport.requests().is_empty());
        assert_eq!(f.status(), FileStatus::Queued);
        assert!(!h.uploader.is_uploading());
    }

    #[tokio::test]
    async fn test_factory_returning_nothing() {
        let transport = MockTransport::new(|_| MockReply::status(201));
        let h = harness_with(options(), transport, |u| {
            u.with_factory(|_: &UploadableFile| -> Option<FactoryOutcome> { None })
        });
        h.uploader.enqueue(file("a.bin", 10));

        let report = h.uploader.upload().await.unwrap();
        assert!(matches!(report.result, Err(UploadError::Configuration(_))));
        assert!(h.transport.requests().is_empty());
        assert_eq!(h.event_names(), vec!["factory-failed"]);
        assert!(!h.uploader.is_uploading());
    }

    #[tokio::test]
    async fn test_deferred_factory_rejection_requeues() {
        let transport = MockTransport::new(|_| MockReply::status(201));
        let h = harness_with(options(), transport, |u| {
            u.with_factory(|_: &UploadableFile| {
                Some(FactoryOutcome::deferred(async {
                    Err::<UploadOverrides, _>(anyhow::anyhow!("token expired"))
                }))
            })
        });
        let f = file("a.bin", 10);
        h.uploader.enqueue(f.clone());

        let report = h.uploader.upload().await.unwrap();
        assert!(matches!(report.result, Err(UploadError::Factory(_))));
        assert_eq!(f.status(), FileStatus::Failed);
        assert_eq!(h.uploader.queue().queued_len(), 1);
        assert!(h.transport.requests().is_empty());
        assert!(!h.uploader.is_busy());
    }

    #[tokio::test]
    async fn test_deferred_factory_success() {
        let transport = MockTransport::new(|_| MockReply::status(201));
        let h = harness_with(UploaderOptions::default(), transport, |u| {
            u.with_factory(|_: &UploadableFile| {
                Some(FactoryOutcome::deferred(async {
                    Ok::<_, anyhow::Error>(
                        UploadOverrides::new().url(Some("https://late.example.org/up".to_string())),
                    )
                }))
            })
        });
        h.uploader.enqueue(file("a.bin", 10));

        assert!(h.uploader.upload().await.unwrap().is_success());
        assert_eq!(
            h.transport.requests()[0].url,
            "https://late.example.org/up/a.bin"
        );
    }

    #[tokio::test]
    async fn test_abort_during_pending_factory() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let rx = Arc::new(Mutex::new(Some(rx)));

        let transport = MockTransport::new(|_| MockReply::status(201));
        let h = harness_with(options(), transport, move |u| {
            u.with_factory(move |_: &UploadableFile| {
                let rx = rx.lock().take()?;
                Some(FactoryOutcome::deferred(async move {
                    rx.await?;
                    Ok::<_, anyhow::Error>(UploadOverrides::new())
                }))
            })
        });
        let f = file("a.bin", 10);
        h.uploader.enqueue(f.clone());

        let uploader = h.uploader.clone();
        let task = tokio::spawn(async move { uploader.upload().await });

        let probe = h.uploader.clone();
        wait_until(move || probe.is_busy()).await;
        assert!(h.uploader.is_uploading());

        h.uploader.abort();
        tx.send(()).unwrap();

        let report = task.await.unwrap().unwrap();
        assert!(matches!(report.result, Err(UploadError::Cancelled)));
        assert_eq!(f.status(), FileStatus::Failed);
        assert!(h.transport.requests().is_empty());
        assert_eq!(h.uploader.queue().queued_len(), 1);
        assert!(h.event_names().contains(&"factory-failed"));
        assert!(!h.uploader.is_busy());
        assert!(!h.uploader.is_uploading());
    }

    #[tokio::test]
    async fn test_abort_stops_parts_and_aborts_session() {
        let transport = multipart_server(|n| {
            if n <= 2 {
                ok_part(n)
            } else {
                MockReply::hang()
            }
        });
        let h = harness_with(options().with_max_concurrency(2), transport, |u| u);
        let f = file("a.bin", 600);
        h.uploader.enqueue(f.clone());

        let uploader = h.uploader.clone();
        let task = tokio::spawn(async move { uploader.upload().await });

        let probe = h.transport.clone();
        wait_until(move || probe.requests_to("/part/").len() >= 4).await;
        assert!(h.uploader.is_uploading());
        assert!(h.uploader.active_transfers() >= 1);

        h.uploader.abort();

        let report = task.await.unwrap().unwrap();
        assert!(matches!(report.result, Err(UploadError::Cancelled)));
        // 取消后不再调度新分片
        assert!(h.transport.requests_to("/part/").len() < 6);
        assert!(h.transport.requests_to("/complete").is_empty());
        assert_eq!(h.transport.requests_to("/abort").len(), 1);
        assert_eq!(f.status(), FileStatus::Failed);
        assert_eq!(h.uploader.active_transfers(), 0);
        assert_eq!(h.transport.in_flight(), 0);
        assert!(!h.uploader.is_uploading());
    }

    #[tokio::test]
    async fn test_file_abort_cancels_only_that_file() {
        let transport = MockTransport::new(|_| MockReply::hang());
        let h = harness(transport);
        let f = file("a.bin", 10);
        h.uploader.enqueue(f.clone());

        let uploader = h.uploader.clone();
        let task = tokio::spawn(async move { uploader.upload().await });

        let probe = h.uploader.clone();
        wait_until(move || probe.active_transfers() == 1).await;
        f.abort();

        let report = task.await.unwrap().unwrap();
        assert!(matches!(report.result, Err(UploadError::Cancelled)));
        assert_eq!(f.status(), FileStatus::Failed);

        // 会话未被取消，后续上传仍可进行
        assert_eq!(h.uploader.queue().dequeue_next(), Some(f));
        let next = file("b.bin", 10);
        h.uploader.enqueue(next.clone());
        let uploader = h.uploader.clone();
        let task = tokio::spawn(async move { uploader.upload().await });
        let probe = h.uploader.clone();
        wait_until(move || probe.active_transfers() == 1).await;
        assert!(!next.cancel_token().is_cancelled());
        next.abort();
        let report = task.await.unwrap().unwrap();
        assert_eq!(report.file, next);
        assert!(matches!(report.result, Err(UploadError::Cancelled)));
    }

    #[tokio::test]
    async fn test_upload_skipped_when_surface_disabled() {
        struct Disabled(AtomicBool);
        impl FileListSurface for Disabled {
            fn is_disabled(&self) -> bool {
                self.0.load(Ordering::SeqCst)
            }
        }

        let surface = Arc::new(Disabled(AtomicBool::new(true)));
        let queue = Arc::new(UploadQueue::new(
            surface.clone(),
            Arc::new(crate::events::NoopEventSink),
        ));
        let transport = MockTransport::new(|_| MockReply::status(201));
        let uploader = Uploader::new(options(), transport.clone(), queue);
        uploader.enqueue(file("a.bin", 10));

        assert!(uploader.upload().await.is_none());
        assert_eq!(uploader.queue().queued_len(), 1);

        surface.0.store(false, Ordering::SeqCst);
        assert!(uploader.upload().await.unwrap().is_success());
        // 队列为空
        assert!(uploader.upload().await.is_none());
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_upload_all_tries_each_file_once() {
        let transport = MockTransport::new(|request| {
            if request.url.ends_with("bad.bin") {
                MockReply::status(500)
            } else {
                MockReply::status(201)
            }
        });
        let h = harness(transport);
        h.uploader.enqueue(file("a.bin", 10));
        h.uploader.enqueue(file("bad.bin", 10));
        h.uploader.enqueue(file("c.bin", 10));

        let reports = h.uploader.upload_all().await;
        assert_eq!(reports.len(), 3);
        assert_eq!(reports.iter().filter(|r| r.is_success()).count(), 2);
        // 失败的文件重新排队，但不会在本轮再次尝试
        assert_eq!(h.transport.requests().len(), 3);
        assert_eq!(h.uploader.queue().queued_len(), 1);
    }

    #[tokio::test]
    async fn test_abort_stops_batch_upload() {
        let transport = MockTransport::new(|request| {
            if request.url.ends_with("first.bin") {
                MockReply::hang()
            } else {
                MockReply::status(201)
            }
        });
        let h = harness(transport);
        h.uploader.enqueue(file("first.bin", 10));
        h.uploader.enqueue(file("second.bin", 10));
        h.uploader.enqueue(file("third.bin", 10));

        let uploader = h.uploader.clone();
        let task = tokio::spawn(async move { uploader.upload_all().await });

        let probe = h.uploader.clone();
        wait_until(move || probe.active_transfers() == 1).await;
        h.uploader.abort();

        let reports = task.await.unwrap();
        assert_eq!(reports.len(), 1);
        assert!(matches!(reports[0].result, Err(UploadError::Cancelled)));

        let requests = h.transport.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].url.ends_with("first.bin"));
        assert_eq!(h.uploader.queue().queued_len(), 3);
        assert!(h.uploader.queue().uploaded().is_empty());

        // 中止后仍可继续上传
        for expected in ["second.bin", "third.bin"] {
            let report = h.uploader.upload().await.unwrap();
            assert_eq!(report.file.name(), expected);
            assert!(report.is_success());
        }
    }

    #[tokio::test]
    async fn test_size_equal_to_threshold_uses_multipart() {
        let transport = MockTransport::new(|request| {
            if request.url.ends_with("?multipart=true") {
                MockReply::status(201).json(session_body(S3, 100, 1))
            } else if let Some(n) = part_number(&request.url) {
                ok_part(n)
            } else if request.url.ends_with("/complete") {
                MockReply::status(200)
            } else {
                MockReply::status(201)
            }
        });
        let h = harness(transport);
        let f = file("edge.bin", 100);
        h.uploader.enqueue(f.clone());

        assert!(h.uploader.upload().await.unwrap().is_success());
        assert_eq!(h.transport.requests_to("multipart=true").len(), 1);
        assert_eq!(h.transport.requests_to("/part/").len(), 1);
        assert_eq!(h.transport.requests_to("/complete").len(), 1);
        assert!(h
            .transport
            .requests()
            .iter()
            .all(|r| !r.url.ends_with("/edge.bin")));

        // 比阈值少一个字节走直传
        let g = file("small.bin", 99);
        h.uploader.enqueue(g.clone());
        assert!(h.uploader.upload().await.unwrap().is_success());
        assert_eq!(h.transport.requests_to("/small.bin").len(), 1);
        assert_eq!(h.transport.requests_to("multipart=true").len(), 1);
    }

    #[tokio::test]
    async fn test_disk_file_direct_upload_is_streamed() {
        use std::io::Write;

        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[5u8; 60]).unwrap();
        tmp.flush().unwrap();

        let transport = MockTransport::new(|_| MockReply::status(201));
        let h = harness(transport);
        let f = UploadableFile::from_path(tmp.path(), None).await.unwrap();
        h.uploader.enqueue(f.clone());

        assert!(h.uploader.upload().await.unwrap().is_success());
        assert_eq!(f.uploaded_size(), 60);

        let requests = h.transport.requests();
        assert_eq!(requests.len(), 1);
        match &requests[0].body {
            TransferBody::File { path, len } => {
                assert_eq!(path.as_path(), tmp.path());
                assert_eq!(*len, 60);
            }
            other => panic!("unexpected body: {:?}", other),
        }
        assert!(h.progress_values().iter().all(|v| *v <= 60));
    }

    #[tokio::test]
    async fn test_disk_file_multipart() {
        use std::io::Write;

        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&vec![3u8; 250]).unwrap();
        tmp.flush().unwrap();

        let transport = MockTransport::new(|request| {
            if request.url.ends_with("?multipart=true") {
                MockReply::status(201).json(session_body(S3, 100, 3))
            } else if let Some(n) = part_number(&request.url) {
                ok_part(n)
            } else {
                MockReply::status(200)
            }
        });
        let h = harness(transport);
        let f = UploadableFile::from_path(tmp.path(), None).await.unwrap();
        h.uploader.enqueue(f.clone());

        assert!(h.uploader.upload().await.unwrap().is_success());

        let sizes: Vec<usize> = h
            .transport
            .requests_to("/part/")
            .iter()
            .map(|r| r.body.len())
            .collect();
        let mut sorted = sizes.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![50, 100, 100]);
    }
}
