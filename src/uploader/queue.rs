// 上传队列管理
//
// 文件在以下集合之间流转：
// - 等待队列（FIFO，失败的文件重新追加到队尾，不会重复）
// - 上传中集合
// - 已上传列表
//
// 每次状态变更都会通知文件列表界面并发出对应的生命周期事件

use crate::events::{EventSink, NoopEventSink, UploadEvent};
use crate::uploader::{FileSnapshot, FileStatus, TransferHandle, UploadableFile};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 文件列表界面
///
/// 上传器只通过这组接口与宿主界面交互
pub trait FileListSurface: Send + Sync {
    /// 文件状态或进度发生变化
    fn file_updated(&self, _file: &FileSnapshot) {}

    /// 界面被禁用时不允许开始上传，也不释放文件资源
    fn is_disabled(&self) -> bool {
        false
    }

    /// 释放已上传文件占用的资源（缩略图、预览等）
    fn release(&self, _file: &UploadableFile) {}
}

/// 无界面运行时使用的空实现
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessSurface;

impl FileListSurface for HeadlessSurface {}

pub struct UploadQueue {
    /// 等待上传的文件
    pending: Mutex<VecDeque<UploadableFile>>,
    /// 上传中的文件 (file_id -> file)
    uploading: DashMap<String, UploadableFile>,
    /// 已上传的文件
    uploaded: Mutex<Vec<UploadableFile>>,
    surface: Arc<dyn FileListSurface>,
    events: Arc<dyn EventSink>,
}

impl UploadQueue {
    pub fn new(surface: Arc<dyn FileListSurface>, events: Arc<dyn EventSink>) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            uploading: DashMap::new(),
            uploaded: Mutex::new(Vec::new()),
            surface,
            events,
        }
    }

    /// 无界面、不发事件的队列
    pub fn headless() -> Self {
        Self::new(Arc::new(HeadlessSurface), Arc::new(NoopEventSink))
    }

    pub fn with_events(events: Arc<dyn EventSink>) -> Self {
        Self::new(Arc::new(HeadlessSurface), events)
    }

    fn publish(&self, file: &UploadableFile) {
        self.surface.file_updated(&file.snapshot());
    }

    /// 加入等待队列
    ///
    /// 已在队列中或正在上传的文件保持原状态，不会重复加入
    pub fn enqueue(&self, file: UploadableFile) {
        if self.uploading.contains_key(file.id()) {
            debug!("文件正在上传，忽略入队: {}", file.name());
            return;
        }
        {
            let mut pending = self.pending.lock();
            if pending.iter().any(|f| f == &file) {
                return;
            }
            file.set_state(FileStatus::Queued, Some(0));
            pending.push_back(file.clone());
        }
        debug!("文件加入上传队列: {} ({} bytes)", file.name(), file.size());
        self.publish(&file);
    }

    /// 取出队首文件
    pub fn dequeue_next(&self) -> Option<UploadableFile> {
        self.pending.lock().pop_front()
    }

    /// 重新放回等待队列（幂等）
    fn requeue(&self, file: &UploadableFile) {
        let mut pending = self.pending.lock();
        if !pending.iter().any(|f| f == file) {
            pending.push_back(file.clone());
        }
    }

    /// 标记为上传中
    pub fn mark_uploading(&self, file: &UploadableFile, handle: &TransferHandle) {
        file.set_state(FileStatus::Uploading, Some(0));
        self.uploading.insert(file.id().to_string(), file.clone());
        info!("开始上传: {} ({} bytes)", file.name(), file.size());

        self.publish(file);
        self.events.emit(UploadEvent::Uploading {
            file: file.snapshot(),
            handle: handle.clone(),
        });
    }

    /// 分片上传会话已创建
    pub fn notify_multipart_created(
        &self,
        file: &UploadableFile,
        handle: &TransferHandle,
        response: serde_json::Value,
    ) {
        self.events.emit(UploadEvent::MultipartCreated {
            file: file.snapshot(),
            handle: handle.clone(),
            response,
        });
    }

    /// 更新上传进度
    ///
    /// 进度只前进不后退，状态保持 uploading；`publish` 为 false 时只更新文件状态
    pub fn update_progress(&self, file: &UploadableFile, uploaded_size: u64, publish: bool) {
        if !file.advance_uploaded(uploaded_size) || !publish {
            return;
        }
        self.publish(file);
        self.events.emit(UploadEvent::Progress {
            file: file.snapshot(),
        });
    }

    /// 立即发布当前进度（仅上传中的文件）
    pub fn flush_progress(&self, file: &UploadableFile) {
        if file.status() != FileStatus::Uploading {
            return;
        }
        self.publish(file);
        self.events.emit(UploadEvent::Progress {
            file: file.snapshot(),
        });
    }

    /// 标记为已上传
    pub fn mark_uploaded(&self, file: &UploadableFile, handle: Option<TransferHandle>) {
        file.set_state(FileStatus::Uploaded, Some(file.size()));
        self.uploading.remove(file.id());
        self.uploaded.lock().push(file.clone());
        info!("上传完成: {}", file.name());

        self.publish(file);
        self.events.emit(UploadEvent::Uploaded {
            file: file.snapshot(),
            handle,
        });
    }

    /// 标记为失败并重新排队
    pub fn mark_failed(&self, file: &UploadableFile, handle: Option<TransferHandle>) {
        file.set_state(FileStatus::Failed, None);
        self.uploading.remove(file.id());
        self.requeue(file);
        warn!("上传失败，已重新排队: {}", file.name());

        self.publish(file);
        self.events.emit(UploadEvent::Failed {
            file: file.snapshot(),
            handle,
        });
    }

    /// factory 异步结果失败：标记失败并重新排队
    pub fn mark_factory_failed(&self, file: &UploadableFile, error: &str) {
        file.set_state(FileStatus::Failed, None);
        self.uploading.remove(file.id());
        self.requeue(file);
        warn!("factory 执行失败，已重新排队: {}, 原因: {}", file.name(), error);

        self.publish(file);
        self.notify_factory_failed(file, error);
    }

    /// 只发出 factory-failed 事件，不改变文件状态
    pub fn notify_factory_failed(&self, file: &UploadableFile, error: &str) {
        self.events.emit(UploadEvent::FactoryFailed {
            error: error.to_string(),
            file: file.snapshot(),
        });
    }

    /// 清空已上传列表，界面未禁用时释放文件资源
    ///
    /// 返回被移除的文件
    pub fn remove_uploaded(&self) -> Vec<UploadableFile> {
        let removed = std::mem::take(&mut *self.uploaded.lock());
        if !self.surface.is_disabled() {
            for file in &removed {
                self.surface.release(file);
            }
        }
        debug!("移除已上传文件: {} 个", removed.len());
        removed
    }

    /// 等待队列快照
    pub fn queued(&self) -> Vec<UploadableFile> {
        self.pending.lock().iter().cloned().collect()
    }

    pub fn queued_len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn uploading(&self) -> Vec<UploadableFile> {
        self.uploading.iter().map(|e| e.value().clone()).collect()
    }

    pub fn uploaded(&self) -> Vec<UploadableFile> {
        self.uploaded.lock().clone()
    }

    pub fn is_disabled(&self) -> bool {
        self.surface.is_disabled()
    }
}
