use clap::Parser;
use multipart_uploader::{
    config::LogConfig,
    events::EventPriority,
    logging,
    uploader::{ErrorKind, UploadReport},
    AppConfig, ChannelEventSink, ReqwestTransport, UploadEvent, UploadQueue, UploadableFile,
    Uploader, UploaderOptions,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const DEFAULT_CONFIG_PATH: &str = "config/app.toml";

#[derive(Parser, Debug)]
#[command(name = "multipart-uploader")]
#[command(version)]
#[command(about = "分片上传客户端", long_about = None)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// 要上传的文件
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

/// 加载日志配置
///
/// 日志系统初始化之前调用，任何失败都回退到默认配置
async fn load_log_config(config_path: &Path) -> LogConfig {
    if let Ok(content) = tokio::fs::read_to_string(config_path).await {
        if let Ok(config) = toml::from_str::<toml::Value>(&content) {
            if let Some(log_table) = config.get("log") {
                if let Ok(log_config) = log_table.clone().try_into::<LogConfig>() {
                    return log_config;
                }
            }
        }
    }

    LogConfig::default()
}

fn log_event(event: &UploadEvent) {
    match (event.priority(), event) {
        (_, UploadEvent::FactoryFailed { error, file }) => {
            warn!("[{}] {}: {}", event.event_type_name(), file.name, error)
        }
        (_, UploadEvent::Failed { .. }) => warn!("{}", event),
        (EventPriority::Low, _) => debug!("{}", event),
        (EventPriority::Medium | EventPriority::High, _) => info!("{}", event),
    }
}

fn log_failure(report: &UploadReport) {
    let Err(e) = &report.result else {
        return;
    };
    match e.kind() {
        ErrorKind::Cancellation => warn!("上传已取消: {}", report.file.name()),
        ErrorKind::Configuration => error!("配置错误，未上传: {}: {}", report.file.name(), e),
        ErrorKind::Transport | ErrorKind::Aggregate => {
            error!("上传失败: {}: {}", report.file.name(), e)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    // 先加载日志配置（必须保持 _log_guard 存活）
    let log_config = load_log_config(&args.config).await;
    let _log_guard = logging::init_logging(&log_config);

    info!("Multipart Uploader v{} 启动中...", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load_or_default(&args.config).await;
    config.validate()?;

    let transport = Arc::new(ReqwestTransport::with_connect_timeout(
        config.upload.connect_timeout(),
    )?);
    let (events, mut receiver) = ChannelEventSink::new();
    let queue = Arc::new(UploadQueue::with_events(Arc::new(events)));

    let uploader = Arc::new(
        Uploader::new(UploaderOptions::from(&config.upload), transport, queue)
            .with_progress_interval(config.upload.progress_interval()),
    );

    for path in &args.files {
        let file = UploadableFile::from_path(path.clone(), None).await?;
        info!("加入上传队列: {} ({} 字节)", file.name(), file.size());
        uploader.enqueue(file);
    }

    let event_task = tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            log_event(&event);
        }
    });

    let worker = Arc::clone(&uploader);
    let mut upload_task = tokio::spawn(async move { worker.upload_all().await });

    // 使用 select! 监听中断信号，收到后中止上传并等待收尾
    let reports = tokio::select! {
        result = &mut upload_task => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("收到 Ctrl+C，中止上传...");
            uploader.abort();
            upload_task.await?
        }
    };

    drop(uploader);
    if let Err(e) = event_task.await {
        warn!("事件任务异常退出: {}", e);
    }

    reports.iter().for_each(log_failure);

    let succeeded = reports.iter().filter(|r| r.is_success()).count();
    if succeeded < args.files.len() {
        anyhow::bail!("{}/{} 个文件未上传成功", args.files.len() - succeeded, args.files.len());
    }

    info!("全部 {} 个文件上传完成", reports.len());
    Ok(())
}
