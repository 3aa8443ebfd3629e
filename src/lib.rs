// Multipart Uploader Library
// 分片上传客户端核心库

// 配置管理模块
pub mod config;

// 上传事件模块
pub mod events;

// 日志模块
pub mod logging;

// 上传引擎模块
pub mod uploader;

// 导出常用类型
pub use config::{AppConfig, LogConfig, UploadConfig};
pub use events::{ChannelEventSink, EventSink, ProgressThrottler, UploadEvent};
pub use uploader::{
    FactoryOutcome, FileStatus, ReqwestTransport, Transport, UploadError, UploadFactory,
    UploadOverrides, UploadQueue, UploadReport, UploadableFile, Uploader, UploaderOptions,
};
