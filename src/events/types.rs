//! 上传生命周期事件
//!
//! 事件以 `event_type` 字段区分类型，可直接序列化后推送给界面层

use crate::uploader::{FileSnapshot, TransferHandle};
use serde::Serialize;
use std::fmt;
use tokio::sync::mpsc;
use tracing::warn;

/// 事件优先级
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventPriority {
    /// 进度更新
    Low = 0,
    /// 状态变更
    Medium = 1,
    /// 完成、失败等关键事件
    High = 2,
}

/// 上传事件
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "kebab-case")]
pub enum UploadEvent {
    /// 开始上传
    Uploading {
        file: FileSnapshot,
        handle: TransferHandle,
    },
    /// 进度更新（状态保持 uploading）
    Progress { file: FileSnapshot },
    /// 分片上传会话已创建
    MultipartCreated {
        file: FileSnapshot,
        handle: TransferHandle,
        response: serde_json::Value,
    },
    /// 上传完成
    Uploaded {
        file: FileSnapshot,
        #[serde(skip_serializing_if = "Option::is_none")]
        handle: Option<TransferHandle>,
    },
    /// 上传失败（文件已重新排队）
    Failed {
        file: FileSnapshot,
        #[serde(skip_serializing_if = "Option::is_none")]
        handle: Option<TransferHandle>,
    },
    /// factory 未能提供上传参数
    FactoryFailed { error: String, file: FileSnapshot },
}

impl UploadEvent {
    /// 事件关联的文件
    pub fn file(&self) -> &FileSnapshot {
        match self {
            UploadEvent::Uploading { file, .. }
            | UploadEvent::Progress { file }
            | UploadEvent::MultipartCreated { file, .. }
            | UploadEvent::Uploaded { file, .. }
            | UploadEvent::Failed { file, .. }
            | UploadEvent::FactoryFailed { file, .. } => file,
        }
    }

    pub fn priority(&self) -> EventPriority {
        match self {
            UploadEvent::Progress { .. } => EventPriority::Low,
            UploadEvent::Uploading { .. } | UploadEvent::MultipartCreated { .. } => {
                EventPriority::Medium
            }
            UploadEvent::Uploaded { .. }
            | UploadEvent::Failed { .. }
            | UploadEvent::FactoryFailed { .. } => EventPriority::High,
        }
    }

    /// 获取事件类型名称
    pub fn event_type_name(&self) -> &'static str {
        match self {
            UploadEvent::Uploading { .. } => "uploading",
            UploadEvent::Progress { .. } => "progress",
            UploadEvent::MultipartCreated { .. } => "multipart-created",
            UploadEvent::Uploaded { .. } => "uploaded",
            UploadEvent::Failed { .. } => "failed",
            UploadEvent::FactoryFailed { .. } => "factory-failed",
        }
    }
}

impl fmt::Display for UploadEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let file = self.file();
        write!(
            f,
            "{} {} ({}/{} bytes)",
            self.event_type_name(),
            file.name,
            file.uploaded_size,
            file.size
        )
    }
}

/// 事件接收方
pub trait EventSink: Send + Sync {
    fn emit(&self, event: UploadEvent);
}

impl<F> EventSink for F
where
    F: Fn(UploadEvent) + Send + Sync,
{
    fn emit(&self, event: UploadEvent) {
        self(event)
    }
}

/// 丢弃所有事件
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: UploadEvent) {}
}

/// 基于 mpsc 通道的事件接收方
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    sender: mpsc::UnboundedSender<UploadEvent>,
}

impl ChannelEventSink {
    /// 创建接收方与对应的事件流
    pub fn new() -> (Self, mpsc::UnboundedReceiver<UploadEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: UploadEvent) {
        if let Err(e) = self.sender.send(event) {
            warn!("事件接收端已关闭，丢弃事件: {}", e.0.event_type_name());
        }
    }
}
