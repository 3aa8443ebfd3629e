// 上传错误定义
//
// 错误分为四类：
// - 配置错误：缺少上传地址、factory 未返回结果等，不发起任何网络请求
// - 传输错误：网络失败或非预期状态码，按单次请求计
// - 聚合错误：部分分片失败，文件级失败前先走 abort 子流程
// - 取消错误：调用方主动中止

use std::fmt;
use thiserror::Error;

/// 上传协议步骤
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStep {
    /// 整文件直传
    Direct,
    /// 创建分片上传会话
    CreateMultipart,
    /// 上传单个分片（分片号从 1 开始）
    UploadPart(u32),
    /// 合并分片
    Complete,
    /// 中止分片上传会话
    Abort,
}

impl fmt::Display for UploadStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadStep::Direct => write!(f, "直传"),
            UploadStep::CreateMultipart => write!(f, "创建分片上传"),
            UploadStep::UploadPart(part) => write!(f, "上传分片#{}", part),
            UploadStep::Complete => write!(f, "合并分片"),
            UploadStep::Abort => write!(f, "中止分片上传"),
        }
    }
}

/// 错误大类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Transport,
    Aggregate,
    Cancellation,
}

/// 上传错误
#[derive(Debug, Error)]
pub enum UploadError {
    /// 配置错误（不会发起网络请求）
    #[error("配置错误: {0}")]
    Configuration(String),

    /// 请求发送失败（网络错误、连接中断等）
    #[error("{step}请求失败: {source}")]
    Transport {
        step: UploadStep,
        #[source]
        source: anyhow::Error,
    },

    /// 服务端返回非预期状态码
    #[error("{step}返回非预期状态码: {status}")]
    UnexpectedStatus { step: UploadStep, status: u16 },

    /// 服务端响应无法解析或不一致
    #[error("{step}响应无效: {reason}")]
    InvalidResponse { step: UploadStep, reason: String },

    /// 部分分片上传失败
    #[error("{failed}/{total} 个分片上传失败")]
    Aggregate { failed: usize, total: usize },

    /// 上传被中止
    #[error("上传已取消")]
    Cancelled,

    /// factory 返回的异步结果失败
    #[error("factory 执行失败: {0}")]
    Factory(String),

    /// 读取本地文件失败
    #[error("读取上传文件失败: {0}")]
    Io(#[source] anyhow::Error),
}

impl UploadError {
    /// 错误所属大类
    pub fn kind(&self) -> ErrorKind {
        match self {
            UploadError::Configuration(_) => ErrorKind::Configuration,
            UploadError::Transport { .. }
            | UploadError::UnexpectedStatus { .. }
            | UploadError::InvalidResponse { .. }
            | UploadError::Factory(_)
            | UploadError::Io(_) => ErrorKind::Transport,
            UploadError::Aggregate { .. } => ErrorKind::Aggregate,
            UploadError::Cancelled => ErrorKind::Cancellation,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, UploadError::Cancelled)
    }

    /// 出错的协议步骤（若有）
    pub fn step(&self) -> Option<UploadStep> {
        match self {
            UploadError::Transport { step, .. }
            | UploadError::UnexpectedStatus { step, .. }
            | UploadError::InvalidResponse { step, .. } => Some(*step),
            _ => None,
        }
    }
}
