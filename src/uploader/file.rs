// 待上传文件定义
//
// 文件身份（名称、大小、MIME 类型、数据来源）创建后不可变，
// 状态与已上传字节数只能通过上传队列的更新入口修改

use anyhow::{Context, Result};
use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// 未知类型时使用的 MIME 类型
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// 文件上传状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// 等待上传
    Queued,
    /// 上传中
    Uploading,
    /// 已上传
    Uploaded,
    /// 失败（已重新放回等待队列）
    Failed,
}

/// 文件数据来源
#[derive(Debug, Clone)]
pub enum FileSource {
    /// 内存数据
    Memory(Bytes),
    /// 本地磁盘文件
    Disk(PathBuf),
}

#[derive(Debug)]
struct FileState {
    status: FileStatus,
    uploaded_size: u64,
    cancel: CancellationToken,
}

#[derive(Debug)]
struct FileInner {
    id: String,
    name: String,
    size: u64,
    mime_type: Option<String>,
    source: FileSource,
    created_at: i64,
    state: RwLock<FileState>,
}

/// 待上传文件
///
/// 克隆代价很低，所有克隆共享同一份状态
#[derive(Clone)]
pub struct UploadableFile {
    inner: Arc<FileInner>,
}

/// 文件状态快照（用于事件与界面展示）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileSnapshot {
    pub id: String,
    pub name: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub status: FileStatus,
    pub uploaded_size: u64,
}

impl UploadableFile {
    fn with_source(name: String, size: u64, mime_type: Option<String>, source: FileSource) -> Self {
        Self {
            inner: Arc::new(FileInner {
                id: Uuid::new_v4().to_string(),
                name,
                size,
                mime_type,
                source,
                created_at: chrono::Utc::now().timestamp(),
                state: RwLock::new(FileState {
                    status: FileStatus::Queued,
                    uploaded_size: 0,
                    cancel: CancellationToken::new(),
                }),
            }),
        }
    }

    /// 从内存数据创建
    pub fn from_bytes(
        name: impl Into<String>,
        mime_type: Option<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        let data = data.into();
        let size = data.len() as u64;
        Self::with_source(name.into(), size, mime_type, FileSource::Memory(data))
    }

    /// 从本地文件创建
    ///
    /// 文件名取路径最后一段，大小取自文件元数据
    pub async fn from_path(path: impl Into<PathBuf>, mime_type: Option<String>) -> Result<Self> {
        let path = path.into();
        let metadata = tokio::fs::metadata(&path)
            .await
            .with_context(|| format!("无法获取文件元数据: {:?}", path))?;

        if metadata.is_dir() {
            anyhow::bail!("不支持上传目录: {:?}", path);
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("无法解析文件名: {:?}", path))?;

        Ok(Self::with_source(
            name,
            metadata.len(),
            mime_type,
            FileSource::Disk(path),
        ))
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn size(&self) -> u64 {
        self.inner.size
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.inner.mime_type.as_deref()
    }

    /// 上传时使用的内容类型，缺省为 application/octet-stream
    pub fn content_type(&self) -> &str {
        self.inner
            .mime_type
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
    }

    pub fn source(&self) -> &FileSource {
        &self.inner.source
    }

    pub fn created_at(&self) -> i64 {
        self.inner.created_at
    }

    pub fn status(&self) -> FileStatus {
        self.inner.state.read().status
    }

    pub fn uploaded_size(&self) -> u64 {
        self.inner.state.read().uploaded_size
    }

    /// 计算进度百分比
    pub fn progress(&self) -> f64 {
        if self.inner.size == 0 {
            return 0.0;
        }
        (self.uploaded_size() as f64 / self.inner.size as f64) * 100.0
    }

    /// 中止该文件正在进行的上传
    pub fn abort(&self) {
        self.inner.state.read().cancel.cancel();
    }

    /// 当前上传尝试的取消令牌
    pub fn cancel_token(&self) -> CancellationToken {
        self.inner.state.read().cancel.clone()
    }

    /// 为新一轮上传挂载取消令牌
    pub(crate) fn attach_cancel(&self, token: CancellationToken) {
        self.inner.state.write().cancel = token;
    }

    /// 更新状态与已上传字节数
    ///
    /// `uploaded_size` 为 None 时保留原值；字节数不会超过文件大小
    pub(crate) fn set_state(&self, status: FileStatus, uploaded_size: Option<u64>) {
        let mut state = self.inner.state.write();
        state.status = status;
        if let Some(size) = uploaded_size {
            state.uploaded_size = size.min(self.inner.size);
        }
    }

    /// 仅向前推进已上传字节数，返回是否发生变化
    pub(crate) fn advance_uploaded(&self, uploaded_size: u64) -> bool {
        let mut state = self.inner.state.write();
        let size = uploaded_size.min(self.inner.size);
        if state.status != FileStatus::Uploading || size <= state.uploaded_size {
            return false;
        }
        state.uploaded_size = size;
        true
    }

    pub fn snapshot(&self) -> FileSnapshot {
        let state = self.inner.state.read();
        FileSnapshot {
            id: self.inner.id.clone(),
            name: self.inner.name.clone(),
            size: self.inner.size,
            mime_type: self.inner.mime_type.clone(),
            status: state.status,
            uploaded_size: state.uploaded_size,
        }
    }

    /// 读取整个文件
    pub async fn read_all(&self) -> Result<Bytes> {
        self.read_range(0..self.inner.size).await
    }

    /// 读取指定字节范围 `[start, end)`
    pub async fn read_range(&self, range: Range<u64>) -> Result<Bytes> {
        if range.start > range.end || range.end > self.inner.size {
            anyhow::bail!(
                "读取范围越界: {}..{}, 文件大小={}",
                range.start,
                range.end,
                self.inner.size
            );
        }

        match &self.inner.source {
            FileSource::Memory(data) => Ok(data.slice(range.start as usize..range.end as usize)),
            FileSource::Disk(path) => {
                let mut file = File::open(path)
                    .await
                    .with_context(|| format!("打开上传文件失败: {:?}", path))?;

                file.seek(std::io::SeekFrom::Start(range.start))
                    .await
                    .context("文件定位失败")?;

                let mut buffer = vec![0u8; (range.end - range.start) as usize];
                file.read_exact(&mut buffer)
                    .await
                    .context("读取分片数据失败")?;

                debug!(
                    "读取文件数据: {} bytes={}..{}",
                    self.inner.name, range.start, range.end
                );

                Ok(Bytes::from(buffer))
            }
        }
    }
}

impl PartialEq for UploadableFile {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for UploadableFile {}

impl fmt::Debug for UploadableFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("UploadableFile")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("size", &self.inner.size)
            .field("status", &state.status)
            .field("uploaded_size", &state.uploaded_size)
            .finish()
    }
}
