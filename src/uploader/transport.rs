// 传输原语
//
// 一次 HTTP 交换：请求行、请求头、请求体 -> 状态码、响应头、响应体，
// 并通过回调汇报已发送字节数。直传、创建会话、分片、合并、中止都走这里

use crate::uploader::Header;
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::Method;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;
use tracing::debug;

/// 进度回调，参数为本次传输累计已发送字节数
pub type ProgressFn = Arc<dyn Fn(u64) + Send + Sync>;

/// 上报进度的发送块大小: 64KB
const PROGRESS_BLOCK_SIZE: usize = 64 * 1024;

/// JSON 请求的内容类型
pub const JSON_CONTENT_TYPE: &str = "application/json;charset=UTF-8";

/// 请求体
#[derive(Debug, Clone)]
pub enum TransferBody {
    Empty,
    Bytes(Bytes),
    /// 本地文件前 `len` 字节，发送时流式读取
    File { path: PathBuf, len: u64 },
    Json(serde_json::Value),
}

impl TransferBody {
    /// 请求体字节数（JSON 为序列化后长度）
    pub fn len(&self) -> usize {
        match self {
            TransferBody::Empty => 0,
            TransferBody::Bytes(data) => data.len(),
            TransferBody::File { len, .. } => *len as usize,
            TransferBody::Json(value) => value.to_string().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 一次传输请求
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<Header>,
    pub body: TransferBody,
}

impl TransferRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: TransferBody::Empty,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(Header::new(name, value));
        self
    }

    pub fn headers(mut self, headers: impl IntoIterator<Item = Header>) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn bytes(mut self, data: Bytes) -> Self {
        self.body = TransferBody::Bytes(data);
        self
    }

    pub fn json(mut self, value: serde_json::Value) -> Self {
        self.body = TransferBody::Json(value);
        self
    }

    pub fn file(mut self, path: impl Into<PathBuf>, len: u64) -> Self {
        self.body = TransferBody::File {
            path: path.into(),
            len,
        };
        self
    }
}

/// 逐块透传数据流，每块发出后上报累计字节数
fn counted<S>(stream: S, progress: ProgressFn) -> impl Stream<Item = io::Result<Bytes>>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    let mut sent = 0u64;
    stream.map(move |block| {
        if let Ok(data) = &block {
            sent += data.len() as u64;
            progress(sent);
        }
        block
    })
}

/// 传输响应
#[derive(Debug, Clone, Default)]
pub struct TransferResponse {
    pub status: u16,
    /// 响应头（名称统一为小写）
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl TransferResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// 按名称读取响应头（大小写不敏感）
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).context("解析响应 JSON 失败")
    }
}

/// 传输能力
///
/// 实现方只负责一次交换；取消由调用方丢弃 future 完成
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: TransferRequest,
        progress: Option<ProgressFn>,
    ) -> Result<TransferResponse>;
}

/// 基于 reqwest 的传输实现
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        Self::with_connect_timeout(None)
    }

    /// 仅设置连接超时，请求本身不设超时（大分片耗时无法预估）
    pub fn with_connect_timeout(connect_timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let client = builder.build().context("创建 HTTP 客户端失败")?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn build_headers(headers: &[Header]) -> Result<HeaderMap> {
        let mut map = HeaderMap::new();
        for header in headers {
            let name = HeaderName::from_bytes(header.name.as_bytes())
                .with_context(|| format!("非法请求头名称: {}", header.name))?;
            let value = HeaderValue::from_str(&header.value)
                .with_context(|| format!("非法请求头值: {}", header.name))?;
            map.append(name, value);
        }
        Ok(map)
    }

    /// 将数据切成小块流式发送，每发出一块上报一次累计字节数
    fn progress_body(data: Bytes, progress: ProgressFn) -> reqwest::Body {
        let blocks: Vec<Bytes> = (0..data.len())
            .step_by(PROGRESS_BLOCK_SIZE)
            .map(|start| data.slice(start..(start + PROGRESS_BLOCK_SIZE).min(data.len())))
            .collect();

        let stream = futures::stream::iter(blocks.into_iter().map(Ok::<Bytes, io::Error>));
        reqwest::Body::wrap_stream(counted(stream, progress))
    }

    /// 打开本地文件并按块流式发送，不整体读入内存
    async fn file_body(
        path: &Path,
        len: u64,
        progress: Option<ProgressFn>,
    ) -> Result<reqwest::Body> {
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("打开上传文件失败: {:?}", path))?;
        let stream = ReaderStream::with_capacity(file.take(len), PROGRESS_BLOCK_SIZE);

        Ok(match progress {
            Some(progress) => reqwest::Body::wrap_stream(counted(stream, progress)),
            None => reqwest::Body::wrap_stream(stream),
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: TransferRequest,
        progress: Option<ProgressFn>,
    ) -> Result<TransferResponse> {
        debug!(
            "发送请求: {} {}, body={} bytes",
            request.method,
            request.url,
            request.body.len()
        );

        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .headers(Self::build_headers(&request.headers)?);

        builder = match request.body {
            TransferBody::Empty => builder,
            TransferBody::Json(value) => {
                let has_content_type = request
                    .headers
                    .iter()
                    .any(|h| h.name.eq_ignore_ascii_case(CONTENT_TYPE.as_str()));
                let builder = if has_content_type {
                    builder
                } else {
                    builder.header(CONTENT_TYPE, JSON_CONTENT_TYPE)
                };
                builder.body(serde_json::to_vec(&value).context("序列化请求体失败")?)
            }
            TransferBody::Bytes(data) => match progress {
                Some(progress) => builder
                    .header(CONTENT_LENGTH, data.len())
                    .body(Self::progress_body(data, progress)),
                None => builder.body(data),
            },
            TransferBody::File { path, len } => builder
                .header(CONTENT_LENGTH, len)
                .body(Self::file_body(&path, len, progress).await?),
        };

        let response = builder
            .send()
            .await
            .with_context(|| format!("请求发送失败: {}", request.url))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await.context("读取响应体失败")?;

        debug!("收到响应: {} {}, status={}", request.method, request.url, status);

        Ok(TransferResponse {
            status,
            headers,
            body,
        })
    }
}
