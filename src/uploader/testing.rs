// 测试用传输实现
//
// 按请求脚本化响应，记录所有请求，统计同时在途的请求数峰值

use crate::uploader::{
    ProgressFn, TransferBody, TransferGuard, TransferHandle, TransferKind, TransferRegistry,
    TransferRequest, TransferResponse, Transport,
};
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// 构造一个独立的传输句柄
pub fn handle() -> TransferHandle {
    let registry = Arc::new(TransferRegistry::new());
    let guard: TransferGuard = registry.register(TransferKind::Direct, &CancellationToken::new());
    guard.handle().clone()
}

/// 服务端分片会话描述
pub fn session_body(base: &str, chunk_size: u64, num_chunks: usize) -> serde_json::Value {
    serde_json::json!({
        "multipart_upload": {
            "chunk_size": chunk_size,
            "num_chunks": num_chunks,
            "abort_url": format!("{}/abort", base),
            "complete_url": format!("{}/complete", base),
            "parts_url": (1..=num_chunks)
                .map(|i| format!("{}/part/{}", base, i))
                .collect::<Vec<_>>(),
        }
    })
}

/// 脚本化响应
#[derive(Debug, Clone, Default)]
pub struct MockReply {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    delay: Duration,
    error: Option<String>,
    hang: bool,
}

impl MockReply {
    pub fn status(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    /// 网络层失败
    pub fn network_error(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// 永不返回，只能被中止
    pub fn hang() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn json(mut self, value: serde_json::Value) -> Self {
        self.body = value.to_string().into_bytes();
        self
    }

    pub fn delay_ms(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }
}

type Handler = Arc<dyn Fn(&TransferRequest) -> MockReply + Send + Sync>;

pub struct MockTransport {
    handler: Handler,
    requests: Mutex<Vec<TransferRequest>>,
    in_flight: Arc<AtomicUsize>,
    peak: AtomicUsize,
}

struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockTransport {
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&TransferRequest) -> MockReply + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Arc::new(handler),
            requests: Mutex::new(Vec::new()),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: AtomicUsize::new(0),
        })
    }

    /// 已收到的全部请求
    pub fn requests(&self) -> Vec<TransferRequest> {
        self.requests.lock().clone()
    }

    /// URL 满足条件的请求
    pub fn requests_to(&self, pattern: &str) -> Vec<TransferRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.url.contains(pattern))
            .collect()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        request: TransferRequest,
        progress: Option<ProgressFn>,
    ) -> Result<TransferResponse> {
        self.requests.lock().push(request.clone());
        let reply = (self.handler)(&request);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _flight = InFlight(self.in_flight.clone());

        let len = match &request.body {
            TransferBody::Bytes(_) | TransferBody::File { .. } => request.body.len() as u64,
            _ => 0,
        };

        // 半程进度报两次，结束时超报一次
        if let Some(progress) = &progress {
            progress(len / 2);
            progress(len / 2);
        }

        if reply.hang {
            futures::future::pending::<()>().await;
        }
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        } else {
            tokio::task::yield_now().await;
        }

        if let Some(message) = reply.error {
            anyhow::bail!(message);
        }

        if let Some(progress) = &progress {
            progress(len * 2);
        }

        let mut response = TransferResponse::new(reply.status).with_body(reply.body);
        for (name, value) in &reply.headers {
            response = response.with_header(name, value.as_str());
        }
        Ok(response)
    }
}
