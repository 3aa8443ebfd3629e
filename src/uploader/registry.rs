// 进行中传输登记表与活跃操作计数
//
// 每个底层传输在发起前登记，结束（完成、出错或被中止）时由守卫自行移除，
// 移除只针对自身 ID，不会整表清空

use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// 传输类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "part", rename_all = "snake_case")]
pub enum TransferKind {
    Direct,
    CreateMultipart,
    Part(u32),
    Complete,
    Abort,
}

/// 可中止的传输句柄
#[derive(Debug, Clone, Serialize)]
pub struct TransferHandle {
    id: u64,
    kind: TransferKind,
    #[serde(skip)]
    token: CancellationToken,
}

impl TransferHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> TransferKind {
        self.kind
    }

    /// 中止该传输
    pub fn abort(&self) {
        self.token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 等待该传输被中止
    pub async fn aborted(&self) {
        self.token.cancelled().await
    }
}

/// 进行中传输登记表
#[derive(Debug, Default)]
pub struct TransferRegistry {
    next_id: AtomicU64,
    active: DashMap<u64, TransferHandle>,
}

impl TransferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一个新传输
    ///
    /// 句柄的取消令牌是 `parent` 的子令牌，父级取消会级联到该传输
    pub fn register(self: &Arc<Self>, kind: TransferKind, parent: &CancellationToken) -> TransferGuard {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = TransferHandle {
            id,
            kind,
            token: parent.child_token(),
        };
        self.active.insert(id, handle.clone());
        debug!("登记传输: id={}, kind={:?}", id, kind);

        TransferGuard {
            registry: Arc::clone(self),
            handle,
        }
    }

    /// 中止所有登记中的传输，返回中止数量
    pub fn abort_all(&self) -> usize {
        let handles: Vec<TransferHandle> = self
            .active
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        for handle in &handles {
            handle.abort();
        }
        handles.len()
    }

    /// 当前登记中的传输数
    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.active.contains_key(&id)
    }
}

/// 传输守卫，drop 时从登记表移除自身
#[derive(Debug)]
pub struct TransferGuard {
    registry: Arc<TransferRegistry>,
    handle: TransferHandle,
}

impl TransferGuard {
    pub fn handle(&self) -> &TransferHandle {
        &self.handle
    }
}

impl Drop for TransferGuard {
    fn drop(&mut self) {
        self.registry.active.remove(&self.handle.id);
        debug!("注销传输: id={}", self.handle.id);
    }
}

/// 活跃异步操作计数器（`is_uploading` 的依据）
#[derive(Debug, Clone, Default)]
pub struct ActivityCounter {
    count: Arc<AtomicUsize>,
}

impl ActivityCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 进入一个活跃操作，守卫 drop 时退出
    pub fn enter(&self) -> ActivityGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        ActivityGuard {
            count: Arc::clone(&self.count),
        }
    }

    pub fn current(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        self.current() > 0
    }
}

#[derive(Debug)]
pub struct ActivityGuard {
    count: Arc<AtomicUsize>,
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::SeqCst);
    }
}
