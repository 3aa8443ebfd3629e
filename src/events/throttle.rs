//! 进度事件节流器
//!
//! 控制文件进度更新的发布频率，分片完成等关键节点可强制发布

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// 默认节流间隔（毫秒）
pub const DEFAULT_THROTTLE_INTERVAL_MS: u64 = 200;

/// 尚未发布过的标记
const NEVER: u64 = u64::MAX;

/// 进度事件节流器
///
/// 线程安全，多个分片任务可共享同一个节流器
#[derive(Debug)]
pub struct ProgressThrottler {
    /// 计时起点
    origin: Instant,
    /// 上次发布时间（相对起点的纳秒）
    last_emit_nanos: AtomicU64,
    /// 节流间隔（纳秒）
    interval_nanos: u64,
}

impl ProgressThrottler {
    /// # 参数
    /// * `interval` - 最小发布间隔，为 0 时不节流
    pub fn new(interval: Duration) -> Self {
        Self {
            origin: Instant::now(),
            last_emit_nanos: AtomicU64::new(NEVER),
            interval_nanos: interval.as_nanos() as u64,
        }
    }

    pub fn with_millis(interval_ms: u64) -> Self {
        Self::new(Duration::from_millis(interval_ms))
    }

    /// 是否应该发布本次进度
    ///
    /// 距上次发布超过间隔时返回 true 并记录发布时间
    pub fn should_emit(&self) -> bool {
        let now = self.elapsed_nanos();
        let last = self.last_emit_nanos.load(Ordering::Relaxed);

        let due = last == NEVER || now.saturating_sub(last) >= self.interval_nanos;
        if !due {
            return false;
        }

        // 被其他线程抢先更新时本次不发布
        self.last_emit_nanos
            .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }

    /// 强制发布
    pub fn force_emit(&self) -> bool {
        self.last_emit_nanos
            .store(self.elapsed_nanos(), Ordering::Relaxed);
        true
    }

    /// 重置，下一次 `should_emit` 必定发布
    pub fn reset(&self) {
        self.last_emit_nanos.store(NEVER, Ordering::Relaxed);
    }

    fn elapsed_nanos(&self) -> u64 {
        // 运行约 584 年才会到达 NEVER
        self.origin.elapsed().as_nanos() as u64
    }
}

impl Default for ProgressThrottler {
    fn default() -> Self {
        Self::with_millis(DEFAULT_THROTTLE_INTERVAL_MS)
    }
}
