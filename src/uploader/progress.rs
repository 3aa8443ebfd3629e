// 上传进度聚合
//
// 每个传输（直传为一个，分片上传为每个分片一个）维护独立计数：
// - 计数截断到该传输的计划大小
// - 计数只增不减
// - 总进度 = 各计数之和，截断到文件大小，对外只报告递增的值

use crate::uploader::PartTask;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
pub struct ProgressAggregator {
    file_size: u64,
    limits: Vec<u64>,
    loaded: Vec<AtomicU64>,
    reported: AtomicU64,
}

impl ProgressAggregator {
    fn with_limits(file_size: u64, limits: Vec<u64>) -> Self {
        let loaded = limits.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            file_size,
            limits,
            loaded,
            reported: AtomicU64::new(0),
        }
    }

    /// 直传：单一计数
    pub fn direct(file_size: u64) -> Self {
        Self::with_limits(file_size, vec![file_size])
    }

    /// 分片上传：每个分片一个计数
    pub fn for_parts(file_size: u64, tasks: &[PartTask]) -> Self {
        Self::with_limits(file_size, tasks.iter().map(PartTask::size).collect())
    }

    /// 记录某个传输的已发送字节数
    ///
    /// 返回新的总进度；总进度没有增长时返回 None
    pub fn record(&self, index: usize, loaded: u64) -> Option<u64> {
        let limit = *self.limits.get(index)?;
        let counter = &self.loaded[index];

        let value = loaded.min(limit);
        if counter.fetch_max(value, Ordering::SeqCst) >= value {
            return None;
        }

        let total = self.total();
        let previous = self.reported.fetch_max(total, Ordering::SeqCst);
        (total > previous).then_some(total)
    }

    /// 标记某个传输全部完成
    pub fn complete(&self, index: usize) -> Option<u64> {
        let limit = *self.limits.get(index)?;
        self.record(index, limit)
    }

    /// 当前总进度
    pub fn total(&self) -> u64 {
        let sum: u64 = self
            .loaded
            .iter()
            .map(|c| c.load(Ordering::SeqCst))
            .sum();
        sum.min(self.file_size)
    }

    /// 已报告的最大总进度
    pub fn reported(&self) -> u64 {
        self.reported.load(Ordering::SeqCst)
    }
}
