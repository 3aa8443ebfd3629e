// 有界并发池
//
// 核心设计：
// - 使用 Semaphore 控制同时运行的任务数
// - 使用 JoinSet 管理并发任务，任务按下标回填结果
// - 每个任务只执行一次，单个任务失败不影响其他任务
// - 取消后停止调度新任务，已启动的任务照常等待结束

use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// 并发池执行结果
///
/// `results` 与输入任务一一对应，任务无结果（失败、panic 或未调度）时对应位置为 None
#[derive(Debug)]
pub struct PoolOutput<R> {
    pub results: Vec<Option<R>>,
    /// 是否因取消而提前停止调度
    pub cancelled: bool,
}

impl<R> PoolOutput<R> {
    /// 有结果的任务数
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_some()).count()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// 所有成功结果（按任务顺序）
    pub fn into_successes(self) -> Vec<R> {
        self.results.into_iter().flatten().collect()
    }
}

/// 以最多 `limit` 个并发运行全部任务
///
/// # 参数
/// * `tasks` - 任务列表，按顺序调度
/// * `limit` - 最大并发数（0 按 1 处理）
/// * `cancel` - 取消令牌，取消后不再调度新任务
/// * `worker` - 任务执行函数，返回 None 表示该任务无结果
///
/// 仅在并发池自身出错时返回 Err
pub async fn run_bounded<T, R, F, Fut>(
    tasks: Vec<T>,
    limit: usize,
    cancel: &CancellationToken,
    worker: F,
) -> Result<PoolOutput<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Option<R>> + Send + 'static,
{
    let total = tasks.len();
    let limit = limit.max(1);
    let semaphore = Arc::new(Semaphore::new(limit));
    let mut join_set: JoinSet<(usize, Option<R>)> = JoinSet::new();
    let mut results: Vec<Option<R>> = (0..total).map(|_| None).collect();
    let mut cancelled = false;

    debug!("[并发池] 开始调度 {} 个任务，并发上限: {}", total, limit);

    for (index, task) in tasks.into_iter().enumerate() {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                cancelled = true;
                break;
            }
            permit = semaphore.clone().acquire_owned() => {
                permit.context("并发池信号量已关闭")?
            }
        };

        let fut = worker(task);
        join_set.spawn(async move {
            let result = fut.await;
            drop(permit);
            (index, result)
        });
    }

    if cancelled {
        warn!(
            "[并发池] 已取消，停止调度新任务（已调度 {}/{}）",
            join_set.len(),
            total
        );
    }

    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((index, result)) => results[index] = result,
            Err(e) => error!("[并发池] 任务异常退出: {}", e),
        }
    }

    Ok(PoolOutput { results, cancelled })
}
