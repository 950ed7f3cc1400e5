// crates/ms_workflow/src/batch.rs

//! 批次划分与扫描状态
//!
//! 样本 `0..N` 按槽位数 P 划分为 `ceil(N/P)` 个连续批次，
//! 每批大小 `min(P, 剩余)`。扫描状态显式记录下一个批次、
//! 已完成样本数、进度间隔与样本级失败。

use serde::{Deserialize, Serialize};
use std::ops::Range;
use uuid::Uuid;

use crate::error::SampleFailure;

/// 扫描ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SweepId(Uuid);

impl SweepId {
    /// 创建新的扫描ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// 获取内部UUID
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SweepId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SweepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SweepId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// 一个批次：全局样本区间 `[start, stop)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    /// 批次序号（0 起）
    pub index: usize,
    /// 起始样本（含）
    pub start: usize,
    /// 结束样本（不含）
    pub stop: usize,
}

impl Batch {
    /// 样本数
    pub fn len(&self) -> usize {
        self.stop - self.start
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.stop == self.start
    }

    /// 全局样本区间
    pub fn samples(&self) -> Range<usize> {
        self.start..self.stop
    }

    /// (槽位局部索引, 全局样本索引)
    pub fn assignments(&self) -> impl Iterator<Item = (usize, usize)> {
        self.samples().enumerate()
    }
}

/// 将 `num_samples` 个样本划分为大小不超过 `pool_size` 的批次
pub fn partition(num_samples: usize, pool_size: usize) -> Vec<Batch> {
    if pool_size == 0 {
        return Vec::new();
    }
    (0..num_samples)
        .step_by(pool_size)
        .enumerate()
        .map(|(index, start)| Batch {
            index,
            start,
            stop: (start + pool_size).min(num_samples),
        })
        .collect()
}

/// 进度报告点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressMark {
    /// 已完成样本数
    pub completed: usize,
    /// 样本总数
    pub total: usize,
}

impl std::fmt::Display for ProgressMark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} of {} runs have been completed.", self.completed, self.total)
    }
}

/// 扫描状态
#[derive(Debug, Clone)]
pub struct SweepState {
    batches: Vec<Batch>,
    next: usize,
    completed: usize,
    total: usize,
    interval: Option<usize>,
    reported: usize,
    failures: Vec<SampleFailure>,
}

impl SweepState {
    /// 创建状态
    ///
    /// 样本数不超过槽位数时不报告进度，否则每跨过 `N / P` 的整数倍报告一次。
    pub fn new(num_samples: usize, pool_size: usize) -> Self {
        let interval = (pool_size > 0 && num_samples > pool_size).then(|| num_samples / pool_size);
        Self {
            batches: partition(num_samples, pool_size),
            next: 0,
            completed: 0,
            total: num_samples,
            interval,
            reported: 0,
            failures: Vec::new(),
        }
    }

    /// 全部批次
    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    /// 取出下一个批次
    pub fn next_batch(&mut self) -> Option<Batch> {
        let batch = self.batches.get(self.next).copied()?;
        self.next += 1;
        Some(batch)
    }

    /// 标记批次完成，跨过进度间隔时返回报告点
    pub fn complete_batch(&mut self, batch: &Batch) -> Option<ProgressMark> {
        self.completed += batch.len();
        let interval = self.interval?;
        let crossed = self.completed / interval;
        if crossed > self.reported {
            self.reported = crossed;
            Some(ProgressMark {
                completed: self.completed,
                total: self.total,
            })
        } else {
            None
        }
    }

    /// 记录样本级失败
    pub fn record_failure(&mut self, failure: SampleFailure) {
        self.failures.push(failure);
    }

    /// 样本级失败
    pub fn failures(&self) -> &[SampleFailure] {
        &self.failures
    }

    /// 取出全部失败记录
    pub fn into_failures(self) -> Vec<SampleFailure> {
        self.failures
    }

    /// 已完成样本数
    pub fn completed(&self) -> usize {
        self.completed
    }

    /// 样本总数
    pub fn total(&self) -> usize {
        self.total
    }

    /// 全部批次是否已取出
    pub fn is_done(&self) -> bool {
        self.next >= self.batches.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_covers_all_samples_once() {
        for (n, p) in [(25, 10), (10, 10), (3, 10), (1, 1), (100, 7), (0, 4)] {
            let batches = partition(n, p);
            assert_eq!(batches.len(), n.div_ceil(p));
            let covered: Vec<usize> = batches.iter().flat_map(|b| b.samples()).collect();
            assert_eq!(covered, (0..n).collect::<Vec<_>>());
            assert!(batches.iter().all(|b| b.len() <= p && !b.is_empty()));
        }
    }

    #[test]
    fn test_partition_sizes() {
        let sizes: Vec<usize> = partition(25, 10).iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![10, 10, 5]);
    }

    #[test]
    fn test_assignments() {
        let batch = partition(25, 10)[2];
        let pairs: Vec<_> = batch.assignments().collect();
        assert_eq!(pairs.first(), Some(&(0, 20)));
        assert_eq!(pairs.last(), Some(&(4, 24)));
    }

    #[test]
    fn test_progress_suppressed_for_small_sweeps() {
        let mut state = SweepState::new(8, 10);
        let batch = state.next_batch().unwrap();
        assert!(state.complete_batch(&batch).is_none());
        assert!(state.is_done());
    }

    #[test]
    fn test_progress_every_interval() {
        // interval = 25 / 10 = 2，每个批次都跨过至少一个倍数
        let mut state = SweepState::new(25, 10);
        let mut marks = Vec::new();
        while let Some(batch) = state.next_batch() {
            marks.extend(state.complete_batch(&batch));
        }
        let completed: Vec<usize> = marks.iter().map(|m| m.completed).collect();
        assert_eq!(completed, vec![10, 20, 25]);
        assert_eq!(marks[2].to_string(), "25 of 25 runs have been completed.");
    }

    #[test]
    fn test_sweep_id_parse() {
        let id = SweepId::new();
        let parsed: SweepId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }
}
