// crates/ms_io/src/error.rs
//! IO 层错误类型定义
//!
//! 结果集、检查点与合并操作的统一错误枚举。
//! 所有错误最终可转换为 MsError 以实现跨层错误传递。

use thiserror::Error;
use ms_foundation::MsError;

use crate::checkpoint::CheckpointError;
use crate::kinds::OutputKind;

/// IO 层结果类型别名
pub type IoResult<T> = Result<T, IoError>;

/// IO 错误枚举
#[derive(Error, Debug)]
pub enum IoError {
    /// 未知输出类型
    #[error("未知输出类型: {0}")]
    UnknownKind(String),

    /// 输出类型未分配
    #[error("输出类型未分配: {0}")]
    KindNotAllocated(OutputKind),

    /// 样本已写入
    #[error("样本已写入: {kind} 第 {sample} 个样本")]
    AlreadyRecorded {
        /// 输出类型（或 `Q`）
        kind: String,
        /// 样本全局索引
        sample: usize,
    },

    /// 样本索引越界
    #[error("样本索引越界: {sample} 超出 0..{num_samples}")]
    SampleOutOfRange {
        /// 样本索引
        sample: usize,
        /// 样本总数
        num_samples: usize,
    },

    /// 单样本数据形状不匹配
    #[error("数据形状不匹配: {kind} 期望 {expected:?}, 实际 {actual:?}")]
    ShapeMismatch {
        /// 输出类型
        kind: String,
        /// 期望形状
        expected: Vec<usize>,
        /// 实际形状
        actual: Vec<usize>,
    },

    /// 合并前置条件不满足
    #[error("合并失败: {key} 左侧 {left:?}, 右侧 {right:?}")]
    MergeShapeMismatch {
        /// 出错的键
        key: String,
        /// 左侧形状（键缺失时为空）
        left: Vec<usize>,
        /// 右侧形状（键缺失时为空）
        right: Vec<usize>,
    },

    /// 检查点错误
    #[error("检查点错误: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// 基础层错误转换
    #[error("基础层错误: {0}")]
    Foundation(#[from] MsError),
}

impl IoError {
    /// 合并不匹配
    pub fn merge_mismatch(key: impl Into<String>, left: &[usize], right: &[usize]) -> Self {
        Self::MergeShapeMismatch {
            key: key.into(),
            left: left.to_vec(),
            right: right.to_vec(),
        }
    }
}

impl From<IoError> for MsError {
    fn from(err: IoError) -> Self {
        match err {
            IoError::UnknownKind(key) => MsError::invalid_input(format!("未知输出类型: {key}")),
            IoError::KindNotAllocated(kind) => MsError::not_found(format!("输出类型 {kind}")),
            IoError::AlreadyRecorded { kind, sample } => {
                MsError::invalid_input(format!("样本已写入 [{kind}]: {sample}"))
            }
            IoError::SampleOutOfRange { sample, num_samples } => {
                MsError::index_out_of_bounds("sample", sample, num_samples)
            }
            IoError::ShapeMismatch { kind, expected, actual } => {
                MsError::invalid_input(format!("数据形状不匹配 [{kind}]: 期望 {expected:?}, 实际 {actual:?}"))
            }
            IoError::MergeShapeMismatch { key, left, right } => {
                MsError::invalid_input(format!("合并失败 [{key}]: {left:?} vs {right:?}"))
            }
            IoError::Checkpoint(CheckpointError::Io(e)) => {
                MsError::io_with_source("检查点读写失败", e)
            }
            IoError::Checkpoint(e) => MsError::serialization(e.to_string()),
            IoError::Foundation(ms_err) => ms_err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_recorded_display() {
        let err = IoError::AlreadyRecorded {
            kind: "fort61".into(),
            sample: 7,
        };
        let msg = err.to_string();
        assert!(msg.contains("fort61"));
        assert!(msg.contains('7'));
    }

    #[test]
    fn test_into_ms_error() {
        let err: MsError = IoError::SampleOutOfRange {
            sample: 9,
            num_samples: 3,
        }
        .into();
        assert!(matches!(err, MsError::IndexOutOfBounds { index: 9, len: 3, .. }));
    }
}
