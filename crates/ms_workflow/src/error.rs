// crates/ms_workflow/src/error.rs

//! 工作流错误类型
//!
//! [`SweepError`] 中止整个扫描；[`SampleFailure`] 只记录在单个样本上，
//! 扫描继续进行。

use std::path::PathBuf;
use thiserror::Error;

use ms_analysis::AnalysisError;
use ms_config::ConfigError;
use ms_foundation::MsError;
use ms_io::{CheckpointError, IoError};

/// 工作流结果类型
pub type SweepResult<T> = Result<T, SweepError>;

/// 扫描级错误（中止扫描）
#[derive(Debug, Error)]
pub enum SweepError {
    /// 配置错误
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 缺少静态输入
    #[error("Missing static input: {0}")]
    MissingStaticInput(PathBuf),

    /// 槽位准备或参数场写入失败
    #[error("Staging failed for {path}: {message}")]
    Staging {
        /// 槽位或文件路径
        path: PathBuf,
        /// 错误信息
        message: String,
    },

    /// 检查点写入失败
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// 结果集错误
    #[error("Result set error: {0}")]
    Results(#[from] IoError),

    /// 后处理错误
    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    /// 文件系统错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SweepError {
    /// 槽位写入失败
    pub fn staging(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Staging {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

impl From<ConfigError> for SweepError {
    fn from(err: ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl From<SweepError> for MsError {
    fn from(err: SweepError) -> Self {
        match err {
            SweepError::Configuration(msg) => MsError::config(msg),
            SweepError::MissingStaticInput(path) => MsError::file_not_found(path),
            SweepError::Staging { path, message } => {
                MsError::io(format!("{}: {message}", path.display()))
            }
            SweepError::Checkpoint(e) => IoError::from(e).into(),
            SweepError::Results(e) => e.into(),
            SweepError::Analysis(e) => e.into(),
            SweepError::Io(e) => e.into(),
        }
    }
}

/// 样本级失败（记录后继续）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SampleFailure {
    /// 求解器非零退出或无法启动
    #[error("sample {sample}: run failed ({reason})")]
    RunFailure {
        /// 样本全局索引
        sample: usize,
        /// 原因
        reason: String,
    },

    /// 批次超时被终止
    #[error("sample {sample}: slot {slot} timed out")]
    SlotTimeout {
        /// 样本全局索引
        sample: usize,
        /// 槽位编号
        slot: usize,
    },

    /// 输出采集失败
    #[error("sample {sample}: collection failed ({reason})")]
    CollectionError {
        /// 样本全局索引
        sample: usize,
        /// 原因
        reason: String,
    },
}

impl SampleFailure {
    /// 样本全局索引
    pub fn sample(&self) -> usize {
        match self {
            Self::RunFailure { sample, .. }
            | Self::SlotTimeout { sample, .. }
            | Self::CollectionError { sample, .. } => *sample,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_maps_to_configuration() {
        let err: SweepError = ConfigError::invalid("pool.size", 0, "必须为正").into();
        assert!(matches!(err, SweepError::Configuration(_)));
        let ms: MsError = err.into();
        assert!(ms.is_config());
    }

    #[test]
    fn test_failure_sample_index() {
        let failure = SampleFailure::SlotTimeout { sample: 12, slot: 3 };
        assert_eq!(failure.sample(), 12);
        assert!(failure.to_string().contains("timed out"));
    }
}
