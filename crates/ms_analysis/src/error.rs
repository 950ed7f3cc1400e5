// crates/ms_analysis/src/error.rs
//! 分析层错误类型

use thiserror::Error;
use ms_foundation::MsError;
use ms_io::{IoError, OutputKind};

/// 分析层结果类型别名
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// 分析错误枚举
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// 重复修正
    #[error("{0} 已做过干点修正，重复修正会再次叠加参考高程")]
    AlreadyCorrected(OutputKind),

    /// 不支持修正的输出类型
    #[error("{0} 不支持干点修正")]
    NotCorrectable(OutputKind),

    /// 结果集中缺少该输出
    #[error("结果集中缺少输出: {0}")]
    KindMissing(OutputKind),

    /// 缺少参考高程
    #[error("缺少 {0} 的参考高程")]
    MissingReference(OutputKind),

    /// 位置编号越界（编号从 1 开始）
    #[error("位置编号 {id} 超出范围 1..={locations}")]
    LocationOutOfRange {
        /// 1 起编号
        id: usize,
        /// 位置总数
        locations: usize,
    },

    /// 长度不匹配
    #[error("长度不匹配: {name} 期望 {expected}, 实际 {actual}")]
    SizeMismatch {
        /// 数据名称
        name: &'static str,
        /// 期望长度
        expected: usize,
        /// 实际长度
        actual: usize,
    },

    /// 参数无效
    #[error("参数无效: {0}")]
    InvalidArgument(String),

    /// 地形表读取失败
    #[error("地形表读取失败: {0}")]
    Topography(String),

    /// IO 层错误
    #[error(transparent)]
    Io(#[from] IoError),
}

impl From<AnalysisError> for MsError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::LocationOutOfRange { id, locations } => {
                MsError::index_out_of_bounds("location", id, locations + 1)
            }
            AnalysisError::SizeMismatch { name, expected, actual } => {
                MsError::size_mismatch(name, expected, actual)
            }
            AnalysisError::Io(e) => e.into(),
            other => MsError::invalid_input(other.to_string()),
        }
    }
}
