// crates/ms_analysis/src/lib.rs

//! MariSweep Analysis Layer (Layer 4)
//!
//! 扫描结果的后处理。
//!
//! # 模块概览
//!
//! - [`dry`]: 干点修正（哨兵值 `-99999.0` → 参考高程修正 / 0.0 填充）
//! - [`units`]: 观测时间与淹没时长的单位换算
//! - [`qoi`]: 节点场到查询点的空间插值（QoI）
//! - [`error`]: 分析层错误类型

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dry;
pub mod error;
pub mod qoi;
pub mod units;

/// 层级标识
pub const LAYER: u8 = 4;

pub use dry::{
    correct_all, correct_dry_view, correct_kind, load_with_correction, ReferenceElevations,
    Topography, TopographyTable, CORRECTABLE, DRY_FILL, DRY_SENTINEL,
};
pub use error::{AnalysisError, AnalysisResult};
pub use qoi::{IdwConfig, IdwInterpolator, Point2, QoiSampler, SpatialInterpolator};
pub use units::{convert_times, convert_to_days, convert_to_hours, inundation_to_fraction, TimeUnit};
