// crates/ms_io/src/lib.rs

//! MariSweep IO 模块 (Layer 3)
//!
//! 扫描结果的数据模型与持久化。
//!
//! # 模块
//!
//! - [`kinds`]: 输出类型注册表 `OutputKind` 与形状 `KindShape`
//! - [`results`]: 结果累加器 `ResultSet`（写一次语义）与样本状态
//! - [`checkpoint`]: 检查点保存/恢复与备份轮换
//! - [`merge`]: 沿样本轴拼接结果集
//! - [`error`]: IO 层错误类型
//!
//! # 使用示例
//!
//! ```rust,ignore
//! use ms_io::{CheckpointStore, KindShape, OutputKind, ResultSet};
//!
//! let mut results = ResultSet::allocate(samples, &[OutputKind::MaxEle63], |_| KindShape::nodal(n))?;
//! results.record(0, OutputKind::MaxEle63, maxele.view().into_dyn())?;
//!
//! let store = CheckpointStore::new("sweep/sweep.msck", 3);
//! store.write(&results)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod error;
pub mod kinds;
pub mod merge;
pub mod results;

/// 层级标识
pub const LAYER: u8 = 3;

// 重导出常用类型
pub use checkpoint::{
    load_results, rotate_existing, Checkpoint, CheckpointError, CheckpointStore,
    DEFAULT_COMPRESSION_LEVEL,
};
pub use error::{IoError, IoResult};
pub use kinds::{GridDims, KindShape, LocationKind, OutputKind};
pub use merge::{concatenate, concatenate_all};
pub use results::{ResultParts, ResultSet, SampleStatus};
