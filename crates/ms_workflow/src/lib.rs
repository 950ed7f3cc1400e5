// crates/ms_workflow/src/lib.rs

//! MariSweep 工作流模块 (Layer 5)
//!
//! 在固定数量的工作目录（槽位）上批量运行外部求解器，
//! 完成参数扫描并持续写入检查点。
//!
//! # 模块结构
//!
//! - [`slots`]: 槽位池与文件系统抽象
//! - [`collaborators`]: 参数场生成与输出采集接口
//! - [`batch`]: 批次划分与扫描状态
//! - [`manifest`]: 批次清单与运行脚本
//! - [`launcher`]: 求解器启动与屏障等待
//! - [`events`]: 事件系统
//! - [`driver`]: 扫描驱动
//!
//! # 示例
//!
//! ```rust,ignore
//! use ms_workflow::{RealFs, SweepDriver};
//!
//! let config = SweepConfig::from_file("sweep.json")?;
//! let driver = SweepDriver::from_config(&config, Arc::new(RealFs), synthesizer, collector)?;
//! let outcome = driver.run_points(samples, &[OutputKind::MaxEle63], |k| grid.shape_of(k, 0))?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod collaborators;
pub mod driver;
pub mod error;
pub mod events;
pub mod launcher;
pub mod manifest;
pub mod slots;

/// 层级标识
pub const LAYER: u8 = 5;

// 重导出核心类型
pub use batch::{partition, Batch, ProgressMark, SweepId, SweepState};
pub use collaborators::{
    combine, BasisCombination, BasisVector, CollectedSample, FieldArtifact, FieldSynthesizer,
    OutputCollector,
};
pub use driver::{configured_kinds, DriverOptions, SweepDriver, SweepOutcome};
pub use error::{SampleFailure, SweepError, SweepResult};
pub use events::{EventDispatcher, EventListener, FnListener, LoggingListener, SweepEvent};
pub use launcher::{run_batch, CommandLauncher, ExitReport, SolverLauncher};
pub use manifest::{BatchManifest, RunScript, MANIFEST_NAME, RUN_SCRIPT_NAME};
pub use slots::{
    EnsureOutcome, MemoryFs, NoPreparation, RealFs, Slot, SlotFs, SlotPool, SlotPreparer,
    StaticInput, StaticInputs,
};
