// crates/ms_config/src/lib.rs

//! MariSweep Config Layer (Layer 2)
//!
//! 配置层，描述一次参数扫描的外部约定。
//!
//! # 模块概览
//!
//! - [`sweep_config`]: SweepConfig 扫描配置（槽位池、静态输入、启动命令、输出）
//! - [`error`]: 配置错误类型
//!
//! # 层级架构
//!
//! ```text
//! app:     ms_cli       ─> uses SweepConfig
//! Layer 5: ms_workflow  ─> SlotPool, SweepDriver
//! Layer 4: ms_analysis
//! Layer 3: ms_io
//! Layer 2: ms_config    ─> SweepConfig (本层)
//! Layer 1: ms_foundation
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod sweep_config;

/// 层级标识
pub const LAYER: u8 = 2;

// 重导出核心类型
pub use error::ConfigError;
pub use sweep_config::{
    CommandSpec, InputConfig, LaunchConfig, OutputsConfig, PoolConfig, SweepConfig,
};
