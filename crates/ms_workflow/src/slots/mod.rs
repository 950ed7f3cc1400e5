// crates/ms_workflow/src/slots/mod.rs

//! 槽位池管理
//!
//! - [`fs`]: 文件系统抽象 `SlotFs`（真实 / 内存）
//! - [`pool`]: 槽位池 `SlotPool`：初始化、参数场写入、清理

pub mod fs;
pub mod pool;

pub use fs::{MemoryFs, RealFs, SlotFs};
pub use pool::{
    EnsureOutcome, NoPreparation, Slot, SlotPool, SlotPreparer, StaticInput, StaticInputs,
    PREPARED_MARKER,
};
