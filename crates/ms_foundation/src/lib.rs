// crates/ms_foundation/src/lib.rs

//! MariSweep Foundation Layer
//!
//! 基础层，提供整个工作区共享的错误类型。
//!
//! # 模块概览
//!
//! - [`error`]: 统一错误类型 `MsError` / `MsResult`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;

pub use error::{MsError, MsResult};
