// apps/ms_cli/src/commands/mod.rs

//! 子命令

pub mod convert_time;
pub mod fix_dry;
pub mod inspect;
pub mod merge;
pub mod prepare;
pub mod teardown;
pub mod validate;

use anyhow::{Context, Result};
use ms_io::{CheckpointStore, ResultSet, DEFAULT_COMPRESSION_LEVEL};
use std::path::Path;

/// 加载检查点
pub fn load(path: &Path) -> Result<ResultSet> {
    ms_io::load_results(path).with_context(|| format!("无法加载检查点 {}", path.display()))
}

/// 保存检查点
pub fn save(path: &Path, results: &ResultSet) -> Result<()> {
    CheckpointStore::new(path, DEFAULT_COMPRESSION_LEVEL)
        .write(results)
        .with_context(|| format!("无法写入检查点 {}", path.display()))
}
