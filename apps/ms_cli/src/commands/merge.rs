// apps/ms_cli/src/commands/merge.rs

//! 检查点拼接命令
//!
//! 按给定顺序沿样本轴拼接多个分片检查点。

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tracing::info;

/// 拼接参数
#[derive(Args)]
pub struct MergeArgs {
    /// 输出检查点
    #[arg(short, long)]
    pub output: PathBuf,

    /// 分片检查点（按顺序）
    #[arg(required = true, num_args = 2..)]
    pub shards: Vec<PathBuf>,
}

/// 执行拼接命令
pub fn execute(args: MergeArgs) -> Result<()> {
    let shards = args
        .shards
        .iter()
        .map(|path| super::load(path))
        .collect::<Result<Vec<_>>>()?;

    let merged = ms_io::concatenate_all(shards).context("分片形状不一致")?;
    super::save(&args.output, &merged)?;

    info!(
        shards = args.shards.len(),
        samples = merged.num_samples(),
        output = %args.output.display(),
        "检查点已拼接"
    );
    Ok(())
}
