// apps/ms_cli/src/commands/teardown.rs

//! 槽位池清理命令

use anyhow::{Context, Result};
use clap::Args;
use ms_config::SweepConfig;
use ms_workflow::{RealFs, SlotPool};
use std::path::PathBuf;
use std::sync::Arc;

/// 清理参数
#[derive(Args)]
pub struct TeardownArgs {
    /// 配置文件路径
    #[arg(short, long)]
    pub config: PathBuf,
}

/// 执行清理命令
pub fn execute(args: TeardownArgs) -> Result<()> {
    let config = SweepConfig::from_file(&args.config)
        .with_context(|| format!("配置无效: {}", args.config.display()))?;
    SlotPool::from_config(Arc::new(RealFs), &config)?.teardown()?;
    println!("已删除 {} 个槽位", config.pool.size);
    Ok(())
}
