// apps/ms_cli/src/commands/prepare.rs

//! 槽位池初始化命令
//!
//! 创建槽位目录、链接静态输入并执行一次性准备命令，
//! 便于在正式扫描前检查槽位布局。

use anyhow::{Context, Result};
use clap::Args;
use ms_config::SweepConfig;
use ms_workflow::{CommandLauncher, EnsureOutcome, RealFs, SlotPool};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// 初始化参数
#[derive(Args)]
pub struct PrepareArgs {
    /// 配置文件路径
    #[arg(short, long)]
    pub config: PathBuf,
}

/// 执行初始化命令
pub fn execute(args: PrepareArgs) -> Result<()> {
    let config = SweepConfig::from_file(&args.config)
        .with_context(|| format!("配置无效: {}", args.config.display()))?;
    let pool = SlotPool::from_config(Arc::new(RealFs), &config)?;
    let launcher = CommandLauncher::from_config(&config.launch);

    let outcomes = pool.initialize(&launcher)?;
    for (slot, outcome) in &outcomes {
        let label = match outcome {
            EnsureOutcome::Unchanged => "unchanged".to_string(),
            EnsureOutcome::Created => "created".to_string(),
            EnsureOutcome::Repaired { replaced } => format!("repaired ({replaced} links)"),
        };
        println!("{:>4}  {}  {}", slot.id, slot.path.display(), label);
    }
    info!(slots = outcomes.len(), "槽位池就绪");
    Ok(())
}
