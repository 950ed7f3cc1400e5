// apps/ms_cli/src/commands/validate.rs

//! 配置验证命令

use anyhow::{Context, Result};
use clap::Args;
use ms_config::SweepConfig;
use ms_workflow::configured_kinds;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// 验证参数
#[derive(Args)]
pub struct ValidateArgs {
    /// 配置文件路径
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 将默认配置写入该路径
    #[arg(long)]
    pub write_default: Option<PathBuf>,
}

/// 执行验证命令
pub fn execute(args: ValidateArgs) -> Result<()> {
    if let Some(path) = &args.write_default {
        SweepConfig::default()
            .save_to_file(path)
            .with_context(|| format!("无法写入 {}", path.display()))?;
        info!(path = %path.display(), "默认配置已写入");
    }

    let Some(path) = &args.config else {
        return Ok(());
    };
    let config = SweepConfig::from_file(path).with_context(|| format!("配置无效: {}", path.display()))?;

    let mut missing = 0;
    for (name, source) in config.inputs.static_inputs() {
        if !source.exists() {
            warn!(name = %name, source = %source.display(), "静态输入不存在");
            missing += 1;
        }
    }

    let kinds = configured_kinds(&config.outputs)
        .with_context(|| format!("输出配置无效: {}", path.display()))?;
    for kind in &kinds {
        info!(kind = %kind, time_series = kind.is_time_series(), "输出类型");
    }

    println!("名称: {}", config.name);
    println!("槽位: {} × {}", config.pool.size, config.launch.num_procs);
    println!("检查点: {}", display(&config.checkpoint_path()));
    println!("输出: {}", kinds.iter().map(|k| k.key()).collect::<Vec<_>>().join(", "));
    println!("求解器: {} {}", config.launch.solver.program, config.launch.solver.args.join(" "));
    if missing > 0 {
        println!("缺少 {missing} 个静态输入");
    } else {
        println!("配置有效");
    }
    Ok(())
}

fn display(path: &Path) -> String {
    path.display().to_string()
}
