// apps/ms_cli/src/commands/convert_time.rs

//! 观测时间单位换算命令

use anyhow::Result;
use clap::Args;
use ms_analysis::{convert_times, inundation_to_fraction, TimeUnit};
use std::path::PathBuf;

/// 换算参数
#[derive(Args)]
pub struct ConvertTimeArgs {
    /// 检查点文件
    pub checkpoint: PathBuf,

    /// 原单位 (seconds, hours, days)
    #[arg(long, default_value = "seconds")]
    pub from: TimeUnit,

    /// 目标单位 (seconds, hours, days)
    #[arg(long, default_value = "hours")]
    pub to: TimeUnit,

    /// 同时将 tinun63 换算为占模拟天数的比例
    #[arg(long)]
    pub run_days: Option<f64>,

    /// 输出检查点，默认覆盖输入
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// 执行换算命令
pub fn execute(args: ConvertTimeArgs) -> Result<()> {
    let mut results = super::load(&args.checkpoint)?;
    convert_times(&mut results, args.from, args.to);
    if let Some(days) = args.run_days {
        inundation_to_fraction(&mut results, days)?;
    }

    let output = args.output.as_ref().unwrap_or(&args.checkpoint);
    super::save(output, &results)?;
    println!("{} → {}: {}", args.from, args.to, output.display());
    Ok(())
}
