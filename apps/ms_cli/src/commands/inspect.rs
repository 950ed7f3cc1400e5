// apps/ms_cli/src/commands/inspect.rs

//! 检查点查看命令

use anyhow::Result;
use clap::Args;
use ms_io::SampleStatus;
use std::path::PathBuf;

/// 查看参数
#[derive(Args)]
pub struct InspectArgs {
    /// 检查点文件
    pub checkpoint: PathBuf,

    /// 列出每个样本的状态
    #[arg(long)]
    pub samples: bool,
}

/// 执行查看命令
pub fn execute(args: InspectArgs) -> Result<()> {
    let results = super::load(&args.checkpoint)?;

    println!("=== {} ===", args.checkpoint.display());
    println!("样本数: {}", results.num_samples());
    println!("基函数维数: {}", results.basis_dim());

    for kind in results.kinds() {
        let shape = results.view(kind).map(|v| v.shape().to_vec()).unwrap_or_default();
        let mut line = format!("  {:<10} {:?}", kind.key(), shape);
        if let Some(times) = results.times().get(&kind) {
            line.push_str(&format!("  times[{}]", times.len()));
        }
        if results.is_corrected(kind) {
            line.push_str("  (dry-corrected)");
        }
        println!("{line}");
    }
    if let Some(q) = results.qoi() {
        println!("  {:<10} {:?}", ms_io::results::QOI_KEY, q.shape());
    }

    println!("状态:");
    for status in [
        SampleStatus::Pending,
        SampleStatus::Completed,
        SampleStatus::RunFailed,
        SampleStatus::TimedOut,
        SampleStatus::CollectFailed,
    ] {
        let count = results.count_status(status);
        if count > 0 {
            println!("  {:<15} {count}", status.to_string());
        }
    }

    if args.samples {
        for (i, status) in results.statuses().iter().enumerate() {
            println!("{i:>6}  {status}");
        }
    }
    Ok(())
}
