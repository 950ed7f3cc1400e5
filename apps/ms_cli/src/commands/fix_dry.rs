// apps/ms_cli/src/commands/fix_dry.rs

//! 干点修正命令

use anyhow::{Context, Result};
use clap::Args;
use ms_analysis::{load_with_correction, TopographyTable};
use std::path::PathBuf;

/// 修正参数
#[derive(Args)]
pub struct FixDryArgs {
    /// 检查点文件
    pub checkpoint: PathBuf,

    /// 参考高程 JSON（`nodes` / `elevation_stations`）
    #[arg(short, long)]
    pub topography: PathBuf,

    /// 输出检查点，默认覆盖输入
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// 执行修正命令
pub fn execute(args: FixDryArgs) -> Result<()> {
    let topo = TopographyTable::from_file(&args.topography)
        .with_context(|| format!("无法读取参考高程 {}", args.topography.display()))?;
    let results = load_with_correction(&args.checkpoint, Some(&topo))?;

    let output = args.output.as_ref().unwrap_or(&args.checkpoint);
    super::save(output, &results)?;

    let corrected: Vec<&str> = results.corrected().iter().map(|k| k.key()).collect();
    println!("已修正: {}", corrected.join(", "));
    Ok(())
}
