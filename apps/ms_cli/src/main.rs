// apps/ms_cli/src/main.rs

//! MariSweep 命令行界面
//!
//! 槽位池维护与检查点后处理工具。扫描本身需要求解器输出解析器，
//! 由嵌入 `ms_workflow::SweepDriver` 的程序提供。

mod commands;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// MariSweep 参数扫描命令行工具
#[derive(Parser)]
#[command(name = "ms_cli")]
#[command(author = "MariHydro Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "MariSweep parameter sweep tools", long_about = None)]
struct Cli {
    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 验证配置
    Validate(commands::validate::ValidateArgs),
    /// 初始化槽位池
    Prepare(commands::prepare::PrepareArgs),
    /// 删除槽位池
    Teardown(commands::teardown::TeardownArgs),
    /// 显示检查点内容
    Inspect(commands::inspect::InspectArgs),
    /// 沿样本轴拼接检查点
    Merge(commands::merge::MergeArgs),
    /// 干点修正
    FixDry(commands::fix_dry::FixDryArgs),
    /// 观测时间单位换算
    ConvertTime(commands::convert_time::ConvertTimeArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Validate(args) => commands::validate::execute(args),
        Commands::Prepare(args) => commands::prepare::execute(args),
        Commands::Teardown(args) => commands::teardown::execute(args),
        Commands::Inspect(args) => commands::inspect::execute(args),
        Commands::Merge(args) => commands::merge::execute(args),
        Commands::FixDry(args) => commands::fix_dry::execute(args),
        Commands::ConvertTime(args) => commands::convert_time::execute(args),
    }
}
