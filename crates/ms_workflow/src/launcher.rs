// crates/ms_workflow/src/launcher.rs

//! 求解器启动
//!
//! 每个批次为每个占用的槽位启动一个子进程，全部启动后统一等待
//! （屏障）。设置超时后，截止时仍在运行的子进程被终止。

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use ms_config::{CommandSpec, LaunchConfig};

use crate::error::{SweepError, SweepResult};
use crate::slots::{Slot, SlotPreparer};

/// 单次求解器调用的退出情况
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReport {
    /// 正常退出
    Success,
    /// 非零退出或被信号终止
    Failed {
        /// 退出码（被信号终止时为 None）
        code: Option<i32>,
    },
    /// 超时被终止
    TimedOut,
    /// 无法启动
    SpawnFailed(String),
}

impl ExitReport {
    /// 由进程退出状态转换
    pub fn from_status(status: ExitStatus) -> Self {
        if status.success() {
            Self::Success
        } else {
            Self::Failed {
                code: status.code(),
            }
        }
    }

    /// 是否成功
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl std::fmt::Display for ExitReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "exited successfully"),
            Self::Failed { code: Some(code) } => write!(f, "exited with code {code}"),
            Self::Failed { code: None } => write!(f, "terminated by signal"),
            Self::TimedOut => write!(f, "timed out"),
            Self::SpawnFailed(reason) => write!(f, "could not be started: {reason}"),
        }
    }
}

/// 求解器启动器
///
/// 同时负责槽位一次性准备（[`SlotPreparer`]）。
pub trait SolverLauncher: SlotPreparer + Send + Sync {
    /// 批次启动前的准备步骤，`manifest` 为本批次槽位清单
    fn prepare_batch(&self, work_dir: &Path, manifest: &Path, slots: &[Slot]) -> SweepResult<()>;

    /// 某槽位的求解器命令 (程序, 参数)
    fn command_for(&self, slot: &Slot) -> (String, Vec<String>);

    /// 在槽位中启动求解器
    fn spawn(&self, slot: &Slot) -> io::Result<Child>;
}

// ============================================================
// 外部命令启动器
// ============================================================

/// 基于命令模板的启动器
///
/// 可用占位符：`{slot}`（槽位目录）、`{slot_id}`、`{procs}`，
/// 批次准备命令另有 `{manifest}` 与 `{num_slots}`。
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    solver: CommandSpec,
    slot_prepare: Option<CommandSpec>,
    batch_prepare: Option<CommandSpec>,
    num_procs: usize,
    quiet: bool,
}

impl CommandLauncher {
    /// 创建启动器
    pub fn new(solver: CommandSpec, num_procs: usize) -> Self {
        Self {
            solver,
            slot_prepare: None,
            batch_prepare: None,
            num_procs,
            quiet: true,
        }
    }

    /// 由配置创建
    pub fn from_config(launch: &LaunchConfig) -> Self {
        Self {
            solver: launch.solver.clone(),
            slot_prepare: launch.slot_prepare.clone(),
            batch_prepare: launch.batch_prepare.clone(),
            num_procs: launch.num_procs,
            quiet: !launch.screen_output,
        }
    }

    /// 设置槽位准备命令
    pub fn with_slot_prepare(mut self, command: CommandSpec) -> Self {
        self.slot_prepare = Some(command);
        self
    }

    /// 设置批次准备命令
    pub fn with_batch_prepare(mut self, command: CommandSpec) -> Self {
        self.batch_prepare = Some(command);
        self
    }

    /// 是否丢弃求解器输出
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    fn slot_vars(&self, slot: &Slot) -> Vec<(&'static str, String)> {
        vec![
            ("slot", slot.path.display().to_string()),
            ("slot_id", slot.id.to_string()),
            ("procs", self.num_procs.to_string()),
        ]
    }

    fn build(&self, cwd: &Path, program: &str, args: &[String]) -> Command {
        let mut command = Command::new(resolve_program(cwd, program));
        command.args(args).current_dir(cwd).stdin(Stdio::null());
        if self.quiet {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }
        command
    }

    fn run_to_completion(
        &self,
        cwd: &Path,
        command: &CommandSpec,
        vars: &[(&str, String)],
    ) -> SweepResult<()> {
        let (program, args) = command.render(vars);
        debug!(cwd = %cwd.display(), %program, ?args, "执行准备命令");
        let status = self
            .build(cwd, &program, &args)
            .status()
            .map_err(|e| SweepError::staging(cwd, format!("{program}: {e}")))?;
        if status.success() {
            Ok(())
        } else {
            Err(SweepError::staging(
                cwd,
                format!("{program} {}", ExitReport::from_status(status)),
            ))
        }
    }
}

impl SlotPreparer for CommandLauncher {
    fn prepare_slot(&self, slot: &Slot, num_procs: usize) -> SweepResult<()> {
        let Some(command) = &self.slot_prepare else {
            return Ok(());
        };
        let mut vars = self.slot_vars(slot);
        vars.retain(|(name, _)| *name != "procs");
        vars.push(("procs", num_procs.to_string()));
        self.run_to_completion(&slot.path, command, &vars)
    }
}

impl SolverLauncher for CommandLauncher {
    fn prepare_batch(&self, work_dir: &Path, manifest: &Path, slots: &[Slot]) -> SweepResult<()> {
        let Some(command) = &self.batch_prepare else {
            return Ok(());
        };
        let vars = [
            ("manifest", manifest.display().to_string()),
            ("num_slots", slots.len().to_string()),
            ("procs", self.num_procs.to_string()),
        ];
        self.run_to_completion(work_dir, command, &vars)
    }

    fn command_for(&self, slot: &Slot) -> (String, Vec<String>) {
        self.solver.render(&self.slot_vars(slot))
    }

    fn spawn(&self, slot: &Slot) -> io::Result<Child> {
        let (program, args) = self.command_for(slot);
        self.build(&slot.path, &program, &args).spawn()
    }
}

/// 含路径分隔符的相对程序名以工作目录为基准解析
fn resolve_program(cwd: &Path, program: &str) -> PathBuf {
    let path = Path::new(program);
    if path.is_relative() && path.components().count() > 1 {
        cwd.join(path)
    } else {
        path.to_path_buf()
    }
}

// ============================================================
// 批次执行
// ============================================================

/// 启动全部槽位并等待（屏障）
///
/// 返回与 `slots` 一一对应的退出情况。`timeout` 为 None 时无限等待。
pub fn run_batch(
    launcher: &dyn SolverLauncher,
    slots: &[Slot],
    timeout: Option<Duration>,
    poll_interval: Duration,
) -> Vec<ExitReport> {
    let mut reports: Vec<Option<ExitReport>> = vec![None; slots.len()];
    let mut children: Vec<Option<Child>> = Vec::with_capacity(slots.len());

    for (i, slot) in slots.iter().enumerate() {
        match launcher.spawn(slot) {
            Ok(child) => children.push(Some(child)),
            Err(e) => {
                warn!(slot = slot.id, error = %e, "求解器无法启动");
                reports[i] = Some(ExitReport::SpawnFailed(e.to_string()));
                children.push(None);
            }
        }
    }

    let deadline = timeout.map(|t| Instant::now() + t);
    loop {
        let mut pending = false;
        for (i, entry) in children.iter_mut().enumerate() {
            let Some(child) = entry.as_mut() else { continue };
            match child.try_wait() {
                Ok(Some(status)) => {
                    reports[i] = Some(ExitReport::from_status(status));
                    *entry = None;
                }
                Ok(None) => pending = true,
                Err(e) => {
                    warn!(slot = slots[i].id, error = %e, "无法查询子进程状态");
                    terminate(child, slots[i].id);
                    reports[i] = Some(ExitReport::Failed { code: None });
                    *entry = None;
                }
            }
        }

        if !pending {
            break;
        }

        if deadline.is_some_and(|d| Instant::now() >= d) {
            for (i, entry) in children.iter_mut().enumerate() {
                if let Some(mut child) = entry.take() {
                    warn!(slot = slots[i].id, "批次超时，终止求解器");
                    terminate(&mut child, slots[i].id);
                    reports[i] = Some(ExitReport::TimedOut);
                }
            }
            break;
        }

        std::thread::sleep(poll_interval);
    }

    reports
        .into_iter()
        .map(|r| r.unwrap_or(ExitReport::Failed { code: None }))
        .collect()
}

/// 终止并回收子进程，失败只记录日志
fn terminate(child: &mut Child, slot: usize) {
    if let Err(e) = child.kill() {
        warn!(slot, pid = child.id(), error = %e, "无法终止求解器");
    }
    if let Err(e) = child.wait() {
        warn!(slot, pid = child.id(), error = %e, "无法回收求解器进程");
    }
}
