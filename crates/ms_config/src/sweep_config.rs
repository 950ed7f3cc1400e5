// crates/ms_config/src/sweep_config.rs

//! SweepConfig - 参数扫描配置
//!
//! 描述一次扫描所需的全部外部约定：槽位池规模、静态输入、
//! 求解器启动命令以及需要采集的输出类型。配置以 JSON 存储。

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// 扫描配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// 扫描名称（仅用于日志）
    #[serde(default = "default_name")]
    pub name: String,

    /// 槽位池配置
    #[serde(default)]
    pub pool: PoolConfig,

    /// 静态输入配置
    #[serde(default)]
    pub inputs: InputConfig,

    /// 求解器启动配置
    #[serde(default)]
    pub launch: LaunchConfig,

    /// 输出与检查点配置
    #[serde(default)]
    pub outputs: OutputsConfig,
}

fn default_name() -> String { "sweep".to_string() }

/// 槽位池配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// 槽位目录与检查点所在目录
    #[serde(default = "default_save_dir")]
    pub save_dir: PathBuf,

    /// 槽位数量（同时运行的求解器实例数）
    #[serde(default = "default_pool_size")]
    pub size: usize,

    /// 槽位目录名前缀，目录名为 `<prefix><id>`，id 从 1 开始
    #[serde(default = "default_slot_prefix")]
    pub slot_prefix: String,

    /// 扫描结束后是否删除全部槽位目录
    #[serde(default = "default_true")]
    pub cleanup: bool,
}

fn default_save_dir() -> PathBuf { PathBuf::from("sweep") }
fn default_pool_size() -> usize { 10 }
fn default_slot_prefix() -> String { "RF_directory_".to_string() }
fn default_true() -> bool { true }

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            save_dir: default_save_dir(),
            size: default_pool_size(),
            slot_prefix: default_slot_prefix(),
            cleanup: true,
        }
    }
}

impl PoolConfig {
    /// 第 `id` 个槽位（1 起）的目录
    pub fn slot_dir(&self, id: usize) -> PathBuf {
        self.save_dir.join(format!("{}{}", self.slot_prefix, id))
    }
}

/// 静态输入配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// 网格与运行配置文件目录
    #[serde(default)]
    pub grid_dir: PathBuf,

    /// 求解器可执行文件目录
    #[serde(default)]
    pub base_dir: PathBuf,

    /// `grid_dir` 中需要链接进每个槽位的文件
    #[serde(default = "default_static_files")]
    pub static_files: Vec<String>,

    /// `base_dir` 中需要链接进每个槽位的可执行文件
    #[serde(default = "default_executables")]
    pub executables: Vec<String>,

    /// 每个样本写入槽位的参数场文件名
    #[serde(default = "default_artifact_name")]
    pub artifact_name: String,
}

fn default_static_files() -> Vec<String> {
    vec!["fort.14".to_string(), "fort.15".to_string()]
}
fn default_executables() -> Vec<String> {
    vec!["padcirc".to_string(), "adcprep".to_string()]
}
fn default_artifact_name() -> String { "fort.13".to_string() }

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            grid_dir: PathBuf::new(),
            base_dir: PathBuf::new(),
            static_files: default_static_files(),
            executables: default_executables(),
            artifact_name: default_artifact_name(),
        }
    }
}

impl InputConfig {
    /// 全部静态输入：(槽位内文件名, 源路径)
    pub fn static_inputs(&self) -> Vec<(String, PathBuf)> {
        let files = self
            .static_files
            .iter()
            .map(|name| (name.clone(), self.grid_dir.join(name)));
        let exes = self
            .executables
            .iter()
            .map(|name| (name.clone(), self.base_dir.join(name)));
        files.chain(exes).collect()
    }
}

/// 外部命令模板
///
/// 参数中的 `{slot}`、`{slot_id}`、`{procs}` 等占位符在启动时替换。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// 程序
    pub program: String,
    /// 参数模板
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    /// 创建命令
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// 追加参数
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// 替换占位符，返回 (程序, 参数)
    pub fn render(&self, vars: &[(&str, String)]) -> (String, Vec<String>) {
        let subst = |text: &str| {
            vars.iter().fold(text.to_string(), |acc, (name, value)| {
                acc.replace(&format!("{{{name}}}"), value)
            })
        };
        (subst(&self.program), self.args.iter().map(|a| subst(a)).collect())
    }
}

/// 求解器启动配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchConfig {
    /// 求解器命令，工作目录为槽位目录
    #[serde(default = "default_solver")]
    pub solver: CommandSpec,

    /// 槽位首次使用前执行一次的准备命令（如网格分区）
    #[serde(default)]
    pub slot_prepare: Option<CommandSpec>,

    /// 每批次启动前执行的准备命令，工作目录为 `save_dir`，
    /// 可通过 `{manifest}` 引用本批次槽位清单
    #[serde(default)]
    pub batch_prepare: Option<CommandSpec>,

    /// 每个求解器实例使用的进程数
    #[serde(default = "default_num_procs")]
    pub num_procs: usize,

    /// 批次屏障等待超时 [秒]，0 表示不限
    #[serde(default)]
    pub timeout_secs: u64,

    /// 子进程状态轮询间隔 [毫秒]
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// 是否保留求解器的屏幕输出
    #[serde(default)]
    pub screen_output: bool,
}

fn default_solver() -> CommandSpec {
    CommandSpec::new("./padcirc")
        .arg("-I")
        .arg("{slot}")
        .arg("-O")
        .arg("{slot}")
}
fn default_num_procs() -> usize { 12 }
fn default_poll_interval() -> u64 { 200 }

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            solver: default_solver(),
            slot_prepare: None,
            batch_prepare: None,
            num_procs: default_num_procs(),
            timeout_secs: 0,
            poll_interval_ms: default_poll_interval(),
            screen_output: false,
        }
    }
}

impl LaunchConfig {
    /// 批次超时
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    /// 轮询间隔
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// 输出与检查点配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputsConfig {
    /// 需要采集的时间序列输出（检查点键名，如 `fort61`；也接受 `fort.61`）
    #[serde(default = "default_time_series")]
    pub time_series: Vec<String>,

    /// 需要采集的非时间序列输出（如 `maxele63`）
    #[serde(default = "default_non_time_series")]
    pub non_time_series: Vec<String>,

    /// 检查点文件名（位于 `pool.save_dir`）
    #[serde(default = "default_save_file")]
    pub save_file: String,

    /// zstd 压缩级别
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,
}

fn default_time_series() -> Vec<String> { vec!["fort61".to_string()] }
fn default_non_time_series() -> Vec<String> { vec!["maxele63".to_string()] }
fn default_save_file() -> String { "sweep.msck".to_string() }
fn default_compression_level() -> i32 { 3 }

impl OutputsConfig {
    /// 全部输出名（时间序列在前）
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.time_series
            .iter()
            .chain(&self.non_time_series)
            .map(String::as_str)
    }

    /// 名称不能为空，去掉 `.` 后不能重复
    ///
    /// 名称能否解析为输出类型由工作流层检查。
    fn validate_names(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::BTreeSet::new();
        for name in self.names() {
            if name.trim().is_empty() {
                return Err(ConfigError::invalid("outputs", name, "输出名不能为空"));
            }
            let normalized: String = name.chars().filter(|c| *c != '.').collect();
            if !seen.insert(normalized) {
                return Err(ConfigError::invalid("outputs", name, "输出重复"));
            }
        }
        Ok(())
    }
}

impl Default for OutputsConfig {
    fn default() -> Self {
        Self {
            time_series: default_time_series(),
            non_time_series: default_non_time_series(),
            save_file: default_save_file(),
            compression_level: default_compression_level(),
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            pool: PoolConfig::default(),
            inputs: InputConfig::default(),
            launch: LaunchConfig::default(),
            outputs: OutputsConfig::default(),
        }
    }
}

impl SweepConfig {
    /// 从文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;

        let config: SweepConfig =
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// 检查点文件完整路径
    pub fn checkpoint_path(&self) -> PathBuf {
        self.pool.save_dir.join(&self.outputs.save_file)
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool.size == 0 {
            return Err(ConfigError::invalid("pool.size", self.pool.size, "槽位数必须为正"));
        }

        if self.pool.slot_prefix.is_empty() || self.pool.slot_prefix.contains('/') {
            return Err(ConfigError::invalid(
                "pool.slot_prefix",
                &self.pool.slot_prefix,
                "前缀不能为空且不能包含路径分隔符",
            ));
        }

        if self.inputs.artifact_name.is_empty() {
            return Err(ConfigError::Missing("inputs.artifact_name".to_string()));
        }

        if self.inputs.static_inputs().iter().any(|(name, _)| *name == self.inputs.artifact_name) {
            return Err(ConfigError::invalid(
                "inputs.artifact_name",
                &self.inputs.artifact_name,
                "参数场文件不能同时作为共享静态输入",
            ));
        }

        if self.launch.solver.program.is_empty() {
            return Err(ConfigError::Missing("launch.solver.program".to_string()));
        }

        if self.launch.num_procs == 0 {
            return Err(ConfigError::invalid("launch.num_procs", self.launch.num_procs, "进程数必须为正"));
        }

        if self.launch.poll_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "launch.poll_interval_ms",
                self.launch.poll_interval_ms,
                "轮询间隔必须为正",
            ));
        }

        self.outputs.validate_names()?;

        if self.outputs.save_file.is_empty() {
            return Err(ConfigError::Missing("outputs.save_file".to_string()));
        }

        if !(1..=22).contains(&self.outputs.compression_level) {
            return Err(ConfigError::invalid(
                "outputs.compression_level",
                self.outputs.compression_level,
                "zstd 压缩级别必须在 [1, 22] 范围内",
            ));
        }

        Ok(())
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path, content).map_err(ConfigError::Io)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SweepConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pool.size, 10);
        assert_eq!(config.pool.slot_dir(3), PathBuf::from("sweep/RF_directory_3"));
    }

    #[test]
    fn test_duplicate_outputs_rejected() {
        let mut config = SweepConfig::default();
        config.outputs.non_time_series.push("fort.61".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "outputs"
        ));

        config.outputs.non_time_series = vec![" ".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_pool_size() {
        let mut config = SweepConfig::default();
        config.pool.size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "pool.size"
        ));
    }

    #[test]
    fn test_artifact_cannot_be_shared() {
        let mut config = SweepConfig::default();
        config.inputs.static_files.push("fort.13".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_command_render() {
        let cmd = CommandSpec::new("mpirun").arg("-np").arg("{procs}").arg("./padcirc -I {slot}");
        let (program, args) = cmd.render(&[("procs", "4".to_string()), ("slot", "/tmp/s1".to_string())]);
        assert_eq!(program, "mpirun");
        assert_eq!(args, vec!["-np", "4", "./padcirc -I /tmp/s1"]);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "pool": { "size": 4 }, "launch": { "timeout_secs": 30 } }"#;
        let config: SweepConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.pool.size, 4);
        assert_eq!(config.pool.slot_prefix, "RF_directory_");
        assert_eq!(config.launch.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.outputs.save_file, "sweep.msck");
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sweep.json");

        let mut config = SweepConfig::default();
        config.name = "tides".to_string();
        config.launch.slot_prepare = Some(CommandSpec::new("./adcprep").arg("--np").arg("{procs}"));
        config.save_to_file(&path).unwrap();

        let loaded = SweepConfig::from_file(&path).unwrap();
        assert_eq!(loaded.name, "tides");
        assert_eq!(loaded.launch.slot_prepare, config.launch.slot_prepare);
    }
}
