// crates/ms_workflow/src/slots/pool.rs

//! 槽位池
//!
//! 固定数量的工作目录 `<save_dir>/<prefix><id>`（id 从 1 开始），
//! 每个目录链接全部静态输入，并在首次使用前执行一次准备命令。
//! 每个批次只覆盖参数场文件，目录在扫描之间复用。

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use ms_config::{InputConfig, SweepConfig};

use crate::collaborators::FieldArtifact;
use crate::error::{SweepError, SweepResult};
use crate::slots::fs::SlotFs;

/// 准备标记文件名，内容为准备时使用的进程数
pub const PREPARED_MARKER: &str = ".slot_prepared";

/// 槽位
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    /// 编号（1 起）
    pub id: usize,
    /// 工作目录
    pub path: PathBuf,
}

/// `ensure` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// 目录与链接均正确
    Unchanged,
    /// 新建目录
    Created,
    /// 修复了若干缺失或过期的链接
    Repaired {
        /// 重建的链接数
        replaced: usize,
    },
}

/// 静态输入
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticInput {
    /// 槽位内文件名
    pub name: String,
    /// 源路径
    pub source: PathBuf,
}

/// 静态输入集合（网格、运行配置、求解器可执行文件）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticInputs {
    inputs: Vec<StaticInput>,
}

impl StaticInputs {
    /// 由 (名称, 源路径) 列表创建
    pub fn new(inputs: impl IntoIterator<Item = (String, PathBuf)>) -> Self {
        Self {
            inputs: inputs
                .into_iter()
                .map(|(name, source)| StaticInput { name, source })
                .collect(),
        }
    }

    /// 由配置创建，相对路径以当前目录为基准
    pub fn from_config(inputs: &InputConfig) -> SweepResult<Self> {
        let cwd = std::env::current_dir()?;
        Ok(Self::new(inputs.static_inputs().into_iter().map(|(name, source)| {
            let source = if source.is_absolute() {
                source
            } else {
                cwd.join(source)
            };
            (name, source)
        })))
    }

    /// 遍历
    pub fn iter(&self) -> impl Iterator<Item = &StaticInput> {
        self.inputs.iter()
    }

    /// 个数
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

/// 槽位池
pub struct SlotPool {
    fs: Arc<dyn SlotFs>,
    root: PathBuf,
    prefix: String,
    size: usize,
    inputs: StaticInputs,
    artifact_name: String,
    num_procs: usize,
}

impl SlotPool {
    /// 创建槽位池（不触碰文件系统）
    pub fn new(
        fs: Arc<dyn SlotFs>,
        root: impl Into<PathBuf>,
        prefix: impl Into<String>,
        size: usize,
        inputs: StaticInputs,
    ) -> Self {
        Self {
            fs,
            root: root.into(),
            prefix: prefix.into(),
            size,
            inputs,
            artifact_name: "fort.13".to_string(),
            num_procs: 1,
        }
    }

    /// 由配置创建
    pub fn from_config(fs: Arc<dyn SlotFs>, config: &SweepConfig) -> SweepResult<Self> {
        config.validate()?;
        let pool = Self::new(
            fs,
            config.pool.save_dir.clone(),
            config.pool.slot_prefix.clone(),
            config.pool.size,
            StaticInputs::from_config(&config.inputs)?,
        )
        .with_artifact_name(config.inputs.artifact_name.clone())
        .with_num_procs(config.launch.num_procs);
        Ok(pool)
    }

    /// 设置参数场文件名
    pub fn with_artifact_name(mut self, name: impl Into<String>) -> Self {
        self.artifact_name = name.into();
        self
    }

    /// 设置每个槽位的进程数
    pub fn with_num_procs(mut self, num_procs: usize) -> Self {
        self.num_procs = num_procs;
        self
    }

    /// 槽位数
    pub fn size(&self) -> usize {
        self.size
    }

    /// 槽位根目录
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 参数场文件名
    pub fn artifact_name(&self) -> &str {
        &self.artifact_name
    }

    /// 文件系统
    pub fn fs(&self) -> &dyn SlotFs {
        self.fs.as_ref()
    }

    /// 编号为 `id` 的槽位
    pub fn slot(&self, id: usize) -> Option<Slot> {
        (1..=self.size).contains(&id).then(|| Slot {
            id,
            path: self.root.join(format!("{}{}", self.prefix, id)),
        })
    }

    /// 全部槽位
    pub fn slots(&self) -> Vec<Slot> {
        self.slots_for(self.size)
    }

    /// 前 `count` 个槽位
    pub fn slots_for(&self, count: usize) -> Vec<Slot> {
        (1..=count.min(self.size)).filter_map(|id| self.slot(id)).collect()
    }

    /// 检查全部静态输入存在
    pub fn check_inputs(&self) -> SweepResult<()> {
        match self.inputs.iter().find(|input| !self.fs.exists(&input.source)) {
            Some(missing) => Err(SweepError::MissingStaticInput(missing.source.clone())),
            None => Ok(()),
        }
    }

    /// 确保槽位目录存在且链接正确（幂等）
    pub fn ensure(&self, slot: &Slot) -> SweepResult<EnsureOutcome> {
        let staging = |e: std::io::Error| SweepError::staging(&slot.path, e);

        let created = !self.fs.is_dir(&slot.path);
        if created {
            self.fs.create_dir_all(&slot.path).map_err(staging)?;
        }

        let mut replaced = 0;
        for input in self.inputs.iter() {
            let link = slot.path.join(&input.name);
            match self.fs.read_link(&link).map_err(staging)? {
                Some(target) if target == input.source => continue,
                Some(_) => self.fs.remove_file(&link).map_err(staging)?,
                None if self.fs.exists(&link) => self.fs.remove_file(&link).map_err(staging)?,
                None => {}
            }
            self.fs.symlink(&input.source, &link).map_err(staging)?;
            debug!(link = %link.display(), target = %input.source.display(), "静态输入已链接");
            if !created {
                replaced += 1;
            }
        }

        Ok(match (created, replaced) {
            (true, _) => EnsureOutcome::Created,
            (false, 0) => EnsureOutcome::Unchanged,
            (false, replaced) => EnsureOutcome::Repaired { replaced },
        })
    }

    /// 初始化全部槽位，并对未准备（或进程数变化）的槽位执行准备步骤
    pub fn initialize<P: SlotPreparer + ?Sized>(
        &self,
        preparer: &P,
    ) -> SweepResult<Vec<(Slot, EnsureOutcome)>> {
        self.check_inputs()?;

        let mut outcomes = Vec::with_capacity(self.size);
        for slot in self.slots() {
            let outcome = self.ensure(&slot)?;
            if !self.is_prepared(&slot) {
                preparer.prepare_slot(&slot, self.num_procs)?;
                let marker = slot.path.join(PREPARED_MARKER);
                self.fs
                    .write(&marker, self.num_procs.to_string().as_bytes())
                    .map_err(|e| SweepError::staging(&marker, e))?;
            }
            outcomes.push((slot, outcome));
        }

        info!(slots = self.size, root = %self.root.display(), "槽位池已初始化");
        Ok(outcomes)
    }

    /// 槽位是否已按当前进程数准备
    pub fn is_prepared(&self, slot: &Slot) -> bool {
        self.fs
            .read(&slot.path.join(PREPARED_MARKER))
            .map(|data| String::from_utf8_lossy(&data).trim() == self.num_procs.to_string())
            .unwrap_or(false)
    }

    /// 将参数场写入第 `index` 个槽位（0 起局部索引）
    ///
    /// 同名的旧链接先被删除，避免写穿到共享输入。
    pub fn stage(&self, index: usize, artifact: &FieldArtifact) -> SweepResult<PathBuf> {
        let slot = self.slot(index + 1).ok_or_else(|| {
            SweepError::staging(&self.root, format!("槽位索引 {index} 超出池大小 {}", self.size))
        })?;
        let path = slot.path.join(&artifact.file_name);
        let staging = |e: std::io::Error| SweepError::staging(&path, e);

        if self.fs.read_link(&path).map_err(staging)?.is_some() {
            self.fs.remove_file(&path).map_err(staging)?;
        }
        self.fs.write(&path, &artifact.contents).map_err(staging)?;
        Ok(path)
    }

    /// 删除全部槽位目录（幂等）
    pub fn teardown(&self) -> SweepResult<()> {
        for slot in self.slots() {
            self.fs
                .remove_dir_all(&slot.path)
                .map_err(|e| SweepError::staging(&slot.path, e))?;
        }
        info!(root = %self.root.display(), "槽位池已清理");
        Ok(())
    }
}

impl std::fmt::Debug for SlotPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotPool")
            .field("root", &self.root)
            .field("prefix", &self.prefix)
            .field("size", &self.size)
            .field("inputs", &self.inputs.len())
            .finish()
    }
}

/// 槽位一次性准备步骤（如网格分区）
pub trait SlotPreparer {
    /// 在槽位首次使用前执行
    fn prepare_slot(&self, slot: &Slot, num_procs: usize) -> SweepResult<()>;
}

/// 无需准备
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPreparation;

impl SlotPreparer for NoPreparation {
    fn prepare_slot(&self, _slot: &Slot, _num_procs: usize) -> SweepResult<()> {
        Ok(())
    }
}
