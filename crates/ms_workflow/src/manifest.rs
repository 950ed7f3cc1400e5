// crates/ms_workflow/src/manifest.rs

//! 批次清单与运行脚本
//!
//! 每个批次在 `save_dir` 中写出：
//!
//! - `dir_list`: 本批次使用的槽位目录，每行一个，末行无换行；
//! - `run_batch.sh`: 每个槽位一条后台求解器命令，最后 `wait`，
//!   可在驱动程序之外复现该批次。

use std::path::{Path, PathBuf};

use crate::error::{SweepError, SweepResult};
use crate::slots::{Slot, SlotFs};

/// 清单文件名
pub const MANIFEST_NAME: &str = "dir_list";

/// 运行脚本文件名
pub const RUN_SCRIPT_NAME: &str = "run_batch.sh";

/// 批次清单
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchManifest {
    dirs: Vec<PathBuf>,
}

impl BatchManifest {
    /// 由本批次使用的槽位创建
    pub fn new(slots: &[Slot]) -> Self {
        Self {
            dirs: slots.iter().map(|s| s.path.clone()).collect(),
        }
    }

    /// 槽位目录数
    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    /// 渲染文本
    pub fn render(&self) -> String {
        self.dirs
            .iter()
            .map(|d| d.display().to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// 写入 `<dir>/dir_list`
    pub fn write(&self, fs: &dyn SlotFs, dir: &Path) -> SweepResult<PathBuf> {
        let path = dir.join(MANIFEST_NAME);
        fs.write(&path, self.render().as_bytes())
            .map_err(|e| SweepError::staging(&path, e))?;
        Ok(path)
    }
}

/// 批次运行脚本
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunScript {
    lines: Vec<String>,
    quiet: bool,
}

impl RunScript {
    /// 创建空脚本
    pub fn new(quiet: bool) -> Self {
        Self {
            lines: Vec::new(),
            quiet,
        }
    }

    /// 添加一条在 `cwd` 中后台执行的命令
    pub fn push(&mut self, cwd: &Path, program: &str, args: &[String]) {
        let mut line = format!("cd {} && {}", shell_quote(&cwd.display().to_string()), program);
        for arg in args {
            line.push(' ');
            line.push_str(&shell_quote(arg));
        }
        if self.quiet {
            line.push_str(" > /dev/null 2>&1");
        }
        self.lines.push(format!("({line}) &"));
    }

    /// 命令条数
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// 渲染脚本
    pub fn render(&self) -> String {
        let mut out = String::from("#!/bin/bash\n");
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str("wait\n");
        out
    }

    /// 写入 `<dir>/run_batch.sh`
    pub fn write(&self, fs: &dyn SlotFs, dir: &Path) -> SweepResult<PathBuf> {
        let path = dir.join(RUN_SCRIPT_NAME);
        fs.write(&path, self.render().as_bytes())
            .map_err(|e| SweepError::staging(&path, e))?;
        Ok(path)
    }
}

fn shell_quote(s: &str) -> String {
    let safe = !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if safe {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slots::MemoryFs;

    fn slots(n: usize) -> Vec<Slot> {
        (1..=n)
            .map(|id| Slot {
                id,
                path: PathBuf::from(format!("/run/RF_directory_{id}")),
            })
            .collect()
    }

    #[test]
    fn test_manifest_lists_only_used_slots() {
        let manifest = BatchManifest::new(&slots(3));
        assert_eq!(
            manifest.render(),
            "/run/RF_directory_1\n/run/RF_directory_2\n/run/RF_directory_3"
        );

        let fs = MemoryFs::new();
        fs.create_dir_all(Path::new("/run")).unwrap();
        let path = manifest.write(&fs, Path::new("/run")).unwrap();
        assert_eq!(fs.read(&path).unwrap(), manifest.render().into_bytes());
    }

    #[test]
    fn test_run_script_backgrounds_and_waits() {
        let mut script = RunScript::new(true);
        for slot in slots(2) {
            script.push(&slot.path, "./padcirc", &["-I".into(), slot.path.display().to_string()]);
        }
        let text = script.render();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "#!/bin/bash");
        assert_eq!(
            lines[1],
            "(cd /run/RF_directory_1 && ./padcirc -I /run/RF_directory_1 > /dev/null 2>&1) &"
        );
        assert_eq!(lines.last(), Some(&"wait"));
        assert_eq!(script.len(), 2);
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("plain"), "plain");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }
}
