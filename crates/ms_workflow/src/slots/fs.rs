// crates/ms_workflow/src/slots/fs.rs

//! 槽位文件系统抽象
//!
//! 槽位池只通过 [`SlotFs`] 访问文件系统，便于在内存中测试
//! 链接修复等幂等逻辑。

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

/// 槽位池需要的文件系统操作
pub trait SlotFs: Send + Sync {
    /// 路径是否存在（不跟随符号链接）
    fn exists(&self, path: &Path) -> bool;

    /// 是否为目录
    fn is_dir(&self, path: &Path) -> bool;

    /// 递归创建目录
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// 读取符号链接目标，不是链接或不存在时返回 None
    fn read_link(&self, path: &Path) -> io::Result<Option<PathBuf>>;

    /// 创建符号链接 `link -> target`
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()>;

    /// 删除文件或符号链接
    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// 递归删除目录，不存在时视为成功
    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;

    /// 写入文件（覆盖）
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// 读取文件
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
}

// ============================================================
// 真实文件系统
// ============================================================

/// 基于 `std::fs` 的实现
#[derive(Debug, Clone, Copy, Default)]
pub struct RealFs;

impl SlotFs for RealFs {
    fn exists(&self, path: &Path) -> bool {
        path.symlink_metadata().is_ok()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn read_link(&self, path: &Path) -> io::Result<Option<PathBuf>> {
        match path.symlink_metadata() {
            Ok(meta) if meta.file_type().is_symlink() => std::fs::read_link(path).map(Some),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    #[cfg(unix)]
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        std::os::unix::fs::symlink(target, link)
    }

    #[cfg(not(unix))]
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        // 无符号链接权限时退化为复制
        std::fs::copy(target, link).map(|_| ())
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        match std::fs::remove_dir_all(path) {
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        std::fs::write(path, contents)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }
}

// ============================================================
// 内存文件系统
// ============================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Dir,
    File(Vec<u8>),
    Link(PathBuf),
}

/// 内存文件系统（测试用）
///
/// 写入符号链接时跟随链接写入目标，与真实文件系统一致。
#[derive(Debug, Default)]
pub struct MemoryFs {
    nodes: RwLock<BTreeMap<PathBuf, Node>>,
}

impl MemoryFs {
    /// 创建空文件系统
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建文件（自动创建父目录）
    pub fn add_file(&self, path: impl AsRef<Path>, contents: &[u8]) {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            let _ = self.create_dir_all(parent);
        }
        self.nodes
            .write()
            .insert(path.to_path_buf(), Node::File(contents.to_vec()));
    }

    /// 全部条目路径
    pub fn paths(&self) -> Vec<PathBuf> {
        self.nodes.read().keys().cloned().collect()
    }

    fn not_found(path: &Path) -> io::Error {
        io::Error::new(ErrorKind::NotFound, format!("{} 不存在", path.display()))
    }

    fn require_parent(nodes: &BTreeMap<PathBuf, Node>, path: &Path) -> io::Result<()> {
        match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => match nodes.get(p) {
                Some(Node::Dir) => Ok(()),
                _ => Err(Self::not_found(p)),
            },
            _ => Ok(()),
        }
    }
}

impl SlotFs for MemoryFs {
    fn exists(&self, path: &Path) -> bool {
        self.nodes.read().contains_key(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.nodes.read().get(path), Some(Node::Dir))
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut nodes = self.nodes.write();
        let mut ancestors: Vec<&Path> = path
            .ancestors()
            .filter(|p| !p.as_os_str().is_empty())
            .collect();
        ancestors.reverse();
        for dir in ancestors {
            match nodes.get(dir) {
                Some(Node::Dir) => {}
                Some(_) => {
                    return Err(io::Error::new(
                        ErrorKind::AlreadyExists,
                        format!("{} 不是目录", dir.display()),
                    ))
                }
                None => {
                    nodes.insert(dir.to_path_buf(), Node::Dir);
                }
            }
        }
        Ok(())
    }

    fn read_link(&self, path: &Path) -> io::Result<Option<PathBuf>> {
        match self.nodes.read().get(path) {
            Some(Node::Link(target)) => Ok(Some(target.clone())),
            _ => Ok(None),
        }
    }

    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        let mut nodes = self.nodes.write();
        Self::require_parent(&nodes, link)?;
        if nodes.contains_key(link) {
            return Err(io::Error::new(
                ErrorKind::AlreadyExists,
                format!("{} 已存在", link.display()),
            ));
        }
        nodes.insert(link.to_path_buf(), Node::Link(target.to_path_buf()));
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        let mut nodes = self.nodes.write();
        match nodes.get(path) {
            Some(Node::File(_)) | Some(Node::Link(_)) => {
                nodes.remove(path);
                Ok(())
            }
            Some(Node::Dir) => Err(io::Error::new(
                ErrorKind::Other,
                format!("{} 是目录", path.display()),
            )),
            None => Err(Self::not_found(path)),
        }
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        self.nodes.write().retain(|p, _| !p.starts_with(path));
        Ok(())
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let mut nodes = self.nodes.write();
        let target = match nodes.get(path) {
            Some(Node::Link(target)) => target.clone(),
            Some(Node::Dir) => {
                return Err(io::Error::new(
                    ErrorKind::Other,
                    format!("{} 是目录", path.display()),
                ))
            }
            _ => path.to_path_buf(),
        };
        Self::require_parent(&nodes, &target)?;
        nodes.insert(target, Node::File(contents.to_vec()));
        Ok(())
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let nodes = self.nodes.read();
        match nodes.get(path) {
            Some(Node::File(data)) => Ok(data.clone()),
            Some(Node::Link(target)) => match nodes.get(target) {
                Some(Node::File(data)) => Ok(data.clone()),
                _ => Err(Self::not_found(target)),
            },
            _ => Err(Self::not_found(path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_fs_links() {
        let fs = MemoryFs::new();
        fs.add_file("/grid/fort.14", b"mesh");
        fs.create_dir_all(Path::new("/run/slot1")).unwrap();

        let link = Path::new("/run/slot1/fort.14");
        fs.symlink(Path::new("/grid/fort.14"), link).unwrap();
        assert_eq!(fs.read_link(link).unwrap(), Some(PathBuf::from("/grid/fort.14")));
        assert_eq!(fs.read(link).unwrap(), b"mesh");
        assert!(fs.symlink(Path::new("/grid/fort.14"), link).is_err());
    }

    #[test]
    fn test_memory_fs_write_follows_link() {
        let fs = MemoryFs::new();
        fs.add_file("/shared/fort.13", b"shared");
        fs.create_dir_all(Path::new("/slot")).unwrap();
        fs.symlink(Path::new("/shared/fort.13"), Path::new("/slot/fort.13")).unwrap();

        fs.write(Path::new("/slot/fort.13"), b"sample").unwrap();
        assert_eq!(fs.read(Path::new("/shared/fort.13")).unwrap(), b"sample");
    }

    #[test]
    fn test_memory_fs_remove_dir_all() {
        let fs = MemoryFs::new();
        fs.add_file("/a/b/c.txt", b"x");
        fs.add_file("/ab/d.txt", b"y");
        fs.remove_dir_all(Path::new("/a")).unwrap();
        assert!(!fs.exists(Path::new("/a/b/c.txt")));
        assert!(fs.exists(Path::new("/ab/d.txt")));
        assert!(fs.remove_dir_all(Path::new("/missing")).is_ok());
    }

    #[test]
    fn test_write_requires_parent() {
        let fs = MemoryFs::new();
        assert!(fs.write(Path::new("/nope/file"), b"x").is_err());
    }
}
