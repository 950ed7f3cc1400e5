// crates/ms_io/src/checkpoint.rs

//! 检查点保存/恢复
//!
//! 每个批次结束后将整个结果集写入磁盘，覆盖上一次的检查点。
//! 扫描开始前，同名旧文件会被轮换为编号备份。
//!
//! # 文件格式 (v1)
//!
//! ```text
//! [魔数: 4 bytes] "MSCK"
//! [版本: u32]
//! [负载: zstd(bincode(CheckpointPayload))]
//! [CRC32: u32]  覆盖前面全部字节
//! ```
//!
//! # 键约定
//!
//! | 键 | 内容 |
//! |----|------|
//! | `mann_pts` | 样本矩阵 (basis_dim, N) |
//! | `<kind>` | 输出数组，如 `fort61`、`maxele63` |
//! | `<kind>_time` | 观测时间向量 |
//! | `Q` | QoI 矩阵 (N, q) |
//! | `sample_status` | 样本状态编码 (N,) |
//!
//! # 使用示例
//!
//! ```rust,ignore
//! let store = CheckpointStore::new("sweep/sweep.msck", 3);
//! store.begin()?;          // 轮换旧文件
//! store.write(&results)?;  // 每批次覆盖
//! let loaded = store.load()?;
//! ```

use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2, ArrayD, Ix1, Ix2};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::IoResult;
use crate::kinds::OutputKind;
use crate::results::{ResultParts, ResultSet, SampleStatus, QOI_KEY};

// ============================================================
// 错误类型
// ============================================================

/// 检查点错误
#[derive(Debug)]
pub enum CheckpointError {
    /// IO 错误
    Io(std::io::Error),
    /// 格式错误
    Format(String),
    /// 版本不兼容
    Version {
        /// 文件版本
        file: u32,
        /// 当前版本
        current: u32,
    },
    /// 校验和错误
    Checksum {
        /// 文件记录的校验和
        expected: u32,
        /// 实际计算的校验和
        found: u32,
    },
    /// 序列化/压缩错误
    Encoding(String),
}

impl std::fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckpointError::Io(e) => write!(f, "IO 错误: {}", e),
            CheckpointError::Format(msg) => write!(f, "格式错误: {}", msg),
            CheckpointError::Version { file, current } => {
                write!(f, "版本不兼容: 文件版本 {}, 当前版本 {}", file, current)
            }
            CheckpointError::Checksum { expected, found } => {
                write!(f, "校验和错误: 期望 {:08x}, 实际 {:08x}", expected, found)
            }
            CheckpointError::Encoding(msg) => write!(f, "编码错误: {}", msg),
        }
    }
}

impl std::error::Error for CheckpointError {}

impl From<std::io::Error> for CheckpointError {
    fn from(e: std::io::Error) -> Self {
        CheckpointError::Io(e)
    }
}

/// 检查点操作结果
pub type CheckpointResult<T> = Result<T, CheckpointError>;

// ============================================================
// 常量
// ============================================================

/// 检查点文件格式版本
const CHECKPOINT_VERSION: u32 = 1;

/// 检查点魔数
const CHECKPOINT_MAGIC: &[u8; 4] = b"MSCK";

/// 默认 zstd 压缩级别
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// 样本矩阵键
pub const SAMPLES_KEY: &str = "mann_pts";

/// 样本状态键
pub const STATUS_KEY: &str = "sample_status";

const TIME_SUFFIX: &str = "_time";

// ============================================================
// 检查点数据
// ============================================================

/// 检查点负载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 按键存储的全部数组
    pub entries: BTreeMap<String, ArrayD<f64>>,
    /// 已做干点修正的输出类型键
    pub corrected: Vec<String>,
}

impl Checkpoint {
    /// 从结果集生成快照
    pub fn from_results(results: &ResultSet) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(SAMPLES_KEY.to_string(), results.samples().clone().into_dyn());

        for (kind, arr) in results.series() {
            entries.insert(kind.key().to_string(), arr.clone());
        }
        for (kind, arr) in results.nodal() {
            entries.insert(kind.key().to_string(), arr.clone().into_dyn());
        }
        for (kind, times) in results.times() {
            entries.insert(kind.time_key(), times.clone().into_dyn());
        }
        if let Some(q) = results.qoi() {
            entries.insert(QOI_KEY.to_string(), q.clone().into_dyn());
        }
        let codes: Array1<f64> = results.statuses().iter().map(|s| s.code()).collect();
        entries.insert(STATUS_KEY.to_string(), codes.into_dyn());

        Self {
            created_at: Utc::now(),
            entries,
            corrected: results.corrected().iter().map(|k| k.key().to_string()).collect(),
        }
    }

    /// 按键名与维数还原结果集
    ///
    /// 缺失的键对应缺失的条目；无法识别的键记录警告后跳过。
    pub fn into_results(self) -> IoResult<ResultSet> {
        let mut parts = ResultParts::default();
        let mut samples = None;

        for (key, arr) in self.entries {
            if key == SAMPLES_KEY {
                samples = Some(into_rank2(&key, arr)?);
            } else if key == QOI_KEY {
                parts.qoi = Some(into_rank2(&key, arr)?);
            } else if key == STATUS_KEY {
                let codes = into_rank1(&key, arr)?;
                parts.status = codes
                    .iter()
                    .map(|&c| SampleStatus::from_code(c).unwrap_or(SampleStatus::Pending))
                    .collect();
            } else if let Some(prefix) = key.strip_suffix(TIME_SUFFIX) {
                match OutputKind::from_key(prefix) {
                    Some(kind) if arr.ndim() == 1 => {
                        parts.times.insert(kind, into_rank1(&key, arr)?);
                    }
                    _ => warn!(key = %key, "跳过无法识别的观测时间"),
                }
            } else {
                match (OutputKind::from_key(&key), arr.ndim()) {
                    (Some(kind), 2) if !kind.is_time_series() => {
                        parts.nodal.insert(kind, into_rank2(&key, arr)?);
                    }
                    (Some(kind), 3 | 4) if kind.is_time_series() => {
                        parts.series.insert(kind, arr);
                    }
                    (_, ndim) => warn!(key = %key, ndim, "跳过无法识别的数组"),
                }
            }
        }

        parts.samples = match samples {
            Some(s) => s,
            None => Array2::zeros((0, infer_num_samples(&parts))),
        };
        parts.corrected = self
            .corrected
            .iter()
            .filter_map(|k| OutputKind::from_key(k))
            .collect::<BTreeSet<_>>();

        ResultSet::from_parts(parts)
    }

    /// 保存到文件（写临时文件后原子重命名）
    pub fn save(&self, path: &Path, level: i32) -> CheckpointResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let serialized =
            bincode::serialize(self).map_err(|e| CheckpointError::Encoding(e.to_string()))?;
        let compressed = zstd::encode_all(&serialized[..], level)
            .map_err(|e| CheckpointError::Encoding(e.to_string()))?;
        debug!(
            raw = serialized.len(),
            compressed = compressed.len(),
            "检查点已压缩"
        );

        let mut data = Vec::with_capacity(compressed.len() + 12);
        data.extend_from_slice(CHECKPOINT_MAGIC);
        data.extend_from_slice(&CHECKPOINT_VERSION.to_le_bytes());
        data.extend_from_slice(&compressed);
        let crc = compute_crc32(&data);

        let temp_path = path.with_extension("msck.tmp");
        {
            let file = File::create(&temp_path)?;
            let mut writer = BufWriter::new(file);
            writer.write_all(&data)?;
            writer.write_all(&crc.to_le_bytes())?;
            writer.flush()?;
        }
        std::fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// 从文件加载
    pub fn load(path: &Path) -> CheckpointResult<Self> {
        let mut all_data = Vec::new();
        File::open(path)?.read_to_end(&mut all_data)?;

        // 至少需要魔数 + 版本 + CRC
        if all_data.len() < 12 {
            return Err(CheckpointError::Format("文件太小".into()));
        }

        let crc_offset = all_data.len() - 4;
        let (data, crc_bytes) = all_data.split_at(crc_offset);
        let mut stored = [0u8; 4];
        stored.copy_from_slice(crc_bytes);
        let stored_crc = u32::from_le_bytes(stored);
        let computed_crc = compute_crc32(data);
        if stored_crc != computed_crc {
            return Err(CheckpointError::Checksum {
                expected: stored_crc,
                found: computed_crc,
            });
        }

        if &data[..4] != CHECKPOINT_MAGIC {
            return Err(CheckpointError::Format("无效的检查点文件格式".into()));
        }

        let mut version_bytes = [0u8; 4];
        version_bytes.copy_from_slice(&data[4..8]);
        let version = u32::from_le_bytes(version_bytes);
        if version != CHECKPOINT_VERSION {
            return Err(CheckpointError::Version {
                file: version,
                current: CHECKPOINT_VERSION,
            });
        }

        let serialized =
            zstd::decode_all(&data[8..]).map_err(|e| CheckpointError::Encoding(e.to_string()))?;
        bincode::deserialize(&serialized).map_err(|e| CheckpointError::Encoding(e.to_string()))
    }
}

fn into_rank1(key: &str, arr: ArrayD<f64>) -> IoResult<Array1<f64>> {
    let shape = arr.shape().to_vec();
    arr.into_dimensionality::<Ix1>()
        .map_err(|_| shape_error(key, &shape))
}

fn into_rank2(key: &str, arr: ArrayD<f64>) -> IoResult<Array2<f64>> {
    let shape = arr.shape().to_vec();
    arr.into_dimensionality::<Ix2>()
        .map_err(|_| shape_error(key, &shape))
}

fn shape_error(key: &str, shape: &[usize]) -> crate::error::IoError {
    CheckpointError::Format(format!("{key} 的维数不正确: {shape:?}")).into()
}

fn infer_num_samples(parts: &ResultParts) -> usize {
    parts
        .series
        .values()
        .map(|a| a.shape()[a.ndim() - 1])
        .chain(parts.nodal.values().map(|a| a.ncols()))
        .chain(parts.qoi.iter().map(|q| q.nrows()))
        .next()
        .unwrap_or(parts.status.len())
}

/// 计算 CRC32 校验和（IEEE 多项式）
fn compute_crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFFFFFFu32;
    for &byte in data {
        let index = ((crc ^ byte as u32) & 0xFF) as usize;
        crc = CRC32_TABLE[index] ^ (crc >> 8);
    }
    !crc
}

/// 生成 CRC32 查找表（编译期计算）
const fn generate_crc32_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = 0xEDB88320 ^ (crc >> 1);
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// CRC32 查找表
const CRC32_TABLE: [u32; 256] = generate_crc32_table();

// ============================================================
// 备份轮换
// ============================================================

/// 将已存在的检查点轮换为编号备份
///
/// 备份名为 `<n><文件名>`，`n` 为目录中以该文件名结尾的文件个数
/// （含当前文件），因此首个备份为 `1<文件名>`。
/// 文件不存在时不做任何事。
pub fn rotate_existing(path: &Path) -> std::io::Result<Option<PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }
    let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
        return Ok(None);
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut count = 0usize;
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().ends_with(file_name) {
            count += 1;
        }
    }

    let mut backup = dir.join(format!("{count}{file_name}"));
    // 用户手动删除过中间备份时编号可能已被占用
    while backup.exists() {
        count += 1;
        backup = dir.join(format!("{count}{file_name}"));
    }
    std::fs::rename(path, &backup)?;
    info!(from = %path.display(), to = %backup.display(), "旧检查点已轮换");
    Ok(Some(backup))
}

// ============================================================
// 检查点存储
// ============================================================

/// 单文件检查点存储
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
    level: i32,
}

impl CheckpointStore {
    /// 创建存储
    pub fn new(path: impl Into<PathBuf>, level: i32) -> Self {
        Self {
            path: path.into(),
            level,
        }
    }

    /// 检查点路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 扫描开始：创建所在目录并轮换旧文件
    pub fn begin(&self) -> CheckpointResult<Option<PathBuf>> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Ok(rotate_existing(&self.path)?)
    }

    /// 覆盖写入当前结果集
    pub fn write(&self, results: &ResultSet) -> CheckpointResult<()> {
        Checkpoint::from_results(results).save(&self.path, self.level)?;
        debug!(path = %self.path.display(), "检查点已写入");
        Ok(())
    }

    /// 加载结果集
    pub fn load(&self) -> IoResult<ResultSet> {
        load_results(&self.path)
    }
}

/// 从检查点文件加载结果集
pub fn load_results(path: &Path) -> IoResult<ResultSet> {
    Checkpoint::load(path)?.into_results()
}

// ============================================================
// 测试
// ============================================================
