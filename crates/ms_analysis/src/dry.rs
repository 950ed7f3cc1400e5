// crates/ms_analysis/src/dry.rs

//! 干点修正
//!
//! 求解器对露出水面的节点/测站写出哨兵值 `-99999.0`。
//! 修正规则：
//!
//! 1. 先标记所有等于哨兵值的元素；
//! 2. 对未标记元素，加上该位置的静态参考高程（1 起编号 `v` 对应第 `v-1` 行），
//!    覆盖所有时间步和样本；
//! 3. 标记元素填充为 `0.0`。
//!
//! 该操作不可重复施加，结果集记录已修正的输出类型。

use ndarray::{ArrayViewMutD, Axis, Zip};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use ms_io::{load_results, OutputKind, ResultSet};

use crate::error::{AnalysisError, AnalysisResult};

/// 干点哨兵值
pub const DRY_SENTINEL: f64 = -99999.0;

/// 干点填充值
pub const DRY_FILL: f64 = 0.0;

/// 可修正的输出类型
pub const CORRECTABLE: [OutputKind; 3] =
    [OutputKind::Fort61, OutputKind::Fort63, OutputKind::MaxEle63];

// ============================================================
// 参考高程
// ============================================================

/// 按 1 起编号索引的参考高程
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceElevations {
    values: BTreeMap<usize, f64>,
}

impl ReferenceElevations {
    /// 创建空表
    pub fn new() -> Self {
        Self::default()
    }

    /// 由连续数组创建，第 `i` 个元素对应编号 `i+1`
    pub fn from_slice(values: &[f64]) -> Self {
        Self {
            values: values.iter().enumerate().map(|(i, &v)| (i + 1, v)).collect(),
        }
    }

    /// 插入编号 `id` 的参考高程
    pub fn insert(&mut self, id: usize, value: f64) {
        self.values.insert(id, value);
    }

    /// 查询
    pub fn get(&self, id: usize) -> Option<f64> {
        self.values.get(&id).copied()
    }

    /// 按编号升序遍历
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.values.iter().map(|(&id, &v)| (id, v))
    }

    /// 条目数
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// 静态地形提供者
pub trait Topography {
    /// 节点参考高程（用于 `fort63` 和 `maxele63`）
    fn node_elevations(&self) -> &ReferenceElevations;

    /// 某类测站的参考高程（用于 `fort61`）
    fn station_elevations(&self, kind: OutputKind) -> Option<&ReferenceElevations>;
}

/// 由 JSON 文件加载的地形表
///
/// ```json
/// { "nodes": { "1": 2.5, "2": 3.1 }, "elevation_stations": { "1": 0.8 } }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopographyTable {
    /// 节点参考高程
    #[serde(default)]
    pub nodes: ReferenceElevations,
    /// 水位测站参考高程
    #[serde(default)]
    pub elevation_stations: ReferenceElevations,
}

impl TopographyTable {
    /// 从 JSON 文件加载
    pub fn from_file<P: AsRef<Path>>(path: P) -> AnalysisResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| AnalysisError::Topography(format!("{}: {e}", path.as_ref().display())))?;
        serde_json::from_str(&content).map_err(|e| AnalysisError::Topography(e.to_string()))
    }
}

impl Topography for TopographyTable {
    fn node_elevations(&self) -> &ReferenceElevations {
        &self.nodes
    }

    fn station_elevations(&self, kind: OutputKind) -> Option<&ReferenceElevations> {
        match kind {
            OutputKind::Fort61 => Some(&self.elevation_stations),
            _ => None,
        }
    }
}

/// 某可修正输出类型对应的参考高程
pub fn reference_for<T: Topography + ?Sized>(
    topo: &T,
    kind: OutputKind,
) -> AnalysisResult<&ReferenceElevations> {
    match kind {
        OutputKind::Fort61 => topo
            .station_elevations(kind)
            .ok_or(AnalysisError::MissingReference(kind)),
        OutputKind::Fort63 | OutputKind::MaxEle63 => Ok(topo.node_elevations()),
        other => Err(AnalysisError::NotCorrectable(other)),
    }
}

// ============================================================
// 修正算法
// ============================================================

/// 原位修正一个数组（第 0 维为位置），返回被填充的干点个数
pub fn correct_dry_view(
    mut view: ArrayViewMutD<'_, f64>,
    refs: &ReferenceElevations,
) -> AnalysisResult<usize> {
    let locations = view.shape().first().copied().unwrap_or(0);
    if let Some((id, _)) = refs.iter().find(|(id, _)| *id == 0 || *id > locations) {
        return Err(AnalysisError::LocationOutOfRange { id, locations });
    }

    let mask = view.mapv(|v| v == DRY_SENTINEL);

    for (id, elevation) in refs.iter() {
        let row = view.index_axis_mut(Axis(0), id - 1);
        let dry = mask.index_axis(Axis(0), id - 1);
        Zip::from(row).and(&dry).for_each(|v, &m| {
            if !m {
                *v += elevation;
            }
        });
    }

    let mut filled = 0;
    Zip::from(&mut view).and(&mask).for_each(|v, &m| {
        if m {
            *v = DRY_FILL;
            filled += 1;
        }
    });
    Ok(filled)
}

/// 修正结果集中的某输出类型
pub fn correct_kind<T: Topography + ?Sized>(
    results: &mut ResultSet,
    kind: OutputKind,
    topo: &T,
) -> AnalysisResult<usize> {
    if results.is_corrected(kind) {
        return Err(AnalysisError::AlreadyCorrected(kind));
    }
    let refs = reference_for(topo, kind)?;
    let view = results
        .view_mut(kind)
        .ok_or(AnalysisError::KindMissing(kind))?;
    let filled = correct_dry_view(view, refs)?;
    results.mark_corrected(kind);
    info!(kind = %kind, filled, "干点修正完成");
    Ok(filled)
}

/// 修正结果集中全部存在且未修正的可修正输出，返回本次修正的类型
pub fn correct_all<T: Topography + ?Sized>(
    results: &mut ResultSet,
    topo: &T,
) -> AnalysisResult<Vec<OutputKind>> {
    let mut done = Vec::new();
    for kind in CORRECTABLE {
        if results.contains(kind) && !results.is_corrected(kind) {
            correct_kind(results, kind, topo)?;
            done.push(kind);
        }
    }
    Ok(done)
}

/// 加载检查点，并可选地修正全部可修正输出
pub fn load_with_correction<T: Topography + ?Sized>(
    path: &Path,
    topo: Option<&T>,
) -> AnalysisResult<ResultSet> {
    let mut results = load_results(path)?;
    if let Some(topo) = topo {
        correct_all(&mut results, topo)?;
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ms_io::{KindShape, SampleStatus};
    use ndarray::{Array, Array2, IxDyn};

    fn station_set() -> ResultSet {
        let samples = Array2::zeros((1, 2));
        let mut rs = ResultSet::allocate(samples, &[OutputKind::Fort61], |_| {
            KindShape::series(3, 6)
        })
        .unwrap();
        for s in 0..2 {
            let value = Array::from_shape_fn(IxDyn(&[3, 6]), |idx| (idx[0] + idx[1] + s) as f64);
            rs.record(s, OutputKind::Fort61, value.view()).unwrap();
            rs.set_status(s, SampleStatus::Completed).unwrap();
        }
        rs
    }

    fn table() -> TopographyTable {
        TopographyTable {
            nodes: ReferenceElevations::from_slice(&[0.0; 4]),
            elevation_stations: ReferenceElevations::from_slice(&[0.5, 1.5, -2.0]),
        }
    }

    #[test]
    fn test_sentinel_filled_and_reference_added() {
        let mut rs = station_set();
        let original = rs.series()[&OutputKind::Fort61].clone();
        // 编号 2 的测站（第 1 行）在第 4 个时间步、第 0 个样本干出
        {
            let mut view = rs.view_mut(OutputKind::Fort61).unwrap();
            view[[1, 4, 0]] = DRY_SENTINEL;
        }

        let filled = correct_kind(&mut rs, OutputKind::Fort61, &table()).unwrap();
        let fixed = &rs.series()[&OutputKind::Fort61];

        assert_eq!(filled, 1);
        assert_eq!(fixed[[1, 4, 0]], 0.0);
        assert_eq!(fixed[[1, 3, 0]], original[[1, 3, 0]] + 1.5);
        assert_eq!(fixed[[1, 4, 1]], original[[1, 4, 1]] + 1.5);
        assert_eq!(fixed[[0, 0, 0]], original[[0, 0, 0]] + 0.5);
        assert_eq!(fixed[[2, 5, 1]], original[[2, 5, 1]] - 2.0);
    }

    #[test]
    fn test_reapplication_rejected() {
        let mut rs = station_set();
        correct_kind(&mut rs, OutputKind::Fort61, &table()).unwrap();
        assert!(matches!(
            correct_kind(&mut rs, OutputKind::Fort61, &table()),
            Err(AnalysisError::AlreadyCorrected(OutputKind::Fort61))
        ));
        assert!(correct_all(&mut rs, &table()).unwrap().is_empty());
    }

    #[test]
    fn test_mask_computed_before_addition() {
        // 加上参考高程后恰好等于哨兵值的元素不应被填充
        let mut arr = Array::from_elem(IxDyn(&[1, 2]), -99998.0);
        arr[[0, 1]] = DRY_SENTINEL;
        let refs = ReferenceElevations::from_slice(&[-1.0]);

        let filled = correct_dry_view(arr.view_mut(), &refs).unwrap();
        assert_eq!(filled, 1);
        assert_eq!(arr[[0, 0]], DRY_SENTINEL);
        assert_eq!(arr[[0, 1]], 0.0);
    }

    #[test]
    fn test_location_out_of_range() {
        let mut arr = Array::zeros(IxDyn(&[2, 3]));
        let mut refs = ReferenceElevations::new();
        refs.insert(3, 1.0);
        assert!(matches!(
            correct_dry_view(arr.view_mut(), &refs),
            Err(AnalysisError::LocationOutOfRange { id: 3, locations: 2 })
        ));
    }

    #[test]
    fn test_not_correctable() {
        assert!(matches!(
            reference_for(&table(), OutputKind::MaxVel63),
            Err(AnalysisError::NotCorrectable(_))
        ));
    }

    #[test]
    fn test_table_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topo.json");
        std::fs::write(&path, r#"{ "nodes": { "1": 2.5, "3": -1.0 } }"#).unwrap();

        let topo = TopographyTable::from_file(&path).unwrap();
        assert_eq!(topo.nodes.get(3), Some(-1.0));
        assert_eq!(topo.nodes.get(2), None);
        assert!(topo.elevation_stations.is_empty());
    }
}
