// crates/ms_io/src/results.rs

//! 结果累加器
//!
//! [`ResultSet`] 在扫描开始时按最终形状一次性分配全部输出数组，
//! 之后每个样本的数据写入其全局索引处，且每个 `(kind, sample)` 只能写一次。
//!
//! # 数组布局
//!
//! ```text
//! 样本矩阵      (basis_dim, N)
//! 时间序列      (locations, timesteps, N) 或 (locations, timesteps, components, N)
//! 非时间序列    (nodes, N)
//! 观测时间      (timesteps,)
//! QoI           (N, q)
//! ```

use ndarray::{Array1, Array2, ArrayD, ArrayView1, ArrayViewD, ArrayViewMutD, Axis, IxDyn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use ms_foundation::MsError;

use crate::error::{IoError, IoResult};
use crate::kinds::{KindShape, OutputKind};

/// QoI 矩阵的写入标记键
pub const QOI_KEY: &str = "Q";

// ============================================================
// 样本状态
// ============================================================

/// 单个样本的处理状态
///
/// 区分“成功运行且结果恰好为零”和“运行失败、数组保持预分配的零值”。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SampleStatus {
    /// 尚未运行
    Pending = 0,
    /// 运行并采集成功
    Completed = 1,
    /// 求解器非零退出或无法启动
    RunFailed = 2,
    /// 批次超时被终止
    TimedOut = 3,
    /// 运行成功但输出采集失败
    CollectFailed = 4,
}

impl SampleStatus {
    /// 检查点中的数值编码
    pub fn code(self) -> f64 {
        self as u8 as f64
    }

    /// 由数值编码还原
    pub fn from_code(code: f64) -> Option<Self> {
        match code as i64 {
            0 => Some(Self::Pending),
            1 => Some(Self::Completed),
            2 => Some(Self::RunFailed),
            3 => Some(Self::TimedOut),
            4 => Some(Self::CollectFailed),
            _ => None,
        }
    }

    /// 是否已经处理过（无论成败）
    pub fn is_settled(self) -> bool {
        self != Self::Pending
    }
}

impl fmt::Display for SampleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::RunFailed => "run-failed",
            Self::TimedOut => "timed-out",
            Self::CollectFailed => "collect-failed",
        };
        f.write_str(s)
    }
}

// ============================================================
// 结果集
// ============================================================

/// 结果集的全部组成部分
///
/// 供检查点加载与合并使用，经 [`ResultSet::from_parts`] 校验后重建结果集。
#[derive(Debug, Clone, Default)]
pub struct ResultParts {
    /// 样本矩阵 (basis_dim, N)
    pub samples: Array2<f64>,
    /// 时间序列输出
    pub series: BTreeMap<OutputKind, ArrayD<f64>>,
    /// 非时间序列输出
    pub nodal: BTreeMap<OutputKind, Array2<f64>>,
    /// 观测时间向量
    pub times: BTreeMap<OutputKind, Array1<f64>>,
    /// QoI 矩阵 (N, q)
    pub qoi: Option<Array2<f64>>,
    /// 样本状态，为空时全部视为 Pending
    pub status: Vec<SampleStatus>,
    /// 已做干点修正的输出类型
    pub corrected: BTreeSet<OutputKind>,
}

/// 扫描结果集
#[derive(Debug, Clone)]
pub struct ResultSet {
    samples: Array2<f64>,
    series: BTreeMap<OutputKind, ArrayD<f64>>,
    nodal: BTreeMap<OutputKind, Array2<f64>>,
    times: BTreeMap<OutputKind, Array1<f64>>,
    qoi: Option<Array2<f64>>,
    status: Vec<SampleStatus>,
    corrected: BTreeSet<OutputKind>,
    written: BTreeMap<String, Vec<bool>>,
}

impl ResultSet {
    /// 按最终形状分配全部输出数组（零填充）
    pub fn allocate<F>(samples: Array2<f64>, kinds: &[OutputKind], shape_fn: F) -> IoResult<Self>
    where
        F: Fn(OutputKind) -> KindShape,
    {
        let n = samples.ncols();
        let mut series = BTreeMap::new();
        let mut nodal = BTreeMap::new();
        let mut written = BTreeMap::new();

        for &kind in kinds {
            let shape = shape_fn(kind);
            if kind.is_time_series() != shape.timesteps.is_some() {
                return Err(IoError::Foundation(MsError::invalid_input(format!(
                    "{kind} 的形状 {:?} 与输出类型不符",
                    shape.sample_dims()
                ))));
            }
            if kind.is_time_series() {
                series.insert(kind, ArrayD::zeros(IxDyn(&shape.full_dims(n))));
            } else {
                nodal.insert(kind, Array2::zeros((shape.locations, n)));
            }
            written.insert(kind.key().to_string(), vec![false; n]);
        }

        Ok(Self {
            samples,
            series,
            nodal,
            times: BTreeMap::new(),
            qoi: None,
            status: vec![SampleStatus::Pending; n],
            corrected: BTreeSet::new(),
            written,
        })
    }

    /// 由组成部分重建，校验每个数组的样本轴长度
    ///
    /// 已处理（非 Pending）的样本视为已写入。
    pub fn from_parts(parts: ResultParts) -> IoResult<Self> {
        let ResultParts {
            samples,
            series,
            nodal,
            times,
            qoi,
            mut status,
            corrected,
        } = parts;
        let n = samples.ncols();

        let check = |key: &str, shape: &[usize], axis_len: usize| -> IoResult<()> {
            if axis_len != n {
                return Err(IoError::ShapeMismatch {
                    kind: key.to_string(),
                    expected: vec![n],
                    actual: shape.to_vec(),
                });
            }
            Ok(())
        };

        for (kind, arr) in &series {
            if !(3..=4).contains(&arr.ndim()) {
                return Err(IoError::ShapeMismatch {
                    kind: kind.key().to_string(),
                    expected: vec![0, 0, n],
                    actual: arr.shape().to_vec(),
                });
            }
            check(kind.key(), arr.shape(), arr.shape()[arr.ndim() - 1])?;
        }
        for (kind, arr) in &nodal {
            check(kind.key(), arr.shape(), arr.ncols())?;
        }
        if let Some(q) = &qoi {
            check(QOI_KEY, q.shape(), q.nrows())?;
        }

        if status.is_empty() {
            status = vec![SampleStatus::Pending; n];
        } else if status.len() != n {
            return Err(IoError::ShapeMismatch {
                kind: "sample_status".to_string(),
                expected: vec![n],
                actual: vec![status.len()],
            });
        }

        let settled: Vec<bool> = status.iter().map(|s| s.is_settled()).collect();
        let mut written: BTreeMap<String, Vec<bool>> = series
            .keys()
            .chain(nodal.keys())
            .map(|k| (k.key().to_string(), settled.clone()))
            .collect();
        if qoi.is_some() {
            written.insert(QOI_KEY.to_string(), settled);
        }

        Ok(Self {
            samples,
            series,
            nodal,
            times,
            qoi,
            status,
            corrected,
            written,
        })
    }

    /// 拆分为组成部分
    pub fn into_parts(self) -> ResultParts {
        ResultParts {
            samples: self.samples,
            series: self.series,
            nodal: self.nodal,
            times: self.times,
            qoi: self.qoi,
            status: self.status,
            corrected: self.corrected,
        }
    }

    // ========================================================
    // 查询
    // ========================================================

    /// 样本数
    pub fn num_samples(&self) -> usize {
        self.samples.ncols()
    }

    /// 基函数维度
    pub fn basis_dim(&self) -> usize {
        self.samples.nrows()
    }

    /// 样本矩阵
    pub fn samples(&self) -> &Array2<f64> {
        &self.samples
    }

    /// 已分配的输出类型
    pub fn kinds(&self) -> Vec<OutputKind> {
        let mut kinds: Vec<_> = self.series.keys().chain(self.nodal.keys()).copied().collect();
        kinds.sort();
        kinds
    }

    /// 是否分配了某输出类型
    pub fn contains(&self, kind: OutputKind) -> bool {
        self.series.contains_key(&kind) || self.nodal.contains_key(&kind)
    }

    /// 时间序列输出
    pub fn series(&self) -> &BTreeMap<OutputKind, ArrayD<f64>> {
        &self.series
    }

    /// 非时间序列输出
    pub fn nodal(&self) -> &BTreeMap<OutputKind, Array2<f64>> {
        &self.nodal
    }

    /// 观测时间向量
    pub fn times(&self) -> &BTreeMap<OutputKind, Array1<f64>> {
        &self.times
    }

    /// QoI 矩阵
    pub fn qoi(&self) -> Option<&Array2<f64>> {
        self.qoi.as_ref()
    }

    /// 某输出类型的整体视图
    pub fn view(&self, kind: OutputKind) -> Option<ArrayViewD<'_, f64>> {
        self.series
            .get(&kind)
            .map(|a| a.view())
            .or_else(|| self.nodal.get(&kind).map(|a| a.view().into_dyn()))
    }

    /// 某输出类型的可变视图（供干点修正等原位处理使用）
    pub fn view_mut(&mut self, kind: OutputKind) -> Option<ArrayViewMutD<'_, f64>> {
        if let Some(a) = self.series.get_mut(&kind) {
            return Some(a.view_mut());
        }
        self.nodal.get_mut(&kind).map(|a| a.view_mut().into_dyn())
    }

    /// 某样本在某输出类型中的切片
    pub fn sample_view(&self, kind: OutputKind, sample: usize) -> Option<ArrayViewD<'_, f64>> {
        if sample >= self.num_samples() {
            return None;
        }
        self.view(kind).map(|v| {
            let last = v.ndim() - 1;
            v.index_axis_move(Axis(last), sample)
        })
    }

    /// 观测时间的可变引用
    pub fn times_mut(&mut self, kind: OutputKind) -> Option<&mut Array1<f64>> {
        self.times.get_mut(&kind)
    }

    /// 样本状态
    pub fn status(&self, sample: usize) -> Option<SampleStatus> {
        self.status.get(sample).copied()
    }

    /// 全部样本状态
    pub fn statuses(&self) -> &[SampleStatus] {
        &self.status
    }

    /// 处于某状态的样本数
    pub fn count_status(&self, status: SampleStatus) -> usize {
        self.status.iter().filter(|s| **s == status).count()
    }

    /// 是否已做干点修正
    pub fn is_corrected(&self, kind: OutputKind) -> bool {
        self.corrected.contains(&kind)
    }

    /// 已修正的输出类型
    pub fn corrected(&self) -> &BTreeSet<OutputKind> {
        &self.corrected
    }

    // ========================================================
    // 写入
    // ========================================================

    fn check_sample(&self, sample: usize) -> IoResult<()> {
        if sample >= self.num_samples() {
            return Err(IoError::SampleOutOfRange {
                sample,
                num_samples: self.num_samples(),
            });
        }
        Ok(())
    }

    fn claim(&mut self, key: &str, sample: usize) -> IoResult<()> {
        let flags = self
            .written
            .get_mut(key)
            .ok_or_else(|| IoError::UnknownKind(key.to_string()))?;
        if flags[sample] {
            return Err(IoError::AlreadyRecorded {
                kind: key.to_string(),
                sample,
            });
        }
        flags[sample] = true;
        Ok(())
    }

    /// 检查某样本的某输出能否写入，不修改结果集
    pub fn check_record(&self, sample: usize, kind: OutputKind, value: ArrayViewD<'_, f64>) -> IoResult<()> {
        self.check_sample(sample)?;

        let expected: Vec<usize> = if let Some(a) = self.series.get(&kind) {
            let shape = a.shape();
            shape[..shape.len() - 1].to_vec()
        } else if let Some(a) = self.nodal.get(&kind) {
            vec![a.nrows()]
        } else {
            return Err(IoError::KindNotAllocated(kind));
        };

        if expected.as_slice() != value.shape() {
            return Err(IoError::ShapeMismatch {
                kind: kind.key().to_string(),
                expected,
                actual: value.shape().to_vec(),
            });
        }

        let already = self
            .written
            .get(kind.key())
            .map(|flags| flags[sample])
            .unwrap_or(false);
        if already {
            return Err(IoError::AlreadyRecorded {
                kind: kind.key().to_string(),
                sample,
            });
        }
        Ok(())
    }

    /// 写入某样本的某输出（只能写一次）
    pub fn record(&mut self, sample: usize, kind: OutputKind, value: ArrayViewD<'_, f64>) -> IoResult<()> {
        self.check_record(sample, kind, value.view())?;

        let mut target = if let Some(a) = self.series.get_mut(&kind) {
            let last = a.ndim() - 1;
            a.view_mut().index_axis_move(Axis(last), sample)
        } else if let Some(a) = self.nodal.get_mut(&kind) {
            a.view_mut().into_dyn().index_axis_move(Axis(1), sample)
        } else {
            return Err(IoError::KindNotAllocated(kind));
        };

        target.assign(&value);
        self.claim(kind.key(), sample)
    }

    /// 设置观测时间（只在第一次调用时生效）
    ///
    /// 返回是否实际写入。
    pub fn record_times(&mut self, kind: OutputKind, times: Array1<f64>) -> IoResult<bool> {
        if !self.series.contains_key(&kind) {
            return Err(IoError::KindNotAllocated(kind));
        }
        if self.times.contains_key(&kind) {
            return Ok(false);
        }
        self.times.insert(kind, times);
        Ok(true)
    }

    /// 分配 QoI 矩阵 (N, num_points)
    pub fn enable_qoi(&mut self, num_points: usize) {
        let n = self.num_samples();
        self.qoi = Some(Array2::zeros((n, num_points)));
        self.written.insert(QOI_KEY.to_string(), vec![false; n]);
    }

    /// 写入某样本的 QoI 行（只能写一次）
    pub fn record_qoi(&mut self, sample: usize, row: ArrayView1<'_, f64>) -> IoResult<()> {
        self.check_sample(sample)?;
        let q = self
            .qoi
            .as_ref()
            .ok_or_else(|| IoError::UnknownKind(QOI_KEY.to_string()))?;
        if q.ncols() != row.len() {
            return Err(IoError::ShapeMismatch {
                kind: QOI_KEY.to_string(),
                expected: vec![q.ncols()],
                actual: vec![row.len()],
            });
        }
        self.claim(QOI_KEY, sample)?;
        if let Some(q) = self.qoi.as_mut() {
            q.row_mut(sample).assign(&row);
        }
        Ok(())
    }

    /// 设置样本状态
    pub fn set_status(&mut self, sample: usize, status: SampleStatus) -> IoResult<()> {
        self.check_sample(sample)?;
        self.status[sample] = status;
        Ok(())
    }

    /// 标记某输出类型已做干点修正
    pub fn mark_corrected(&mut self, kind: OutputKind) {
        self.corrected.insert(kind);
    }
}

impl PartialEq for ResultSet {
    fn eq(&self, other: &Self) -> bool {
        self.samples == other.samples
            && self.series == other.series
            && self.nodal == other.nodal
            && self.times == other.times
            && self.qoi == other.qoi
            && self.status == other.status
            && self.corrected == other.corrected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, Array};

    fn sample_set(n: usize) -> ResultSet {
        let samples = Array2::from_shape_fn((2, n), |(i, j)| (i + j) as f64);
        ResultSet::allocate(samples, &[OutputKind::Fort61, OutputKind::MaxEle63], |kind| {
            if kind.is_time_series() {
                KindShape::series(3, 4)
            } else {
                KindShape::nodal(6)
            }
        })
        .unwrap()
    }

    #[test]
    fn test_allocate_shapes() {
        let rs = sample_set(5);
        assert_eq!(rs.series()[&OutputKind::Fort61].shape(), &[3, 4, 5]);
        assert_eq!(rs.nodal()[&OutputKind::MaxEle63].shape(), &[6, 5]);
        assert_eq!(rs.count_status(SampleStatus::Pending), 5);
    }

    #[test]
    fn test_allocate_rejects_wrong_shape() {
        let samples = Array2::zeros((2, 3));
        let result = ResultSet::allocate(samples, &[OutputKind::Fort61], |_| KindShape::nodal(3));
        assert!(result.is_err());
    }

    #[test]
    fn test_record_once() {
        let mut rs = sample_set(5);
        let value = Array::from_elem(IxDyn(&[6]), 2.5);
        rs.record(2, OutputKind::MaxEle63, value.view()).unwrap();
        assert_eq!(rs.nodal()[&OutputKind::MaxEle63][[4, 2]], 2.5);
        assert_eq!(rs.nodal()[&OutputKind::MaxEle63][[4, 1]], 0.0);

        let err = rs.record(2, OutputKind::MaxEle63, value.view()).unwrap_err();
        assert!(matches!(err, IoError::AlreadyRecorded { sample: 2, .. }));
    }

    #[test]
    fn test_record_series_slice() {
        let mut rs = sample_set(3);
        let value = Array::from_shape_fn(IxDyn(&[3, 4]), |idx| (idx[0] * 10 + idx[1]) as f64);
        rs.record(1, OutputKind::Fort61, value.view()).unwrap();

        let stored = rs.sample_view(OutputKind::Fort61, 1).unwrap();
        assert_eq!(stored, value.view());
        assert_eq!(rs.series()[&OutputKind::Fort61][[2, 3, 1]], 23.0);
    }

    #[test]
    fn test_record_shape_mismatch() {
        let mut rs = sample_set(3);
        let value = Array::zeros(IxDyn(&[5]));
        assert!(matches!(
            rs.record(0, OutputKind::MaxEle63, value.view()),
            Err(IoError::ShapeMismatch { .. })
        ));
        // 形状错误不占用写入标记
        let ok = Array::zeros(IxDyn(&[6]));
        assert!(rs.record(0, OutputKind::MaxEle63, ok.view()).is_ok());
    }

    #[test]
    fn test_check_record_does_not_claim() {
        let mut rs = sample_set(3);
        let value = Array::from_elem(IxDyn(&[3, 4]), 1.0);
        rs.check_record(1, OutputKind::Fort61, value.view()).unwrap();
        assert!(rs.check_record(1, OutputKind::Fort61, Array::zeros(IxDyn(&[4, 3])).view()).is_err());

        rs.record(1, OutputKind::Fort61, value.view()).unwrap();
        assert!(matches!(
            rs.check_record(1, OutputKind::Fort61, value.view()),
            Err(IoError::AlreadyRecorded { sample: 1, .. })
        ));
    }

    #[test]
    fn test_record_out_of_range() {
        let mut rs = sample_set(3);
        let value = Array::zeros(IxDyn(&[6]));
        assert!(matches!(
            rs.record(3, OutputKind::MaxEle63, value.view()),
            Err(IoError::SampleOutOfRange { .. })
        ));
        assert!(matches!(
            rs.record(0, OutputKind::Fort63, value.view()),
            Err(IoError::KindNotAllocated(OutputKind::Fort63))
        ));
    }

    #[test]
    fn test_times_set_once() {
        let mut rs = sample_set(3);
        assert!(rs.record_times(OutputKind::Fort61, arr1(&[1.0, 2.0, 3.0, 4.0])).unwrap());
        assert!(!rs.record_times(OutputKind::Fort61, arr1(&[9.0; 4])).unwrap());
        assert_eq!(rs.times()[&OutputKind::Fort61][0], 1.0);
        assert!(rs.record_times(OutputKind::MaxEle63, arr1(&[0.0])).is_err());
    }

    #[test]
    fn test_qoi_rows() {
        let mut rs = sample_set(3);
        rs.enable_qoi(2);
        rs.record_qoi(1, arr1(&[0.5, 0.7]).view()).unwrap();
        assert!(rs.record_qoi(1, arr1(&[0.0, 0.0]).view()).is_err());
        assert_eq!(rs.qoi().unwrap()[[1, 1]], 0.7);
    }

    #[test]
    fn test_from_parts_marks_settled_written() {
        let mut rs = sample_set(2);
        rs.set_status(0, SampleStatus::Completed).unwrap();
        let rebuilt = ResultSet::from_parts(rs.clone().into_parts()).unwrap();
        assert_eq!(rebuilt, rs);

        let mut rebuilt = rebuilt;
        let value = Array::zeros(IxDyn(&[6]));
        assert!(rebuilt.record(0, OutputKind::MaxEle63, value.view()).is_err());
        assert!(rebuilt.record(1, OutputKind::MaxEle63, value.view()).is_ok());
    }

    #[test]
    fn test_status_codes() {
        for status in [
            SampleStatus::Pending,
            SampleStatus::Completed,
            SampleStatus::RunFailed,
            SampleStatus::TimedOut,
            SampleStatus::CollectFailed,
        ] {
            assert_eq!(SampleStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(SampleStatus::from_code(9.0), None);
    }
}
