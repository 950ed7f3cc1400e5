// crates/ms_io/src/merge.rs

//! 结果集合并
//!
//! 将独立产生的结果集沿样本轴（最后一维）拼接。
//! 前置条件：两侧的输出类型集合一致，且除样本轴外形状一致。
//! 拼接对有序分片满足结合律，但与顺序相关。

use ndarray::{concatenate as nd_concatenate, Array, Axis, Dimension, RemoveAxis};
use std::collections::BTreeMap;
use tracing::debug;

use ms_foundation::MsError;

use crate::checkpoint::SAMPLES_KEY;
use crate::error::{IoError, IoResult};
use crate::kinds::OutputKind;
use crate::results::{ResultSet, QOI_KEY};

/// 拼接两个结果集：`a` 的样本在前，`b` 的样本在后
///
/// 观测时间向量同样沿最后一维逐字拼接。
pub fn concatenate(a: ResultSet, b: &ResultSet) -> IoResult<ResultSet> {
    let mut parts = a.into_parts();

    if parts.samples.nrows() != b.basis_dim() {
        return Err(IoError::merge_mismatch(
            SAMPLES_KEY,
            parts.samples.shape(),
            b.samples().shape(),
        ));
    }
    parts.samples = join(SAMPLES_KEY, &parts.samples, b.samples())?;

    parts.series = join_map(&parts.series, b.series(), |k| k.key().to_string())?;
    parts.nodal = join_map(&parts.nodal, b.nodal(), |k| k.key().to_string())?;
    parts.times = join_map(&parts.times, b.times(), |k| k.time_key())?;

    parts.qoi = match (&parts.qoi, b.qoi()) {
        (None, None) => None,
        (Some(qa), Some(qb)) => {
            if qa.ncols() != qb.ncols() {
                return Err(IoError::merge_mismatch(QOI_KEY, qa.shape(), qb.shape()));
            }
            let joined = nd_concatenate(Axis(0), &[qa.view(), qb.view()])
                .map_err(|_| IoError::merge_mismatch(QOI_KEY, qa.shape(), qb.shape()))?;
            Some(joined)
        }
        (Some(qa), None) => return Err(IoError::merge_mismatch(QOI_KEY, qa.shape(), &[])),
        (None, Some(qb)) => return Err(IoError::merge_mismatch(QOI_KEY, &[], qb.shape())),
    };

    parts.status.extend_from_slice(b.statuses());

    if &parts.corrected != b.corrected() {
        return Err(IoError::Foundation(MsError::invalid_input(format!(
            "干点修正状态不一致: {:?} vs {:?}",
            parts.corrected,
            b.corrected()
        ))));
    }

    debug!(samples = parts.samples.ncols(), "结果集已拼接");
    ResultSet::from_parts(parts)
}

/// 按顺序折叠拼接多个分片
pub fn concatenate_all<I>(shards: I) -> IoResult<ResultSet>
where
    I: IntoIterator<Item = ResultSet>,
{
    let mut iter = shards.into_iter();
    let first = iter
        .next()
        .ok_or_else(|| IoError::Foundation(MsError::invalid_input("没有可合并的结果集")))?;
    iter.try_fold(first, |acc, shard| concatenate(acc, &shard))
}

fn join_map<D, F>(
    left: &BTreeMap<OutputKind, Array<f64, D>>,
    right: &BTreeMap<OutputKind, Array<f64, D>>,
    key_of: F,
) -> IoResult<BTreeMap<OutputKind, Array<f64, D>>>
where
    D: Dimension + RemoveAxis,
    F: Fn(OutputKind) -> String,
{
    if let Some((kind, ra)) = right.iter().find(|(k, _)| !left.contains_key(k)) {
        return Err(IoError::merge_mismatch(key_of(*kind), &[], ra.shape()));
    }

    let mut out = BTreeMap::new();
    for (kind, la) in left {
        let key = key_of(*kind);
        let ra = right
            .get(kind)
            .ok_or_else(|| IoError::merge_mismatch(key.clone(), la.shape(), &[]))?;
        out.insert(*kind, join(&key, la, ra)?);
    }
    Ok(out)
}

fn join<D: Dimension + RemoveAxis>(
    key: &str,
    left: &Array<f64, D>,
    right: &Array<f64, D>,
) -> IoResult<Array<f64, D>> {
    let (ls, rs) = (left.shape(), right.shape());
    let last = left.ndim() - 1;
    if ls.len() != rs.len() || ls[..last] != rs[..last] {
        return Err(IoError::merge_mismatch(key, ls, rs));
    }
    nd_concatenate(Axis(last), &[left.view(), right.view()])
        .map_err(|_| IoError::merge_mismatch(key, ls, rs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::KindShape;
    use crate::results::SampleStatus;
    use ndarray::{arr1, Array2, IxDyn};

    fn shard(offset: usize, n: usize, locations: usize) -> ResultSet {
        let samples = Array2::from_shape_fn((2, n), |(i, j)| (offset + j) as f64 + i as f64 * 0.1);
        let mut rs = ResultSet::allocate(samples, &[OutputKind::MaxEle63], |_| {
            KindShape::nodal(locations)
        })
        .unwrap();
        for s in 0..n {
            let v = Array::from_elem(IxDyn(&[locations]), (offset + s) as f64);
            rs.record(s, OutputKind::MaxEle63, v.view()).unwrap();
            rs.set_status(s, SampleStatus::Completed).unwrap();
        }
        rs
    }

    #[test]
    fn test_concatenate_orders_samples() {
        let merged = concatenate(shard(0, 2, 4), &shard(2, 3, 4)).unwrap();
        assert_eq!(merged.num_samples(), 5);
        let maxele = &merged.nodal()[&OutputKind::MaxEle63];
        assert_eq!(maxele.row(0).to_vec(), vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(merged.samples()[[0, 4]], 4.0);
        assert_eq!(merged.count_status(SampleStatus::Completed), 5);
    }

    #[test]
    fn test_shape_mismatch() {
        let err = concatenate(shard(0, 2, 4), &shard(2, 2, 5)).unwrap_err();
        assert!(matches!(err, IoError::MergeShapeMismatch { ref key, .. } if key == "maxele63"));
    }

    #[test]
    fn test_kind_set_mismatch() {
        let samples = Array2::zeros((2, 1));
        let other = ResultSet::allocate(samples, &[OutputKind::MaxVel63], |_| KindShape::nodal(4))
            .unwrap();
        assert!(matches!(
            concatenate(shard(0, 1, 4), &other),
            Err(IoError::MergeShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_times_concatenated_literally() {
        let build = |t: f64| {
            let samples = Array2::zeros((1, 1));
            let mut rs = ResultSet::allocate(samples, &[OutputKind::Fort61], |_| {
                KindShape::series(1, 2)
            })
            .unwrap();
            rs.record_times(OutputKind::Fort61, arr1(&[t, t + 1.0])).unwrap();
            rs
        };
        let merged = concatenate(build(0.0), &build(10.0)).unwrap();
        assert_eq!(merged.times()[&OutputKind::Fort61].to_vec(), vec![0.0, 1.0, 10.0, 11.0]);
    }

    #[test]
    fn test_concatenate_all_empty() {
        assert!(concatenate_all(Vec::new()).is_err());
    }
}
