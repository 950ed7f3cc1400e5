// crates/ms_analysis/src/qoi.rs

//! QoI (Quantity of Interest) 插值
//!
//! 将每个样本的节点场（通常为 `maxele63`）插值到固定的查询点上，
//! 得到 QoI 矩阵的一行。
//!
//! 默认插值器为反距离加权 (IDW)：
//!
//! $$
//! z(x) = \frac{\sum_{i} w_i z_i}{\sum_{i} w_i}, \quad w_i = d_i^{-p}
//! $$
//!
//! 邻居不足时返回 `NaN`，与查询点落在网格外时的表现一致。

use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, AnalysisResult};

/// 二维点
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2 {
    /// x 坐标
    pub x: f64,
    /// y 坐标
    pub y: f64,
}

impl Point2 {
    /// 创建点
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// 欧氏距离
    pub fn distance(&self, other: &Point2) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// 空间插值器
pub trait SpatialInterpolator: Send + Sync {
    /// 由已知点及其值计算查询点上的值
    fn interpolate(
        &self,
        known: &[Point2],
        values: ArrayView1<'_, f64>,
        query: &[Point2],
    ) -> AnalysisResult<Array1<f64>>;
}

/// IDW 插值配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdwConfig {
    /// 距离指数 (p)，默认 2
    pub power: f64,
    /// 搜索半径限制，None 表示无限制
    pub search_radius: Option<f64>,
    /// 最大邻居数限制，None 表示无限制
    pub max_neighbors: Option<usize>,
    /// 最小邻居数，不足时结果为 NaN
    pub min_neighbors: usize,
    /// 距离容差（小于此值视为在采样点上）
    pub distance_tolerance: f64,
}

impl Default for IdwConfig {
    fn default() -> Self {
        Self {
            power: 2.0,
            search_radius: None,
            max_neighbors: Some(8),
            min_neighbors: 1,
            distance_tolerance: 1e-10,
        }
    }
}

/// IDW 插值器
#[derive(Debug, Clone, Default)]
pub struct IdwInterpolator {
    config: IdwConfig,
}

impl IdwInterpolator {
    /// 使用默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用指定配置
    pub fn with_config(config: IdwConfig) -> Self {
        Self { config }
    }

    /// 设置距离指数
    pub fn with_power(mut self, power: f64) -> Self {
        self.config.power = power;
        self
    }

    /// 设置搜索半径
    pub fn with_search_radius(mut self, radius: f64) -> Self {
        self.config.search_radius = Some(radius);
        self
    }

    /// 设置最大邻居数
    pub fn with_max_neighbors(mut self, n: Option<usize>) -> Self {
        self.config.max_neighbors = n;
        self
    }

    /// 获取配置
    pub fn config(&self) -> &IdwConfig {
        &self.config
    }

    fn at(&self, known: &[Point2], values: &ArrayView1<'_, f64>, q: &Point2) -> f64 {
        let mut distances: Vec<(usize, f64)> = known
            .iter()
            .enumerate()
            .map(|(i, p)| (i, p.distance(q)))
            .collect();

        if let Some(&(idx, _)) = distances
            .iter()
            .find(|(_, d)| *d < self.config.distance_tolerance)
        {
            return values[idx];
        }

        if let Some(radius) = self.config.search_radius {
            distances.retain(|&(_, d)| d <= radius);
        }
        if distances.is_empty() || distances.len() < self.config.min_neighbors {
            return f64::NAN;
        }

        distances.sort_by(|a, b| a.1.total_cmp(&b.1));
        if let Some(max_n) = self.config.max_neighbors {
            distances.truncate(max_n);
        }

        let p = self.config.power;
        let (mut weight_sum, mut value_sum) = (0.0, 0.0);
        for (idx, dist) in distances {
            let w = 1.0 / dist.powf(p);
            weight_sum += w;
            value_sum += w * values[idx];
        }

        if weight_sum > 0.0 {
            value_sum / weight_sum
        } else {
            f64::NAN
        }
    }
}

impl SpatialInterpolator for IdwInterpolator {
    fn interpolate(
        &self,
        known: &[Point2],
        values: ArrayView1<'_, f64>,
        query: &[Point2],
    ) -> AnalysisResult<Array1<f64>> {
        if known.len() != values.len() {
            return Err(AnalysisError::SizeMismatch {
                name: "known values",
                expected: known.len(),
                actual: values.len(),
            });
        }
        Ok(query.iter().map(|q| self.at(known, &values, q)).collect())
    }
}

/// QoI 采样器：固定已知点（节点坐标）与查询点
pub struct QoiSampler {
    known: Vec<Point2>,
    query: Vec<Point2>,
    interpolator: Box<dyn SpatialInterpolator>,
}

impl QoiSampler {
    /// 创建采样器
    pub fn new(
        known: Vec<Point2>,
        query: Vec<Point2>,
        interpolator: Box<dyn SpatialInterpolator>,
    ) -> AnalysisResult<Self> {
        if known.is_empty() {
            return Err(AnalysisError::InvalidArgument("已知点为空".into()));
        }
        Ok(Self {
            known,
            query,
            interpolator,
        })
    }

    /// 使用默认 IDW 插值器
    pub fn idw(known: Vec<Point2>, query: Vec<Point2>) -> AnalysisResult<Self> {
        Self::new(known, query, Box::new(IdwInterpolator::new()))
    }

    /// 查询点个数（QoI 矩阵列数）
    pub fn num_points(&self) -> usize {
        self.query.len()
    }

    /// 已知点个数
    pub fn num_known(&self) -> usize {
        self.known.len()
    }

    /// 计算一个样本的 QoI 行
    pub fn sample(&self, values: ArrayView1<'_, f64>) -> AnalysisResult<Array1<f64>> {
        self.interpolator.interpolate(&self.known, values, &self.query)
    }
}

impl std::fmt::Debug for QoiSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QoiSampler")
            .field("known", &self.known.len())
            .field("query", &self.query.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    fn square() -> Vec<Point2> {
        vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(0.0, 1.0),
            Point2::new(1.0, 1.0),
        ]
    }

    #[test]
    fn test_exact_point_returns_value() {
        let idw = IdwInterpolator::new();
        let out = idw
            .interpolate(&square(), arr1(&[1.0, 2.0, 3.0, 4.0]).view(), &[Point2::new(1.0, 0.0)])
            .unwrap();
        assert_eq!(out[0], 2.0);
    }

    #[test]
    fn test_center_is_mean() {
        let idw = IdwInterpolator::new();
        let out = idw
            .interpolate(&square(), arr1(&[1.0, 2.0, 3.0, 4.0]).view(), &[Point2::new(0.5, 0.5)])
            .unwrap();
        assert!((out[0] - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_outside_radius_is_nan() {
        let idw = IdwInterpolator::new().with_search_radius(0.5);
        let out = idw
            .interpolate(&square(), arr1(&[1.0; 4]).view(), &[Point2::new(10.0, 10.0)])
            .unwrap();
        assert!(out[0].is_nan());
    }

    #[test]
    fn test_size_mismatch() {
        let idw = IdwInterpolator::new();
        assert!(idw
            .interpolate(&square(), arr1(&[1.0, 2.0]).view(), &[Point2::new(0.0, 0.0)])
            .is_err());
    }

    #[test]
    fn test_sampler_row_length() {
        let sampler = QoiSampler::idw(square(), vec![Point2::new(0.2, 0.2), Point2::new(0.9, 0.9)])
            .unwrap();
        let row = sampler.sample(arr1(&[0.0, 0.0, 0.0, 0.0]).view()).unwrap();
        assert_eq!(sampler.num_points(), 2);
        assert_eq!(row.to_vec(), vec![0.0, 0.0]);
    }
}
