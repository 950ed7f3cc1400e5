// crates/ms_workflow/src/collaborators.rs

//! 外部协作者接口
//!
//! 扫描驱动不理解求解器的原生文件格式，只通过以下 trait 与之交互：
//!
//! - [`FieldSynthesizer`]: 由样本权重生成每个样本的参数场文件
//! - [`OutputCollector`]: 从槽位目录读取求解器输出为数组

use ndarray::{Array1, ArrayD, ArrayView1};
use std::collections::BTreeMap;
use std::fmt::Write as _;

use ms_foundation::{MsError, MsResult};
use ms_io::OutputKind;

use crate::slots::Slot;

/// 写入槽位的参数场文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldArtifact {
    /// 槽位内文件名
    pub file_name: String,
    /// 文件内容
    pub contents: Vec<u8>,
}

impl FieldArtifact {
    /// 创建参数场文件
    pub fn new(file_name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            contents: contents.into(),
        }
    }
}

/// 参数场生成器
pub trait FieldSynthesizer: Send + Sync {
    /// 为全局样本 `sample` 生成参数场，`weights` 为样本矩阵的对应列
    fn synthesize(&self, sample: usize, weights: ArrayView1<'_, f64>) -> MsResult<FieldArtifact>;
}

/// 单个样本采集到的输出
#[derive(Debug, Clone, Default)]
pub struct CollectedSample {
    /// 各输出类型的单样本数组（不含样本轴）
    pub arrays: BTreeMap<OutputKind, ArrayD<f64>>,
    /// 时间序列输出的观测时间
    pub times: BTreeMap<OutputKind, Array1<f64>>,
}

/// 输出采集器
pub trait OutputCollector: Send + Sync {
    /// 从槽位读取请求的输出类型
    fn collect(&self, slot: &Slot, kinds: &[OutputKind]) -> MsResult<CollectedSample>;
}

// ============================================================
// 基函数组合
// ============================================================

/// 稀疏基函数：1 起节点编号 → 值
pub type BasisVector = BTreeMap<usize, f64>;

/// 按权重组合基函数
///
/// 被任一基函数覆盖的节点取 `Σ w_j · b_j`，其余节点取默认场的值。
pub fn combine(
    weights: ArrayView1<'_, f64>,
    basis: &[BasisVector],
    default_field: ArrayView1<'_, f64>,
    num_locations: usize,
) -> MsResult<Array1<f64>> {
    if weights.len() != basis.len() {
        return Err(MsError::size_mismatch("basis weights", basis.len(), weights.len()));
    }
    if default_field.len() != num_locations {
        return Err(MsError::size_mismatch("default field", num_locations, default_field.len()));
    }

    let mut field = default_field.to_owned();
    let mut covered = vec![false; num_locations];
    for (w, vector) in weights.iter().zip(basis) {
        for (&id, &value) in vector {
            if id == 0 || id > num_locations {
                return Err(MsError::index_out_of_bounds("basis node", id, num_locations + 1));
            }
            let row = id - 1;
            if !covered[row] {
                covered[row] = true;
                field[row] = 0.0;
            }
            field[row] += w * value;
        }
    }
    Ok(field)
}

/// 基于 [`combine`] 的参数场生成器
///
/// 输出为简单的节点属性文本：首行节点数，之后每行 `编号 值`。
#[derive(Debug, Clone)]
pub struct BasisCombination {
    basis: Vec<BasisVector>,
    default_field: Array1<f64>,
    file_name: String,
}

impl BasisCombination {
    /// 创建生成器
    pub fn new(
        basis: Vec<BasisVector>,
        default_field: Array1<f64>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            basis,
            default_field,
            file_name: file_name.into(),
        }
    }

    /// 节点数
    pub fn num_locations(&self) -> usize {
        self.default_field.len()
    }

    /// 基函数个数
    pub fn basis_dim(&self) -> usize {
        self.basis.len()
    }

    /// 组合得到节点场
    pub fn field(&self, weights: ArrayView1<'_, f64>) -> MsResult<Array1<f64>> {
        combine(weights, &self.basis, self.default_field.view(), self.num_locations())
    }
}

impl FieldSynthesizer for BasisCombination {
    fn synthesize(&self, _sample: usize, weights: ArrayView1<'_, f64>) -> MsResult<FieldArtifact> {
        let field = self.field(weights)?;
        let mut text = String::with_capacity(field.len() * 16);
        let _ = writeln!(text, "{}", field.len());
        for (i, v) in field.iter().enumerate() {
            let _ = writeln!(text, "{} {:.8}", i + 1, v);
        }
        Ok(FieldArtifact::new(self.file_name.clone(), text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    fn basis() -> Vec<BasisVector> {
        vec![
            BTreeMap::from([(1, 1.0), (2, 0.5)]),
            BTreeMap::from([(2, 0.5), (3, 1.0)]),
        ]
    }

    #[test]
    fn test_combine_uses_default_outside_support() {
        let field = combine(
            arr1(&[0.02, 0.04]).view(),
            &basis(),
            arr1(&[0.1, 0.1, 0.1, 0.1]).view(),
            4,
        )
        .unwrap();
        assert!((field[0] - 0.02).abs() < 1e-15);
        assert!((field[1] - 0.03).abs() < 1e-15);
        assert!((field[2] - 0.04).abs() < 1e-15);
        assert_eq!(field[3], 0.1);
    }

    #[test]
    fn test_combine_size_mismatch() {
        let err = combine(arr1(&[1.0]).view(), &basis(), arr1(&[0.0; 4]).view(), 4).unwrap_err();
        assert!(matches!(err, MsError::SizeMismatch { .. }));
    }

    #[test]
    fn test_synthesized_artifact_text() {
        let synth = BasisCombination::new(basis(), arr1(&[0.1; 3]), "fort.13");
        let artifact = synth.synthesize(0, arr1(&[1.0, 0.0]).view()).unwrap();
        let text = String::from_utf8(artifact.contents).unwrap();
        assert_eq!(artifact.file_name, "fort.13");
        assert_eq!(text.lines().next(), Some("3"));
        assert_eq!(text.lines().nth(2), Some("2 0.50000000"));
    }
}
