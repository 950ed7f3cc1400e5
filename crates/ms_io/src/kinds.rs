// crates/ms_io/src/kinds.rs

//! 输出类型注册表
//!
//! 求解器输出以封闭枚举 [`OutputKind`] 表示，只有在检查点边界处才
//! 转换为字符串键（如 `fort61`、`maxele63`）。每种输出的数组形状由
//! [`KindShape`] 描述，样本轴总是最后一维。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::IoError;

/// 求解器输出类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OutputKind {
    /// 测站水位时间序列
    Fort61,
    /// 测站流速时间序列（矢量）
    Fort62,
    /// 全域节点水位时间序列
    Fort63,
    /// 全域节点流速时间序列（矢量）
    Fort64,
    /// 气象测站气压时间序列
    Fort71,
    /// 气象测站风速时间序列（矢量）
    Fort72,
    /// 全域节点气压时间序列
    Fort73,
    /// 全域节点风速时间序列（矢量）
    Fort74,
    /// 节点最高水位
    MaxEle63,
    /// 节点最大流速
    MaxVel63,
    /// 节点最大风速
    MaxWvel63,
    /// 节点最低气压
    MinPr63,
    /// 节点淹没时长
    TinUn63,
    /// 节点最高水位出现时刻
    TimeMax63,
}

impl OutputKind {
    /// 全部输出类型
    pub const ALL: [OutputKind; 14] = [
        OutputKind::Fort61,
        OutputKind::Fort62,
        OutputKind::Fort63,
        OutputKind::Fort64,
        OutputKind::Fort71,
        OutputKind::Fort72,
        OutputKind::Fort73,
        OutputKind::Fort74,
        OutputKind::MaxEle63,
        OutputKind::MaxVel63,
        OutputKind::MaxWvel63,
        OutputKind::MinPr63,
        OutputKind::TinUn63,
        OutputKind::TimeMax63,
    ];

    /// 求解器写出的文件名
    pub fn file_name(self) -> &'static str {
        match self {
            OutputKind::Fort61 => "fort.61",
            OutputKind::Fort62 => "fort.62",
            OutputKind::Fort63 => "fort.63",
            OutputKind::Fort64 => "fort.64",
            OutputKind::Fort71 => "fort.71",
            OutputKind::Fort72 => "fort.72",
            OutputKind::Fort73 => "fort.73",
            OutputKind::Fort74 => "fort.74",
            OutputKind::MaxEle63 => "maxele.63",
            OutputKind::MaxVel63 => "maxvel.63",
            OutputKind::MaxWvel63 => "maxwvel.63",
            OutputKind::MinPr63 => "minpr.63",
            OutputKind::TinUn63 => "tinun.63",
            OutputKind::TimeMax63 => "timemax63",
        }
    }

    /// 检查点中使用的键（文件名去掉 `.`）
    pub fn key(self) -> &'static str {
        match self {
            OutputKind::Fort61 => "fort61",
            OutputKind::Fort62 => "fort62",
            OutputKind::Fort63 => "fort63",
            OutputKind::Fort64 => "fort64",
            OutputKind::Fort71 => "fort71",
            OutputKind::Fort72 => "fort72",
            OutputKind::Fort73 => "fort73",
            OutputKind::Fort74 => "fort74",
            OutputKind::MaxEle63 => "maxele63",
            OutputKind::MaxVel63 => "maxvel63",
            OutputKind::MaxWvel63 => "maxwvel63",
            OutputKind::MinPr63 => "minpr63",
            OutputKind::TinUn63 => "tinun63",
            OutputKind::TimeMax63 => "timemax63",
        }
    }

    /// 观测时间向量的检查点键
    pub fn time_key(self) -> String {
        format!("{}_time", self.key())
    }

    /// 由检查点键或文件名解析
    pub fn from_key(key: &str) -> Option<Self> {
        let normalized: String = key.chars().filter(|c| *c != '.').collect();
        Self::ALL.into_iter().find(|k| k.key() == normalized)
    }

    /// 是否为时间序列输出
    pub fn is_time_series(self) -> bool {
        matches!(
            self,
            OutputKind::Fort61
                | OutputKind::Fort62
                | OutputKind::Fort63
                | OutputKind::Fort64
                | OutputKind::Fort71
                | OutputKind::Fort72
                | OutputKind::Fort73
                | OutputKind::Fort74
        )
    }

    /// 是否为矢量输出（带分量维）
    pub fn is_vector(self) -> bool {
        matches!(
            self,
            OutputKind::Fort62 | OutputKind::Fort64 | OutputKind::Fort72 | OutputKind::Fort74
        )
    }

    /// 位置维对应的对象
    pub fn location(self) -> LocationKind {
        match self {
            OutputKind::Fort61 => LocationKind::ElevationStation,
            OutputKind::Fort62 => LocationKind::VelocityStation,
            OutputKind::Fort71 | OutputKind::Fort72 => LocationKind::MetStation,
            _ => LocationKind::Node,
        }
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for OutputKind {
    type Err = IoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_key(s).ok_or_else(|| IoError::UnknownKind(s.to_string()))
    }
}

/// 位置维类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationKind {
    /// 网格节点
    Node,
    /// 水位测站
    ElevationStation,
    /// 流速测站
    VelocityStation,
    /// 气象测站
    MetStation,
}

/// 单个样本的数组形状（不含样本轴）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindShape {
    /// 位置数（节点或测站）
    pub locations: usize,
    /// 时间步数，非时间序列为 None
    pub timesteps: Option<usize>,
    /// 矢量分量数，标量为 None
    pub components: Option<usize>,
}

impl KindShape {
    /// 非时间序列 (locations,)
    pub fn nodal(locations: usize) -> Self {
        Self {
            locations,
            timesteps: None,
            components: None,
        }
    }

    /// 标量时间序列 (locations, timesteps)
    pub fn series(locations: usize, timesteps: usize) -> Self {
        Self {
            locations,
            timesteps: Some(timesteps),
            components: None,
        }
    }

    /// 矢量时间序列 (locations, timesteps, components)
    pub fn vector_series(locations: usize, timesteps: usize, components: usize) -> Self {
        Self {
            locations,
            timesteps: Some(timesteps),
            components: Some(components),
        }
    }

    /// 单样本维度
    pub fn sample_dims(&self) -> Vec<usize> {
        let mut dims = vec![self.locations];
        dims.extend(self.timesteps);
        dims.extend(self.components);
        dims
    }

    /// 含样本轴的完整维度
    pub fn full_dims(&self, num_samples: usize) -> Vec<usize> {
        let mut dims = self.sample_dims();
        dims.push(num_samples);
        dims
    }
}

/// 网格与测站规模，用于推导各输出类型的形状
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GridDims {
    /// 节点数
    pub nodes: usize,
    /// 水位测站数
    pub elevation_stations: usize,
    /// 流速测站数
    pub velocity_stations: usize,
    /// 气象测站数
    pub met_stations: usize,
}

impl GridDims {
    /// 给定记录步数时某输出类型的形状
    pub fn shape_of(&self, kind: OutputKind, timesteps: usize) -> KindShape {
        let locations = match kind.location() {
            LocationKind::Node => self.nodes,
            LocationKind::ElevationStation => self.elevation_stations,
            LocationKind::VelocityStation => self.velocity_stations,
            LocationKind::MetStation => self.met_stations,
        };
        match (kind.is_time_series(), kind.is_vector()) {
            (false, _) => KindShape::nodal(locations),
            (true, false) => KindShape::series(locations, timesteps),
            (true, true) => KindShape::vector_series(locations, timesteps, 2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_round_trip() {
        for kind in OutputKind::ALL {
            assert_eq!(OutputKind::from_key(kind.key()), Some(kind));
            assert_eq!(OutputKind::from_key(kind.file_name()), Some(kind));
        }
        assert_eq!(OutputKind::from_key("fort99"), None);
    }

    #[test]
    fn test_parse() {
        let kind: OutputKind = "maxele.63".parse().unwrap();
        assert_eq!(kind, OutputKind::MaxEle63);
        assert!("bogus".parse::<OutputKind>().is_err());
    }

    #[test]
    fn test_time_key() {
        assert_eq!(OutputKind::Fort61.time_key(), "fort61_time");
    }

    #[test]
    fn test_shapes() {
        let dims = GridDims {
            nodes: 100,
            elevation_stations: 3,
            velocity_stations: 2,
            met_stations: 1,
        };
        assert_eq!(dims.shape_of(OutputKind::MaxEle63, 20).full_dims(5), vec![100, 5]);
        assert_eq!(dims.shape_of(OutputKind::Fort61, 20).full_dims(5), vec![3, 20, 5]);
        assert_eq!(dims.shape_of(OutputKind::Fort62, 20).full_dims(5), vec![2, 20, 2, 5]);
        assert_eq!(dims.shape_of(OutputKind::Fort74, 7).sample_dims(), vec![100, 7, 2]);
    }
}
