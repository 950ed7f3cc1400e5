// crates/ms_analysis/src/units.rs

//! 时间单位换算

use std::fmt;
use std::str::FromStr;

use ms_io::{OutputKind, ResultSet};

use crate::error::{AnalysisError, AnalysisResult};

const SECONDS_PER_HOUR: f64 = 3600.0;
const SECONDS_PER_DAY: f64 = 86400.0;

/// 时间单位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    /// 秒
    Seconds,
    /// 小时
    Hours,
    /// 天
    Days,
}

impl TimeUnit {
    /// 每单位的秒数
    pub fn seconds(self) -> f64 {
        match self {
            TimeUnit::Seconds => 1.0,
            TimeUnit::Hours => SECONDS_PER_HOUR,
            TimeUnit::Days => SECONDS_PER_DAY,
        }
    }
}

impl FromStr for TimeUnit {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "s" | "sec" | "seconds" => Ok(TimeUnit::Seconds),
            "h" | "hours" => Ok(TimeUnit::Hours),
            "d" | "days" => Ok(TimeUnit::Days),
            other => Err(AnalysisError::InvalidArgument(format!("未知时间单位: {other}"))),
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TimeUnit::Seconds => "seconds",
            TimeUnit::Hours => "hours",
            TimeUnit::Days => "days",
        })
    }
}

/// 将全部观测时间向量从 `from` 换算到 `to`
pub fn convert_times(results: &mut ResultSet, from: TimeUnit, to: TimeUnit) {
    let (from_s, to_s) = (from.seconds(), to.seconds());
    let kinds: Vec<OutputKind> = results.times().keys().copied().collect();
    for kind in kinds {
        if let Some(times) = results.times_mut(kind) {
            times.mapv_inplace(|t| t * from_s / to_s);
        }
    }
}

/// 观测时间由秒换算为小时
pub fn convert_to_hours(results: &mut ResultSet) {
    convert_times(results, TimeUnit::Seconds, TimeUnit::Hours);
}

/// 观测时间由秒换算为天
pub fn convert_to_days(results: &mut ResultSet) {
    convert_times(results, TimeUnit::Seconds, TimeUnit::Days);
}

/// 将淹没时长 (`tinun63`) 由秒换算为占总模拟天数的比例
pub fn inundation_to_fraction(results: &mut ResultSet, run_days: f64) -> AnalysisResult<()> {
    if run_days.is_nan() || run_days <= 0.0 {
        return Err(AnalysisError::InvalidArgument(format!(
            "模拟天数必须为正: {run_days}"
        )));
    }
    let mut view = results
        .view_mut(OutputKind::TinUn63)
        .ok_or(AnalysisError::KindMissing(OutputKind::TinUn63))?;
    let total = SECONDS_PER_DAY * run_days;
    view.mapv_inplace(|t| t / total);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ms_io::KindShape;
    use ndarray::{arr1, Array, Array2};

    fn with_times() -> ResultSet {
        let mut rs = ResultSet::allocate(
            Array2::zeros((1, 1)),
            &[OutputKind::Fort61, OutputKind::TinUn63],
            |k| {
                if k.is_time_series() {
                    KindShape::series(1, 3)
                } else {
                    KindShape::nodal(2)
                }
            },
        )
        .unwrap();
        rs.record_times(OutputKind::Fort61, arr1(&[0.0, 43200.0, 86400.0])).unwrap();
        rs
    }

    #[test]
    fn test_convert_to_hours_and_days() {
        let mut rs = with_times();
        convert_to_hours(&mut rs);
        assert_eq!(rs.times()[&OutputKind::Fort61].to_vec(), vec![0.0, 12.0, 24.0]);

        let mut rs = with_times();
        convert_to_days(&mut rs);
        assert_eq!(rs.times()[&OutputKind::Fort61].to_vec(), vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_inundation_fraction() {
        let mut rs = with_times();
        let value = Array::from_vec(vec![86400.0, 43200.0]).into_dyn();
        rs.record(0, OutputKind::TinUn63, value.view()).unwrap();

        inundation_to_fraction(&mut rs, 2.0).unwrap();
        let tinun = &rs.nodal()[&OutputKind::TinUn63];
        assert_eq!(tinun[[0, 0]], 0.5);
        assert_eq!(tinun[[1, 0]], 0.25);
        assert!(inundation_to_fraction(&mut rs, 0.0).is_err());
    }

    #[test]
    fn test_parse_unit() {
        assert_eq!("H".parse::<TimeUnit>().unwrap(), TimeUnit::Hours);
        assert!("weeks".parse::<TimeUnit>().is_err());
    }
}
