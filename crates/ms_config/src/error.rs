// crates/ms_config/src/error.rs

//! 配置层错误类型

use ms_foundation::MsError;

/// 配置错误
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 解析错误
    #[error("解析错误: {0}")]
    Parse(String),

    /// 无效值
    #[error("无效值 '{key}': {value} - {reason}")]
    InvalidValue {
        /// 配置键
        key: String,
        /// 配置值
        value: String,
        /// 原因
        reason: String,
    },

    /// 缺失配置
    #[error("缺失配置: {0}")]
    Missing(String),
}

impl ConfigError {
    /// 构造无效值错误
    pub fn invalid(key: &str, value: impl ToString, reason: &str) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<ConfigError> for MsError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Io(e) => MsError::io_with_source("读取配置失败", e),
            ConfigError::Parse(msg) => MsError::config(format!("配置解析失败: {msg}")),
            ConfigError::InvalidValue { key, value, reason } => {
                MsError::invalid_config(key, value, reason)
            }
            ConfigError::Missing(key) => MsError::config(format!("缺失配置: {key}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::invalid("pool.size", 0, "必须为正");
        assert!(err.to_string().contains("pool.size"));
    }

    #[test]
    fn test_into_ms_error() {
        let err: MsError = ConfigError::invalid("pool.size", 0, "必须为正").into();
        assert!(err.is_config());
    }
}
