//! 引擎自身的配置
//!
//! 只覆盖引擎的环境项（日志等），不负责任何业务声明的装载。

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// 日志级别：trace / debug / info / warn / error
    pub level: String,

    /// 日志格式：compact / full / json / pretty
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// 引擎配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub logging: LoggingSettings,
}

impl EngineSettings {
    /// 从 TOML 文本解析配置
    pub fn from_toml(text: &str) -> CoreResult<Self> {
        toml::from_str(text).map_err(|e| CoreError::InvalidSettings(e.to_string()))
    }
}
