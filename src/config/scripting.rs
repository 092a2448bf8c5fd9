//! 脚本配置

use super::network::MAX_VALUE_DEPTH_LIMIT;
use super::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// 进程运行在哪一端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[default]
    Server,
    Client,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Server => f.write_str("server"),
            Side::Client => f.write_str("client"),
        }
    }
}

impl FromStr for Side {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "server" => Ok(Side::Server),
            "client" => Ok(Side::Client),
            other => Err(ConfigError::ParseError(format!("unknown side '{}'", other))),
        }
    }
}

/// 脚本配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptingConfig {
    /// 资源目录根路径
    pub resource_root: PathBuf,

    /// 启动时加载的资源（按顺序）
    pub resources: Vec<String>,

    /// 当前进程所在的一端
    pub side: Side,

    /// 脚本值与 `Value` 互转时的最大嵌套层数
    pub max_value_depth: usize,
}

impl Default for ScriptingConfig {
    fn default() -> Self {
        Self {
            resource_root: PathBuf::from("resources"),
            resources: Vec::new(),
            side: Side::Server,
            max_value_depth: 32,
        }
    }
}

impl ScriptingConfig {
    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if !(1..=MAX_VALUE_DEPTH_LIMIT).contains(&self.max_value_depth) {
            return Err(ConfigError::ValidationError(format!(
                "scripting max_value_depth must be between 1 and {}",
                MAX_VALUE_DEPTH_LIMIT
            )));
        }
        if let Some(bad) = self
            .resources
            .iter()
            .find(|name| name.trim().is_empty() || name.contains(['/', '\\']))
        {
            return Err(ConfigError::ValidationError(format!(
                "invalid resource name '{}'",
                bad
            )));
        }
        Ok(())
    }
}
