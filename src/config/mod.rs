/// 统一配置系统
///
/// 提供TOML/JSON配置文件、`SCRIPTLINK_*` 环境变量覆盖和配置验证
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub mod network;
pub mod scripting;

pub use network::NetworkConfig;
pub use scripting::{ScriptingConfig, Side};

use crate::{env_override, impl_default};

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 文件读取错误
    #[error("Config file error: {0}")]
    FileError(#[from] std::io::Error),
    /// 解析错误
    #[error("Config parse error: {0}")]
    ParseError(String),
    /// 验证错误
    #[error("Config validation error: {0}")]
    ValidationError(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// 桥接层主配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// 网络配置
    #[serde(default)]
    pub network: NetworkConfig,

    /// 脚本配置
    #[serde(default)]
    pub scripting: ScriptingConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BridgeConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 从TOML文件加载配置
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_toml_str(&content)
    }

    /// 从TOML字符串解析配置
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 从JSON文件加载配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_json_str(&content)
    }

    /// 从JSON字符串解析配置
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 按扩展名加载（`.json` 为 JSON，其余按 TOML）
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_file(path),
            _ => Self::from_toml_file(path),
        }
    }

    /// 保存为TOML文件
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        fs::write(path, content).map_err(ConfigError::FileError)
    }

    /// 保存为JSON文件
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        fs::write(path, content).map_err(ConfigError::FileError)
    }

    /// 从环境变量覆盖配置
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    /// 用任意键值来源覆盖配置，键名与环境变量相同
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // 网络配置
        env_override!(lookup,
            "SCRIPTLINK_BROADCAST_TO_SELF" => self.network.broadcast_to_self,
            "SCRIPTLINK_DEFAULT_CHANNEL" => self.network.default_channel,
            "SCRIPTLINK_COMPRESSION_THRESHOLD" => self.network.compression_threshold,
            "SCRIPTLINK_ENABLE_COMPRESSION" => self.network.enable_compression,
            "SCRIPTLINK_MAX_MESSAGE_SIZE" => self.network.max_message_size,
            "SCRIPTLINK_MAX_VALUE_DEPTH" => self.network.max_value_depth,
        );

        // 脚本配置
        env_override!(lookup,
            "SCRIPTLINK_RESOURCE_ROOT" => self.scripting.resource_root,
            "SCRIPTLINK_SIDE" => self.scripting.side,
        );
        if let Some(list) = lookup("SCRIPTLINK_RESOURCES") {
            self.scripting.resources = list
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
        }

        // 日志配置
        env_override!(lookup, "SCRIPTLINK_LOG_LEVEL" => self.logging.level);
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        self.network.validate()?;
        self.scripting.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// 自动查找并加载配置文件，最后应用环境变量覆盖
    ///
    /// 按以下顺序查找：
    /// 1. `$SCRIPTLINK_CONFIG`
    /// 2. ./scriptlink.toml
    /// 3. ./scriptlink.json
    /// 4. 用户配置目录下的 scriptlink/config.toml
    /// 5. 使用默认配置
    pub fn load_or_default() -> Self {
        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Some(explicit) = env::var_os("SCRIPTLINK_CONFIG") {
            candidates.push(PathBuf::from(explicit));
        }
        candidates.push(PathBuf::from("scriptlink.toml"));
        candidates.push(PathBuf::from("scriptlink.json"));
        if let Some(config_dir) = dirs::config_dir() {
            candidates.push(config_dir.join("scriptlink").join("config.toml"));
        }

        let mut config = candidates
            .iter()
            .filter(|path| path.exists())
            .find_map(|path| match Self::from_file(path) {
                Ok(config) => {
                    tracing::info!(target: "config", path = %path.display(), "loaded config");
                    Some(config)
                }
                Err(error) => {
                    tracing::warn!(target: "config", path = %path.display(), %error, "skipping config file");
                    None
                }
            })
            .unwrap_or_else(|| {
                tracing::info!(target: "config", "using default configuration");
                Self::default()
            });

        config.apply_env_overrides();
        config
    }
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: LogLevel,

    /// 是否输出到文件
    pub log_to_file: bool,

    /// 日志文件路径
    pub log_file_path: String,

    /// 是否输出到控制台
    pub log_to_console: bool,
}

impl_default!(LoggingConfig {
    level: LogLevel::Info,
    log_to_file: false,
    log_file_path: "scriptlink.log".to_string(),
    log_to_console: true,
});

impl LoggingConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.log_to_file && self.log_file_path.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "log_file_path is required when log_to_file is set".to_string(),
            ));
        }
        Ok(())
    }
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    /// 跟踪
    Trace,
    /// 调试
    Debug,
    /// 信息
    Info,
    /// 警告
    Warn,
    /// 错误
    Error,
}

impl LogLevel {
    /// `EnvFilter` 指令形式
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_directive())
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(ConfigError::ParseError(format!("unknown log level '{}'", other))),
        }
    }
}
