//! 日志初始化
//!
//! 基于 `tracing-subscriber` 的 fmt 订阅者。过滤规则优先取 `RUST_LOG`，
//! 未设置时使用配置中的级别。常用 target：
//!
//! - `bindings` 参数转换与注册表
//! - `network` 远程调用收发
//! - `script` / `script.console` 脚本引擎与脚本输出
//! - `host` 宿主循环

use crate::config::LoggingConfig;
use crate::core::error::BridgeResult;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

fn filter_for(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level.as_directive()))
}

/// 安装全局日志订阅者
///
/// 返回 `false` 表示已有订阅者（例如测试中重复初始化），此时不做任何修改。
/// 同时开启文件与控制台输出时写入文件。
pub fn init_logging(config: &LoggingConfig) -> BridgeResult<bool> {
    let installed = if config.log_to_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.log_file_path)?;
        tracing_subscriber::fmt()
            .with_env_filter(filter_for(config))
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .try_init()
            .is_ok()
    } else if config.log_to_console {
        tracing_subscriber::fmt()
            .with_env_filter(filter_for(config))
            .with_writer(std::io::stderr)
            .try_init()
            .is_ok()
    } else {
        return Ok(false);
    };

    if installed {
        tracing::info!(target: "host", level = %config.level, "logging initialised");
    }
    Ok(installed)
}
