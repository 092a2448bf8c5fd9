//! 网络配置

use super::{ConfigError, ConfigResult};
use crate::impl_default;
use serde::{Deserialize, Serialize};

/// 值树嵌套层数的上限
pub const MAX_VALUE_DEPTH_LIMIT: usize = 256;

/// 远程调用网络配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// 广播是否同时在本地分发
    pub broadcast_to_self: bool,

    /// 未指定通道时使用的顺序通道
    pub default_channel: u8,

    /// 超过该字节数的消息尝试压缩
    pub compression_threshold: usize,

    /// 是否启用压缩（关闭时仍能接收压缩帧）
    pub enable_compression: bool,

    /// 单条消息（解压后）的最大字节数
    pub max_message_size: usize,

    /// 参数值树的最大嵌套层数
    pub max_value_depth: usize,

    /// 保留的最近分发事件条数
    pub event_log_capacity: usize,
}

impl_default!(NetworkConfig {
    broadcast_to_self: false,
    default_channel: 0,
    compression_threshold: 512,
    enable_compression: true,
    max_message_size: 1024 * 1024,
    max_value_depth: 32,
    event_log_capacity: 64,
});

impl NetworkConfig {
    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_message_size == 0 {
            return Err(ConfigError::ValidationError(
                "max_message_size must be greater than zero".to_string(),
            ));
        }
        if self.max_message_size > u32::MAX as usize {
            return Err(ConfigError::ValidationError(
                "max_message_size must fit in 32 bits".to_string(),
            ));
        }
        if !(1..=MAX_VALUE_DEPTH_LIMIT).contains(&self.max_value_depth) {
            return Err(ConfigError::ValidationError(format!(
                "max_value_depth must be between 1 and {}",
                MAX_VALUE_DEPTH_LIMIT
            )));
        }
        Ok(())
    }
}
