//! 核心模块
//!
//! - `error` - 错误类型定义
//! - `logging` - 日志初始化
//! - `host` - 桥接宿主，组装注册表、脚本引擎与远程调用分发器
//! - `macros` - 配置用的辅助宏

#[macro_use]
pub mod macros;
pub mod error;
pub mod host;
pub mod logging;

// 重新导出错误类型
pub use error::{
    BridgeError, BridgeResult, CallRejected, CodecError, NetworkError, NetworkResult,
    RegistryError, ScriptError, ScriptResult,
};

pub use host::{BridgeHost, TickReport};
pub use logging::init_logging;
