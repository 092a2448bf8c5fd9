//! 统一错误处理模块
//!
//! 提供桥接层范围内的统一错误类型定义
//!
//! ## 错误类型分层
//!
//! - **调用拒绝** (`CallRejected`): 参数个数/类型签名不符，入口函数不会执行
//! - **注册错误** (`RegistryError`): 类或签名注册失败，注册表保持不变
//! - **编解码错误** (`CodecError`): 线上消息截断或损坏
//! - **网络错误** (`NetworkError`): 发送阶段的失败（投递结果不在此层报告）
//! - **脚本错误** (`ScriptError`): 脚本引擎适配器与资源加载
//!
//! `BridgeError` 可以同时承载以上所有错误。

use crate::bindings::signature::Arity;
use crate::bindings::value::ValueKind;
use crate::config::ConfigError;
use crate::network::PeerId;
use thiserror::Error;

/// 桥接层顶层错误类型
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Call rejected: {0}")]
    Call(#[from] CallRejected),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// 调用在入口函数执行前被拒绝
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CallRejected {
    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("unknown class '{0}'")]
    UnknownClass(String),

    #[error("class '{class}' has no method '{method}'")]
    UnknownMethod { class: String, method: String },

    #[error("expected {expected} argument(s), got {got}")]
    ArityMismatch { expected: Arity, got: usize },

    #[error("argument {position}: expected {expected}, found {found}")]
    SignatureMismatch {
        position: usize,
        expected: String,
        found: ValueKind,
    },

    #[error("handle {0} is not bound to a live instance")]
    InvalidInstance(u64),

    #[error("instance {0} is already in use by an enclosing call")]
    InstanceBusy(u64),

    #[error("instance of '{class}' does not hold the native type expected by '{method}'")]
    InstanceTypeMismatch { class: String, method: String },

    #[error("constructor of '{0}' declined to create an instance")]
    ConstructorDeclined(String),
}

/// 注册错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("base class '{base}' of '{class}' is not registered")]
    UnknownBaseClass { class: String, base: String },

    #[error("class '{0}' is not registered")]
    UnknownClass(String),

    #[error("invalid type mask '{mask}': unexpected '{found}'")]
    InvalidSignature { mask: String, found: char },
}

/// 线上消息编解码错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("truncated message: needed {needed} byte(s), {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("unknown type tag {0:#04x}")]
    UnknownTag(u8),

    #[error("invalid bool byte {0:#04x}")]
    InvalidBool(u8),

    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    #[error("value nesting exceeds {0} levels")]
    DepthExceeded(usize),

    #[error("length {0} does not fit the wire format")]
    LengthOverflow(usize),

    #[error("{0} trailing byte(s) after message")]
    TrailingBytes(usize),

    #[error("unknown frame flags {0:#04x}")]
    UnknownFrameFlags(u8),
}

/// 网络错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetworkError {
    #[error("peer {0} is not connected")]
    UnknownPeer(PeerId),

    #[error("transport is disconnected")]
    Disconnected,

    #[error("message of {size} bytes exceeds the {limit} byte limit")]
    MessageTooLarge { size: usize, limit: usize },

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("compression error: {0}")]
    Compression(String),
}

/// 脚本系统错误
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Script compilation error: {0}")]
    Compilation(String),

    #[error("Script runtime error: {0}")]
    Runtime(String),

    #[error("Script not found: {0}")]
    NotFound(String),

    #[error("Invalid script binding: {0}")]
    InvalidBinding(String),

    #[error("Resource manifest error: {0}")]
    Manifest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// 结果类型别名
pub type BridgeResult<T> = Result<T, BridgeError>;
pub type ScriptResult<T> = Result<T, ScriptError>;
pub type NetworkResult<T> = Result<T, NetworkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let err = RegistryError::UnknownClass("Vehicle".to_string());
        let bridge_err: BridgeError = err.into();
        assert!(matches!(bridge_err, BridgeError::Registry(_)));

        let net_err: NetworkError = CodecError::InvalidUtf8.into();
        assert!(matches!(net_err, NetworkError::Codec(_)));
    }

    #[test]
    fn test_error_display() {
        let err = CallRejected::ArityMismatch {
            expected: Arity::Fixed(2),
            got: 3,
        };
        assert_eq!(err.to_string(), "expected 2 argument(s), got 3");

        let err = CodecError::Truncated {
            needed: 8,
            remaining: 3,
        };
        assert_eq!(
            err.to_string(),
            "truncated message: needed 8 byte(s), 3 remaining"
        );
    }
}
