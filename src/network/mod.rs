//! 远程调用网络模块
//!
//! 以字符串标识符寻址的点对点/广播远程调用，参数使用与脚本桥接相同的 `Value`。
//!
//! ## 功能特性
//!
//! - 稳定的线上消息格式（`codec`）
//! - 五种可靠性等级与四种优先级
//! - 单播、广播、排除某个节点的广播（中继）
//! - 每个宿主 tick 显式 `poll()`，同步分发
//!
//! ## 架构设计
//!
//! ```text
//! ┌──────────────────┐   frame    ┌──────────────────┐
//! │  RpcDispatcher   │──────────► │    Transport     │
//! │  encode / route  │            │ (loopback, ...)  │
//! │                  │ ◄──────────│  reliability     │
//! │  decode / handle │  packets   │  layer           │
//! └──────────────────┘            └──────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod codec;
pub mod compression;
pub mod dispatcher;
pub mod loopback;
pub mod reliability;
pub mod transport;

pub use codec::{decode_message, encode_message, RemoteMessage};
pub use compression::{CompressionLevel, NetworkCompressor};
pub use dispatcher::{DispatchEvent, PendingCall, PollReport, RpcContext, RpcDispatcher};
pub use loopback::{LinkConditions, LoopbackNetwork, LoopbackTransport, Reorder};
pub use transport::{Packet, Transport};

/// 节点标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub u32);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

/// 发送优先级（仅作为发送队列的排序提示）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum Priority {
    /// 低
    Low,
    /// 中
    #[default]
    Medium,
    /// 高
    High,
    /// 立即发送
    Immediate,
}

impl Priority {
    /// 按名称解析，忽略大小写
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            "immediate" => Some(Priority::Immediate),
            _ => None,
        }
    }
}

/// 可靠性等级（由弱到强）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum Reliability {
    /// 不可靠，无顺序
    Unreliable,
    /// 不可靠，丢弃过期消息，不重发
    UnreliableSequenced,
    /// 可靠，无顺序保证
    Reliable,
    /// 可靠，按通道严格有序
    #[default]
    ReliableOrdered,
    /// 可靠，新消息覆盖旧消息
    ReliableSequenced,
}

impl Reliability {
    /// 传输层是否负责重发
    pub fn is_reliable(self) -> bool {
        matches!(
            self,
            Reliability::Reliable | Reliability::ReliableOrdered | Reliability::ReliableSequenced
        )
    }

    /// 是否丢弃比已投递消息更旧的消息
    pub fn is_sequenced(self) -> bool {
        matches!(
            self,
            Reliability::UnreliableSequenced | Reliability::ReliableSequenced
        )
    }

    pub fn is_ordered(self) -> bool {
        self == Reliability::ReliableOrdered
    }

    /// 按名称解析，忽略大小写和下划线（`unreliableSequenced`、`reliable_ordered`）
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "unreliable" => Some(Reliability::Unreliable),
            "unreliablesequenced" => Some(Reliability::UnreliableSequenced),
            "reliable" => Some(Reliability::Reliable),
            "reliableordered" => Some(Reliability::ReliableOrdered),
            "reliablesequenced" => Some(Reliability::ReliableSequenced),
            _ => None,
        }
    }
}

/// 调用目标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallTarget {
    /// 单个节点
    Peer(PeerId),
    /// 所有已连接节点
    Broadcast,
    /// 除指定节点外的所有已连接节点（中继某节点发来的调用）
    BroadcastExcept(PeerId),
}

/// 网络连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// 断开连接
    Disconnected,
    /// 连接中
    Connecting,
    /// 已连接
    Connected,
    /// 重连中
    Reconnecting,
}

/// 网络统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkStats {
    /// 发送字节数
    pub bytes_sent: u64,
    /// 接收字节数
    pub bytes_received: u64,
    /// 发送消息数（广播按目标节点计数）
    pub messages_sent: u64,
    /// 接收消息数
    pub messages_received: u64,
    /// 已分发的消息数
    pub dispatched: u64,
    /// 未注册标识符而丢弃的消息数
    pub unknown_identifiers: u64,
    /// 格式错误而丢弃的消息数
    pub malformed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reliability_tiers() {
        assert!(!Reliability::Unreliable.is_reliable());
        assert!(Reliability::UnreliableSequenced.is_sequenced());
        assert!(Reliability::ReliableSequenced.is_reliable());
        assert!(Reliability::ReliableOrdered.is_ordered());
        assert!(Reliability::Unreliable < Reliability::ReliableSequenced);
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Immediate > Priority::High);
        assert!(Priority::Low < Priority::Medium);
        assert_eq!(Priority::default(), Priority::Medium);
    }

    #[test]
    fn test_tiers_parse_by_name() {
        assert_eq!(Priority::from_name("Immediate"), Some(Priority::Immediate));
        assert_eq!(Priority::from_name("urgent"), None);
        assert_eq!(
            Reliability::from_name("unreliableSequenced"),
            Some(Reliability::UnreliableSequenced)
        );
        assert_eq!(
            Reliability::from_name("reliable_ordered"),
            Some(Reliability::ReliableOrdered)
        );
        assert_eq!(Reliability::from_name(""), None);
    }

    #[test]
    fn test_network_stats_default() {
        let stats = NetworkStats::default();
        assert_eq!(stats.bytes_sent, 0);
        assert_eq!(stats.unknown_identifiers, 0);
    }
}
