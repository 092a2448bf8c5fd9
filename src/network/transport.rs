//! 传输层抽象
//!
//! 分发器只通过 [`Transport`] 收发已封装好的帧；可靠性、顺序和
//! 优先级语义由传输层实现。

use super::{ConnectionState, PeerId, Priority, Reliability};
use crate::core::error::NetworkResult;
use std::time::Duration;

/// 传输层投递给上层的一帧数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// 发送方
    pub sender: PeerId,
    /// 顺序通道
    pub channel: u8,
    pub priority: Priority,
    pub reliability: Reliability,
    /// 帧内容（见 `compression` 模块的帧格式）
    pub payload: Vec<u8>,
}

/// 帧传输接口
///
/// `send` 只负责交付给传输层，不阻塞、不报告投递结果；
/// `receive` 取走自上次调用以来已投递的全部帧，按投递顺序排列。
pub trait Transport {
    /// 本地节点标识
    fn local_peer(&self) -> PeerId;

    /// 当前已连接的远端节点（不含本地节点）
    fn connected_peers(&self) -> Vec<PeerId>;

    /// 向单个节点发送一帧
    fn send(
        &mut self,
        peer: PeerId,
        payload: Vec<u8>,
        priority: Priority,
        reliability: Reliability,
        channel: u8,
    ) -> NetworkResult<()>;

    /// 取走已投递的帧
    fn receive(&mut self) -> Vec<Packet>;

    /// 到指定节点的往返时间，未连接时为 `None`
    fn ping(&self, peer: PeerId) -> Option<Duration>;

    fn connection_state(&self) -> ConnectionState;
}
