//! 进程内回环传输
//!
//! 多个 [`LoopbackTransport`] 通过同一个 [`LoopbackNetwork`] 互联，
//! 用于测试和演示。每个端点的接收路径：
//!
//! ```text
//! inbox (crossbeam) ──► 按优先级排序 ──► LinkConditions ──► ReceiveLayer ──► receive()
//!                       (Immediate 优先)   (乱序 / 丢包)      (有序 / 顺序化)
//! ```
//!
//! 丢包只作用于不可靠等级；可靠等级视为已由底层重发成功。
//!
//! 连接状态：`handshake_polls > 0` 时新端点先处于 `Connecting`，
//! 经过这么多次 `receive()` 后才变为 `Connected`；`reconnect()` 以新的节点标识
//! 重新接入，握手期间为 `Reconnecting`。已离开集线器的发送方，其顺序层缓存
//! 在下一次 `receive()` 时释放。

use super::reliability::{Datagram, ReceiveLayer, SendSequencer};
use super::transport::{Packet, Transport};
use super::{ConnectionState, PeerId, Priority, Reliability};
use crate::core::error::{NetworkError, NetworkResult};
use crossbeam_channel::{unbounded, Receiver, Sender};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// 每批帧的乱序方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reorder {
    /// 保持到达顺序
    #[default]
    None,
    /// 整批反转
    Reverse,
    /// 按种子随机打乱
    Shuffle,
}

/// 链路条件模拟
#[derive(Debug, Clone, PartialEq)]
pub struct LinkConditions {
    pub reorder: Reorder,
    /// 不可靠等级帧的丢包概率（0.0 - 1.0）
    pub unreliable_loss: f64,
    /// `ping` 报告的往返时间
    pub round_trip: Duration,
    /// 乱序与丢包使用的随机种子
    pub seed: u64,
    /// 握手完成前需要的 `receive()` 次数
    pub handshake_polls: u32,
}

impl Default for LinkConditions {
    fn default() -> Self {
        Self {
            reorder: Reorder::None,
            unreliable_loss: 0.0,
            round_trip: Duration::ZERO,
            seed: 0,
            handshake_polls: 0,
        }
    }
}

#[derive(Default)]
struct Hub {
    endpoints: HashMap<PeerId, Sender<Datagram>>,
    next_peer: u32,
}

/// 回环网络（端点之间共享的集线器）
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    hub: Arc<Mutex<Hub>>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// 接入一个新端点，节点标识从 1 开始递增
    pub fn connect(&self) -> LoopbackTransport {
        self.connect_with(LinkConditions::default())
    }

    pub fn connect_with(&self, conditions: LinkConditions) -> LoopbackTransport {
        let (local, inbox) = join_hub(&self.hub);
        let handshake_left = conditions.handshake_polls;
        let state = if handshake_left == 0 {
            ConnectionState::Connected
        } else {
            ConnectionState::Connecting
        };
        tracing::debug!(target: "network", peer = %local, ?state, "loopback endpoint connected");

        LoopbackTransport {
            hub: Arc::clone(&self.hub),
            local,
            inbox,
            sequencer: SendSequencer::new(),
            receive_layer: ReceiveLayer::new(),
            rng: StdRng::seed_from_u64(conditions.seed),
            conditions,
            state,
            handshake_left,
            conditioned_losses: 0,
        }
    }

    /// 当前接入的端点数
    pub fn endpoint_count(&self) -> usize {
        self.lock().endpoints.len()
    }

    fn lock(&self) -> MutexGuard<'_, Hub> {
        lock_hub(&self.hub)
    }
}

fn lock_hub(hub: &Mutex<Hub>) -> MutexGuard<'_, Hub> {
    hub.lock().unwrap_or_else(PoisonError::into_inner)
}

fn join_hub(hub: &Mutex<Hub>) -> (PeerId, Receiver<Datagram>) {
    let (sender, inbox) = unbounded();
    let mut hub = lock_hub(hub);
    hub.next_peer += 1;
    let peer = PeerId(hub.next_peer);
    hub.endpoints.insert(peer, sender);
    (peer, inbox)
}

/// 回环网络上的一个端点
pub struct LoopbackTransport {
    hub: Arc<Mutex<Hub>>,
    local: PeerId,
    inbox: Receiver<Datagram>,
    sequencer: SendSequencer,
    receive_layer: ReceiveLayer,
    conditions: LinkConditions,
    rng: StdRng,
    state: ConnectionState,
    handshake_left: u32,
    conditioned_losses: u64,
}

impl LoopbackTransport {
    pub fn conditions(&self) -> &LinkConditions {
        &self.conditions
    }

    pub fn set_conditions(&mut self, conditions: LinkConditions) {
        self.rng = StdRng::seed_from_u64(conditions.seed);
        self.conditions = conditions;
    }

    /// 链路条件丢弃的帧数
    pub fn conditioned_losses(&self) -> u64 {
        self.conditioned_losses
    }

    /// 顺序层丢弃的过期/重复帧数
    pub fn stale_dropped(&self) -> u64 {
        self.receive_layer.stale_dropped()
    }

    /// 顺序层中等待缺口补齐的帧数
    pub fn buffered(&self) -> usize {
        self.receive_layer.pending()
    }

    /// 离开回环网络，之后的发送都会失败
    pub fn disconnect(&mut self) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        lock_hub(&self.hub).endpoints.remove(&self.local);
        self.state = ConnectionState::Disconnected;
        for peer in self.receive_layer.senders() {
            self.receive_layer.forget(peer);
        }
        self.sequencer = SendSequencer::new();
        tracing::debug!(target: "network", peer = %self.local, "loopback endpoint disconnected");
    }

    /// 以新的节点标识重新接入；未断开时不做任何事
    pub fn reconnect(&mut self) -> PeerId {
        if self.state != ConnectionState::Disconnected {
            return self.local;
        }
        let (local, inbox) = join_hub(&self.hub);
        let previous = std::mem::replace(&mut self.local, local);
        self.inbox = inbox;
        self.handshake_left = self.conditions.handshake_polls;
        self.state = if self.handshake_left == 0 {
            ConnectionState::Connected
        } else {
            ConnectionState::Reconnecting
        };
        tracing::debug!(target: "network", %previous, peer = %local, state = ?self.state, "loopback endpoint reconnected");
        local
    }

    fn is_linked(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// 推进握手；握手未完成时返回 false
    fn advance_handshake(&mut self) -> bool {
        if !matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Reconnecting
        ) {
            return true;
        }
        self.handshake_left = self.handshake_left.saturating_sub(1);
        if self.handshake_left > 0 {
            return false;
        }
        self.state = ConnectionState::Connected;
        tracing::debug!(target: "network", peer = %self.local, "loopback handshake complete");
        true
    }

    /// 释放已离开集线器的发送方的顺序层状态
    fn forget_departed(&mut self) {
        let departed: Vec<PeerId> = {
            let hub = lock_hub(&self.hub);
            self.receive_layer
                .senders()
                .into_iter()
                .filter(|peer| !hub.endpoints.contains_key(peer))
                .collect()
        };
        for peer in departed {
            tracing::debug!(
                target: "network",
                peer = %peer,
                buffered = self.receive_layer.pending(),
                "forgetting departed sender"
            );
            self.receive_layer.forget(peer);
        }
    }

    fn condition(&mut self, batch: &mut Vec<Datagram>) {
        // 稳定排序：同优先级内保持到达顺序
        batch.sort_by_key(|d| std::cmp::Reverse(d.packet.priority));

        match self.conditions.reorder {
            Reorder::None => {}
            Reorder::Reverse => batch.reverse(),
            Reorder::Shuffle => batch.shuffle(&mut self.rng),
        }

        let loss = self.conditions.unreliable_loss.clamp(0.0, 1.0);
        if loss > 0.0 {
            let before = batch.len();
            let rng = &mut self.rng;
            batch.retain(|d| d.packet.reliability.is_reliable() || !rng.gen_bool(loss));
            self.conditioned_losses += (before - batch.len()) as u64;
        }
    }
}

impl Transport for LoopbackTransport {
    fn local_peer(&self) -> PeerId {
        self.local
    }

    fn connected_peers(&self) -> Vec<PeerId> {
        if !self.is_linked() {
            return Vec::new();
        }
        let mut peers: Vec<PeerId> = lock_hub(&self.hub)
            .endpoints
            .keys()
            .copied()
            .filter(|peer| *peer != self.local)
            .collect();
        peers.sort();
        peers
    }

    fn send(
        &mut self,
        peer: PeerId,
        payload: Vec<u8>,
        priority: Priority,
        reliability: Reliability,
        channel: u8,
    ) -> NetworkResult<()> {
        if !self.is_linked() {
            return Err(NetworkError::Disconnected);
        }
        let endpoint = lock_hub(&self.hub)
            .endpoints
            .get(&peer)
            .cloned()
            .ok_or(NetworkError::UnknownPeer(peer))?;

        let sequence = self.sequencer.next(peer, channel, reliability);
        let datagram = Datagram {
            packet: Packet {
                sender: self.local,
                channel,
                priority,
                reliability,
                payload,
            },
            sequence,
        };
        endpoint
            .send(datagram)
            .map_err(|_| NetworkError::UnknownPeer(peer))
    }

    fn receive(&mut self) -> Vec<Packet> {
        if !self.advance_handshake() {
            return Vec::new();
        }
        let mut batch: Vec<Datagram> = self.inbox.try_iter().collect();
        let mut delivered = Vec::with_capacity(batch.len());
        if !batch.is_empty() {
            self.condition(&mut batch);
            for datagram in batch {
                delivered.extend(self.receive_layer.accept(datagram));
            }
        }
        self.forget_departed();
        delivered
    }

    fn ping(&self, peer: PeerId) -> Option<Duration> {
        if peer == self.local {
            return Some(Duration::ZERO);
        }
        if !self.is_linked() {
            return None;
        }
        lock_hub(&self.hub)
            .endpoints
            .contains_key(&peer)
            .then_some(self.conditions.round_trip)
    }

    fn connection_state(&self) -> ConnectionState {
        self.state
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}
