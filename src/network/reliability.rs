//! 可靠性与顺序层
//!
//! 发送端为有序/顺序化的帧分配序列号，接收端按 (发送方, 通道, 等级)
//! 维护状态：
//!
//! - `ReliableOrdered`：缺口之后到达的帧先缓存，缺口补齐后按序放行
//! - `UnreliableSequenced` / `ReliableSequenced`：比已放行的帧更旧的帧直接丢弃
//! - `Unreliable` / `Reliable`：到达即放行
//!
//! 序列号为 32 位并按回绕比较，长时间运行不会溢出。

use super::transport::Packet;
use super::{PeerId, Reliability};
use std::collections::HashMap;

/// 带序列号的帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub packet: Packet,
    /// 无顺序语义的等级固定为 0
    pub sequence: u32,
}

/// `a` 是否比 `b` 更新（回绕比较）
pub fn sequence_newer(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) > 0
}

type StreamKey = (PeerId, u8, Reliability);

fn has_sequence(reliability: Reliability) -> bool {
    reliability.is_ordered() || reliability.is_sequenced()
}

/// 发送端序列号分配器
#[derive(Debug, Default)]
pub struct SendSequencer {
    next: HashMap<StreamKey, u32>,
}

impl SendSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为发往 `peer` 的帧分配序列号
    pub fn next(&mut self, peer: PeerId, channel: u8, reliability: Reliability) -> u32 {
        if !has_sequence(reliability) {
            return 0;
        }
        let slot = self.next.entry((peer, channel, reliability)).or_insert(0);
        let sequence = *slot;
        *slot = slot.wrapping_add(1);
        sequence
    }

    /// 测试用：从指定序列号开始计数
    #[cfg(test)]
    pub(crate) fn seed(&mut self, peer: PeerId, channel: u8, reliability: Reliability, start: u32) {
        self.next.insert((peer, channel, reliability), start);
    }
}

#[derive(Debug, Default)]
struct OrderedStream {
    expected: u32,
    pending: HashMap<u32, Packet>,
}

/// 接收端顺序层
#[derive(Debug, Default)]
pub struct ReceiveLayer {
    ordered: HashMap<StreamKey, OrderedStream>,
    sequenced: HashMap<StreamKey, u32>,
    stale_dropped: u64,
}

impl ReceiveLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 接收一帧，返回现在可以放行的帧（按放行顺序）
    pub fn accept(&mut self, datagram: Datagram) -> Vec<Packet> {
        let Datagram { packet, sequence } = datagram;
        let key = (packet.sender, packet.channel, packet.reliability);

        if packet.reliability.is_ordered() {
            let stream = self.ordered.entry(key).or_default();
            if sequence != stream.expected {
                if sequence_newer(sequence, stream.expected) {
                    stream.pending.insert(sequence, packet);
                } else {
                    // 重复帧
                    self.stale_dropped += 1;
                }
                return Vec::new();
            }

            let mut released = vec![packet];
            stream.expected = stream.expected.wrapping_add(1);
            while let Some(next) = stream.pending.remove(&stream.expected) {
                released.push(next);
                stream.expected = stream.expected.wrapping_add(1);
            }
            return released;
        }

        if packet.reliability.is_sequenced() {
            match self.sequenced.get(&key) {
                Some(&last) if !sequence_newer(sequence, last) => {
                    tracing::trace!(
                        target: "network",
                        sender = %packet.sender,
                        sequence,
                        last,
                        "dropping stale sequenced packet"
                    );
                    self.stale_dropped += 1;
                    return Vec::new();
                }
                _ => {
                    self.sequenced.insert(key, sequence);
                }
            }
        }

        vec![packet]
    }

    /// 缓存中等待缺口补齐的帧数
    pub fn pending(&self) -> usize {
        self.ordered.values().map(|s| s.pending.len()).sum()
    }

    /// 因过期或重复被丢弃的帧数
    pub fn stale_dropped(&self) -> u64 {
        self.stale_dropped
    }

    /// 当前持有顺序状态的发送方
    pub fn senders(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self
            .ordered
            .keys()
            .chain(self.sequenced.keys())
            .map(|(sender, _, _)| *sender)
            .collect();
        peers.sort();
        peers.dedup();
        peers
    }

    /// 忘记某个发送方的全部状态（断开连接时调用）
    pub fn forget(&mut self, peer: PeerId) {
        self.ordered.retain(|(sender, _, _), _| *sender != peer);
        self.sequenced.retain(|(sender, _, _), _| *sender != peer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Priority;

    fn datagram(reliability: Reliability, sequence: u32, tag: u8) -> Datagram {
        Datagram {
            packet: Packet {
                sender: PeerId(1),
                channel: 0,
                priority: Priority::Medium,
                reliability,
                payload: vec![tag],
            },
            sequence,
        }
    }

    fn tags(packets: &[Packet]) -> Vec<u8> {
        packets.iter().map(|p| p.payload[0]).collect()
    }

    #[test]
    fn test_sequence_newer_wraps() {
        assert!(sequence_newer(1, 0));
        assert!(!sequence_newer(0, 1));
        assert!(sequence_newer(0, u32::MAX));
        assert!(!sequence_newer(5, 5));
    }

    #[test]
    fn test_sender_counts_per_stream() {
        let mut seq = SendSequencer::new();
        assert_eq!(seq.next(PeerId(1), 0, Reliability::ReliableOrdered), 0);
        assert_eq!(seq.next(PeerId(1), 0, Reliability::ReliableOrdered), 1);
        assert_eq!(seq.next(PeerId(1), 1, Reliability::ReliableOrdered), 0);
        assert_eq!(seq.next(PeerId(2), 0, Reliability::ReliableOrdered), 0);
        assert_eq!(seq.next(PeerId(1), 0, Reliability::Unreliable), 0);
        assert_eq!(seq.next(PeerId(1), 0, Reliability::Unreliable), 0);
    }

    #[test]
    fn test_ordered_buffers_until_gap_is_filled() {
        let mut layer = ReceiveLayer::new();
        assert!(layer.accept(datagram(Reliability::ReliableOrdered, 2, 2)).is_empty());
        assert!(layer.accept(datagram(Reliability::ReliableOrdered, 1, 1)).is_empty());
        assert_eq!(layer.pending(), 2);

        let released = layer.accept(datagram(Reliability::ReliableOrdered, 0, 0));
        assert_eq!(tags(&released), vec![0, 1, 2]);
        assert_eq!(layer.pending(), 0);

        // 重复帧被丢弃
        assert!(layer.accept(datagram(Reliability::ReliableOrdered, 1, 1)).is_empty());
        assert_eq!(layer.stale_dropped(), 1);
    }

    #[test]
    fn test_ordered_across_wraparound() {
        let mut sender = SendSequencer::new();
        sender.seed(PeerId(1), 0, Reliability::ReliableOrdered, u32::MAX - 1);
        let sequences: Vec<u32> = (0..4)
            .map(|_| sender.next(PeerId(1), 0, Reliability::ReliableOrdered))
            .collect();
        assert_eq!(sequences, vec![u32::MAX - 1, u32::MAX, 0, 1]);

        let mut layer = ReceiveLayer::new();
        layer.ordered.entry((PeerId(1), 0, Reliability::ReliableOrdered)).or_default().expected =
            u32::MAX - 1;

        let mut released = Vec::new();
        for (tag, &sequence) in sequences.iter().enumerate().rev() {
            released.extend(layer.accept(datagram(Reliability::ReliableOrdered, sequence, tag as u8)));
        }
        assert_eq!(tags(&released), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_sequenced_drops_older() {
        let mut layer = ReceiveLayer::new();
        let mut released = Vec::new();
        for sequence in [0u32, 3, 1, 2, 4] {
            released.extend(layer.accept(datagram(
                Reliability::UnreliableSequenced,
                sequence,
                sequence as u8,
            )));
        }
        assert_eq!(tags(&released), vec![0, 3, 4]);
        assert_eq!(layer.stale_dropped(), 2);
    }

    #[test]
    fn test_unordered_tiers_pass_through() {
        let mut layer = ReceiveLayer::new();
        assert_eq!(layer.accept(datagram(Reliability::Reliable, 0, 1)).len(), 1);
        assert_eq!(layer.accept(datagram(Reliability::Reliable, 0, 2)).len(), 1);
        assert_eq!(layer.accept(datagram(Reliability::Unreliable, 0, 3)).len(), 1);
    }

    #[test]
    fn test_forget_resets_sender_state() {
        let mut layer = ReceiveLayer::new();
        layer.accept(datagram(Reliability::ReliableOrdered, 3, 3));
        layer.accept(datagram(Reliability::ReliableSequenced, 9, 9));
        assert_eq!(layer.senders(), vec![PeerId(1)]);
        layer.forget(PeerId(1));
        assert_eq!(layer.pending(), 0);
        assert!(layer.senders().is_empty());
        assert_eq!(layer.accept(datagram(Reliability::ReliableSequenced, 0, 0)).len(), 1);
    }
}
