//! 远程调用分发器
//!
//! 发送：`Value` 参数 → `codec` 编码 → 帧封装（可选压缩）→ `Transport`。
//! 接收：`poll()` 取走传输层已投递的帧，逐帧解码并同步调用处理器。
//!
//! 处理器不能直接访问分发器；需要回复或继续发起调用时写入
//! [`RpcContext`] 的发件箱，处理器返回后由分发器统一发送。

use super::codec::{decode_message, encode_message, RemoteMessage};
use super::compression::{CompressionLevel, NetworkCompressor};
use super::transport::{Packet, Transport};
use super::{CallTarget, ConnectionState, NetworkStats, PeerId, Priority, Reliability};
use crate::bindings::marshal::Marshaller;
use crate::bindings::registry::FunctionRegistry;
use crate::bindings::value::Value;
use crate::config::NetworkConfig;
use crate::core::error::{NetworkError, NetworkResult};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

/// 远程调用处理器
pub type RpcHandler = Box<dyn FnMut(&mut RpcContext, &mut Marshaller<'_>)>;

/// 待发送的远程调用
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCall {
    pub identifier: String,
    pub args: Vec<Value>,
    pub target: CallTarget,
    pub priority: Priority,
    pub reliability: Reliability,
    /// `None` 使用配置中的默认通道
    pub channel: Option<u8>,
}

impl PendingCall {
    pub fn new(identifier: impl Into<String>, target: CallTarget) -> Self {
        Self {
            identifier: identifier.into(),
            args: Vec::new(),
            target,
            priority: Priority::default(),
            reliability: Reliability::default(),
            channel: None,
        }
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn reliability(mut self, reliability: Reliability) -> Self {
        self.reliability = reliability;
        self
    }

    pub fn channel(mut self, channel: u8) -> Self {
        self.channel = Some(channel);
        self
    }
}

/// 处理器上下文：发送方身份与回复发件箱
#[derive(Debug)]
pub struct RpcContext {
    sender: PeerId,
    local: PeerId,
    outbox: Vec<PendingCall>,
}

impl RpcContext {
    fn new(sender: PeerId, local: PeerId) -> Self {
        Self {
            sender,
            local,
            outbox: Vec::new(),
        }
    }

    /// 发起这次调用的节点
    pub fn sender(&self) -> PeerId {
        self.sender
    }

    pub fn local_peer(&self) -> PeerId {
        self.local
    }

    /// 调用是否来自本地节点（广播回环）
    pub fn is_local(&self) -> bool {
        self.sender == self.local
    }

    /// 以默认等级回复发送方
    pub fn reply(&mut self, identifier: impl Into<String>, args: Vec<Value>) {
        self.outbox
            .push(PendingCall::new(identifier, CallTarget::Peer(self.sender)).with_args(args));
    }

    /// 排队任意调用，处理器返回后发送
    pub fn send(&mut self, call: PendingCall) {
        self.outbox.push(call);
    }
}

/// 分发事件（保留最近若干条）
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchEvent {
    Dispatched { identifier: String, sender: PeerId },
    UnknownIdentifier { identifier: String, sender: PeerId },
    Malformed { sender: PeerId, error: NetworkError },
}

/// 一次 `poll()` 的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    pub received: usize,
    pub dispatched: usize,
    pub unknown: usize,
    pub malformed: usize,
}

/// 远程调用分发器
pub struct RpcDispatcher<T: Transport> {
    transport: T,
    handlers: HashMap<String, RpcHandler>,
    compressor: NetworkCompressor,
    config: NetworkConfig,
    stats: NetworkStats,
    events: VecDeque<DispatchEvent>,
    /// 发往本地节点的帧，下一次 `poll()` 时分发
    local_queue: VecDeque<Vec<u8>>,
}

impl<T: Transport> RpcDispatcher<T> {
    pub fn new(transport: T, config: NetworkConfig) -> Self {
        let compressor = if config.enable_compression {
            NetworkCompressor::new(CompressionLevel::Balanced, config.compression_threshold)
        } else {
            NetworkCompressor::disabled()
        };
        Self {
            transport,
            handlers: HashMap::new(),
            compressor,
            events: VecDeque::with_capacity(config.event_log_capacity),
            config,
            stats: NetworkStats::default(),
            local_queue: VecDeque::new(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn local_peer(&self) -> PeerId {
        self.transport.local_peer()
    }

    pub fn connected_peers(&self) -> Vec<PeerId> {
        self.transport.connected_peers()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.transport.connection_state()
    }

    /// 到指定节点的往返时间
    pub fn ping(&self, peer: PeerId) -> Option<Duration> {
        self.transport.ping(peer)
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    /// 最近的分发事件，从旧到新
    pub fn recent_events(&self) -> impl Iterator<Item = &DispatchEvent> {
        self.events.iter()
    }

    // ========================================================================
    // 处理器注册
    // ========================================================================

    /// 注册处理器，替换同名的旧处理器
    pub fn register_handler<F>(&mut self, identifier: impl Into<String>, handler: F)
    where
        F: FnMut(&mut RpcContext, &mut Marshaller<'_>) + 'static,
    {
        let identifier = identifier.into();
        if self
            .handlers
            .insert(identifier.clone(), Box::new(handler))
            .is_some()
        {
            tracing::debug!(target: "network", %identifier, "handler replaced");
        }
    }

    pub fn unregister_handler(&mut self, identifier: &str) -> bool {
        self.handlers.remove(identifier).is_some()
    }

    pub fn has_handler(&self, identifier: &str) -> bool {
        self.handlers.contains_key(identifier)
    }

    /// 把远程调用转给注册表中的原生函数，发送方 id 作为第一个 Int 参数
    pub fn forward_to_registry(
        &mut self,
        identifier: impl Into<String>,
        registry: Rc<RefCell<FunctionRegistry>>,
        function: impl Into<String>,
    ) {
        let function = function.into();
        self.register_handler(identifier, move |ctx, args| {
            let mut forwarded = Vec::with_capacity(args.args().len() + 1);
            forwarded.push(Value::Int(i64::from(ctx.sender().0)));
            forwarded.extend_from_slice(args.args());

            let Some(binding) = registry.borrow().resolve_function(&function) else {
                tracing::warn!(target: "network", %function, "forward target is not registered");
                return;
            };
            if let Err(rejected) = binding.invoke(&forwarded) {
                tracing::warn!(target: "network", %function, %rejected, "forwarded call rejected");
            }
        });
    }

    // ========================================================================
    // 发送
    // ========================================================================

    /// 发起远程调用（默认通道）
    ///
    /// 只负责交给传输层，不等待投递。
    pub fn call(
        &mut self,
        identifier: &str,
        args: &[Value],
        priority: Priority,
        reliability: Reliability,
        target: CallTarget,
    ) -> NetworkResult<()> {
        let channel = self.config.default_channel;
        self.transmit(identifier, args, priority, reliability, target, channel)
    }

    pub fn send_pending(&mut self, call: PendingCall) -> NetworkResult<()> {
        let channel = call.channel.unwrap_or(self.config.default_channel);
        self.transmit(
            &call.identifier,
            &call.args,
            call.priority,
            call.reliability,
            call.target,
            channel,
        )
    }

    fn transmit(
        &mut self,
        identifier: &str,
        args: &[Value],
        priority: Priority,
        reliability: Reliability,
        target: CallTarget,
        channel: u8,
    ) -> NetworkResult<()> {
        let message = encode_message(identifier, args, self.config.max_value_depth)
            .inspect_err(|error| {
                tracing::warn!(target: "network", identifier, %error, "call not encoded");
            })?;
        if message.len() > self.config.max_message_size {
            return Err(NetworkError::MessageTooLarge {
                size: message.len(),
                limit: self.config.max_message_size,
            });
        }
        let frame = self.compressor.seal_frame(&message)?;

        let local = self.transport.local_peer();
        let (remotes, include_self) = match target {
            CallTarget::Peer(peer) if peer == local => (Vec::new(), true),
            CallTarget::Peer(peer) => (vec![peer], false),
            CallTarget::Broadcast => (
                self.transport.connected_peers(),
                self.config.broadcast_to_self,
            ),
            CallTarget::BroadcastExcept(excluded) => (
                self.transport
                    .connected_peers()
                    .into_iter()
                    .filter(|peer| *peer != excluded)
                    .collect(),
                self.config.broadcast_to_self && excluded != local,
            ),
        };

        tracing::trace!(
            target: "network",
            identifier,
            ?target,
            ?priority,
            ?reliability,
            channel,
            bytes = frame.len(),
            "sending call"
        );

        let unicast = matches!(target, CallTarget::Peer(_));
        for peer in remotes {
            match self
                .transport
                .send(peer, frame.clone(), priority, reliability, channel)
            {
                Ok(()) => self.record_sent(frame.len()),
                Err(error) if unicast => return Err(error),
                // 列举之后断开的节点不影响其余目标
                Err(error) => {
                    tracing::warn!(target: "network", identifier, %peer, %error, "broadcast send failed")
                }
            }
        }
        if include_self {
            self.record_sent(frame.len());
            self.local_queue.push_back(frame);
        }
        Ok(())
    }

    fn record_sent(&mut self, bytes: usize) {
        self.stats.messages_sent += 1;
        self.stats.bytes_sent += bytes as u64;
    }

    // ========================================================================
    // 接收
    // ========================================================================

    /// 取走并分发自上次调用以来收到的全部消息
    pub fn poll(&mut self) -> PollReport {
        let local = self.transport.local_peer();
        let mut inbound: Vec<(PeerId, Vec<u8>)> = self
            .transport
            .receive()
            .into_iter()
            .map(|Packet { sender, payload, .. }| (sender, payload))
            .collect();
        inbound.extend(self.local_queue.drain(..).map(|frame| (local, frame)));

        let mut report = PollReport::default();
        for (sender, frame) in inbound {
            report.received += 1;
            self.stats.messages_received += 1;
            self.stats.bytes_received += frame.len() as u64;

            let message = match self.open(&frame) {
                Ok(message) => message,
                Err(error) => {
                    tracing::warn!(target: "network", %sender, %error, "dropping malformed message");
                    report.malformed += 1;
                    self.stats.malformed += 1;
                    self.record_event(DispatchEvent::Malformed { sender, error });
                    continue;
                }
            };

            if self.dispatch(sender, message) {
                report.dispatched += 1;
            } else {
                report.unknown += 1;
            }
        }
        report
    }

    fn open(&self, frame: &[u8]) -> NetworkResult<RemoteMessage> {
        let bytes = self
            .compressor
            .open_frame(frame, self.config.max_message_size)?;
        Ok(decode_message(&bytes, self.config.max_value_depth)?)
    }

    fn dispatch(&mut self, sender: PeerId, message: RemoteMessage) -> bool {
        let RemoteMessage { identifier, args } = message;
        let local = self.transport.local_peer();

        let Some(handler) = self.handlers.get_mut(&identifier) else {
            tracing::warn!(target: "network", %identifier, %sender, "no handler registered, dropping call");
            self.stats.unknown_identifiers += 1;
            self.record_event(DispatchEvent::UnknownIdentifier { identifier, sender });
            return false;
        };

        let mut ctx = RpcContext::new(sender, local);
        let mut marshaller = Marshaller::new(&args);
        handler(&mut ctx, &mut marshaller);
        self.stats.dispatched += 1;

        for call in ctx.outbox {
            if let Err(error) = self.send_pending(call) {
                tracing::warn!(target: "network", %identifier, %error, "handler reply not sent");
            }
        }
        self.record_event(DispatchEvent::Dispatched { identifier, sender });
        true
    }

    fn record_event(&mut self, event: DispatchEvent) {
        let capacity = self.config.event_log_capacity;
        if capacity == 0 {
            return;
        }
        while self.events.len() >= capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::signature::{Arity, TypeSignature};
    use crate::bindings::value::Vector3;
    use crate::network::{LinkConditions, LoopbackNetwork, LoopbackTransport, Reorder};

    fn pair_with(
        config: NetworkConfig,
        conditions: LinkConditions,
    ) -> (RpcDispatcher<LoopbackTransport>, RpcDispatcher<LoopbackTransport>) {
        let network = LoopbackNetwork::new();
        let a = RpcDispatcher::new(network.connect(), config.clone());
        let b = RpcDispatcher::new(network.connect_with(conditions), config);
        (a, b)
    }

    fn pair() -> (RpcDispatcher<LoopbackTransport>, RpcDispatcher<LoopbackTransport>) {
        pair_with(NetworkConfig::default(), LinkConditions::default())
    }

    fn collect_ints(
        dispatcher: &mut RpcDispatcher<LoopbackTransport>,
        identifier: &str,
    ) -> Rc<RefCell<Vec<i64>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        dispatcher.register_handler(identifier, move |_ctx, args| {
            sink.borrow_mut().push(args.pop::<i64>());
        });
        seen
    }

    #[test]
    fn test_ping_round_trip_with_sender_identity() {
        let (mut a, mut b) = pair();
        let a_id = a.local_peer();
        let b_id = b.local_peer();

        let seen_sender = Rc::new(RefCell::new(None));
        let seen = Rc::clone(&seen_sender);
        b.register_handler("ping", move |ctx, args| {
            *seen.borrow_mut() = Some(ctx.sender());
            let token = args.pop::<i64>();
            ctx.reply("pong", vec![Value::Int(token)]);
        });

        let pong = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&pong);
        a.register_handler("pong", move |ctx, args| {
            sink.borrow_mut().push((ctx.sender(), args.pop::<i64>()));
        });

        a.call(
            "ping",
            &[Value::Int(99)],
            Priority::High,
            Reliability::Reliable,
            CallTarget::Peer(b_id),
        )
        .unwrap();

        let report = b.poll();
        assert_eq!(report.dispatched, 1);
        assert_eq!(*seen_sender.borrow(), Some(a_id));

        a.poll();
        assert_eq!(*pong.borrow(), vec![(b_id, 99)]);
    }

    #[test]
    fn test_unknown_identifier_is_dropped_and_recorded() {
        let (mut a, mut b) = pair();
        let seen = collect_ints(&mut b, "known");
        let to = CallTarget::Peer(b.local_peer());

        a.call("missing", &[], Priority::Medium, Reliability::Reliable, to)
            .unwrap();
        a.call("known", &[Value::Int(1)], Priority::Medium, Reliability::Reliable, to)
            .unwrap();

        let report = b.poll();
        assert_eq!(report.unknown, 1);
        assert_eq!(report.dispatched, 1);
        assert_eq!(*seen.borrow(), vec![1]);
        assert_eq!(b.stats().unknown_identifiers, 1);
        assert!(b.recent_events().any(|event| matches!(
            event,
            DispatchEvent::UnknownIdentifier { identifier, .. } if identifier == "missing"
        )));
    }

    #[test]
    fn test_reliable_ordered_survives_reordering() {
        let (mut a, mut b) = pair_with(
            NetworkConfig::default(),
            LinkConditions {
                reorder: Reorder::Shuffle,
                seed: 7,
                ..Default::default()
            },
        );
        let seen = collect_ints(&mut b, "seq");
        let to = CallTarget::Peer(b.local_peer());

        for i in 0..32 {
            a.call("seq", &[Value::Int(i)], Priority::Medium, Reliability::ReliableOrdered, to)
                .unwrap();
        }
        b.poll();
        assert_eq!(*seen.borrow(), (0..32).collect::<Vec<i64>>());
    }

    #[test]
    fn test_unreliable_sequenced_never_goes_backwards() {
        let (mut a, mut b) = pair_with(
            NetworkConfig::default(),
            LinkConditions {
                reorder: Reorder::Reverse,
                ..Default::default()
            },
        );
        let seen = collect_ints(&mut b, "pos");
        let to = CallTarget::Peer(b.local_peer());

        for i in 0..5 {
            a.call("pos", &[Value::Int(i)], Priority::Medium, Reliability::UnreliableSequenced, to)
                .unwrap();
        }
        b.poll();
        a.call("pos", &[Value::Int(5)], Priority::Medium, Reliability::UnreliableSequenced, to)
            .unwrap();
        b.poll();

        let seen = seen.borrow();
        assert_eq!(*seen, vec![4, 5]);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_broadcast_targets() {
        let network = LoopbackNetwork::new();
        let mut a = RpcDispatcher::new(network.connect(), NetworkConfig::default());
        let mut b = RpcDispatcher::new(network.connect(), NetworkConfig::default());
        let mut c = RpcDispatcher::new(network.connect(), NetworkConfig::default());
        let seen_a = collect_ints(&mut a, "hello");
        let seen_b = collect_ints(&mut b, "hello");
        let seen_c = collect_ints(&mut c, "hello");

        a.call("hello", &[Value::Int(1)], Priority::Low, Reliability::Reliable, CallTarget::Broadcast)
            .unwrap();
        a.call(
            "hello",
            &[Value::Int(2)],
            Priority::Low,
            Reliability::Reliable,
            CallTarget::BroadcastExcept(c.local_peer()),
        )
        .unwrap();
        a.poll();
        b.poll();
        c.poll();

        assert!(seen_a.borrow().is_empty());
        assert_eq!(*seen_b.borrow(), vec![1, 2]);
        assert_eq!(*seen_c.borrow(), vec![1]);
        assert_eq!(a.stats().messages_sent, 3);
    }

    #[test]
    fn test_broadcast_to_self_when_configured() {
        let config = NetworkConfig {
            broadcast_to_self: true,
            ..Default::default()
        };
        let (mut a, mut b) = pair_with(config, LinkConditions::default());
        let local_flags = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&local_flags);
        a.register_handler("hello", move |ctx, _args| sink.borrow_mut().push(ctx.is_local()));
        let seen_b = collect_ints(&mut b, "hello");

        a.call("hello", &[Value::Int(3)], Priority::Medium, Reliability::Reliable, CallTarget::Broadcast)
            .unwrap();
        a.call(
            "hello",
            &[Value::Int(4)],
            Priority::Medium,
            Reliability::Reliable,
            CallTarget::BroadcastExcept(a.local_peer()),
        )
        .unwrap();

        a.poll();
        b.poll();
        assert_eq!(*local_flags.borrow(), vec![true]);
        assert_eq!(*seen_b.borrow(), vec![3, 4]);
    }

    #[test]
    fn test_over_deep_arguments_are_rejected_before_sending() {
        let config = NetworkConfig {
            max_value_depth: 2,
            ..Default::default()
        };
        let (mut a, b) = pair_with(config, LinkConditions::default());
        let deep = Value::Array(vec![Value::Array(vec![Value::Array(vec![])])]);

        let result = a.call(
            "deep",
            &[deep],
            Priority::Medium,
            Reliability::Reliable,
            CallTarget::Peer(b.local_peer()),
        );
        assert!(matches!(result, Err(NetworkError::Codec(_))));
        assert_eq!(a.stats().messages_sent, 0);
    }

    #[test]
    fn test_malformed_frames_are_recorded() {
        let (mut a, mut b) = pair();
        let to = b.local_peer();
        a.transport_mut()
            .send(to, vec![0, 0xff, 0xff, 0xff, 0xff], Priority::Medium, Reliability::Reliable, 0)
            .unwrap();
        a.transport_mut()
            .send(to, vec![0x40], Priority::Medium, Reliability::Reliable, 0)
            .unwrap();

        let report = b.poll();
        assert_eq!(report.malformed, 2);
        assert_eq!(b.stats().malformed, 2);
    }

    #[test]
    fn test_large_messages_are_compressed() {
        let (mut a, mut b) = pair();
        let received = Rc::new(RefCell::new(String::new()));
        let sink = Rc::clone(&received);
        b.register_handler("blob", move |_ctx, args| {
            *sink.borrow_mut() = args.pop::<String>();
        });

        let blob = "vehicle ".repeat(500);
        a.call(
            "blob",
            &[Value::from(blob.as_str())],
            Priority::Medium,
            Reliability::Reliable,
            CallTarget::Peer(b.local_peer()),
        )
        .unwrap();
        b.poll();

        assert_eq!(*received.borrow(), blob);
        assert!(a.stats().bytes_sent < blob.len() as u64);
    }

    #[test]
    fn test_forward_to_registry_prepends_sender() {
        let (mut a, mut b) = pair();
        let registry = Rc::new(RefCell::new(FunctionRegistry::new()));
        let seen = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&seen);
        registry.borrow_mut().register_function(
            "onPlayerMove",
            Arity::Fixed(2),
            TypeSignature::parse("iv").unwrap(),
            move |m| {
                let player = m.pop::<i64>();
                let pos = m.pop_value();
                *sink.borrow_mut() = Some((player, pos));
                Value::Invalid
            },
        );
        b.forward_to_registry("move", Rc::clone(&registry), "onPlayerMove");

        let pos = Vector3::new(1.0, 2.0, 3.0);
        a.call(
            "move",
            &[Value::Vector3(pos)],
            Priority::Medium,
            Reliability::Reliable,
            CallTarget::Peer(b.local_peer()),
        )
        .unwrap();
        b.poll();

        let expected_sender = i64::from(a.local_peer().0);
        assert_eq!(*seen.borrow(), Some((expected_sender, Value::Vector3(pos))));
    }

    #[test]
    fn test_event_log_is_bounded() {
        let config = NetworkConfig {
            event_log_capacity: 2,
            ..Default::default()
        };
        let (mut a, mut b) = pair_with(config, LinkConditions::default());
        let to = CallTarget::Peer(b.local_peer());
        for name in ["x", "y", "z"] {
            a.call(name, &[], Priority::Medium, Reliability::ReliableOrdered, to)
                .unwrap();
        }
        b.poll();

        let identifiers: Vec<_> = b
            .recent_events()
            .map(|event| match event {
                DispatchEvent::UnknownIdentifier { identifier, .. } => identifier.clone(),
                other => panic!("unexpected event {:?}", other),
            })
            .collect();
        assert_eq!(identifiers, vec!["y", "z"]);
    }

    #[test]
    fn test_register_handler_replaces() {
        let (mut a, mut b) = pair();
        let first = collect_ints(&mut b, "h");
        let second = collect_ints(&mut b, "h");
        a.call("h", &[Value::Int(1)], Priority::Medium, Reliability::Reliable, CallTarget::Peer(b.local_peer()))
            .unwrap();
        b.poll();
        assert!(first.borrow().is_empty());
        assert_eq!(*second.borrow(), vec![1]);
    }
}
