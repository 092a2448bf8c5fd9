//! 桥接宿主
//!
//! 把配置、函数注册表、JS 适配器和远程调用分发器组装在一起，
//! 每帧调用一次 [`BridgeHost::tick`]：
//!
//! ```text
//! tick()
//!  ├─ dispatcher.poll()      收到的远程调用 → 处理器 → 脚本函数
//!  ├─ flush outbox           脚本里 triggerRemote(...) 排队的调用 → 传输层
//!  └─ release finalized      已被 JS 回收的包装对象 → 释放原生实例
//! ```
//!
//! 脚本发起的远程调用先进入发件箱，分发过程不会被重入。
//!
//! 安装到脚本中的原生函数：
//!
//! | 函数 | 说明 |
//! |------|------|
//! | `triggerRemote(identifier, target, ...args)` | `target >= 0` 为节点 id，`-1` 为广播 |
//! | `triggerRemoteWith(identifier, target, options, ...args)` | 同上，`options` 指定发送参数 |
//! | `relayRemote(identifier, excluded, ...args)` | 广播给除 `excluded` 外的所有节点 |
//! | `relayRemoteWith(identifier, excluded, options, ...args)` | 同上，`options` 指定发送参数 |
//! | `getLocalPeer()` | 本地节点 id |
//!
//! `options` 表的字段都可省略：`priority`（`"low"` .. `"immediate"`）、
//! `reliability`（`"unreliable"`、`"unreliableSequenced"`、`"reliable"`、
//! `"reliableOrdered"`、`"reliableSequenced"`）、`channel`（0 - 255）。
//! 字段值无法识别时调用不会排队，函数返回 `false`。

use crate::bindings::js::{JsBindingAdapter, SharedRegistry};
use crate::bindings::marshal::{Coerced, Marshaller};
use crate::bindings::protocol::BindingAdapter;
use crate::bindings::registry::FunctionRegistry;
use crate::bindings::signature::{Arity, TypeSignature};
use crate::bindings::value::{Table, Value};
use crate::config::BridgeConfig;
use crate::core::error::BridgeResult;
use crate::network::{
    CallTarget, PeerId, PendingCall, PollReport, Priority, Reliability, RpcDispatcher, Transport,
};
use crate::scripting::{start_resources, ScriptResource};
use std::cell::RefCell;
use std::rc::Rc;

type Outbox = Rc<RefCell<Vec<PendingCall>>>;

/// 一次 `tick()` 的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub poll: PollReport,
    /// 发件箱中成功交给传输层的调用数
    pub flushed: usize,
    /// 发送失败的调用数
    pub failed: usize,
    /// 因 JS 包装对象被回收而释放的原生实例数
    pub released: usize,
}

/// 桥接宿主
pub struct BridgeHost<T: Transport> {
    config: BridgeConfig,
    registry: SharedRegistry,
    adapter: Rc<RefCell<JsBindingAdapter>>,
    dispatcher: RpcDispatcher<T>,
    outbox: Outbox,
    resources: Vec<ScriptResource>,
    ticks: u64,
}

impl<T: Transport> BridgeHost<T> {
    pub fn new(config: BridgeConfig, transport: T) -> BridgeResult<Self> {
        config.validate()?;

        let local = transport.local_peer();
        let outbox: Outbox = Rc::new(RefCell::new(Vec::new()));
        let registry: SharedRegistry = Rc::new(RefCell::new(FunctionRegistry::new()));
        register_remote_natives(&mut registry.borrow_mut(), &outbox, local)?;

        let adapter = JsBindingAdapter::with_max_depth(
            Rc::clone(&registry),
            config.scripting.max_value_depth,
        )?;
        let dispatcher = RpcDispatcher::new(transport, config.network.clone());

        tracing::info!(target: "host", peer = %local, side = %config.scripting.side, "bridge host created");
        Ok(Self {
            config,
            registry,
            adapter: Rc::new(RefCell::new(adapter)),
            dispatcher,
            outbox,
            resources: Vec::new(),
            ticks: 0,
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// 注册表；在 `start()` 之前注册的函数和类会安装到脚本中
    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn dispatcher(&self) -> &RpcDispatcher<T> {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut RpcDispatcher<T> {
        &mut self.dispatcher
    }

    pub fn local_peer(&self) -> PeerId {
        self.dispatcher.local_peer()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn resources(&self) -> &[ScriptResource] {
        &self.resources
    }

    /// 安装绑定并启动配置中的资源
    pub fn start(&mut self) -> BridgeResult<()> {
        let mut adapter = self.adapter.borrow_mut();
        adapter.init()?;
        self.resources = start_resources(&self.config.scripting, &mut *adapter)?;
        tracing::info!(target: "host", resources = self.resources.len(), "bridge host started");
        Ok(())
    }

    pub fn execute(&mut self, name: &str, source: &str) -> BridgeResult<()> {
        Ok(self.adapter.borrow_mut().execute(name, source)?)
    }

    pub fn call_script(&mut self, function: &str, args: &[Value]) -> BridgeResult<Value> {
        Ok(self.adapter.borrow_mut().call(function, args)?)
    }

    pub fn evaluate(&mut self, source: &str) -> BridgeResult<Value> {
        Ok(self.adapter.borrow_mut().evaluate(source)?)
    }

    /// 把远程调用转给脚本函数，发送方 id 作为第一个参数
    pub fn forward_to_script(&mut self, identifier: impl Into<String>, function: impl Into<String>) {
        let adapter = Rc::clone(&self.adapter);
        let function = function.into();
        self.dispatcher.register_handler(identifier, move |ctx, args| {
            let mut forwarded = Vec::with_capacity(args.args().len() + 1);
            forwarded.push(Value::Int(i64::from(ctx.sender().0)));
            forwarded.extend_from_slice(args.args());

            let Ok(mut adapter) = adapter.try_borrow_mut() else {
                tracing::warn!(target: "host", %function, "script runtime busy, remote call dropped");
                return;
            };
            if let Err(error) = adapter.call(&function, &forwarded) {
                tracing::warn!(target: "host", %function, %error, "script handler failed");
            }
        });
    }

    /// 运行 JS 垃圾回收并释放不再被引用的原生实例
    pub fn collect_garbage(&mut self) -> usize {
        match self.adapter.try_borrow_mut() {
            Ok(mut adapter) => adapter.collect_garbage(),
            Err(_) => {
                tracing::warn!(target: "host", "script runtime busy, garbage collection skipped");
                0
            }
        }
    }

    /// 分发收到的远程调用，然后发送脚本排队的调用
    pub fn tick(&mut self) -> TickReport {
        let poll = self.dispatcher.poll();
        let (flushed, failed) = self.flush_outbox();
        let released = self
            .adapter
            .try_borrow_mut()
            .map_or(0, |mut adapter| adapter.release_finalized());
        self.ticks += 1;

        if poll.received > 0 || flushed > 0 || failed > 0 || released > 0 {
            tracing::trace!(
                target: "host",
                tick = self.ticks,
                received = poll.received,
                dispatched = poll.dispatched,
                flushed,
                failed,
                released,
                "tick"
            );
        }
        TickReport {
            poll,
            flushed,
            failed,
            released,
        }
    }

    fn flush_outbox(&mut self) -> (usize, usize) {
        let pending = std::mem::take(&mut *self.outbox.borrow_mut());
        let mut flushed = 0;
        let mut failed = 0;
        for call in pending {
            let identifier = call.identifier.clone();
            match self.dispatcher.send_pending(call) {
                Ok(()) => flushed += 1,
                Err(error) => {
                    failed += 1;
                    tracing::warn!(target: "host", %identifier, %error, "script remote call not sent");
                }
            }
        }
        (flushed, failed)
    }

    /// 释放全部原生实例并停止脚本运行时
    pub fn shutdown(&mut self) {
        self.adapter.borrow_mut().shutdown();
        tracing::info!(target: "host", ticks = self.ticks, "bridge host shut down");
    }
}

fn register_remote_natives(
    registry: &mut FunctionRegistry,
    outbox: &Outbox,
    local: PeerId,
) -> BridgeResult<()> {
    for (name, with_options) in [("triggerRemote", false), ("triggerRemoteWith", true)] {
        let queue = Rc::clone(outbox);
        let (arity, mask) = remote_signature(with_options);
        registry.register_function(name, arity, TypeSignature::parse(mask)?, move |m| {
            let identifier = m.pop::<String>();
            let target = match m.pop::<i64>() {
                -1 => CallTarget::Broadcast,
                raw => match u32::try_from(raw) {
                    Ok(peer) => CallTarget::Peer(PeerId(peer)),
                    Err(_) => {
                        tracing::warn!(target: "host", %identifier, raw, "invalid remote call target");
                        return Value::Bool(false);
                    }
                },
            };
            queue_remote(&queue, m, identifier, target, with_options)
        });
    }

    for (name, with_options) in [("relayRemote", false), ("relayRemoteWith", true)] {
        let queue = Rc::clone(outbox);
        let (arity, mask) = remote_signature(with_options);
        registry.register_function(name, arity, TypeSignature::parse(mask)?, move |m| {
            let identifier = m.pop::<String>();
            let Ok(excluded) = u32::try_from(m.pop::<i64>()) else {
                return Value::Bool(false);
            };
            let target = CallTarget::BroadcastExcept(PeerId(excluded));
            queue_remote(&queue, m, identifier, target, with_options)
        });
    }

    registry.register_function("getLocalPeer", Arity::Fixed(0), TypeSignature::any(), move |_| {
        Value::Int(i64::from(local.0))
    });
    Ok(())
}

fn remote_signature(with_options: bool) -> (Arity, &'static str) {
    if with_options {
        (Arity::AtLeast(3), "s i t")
    } else {
        (Arity::AtLeast(2), "s i")
    }
}

/// 按选项构造调用并放入发件箱，剩余参数原样转发
fn queue_remote(
    queue: &Outbox,
    m: &mut Marshaller<'_>,
    identifier: String,
    target: CallTarget,
    with_options: bool,
) -> Value {
    let mut call = PendingCall::new(identifier, target);
    if with_options {
        let options = m.pop::<Table>();
        call = match apply_options(call, &options) {
            Ok(call) => call,
            Err(field) => {
                tracing::warn!(target: "host", field, "invalid remote call option");
                return Value::Bool(false);
            }
        };
    }
    let args = m.args().get(m.position()..).unwrap_or(&[]).to_vec();
    queue.borrow_mut().push(call.with_args(args));
    Value::Bool(true)
}

/// 读取 `{priority, reliability, channel}`；出错时返回字段名
fn apply_options(mut call: PendingCall, options: &Table) -> Result<PendingCall, &'static str> {
    let fields = ["priority", "reliability", "channel"]
        .map(|key| options.get_str(key).cloned().unwrap_or_default());
    let mut m = Marshaller::new(&fields);

    match m.try_pop_or(String::new()) {
        Coerced::Exact(name) => {
            call = call.priority(Priority::from_name(&name).ok_or("priority")?);
        }
        Coerced::Defaulted(_) => {}
        Coerced::Zeroed(_) => return Err("priority"),
    }
    match m.try_pop_or(String::new()) {
        Coerced::Exact(name) => {
            call = call.reliability(Reliability::from_name(&name).ok_or("reliability")?);
        }
        Coerced::Defaulted(_) => {}
        Coerced::Zeroed(_) => return Err("reliability"),
    }
    match m.try_pop_or(0i64) {
        Coerced::Exact(channel) => {
            call = call.channel(u8::try_from(channel).map_err(|_| "channel")?);
        }
        Coerced::Defaulted(_) => {}
        Coerced::Zeroed(_) => return Err("channel"),
    }
    Ok(call)
}
