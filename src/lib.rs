//! # scriptlink
//!
//! Script/native bridge for embedded game scripting.
//!
//! ## Features
//!
//! - **Values**: a dynamic `Value` model (bool, int, float, string, vector3,
//!   array, table) shared by scripts, natives and the wire
//! - **Marshalling**: typed argument pops with lenient coercion and explicit
//!   result pushes
//! - **Registry**: named native functions, classes with single inheritance and
//!   handle-tracked instances
//! - **Remote calls**: string-addressed calls between peers with priority,
//!   reliability tiers and unicast/broadcast targets
//! - **JavaScript**: a QuickJS adapter that exposes the registry to scripts
//!
//! ## Example
//!
//! ```ignore
//! use scriptlink::prelude::*;
//!
//! let network = LoopbackNetwork::new();
//! let mut host = BridgeHost::new(BridgeConfig::default(), network.connect())?;
//! host.start()?;
//! host.execute("main.js", "function onPing(sender) { triggerRemote('pong', sender); }")?;
//! host.forward_to_script("ping", "onPing");
//! loop {
//!     host.tick();
//! }
//! ```
//!
//! ## Modules
//!
//! - [`bindings`]: values, marshalling, registry and script adapters
//! - [`network`]: wire codec, transports and the remote call dispatcher
//! - [`scripting`]: resource manifests and startup
//! - [`config`]: configuration loading
//! - [`core`]: errors, logging and the bridge host

/// Values, marshalling, registry and script engine adapters
pub mod bindings;
/// Configuration system
pub mod config;
/// Errors, logging and the bridge host
pub mod core;
/// Named remote calls between peers
pub mod network;
/// Script resources
pub mod scripting;

#[doc(hidden)]
pub use tracing as __tracing;

pub use crate::bindings::{FunctionRegistry, Marshaller, Value};
pub use crate::config::BridgeConfig;
pub use crate::core::{BridgeError, BridgeHost, BridgeResult};

/// Common imports
pub mod prelude {
    pub use crate::bindings::{
        Arity, BindingAdapter, FunctionRegistry, InstanceHandle, JsBindingAdapter, Marshaller,
        Table, TypeSignature, Value, Vector3,
    };
    pub use crate::config::{BridgeConfig, Side};
    pub use crate::core::{init_logging, BridgeError, BridgeHost, BridgeResult};
    pub use crate::network::{
        CallTarget, LoopbackNetwork, PeerId, PendingCall, Priority, Reliability, RpcDispatcher,
        Transport,
    };
}
