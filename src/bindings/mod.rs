//! Language Binding Layer
//!
//! Values, argument marshalling and the native function registry shared by
//! every script engine adapter, plus the QuickJS adapter itself.
//!
//! Architecture:
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ┌─────────────────────┐        ┌─────────────────────┐     │
//! │  │  JS (QuickJS)       │  ...   │  other engines      │     │
//! │  └──────────┬──────────┘        └──────────┬──────────┘     │
//! │             v                              v                │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │        BindingAdapter (per-language protocol)       │    │
//! │  └───────────────────────┬─────────────────────────────┘    │
//! │                          v                                  │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │   FunctionRegistry: functions, classes, instances   │    │
//! │  │   Marshaller: typed pop/push over Value slots       │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod js;
pub mod marshal;
pub mod protocol;
pub mod registry;
pub mod signature;
pub mod value;

pub use js::{JsBindingAdapter, SharedRegistry};
pub use marshal::{ArgType, Coerced, Marshaller};
pub use protocol::BindingAdapter;
pub use registry::{BoundMethod, FunctionBinding, FunctionRegistry, InstanceHandle, NativeFunction};
pub use signature::{Arity, TypeSignature};
pub use value::{Table, Value, ValueKind, Vector3};
