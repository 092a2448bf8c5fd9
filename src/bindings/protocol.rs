//! Script engine adapter protocol
//!
//! A language-agnostic surface between a script engine and the native side.
//! Script→native calls go through the [`FunctionRegistry`] the adapter was
//! built with; native→script calls go through [`BindingAdapter::call`].
//!
//! [`FunctionRegistry`]: super::registry::FunctionRegistry

use super::value::Value;
use crate::core::error::ScriptResult;

/// Script engine adapter
pub trait BindingAdapter {
    /// Installs every registered function and class into the engine.
    /// Calling it again re-installs, picking up later registrations.
    fn init(&mut self) -> ScriptResult<()>;

    /// Evaluates a chunk of source; `name` is used in diagnostics.
    fn execute(&mut self, name: &str, source: &str) -> ScriptResult<()>;

    /// Invokes a named script callable and returns its single result.
    ///
    /// Top-level `Vector3` arguments are pushed as three floats.
    fn call(&mut self, function: &str, args: &[Value]) -> ScriptResult<Value>;

    /// Whether the script defines a callable with this name.
    fn has_function(&mut self, name: &str) -> bool;

    /// Runs the engine's collector and releases instances whose script
    /// objects are gone. Returns the number of releases.
    fn collect_garbage(&mut self) -> usize {
        0
    }

    /// Releases every live native instance and stops accepting calls.
    fn shutdown(&mut self);
}
