//! JavaScript Binding Adapter using rquickjs
//!
//! Exposes a [`FunctionRegistry`] to QuickJS and lets native code call back
//! into script functions.
//!
//! ```text
//! registry function "getPlayerName"  ->  globalThis.getPlayerName(...)
//! registry class "Vehicle"           ->  globalThis.Vehicle.create(...)  -> instance
//!                                        globalThis.Vehicle.wrap(handle) -> instance
//! instance                           ->  { __handle, destroy(), <methods> }
//! ```
//!
//! Every instance object owns a hidden finalizer token. When QuickJS collects
//! the last object for a handle, the handle is queued and released through
//! [`FunctionRegistry::collect`] after the current `execute`/`call`/`evaluate`
//! (or on [`JsBindingAdapter::release_finalized`]). An explicit `destroy()`
//! releases at once; the later collection is then a no-op.
//!
//! Value mapping:
//!
//! | Value      | JavaScript                                   |
//! |------------|----------------------------------------------|
//! | `Invalid`  | `undefined` / `null`                         |
//! | `Int`      | integral number (floats above 2^53 stay `Float`) |
//! | `Float`    | non-integral number                          |
//! | `Vector3`  | `{ x, y, z }`                                |
//! | `Table`    | plain object, keys stringified               |
//! | `Array`    | array                                        |
//!
//! An object carrying `__handle` converts to the handle's `Int`. JS numbers
//! have no int/float split, so `Int` arguments landing in float-only signature
//! slots are widened before the native entry runs.

use super::marshal::Marshaller;
use super::protocol::BindingAdapter;
use super::registry::{FunctionRegistry, InstanceHandle};
use super::value::{Table, Value, Vector3};
use crate::core::error::{ScriptError, ScriptResult};
use rquickjs::class::{Trace, Tracer};
use rquickjs::function::Rest;
use rquickjs::{Array, Class, Context, Ctx, Function, Object, Runtime, Type, Value as JsValue};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Registry shared between the adapter and every installed JS function.
pub type SharedRegistry = Rc<RefCell<FunctionRegistry>>;

const HANDLE_KEY: &str = "__handle";
const TOKEN_KEY: &str = "__native";
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;
const CONSOLE_DEPTH: usize = 8;

type SharedTracker = Rc<RefCell<WrapperTracker>>;

/// Live script objects per handle.
#[derive(Default)]
struct WrapperTracker {
    wrappers: HashMap<InstanceHandle, usize>,
    /// Handles whose last script object was collected, not yet released.
    finalized: Vec<InstanceHandle>,
}

impl WrapperTracker {
    fn retain(&mut self, handle: InstanceHandle) {
        *self.wrappers.entry(handle).or_insert(0) += 1;
    }

    fn drop_wrapper(&mut self, handle: InstanceHandle) {
        let Some(count) = self.wrappers.get_mut(&handle) else {
            return;
        };
        *count -= 1;
        if *count == 0 {
            self.wrappers.remove(&handle);
            self.finalized.push(handle);
        }
    }
}

/// Hidden payload of an instance object; QuickJS drops it on collection.
#[rquickjs::class]
struct ReleaseToken {
    handle: InstanceHandle,
    tracker: SharedTracker,
}

impl<'js> Trace<'js> for ReleaseToken {
    fn trace<'a>(&self, _tracer: Tracer<'a, 'js>) {}
}

impl Drop for ReleaseToken {
    fn drop(&mut self) {
        match self.tracker.try_borrow_mut() {
            Ok(mut tracker) => tracker.drop_wrapper(self.handle),
            Err(_) => tracing::warn!(
                target: "script",
                handle = %self.handle,
                "instance collected while tracker busy, release skipped"
            ),
        }
    }
}

pub struct JsBindingAdapter {
    runtime: Runtime,
    context: Context,
    registry: SharedRegistry,
    tracker: SharedTracker,
    max_depth: usize,
    active: bool,
}

impl JsBindingAdapter {
    pub fn new(registry: SharedRegistry) -> ScriptResult<Self> {
        Self::with_max_depth(registry, 32)
    }

    pub fn with_max_depth(registry: SharedRegistry, max_depth: usize) -> ScriptResult<Self> {
        let runtime = Runtime::new()
            .map_err(|e| ScriptError::Runtime(format!("failed to create JS runtime: {}", e)))?;
        let context = Context::full(&runtime)
            .map_err(|e| ScriptError::Runtime(format!("failed to create JS context: {}", e)))?;

        Ok(Self {
            runtime,
            context,
            registry,
            tracker: Rc::default(),
            max_depth,
            active: true,
        })
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn set_memory_limit(&self, bytes: usize) {
        self.runtime.set_memory_limit(bytes);
    }

    /// Evaluates an expression and converts its result.
    pub fn evaluate(&mut self, source: &str) -> ScriptResult<Value> {
        self.ensure_active()?;
        let max_depth = self.max_depth;
        let result = self.context.with(|ctx| {
            let result: JsValue = ctx.eval(source).map_err(|e| script_error(&ctx, e))?;
            js_to_value(&result, 0, max_depth)
        });
        self.release_finalized();
        result
    }

    /// Releases handles whose script objects have been collected. Returns the
    /// number of release events fired.
    pub fn release_finalized(&mut self) -> usize {
        let Ok(mut registry) = self.registry.try_borrow_mut() else {
            return 0;
        };
        let finalized = match self.tracker.try_borrow_mut() {
            Ok(mut tracker) => std::mem::take(&mut tracker.finalized),
            Err(_) => return 0,
        };
        let released = finalized
            .into_iter()
            .filter(|handle| registry.collect(*handle))
            .count();
        if released > 0 {
            tracing::trace!(target: "script", released, "collected instances released");
        }
        released
    }

    /// Script objects currently alive for `handle`.
    pub fn wrapper_count(&self, handle: InstanceHandle) -> usize {
        self.tracker
            .try_borrow()
            .map(|tracker| tracker.wrappers.get(&handle).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    fn ensure_active(&self) -> ScriptResult<()> {
        if self.active {
            Ok(())
        } else {
            Err(ScriptError::Runtime("script runtime has been shut down".to_string()))
        }
    }
}

impl BindingAdapter for JsBindingAdapter {
    fn init(&mut self) -> ScriptResult<()> {
        let (functions, classes) = {
            let registry = self
                .registry
                .try_borrow()
                .map_err(|_| ScriptError::InvalidBinding("registry is in use".to_string()))?;
            (
                registry.function_names().map(str::to_string).collect::<Vec<_>>(),
                registry.class_names().map(str::to_string).collect::<Vec<_>>(),
            )
        };

        let registry = Rc::clone(&self.registry);
        let tracker = Rc::clone(&self.tracker);
        let max_depth = self.max_depth;
        self.context
            .with(|ctx| -> rquickjs::Result<()> {
                install_console(&ctx)?;
                for name in &functions {
                    install_function(&ctx, &registry, name, max_depth)?;
                }
                for class in &classes {
                    install_class(&ctx, &registry, &tracker, class, max_depth)?;
                }
                Ok(())
            })
            .map_err(|e| ScriptError::InvalidBinding(e.to_string()))?;

        self.active = true;
        tracing::debug!(
            target: "script",
            functions = functions.len(),
            classes = classes.len(),
            "bindings installed"
        );
        Ok(())
    }

    fn execute(&mut self, name: &str, source: &str) -> ScriptResult<()> {
        self.ensure_active()?;
        tracing::debug!(target: "script", script = name, "executing");
        let result = self
            .context
            .with(|ctx| ctx.eval::<(), _>(source).map_err(|e| script_error(&ctx, e)))
            .map_err(|error| match error {
                ScriptError::Compilation(msg) => ScriptError::Compilation(format!("{}: {}", name, msg)),
                ScriptError::Runtime(msg) => ScriptError::Runtime(format!("{}: {}", name, msg)),
                other => other,
            });
        self.release_finalized();
        result
    }

    fn call(&mut self, function: &str, args: &[Value]) -> ScriptResult<Value> {
        self.ensure_active()?;

        let mut outgoing = Marshaller::outgoing();
        for arg in args {
            outgoing.push(arg.clone());
        }
        let pushed = outgoing.into_pushed();
        let max_depth = self.max_depth;

        let result = self.context.with(|ctx| {
            let callee: JsValue = ctx.globals().get(function).map_err(runtime_error)?;
            let Some(callee) = callee.as_function() else {
                return Err(ScriptError::NotFound(function.to_string()));
            };
            let js_args = pushed
                .iter()
                .map(|value| value_to_js(&ctx, value))
                .collect::<rquickjs::Result<Vec<_>>>()
                .map_err(runtime_error)?;
            let result: JsValue = callee
                .call((Rest(js_args),))
                .map_err(|e| script_error(&ctx, e))?;
            js_to_value(&result, 0, max_depth)
        });
        self.release_finalized();
        result
    }

    fn has_function(&mut self, name: &str) -> bool {
        self.context.with(|ctx| {
            ctx.globals()
                .get::<_, JsValue>(name)
                .map(|value| value.is_function())
                .unwrap_or(false)
        })
    }

    fn shutdown(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        let released = match self.registry.try_borrow_mut() {
            Ok(mut registry) => registry.collect_all(),
            Err(_) => {
                tracing::warn!(
                    target: "script",
                    "registry is in use at shutdown, live instances not released"
                );
                0
            }
        };
        self.runtime.run_gc();
        tracing::debug!(target: "script", released, "script runtime shut down");
    }

    fn collect_garbage(&mut self) -> usize {
        if !self.active {
            return 0;
        }
        self.runtime.run_gc();
        self.release_finalized()
    }
}

impl Drop for JsBindingAdapter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// Installation
// ============================================================================

fn install_console<'js>(ctx: &Ctx<'js>) -> rquickjs::Result<()> {
    let globals = ctx.globals();
    globals.set(
        "print",
        Function::new(ctx.clone(), |args: Rest<JsValue<'js>>| {
            tracing::info!(target: "script.console", "{}", console_line(&args.0));
        })?,
    )?;

    let console = Object::new(ctx.clone())?;
    console.set(
        "log",
        Function::new(ctx.clone(), |args: Rest<JsValue<'js>>| {
            tracing::info!(target: "script.console", "{}", console_line(&args.0));
        })?,
    )?;
    console.set(
        "warn",
        Function::new(ctx.clone(), |args: Rest<JsValue<'js>>| {
            tracing::warn!(target: "script.console", "{}", console_line(&args.0));
        })?,
    )?;
    console.set(
        "error",
        Function::new(ctx.clone(), |args: Rest<JsValue<'js>>| {
            tracing::error!(target: "script.console", "{}", console_line(&args.0));
        })?,
    )?;
    globals.set("console", console)
}

fn install_function<'js>(
    ctx: &Ctx<'js>,
    registry: &SharedRegistry,
    name: &str,
    max_depth: usize,
) -> rquickjs::Result<()> {
    let registry = Rc::clone(registry);
    let function = name.to_string();
    let entry = Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, args: Rest<JsValue<'js>>| -> rquickjs::Result<JsValue<'js>> {
            let result = invoke_function(&registry, &function, &args.0, max_depth);
            result_to_js(&ctx, result)
        },
    )?;
    ctx.globals().set(name, entry)
}

fn install_class<'js>(
    ctx: &Ctx<'js>,
    registry: &SharedRegistry,
    tracker: &SharedTracker,
    class: &str,
    max_depth: usize,
) -> rquickjs::Result<()> {
    let namespace = Object::new(ctx.clone())?;
    namespace.set("name", class)?;

    let shared = Rc::clone(registry);
    let wrappers = Rc::clone(tracker);
    let name = class.to_string();
    namespace.set(
        "create",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, args: Rest<JsValue<'js>>| -> rquickjs::Result<JsValue<'js>> {
                match construct(&shared, &name, &args.0, max_depth) {
                    Some(handle) => instance_value(&ctx, &shared, &wrappers, handle, max_depth),
                    None => Ok(JsValue::new_undefined(ctx.clone())),
                }
            },
        )?,
    )?;

    let shared = Rc::clone(registry);
    let wrappers = Rc::clone(tracker);
    let name = class.to_string();
    namespace.set(
        "wrap",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, args: Rest<JsValue<'js>>| -> rquickjs::Result<JsValue<'js>> {
                let handle = match args.0.first().map(|arg| js_to_value(arg, 0, max_depth)) {
                    Some(Ok(Value::Int(raw))) if raw >= 0 => InstanceHandle::from_raw(raw as u64),
                    _ => return Ok(JsValue::new_undefined(ctx.clone())),
                };
                let is_instance = shared
                    .try_borrow()
                    .map(|registry| instance_is_a(&registry, handle, &name))
                    .unwrap_or(false);
                if is_instance {
                    instance_value(&ctx, &shared, &wrappers, handle, max_depth)
                } else {
                    Ok(JsValue::new_undefined(ctx.clone()))
                }
            },
        )?,
    )?;

    ctx.globals().set(class, namespace)
}

fn instance_is_a(registry: &FunctionRegistry, handle: InstanceHandle, class: &str) -> bool {
    registry
        .instance_class(handle)
        .map_or(false, |actual| actual == class || registry.class_base(actual) == Some(class))
}

/// Script object for a live instance; `undefined` once the handle is released.
fn instance_value<'js>(
    ctx: &Ctx<'js>,
    registry: &SharedRegistry,
    tracker: &SharedTracker,
    handle: InstanceHandle,
    max_depth: usize,
) -> rquickjs::Result<JsValue<'js>> {
    let methods = {
        let Ok(borrowed) = registry.try_borrow() else {
            return Ok(JsValue::new_undefined(ctx.clone()));
        };
        let Some(class) = borrowed.instance_class(handle) else {
            return Ok(JsValue::new_undefined(ctx.clone()));
        };
        borrowed.method_names(class)
    };

    let Ok(mut wrappers) = tracker.try_borrow_mut() else {
        return Ok(JsValue::new_undefined(ctx.clone()));
    };
    wrappers.retain(handle);
    drop(wrappers);
    let token = ReleaseToken {
        handle,
        tracker: Rc::clone(tracker),
    };

    let object = Object::new(ctx.clone())?;
    object.set(TOKEN_KEY, Class::instance(ctx.clone(), token)?)?;
    object.set(HANDLE_KEY, value_to_js(ctx, &Value::from(handle))?)?;

    let shared = Rc::clone(registry);
    object.set(
        "destroy",
        Function::new(ctx.clone(), move || -> bool {
            shared
                .try_borrow_mut()
                .map(|mut registry| registry.collect(handle))
                .unwrap_or(false)
        })?,
    )?;

    // Registered methods win over `destroy`.
    for method in methods {
        let shared = Rc::clone(registry);
        let name = method.clone();
        object.set(
            method.as_str(),
            Function::new(
                ctx.clone(),
                move |ctx: Ctx<'js>, args: Rest<JsValue<'js>>| -> rquickjs::Result<JsValue<'js>> {
                    let result = invoke_method(&shared, handle, &name, &args.0, max_depth);
                    result_to_js(&ctx, result)
                },
            )?,
        )?;
    }

    Ok(object.into_value())
}

// ============================================================================
// Script -> native calls
// ============================================================================

fn convert_args(args: &[JsValue<'_>], max_depth: usize, callee: &str) -> Option<Vec<Value>> {
    let converted: ScriptResult<Vec<Value>> = args
        .iter()
        .map(|arg| js_to_value(arg, 0, max_depth))
        .collect();
    converted
        .map_err(|error| {
            tracing::warn!(target: "script", callee, %error, "arguments not convertible, call dropped");
        })
        .ok()
}

fn invoke_function(
    registry: &SharedRegistry,
    name: &str,
    args: &[JsValue<'_>],
    max_depth: usize,
) -> Option<Value> {
    let mut args = convert_args(args, max_depth, name)?;
    let binding = registry
        .try_borrow()
        .ok()
        .and_then(|registry| registry.resolve_function(name));
    let Some(binding) = binding else {
        tracing::warn!(target: "script", function = name, "function is no longer registered");
        return None;
    };

    binding.signature().widen_ints(&mut args);
    match binding.invoke(&args) {
        Ok(result) => Some(result),
        Err(rejected) => {
            tracing::warn!(target: "script", function = name, %rejected, "call rejected");
            None
        }
    }
}

fn invoke_method(
    registry: &SharedRegistry,
    handle: InstanceHandle,
    method: &str,
    args: &[JsValue<'_>],
    max_depth: usize,
) -> Option<Value> {
    let mut args = convert_args(args, max_depth, method)?;
    let prepared = match registry.try_borrow() {
        Ok(registry) => registry.prepare_method(handle, method),
        Err(_) => {
            tracing::warn!(target: "script", %handle, method, "registry is in use, call dropped");
            return None;
        }
    };

    let result = prepared.and_then(|bound| {
        bound.signature().widen_ints(&mut args);
        bound.invoke(&args)
    });
    match result {
        Ok(value) => Some(value),
        Err(rejected) => {
            tracing::warn!(target: "script", %handle, method, %rejected, "method call rejected");
            None
        }
    }
}

fn construct(
    registry: &SharedRegistry,
    class: &str,
    args: &[JsValue<'_>],
    max_depth: usize,
) -> Option<InstanceHandle> {
    let args = convert_args(args, max_depth, class)?;
    let Ok(mut registry) = registry.try_borrow_mut() else {
        tracing::warn!(target: "script", class, "registry is in use, construction dropped");
        return None;
    };
    match registry.construct(class, &args) {
        Ok(handle) => Some(handle),
        Err(rejected) => {
            tracing::warn!(target: "script", class, %rejected, "construction rejected");
            None
        }
    }
}

fn result_to_js<'js>(ctx: &Ctx<'js>, result: Option<Value>) -> rquickjs::Result<JsValue<'js>> {
    match result {
        Some(value) => value_to_js(ctx, &value),
        None => Ok(JsValue::new_undefined(ctx.clone())),
    }
}

// ============================================================================
// Value conversion
// ============================================================================

fn value_to_js<'js>(ctx: &Ctx<'js>, value: &Value) -> rquickjs::Result<JsValue<'js>> {
    let converted = match value {
        Value::Invalid => JsValue::new_undefined(ctx.clone()),
        Value::Bool(b) => JsValue::new_bool(ctx.clone(), *b),
        Value::Int(i) => match i32::try_from(*i) {
            Ok(small) => JsValue::new_int(ctx.clone(), small),
            Err(_) => JsValue::new_float(ctx.clone(), *i as f64),
        },
        Value::Float(f) => JsValue::new_float(ctx.clone(), *f),
        Value::String(s) => rquickjs::String::from_str(ctx.clone(), s)?.into_value(),
        Value::Vector3(v) => {
            let object = Object::new(ctx.clone())?;
            object.set("x", v.x)?;
            object.set("y", v.y)?;
            object.set("z", v.z)?;
            object.into_value()
        }
        Value::Array(items) => {
            let array = Array::new(ctx.clone())?;
            for (index, item) in items.iter().enumerate() {
                array.set(index, value_to_js(ctx, item)?)?;
            }
            array.into_value()
        }
        Value::Table(table) => {
            let object = Object::new(ctx.clone())?;
            for (key, item) in table {
                match table_key(key) {
                    Some(key) => object.set(key, value_to_js(ctx, item)?)?,
                    None => tracing::debug!(
                        target: "script",
                        kind = %key.kind(),
                        "table key has no property name, entry skipped"
                    ),
                }
            }
            object.into_value()
        }
    };
    Ok(converted)
}

fn table_key(key: &Value) -> Option<String> {
    match key {
        Value::String(s) => Some(s.clone()),
        Value::Int(i) => Some(i.to_string()),
        Value::Float(f) => Some(f.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn js_to_value(value: &JsValue<'_>, level: usize, max_depth: usize) -> ScriptResult<Value> {
    let converted = match value.type_of() {
        Type::Uninitialized | Type::Undefined | Type::Null => Value::Invalid,
        Type::Bool => Value::Bool(value.as_bool().unwrap_or_default()),
        Type::Int => Value::Int(value.as_int().map(i64::from).unwrap_or_default()),
        Type::Float => number_to_value(value.as_float().unwrap_or_default()),
        Type::String => match value.as_string() {
            Some(s) => Value::String(s.to_string().map_err(runtime_error)?),
            None => Value::Invalid,
        },
        Type::Array => {
            let inner = enter(level, max_depth)?;
            let mut items = Vec::new();
            if let Some(array) = value.as_array() {
                items.reserve(array.len());
                for item in array.iter::<JsValue>() {
                    items.push(js_to_value(&item.map_err(runtime_error)?, inner, max_depth)?);
                }
            }
            Value::Array(items)
        }
        Type::Object => match value.as_object() {
            Some(object) => object_to_value(object, level, max_depth)?,
            None => Value::Invalid,
        },
        other => {
            tracing::debug!(target: "script", kind = ?other, "script value has no Value counterpart");
            Value::Invalid
        }
    };
    Ok(converted)
}

fn object_to_value(object: &Object<'_>, level: usize, max_depth: usize) -> ScriptResult<Value> {
    let handle: JsValue = object.get(HANDLE_KEY).map_err(runtime_error)?;
    if !handle.is_undefined() {
        return js_to_value(&handle, level, max_depth);
    }

    let inner = enter(level, max_depth)?;
    let mut table = Table::new();
    for prop in object.props::<String, JsValue>() {
        let (key, item) = prop.map_err(runtime_error)?;
        if item.is_function() {
            continue;
        }
        table.insert(key, js_to_value(&item, inner, max_depth)?);
    }

    Ok(match table_as_vector3(&table) {
        Some(v) => Value::Vector3(v),
        None => Value::Table(table),
    })
}

fn table_as_vector3(table: &Table) -> Option<Vector3> {
    if table.len() != 3 {
        return None;
    }
    let component = |key: &str| match table.get_str(key)? {
        Value::Float(f) => Some(*f),
        Value::Int(i) => Some(*i as f64),
        _ => None,
    };
    Some(Vector3::new(component("x")?, component("y")?, component("z")?))
}

fn number_to_value(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER {
        Value::Int(f as i64)
    } else {
        Value::Float(f)
    }
}

fn enter(level: usize, max_depth: usize) -> ScriptResult<usize> {
    if level >= max_depth {
        return Err(ScriptError::InvalidBinding(format!(
            "script value nests deeper than {} levels",
            max_depth
        )));
    }
    Ok(level + 1)
}

// ============================================================================
// Diagnostics
// ============================================================================

fn runtime_error(error: rquickjs::Error) -> ScriptError {
    ScriptError::Runtime(error.to_string())
}

/// Turns a pending JS exception into a `ScriptError`; syntax errors count as
/// compilation failures.
fn script_error(ctx: &Ctx<'_>, error: rquickjs::Error) -> ScriptError {
    if !matches!(error, rquickjs::Error::Exception) {
        return runtime_error(error);
    }

    let caught = ctx.catch();
    if let Some(object) = caught.as_object() {
        let name: String = object
            .get::<_, Option<String>>("name")
            .ok()
            .flatten()
            .unwrap_or_default();
        let message: String = object
            .get::<_, Option<String>>("message")
            .ok()
            .flatten()
            .unwrap_or_default();
        let text = if name.is_empty() {
            message
        } else {
            format!("{}: {}", name, message)
        };
        return if name == "SyntaxError" {
            ScriptError::Compilation(text)
        } else {
            ScriptError::Runtime(text)
        };
    }

    match caught.as_string().map(|s| s.to_string()) {
        Some(Ok(text)) => ScriptError::Runtime(text),
        _ => ScriptError::Runtime(format!("uncaught exception: {:?}", caught)),
    }
}

fn console_line(args: &[JsValue<'_>]) -> String {
    args.iter()
        .map(|arg| match arg.as_string() {
            Some(s) => s.to_string().unwrap_or_default(),
            None => js_to_value(arg, 0, CONSOLE_DEPTH)
                .map(|value| display_value(&value))
                .unwrap_or_else(|_| "[object]".to_string()),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Invalid => "undefined".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::String(s) => s.clone(),
        Value::Vector3(v) => format!("({}, {}, {})", v.x, v.y, v.z),
        Value::Array(items) => format!(
            "[{}]",
            items.iter().map(display_value).collect::<Vec<_>>().join(", ")
        ),
        Value::Table(table) => format!(
            "{{{}}}",
            table
                .iter()
                .map(|(k, v)| format!("{}: {}", display_value(k), display_value(v)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}
