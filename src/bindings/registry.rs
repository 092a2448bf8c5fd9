//! Function Registry
//!
//! Name-keyed tables of native entry points reachable from scripts, plus the
//! instance table that ties native objects to script-side handles.
//!
//! ```text
//! functions:  "getPlayerName"  -> NativeBinding { arity, signature, entry }
//! classes:    "Vehicle"        -> ClassRecord { base: None, constructor, methods }
//!             "Bike"           -> ClassRecord { base: Some("Vehicle"), .. }
//! instances:  InstanceHandle(3) -> InstanceSlot { class: "Bike", payload }
//! ```
//!
//! Method lookup checks the instance's class, then its declared base, and
//! stops there. A bound payload is dropped only by [`FunctionRegistry::collect`],
//! which the script side calls when it finalizes the handle.

use super::marshal::Marshaller;
use super::signature::{Arity, TypeSignature};
use super::value::Value;
use crate::core::error::{CallRejected, RegistryError};
use std::any::Any;
use std::cell::{RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Uniform native entry point for free functions.
pub type NativeFunction = Rc<dyn Fn(&mut Marshaller<'_>) -> Value>;

/// Method entry; `None` means the payload was not the expected native type.
type MethodEntry = Rc<dyn Fn(&mut (dyn Any + 'static), &mut Marshaller<'_>) -> Option<Value>>;

type Constructor = Rc<dyn Fn(&mut Marshaller<'_>) -> Option<Box<dyn Any>>>;

type Payload = Rc<RefCell<Box<dyn Any>>>;

/// Script-side handle of a bound native instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceHandle(u64);

impl InstanceHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<InstanceHandle> for Value {
    fn from(handle: InstanceHandle) -> Self {
        Value::Int(handle.0 as i64)
    }
}

/// An exposed native callable with its call-time checks.
pub struct NativeBinding<E> {
    name: String,
    arity: Arity,
    signature: TypeSignature,
    entry: E,
}

impl<E> NativeBinding<E> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> Arity {
        self.arity
    }

    pub fn signature(&self) -> &TypeSignature {
        &self.signature
    }

    fn validate(&self, args: &[Value]) -> Result<(), CallRejected> {
        self.arity.check(args.len())?;
        self.signature.check(args)
    }
}

pub type FunctionBinding = NativeBinding<NativeFunction>;

impl FunctionBinding {
    /// Validates then runs the entry point. Holds no registry borrow, so the
    /// entry may call back into scripts.
    pub fn invoke(&self, args: &[Value]) -> Result<Value, CallRejected> {
        self.validate(args)?;
        let mut marshaller = Marshaller::new(args);
        Ok((self.entry)(&mut marshaller))
    }
}

type MethodBinding = NativeBinding<MethodEntry>;

/// A method resolved against one live instance.
pub struct BoundMethod {
    handle: InstanceHandle,
    class: String,
    binding: Rc<MethodBinding>,
    payload: Payload,
}

impl BoundMethod {
    pub fn handle(&self) -> InstanceHandle {
        self.handle
    }

    pub fn signature(&self) -> &TypeSignature {
        self.binding.signature()
    }

    pub fn invoke(&self, args: &[Value]) -> Result<Value, CallRejected> {
        self.binding.validate(args)?;
        let mut payload = self
            .payload
            .try_borrow_mut()
            .map_err(|_| CallRejected::InstanceBusy(self.handle.raw()))?;
        let mut marshaller = Marshaller::new(args);
        (self.binding.entry)(&mut **payload, &mut marshaller).ok_or_else(|| {
            CallRejected::InstanceTypeMismatch {
                class: self.class.clone(),
                method: self.binding.name.clone(),
            }
        })
    }
}

struct ClassRecord {
    base: Option<String>,
    constructor: Constructor,
    methods: HashMap<String, Rc<MethodBinding>>,
}

struct InstanceSlot {
    class: String,
    payload: Payload,
}

/// Registry of exposed functions, classes and bound instances.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Rc<FunctionBinding>>,
    classes: HashMap<String, ClassRecord>,
    instances: HashMap<InstanceHandle, InstanceSlot>,
    next_handle: u64,
    released: u64,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Installs `entry` under `name`, replacing any previous function.
    pub fn register_function<F>(
        &mut self,
        name: impl Into<String>,
        arity: Arity,
        signature: TypeSignature,
        entry: F,
    ) where
        F: Fn(&mut Marshaller<'_>) -> Value + 'static,
    {
        let name = name.into();
        let binding = NativeBinding {
            name: name.clone(),
            arity,
            signature,
            entry: Rc::new(entry) as NativeFunction,
        };
        if self.functions.insert(name.clone(), Rc::new(binding)).is_some() {
            tracing::debug!(target: "bindings", function = %name, "function re-registered");
        }
    }

    /// Registers a class whose constructor builds a `T`.
    ///
    /// With a `base`, the base must already be registered; otherwise nothing is
    /// installed. Re-registering a class replaces its constructor and base but
    /// keeps the methods already registered on it.
    pub fn register_class<T, F>(
        &mut self,
        name: impl Into<String>,
        base: Option<&str>,
        constructor: F,
    ) -> Result<(), RegistryError>
    where
        T: 'static,
        F: Fn(&mut Marshaller<'_>) -> Option<T> + 'static,
    {
        let name = name.into();
        if let Some(base) = base {
            if !self.classes.contains_key(base) {
                tracing::warn!(target: "bindings", class = %name, base, "base class not registered");
                return Err(RegistryError::UnknownBaseClass {
                    class: name,
                    base: base.to_string(),
                });
            }
        }

        let constructor: Constructor = Rc::new(move |m: &mut Marshaller<'_>| {
            constructor(m).map(|native| Box::new(native) as Box<dyn Any>)
        });
        let methods = match self.classes.remove(&name) {
            Some(previous) => {
                tracing::warn!(
                    target: "bindings",
                    class = %name,
                    methods = previous.methods.len(),
                    "class re-registered, keeping its methods"
                );
                previous.methods
            }
            None => HashMap::new(),
        };
        self.classes.insert(
            name,
            ClassRecord {
                base: base.map(str::to_string),
                constructor,
                methods,
            },
        );
        Ok(())
    }

    /// Adds `class_name.method_name`; the entry receives the instance's `T`.
    pub fn register_method<T, F>(
        &mut self,
        class_name: &str,
        method_name: impl Into<String>,
        arity: Arity,
        signature: TypeSignature,
        entry: F,
    ) -> Result<(), RegistryError>
    where
        T: 'static,
        F: Fn(&mut T, &mut Marshaller<'_>) -> Value + 'static,
    {
        let record = self
            .classes
            .get_mut(class_name)
            .ok_or_else(|| RegistryError::UnknownClass(class_name.to_string()))?;

        let method_name = method_name.into();
        let entry: MethodEntry = Rc::new(move |payload: &mut (dyn Any + 'static), m: &mut Marshaller<'_>| {
            payload.downcast_mut::<T>().map(|native| entry(native, m))
        });
        record.methods.insert(
            method_name.clone(),
            Rc::new(NativeBinding {
                name: method_name,
                arity,
                signature,
                entry,
            }),
        );
        Ok(())
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn has_class(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn class_base(&self, name: &str) -> Option<&str> {
        self.classes.get(name).and_then(|c| c.base.as_deref())
    }

    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    /// Methods callable on `class`: its own plus those of its direct base.
    pub fn method_names(&self, class: &str) -> Vec<String> {
        let Some(record) = self.classes.get(class) else {
            return Vec::new();
        };
        let mut names: Vec<String> = record.methods.keys().cloned().collect();
        if let Some(base) = record.base.as_deref().and_then(|b| self.classes.get(b)) {
            for name in base.methods.keys() {
                if !record.methods.contains_key(name) {
                    names.push(name.clone());
                }
            }
        }
        names.sort();
        names
    }

    pub fn resolve_function(&self, name: &str) -> Option<Rc<FunctionBinding>> {
        self.functions.get(name).cloned()
    }

    fn resolve_method(&self, class: &str, method: &str) -> Option<Rc<MethodBinding>> {
        let record = self.classes.get(class)?;
        if let Some(binding) = record.methods.get(method) {
            return Some(Rc::clone(binding));
        }
        let base = self.classes.get(record.base.as_deref()?)?;
        base.methods.get(method).cloned()
    }

    /// Resolves `method` on the instance behind `handle` without invoking it.
    pub fn prepare_method(
        &self,
        handle: InstanceHandle,
        method: &str,
    ) -> Result<BoundMethod, CallRejected> {
        let slot = self
            .instances
            .get(&handle)
            .ok_or(CallRejected::InvalidInstance(handle.raw()))?;
        let binding =
            self.resolve_method(&slot.class, method)
                .ok_or_else(|| CallRejected::UnknownMethod {
                    class: slot.class.clone(),
                    method: method.to_string(),
                })?;
        Ok(BoundMethod {
            handle,
            class: slot.class.clone(),
            binding,
            payload: Rc::clone(&slot.payload),
        })
    }

    // ========================================================================
    // Invocation
    // ========================================================================

    pub fn call_function(&self, name: &str, args: &[Value]) -> Result<Value, CallRejected> {
        let binding = self
            .resolve_function(name)
            .ok_or_else(|| CallRejected::UnknownFunction(name.to_string()))?;
        binding.invoke(args).map_err(|rejected| {
            tracing::warn!(target: "bindings", function = name, %rejected, "call rejected");
            rejected
        })
    }

    pub fn call_method(
        &self,
        handle: InstanceHandle,
        method: &str,
        args: &[Value],
    ) -> Result<Value, CallRejected> {
        self.prepare_method(handle, method)?
            .invoke(args)
            .map_err(|rejected| {
                tracing::warn!(target: "bindings", %handle, method, %rejected, "method call rejected");
                rejected
            })
    }

    /// Runs the class constructor and binds whatever it builds.
    pub fn construct(&mut self, class: &str, args: &[Value]) -> Result<InstanceHandle, CallRejected> {
        let constructor = self
            .classes
            .get(class)
            .map(|record| Rc::clone(&record.constructor))
            .ok_or_else(|| CallRejected::UnknownClass(class.to_string()))?;

        let mut marshaller = Marshaller::new(args);
        let native =
            constructor(&mut marshaller).ok_or_else(|| CallRejected::ConstructorDeclined(class.to_string()))?;
        Ok(self.bind_boxed(class, native))
    }

    // ========================================================================
    // Instances
    // ========================================================================

    /// Hands `native` over to the script side. From here on it is destroyed
    /// only by `collect`.
    pub fn bind_instance<T: 'static>(
        &mut self,
        class: &str,
        native: T,
    ) -> Result<InstanceHandle, RegistryError> {
        if !self.classes.contains_key(class) {
            return Err(RegistryError::UnknownClass(class.to_string()));
        }
        Ok(self.bind_boxed(class, Box::new(native)))
    }

    fn bind_boxed(&mut self, class: &str, native: Box<dyn Any>) -> InstanceHandle {
        self.next_handle += 1;
        let handle = InstanceHandle(self.next_handle);
        self.instances.insert(
            handle,
            InstanceSlot {
                class: class.to_string(),
                payload: Rc::new(RefCell::new(native)),
            },
        );
        tracing::trace!(target: "bindings", %handle, class, "instance bound");
        handle
    }

    /// Borrows the payload when the handle is bound to `class` (or to a class
    /// whose direct base is `class`) and holds a `T`.
    pub fn get_instance<T: 'static>(&self, handle: InstanceHandle, class: &str) -> Option<RefMut<'_, T>> {
        let slot = self.instances.get(&handle)?;
        let matches = slot.class == class || self.class_base(&slot.class) == Some(class);
        if !matches {
            return None;
        }
        let payload = slot.payload.try_borrow_mut().ok()?;
        RefMut::filter_map(payload, |native| native.downcast_mut::<T>()).ok()
    }

    pub fn instance_class(&self, handle: InstanceHandle) -> Option<&str> {
        self.instances.get(&handle).map(|slot| slot.class.as_str())
    }

    pub fn live_instances(&self) -> usize {
        self.instances.len()
    }

    /// Total release events fired so far.
    pub fn released(&self) -> u64 {
        self.released
    }

    /// Release hook: the script side finalized `handle`. Returns `false` when
    /// the handle was already released or never bound.
    pub fn collect(&mut self, handle: InstanceHandle) -> bool {
        match self.instances.remove(&handle) {
            Some(slot) => {
                self.released += 1;
                tracing::trace!(target: "bindings", %handle, class = %slot.class, "instance released");
                true
            }
            None => false,
        }
    }

    /// Releases every live instance, e.g. when the script runtime shuts down.
    pub fn collect_all(&mut self) -> usize {
        let handles: Vec<InstanceHandle> = self.instances.keys().copied().collect();
        handles.into_iter().filter(|h| self.collect(*h)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Vehicle {
        speed: i64,
        drops: Rc<Cell<u32>>,
    }

    impl Drop for Vehicle {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    fn sig(mask: &str) -> TypeSignature {
        TypeSignature::parse(mask).unwrap()
    }

    #[test]
    fn test_register_and_call_function() {
        let mut registry = FunctionRegistry::new();
        registry.register_function("add", Arity::Fixed(2), sig("ii"), |m| {
            let a = m.pop::<i64>();
            let b = m.pop::<i64>();
            Value::Int(a + b)
        });

        let result = registry.call_function("add", &[Value::Int(2), Value::Int(3)]);
        assert_eq!(result, Ok(Value::Int(5)));
    }

    #[test]
    fn test_reregistration_replaces_entry() {
        let mut registry = FunctionRegistry::new();
        registry.register_function("version", Arity::Variadic, TypeSignature::any(), |_| Value::Int(1));
        registry.register_function("version", Arity::Variadic, TypeSignature::any(), |_| Value::Int(2));
        assert_eq!(registry.call_function("version", &[]), Ok(Value::Int(2)));
    }

    #[test]
    fn test_rejections_happen_before_entry_runs() {
        let ran = Rc::new(Cell::new(false));
        let mut registry = FunctionRegistry::new();
        let flag = Rc::clone(&ran);
        registry.register_function("setName", Arity::Fixed(1), sig("s"), move |_| {
            flag.set(true);
            Value::Invalid
        });

        let arity = registry.call_function("setName", &[]);
        assert!(matches!(arity, Err(CallRejected::ArityMismatch { got: 0, .. })));

        let typed = registry.call_function("setName", &[Value::Int(1)]);
        assert!(matches!(typed, Err(CallRejected::SignatureMismatch { position: 0, .. })));

        let unknown = registry.call_function("nope", &[]);
        assert_eq!(unknown, Err(CallRejected::UnknownFunction("nope".to_string())));
        assert!(!ran.get());
    }

    #[test]
    fn test_class_registration_is_atomic() {
        let mut registry = FunctionRegistry::new();
        let err = registry.register_class("B", Some("A"), |_| Some(0u8));
        assert!(matches!(err, Err(RegistryError::UnknownBaseClass { .. })));
        assert!(!registry.has_class("B"));
        assert_eq!(registry.class_names().count(), 0);

        assert!(registry.register_class("A", None, |_| Some(0u8)).is_ok());
        assert!(registry.register_class("B", Some("A"), |_| Some(0u8)).is_ok());
        assert_eq!(registry.class_base("B"), Some("A"));
    }

    #[test]
    fn test_method_requires_class() {
        let mut registry = FunctionRegistry::new();
        let err = registry.register_method::<u8, _>("Ghost", "boo", Arity::Variadic, TypeSignature::any(), |_, _| {
            Value::Invalid
        });
        assert_eq!(err, Err(RegistryError::UnknownClass("Ghost".to_string())));
    }

    #[test]
    fn test_method_lookup_uses_one_base_level() {
        let mut registry = FunctionRegistry::new();
        registry.register_class("A", None, |_| Some(1i64)).unwrap();
        registry.register_class("B", Some("A"), |_| Some(2i64)).unwrap();
        registry.register_class("C", Some("B"), |_| Some(3i64)).unwrap();
        registry
            .register_method::<i64, _>("A", "who", Arity::Fixed(0), TypeSignature::any(), |v, _| Value::Int(*v))
            .unwrap();

        let b = registry.construct("B", &[]).unwrap();
        let c = registry.construct("C", &[]).unwrap();

        assert_eq!(registry.call_method(b, "who", &[]), Ok(Value::Int(2)));
        assert!(matches!(
            registry.call_method(c, "who", &[]),
            Err(CallRejected::UnknownMethod { .. })
        ));
        assert_eq!(registry.method_names("B"), vec!["who".to_string()]);
        assert!(registry.method_names("C").is_empty());
    }

    #[test]
    fn test_bound_instance_released_exactly_once() {
        let drops = Rc::new(Cell::new(0));
        let mut registry = FunctionRegistry::new();
        registry.register_class("Vehicle", None, |_| None::<Vehicle>).unwrap();

        let handle = registry
            .bind_instance(
                "Vehicle",
                Vehicle {
                    speed: 10,
                    drops: Rc::clone(&drops),
                },
            )
            .unwrap();
        assert_eq!(drops.get(), 0);

        assert!(registry.collect(handle));
        assert_eq!(drops.get(), 1);
        assert!(!registry.collect(handle));
        assert_eq!(drops.get(), 1);
        assert_eq!(registry.released(), 1);
    }

    #[test]
    fn test_get_instance_checks_class() {
        let drops = Rc::new(Cell::new(0));
        let mut registry = FunctionRegistry::new();
        registry.register_class("Vehicle", None, |_| None::<Vehicle>).unwrap();
        registry.register_class("Car", Some("Vehicle"), |_| None::<Vehicle>).unwrap();
        registry.register_class("Blip", None, |_| Some(0u8)).unwrap();

        let car = registry
            .bind_instance("Car", Vehicle { speed: 30, drops: Rc::clone(&drops) })
            .unwrap();

        assert_eq!(registry.get_instance::<Vehicle>(car, "Car").map(|v| v.speed), Some(30));
        assert!(registry.get_instance::<Vehicle>(car, "Vehicle").is_some());
        assert!(registry.get_instance::<Vehicle>(car, "Blip").is_none());
        assert!(registry.get_instance::<u8>(car, "Car").is_none());
        assert!(registry
            .get_instance::<Vehicle>(InstanceHandle::from_raw(999), "Car")
            .is_none());
    }

    #[test]
    fn test_class_reregistration_keeps_methods() {
        let mut registry = FunctionRegistry::new();
        registry.register_class("Vehicle", None, |_| None::<Vehicle>).unwrap();
        registry
            .register_method::<Vehicle, _>("Vehicle", "speed", Arity::Fixed(0), sig(""), |v, _| {
                Value::Int(v.speed)
            })
            .unwrap();

        let drops = Rc::new(Cell::new(0));
        let made = Rc::clone(&drops);
        registry
            .register_class("Vehicle", None, move |_| {
                Some(Vehicle { speed: 9, drops: Rc::clone(&made) })
            })
            .unwrap();

        assert_eq!(registry.method_names("Vehicle"), vec!["speed".to_string()]);
        let handle = registry.construct("Vehicle", &[]).unwrap();
        assert_eq!(registry.call_method(handle, "speed", &[]), Ok(Value::Int(9)));
    }

    #[test]
    fn test_method_mutates_payload() {
        let drops = Rc::new(Cell::new(0));
        let mut registry = FunctionRegistry::new();
        registry.register_class("Vehicle", None, |_| None::<Vehicle>).unwrap();
        registry
            .register_method::<Vehicle, _>("Vehicle", "accelerate", Arity::Fixed(1), sig("i"), |v, m| {
                v.speed += m.pop::<i64>();
                Value::Int(v.speed)
            })
            .unwrap();

        let handle = registry
            .bind_instance("Vehicle", Vehicle { speed: 5, drops: Rc::clone(&drops) })
            .unwrap();
        assert_eq!(registry.call_method(handle, "accelerate", &[Value::Int(3)]), Ok(Value::Int(8)));

        registry.collect(handle);
        assert_eq!(
            registry.call_method(handle, "accelerate", &[Value::Int(1)]),
            Err(CallRejected::InvalidInstance(handle.raw()))
        );
    }

    #[test]
    fn test_constructor_declined() {
        let mut registry = FunctionRegistry::new();
        registry
            .register_class("Checkpoint", None, |m| {
                let radius = m.pop::<f64>();
                (radius > 0.0).then_some(radius)
            })
            .unwrap();

        assert!(registry.construct("Checkpoint", &[Value::Float(2.0)]).is_ok());
        assert_eq!(
            registry.construct("Checkpoint", &[Value::Float(-1.0)]),
            Err(CallRejected::ConstructorDeclined("Checkpoint".to_string()))
        );
        assert_eq!(registry.live_instances(), 1);
        assert_eq!(registry.collect_all(), 1);
        assert_eq!(registry.live_instances(), 0);
    }
}
