//! Argument Marshaller
//!
//! Reads a call's positional arguments through a forward-only cursor and
//! collects outgoing values. Reads never fail: a slot of the wrong kind yields
//! the requested type's zero value, and an absent/null slot yields the caller's
//! default when one was given. Float reads accept an `Int` slot, widened.
//!
//! ```text
//!  args:    [ Int(7) | String("a") | Invalid |   (end)   ]
//!  cursor:      ^ pop::<i64>() -> 7
//!                        ^ pop::<i64>() -> 0        (mismatch, zeroed)
//!                                     ^ pop_or(5) -> 5 (absent, defaulted)
//!                                                 ^ pop_or(9) -> 9 (past end)
//! ```

use super::registry::InstanceHandle;
use super::value::{Table, Value, ValueKind, Vector3};

/// Outcome of a single read, reported without ever unwinding.
#[derive(Debug, Clone, PartialEq)]
pub enum Coerced<T> {
    /// The slot held the requested kind.
    Exact(T),
    /// The slot was absent/null and the caller's default was used.
    Defaulted(T),
    /// The slot held another kind (or was absent with no default); zero value used.
    Zeroed(T),
}

impl<T> Coerced<T> {
    pub fn into_inner(self) -> T {
        match self {
            Coerced::Exact(v) | Coerced::Defaulted(v) | Coerced::Zeroed(v) => v,
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, Coerced::Exact(_))
    }
}

/// A native type that can be read from a single argument slot.
pub trait ArgType: Sized {
    const KIND: ValueKind;

    /// Exact-kind extraction; `None` on any other variant.
    fn from_value(value: &Value) -> Option<Self>;

    fn zero() -> Self;
}

impl ArgType for bool {
    const KIND: ValueKind = ValueKind::Bool;

    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }

    fn zero() -> Self {
        false
    }
}

impl ArgType for i64 {
    const KIND: ValueKind = ValueKind::Int;

    fn from_value(value: &Value) -> Option<Self> {
        value.as_int()
    }

    fn zero() -> Self {
        0
    }
}

impl ArgType for i32 {
    const KIND: ValueKind = ValueKind::Int;

    /// Out-of-range integers count as a mismatch.
    fn from_value(value: &Value) -> Option<Self> {
        value.as_int().and_then(|i| i32::try_from(i).ok())
    }

    fn zero() -> Self {
        0
    }
}

impl ArgType for f64 {
    const KIND: ValueKind = ValueKind::Float;

    fn from_value(value: &Value) -> Option<Self> {
        match *value {
            Value::Float(f) => Some(f),
            Value::Int(i) => Some(i as f64),
            _ => None,
        }
    }

    fn zero() -> Self {
        0.0
    }
}

impl ArgType for f32 {
    const KIND: ValueKind = ValueKind::Float;

    fn from_value(value: &Value) -> Option<Self> {
        f64::from_value(value).map(|f| f as f32)
    }

    fn zero() -> Self {
        0.0
    }
}

impl ArgType for String {
    const KIND: ValueKind = ValueKind::String;

    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_owned)
    }

    fn zero() -> Self {
        String::new()
    }
}

impl ArgType for Table {
    const KIND: ValueKind = ValueKind::Table;

    fn from_value(value: &Value) -> Option<Self> {
        value.as_table().cloned()
    }

    fn zero() -> Self {
        Table::new()
    }
}

impl ArgType for Vec<Value> {
    const KIND: ValueKind = ValueKind::Array;

    fn from_value(value: &Value) -> Option<Self> {
        value.as_array().map(<[Value]>::to_vec)
    }

    fn zero() -> Self {
        Vec::new()
    }
}

/// Any present value. Only the absent/null slot misses.
impl ArgType for Value {
    const KIND: ValueKind = ValueKind::Invalid;

    fn from_value(value: &Value) -> Option<Self> {
        if value.is_invalid() {
            None
        } else {
            Some(value.clone())
        }
    }

    fn zero() -> Self {
        Value::Invalid
    }
}

/// Per-call cursor over incoming arguments plus an outgoing value stream.
#[derive(Debug)]
pub struct Marshaller<'a> {
    args: &'a [Value],
    cursor: usize,
    outgoing: Vec<Value>,
    mismatches: usize,
}

impl<'a> Marshaller<'a> {
    pub fn new(args: &'a [Value]) -> Self {
        Self {
            args,
            cursor: 0,
            outgoing: Vec::new(),
            mismatches: 0,
        }
    }

    /// Marshaller with no incoming arguments, used to build outgoing calls.
    pub fn outgoing() -> Marshaller<'static> {
        Marshaller::new(&[])
    }

    pub fn args(&self) -> &'a [Value] {
        self.args
    }

    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn remaining(&self) -> usize {
        self.args.len().saturating_sub(self.cursor)
    }

    /// Number of reads that fell back to a zero value so far.
    pub fn mismatches(&self) -> usize {
        self.mismatches
    }

    fn next_slot(&mut self) -> Option<&'a Value> {
        let args = self.args;
        let slot = args.get(self.cursor);
        self.cursor = self.cursor.saturating_add(1);
        slot
    }

    fn note_mismatch<T: ArgType>(&mut self, slot: Option<&Value>) {
        self.mismatches += 1;
        tracing::debug!(
            target: "bindings",
            position = self.cursor.saturating_sub(1),
            expected = %T::KIND,
            found = %slot.map(super::value::Value::kind).unwrap_or(ValueKind::Invalid),
            "argument type mismatch, using zero value"
        );
    }

    pub fn try_pop<T: ArgType>(&mut self) -> Coerced<T> {
        let slot = self.next_slot();
        match slot.and_then(T::from_value) {
            Some(v) => Coerced::Exact(v),
            None => {
                self.note_mismatch::<T>(slot);
                Coerced::Zeroed(T::zero())
            }
        }
    }

    pub fn try_pop_or<T: ArgType>(&mut self, default: T) -> Coerced<T> {
        let slot = self.next_slot();
        if let Some(v) = slot.and_then(T::from_value) {
            return Coerced::Exact(v);
        }
        if slot.map_or(true, Value::is_invalid) {
            return Coerced::Defaulted(default);
        }
        self.note_mismatch::<T>(slot);
        Coerced::Zeroed(T::zero())
    }

    pub fn pop<T: ArgType>(&mut self) -> T {
        self.try_pop().into_inner()
    }

    pub fn pop_or<T: ArgType>(&mut self, default: T) -> T {
        self.try_pop_or(default).into_inner()
    }

    /// Three float reads, x then y then z, each defaulted on its own.
    pub fn pop_vector3(&mut self) -> Vector3 {
        let x = self.pop::<f64>();
        let y = self.pop::<f64>();
        let z = self.pop::<f64>();
        Vector3::new(x, y, z)
    }

    pub fn pop_vector3_or(&mut self, default: Vector3) -> Vector3 {
        let x = self.pop_or(default.x);
        let y = self.pop_or(default.y);
        let z = self.pop_or(default.z);
        Vector3::new(x, y, z)
    }

    /// Raw slot contents; `Invalid` past the end.
    pub fn pop_value(&mut self) -> Value {
        self.next_slot().cloned().unwrap_or_default()
    }

    /// Instance handles travel as non-negative ints.
    pub fn pop_instance(&mut self) -> Option<InstanceHandle> {
        match self.try_pop::<i64>() {
            Coerced::Exact(raw) if raw >= 0 => Some(InstanceHandle::from_raw(raw as u64)),
            _ => None,
        }
    }

    pub fn skip(&mut self, count: usize) {
        self.cursor = self.cursor.saturating_add(count);
    }

    /// Appends to the outgoing stream. A top-level Vector3 goes out as three floats.
    pub fn push(&mut self, value: impl Into<Value>) {
        match value.into() {
            Value::Vector3(v) => self.push_vector3(v),
            other => self.outgoing.push(other),
        }
    }

    pub fn push_vector3(&mut self, v: Vector3) {
        self.outgoing.push(Value::Float(v.x));
        self.outgoing.push(Value::Float(v.y));
        self.outgoing.push(Value::Float(v.z));
    }

    /// Re-emits the elements in stored order as one array slot.
    pub fn push_array(&mut self, items: &[Value]) {
        let rebuilt = items.iter().map(Self::rebuild).collect();
        self.outgoing.push(Value::Array(rebuilt));
    }

    /// Re-emits the pairs in stored order as one table slot.
    pub fn push_table(&mut self, table: &Table) {
        let rebuilt = table
            .iter()
            .map(|(k, v)| (Self::rebuild(k), Self::rebuild(v)))
            .collect();
        self.outgoing.push(Value::Table(rebuilt));
    }

    fn rebuild(value: &Value) -> Value {
        match value {
            Value::Array(items) => Value::Array(items.iter().map(Self::rebuild).collect()),
            Value::Table(table) => Value::Table(
                table
                    .iter()
                    .map(|(k, v)| (Self::rebuild(k), Self::rebuild(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    pub fn pushed(&self) -> &[Value] {
        &self.outgoing
    }

    pub fn into_pushed(self) -> Vec<Value> {
        self.outgoing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip<T: ArgType>(value: Value) -> T {
        let mut out = Marshaller::outgoing();
        out.push(value);
        let pushed = out.into_pushed();
        Marshaller::new(&pushed).pop::<T>()
    }

    #[test]
    fn test_round_trip_identity_on_matching_kind() {
        assert!(round_trip::<bool>(Value::Bool(true)));
        assert_eq!(round_trip::<i64>(Value::Int(-42)), -42);
        assert_eq!(round_trip::<f64>(Value::Float(2.5)), 2.5);
        assert_eq!(round_trip::<String>(Value::from("abc")), "abc");
    }

    #[test]
    fn test_round_trip_zero_on_mismatch() {
        assert!(!round_trip::<bool>(Value::Int(1)));
        assert_eq!(round_trip::<i64>(Value::Float(3.0)), 0);
        assert_eq!(round_trip::<f64>(Value::from("3")), 0.0);
        assert_eq!(round_trip::<String>(Value::Bool(true)), "");
    }

    #[test]
    fn test_default_only_for_absent_slot() {
        let args = vec![Value::from("seven"), Value::Invalid];
        let mut m = Marshaller::new(&args);

        assert_eq!(m.pop_or(7i64), 0);
        assert_eq!(m.pop_or(7i64), 7);
        // past the end counts as absent
        assert_eq!(m.pop_or(7i64), 7);
        assert_eq!(m.mismatches(), 1);
    }

    #[test]
    fn test_cursor_advances_on_mismatch() {
        let args = vec![Value::from("x"), Value::Int(9)];
        let mut m = Marshaller::new(&args);

        assert_eq!(m.try_pop::<i64>(), Coerced::Zeroed(0));
        assert_eq!(m.position(), 1);
        assert_eq!(m.try_pop::<i64>(), Coerced::Exact(9));
        assert_eq!(m.remaining(), 0);
    }

    #[test]
    fn test_vector3_is_three_independent_float_reads() {
        let args = vec![Value::Float(1.0), Value::from("bad"), Value::Invalid];
        let mut m = Marshaller::new(&args);
        let v = m.pop_vector3_or(Vector3::new(5.0, 6.0, 7.0));
        assert_eq!(v, Vector3::new(1.0, 0.0, 7.0));
    }

    #[test]
    fn test_vector3_push_then_pop() {
        let mut out = Marshaller::outgoing();
        out.push(Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(out.pushed().len(), 3);

        let pushed = out.into_pushed();
        let mut m = Marshaller::new(&pushed);
        assert_eq!(m.pop_vector3(), Vector3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_push_containers_preserve_order() {
        let mut table = Table::new();
        table.insert("b", 2i64);
        table.insert("a", 1i64);
        table.insert("b", 3i64);
        let items = vec![Value::Int(3), Value::Table(table.clone()), Value::Int(1)];

        let mut out = Marshaller::outgoing();
        out.push_array(&items);
        out.push_table(&table);
        let pushed = out.into_pushed();

        assert_eq!(pushed[0], Value::Array(items));
        assert_eq!(pushed[1], Value::Table(table));
    }

    #[test]
    fn test_pop_instance() {
        let args = vec![Value::Int(4), Value::Int(-1), Value::from("4")];
        let mut m = Marshaller::new(&args);
        assert_eq!(m.pop_instance(), Some(InstanceHandle::from_raw(4)));
        assert_eq!(m.pop_instance(), None);
        assert_eq!(m.pop_instance(), None);
    }

    #[test]
    fn test_float_reads_widen_ints() {
        let args = vec![Value::Int(3), Value::Int(-2), Value::Bool(true)];
        let mut m = Marshaller::new(&args);
        assert_eq!(m.try_pop::<f64>(), Coerced::Exact(3.0));
        assert_eq!(m.pop::<f32>(), -2.0);
        assert_eq!(m.pop::<f64>(), 0.0);
        assert_eq!(m.mismatches(), 1);

        let ints = vec![Value::Int(1), Value::Int(2), Value::Int(3)];
        assert_eq!(
            Marshaller::new(&ints).pop_vector3(),
            Vector3::new(1.0, 2.0, 3.0)
        );
    }

    #[test]
    fn test_skip_saturates() {
        let args = vec![Value::Int(1)];
        let mut m = Marshaller::new(&args);
        m.skip(usize::MAX);
        assert_eq!(m.remaining(), 0);
        assert_eq!(m.pop_or(5i64), 5);
        assert_eq!(m.position(), usize::MAX);
    }

    #[test]
    fn test_narrow_int_out_of_range_is_mismatch() {
        let args = vec![Value::Int(i64::from(i32::MAX) + 1)];
        let mut m = Marshaller::new(&args);
        assert_eq!(m.pop::<i32>(), 0);
    }
}
