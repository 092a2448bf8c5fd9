//! Call signatures
//!
//! Arity and positional type masks checked before a native entry point runs.
//!
//! Mask syntax, one slot per position, alternatives joined with `|`:
//!
//! | char | accepts            |
//! |------|--------------------|
//! | `b`  | bool               |
//! | `i`  | int                |
//! | `f`  | float              |
//! | `n`  | int or float       |
//! | `s`  | string             |
//! | `v`  | vector3            |
//! | `t`  | table              |
//! | `a`  | array              |
//! | `o`  | null / absent      |
//! | `.`  | anything           |
//!
//! `"s|o"` is one slot accepting a string or null; `"sif"` is three slots.

use super::value::{Value, ValueKind};
use crate::core::error::{CallRejected, RegistryError};
use std::fmt;

/// Expected argument count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Arity {
    /// Exactly `n` argument slots.
    Fixed(usize),
    /// `n` or more slots.
    AtLeast(usize),
    /// No count check.
    #[default]
    Variadic,
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Fixed(n) => count == n,
            Arity::AtLeast(n) => count >= n,
            Arity::Variadic => true,
        }
    }

    pub fn check(self, count: usize) -> Result<(), CallRejected> {
        if self.accepts(count) {
            Ok(())
        } else {
            Err(CallRejected::ArityMismatch {
                expected: self,
                got: count,
            })
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Fixed(n) => write!(f, "{}", n),
            Arity::AtLeast(n) => write!(f, "at least {}", n),
            Arity::Variadic => f.write_str("any"),
        }
    }
}

const BOOL: u8 = 1 << 0;
const INT: u8 = 1 << 1;
const FLOAT: u8 = 1 << 2;
const STRING: u8 = 1 << 3;
const VECTOR3: u8 = 1 << 4;
const TABLE: u8 = 1 << 5;
const ARRAY: u8 = 1 << 6;
const NULL: u8 = 1 << 7;
const ANY: u8 = u8::MAX;

fn kind_bit(kind: ValueKind) -> u8 {
    match kind {
        ValueKind::Invalid => NULL,
        ValueKind::Bool => BOOL,
        ValueKind::Int => INT,
        ValueKind::Float => FLOAT,
        ValueKind::String => STRING,
        ValueKind::Vector3 => VECTOR3,
        ValueKind::Table => TABLE,
        ValueKind::Array => ARRAY,
    }
}

/// One accepted-kinds mask per argument position.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeSignature {
    slots: Vec<u8>,
    source: String,
}

impl TypeSignature {
    /// Signature that checks nothing.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn parse(mask: &str) -> Result<Self, RegistryError> {
        let mut slots = Vec::new();
        let mut current = 0u8;
        let mut pending_alternative = false;

        for c in mask.chars() {
            let bit = match c {
                'b' => BOOL,
                'i' => INT,
                'f' => FLOAT,
                'n' => INT | FLOAT,
                's' => STRING,
                'v' => VECTOR3,
                't' => TABLE,
                'a' => ARRAY,
                'o' => NULL,
                '.' => ANY,
                '|' if current != 0 && !pending_alternative => {
                    pending_alternative = true;
                    continue;
                }
                ' ' => continue,
                other => {
                    return Err(RegistryError::InvalidSignature {
                        mask: mask.to_string(),
                        found: other,
                    })
                }
            };

            if pending_alternative {
                current |= bit;
                pending_alternative = false;
            } else {
                if current != 0 {
                    slots.push(current);
                }
                current = bit;
            }
        }

        if pending_alternative {
            return Err(RegistryError::InvalidSignature {
                mask: mask.to_string(),
                found: '|',
            });
        }
        if current != 0 {
            slots.push(current);
        }

        Ok(Self {
            slots,
            source: mask.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Checks each supplied argument against its slot. Positions past the
    /// mask, and masked positions with no argument, are not checked here.
    pub fn check(&self, args: &[Value]) -> Result<(), CallRejected> {
        for (position, (mask, arg)) in self.slots.iter().zip(args).enumerate() {
            if mask & kind_bit(arg.kind()) == 0 {
                return Err(CallRejected::SignatureMismatch {
                    position,
                    expected: self.describe_slot(*mask),
                    found: arg.kind(),
                });
            }
        }
        Ok(())
    }

    /// Turns `Int` arguments sitting in float-only slots into `Float`.
    ///
    /// For engines with a single number type, where an integral number cannot
    /// be told apart from a float.
    pub fn widen_ints(&self, args: &mut [Value]) {
        for (mask, arg) in self.slots.iter().zip(args.iter_mut()) {
            if let Value::Int(i) = *arg {
                if mask & FLOAT != 0 && mask & INT == 0 {
                    *arg = Value::Float(i as f64);
                }
            }
        }
    }

    fn describe_slot(&self, mask: u8) -> String {
        if mask == ANY {
            return "any".to_string();
        }
        [
            (BOOL, "bool"),
            (INT, "int"),
            (FLOAT, "float"),
            (STRING, "string"),
            (VECTOR3, "vector3"),
            (TABLE, "table"),
            (ARRAY, "array"),
            (NULL, "null"),
        ]
        .iter()
        .filter(|(bit, _)| mask & bit != 0)
        .map(|(_, name)| *name)
        .collect::<Vec<_>>()
        .join("|")
    }
}

impl fmt::Display for TypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arity() {
        assert!(Arity::Fixed(2).accepts(2));
        assert!(!Arity::Fixed(2).accepts(3));
        assert!(Arity::AtLeast(1).accepts(4));
        assert!(!Arity::AtLeast(1).accepts(0));
        assert!(Arity::Variadic.accepts(0));
    }

    #[test]
    fn test_parse_slots_and_alternatives() {
        let sig = TypeSignature::parse("s|o i n").unwrap();
        assert_eq!(sig.len(), 3);

        assert!(sig
            .check(&[Value::Invalid, Value::Int(1), Value::Float(1.0)])
            .is_ok());
        assert!(sig
            .check(&[Value::from("x"), Value::Int(1), Value::Int(2)])
            .is_ok());
    }

    #[test]
    fn test_check_reports_first_bad_position() {
        let sig = TypeSignature::parse("if").unwrap();
        let err = sig.check(&[Value::Int(1), Value::from("no")]).unwrap_err();
        match err {
            CallRejected::SignatureMismatch {
                position, found, ..
            } => {
                assert_eq!(position, 1);
                assert_eq!(found, ValueKind::String);
            }
            other => panic!("unexpected rejection: {:?}", other),
        }
    }

    #[test]
    fn test_short_argument_list_is_not_a_signature_error() {
        let sig = TypeSignature::parse("iii").unwrap();
        assert!(sig.check(&[Value::Int(1)]).is_ok());
    }

    #[test]
    fn test_widen_ints_only_touches_float_only_slots() {
        let sig = TypeSignature::parse("f n i .").unwrap();
        let mut args = vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4), Value::Int(5)];
        sig.widen_ints(&mut args);
        assert_eq!(
            args,
            vec![Value::Float(1.0), Value::Int(2), Value::Int(3), Value::Int(4), Value::Int(5)]
        );
    }

    #[test]
    fn test_parse_rejects_unknown_chars() {
        assert!(TypeSignature::parse("ix").is_err());
        assert!(TypeSignature::parse("i|").is_err());
        assert!(TypeSignature::parse("|i").is_err());
        assert!(TypeSignature::any().is_empty());
    }
}
