//! Attribute values and declared-type coercion
//!
//! The wire carries every value as text; the model keeps them typed. A
//! field's declared type coerces incoming values to canonical form and
//! rejects anything its acceptance predicate refuses.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl Value {
    /// Render in wire form. Booleans use the capitalized SCP spelling.
    pub fn as_wire(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Int(i) => i.to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_wire())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Declared type of a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeTag {
    Str,
    Int,
    Bool,
    /// Closed set of allowed wire spellings
    Enum(Vec<String>),
    Ipv4,
    Ipv6,
    Mac,
    Wwpn,
}

impl TypeTag {
    /// Coerce a value to canonical form for this type.
    ///
    /// Accepts wire-form strings for every tag; address tags run their
    /// dedicated format validators instead of plain coercion.
    pub fn coerce(&self, name: &str, value: Value) -> Result<Value, ModelError> {
        let reject = |reason: String| ModelError::Validation {
            name: name.to_string(),
            reason,
        };
        match self {
            TypeTag::Str => Ok(Value::Str(value.as_wire())),
            TypeTag::Int => match value {
                Value::Int(i) => Ok(Value::Int(i)),
                Value::Str(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|_| reject(format!("'{}' is not an integer", s))),
                Value::Bool(_) => Err(reject("boolean given for integer field".to_string())),
            },
            TypeTag::Bool => match value {
                Value::Bool(b) => Ok(Value::Bool(b)),
                Value::Str(s) => match s.trim() {
                    "True" | "true" | "1" => Ok(Value::Bool(true)),
                    "False" | "false" | "0" => Ok(Value::Bool(false)),
                    other => Err(reject(format!("'{}' is not a boolean", other))),
                },
                Value::Int(1) => Ok(Value::Bool(true)),
                Value::Int(0) => Ok(Value::Bool(false)),
                Value::Int(i) => Err(reject(format!("{} is not a boolean", i))),
            },
            TypeTag::Enum(allowed) => {
                let s = value.as_wire();
                if allowed.iter().any(|a| a == &s) {
                    Ok(Value::Str(s))
                } else {
                    Err(reject(format!(
                        "'{}' is not one of [{}]",
                        s,
                        allowed.join(", ")
                    )))
                }
            }
            TypeTag::Ipv4 => {
                let s = value.as_wire();
                s.parse::<Ipv4Addr>()
                    .map(|_| Value::Str(s.clone()))
                    .map_err(|_| reject(format!("'{}' is not an IPv4 address", s)))
            }
            TypeTag::Ipv6 => {
                let s = value.as_wire();
                s.parse::<Ipv6Addr>()
                    .map(|_| Value::Str(s.clone()))
                    .map_err(|_| reject(format!("'{}' is not an IPv6 address", s)))
            }
            TypeTag::Mac => {
                let s = value.as_wire();
                if is_hex_groups(&s, 6) {
                    Ok(Value::Str(s))
                } else {
                    Err(reject(format!("'{}' is not a MAC address", s)))
                }
            }
            TypeTag::Wwpn => {
                let s = value.as_wire();
                if is_hex_groups(&s, 8) {
                    Ok(Value::Str(s))
                } else {
                    Err(reject(format!("'{}' is not a WWPN", s)))
                }
            }
        }
    }
}

/// Check for `groups` colon-separated two-digit hex pairs.
fn is_hex_groups(s: &str, groups: usize) -> bool {
    let parts: Vec<&str> = s.split(':').collect();
    parts.len() == groups
        && parts
            .iter()
            .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_rendering() {
        assert_eq!(Value::Str("x".into()).as_wire(), "x");
        assert_eq!(Value::Int(-3).as_wire(), "-3");
        assert_eq!(Value::Bool(true).as_wire(), "True");
        assert_eq!(Value::Bool(false).as_wire(), "False");
    }

    #[test]
    fn test_int_coercion() {
        assert_eq!(
            TypeTag::Int.coerce("n", Value::Str("42".into())).unwrap(),
            Value::Int(42)
        );
        assert!(TypeTag::Int.coerce("n", Value::Str("x".into())).is_err());
    }

    #[test]
    fn test_bool_coercion() {
        assert_eq!(
            TypeTag::Bool.coerce("b", Value::Str("True".into())).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            TypeTag::Bool.coerce("b", Value::Int(0)).unwrap(),
            Value::Bool(false)
        );
        assert!(TypeTag::Bool.coerce("b", Value::Str("yes".into())).is_err());
    }

    #[test]
    fn test_enum_coercion() {
        let tag = TypeTag::Enum(vec!["Create".into(), "Delete".into()]);
        assert!(tag.coerce("a", Value::Str("Create".into())).is_ok());
        assert!(tag.coerce("a", Value::Str("create".into())).is_err());
    }

    #[test]
    fn test_address_formats() {
        assert!(TypeTag::Ipv4.coerce("ip", "192.168.0.1".into()).is_ok());
        assert!(TypeTag::Ipv4.coerce("ip", "192.168.0".into()).is_err());
        assert!(TypeTag::Ipv6.coerce("ip", "fe80::1".into()).is_ok());
        assert!(TypeTag::Mac.coerce("mac", "aa:bb:cc:dd:ee:ff".into()).is_ok());
        assert!(TypeTag::Mac.coerce("mac", "aa:bb:cc:dd:ee".into()).is_err());
        assert!(TypeTag::Wwpn
            .coerce("wwpn", "20:00:d4:ae:52:6a:bc:01".into())
            .is_ok());
        assert!(TypeTag::Wwpn.coerce("wwpn", "20:00:d4".into()).is_err());
    }
}
