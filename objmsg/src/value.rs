//! Runtime values.
//!
//! Everything a handler receives, returns or stores in a slot is a [`Value`].
//! Primitive values can receive messages too; [`Value::value_type`] selects
//! the primitive system class they dispatch through.

use std::rc::Rc;

use crate::instance::InstanceId;
use crate::mutate::OverrideBatch;
use crate::symbol::Symbol;

/// A runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Symbol(Symbol),
    String(Rc<str>),
    Integer(i64),
    Float(f64),
    /// `TRUE` / `FALSE`. `FALSE` is the failure sentinel of every operation.
    Boolean(bool),
    Multifield(Rc<[Value]>),
    /// A reference by name; resolved through the instance store on use.
    InstanceName(Symbol),
    /// A direct reference; may go stale when the instance is deleted.
    Instance(InstanceId),
    /// Evaluated slot overrides travelling to a synthetic mutation handler.
    Overrides(OverrideBatch),
}

/// Primitive type tags, used for slot type constraints and primitive dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Symbol,
    String,
    Integer,
    Float,
    Multifield,
    InstanceName,
    InstanceAddress,
    ExternalAddress,
}

impl Value {
    pub const TRUE: Value = Value::Boolean(true);
    pub const FALSE: Value = Value::Boolean(false);

    pub fn string(text: &str) -> Self {
        Value::String(Rc::from(text))
    }

    pub fn multifield(values: impl IntoIterator<Item = Value>) -> Self {
        Value::Multifield(values.into_iter().collect())
    }

    /// True only for the `FALSE` sentinel.
    pub fn is_false(&self) -> bool {
        matches!(self, Value::Boolean(false))
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The primitive type of this value. Booleans are symbols.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Symbol(_) | Value::Boolean(_) => ValueType::Symbol,
            Value::String(_) => ValueType::String,
            Value::Integer(_) => ValueType::Integer,
            Value::Float(_) => ValueType::Float,
            Value::Multifield(_) => ValueType::Multifield,
            Value::InstanceName(_) => ValueType::InstanceName,
            Value::Instance(_) => ValueType::InstanceAddress,
            Value::Overrides(_) => ValueType::ExternalAddress,
        }
    }

    /// Spreads a value into message arguments: a multifield contributes its
    /// elements, anything else contributes itself.
    pub fn spread(self) -> Vec<Value> {
        match self {
            Value::Multifield(items) => items.to_vec(),
            other => vec![other],
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_false_is_false() {
        assert!(Value::FALSE.is_false());
        assert!(!Value::TRUE.is_false());
        assert!(!Value::Integer(0).is_false());
        assert!(!Value::multifield([]).is_false());
    }

    #[test]
    fn test_spread() {
        let mf = Value::multifield([Value::Integer(1), Value::Integer(2)]);
        assert_eq!(mf.spread(), vec![Value::Integer(1), Value::Integer(2)]);
        assert_eq!(Value::Integer(3).spread(), vec![Value::Integer(3)]);
    }

    #[test]
    fn test_numeric_views() {
        assert_eq!(Value::Integer(4).as_float(), Some(4.0));
        assert_eq!(Value::Float(1.5).as_integer(), None);
        assert_eq!(Value::TRUE.value_type(), ValueType::Symbol);
    }
}
