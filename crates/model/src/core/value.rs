use bigdecimal::{BigDecimal, ToPrimitive};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};

/// A single attribute value as carried on the wire.
///
/// Numbers are kept as arbitrary-precision decimals because the store
/// transmits them as decimal strings and makes no distinction between
/// integers and fractions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    String(String),
    Number(BigDecimal),
    Binary(Vec<u8>),
    Boolean(bool),
    StringSet(Vec<String>),
    NumberSet(Vec<BigDecimal>),
    BinarySet(Vec<Vec<u8>>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Null,
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn int(n: i64) -> Self {
        Value::Number(BigDecimal::from(n))
    }

    /// Parses a decimal string into a number value.
    pub fn number(s: &str) -> Option<Self> {
        BigDecimal::from_str(s).ok().map(Value::Number)
    }

    pub fn string_set<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::StringSet(items.into_iter().map(Into::into).collect())
    }

    pub fn string_list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::List(items.into_iter().map(Value::string).collect())
    }

    pub fn int_list<I>(items: I) -> Self
    where
        I: IntoIterator<Item = i64>,
    {
        Value::List(items.into_iter().map(Value::int).collect())
    }

    /// The wire type descriptor of this value.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Value::String(_) => "S",
            Value::Number(_) => "N",
            Value::Binary(_) => "B",
            Value::Boolean(_) => "BOOL",
            Value::StringSet(_) => "SS",
            Value::NumberSet(_) => "NS",
            Value::BinarySet(_) => "BS",
            Value::List(_) => "L",
            Value::Map(_) => "M",
            Value::Null => "NULL",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) if n.is_integer() => n.to_i64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Whether this value is usable as a key attribute (string, number or binary).
    pub fn is_scalar_key(&self) -> bool {
        matches!(self, Value::String(_) | Value::Number(_) | Value::Binary(_))
    }

    /// Prefix test used by `begins_with` conditions.
    pub fn begins_with(&self, prefix: &Value) -> bool {
        match (self, prefix) {
            (Value::String(s), Value::String(p)) => s.starts_with(p.as_str()),
            (Value::Binary(b), Value::Binary(p)) => b.starts_with(p),
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Binary(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(v) => write!(f, "{v:?}"),
            Value::Number(v) => write!(f, "{v}"),
            Value::Binary(v) => write!(f, "<{} bytes>", v.len()),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::StringSet(v) => write!(f, "{v:?}"),
            Value::NumberSet(v) => {
                let items = v.iter().map(|n| n.to_string()).collect::<Vec<_>>();
                write!(f, "[{}]", items.join(", "))
            }
            Value::BinarySet(v) => write!(f, "<{} binaries>", v.len()),
            Value::List(v) => {
                let items = v.iter().map(|i| i.to_string()).collect::<Vec<_>>();
                write!(f, "[{}]", items.join(", "))
            }
            Value::Map(v) => {
                let items = v
                    .iter()
                    .map(|(k, i)| format!("{k}: {i}"))
                    .collect::<Vec<_>>();
                write!(f, "{{{}}}", items.join(", "))
            }
            Value::Null => write!(f, "NULL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_helpers_wrap_each_item() {
        assert_eq!(
            Value::string_list(["a", "b"]),
            Value::List(vec![Value::string("a"), Value::string("b")])
        );
        assert_eq!(
            Value::int_list([1, 2]),
            Value::List(vec![Value::int(1), Value::int(2)])
        );
    }

    #[test]
    fn numbers_compare_by_value() {
        assert_eq!(Value::number("10.0"), Some(Value::int(10)));
        assert_eq!(Value::int(42).as_i64(), Some(42));
        assert_eq!(Value::number("1.5").and_then(|v| v.as_i64()), None);
    }

    #[test]
    fn begins_with_only_matches_same_kind() {
        assert!(Value::string("USER#1").begins_with(&Value::string("USER#")));
        assert!(!Value::string("USER#1").begins_with(&Value::int(1)));
    }
}
