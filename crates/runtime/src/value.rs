//! Runtime value model.
//!
//! The closed set of value variants every formula evaluates to, plus the
//! type-directed coercions and the loose equality table used by the `=`
//! and `<>` operators. Failures are values too: `Value::Error` carries a
//! kind tag and message and flows through evaluation without unwinding.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

/// Fold a name for case-insensitive comparison.
pub(crate) fn fold(name: &str) -> String {
    name.to_lowercase()
}

/// Format a decimal in the invariant locale, trailing zeros stripped.
pub fn format_decimal(value: &Decimal) -> String {
    value.normalize().to_string()
}

/// A runtime value
#[derive(Debug, Clone)]
pub enum Value {
    /// Exact decimal number
    Number(Decimal),
    /// Immutable text
    String(String),
    Bool(bool),
    /// Ordered string-keyed mapping with case-insensitive lookup
    Object(ObjectValue),
    /// Ordered sequence
    List(Vec<Value>),
    /// Opaque host-provided callable
    Function(FunctionValue),
    /// Deferred value; settles to another variant (or an Error)
    Pending(Pending),
    /// A carried failure
    Error(ErrorValue),
}

impl Value {
    pub fn number(n: impl Into<Decimal>) -> Self {
        Value::Number(n.into())
    }

    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    /// Variant name for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "Number",
            Value::String(_) => "String",
            Value::Bool(_) => "Boolean",
            Value::Object(_) => "Object",
            Value::List(_) => "List",
            Value::Function(_) => "Function",
            Value::Pending(_) => "Pending",
            Value::Error(_) => "Error",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectValue> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Coerce to Number: Number is itself, String parses in the invariant
    /// locale, Boolean maps to 0/1. Everything else fails; an Error operand
    /// propagates unchanged.
    pub fn coerce_number(&self) -> Result<Decimal, ErrorValue> {
        match self {
            Value::Number(n) => Ok(*n),
            Value::String(s) => s
                .parse::<Decimal>()
                .map_err(|_| ErrorValue::coercion(format!("cannot parse \"{s}\" as Number"))),
            Value::Bool(b) => Ok(if *b { Decimal::ONE } else { Decimal::ZERO }),
            Value::Error(e) => Err(e.clone()),
            other => Err(ErrorValue::coercion(format!(
                "cannot coerce {} to Number",
                other.type_name()
            ))),
        }
    }

    /// Coerce to String: numbers render in the invariant locale, booleans
    /// as `true`/`false`.
    pub fn coerce_string(&self) -> Result<String, ErrorValue> {
        match self {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(format_decimal(n)),
            Value::Bool(b) => Ok(if *b { "true" } else { "false" }.to_string()),
            Value::Error(e) => Err(e.clone()),
            other => Err(ErrorValue::coercion(format!(
                "cannot coerce {} to String",
                other.type_name()
            ))),
        }
    }

    /// Coerce to Boolean: numbers are false iff zero, strings accept
    /// `true`/`false` case-insensitively.
    pub fn coerce_bool(&self) -> Result<bool, ErrorValue> {
        match self {
            Value::Bool(b) => Ok(*b),
            Value::Number(n) => Ok(!n.is_zero()),
            Value::String(s) => {
                if s.eq_ignore_ascii_case("true") {
                    Ok(true)
                } else if s.eq_ignore_ascii_case("false") {
                    Ok(false)
                } else {
                    Err(ErrorValue::coercion(format!(
                        "cannot parse \"{s}\" as Boolean"
                    )))
                }
            }
            Value::Error(e) => Err(e.clone()),
            other => Err(ErrorValue::coercion(format!(
                "cannot coerce {} to Boolean",
                other.type_name()
            ))),
        }
    }

    /// The language's equality table. Number/Number is exact decimal
    /// equality, String/String and Boolean/Boolean are ordinal, a
    /// Number/String pair compares the stringified number. All other
    /// pairings are unequal, never an error.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
                format_decimal(n) == *s
            }
            _ => false,
        }
    }
}

/// Structural equality, used by tests and hosts. Functions compare by
/// identity; Pending values never compare equal.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(&a.inner, &b.inner),
            (Value::Error(a), Value::Error(b)) => a == b,
            _ => false,
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Number(n) => serializer.serialize_str(&format_decimal(n)),
            Value::String(s) => serializer.serialize_str(s),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Object(o) => o.serialize(serializer),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Function(_) => serializer.serialize_str("<function>"),
            Value::Pending(_) => serializer.serialize_str("<pending>"),
            Value::Error(e) => e.serialize(serializer),
        }
    }
}

/// Ordered string-keyed mapping. Lookup is case-insensitive; iteration
/// preserves insertion order and original key spelling.
#[derive(Debug, Clone, Default)]
pub struct ObjectValue {
    entries: IndexMap<String, (String, Value)>,
}

impl ObjectValue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entry. A replaced key keeps its position.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        self.entries.insert(fold(&key), (key, value));
    }

    /// Insert only if the key is absent; returns false on a duplicate.
    pub fn try_insert(&mut self, key: impl Into<String>, value: Value) -> bool {
        let key = key.into();
        let folded = fold(&key);
        if self.entries.contains_key(&folded) {
            return false;
        }
        self.entries.insert(folded, (key, value));
        true
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(&fold(key)).map(|(_, v)| v)
    }

    /// Entries in insertion order with their original key spelling
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.values().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Order-sensitive structural equality on folded keys
impl PartialEq for ObjectValue {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .zip(other.entries.iter())
                .all(|((ka, (_, va)), (kb, (_, vb)))| ka == kb && va == vb)
    }
}

impl Serialize for ObjectValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Opaque host callable over `Vec<Value>`
#[derive(Clone)]
pub struct FunctionValue {
    pub(crate) inner: Arc<dyn Fn(Vec<Value>) -> Value + Send + Sync>,
}

impl FunctionValue {
    pub fn new(f: impl Fn(Vec<Value>) -> Value + Send + Sync + 'static) -> Self {
        Self { inner: Arc::new(f) }
    }

    pub fn call(&self, args: Vec<Value>) -> Value {
        (self.inner)(args)
    }
}

impl fmt::Debug for FunctionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<function>")
    }
}

/// A deferred value. Cloneable and awaitable from multiple steps.
#[derive(Clone)]
pub struct Pending {
    future: Shared<BoxFuture<'static, Value>>,
}

impl Pending {
    pub fn new(future: impl Future<Output = Value> + Send + 'static) -> Self {
        Self {
            future: future.boxed().shared(),
        }
    }

    /// A pending value that is already complete
    pub fn ready(value: Value) -> Self {
        Self::new(std::future::ready(value))
    }

    /// Await completion, settling through chained pendings.
    pub async fn settle(self) -> Value {
        let mut value = self.future.await;
        loop {
            match value {
                Value::Pending(p) => value = p.future.await,
                other => return other,
            }
        }
    }
}

impl fmt::Debug for Pending {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<pending>")
    }
}

/// A carried runtime failure
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ErrorValue {
    pub kind: RuntimeErrorKind,
    pub message: String,
}

/// Kinds of runtime failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum RuntimeErrorKind {
    UnresolvedIdentifier,
    AccessUnsupported,
    AccessFailed,
    InvokeUnsupported,
    CoercionFailed,
    MathDomain,
    DuplicateKey,
    Timeout,
    Internal,
}

impl ErrorValue {
    pub fn new(kind: RuntimeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unresolved(name: &str) -> Self {
        Self::new(
            RuntimeErrorKind::UnresolvedIdentifier,
            format!("`{name}` does not resolve to any declaration"),
        )
    }

    pub fn coercion(message: impl Into<String>) -> Self {
        Self::new(RuntimeErrorKind::CoercionFailed, message)
    }

    pub fn math(message: impl Into<String>) -> Self {
        Self::new(RuntimeErrorKind::MathDomain, message)
    }

    pub fn access_failed(member: &str) -> Self {
        Self::new(
            RuntimeErrorKind::AccessFailed,
            format!("object has no member `{member}`"),
        )
    }

    pub fn access_unsupported(type_name: &str) -> Self {
        Self::new(
            RuntimeErrorKind::AccessUnsupported,
            format!("cannot access members of {type_name}"),
        )
    }

    pub fn invoke_unsupported(type_name: &str) -> Self {
        Self::new(
            RuntimeErrorKind::InvokeUnsupported,
            format!("cannot invoke {type_name}"),
        )
    }

    pub fn duplicate_key(key: &str) -> Self {
        Self::new(
            RuntimeErrorKind::DuplicateKey,
            format!("duplicate object key `{key}`"),
        )
    }

    pub fn timeout() -> Self {
        Self::new(RuntimeErrorKind::Timeout, "call timed out")
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(RuntimeErrorKind::Internal, message)
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ErrorValue {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn num(s: &str) -> Value {
        Value::Number(Decimal::from_str(s).unwrap())
    }

    #[test]
    fn test_coerce_number() {
        assert_eq!(num("2.5").coerce_number().unwrap(), Decimal::from_str("2.5").unwrap());
        assert_eq!(
            Value::string("17.25").coerce_number().unwrap(),
            Decimal::from_str("17.25").unwrap()
        );
        assert_eq!(Value::Bool(true).coerce_number().unwrap(), Decimal::ONE);
        assert_eq!(Value::Bool(false).coerce_number().unwrap(), Decimal::ZERO);

        let err = Value::string("abc").coerce_number().unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::CoercionFailed);

        let err = Value::List(vec![]).coerce_number().unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::CoercionFailed);
    }

    #[test]
    fn test_coerce_string() {
        assert_eq!(num("1.50").coerce_string().unwrap(), "1.5");
        assert_eq!(num("42").coerce_string().unwrap(), "42");
        assert_eq!(Value::Bool(true).coerce_string().unwrap(), "true");
        assert_eq!(
            Value::Object(ObjectValue::new()).coerce_string().unwrap_err().kind,
            RuntimeErrorKind::CoercionFailed
        );
    }

    #[test]
    fn test_coerce_bool() {
        assert!(Value::Bool(true).coerce_bool().unwrap());
        assert!(num("3").coerce_bool().unwrap());
        assert!(!num("0").coerce_bool().unwrap());
        assert!(Value::string("TRUE").coerce_bool().unwrap());
        assert!(!Value::string("False").coerce_bool().unwrap());
        assert_eq!(
            Value::string("yes").coerce_bool().unwrap_err().kind,
            RuntimeErrorKind::CoercionFailed
        );
    }

    #[test]
    fn test_error_propagates_through_coercion() {
        let err = Value::Error(ErrorValue::math("boom"));
        assert_eq!(err.coerce_number().unwrap_err().kind, RuntimeErrorKind::MathDomain);
        assert_eq!(err.coerce_bool().unwrap_err().kind, RuntimeErrorKind::MathDomain);
    }

    #[test]
    fn test_loose_equality() {
        assert!(num("1.0").loose_eq(&num("1")));
        assert!(num("1").loose_eq(&Value::string("1")));
        assert!(Value::string("1").loose_eq(&num("1.0")));
        assert!(!num("1").loose_eq(&Value::string("1.0")));
        assert!(Value::string("a").loose_eq(&Value::string("a")));
        assert!(!Value::string("a").loose_eq(&Value::string("A")));
        assert!(Value::Bool(true).loose_eq(&Value::Bool(true)));
        assert!(!Value::Bool(true).loose_eq(&num("1")));
        assert!(!Value::List(vec![]).loose_eq(&Value::List(vec![])));
    }

    #[test]
    fn test_object_case_insensitive_ordered() {
        let mut obj = ObjectValue::new();
        obj.insert("Net", num("1"));
        obj.insert("Gross", num("2"));

        assert_eq!(obj.get("net"), Some(&num("1")));
        assert_eq!(obj.get("GROSS"), Some(&num("2")));
        assert_eq!(obj.get("missing"), None);

        let keys: Vec<_> = obj.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["Net", "Gross"]);

        assert!(!obj.try_insert("NET", num("3")));
        assert_eq!(obj.len(), 2);
    }

    #[tokio::test]
    async fn test_pending_settles_through_chain() {
        let inner = Pending::ready(num("42"));
        let outer = Pending::ready(Value::Pending(inner));
        assert_eq!(outer.settle().await, num("42"));
    }

    #[tokio::test]
    async fn test_pending_is_shareable() {
        let pending = Pending::ready(num("7"));
        let a = pending.clone().settle().await;
        let b = pending.settle().await;
        assert_eq!(a, b);
    }
}
