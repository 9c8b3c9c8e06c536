//! The dynamic value grammar carried by a Dubbo invocation.
//!
//! `Value` mirrors the six types the wire format can carry. Integers are
//! demoted to `Int32` when they fit, matching the Java-interop range check
//! the encoder performs on every argument.

use crate::error::DubboResult;

pub const MIN_INT_32: i64 = i32::MIN as i64;
pub const MAX_INT_32: i64 = i32::MAX as i64;

/// A Java object: an ordered field list (insertion order preserved), plus
/// the interface/class path used for class-table interning.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub class_name: String,
    fields: Vec<(String, Value)>,
}

impl Object {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            fields: Vec::new(),
        }
    }

    /// Set a field, appending it if new or updating in place if already set.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let name = name.into();
        let value = value.into();
        if let Some(existing) = self.fields.iter_mut().find(|(n, _)| *n == name) {
            existing.1 = value;
        } else {
            self.fields.push((name, value));
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Double(f64),
    String(String),
    Object(Object),
}

impl Value {
    /// The JVM parameter-type descriptor fragment for this value.
    pub fn descriptor(&self) -> String {
        match self {
            Value::Bool(_) => "Z".to_string(),
            Value::Int32(_) => "I".to_string(),
            Value::Int64(_) => "J".to_string(),
            Value::Double(_) => "D".to_string(),
            Value::String(_) => "Ljava/lang/String;".to_string(),
            Value::Object(o) => format!("L{};", o.class_name.replace('.', "/")),
        }
    }
}

/// Converts a host-language value into the wire `Value` grammar.
///
/// Callers write `42.into()` rather than naming the `Value` variant
/// explicitly. An integer out of `i32` range is automatically promoted to
/// `Int64`.
pub trait ToValue {
    fn to_value(self) -> Value;
}

impl ToValue for bool {
    fn to_value(self) -> Value {
        Value::Bool(self)
    }
}

impl ToValue for i32 {
    fn to_value(self) -> Value {
        Value::Int32(self)
    }
}

impl ToValue for i64 {
    fn to_value(self) -> Value {
        if (MIN_INT_32..=MAX_INT_32).contains(&self) {
            Value::Int32(self as i32)
        } else {
            Value::Int64(self)
        }
    }
}

impl ToValue for f64 {
    fn to_value(self) -> Value {
        Value::Double(self)
    }
}

impl ToValue for &str {
    fn to_value(self) -> Value {
        Value::String(self.to_string())
    }
}

impl ToValue for String {
    fn to_value(self) -> Value {
        Value::String(self)
    }
}

impl ToValue for Object {
    fn to_value(self) -> Value {
        Value::Object(self)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        v.to_value()
    }
}
impl From<i32> for Value {
    fn from(v: i32) -> Self {
        v.to_value()
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        v.to_value()
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        v.to_value()
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        v.to_value()
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        v.to_value()
    }
}
impl From<Object> for Value {
    fn from(v: Object) -> Self {
        v.to_value()
    }
}

/// Validates that `value`, and recursively every field of every nested
/// `Object`, belongs to the six-variant grammar.
///
/// For any `Value` reached through `ToValue`, this always succeeds: the
/// type system already closes `Object`'s field list over `Value` itself,
/// so there is no way to build an invalid tree that way. It exists for
/// callers assembling an `Object` by hand outside that path, so they can
/// fail fast with `HessianTypeError` before a call ever reaches the wire.
pub fn check_encodable(value: &Value) -> DubboResult<()> {
    if let Value::Object(o) = value {
        for (_, field) in o.fields() {
            check_encodable(field)?;
        }
    }
    Ok(())
}
