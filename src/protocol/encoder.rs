//! Hessian2-style request encoder (pure, synchronous, no I/O).
//!
//! Compiles an [`Invocation`] into a Dubbo frame body. This is Layer 2 of
//! the client: no async, no tokio, no sockets. The transport layer wraps
//! the returned body in a frame header and writes it to the wire.

use bytes::BytesMut;

use crate::error::DubboResult;
use crate::value::{Object, Value};

const BC_INT_ZERO: i32 = 0x90;
const INT_DIRECT_MIN: i32 = -16;
const INT_DIRECT_MAX: i32 = 47;

const BC_INT_BYTE_ZERO: i32 = 0xc8;
const INT_BYTE_MIN: i32 = -2048;
const INT_BYTE_MAX: i32 = 2047;

const BC_INT_SHORT_ZERO: i32 = 0xd4;
const INT_SHORT_MIN: i32 = -262_144;
const INT_SHORT_MAX: i32 = 262_143;

const BC_DOUBLE_ZERO: u8 = 0x67;
const BC_DOUBLE_ONE: u8 = 0x68;
const BC_DOUBLE_BYTE: u8 = 0x69;
const BC_DOUBLE_SHORT: u8 = 0x6a;
const BC_DOUBLE_MILL: u8 = 0x6b;

const STRING_DIRECT_MAX: usize = 31;
const BC_STRING_DIRECT: u8 = 0x00;
const STRING_SHORT_MAX: usize = 1023;
const BC_STRING_SHORT: u8 = 0x30;

/// A remote method invocation, ready to be serialized.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub dubbo_version: String,
    pub path: String,
    pub version: String,
    pub method: String,
    pub arguments: Vec<Value>,
    pub group: Option<String>,
}

/// Per-request class table: tracks which `Object` class names have already
/// had their `C`-definition emitted, so repeats can use a compact reference.
#[derive(Debug, Default)]
struct ClassTable {
    classes: Vec<String>,
}

impl ClassTable {
    /// Returns `(class_id, already_defined)`.
    fn intern(&mut self, class_name: &str) -> (usize, bool) {
        if let Some(id) = self.classes.iter().position(|c| c == class_name) {
            (id, true)
        } else {
            self.classes.push(class_name.to_string());
            (self.classes.len() - 1, false)
        }
    }
}

/// Encodes a single [`Invocation`] into a Hessian2-style request body.
///
/// A fresh `Encoder` is created per request; its class table is therefore
/// scoped to that request, matching the wire format's interning rule.
#[derive(Default)]
pub struct Encoder {
    classes: ClassTable,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode the request body: dubbo-version, path, version, method,
    /// parameter-type descriptor, each argument, then the attachments map.
    pub fn encode_body(&mut self, inv: &Invocation) -> DubboResult<BytesMut> {
        let mut buf = BytesMut::new();
        self.encode_value(&mut buf, &Value::String(inv.dubbo_version.clone()))?;
        self.encode_value(&mut buf, &Value::String(inv.path.clone()))?;
        self.encode_value(&mut buf, &Value::String(inv.version.clone()))?;
        self.encode_value(&mut buf, &Value::String(inv.method.clone()))?;
        self.encode_value(&mut buf, &Value::String(parameter_descriptor(&inv.arguments)))?;
        for arg in &inv.arguments {
            self.encode_value(&mut buf, arg)?;
        }

        let mut attachments: Vec<(&str, &str)> =
            vec![("path", &inv.path), ("interface", &inv.path), ("version", &inv.version)];
        let group_owned;
        if let Some(group) = &inv.group {
            group_owned = group.clone();
            attachments.push(("group", &group_owned));
        }

        buf.extend_from_slice(b"H");
        for (key, value) in attachments {
            self.encode_value(&mut buf, &Value::String(key.to_string()))?;
            self.encode_value(&mut buf, &Value::String(value.to_string()))?;
        }
        buf.extend_from_slice(b"Z");

        Ok(buf)
    }

    fn encode_value(&mut self, buf: &mut BytesMut, value: &Value) -> DubboResult<()> {
        match value {
            Value::Bool(b) => {
                buf.extend_from_slice(if *b { b"T" } else { b"F" });
                Ok(())
            }
            Value::Int32(v) => {
                encode_int32(buf, *v);
                Ok(())
            }
            Value::Int64(v) => {
                encode_int64(buf, *v);
                Ok(())
            }
            Value::Double(v) => {
                encode_double(buf, *v);
                Ok(())
            }
            Value::String(s) => {
                encode_string(buf, s);
                Ok(())
            }
            Value::Object(o) => self.encode_object(buf, o),
        }
    }

    fn encode_object(&mut self, buf: &mut BytesMut, object: &Object) -> DubboResult<()> {
        let (class_id, already_defined) = self.classes.intern(&object.class_name);
        if !already_defined {
            buf.extend_from_slice(b"C");
            encode_string(buf, &object.class_name);
            encode_int32(buf, object.fields().len() as i32);
            for (name, _) in object.fields() {
                encode_string(buf, name);
            }
        }

        if class_id <= 0xf {
            buf.extend_from_slice(&[(0x60 + class_id) as u8]);
        } else {
            buf.extend_from_slice(b"O");
            encode_int32(buf, class_id as i32);
        }

        for (_, field_value) in object.fields() {
            self.encode_value(buf, field_value)?;
        }
        Ok(())
    }
}

/// Builds the JVM parameter-type descriptor string for an argument list.
fn parameter_descriptor(arguments: &[Value]) -> String {
    arguments.iter().map(Value::descriptor).collect()
}

fn encode_int32(buf: &mut BytesMut, v: i32) {
    if (INT_DIRECT_MIN..=INT_DIRECT_MAX).contains(&v) {
        buf.extend_from_slice(&[(v + BC_INT_ZERO) as u8]);
    } else if (INT_BYTE_MIN..=INT_BYTE_MAX).contains(&v) {
        buf.extend_from_slice(&[(BC_INT_BYTE_ZERO + (v >> 8)) as u8, v as u8]);
    } else if (INT_SHORT_MIN..=INT_SHORT_MAX).contains(&v) {
        buf.extend_from_slice(&[
            (BC_INT_SHORT_ZERO + (v >> 16)) as u8,
            (v >> 8) as u8,
            v as u8,
        ]);
    } else {
        buf.extend_from_slice(b"I");
        buf.extend_from_slice(&v.to_be_bytes());
    }
}

fn encode_int64(buf: &mut BytesMut, v: i64) {
    buf.extend_from_slice(b"L");
    buf.extend_from_slice(&v.to_be_bytes());
}

fn encode_double(buf: &mut BytesMut, v: f64) {
    let int_value = v as i64;
    if int_value as f64 == v {
        if int_value == 0 {
            buf.extend_from_slice(&[BC_DOUBLE_ZERO]);
            return;
        }
        if int_value == 1 {
            buf.extend_from_slice(&[BC_DOUBLE_ONE]);
            return;
        }
        if (-0x80..0x80).contains(&int_value) {
            buf.extend_from_slice(&[BC_DOUBLE_BYTE, int_value as u8]);
            return;
        }
        if (-0x8000..0x8000).contains(&int_value) {
            buf.extend_from_slice(&[BC_DOUBLE_SHORT, (int_value >> 8) as u8, int_value as u8]);
            return;
        }
    }

    let mills = (v * 1000.0) as i32;
    if 0.001 * (mills as f64) == v {
        buf.extend_from_slice(&[BC_DOUBLE_MILL]);
        buf.extend_from_slice(&mills.to_be_bytes());
        return;
    }

    buf.extend_from_slice(b"D");
    buf.extend_from_slice(&v.to_be_bytes());
}

fn encode_string(buf: &mut BytesMut, s: &str) {
    let length = s.chars().count();
    if length <= STRING_DIRECT_MAX {
        buf.extend_from_slice(&[BC_STRING_DIRECT + length as u8]);
    } else if length <= STRING_SHORT_MAX {
        buf.extend_from_slice(&[BC_STRING_SHORT + (length >> 8) as u8, length as u8]);
    } else {
        buf.extend_from_slice(b"S");
        buf.extend_from_slice(&(length as u16).to_be_bytes());
    }
    buf.extend_from_slice(s.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_one(v: Value) -> BytesMut {
        let mut enc = Encoder::new();
        let mut buf = BytesMut::new();
        enc.encode_value(&mut buf, &v).unwrap();
        buf
    }

    #[test]
    fn test_int32_compact_form() {
        // Scenario 2: 42 -> 0x90 + 42 = 0xba
        let bytes = encode_one(Value::Int32(42));
        assert_eq!(bytes.as_ref(), &[0xba]);
    }

    #[test]
    fn test_int64_full_form() {
        // Scenario 3: 2^35 -> 'L' + big-endian i64
        let v: i64 = 1 << 35;
        let bytes = encode_one(Value::Int64(v));
        assert_eq!(bytes[0], b'L');
        assert_eq!(i64::from_be_bytes(bytes[1..9].try_into().unwrap()), v);
    }

    #[test]
    fn test_double_one() {
        // Scenario 4: 1.0 -> BC_DOUBLE_ONE
        let bytes = encode_one(Value::Double(1.0));
        assert_eq!(bytes.as_ref(), &[BC_DOUBLE_ONE]);
    }

    #[test]
    fn test_double_zero() {
        let bytes = encode_one(Value::Double(0.0));
        assert_eq!(bytes.as_ref(), &[BC_DOUBLE_ZERO]);
    }

    #[test]
    fn test_double_mill_form() {
        let bytes = encode_one(Value::Double(1.5));
        assert_eq!(bytes[0], BC_DOUBLE_MILL);
        let mills = i32::from_be_bytes(bytes[1..5].try_into().unwrap());
        assert_eq!(mills, 1500);
    }

    #[test]
    fn test_double_full_ieee_form() {
        let v = std::f64::consts::PI;
        let bytes = encode_one(Value::Double(v));
        assert_eq!(bytes[0], b'D');
        assert_eq!(f64::from_be_bytes(bytes[1..9].try_into().unwrap()), v);
    }

    #[test]
    fn test_string_direct_form() {
        let bytes = encode_one(Value::String("hi".to_string()));
        assert_eq!(bytes[0], BC_STRING_DIRECT + 2);
        assert_eq!(&bytes[1..], b"hi");
    }

    #[test]
    fn test_string_length_is_code_points_not_bytes() {
        // "\u{e9}" (é) is 1 code point but 2 UTF-8 bytes.
        let bytes = encode_one(Value::String("\u{e9}".to_string()));
        assert_eq!(bytes[0], BC_STRING_DIRECT + 1);
        assert_eq!(bytes.len(), 1 + 2);
    }

    #[test]
    fn test_object_interning_round_trip() {
        // Scenario 5: two objects of the same class.
        let mut o1 = Object::new("a.B");
        o1.set("x", "s");
        let mut o2 = Object::new("a.B");
        o2.set("x", "t");

        let mut enc = Encoder::new();
        let mut buf = BytesMut::new();
        enc.encode_value(&mut buf, &Value::Object(o1)).unwrap();
        enc.encode_value(&mut buf, &Value::Object(o2)).unwrap();

        // First occurrence: C "a.B" 1 "x" <class-ref 0x60> "s"
        assert_eq!(buf[0], b'C');
        // Second occurrence only emits the compact reference + value, no
        // repeated class definition.
        let second_ref_pos = buf
            .iter()
            .rposition(|&b| b == 0x60)
            .expect("second object should use compact class ref 0");
        assert_eq!(buf[second_ref_pos + 1], BC_STRING_DIRECT + 1);
        assert_eq!(buf[second_ref_pos + 2], b't');
    }

    #[test]
    fn test_class_table_defines_each_class_once() {
        let mut enc = Encoder::new();
        let (id_a, defined_a) = enc.classes.intern("a.B");
        let (id_b, defined_b) = enc.classes.intern("a.B");
        assert!(!defined_a);
        assert!(defined_b);
        assert_eq!(id_a, id_b);
    }

    #[test]
    fn test_encode_body_no_args() {
        let inv = Invocation {
            dubbo_version: "2.6.1".to_string(),
            path: "com.example.Svc".to_string(),
            version: String::new(),
            method: "ping".to_string(),
            arguments: vec![],
            group: None,
        };
        let mut enc = Encoder::new();
        let body = enc.encode_body(&inv).unwrap();
        assert_eq!(body[0], BC_STRING_DIRECT + 5); // "2.6.1"
        assert!(body.ends_with(b"Z"));
        assert!(body.contains(&b'H'));
    }
}
