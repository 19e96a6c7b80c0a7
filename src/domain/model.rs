use crate::domain::array::NdArray;
use std::fmt;

/// A leaf value the container format can store natively.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
}

impl Scalar {
    /// Python `str()` rendering, used when a leaf is promoted into a text array.
    pub fn to_text(&self) -> String {
        match self {
            Scalar::Bool(true) => "True".to_string(),
            Scalar::Bool(false) => "False".to_string(),
            Scalar::Int(v) => v.to_string(),
            Scalar::Float(v) => float_text(*v),
            Scalar::Str(s) => s.clone(),
            Scalar::Bytes(b) => bytes_repr(b),
        }
    }
}

pub(crate) fn float_text(v: f64) -> String {
    if v.is_nan() {
        "nan".to_string()
    } else if v.is_infinite() {
        String::from(if v > 0.0 { "inf" } else { "-inf" })
    } else {
        format!("{:?}", v)
    }
}

pub(crate) fn bytes_repr(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 3);
    out.push_str("b'");
    for &b in bytes {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'\'' => out.push_str("\\'"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\x{:02x}", b)),
        }
    }
    out.push('\'');
    out
}

/// A value with no native storage shape. Only its textual form survives.
#[derive(Debug, Clone, PartialEq)]
pub struct Opaque {
    pub type_name: String,
    pub repr: String,
}

impl Opaque {
    pub fn new(type_name: impl Into<String>, repr: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            repr: repr.into(),
        }
    }
}

impl fmt::Display for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr)
    }
}

/// An arbitrary deserialized object graph.
///
/// Graphs are owned trees, so a decoded value can never refer back to one
/// of its ancestors. Nesting depth is unbounded; extremely deep input can
/// still exhaust the stack during normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Scalar(Scalar),
    Array(NdArray),
    Sequence(Vec<Object>),
    Mapping(Vec<(String, Object)>),
    Other(Opaque),
}

impl From<Scalar> for Object {
    fn from(value: Scalar) -> Self {
        Object::Scalar(value)
    }
}

impl From<NdArray> for Object {
    fn from(value: NdArray) -> Self {
        Object::Array(value)
    }
}

impl From<i64> for Object {
    fn from(value: i64) -> Self {
        Object::Scalar(Scalar::Int(value))
    }
}

impl From<f64> for Object {
    fn from(value: f64) -> Self {
        Object::Scalar(Scalar::Float(value))
    }
}

impl From<&str> for Object {
    fn from(value: &str) -> Self {
        Object::Scalar(Scalar::Str(value.to_string()))
    }
}

/// An object graph whose every leaf is storable: no `Other` values remain.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Scalar(Scalar),
    Array(NdArray),
    Sequence(Vec<Normalized>),
    Mapping(Vec<(String, Normalized)>),
}

impl From<Normalized> for Object {
    fn from(value: Normalized) -> Self {
        match value {
            Normalized::Scalar(s) => Object::Scalar(s),
            Normalized::Array(a) => Object::Array(a),
            Normalized::Sequence(items) => {
                Object::Sequence(items.into_iter().map(Object::from).collect())
            }
            Normalized::Mapping(entries) => Object::Mapping(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Object::from(v)))
                    .collect(),
            ),
        }
    }
}

/// One named array inside an output container.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub name: String,
    pub array: NdArray,
}

impl Dataset {
    pub fn new(name: impl Into<String>, array: NdArray) -> Self {
        Self {
            name: name.into(),
            array,
        }
    }
}
