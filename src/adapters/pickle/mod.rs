// Pickle decoding without a Python runtime: `machine` runs the opcodes,
// this module applies Python's type rules to the result.

mod machine;
mod numpy;

pub use machine::{load, Instance, PickleError, PickleValue};

use crate::domain::model::{bytes_repr, float_text, Object, Opaque, Scalar};
use crate::domain::ports::Decoder;
use crate::utils::error::Result;

pub const PICKLE_EXTENSION: &str = "pkl";

/// Decodes Python pickles, protocols 0 through 5.
///
/// Classes are never imported. numpy arrays are rebuilt from their raw
/// buffers; every other object keeps only its textual form.
#[derive(Debug, Clone, Default)]
pub struct PickleDecoder;

impl PickleDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for PickleDecoder {
    fn extension(&self) -> &str {
        PICKLE_EXTENSION
    }

    fn decode(&self, bytes: &[u8]) -> Result<Object> {
        let value = load(bytes)?;
        Ok(to_object(value))
    }
}

/// Classifies a pickle value the way Python's `isinstance` checks would.
///
/// `bool`/`int`/`float`/`str`/`bytes` are scalars, `list` is a sequence and
/// `dict` (with its subclasses) a mapping with `str()` keys. numpy arrays
/// become arrays. Tuples, sets, `None`, integers too wide for i64 and every
/// other object are opaque text.
pub fn to_object(value: PickleValue) -> Object {
    match value {
        PickleValue::Bool(b) => Object::Scalar(Scalar::Bool(b)),
        PickleValue::Int(v) => Object::Scalar(Scalar::Int(v)),
        PickleValue::Float(v) => Object::Scalar(Scalar::Float(v)),
        PickleValue::Str(s) => Object::Scalar(Scalar::Str(s)),
        PickleValue::Bytes(b) => Object::Scalar(Scalar::Bytes(b)),
        PickleValue::List(items) => Object::Sequence(items.into_iter().map(to_object).collect()),
        PickleValue::Dict(entries) => Object::Mapping(
            entries
                .into_iter()
                .map(|(key, value)| (key_text(&key), to_object(value)))
                .collect(),
        ),
        PickleValue::Instance(instance) => match numpy::rebuild(&instance) {
            Some(object) => object,
            None => Object::Other(Opaque::new(
                class_of(&instance).map_or("object", |(_, name)| name),
                instance_text(&instance, false),
            )),
        },
        other => Object::Other(Opaque::new(type_name(&other), repr(&other))),
    }
}

// str() of a dict key.
fn key_text(key: &PickleValue) -> String {
    match key {
        PickleValue::Str(s) => s.clone(),
        PickleValue::Instance(instance) => instance_text(instance, false),
        other => repr(other),
    }
}

fn type_name(value: &PickleValue) -> &str {
    match value {
        PickleValue::None => "NoneType",
        PickleValue::Bool(_) => "bool",
        PickleValue::Int(_) | PickleValue::BigInt(_) => "int",
        PickleValue::Float(_) => "float",
        PickleValue::Str(_) => "str",
        PickleValue::Bytes(_) => "bytes",
        PickleValue::List(_) => "list",
        PickleValue::Tuple(_) => "tuple",
        PickleValue::Set(_) => "set",
        PickleValue::FrozenSet(_) => "frozenset",
        PickleValue::Dict(_) => "dict",
        PickleValue::Global { .. } => "type",
        PickleValue::Instance(instance) => class_of(instance).map_or("object", |(_, name)| name),
        PickleValue::Persistent(_) => "persistent",
    }
}

/// Python `repr()` of a pickle value.
pub fn repr(value: &PickleValue) -> String {
    match value {
        PickleValue::None => "None".to_string(),
        PickleValue::Bool(true) => "True".to_string(),
        PickleValue::Bool(false) => "False".to_string(),
        PickleValue::Int(v) => v.to_string(),
        PickleValue::BigInt(digits) => digits.clone(),
        PickleValue::Float(v) => float_text(*v),
        PickleValue::Bytes(b) => bytes_repr(b),
        PickleValue::Str(s) => str_repr(s),
        PickleValue::List(items) => format!("[{}]", join(items.iter().map(repr))),
        PickleValue::Tuple(items) if items.len() == 1 => format!("({},)", repr(&items[0])),
        PickleValue::Tuple(items) => format!("({})", join(items.iter().map(repr))),
        PickleValue::Set(items) if items.is_empty() => "set()".to_string(),
        PickleValue::Set(items) => format!("{{{}}}", join(items.iter().map(repr))),
        PickleValue::FrozenSet(items) if items.is_empty() => "frozenset()".to_string(),
        PickleValue::FrozenSet(items) => {
            format!("frozenset({{{}}})", join(items.iter().map(repr)))
        }
        PickleValue::Dict(entries) => format!(
            "{{{}}}",
            join(
                entries
                    .iter()
                    .map(|(k, v)| format!("{}: {}", repr(k), repr(v)))
            )
        ),
        PickleValue::Global { module, name } => format!("<class '{}.{}'>", module, name),
        PickleValue::Instance(instance) => instance_text(instance, true),
        PickleValue::Persistent(id) => format!("<persistent {}>", repr(id)),
    }
}

// Callables that allocate an instance of their first argument.
fn is_reconstructor(callable: &PickleValue) -> bool {
    matches!(
        callable.as_global(),
        Some(("copyreg" | "copy_reg", "_reconstructor"))
            | Some(("numpy.core.multiarray" | "numpy._core.multiarray", "_reconstruct"))
    )
}

/// `(module, name)` of the class an instance belongs to.
fn class_of(instance: &Instance) -> Option<(&str, &str)> {
    if is_reconstructor(&instance.callable) {
        instance.args.first().and_then(PickleValue::as_global)
    } else {
        instance.class()
    }
}

/// `str()` (or `repr()` when `as_repr`) of an object rebuilt from a class.
///
/// Standard library value types render as Python prints them; anything else
/// as `<module.Class object>`, or `module.Class(args)` when it was built
/// from constructor arguments.
fn instance_text(instance: &Instance, as_repr: bool) -> String {
    let Some((module, name)) = class_of(instance) else {
        return "<object>".to_string();
    };
    let known = match (module, name, instance.args.as_slice()) {
        ("datetime", _, args) => datetime_text(name, args, as_repr),
        ("decimal", "Decimal", [PickleValue::Str(s)]) => Some(if as_repr {
            format!("Decimal('{}')", s)
        } else {
            s.clone()
        }),
        _ => None,
    };
    known.unwrap_or_else(|| {
        if is_reconstructor(&instance.callable) || instance.args.is_empty() {
            format!("<{}.{} object>", module, name)
        } else {
            format!(
                "{}.{}({})",
                module,
                name,
                join(instance.args.iter().map(repr))
            )
        }
    })
}

// date, datetime and time pickle their fields packed into bytes;
// timedelta pickles (days, seconds, microseconds).
fn datetime_text(name: &str, args: &[PickleValue], as_repr: bool) -> Option<String> {
    let micros = |b: &[u8]| u32::from(b[0]) << 16 | u32::from(b[1]) << 8 | u32::from(b[2]);
    let fraction = |us: u32| if us == 0 { String::new() } else { format!(".{:06}", us) };

    match (name, args) {
        ("date", [PickleValue::Bytes(b), ..]) if b.len() == 4 => {
            let (year, month, day) = (u16::from_be_bytes([b[0], b[1]]), b[2], b[3]);
            Some(if as_repr {
                format!("datetime.date({}, {}, {})", year, month, day)
            } else {
                format!("{:04}-{:02}-{:02}", year, month, day)
            })
        }
        ("datetime", [PickleValue::Bytes(b), ..]) if b.len() == 10 => {
            let year = u16::from_be_bytes([b[0], b[1]]);
            let (month, day, hour, minute, second) = (b[2] & 0x7f, b[3], b[4], b[5], b[6]);
            let us = micros(&b[7..10]);
            Some(if as_repr {
                let mut fields: Vec<u32> =
                    vec![year.into(), month.into(), day.into(), hour.into(), minute.into()];
                push_time_tail(&mut fields, second, us);
                format!("datetime.datetime({})", join(fields.iter().map(u32::to_string)))
            } else {
                format!(
                    "{:04}-{:02}-{:02} {:02}:{:02}:{:02}{}",
                    year,
                    month,
                    day,
                    hour,
                    minute,
                    second,
                    fraction(us)
                )
            })
        }
        ("time", [PickleValue::Bytes(b), ..]) if b.len() == 6 => {
            let (hour, minute, second) = (b[0] & 0x7f, b[1], b[2]);
            let us = micros(&b[3..6]);
            Some(if as_repr {
                let mut fields: Vec<u32> = vec![hour.into(), minute.into()];
                push_time_tail(&mut fields, second, us);
                format!("datetime.time({})", join(fields.iter().map(u32::to_string)))
            } else {
                format!("{:02}:{:02}:{:02}{}", hour, minute, second, fraction(us))
            })
        }
        (
            "timedelta",
            [PickleValue::Int(days), PickleValue::Int(seconds), PickleValue::Int(us)],
        ) => Some(if as_repr {
            let parts: Vec<String> = [("days", days), ("seconds", seconds), ("microseconds", us)]
                .into_iter()
                .filter(|(_, v)| **v != 0)
                .map(|(label, v)| format!("{}={}", label, v))
                .collect();
            if parts.is_empty() {
                "datetime.timedelta(0)".to_string()
            } else {
                format!("datetime.timedelta({})", parts.join(", "))
            }
        } else {
            let (hours, rest) = (seconds / 3600, seconds % 3600);
            let mut text = format!("{}:{:02}:{:02}", hours, rest / 60, rest % 60);
            if *days != 0 {
                let plural = if days.abs() == 1 { "" } else { "s" };
                text = format!("{} day{}, {}", days, plural, text);
            }
            if *us != 0 {
                text.push_str(&format!(".{:06}", us));
            }
            text
        }),
        _ => None,
    }
}

// Seconds and microseconds only appear in a time repr when non-zero.
fn push_time_tail(fields: &mut Vec<u32>, second: u8, us: u32) {
    if second != 0 || us != 0 {
        fields.push(second.into());
    }
    if us != 0 {
        fields.push(us);
    }
}

fn join(parts: impl Iterator<Item = String>) -> String {
    parts.collect::<Vec<_>>().join(", ")
}

fn str_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}
