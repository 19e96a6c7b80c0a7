use super::machine::{Instance, PickleValue};
use crate::domain::array::{element_count, ArrayData, NdArray};
use crate::domain::model::{Object, Opaque, Scalar};

const MULTIARRAY_MODULES: [&str; 2] = ["numpy.core.multiarray", "numpy._core.multiarray"];

/// Rebuilds a pickled numpy array or scalar; `None` for anything else.
///
/// Arrays whose dtype has no storable counterpart (object, complex, datetime,
/// structured) come back as text.
pub(super) fn rebuild(instance: &Instance) -> Option<Object> {
    let (module, name) = instance.class()?;
    if !MULTIARRAY_MODULES.contains(&module) {
        return None;
    }
    match name {
        "_reconstruct" => Some(match decode_array(instance) {
            Ok(array) => Object::Array(array),
            Err(reason) => {
                tracing::debug!(%reason, "numpy array kept as text");
                Object::Other(Opaque::new("ndarray", format!("<numpy.ndarray: {}>", reason)))
            }
        }),
        "scalar" => Some(decode_scalar(instance)),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct DType {
    kind: u8,
    size: usize,
    big_endian: bool,
}

impl DType {
    fn descr(&self) -> String {
        let order = if self.big_endian { '>' } else { '<' };
        format!("{}{}{}", order, self.kind as char, self.size)
    }

    // numpy's scalar type name, e.g. int32 or float64.
    fn type_name(&self) -> String {
        match self.kind {
            b'b' => "bool".to_string(),
            b'i' => format!("int{}", self.size * 8),
            b'u' => format!("uint{}", self.size * 8),
            b'f' => format!("float{}", self.size * 8),
            b'S' => "bytes_".to_string(),
            b'U' => "str_".to_string(),
            other => format!("{}{}", other as char, self.size),
        }
    }
}

// `numpy.dtype(code, align, copy)` plus its BUILD state
// `(version, byteorder, subarray, names, fields, elsize, alignment, flags)`.
fn dtype_of(value: &PickleValue) -> Option<DType> {
    let PickleValue::Instance(dtype) = value else {
        return None;
    };
    let (module, name) = dtype.class()?;
    if !(module.starts_with("numpy") && (name == "dtype" || name.ends_with("DType"))) {
        return None;
    }
    let PickleValue::Str(code) = dtype.args.first()? else {
        return None;
    };
    let kind = *code.as_bytes().first()?;
    let mut size: usize = code.get(1..)?.parse().ok()?;

    let state = dtype.state.as_ref().map(PickleValue::items).unwrap_or_default();
    let big_endian = matches!(state.get(1), Some(PickleValue::Str(order)) if order == ">");
    if let (b'S' | b'U' | b'V', Some(PickleValue::Int(elsize))) = (kind, state.get(5)) {
        if let Ok(elsize) = usize::try_from(*elsize) {
            size = elsize;
        }
    }
    Some(DType {
        kind,
        size,
        big_endian,
    })
}

// `_reconstruct(ndarray, (0,), b'b')` followed by BUILD with
// `(version, shape, dtype, is_fortran, rawdata)`.
fn decode_array(instance: &Instance) -> Result<NdArray, String> {
    let state = instance
        .state
        .as_ref()
        .map(PickleValue::items)
        .unwrap_or_default();
    let (shape, dtype, fortran, raw) = match state {
        [_, shape, dtype, fortran, raw] | [shape, dtype, fortran, raw] => {
            (shape, dtype, fortran, raw)
        }
        _ => return Err("array state is missing".to_string()),
    };

    let shape = shape
        .items()
        .iter()
        .map(|dim| match dim {
            PickleValue::Int(n) => usize::try_from(*n).ok(),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()
        .ok_or("shape is not a tuple of sizes")?;
    let dtype = dtype_of(dtype).ok_or("dtype is not recognised")?;
    let PickleValue::Bytes(raw) = raw else {
        return Err(format!("dtype {} holds Python objects", dtype.descr()));
    };
    let count =
        element_count(&shape).ok_or_else(|| format!("shape {:?} is too large", shape))?;

    let data = decode_items(&dtype, raw, count).ok_or_else(|| {
        format!(
            "dtype {} with {} data bytes is not storable",
            dtype.descr(),
            raw.len()
        )
    })?;
    let data = if matches!(fortran, PickleValue::Bool(true)) {
        to_c_order(data, &shape)
    } else {
        data
    };
    tracing::trace!(descr = %dtype.descr(), ?shape, "rebuilt numpy array");
    NdArray::new(shape, data).map_err(|e| e.to_string())
}

// `scalar(dtype, rawbytes)`. float64 subclasses Python float and stays a
// number; other numpy scalars are not int/bool/str instances, so only their
// text survives.
fn decode_scalar(instance: &Instance) -> Object {
    let decoded = match instance.args.as_slice() {
        [dtype, PickleValue::Bytes(raw), ..] => dtype_of(dtype)
            .and_then(|dtype| Some((dtype, decode_items(&dtype, raw, 1)?.get(0)?))),
        _ => None,
    };
    match decoded {
        Some((dtype, Scalar::Float(v))) if dtype.kind == b'f' && dtype.size == 8 => {
            Object::Scalar(Scalar::Float(v))
        }
        Some((dtype @ DType { kind: b'f', .. }, Scalar::Float(v))) => {
            // str() of a narrow float prints its own shortest form
            Object::Other(Opaque::new(dtype.type_name(), format!("{:?}", v as f32)))
        }
        Some((dtype, scalar)) => Object::Other(Opaque::new(dtype.type_name(), scalar.to_text())),
        None => Object::Other(Opaque::new("generic", "<numpy scalar>")),
    }
}

fn decode_items(dtype: &DType, raw: &[u8], count: usize) -> Option<ArrayData> {
    let size = dtype.size;
    if size == 0 {
        return None;
    }
    let raw = raw.get(..count.checked_mul(size)?)?;
    let big = dtype.big_endian;
    let items = raw.chunks_exact(size);

    let data = match (dtype.kind, size) {
        (b'b', 1) => ArrayData::Bool(items.map(|c| c[0] != 0).collect()),
        (b'i', 1 | 2 | 4 | 8) => ArrayData::Int(items.map(|c| signed(c, big)).collect()),
        (b'u', 1 | 2 | 4) => ArrayData::Int(items.map(|c| unsigned(c, big) as i64).collect()),
        (b'u', 8) => ArrayData::Int(
            items
                .map(|c| i64::try_from(unsigned(c, big)).ok())
                .collect::<Option<_>>()?,
        ),
        (b'f', 2) => ArrayData::Float(items.map(|c| half(unsigned(c, big) as u16)).collect()),
        (b'f', 4) => ArrayData::Float(
            items
                .map(|c| f64::from(f32::from_bits(unsigned(c, big) as u32)))
                .collect(),
        ),
        (b'f', 8) => ArrayData::Float(items.map(|c| f64::from_bits(unsigned(c, big))).collect()),
        (b'S', _) => ArrayData::Bytes(
            items
                .map(|c| {
                    let end = c.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
                    c[..end].to_vec()
                })
                .collect(),
        ),
        (b'U', n) if n % 4 == 0 => ArrayData::Str(
            items
                .map(|c| {
                    c.chunks_exact(4)
                        .map(|u| unsigned(u, big) as u32)
                        .take_while(|&u| u != 0)
                        .filter_map(char::from_u32)
                        .collect::<String>()
                })
                .collect(),
        ),
        _ => return None,
    };
    Some(data)
}

fn unsigned(bytes: &[u8], big_endian: bool) -> u64 {
    let push = |acc: u64, b: &u8| (acc << 8) | u64::from(*b);
    if big_endian {
        bytes.iter().fold(0, push)
    } else {
        bytes.iter().rev().fold(0, push)
    }
}

fn signed(bytes: &[u8], big_endian: bool) -> i64 {
    let shift = 64 - 8 * bytes.len() as u32;
    ((unsigned(bytes, big_endian) << shift) as i64) >> shift
}

// IEEE 754 binary16.
fn half(bits: u16) -> f64 {
    let sign = if bits & 0x8000 != 0 { -1.0 } else { 1.0 };
    let exponent = i32::from((bits >> 10) & 0x1f);
    let fraction = f64::from(bits & 0x3ff);
    sign * match exponent {
        0 => fraction * 2f64.powi(-24),
        0x1f if fraction == 0.0 => f64::INFINITY,
        0x1f => f64::NAN,
        e => (1.0 + fraction / 1024.0) * 2f64.powi(e - 15),
    }
}

fn to_c_order(data: ArrayData, shape: &[usize]) -> ArrayData {
    match data {
        ArrayData::Bool(v) => ArrayData::Bool(reorder(v, shape)),
        ArrayData::Int(v) => ArrayData::Int(reorder(v, shape)),
        ArrayData::Float(v) => ArrayData::Float(reorder(v, shape)),
        ArrayData::Str(v) => ArrayData::Str(reorder(v, shape)),
        ArrayData::Bytes(v) => ArrayData::Bytes(reorder(v, shape)),
    }
}

// Column-major items to row-major.
fn reorder<T: Clone>(items: Vec<T>, shape: &[usize]) -> Vec<T> {
    if shape.len() < 2 || items.is_empty() {
        return items;
    }
    let mut strides = Vec::with_capacity(shape.len());
    let mut stride = 1;
    for &dim in shape {
        strides.push(stride);
        stride *= dim;
    }

    let mut index = vec![0usize; shape.len()];
    let mut out = Vec::with_capacity(items.len());
    for _ in 0..items.len() {
        let offset: usize = index.iter().zip(&strides).map(|(i, s)| i * s).sum();
        out.push(items[offset].clone());
        for axis in (0..shape.len()).rev() {
            index[axis] += 1;
            if index[axis] < shape[axis] {
                break;
            }
            index[axis] = 0;
        }
    }
    out
}
