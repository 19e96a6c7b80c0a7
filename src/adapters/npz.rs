use crate::domain::array::{element_count, ArrayData, NdArray};
use crate::domain::model::Dataset;
use crate::domain::ports::ContainerWriter;
use crate::utils::error::{ConvertError, Result};
use regex::Regex;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::OnceLock;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const NPZ_EXTENSION: &str = "npz";

const NPY_MAGIC: &[u8; 6] = b"\x93NUMPY";
const NPY_SUFFIX: &str = ".npy";
const HEADER_ALIGN: usize = 64;
const MAX_PREALLOC: u64 = 1 << 24;

/// Writes datasets as a NumPy `.npz` archive, one Deflate-compressed
/// `<name>.npy` member per dataset.
#[derive(Debug, Clone, Default)]
pub struct NpzWriter;

impl NpzWriter {
    pub fn new() -> Self {
        Self
    }
}

impl ContainerWriter for NpzWriter {
    fn extension(&self) -> &str {
        NPZ_EXTENSION
    }

    fn write(&self, datasets: &[Dataset], destination: &Path) -> Result<()> {
        let file = File::create(destination)?;
        let mut zip = ZipWriter::new(file);

        for dataset in datasets {
            let member = encode_npy(&dataset.array);
            tracing::debug!(
                dataset = %dataset.name,
                bytes = member.len(),
                "adding npz member"
            );
            let options = SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .large_file(member.len() as u64 >= u64::from(u32::MAX));
            zip.start_file(format!("{}{}", dataset.name, NPY_SUFFIX), options)?;
            zip.write_all(&member)?;
        }

        zip.finish()?;
        Ok(())
    }
}

fn descr(data: &ArrayData) -> String {
    match data {
        ArrayData::Bool(_) => "|b1".to_string(),
        ArrayData::Int(_) => "<i8".to_string(),
        ArrayData::Float(_) => "<f8".to_string(),
        ArrayData::Str(values) => format!("<U{}", str_width(values)),
        ArrayData::Bytes(values) => format!("|S{}", bytes_width(values)),
    }
}

// numpy never emits a zero-width string dtype.
fn str_width(values: &[String]) -> usize {
    values.iter().map(|s| s.chars().count()).max().unwrap_or(0).max(1)
}

fn bytes_width(values: &[Vec<u8>]) -> usize {
    values.iter().map(Vec::len).max().unwrap_or(0).max(1)
}

fn shape_text(shape: &[usize]) -> String {
    match shape {
        [] => "()".to_string(),
        [n] => format!("({},)", n),
        dims => format!(
            "({})",
            dims.iter()
                .map(usize::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

/// Serializes one array in the `.npy` format (C order, little endian).
pub fn encode_npy(array: &NdArray) -> Vec<u8> {
    let dict = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': {}, }}",
        descr(array.data()),
        shape_text(array.shape())
    );

    // Version 1.0 stores the header length in a u16; 2.0 widens it to u32.
    let (version, preamble) = if padded_len(&dict, 10) <= usize::from(u16::MAX) {
        (1u8, 10)
    } else {
        (2u8, 12)
    };
    let header_len = padded_len(&dict, preamble);

    let mut out = Vec::with_capacity(preamble + header_len + array.len() * 8);
    out.extend_from_slice(NPY_MAGIC);
    out.extend_from_slice(&[version, 0]);
    if version == 1 {
        out.extend_from_slice(&(header_len as u16).to_le_bytes());
    } else {
        out.extend_from_slice(&(header_len as u32).to_le_bytes());
    }
    out.extend_from_slice(dict.as_bytes());
    out.resize(preamble + header_len - 1, b' ');
    out.push(b'\n');

    match array.data() {
        ArrayData::Bool(values) => out.extend(values.iter().map(|&b| u8::from(b))),
        ArrayData::Int(values) => {
            for v in values {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        ArrayData::Float(values) => {
            for v in values {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        ArrayData::Str(values) => {
            let width = str_width(values);
            for s in values {
                let mut written = 0;
                for c in s.chars() {
                    out.extend_from_slice(&u32::from(c).to_le_bytes());
                    written += 1;
                }
                out.resize(out.len() + (width - written) * 4, 0);
            }
        }
        ArrayData::Bytes(values) => {
            let width = bytes_width(values);
            for b in values {
                out.extend_from_slice(b);
                out.resize(out.len() + (width - b.len()), 0);
            }
        }
    }
    out
}

// Header length (dict + padding + newline) so that preamble + header is
// a multiple of HEADER_ALIGN.
fn padded_len(dict: &str, preamble: usize) -> usize {
    let unpadded = preamble + dict.len() + 1;
    let pad = (HEADER_ALIGN - unpadded % HEADER_ALIGN) % HEADER_ALIGN;
    dict.len() + pad + 1
}

fn descr_re() -> &'static Regex {
    static DESCR_RE: OnceLock<Regex> = OnceLock::new();
    DESCR_RE.get_or_init(|| Regex::new(r"'descr'\s*:\s*'([^']+)'").expect("valid descr regex"))
}

fn fortran_re() -> &'static Regex {
    static FORTRAN_RE: OnceLock<Regex> = OnceLock::new();
    FORTRAN_RE.get_or_init(|| {
        Regex::new(r"'fortran_order'\s*:\s*(True|False)").expect("valid fortran_order regex")
    })
}

fn shape_re() -> &'static Regex {
    static SHAPE_RE: OnceLock<Regex> = OnceLock::new();
    SHAPE_RE.get_or_init(|| Regex::new(r"'shape'\s*:\s*\(([^)]*)\)").expect("valid shape regex"))
}

fn malformed(member: &str, reason: impl Into<String>) -> ConvertError {
    ConvertError::FormatError {
        member: member.to_string(),
        reason: reason.into(),
    }
}

/// Parses one `.npy` member written by [`encode_npy`] (or by numpy, for the
/// dtypes listed there).
pub fn decode_npy(member: &str, bytes: &[u8]) -> Result<NdArray> {
    if bytes.len() < 10 || &bytes[..6] != NPY_MAGIC {
        return Err(malformed(member, "missing NPY magic"));
    }
    let (header_len, preamble) = match bytes[6] {
        1 => (usize::from(u16::from_le_bytes([bytes[8], bytes[9]])), 10),
        2 | 3 if bytes.len() >= 12 => (
            u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize,
            12,
        ),
        v => return Err(malformed(member, format!("unsupported NPY version {}", v))),
    };
    let body_start = preamble + header_len;
    let header = bytes
        .get(preamble..body_start)
        .and_then(|h| std::str::from_utf8(h).ok())
        .ok_or_else(|| malformed(member, "truncated header"))?;

    let descr = descr_re()
        .captures(header)
        .map(|c| c[1].to_string())
        .ok_or_else(|| malformed(member, "header has no descr"))?;
    if fortran_re()
        .captures(header)
        .is_some_and(|c| &c[1] == "True")
    {
        return Err(malformed(member, "fortran order is not supported"));
    }
    let shape = shape_re()
        .captures(header)
        .ok_or_else(|| malformed(member, "header has no shape"))?[1]
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(|d| {
            d.parse::<usize>()
                .map_err(|_| malformed(member, format!("bad dimension '{}'", d)))
        })
        .collect::<Result<Vec<_>>>()?;

    let body = &bytes[body_start..];
    let (item_size, kind) = parse_descr(member, &descr)?;
    let (count, needed) = element_count(&shape)
        .and_then(|count| Some((count, count.checked_mul(item_size)?)))
        .ok_or_else(|| malformed(member, format!("shape {:?} is too large", shape)))?;
    if body.len() < needed {
        return Err(malformed(
            member,
            format!("expected {} data bytes, found {}", needed, body.len()),
        ));
    }
    let items = body.chunks_exact(item_size.max(1)).take(count);

    let data = match kind {
        'b' => ArrayData::Bool(items.map(|c| c[0] != 0).collect()),
        'i' => ArrayData::Int(
            items
                .map(|c| i64::from_le_bytes(c.try_into().unwrap_or([0; 8])))
                .collect(),
        ),
        'f' => ArrayData::Float(
            items
                .map(|c| f64::from_le_bytes(c.try_into().unwrap_or([0; 8])))
                .collect(),
        ),
        'U' => ArrayData::Str(
            items
                .map(|c| {
                    c.chunks_exact(4)
                        .map(|u| u32::from_le_bytes([u[0], u[1], u[2], u[3]]))
                        .take_while(|&u| u != 0)
                        .filter_map(char::from_u32)
                        .collect::<String>()
                })
                .collect(),
        ),
        _ => ArrayData::Bytes(
            items
                .map(|c| {
                    let end = c.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
                    c[..end].to_vec()
                })
                .collect(),
        ),
    };

    NdArray::new(shape, data).map_err(ConvertError::from)
}

fn parse_descr(member: &str, descr: &str) -> Result<(usize, char)> {
    match descr {
        "|b1" | "b1" => Ok((1, 'b')),
        "<i8" => Ok((8, 'i')),
        "<f8" => Ok((8, 'f')),
        _ => {
            let width = |prefix: &str| {
                descr
                    .strip_prefix(prefix)
                    .and_then(|w| w.parse::<usize>().ok())
            };
            if let Some(w) = width("<U").and_then(|w| w.checked_mul(4)) {
                Ok((w, 'U'))
            } else if let Some(w) = width("|S") {
                Ok((w, 'S'))
            } else {
                Err(malformed(member, format!("unsupported dtype '{}'", descr)))
            }
        }
    }
}

/// Read access to an `.npz` archive.
pub struct NpzReader {
    archive: ZipArchive<File>,
    names: Vec<String>,
}

impl NpzReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut archive = ZipArchive::new(File::open(path)?)?;
        let mut names = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let entry = archive.by_index(i)?;
            let name = entry.name();
            names.push(name.strip_suffix(NPY_SUFFIX).unwrap_or(name).to_string());
        }
        Ok(Self { archive, names })
    }

    /// Dataset names in archive order.
    pub fn dataset_names(&self) -> &[String] {
        &self.names
    }

    pub fn read(&mut self, name: &str) -> Result<NdArray> {
        let member = format!("{}{}", name, NPY_SUFFIX);
        let mut entry = self.archive.by_name(&member)?;
        // The declared size is untrusted; cap the up-front allocation.
        let mut bytes = Vec::with_capacity(entry.size().min(MAX_PREALLOC) as usize);
        entry.read_to_end(&mut bytes)?;
        decode_npy(&member, &bytes)
    }

    pub fn read_all(&mut self) -> Result<Vec<Dataset>> {
        let names = self.names.clone();
        names
            .into_iter()
            .map(|name| {
                let array = self.read(&name)?;
                Ok::<_, ConvertError>(Dataset::new(name, array))
            })
            .collect()
    }
}
