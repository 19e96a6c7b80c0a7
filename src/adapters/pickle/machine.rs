use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PickleError {
    #[error("pickle data ended without a STOP opcode")]
    MissingStop,

    #[error("truncated {what} at offset {offset}")]
    Truncated { what: &'static str, offset: usize },

    #[error("unknown opcode 0x{opcode:02x} at offset {offset}")]
    UnknownOpcode { opcode: u8, offset: usize },

    #[error("opcode {name} at offset {offset} is not supported")]
    Unsupported { name: &'static str, offset: usize },

    #[error("stack underflow at offset {0}")]
    StackUnderflow(usize),

    #[error("no MARK on the stack at offset {0}")]
    MissingMark(usize),

    #[error("memo key {key} is not defined (offset {offset})")]
    MissingMemo { key: u32, offset: usize },

    #[error("invalid {what} at offset {offset}")]
    Invalid { what: &'static str, offset: usize },
}

/// A value as the unpickler builds it, before any Python type rules apply.
///
/// Globals and the objects built from them are kept as data: nothing is
/// imported or called.
#[derive(Debug, Clone, PartialEq)]
pub enum PickleValue {
    None,
    Bool(bool),
    Int(i64),
    /// Decimal text of an integer outside the i64 range.
    BigInt(String),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<PickleValue>),
    Tuple(Vec<PickleValue>),
    Set(Vec<PickleValue>),
    FrozenSet(Vec<PickleValue>),
    Dict(Vec<(PickleValue, PickleValue)>),
    Global { module: String, name: String },
    Instance(Box<Instance>),
    Persistent(Box<PickleValue>),
}

impl PickleValue {
    /// Positional items of a tuple or list argument.
    pub fn items(&self) -> &[PickleValue] {
        match self {
            PickleValue::Tuple(items) | PickleValue::List(items) => items,
            _ => &[],
        }
    }

    pub fn as_global(&self) -> Option<(&str, &str)> {
        match self {
            PickleValue::Global { module, name } => Some((module, name)),
            _ => None,
        }
    }
}

/// The result of REDUCE, NEWOBJ, OBJ or INST on a callable that is not a
/// builtin container.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub callable: PickleValue,
    pub args: Vec<PickleValue>,
    /// Argument of BUILD, if any.
    pub state: Option<PickleValue>,
    pub list_items: Vec<PickleValue>,
    pub dict_items: Vec<(PickleValue, PickleValue)>,
}

impl Instance {
    pub fn class(&self) -> Option<(&str, &str)> {
        self.callable.as_global()
    }
}

pub type PickleResult<T> = std::result::Result<T, PickleError>;

/// Runs the pickle program in `data` and returns the value left by STOP.
pub fn load(data: &[u8]) -> PickleResult<PickleValue> {
    Machine::new(data).run()
}

struct Slot {
    value: PickleValue,
    // Memo key assigned while the value is still on the stack.
    memo: Option<u32>,
}

impl Slot {
    fn new(value: PickleValue) -> Self {
        Self { value, memo: None }
    }
}

struct Machine<'a> {
    data: &'a [u8],
    pos: usize,
    op_offset: usize,
    stack: Vec<Slot>,
    metastack: Vec<Vec<Slot>>,
    // Values are copied in when they leave the stack, after APPENDS, SETITEMS
    // and BUILD have filled them in.
    memo: HashMap<u32, PickleValue>,
    memo_keys: HashSet<u32>,
}

impl<'a> Machine<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            op_offset: 0,
            stack: Vec::new(),
            metastack: Vec::new(),
            memo: HashMap::new(),
            memo_keys: HashSet::new(),
        }
    }

    fn run(mut self) -> PickleResult<PickleValue> {
        loop {
            self.op_offset = self.pos;
            let Some(&opcode) = self.data.get(self.pos) else {
                return Err(PickleError::MissingStop);
            };
            self.pos += 1;

            match opcode {
                // PROTO
                0x80 => {
                    self.read_bytes(1, "protocol")?;
                }
                // FRAME
                0x95 => {
                    self.read_bytes(8, "frame length")?;
                }
                // STOP
                b'.' => return self.pop(),
                // MARK
                b'(' => {
                    let outer = std::mem::take(&mut self.stack);
                    self.metastack.push(outer);
                }
                // POP
                b'0' => {
                    if self.stack.is_empty() {
                        self.pop_mark()?;
                    } else {
                        self.pop()?;
                    }
                }
                // POP_MARK
                b'1' => {
                    self.pop_mark()?;
                }
                // DUP
                b'2' => {
                    let top = self.top_mut()?.clone();
                    self.push(top);
                }

                b'N' => self.push(PickleValue::None),
                0x88 => self.push(PickleValue::Bool(true)),
                0x89 => self.push(PickleValue::Bool(false)),
                // INT
                b'I' => {
                    let line = self.read_line()?;
                    let value = match line {
                        b"01" => PickleValue::Bool(true),
                        b"00" => PickleValue::Bool(false),
                        _ => self.int_text(line)?,
                    };
                    self.push(value);
                }
                // BININT
                b'J' => {
                    let v = i32::from_le_bytes(self.read_array("BININT")?);
                    self.push(PickleValue::Int(v as i64));
                }
                // BININT1
                b'K' => {
                    let [v] = self.read_array("BININT1")?;
                    self.push(PickleValue::Int(v as i64));
                }
                // BININT2
                b'M' => {
                    let v = u16::from_le_bytes(self.read_array("BININT2")?);
                    self.push(PickleValue::Int(v as i64));
                }
                // LONG
                b'L' => {
                    let line = self.read_line()?;
                    let digits = line.strip_suffix(b"L").unwrap_or(line);
                    let value = self.int_text(digits)?;
                    self.push(value);
                }
                // LONG1
                0x8a => {
                    let [n] = self.read_array("LONG1")?;
                    let bytes = self.read_bytes(n as usize, "LONG1")?;
                    self.push(decode_long(bytes));
                }
                // LONG4
                0x8b => {
                    let n = self.read_len_i32("LONG4")?;
                    let bytes = self.read_bytes(n, "LONG4")?;
                    self.push(decode_long(bytes));
                }
                // FLOAT
                b'F' => {
                    let line = self.read_line()?;
                    let v = std::str::from_utf8(line)
                        .ok()
                        .and_then(|s| s.trim().parse::<f64>().ok())
                        .ok_or_else(|| self.invalid("FLOAT literal"))?;
                    self.push(PickleValue::Float(v));
                }
                // BINFLOAT
                b'G' => {
                    let v = f64::from_be_bytes(self.read_array("BINFLOAT")?);
                    self.push(PickleValue::Float(v));
                }

                // STRING
                b'S' => {
                    let line = self.read_line()?;
                    let bytes = unquote(line).ok_or_else(|| self.invalid("STRING literal"))?;
                    self.push(PickleValue::Str(legacy_text(bytes)));
                }
                // BINSTRING
                b'T' => {
                    let n = self.read_len_i32("BINSTRING")?;
                    let bytes = self.read_bytes(n, "BINSTRING")?.to_vec();
                    self.push(PickleValue::Str(legacy_text(bytes)));
                }
                // SHORT_BINSTRING
                b'U' => {
                    let [n] = self.read_array("SHORT_BINSTRING")?;
                    let bytes = self.read_bytes(n as usize, "SHORT_BINSTRING")?.to_vec();
                    self.push(PickleValue::Str(legacy_text(bytes)));
                }
                // UNICODE
                b'V' => {
                    let line = self.read_line()?;
                    let text = raw_unicode_escape(line)
                        .ok_or_else(|| self.invalid("UNICODE literal"))?;
                    self.push(PickleValue::Str(text));
                }
                // BINUNICODE
                b'X' => {
                    let n = u32::from_le_bytes(self.read_array("BINUNICODE")?) as usize;
                    let text = self.read_utf8(n, "BINUNICODE")?;
                    self.push(PickleValue::Str(text));
                }
                // SHORT_BINUNICODE
                0x8c => {
                    let [n] = self.read_array("SHORT_BINUNICODE")?;
                    let text = self.read_utf8(n as usize, "SHORT_BINUNICODE")?;
                    self.push(PickleValue::Str(text));
                }
                // BINUNICODE8
                0x8d => {
                    let n = self.read_len_u64("BINUNICODE8")?;
                    let text = self.read_utf8(n, "BINUNICODE8")?;
                    self.push(PickleValue::Str(text));
                }
                // BINBYTES
                b'B' => {
                    let n = u32::from_le_bytes(self.read_array("BINBYTES")?) as usize;
                    let bytes = self.read_bytes(n, "BINBYTES")?.to_vec();
                    self.push(PickleValue::Bytes(bytes));
                }
                // SHORT_BINBYTES
                b'C' => {
                    let [n] = self.read_array("SHORT_BINBYTES")?;
                    let bytes = self.read_bytes(n as usize, "SHORT_BINBYTES")?.to_vec();
                    self.push(PickleValue::Bytes(bytes));
                }
                // BINBYTES8, BYTEARRAY8
                0x8e | 0x96 => {
                    let n = self.read_len_u64("BINBYTES8")?;
                    let bytes = self.read_bytes(n, "BINBYTES8")?.to_vec();
                    self.push(PickleValue::Bytes(bytes));
                }

                b')' => self.push(PickleValue::Tuple(Vec::new())),
                b't' => {
                    let items = self.pop_mark()?;
                    self.push(PickleValue::Tuple(items));
                }
                0x85 => {
                    let a = self.pop()?;
                    self.push(PickleValue::Tuple(vec![a]));
                }
                0x86 => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.push(PickleValue::Tuple(vec![a, b]));
                }
                0x87 => {
                    let c = self.pop()?;
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.push(PickleValue::Tuple(vec![a, b, c]));
                }
                b']' => self.push(PickleValue::List(Vec::new())),
                b'l' => {
                    let items = self.pop_mark()?;
                    self.push(PickleValue::List(items));
                }
                b'}' => self.push(PickleValue::Dict(Vec::new())),
                b'd' => {
                    let items = self.pop_mark()?;
                    let pairs = self.pairs(items)?;
                    self.push(PickleValue::Dict(pairs));
                }
                0x8f => self.push(PickleValue::Set(Vec::new())),
                0x91 => {
                    let items = self.pop_mark()?;
                    self.push(PickleValue::FrozenSet(items));
                }
                // ADDITEMS
                0x90 => {
                    let items = self.pop_mark()?;
                    self.extend_top(items)?;
                }
                // APPEND
                b'a' => {
                    let item = self.pop()?;
                    self.extend_top(vec![item])?;
                }
                // APPENDS
                b'e' => {
                    let items = self.pop_mark()?;
                    self.extend_top(items)?;
                }
                // SETITEM
                b's' => {
                    let value = self.pop()?;
                    let key = self.pop()?;
                    self.set_items_top(vec![(key, value)])?;
                }
                // SETITEMS
                b'u' => {
                    let items = self.pop_mark()?;
                    let pairs = self.pairs(items)?;
                    self.set_items_top(pairs)?;
                }

                // GLOBAL
                b'c' => {
                    let module = self.read_text_line("GLOBAL module")?;
                    let name = self.read_text_line("GLOBAL name")?;
                    self.push(PickleValue::Global { module, name });
                }
                // STACK_GLOBAL
                0x93 => {
                    let name = self.pop()?;
                    let module = self.pop()?;
                    match (module, name) {
                        (PickleValue::Str(module), PickleValue::Str(name)) => {
                            self.push(PickleValue::Global { module, name })
                        }
                        _ => return Err(self.invalid("STACK_GLOBAL operands")),
                    }
                }
                // REDUCE, NEWOBJ
                b'R' | 0x81 => {
                    let args = self.pop()?;
                    let callable = self.pop()?;
                    self.push(reduce(callable, args));
                }
                // NEWOBJ_EX
                0x92 => {
                    let _kwargs = self.pop()?;
                    let args = self.pop()?;
                    let cls = self.pop()?;
                    self.push(reduce(cls, args));
                }
                // OBJ
                b'o' => {
                    let mut items = self.pop_mark()?.into_iter();
                    let cls = items.next().ok_or(PickleError::StackUnderflow(self.op_offset))?;
                    self.push(reduce(cls, PickleValue::Tuple(items.collect())));
                }
                // INST
                b'i' => {
                    let module = self.read_text_line("INST module")?;
                    let name = self.read_text_line("INST name")?;
                    let args = self.pop_mark()?;
                    self.push(reduce(
                        PickleValue::Global { module, name },
                        PickleValue::Tuple(args),
                    ));
                }
                // BUILD
                b'b' => {
                    let state = self.pop()?;
                    self.build_top(state)?;
                }

                // PUT
                b'p' => {
                    let line = self.read_line()?;
                    let key = self.memo_key(line)?;
                    self.put(key)?;
                }
                // BINPUT
                b'q' => {
                    let [key] = self.read_array("BINPUT")?;
                    self.put(key as u32)?;
                }
                // LONG_BINPUT
                b'r' => {
                    let key = u32::from_le_bytes(self.read_array("LONG_BINPUT")?);
                    self.put(key)?;
                }
                // MEMOIZE
                0x94 => {
                    let key = self.memo_keys.len() as u32;
                    self.put(key)?;
                }
                // GET
                b'g' => {
                    let line = self.read_line()?;
                    let key = self.memo_key(line)?;
                    self.get(key)?;
                }
                // BINGET
                b'h' => {
                    let [key] = self.read_array("BINGET")?;
                    self.get(key as u32)?;
                }
                // LONG_BINGET
                b'j' => {
                    let key = u32::from_le_bytes(self.read_array("LONG_BINGET")?);
                    self.get(key)?;
                }

                // PERSID
                b'P' => {
                    let id = self.read_text_line("PERSID")?;
                    self.push(PickleValue::Persistent(Box::new(PickleValue::Str(id))));
                }
                // BINPERSID
                b'Q' => {
                    let id = self.pop()?;
                    self.push(PickleValue::Persistent(Box::new(id)));
                }
                // READONLY_BUFFER
                0x98 => {
                    self.top_mut()?;
                }
                0x82..=0x84 => return Err(self.unsupported("EXT")),
                0x97 => return Err(self.unsupported("NEXT_BUFFER")),
                other => {
                    return Err(PickleError::UnknownOpcode {
                        opcode: other,
                        offset: self.op_offset,
                    })
                }
            }
        }
    }

    fn push(&mut self, value: PickleValue) {
        self.stack.push(Slot::new(value));
    }

    fn pop(&mut self) -> PickleResult<PickleValue> {
        let slot = self
            .stack
            .pop()
            .ok_or(PickleError::StackUnderflow(self.op_offset))?;
        Ok(self.retire(slot))
    }

    fn pop_mark(&mut self) -> PickleResult<Vec<PickleValue>> {
        let outer = self
            .metastack
            .pop()
            .ok_or(PickleError::MissingMark(self.op_offset))?;
        let slots = std::mem::replace(&mut self.stack, outer);
        Ok(slots.into_iter().map(|slot| self.retire(slot)).collect())
    }

    // A value leaving the stack is complete; record it under its memo key.
    fn retire(&mut self, slot: Slot) -> PickleValue {
        if let Some(key) = slot.memo {
            self.memo.insert(key, slot.value.clone());
        }
        slot.value
    }

    fn top_mut(&mut self) -> PickleResult<&mut PickleValue> {
        let offset = self.op_offset;
        self.stack
            .last_mut()
            .map(|slot| &mut slot.value)
            .ok_or(PickleError::StackUnderflow(offset))
    }

    fn put(&mut self, key: u32) -> PickleResult<()> {
        let offset = self.op_offset;
        let slot = self
            .stack
            .last_mut()
            .ok_or(PickleError::StackUnderflow(offset))?;
        if let Some(previous) = slot.memo.replace(key) {
            self.memo.insert(previous, slot.value.clone());
        }
        self.memo.remove(&key);
        self.memo_keys.insert(key);
        Ok(())
    }

    fn get(&mut self, key: u32) -> PickleResult<()> {
        let value = match self.memo.get(&key) {
            Some(value) => value.clone(),
            None => self
                .stack
                .iter()
                .chain(self.metastack.iter().flatten())
                .find(|slot| slot.memo == Some(key))
                .map(|slot| slot.value.clone())
                .ok_or(PickleError::MissingMemo {
                    key,
                    offset: self.op_offset,
                })?,
        };
        self.push(value);
        Ok(())
    }

    fn extend_top(&mut self, items: Vec<PickleValue>) -> PickleResult<()> {
        let offset = self.op_offset;
        match self.top_mut()? {
            PickleValue::List(list) | PickleValue::Set(list) => list.extend(items),
            PickleValue::Instance(instance) => instance.list_items.extend(items),
            _ => {
                return Err(PickleError::Invalid {
                    what: "append target",
                    offset,
                })
            }
        }
        Ok(())
    }

    fn set_items_top(&mut self, pairs: Vec<(PickleValue, PickleValue)>) -> PickleResult<()> {
        let offset = self.op_offset;
        match self.top_mut()? {
            PickleValue::Dict(entries) => entries.extend(pairs),
            PickleValue::Instance(instance) => instance.dict_items.extend(pairs),
            _ => {
                return Err(PickleError::Invalid {
                    what: "setitem target",
                    offset,
                })
            }
        }
        Ok(())
    }

    fn build_top(&mut self, state: PickleValue) -> PickleResult<()> {
        match self.top_mut()? {
            PickleValue::Instance(instance) => instance.state = Some(state),
            PickleValue::Dict(entries) => {
                if let PickleValue::Dict(extra) = state {
                    entries.extend(extra);
                }
            }
            // Other builtins have no settable state.
            _ => {}
        }
        Ok(())
    }

    fn pairs(&self, items: Vec<PickleValue>) -> PickleResult<Vec<(PickleValue, PickleValue)>> {
        if items.len() % 2 != 0 {
            return Err(self.invalid("odd number of dict items"));
        }
        let mut pairs = Vec::with_capacity(items.len() / 2);
        let mut iter = items.into_iter();
        while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
            pairs.push((key, value));
        }
        Ok(pairs)
    }

    fn read_bytes(&mut self, n: usize, what: &'static str) -> PickleResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or(PickleError::Truncated {
                what,
                offset: self.op_offset,
            })?;
        let data = self.data;
        let bytes = &data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self, what: &'static str) -> PickleResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N, what)?);
        Ok(out)
    }

    fn read_len_i32(&mut self, what: &'static str) -> PickleResult<usize> {
        let n = i32::from_le_bytes(self.read_array(what)?);
        usize::try_from(n).map_err(|_| self.invalid("negative length"))
    }

    fn read_len_u64(&mut self, what: &'static str) -> PickleResult<usize> {
        let n = u64::from_le_bytes(self.read_array(what)?);
        usize::try_from(n).map_err(|_| self.invalid("length"))
    }

    fn read_utf8(&mut self, n: usize, what: &'static str) -> PickleResult<String> {
        let bytes = self.read_bytes(n, what)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| self.invalid("UTF-8 text"))
    }

    fn read_line(&mut self) -> PickleResult<&'a [u8]> {
        let data = self.data;
        let rest = &data[self.pos..];
        let len = rest
            .iter()
            .position(|&b| b == b'\n')
            .ok_or(PickleError::Truncated {
                what: "line",
                offset: self.op_offset,
            })?;
        self.pos += len + 1;
        let line = &rest[..len];
        Ok(line.strip_suffix(b"\r").unwrap_or(line))
    }

    fn read_text_line(&mut self, what: &'static str) -> PickleResult<String> {
        let line = self.read_line()?;
        std::str::from_utf8(line)
            .map(str::to_string)
            .map_err(|_| self.invalid(what))
    }

    fn int_text(&self, text: &[u8]) -> PickleResult<PickleValue> {
        let text = std::str::from_utf8(text)
            .map(str::trim)
            .map_err(|_| self.invalid("integer literal"))?;
        if let Ok(v) = text.parse::<i64>() {
            return Ok(PickleValue::Int(v));
        }
        let digits = text.strip_prefix(&['-', '+'][..]).unwrap_or(text);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(self.invalid("integer literal"));
        }
        let sign = if text.starts_with('-') { "-" } else { "" };
        Ok(PickleValue::BigInt(format!("{sign}{digits}")))
    }

    fn memo_key(&self, line: &[u8]) -> PickleResult<u32> {
        std::str::from_utf8(line)
            .ok()
            .and_then(|s| s.trim().parse::<u32>().ok())
            .ok_or_else(|| self.invalid("memo key"))
    }

    fn invalid(&self, what: &'static str) -> PickleError {
        PickleError::Invalid {
            what,
            offset: self.op_offset,
        }
    }

    fn unsupported(&self, name: &'static str) -> PickleError {
        PickleError::Unsupported {
            name,
            offset: self.op_offset,
        }
    }
}

const BUILTIN_MODULES: [&str; 2] = ["builtins", "__builtin__"];

/// Applies `callable` to `args`. Builtin containers are rebuilt directly;
/// every other callable yields an [`Instance`] describing the call.
fn reduce(callable: PickleValue, args: PickleValue) -> PickleValue {
    if let Some((module, name)) = callable.as_global() {
        let items = args.items();
        let first = items.first();
        let contents = || first.map(|v| v.items().to_vec()).unwrap_or_default();
        if BUILTIN_MODULES.contains(&module) {
            match name {
                "set" => return PickleValue::Set(contents()),
                "frozenset" => return PickleValue::FrozenSet(contents()),
                "list" => return PickleValue::List(contents()),
                "tuple" => return PickleValue::Tuple(contents()),
                "dict" if items.is_empty() => return PickleValue::Dict(Vec::new()),
                "bytes" | "bytearray" => {
                    if let Some(bytes) = bytes_argument(items) {
                        return PickleValue::Bytes(bytes);
                    }
                }
                _ => {}
            }
        }
        match (module, name) {
            // bytes pickled at protocol 2 and below
            ("_codecs", "encode") => {
                if let Some(bytes) = bytes_argument(items) {
                    return PickleValue::Bytes(bytes);
                }
            }
            // dict subclasses; their items follow as SETITEMS
            ("collections", "OrderedDict") | ("collections", "defaultdict") => {
                return PickleValue::Dict(Vec::new())
            }
            ("collections", "Counter") => match first {
                Some(PickleValue::Dict(entries)) => return PickleValue::Dict(entries.clone()),
                None => return PickleValue::Dict(Vec::new()),
                _ => {}
            },
            _ => {}
        }
    }

    PickleValue::Instance(Box::new(Instance {
        callable,
        args: args.items().to_vec(),
        state: None,
        list_items: Vec::new(),
        dict_items: Vec::new(),
    }))
}

// `bytes()`, `bytes(b"..")`, `bytearray([..])` or `encode(text, "latin1")`.
fn bytes_argument(args: &[PickleValue]) -> Option<Vec<u8>> {
    match args {
        [] => Some(Vec::new()),
        [PickleValue::Bytes(bytes)] => Some(bytes.clone()),
        [PickleValue::List(ints)] => ints
            .iter()
            .map(|v| match v {
                PickleValue::Int(i) => u8::try_from(*i).ok(),
                _ => None,
            })
            .collect(),
        [PickleValue::Str(text), PickleValue::Str(encoding)] => {
            match encoding.to_ascii_lowercase().replace('_', "-").as_str() {
                "latin1" | "latin-1" | "iso-8859-1" => {
                    text.chars().map(|c| u8::try_from(c as u32).ok()).collect()
                }
                "utf8" | "utf-8" | "ascii" => Some(text.as_bytes().to_vec()),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Little-endian two's complement integer of any width.
fn decode_long(bytes: &[u8]) -> PickleValue {
    if bytes.is_empty() {
        return PickleValue::Int(0);
    }
    let negative = bytes[bytes.len() - 1] & 0x80 != 0;
    if bytes.len() <= 8 {
        let fill = if negative { 0xff } else { 0x00 };
        let mut buf = [fill; 8];
        buf[..bytes.len()].copy_from_slice(bytes);
        return PickleValue::Int(i64::from_le_bytes(buf));
    }

    // Magnitude in little-endian base 256, then repeated division by 10.
    let mut magnitude = bytes.to_vec();
    if negative {
        let mut carry = 1u16;
        for b in magnitude.iter_mut() {
            let v = (!*b) as u16 + carry;
            *b = v as u8;
            carry = v >> 8;
        }
    }
    let mut digits = Vec::new();
    while magnitude.iter().any(|&b| b != 0) {
        let mut rem = 0u16;
        for b in magnitude.iter_mut().rev() {
            let v = (rem << 8) | *b as u16;
            *b = (v / 10) as u8;
            rem = v % 10;
        }
        digits.push(b'0' + rem as u8);
    }
    if digits.is_empty() {
        digits.push(b'0');
    }
    if negative {
        digits.push(b'-');
    }
    digits.reverse();
    PickleValue::BigInt(digits.into_iter().map(char::from).collect())
}

// Python 2 `str` data: UTF-8 when valid, otherwise one char per byte.
fn legacy_text(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes)
        .unwrap_or_else(|e| e.into_bytes().into_iter().map(char::from).collect())
}

/// Strips the quotes and escapes of a protocol 0 STRING literal.
fn unquote(line: &[u8]) -> Option<Vec<u8>> {
    let quote = *line.first()?;
    if !(quote == b'\'' || quote == b'"') || line.len() < 2 || line[line.len() - 1] != quote {
        return None;
    }
    let body = &line[1..line.len() - 1];
    let mut out = Vec::with_capacity(body.len());
    let mut i = 0;
    while i < body.len() {
        let b = body[i];
        i += 1;
        if b != b'\\' {
            out.push(b);
            continue;
        }
        let esc = *body.get(i)?;
        i += 1;
        match esc {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'v' => out.push(0x0b),
            b'x' => {
                let hex = std::str::from_utf8(body.get(i..i + 2)?).ok()?;
                out.push(u8::from_str_radix(hex, 16).ok()?);
                i += 2;
            }
            b'0'..=b'7' => {
                let mut v = (esc - b'0') as u32;
                for _ in 0..2 {
                    match body.get(i) {
                        Some(d @ b'0'..=b'7') => {
                            v = v * 8 + (d - b'0') as u32;
                            i += 1;
                        }
                        _ => break,
                    }
                }
                out.push(u8::try_from(v).ok()?);
            }
            other => out.push(other),
        }
    }
    Some(out)
}

/// Decodes `raw-unicode-escape` text: only `\uXXXX` and `\UXXXXXXXX` are
/// escapes, every other byte is a Latin-1 character.
fn raw_unicode_escape(line: &[u8]) -> Option<String> {
    let mut out = String::with_capacity(line.len());
    let mut i = 0;
    while i < line.len() {
        let b = line[i];
        let width = match (b, line.get(i + 1)) {
            (b'\\', Some(b'u')) => 4,
            (b'\\', Some(b'U')) => 8,
            _ => 0,
        };
        if width == 0 {
            out.push(char::from(b));
            i += 1;
            continue;
        }
        let hex = std::str::from_utf8(line.get(i + 2..i + 2 + width)?).ok()?;
        out.push(char::from_u32(u32::from_str_radix(hex, 16).ok()?)?);
        i += 2 + width;
    }
    Some(out)
}
