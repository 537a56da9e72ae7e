//! Minimal pickle reader for numpy object arrays.
//!
//! `np.save` on an `object` array writes `pickle.dump(array)` after the `.npy`
//! header. The stream rebuilds the array as
//! `_reconstruct(ndarray, (0,), b'b')` followed by a `BUILD` whose state is
//! `(version, shape, dtype, fortran_order, [items...])`. Only the opcodes those
//! streams use (protocols 2 to 5) are interpreted; globals are recorded by
//! name and never resolved.

use std::collections::HashMap;

use seeker_core::error::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Mark,
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Tuple(Vec<Value>),
    List(Vec<Value>),
    Dict(Vec<(Value, Value)>),
    Global { module: String, name: String },
    Reduce { callable: Box<Value>, args: Box<Value> },
    Build { object: Box<Value>, state: Box<Value> },
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], Error> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| Error::Malformed(format!("pickle truncated at byte {}", self.pos)))?;
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, Error> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, Error> {
        let mut b = [0u8; 8];
        b.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(b))
    }

    fn len_u64(&mut self) -> Result<usize, Error> {
        usize::try_from(self.u64()?).map_err(|_| Error::Malformed("pickle length does not fit in memory".into()))
    }

    fn line(&mut self) -> Result<&'a str, Error> {
        let rest = &self.bytes[self.pos..];
        let nl = rest
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| Error::Malformed("pickle text argument has no newline".into()))?;
        let line = self.take(nl + 1)?;
        std::str::from_utf8(&line[..nl]).map_err(|_| Error::Malformed("pickle text argument is not UTF-8".into()))
    }

    fn utf8(&mut self, n: usize) -> Result<String, Error> {
        let raw = self.take(n)?;
        String::from_utf8(raw.to_vec()).map_err(|_| Error::Malformed("pickled string is not UTF-8".into()))
    }
}

#[derive(Default)]
struct Machine {
    stack: Vec<Value>,
    memo: HashMap<u64, Value>,
}

impl Machine {
    fn pop(&mut self) -> Result<Value, Error> {
        self.stack.pop().ok_or_else(|| Error::Malformed("pickle stack underflow".into()))
    }

    fn top(&mut self) -> Result<&mut Value, Error> {
        self.stack.last_mut().ok_or_else(|| Error::Malformed("pickle stack underflow".into()))
    }

    fn pop_to_mark(&mut self) -> Result<Vec<Value>, Error> {
        let mark = self
            .stack
            .iter()
            .rposition(|v| matches!(v, Value::Mark))
            .ok_or_else(|| Error::Malformed("pickle mark not found".into()))?;
        let items = self.stack.split_off(mark + 1);
        self.stack.pop();
        Ok(items)
    }

    fn pop_n(&mut self, n: usize) -> Result<Vec<Value>, Error> {
        if self.stack.len() < n {
            return Err(Error::Malformed("pickle stack underflow".into()));
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    fn put(&mut self, key: u64) -> Result<(), Error> {
        let top = self.top()?.clone();
        self.memo.insert(key, top);
        Ok(())
    }

    fn get(&mut self, key: u64) -> Result<(), Error> {
        let v = self
            .memo
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::Malformed(format!("pickle memo {key} is empty")))?;
        self.stack.push(v);
        Ok(())
    }

    fn extend_top(&mut self, items: Vec<Value>) -> Result<(), Error> {
        match self.top()? {
            Value::List(list) => {
                list.extend(items);
                Ok(())
            }
            other => Err(Error::Malformed(format!("pickle append to non-list {other:?}"))),
        }
    }

    fn set_items(&mut self, items: Vec<Value>) -> Result<(), Error> {
        if items.len() % 2 != 0 {
            return Err(Error::Malformed("pickle dict items are not paired".into()));
        }
        let mut it = items.into_iter();
        let mut pairs = Vec::new();
        while let (Some(k), Some(v)) = (it.next(), it.next()) {
            pairs.push((k, v));
        }
        match self.top()? {
            Value::Dict(dict) => {
                dict.extend(pairs);
                Ok(())
            }
            other => Err(Error::Malformed(format!("pickle setitem on non-dict {other:?}"))),
        }
    }
}

/// Run a pickle stream and return the object it builds.
pub fn load(bytes: &[u8]) -> Result<Value, Error> {
    let mut r = Reader { bytes, pos: 0 };
    let mut m = Machine::default();
    loop {
        let op = r.u8()?;
        match op {
            0x80 => {
                let proto = r.u8()?;
                if !(2..=5).contains(&proto) {
                    return Err(Error::Malformed(format!("unsupported pickle protocol {proto}")));
                }
            }
            0x95 => {
                r.u64()?;
            }
            b'.' => return m.pop(),
            b'(' => m.stack.push(Value::Mark),
            b'N' => m.stack.push(Value::None),
            0x88 => m.stack.push(Value::Bool(true)),
            0x89 => m.stack.push(Value::Bool(false)),
            b'K' => {
                let v = r.u8()?;
                m.stack.push(Value::Int(i64::from(v)));
            }
            b'M' => {
                let b = r.take(2)?;
                m.stack.push(Value::Int(i64::from(u16::from_le_bytes([b[0], b[1]]))));
            }
            b'J' => {
                let v = r.u32()? as i32;
                m.stack.push(Value::Int(i64::from(v)));
            }
            0x8a => {
                let n = usize::from(r.u8()?);
                let raw = r.take(n)?;
                if n > 8 {
                    return Err(Error::Malformed(format!("pickled integer of {n} bytes is too large")));
                }
                let fill = if raw.last().is_some_and(|b| b & 0x80 != 0) { 0xff } else { 0 };
                let mut b = [fill; 8];
                b[..n].copy_from_slice(raw);
                m.stack.push(Value::Int(i64::from_le_bytes(b)));
            }
            b'G' => {
                let mut b = [0u8; 8];
                b.copy_from_slice(r.take(8)?);
                m.stack.push(Value::Float(f64::from_be_bytes(b)));
            }
            0x8c => {
                let n = usize::from(r.u8()?);
                let s = r.utf8(n)?;
                m.stack.push(Value::Str(s));
            }
            b'X' => {
                let n = r.u32()? as usize;
                let s = r.utf8(n)?;
                m.stack.push(Value::Str(s));
            }
            0x8d => {
                let n = r.len_u64()?;
                let s = r.utf8(n)?;
                m.stack.push(Value::Str(s));
            }
            b'C' | b'U' => {
                let n = usize::from(r.u8()?);
                m.stack.push(Value::Bytes(r.take(n)?.to_vec()));
            }
            b'B' | b'T' => {
                let n = r.u32()? as usize;
                m.stack.push(Value::Bytes(r.take(n)?.to_vec()));
            }
            0x8e => {
                let n = r.len_u64()?;
                m.stack.push(Value::Bytes(r.take(n)?.to_vec()));
            }
            b')' => m.stack.push(Value::Tuple(Vec::new())),
            b't' => {
                let items = m.pop_to_mark()?;
                m.stack.push(Value::Tuple(items));
            }
            0x85..=0x87 => {
                let items = m.pop_n(usize::from(op - 0x84))?;
                m.stack.push(Value::Tuple(items));
            }
            b']' => m.stack.push(Value::List(Vec::new())),
            b'l' => {
                let items = m.pop_to_mark()?;
                m.stack.push(Value::List(items));
            }
            b'a' => {
                let v = m.pop()?;
                m.extend_top(vec![v])?;
            }
            b'e' => {
                let items = m.pop_to_mark()?;
                m.extend_top(items)?;
            }
            b'}' => m.stack.push(Value::Dict(Vec::new())),
            b's' => {
                let items = m.pop_n(2)?;
                m.set_items(items)?;
            }
            b'u' => {
                let items = m.pop_to_mark()?;
                m.set_items(items)?;
            }
            b'c' => {
                let module = r.line()?.to_string();
                let name = r.line()?.to_string();
                m.stack.push(Value::Global { module, name });
            }
            0x93 => {
                let name = m.pop()?;
                let module = m.pop()?;
                match (module, name) {
                    (Value::Str(module), Value::Str(name)) => m.stack.push(Value::Global { module, name }),
                    _ => return Err(Error::Malformed("pickle STACK_GLOBAL needs two strings".into())),
                }
            }
            b'R' | 0x81 => {
                let args = m.pop()?;
                let callable = m.pop()?;
                m.stack.push(Value::Reduce { callable: Box::new(callable), args: Box::new(args) });
            }
            b'b' => {
                let state = m.pop()?;
                let object = m.pop()?;
                m.stack.push(Value::Build { object: Box::new(object), state: Box::new(state) });
            }
            0x94 => {
                let key = m.memo.len() as u64;
                m.put(key)?;
            }
            b'q' => {
                let key = u64::from(r.u8()?);
                m.put(key)?;
            }
            b'r' => {
                let key = u64::from(r.u32()?);
                m.put(key)?;
            }
            b'p' => {
                let key = parse_memo_key(r.line()?)?;
                m.put(key)?;
            }
            b'h' => {
                let key = u64::from(r.u8()?);
                m.get(key)?;
            }
            b'j' => {
                let key = u64::from(r.u32()?);
                m.get(key)?;
            }
            b'g' => {
                let key = parse_memo_key(r.line()?)?;
                m.get(key)?;
            }
            other => {
                return Err(Error::Malformed(format!("unsupported pickle opcode {other:#04x} at byte {}", r.pos - 1)));
            }
        }
    }
}

fn parse_memo_key(s: &str) -> Result<u64, Error> {
    s.trim().parse().map_err(|_| Error::Malformed(format!("bad pickle memo key '{s}'")))
}

/// Items of a pickled 1-D numpy object array.
pub fn object_array_items(value: Value) -> Result<Vec<Value>, Error> {
    let Value::Build { object, state } = value else {
        return Err(Error::Malformed("pickle does not hold a numpy array".into()));
    };
    match *object {
        Value::Reduce { callable, .. } if matches!(&*callable, Value::Global { name, .. } if name == "_reconstruct") => {}
        other => return Err(Error::Malformed(format!("pickle does not hold a numpy array: {other:?}"))),
    }
    match *state {
        Value::Tuple(mut fields) if fields.len() == 5 => match fields.pop() {
            Some(Value::List(items)) => Ok(items),
            _ => Err(Error::Malformed("numpy array state has no object list".into())),
        },
        _ => Err(Error::Malformed("unexpected numpy array state".into())),
    }
}

/// Text of one object-array entry. Strings pass through, bytes are decoded
/// lossily, `None`/NaN become empty and other scalars are formatted.
pub fn item_to_text(index: usize, item: Value) -> Result<String, Error> {
    match item {
        Value::Str(s) => Ok(s),
        Value::Bytes(b) => Ok(String::from_utf8_lossy(&b).into_owned()),
        Value::None => Ok(String::new()),
        Value::Float(f) if f.is_nan() => Ok(String::new()),
        Value::Float(f) => Ok(f.to_string()),
        Value::Int(i) => Ok(i.to_string()),
        Value::Bool(b) => Ok(if b { "True" } else { "False" }.to_string()),
        other => Err(Error::Malformed(format!("question #{index} is not text: {other:?}"))),
    }
}
