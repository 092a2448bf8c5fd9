//! 远程调用消息编解码
//!
//! 线上格式（所有整数均为小端序）：
//!
//! ```text
//! ┌────────────────────────┬────────────┬──────────────────────┐
//! │ identifier             │ argc: u32  │ args: [tag][payload]* │
//! │ (u32 长度 + UTF-8 字节) │            │                      │
//! └────────────────────────┴────────────┴──────────────────────┘
//! ```
//!
//! | tag | 类型    | payload                    |
//! |-----|---------|----------------------------|
//! | 0   | Invalid | 无                         |
//! | 1   | Bool    | 1 字节，0 或 1             |
//! | 2   | Int     | i64                        |
//! | 3   | Float   | f64                        |
//! | 4   | String  | u32 长度 + UTF-8 字节      |
//! | 5   | Vector3 | 3 × f64                    |
//! | 6   | Array   | u32 个数 + 元素            |
//! | 7   | Table   | u32 个数 + 键值对          |
//!
//! 解码器在读取任何长度前缀或个数之前都会与剩余字节数比较，
//! 损坏或恶意的消息只会得到 `CodecError`，不会触发大块分配。

use crate::bindings::value::{Table, Value, Vector3};
use crate::core::error::CodecError;

const TAG_INVALID: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_FLOAT: u8 = 3;
const TAG_STRING: u8 = 4;
const TAG_VECTOR3: u8 = 5;
const TAG_ARRAY: u8 = 6;
const TAG_TABLE: u8 = 7;

/// 解码后的远程调用
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RemoteMessage {
    /// 调用标识符
    pub identifier: String,
    /// 位置参数
    pub args: Vec<Value>,
}

/// 编码一条远程调用消息
///
/// 嵌套超过 `max_depth` 层的参数在发送前被拒绝。
pub fn encode_message(
    identifier: &str,
    args: &[Value],
    max_depth: usize,
) -> Result<Vec<u8>, CodecError> {
    let mut writer = Writer {
        buf: Vec::with_capacity(identifier.len() + 8 + args.len() * 9),
        max_depth,
    };
    writer.write_str(identifier)?;
    writer.write_len(args.len())?;
    for arg in args {
        writer.write_value(arg, 0)?;
    }
    Ok(writer.buf)
}

/// 解码一条远程调用消息，整个缓冲区必须恰好是一条消息
pub fn decode_message(bytes: &[u8], max_depth: usize) -> Result<RemoteMessage, CodecError> {
    let mut reader = Reader {
        buf: bytes,
        max_depth,
    };
    let identifier = reader.read_str()?;
    // 每个参数至少占 1 字节（tag）
    let argc = reader.read_count(1)?;
    let mut args = Vec::with_capacity(argc);
    for _ in 0..argc {
        args.push(reader.read_value(0)?);
    }
    if !reader.buf.is_empty() {
        return Err(CodecError::TrailingBytes(reader.buf.len()));
    }
    Ok(RemoteMessage { identifier, args })
}

struct Writer {
    buf: Vec<u8>,
    max_depth: usize,
}

impl Writer {
    fn write_len(&mut self, len: usize) -> Result<(), CodecError> {
        let len = u32::try_from(len).map_err(|_| CodecError::LengthOverflow(len))?;
        self.buf.extend_from_slice(&len.to_le_bytes());
        Ok(())
    }

    fn write_str(&mut self, s: &str) -> Result<(), CodecError> {
        self.write_len(s.len())?;
        self.buf.extend_from_slice(s.as_bytes());
        Ok(())
    }

    fn write_f64(&mut self, f: f64) {
        self.buf.extend_from_slice(&f.to_le_bytes());
    }

    fn enter(&self, level: usize) -> Result<usize, CodecError> {
        if level >= self.max_depth {
            return Err(CodecError::DepthExceeded(self.max_depth));
        }
        Ok(level + 1)
    }

    fn write_value(&mut self, value: &Value, level: usize) -> Result<(), CodecError> {
        match value {
            Value::Invalid => self.buf.push(TAG_INVALID),
            Value::Bool(b) => {
                self.buf.push(TAG_BOOL);
                self.buf.push(u8::from(*b));
            }
            Value::Int(i) => {
                self.buf.push(TAG_INT);
                self.buf.extend_from_slice(&i.to_le_bytes());
            }
            Value::Float(f) => {
                self.buf.push(TAG_FLOAT);
                self.write_f64(*f);
            }
            Value::String(s) => {
                self.buf.push(TAG_STRING);
                self.write_str(s)?;
            }
            Value::Vector3(v) => {
                self.buf.push(TAG_VECTOR3);
                self.write_f64(v.x);
                self.write_f64(v.y);
                self.write_f64(v.z);
            }
            Value::Array(items) => {
                let inner = self.enter(level)?;
                self.buf.push(TAG_ARRAY);
                self.write_len(items.len())?;
                for item in items {
                    self.write_value(item, inner)?;
                }
            }
            Value::Table(table) => {
                let inner = self.enter(level)?;
                self.buf.push(TAG_TABLE);
                self.write_len(table.len())?;
                for (key, value) in table {
                    self.write_value(key, inner)?;
                    self.write_value(value, inner)?;
                }
            }
        }
        Ok(())
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    max_depth: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.buf.len() < n {
            return Err(CodecError::Truncated {
                needed: n,
                remaining: self.buf.len(),
            });
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn read_u32(&mut self) -> Result<usize, CodecError> {
        Ok(u32::from_le_bytes(self.take_array()?) as usize)
    }

    fn read_f64(&mut self) -> Result<f64, CodecError> {
        Ok(f64::from_le_bytes(self.take_array()?))
    }

    /// 读取一个元素个数，并确认剩余字节足够容纳这么多最小尺寸的元素
    fn read_count(&mut self, min_item_size: usize) -> Result<usize, CodecError> {
        let count = self.read_u32()?;
        let needed = count.saturating_mul(min_item_size);
        if needed > self.buf.len() {
            return Err(CodecError::Truncated {
                needed,
                remaining: self.buf.len(),
            });
        }
        Ok(count)
    }

    fn read_str(&mut self) -> Result<String, CodecError> {
        let len = self.read_u32()?;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| CodecError::InvalidUtf8)
    }

    fn enter(&self, level: usize) -> Result<usize, CodecError> {
        if level >= self.max_depth {
            return Err(CodecError::DepthExceeded(self.max_depth));
        }
        Ok(level + 1)
    }

    fn read_value(&mut self, level: usize) -> Result<Value, CodecError> {
        let value = match self.read_u8()? {
            TAG_INVALID => Value::Invalid,
            TAG_BOOL => match self.read_u8()? {
                0 => Value::Bool(false),
                1 => Value::Bool(true),
                other => return Err(CodecError::InvalidBool(other)),
            },
            TAG_INT => Value::Int(i64::from_le_bytes(self.take_array()?)),
            TAG_FLOAT => Value::Float(self.read_f64()?),
            TAG_STRING => Value::String(self.read_str()?),
            TAG_VECTOR3 => {
                let x = self.read_f64()?;
                let y = self.read_f64()?;
                let z = self.read_f64()?;
                Value::Vector3(Vector3::new(x, y, z))
            }
            TAG_ARRAY => {
                let inner = self.enter(level)?;
                let count = self.read_count(1)?;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(self.read_value(inner)?);
                }
                Value::Array(items)
            }
            TAG_TABLE => {
                let inner = self.enter(level)?;
                let count = self.read_count(2)?;
                let mut table = Table::with_capacity(count);
                for _ in 0..count {
                    let key = self.read_value(inner)?;
                    let value = self.read_value(inner)?;
                    table.insert(key, value);
                }
                Value::Table(table)
            }
            other => return Err(CodecError::UnknownTag(other)),
        };
        Ok(value)
    }
}
