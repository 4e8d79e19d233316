use crate::error::BytecodeError;

pub const MAGIC: [u8; 4] = *b"ARKB";
pub const VERSION: u8 = 0x01;
/// Magic + version + three reserved zero bytes.
pub const HEADER_LEN: usize = 8;

const TAG_INTEGER: u8 = 0x01;
const TAG_STRING: u8 = 0x02;
const TAG_BOOLEAN: u8 = 0x03;
const TAG_FLOAT: u8 = 0x04;

/// A constant-pool literal. The pool is deduplicated by (payload, tag), so
/// `42` and `42.0` occupy distinct entries.
#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    Integer(i64),
    Str(String),
    Bool(bool),
    Float(f64),
}

impl Constant {
    pub fn tag(&self) -> u8 {
        match self {
            Constant::Integer(_) => TAG_INTEGER,
            Constant::Str(_) => TAG_STRING,
            Constant::Bool(_) => TAG_BOOLEAN,
            Constant::Float(_) => TAG_FLOAT,
        }
    }
}

/// A decoded ARKB program: the constant pool plus the raw instruction
/// stream. Immutable once emitted.
#[derive(Clone, Debug, PartialEq)]
pub struct ArkbProgram {
    pub constants: Vec<Constant>,
    pub code: Vec<u8>,
}

impl ArkbProgram {
    /// Serializes to the wire format. The compiler enforces the pool-size
    /// and string-length caps before constructing the program.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.code.len());
        out.extend_from_slice(&MAGIC);
        out.push(VERSION);
        out.extend_from_slice(&[0, 0, 0]);

        out.extend_from_slice(&(self.constants.len() as u16).to_be_bytes());
        for c in &self.constants {
            out.push(c.tag());
            match c {
                Constant::Integer(n) => out.extend_from_slice(&n.to_be_bytes()),
                Constant::Str(s) => {
                    out.extend_from_slice(&(s.len() as u16).to_be_bytes());
                    out.extend_from_slice(s.as_bytes());
                }
                Constant::Bool(b) => out.push(u8::from(*b)),
                Constant::Float(x) => out.extend_from_slice(&x.to_bits().to_be_bytes()),
            }
        }

        out.extend_from_slice(&self.code);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BytecodeError> {
        if bytes.len() < HEADER_LEN {
            return Err(BytecodeError::Truncated("header"));
        }
        if bytes[..4] != MAGIC {
            return Err(BytecodeError::BadMagic);
        }
        if bytes[4] != VERSION {
            return Err(BytecodeError::UnsupportedVersion(bytes[4]));
        }

        let mut cursor = Cursor {
            bytes,
            pos: HEADER_LEN,
        };
        let count = cursor.read_u16("constant count")?;
        let mut constants = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let offset = cursor.pos;
            let tag = cursor.read_u8("constant tag")?;
            let constant = match tag {
                TAG_INTEGER => Constant::Integer(i64::from_be_bytes(
                    cursor.read_array::<8>("integer constant")?,
                )),
                TAG_STRING => {
                    let len = cursor.read_u16("string length")? as usize;
                    let raw = cursor.read_slice(len, "string constant")?;
                    let s = std::str::from_utf8(raw)
                        .map_err(|_| BytecodeError::InvalidUtf8 { offset })?;
                    Constant::Str(s.to_string())
                }
                TAG_BOOLEAN => Constant::Bool(cursor.read_u8("boolean constant")? != 0),
                TAG_FLOAT => Constant::Float(f64::from_bits(u64::from_be_bytes(
                    cursor.read_array::<8>("float constant")?,
                ))),
                other => return Err(BytecodeError::UnknownConstantTag { tag: other, offset }),
            };
            constants.push(constant);
        }

        Ok(ArkbProgram {
            constants,
            code: bytes[cursor.pos..].to_vec(),
        })
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn read_u8(&mut self, what: &'static str) -> Result<u8, BytecodeError> {
        let b = *self
            .bytes
            .get(self.pos)
            .ok_or(BytecodeError::Truncated(what))?;
        self.pos += 1;
        Ok(b)
    }

    fn read_u16(&mut self, what: &'static str) -> Result<u16, BytecodeError> {
        Ok(u16::from_be_bytes(self.read_array::<2>(what)?))
    }

    fn read_array<const N: usize>(&mut self, what: &'static str) -> Result<[u8; N], BytecodeError> {
        let slice = self.read_slice(N, what)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn read_slice(&mut self, len: usize, what: &'static str) -> Result<&[u8], BytecodeError> {
        let end = self
            .pos
            .checked_add(len)
            .ok_or(BytecodeError::Truncated(what))?;
        if end > self.bytes.len() {
            return Err(BytecodeError::Truncated(what));
        }
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }
}
