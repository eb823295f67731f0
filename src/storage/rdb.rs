//! RDB snapshot loader
//!
//! Reads a Redis RDB file at startup and yields its string entries for
//! bulk-loading into the keyspace. Only string values (type byte 0x00) are
//! imported; a missing file is equivalent to an empty keyspace and a
//! malformed tail keeps whatever loaded before it.

use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use lazy_static::lazy_static;

use crate::error::{HematiteError, Result};
use crate::storage::engine::ImportedEntry;

/// RDB opcodes
const OP_EOF: u8 = 0xFF;
const OP_SELECT_DB: u8 = 0xFE;
const OP_EXPIRE_TIME_S: u8 = 0xFD;
const OP_EXPIRE_TIME_MS: u8 = 0xFC;
const OP_RESIZE_DB: u8 = 0xFB;
const OP_AUX: u8 = 0xFA;

/// Value type byte for plain strings
const TYPE_STRING: u8 = 0x00;

lazy_static! {
    /// Canned empty snapshot sent to replicas during full resync
    pub static ref EMPTY_RDB: Vec<u8> = BASE64
        .decode(
            "UkVESVMwMDEx+glyZWRpcy12ZXIFNy4yLjD6CnJlZGlzLWJpdHPAQPoFY3RpbWXCbQi8ZfoIdXNlZC1tZW3CsMQQAPoIYW9mLWJhc2XAAP/wbjv+wP9aog=="
        )
        .expect("embedded RDB payload is valid base64");
}

/// Cursor over the raw snapshot bytes
struct RdbCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

/// A length-encoding read: either a real length or a special string form
enum Length {
    Standard(usize),
    Special(u8),
}

impl<'a> RdbCursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        RdbCursor { data, pos: 0 }
    }

    fn read_byte(&mut self) -> Result<u8> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or_else(|| HematiteError::Protocol("Truncated RDB data".into()))?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        if self.pos + count > self.data.len() {
            return Err(HematiteError::Protocol("Truncated RDB data".into()));
        }
        let slice = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    fn peek_byte(&self) -> Result<u8> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or_else(|| HematiteError::Protocol("Truncated RDB data".into()))
    }

    /// Length encoding: 00=6-bit, 01=14-bit big-endian, 10=32-bit
    /// big-endian, 11=special
    fn read_length(&mut self) -> Result<Length> {
        let first = self.read_byte()?;
        match first >> 6 {
            0b00 => Ok(Length::Standard((first & 0x3F) as usize)),
            0b01 => {
                let second = self.read_byte()?;
                Ok(Length::Standard((((first & 0x3F) as usize) << 8) | second as usize))
            }
            0b10 => {
                let raw = self.read_bytes(4)?;
                Ok(Length::Standard(u32::from_be_bytes(raw.try_into().unwrap()) as usize))
            }
            _ => Ok(Length::Special(first & 0x3F)),
        }
    }

    /// String encoding: length-then-bytes, or a special integer form
    /// rendered back to its decimal string
    fn read_string(&mut self) -> Result<Vec<u8>> {
        match self.read_length()? {
            Length::Standard(len) => Ok(self.read_bytes(len)?.to_vec()),
            Length::Special(kind) => {
                let n: i64 = match kind {
                    0 => self.read_byte()? as i64,
                    1 => {
                        let raw = self.read_bytes(2)?;
                        u16::from_le_bytes(raw.try_into().unwrap()) as i64
                    }
                    2 => {
                        let raw = self.read_bytes(4)?;
                        u32::from_le_bytes(raw.try_into().unwrap()) as i64
                    }
                    other => {
                        return Err(HematiteError::Protocol(format!(
                            "Unsupported RDB string encoding: {}",
                            other
                        )))
                    }
                };
                Ok(n.to_string().into_bytes())
            }
        }
    }

    fn read_u32_le(&mut self) -> Result<u32> {
        let raw = self.read_bytes(4)?;
        Ok(u32::from_le_bytes(raw.try_into().unwrap()))
    }

    fn read_u64_le(&mut self) -> Result<u64> {
        let raw = self.read_bytes(8)?;
        Ok(u64::from_le_bytes(raw.try_into().unwrap()))
    }
}

/// Parse the string entries out of an RDB image
pub fn parse_rdb(data: &[u8]) -> Result<Vec<ImportedEntry>> {
    let mut cursor = RdbCursor::new(data);

    let magic = cursor.read_bytes(9)?;
    if magic[..5] != *b"REDIS" {
        return Err(HematiteError::Protocol("Bad RDB magic".into()));
    }

    let mut entries = Vec::new();
    let mut pending_expiry: Option<u64> = None;

    loop {
        let opcode = match cursor.peek_byte() {
            Ok(byte) => byte,
            // Clean EOF without the FF marker; keep what we have
            Err(_) => break,
        };

        match opcode {
            OP_EOF => break,
            OP_AUX => {
                cursor.read_byte()?;
                let _key = cursor.read_string()?;
                let _value = cursor.read_string()?;
            }
            OP_SELECT_DB => {
                cursor.read_byte()?;
                let _db = match cursor.read_length()? {
                    Length::Standard(db) => db,
                    Length::Special(_) => {
                        return Err(HematiteError::Protocol("Bad RDB database index".into()))
                    }
                };
            }
            OP_RESIZE_DB => {
                cursor.read_byte()?;
                let _total = cursor.read_length()?;
                let _with_expiry = cursor.read_length()?;
            }
            OP_EXPIRE_TIME_S => {
                cursor.read_byte()?;
                pending_expiry = Some(cursor.read_u32_le()? as u64 * 1000);
            }
            OP_EXPIRE_TIME_MS => {
                cursor.read_byte()?;
                pending_expiry = Some(cursor.read_u64_le()?);
            }
            TYPE_STRING => {
                cursor.read_byte()?;
                let key = cursor.read_string()?;
                let value = cursor.read_string()?;
                entries.push(ImportedEntry {
                    key,
                    value,
                    expires_at_ms: pending_expiry.take(),
                });
            }
            other => {
                return Err(HematiteError::Protocol(format!(
                    "Unsupported RDB value type: 0x{:02x}",
                    other
                )))
            }
        }
    }

    Ok(entries)
}

/// Load the snapshot at `<dir>/<dbfilename>`, if one exists
pub fn load_file(dir: &str, dbfilename: &str) -> Result<Vec<ImportedEntry>> {
    let path = Path::new(dir).join(dbfilename);
    if !path.is_file() {
        log::info!("No RDB file at {}, starting with an empty keyspace", path.display());
        return Ok(Vec::new());
    }

    let data = fs::read(&path)?;
    match parse_rdb(&data) {
        Ok(entries) => {
            log::info!("Loaded {} entries from {}", entries.len(), path.display());
            Ok(entries)
        }
        Err(err) => {
            // A malformed snapshot is not fatal; keep the empty keyspace
            log::warn!("Failed to parse {}: {}", path.display(), err);
            Ok(Vec::new())
        }
    }
}
