//! Record Codec
//!
//! The on-disk record encoding shared by the appender and every reader.
//!
//! ## Record Format
//! ```text
//! ┌──────────────────────┬──────────┬─────────────────────────┐
//! │ Total Length (i32 BE)│ Type (1) │ Payload                 │
//! │ = 5 + payload length │          │ (total length - 5)      │
//! └──────────────────────┴──────────┴─────────────────────────┘
//! ```
//!
//! A data file is a flat concatenation of records starting at offset 0.

use std::io::{self, Read, Write};

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Header size: Total Length (4) + Type (1) = 5 bytes
pub const HEADER_SIZE: usize = 5;

/// Largest payload a single record can carry (the length field is an i32)
pub const MAX_PAYLOAD_SIZE: usize = i32::MAX as usize - HEADER_SIZE;

/// Decoded record header
///
/// `size` is always in `HEADER_SIZE..=i32::MAX`, including after
/// deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRecordHeader")]
pub struct RecordHeader {
    /// Total record size including this header
    size: u32,
    /// Application-defined type tag
    record_type: u8,
}

/// Unchecked serialized form of [`RecordHeader`]
#[derive(Deserialize)]
struct RawRecordHeader {
    size: u32,
    record_type: u8,
}

impl TryFrom<RawRecordHeader> for RecordHeader {
    type Error = String;

    fn try_from(raw: RawRecordHeader) -> std::result::Result<Self, Self::Error> {
        if raw.size < HEADER_SIZE as u32 || raw.size > i32::MAX as u32 {
            return Err(format!(
                "record size {} is outside {}..={}",
                raw.size,
                HEADER_SIZE,
                i32::MAX
            ));
        }
        Ok(Self {
            size: raw.size,
            record_type: raw.record_type,
        })
    }
}

impl RecordHeader {
    /// Header for a record carrying `payload_len` bytes
    pub fn for_payload(payload_len: usize, record_type: u8) -> io::Result<Self> {
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "payload of {} bytes exceeds the maximum record payload of {} bytes",
                    payload_len, MAX_PAYLOAD_SIZE
                ),
            ));
        }
        Ok(Self {
            size: (HEADER_SIZE + payload_len) as u32,
            record_type,
        })
    }

    /// Decode a header, rejecting lengths that cannot describe a record
    pub fn decode(buf: &[u8; HEADER_SIZE]) -> io::Result<Self> {
        let total_length = i32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if total_length < HEADER_SIZE as i32 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("record length {} is smaller than the header", total_length),
            ));
        }
        Ok(Self {
            size: total_length as u32,
            record_type: buf[4],
        })
    }

    /// Read and decode a header from the current position of `reader`
    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mut buf = [0u8; HEADER_SIZE];
        reader.read_exact(&mut buf)?;
        Self::decode(&buf)
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&(self.size as i32).to_be_bytes());
        buf[4] = self.record_type;
        buf
    }

    /// Total record size including the header
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn record_type(&self) -> u8 {
        self.record_type
    }

    pub fn payload_len(&self) -> usize {
        self.size as usize - HEADER_SIZE
    }
}

/// Encode a complete record (header followed by payload)
pub fn encode_record(payload: &[u8], record_type: u8) -> io::Result<Bytes> {
    let header = RecordHeader::for_payload(payload.len(), record_type)?;
    let mut buf = BytesMut::with_capacity(header.size() as usize);
    buf.put_i32(header.size() as i32);
    buf.put_u8(header.record_type());
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Write a complete record to `writer`
pub fn write_record<W: Write>(writer: &mut W, header: RecordHeader, payload: &[u8]) -> io::Result<()> {
    if payload.len() != header.payload_len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "payload of {} bytes does not match header payload length {}",
                payload.len(),
                header.payload_len()
            ),
        ));
    }
    writer.write_all(&header.encode())?;
    writer.write_all(payload)
}
