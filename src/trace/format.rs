//! Trace-file container format.
//!
//! ## File layout
//! ```text
//! File header:  MAGIC (u32 LE) + FORMAT_FAMILY (u32 LE) + CONTAINER_VERSION (u32 LE) = 12 bytes
//!
//! Chunk stream (repeated until EOF):
//!   id(u32) type(u32) start_time(u32) end_time(u32) part_count(u32)
//!   part headers: [type(u32) offset(u32) length(u32)] × part_count
//!   payload bytes (parts written contiguously in header order, each part
//!   starting at its 4-byte-aligned offset)
//!   zero padding to the next 4-byte boundary
//! ```
//!
//! Chunk 1 (id=1, type=0x1) holds a single metadata part: a compact JSON
//! document describing the trace context. Its timestamps are the `TIME_NONE`
//! sentinel. Chunk 2 (id=2, type=0x2) holds the string table part followed by
//! the combined events part; its timestamps are `{0, save time in micros}`.
//!
//! All offsets inside a chunk are relative to the start of that chunk's
//! payload, derived from the preceding parts' measured lengths. Every length
//! must therefore be known before the chunk header is emitted.

use serde::{Deserialize, Serialize};
use std::io::{Error, ErrorKind, Read, Result};

pub const MAGIC: u32 = 0xdead_beef;
pub const FORMAT_FAMILY: u32 = 0xe821_4400;
pub const CONTAINER_VERSION: u32 = 10;

/// Size of the three fixed file-header words.
pub const FILE_HEADER_SIZE: usize = 12;

/// Chunks and parts are padded so the next chunk begins on this boundary.
pub const CHUNK_ALIGNMENT: usize = 4;

pub const CHUNK_TYPE_HEADER: u32 = 0x1;
pub const CHUNK_TYPE_EVENTS: u32 = 0x2;

pub const PART_TYPE_METADATA: u32 = 0x1_0000;
pub const PART_TYPE_STRINGS: u32 = 0x2_0000;
pub const PART_TYPE_EVENTS: u32 = 0x3_0000;

/// Sentinel timestamp for chunks that carry no time range.
pub const TIME_NONE: u32 = 0xffff_ffff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub id: u32,
    pub chunk_type: u32,
    pub start_time: u32,
    pub end_time: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartHeader {
    pub part_type: u32,
    pub offset: u32,
    pub length: u32,
}

/// Round `n` up to the next chunk-alignment boundary.
pub fn align_up(n: usize) -> usize {
    n.div_ceil(CHUNK_ALIGNMENT) * CHUNK_ALIGNMENT
}

/// The metadata document carried by the header chunk.
///
/// The time base is always reset to zero at runtime construction, so readers
/// interpret all event timestamps as microseconds since trace start.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeaderInfo {
    #[serde(rename = "type")]
    pub doc_type: String,
    pub timebase: u64,
    pub flags: Vec<String>,
    #[serde(rename = "contextInfo")]
    pub context_info: ContextInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContextInfo {
    #[serde(rename = "contextType")]
    pub context_type: String,
    pub title: String,
}

impl HeaderInfo {
    pub fn new() -> Self {
        Self {
            doc_type: "file_header".to_string(),
            timebase: 0,
            flags: vec!["has_high_resolution_times".to_string()],
            context_info: ContextInfo {
                context_type: "native".to_string(),
                title: "zonetrace".to_string(),
            },
        }
    }
}

impl Default for HeaderInfo {
    fn default() -> Self {
        Self::new()
    }
}

/// Read and validate the three fixed file-header words.
pub fn read_file_header(r: &mut impl Read) -> Result<()> {
    let mut words = [0u8; FILE_HEADER_SIZE];
    r.read_exact(&mut words)?;
    let magic = u32::from_le_bytes([words[0], words[1], words[2], words[3]]);
    let family = u32::from_le_bytes([words[4], words[5], words[6], words[7]]);
    let version = u32::from_le_bytes([words[8], words[9], words[10], words[11]]);
    if magic != MAGIC {
        return Err(Error::new(
            ErrorKind::InvalidData,
            format!("bad magic {magic:#x}"),
        ));
    }
    if family != FORMAT_FAMILY {
        return Err(Error::new(
            ErrorKind::InvalidData,
            format!("bad format family {family:#x}"),
        ));
    }
    if version != CONTAINER_VERSION {
        return Err(Error::new(
            ErrorKind::InvalidData,
            format!("unsupported container version {version}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_header_constants() {
        assert_eq!(MAGIC, 0xdeadbeef);
        assert_eq!(FORMAT_FAMILY, 0xe8214400);
        assert_eq!(CONTAINER_VERSION, 10);
        assert_eq!(FILE_HEADER_SIZE, 12);
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0), 0);
        assert_eq!(align_up(1), 4);
        assert_eq!(align_up(4), 4);
        assert_eq!(align_up(5), 8);
        assert_eq!(align_up(13), 16);
    }

    #[test]
    fn test_read_file_header_valid() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MAGIC.to_le_bytes());
        bytes.extend_from_slice(&FORMAT_FAMILY.to_le_bytes());
        bytes.extend_from_slice(&CONTAINER_VERSION.to_le_bytes());
        assert!(read_file_header(&mut Cursor::new(bytes)).is_ok());
    }

    #[test]
    fn test_read_file_header_bad_magic() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0x1234_5678u32.to_le_bytes());
        bytes.extend_from_slice(&FORMAT_FAMILY.to_le_bytes());
        bytes.extend_from_slice(&CONTAINER_VERSION.to_le_bytes());
        assert!(read_file_header(&mut Cursor::new(bytes)).is_err());
    }

    #[test]
    fn test_read_file_header_bad_version() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MAGIC.to_le_bytes());
        bytes.extend_from_slice(&FORMAT_FAMILY.to_le_bytes());
        bytes.extend_from_slice(&99u32.to_le_bytes());
        assert!(read_file_header(&mut Cursor::new(bytes)).is_err());
    }

    #[test]
    fn test_header_info_roundtrip() {
        let info = HeaderInfo::new();
        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("\"type\":\"file_header\""));
        assert!(json.contains("\"timebase\":0"));
        assert!(json.contains("has_high_resolution_times"));
        let back: HeaderInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, info);
    }
}
