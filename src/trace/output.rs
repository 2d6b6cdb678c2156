//! Byte sink for trace-file assembly.
//!
//! [`OutputBuffer`] wraps any `io::Write` and adds the primitives the save
//! path needs: little-endian u32 words, 4-byte alignment padding, and framed
//! chunk headers. It also carries the sink's health: a failed write marks the
//! buffer unhealthy but later writes are still attempted, so a partially
//! failing save recovers as much trace data as possible. The caller checks
//! [`OutputBuffer::healthy`] once at the end.

use crate::trace::format::{CHUNK_ALIGNMENT, ChunkHeader, PartHeader, align_up};
use std::io::Write;

pub struct OutputBuffer<'a> {
    out: &'a mut dyn Write,
    pos: usize,
    healthy: bool,
}

impl<'a> OutputBuffer<'a> {
    pub fn new(out: &'a mut dyn Write) -> Self {
        Self {
            out,
            pos: 0,
            healthy: true,
        }
    }

    /// Bytes attempted so far. Advances even when a write fails so that
    /// alignment stays deterministic for the remainder of the save.
    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn healthy(&self) -> bool {
        self.healthy
    }

    pub fn append(&mut self, bytes: &[u8]) -> bool {
        self.pos += bytes.len();
        if self.out.write_all(bytes).is_err() {
            self.healthy = false;
            return false;
        }
        true
    }

    pub fn append_u32(&mut self, word: u32) -> bool {
        self.append(&word.to_le_bytes())
    }

    /// Pad with zero bytes up to the next chunk-alignment boundary.
    pub fn align(&mut self) -> bool {
        let padding = align_up(self.pos) - self.pos;
        if padding == 0 {
            return true;
        }
        const ZEROS: [u8; CHUNK_ALIGNMENT] = [0; CHUNK_ALIGNMENT];
        self.append(&ZEROS[..padding])
    }

    /// Emit a chunk header followed by its part-header array. Part payloads
    /// are appended by the caller afterwards, in header order.
    pub fn start_chunk(&mut self, header: &ChunkHeader, parts: &[PartHeader]) -> bool {
        let mut ok = self.append_u32(header.id);
        ok &= self.append_u32(header.chunk_type);
        ok &= self.append_u32(header.start_time);
        ok &= self.append_u32(header.end_time);
        ok &= self.append_u32(parts.len() as u32);
        for part in parts {
            ok &= self.append_u32(part.part_type);
            ok &= self.append_u32(part.offset);
            ok &= self.append_u32(part.length);
        }
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::format::{CHUNK_TYPE_HEADER, PART_TYPE_METADATA, TIME_NONE};
    use std::io::Error;

    /// A sink that fails every write.
    struct BrokenSink;

    impl Write for BrokenSink {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(Error::other("broken"))
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_append_tracks_position() {
        let mut bytes = Vec::new();
        let mut out = OutputBuffer::new(&mut bytes);
        assert!(out.append(b"abc"));
        assert!(out.append_u32(7));
        assert_eq!(out.pos(), 7);
        assert!(out.healthy());
        assert_eq!(bytes, b"abc\x07\x00\x00\x00");
    }

    #[test]
    fn test_align_pads_with_zeros() {
        let mut bytes = Vec::new();
        let mut out = OutputBuffer::new(&mut bytes);
        out.append(b"ab");
        assert!(out.align());
        assert_eq!(out.pos(), 4);
        // Already aligned: no-op.
        assert!(out.align());
        assert_eq!(out.pos(), 4);
        assert_eq!(bytes, b"ab\x00\x00");
    }

    #[test]
    fn test_start_chunk_layout() {
        let mut bytes = Vec::new();
        let mut out = OutputBuffer::new(&mut bytes);
        let header = ChunkHeader {
            id: 1,
            chunk_type: CHUNK_TYPE_HEADER,
            start_time: TIME_NONE,
            end_time: TIME_NONE,
        };
        let part = PartHeader {
            part_type: PART_TYPE_METADATA,
            offset: 0,
            length: 42,
        };
        assert!(out.start_chunk(&header, &[part]));
        // 4 header words + part count + 3 part words.
        assert_eq!(bytes.len(), 8 * 4);
        let words: Vec<u32> = bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(
            words,
            vec![1, CHUNK_TYPE_HEADER, TIME_NONE, TIME_NONE, 1, PART_TYPE_METADATA, 0, 42]
        );
    }

    #[test]
    fn test_failure_is_sticky_but_writes_continue() {
        let mut sink = BrokenSink;
        let mut out = OutputBuffer::new(&mut sink);
        assert!(!out.append(b"abc"));
        assert!(!out.healthy());
        // Later writes are still attempted and position still advances.
        assert!(!out.append_u32(1));
        assert_eq!(out.pos(), 7);
        assert!(!out.healthy());
    }
}
