//! Shared deduplicated string table.
//!
//! Every string referenced by an event payload or an event definition is
//! interned here and replaced on the wire by its id. Id 0 is reserved for the
//! empty string and is never serialized; real entries get ids 1..N in
//! interning order.
//!
//! Wire layout of the strings part: each entry's UTF-8 bytes followed by a
//! NUL byte, concatenated in id order.
//!
//! The table grows monotonically for the runtime's lifetime. Because payload
//! generation interns strings as a side effect, the table's length must be
//! measured only after all other payload generation for a save has finished;
//! entries interned after that measurement are excluded from the write.

use crate::trace::output::OutputBuffer;
use std::collections::HashMap;
use std::sync::Mutex;

pub const EMPTY_STRING_ID: u32 = 0;

pub struct StringTable {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    ids: HashMap<String, u32>,
    entries: Vec<String>,
    byte_len: usize,
}

impl StringTable {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Intern `s`, returning its stable id. Repeated calls with the same
    /// string return the same id.
    pub fn intern(&self, s: &str) -> u32 {
        if s.is_empty() {
            return EMPTY_STRING_ID;
        }
        let mut inner = self.inner.lock().unwrap();
        if let Some(&id) = inner.ids.get(s) {
            return id;
        }
        inner.entries.push(s.to_string());
        inner.byte_len += s.len() + 1;
        let id = inner.entries.len() as u32;
        inner.ids.insert(s.to_string(), id);
        id
    }

    /// Number of interned entries (excluding the implicit empty string).
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current serialized length in bytes. Pure measurement, no side effect.
    pub fn measure_len(&self) -> u32 {
        self.inner.lock().unwrap().byte_len as u32
    }

    /// Write exactly the first `len` bytes' worth of entries. Entries
    /// interned after the measurement pass are excluded; because the table is
    /// append-only the prefix sums line up exactly.
    pub fn write_to(&self, out: &mut OutputBuffer<'_>, len: u32) -> bool {
        let inner = self.inner.lock().unwrap();
        let mut written = 0usize;
        let mut ok = true;
        for entry in &inner.entries {
            if written + entry.len() + 1 > len as usize {
                break;
            }
            ok &= out.append(entry.as_bytes());
            ok &= out.append(&[0]);
            written += entry.len() + 1;
        }
        ok && written == len as usize
    }

    /// Discard all entries. Destructive; only the test-reset path calls this.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.ids.clear();
        inner.entries.clear();
        inner.byte_len = 0;
    }
}

impl Default for StringTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serialize(table: &StringTable) -> Vec<u8> {
        let len = table.measure_len();
        let mut bytes = Vec::new();
        let mut out = OutputBuffer::new(&mut bytes);
        assert!(table.write_to(&mut out, len));
        bytes
    }

    #[test]
    fn test_empty_string_is_id_zero() {
        let table = StringTable::new();
        assert_eq!(table.intern(""), EMPTY_STRING_ID);
        assert_eq!(table.len(), 0);
        assert_eq!(table.measure_len(), 0);
    }

    #[test]
    fn test_intern_dedupes() {
        let table = StringTable::new();
        let a = table.intern("alpha");
        let b = table.intern("beta");
        assert_eq!(table.intern("alpha"), a);
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_ids_are_interning_order() {
        let table = StringTable::new();
        assert_eq!(table.intern("first"), 1);
        assert_eq!(table.intern("second"), 2);
        assert_eq!(table.intern("third"), 3);
    }

    #[test]
    fn test_wire_layout_nul_terminated() {
        let table = StringTable::new();
        table.intern("ab");
        table.intern("c");
        assert_eq!(serialize(&table), b"ab\0c\0");
    }

    #[test]
    fn test_write_excludes_entries_after_measure() {
        let table = StringTable::new();
        table.intern("kept");
        let len = table.measure_len();
        table.intern("late");
        let mut bytes = Vec::new();
        let mut out = OutputBuffer::new(&mut bytes);
        assert!(table.write_to(&mut out, len));
        assert_eq!(bytes, b"kept\0");
    }

    #[test]
    fn test_clear() {
        let table = StringTable::new();
        table.intern("x");
        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.measure_len(), 0);
        // Ids restart after a clear.
        assert_eq!(table.intern("y"), 1);
    }
}
