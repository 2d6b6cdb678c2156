//! Per-thread event buffer.
//!
//! One [`EventBuffer`] exists per registered thread, owned by the runtime's
//! registry for the runtime's lifetime. A buffer is never removed, even
//! after its thread disables itself, so historical data survives thread
//! death. The buffer is logically split into a frozen prefix (the
//! zone-identity records written once at registration) and a mutable region
//! (ongoing event payload, which a save may truncate).
//!
//! Records are sequences of little-endian u32 words:
//! `[wire_id, timestamp_micros, args...]`.
//!
//! The internal mutex is what makes concurrent "append" (the owning thread)
//! vs "measure-and-optionally-truncate" (a save on another thread) access
//! safe. The owning thread is almost always the only contender, so the hot
//! path is an uncontended lock.

use crate::trace::output::OutputBuffer;
use crate::trace::runtime::Clock;
use crate::trace::strings::StringTable;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

pub struct EventBuffer {
    strings: Arc<StringTable>,
    clock: Arc<Clock>,
    inner: Mutex<Inner>,
    zone: AtomicU32,
}

#[derive(Default)]
struct Inner {
    words: Vec<u32>,
    frozen_words: usize,
}

impl EventBuffer {
    pub fn new(strings: Arc<StringTable>, clock: Arc<Clock>) -> Self {
        Self {
            strings,
            clock,
            inner: Mutex::new(Inner::default()),
            zone: AtomicU32::new(0),
        }
    }

    /// The shared string table backing this buffer's string arguments.
    pub fn string_table(&self) -> &Arc<StringTable> {
        &self.strings
    }

    /// Append one event record: wire id, current timestamp, then `args`.
    pub fn append(&self, wire_id: u32, args: &[u32]) {
        let timestamp = self.clock.timestamp_micros();
        let mut inner = self.inner.lock().unwrap();
        inner.words.push(wire_id);
        inner.words.push(timestamp);
        inner.words.extend_from_slice(args);
    }

    /// Pending byte length. Pure measurement, no side effect.
    pub fn measure_len(&self) -> u32 {
        (self.inner.lock().unwrap().words.len() * 4) as u32
    }

    /// Write exactly the first `len` bytes (as measured earlier) to `sink`.
    /// A `None` sink discards the bytes but still applies truncation, which
    /// is how clearing without saving shares this code path.
    ///
    /// When `clear` is set, the written mutable region is removed; the frozen
    /// prefix and any words appended after the measurement pass are kept.
    pub fn write_to(&self, sink: Option<&mut OutputBuffer<'_>>, len: u32, clear: bool) -> bool {
        let words = (len / 4) as usize;
        let mut inner = self.inner.lock().unwrap();
        let words = words.min(inner.words.len());
        let mut ok = true;
        if let Some(out) = sink {
            for &word in &inner.words[..words] {
                ok &= out.append_u32(word);
            }
        }
        if clear {
            let from = inner.frozen_words.min(words);
            inner.words.drain(from..words);
        }
        ok
    }

    /// Everything appended so far becomes immune to clearing and is
    /// re-emitted by every later save.
    pub fn freeze_prefix(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.frozen_words = inner.words.len();
    }

    pub fn set_active_zone(&self, zone_id: u32) {
        self.zone.store(zone_id, Ordering::Relaxed);
    }

    pub fn active_zone(&self) -> u32 {
        self.zone.load(Ordering::Relaxed)
    }
}
