//! The tracing runtime: thread registration and the save/clear protocols.
//!
//! A [`TraceRuntime`] owns the append-only registry of per-thread buffers and
//! the shared string table. Application threads register once with
//! [`TraceRuntime::enable_current_thread`]; after that, appends go through a
//! thread-local binding and never touch the registry lock.
//!
//! Administrative operations (save, clear, reset) take the registry lock only
//! long enough to snapshot the buffer list, then run lock-free against that
//! snapshot, concurrently with ongoing appends on other threads. They are
//! **not** mutually safe with each other: the caller must serialize saves,
//! clears, and resets externally. Two overlapping saves may race on a
//! buffer's measure/write/clear sequence.

use crate::trace::buffer::EventBuffer;
use crate::trace::events::{EventRegistry, StandardEvents};
use crate::trace::format::{
    CHUNK_TYPE_EVENTS, CHUNK_TYPE_HEADER, CONTAINER_VERSION, ChunkHeader, FORMAT_FAMILY,
    HeaderInfo, MAGIC, PART_TYPE_EVENTS, PART_TYPE_METADATA, PART_TYPE_STRINGS, PartHeader,
    TIME_NONE, align_up,
};
use crate::trace::output::OutputBuffer;
use crate::trace::strings::StringTable;
use smallvec::SmallVec;
use std::cell::RefCell;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;

/// Monotonic time base, reset to zero when the runtime is constructed.
/// Timestamps are microseconds as u32, which supports traces up to ~71
/// minutes.
pub struct Clock {
    start: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn timestamp_micros(&self) -> u32 {
        self.start.elapsed().as_micros() as u32
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// Options controlling a save.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveOptions {
    /// Truncate each buffer's mutable region immediately after its contents
    /// are written. The frozen zone-identity prefix is untouched and will be
    /// re-emitted by the next save.
    pub clear_thread_data: bool,
}

impl SaveOptions {
    pub const DEFAULT: SaveOptions = SaveOptions {
        clear_thread_data: false,
    };
    pub const CLEAR_THREAD_DATA: SaveOptions = SaveOptions {
        clear_thread_data: true,
    };
}

thread_local! {
    /// The calling thread's buffer binding, tagged with the runtime epoch it
    /// was created under. A stale tag (from before a reset, or from another
    /// runtime instance) is treated as unbound.
    static THREAD_BUFFER: RefCell<Option<(u64, Arc<EventBuffer>)>> = const { RefCell::new(None) };
}

static NEXT_EPOCH: AtomicU64 = AtomicU64::new(1);

fn fresh_epoch() -> u64 {
    NEXT_EPOCH.fetch_add(1, Ordering::Relaxed)
}

static GLOBAL: OnceLock<TraceRuntime> = OnceLock::new();

pub struct TraceRuntime {
    buffers: Mutex<Vec<Arc<EventBuffer>>>,
    strings: Arc<StringTable>,
    clock: Arc<Clock>,
    epoch: AtomicU64,
}

impl TraceRuntime {
    pub fn new() -> Self {
        Self {
            buffers: Mutex::new(Vec::new()),
            strings: Arc::new(StringTable::new()),
            clock: Arc::new(Clock::new()),
            epoch: AtomicU64::new(fresh_epoch()),
        }
    }

    /// The process-wide runtime. Prefer passing a [`TraceRuntime`] explicitly;
    /// this accessor exists for the outermost boundary where no context can be
    /// threaded through.
    pub fn global() -> &'static TraceRuntime {
        GLOBAL.get_or_init(TraceRuntime::new)
    }

    pub fn string_table(&self) -> &Arc<StringTable> {
        &self.strings
    }

    pub fn clock(&self) -> &Arc<Clock> {
        &self.clock
    }

    /// Register the calling thread for tracing. Idempotent: if the thread
    /// already has a live binding this is a no-op (checked without locking).
    ///
    /// Otherwise a new buffer is appended to the registry under a brief lock;
    /// the zone-identity record is written, the prefix frozen, and the buffer
    /// published through the thread-local binding outside the lock. The
    /// registry grows permanently; registration is never reversed.
    pub fn enable_current_thread(&self, name: &str, zone_type: &str, location: &str) {
        let epoch = self.epoch.load(Ordering::Relaxed);
        let bound = THREAD_BUFFER
            .with(|slot| matches!(&*slot.borrow(), Some((tag, _)) if *tag == epoch));
        if bound {
            return;
        }

        let buffer = {
            let mut registry = self.buffers.lock().unwrap();
            let buffer = Arc::new(EventBuffer::new(self.strings.clone(), self.clock.clone()));
            registry.push(buffer.clone());
            buffer
        };

        let zone_id = StandardEvents::create_zone(&buffer, name, zone_type, location);
        StandardEvents::set_zone(&buffer, zone_id);
        buffer.set_active_zone(zone_id);
        buffer.freeze_prefix();
        THREAD_BUFFER.with(|slot| *slot.borrow_mut() = Some((epoch, buffer)));
    }

    /// Clear only the calling thread's binding. The buffer stays registered
    /// with all its data and will appear in later saves; re-enabling this
    /// thread allocates a fresh buffer with a new zone id.
    ///
    /// A binding belonging to another runtime instance is left alone.
    pub fn disable_current_thread(&self) {
        let epoch = self.epoch.load(Ordering::Relaxed);
        THREAD_BUFFER.with(|slot| {
            let mut slot = slot.borrow_mut();
            if matches!(&*slot, Some((tag, _)) if *tag == epoch) {
                *slot = None;
            }
        });
    }

    /// The calling thread's bound buffer, if it is enabled for this runtime.
    pub fn current_thread_buffer(&self) -> Option<Arc<EventBuffer>> {
        let epoch = self.epoch.load(Ordering::Relaxed);
        THREAD_BUFFER.with(|slot| match &*slot.borrow() {
            Some((tag, buffer)) if *tag == epoch => Some(buffer.clone()),
            _ => None,
        })
    }

    /// Copy the buffer list under the registry lock. The handles stay valid
    /// for the whole operation because the registry only ever appends.
    fn snapshot_buffers(&self) -> Vec<Arc<EventBuffer>> {
        self.buffers.lock().unwrap().clone()
    }

    fn write_header_chunk(&self, out: &mut OutputBuffer<'_>) -> bool {
        let mut ok = out.append_u32(MAGIC);
        ok &= out.append_u32(FORMAT_FAMILY);
        ok &= out.append_u32(CONTAINER_VERSION);

        let json = serde_json::to_string(&HeaderInfo::new()).unwrap_or_default();
        let part = PartHeader {
            part_type: PART_TYPE_METADATA,
            offset: 0,
            length: json.len() as u32,
        };
        let header = ChunkHeader {
            id: 1,
            chunk_type: CHUNK_TYPE_HEADER,
            start_time: TIME_NONE,
            end_time: TIME_NONE,
        };
        ok &= out.start_chunk(&header, &[part]);
        ok &= out.append(json.as_bytes());
        ok &= out.align();
        ok
    }

    /// Serialize the accumulated trace to `out`.
    ///
    /// Returns false if any write step failed; all steps are attempted even
    /// after a failure so a partially healthy sink recovers as much data as
    /// possible. Partial writes are not rolled back.
    pub fn save(&self, out: &mut dyn Write, options: &SaveOptions) -> bool {
        // Snapshot under the lock; everything after runs lock-free against
        // the registry, concurrently with appends on other threads.
        let local_buffers = self.snapshot_buffers();

        let mut out = OutputBuffer::new(out);
        let mut success = self.write_header_chunk(&mut out);

        // Materialize the event-definitions payload before measuring the
        // string table: encoding definitions interns their names.
        let def_buffer = EventBuffer::new(self.strings.clone(), self.clock.clone());
        for def in EventRegistry::global().definitions() {
            StandardEvents::define_event(&def_buffer, &def);
        }

        // Measurement pass: pure, no mutation.
        let thread_lens: Vec<u32> = local_buffers.iter().map(|b| b.measure_len()).collect();
        let def_len = def_buffer.measure_len();
        let events_len = def_len + thread_lens.iter().sum::<u32>();

        // The string table is finalized last so it covers every string
        // referenced by the payloads above.
        let strings_len = self.strings.measure_len();

        let parts: SmallVec<[PartHeader; 2]> = SmallVec::from_buf([
            PartHeader {
                part_type: PART_TYPE_STRINGS,
                offset: 0,
                length: strings_len,
            },
            PartHeader {
                part_type: PART_TYPE_EVENTS,
                offset: align_up(strings_len as usize) as u32,
                length: events_len,
            },
        ]);
        let header = ChunkHeader {
            id: 2,
            chunk_type: CHUNK_TYPE_EVENTS,
            start_time: 0,
            end_time: self.clock.timestamp_micros(),
        };
        success &= out.start_chunk(&header, &parts);

        // Commit pass: payload order must match part-header order.
        success &= self.strings.write_to(&mut out, strings_len);
        success &= out.align();
        success &= def_buffer.write_to(Some(&mut out), def_len, false);
        for (buffer, len) in local_buffers.iter().zip(&thread_lens) {
            success &= buffer.write_to(Some(&mut out), *len, options.clear_thread_data);
        }
        success &= out.align();

        success && out.healthy()
    }

    /// Save to a file, creating or truncating it. Returns false if the file
    /// cannot be opened or any write fails; a failed save may leave a
    /// truncated file behind.
    pub fn save_to_file(&self, path: impl AsRef<Path>, options: &SaveOptions) -> bool {
        let Ok(file) = File::create(path) else {
            return false;
        };
        let mut writer = BufWriter::new(file);
        let mut success = self.save(&mut writer, options);
        success &= writer.flush().is_ok();
        success
    }

    /// Truncate every buffer's mutable region without producing a file: the
    /// same measure-then-write pass as a save, directed at no sink, with
    /// clearing forced on. The string table is untouched.
    pub fn clear_thread_data(&self) {
        for buffer in self.snapshot_buffers() {
            let len = buffer.measure_len();
            buffer.write_to(None, len, true);
        }
    }

    /// Discard the entire buffer registry and clear the string table.
    ///
    /// Destructive and test-only: not safe while any thread may be
    /// concurrently registering or appending. Thread-local bindings created
    /// before the reset are invalidated.
    pub fn reset_for_testing(&self) {
        self.buffers.lock().unwrap().clear();
        self.strings.clear();
        self.epoch.store(fresh_epoch(), Ordering::Relaxed);
    }

    #[cfg(test)]
    fn registered_buffer_count(&self) -> usize {
        self.buffers.lock().unwrap().len()
    }
}

impl Default for TraceRuntime {
    fn default() -> Self {
        Self::new()
    }
}
