//! Low-overhead multi-threaded event tracing.
//!
//! Application threads register once with
//! [`TraceRuntime::enable_current_thread`], then append structured events
//! into their own buffer with no cross-thread locking. At any point an
//! administrative caller serializes the accumulated trace into a
//! self-describing chunked binary file with [`TraceRuntime::save`] or
//! [`TraceRuntime::save_to_file`]; [`Trace`] reads those files back.
//!
//! ```no_run
//! use zonetrace::{SaveOptions, StandardEvents, TraceRuntime};
//!
//! let runtime = TraceRuntime::new();
//! runtime.enable_current_thread("main", "script", "main.rs:1");
//! let buffer = runtime.current_thread_buffer().unwrap();
//! StandardEvents::scope_leave(&buffer);
//! assert!(runtime.save_to_file("trace.wtf-trace", &SaveOptions::DEFAULT));
//! ```

pub mod trace;

pub use trace::{
    EventBuffer, EventClass, EventDefinition, EventRegistry, SaveOptions, StandardEvents,
    StringTable, Trace, TraceRuntime, ZoneInfo,
};
