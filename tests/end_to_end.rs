//! Full-pipeline tests: register threads, append events, save, read the file
//! back and verify the container against the recording that produced it.

mod common;

use assert2::check;
use std::sync::{Arc, Barrier, mpsc};
use zonetrace::trace::events::{WIRE_ZONE_CREATE, WIRE_ZONE_SET};
use zonetrace::trace::format;
use zonetrace::{SaveOptions, StandardEvents, Trace, TraceRuntime};

#[test]
fn file_begins_with_fixed_header_words() {
    let runtime = TraceRuntime::new();
    let a = common::save_bytes(&runtime, &SaveOptions::DEFAULT);
    let b = common::save_bytes(&runtime, &SaveOptions::DEFAULT);

    for bytes in [&a, &b] {
        check!(&bytes[0..4] == &format::MAGIC.to_le_bytes());
        check!(&bytes[4..8] == &format::FORMAT_FAMILY.to_le_bytes());
        check!(&bytes[8..12] == &format::CONTAINER_VERSION.to_le_bytes());
    }
    // Byte-identical across runs of the save path.
    check!(a[..12] == b[..12]);
}

#[test]
fn registration_order_is_preserved_in_save_output() {
    let runtime = Arc::new(TraceRuntime::new());
    let names = ["order-t1", "order-t2", "order-t3"];

    // Register the threads strictly in order, then release them all at once
    // so their event appends interleave in arbitrary chronological order.
    let barrier = Arc::new(Barrier::new(names.len()));
    let mut handles = Vec::new();
    for (i, &name) in names.iter().enumerate() {
        let runtime = runtime.clone();
        let barrier = barrier.clone();
        let (registered_tx, registered_rx) = mpsc::channel();
        handles.push(std::thread::spawn(move || {
            runtime.enable_current_thread(name, "worker", "end_to_end.rs");
            registered_tx.send(()).unwrap();
            barrier.wait();
            let buffer = runtime.current_thread_buffer().unwrap();
            // Uneven per-thread volume so payload sizes differ.
            for _ in 0..(names.len() - i) {
                StandardEvents::scope_leave(&buffer);
            }
        }));
        registered_rx.recv().unwrap();
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let trace = Trace::from_bytes(&common::save_bytes(&runtime, &SaveOptions::DEFAULT)).unwrap();
    trace.check_string_refs().unwrap();

    let zones = trace.zones();
    check!(zones.len() == names.len());
    let zone_names: Vec<&str> = zones.iter().map(|z| z.name.as_str()).collect();
    check!(zone_names == names, "output order must equal registration order");

    // Zone ids ascend with registration order.
    check!(zones[0].id < zones[1].id);
    check!(zones[1].id < zones[2].id);

    // Each thread payload opens with its zone identity: zone-create directly
    // followed by zone-set for the same id.
    for zone in &zones {
        let set = trace
            .events_with(WIRE_ZONE_SET)
            .iter()
            .any(|e| e.args[0] == zone.id);
        check!(set, "zone {} has no zone-set record", zone.id);
    }
}

#[test]
fn enable_twice_produces_one_zone() {
    let runtime = TraceRuntime::new();
    runtime.enable_current_thread("idem", "script", "end_to_end.rs");
    runtime.enable_current_thread("idem", "script", "end_to_end.rs");

    let trace = Trace::from_bytes(&common::save_bytes(&runtime, &SaveOptions::DEFAULT)).unwrap();
    check!(trace.events_with(WIRE_ZONE_CREATE).len() == 1);
    runtime.disable_current_thread();
}

#[test]
fn disabled_thread_data_still_appears_in_saves() {
    let runtime = Arc::new(TraceRuntime::new());
    let rt = runtime.clone();
    std::thread::spawn(move || {
        rt.enable_current_thread("short-lived", "worker", "end_to_end.rs");
        let buffer = rt.current_thread_buffer().unwrap();
        StandardEvents::scope_leave(&buffer);
        rt.disable_current_thread();
    })
    .join()
    .unwrap();

    // The thread is gone; its buffer and zone must survive in the registry.
    let trace = Trace::from_bytes(&common::save_bytes(&runtime, &SaveOptions::DEFAULT)).unwrap();
    let zones = trace.zones();
    check!(zones.len() == 1);
    check!(zones[0].name == "short-lived");
}

#[test]
fn custom_events_roundtrip_with_string_arguments() {
    let runtime = TraceRuntime::new();
    runtime.enable_current_thread("custom", "script", "end_to_end.rs");
    let buffer = runtime.current_thread_buffer().unwrap();

    let tick = common::tick_event();
    let note = common::note_event();
    buffer.append(tick, &[41]);
    buffer.append(tick, &[42]);
    let text_id = buffer.string_table().intern("hello trace");
    buffer.append(note, &[text_id]);

    let trace = Trace::from_bytes(&common::save_bytes(&runtime, &SaveOptions::DEFAULT)).unwrap();
    trace.check_string_refs().unwrap();

    let ticks = trace.events_with(tick);
    check!(ticks.len() == 2);
    check!(ticks[0].args == vec![41]);
    check!(ticks[1].args == vec![42]);

    let notes = trace.events_with(note);
    check!(notes.len() == 1);
    check!(trace.string(notes[0].args[0]) == Some("hello trace"));

    // The file carries the definitions for both custom events.
    check!(trace.definitions[&tick].name == "test#tick");
    check!(trace.definitions[&note].arguments == "ascii text");
    runtime.disable_current_thread();
}

#[test]
fn saves_run_concurrently_with_appends() {
    let runtime = Arc::new(TraceRuntime::new());
    runtime.enable_current_thread("saver", "script", "end_to_end.rs");

    let rt = runtime.clone();
    let appender = std::thread::spawn(move || {
        rt.enable_current_thread("appender", "worker", "end_to_end.rs");
        let buffer = rt.current_thread_buffer().unwrap();
        for _ in 0..10_000 {
            StandardEvents::scope_leave(&buffer);
        }
        rt.disable_current_thread();
    });

    // Every snapshot taken while the other thread appends must still parse
    // and be referentially closed.
    for _ in 0..20 {
        let trace =
            Trace::from_bytes(&common::save_bytes(&runtime, &SaveOptions::DEFAULT)).unwrap();
        trace.check_string_refs().unwrap();
    }
    appender.join().unwrap();
    runtime.disable_current_thread();
}
