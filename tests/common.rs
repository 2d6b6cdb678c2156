use std::sync::OnceLock;
use zonetrace::{EventClass, EventRegistry, SaveOptions, TraceRuntime};

/// Wire id of a shared `uint32 value` test event, registered once per test
/// binary (the registry is process-wide and append-only).
#[allow(dead_code)]
pub fn tick_event() -> u32 {
    static ID: OnceLock<u32> = OnceLock::new();
    *ID.get_or_init(|| {
        EventRegistry::global().register("test#tick", "uint32 value", EventClass::Instance, 0)
    })
}

/// Wire id of a shared `ascii text` test event.
#[allow(dead_code)]
pub fn note_event() -> u32 {
    static ID: OnceLock<u32> = OnceLock::new();
    *ID.get_or_init(|| {
        EventRegistry::global().register("test#note", "ascii text", EventClass::Instance, 0)
    })
}

/// Save the runtime's trace into memory, asserting success.
#[allow(dead_code)]
pub fn save_bytes(runtime: &TraceRuntime, options: &SaveOptions) -> Vec<u8> {
    let mut bytes = Vec::new();
    assert!(runtime.save(&mut bytes, options), "save reported failure");
    bytes
}
