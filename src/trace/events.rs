//! Event schema: definitions, the global registry, and the standard events.
//!
//! Every event kind that can appear in a trace has an [`EventDefinition`] in
//! the process-wide [`EventRegistry`]. A save materializes the full registry
//! into the file as `wtf.event#define` records, making the file
//! self-describing: a reader only needs the built-in signatures below to
//! bootstrap.
//!
//! Wire ids 1..=4 are fixed built-ins; user registrations start at
//! [`FIRST_USER_WIRE_ID`]. Each argument occupies one u32 word on the wire:
//! integer types inline, `ascii`/`utf8` as string-table ids.

use crate::trace::buffer::EventBuffer;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, OnceLock};

pub const WIRE_EVENT_DEFINE: u32 = 1;
pub const WIRE_SCOPE_LEAVE: u32 = 2;
pub const WIRE_ZONE_CREATE: u32 = 3;
pub const WIRE_ZONE_SET: u32 = 4;
pub const FIRST_USER_WIRE_ID: u32 = 5;

pub const EVENT_FLAG_BUILTIN: u32 = 1 << 0;
pub const EVENT_FLAG_INTERNAL: u32 = 1 << 1;

#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClass {
    /// A point-in-time event.
    Instance = 0,
    /// Opens a scope on the calling thread's zone; closed by
    /// `wtf.scope#leave`.
    Scoped = 1,
}

impl EventClass {
    pub fn from_wire(value: u32) -> Option<Self> {
        match value {
            0 => Some(EventClass::Instance),
            1 => Some(EventClass::Scoped),
            _ => None,
        }
    }
}

/// How one argument of an event is encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// Inline integer word.
    Word,
    /// String-table id (`ascii` / `utf8` argument types).
    StringId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDefinition {
    pub wire_id: u32,
    pub class: EventClass,
    pub flags: u32,
    pub name: String,
    /// Comma-separated `type name` signature, e.g. `"uint32 zoneId, ascii name"`.
    pub arguments: String,
}

impl EventDefinition {
    pub fn arg_count(&self) -> usize {
        if self.arguments.trim().is_empty() {
            0
        } else {
            self.arguments.split(',').count()
        }
    }

    /// Wire encoding of each argument, derived from the signature's type
    /// tokens.
    pub fn arg_kinds(&self) -> Vec<ArgKind> {
        if self.arguments.trim().is_empty() {
            return Vec::new();
        }
        self.arguments
            .split(',')
            .map(|arg| match arg.trim().split_whitespace().next() {
                Some("ascii") | Some("utf8") => ArgKind::StringId,
                _ => ArgKind::Word,
            })
            .collect()
    }
}

/// The fixed definitions every trace file and reader agrees on a priori.
pub fn builtin_definitions() -> Vec<EventDefinition> {
    vec![
        EventDefinition {
            wire_id: WIRE_EVENT_DEFINE,
            class: EventClass::Instance,
            flags: EVENT_FLAG_BUILTIN | EVENT_FLAG_INTERNAL,
            name: "wtf.event#define".to_string(),
            arguments: "uint32 wireId, uint16 eventClass, uint32 flags, ascii name, ascii args"
                .to_string(),
        },
        EventDefinition {
            wire_id: WIRE_SCOPE_LEAVE,
            class: EventClass::Instance,
            flags: EVENT_FLAG_BUILTIN,
            name: "wtf.scope#leave".to_string(),
            arguments: String::new(),
        },
        EventDefinition {
            wire_id: WIRE_ZONE_CREATE,
            class: EventClass::Instance,
            flags: EVENT_FLAG_BUILTIN | EVENT_FLAG_INTERNAL,
            name: "wtf.zone#create".to_string(),
            arguments: "uint32 zoneId, ascii name, ascii type, ascii location".to_string(),
        },
        EventDefinition {
            wire_id: WIRE_ZONE_SET,
            class: EventClass::Instance,
            flags: EVENT_FLAG_BUILTIN | EVENT_FLAG_INTERNAL,
            name: "wtf.zone#set".to_string(),
            arguments: "uint32 zoneId".to_string(),
        },
    ]
}

/// Process-wide, append-only schema registry.
///
/// The registry is schema, not data: it survives a runtime reset, and a save
/// snapshots it read-only to materialize the definitions payload.
pub struct EventRegistry {
    defs: Mutex<Vec<EventDefinition>>,
}

static REGISTRY: OnceLock<EventRegistry> = OnceLock::new();

impl EventRegistry {
    fn with_builtins() -> Self {
        Self {
            defs: Mutex::new(builtin_definitions()),
        }
    }

    pub fn global() -> &'static EventRegistry {
        REGISTRY.get_or_init(EventRegistry::with_builtins)
    }

    /// Register a new event kind, returning its wire id.
    pub fn register(
        &self,
        name: &str,
        arguments: &str,
        class: EventClass,
        flags: u32,
    ) -> u32 {
        let mut defs = self.defs.lock().unwrap();
        let wire_id = FIRST_USER_WIRE_ID + (defs.len() - builtin_count()) as u32;
        defs.push(EventDefinition {
            wire_id,
            class,
            flags,
            name: name.to_string(),
            arguments: arguments.to_string(),
        });
        wire_id
    }

    /// Snapshot of all definitions in registration order.
    pub fn definitions(&self) -> Vec<EventDefinition> {
        self.defs.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.defs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn builtin_count() -> usize {
    (FIRST_USER_WIRE_ID - 1) as usize
}

// The global zone-id source. Ids are unique within one process lifetime,
// which is all the format requires.
static NEXT_ZONE_ID: AtomicU32 = AtomicU32::new(1);

/// Encoders for the built-in event kinds.
pub struct StandardEvents;

impl StandardEvents {
    /// Assign a fresh zone id and append the zone-identity record.
    pub fn create_zone(buffer: &EventBuffer, name: &str, zone_type: &str, location: &str) -> u32 {
        let zone_id = NEXT_ZONE_ID.fetch_add(1, Ordering::Relaxed);
        let strings = buffer.string_table();
        let args = [
            zone_id,
            strings.intern(name),
            strings.intern(zone_type),
            strings.intern(location),
        ];
        buffer.append(WIRE_ZONE_CREATE, &args);
        zone_id
    }

    pub fn set_zone(buffer: &EventBuffer, zone_id: u32) {
        buffer.append(WIRE_ZONE_SET, &[zone_id]);
    }

    pub fn scope_leave(buffer: &EventBuffer) {
        buffer.append(WIRE_SCOPE_LEAVE, &[]);
    }

    /// Append one `wtf.event#define` record for `def`. Interning the name and
    /// signature is a side effect on the shared string table, which is why a
    /// save finalizes the string table only after the definitions payload.
    pub fn define_event(buffer: &EventBuffer, def: &EventDefinition) {
        let strings = buffer.string_table();
        let args = [
            def.wire_id,
            def.class as u32,
            def.flags,
            strings.intern(&def.name),
            strings.intern(&def.arguments),
        ];
        buffer.append(WIRE_EVENT_DEFINE, &args);
    }
}
