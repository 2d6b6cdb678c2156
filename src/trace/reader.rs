//! Reads trace files produced by [`TraceRuntime::save`].
//!
//! The container is self-describing: after validating the three fixed
//! file-header words, the reader walks the chunk stream, decodes the string
//! table, and then decodes the events part using the `wtf.event#define`
//! records it encounters (bootstrapped by the built-in signatures). Used by
//! downstream tooling and by the integration tests to verify referential
//! closure of every string id a file references.
//!
//! [`TraceRuntime::save`]: crate::trace::runtime::TraceRuntime::save

use crate::trace::events::{
    ArgKind, EventClass, EventDefinition, FIRST_USER_WIRE_ID, WIRE_EVENT_DEFINE, WIRE_ZONE_CREATE,
    builtin_definitions,
};
use crate::trace::format::{
    CHUNK_TYPE_EVENTS, CHUNK_TYPE_HEADER, FILE_HEADER_SIZE, HeaderInfo, PART_TYPE_EVENTS,
    PART_TYPE_METADATA, PART_TYPE_STRINGS, PartHeader, align_up, read_file_header,
};
use std::collections::HashMap;
use std::io::{Cursor, Error, ErrorKind, Result};
use std::path::Path;

/// One decoded event record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEvent {
    pub wire_id: u32,
    pub timestamp: u32,
    pub args: Vec<u32>,
}

/// A zone-identity record resolved against the string table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneInfo {
    pub id: u32,
    pub name: String,
    pub zone_type: String,
    pub location: String,
}

/// A fully parsed trace file.
#[derive(Debug)]
pub struct Trace {
    pub header: HeaderInfo,
    /// String-table entries; id N resolves to `strings[N - 1]`, id 0 is "".
    pub strings: Vec<String>,
    /// All definitions known to the file: builtins plus every
    /// `wtf.event#define` record, keyed by wire id.
    pub definitions: HashMap<u32, EventDefinition>,
    /// Every record in the events part, in file order.
    pub events: Vec<ParsedEvent>,
}

fn invalid(msg: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidData, msg.into())
}

fn word_at(bytes: &[u8], pos: usize) -> Result<u32> {
    let end = pos
        .checked_add(4)
        .filter(|&end| end <= bytes.len())
        .ok_or_else(|| invalid("truncated word"))?;
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[pos..end]);
    Ok(u32::from_le_bytes(word))
}

impl Trace {
    pub fn read(path: impl AsRef<Path>) -> Result<Trace> {
        Self::from_bytes(&std::fs::read(path)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Trace> {
        read_file_header(&mut Cursor::new(bytes))?;

        let mut header = None;
        let mut strings = Vec::new();
        let mut definitions: HashMap<u32, EventDefinition> = builtin_definitions()
            .into_iter()
            .map(|def| (def.wire_id, def))
            .collect();
        let mut events = Vec::new();

        let mut pos = FILE_HEADER_SIZE;
        while pos < bytes.len() {
            let chunk_type = word_at(bytes, pos + 4)?;
            let part_count = word_at(bytes, pos + 16)? as usize;
            pos += 20;
            if part_count > 64 {
                return Err(invalid(format!("implausible part count {part_count}")));
            }

            let mut parts = Vec::with_capacity(part_count);
            for _ in 0..part_count {
                parts.push(PartHeader {
                    part_type: word_at(bytes, pos)?,
                    offset: word_at(bytes, pos + 4)?,
                    length: word_at(bytes, pos + 8)?,
                });
                pos += 12;
            }

            let payload_len = parts
                .iter()
                .map(|p| p.offset as usize + p.length as usize)
                .max()
                .unwrap_or(0);
            if pos + payload_len > bytes.len() {
                return Err(invalid("truncated chunk payload"));
            }
            let payload = &bytes[pos..pos + payload_len];

            for part in &parts {
                let body =
                    &payload[part.offset as usize..part.offset as usize + part.length as usize];
                match (chunk_type, part.part_type) {
                    (CHUNK_TYPE_HEADER, PART_TYPE_METADATA) => {
                        header = Some(
                            serde_json::from_slice::<HeaderInfo>(body)
                                .map_err(|e| invalid(format!("bad metadata document: {e}")))?,
                        );
                    }
                    (CHUNK_TYPE_EVENTS, PART_TYPE_STRINGS) => {
                        strings = parse_strings(body)?;
                    }
                    (CHUNK_TYPE_EVENTS, PART_TYPE_EVENTS) => {
                        parse_events(body, &mut definitions, &strings, &mut events)?;
                    }
                    _ => {}
                }
            }
            pos += align_up(payload_len);
        }

        let header = header.ok_or_else(|| invalid("missing header chunk"))?;
        Ok(Trace {
            header,
            strings,
            definitions,
            events,
        })
    }

    /// Resolve a string id. Id 0 is the empty string.
    pub fn string(&self, id: u32) -> Option<&str> {
        if id == 0 {
            Some("")
        } else {
            self.strings.get(id as usize - 1).map(String::as_str)
        }
    }

    /// Zone-identity records in file order (which is registration order).
    pub fn zones(&self) -> Vec<ZoneInfo> {
        self.events
            .iter()
            .filter(|event| event.wire_id == WIRE_ZONE_CREATE && event.args.len() >= 4)
            .map(|event| ZoneInfo {
                id: event.args[0],
                name: self.string(event.args[1]).unwrap_or("").to_string(),
                zone_type: self.string(event.args[2]).unwrap_or("").to_string(),
                location: self.string(event.args[3]).unwrap_or("").to_string(),
            })
            .collect()
    }

    /// All records with the given wire id, in file order.
    pub fn events_with(&self, wire_id: u32) -> Vec<&ParsedEvent> {
        self.events
            .iter()
            .filter(|event| event.wire_id == wire_id)
            .collect()
    }

    /// Verify referential closure: every string id referenced by any record
    /// resolves within this file's string table.
    pub fn check_string_refs(&self) -> std::result::Result<(), String> {
        for event in &self.events {
            let def = self
                .definitions
                .get(&event.wire_id)
                .ok_or_else(|| format!("no definition for wire id {}", event.wire_id))?;
            for (kind, &arg) in def.arg_kinds().iter().zip(&event.args) {
                if *kind == ArgKind::StringId && self.string(arg).is_none() {
                    return Err(format!(
                        "event {} references string id {} but the table has {} entries",
                        def.name,
                        arg,
                        self.strings.len()
                    ));
                }
            }
        }
        Ok(())
    }
}

fn parse_strings(body: &[u8]) -> Result<Vec<String>> {
    if body.is_empty() {
        return Ok(Vec::new());
    }
    if body.last() != Some(&0) {
        return Err(invalid("strings part not NUL-terminated"));
    }
    body[..body.len() - 1]
        .split(|&b| b == 0)
        .map(|entry| {
            String::from_utf8(entry.to_vec()).map_err(|_| invalid("non-UTF-8 string entry"))
        })
        .collect()
}

fn parse_events(
    body: &[u8],
    definitions: &mut HashMap<u32, EventDefinition>,
    strings: &[String],
    events: &mut Vec<ParsedEvent>,
) -> Result<()> {
    if body.len() % 4 != 0 {
        return Err(invalid("events part is not word-aligned"));
    }
    let resolve = |id: u32| -> Result<String> {
        if id == 0 {
            return Ok(String::new());
        }
        strings
            .get(id as usize - 1)
            .cloned()
            .ok_or_else(|| invalid(format!("dangling string id {id} in definition")))
    };

    let mut pos = 0;
    while pos < body.len() {
        let wire_id = word_at(body, pos)?;
        let timestamp = word_at(body, pos + 4)?;
        pos += 8;

        let arg_count = definitions
            .get(&wire_id)
            .ok_or_else(|| invalid(format!("record with unknown wire id {wire_id}")))?
            .arg_count();
        let mut args = Vec::with_capacity(arg_count);
        for _ in 0..arg_count {
            args.push(word_at(body, pos)?);
            pos += 4;
        }

        // Builtin signatures are fixed a priori; every file re-emits their
        // define records, but a define must never overwrite one, or a crafted
        // file could change the argument counts later records are parsed with.
        if wire_id == WIRE_EVENT_DEFINE && args[0] >= FIRST_USER_WIRE_ID {
            let class = EventClass::from_wire(args[1])
                .ok_or_else(|| invalid(format!("unknown event class {}", args[1])))?;
            let def = EventDefinition {
                wire_id: args[0],
                class,
                flags: args[2],
                name: resolve(args[3])?,
                arguments: resolve(args[4])?,
            };
            definitions.insert(def.wire_id, def);
        }
        events.push(ParsedEvent {
            wire_id,
            timestamp,
            args,
        });
    }
    Ok(())
}
