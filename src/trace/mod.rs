pub mod buffer;
pub mod events;
pub mod format;
pub mod output;
pub mod reader;
pub mod runtime;
pub mod strings;

pub use buffer::EventBuffer;
pub use events::{
    ArgKind, EVENT_FLAG_BUILTIN, EVENT_FLAG_INTERNAL, EventClass, EventDefinition, EventRegistry,
    FIRST_USER_WIRE_ID, StandardEvents, WIRE_EVENT_DEFINE, WIRE_SCOPE_LEAVE, WIRE_ZONE_CREATE,
    WIRE_ZONE_SET,
};
pub use format::{ChunkHeader, ContextInfo, HeaderInfo, PartHeader};
pub use output::OutputBuffer;
pub use reader::{ParsedEvent, Trace, ZoneInfo};
pub use runtime::{Clock, SaveOptions, TraceRuntime};
pub use strings::StringTable;
