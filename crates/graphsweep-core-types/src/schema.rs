//! Canonical schema constants for structured logging and events
//!
//! These constants ensure consistency across all logging and error reporting.

// Canonical field keys for structured logging
pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";
pub const FIELD_RUN_ID: &str = "run_id";

// Run state
pub const FIELD_PHASE: &str = "phase";
pub const FIELD_ACTION: &str = "action";
pub const FIELD_SNAPSHOT: &str = "snapshot";

// Object identifiers
pub const FIELD_OBJECT: &str = "object";
pub const FIELD_PARENT: &str = "parent";
pub const FIELD_TYPE_NAME: &str = "type_name";
pub const FIELD_ADDON: &str = "addon";

// Collection sizes
pub const FIELD_OBJECT_COUNT: &str = "object_count";
pub const FIELD_REMOVABLE_COUNT: &str = "removable_count";

// Error fields
pub const FIELD_ERR_KIND: &str = "err.kind";
pub const FIELD_ERR_CODE: &str = "err.code";

// Canonical event names
pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";
