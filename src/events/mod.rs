//! Event Model
//!
//! Patterns, priorities and the event envelope shared by the dispatcher and
//! every handler.

pub mod event;
pub mod pattern;
pub mod priority;

pub use event::{EmitOptions, Event, EventMetadata};
pub use pattern::{EventPattern, IntoPattern, HANDLER_ERROR, MODULE_ACTIVATED, MODULE_DEACTIVATED, MODULE_REGISTERED, WILDCARD};
pub use priority::Priority;
