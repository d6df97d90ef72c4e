//! Core data model shared by the bus, strategies, and execution layer.

mod command;
mod document;
mod event;
mod strategy;

pub use command::{Command, CommandKind, Side};
pub use document::Document;
pub use event::{Event, FILL_EVENT_TYPES};
pub use strategy::Strategy;
