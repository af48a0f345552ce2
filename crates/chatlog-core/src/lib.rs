//! # chatlog-core
//!
//! Core types and pure logic for the chatlog message archive.
//!
//! This crate provides the data model shared by the storage and capture
//! crates: message records and their identity keys, user-defined filter
//! rules, the search view used by the settings panel, the event bus used to
//! notify an open view, and the centralized defaults.

pub mod clock;
pub mod defaults;
pub mod error;
pub mod events;
pub mod filter;
pub mod key;
pub mod models;
pub mod view;

// Re-export commonly used types at crate root
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{Error, Result};
pub use events::{CaptureEvent, EventBus};
pub use filter::{should_filter, FilterField, FilterRuleSet};
pub use key::{capture_key, message_key, same_message};
pub use models::*;
pub use view::{KindFilter, MessageQuery, MessageStats, MessageView, ViewHandle};
