//! Domain types and models

pub mod document;
pub mod event;
pub mod guild;
pub mod reaction;
pub mod snowflake;

pub use document::StorageDocument;
pub use event::Event;
pub use guild::{Guild, User};
pub use reaction::{Reaction, ReactionRecord};
