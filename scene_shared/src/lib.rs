//! `scene_shared`
//!
//! Shared libraries used by both client and server.
//!
//! Design goals:
//! - One authoritative entity store with explicit outcomes for every mutation.
//! - Closed, typed command and message vocabularies.
//! - Deterministic snapshots for a fixed mutation sequence.
//! - No `unsafe`.

pub mod command;
pub mod config;
pub mod entity;
pub mod event;
pub mod math;
pub mod net;
pub mod protocol;
pub mod world;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::command::*;
    pub use crate::config::*;
    pub use crate::entity::*;
    pub use crate::event::*;
    pub use crate::math::*;
    pub use crate::protocol::{Dialect, Envelope, MessageType, ProtocolError, UnknownDialect};
    pub use crate::world::*;
}
