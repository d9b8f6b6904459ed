//! `scene_server`
//!
//! Server-side systems:
//! - Authoritative world owned by a single control task
//! - Session registry with per-session outbound queues
//! - Fixed-rate tick scheduler with measured `dt`
//! - Command routing and event fan-out
//!
//! Networking model:
//! - TCP, one length-prefixed JSON envelope per frame
//! - Push dialect: full `world_state` every tick
//! - Command dialect: `EVENT` per applied command

pub mod registry;
pub mod scheduler;
pub mod server;

pub use registry::{SessionId, SessionRegistry};
pub use server::{run, spawn_ephemeral, SceneServer};
