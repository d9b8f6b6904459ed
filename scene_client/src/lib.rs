//! `scene_client`
//!
//! Client-side systems:
//! - Framed connection speaking both dialects
//! - Local replica of the scene, fed by snapshots and events
//! - Position interpolation between the two most recent snapshots

pub mod client;
pub mod replica;

pub use client::SceneClient;
pub use replica::Replica;
