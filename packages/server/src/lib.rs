//! Real-time conversation synchronization engine.
//!
//! Conversations get gap-free per-conversation sequence numbers, messages are
//! fanned out to every live connection of their participants, reconnecting
//! clients catch up by replaying the log from the last sequence they know, and
//! presence is aggregated across each user's connections.

// layers
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;

pub mod config;
pub mod engine;
