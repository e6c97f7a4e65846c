//! Utilities shared by the Chatter binaries and the synchronization engine.

pub mod logger;
pub mod time;
