//! WebSocket transport and client state sync

pub mod handler;
pub mod protocol;
pub mod sync;
