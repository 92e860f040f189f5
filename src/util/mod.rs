//! Shared utilities

pub mod id;
pub mod rate_limit;
pub mod time;
