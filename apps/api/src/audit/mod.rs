//! Audit pipeline — observes every HTTP exchange, sanitizes it, and persists
//! a record on a background task so the client response is never delayed.

pub mod recorder;
pub mod sanitize;
pub mod store;
