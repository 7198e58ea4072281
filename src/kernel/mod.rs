//! Thin wrappers around Linux kernel primitives.
//!
//! All `unsafe` code is concentrated here with explicit SAFETY comments.
//! Dependency direction: proc -> credentials -> affinity

pub mod affinity;
pub mod credentials;
pub mod proc;
