//! Configuration
//!
//! Sandbox configuration values, CPU list parsing, and JSON profiles.

pub mod cpu_list;
pub mod profile;
pub mod types;
