//! Observability
//!
//! Structured audit events for security-relevant decisions.

pub mod audit;
