//! Run-state artifacts
//!
//! State handed from the launcher to the payload across the re-exec boundary.

pub mod mask_store;
