//! Read-only inspection of running sandboxes.

pub mod cpu_filter;

pub use cpu_filter::{print_cpu_filter, CpuInspection, InspectOutcome};
