//! cpujail: CPU affinity restriction and inspection for sandboxed workloads
//!
//! # Architecture
//!
//! ## Configuration ([`config`])
//! - [`config::types`]: `CpuMask`, `SandboxConfig`, and the `JailError` kinds
//! - [`config::cpu_list`]: textual CPU list (`"0,1,5"`) to mask
//! - [`config::profile`]: JSON sandbox profiles
//!
//! ## Kernel Primitives ([`kernel`])
//! - [`kernel::credentials`]: scoped effective-UID elevation and the final drop
//! - [`kernel::affinity`]: apply and verify scheduler affinity
//! - [`kernel::proc`]: procfs identity lookups
//!
//! ## Run State ([`safety`])
//! - [`safety::mask_store`]: mask persisted across the re-exec boundary
//!
//! ## Inspection ([`inspect`])
//! - [`inspect::cpu_filter`]: authorization-checked `Cpus_allowed_list` report
//!
//! ## Observability ([`observability`])
//! - [`observability::audit`]: structured audit events
//!
//! # Privilege model
//!
//! cpujail is installed setuid root. At startup the effective UID is lowered
//! to the real UID; root is only held inside a `RootGuard` around one
//! sensitive call. The payload drops all three UIDs before exec.

// Configuration
pub mod config;

// Kernel Primitives
pub mod kernel;

// Run State
pub mod safety;

// Inspection
pub mod inspect;

// Observability
pub mod observability;

// CLI entrypoint wiring for the cpujail binary.
pub mod cli;

pub use config::types::*;
