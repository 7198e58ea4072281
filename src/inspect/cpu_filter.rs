//! Authorization-checked inspection of a running sandbox's CPU affinity.
//!
//! The inspection is a fixed sequence enforced by type-state:
//!
//! ```text
//! Start -> IdentityResolved -> Authorized -> Inspected
//!                                 \-> Denied (PermissionDenied)
//! ```
//!
//! Skipping authorization does not compile:
//!
//! ```compile_fail
//! use cpujail::inspect::CpuInspection;
//! use cpujail::kernel::proc::ProcFs;
//! use nix::unistd::Pid;
//!
//! let procfs = ProcFs::new();
//! let inspection = CpuInspection::new(&procfs, "cpujail", Pid::from_raw(1)).resolve_identity();
//! // IdentityResolved has no inspect(); only Authorized does.
//! inspection.inspect(&mut std::io::sink());
//! ```
//!
//! Neither does authorizing before the identity is resolved:
//!
//! ```compile_fail
//! use cpujail::inspect::CpuInspection;
//! use cpujail::kernel::proc::ProcFs;
//! use nix::unistd::{Pid, Uid};
//!
//! let procfs = ProcFs::new();
//! let inspection = CpuInspection::new(&procfs, "cpujail", Pid::from_raw(1));
//! inspection.authorize(Uid::from_raw(0));
//! ```

use crate::config::types::{JailError, Result};
use crate::kernel::credentials::{assert_user_phase, RootGuard};
use crate::kernel::proc::ProcFs;
use crate::observability::audit::events;
use nix::unistd::{Pid, Uid};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::marker::PhantomData;
use std::path::PathBuf;

/// Status line carrying the kernel's allowed-CPU list.
pub const CPUS_ALLOWED_PREFIX: &[u8] = b"Cpus_allowed_list:";

pub struct Start;
pub struct IdentityResolved;
pub struct Authorized;

/// Result of the final step. Every variant ends the command with exit 0.
#[derive(Debug)]
pub enum InspectOutcome {
    /// The `Cpus_allowed_list:` line was written out
    Printed,
    /// The status file has no such line; nothing was written
    NoMatch,
    /// The status file could not be opened
    Unreadable { path: PathBuf, source: std::io::Error },
}

/// One inspection of one target pid.
pub struct CpuInspection<'a, S> {
    procfs: &'a ProcFs,
    launcher_name: &'a str,
    target: Pid,
    _state: PhantomData<S>,
}

impl<'a, S> CpuInspection<'a, S> {
    /// The pid whose affinity will be reported.
    pub fn target(&self) -> Pid {
        self.target
    }

    fn advance<T>(self, target: Pid) -> CpuInspection<'a, T> {
        CpuInspection {
            procfs: self.procfs,
            launcher_name: self.launcher_name,
            target,
            _state: PhantomData,
        }
    }
}

impl<'a> CpuInspection<'a, Start> {
    /// # Panics
    ///
    /// Panics outside the user phase (effective UID != real UID).
    pub fn new(procfs: &'a ProcFs, launcher_name: &'a str, pid: Pid) -> Self {
        assert_user_phase();
        Self {
            procfs,
            launcher_name,
            target: pid,
            _state: PhantomData,
        }
    }

    /// Swap a launcher pid for the pid of its first child, the workload.
    pub fn resolve_identity(self) -> CpuInspection<'a, IdentityResolved> {
        let comm = {
            let _root = RootGuard::acquire();
            self.procfs.command_name(self.target)
        };

        let mut target = self.target;
        if comm.as_deref() == Some(self.launcher_name) {
            if let Some(child) = self.procfs.first_child(self.target) {
                log::debug!("pid {} is the launcher, inspecting child {}", self.target, child);
                events::launcher_redirect(self.target.as_raw(), child.as_raw());
                target = child;
            }
        }

        self.advance(target)
    }
}

impl<'a> CpuInspection<'a, IdentityResolved> {
    /// Root may inspect anything; everyone else only their own sandboxes.
    /// A target whose owner cannot be read is treated as foreign.
    pub fn authorize(self, caller: Uid) -> Result<CpuInspection<'a, Authorized>> {
        if !caller.is_root() {
            let owner = self.procfs.owner_uid(self.target);
            if owner != Some(caller) {
                events::inspection_denied(self.target.as_raw(), caller.as_raw());
                return Err(JailError::PermissionDenied {
                    pid: self.target.as_raw(),
                    caller_uid: caller.as_raw(),
                });
            }
        }

        events::inspection_granted(self.target.as_raw(), caller.as_raw());
        let target = self.target;
        Ok(self.advance(target))
    }
}

impl<'a> CpuInspection<'a, Authorized> {
    /// Copy the `Cpus_allowed_list:` line of the target's status file to
    /// `out`, byte for byte, line terminator included.
    ///
    /// Once the file is open nothing fails: a read error ends the scan as
    /// [`InspectOutcome::NoMatch`] and a write error is only logged.
    pub fn inspect<W: Write>(self, out: &mut W) -> Result<InspectOutcome> {
        let path = self.procfs.status_path(self.target);
        let opened = {
            let _root = RootGuard::acquire();
            File::open(&path)
        };
        let file = match opened {
            Ok(file) => file,
            Err(source) => return Ok(InspectOutcome::Unreadable { path, source }),
        };

        let mut reader = BufReader::new(file);
        let mut line = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) => return Ok(InspectOutcome::NoMatch),
                Ok(_) => {}
                Err(e) => {
                    // The target may exit mid-scan (ESRCH).
                    log::debug!("reading {}: {}", path.display(), e);
                    return Ok(InspectOutcome::NoMatch);
                }
            }
            if line.starts_with(CPUS_ALLOWED_PREFIX) {
                if let Err(e) = out.write_all(&line).and_then(|()| out.flush()) {
                    log::debug!("writing cpu list: {}", e);
                }
                return Ok(InspectOutcome::Printed);
            }
        }
    }
}

/// Run the whole sequence for `pid` on behalf of `caller`.
pub fn print_cpu_filter<W: Write>(
    procfs: &ProcFs,
    launcher_name: &str,
    pid: Pid,
    caller: Uid,
    out: &mut W,
) -> Result<InspectOutcome> {
    CpuInspection::new(procfs, launcher_name, pid)
        .resolve_identity()
        .authorize(caller)?
        .inspect(out)
}
