//! Scheduler affinity for the current process.
//!
//! Set and verify failures come back as warnings; the sandbox keeps going.

use crate::config::types::{CpuId, CpuMask, JailError};
use crate::observability::audit::events;
use nix::sched::{sched_getaffinity, sched_setaffinity, CpuSet};
use nix::unistd::Pid;

/// What happened when a mask was applied.
#[derive(Debug)]
pub struct AffinityReport {
    /// Non-fatal failures, in the order they occurred
    pub warnings: Vec<JailError>,
    /// `Some(true)` when the read-back set equals the requested one,
    /// `None` when it could not be read back
    pub verified: Option<bool>,
}

impl AffinityReport {
    /// Debug-mode line for the verification result; nothing when the
    /// affinity could not be read back.
    pub fn summary(&self) -> Option<&'static str> {
        match self.verified {
            Some(true) => Some("CPU affinity set"),
            Some(false) => Some("CPU affinity not set"),
            None => None,
        }
    }
}

/// Kernel CPU set with exactly the bits of `mask`.
pub fn cpu_set_for(mask: CpuMask) -> nix::Result<CpuSet> {
    let mut set = CpuSet::new();
    for cpu in mask.cpus() {
        set.set(cpu as usize)?;
    }
    Ok(set)
}

/// The part of a kernel CPU set a [`CpuMask`] can express (CPUs 0..=31).
pub fn mask_of(set: &CpuSet) -> CpuMask {
    let mut mask = CpuMask::empty();
    for cpu in 0..=CpuId::MAX_CPU {
        if set.is_set(cpu as usize).unwrap_or(false) {
            if let Some(id) = CpuId::new(cpu) {
                mask.insert(id);
            }
        }
    }
    mask
}

/// Restrict the calling process to `mask`, then read the affinity back and
/// compare it with what was requested.
pub fn apply_cpu_affinity(mask: CpuMask) -> AffinityReport {
    let mut report = AffinityReport {
        warnings: Vec::new(),
        verified: None,
    };

    let requested = match cpu_set_for(mask) {
        Ok(set) => set,
        Err(errno) => {
            report.warnings.push(JailError::AffinitySet(errno));
            return report;
        }
    };

    let this = Pid::from_raw(0);
    if let Err(errno) = sched_setaffinity(this, &requested) {
        events::affinity_degraded(format!("sched_setaffinity({:#x}): {}", mask.bits(), errno));
        report.warnings.push(JailError::AffinitySet(errno));
    }

    match sched_getaffinity(this) {
        Ok(actual) => {
            let matches = actual == requested;
            log::debug!(
                "CPU affinity requested {:#x}, kernel reports {:#x} (match: {})",
                mask.bits(),
                mask_of(&actual).bits(),
                matches
            );
            report.verified = Some(matches);
        }
        Err(errno) => {
            events::affinity_degraded(format!("sched_getaffinity: {}", errno));
            report.warnings.push(JailError::AffinityVerify(errno));
        }
    }

    report
}
