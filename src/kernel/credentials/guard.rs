//! Scoped effective-UID elevation.
//!
//! cpujail runs with its effective UID lowered to the real UID and the saved
//! UID kept at root (setuid-root install). A [`RootGuard`] raises the
//! effective UID for exactly one sensitive call and lowers it again when
//! dropped, on every exit path.

use nix::unistd::{geteuid, getuid, seteuid, Uid};

/// Holds effective UID 0 until dropped.
#[derive(Debug)]
#[must_use = "privilege is dropped again as soon as the guard goes out of scope"]
pub struct RootGuard {
    restore: Option<Uid>,
}

impl RootGuard {
    /// Raise the effective UID to root.
    ///
    /// Raising fails when the saved UID is not root (plain unprivileged
    /// run). That is logged and the call proceeds with the current identity,
    /// so the protected operation fails or succeeds on its own permissions.
    pub fn acquire() -> Self {
        let euid = geteuid();
        if euid.is_root() {
            return Self { restore: None };
        }

        match seteuid(Uid::from_raw(0)) {
            Ok(()) => {
                log::debug!("Raised effective UID {} -> 0", euid);
                Self { restore: Some(euid) }
            }
            Err(e) => {
                log::debug!("Cannot regain root privileges: {}", e);
                Self { restore: None }
            }
        }
    }

    /// Whether this guard actually raised privilege.
    pub fn elevated(&self) -> bool {
        self.restore.is_some()
    }
}

impl Drop for RootGuard {
    fn drop(&mut self) {
        let Some(euid) = self.restore.take() else {
            return;
        };

        if let Err(e) = seteuid(euid) {
            // The window must not outlive the guard.
            eprintln!("Error: cannot drop root privileges: {}", e);
            std::process::abort();
        }
        log::debug!("Dropped effective UID 0 -> {}", euid);
    }
}

/// Lower the effective UID to the real UID, keeping the saved UID.
///
/// Called once at startup; afterwards the process is in the user phase and
/// only [`RootGuard`] windows run as root.
pub fn enter_user_phase() -> crate::config::types::Result<()> {
    let uid = getuid();
    if geteuid() == uid {
        return Ok(());
    }

    seteuid(uid).map_err(|e| {
        crate::config::types::JailError::Privilege(format!(
            "Failed to lower effective UID to {}: {}",
            uid, e
        ))
    })?;
    log::debug!("Entered user phase as UID {}", uid);
    Ok(())
}

/// Contract check: the effective UID equals the real UID.
///
/// # Panics
///
/// Panics when called inside an elevation window or before
/// [`enter_user_phase`].
pub fn assert_user_phase() {
    let (uid, euid) = (getuid(), geteuid());
    assert_eq!(
        uid, euid,
        "expected user phase (effective UID {} != real UID {})",
        euid, uid
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_restores_effective_uid() {
        let before = geteuid();
        {
            let _root = RootGuard::acquire();
        }
        assert_eq!(geteuid(), before);
    }

    #[test]
    fn guard_is_noop_when_already_root() {
        if !geteuid().is_root() {
            return;
        }
        let guard = RootGuard::acquire();
        assert!(!guard.elevated());
    }

    #[test]
    fn enter_user_phase_is_idempotent() {
        assert!(enter_user_phase().is_ok());
        assert!(enter_user_phase().is_ok());
        assert_user_phase();
    }
}
