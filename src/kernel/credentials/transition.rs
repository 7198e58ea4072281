//! Permanent drop to the invoking user before the workload is exec'd.
//!
//! CRITICAL: setresgid MUST be called BEFORE setresuid. Once the UIDs are
//! gone the process can no longer change its GIDs.

use crate::config::types::{JailError, Result};
use nix::unistd::{getgid, getresgid, getresuid, getuid};

/// 3-step transition: setresgid -> setresuid -> verify.
///
/// All three real/effective/saved IDs end up equal to the real IDs, so no
/// [`super::RootGuard`] can raise privilege afterwards.
pub fn transition_to_real_user() -> Result<()> {
    let uid = getuid().as_raw();
    let gid = getgid().as_raw();

    // CRITICAL: GID before UID
    set_gid(gid)?;
    set_uid(uid)?;
    verify_transition(uid, gid)?;

    log::info!("Transitioned to UID={}, GID={}", uid, gid);
    Ok(())
}

/// MUST be called BEFORE set_uid.
fn set_gid(gid: u32) -> Result<()> {
    // SAFETY: setresgid atomically sets all three GIDs to the real GID.
    let result =
        unsafe { libc::setresgid(gid as libc::gid_t, gid as libc::gid_t, gid as libc::gid_t) };
    if result != 0 {
        let err = std::io::Error::last_os_error();
        return Err(JailError::Privilege(format!(
            "Failed to setresgid({}): {}",
            gid, err
        )));
    }
    log::debug!("Set GID to {}", gid);
    Ok(())
}

/// MUST be called AFTER set_gid.
fn set_uid(uid: u32) -> Result<()> {
    // SAFETY: setresuid atomically sets all three UIDs to the real UID.
    let result =
        unsafe { libc::setresuid(uid as libc::uid_t, uid as libc::uid_t, uid as libc::uid_t) };
    if result != 0 {
        let err = std::io::Error::last_os_error();
        return Err(JailError::Privilege(format!(
            "Failed to setresuid({}): {}",
            uid, err
        )));
    }
    log::debug!("Set UID to {}", uid);
    Ok(())
}

fn verify_transition(expected_uid: u32, expected_gid: u32) -> Result<()> {
    let uids = getresuid()?;
    let gids = getresgid()?;

    let uid_ok = [uids.real, uids.effective, uids.saved]
        .iter()
        .all(|id| id.as_raw() == expected_uid);
    if !uid_ok {
        return Err(JailError::Privilege(format!(
            "UID verification failed: expected {}, got real={}, effective={}, saved={}",
            expected_uid, uids.real, uids.effective, uids.saved
        )));
    }

    let gid_ok = [gids.real, gids.effective, gids.saved]
        .iter()
        .all(|id| id.as_raw() == expected_gid);
    if !gid_ok {
        return Err(JailError::Privilege(format!(
            "GID verification failed: expected {}, got real={}, effective={}, saved={}",
            expected_gid, gids.real, gids.effective, gids.saved
        )));
    }

    log::debug!("UID/GID verification passed");
    Ok(())
}
