/// Persisted CPU affinity mask
///
/// The launcher saves the mask before re-executing into the payload role and
/// the payload loads it back. The file holds one line of lowercase hex, is
/// mode 0600 and owned by root. Symlinks at the final path component are
/// refused in both directions. There is no locking: one save happens before
/// the transition and one load after it.
use crate::config::types::{CpuMask, JailError, Result, SandboxConfig};
use crate::kernel::credentials::RootGuard;
use crate::observability::audit::events;
use nix::unistd::{Gid, Uid};
use std::fs::{self, OpenOptions, Permissions};
use std::io::{Read, Write};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

const STATE_FILE_MODE: u32 = 0o600;

pub struct MaskStore {
    path: PathBuf,
    owner: Uid,
    group: Gid,
}

impl MaskStore {
    /// Store at `path`, owned by root.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            owner: Uid::from_raw(0),
            group: Gid::from_raw(0),
        }
    }

    /// Override the owner the file is forced to.
    pub fn with_owner(mut self, owner: Uid, group: Gid) -> Self {
        self.owner = owner;
        self.group = group;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `mask` as `"<hex>\n"`. An empty mask writes nothing.
    pub fn save(&self, mask: CpuMask) -> Result<()> {
        if mask.is_empty() {
            return Ok(());
        }

        let written = {
            let _root = RootGuard::acquire();
            self.write_record(mask)
        };
        written.map_err(|source| JailError::MaskSave {
            path: self.path.clone(),
            source,
        })?;

        log::debug!("Saved CPU mask {:x} to {}", mask, self.path.display());
        events::mask_persisted(&self.path, mask.bits());
        Ok(())
    }

    fn write_record(&self, mask: CpuMask) -> std::io::Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir)?;
            }
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(STATE_FILE_MODE)
            .custom_flags(libc::O_NOFOLLOW)
            .open(&self.path)?;
        writeln!(file, "{:x}", mask)?;
        std::os::unix::fs::fchown(&file, Some(self.owner.as_raw()), Some(self.group.as_raw()))?;
        // mode() only applies on creation and is subject to umask
        file.set_permissions(Permissions::from_mode(STATE_FILE_MODE))?;
        Ok(())
    }

    /// Replace `mask` with the persisted value.
    ///
    /// Any failure leaves `mask` untouched and comes back as the non-fatal
    /// [`JailError::MaskLoad`].
    pub fn load(&self, mask: &mut CpuMask) -> Result<()> {
        let content = {
            let _root = RootGuard::acquire();
            self.read_record()
        }
        .map_err(|e| JailError::MaskLoad {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        let loaded = parse_mask_record(&content).ok_or_else(|| JailError::MaskLoad {
            path: self.path.clone(),
            reason: format!("malformed mask record {:?}", content.trim_end()),
        })?;

        *mask = loaded;
        log::debug!("Loaded CPU mask {:x} from {}", loaded, self.path.display());
        Ok(())
    }

    fn read_record(&self) -> std::io::Result<String> {
        let mut file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NOFOLLOW)
            .open(&self.path)?;
        let mut content = String::new();
        file.read_to_string(&mut content)?;
        Ok(content)
    }
}

impl SandboxConfig {
    pub fn mask_store(&self) -> MaskStore {
        MaskStore::new(&self.state_file)
    }
}

/// Leading hex number of `content`: optional whitespace, optional `0x`,
/// then at least one hex digit. Trailing text is ignored.
pub fn parse_mask_record(content: &str) -> Option<CpuMask> {
    let text = content.trim_start();
    let text = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);

    let end = text
        .find(|c: char| !c.is_ascii_hexdigit())
        .unwrap_or(text.len());
    if end == 0 {
        return None;
    }

    u32::from_str_radix(&text[..end], 16)
        .ok()
        .map(CpuMask::from_bits)
}
