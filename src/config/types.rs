/// Core types and structures for cpujail
use nix::unistd::Uid;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Location of the persisted affinity mask.
pub const RUN_CPU_CFG: &str = "/run/cpujail/cpu";

/// Moves the state file away from [`RUN_CPU_CFG`]; honoured for root only.
pub const STATE_FILE_ENV: &str = "CPUJAIL_STATE_FILE";

/// Name the supervisory launcher shows in `/proc/<pid>/comm`.
pub const LAUNCHER_NAME: &str = "cpujail";

/// Logical CPU number newtype, limited to the 32 CPUs a [`CpuMask`] can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CpuId(u32);

impl CpuId {
    pub const MAX_CPU: u32 = 31;

    pub fn new(cpu: u32) -> Option<Self> {
        if cpu <= Self::MAX_CPU {
            Some(Self(cpu))
        } else {
            None
        }
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

/// Bit `i` set means logical CPU `i` is permitted.
///
/// An empty mask means "no restriction configured". It is never persisted,
/// so a restriction cleared to nothing cannot be told apart from no
/// restriction at all.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct CpuMask(u32);

impl CpuMask {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// OR the CPU into the mask. Bits are never cleared.
    pub fn insert(&mut self, cpu: CpuId) {
        self.0 |= 1 << cpu.value();
    }

    pub fn contains(self, cpu: u32) -> bool {
        cpu <= CpuId::MAX_CPU && self.0 & (1 << cpu) != 0
    }

    /// Permitted CPUs in ascending order.
    pub fn cpus(self) -> impl Iterator<Item = u32> {
        (0..=CpuId::MAX_CPU).filter(move |cpu| self.contains(*cpu))
    }
}

impl fmt::LowerHex for CpuMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl fmt::Display for CpuMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cpus: Vec<String> = self.cpus().map(|cpu| cpu.to_string()).collect();
        write!(f, "{}", cpus.join(","))
    }
}

/// Sandbox configuration, built once at startup and passed to each component.
#[derive(Clone, Debug)]
pub struct SandboxConfig {
    /// Permitted CPUs; empty when no restriction was requested
    pub cpus: CpuMask,
    /// Report affinity verification results on stdout
    pub debug: bool,
    /// Where the mask is persisted across the re-exec boundary
    pub state_file: PathBuf,
    /// comm name of the supervisory launcher
    pub launcher_name: String,
}

impl SandboxConfig {
    /// Path requested through `CPUJAIL_STATE_FILE`, if any.
    pub fn state_file_from_env() -> Option<PathBuf> {
        std::env::var_os(STATE_FILE_ENV)
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
    }

    /// Move the state file to `path` on behalf of `caller`.
    ///
    /// The file is created, truncated and chowned with root privilege, so
    /// only a root caller may point it anywhere but [`RUN_CPU_CFG`].
    pub fn set_state_file(&mut self, path: PathBuf, caller: Uid) -> Result<()> {
        if path != Path::new(RUN_CPU_CFG) && !caller.is_root() {
            return Err(JailError::StateFileOverride {
                path,
                caller_uid: caller.as_raw(),
            });
        }
        self.state_file = path;
        Ok(())
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            cpus: CpuMask::empty(),
            debug: false,
            state_file: PathBuf::from(RUN_CPU_CFG),
            launcher_name: LAUNCHER_NAME.to_string(),
        }
    }
}

/// Custom error types for cpujail
#[derive(Error, Debug)]
pub enum JailError {
    #[error("invalid cpu list")]
    InvalidCpuList { list: String },

    #[error("invalid cpu number. Accepted values are between 0 and 31.")]
    CpuOutOfRange { segment: String },

    #[error("cannot save cpu affinity mask")]
    MaskSave {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot load cpu affinity mask")]
    MaskLoad { path: PathBuf, reason: String },

    #[error("cannot set cpu affinity")]
    AffinitySet(#[source] nix::errno::Errno),

    #[error("cannot verify cpu affinity")]
    AffinityVerify(#[source] nix::errno::Errno),

    #[error("permission denied.")]
    PermissionDenied { pid: i32, caller_uid: u32 },

    #[error("only root may relocate the cpu affinity state file")]
    StateFileOverride { path: PathBuf, caller_uid: u32 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Privilege error: {0}")]
    Privilege(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl JailError {
    /// Non-fatal kinds are reported as warnings and the sandbox proceeds.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            JailError::MaskLoad { .. } | JailError::AffinitySet(_) | JailError::AffinityVerify(_)
        )
    }

    /// Process exit status for fatal kinds; 0 for warnings.
    pub fn exit_code(&self) -> i32 {
        if self.is_fatal() {
            1
        } else {
            0
        }
    }

    /// Underlying cause, printed on a second indented line.
    pub fn detail(&self) -> Option<String> {
        match self {
            JailError::MaskSave { path, source } => Some(format!("{}: {}", path.display(), source)),
            JailError::MaskLoad { path, reason } => Some(format!("{}: {}", path.display(), reason)),
            JailError::StateFileOverride { path, .. } => Some(path.display().to_string()),
            JailError::AffinitySet(errno) => Some(format!("sched_setaffinity: {}", errno.desc())),
            JailError::AffinityVerify(errno) => Some(format!("sched_getaffinity: {}", errno.desc())),
            _ => None,
        }
    }
}

impl From<nix::errno::Errno> for JailError {
    fn from(err: nix::errno::Errno) -> Self {
        JailError::Privilege(err.to_string())
    }
}

/// Result type alias for cpujail operations
pub type Result<T> = std::result::Result<T, JailError>;
