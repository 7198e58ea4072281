/// Sandbox profile loading from a JSON file
use crate::config::types::{JailError, Result, SandboxConfig};
use nix::unistd::Uid;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Profile keys understood by cpujail. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SandboxProfile {
    /// CPU list, same syntax as `--cpu`
    #[serde(default)]
    pub cpu: Option<String>,
    #[serde(default)]
    pub debug: Option<bool>,
    #[serde(default)]
    pub state_file: Option<PathBuf>,
}

impl SandboxProfile {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            JailError::Config(format!("Failed to read profile {}: {}", path.display(), e))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            JailError::Config(format!("Failed to parse profile {}: {}", path.display(), e))
        })
    }

    /// Fold the profile into `config` for `caller`. The CPU list ORs into
    /// whatever mask is already there; `state_file` is refused unless the
    /// caller is root.
    pub fn apply_to(&self, config: &mut SandboxConfig, caller: Uid) -> Result<()> {
        if let Some(list) = &self.cpu {
            config.read_cpu_list(list)?;
        }
        if let Some(debug) = self.debug {
            config.debug = debug;
        }
        if let Some(state_file) = &self.state_file {
            config.set_state_file(state_file.clone(), caller)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn profile_fields_reach_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"cpu": "0,2", "debug": true, "state_file": "/tmp/x"}}"#).unwrap();

        let profile = SandboxProfile::load_from_file(file.path()).unwrap();
        let mut config = SandboxConfig::default();
        profile.apply_to(&mut config, Uid::from_raw(0)).unwrap();

        assert_eq!(config.cpus.bits(), 0b101);
        assert!(config.debug);
        assert_eq!(config.state_file, PathBuf::from("/tmp/x"));
    }

    #[test]
    fn empty_profile_changes_nothing() {
        let profile: SandboxProfile = serde_json::from_str("{}").unwrap();
        let mut config = SandboxConfig::default();
        let before = config.state_file.clone();
        profile.apply_to(&mut config, Uid::from_raw(1000)).unwrap();
        assert!(config.cpus.is_empty());
        assert!(!config.debug);
        assert_eq!(config.state_file, before);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"cpus": "0"}}"#).unwrap();
        let err = SandboxProfile::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, JailError::Config(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn bad_cpu_list_in_profile_is_fatal() {
        let profile = SandboxProfile {
            cpu: Some("0,a".to_string()),
            ..Default::default()
        };
        let mut config = SandboxConfig::default();
        let err = profile.apply_to(&mut config, Uid::from_raw(1000)).unwrap_err();
        assert!(matches!(err, JailError::InvalidCpuList { .. }));
    }

    #[test]
    fn state_file_from_non_root_profile_is_refused() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"state_file": "/etc/shadow"}}"#).unwrap();

        let profile = SandboxProfile::load_from_file(file.path()).unwrap();
        let mut config = SandboxConfig::default();
        let err = profile.apply_to(&mut config, Uid::from_raw(1000)).unwrap_err();
        assert!(matches!(err, JailError::StateFileOverride { .. }));
        assert_ne!(config.state_file, PathBuf::from("/etc/shadow"));
    }

    #[test]
    fn missing_profile_is_config_error() {
        let err = SandboxProfile::load_from_file("/nonexistent/cpujail.json").unwrap_err();
        assert!(matches!(err, JailError::Config(_)));
    }
}
