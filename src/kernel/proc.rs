//! Process table introspection through procfs.

use nix::unistd::{Pid, Uid};
use std::fs;
use std::path::{Path, PathBuf};

/// `(pid, uid, command-name)` of a process, read fresh on every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessIdentity {
    pub pid: Pid,
    pub uid: Option<Uid>,
    pub comm: Option<String>,
}

/// procfs reader rooted at `/proc`, or at a directory laid out the same way.
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcFs {
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    pub fn with_root<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn status_path(&self, pid: Pid) -> PathBuf {
        self.root.join(pid.as_raw().to_string()).join("status")
    }

    /// Contents of `/proc/<pid>/comm` without the trailing newline.
    pub fn command_name(&self, pid: Pid) -> Option<String> {
        let path = self.root.join(pid.as_raw().to_string()).join("comm");
        let comm = fs::read_to_string(&path).ok()?;
        Some(comm.trim_end_matches('\n').to_string())
    }

    /// Real UID from the `Uid:` line of the status file.
    pub fn owner_uid(&self, pid: Pid) -> Option<Uid> {
        status_field(&self.status_path(pid), "Uid:")
            .and_then(|value| value.parse::<u32>().ok())
            .map(Uid::from_raw)
    }

    pub fn parent_pid(&self, pid: Pid) -> Option<Pid> {
        status_field(&self.status_path(pid), "PPid:")
            .and_then(|value| value.parse::<i32>().ok())
            .map(Pid::from_raw)
    }

    /// Lowest-numbered process whose parent is `parent`.
    pub fn first_child(&self, parent: Pid) -> Option<Pid> {
        let entries = fs::read_dir(&self.root).ok()?;
        let mut pids: Vec<i32> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().to_str()?.parse::<i32>().ok())
            .collect();
        pids.sort_unstable();

        pids.into_iter()
            .map(Pid::from_raw)
            .find(|pid| self.parent_pid(*pid) == Some(parent))
    }

    pub fn identity(&self, pid: Pid) -> ProcessIdentity {
        ProcessIdentity {
            pid,
            uid: self.owner_uid(pid),
            comm: self.command_name(pid),
        }
    }
}

/// First whitespace-separated value after `key` in a status file.
fn status_field(path: &Path, key: &str) -> Option<String> {
    let status = fs::read_to_string(path).ok()?;
    status
        .lines()
        .find_map(|line| line.strip_prefix(key))
        .and_then(|rest| rest.split_whitespace().next())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_process(root: &Path, pid: i32, comm: &str, ppid: i32, uid: u32) {
        let dir = root.join(pid.to_string());
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("comm"), format!("{}\n", comm)).unwrap();
        fs::write(
            dir.join("status"),
            format!(
                "Name:\t{}\nPPid:\t{}\nUid:\t{}\t{}\t{}\t{}\nCpus_allowed_list:\t0-3\n",
                comm, ppid, uid, uid + 1, uid, uid
            ),
        )
        .unwrap();
    }

    #[test]
    fn reads_identity_fields() {
        let dir = tempfile::tempdir().unwrap();
        write_process(dir.path(), 42, "sleep", 1, 1000);

        let procfs = ProcFs::with_root(dir.path());
        let identity = procfs.identity(Pid::from_raw(42));
        assert_eq!(identity.comm.as_deref(), Some("sleep"));
        assert_eq!(identity.uid, Some(Uid::from_raw(1000)));
        assert_eq!(procfs.parent_pid(Pid::from_raw(42)), Some(Pid::from_raw(1)));
    }

    #[test]
    fn missing_process_has_no_identity() {
        let dir = tempfile::tempdir().unwrap();
        let procfs = ProcFs::with_root(dir.path());
        let identity = procfs.identity(Pid::from_raw(7));
        assert_eq!(identity.uid, None);
        assert_eq!(identity.comm, None);
    }

    #[test]
    fn first_child_is_lowest_pid() {
        let dir = tempfile::tempdir().unwrap();
        write_process(dir.path(), 10, "cpujail", 1, 0);
        write_process(dir.path(), 300, "bash", 10, 0);
        write_process(dir.path(), 25, "bash", 10, 0);
        write_process(dir.path(), 20, "other", 1, 0);
        fs::create_dir_all(dir.path().join("self")).unwrap();

        let procfs = ProcFs::with_root(dir.path());
        assert_eq!(procfs.first_child(Pid::from_raw(10)), Some(Pid::from_raw(25)));
        assert_eq!(procfs.first_child(Pid::from_raw(25)), None);
    }

    #[test]
    fn real_proc_knows_this_process() {
        let procfs = ProcFs::new();
        let this = Pid::this();
        assert_eq!(procfs.owner_uid(this), Some(nix::unistd::getuid()));
        assert!(procfs.command_name(this).is_some());
    }
}
