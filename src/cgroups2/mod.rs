/* -------------------------------------------------------------------------- *\
 *                |   █████╗ ██╗   ██╗██████╗  █████╗ ███████╗ |              *
 *                |  ██╔══██╗██║   ██║██╔══██╗██╔══██╗██╔════╝ |              *
 *                |  ███████║██║   ██║██████╔╝███████║█████╗   |              *
 *                |  ██╔══██║██║   ██║██╔══██╗██╔══██║██╔══╝   |              *
 *                |  ██║  ██║╚██████╔╝██║  ██║██║  ██║███████╗ |              *
 *                |  ╚═╝  ╚═╝ ╚═════╝ ╚═╝  ╚═╝╚═╝  ╚═╝╚══════╝ |              *
 *                +--------------------------------------------+              *
 *                                                                            *
 *                         Distributed Systems Runtime                        *
 * -------------------------------------------------------------------------- *
 * Copyright 2022 - 2024, the aurae contributors                              *
 * SPDX-License-Identifier: Apache-2.0                                        *
\* -------------------------------------------------------------------------- */

//! Thin wrapper over the cgroup v2 virtual filesystem.
//!
//! Everything here is synchronous path manipulation and control-file
//! IO except [destroy], which has to drain processes and retry
//! `EBUSY` removals.

use backoff::ExponentialBackoffBuilder;
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{trace, warn};

pub use error::{CgroupsError, Result};

mod error;

pub const CGROUP_PROCS: &str = "cgroup.procs";
pub const CGROUP_THREADS: &str = "cgroup.threads";
const CGROUP_CONTROLLERS: &str = "cgroup.controllers";
const CGROUP_SUBTREE_CONTROL: &str = "cgroup.subtree_control";
const CGROUP_KILL: &str = "cgroup.kill";

/// Directory test; cgroup v2 represents every cgroup as a directory.
pub fn exists(cgroup: &Path) -> bool {
    cgroup.is_dir()
}

/// Creates a cgroup. With `recursive`, missing intermediate cgroups
/// are created and an already-existing cgroup is not an error.
pub fn create(cgroup: &Path, recursive: bool) -> Result<()> {
    let result = if recursive {
        fs::create_dir_all(cgroup)
    } else {
        fs::create_dir(cgroup)
    };

    result.map_err(|source| CgroupsError::CreateCgroup {
        cgroup: cgroup.to_path_buf(),
        source,
    })
}

/// Names of the immediate child cgroups.
pub fn children(cgroup: &Path) -> Result<BTreeSet<String>> {
    let entries =
        fs::read_dir(cgroup).map_err(|source| CgroupsError::ListCgroup {
            cgroup: cgroup.to_path_buf(),
            source,
        })?;

    let mut children = BTreeSet::new();
    for entry in entries {
        let entry = entry.map_err(|source| CgroupsError::ListCgroup {
            cgroup: cgroup.to_path_buf(),
            source,
        })?;

        if entry.path().is_dir() {
            children.insert(entry.file_name().to_string_lossy().into_owned());
        }
    }

    Ok(children)
}

/// All descendant cgroups of `cgroup` (not including `cgroup` itself),
/// parents before children.
pub fn cgroups(cgroup: &Path) -> Result<Vec<PathBuf>> {
    let mut found = vec![];
    let mut pending = vec![cgroup.to_path_buf()];

    while let Some(current) = pending.pop() {
        for child in children(&current)? {
            let path = current.join(child);
            found.push(path.clone());
            pending.push(path);
        }
    }

    found.sort();
    Ok(found)
}

/// Reads a control file, e.g. `read(cgroup, "cpu.stat")`.
pub fn read(cgroup: &Path, control: &str) -> Result<String> {
    let path = cgroup.join(control);
    fs::read_to_string(&path)
        .map_err(|source| CgroupsError::ReadControl { path, source })
}

/// Writes a control file, e.g. `write(cgroup, "memory.max", "max")`.
pub fn write(cgroup: &Path, control: &str, contents: &str) -> Result<()> {
    let path = cgroup.join(control);
    fs::write(&path, contents)
        .map_err(|source| CgroupsError::WriteControl { path, source })
}

/// Pids of the processes in this cgroup. A missing `cgroup.procs` is
/// treated as an empty cgroup.
pub fn procs(cgroup: &Path) -> Result<Vec<Pid>> {
    let contents = match read(cgroup, CGROUP_PROCS) {
        Ok(contents) => contents,
        Err(CgroupsError::ReadControl { source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            return Ok(vec![]);
        }
        Err(e) => return Err(e),
    };

    Ok(contents
        .lines()
        .filter_map(|line| line.trim().parse::<i32>().ok())
        .map(Pid::from_raw)
        .collect())
}

/// Removes the cgroup and all of its descendants.
///
/// Processes are drained leaves-first since the kernel forbids
/// removing a non-empty cgroup; `EBUSY` removals are retried with
/// bounded backoff and reported fatal after exhaustion.
pub async fn destroy(cgroup: &Path) -> Result<()> {
    if !exists(cgroup) {
        return Ok(());
    }

    let mut targets = cgroups(cgroup)?;
    targets.insert(0, cgroup.to_path_buf());

    // cgroups() yields parents before children, so the reverse walk
    // removes every child before its parent.
    for target in targets.iter().rev() {
        kill_procs(target);
        remove(target).await?;
    }

    Ok(())
}

/// Best effort process drain. `cgroup.kill` kills the whole subtree
/// atomically where the kernel provides it; otherwise every pid in
/// `cgroup.procs` is sent SIGKILL.
fn kill_procs(cgroup: &Path) {
    if cgroup.join(CGROUP_KILL).is_file() {
        if let Err(e) = write(cgroup, CGROUP_KILL, "1") {
            warn!("Failed to kill cgroup '{}': {}", cgroup.display(), e);
        }
        return;
    }

    match procs(cgroup) {
        Ok(pids) => {
            for pid in pids {
                if let Err(e) = signal::kill(pid, Signal::SIGKILL) {
                    warn!("Failed to kill pid {pid} while destroying cgroup '{}': {e}", cgroup.display());
                }
            }
        }
        Err(e) => {
            warn!("Failed to read processes of cgroup '{}': {}", cgroup.display(), e);
        }
    }
}

async fn remove(cgroup: &Path) -> Result<()> {
    let strategy = ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(50))
        .with_max_interval(Duration::from_secs(1))
        .with_max_elapsed_time(Some(Duration::from_secs(10)))
        .build();

    backoff::future::retry(strategy, || async {
        match fs::remove_dir(cgroup) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) if e.raw_os_error() == Some(Errno::EBUSY as i32) => {
                trace!("Cgroup '{}' is busy; retrying removal", cgroup.display());
                Err(backoff::Error::transient(CgroupsError::RemoveCgroup {
                    cgroup: cgroup.to_path_buf(),
                    source: e,
                }))
            }
            Err(e)
                if e.raw_os_error() == Some(Errno::ENOTEMPTY as i32)
                    && sweep_plain_files(cgroup) =>
            {
                Err(backoff::Error::transient(CgroupsError::RemoveCgroup {
                    cgroup: cgroup.to_path_buf(),
                    source: e,
                }))
            }
            Err(e) => Err(backoff::Error::permanent(CgroupsError::RemoveCgroup {
                cgroup: cgroup.to_path_buf(),
                source: e,
            })),
        }
    })
    .await
}

/// `rmdir` on cgroupfs ignores interface files: a cgroup is removable
/// once its child cgroups are gone. On an ordinary filesystem those
/// files count, so sweep them before treating `ENOTEMPTY` as fatal.
/// Returns false when real subdirectories remain.
fn sweep_plain_files(cgroup: &Path) -> bool {
    let Ok(entries) = fs::read_dir(cgroup) else {
        return false;
    };

    let mut swept = false;
    for entry in entries.flatten() {
        if entry.path().is_dir() {
            return false;
        }
        swept = fs::remove_file(entry.path()).is_ok() || swept;
    }

    swept
}

pub mod controllers {
    //! The `cgroup.controllers` / `cgroup.subtree_control` surface.
    //!
    //! `core`, `perf_event`, and `devices` are implicit: they exist in
    //! every cgroup, never appear in either file, and must not be
    //! written to `subtree_control`.

    use super::{
        read, write, CgroupsError, Result, CGROUP_CONTROLLERS,
        CGROUP_SUBTREE_CONTROL,
    };
    use std::collections::HashSet;
    use std::path::Path;

    /// Controllers available to this cgroup, from `cgroup.controllers`.
    pub fn available(cgroup: &Path) -> Result<HashSet<String>> {
        Ok(parse(&read(cgroup, CGROUP_CONTROLLERS)?))
    }

    /// Controllers enabled for this cgroup's children, from
    /// `cgroup.subtree_control`.
    pub fn enabled(cgroup: &Path) -> Result<HashSet<String>> {
        Ok(parse(&read(cgroup, CGROUP_SUBTREE_CONTROL)?))
    }

    /// Enables `controllers` in this cgroup's `subtree_control`.
    /// Enabling an already-enabled controller is a no-op on the kernel
    /// side; a controller missing from the available set is an error.
    pub fn enable<S: AsRef<str>>(cgroup: &Path, controllers: &[S]) -> Result<()> {
        let available = available(cgroup)?;

        for controller in controllers {
            if !available.contains(controller.as_ref()) {
                return Err(CgroupsError::ControllerNotAvailable {
                    controller: controller.as_ref().to_string(),
                    cgroup: cgroup.to_path_buf(),
                });
            }
        }

        let line = controllers
            .iter()
            .map(|controller| format!("+{}", controller.as_ref()))
            .collect::<Vec<_>>()
            .join(" ");

        write(cgroup, CGROUP_SUBTREE_CONTROL, &line)
    }

    fn parse(contents: &str) -> HashSet<String> {
        contents.split_whitespace().map(str::to_string).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // The kernel materializes control files on mkdir; tests fake the
    // ones they need on a plain tmpfs directory.
    fn fake_cgroup(root: &Path, relative: &str, available: &str) -> PathBuf {
        let cgroup = root.join(relative);
        fs::create_dir_all(&cgroup).expect("failed to create fake cgroup");
        fs::write(cgroup.join(CGROUP_CONTROLLERS), available)
            .expect("failed to seed cgroup.controllers");
        fs::write(cgroup.join(CGROUP_SUBTREE_CONTROL), "")
            .expect("failed to seed cgroup.subtree_control");
        cgroup
    }

    #[test]
    fn test_create_and_exists() {
        let tmp = TempDir::new().expect("tempdir");
        let cgroup = tmp.path().join("a/b");

        assert!(!exists(&cgroup));
        create(&cgroup, true).expect("failed to create cgroup");
        assert!(exists(&cgroup));

        // recursive create tolerates an existing cgroup
        create(&cgroup, true).expect("recursive create should be idempotent");
        assert!(create(&cgroup, false).is_err());
    }

    #[test]
    fn test_children_lists_directories_only() {
        let tmp = TempDir::new().expect("tempdir");
        fs::create_dir(tmp.path().join("c1")).expect("mkdir");
        fs::create_dir(tmp.path().join("c2")).expect("mkdir");
        fs::write(tmp.path().join("cgroup.procs"), "").expect("write");

        let children = children(tmp.path()).expect("failed to list children");
        assert_eq!(
            children.into_iter().collect::<Vec<_>>(),
            vec!["c1".to_string(), "c2".to_string()]
        );
    }

    #[test]
    fn test_cgroups_walks_nested_hierarchy() {
        let tmp = TempDir::new().expect("tempdir");
        fs::create_dir_all(tmp.path().join("c1/leaf")).expect("mkdir");
        fs::create_dir_all(tmp.path().join("c1/nested/leaf")).expect("mkdir");

        let all = cgroups(tmp.path()).expect("failed to walk cgroups");
        assert_eq!(all.len(), 4);
        // parents come before children
        let c1 = all.iter().position(|p| p.ends_with("c1")).expect("c1");
        let nested =
            all.iter().position(|p| p.ends_with("c1/nested")).expect("nested");
        assert!(c1 < nested);
    }

    #[test]
    fn test_enable_writes_subtree_control() {
        let tmp = TempDir::new().expect("tempdir");
        let cgroup = fake_cgroup(tmp.path(), "c1", "cpu memory io");

        controllers::enable(&cgroup, &["cpu", "memory"])
            .expect("failed to enable controllers");

        // the kernel's write syntax: "+<name>" tokens on one line
        let written =
            fs::read_to_string(cgroup.join(CGROUP_SUBTREE_CONTROL))
                .expect("failed to read subtree_control");
        assert_eq!(written, "+cpu +memory");
    }

    #[test]
    fn test_enabled_parses_subtree_control() {
        let tmp = TempDir::new().expect("tempdir");
        let cgroup = fake_cgroup(tmp.path(), "c1", "cpu memory io");
        fs::write(cgroup.join(CGROUP_SUBTREE_CONTROL), "cpu memory\n")
            .expect("write");

        let enabled =
            controllers::enabled(&cgroup).expect("failed to read enabled");
        assert!(enabled.contains("cpu"));
        assert!(enabled.contains("memory"));
        assert!(!enabled.contains("io"));
    }

    #[test]
    fn test_enable_rejects_unavailable_controller() {
        let tmp = TempDir::new().expect("tempdir");
        let cgroup = fake_cgroup(tmp.path(), "c1", "cpu");

        assert!(matches!(
            controllers::enable(&cgroup, &["memory"]),
            Err(CgroupsError::ControllerNotAvailable { controller, .. })
                if controller == "memory"
        ));
    }

    #[tokio::test]
    async fn test_destroy_removes_subtree() {
        let tmp = TempDir::new().expect("tempdir");
        let cgroup = tmp.path().join("c1");
        fs::create_dir_all(cgroup.join("leaf")).expect("mkdir");
        fs::create_dir_all(cgroup.join("nested/leaf")).expect("mkdir");

        destroy(&cgroup).await.expect("failed to destroy cgroup");
        assert!(!exists(&cgroup));
    }

    #[tokio::test]
    async fn test_destroy_missing_cgroup_is_not_an_error() {
        let tmp = TempDir::new().expect("tempdir");

        destroy(&tmp.path().join("gone"))
            .await
            .expect("destroying a missing cgroup should succeed");
    }

    #[test]
    fn test_procs_missing_file_is_empty() {
        let tmp = TempDir::new().expect("tempdir");

        assert!(procs(tmp.path()).expect("procs").is_empty());
    }

    #[test]
    fn test_procs_parses_pids() {
        let tmp = TempDir::new().expect("tempdir");
        fs::write(tmp.path().join(CGROUP_PROCS), "1\n42\n").expect("write");

        let pids = procs(tmp.path()).expect("procs");
        assert_eq!(pids, vec![Pid::from_raw(1), Pid::from_raw(42)]);
    }
}
