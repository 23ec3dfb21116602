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

//! Launch directives handed back to the launcher from `prepare`.

use crate::config::CommandInfo;
use nix::mount::MsFlags;
use nix::sched::CloneFlags;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A bind mount the launcher performs inside the container's mount
/// namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerMount {
    pub source: PathBuf,
    pub target: PathBuf,
    /// Raw mount flags (`MS_BIND | MS_REC`).
    pub flags: u64,
}

/// Instructions for the launcher: namespaces to clone into and mounts
/// to perform before exec'ing the container process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerLaunchInfo {
    /// Raw clone(2) namespace flags.
    pub clone_namespaces: Vec<i32>,
    pub mounts: Vec<ContainerMount>,
    pub command: Option<CommandInfo>,
}

impl ContainerLaunchInfo {
    /// Launch info that puts the container in its own cgroup and mount
    /// namespaces and bind-mounts `leaf` over `/sys/fs/cgroup` inside
    /// `rootfs`, recursively.
    pub(crate) fn cgroup_mount(leaf: PathBuf, rootfs: &std::path::Path) -> Self {
        ContainerLaunchInfo {
            clone_namespaces: vec![
                CloneFlags::CLONE_NEWCGROUP.bits(),
                CloneFlags::CLONE_NEWNS.bits(),
            ],
            mounts: vec![ContainerMount {
                source: leaf,
                target: rootfs.join("sys/fs/cgroup"),
                flags: (MsFlags::MS_BIND | MsFlags::MS_REC).bits(),
            }],
            command: None,
        }
    }

    /// Wraps this launch info as a `--task_launch_info=<json>` executor
    /// argument so the mounts happen in the command task's mount
    /// namespace rather than the executor's.
    pub(crate) fn into_task_launch_info(
        self,
    ) -> Result<Self, serde_json::Error> {
        let encoded = serde_json::to_string(&self)?;

        Ok(ContainerLaunchInfo {
            command: Some(CommandInfo {
                user: None,
                arguments: vec![format!("--task_launch_info={encoded}")],
            }),
            ..ContainerLaunchInfo::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_cgroup_mount_targets_rootfs() {
        let launch_info = ContainerLaunchInfo::cgroup_mount(
            PathBuf::from("/sys/fs/cgroup/test/c1/leaf"),
            Path::new("/var/lib/rootfs"),
        );

        assert_eq!(launch_info.clone_namespaces.len(), 2);
        assert_eq!(
            launch_info.mounts[0].target,
            PathBuf::from("/var/lib/rootfs/sys/fs/cgroup")
        );
    }

    #[test]
    fn test_task_launch_info_round_trips() {
        let launch_info = ContainerLaunchInfo::cgroup_mount(
            PathBuf::from("/sys/fs/cgroup/test/c1/leaf"),
            Path::new("/var/lib/rootfs"),
        )
        .into_task_launch_info()
        .expect("failed to encode launch info");

        let command = launch_info.command.expect("task launch info command");
        let argument = &command.arguments[0];
        let encoded = argument
            .strip_prefix("--task_launch_info=")
            .expect("task launch info argument prefix");

        let inner: ContainerLaunchInfo =
            serde_json::from_str(encoded).expect("valid launch info json");
        assert_eq!(inner.mounts.len(), 1);
        assert!(launch_info.mounts.is_empty());
    }
}
