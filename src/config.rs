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

use crate::isolator::ContainerId;
use crate::resources::{ResourceLimits, Resources};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Agent flags consumed by the isolator. Parsing the agent's command
/// line into this struct is the embedding agent's job.
#[derive(Debug, Clone)]
pub struct Flags {
    /// Absolute path of the root cgroup all containers live under,
    /// itself a subdirectory of the mounted cgroup2 filesystem.
    pub cgroups_root: PathBuf,
    /// Comma-separated isolation tokens. Tokens prefixed with
    /// `cgroups/` select controllers (`cgroups/cpu`, `cgroups/mem`,
    /// ...); `cgroups/all` selects every known controller. Tokens
    /// without the prefix belong to other isolators and are ignored.
    pub isolation: String,
    /// When true the memory controller disables swap for every
    /// container (`memory.swap.max=0`).
    pub limit_swap: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerClass {
    #[default]
    Standard,
    Debug,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinuxInfo {
    /// Whether a nested container shares its parent's cgroups instead
    /// of maintaining its own subtree. Unset means shared.
    pub share_cgroups: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub linux_info: Option<LinuxInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandInfo {
    pub user: Option<String>,
    pub arguments: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub command: CommandInfo,
}

/// Per-container configuration handed to `prepare` by the
/// containerizer.
#[derive(Debug, Clone, Default)]
pub struct ContainerConfig {
    pub container_info: Option<ContainerInfo>,
    pub container_class: ContainerClass,
    /// User the executor runs as; gates delegation of the leaf cgroup.
    pub user: Option<String>,
    /// Present for command tasks only.
    pub task_info: Option<TaskInfo>,
    pub rootfs: Option<PathBuf>,
    pub resources: Resources,
    pub limits: ResourceLimits,
}

impl ContainerConfig {
    /// True when the container shares its parent's cgroups: it must be
    /// nested, and the linux-info bit must be unset or true.
    pub fn share_cgroups(&self, container_id: &ContainerId) -> bool {
        container_id.parent().is_some() && share_cgroups_bit(&self.container_info)
    }

    /// The user to delegate the leaf cgroup to, if any. For a command
    /// task with a rootfs the executor runs as root and the task's own
    /// user takes precedence; we do not support the task user being
    /// unset in that case.
    pub fn cgroup_user(&self) -> Option<&str> {
        self.user.as_ref()?;

        if self.task_info.is_some() && self.rootfs.is_some() {
            self.task_info.as_ref().and_then(|task| task.command.user.as_deref())
        } else {
            self.user.as_deref()
        }
    }
}

/// Checkpointed container state replayed into `recover` after an agent
/// restart.
#[derive(Debug, Clone)]
pub struct ContainerState {
    pub container_id: ContainerId,
    pub container_info: Option<ContainerInfo>,
}

impl ContainerState {
    /// Same derivation as [ContainerConfig::share_cgroups].
    pub fn share_cgroups(&self) -> bool {
        self.container_id.parent().is_some()
            && share_cgroups_bit(&self.container_info)
    }
}

fn share_cgroups_bit(container_info: &Option<ContainerInfo>) -> bool {
    container_info
        .as_ref()
        .and_then(|info| info.linux_info.as_ref())
        .and_then(|linux| linux.share_cgroups)
        .unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested_id() -> ContainerId {
        ContainerId::parse("parent/child").expect("valid container id")
    }

    #[test]
    fn test_top_level_containers_never_share() {
        let config = ContainerConfig::default();
        let id = ContainerId::new("top").expect("valid container id");

        assert!(!config.share_cgroups(&id));
    }

    #[test]
    fn test_nested_containers_share_by_default() {
        let config = ContainerConfig::default();

        assert!(config.share_cgroups(&nested_id()));
    }

    #[test]
    fn test_nested_containers_can_opt_out_of_sharing() {
        let config = ContainerConfig {
            container_info: Some(ContainerInfo {
                linux_info: Some(LinuxInfo { share_cgroups: Some(false) }),
            }),
            ..ContainerConfig::default()
        };

        assert!(!config.share_cgroups(&nested_id()));
    }

    #[test]
    fn test_task_user_takes_precedence_with_rootfs() {
        let config = ContainerConfig {
            user: Some("executor".into()),
            rootfs: Some("/mnt/rootfs".into()),
            task_info: Some(TaskInfo {
                command: CommandInfo {
                    user: Some("task".into()),
                    arguments: vec![],
                },
            }),
            ..ContainerConfig::default()
        };

        assert_eq!(config.cgroup_user(), Some("task"));
    }

    #[test]
    fn test_no_user_means_no_delegation() {
        let config = ContainerConfig {
            task_info: Some(TaskInfo::default()),
            rootfs: Some("/mnt/rootfs".into()),
            ..ContainerConfig::default()
        };

        assert_eq!(config.cgroup_user(), None);
    }
}
