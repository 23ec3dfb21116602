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

//! The cgroup path scheme.
//!
//! Each container owns a non-leaf cgroup at `<root>/<id-path>` where
//! controllers are enabled and limits are written, and a leaf cgroup
//! at `<root>/<id-path>/leaf` where its processes live. The split
//! exists because of the kernel's no-internal-processes rule: a
//! cgroup cannot both hold processes and enable controllers for its
//! children.

use super::container_id::ContainerId;
use std::path::{Path, PathBuf};

/// Name of every container's leaf cgroup; reserved, never a valid
/// container id component.
pub const LEAF_CGROUP: &str = "leaf";

/// Name of the agent's own cgroup under the root; reserved, skipped
/// during recovery.
pub const AGENT_CGROUP: &str = "agent";

/// The agent's own cgroup.
pub fn agent(root: &Path) -> PathBuf {
    root.join(AGENT_CGROUP)
}

/// The container's non-leaf cgroup, or its leaf when `leaf` is set.
pub fn container(root: &Path, container_id: &ContainerId, leaf: bool) -> PathBuf {
    let mut path = root.join(container_id.as_path());
    if leaf {
        path.push(LEAF_CGROUP);
    }
    path
}

/// The inverse of [container]: parses a cgroup path back into a
/// container id. Returns `None` for paths that are not shaped like a
/// container cgroup: the agent's cgroup, leaf cgroups, paths outside
/// the root, and components that are not valid id components.
pub fn container_id(root: &Path, cgroup: &Path) -> Option<ContainerId> {
    let relative = cgroup.strip_prefix(root).ok()?;

    let mut current: Option<ContainerId> = None;
    for component in relative.iter() {
        let component = component.to_str()?;

        if current.is_none() && component == AGENT_CGROUP {
            return None;
        }

        if component == LEAF_CGROUP {
            return None;
        }

        current = Some(match current {
            None => ContainerId::new(component).ok()?,
            Some(parent) => parent.child(component).ok()?,
        });
    }

    current
}
