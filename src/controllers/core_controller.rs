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

//! The always-on "core" controller: the `cgroup.*` control files that
//! exist in every cgroup regardless of `subtree_control`.

use super::{read_optional, Controller, Result};
use crate::cgroups2;
use crate::isolator::ContainerId;
use crate::resources::ResourceStatistics;
use async_trait::async_trait;
use std::path::Path;

#[derive(Debug, Default)]
pub struct CoreController;

#[async_trait]
impl Controller for CoreController {
    fn name(&self) -> &'static str {
        "core"
    }

    /// Counts processes and threads across the container's subtree.
    /// Processes live in leaf cgroups, so the non-leaf alone would
    /// always read empty.
    async fn usage(
        &self,
        _container_id: &ContainerId,
        cgroup: &Path,
    ) -> Result<ResourceStatistics> {
        let mut processes = cgroups2::procs(cgroup)?.len() as u64;
        let mut threads = count_threads(cgroup)?;

        for descendant in cgroups2::cgroups(cgroup)? {
            processes += cgroups2::procs(&descendant)?.len() as u64;
            threads += count_threads(&descendant)?;
        }

        Ok(ResourceStatistics {
            processes: Some(processes),
            threads: Some(threads),
            ..ResourceStatistics::default()
        })
    }
}

fn count_threads(cgroup: &Path) -> Result<u64> {
    Ok(read_optional(cgroup, cgroups2::CGROUP_THREADS)?
        .map(|contents| contents.lines().count() as u64)
        .unwrap_or(0))
}
