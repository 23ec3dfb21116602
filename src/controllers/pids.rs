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

use super::{Controller, Result};
use crate::cgroups2;
use crate::isolator::ContainerId;
use crate::resources::{ResourceLimits, Resources, ResourceStatistics};
use async_trait::async_trait;
use std::path::Path;

#[derive(Debug, Default)]
pub struct PidsController;

#[async_trait]
impl Controller for PidsController {
    fn name(&self) -> &'static str {
        "pids"
    }

    async fn update(
        &self,
        _container_id: &ContainerId,
        cgroup: &Path,
        requests: &Resources,
        _limits: &ResourceLimits,
    ) -> Result<()> {
        if let Some(pids) = requests.pids {
            cgroups2::write(cgroup, "pids.max", &pids.to_string())?;
        }

        Ok(())
    }

    async fn usage(
        &self,
        _container_id: &ContainerId,
        cgroup: &Path,
    ) -> Result<ResourceStatistics> {
        let current = cgroups2::read(cgroup, "pids.current")?.trim().parse().ok();

        Ok(ResourceStatistics {
            pids_current: current,
            ..ResourceStatistics::default()
        })
    }
}
