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

use super::{read_optional, stat_value, Controller, Result};
use crate::cgroups2;
use crate::config::ContainerConfig;
use crate::isolator::ContainerId;
use crate::resources::{
    ContainerLimitation, ContainerStatus, ResourceLimits, Resources,
    ResourceStatistics,
};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const MEMORY_EVENTS_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct MemoryController {
    /// When set, containers get `memory.swap.max=0` so memory limits
    /// cannot be dodged by swapping.
    limit_swap: bool,
}

impl MemoryController {
    pub fn new(limit_swap: bool) -> Self {
        Self { limit_swap }
    }
}

#[async_trait]
impl Controller for MemoryController {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn prepare(
        &self,
        _container_id: &ContainerId,
        cgroup: &Path,
        _container_config: &ContainerConfig,
    ) -> Result<()> {
        if self.limit_swap {
            cgroups2::write(cgroup, "memory.swap.max", "0")?;
        }

        Ok(())
    }

    async fn update(
        &self,
        container_id: &ContainerId,
        cgroup: &Path,
        requests: &Resources,
        limits: &ResourceLimits,
    ) -> Result<()> {
        // The request is the protected floor; the limit (falling back
        // to the request) is the hard cap the OOM killer enforces.
        if let Some(request) = requests.mem {
            debug!("Updating memory.low to {request} for container '{container_id}'");
            cgroups2::write(cgroup, "memory.low", &request.to_string())?;
        }

        let hard_limit = limits
            .get("mem")
            .copied()
            .map(|limit| {
                if limit.is_infinite() {
                    "max".to_string()
                } else {
                    (limit as u64).to_string()
                }
            })
            .or_else(|| requests.mem.map(|bytes| bytes.to_string()));

        if let Some(hard_limit) = hard_limit {
            cgroups2::write(cgroup, "memory.max", &hard_limit)?;
        }

        Ok(())
    }

    /// Polls `memory.events` and resolves on the first oom kill. The
    /// orchestrator owns the lifetime of this future and aborts it on
    /// cleanup.
    async fn watch(
        &self,
        container_id: &ContainerId,
        cgroup: &Path,
    ) -> Result<ContainerLimitation> {
        let baseline = oom_kills(cgroup)?;
        let mut interval = tokio::time::interval(MEMORY_EVENTS_POLL_INTERVAL);

        loop {
            let _ = interval.tick().await;

            let kills = oom_kills(cgroup)?;
            if kills > baseline {
                return Ok(ContainerLimitation {
                    resource: "mem".to_string(),
                    message: format!(
                        "Memory limit exceeded: the kernel oom killer \
                         terminated a process of container '{container_id}'"
                    ),
                });
            }
        }
    }

    async fn usage(
        &self,
        _container_id: &ContainerId,
        cgroup: &Path,
    ) -> Result<ResourceStatistics> {
        let current =
            cgroups2::read(cgroup, "memory.current")?.trim().parse().ok();

        // memory.peak only exists on newer kernels
        let peak = read_optional(cgroup, "memory.peak")?
            .and_then(|contents| contents.trim().parse().ok());

        Ok(ResourceStatistics {
            mem_current_bytes: current,
            mem_peak_bytes: peak,
            mem_oom_kills: Some(oom_kills(cgroup)?),
            ..ResourceStatistics::default()
        })
    }

    async fn status(
        &self,
        _container_id: &ContainerId,
        cgroup: &Path,
    ) -> Result<ContainerStatus> {
        Ok(ContainerStatus { oom_killed: Some(oom_kills(cgroup)? > 0) })
    }
}

fn oom_kills(cgroup: &Path) -> Result<u64> {
    let events = cgroups2::read(cgroup, "memory.events")?;
    Ok(stat_value(&events, "oom_kill").unwrap_or(0))
}
