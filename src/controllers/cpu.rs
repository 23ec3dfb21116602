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

use super::{stat_value, Controller, Result};
use crate::cgroups2;
use crate::isolator::ContainerId;
use crate::resources::{ResourceLimits, Resources, ResourceStatistics};
use async_trait::async_trait;
use std::path::Path;
use tracing::debug;

/// CFS bandwidth period. Quotas are expressed against this so users
/// can think in "cores" without also choosing a period.
const CPU_PERIOD_USEC: u64 = 100_000;

/// The kernel rejects quotas under 1ms.
const MIN_QUOTA_USEC: u64 = 1_000;

// cpu.weight bounds plus the v1 shares range it maps from
const MIN_SHARES: u64 = 2;
const MAX_SHARES: u64 = 262_144;
const SHARES_PER_CPU: u64 = 1_024;

#[derive(Debug, Default)]
pub struct CpuController;

#[async_trait]
impl Controller for CpuController {
    fn name(&self) -> &'static str {
        "cpu"
    }

    async fn update(
        &self,
        container_id: &ContainerId,
        cgroup: &Path,
        requests: &Resources,
        limits: &ResourceLimits,
    ) -> Result<()> {
        if let Some(cpus) = requests.cpus {
            let weight = cpus_to_weight(cpus);
            debug!("Updating cpu.weight to {weight} for container '{container_id}'");
            cgroups2::write(cgroup, "cpu.weight", &weight.to_string())?;
        }

        // The hard cap comes from the limits; a container without a
        // cpus limit is capped at its request.
        if let Some(quota) = limits.get("cpus").copied().or(requests.cpus) {
            let value = if quota.is_infinite() {
                format!("max {CPU_PERIOD_USEC}")
            } else {
                let quota_usec = ((quota * CPU_PERIOD_USEC as f64) as u64)
                    .max(MIN_QUOTA_USEC);
                format!("{quota_usec} {CPU_PERIOD_USEC}")
            };
            cgroups2::write(cgroup, "cpu.max", &value)?;
        }

        Ok(())
    }

    async fn usage(
        &self,
        _container_id: &ContainerId,
        cgroup: &Path,
    ) -> Result<ResourceStatistics> {
        let stat = cgroups2::read(cgroup, "cpu.stat")?;

        Ok(ResourceStatistics {
            cpu_usage_usec: stat_value(&stat, "usage_usec"),
            cpu_user_usec: stat_value(&stat, "user_usec"),
            cpu_system_usec: stat_value(&stat, "system_usec"),
            cpu_nr_throttled: stat_value(&stat, "nr_throttled"),
            cpu_throttled_usec: stat_value(&stat, "throttled_usec"),
            ..ResourceStatistics::default()
        })
    }
}

/// Maps requested cores onto `cpu.weight` through the v1 shares range,
/// using the kernel's documented shares-to-weight conversion.
fn cpus_to_weight(cpus: f64) -> u64 {
    let shares = ((cpus * SHARES_PER_CPU as f64) as u64)
        .clamp(MIN_SHARES, MAX_SHARES);
    1 + ((shares - MIN_SHARES) * 9_999) / (MAX_SHARES - MIN_SHARES)
}
