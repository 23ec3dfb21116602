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

//! Resource controllers.
//!
//! Every controller exposes the same asynchronous lifecycle over the
//! non-leaf cgroup it is handed. The default implementations are
//! no-ops so a controller only overrides the steps it takes part in;
//! `watch` defaults to pending forever since most controllers never
//! report a limitation.

use crate::cgroups2::{self, CgroupsError};
use crate::config::ContainerConfig;
use crate::isolator::ContainerId;
use crate::resources::{
    ContainerLimitation, ContainerStatus, ResourceLimits, Resources,
    ResourceStatistics,
};
use async_trait::async_trait;
use nix::unistd::Pid;
use std::path::Path;

pub use core_controller::CoreController;
pub use cpu::CpuController;
pub use cpuset::CpusetController;
pub use devices::{DeviceManager, DevicesController, NullDeviceManager};
pub use error::{ControllerError, Result};
pub use hugetlb::HugetlbController;
pub use io::IoController;
pub use memory::MemoryController;
pub use perf_event::PerfEventController;
pub use pids::PidsController;

mod core_controller;
mod cpu;
mod cpuset;
mod devices;
mod error;
mod hugetlb;
mod io;
mod memory;
mod perf_event;
mod pids;

/// Controllers that exist implicitly in every cgroup: they never
/// appear in `cgroup.controllers` or `cgroup.subtree_control` and must
/// not be written there.
pub const IMPLICIT_CONTROLLERS: [&str; 3] = ["core", "perf_event", "devices"];

pub fn is_implicit(name: &str) -> bool {
    IMPLICIT_CONTROLLERS.contains(&name)
}

#[async_trait]
pub trait Controller: std::fmt::Debug + Send + Sync {
    /// The kernel name of this controller, as it appears in
    /// `cgroup.subtree_control` (implicit controllers excepted).
    fn name(&self) -> &'static str;

    /// One-shot initialization after the container's cgroups exist.
    async fn prepare(
        &self,
        _container_id: &ContainerId,
        _cgroup: &Path,
        _container_config: &ContainerConfig,
    ) -> Result<()> {
        Ok(())
    }

    /// Invoked after the launcher placed `pid` in the leaf cgroup.
    async fn isolate(
        &self,
        _container_id: &ContainerId,
        _cgroup: &Path,
        _pid: Pid,
    ) -> Result<()> {
        Ok(())
    }

    /// Resolves when this controller detects a resource violation.
    /// Long lived; the orchestrator discards it on cleanup.
    async fn watch(
        &self,
        _container_id: &ContainerId,
        _cgroup: &Path,
    ) -> Result<ContainerLimitation> {
        std::future::pending().await
    }

    /// Applies new requests/limits. Idempotent under equal inputs.
    async fn update(
        &self,
        _container_id: &ContainerId,
        _cgroup: &Path,
        _requests: &Resources,
        _limits: &ResourceLimits,
    ) -> Result<()> {
        Ok(())
    }

    async fn usage(
        &self,
        _container_id: &ContainerId,
        _cgroup: &Path,
    ) -> Result<ResourceStatistics> {
        Ok(ResourceStatistics::default())
    }

    async fn status(
        &self,
        _container_id: &ContainerId,
        _cgroup: &Path,
    ) -> Result<ContainerStatus> {
        Ok(ContainerStatus::default())
    }

    /// Restores controller-local state from the on-disk cgroup after
    /// an agent restart.
    async fn recover(
        &self,
        _container_id: &ContainerId,
        _cgroup: &Path,
    ) -> Result<()> {
        Ok(())
    }

    /// Releases controller-local state. Must be safe without a prior
    /// `prepare` and must not remove the cgroup itself.
    async fn cleanup(
        &self,
        _container_id: &ContainerId,
        _cgroup: &Path,
    ) -> Result<()> {
        Ok(())
    }
}

/// Reads a `key value` line file like `cpu.stat` or `memory.events`.
pub(crate) fn stat_value(contents: &str, key: &str) -> Option<u64> {
    contents.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        match fields.next() {
            Some(k) if k == key => fields.next()?.parse().ok(),
            _ => None,
        }
    })
}

/// Reads a control file that may not exist on older kernels.
pub(crate) fn read_optional(
    cgroup: &Path,
    control: &str,
) -> Result<Option<String>> {
    match cgroups2::read(cgroup, control) {
        Ok(contents) => Ok(Some(contents)),
        Err(CgroupsError::ReadControl { source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}
