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

//! Device access control. The implicit devices controller has no
//! control files; access is enforced by bpf programs attached to the
//! cgroup, owned by the host's device manager. This controller only
//! drives that collaborator through the container lifecycle.

use super::{Controller, Result};
use crate::config::ContainerState;
use crate::isolator::ContainerId;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// The host's device manager: attaches and detaches per-cgroup device
/// access programs. Implementations live outside this crate.
#[async_trait]
pub trait DeviceManager: std::fmt::Debug + Send + Sync {
    /// Attaches the default device access program to `cgroup`.
    async fn configure(
        &self,
        container_id: &ContainerId,
        cgroup: &Path,
    ) -> Result<()>;

    /// Detaches any program from `cgroup`. Must be safe to call when
    /// `configure` never ran.
    async fn remove(
        &self,
        container_id: &ContainerId,
        cgroup: &Path,
    ) -> Result<()>;

    /// Rebuilds device state for checkpointed containers after an
    /// agent restart.
    async fn recover(&self, states: &[ContainerState]) -> Result<()>;
}

/// A device manager for hosts without device isolation.
#[derive(Debug, Default)]
pub struct NullDeviceManager;

#[async_trait]
impl DeviceManager for NullDeviceManager {
    async fn configure(
        &self,
        _container_id: &ContainerId,
        _cgroup: &Path,
    ) -> Result<()> {
        Ok(())
    }

    async fn remove(
        &self,
        _container_id: &ContainerId,
        _cgroup: &Path,
    ) -> Result<()> {
        Ok(())
    }

    async fn recover(&self, _states: &[ContainerState]) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug)]
pub struct DevicesController {
    device_manager: Arc<dyn DeviceManager>,
}

impl DevicesController {
    pub fn new(device_manager: Arc<dyn DeviceManager>) -> Self {
        Self { device_manager }
    }
}

#[async_trait]
impl Controller for DevicesController {
    fn name(&self) -> &'static str {
        "devices"
    }

    async fn prepare(
        &self,
        container_id: &ContainerId,
        cgroup: &Path,
        _container_config: &crate::config::ContainerConfig,
    ) -> Result<()> {
        self.device_manager.configure(container_id, cgroup).await
    }

    async fn cleanup(
        &self,
        container_id: &ContainerId,
        cgroup: &Path,
    ) -> Result<()> {
        self.device_manager.remove(container_id, cgroup).await
    }
}
