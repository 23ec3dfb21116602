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
use crate::resources::{ResourceLimits, Resources};
use async_trait::async_trait;
use std::path::Path;

/// Pins a container to cpu and memory nodes. An empty list means the
/// parent's nodes, which is the kernel default, so unset requests
/// leave the files untouched.
#[derive(Debug, Default)]
pub struct CpusetController;

#[async_trait]
impl Controller for CpusetController {
    fn name(&self) -> &'static str {
        "cpuset"
    }

    async fn update(
        &self,
        _container_id: &ContainerId,
        cgroup: &Path,
        requests: &Resources,
        _limits: &ResourceLimits,
    ) -> Result<()> {
        if let Some(cpus) = &requests.cpuset_cpus {
            cgroups2::write(cgroup, "cpuset.cpus", cpus)?;
        }

        if let Some(mems) = &requests.cpuset_mems {
            cgroups2::write(cgroup, "cpuset.mems", mems)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{Cpus, Mems};
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_update_pins_nodes() {
        let tmp = TempDir::new().expect("tempdir");
        let requests = Resources {
            cpuset_cpus: Some(Cpus::new("0-3,7".into()).expect("cpus")),
            cpuset_mems: Some(Mems::new("0".into()).expect("mems")),
            ..Resources::default()
        };

        CpusetController
            .update(
                &ContainerId::random_for_tests(),
                tmp.path(),
                &requests,
                &HashMap::new(),
            )
            .await
            .expect("update");

        let cpus =
            fs::read_to_string(tmp.path().join("cpuset.cpus")).expect("read");
        let mems =
            fs::read_to_string(tmp.path().join("cpuset.mems")).expect("read");
        assert_eq!(cpus, "0-3,7");
        assert_eq!(mems, "0");
    }

    #[tokio::test]
    async fn test_update_without_cpuset_request_is_a_noop() {
        let tmp = TempDir::new().expect("tempdir");

        CpusetController
            .update(
                &ContainerId::random_for_tests(),
                tmp.path(),
                &Resources::default(),
                &HashMap::new(),
            )
            .await
            .expect("update");

        assert!(!tmp.path().join("cpuset.cpus").exists());
    }
}
