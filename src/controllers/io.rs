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

use super::{read_optional, Controller, Result};
use crate::isolator::ContainerId;
use crate::resources::ResourceStatistics;
use async_trait::async_trait;
use std::path::Path;

/// Block IO accounting. Enforcement (`io.max`) is left to the host's
/// disk isolators; this controller only reports usage.
#[derive(Debug, Default)]
pub struct IoController;

#[async_trait]
impl Controller for IoController {
    fn name(&self) -> &'static str {
        "io"
    }

    async fn usage(
        &self,
        _container_id: &ContainerId,
        cgroup: &Path,
    ) -> Result<ResourceStatistics> {
        // io.stat is absent until the first charge on some kernels
        let Some(stat) = read_optional(cgroup, "io.stat")? else {
            return Ok(ResourceStatistics::default());
        };

        let mut read_bytes = 0u64;
        let mut write_bytes = 0u64;

        // one line per device: "8:0 rbytes=1024 wbytes=2048 rios=..."
        for line in stat.lines() {
            for field in line.split_whitespace().skip(1) {
                if let Some((key, value)) = field.split_once('=') {
                    let value = value.parse::<u64>().unwrap_or(0);
                    match key {
                        "rbytes" => read_bytes += value,
                        "wbytes" => write_bytes += value,
                        _ => {}
                    }
                }
            }
        }

        Ok(ResourceStatistics {
            io_read_bytes: Some(read_bytes),
            io_write_bytes: Some(write_bytes),
            ..ResourceStatistics::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_usage_aggregates_devices() {
        let tmp = TempDir::new().expect("tempdir");
        fs::write(
            tmp.path().join("io.stat"),
            "8:0 rbytes=1000 wbytes=500 rios=10 wios=5\n8:16 rbytes=24 wbytes=1\n",
        )
        .expect("write");

        let stats = IoController
            .usage(&ContainerId::random_for_tests(), tmp.path())
            .await
            .expect("usage");

        assert_eq!(stats.io_read_bytes, Some(1024));
        assert_eq!(stats.io_write_bytes, Some(501));
    }

    #[tokio::test]
    async fn test_usage_without_io_stat() {
        let tmp = TempDir::new().expect("tempdir");

        let stats = IoController
            .usage(&ContainerId::random_for_tests(), tmp.path())
            .await
            .expect("usage");

        assert_eq!(stats.io_read_bytes, None);
    }
}
