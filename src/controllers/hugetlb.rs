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

/// Page sizes the kernel commonly exposes; only the sizes whose
/// control files exist on this host are reported.
const HUGEPAGE_SIZES: [&str; 6] = ["64KB", "1MB", "2MB", "32MB", "512MB", "1GB"];

#[derive(Debug, Default)]
pub struct HugetlbController;

#[async_trait]
impl Controller for HugetlbController {
    fn name(&self) -> &'static str {
        "hugetlb"
    }

    async fn usage(
        &self,
        _container_id: &ContainerId,
        cgroup: &Path,
    ) -> Result<ResourceStatistics> {
        let mut stats = ResourceStatistics::default();

        for size in HUGEPAGE_SIZES {
            let control = format!("hugetlb.{size}.current");
            if let Some(contents) = read_optional(cgroup, &control)? {
                if let Ok(bytes) = contents.trim().parse::<u64>() {
                    let _ = stats
                        .hugetlb_current_bytes
                        .insert(size.to_string(), bytes);
                }
            }
        }

        Ok(stats)
    }
}
