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

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CgroupsError>;

#[derive(Error, Debug)]
pub enum CgroupsError {
    #[error("failed to create cgroup '{}': {source}", cgroup.display())]
    CreateCgroup { cgroup: PathBuf, source: io::Error },
    #[error("failed to list cgroup '{}': {source}", cgroup.display())]
    ListCgroup { cgroup: PathBuf, source: io::Error },
    #[error("failed to read '{}': {source}", path.display())]
    ReadControl { path: PathBuf, source: io::Error },
    #[error("failed to write '{}': {source}", path.display())]
    WriteControl { path: PathBuf, source: io::Error },
    #[error("controller '{controller}' is not available in cgroup '{}'", cgroup.display())]
    ControllerNotAvailable { controller: String, cgroup: PathBuf },
    #[error("failed to remove cgroup '{}': {source}", cgroup.display())]
    RemoveCgroup { cgroup: PathBuf, source: io::Error },
}
