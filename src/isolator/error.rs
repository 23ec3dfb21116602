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

use super::container_id::ContainerId;
use crate::cgroups2::CgroupsError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IsolatorError>;

#[derive(Error, Debug)]
pub enum IsolatorError {
    #[error("unknown or unsupported isolator 'cgroups/{token}'")]
    UnknownIsolator { token: String },
    #[error("container '{container_id}' has already been prepared")]
    AlreadyPrepared { container_id: ContainerId },
    #[error("container '{container_id}' has already been recovered")]
    AlreadyRecovered { container_id: ContainerId },
    #[error("cgroup '{}' already exists", cgroup.display())]
    CgroupExists { cgroup: PathBuf },
    #[error("unknown container '{container_id}'")]
    UnknownContainer { container_id: ContainerId },
    #[error("update is not supported for nested containers")]
    UpdateNotSupportedForNested,
    #[error("debug container '{container_id}' must share its parent's cgroups")]
    DebugContainerMustShareCgroups { container_id: ContainerId },
    #[error(transparent)]
    Cgroups(#[from] CgroupsError),
    #[error("failed to {operation} controllers: {errors}")]
    ControllerFailure { operation: &'static str, errors: String },
    #[error("failed to recover {context}: {errors}")]
    RecoveryFailed { context: &'static str, errors: String },
    #[error("unknown user '{user}'")]
    UnknownUser { user: String },
    #[error("failed to chown cgroup '{}' to user '{user}': {source}", cgroup.display())]
    ChownCgroup { cgroup: PathBuf, user: String, source: nix::Error },
    #[error("watch on container '{container_id}' was discarded")]
    WatchDiscarded { container_id: ContainerId },
    #[error("failed to watch container '{container_id}': {message}")]
    WatchFailed { container_id: ContainerId, message: String },
    #[error("failed to encode launch info: {0}")]
    LaunchInfoEncoding(#[from] serde_json::Error),
}
