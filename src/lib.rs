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

//! Cgroup v2 resource isolation for container workloads.
//!
//! Each container gets a pair of cgroups under a configured root: a
//! non-leaf cgroup where controllers are enabled and limits are
//! written, and a leaf cgroup (`<non-leaf>/leaf`) where its processes
//! live, as the kernel's no-internal-processes rule demands.
//! The [isolator::Cgroups2Isolator] orchestrates the container
//! lifecycle (`prepare`, `isolate`, `update`, `watch`, `usage`,
//! `status`, `cleanup`, `recover`) across a set of pluggable
//! [controllers::Controller] implementations, and reconciles its
//! registry with the on-disk hierarchy after an agent restart.
// Lint groups: https://doc.rust-lang.org/rustc/lints/groups.html
#![warn(future_incompatible, nonstandard_style, unused)]
#![warn(
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    unconditional_recursion,
    unused_comparisons,
    while_true
)]
#![warn(
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces
)]
#![warn(clippy::unwrap_used)]

pub mod cgroups2;
pub mod config;
pub mod controllers;
pub mod isolator;
pub mod launch;
pub mod resources;

pub use config::{ContainerConfig, ContainerState, Flags};
pub use controllers::{Controller, DeviceManager, NullDeviceManager};
pub use isolator::{Cgroups2Isolator, ContainerId, IsolatorError};
pub use launch::ContainerLaunchInfo;
pub use resources::{
    ContainerLimitation, ContainerStatus, ResourceLimits, Resources,
    ResourceStatistics,
};
