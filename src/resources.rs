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

use fancy_regex::Regex;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use thiserror::Error;

lazy_static! {
    // a comma separated list of numbers with optional ranges ("0-3,7"),
    // or the empty string
    static ref CPU_LIST_REGEX: Regex =
        Regex::new(r"^(\d+(-\d+)?)(,\d+(-\d+)?)*$|^$").expect("regex construction");
}

#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("'{input}' is not a valid cpu/mem node list")]
    InvalidNodeList { input: String },
}

/// A cpuset node list in the kernel's list format, e.g. `0-3,7`.
#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct Cpus(String);

impl Cpus {
    pub fn new(input: String) -> Result<Self, ResourceError> {
        if !CPU_LIST_REGEX.is_match(&input).unwrap_or(false) {
            return Err(ResourceError::InvalidNodeList { input });
        }

        Ok(Self(input))
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Deref for Cpus {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for Cpus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A cpuset memory node list, same list format as [Cpus].
#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct Mems(String);

impl Mems {
    pub fn new(input: String) -> Result<Self, ResourceError> {
        if !CPU_LIST_REGEX.is_match(&input).unwrap_or(false) {
            return Err(ResourceError::InvalidNodeList { input });
        }

        Ok(Self(input))
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Deref for Mems {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for Mems {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Resource requests for a container. Requests size the container's
/// guaranteed share; hard caps come from [ResourceLimits].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resources {
    /// Requested cpu cores; may be fractional.
    pub cpus: Option<f64>,
    /// Requested memory in bytes.
    pub mem: Option<u64>,
    /// Requested maximum number of tasks.
    pub pids: Option<u64>,
    pub cpuset_cpus: Option<Cpus>,
    pub cpuset_mems: Option<Mems>,
}

/// Hard resource limits keyed by resource name (`cpus`, `mem`).
/// `f64::INFINITY` means unlimited.
pub type ResourceLimits = HashMap<String, f64>;

/// Point-in-time accounting for one container, merged across the
/// controllers that produced a reading. Every field is optional; a
/// controller only fills the fields it owns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceStatistics {
    pub processes: Option<u64>,
    pub threads: Option<u64>,
    pub cpu_usage_usec: Option<u64>,
    pub cpu_user_usec: Option<u64>,
    pub cpu_system_usec: Option<u64>,
    pub cpu_nr_throttled: Option<u64>,
    pub cpu_throttled_usec: Option<u64>,
    pub mem_current_bytes: Option<u64>,
    pub mem_peak_bytes: Option<u64>,
    pub mem_oom_kills: Option<u64>,
    pub io_read_bytes: Option<u64>,
    pub io_write_bytes: Option<u64>,
    pub pids_current: Option<u64>,
    /// Bytes of hugetlb memory in use, keyed by page size (`2MB`, `1GB`).
    pub hugetlb_current_bytes: BTreeMap<String, u64>,
}

impl ResourceStatistics {
    /// Folds `other` into `self`. Later readings win for scalar fields;
    /// controllers own disjoint fields so overwrites only happen when
    /// the same controller reports twice.
    pub fn merge(&mut self, other: ResourceStatistics) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() {
                    self.$field = other.$field;
                })*
            };
        }

        take!(
            processes,
            threads,
            cpu_usage_usec,
            cpu_user_usec,
            cpu_system_usec,
            cpu_nr_throttled,
            cpu_throttled_usec,
            mem_current_bytes,
            mem_peak_bytes,
            mem_oom_kills,
            io_read_bytes,
            io_write_bytes,
            pids_current
        );

        self.hugetlb_current_bytes.extend(other.hugetlb_current_bytes);
    }
}

/// Point-in-time status for one container, merged like
/// [ResourceStatistics].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub oom_killed: Option<bool>,
}

impl ContainerStatus {
    pub fn merge(&mut self, other: ContainerStatus) {
        if other.oom_killed.is_some() {
            self.oom_killed = other.oom_killed;
        }
    }
}

/// A resource violation reported by a controller, e.g. the memory
/// controller observing an OOM kill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerLimitation {
    /// Name of the violated resource (`mem`, `cpus`, ...).
    pub resource: String,
    pub message: String,
}
