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
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use thiserror::Error;

pub const SEPARATOR: char = '/';

lazy_static! {
    // NOTE: '/' (separator) and the leaf cgroup name are reserved, so
    // a value is a single dns-label-ish component.
    static ref CONTAINER_ID_VALUE_REGEX: Regex =
        Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9._-]*[a-zA-Z0-9])?$")
            .expect("regex construction");
}

#[derive(Error, Debug)]
pub enum ContainerIdError {
    #[error("container id component must not be empty")]
    Empty,
    #[error("'{component}' is not a valid container id component")]
    InvalidComponent { component: String },
    #[error("'{component}' is a reserved cgroup name")]
    Reserved { component: String },
}

/// A hierarchical container identifier. Nested containers carry their
/// full ancestor chain; equality and hashing are structural over the
/// whole chain.
#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct ContainerId {
    parent: Option<Box<ContainerId>>,
    value: String,
}

impl ContainerId {
    /// A top-level container id.
    pub fn new(value: impl Into<String>) -> Result<Self, ContainerIdError> {
        let value = validate_component(value.into())?;
        Ok(Self { parent: None, value })
    }

    /// A container id nested under `self`.
    pub fn child(
        &self,
        value: impl Into<String>,
    ) -> Result<Self, ContainerIdError> {
        let value = validate_component(value.into())?;
        Ok(Self { parent: Some(Box::new(self.clone())), value })
    }

    /// Parses a `/`-separated id path, e.g. `parent/child`. Leading
    /// and trailing separators are forgiven.
    pub fn parse(input: &str) -> Result<Self, ContainerIdError> {
        let mut current: Option<ContainerId> = None;
        for component in
            input.trim_matches(SEPARATOR).split(SEPARATOR)
        {
            current = Some(match current {
                None => ContainerId::new(component)?,
                Some(parent) => parent.child(component)?,
            });
        }

        current.ok_or(ContainerIdError::Empty)
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn parent(&self) -> Option<&ContainerId> {
        self.parent.as_deref()
    }

    /// Ancestor chain components, root first.
    pub fn components(&self) -> Vec<&str> {
        let mut components = match &self.parent {
            Some(parent) => parent.components(),
            None => vec![],
        };
        components.push(&self.value);
        components
    }

    /// The relative cgroup path of this id under a root, `a/b/c`.
    pub fn as_path(&self) -> PathBuf {
        self.components().iter().collect()
    }

    #[cfg(test)]
    pub fn random_for_tests() -> Self {
        ContainerId::new(format!("test-{}", uuid::Uuid::new_v4()))
            .expect("valid container id")
    }

    #[cfg(test)]
    pub fn random_child_for_tests(parent: &ContainerId) -> Self {
        parent
            .child(format!("test-{}", uuid::Uuid::new_v4()))
            .expect("valid container id")
    }
}

fn validate_component(value: String) -> Result<String, ContainerIdError> {
    if value.is_empty() {
        return Err(ContainerIdError::Empty);
    }

    if value == super::paths::LEAF_CGROUP {
        return Err(ContainerIdError::Reserved { component: value });
    }

    if !CONTAINER_ID_VALUE_REGEX.is_match(&value).unwrap_or(false) {
        return Err(ContainerIdError::InvalidComponent { component: value });
    }

    Ok(value)
}

impl Display for ContainerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(parent) = &self.parent {
            write!(f, "{parent}{SEPARATOR}")?;
        }
        write!(f, "{}", self.value)
    }
}
