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
use crate::resources::ContainerLimitation;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// What a controller watch produced: a limitation, or the failure that
/// ended the watch.
pub type LimitationOutcome = Result<ContainerLimitation, String>;

/// A single-resolution promise of a [ContainerLimitation]. The first
/// resolution wins; later ones are dropped. Every subscriber observes
/// the winning outcome.
#[derive(Debug)]
pub struct LimitationPromise {
    tx: watch::Sender<Option<LimitationOutcome>>,
}

impl LimitationPromise {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Resolves the promise. Returns false if it was already resolved
    /// and this outcome was dropped.
    pub fn resolve(&self, outcome: LimitationOutcome) -> bool {
        self.tx.send_if_modified(|slot| match slot {
            Some(_) => false,
            None => {
                *slot = Some(outcome);
                true
            }
        })
    }

    pub fn subscribe(&self) -> LimitationSubscription {
        LimitationSubscription { rx: self.tx.subscribe() }
    }
}

impl Default for LimitationPromise {
    fn default() -> Self {
        Self::new()
    }
}

/// A subscriber's handle on a [LimitationPromise].
#[derive(Debug)]
pub struct LimitationSubscription {
    rx: watch::Receiver<Option<LimitationOutcome>>,
}

impl LimitationSubscription {
    /// Waits for the promise to resolve. Returns `None` if the promise
    /// was discarded (its container cleaned up) before resolving.
    pub async fn wait(mut self) -> Option<LimitationOutcome> {
        match self.rx.wait_for(Option::is_some).await {
            Ok(resolved) => resolved.clone(),
            Err(_) => None,
        }
    }
}

/// Per-container state, created by prepare or recover and destroyed by
/// cleanup.
#[derive(Debug)]
pub struct Info {
    container_id: ContainerId,
    /// The non-leaf cgroup: controller anchor, holds no processes.
    cgroup: PathBuf,
    /// The leaf cgroup: holds the container's processes.
    cgroup_leaf: PathBuf,
    /// Names of the controllers attached to this container.
    controllers: HashSet<String>,
    /// False for nested containers sharing their parent's cgroups.
    isolate: bool,
    limitation: Arc<LimitationPromise>,
    watchers: Vec<JoinHandle<()>>,
}

impl Info {
    pub fn new(
        container_id: ContainerId,
        cgroup: PathBuf,
        cgroup_leaf: PathBuf,
        isolate: bool,
    ) -> Self {
        Self {
            container_id,
            cgroup,
            cgroup_leaf,
            controllers: HashSet::new(),
            isolate,
            limitation: Arc::new(LimitationPromise::new()),
            watchers: vec![],
        }
    }

    pub fn container_id(&self) -> &ContainerId {
        &self.container_id
    }

    pub fn cgroup(&self) -> &Path {
        &self.cgroup
    }

    pub fn cgroup_leaf(&self) -> &Path {
        &self.cgroup_leaf
    }

    pub fn isolate(&self) -> bool {
        self.isolate
    }

    pub fn controllers(&self) -> &HashSet<String> {
        &self.controllers
    }

    pub fn attach(&mut self, controller: &str) {
        let _ = self.controllers.insert(controller.to_string());
    }

    pub fn limitation(&self) -> Arc<LimitationPromise> {
        self.limitation.clone()
    }

    pub fn add_watcher(&mut self, watcher: JoinHandle<()>) {
        self.watchers.push(watcher);
    }
}

impl Drop for Info {
    /// Watches are long lived; dropping the info (cleanup, cache
    /// reconciliation) must also end them so they cannot outlive the
    /// container.
    fn drop(&mut self) {
        for watcher in &self.watchers {
            watcher.abort();
        }
    }
}

/// The registry of containers known to the isolator. Only the
/// orchestrator mutates it, serialized on its own execution context.
#[derive(Debug, Default)]
pub struct Infos {
    map: HashMap<ContainerId, Info>,
}

impl Infos {
    pub fn put(&mut self, container_id: ContainerId, info: Info) {
        let _ = self.map.insert(container_id, info);
    }

    pub fn get(&self, container_id: &ContainerId) -> Option<&Info> {
        self.map.get(container_id)
    }

    pub fn get_mut(&mut self, container_id: &ContainerId) -> Option<&mut Info> {
        self.map.get_mut(container_id)
    }

    pub fn contains(&self, container_id: &ContainerId) -> bool {
        self.map.contains_key(container_id)
    }

    /// Exact removal, no fall-through.
    pub fn erase(&mut self, container_id: &ContainerId) {
        let _ = self.map.remove(container_id);
    }

    /// Resolves a container id to the info owning its cgroups: the
    /// nearest id along the ancestor chain (starting at `container_id`
    /// itself) registered with `isolate=true`. Nested containers with
    /// shared cgroups resolve to the ancestor whose limits they live
    /// under.
    pub fn resolve(&self, container_id: &ContainerId) -> Option<&Info> {
        self.resolve_key(container_id).and_then(|key| self.map.get(&key))
    }

    pub fn resolve_key(
        &self,
        container_id: &ContainerId,
    ) -> Option<ContainerId> {
        let mut current = Some(container_id);
        while let Some(candidate) = current {
            if let Some(info) = self.map.get(candidate) {
                if info.isolate {
                    return Some(candidate.clone());
                }
            }
            current = candidate.parent();
        }

        None
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
