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

//! The isolator orchestrator.
//!
//! One instance serves every container on the host. All registry
//! mutation happens behind a single async mutex, so lifecycle steps
//! for a container never overlap; controller work is fanned out in
//! parallel within a step and joined before the registry advances.

use super::container_id::ContainerId;
use super::error::{IsolatorError, Result};
use super::fanout::{await_all, join_errors};
use super::info::{Info, Infos};
use super::paths;
use crate::cgroups2;
use crate::config::{ContainerClass, ContainerConfig, ContainerState, Flags};
use crate::controllers::{
    self, Controller, CoreController, CpuController, CpusetController,
    DeviceManager, DevicesController, HugetlbController, IoController,
    MemoryController, PerfEventController, PidsController,
};
use crate::launch::ContainerLaunchInfo;
use crate::resources::{
    ContainerLimitation, ContainerStatus, ResourceLimits, Resources,
    ResourceStatistics,
};
use iter_tools::{Either, Itertools};
use nix::unistd::Pid;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, trace, warn};

/// Isolation tokens this isolator understands, without the `cgroups/`
/// prefix. Note `mem` selects the controller whose kernel name is
/// `memory`.
const KNOWN_ISOLATORS: [&str; 9] = [
    "core",
    "cpu",
    "cpuset",
    "devices",
    "hugetlb",
    "io",
    "mem",
    "perf_event",
    "pids",
];

#[derive(Debug)]
pub struct Cgroups2Isolator {
    flags: Flags,
    /// Keyed by the controller's kernel name.
    controllers: HashMap<String, Arc<dyn Controller>>,
    device_manager: Arc<dyn DeviceManager>,
    infos: Mutex<Infos>,
}

impl Cgroups2Isolator {
    /// Builds the isolator from the agent flags. The `core` controller
    /// is always created; the rest come from the `cgroups/` isolation
    /// tokens, with `cgroups/all` selecting everything. An unknown
    /// `cgroups/` token is a configuration error.
    pub fn new(
        flags: Flags,
        device_manager: Arc<dyn DeviceManager>,
    ) -> Result<Self> {
        // The "core" controller is always enabled: the cgroup.* control
        // files it interfaces with exist in every cgroup.
        let mut selected = BTreeSet::from(["core"]);

        let tokens: Vec<&str> = flags
            .isolation
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .collect();

        if tokens.contains(&"cgroups/all") {
            selected.extend(KNOWN_ISOLATORS);
        } else {
            for token in tokens {
                let Some(name) = token.strip_prefix("cgroups/") else {
                    // some other isolator's token
                    continue;
                };

                if !KNOWN_ISOLATORS.contains(&name) {
                    return Err(IsolatorError::UnknownIsolator {
                        token: name.to_string(),
                    });
                }

                let _ = selected.insert(name);
            }
        }

        let mut controllers: HashMap<String, Arc<dyn Controller>> =
            HashMap::new();
        for token in selected {
            let controller: Arc<dyn Controller> = match token {
                "core" => Arc::new(CoreController),
                "cpu" => Arc::new(CpuController),
                "cpuset" => Arc::new(CpusetController),
                "devices" => {
                    Arc::new(DevicesController::new(device_manager.clone()))
                }
                "hugetlb" => Arc::new(HugetlbController),
                "io" => Arc::new(IoController),
                "mem" => Arc::new(MemoryController::new(flags.limit_swap)),
                "perf_event" => Arc::new(PerfEventController),
                "pids" => Arc::new(PidsController),
                _ => unreachable!("tokens are validated against the known set"),
            };

            let _ = controllers.insert(controller.name().to_string(), controller);
        }

        Ok(Self {
            flags,
            controllers,
            device_manager,
            infos: Mutex::new(Infos::default()),
        })
    }

    /// Creates the container's cgroups, enables its controllers along
    /// the ancestor chain, runs every controller's `prepare`, applies
    /// the initial resources, and returns launch directives for the
    /// launcher.
    #[tracing::instrument(skip(self, container_config))]
    pub async fn prepare(
        &self,
        container_id: &ContainerId,
        container_config: &ContainerConfig,
    ) -> Result<Option<ContainerLaunchInfo>> {
        let mut infos = self.infos.lock().await;

        if infos.contains(container_id) {
            return Err(IsolatorError::AlreadyPrepared {
                container_id: container_id.clone(),
            });
        }

        // The root carries the subtree control setup done at agent
        // startup; if it vanished we cannot repair it from here, and
        // an agent restart re-runs that setup from scratch.
        assert!(
            cgroups2::exists(&self.flags.cgroups_root),
            "root cgroup '{}' does not exist",
            self.flags.cgroups_root.display()
        );

        let root = &self.flags.cgroups_root;
        let cgroup = paths::container(root, container_id, false);
        let leaf = paths::container(root, container_id, true);

        if container_config.share_cgroups(container_id) {
            // Shared nested containers live in their ancestor's
            // cgroups: nothing is created on disk, no controllers
            // attach, and limits are the ancestor's.
            infos.put(
                container_id.clone(),
                Info::new(container_id.clone(), cgroup, leaf, false),
            );

            return self.launch_info(&infos, container_id, container_config);
        }

        if container_config.container_class == ContainerClass::Debug {
            return Err(IsolatorError::DebugContainerMustShareCgroups {
                container_id: container_id.clone(),
            });
        }

        if cgroups2::exists(&cgroup) {
            return Err(IsolatorError::CgroupExists { cgroup });
        }

        if cgroups2::exists(&leaf) {
            return Err(IsolatorError::CgroupExists { cgroup: leaf });
        }

        cgroups2::create(&cgroup, true)?;
        if let Err(e) = cgroups2::create(&leaf, true) {
            let _ = std::fs::remove_dir(&cgroup);
            return Err(e.into());
        }

        info!("Created cgroups '{}' and '{}'", cgroup.display(), leaf.display());

        infos.put(
            container_id.clone(),
            Info::new(container_id.clone(), cgroup.clone(), leaf.clone(), true),
        );

        let mut prepares = Vec::new();
        for controller in self.controllers.values() {
            // Implicit controllers cannot be written to subtree_control
            // but still attach to the container. The leaf never gets
            // controllers enabled: enabling them there would break the
            // no-internal-processes rule and writes to the leaf's
            // cgroup.procs would fail.
            if !controllers::is_implicit(controller.name()) {
                self.enable_along_path(container_id, controller.name())?;
            }

            if let Some(info) = infos.get_mut(container_id) {
                info.attach(controller.name());
            }

            let controller = Arc::clone(controller);
            let id = container_id.clone();
            let controller_cgroup = cgroup.clone();
            let config = container_config.clone();
            prepares.push(tokio::spawn(async move {
                controller.prepare(&id, &controller_cgroup, &config).await
            }));
        }

        // Delegate the leaf so the container can create sub-cgroups to
        // self-manage. Not recursive: the control files stay owned by
        // the agent.
        if let Some(user) = container_config.cgroup_user() {
            chown_leaf(&leaf, user, container_id)?;
        }

        let results = await_all(prepares).await;
        if let Some(errors) = join_errors(&results) {
            return Err(IsolatorError::ControllerFailure {
                operation: "prepare",
                errors,
            });
        }

        self.update_locked(
            &infos,
            container_id,
            &container_config.resources,
            &container_config.limits,
        )
        .await?;

        self.launch_info(&infos, container_id, container_config)
    }

    /// Rebuilds the registry after an agent restart: replays the
    /// checkpointed states, then classifies the cgroups found on disk
    /// into known orphans (left for the containerizer's cleanup) and
    /// unknown orphans (destroyed here).
    #[tracing::instrument(skip(self, states))]
    pub async fn recover(
        &self,
        states: &[ContainerState],
        orphans: &HashSet<ContainerId>,
    ) -> Result<()> {
        let mut infos = self.infos.lock().await;

        let mut errors = vec![];
        for state in states {
            let isolate = !state.share_cgroups();
            if let Err(e) = self
                .recover_container(&mut infos, &state.container_id, isolate)
                .await
            {
                errors.push(e.to_string());
            }
        }

        if !errors.is_empty() {
            return Err(IsolatorError::RecoveryFailed {
                context: "active containers",
                errors: errors.join(", "),
            });
        }

        let (known_orphans, unknown_orphans) =
            self.scan_orphans(&infos, orphans)?;

        let mut errors = vec![];
        for container_id in known_orphans.iter().chain(unknown_orphans.iter())
        {
            if let Err(e) =
                self.recover_container(&mut infos, container_id, true).await
            {
                errors.push(e.to_string());
            }
        }

        if !errors.is_empty() {
            return Err(IsolatorError::RecoveryFailed {
                context: "orphan containers",
                errors: errors.join(", "),
            });
        }

        self.device_manager.recover(states).await.map_err(|e| {
            IsolatorError::RecoveryFailed {
                context: "device manager state",
                errors: e.to_string(),
            }
        })?;

        // Known orphans are destroyed by the containerizer through the
        // normal cleanup path; unknown orphans are ours to reap.
        for container_id in &unknown_orphans {
            info!("Cleaning up unknown orphaned container '{container_id}'");
            if let Err(e) = self.cleanup_locked(&mut infos, container_id).await
            {
                warn!(
                    "Failed to clean up unknown orphaned container \
                     '{container_id}': {e}"
                );
            }
        }

        Ok(())
    }

    /// Runs after the launcher has written `pid` into the leaf's
    /// `cgroup.procs`. A no-op for containers sharing their ancestor's
    /// cgroups.
    #[tracing::instrument(skip(self))]
    pub async fn isolate(
        &self,
        container_id: &ContainerId,
        pid: Pid,
    ) -> Result<()> {
        let infos = self.infos.lock().await;

        let Some(info) = infos.get(container_id) else {
            return Err(IsolatorError::UnknownContainer {
                container_id: container_id.clone(),
            });
        };

        if !info.isolate() {
            return Ok(());
        }

        let mut isolates = Vec::new();
        for name in info.controllers() {
            let Some(controller) = self.controllers.get(name) else {
                continue;
            };

            let controller = Arc::clone(controller);
            let id = info.container_id().clone();
            let cgroup = info.cgroup().to_path_buf();
            isolates.push(tokio::spawn(async move {
                controller.isolate(&id, &cgroup, pid).await
            }));
        }

        let results = await_all(isolates).await;
        if let Some(errors) = join_errors(&results) {
            return Err(IsolatorError::ControllerFailure {
                operation: "isolate",
                errors,
            });
        }

        Ok(())
    }

    /// Resolves when the first attached controller reports a resource
    /// violation for this container. Resolves at most once per
    /// container; cleanup discards pending watches.
    #[tracing::instrument(skip(self))]
    pub async fn watch(
        &self,
        container_id: &ContainerId,
    ) -> Result<ContainerLimitation> {
        let subscription = {
            let mut infos = self.infos.lock().await;

            if !infos.contains(container_id) {
                return Err(IsolatorError::UnknownContainer {
                    container_id: container_id.clone(),
                });
            }

            let key = infos.resolve_key(container_id).ok_or_else(|| {
                IsolatorError::UnknownContainer {
                    container_id: container_id.clone(),
                }
            })?;

            let info = infos.get_mut(&key).expect("resolved key is registered");
            let promise = info.limitation();

            let names: Vec<String> =
                info.controllers().iter().cloned().collect();
            for name in names {
                let Some(controller) = self.controllers.get(&name) else {
                    continue;
                };

                let controller = Arc::clone(controller);
                let id = info.container_id().clone();
                let cgroup = info.cgroup().to_path_buf();
                let task_promise = Arc::clone(&promise);
                let watcher = tokio::spawn(async move {
                    let outcome = controller
                        .watch(&id, &cgroup)
                        .await
                        .map_err(|e| e.to_string());

                    // only the first outcome resolves the promise
                    let _ = task_promise.resolve(outcome);
                });

                info.add_watcher(watcher);
            }

            promise.subscribe()
        };

        match subscription.wait().await {
            Some(Ok(limitation)) => Ok(limitation),
            Some(Err(message)) => Err(IsolatorError::WatchFailed {
                container_id: container_id.clone(),
                message,
            }),
            None => Err(IsolatorError::WatchDiscarded {
                container_id: container_id.clone(),
            }),
        }
    }

    /// Applies new requests and limits across the attached
    /// controllers. Nested containers with shared cgroups inherit
    /// their ancestor's limits and cannot be updated.
    #[tracing::instrument(skip(self, resources, limits))]
    pub async fn update(
        &self,
        container_id: &ContainerId,
        resources: &Resources,
        limits: &ResourceLimits,
    ) -> Result<()> {
        let infos = self.infos.lock().await;
        self.update_locked(&infos, container_id, resources, limits).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn usage(
        &self,
        container_id: &ContainerId,
    ) -> Result<ResourceStatistics> {
        let usages = {
            let infos = self.infos.lock().await;
            let info = self.resolve(&infos, container_id)?;

            let mut usages = Vec::new();
            for name in info.controllers() {
                let Some(controller) = self.controllers.get(name) else {
                    continue;
                };

                let controller = Arc::clone(controller);
                let id = info.container_id().clone();
                let cgroup = info.cgroup().to_path_buf();
                usages.push(tokio::spawn(async move {
                    controller.usage(&id, &cgroup).await
                }));
            }
            usages
        };

        let (ready, skipped): (Vec<_>, Vec<_>) = await_all(usages)
            .await
            .into_iter()
            .partition_map(|result| match result {
                Ok(statistics) => Either::Left(statistics),
                Err(e) => Either::Right(e),
            });

        for reason in skipped {
            warn!(
                "Skipping resource statistics for container \
                 '{container_id}' because: {reason}"
            );
        }

        let mut statistics = ResourceStatistics::default();
        for usage in ready {
            statistics.merge(usage);
        }

        Ok(statistics)
    }

    #[tracing::instrument(skip(self))]
    pub async fn status(
        &self,
        container_id: &ContainerId,
    ) -> Result<ContainerStatus> {
        let statuses = {
            let infos = self.infos.lock().await;
            let info = self.resolve(&infos, container_id)?;

            let mut statuses = Vec::new();
            for name in info.controllers() {
                let Some(controller) = self.controllers.get(name) else {
                    continue;
                };

                let controller = Arc::clone(controller);
                let id = info.container_id().clone();
                let cgroup = info.cgroup().to_path_buf();
                statuses.push(tokio::spawn(async move {
                    controller.status(&id, &cgroup).await
                }));
            }
            statuses
        };

        let (ready, skipped): (Vec<_>, Vec<_>) = await_all(statuses)
            .await
            .into_iter()
            .partition_map(|result| match result {
                Ok(status) => Either::Left(status),
                Err(e) => Either::Right(e),
            });

        for reason in skipped {
            warn!(
                "Skipping status for container '{container_id}' \
                 because: {reason}"
            );
        }

        let mut status = ContainerStatus::default();
        for controller_status in ready {
            status.merge(controller_status);
        }

        Ok(status)
    }

    /// Releases controller state and destroys the container's cgroups.
    /// Unknown containers are ignored so recovery can hand every
    /// orphan through the same path.
    #[tracing::instrument(skip(self))]
    pub async fn cleanup(&self, container_id: &ContainerId) -> Result<()> {
        let mut infos = self.infos.lock().await;
        self.cleanup_locked(&mut infos, container_id).await
    }

    async fn cleanup_locked(
        &self,
        infos: &mut Infos,
        container_id: &ContainerId,
    ) -> Result<()> {
        let Some(info) = infos.get(container_id) else {
            trace!("Ignoring cleanup request for unknown container '{container_id}'");
            return Ok(());
        };

        let cgroup = info.cgroup().to_path_buf();

        let mut cleanups = Vec::new();
        for name in info.controllers() {
            let Some(controller) = self.controllers.get(name) else {
                continue;
            };

            let controller = Arc::clone(controller);
            let id = info.container_id().clone();
            let controller_cgroup = cgroup.clone();
            cleanups.push(tokio::spawn(async move {
                controller.cleanup(&id, &controller_cgroup).await
            }));
        }

        // Failures keep the info registered so the caller can retry.
        let results = await_all(cleanups).await;
        if let Some(errors) = join_errors(&results) {
            return Err(IsolatorError::ControllerFailure {
                operation: "cleanup",
                errors,
            });
        }

        if !cgroups2::exists(&cgroup) {
            infos.erase(container_id);
            return Ok(());
        }

        cgroups2::destroy(&cgroup).await?;
        infos.erase(container_id);

        Ok(())
    }

    async fn update_locked(
        &self,
        infos: &Infos,
        container_id: &ContainerId,
        resources: &Resources,
        limits: &ResourceLimits,
    ) -> Result<()> {
        let Some(info) = infos.get(container_id) else {
            return Err(IsolatorError::UnknownContainer {
                container_id: container_id.clone(),
            });
        };

        if !info.isolate() {
            return Err(IsolatorError::UpdateNotSupportedForNested);
        }

        info!("Updating controllers for cgroup '{}'", info.cgroup().display());

        let mut updates = Vec::new();
        for name in info.controllers() {
            let Some(controller) = self.controllers.get(name) else {
                continue;
            };

            let controller = Arc::clone(controller);
            let id = info.container_id().clone();
            let cgroup = info.cgroup().to_path_buf();
            let resources = resources.clone();
            let limits = limits.clone();
            updates.push(tokio::spawn(async move {
                controller.update(&id, &cgroup, &resources, &limits).await
            }));
        }

        let results = await_all(updates).await;
        if let Some(errors) = join_errors(&results) {
            return Err(IsolatorError::ControllerFailure {
                operation: "update",
                errors,
            });
        }

        Ok(())
    }

    /// Exact registration is required; the resolved info is the
    /// nearest self-isolated ancestor, which for shared nested
    /// containers carries the cgroups their processes actually live
    /// in.
    fn resolve<'a>(
        &self,
        infos: &'a Infos,
        container_id: &ContainerId,
    ) -> Result<&'a Info> {
        if !infos.contains(container_id) {
            return Err(IsolatorError::UnknownContainer {
                container_id: container_id.clone(),
            });
        }

        infos.resolve(container_id).ok_or_else(|| {
            IsolatorError::UnknownContainer {
                container_id: container_id.clone(),
            }
        })
    }

    /// Enables `controller` in `subtree_control` from the root down to
    /// the container's non-leaf cgroup, inclusive. Enabling is
    /// idempotent kernel-side, so no enablement is cached here.
    fn enable_along_path(
        &self,
        container_id: &ContainerId,
        controller: &str,
    ) -> Result<()> {
        let mut current = self.flags.cgroups_root.clone();
        cgroups2::controllers::enable(&current, &[controller])?;

        for component in container_id.components() {
            current.push(component);
            cgroups2::controllers::enable(&current, &[controller])?;
        }

        Ok(())
    }

    fn launch_info(
        &self,
        infos: &Infos,
        container_id: &ContainerId,
        container_config: &ContainerConfig,
    ) -> Result<Option<ContainerLaunchInfo>> {
        // Only containers with a rootfs get cgroup mounts.
        let Some(rootfs) = &container_config.rootfs else {
            return Ok(None);
        };

        let info = self.resolve(infos, container_id)?;
        let launch_info = ContainerLaunchInfo::cgroup_mount(
            info.cgroup_leaf().to_path_buf(),
            rootfs,
        );

        // Command tasks get the directives wrapped as an executor
        // argument so the mounts happen in the task's mount namespace
        // rather than the executor's.
        if container_config.task_info.is_some() {
            return Ok(Some(launch_info.into_task_launch_info()?));
        }

        Ok(Some(launch_info))
    }

    fn scan_orphans(
        &self,
        infos: &Infos,
        orphans: &HashSet<ContainerId>,
    ) -> Result<(Vec<ContainerId>, Vec<ContainerId>)> {
        let root = &self.flags.cgroups_root;
        let agent_cgroup = paths::agent(root);

        let mut known = vec![];
        let mut unknown = vec![];

        for child in cgroups2::children(root)? {
            let cgroup = root.join(&child);

            if cgroup == agent_cgroup {
                continue;
            }

            let Some(container_id) = paths::container_id(root, &cgroup) else {
                info!(
                    "Cgroup '{}' does not correspond to a container id and \
                     will not be recovered",
                    cgroup.display()
                );
                continue;
            };

            if infos.contains(&container_id) {
                // already recovered from checkpointed state
                continue;
            }

            if orphans.contains(&container_id) {
                known.push(container_id);
            } else {
                unknown.push(container_id);
            }
        }

        Ok((known, unknown))
    }

    /// Re-registers one container from its on-disk cgroups. Missing
    /// cgroups are re-created (with a warning) so that the ordinary
    /// cleanup path can destroy every recovered container uniformly.
    /// Controllers not enabled on disk are treated as never enabled
    /// for this container.
    async fn recover_container(
        &self,
        infos: &mut Infos,
        container_id: &ContainerId,
        isolate: bool,
    ) -> Result<()> {
        if infos.contains(container_id) {
            return Err(IsolatorError::AlreadyRecovered {
                container_id: container_id.clone(),
            });
        }

        let root = &self.flags.cgroups_root;
        let cgroup = paths::container(root, container_id, false);
        let leaf = paths::container(root, container_id, true);

        if !cgroups2::exists(&cgroup) {
            warn!(
                "Container '{container_id}' is missing the cgroup '{}'; \
                 creating missing cgroup",
                cgroup.display()
            );
            cgroups2::create(&cgroup, true)?;
        }

        if !cgroups2::exists(&leaf) {
            warn!(
                "Container '{container_id}' is missing the cgroup '{}'; \
                 creating missing cgroup",
                leaf.display()
            );
            cgroups2::create(&leaf, true)?;
        }

        let enabled = cgroups2::controllers::enabled(&cgroup)?;

        let mut recovered = vec![];
        let mut recovers = Vec::new();
        for controller in self.controllers.values() {
            if !enabled.contains(controller.name()) {
                warn!(
                    "Controller '{}' is not enabled for container \
                     '{container_id}'",
                    controller.name()
                );
                continue;
            }

            recovered.push(controller.name());

            let controller = Arc::clone(controller);
            let id = container_id.clone();
            let controller_cgroup = cgroup.clone();
            recovers.push(tokio::spawn(async move {
                controller.recover(&id, &controller_cgroup).await
            }));
        }

        let results = await_all(recovers).await;
        if let Some(errors) = join_errors(&results) {
            return Err(IsolatorError::ControllerFailure {
                operation: "recover",
                errors,
            });
        }

        let mut info =
            Info::new(container_id.clone(), cgroup, leaf, isolate);
        for name in recovered {
            info.attach(name);
        }
        infos.put(container_id.clone(), info);

        Ok(())
    }
}

fn chown_leaf(
    leaf: &Path,
    user: &str,
    container_id: &ContainerId,
) -> Result<()> {
    let entry = nix::unistd::User::from_name(user)
        .map_err(|source| IsolatorError::ChownCgroup {
            cgroup: leaf.to_path_buf(),
            user: user.to_string(),
            source,
        })?
        .ok_or_else(|| IsolatorError::UnknownUser { user: user.to_string() })?;

    trace!(
        "Chown the cgroup at '{}' to user '{user}' for container \
         '{container_id}'",
        leaf.display()
    );

    nix::unistd::chown(leaf, Some(entry.uid), Some(entry.gid)).map_err(
        |source| IsolatorError::ChownCgroup {
            cgroup: leaf.to_path_buf(),
            user: user.to_string(),
            source,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::{ControllerError, NullDeviceManager};
    use crate::resources::ContainerLimitation;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::oneshot;

    macro_rules! skip_if_not_root {
        ($name:literal) => {
            if !nix::unistd::Uid::effective().is_root() {
                eprintln!("Skipping {} - requires root", $name);
                return;
            }
        };
    }

    #[derive(Debug, Default)]
    struct Calls {
        prepares: AtomicUsize,
        isolates: AtomicUsize,
        updates: AtomicUsize,
        usages: AtomicUsize,
        recovers: AtomicUsize,
        cleanups: AtomicUsize,
    }

    #[derive(Debug)]
    struct MockController {
        name: &'static str,
        calls: Calls,
        fail_prepare: bool,
        fail_usage: bool,
        limitation: std::sync::Mutex<Option<oneshot::Receiver<ContainerLimitation>>>,
    }

    impl MockController {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                calls: Calls::default(),
                fail_prepare: false,
                fail_usage: false,
                limitation: std::sync::Mutex::new(None),
            })
        }

        fn failing_prepare(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                calls: Calls::default(),
                fail_prepare: true,
                fail_usage: false,
                limitation: std::sync::Mutex::new(None),
            })
        }

        fn failing_usage(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                calls: Calls::default(),
                fail_prepare: false,
                fail_usage: true,
                limitation: std::sync::Mutex::new(None),
            })
        }

        fn with_limitation(
            name: &'static str,
        ) -> (Arc<Self>, oneshot::Sender<ContainerLimitation>) {
            let (tx, rx) = oneshot::channel();
            let controller = Arc::new(Self {
                name,
                calls: Calls::default(),
                fail_prepare: false,
                fail_usage: false,
                limitation: std::sync::Mutex::new(Some(rx)),
            });
            (controller, tx)
        }

        fn fail(&self, operation: &str) -> ControllerError {
            ControllerError::Cgroups(
                crate::cgroups2::CgroupsError::WriteControl {
                    path: format!("/mock/{}/{operation}", self.name).into(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::Other,
                        format!("mock {} {operation} failure", self.name),
                    ),
                },
            )
        }
    }

    #[async_trait]
    impl Controller for MockController {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn prepare(
            &self,
            _container_id: &ContainerId,
            _cgroup: &Path,
            _container_config: &ContainerConfig,
        ) -> crate::controllers::Result<()> {
            let _ = self.calls.prepares.fetch_add(1, Ordering::SeqCst);
            if self.fail_prepare {
                return Err(self.fail("prepare"));
            }
            Ok(())
        }

        async fn isolate(
            &self,
            _container_id: &ContainerId,
            _cgroup: &Path,
            _pid: Pid,
        ) -> crate::controllers::Result<()> {
            let _ = self.calls.isolates.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn watch(
            &self,
            _container_id: &ContainerId,
            _cgroup: &Path,
        ) -> crate::controllers::Result<ContainerLimitation> {
            let rx = self.limitation.lock().expect("mock lock").take();
            match rx {
                Some(rx) => Ok(rx.await.expect("limitation channel")),
                None => std::future::pending().await,
            }
        }

        async fn update(
            &self,
            _container_id: &ContainerId,
            _cgroup: &Path,
            _requests: &Resources,
            _limits: &ResourceLimits,
        ) -> crate::controllers::Result<()> {
            let _ = self.calls.updates.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn usage(
            &self,
            _container_id: &ContainerId,
            _cgroup: &Path,
        ) -> crate::controllers::Result<ResourceStatistics> {
            let _ = self.calls.usages.fetch_add(1, Ordering::SeqCst);
            if self.fail_usage {
                return Err(self.fail("usage"));
            }
            Ok(ResourceStatistics {
                mem_current_bytes: Some(42),
                ..ResourceStatistics::default()
            })
        }

        async fn recover(
            &self,
            _container_id: &ContainerId,
            _cgroup: &Path,
        ) -> crate::controllers::Result<()> {
            let _ = self.calls.recovers.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn cleanup(
            &self,
            _container_id: &ContainerId,
            _cgroup: &Path,
        ) -> crate::controllers::Result<()> {
            let _ = self.calls.cleanups.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn test_flags(root: &Path) -> Flags {
        Flags {
            cgroups_root: root.to_path_buf(),
            isolation: String::new(),
            limit_swap: false,
        }
    }

    /// An isolator over a fake root with the given controllers. Mocks
    /// named after the implicit controllers skip the subtree_control
    /// writes a plain tmpfs cannot satisfy.
    fn test_isolator(
        root: &Path,
        controllers: Vec<Arc<MockController>>,
    ) -> Cgroups2Isolator {
        let mut map: HashMap<String, Arc<dyn Controller>> = HashMap::new();
        for controller in controllers {
            let _ = map.insert(
                controller.name().to_string(),
                controller as Arc<dyn Controller>,
            );
        }

        Cgroups2Isolator {
            flags: test_flags(root),
            controllers: map,
            device_manager: Arc::new(NullDeviceManager),
            infos: Mutex::new(Infos::default()),
        }
    }

    fn container_id(id: &str) -> ContainerId {
        ContainerId::parse(id).expect("valid container id")
    }

    #[test]
    fn test_unknown_isolation_token_fails_construction() {
        let flags = Flags {
            cgroups_root: "/sys/fs/cgroup/test".into(),
            isolation: "cgroups/cpu,cgroups/does-not-exist".into(),
            limit_swap: false,
        };

        assert!(matches!(
            Cgroups2Isolator::new(flags, Arc::new(NullDeviceManager)),
            Err(IsolatorError::UnknownIsolator { token }) if token == "does-not-exist"
        ));
    }

    #[test]
    fn test_non_cgroups_tokens_are_ignored() {
        let flags = Flags {
            cgroups_root: "/sys/fs/cgroup/test".into(),
            isolation: "filesystem/linux,docker/runtime,cgroups/cpu".into(),
            limit_swap: false,
        };

        let isolator = Cgroups2Isolator::new(flags, Arc::new(NullDeviceManager))
            .expect("construction");

        // core is always on; cpu came from the flags
        assert_eq!(isolator.controllers.len(), 2);
        assert!(isolator.controllers.contains_key("core"));
        assert!(isolator.controllers.contains_key("cpu"));
    }

    #[test]
    fn test_cgroups_all_selects_every_controller() {
        let flags = Flags {
            cgroups_root: "/sys/fs/cgroup/test".into(),
            isolation: "cgroups/all".into(),
            limit_swap: false,
        };

        let isolator = Cgroups2Isolator::new(flags, Arc::new(NullDeviceManager))
            .expect("construction");

        assert_eq!(isolator.controllers.len(), KNOWN_ISOLATORS.len());
        // the "mem" token selects the controller named "memory"
        assert!(isolator.controllers.contains_key("memory"));
        assert!(!isolator.controllers.contains_key("mem"));
    }

    #[tokio::test]
    async fn test_prepare_creates_cgroups_and_runs_controllers() {
        let tmp = TempDir::new().expect("tempdir");
        let mock = MockController::new("core");
        let isolator = test_isolator(tmp.path(), vec![mock.clone()]);
        let c1 = container_id("c1");

        let launch_info = isolator
            .prepare(&c1, &ContainerConfig::default())
            .await
            .expect("prepare");

        assert!(tmp.path().join("c1").is_dir());
        assert!(tmp.path().join("c1/leaf").is_dir());
        assert_eq!(mock.calls.prepares.load(Ordering::SeqCst), 1);
        // prepare applies the initial resources
        assert_eq!(mock.calls.updates.load(Ordering::SeqCst), 1);
        // no rootfs, no cgroup mounts
        assert!(launch_info.is_none());
    }

    #[tokio::test]
    async fn test_prepare_twice_fails() {
        let tmp = TempDir::new().expect("tempdir");
        let isolator =
            test_isolator(tmp.path(), vec![MockController::new("core")]);
        let c1 = container_id("c1");

        let _ = isolator
            .prepare(&c1, &ContainerConfig::default())
            .await
            .expect("prepare");

        assert!(matches!(
            isolator.prepare(&c1, &ContainerConfig::default()).await,
            Err(IsolatorError::AlreadyPrepared { .. })
        ));
    }

    #[tokio::test]
    async fn test_prepare_collision_leaves_no_state() {
        let tmp = TempDir::new().expect("tempdir");
        let mock = MockController::new("core");
        let isolator = test_isolator(tmp.path(), vec![mock.clone()]);
        let c1 = container_id("c1");

        fs::create_dir(tmp.path().join("c1")).expect("mkdir");

        assert!(matches!(
            isolator.prepare(&c1, &ContainerConfig::default()).await,
            Err(IsolatorError::CgroupExists { .. })
        ));

        // registry untouched, filesystem untouched, controllers never ran
        assert!(isolator.infos.lock().await.is_empty());
        assert!(!tmp.path().join("c1/leaf").exists());
        assert_eq!(mock.calls.prepares.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_prepare_joins_controller_failures() {
        let tmp = TempDir::new().expect("tempdir");
        let good = MockController::new("core");
        let bad_a = MockController::failing_prepare("perf_event");
        let bad_b = MockController::failing_prepare("devices");
        let isolator = test_isolator(
            tmp.path(),
            vec![good.clone(), bad_a.clone(), bad_b.clone()],
        );
        let c1 = container_id("c1");

        let error = isolator
            .prepare(&c1, &ContainerConfig::default())
            .await
            .expect_err("prepare should fail");

        let IsolatorError::ControllerFailure { operation, errors } = error
        else {
            panic!("expected joined controller failure, got {error}");
        };
        assert_eq!(operation, "prepare");
        assert!(errors.contains("perf_event"));
        assert!(errors.contains("devices"));

        // every controller was awaited before failing
        assert_eq!(good.calls.prepares.load(Ordering::SeqCst), 1);

        // the info stays registered so cleanup can destroy the cgroups
        isolator.cleanup(&c1).await.expect("cleanup");
        assert!(!tmp.path().join("c1").exists());
    }

    #[tokio::test]
    async fn test_prepare_cleanup_round_trip() {
        let tmp = TempDir::new().expect("tempdir");
        let isolator =
            test_isolator(tmp.path(), vec![MockController::new("core")]);

        let before = cgroups2::children(tmp.path()).expect("children");

        for id in ["c1", "c2"] {
            let _ = isolator
                .prepare(&container_id(id), &ContainerConfig::default())
                .await
                .expect("prepare");
        }

        for id in ["c1", "c2"] {
            isolator.cleanup(&container_id(id)).await.expect("cleanup");
        }

        let after = cgroups2::children(tmp.path()).expect("children");
        assert_eq!(before, after);
        assert!(isolator.infos.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_shared_nested_container() {
        let tmp = TempDir::new().expect("tempdir");
        let mock = MockController::new("core");
        let isolator = test_isolator(tmp.path(), vec![mock.clone()]);
        let parent = container_id("c1");
        let child = container_id("c1/c2");

        let _ = isolator
            .prepare(&parent, &ContainerConfig::default())
            .await
            .expect("prepare parent");

        // nested containers share by default
        let _ = isolator
            .prepare(&child, &ContainerConfig::default())
            .await
            .expect("prepare child");

        // the child got no cgroups of its own
        assert!(!tmp.path().join("c1/c2").exists());

        // usage resolves to the parent's controllers
        let parent_usage = isolator.usage(&parent).await.expect("usage");
        let child_usage = isolator.usage(&child).await.expect("usage");
        assert_eq!(parent_usage, child_usage);
        assert_eq!(child_usage.mem_current_bytes, Some(42));

        // updates are forbidden for shared nested containers
        assert!(matches!(
            isolator
                .update(&child, &Resources::default(), &ResourceLimits::new())
                .await,
            Err(IsolatorError::UpdateNotSupportedForNested)
        ));

        // isolate is a no-op: the launcher placed the process in the
        // ancestor's leaf
        isolator.isolate(&child, Pid::from_raw(42)).await.expect("isolate");
        assert_eq!(mock.calls.isolates.load(Ordering::SeqCst), 0);

        // cleaning up the child erases only its registration
        isolator.cleanup(&child).await.expect("cleanup");
        assert!(matches!(
            isolator.usage(&child).await,
            Err(IsolatorError::UnknownContainer { .. })
        ));
        assert!(tmp.path().join("c1").is_dir());
    }

    #[tokio::test]
    async fn test_debug_container_must_share() {
        let tmp = TempDir::new().expect("tempdir");
        let isolator =
            test_isolator(tmp.path(), vec![MockController::new("core")]);

        let config = ContainerConfig {
            container_class: ContainerClass::Debug,
            container_info: Some(crate::config::ContainerInfo {
                linux_info: Some(crate::config::LinuxInfo {
                    share_cgroups: Some(false),
                }),
            }),
            ..ContainerConfig::default()
        };

        assert!(matches!(
            isolator.prepare(&container_id("c1/debug"), &config).await,
            Err(IsolatorError::DebugContainerMustShareCgroups { .. })
        ));
    }

    #[tokio::test]
    async fn test_watch_resolves_at_most_once() {
        let tmp = TempDir::new().expect("tempdir");
        let (mem_like, mem_tx) = MockController::with_limitation("perf_event");
        let (cpu_like, cpu_tx) = MockController::with_limitation("devices");
        let isolator =
            test_isolator(tmp.path(), vec![mem_like, cpu_like]);
        let c1 = container_id("c1");

        let _ = isolator
            .prepare(&c1, &ContainerConfig::default())
            .await
            .expect("prepare");

        let oom = ContainerLimitation {
            resource: "mem".into(),
            message: "oom".into(),
        };
        mem_tx.send(oom.clone()).expect("send limitation");

        let limitation = isolator.watch(&c1).await.expect("watch");
        assert_eq!(limitation, oom);

        // a second controller reporting later is dropped; watchers keep
        // observing the first resolution
        cpu_tx
            .send(ContainerLimitation {
                resource: "cpus".into(),
                message: "throttled".into(),
            })
            .expect("send limitation");

        let limitation = isolator.watch(&c1).await.expect("watch");
        assert_eq!(limitation, oom);
    }

    #[tokio::test]
    async fn test_watch_unknown_container() {
        let tmp = TempDir::new().expect("tempdir");
        let isolator =
            test_isolator(tmp.path(), vec![MockController::new("core")]);

        assert!(matches!(
            isolator.watch(&container_id("ghost")).await,
            Err(IsolatorError::UnknownContainer { .. })
        ));
    }

    #[tokio::test]
    async fn test_cleanup_discards_pending_watch() {
        let tmp = TempDir::new().expect("tempdir");
        let isolator = Arc::new(test_isolator(
            tmp.path(),
            vec![MockController::new("core")],
        ));
        let c1 = container_id("c1");

        let _ = isolator
            .prepare(&c1, &ContainerConfig::default())
            .await
            .expect("prepare");

        let watcher = {
            let isolator = isolator.clone();
            let c1 = c1.clone();
            tokio::spawn(async move { isolator.watch(&c1).await })
        };

        // give the watch a chance to subscribe before tearing down
        tokio::time::sleep(Duration::from_millis(50)).await;
        isolator.cleanup(&c1).await.expect("cleanup");

        let outcome = tokio::time::timeout(Duration::from_secs(5), watcher)
            .await
            .expect("watch should settle after cleanup")
            .expect("watch task");
        assert!(matches!(outcome, Err(IsolatorError::WatchDiscarded { .. })));
    }

    #[tokio::test]
    async fn test_cleanup_unknown_container_is_ignored() {
        let tmp = TempDir::new().expect("tempdir");
        let isolator =
            test_isolator(tmp.path(), vec![MockController::new("core")]);

        isolator.cleanup(&container_id("ghost")).await.expect("cleanup");
    }

    #[tokio::test]
    async fn test_update_dispatches_to_every_attached_controller() {
        let tmp = TempDir::new().expect("tempdir");
        let a = MockController::new("core");
        let b = MockController::new("perf_event");
        let isolator = test_isolator(tmp.path(), vec![a.clone(), b.clone()]);
        let c1 = container_id("c1");

        let _ = isolator
            .prepare(&c1, &ContainerConfig::default())
            .await
            .expect("prepare");

        isolator
            .update(&c1, &Resources::default(), &ResourceLimits::new())
            .await
            .expect("update");

        // once from prepare, once from the explicit update
        assert_eq!(a.calls.updates.load(Ordering::SeqCst), 2);
        assert_eq!(b.calls.updates.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_usage_skips_failed_controllers() {
        let tmp = TempDir::new().expect("tempdir");
        let good = MockController::new("core");
        let bad = MockController::failing_usage("perf_event");
        let isolator =
            test_isolator(tmp.path(), vec![good.clone(), bad.clone()]);
        let c1 = container_id("c1");

        let _ = isolator
            .prepare(&c1, &ContainerConfig::default())
            .await
            .expect("prepare");

        let statistics = isolator.usage(&c1).await.expect("usage");
        assert_eq!(statistics.mem_current_bytes, Some(42));
    }

    #[tokio::test]
    async fn test_isolate_fans_out_for_isolated_containers() {
        let tmp = TempDir::new().expect("tempdir");
        let mock = MockController::new("core");
        let isolator = test_isolator(tmp.path(), vec![mock.clone()]);
        let c1 = container_id("c1");

        let _ = isolator
            .prepare(&c1, &ContainerConfig::default())
            .await
            .expect("prepare");

        isolator.isolate(&c1, Pid::from_raw(42)).await.expect("isolate");
        assert_eq!(mock.calls.isolates.load(Ordering::SeqCst), 1);

        assert!(matches!(
            isolator.isolate(&container_id("ghost"), Pid::from_raw(1)).await,
            Err(IsolatorError::UnknownContainer { .. })
        ));
    }

    #[tokio::test]
    async fn test_prepare_with_rootfs_returns_cgroup_mount() {
        let tmp = TempDir::new().expect("tempdir");
        let isolator =
            test_isolator(tmp.path(), vec![MockController::new("core")]);
        let c1 = container_id("c1");

        let config = ContainerConfig {
            rootfs: Some("/var/lib/rootfs".into()),
            ..ContainerConfig::default()
        };

        let launch_info = isolator
            .prepare(&c1, &config)
            .await
            .expect("prepare")
            .expect("launch info for rootfs container");

        assert_eq!(launch_info.clone_namespaces.len(), 2);
        assert_eq!(
            launch_info.mounts[0].source,
            tmp.path().join("c1/leaf")
        );
        assert!(launch_info.command.is_none());

        // command tasks get the directives as an executor argument
        let config = ContainerConfig {
            rootfs: Some("/var/lib/rootfs".into()),
            task_info: Some(crate::config::TaskInfo::default()),
            ..ContainerConfig::default()
        };
        let launch_info = isolator
            .prepare(&container_id("c2"), &config)
            .await
            .expect("prepare")
            .expect("launch info");
        let command = launch_info.command.expect("wrapped command");
        assert!(command.arguments[0].starts_with("--task_launch_info="));
    }

    fn seed_subtree_control(cgroup: &Path, enabled: &str) {
        fs::create_dir_all(cgroup).expect("mkdir");
        fs::write(cgroup.join("cgroup.subtree_control"), enabled)
            .expect("seed subtree_control");
    }

    #[tokio::test]
    async fn test_recover_classifies_orphans() {
        let tmp = TempDir::new().expect("tempdir");

        // on disk: a checkpointed container, a known orphan, an
        // unknown orphan, and the agent's own cgroup
        for name in ["c0", "c1", "c2"] {
            let cgroup = tmp.path().join(name);
            seed_subtree_control(&cgroup, "cpu\n");
            fs::create_dir_all(cgroup.join("leaf")).expect("mkdir");
        }
        fs::create_dir_all(tmp.path().join("agent")).expect("mkdir");

        let mock = MockController::new("cpu");
        let isolator = test_isolator(tmp.path(), vec![mock.clone()]);

        let states = vec![ContainerState {
            container_id: container_id("c0"),
            container_info: None,
        }];
        let orphans = HashSet::from([container_id("c1")]);

        isolator.recover(&states, &orphans).await.expect("recover");

        // all three containers went through controller recovery
        assert_eq!(mock.calls.recovers.load(Ordering::SeqCst), 3);

        {
            let infos = isolator.infos.lock().await;
            assert!(infos.contains(&container_id("c0")));
            assert!(infos.contains(&container_id("c1")));
            // the unknown orphan was registered, then cleaned up inline
            assert!(!infos.contains(&container_id("c2")));
        }

        assert!(tmp.path().join("c0").is_dir());
        assert!(tmp.path().join("c1").is_dir());
        assert!(!tmp.path().join("c2").exists());
        assert_eq!(mock.calls.cleanups.load(Ordering::SeqCst), 1);

        // the agent's reserved cgroup was skipped
        assert!(tmp.path().join("agent").is_dir());

        // known orphans go through the containerizer's ordinary cleanup
        isolator.cleanup(&container_id("c1")).await.expect("cleanup");
        assert!(!tmp.path().join("c1").exists());
    }

    #[tokio::test]
    async fn test_recover_recreates_missing_leaf() {
        let tmp = TempDir::new().expect("tempdir");
        let isolator =
            test_isolator(tmp.path(), vec![MockController::new("core")]);
        let c1 = container_id("c1");

        let _ = isolator
            .prepare(&c1, &ContainerConfig::default())
            .await
            .expect("prepare");

        // the kernel would have materialized this on mkdir
        fs::write(tmp.path().join("c1/cgroup.subtree_control"), "")
            .expect("seed subtree_control");

        // out-of-band removal of the leaf, then an agent restart
        fs::remove_dir(tmp.path().join("c1/leaf")).expect("rmdir");
        let restarted =
            test_isolator(tmp.path(), vec![MockController::new("core")]);

        let states = vec![ContainerState {
            container_id: c1.clone(),
            container_info: None,
        }];
        restarted.recover(&states, &HashSet::new()).await.expect("recover");

        assert!(tmp.path().join("c1/leaf").is_dir());

        restarted.cleanup(&c1).await.expect("cleanup");
        assert!(!tmp.path().join("c1").exists());
    }

    #[tokio::test]
    async fn test_recover_excludes_controllers_disabled_on_disk() {
        let tmp = TempDir::new().expect("tempdir");

        let cgroup = tmp.path().join("c1");
        seed_subtree_control(&cgroup, "cpu\n");
        fs::create_dir_all(cgroup.join("leaf")).expect("mkdir");

        let cpu = MockController::new("cpu");
        let memory = MockController::new("memory");
        let isolator =
            test_isolator(tmp.path(), vec![cpu.clone(), memory.clone()]);

        let states = vec![ContainerState {
            container_id: container_id("c1"),
            container_info: None,
        }];
        isolator.recover(&states, &HashSet::new()).await.expect("recover");

        assert_eq!(cpu.calls.recovers.load(Ordering::SeqCst), 1);
        // memory was not enabled on disk, so it is treated as never
        // enabled for this container
        assert_eq!(memory.calls.recovers.load(Ordering::SeqCst), 0);

        isolator
            .update(
                &container_id("c1"),
                &Resources::default(),
                &ResourceLimits::new(),
            )
            .await
            .expect("update");
        assert_eq!(cpu.calls.updates.load(Ordering::SeqCst), 1);
        assert_eq!(memory.calls.updates.load(Ordering::SeqCst), 0);
    }

    // End-to-end against a real cgroup2 hierarchy. Requires root and a
    // host with the cpu and memory controllers available, so it is
    // ignored in ordinary test runs.
    #[ignore]
    #[tokio::test]
    async fn test_e2e_prepare_enables_controllers_on_real_cgroupfs() {
        skip_if_not_root!("test_e2e_prepare_enables_controllers_on_real_cgroupfs");

        let root = Path::new("/sys/fs/cgroup")
            .join(format!("cgroups2-isolator-test-{}", uuid::Uuid::new_v4()));
        cgroups2::create(&root, true).expect("create test root");

        let flags = Flags {
            cgroups_root: root.clone(),
            isolation: "cgroups/cpu,cgroups/mem".into(),
            limit_swap: false,
        };
        let isolator =
            Cgroups2Isolator::new(flags, Arc::new(NullDeviceManager))
                .expect("construction");

        let c1 = container_id("c1");
        let config = ContainerConfig {
            resources: Resources {
                cpus: Some(1.0),
                mem: Some(64 * 1024 * 1024),
                ..Resources::default()
            },
            ..ContainerConfig::default()
        };

        let _ = isolator.prepare(&c1, &config).await.expect("prepare");

        assert!(root.join("c1").is_dir());
        assert!(root.join("c1/leaf").is_dir());

        let enabled_at_root =
            cgroups2::controllers::enabled(&root).expect("enabled");
        assert!(enabled_at_root.contains("cpu"));
        assert!(enabled_at_root.contains("memory"));

        let enabled_at_container =
            cgroups2::controllers::enabled(&root.join("c1")).expect("enabled");
        assert!(enabled_at_container.contains("cpu"));
        assert!(enabled_at_container.contains("memory"));

        // the leaf never enables controllers
        let enabled_at_leaf =
            cgroups2::controllers::enabled(&root.join("c1/leaf"))
                .expect("enabled");
        assert!(enabled_at_leaf.is_empty());

        isolator.cleanup(&c1).await.expect("cleanup");
        cgroups2::destroy(&root).await.expect("destroy test root");
    }
}
