// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runner identity to coordinator mapping
//!
//! Every `RunnerId` maps to exactly one coordinator task and one storage
//! directory. Coordinators are spawned on first use, recovering whatever
//! state their directory holds, and respawned if their task has exited.

use crate::actor::CoordinatorHandle;
use crate::dispatcher::{self, RunSignal};
use crate::error::EngineError;
use crate::launcher::RunLauncher;
use crate::supervisor::{self, Spawned};
use rungate_core::{Clock, CoordinatorConfig, RunnerId};
use rungate_storage::RunnerStore;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Default wait for a follower runner to grant its lease
pub const DEFAULT_FOLLOWER_GRANT_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Root of all per-runner storage directories
    pub state_dir: PathBuf,
    /// Settings for runners without an explicit entry
    pub defaults: CoordinatorConfig,
    pub runners: HashMap<RunnerId, CoordinatorConfig>,
    pub follower_grant_timeout: Duration,
}

impl RegistryConfig {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            defaults: CoordinatorConfig::default(),
            runners: HashMap::new(),
            follower_grant_timeout: DEFAULT_FOLLOWER_GRANT_TIMEOUT,
        }
    }

    pub fn with_defaults(mut self, defaults: CoordinatorConfig) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_runner(mut self, runner_id: impl Into<RunnerId>, config: CoordinatorConfig) -> Self {
        self.runners.insert(runner_id.into(), config);
        self
    }

    pub fn with_follower_grant_timeout(mut self, timeout: Duration) -> Self {
        self.follower_grant_timeout = timeout;
        self
    }

    pub fn config_for(&self, runner_id: &RunnerId) -> CoordinatorConfig {
        self.runners
            .get(runner_id)
            .cloned()
            .unwrap_or_else(|| self.defaults.clone())
    }
}

pub struct Registry<C: Clock, L: RunLauncher> {
    config: RegistryConfig,
    clock: C,
    launcher: L,
    coordinators: tokio::sync::Mutex<HashMap<RunnerId, Spawned>>,
    signals: mpsc::UnboundedSender<RunSignal>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    shutting_down: AtomicBool,
}

impl<C: Clock, L: RunLauncher> Registry<C, L> {
    /// Create the registry and start its run dispatcher
    pub fn start(config: RegistryConfig, clock: C, launcher: L) -> Arc<Self> {
        let (signals, rx) = mpsc::unbounded_channel();
        let registry = Arc::new(Self {
            config,
            clock,
            launcher,
            coordinators: tokio::sync::Mutex::new(HashMap::new()),
            signals,
            dispatcher: Mutex::new(None),
            shutting_down: AtomicBool::new(false),
        });
        let task = tokio::spawn(dispatcher::run(Arc::downgrade(&registry), rx));
        *registry
            .dispatcher
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(task);
        registry
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Handle for `runner_id`, spawning (and recovering) its coordinator if needed
    pub async fn coordinator(&self, runner_id: &RunnerId) -> Result<CoordinatorHandle, EngineError> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(EngineError::ShuttingDown);
        }
        let mut coordinators = self.coordinators.lock().await;
        if let Some(spawned) = coordinators.get(runner_id) {
            if !spawned.handle.is_closed() {
                return Ok(spawned.handle.clone());
            }
            tracing::warn!(runner = %runner_id, "coordinator exited, respawning");
        }
        if runner_id.is_blank() {
            return Err(EngineError::Coordinator(
                rungate_core::CoordinatorError::invalid("runner_id is required"),
            ));
        }

        let (store, recovered) =
            RunnerStore::open(&self.config.state_dir, runner_id).map_err(|source| {
                EngineError::Storage {
                    runner_id: runner_id.clone(),
                    source,
                }
            })?;
        if recovered.corrupt_tail {
            tracing::warn!(runner = %runner_id, "recovered past a corrupt WAL tail");
        }
        let coordinator =
            supervisor::restore_coordinator(runner_id, self.config.config_for(runner_id), recovered);
        let spawned = supervisor::spawn(coordinator, store, self.clock.clone(), self.signals.clone());
        let handle = spawned.handle.clone();
        coordinators.insert(runner_id.clone(), spawned);
        Ok(handle)
    }

    /// Spawn a coordinator for every runner with stored state
    pub async fn recover_all(&self) -> Result<Vec<RunnerId>, EngineError> {
        let runner_ids =
            RunnerStore::list_runners(&self.config.state_dir).map_err(EngineError::Scan)?;
        for runner_id in &runner_ids {
            self.coordinator(runner_id).await?;
        }
        if !runner_ids.is_empty() {
            tracing::info!(count = runner_ids.len(), "recovered coordinators");
        }
        Ok(runner_ids)
    }

    /// Runners with a live coordinator, sorted
    pub async fn runners(&self) -> Vec<RunnerId> {
        let coordinators = self.coordinators.lock().await;
        let mut runner_ids: Vec<RunnerId> = coordinators
            .iter()
            .filter(|(_, spawned)| !spawned.handle.is_closed())
            .map(|(runner_id, _)| runner_id.clone())
            .collect();
        runner_ids.sort();
        runner_ids
    }

    /// Stop one coordinator. Pending callers get `Canceled`.
    pub async fn stop(&self, runner_id: &RunnerId) -> bool {
        let spawned = self.coordinators.lock().await.remove(runner_id);
        match spawned {
            Some(spawned) => {
                spawned.stop().await;
                true
            }
            None => false,
        }
    }

    /// Stop every coordinator and the dispatcher
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        let spawned: Vec<Spawned> = self
            .coordinators
            .lock()
            .await
            .drain()
            .map(|(_, spawned)| spawned)
            .collect();
        let count = spawned.len();
        for spawned in spawned {
            spawned.stop().await;
        }
        let dispatcher = self
            .dispatcher
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(task) = dispatcher {
            task.abort();
        }
        tracing::info!(count, "registry shut down");
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
