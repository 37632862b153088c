// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coordinator supervision: recovery, checkpoint handoff and shutdown

use crate::actor::{ActorExit, CoordinatorActor, CoordinatorHandle, INBOX_CAPACITY};
use crate::dispatcher::RunSignal;
use rungate_core::{Clock, Coordinator, CoordinatorConfig, CoordinatorError, RunnerId};
use rungate_storage::{Recovered, RunnerStore};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// A running coordinator task
pub(crate) struct Spawned {
    pub(crate) handle: CoordinatorHandle,
    pub(crate) stop: watch::Sender<bool>,
    pub(crate) task: JoinHandle<()>,
}

impl Spawned {
    /// Signal stop and wait for the task to finish draining
    pub(crate) async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(runner = %self.handle.runner_id(), error = %e, "coordinator task panicked");
        }
    }
}

/// Rebuild a coordinator from its newest checkpoint plus the WAL tail
pub fn restore_coordinator(
    runner_id: &RunnerId,
    config: CoordinatorConfig,
    recovered: Recovered,
) -> Coordinator {
    let mut coordinator = match recovered.checkpoint {
        Some(checkpoint) => Coordinator::from_checkpoint(checkpoint, config),
        None => Coordinator::new(runner_id.clone(), config),
    };
    for op in &recovered.operations {
        coordinator.apply(op);
    }
    // Replayed events have no waiters; in-flight runs are re-announced on resume
    let _ = coordinator.take_effects();
    coordinator
}

pub(crate) fn spawn<C: Clock>(
    coordinator: Coordinator,
    store: RunnerStore,
    clock: C,
    signals: mpsc::UnboundedSender<RunSignal>,
) -> Spawned {
    let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
    let (stop_tx, stop_rx) = watch::channel(false);
    let handle = CoordinatorHandle::new(coordinator.runner_id().clone(), tx);
    let actor = CoordinatorActor::new(coordinator, store, clock, rx, stop_rx, signals);
    let task = tokio::spawn(supervise(actor));
    Spawned {
        handle,
        stop: stop_tx,
        task,
    }
}

async fn supervise<C: Clock>(mut actor: CoordinatorActor<C>) {
    let runner_id = actor.runner_id().clone();
    tracing::info!(runner = %runner_id, "coordinator started");

    let mut pending = actor.resume();
    loop {
        let exit = match pending.take() {
            Some(exit) => exit,
            None => actor.run().await,
        };
        match exit {
            ActorExit::Handoff(checkpoint) => {
                let config = actor.coordinator.config().clone();
                actor.coordinator = Coordinator::from_checkpoint(checkpoint, config);
                tracing::info!(runner = %runner_id, "checkpoint handoff");
            }
            ActorExit::Stopped => {
                actor.drain(CoordinatorError::Canceled {
                    runner_id: runner_id.clone(),
                });
                tracing::info!(runner = %runner_id, "coordinator stopped");
                return;
            }
            ActorExit::Failed(e) => {
                actor.drain(CoordinatorError::Durability {
                    message: e.to_string(),
                });
                tracing::error!(runner = %runner_id, error = %e, "coordinator failed");
                return;
            }
        }
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
