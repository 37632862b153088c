// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use rungate_core::{AcquireRequest, Coordinator, CoordinatorConfig, Effect, LeaseId};
use std::io::Write;

fn at() -> DateTime<Utc> {
    DateTime::from_timestamp(1_767_225_600, 0).unwrap()
}

fn runner() -> RunnerId {
    RunnerId::new("emulator-a")
}

fn persisted(coordinator: &mut Coordinator) -> Vec<Operation> {
    coordinator
        .take_effects()
        .into_iter()
        .filter_map(|effect| match effect {
            Effect::Persist(op) => Some(op),
            _ => None,
        })
        .collect()
}

fn rebuild(recovered: Recovered) -> Coordinator {
    let config = CoordinatorConfig::default();
    let mut coordinator = match recovered.checkpoint {
        Some(checkpoint) => Coordinator::from_checkpoint(checkpoint, config),
        None => Coordinator::new(runner(), config),
    };
    for op in &recovered.operations {
        coordinator.apply(op);
    }
    coordinator
}

#[test]
fn runner_hash_is_stable_and_short() {
    let hash = runner_hash(&runner());
    assert_eq!(hash.len(), 16);
    assert_eq!(hash, runner_hash(&RunnerId::new("emulator-a")));
    assert_ne!(hash, runner_hash(&RunnerId::new("emulator-b")));
}

#[test]
fn fresh_store_recovers_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (_, recovered) = RunnerStore::open(dir.path(), &runner()).unwrap();

    assert!(recovered.checkpoint.is_none());
    assert!(recovered.operations.is_empty());
    assert!(!recovered.corrupt_tail);
}

#[test]
fn wal_operations_replay_into_same_state() {
    let dir = tempfile::tempdir().unwrap();
    let mut live = Coordinator::new(runner(), CoordinatorConfig::default());
    {
        let (mut store, _) = RunnerStore::open(dir.path(), &runner()).unwrap();
        live.acquire(AcquireRequest::new("r1", "l1"), at()).unwrap();
        live.acquire(AcquireRequest::new("r2", "l2"), at()).unwrap();
        live.release(&LeaseId::new("l1"), at());
        for op in persisted(&mut live) {
            store.append(&op).unwrap();
        }
    }

    let (_, recovered) = RunnerStore::open(dir.path(), &runner()).unwrap();
    assert_eq!(recovered.operations.len(), 3);
    let rebuilt = rebuild(recovered);
    assert_eq!(rebuilt.checkpoint().state, live.checkpoint().state);
}

#[test]
fn checkpoint_truncates_wal_and_recovery_combines_both() {
    let dir = tempfile::tempdir().unwrap();
    let mut live = Coordinator::new(runner(), CoordinatorConfig::default());
    {
        let (mut store, _) = RunnerStore::open(dir.path(), &runner()).unwrap();
        live.acquire(AcquireRequest::new("r1", "l1"), at()).unwrap();
        for op in persisted(&mut live) {
            store.append(&op).unwrap();
        }

        let sequence = store.commit_checkpoint(&live.checkpoint(), at()).unwrap();
        assert_eq!(sequence, 1);
        live = Coordinator::from_checkpoint(live.checkpoint(), CoordinatorConfig::default());

        live.acquire(AcquireRequest::new("r2", "l2"), at()).unwrap();
        for op in persisted(&mut live) {
            assert_eq!(store.append(&op).unwrap(), 2);
        }
    }

    let (_, recovered) = RunnerStore::open(dir.path(), &runner()).unwrap();
    assert!(recovered.checkpoint.is_some());
    assert_eq!(recovered.operations.len(), 1);
    let rebuilt = rebuild(recovered);
    assert_eq!(rebuilt.semaphore(), live.semaphore());
}

#[test]
fn crash_between_checkpoint_and_truncate_does_not_double_apply() {
    let dir = tempfile::tempdir().unwrap();
    let mut live = Coordinator::new(runner(), CoordinatorConfig::default());
    let (mut store, _) = RunnerStore::open(dir.path(), &runner()).unwrap();
    live.acquire(AcquireRequest::new("r1", "l1"), at()).unwrap();
    for op in persisted(&mut live) {
        store.append(&op).unwrap();
    }

    // Write the checkpoint without clearing the WAL
    CheckpointStore::new(&store.dir().join("checkpoints"))
        .save(&StoredCheckpoint {
            sequence: 1,
            saved_at: at(),
            checkpoint: live.checkpoint(),
        })
        .unwrap();
    drop(store);

    let (_, recovered) = RunnerStore::open(dir.path(), &runner()).unwrap();
    assert!(recovered.operations.is_empty());
}

#[test]
fn torn_tail_is_cut_and_appends_continue() {
    let dir = tempfile::tempdir().unwrap();
    let mut live = Coordinator::new(runner(), CoordinatorConfig::default());
    {
        let (mut store, _) = RunnerStore::open(dir.path(), &runner()).unwrap();
        live.acquire(AcquireRequest::new("r1", "l1"), at()).unwrap();
        for op in persisted(&mut live) {
            store.append(&op).unwrap();
        }
    }
    let wal_path = RunnerStore::runner_dir(dir.path(), &runner()).join("wal.jsonl");
    let mut file = fs::OpenOptions::new().append(true).open(&wal_path).unwrap();
    write!(file, "{{\"sequence\":2,").unwrap();
    drop(file);

    let (mut store, recovered) = RunnerStore::open(dir.path(), &runner()).unwrap();
    assert!(recovered.corrupt_tail);
    assert_eq!(recovered.operations.len(), 1);
    assert_eq!(store.append(&recovered.operations[0]).unwrap(), 2);

    let (_, again) = RunnerStore::open(dir.path(), &runner()).unwrap();
    assert!(!again.corrupt_tail);
    assert_eq!(again.operations.len(), 2);
}

#[test]
fn list_runners_reads_metadata() {
    let dir = tempfile::tempdir().unwrap();
    RunnerStore::open(dir.path(), &RunnerId::new("b")).unwrap();
    RunnerStore::open(dir.path(), &RunnerId::new("a")).unwrap();

    assert_eq!(
        RunnerStore::list_runners(dir.path()).unwrap(),
        vec![RunnerId::new("a"), RunnerId::new("b")]
    );
}

fn checkpoint_twice(dir: &Path) -> Coordinator {
    let mut live = Coordinator::new(runner(), CoordinatorConfig::with_capacity(2));
    let (mut store, _) = RunnerStore::open(dir, &runner()).unwrap();
    for (request, lease) in [("r1", "l1"), ("r2", "l2")] {
        live.acquire(AcquireRequest::new(request, lease), at()).unwrap();
        for op in persisted(&mut live) {
            store.append(&op).unwrap();
        }
        store.commit_checkpoint(&live.checkpoint(), at()).unwrap();
    }
    live
}

fn corrupt_newest_checkpoint(dir: &Path) {
    let checkpoints = CheckpointStore::new(&RunnerStore::runner_dir(dir, &runner()).join("checkpoints"));
    let listed = checkpoints.list().unwrap();
    assert_eq!(listed.len(), 2);
    fs::write(&listed[0].1, b"{\"sequence\":2,").unwrap();
}

#[test]
fn unreadable_newest_checkpoint_refuses_to_roll_back() {
    let dir = tempfile::tempdir().unwrap();
    checkpoint_twice(dir.path());
    corrupt_newest_checkpoint(dir.path());

    let err = RunnerStore::open(dir.path(), &runner()).err().unwrap();
    assert!(
        matches!(err, StorageError::MissingOperations { covered: 1, next: 3 }),
        "{}",
        err
    );
}

#[test]
fn unreadable_newest_checkpoint_with_later_wal_still_refuses() {
    let dir = tempfile::tempdir().unwrap();
    let mut live = checkpoint_twice(dir.path());
    {
        let (mut store, _) = RunnerStore::open(dir.path(), &runner()).unwrap();
        live.release(&LeaseId::new("l1"), at());
        for op in persisted(&mut live) {
            assert_eq!(store.append(&op).unwrap(), 3);
        }
    }
    corrupt_newest_checkpoint(dir.path());

    let err = RunnerStore::open(dir.path(), &runner()).err().unwrap();
    assert!(matches!(err, StorageError::MissingOperations { covered: 1, next: 3 }));
}

#[test]
fn unreadable_checkpoint_is_tolerated_while_wal_covers_it() {
    let dir = tempfile::tempdir().unwrap();
    let mut live = Coordinator::new(runner(), CoordinatorConfig::default());
    let (mut store, _) = RunnerStore::open(dir.path(), &runner()).unwrap();
    live.acquire(AcquireRequest::new("r1", "l1"), at()).unwrap();
    for op in persisted(&mut live) {
        store.append(&op).unwrap();
    }
    // Checkpoint written but the WAL was never emptied
    let checkpoints = CheckpointStore::new(&store.dir().join("checkpoints"));
    let path = checkpoints
        .save(&StoredCheckpoint {
            sequence: 1,
            saved_at: at(),
            checkpoint: live.checkpoint(),
        })
        .unwrap();
    drop(store);
    fs::write(&path, b"garbage").unwrap();

    let (_, recovered) = RunnerStore::open(dir.path(), &runner()).unwrap();
    assert!(recovered.checkpoint.is_none());
    assert_eq!(recovered.operations.len(), 1);
    assert_eq!(rebuild(recovered).semaphore(), live.semaphore());
}
