//! Integration tests for the sync service, executor, queue and migration.

use hangar_storage::LocalStore;
use hangar_sync_engine::{
    ManualConnectivity, MigrationConfig, MockRemote, RemoteCall, RetryConfig, StoreRemote,
    SyncConfig, SyncQueue, SyncService,
};
use hangar_sync_protocol::{
    EntityType, EntryState, ErrorKind, MigrationStatus, Operation, RemoteError, SyncStats,
    SyncStatus,
};
use hangar_testkit::{legacy_id, memory_store, record_payload, LegacyDataset, TempStore};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

struct Client {
    probe: Arc<ManualConnectivity>,
    remote: Arc<MockRemote>,
    service: Arc<SyncService>,
}

fn client_with(store: Arc<dyn LocalStore>, online: bool, config: SyncConfig) -> Client {
    let probe = Arc::new(ManualConnectivity::new(online));
    let remote = Arc::new(MockRemote::new());
    let service = SyncService::open(
        store,
        remote.clone(),
        probe.clone(),
        config,
        MigrationConfig::default(),
    )
    .unwrap();
    Client {
        probe,
        remote,
        service: Arc::new(service),
    }
}

fn client(online: bool) -> Client {
    client_with(memory_store(), online, test_config())
}

fn test_config() -> SyncConfig {
    SyncConfig::new()
        .with_retry(RetryConfig::immediate(4))
        .with_sync_interval(None)
}

fn recorder(service: &SyncService) -> Arc<Mutex<Vec<SyncStats>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _subscription = service.subscribe(move |stats| sink.lock().push(*stats));
    seen
}

#[tokio::test]
async fn offline_run_leaves_stats_unchanged() {
    let c = client(false);
    for n in 0..3 {
        c.service
            .enqueue(
                EntityType::Task,
                &format!("T-{n}"),
                Operation::Update,
                Some(b"task".to_vec()),
            )
            .unwrap();
    }
    let before = c.service.stats();

    assert!(!c.service.force_sync_now().await.unwrap());

    let after = c.service.stats();
    assert_eq!(before, after);
    assert_eq!(after.pending_items, 3);
    assert!(c.remote.calls().is_empty());
}

#[tokio::test]
async fn online_run_syncs_every_pending_entry() {
    let c = client(true);
    c.service
        .enqueue(
            EntityType::Aircraft,
            "EC-MKV",
            Operation::Create,
            Some(b"plane".to_vec()),
        )
        .unwrap();
    c.service
        .enqueue(
            EntityType::Employee,
            "E-1",
            Operation::Update,
            Some(b"ana".to_vec()),
        )
        .unwrap();

    assert!(c.service.force_sync_now().await.unwrap());

    let stats = c.service.stats();
    assert_eq!(stats.synced_items, 2);
    assert_eq!(stats.pending_items, 0);
    assert_eq!(stats.error_items, 0);
    assert_eq!(c.service.status(), SyncStatus::Synced);
}

#[tokio::test]
async fn every_published_snapshot_is_consistent() {
    let c = client(true);
    let seen = recorder(&c.service);
    c.remote
        .fail_always("E-2", RemoteError::Rejected("bad email".into()));
    c.remote.fail_next("T-1", RemoteError::Timeout);

    for (kind, id) in [
        (EntityType::Employee, "E-1"),
        (EntityType::Employee, "E-2"),
        (EntityType::Task, "T-1"),
        (EntityType::Task, "T-2"),
    ] {
        c.service
            .enqueue(kind, id, Operation::Update, Some(b"x".to_vec()))
            .unwrap();
    }
    c.service.force_sync_now().await.unwrap();

    let seen = seen.lock();
    assert!(seen.len() > 3);
    assert!(seen.iter().all(SyncStats::is_consistent));
    let last = seen.last().unwrap();
    assert_eq!(last.synced_items, 3);
    assert_eq!(last.error_items, 1);
    assert!(!last.sync_in_progress);
}

#[tokio::test]
async fn collapsed_mutations_apply_only_the_delete() {
    let c = client(true);
    c.remote.insert(&EntityType::Task, "T-1", b"old");

    c.service
        .enqueue(EntityType::Task, "T-1", Operation::Create, Some(b"v1".to_vec()))
        .unwrap();
    c.service
        .enqueue(EntityType::Task, "T-1", Operation::Update, Some(b"v2".to_vec()))
        .unwrap();
    c.service
        .enqueue(EntityType::Task, "T-1", Operation::Delete, None)
        .unwrap();
    assert_eq!(c.service.queue_entries().len(), 1);

    c.service.force_sync_now().await.unwrap();

    assert_eq!(
        c.remote.calls(),
        vec![RemoteCall::Delete {
            entity_type: EntityType::Task,
            entity_id: "T-1".into(),
        }]
    );
    assert_eq!(c.remote.record(&EntityType::Task, "T-1"), None);
}

#[tokio::test]
async fn uncollapsed_mutations_apply_in_enqueue_order() {
    let c = client_with(
        memory_store(),
        true,
        test_config().with_collapse_mutations(false),
    );

    c.service
        .enqueue(EntityType::Task, "T-1", Operation::Create, Some(b"v1".to_vec()))
        .unwrap();
    c.service
        .enqueue(EntityType::Task, "T-1", Operation::Update, Some(b"v2".to_vec()))
        .unwrap();
    c.service
        .enqueue(EntityType::Task, "T-1", Operation::Delete, None)
        .unwrap();

    c.service.force_sync_now().await.unwrap();

    let calls = c.remote.calls_for("T-1");
    assert_eq!(calls.len(), 3);
    assert!(matches!(&calls[0], RemoteCall::Upsert { payload, .. } if payload == b"v1"));
    assert!(matches!(&calls[1], RemoteCall::Upsert { payload, .. } if payload == b"v2"));
    assert!(matches!(&calls[2], RemoteCall::Delete { .. }));
    assert_eq!(c.service.stats().synced_items, 3);
}

#[tokio::test]
async fn concurrent_runs_start_one_pass() {
    let c = client(false);
    c.remote.set_latency(Some(Duration::from_millis(20)));
    for n in 0..3 {
        c.service
            .enqueue(
                EntityType::Aircraft,
                &format!("A-{n}"),
                Operation::Create,
                Some(vec![n]),
            )
            .unwrap();
    }

    assert!(!c.service.force_sync_now().await.unwrap());
    c.probe.set_online(true);

    let (first, second) = tokio::join!(c.service.force_sync_now(), c.service.force_sync_now());
    let started = [first.unwrap(), second.unwrap()];

    assert_eq!(started.iter().filter(|ran| **ran).count(), 1);
    assert_eq!(c.remote.calls().len(), 3);
    assert_eq!(c.service.stats().synced_items, 3);
}

#[tokio::test]
async fn permanently_failing_remote_reaches_failed() {
    let c = client(true);
    c.remote
        .fail_always("T-1", RemoteError::Network("connection reset".into()));
    let id = c
        .service
        .enqueue(EntityType::Task, "T-1", Operation::Update, Some(b"x".to_vec()))
        .unwrap();

    c.service.force_sync_now().await.unwrap();

    let entry = c.service.queue().get(id).unwrap();
    assert_eq!(entry.state, EntryState::Failed);
    assert_eq!(entry.attempts, 4);
    assert_eq!(c.remote.calls_for("T-1").len(), 4);

    // Nothing left to do automatically.
    c.service.force_sync_now().await.unwrap();
    assert_eq!(c.remote.calls_for("T-1").len(), 4);
}

#[tokio::test]
async fn unknown_failures_stop_sooner() {
    let c = client(true);
    c.remote
        .fail_always("T-1", RemoteError::Other("weird".into()));
    let id = c
        .service
        .enqueue(EntityType::Task, "T-1", Operation::Update, Some(b"x".to_vec()))
        .unwrap();

    c.service.force_sync_now().await.unwrap();

    let entry = c.service.queue().get(id).unwrap();
    assert_eq!(entry.state, EntryState::Failed);
    assert_eq!(entry.attempts, 3);
    assert_eq!(entry.last_error.unwrap().kind, ErrorKind::Unknown);
}

#[tokio::test]
async fn conflict_keeps_remote_snapshot() {
    let c = client(true);
    c.remote.fail_always(
        "EC-MKV",
        RemoteError::Conflict {
            message: "stale revision".into(),
            remote: Some(b"remote-rev-7".to_vec()),
        },
    );
    let id = c
        .service
        .enqueue(
            EntityType::Aircraft,
            "EC-MKV",
            Operation::Update,
            Some(b"local-rev-6".to_vec()),
        )
        .unwrap();

    c.service.force_sync_now().await.unwrap();

    let entry = c.service.queue().get(id).unwrap();
    assert_eq!(entry.state, EntryState::Failed);
    assert_eq!(entry.payload.as_deref(), Some(&b"local-rev-6"[..]));
    let error = entry.last_error.unwrap();
    assert_eq!(error.kind, ErrorKind::Conflict);
    assert_eq!(error.remote_snapshot.as_deref(), Some(&b"remote-rev-7"[..]));
}

#[test]
fn in_flight_entries_recover_after_restart() {
    let temp = TempStore::new();
    let config = test_config();
    {
        let queue = SyncQueue::open(temp.store.clone(), &config).unwrap();
        queue
            .enqueue(EntityType::Task, "T-1", Operation::Update, Some(b"a".to_vec()))
            .unwrap();
        queue
            .enqueue(EntityType::Task, "T-2", Operation::Update, Some(b"b".to_vec()))
            .unwrap();
        assert_eq!(queue.next_batch(1).unwrap().len(), 1);
        assert_eq!(queue.counts().in_flight, 1);
    }

    let temp = temp.reopen();
    let queue = SyncQueue::open(temp.store.clone(), &config).unwrap();
    let counts = queue.counts();
    assert_eq!(counts.in_flight, 0);
    assert_eq!(counts.pending, 2);
}

#[tokio::test]
async fn scenario_migration_with_one_failed_employee() {
    let store = memory_store();
    LegacyDataset::standard().seed(store.as_ref()).unwrap();
    let c = client_with(store, true, test_config());
    let failing = legacy_id(&EntityType::Employee, 2);
    c.remote
        .fail_always(&failing, RemoteError::Rejected("license expired".into()));

    let counts = c.service.local_counts().unwrap();
    assert_eq!(counts.get("aircraft"), 5);
    assert_eq!(counts.get("employees"), 3);
    assert_eq!(counts.get("tasks"), 0);
    assert_eq!(counts.get("flight_sheets"), 2);
    assert_eq!(counts.total, 10);

    let mut progress = Vec::new();
    let result = c.service.migrate_all(|p| progress.push(p)).await;

    assert!(!result.success);
    assert_eq!(result.details.migrated("aircraft"), 5);
    assert_eq!(result.details.migrated("employees"), 2);
    assert_eq!(result.details.migrated("flight_sheets"), 2);
    assert_eq!(result.details.errors.len(), 1);
    assert_eq!(result.details.error_count, 1);
    assert!(result.details.errors[0].contains(&failing));

    let employees_end = progress
        .iter()
        .rev()
        .find(|p| p.table == "employees")
        .unwrap();
    assert_eq!(employees_end.status, MigrationStatus::Error);
    assert_eq!(c.remote.record_count(), 9);
}

#[tokio::test]
async fn migration_is_idempotent() {
    let store = memory_store();
    let dataset = LegacyDataset::standard();
    dataset.seed(store.as_ref()).unwrap();
    let c = client_with(store, true, test_config());

    let first = c.service.migrate_all(|_| {}).await;
    let second = c.service.migrate_all(|_| {}).await;

    assert!(first.success);
    assert!(second.success);
    assert_eq!(second.details.total_migrated(), dataset.total());
    assert_eq!(c.remote.record_count(), dataset.total());
    assert_eq!(
        c.remote
            .record(&EntityType::Aircraft, &legacy_id(&EntityType::Aircraft, 1)),
        Some(record_payload(
            &EntityType::Aircraft,
            &legacy_id(&EntityType::Aircraft, 1)
        ))
    );
}

#[tokio::test]
async fn migration_then_clear_and_mark() {
    let store = memory_store();
    LegacyDataset::standard().seed(store.as_ref()).unwrap();
    let c = client_with(store, false, test_config());
    c.service
        .enqueue(EntityType::Task, "T-1", Operation::Update, Some(b"x".to_vec()))
        .unwrap();

    assert!(c.service.is_remote_configured().await);
    let result = c.service.migrate_all(|_| {}).await;
    assert!(result.success);

    assert_eq!(c.service.clear_queue().unwrap(), 1);
    assert_eq!(c.service.mark_all_synced().unwrap(), 10);
    assert!(c
        .service
        .is_record_synced("flight_sheets", &legacy_id(&EntityType::FlightSheet, 2))
        .unwrap());
    assert_eq!(c.service.stats().total_items, 0);
}

#[tokio::test]
async fn sync_skipped_during_migration_runs_after_it() {
    let store = memory_store();
    LegacyDataset::standard().seed(store.as_ref()).unwrap();
    let c = client_with(store, true, test_config());
    c.remote.set_latency(Some(Duration::from_millis(5)));
    c.service
        .enqueue(EntityType::Task, "T-9", Operation::Update, Some(b"x".to_vec()))
        .unwrap();

    let migration = {
        let service = c.service.clone();
        tokio::spawn(async move { service.migrate_all(|_| {}).await })
    };
    while c.remote.calls().is_empty() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    assert!(!c.service.force_sync_now().await.unwrap());
    assert!(c.remote.calls_for("T-9").is_empty());

    assert!(migration.await.unwrap().success);
    assert_eq!(c.remote.calls_for("T-9").len(), 1);
    assert_eq!(c.service.stats().pending_items, 0);
}

#[tokio::test]
async fn unreachable_remote_fails_migration_cleanly() {
    let store = memory_store();
    LegacyDataset::standard().seed(store.as_ref()).unwrap();
    let c = client_with(store, true, test_config());
    c.remote.set_reachable(false);

    assert!(!c.service.is_remote_configured().await);
    let result = c.service.migrate_all(|_| {}).await;

    assert!(!result.success);
    assert_eq!(result.details.total_migrated(), 0);
    let log = c.service.sync_log(5);
    assert!(log.iter().any(|e| e.message.contains("not reachable")));
}

#[tokio::test]
async fn sync_log_records_outcomes() {
    let c = client(true);
    c.remote
        .fail_always("E-1", RemoteError::Forbidden("read-only role".into()));
    c.service
        .enqueue(EntityType::Employee, "E-1", Operation::Update, Some(b"x".to_vec()))
        .unwrap();
    c.service
        .enqueue(EntityType::Employee, "E-2", Operation::Update, Some(b"y".to_vec()))
        .unwrap();

    c.service.force_sync_now().await.unwrap();

    let log = c.service.sync_log(10);
    assert!(log.iter().any(|e| e.entity == "employee/E-1"
        && e.kind == hangar_sync_protocol::LogType::Error));
    assert!(log.iter().any(|e| e.entity == "employee/E-2"
        && e.kind == hangar_sync_protocol::LogType::Success));

    c.service.clear_sync_log();
    assert!(c.service.sync_log(10).is_empty());
}

#[tokio::test]
async fn file_backed_client_syncs_into_mirror() {
    let local = TempStore::new();
    let mirror = TempStore::new();
    let probe = Arc::new(ManualConnectivity::new(true));
    let service = SyncService::open(
        local.store.clone(),
        Arc::new(StoreRemote::new(mirror.store.clone())),
        probe,
        test_config(),
        MigrationConfig::default(),
    )
    .unwrap();

    service
        .enqueue(
            EntityType::FlightSheet,
            "FS-1",
            Operation::Create,
            Some(b"sheet".to_vec()),
        )
        .unwrap();
    assert!(service.force_sync_now().await.unwrap());

    assert_eq!(
        mirror.get("flight_sheets", "FS-1").unwrap(),
        Some(b"sheet".to_vec())
    );
}
