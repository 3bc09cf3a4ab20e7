//! End-to-end tests: coordinators talking to the reference server.

use std::sync::Arc;
use std::time::Duration;
use tidesync_engine::{
    CancelToken, ConnectivityWatcher, ManualConnectivity, MemoryOperationLog, MemoryStore,
    RetryConfig, StaticTokenProvider, SyncConfig, SyncCoordinator, SyncError, SyncStatus,
    TokenProvider,
};
use tidesync_protocol::{ConflictPolicy, Entity, EntityData, EntityId, Query};
use tidesync_server::{LoopbackGateway, RemoteStore, ServerConfig, SyncServer};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq)]
struct TodoItem {
    title: String,
    done: bool,
}

impl EntityData for TodoItem {
    const COLLECTION: &'static str = "TodoItem";
}

fn todo(title: &str) -> TodoItem {
    TodoItem {
        title: title.into(),
        done: false,
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct Client {
    coordinator: Arc<SyncCoordinator<TodoItem>>,
    gateway: Arc<LoopbackGateway<TodoItem>>,
    connectivity: Arc<ManualConnectivity>,
}

impl Client {
    fn new(server: &Arc<SyncServer<TodoItem>>) -> Self {
        Self::build(server, SyncConfig::default(), None, ConflictPolicy::LocalWins)
    }

    fn build(
        server: &Arc<SyncServer<TodoItem>>,
        config: SyncConfig,
        tokens: Option<Arc<dyn TokenProvider>>,
        policy: ConflictPolicy,
    ) -> Self {
        let mut gateway = LoopbackGateway::new(Arc::clone(server));
        if let Some(tokens) = tokens {
            gateway = gateway.with_tokens(tokens);
        }
        let gateway = Arc::new(gateway);
        let connectivity = Arc::new(ManualConnectivity::new(true));
        let store: Arc<MemoryStore<TodoItem>> = Arc::new(MemoryStore::new());

        let coordinator = SyncCoordinator::new(
            config,
            gateway.clone(),
            store,
            Arc::new(MemoryOperationLog::new()),
            connectivity.clone(),
        )
        .with_resolver(policy);

        Self {
            coordinator: Arc::new(coordinator),
            gateway,
            connectivity,
        }
    }

    async fn sync(&self) -> tidesync_engine::SyncReport<TodoItem> {
        self.coordinator.sync(&CancelToken::new()).await.unwrap()
    }

    fn read(&self, id: &str) -> Option<Entity<TodoItem>> {
        self.coordinator.read_item(&EntityId::new(id)).unwrap()
    }

    fn rename(&self, id: &str, title: &str) {
        self.coordinator
            .update_item(Entity::new(id, todo(title)))
            .unwrap();
    }
}

fn open_server() -> Arc<SyncServer<TodoItem>> {
    Arc::new(SyncServer::new(ServerConfig::default()))
}

/// Creates `t1` on `a` and brings `b` up to date with it.
async fn shared_row(a: &Client, b: &Client) {
    a.coordinator
        .create_item(Entity::new("t1", todo("first draft")))
        .await
        .unwrap();
    assert!(a.sync().await.is_success());
    assert!(b.sync().await.is_success());
    assert!(b.read("t1").is_some());
}

#[tokio::test]
async fn offline_edits_reach_other_clients() {
    init_tracing();
    let server = open_server();
    let a = Client::new(&server);
    let b = Client::new(&server);

    a.connectivity.set_connected(false);
    a.coordinator
        .create_item(Entity::new("t1", todo("buy milk")))
        .await
        .unwrap();
    a.coordinator
        .create_item(Entity::new("t2", todo("walk dog")))
        .await
        .unwrap();
    a.rename("t1", "buy oat milk");

    assert_eq!(a.sync().await.status, SyncStatus::Offline);
    assert_eq!(a.coordinator.pending_operations_count(), 3);

    a.connectivity.set_connected(true);
    let report = a.sync().await;
    assert_eq!(report.status, SyncStatus::Success);
    assert_eq!(report.pushed, 3);
    assert_eq!(a.coordinator.pending_operations_count(), 0);
    assert_eq!(server.store().len(), 2);

    let report = b.sync().await;
    assert_eq!(report.pulled, 2);
    let t1 = b.read("t1").unwrap();
    assert_eq!(t1.data.title, "buy oat milk");
    assert!(!t1.dirty);
    assert_eq!(t1.version, server.store().get(&EntityId::new("t1")).unwrap().version);
}

#[tokio::test]
async fn concurrent_edits_converge_with_local_wins() {
    init_tracing();
    let server = open_server();
    let a = Client::new(&server);
    let b = Client::new(&server);
    shared_row(&a, &b).await;

    a.rename("t1", "from a");
    b.rename("t1", "from b");

    assert!(a.sync().await.is_success());
    let report = b.sync().await;
    assert_eq!(report.status, SyncStatus::Success);
    assert_eq!(report.resolved.len(), 1);
    assert!(report.unresolved.is_empty());

    a.sync().await;
    let on_a = a.read("t1").unwrap();
    let on_b = b.read("t1").unwrap();
    assert_eq!(on_a.data.title, "from b");
    assert_eq!(on_a, on_b);
    assert_eq!(server.store().get(&EntityId::new("t1")).unwrap(), on_a);
}

#[tokio::test]
async fn server_wins_policy_adopts_remote_copy() {
    let server = open_server();
    let a = Client::new(&server);
    let b = Client::build(
        &server,
        SyncConfig::default(),
        None,
        ConflictPolicy::ServerWins,
    );
    shared_row(&a, &b).await;

    a.rename("t1", "from a");
    b.rename("t1", "from b");
    a.sync().await;

    let report = b.sync().await;
    assert_eq!(report.resolved.len(), 1);
    assert_eq!(b.read("t1").unwrap().data.title, "from a");
    assert_eq!(b.coordinator.pending_operations_count(), 0);
}

#[tokio::test]
async fn manual_policy_leaves_conflict_queued() {
    let server = open_server();
    let a = Client::new(&server);
    let b = Client::build(&server, SyncConfig::default(), None, ConflictPolicy::Manual);
    shared_row(&a, &b).await;

    a.rename("t1", "from a");
    b.rename("t1", "from b");
    a.sync().await;

    let report = b.sync().await;
    assert_eq!(report.status, SyncStatus::PartialWithConflicts);
    assert_eq!(report.unresolved.len(), 1);
    assert_eq!(
        report.unresolved[0].server.as_ref().unwrap().data.title,
        "from a"
    );
    // the pull skips rows with queued local work
    assert_eq!(b.read("t1").unwrap().data.title, "from b");
    assert_eq!(b.coordinator.pending_operations_count(), 1);
}

#[tokio::test]
async fn transport_failure_keeps_unsent_tail() {
    init_tracing();
    let server = open_server();
    let a = Client::new(&server);

    for i in 0..5 {
        a.coordinator
            .create_item(Entity::new(format!("t{i}"), todo("task")))
            .await
            .unwrap();
    }
    a.gateway.fail_after(2);

    let report = a.sync().await;
    assert_eq!(report.status, SyncStatus::TransportFailed);
    assert_eq!(report.pushed, 2);
    assert!(report.error.as_ref().unwrap().is_retryable());
    assert_eq!(a.coordinator.pending_operations_count(), 3);
    assert_eq!(server.store().len(), 2);
    assert!(a.coordinator.last_sync_time().is_none());

    a.gateway.restore();
    let report = a.sync().await;
    assert_eq!(report.status, SyncStatus::Success);
    assert_eq!(report.pushed, 3);
    assert_eq!(server.store().len(), 5);
    assert_eq!(a.gateway.submissions(), 5);
    assert!(a.coordinator.last_sync_time().is_some());
}

#[tokio::test]
async fn lost_response_does_not_duplicate_rows() {
    let server = open_server();
    let a = Client::new(&server);
    a.coordinator
        .create_item(Entity::new("t1", todo("once")))
        .await
        .unwrap();

    a.gateway.lose_responses(1);
    assert_eq!(a.sync().await.status, SyncStatus::TransportFailed);
    assert_eq!(server.store().len(), 1);
    assert_eq!(a.coordinator.pending_operations_count(), 1);

    // the resent insert collides with its own earlier copy
    let report = a.sync().await;
    assert_eq!(report.status, SyncStatus::Success);
    assert_eq!(report.resolved.len(), 1);
    assert_eq!(server.store().len(), 1);

    let local = a.read("t1").unwrap();
    assert!(!local.dirty);
    assert_eq!(
        local.version,
        server.store().get(&EntityId::new("t1")).unwrap().version
    );
}

#[tokio::test(start_paused = true)]
async fn retry_rides_out_a_short_outage() {
    let server = open_server();
    let config = SyncConfig::default().with_retry(
        RetryConfig::new(3)
            .with_initial_delay(Duration::from_millis(100))
            .with_jitter(false),
    );
    let a = Client::build(&server, config, None, ConflictPolicy::LocalWins);
    a.coordinator
        .create_item(Entity::new("t1", todo("eventually")))
        .await
        .unwrap();

    a.gateway.set_reachable(false);
    let gateway = a.gateway.clone();
    let restorer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        gateway.set_reachable(true);
    });

    let report = a
        .coordinator
        .sync_with_retry(&CancelToken::new())
        .await
        .unwrap();
    restorer.await.unwrap();

    assert_eq!(report.status, SyncStatus::Success);
    assert_eq!(a.coordinator.stats().retries, 1);
    assert_eq!(server.store().len(), 1);
}

#[tokio::test]
async fn refused_token_is_refreshed_once() {
    let server = Arc::new(SyncServer::new(
        ServerConfig::new().with_auth(b"integration-secret".to_vec()),
    ));
    let provider = Arc::new(StaticTokenProvider::new("alice.0.00"));
    provider.rotate_to(server.issue_token("alice").unwrap());

    let a = Client::build(
        &server,
        SyncConfig::default(),
        Some(provider),
        ConflictPolicy::LocalWins,
    );
    a.coordinator
        .create_item(Entity::new("t1", todo("secured")))
        .await
        .unwrap();

    assert!(a.sync().await.is_success());
    assert_eq!(server.store().len(), 1);
}

#[tokio::test]
async fn bad_credentials_fail_without_retry() {
    let server = Arc::new(SyncServer::new(
        ServerConfig::new().with_auth(b"integration-secret".to_vec()),
    ));
    let a = Client::build(
        &server,
        SyncConfig::default(),
        Some(Arc::new(StaticTokenProvider::new("mallory.0.00"))),
        ConflictPolicy::LocalWins,
    );
    a.coordinator
        .create_item(Entity::new("t1", todo("denied")))
        .await
        .unwrap();

    let report = a
        .coordinator
        .sync_with_retry(&CancelToken::new())
        .await
        .unwrap();
    assert_eq!(report.status, SyncStatus::TransportFailed);
    assert!(matches!(
        report.error,
        Some(SyncError::AuthenticationFailed(_))
    ));
    assert_eq!(a.coordinator.stats().retries, 0);
    assert_eq!(a.coordinator.pending_operations_count(), 1);
    assert!(server.store().is_empty());
}

#[tokio::test]
async fn remote_deletes_are_pulled() {
    let server = open_server();
    let a = Client::new(&server);
    let b = Client::new(&server);
    shared_row(&a, &b).await;

    a.coordinator.delete_item(&EntityId::new("t1")).unwrap();
    assert!(a.sync().await.is_success());

    let report = b.sync().await;
    assert_eq!(report.pulled, 1);
    assert!(b.read("t1").is_none());
}

#[tokio::test]
async fn local_delete_beats_remote_update() {
    let server = open_server();
    let a = Client::new(&server);
    let b = Client::new(&server);
    shared_row(&a, &b).await;

    b.rename("t1", "edited remotely");
    b.sync().await;

    a.coordinator.delete_item(&EntityId::new("t1")).unwrap();
    let report = a.sync().await;
    assert_eq!(report.resolved.len(), 1);
    assert!(server.store().get(&EntityId::new("t1")).is_none());

    b.sync().await;
    assert!(b.read("t1").is_none());
}

#[tokio::test]
async fn local_update_revives_remotely_deleted_row() {
    let server = open_server();
    let a = Client::new(&server);
    let b = Client::new(&server);
    shared_row(&a, &b).await;

    b.coordinator.delete_item(&EntityId::new("t1")).unwrap();
    b.sync().await;

    a.rename("t1", "still needed");
    let report = a.sync().await;
    assert_eq!(report.resolved.len(), 1);
    assert!(report.resolved[0].is_remote_delete());
    assert_eq!(
        server.store().get(&EntityId::new("t1")).unwrap().data.title,
        "still needed"
    );
}

#[tokio::test]
async fn pull_keeps_rows_with_pending_edits() {
    let server = open_server();
    let a = Client::new(&server);
    let b = Client::new(&server);
    shared_row(&a, &b).await;

    b.rename("t1", "remote edit");
    b.sync().await;

    a.rename("t1", "local edit");
    let report = a.coordinator.pull().await.unwrap();
    assert_eq!(report.pulled, 0);
    assert_eq!(a.read("t1").unwrap().data.title, "local edit");

    a.sync().await;
    assert_eq!(
        server.store().get(&EntityId::new("t1")).unwrap().data.title,
        "local edit"
    );
}

#[tokio::test]
async fn small_batches_page_through_everything() {
    let server = Arc::new(SyncServer::new(
        ServerConfig::new().with_max_fetch_batch(2),
    ));
    let a = Client::new(&server);
    let b = Client::new(&server);

    for i in 0..5 {
        a.coordinator
            .create_item(Entity::new(format!("t{i}"), todo("paged")))
            .await
            .unwrap();
    }
    a.sync().await;

    let report = b.sync().await;
    assert_eq!(report.pulled, 5);
    assert_eq!(b.coordinator.read_all_items().unwrap().len(), 5);

    // caught up: the next pull sees nothing new
    assert_eq!(b.sync().await.pulled, 0);
}

#[tokio::test]
async fn rejected_operation_can_be_discarded() {
    let store = RemoteStore::new().with_validator(|row: &Entity<TodoItem>| {
        if row.data.title.trim().is_empty() {
            Err("title must not be empty".into())
        } else {
            Ok(())
        }
    });
    let server = Arc::new(SyncServer::with_store(
        ServerConfig::default(),
        Arc::new(store),
    ));
    let a = Client::new(&server);

    a.coordinator
        .create_item(Entity::new("good", todo("fine")))
        .await
        .unwrap();
    a.coordinator
        .create_item(Entity::new("bad", todo("  ")))
        .await
        .unwrap();

    let report = a.sync().await;
    assert_eq!(report.status, SyncStatus::PartialWithConflicts);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].entity_id, EntityId::new("bad"));
    assert_eq!(server.store().len(), 1);

    let discarded = a
        .coordinator
        .discard_operation(report.rejected[0].sequence)
        .unwrap();
    assert!(discarded.is_some());
    assert_eq!(a.coordinator.pending_operations_count(), 0);
    assert!(a.read("bad").is_none());

    assert!(a.sync().await.is_success());
    assert!(a.read("bad").is_none());
    assert!(server.store().get(&EntityId::new("bad")).is_none());
    let good = a.read("good").unwrap();
    assert_eq!(good.data.title, "fine");
    assert!(good.version.is_some());
}

#[tokio::test]
async fn discarded_update_restores_server_copy() {
    let store = RemoteStore::new().with_validator(|row: &Entity<TodoItem>| {
        if row.data.title.trim().is_empty() {
            Err("title must not be empty".into())
        } else {
            Ok(())
        }
    });
    let server = Arc::new(SyncServer::with_store(
        ServerConfig::default(),
        Arc::new(store),
    ));
    let a = Client::new(&server);
    let b = Client::new(&server);
    shared_row(&a, &b).await;

    b.rename("t1", "remote");
    assert!(b.sync().await.is_success());

    a.rename("t1", "  ");
    let report = a.sync().await;
    assert_eq!(report.status, SyncStatus::PartialWithConflicts);
    assert_eq!(report.rejected.len(), 1);
    // the pull left the row alone while the rejected write was queued
    assert_eq!(a.read("t1").unwrap().data.title, "  ");

    a.coordinator
        .discard_operation(report.rejected[0].sequence)
        .unwrap()
        .unwrap();
    assert!(a.read("t1").is_none());
    assert!(a.sync().await.is_success());

    let local = a.read("t1").unwrap();
    let remote = server.store().get(&EntityId::new("t1")).unwrap();
    assert_eq!(local.data, remote.data);
    assert_eq!(local.version, remote.version);
    assert_eq!(local.data.title, "remote");
}

#[tokio::test]
async fn purge_resets_checkpoint_for_full_repull() {
    let server = open_server();
    let a = Client::new(&server);
    for i in 0..3 {
        a.coordinator
            .create_item(Entity::new(format!("t{i}"), todo("cached")))
            .await
            .unwrap();
    }
    a.sync().await;

    assert_eq!(a.coordinator.purge(&Query::all(), false).unwrap(), 3);
    assert!(a.coordinator.read_all_items().unwrap().is_empty());

    let report = a.sync().await;
    assert_eq!(report.pulled, 3);
    assert_eq!(a.coordinator.read_all_items().unwrap().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn watcher_and_callers_never_overlap() {
    init_tracing();
    let server = open_server();
    let a = Client::new(&server);
    a.gateway.set_latency(Duration::from_millis(20));

    a.connectivity.set_connected(false);
    for i in 0..3 {
        a.coordinator
            .create_item(Entity::new(format!("t{i}"), todo("queued")))
            .await
            .unwrap();
    }

    let watcher = ConnectivityWatcher::start(a.coordinator.clone());
    a.connectivity.set_connected(true);

    let callers: Vec<_> = (0..3)
        .map(|_| {
            let coordinator = a.coordinator.clone();
            tokio::spawn(async move { coordinator.sync(&CancelToken::new()).await })
        })
        .collect();
    for caller in callers {
        assert!(caller.await.unwrap().unwrap().status.is_complete());
    }
    tokio::time::sleep(Duration::from_secs(1)).await;
    watcher.shutdown().await;

    assert_eq!(a.gateway.max_in_flight(), 1);
    assert_eq!(a.gateway.submissions(), 3);
    assert_eq!(server.store().len(), 3);
    assert_eq!(a.coordinator.pending_operations_count(), 0);
}
