//! Registry integration tests with real actors and stores.

use std::sync::Arc;
use std::time::Duration;

use engage_actor_host::actors::{
    ActorError, CounterDeps, CounterRegistry, PresenceDeps, PresenceRegistry, RegistryConfig,
};
use engage_actor_host::clock::ManualClock;
use engage_actor_host::protocol::{CounterCommand, CounterReply, PresenceCommand, PresenceReply};
use engage_store::{DurableStore, SqliteStore};
use engage_testing::{init_tracing, FlakyStore};

fn increment(field: &str) -> CounterCommand {
    CounterCommand::Increment {
        field: field.to_string(),
        delta: 1,
    }
}

async fn count_of(registry: &CounterRegistry, key: &str, field: &str) -> u64 {
    match registry.dispatch(key, CounterCommand::Get).await.unwrap() {
        CounterReply::Counts(counts) => counts.get(field).copied().unwrap_or(0),
        other => panic!("expected counts, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_increments_are_not_lost() {
    init_tracing();
    let store = FlakyStore::new();
    let registry = Arc::new(CounterRegistry::new(
        CounterDeps::new(store.clone()),
        RegistryConfig::default(),
    ));

    let tasks: Vec<_> = (0..100)
        .map(|_| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.dispatch("post_hot", increment("likes")).await })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), CounterReply::ack());
    }

    assert_eq!(count_of(&registry, "post_hot", "likes").await, 100);
    // One cold start, one hydration read
    assert_eq!(store.gets(), 1);
    assert_eq!(store.puts(), 100);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_keys_are_isolated() {
    init_tracing();
    let store = FlakyStore::new();
    let registry = CounterRegistry::new(CounterDeps::new(store), RegistryConfig::default());

    registry.dispatch("post_a", increment("likes")).await.unwrap();
    registry.dispatch("post_a", increment("likes")).await.unwrap();
    registry.dispatch("post_b", increment("likes")).await.unwrap();

    assert_eq!(count_of(&registry, "post_a", "likes").await, 2);
    assert_eq!(count_of(&registry, "post_b", "likes").await, 1);
    assert_eq!(registry.active_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_evicted_actor_rehydrates_without_data_loss() {
    init_tracing();
    let store = FlakyStore::new();
    let config = RegistryConfig {
        idle_timeout: Some(Duration::from_secs(60)),
        ..RegistryConfig::default()
    };
    let registry = CounterRegistry::new(CounterDeps::new(store.clone()), config);

    for _ in 0..3 {
        registry.dispatch("flick_1", increment("views")).await.unwrap();
    }

    tokio::time::sleep(Duration::from_secs(61)).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(!registry.is_active("flick_1"));

    assert_eq!(count_of(&registry, "flick_1", "views").await, 3);
    assert_eq!(store.gets(), 2);
}

#[tokio::test]
async fn test_hydration_failure_is_retryable() {
    init_tracing();
    let store = FlakyStore::new();
    let registry = CounterRegistry::new(CounterDeps::new(store.clone()), RegistryConfig::default());

    store.fail_reads(true);
    let err = registry
        .dispatch("post_1", increment("likes"))
        .await
        .unwrap_err();
    assert!(matches!(err, ActorError::StoreUnavailable(_)));
    assert!(err.is_retryable());

    store.fail_reads(false);
    registry.dispatch("post_1", increment("likes")).await.unwrap();
    assert_eq!(count_of(&registry, "post_1", "likes").await, 1);
}

#[tokio::test]
async fn test_state_survives_restart_on_sqlite() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("actors.db");
    let clock = Arc::new(ManualClock::new(1_000));

    {
        let store: Arc<dyn DurableStore> = Arc::new(SqliteStore::open(&path).unwrap());
        let counters = CounterRegistry::new(CounterDeps::new(store.clone()), RegistryConfig::default());
        let presence = PresenceRegistry::new(
            PresenceDeps::new(store, clock.clone()),
            RegistryConfig::default(),
        );

        counters
            .dispatch(
                "post_9",
                CounterCommand::Init {
                    values: [("likes".to_string(), 41)].into_iter().collect(),
                },
            )
            .await
            .unwrap();
        counters.dispatch("post_9", increment("likes")).await.unwrap();
        presence
            .dispatch(
                "post_9",
                PresenceCommand::Register {
                    user_id: "u1".to_string(),
                    session_id: "s1".to_string(),
                },
            )
            .await
            .unwrap();

        counters.shutdown().await;
        presence.shutdown().await;
    }

    let store: Arc<dyn DurableStore> = Arc::new(SqliteStore::open(&path).unwrap());
    let counters = CounterRegistry::new(CounterDeps::new(store.clone()), RegistryConfig::default());
    let presence = PresenceRegistry::new(
        PresenceDeps::new(store, clock.clone()),
        RegistryConfig::default(),
    );

    assert_eq!(count_of(&counters, "post_9", "likes").await, 42);

    clock.set(20_000);
    match presence.dispatch("post_9", PresenceCommand::Count).await.unwrap() {
        PresenceReply::Viewers { count, viewers } => {
            assert_eq!(count, 1);
            assert_eq!(viewers[0].user_id, "u1");
            assert_eq!(viewers[0].last_heartbeat, 1_000);
        }
        other => panic!("expected viewers, got {other:?}"),
    }
}
