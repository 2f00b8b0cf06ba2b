//! Redis backend integration tests.
//!
//! These tests require a running Redis instance. Set `REDIS_URL` or rely on
//! the `redis://localhost:6379` default, then run with `--ignored`.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use reelflow_core::{
    IdempotencyGuard, IdempotencyOutcome, IdempotencyStore, RateDecision, RateLimitStore,
    RedisIdempotencyStore, RedisRateLimitStore,
};
use reelflow_models::{IdempotencyRecord, JobId, TenantId};
use reelflow_queue::{QueueConfig, RedisTaskQueue, TaskPayload, TaskQueue};

fn redis_url() -> String {
    dotenvy::dotenv().ok();
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
}

fn client() -> redis::Client {
    redis::Client::open(redis_url()).expect("valid redis url")
}

/// A queue on its own stream so parallel runs never share messages.
async fn isolated_queue() -> RedisTaskQueue {
    let suffix = Uuid::new_v4().simple().to_string();
    let queue = RedisTaskQueue::new(QueueConfig {
        redis_url: redis_url(),
        stream_name: format!("reelflow:test:tasks:{}", suffix),
        consumer_group: format!("reelflow:test:workers:{}", suffix),
        max_len: 1_000,
    })
    .expect("queue client");
    queue.init().await.expect("consumer group");
    queue
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_queue_init_is_repeatable() {
    let queue = isolated_queue().await;
    queue.init().await.expect("second init should tolerate existing group");
    assert_eq!(queue.len().await.unwrap(), 0);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_enqueue_consume_ack() {
    let queue = isolated_queue().await;

    let payload = TaskPayload {
        job_id: JobId::from(format!("job-{}", Uuid::new_v4())),
        tenant_id: TenantId::from("tenant-redis"),
        extra_args: json!({"job_type": "transcribe", "attempt": 1}),
    };

    let message_id = queue
        .enqueue("transcribe", payload.clone())
        .await
        .expect("enqueue");
    assert!(!message_id.is_empty());
    assert_eq!(queue.len().await.unwrap(), 1);

    let consumed = queue.consume("test-consumer", 1000, 1).await.expect("consume");
    assert_eq!(consumed.len(), 1);

    let (id, task) = &consumed[0];
    assert_eq!(id, &message_id);
    assert_eq!(task.task_name, "transcribe");
    assert_eq!(task.payload, payload);

    queue.ack(id).await.expect("ack");

    // Acked tasks are removed from the stream
    assert_eq!(queue.len().await.unwrap(), 0);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_idempotency_first_insert_wins() {
    let store = RedisIdempotencyStore::new(client(), 60);
    let tenant = TenantId::from(format!("tenant-{}", Uuid::new_v4().simple()));
    let key = format!("key-{}", Uuid::new_v4());

    let record = |status_code: u16, id: &str| IdempotencyRecord {
        tenant_id: tenant.clone(),
        key: key.clone(),
        method: "POST".into(),
        path: "/api/jobs".into(),
        status_code,
        payload: json!({"id": id}),
        created_at: Utc::now(),
    };

    assert!(store.insert_record(&record(201, "first")).await.unwrap());
    assert!(!store.insert_record(&record(201, "second")).await.unwrap());

    let stored = store.get_record(&tenant, &key).await.unwrap().expect("record");
    assert_eq!(stored.payload, json!({"id": "first"}));
    assert_eq!(stored.status_code, 201);

    let other_tenant = TenantId::from(format!("tenant-{}", Uuid::new_v4().simple()));
    assert!(store.get_record(&other_tenant, &key).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_idempotency_guard_over_redis() {
    let guard = IdempotencyGuard::new(Arc::new(RedisIdempotencyStore::new(client(), 60)));
    let tenant = TenantId::from(format!("tenant-{}", Uuid::new_v4().simple()));
    let key = format!("key-{}", Uuid::new_v4());

    assert_eq!(
        guard.begin(&tenant, &key, "POST", "/api/jobs").await.unwrap(),
        IdempotencyOutcome::Proceed
    );
    guard
        .commit(&tenant, &key, "POST", "/api/jobs", 201, json!({"id": "j1"}))
        .await
        .unwrap();

    assert_eq!(
        guard.begin(&tenant, &key, "POST", "/api/jobs").await.unwrap(),
        IdempotencyOutcome::Replay {
            status_code: 201,
            payload: json!({"id": "j1"}),
        }
    );
    assert_eq!(
        guard
            .begin(&tenant, &key, "POST", "/api/jobs/j1/cancel")
            .await
            .unwrap(),
        IdempotencyOutcome::Conflict
    );
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_rate_limit_rejects_over_limit() {
    let store = RedisRateLimitStore::new(client());
    let scope = format!("test:{}", Uuid::new_v4().simple());
    let now = Utc::now();

    for expected in 1..=3u32 {
        let decision = store.hit(&scope, "tenant-1", 3, 60, now).await.unwrap();
        assert_eq!(decision, RateDecision::Allowed { count: expected });
    }

    match store.hit(&scope, "tenant-1", 3, 60, now).await.unwrap() {
        RateDecision::Rejected { retry_after_secs } => {
            assert!(retry_after_secs >= 1);
            assert!(retry_after_secs <= 60);
        }
        other => panic!("expected rejection, got {:?}", other),
    }

    // Another identity has its own window
    assert!(store
        .hit(&scope, "tenant-2", 3, 60, now)
        .await
        .unwrap()
        .is_allowed());
}
