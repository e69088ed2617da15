//! Store/queue/registry integration tests. These talk to a real Redis and
//! are skipped by default.

use jobhub_store::{JobQueueManager, NotificationBus, Store, WorkerRegistry};

fn store() -> Store {
    dotenvy::dotenv().ok();
    Store::from_env().expect("failed to create store")
}

/// Enqueue then claim a job through the push path, end to end.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_enqueue_and_claim() {
    let store = store();
    store.init().await.expect("failed to initialize store");

    let notify = NotificationBus::new(store.clone());
    let queue = JobQueueManager::new(store.clone(), notify);
    let registry = WorkerRegistry::new(store.clone());

    let worker = registry.register("machine-1", "gpu-0").await.expect("failed to register worker");

    let (job, position, _notified) = queue
        .enqueue("render", 0, serde_json::json!({"n": 1}), Some("client-1".to_string()))
        .await
        .expect("failed to enqueue");
    assert!(position.is_some());

    let claimed = queue
        .claim_job(job.id.as_str(), &worker.worker_id, 30)
        .await
        .expect("failed to claim")
        .expect("job should still be claimable");
    assert_eq!(claimed.id, job.id);

    let again = queue
        .claim_job(job.id.as_str(), &worker.worker_id, 30)
        .await
        .expect("claim should not error");
    assert!(again.is_none(), "a claimed job cannot be claimed twice");
}

/// Progress updates and completion both publish on the job's update channel.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_job_update_pubsub() {
    use futures_util::StreamExt;
    use std::time::Duration;

    let store = store();
    store.init().await.expect("failed to initialize store");
    let notify = NotificationBus::new(store.clone());
    let queue = JobQueueManager::new(store.clone(), notify.clone());

    let (job, _, _) = queue
        .enqueue("render", 0, serde_json::json!({}), None)
        .await
        .expect("failed to enqueue");

    let mut stream = notify.subscribe_job_updates(job.id.as_str()).await.expect("failed to subscribe");

    tokio::time::sleep(Duration::from_millis(100)).await;
    queue
        .update_job_progress(job.id.as_str(), "machine-1:gpu-0", 50, Some("halfway".to_string()))
        .await
        .expect("failed to update progress");

    let event = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("timed out waiting for update")
        .expect("stream ended unexpectedly");
    assert_eq!(event.job_id, job.id.to_string());
    assert_eq!(event.progress, Some(50));
}

/// A newly queued job notifies an idle, freshly-heartbeating worker.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_notify_idle_workers() {
    let store = store();
    store.init().await.expect("failed to initialize store");
    let notify = NotificationBus::new(store.clone());
    let registry = WorkerRegistry::new(store.clone());
    let queue = JobQueueManager::new(store.clone(), notify);

    let worker = registry.register("machine-2", "gpu-0").await.expect("failed to register worker");
    registry.heartbeat(&worker.worker_id, "machine-2", "gpu-0", None).await.expect("failed to heartbeat");

    let (_, _, notified) = queue
        .enqueue("render", 0, serde_json::json!({}), None)
        .await
        .expect("failed to enqueue");
    assert!(notified >= 1, "at least the freshly-registered idle worker should be notified");
}

/// A progress frame arriving after completion is silently dropped — no
/// resurrection of the job, no overwritten result.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_progress_after_completion_is_a_noop() {
    let store = store();
    store.init().await.expect("failed to initialize store");
    let notify = NotificationBus::new(store.clone());
    let queue = JobQueueManager::new(store.clone(), notify);

    let (job, _, _) = queue
        .enqueue("render", 0, serde_json::json!({}), None)
        .await
        .expect("failed to enqueue");

    let result = serde_json::json!({"ok": true});
    queue
        .complete_job(job.id.as_str(), "machine-1:gpu-0", Some(result.clone()))
        .await
        .expect("failed to complete job");

    let after = queue
        .update_job_progress(job.id.as_str(), "machine-1:gpu-0", 10, Some("late".to_string()))
        .await
        .expect("progress update on a terminal job should not error");

    assert!(after.status.is_terminal());
    assert_eq!(after.progress, 100);
    assert_eq!(after.result, Some(result));
    assert!(after.message.as_deref() != Some("late"));
}

/// A duplicate `complete_job` for an already-terminal job is a no-op: the
/// first result sticks and a second call cannot overwrite it.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_duplicate_complete_job_does_not_overwrite_result() {
    let store = store();
    store.init().await.expect("failed to initialize store");
    let notify = NotificationBus::new(store.clone());
    let queue = JobQueueManager::new(store.clone(), notify);

    let (job, _, _) = queue
        .enqueue("render", 0, serde_json::json!({}), None)
        .await
        .expect("failed to enqueue");

    let first_result = serde_json::json!({"ok": true});
    let first = queue
        .complete_job(job.id.as_str(), "machine-1:gpu-0", Some(first_result.clone()))
        .await
        .expect("failed to complete job");
    assert_eq!(first.result, Some(first_result.clone()));

    let second = queue
        .complete_job(job.id.as_str(), "machine-1:gpu-0", Some(serde_json::json!({"ok": false})))
        .await
        .expect("duplicate completion should not error");
    assert_eq!(second.result, Some(first_result), "duplicate completion must not overwrite the stored result");
    assert_eq!(second.completed_at, first.completed_at);
}
