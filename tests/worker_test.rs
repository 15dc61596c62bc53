//! Worker loop integration tests: dispatch, batch isolation, cancellation
//! races, timeouts, and crash recovery. All hermetic — in-memory store plus
//! a scriptable mock verifier.

mod fixtures;
mod helpers;

use fixtures::*;
use helpers::*;

use std::time::Duration;

use ttb_label_verifier::models::job::{ItemOutcome, JobResult, JobStatus};
use ttb_label_verifier::models::label::{GroundTruth, ValidationLevel};

#[tokio::test]
async fn single_job_runs_to_completed() {
    let h = harness().await;
    let job_id = h
        .queue
        .submit_single(sample_jpeg(), "label.jpg", None)
        .await
        .unwrap();

    assert!(h.worker.process_next().await.unwrap());

    let view = h.queue.status(job_id).await.unwrap();
    assert_eq!(view.status, JobStatus::Completed);
    assert_eq!(view.progress.processed_images, 1);
    assert_eq!(view.progress.total_images, 1);

    // No ground truth: the result reflects structural-only validation.
    let Some(JobResult::Single(outcome)) = view.result else {
        panic!("expected single result");
    };
    assert_eq!(outcome.validation_level, ValidationLevel::StructuralOnly);
    assert_eq!(h.verifier.calls(), 1);
}

#[tokio::test]
async fn ground_truth_reaches_the_verifier() {
    let h = harness().await;
    let gt = GroundTruth {
        brand_name: Some("Stone Creek Vineyards".to_string()),
        class_type: Some("Wine".to_string()),
        abv: Some(13.5),
        net_contents: None,
    };
    let job_id = h
        .queue
        .submit_single(sample_jpeg(), "label.jpg", Some(gt))
        .await
        .unwrap();

    assert!(h.worker.process_next().await.unwrap());

    let view = h.queue.status(job_id).await.unwrap();
    let Some(JobResult::Single(outcome)) = view.result else {
        panic!("expected single result");
    };
    assert_eq!(outcome.validation_level, ValidationLevel::FullValidation);
}

#[tokio::test]
async fn empty_queue_yields_no_work() {
    let h = harness().await;
    assert!(!h.worker.process_next().await.unwrap());
    assert_eq!(h.verifier.calls(), 0);
}

#[tokio::test]
async fn verifier_error_fails_the_job() {
    let h = harness_with(MockVerifier::failing_on(&["broken.jpg"]), fast_config()).await;
    let job_id = h
        .queue
        .submit_single(sample_jpeg(), "broken.jpg", None)
        .await
        .unwrap();

    assert!(h.worker.process_next().await.unwrap());

    let view = h.queue.status(job_id).await.unwrap();
    assert_eq!(view.status, JobStatus::Failed);
    let error = view.error.expect("failure reason recorded");
    assert!(error.contains("unsupported or corrupt image data"));
}

#[tokio::test]
async fn slow_verifier_call_is_timed_out() {
    let mut config = fast_config();
    config.verify_timeout = Duration::from_millis(50);
    let h = harness_with(MockVerifier::slow(Duration::from_millis(500)), config).await;

    let job_id = h
        .queue
        .submit_single(sample_jpeg(), "label.jpg", None)
        .await
        .unwrap();

    assert!(h.worker.process_next().await.unwrap());

    let view = h.queue.status(job_id).await.unwrap();
    assert_eq!(view.status, JobStatus::Failed);
    assert!(view.error.expect("timeout recorded").contains("timed out"));
}

#[tokio::test]
async fn batch_isolates_per_item_failures() {
    // Image 2 of 3 is broken; 1 and 3 must still be processed.
    let h = harness_with(MockVerifier::failing_on(&["b.jpg"]), fast_config()).await;

    let archive = build_zip(&[
        ("a.jpg", sample_jpeg()),
        ("b.jpg", sample_jpeg()),
        ("c.jpg", sample_jpeg()),
    ]);
    let (job_id, total) = h.queue.submit_batch(archive).await.unwrap();
    assert_eq!(total, 3);

    assert!(h.worker.process_next().await.unwrap());
    assert_eq!(h.verifier.calls(), 3, "items after a failure are still processed");

    let view = h.queue.status(job_id).await.unwrap();
    assert_eq!(view.status, JobStatus::Completed);
    assert_eq!(view.progress.processed_images, 3);

    let Some(JobResult::Batch(report)) = view.result else {
        panic!("expected batch report");
    };
    assert_eq!(report.results.len(), 3);
    assert!(matches!(report.results[0].outcome, ItemOutcome::Verified { .. }));
    assert!(matches!(report.results[1].outcome, ItemOutcome::Error { .. }));
    assert!(matches!(report.results[2].outcome, ItemOutcome::Verified { .. }));

    let summary = report.summary.expect("summary on completed batch");
    assert_eq!(summary.total, 3);
    assert_eq!(summary.compliant, 2);
    assert_eq!(summary.errors, 1);
}

#[tokio::test]
async fn batch_results_follow_discovery_order() {
    let h = harness().await;

    let archive = build_zip(&[
        ("c.jpg", sample_jpeg()),
        ("a.jpg", sample_jpeg()),
        ("b.jpg", sample_jpeg()),
    ]);
    let (job_id, _) = h.queue.submit_batch(archive).await.unwrap();

    assert!(h.worker.process_next().await.unwrap());

    let view = h.queue.status(job_id).await.unwrap();
    let Some(JobResult::Batch(report)) = view.result else {
        panic!("expected batch report");
    };
    let names: Vec<_> = report.results.iter().map(|r| r.image_path.as_str()).collect();
    assert_eq!(names, vec!["a.jpg", "b.jpg", "c.jpg"]);
}

#[tokio::test]
async fn cancelled_job_is_never_claimed() {
    let h = harness().await;
    let job_id = h
        .queue
        .submit_single(sample_jpeg(), "label.jpg", None)
        .await
        .unwrap();

    assert!(h.queue.cancel(job_id).await.unwrap());

    // The worker finds nothing to do and the verifier is never invoked.
    assert!(!h.worker.process_next().await.unwrap());
    assert_eq!(h.verifier.calls(), 0);
    assert_eq!(
        h.queue.status(job_id).await.unwrap().status,
        JobStatus::Cancelled
    );
}

#[tokio::test]
async fn cancellation_race_lost_after_claim() {
    let h = harness().await;
    let job_id = h
        .queue
        .submit_single(sample_jpeg(), "label.jpg", None)
        .await
        .unwrap();

    // Claim first, then try to cancel: the claim wins and the job proceeds.
    let claimed = h
        .store
        .claim_next_pending("test-worker")
        .await
        .unwrap()
        .expect("claim");
    assert_eq!(claimed.id, job_id);
    assert!(!h.queue.cancel(job_id).await.unwrap());

    let job = h.store.get(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Processing);
}

#[tokio::test]
async fn recovery_requeues_orphaned_job() {
    let h = harness().await;
    let job_id = h
        .queue
        .submit_single(sample_jpeg(), "label.jpg", None)
        .await
        .unwrap();

    // Simulate a crash: job claimed long ago, never finished.
    h.store.claim_next_pending("dead-worker").await.unwrap();
    backdate_claim(&h.store, job_id, Duration::from_secs(60)).await;

    let recovered = h.worker.recover().await.unwrap();
    assert_eq!(recovered, 1);

    let job = h.store.get(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert!(job.claimed_at.is_none());
    assert_eq!(job.attempt, 1, "reclaim preserves the attempt counter");

    // The requeued job can now run to completion.
    assert!(h.worker.process_next().await.unwrap());
    assert_eq!(
        h.queue.status(job_id).await.unwrap().status,
        JobStatus::Completed
    );
}

#[tokio::test]
async fn recovery_ignores_fresh_claims() {
    let h = harness().await;
    h.queue
        .submit_single(sample_jpeg(), "label.jpg", None)
        .await
        .unwrap();

    // Claimed just now: not reclaimable yet.
    h.store.claim_next_pending("busy-worker").await.unwrap();
    assert_eq!(h.worker.recover().await.unwrap(), 0);
}

#[tokio::test]
async fn recovery_fails_job_after_max_attempts() {
    let h = harness().await;
    let job_id = h
        .queue
        .submit_single(sample_jpeg(), "poisoned.jpg", None)
        .await
        .unwrap();

    // Crash three times in a row (max_attempts = 3).
    for _ in 0..3 {
        h.store
            .claim_next_pending("crashing-worker")
            .await
            .unwrap()
            .expect("claim");
        backdate_claim(&h.store, job_id, Duration::from_secs(60)).await;
        h.worker.recover().await.unwrap();
    }

    let job = h.store.get(job_id).await.unwrap().unwrap();
    assert_eq!(job.attempt, 3);
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some("exceeded max reclaim attempts"));
}

#[tokio::test]
async fn status_path_is_monotonic_for_single_job() {
    let h = harness().await;
    let job_id = h
        .queue
        .submit_single(sample_jpeg(), "label.jpg", None)
        .await
        .unwrap();
    assert_eq!(
        h.store.get(job_id).await.unwrap().unwrap().status,
        JobStatus::Pending
    );

    let claimed = h
        .store
        .claim_next_pending("test-worker")
        .await
        .unwrap()
        .expect("claim");
    assert_eq!(claimed.status, JobStatus::Processing);

    h.store
        .complete(job_id, &JobResult::Single(compliant_outcome(None, None)))
        .await
        .unwrap();
    let job = h.store.get(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.completed_at.is_some());

    // Terminal means terminal: a late cancel must not move the status.
    assert!(!h.store.cancel(job_id).await.unwrap());
    assert_eq!(
        h.store.get(job_id).await.unwrap().unwrap().status,
        JobStatus::Completed
    );
}

#[tokio::test]
async fn run_loop_drains_the_queue() {
    let h = harness().await;

    let first = h
        .queue
        .submit_single(sample_jpeg(), "one.jpg", None)
        .await
        .unwrap();
    let archive = build_zip(&[("a.jpg", sample_jpeg()), ("b.jpg", sample_jpeg())]);
    let (second, _) = h.queue.submit_batch(archive).await.unwrap();

    let loop_task = tokio::spawn(h.worker.run());

    assert_eq!(wait_for_terminal(&h.store, first).await, JobStatus::Completed);
    assert_eq!(wait_for_terminal(&h.store, second).await, JobStatus::Completed);
    assert_eq!(h.queue.queue_depth().await.unwrap(), 0);

    loop_task.abort();
}
