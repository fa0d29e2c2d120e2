mod common;

use runtime_core::repo::{ReconciliationJob, SessionRepo};
use runtime_core::storage::Storage;
use std::sync::Arc;

/// (I4/P5) exactly one of two concurrent admissions for the same public
/// dynamic id survives; the other is notified of displacement.
#[tokio::test]
async fn acquiring_a_held_slot_notifies_the_prior_holder() {
    let path = common::temp_storage_path("session-repo-displace");
    let storage = Arc::new(Storage::new(&path).unwrap());
    let repo = SessionRepo::load(storage).unwrap();

    let displaced = repo.active.acquire("pub-x", "session-1");
    assert!(displaced.is_none(), "first acquire has nothing to displace");

    let notify = repo
        .active
        .acquire("pub-x", "session-2")
        .expect("second acquire should displace the first");

    let wait = notify.notified();
    tokio::time::timeout(std::time::Duration::from_millis(50), wait)
        .await
        .expect("prior holder should be notified promptly");
}

#[test]
fn release_is_a_no_op_for_a_session_that_no_longer_holds_the_slot() {
    let path = common::temp_storage_path("session-repo-release-noop");
    let storage = Arc::new(Storage::new(&path).unwrap());
    let repo = SessionRepo::load(storage).unwrap();

    repo.active.acquire("pub-x", "session-1");
    repo.active.acquire("pub-x", "session-2");

    // session-1 was displaced; its delayed release must not clobber session-2's slot.
    repo.active.release("pub-x", "session-1");
    let displaced_by_late_release = repo.active.acquire("pub-x", "session-3");
    assert!(
        displaced_by_late_release.is_some(),
        "session-2 should still be holding the slot"
    );
}

#[test]
fn reconciliation_jobs_round_trip_through_storage() {
    let path = common::temp_storage_path("session-repo-jobs");
    let storage = Arc::new(Storage::new(&path).unwrap());
    let repo = SessionRepo::load(storage).unwrap();

    let job = ReconciliationJob {
        session_id: "s1".to_string(),
        provider_agent_id: "provider-agent-1".to_string(),
        start_time_unix: 100,
        end_time_unix: 200,
        tentative_provider_conversation_id: None,
        attempts: 0,
    };
    repo.enqueue_job(job.clone()).unwrap();

    let pending = repo.load_pending_jobs().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].session_id, "s1");

    repo.remove_job("s1").unwrap();
    assert!(repo.load_pending_jobs().unwrap().is_empty());
}
