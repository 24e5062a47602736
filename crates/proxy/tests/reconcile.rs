//! Reconciliation pass behaviour against a scripted backend

mod common;

use common::{proxy_for, snapshot_at, snapshot_bp, ScriptedBackend};
use proxy::{HitState, ProxyError, ProxyEvent};
use stakeout_core::{BackendError, ListBreakpointsResponse};
use tokio::sync::broadcast::error::TryRecvError;

#[tokio::test]
async fn test_newly_final_breakpoint_is_hit_and_notified() {
    let backend = ScriptedBackend::new();
    let proxy = proxy_for(backend.clone(), 10);
    let mut events = proxy.subscribe();

    let b1 = proxy.set_breakpoint(&snapshot_at("/a.js", 1)).await.unwrap();
    let b2 = proxy.set_breakpoint(&snapshot_at("/a.js", 2)).await.unwrap();
    backend.finalize(&b2.id);
    backend.push_list(&[b1.id.as_str()], "t1");

    let report = proxy.update_pending_breakpoints(true).await.unwrap();

    assert_eq!(report.hit, vec![b2.id.clone()]);
    assert_eq!(report.pending, vec![b1.id.clone()]);
    assert!(report.evicted.is_empty());
    assert!(report.notified());
    assert_eq!(events.try_recv(), Ok(ProxyEvent::BreakpointHit));
    assert_eq!(events.try_recv(), Err(TryRecvError::Empty));

    assert_eq!(proxy.registry().get(&b1.id).unwrap().state(), HitState::Pending);
    let hit = proxy.breakpoints(HitState::Hit);
    assert_eq!(hit.len(), 1);
    assert_eq!(hit[0].id, b2.id);
    assert_eq!(hit[0].stack_frames.len(), 1);
    assert_eq!(backend.gets(), vec![b2.id.clone()]);
}

#[tokio::test]
async fn test_externally_removed_breakpoint_is_evicted_and_deleted() {
    let backend = ScriptedBackend::new();
    let proxy = proxy_for(backend.clone(), 10);
    let mut events = proxy.subscribe();

    let b1 = proxy.set_breakpoint(&snapshot_at("/a.js", 1)).await.unwrap();
    backend.push_list(&[], "t1");

    let report = proxy.update_pending_breakpoints(true).await.unwrap();
    assert_eq!(report.evicted, vec![b1.id.clone()]);
    assert!(report.hit.is_empty());

    let summary = report.cleanup.wait().await;
    assert_eq!(summary.deleted, 1);
    assert_eq!(summary.failed, 0);

    assert!(!proxy.is_owned(&b1.id));
    assert_eq!(backend.deletes(), vec![b1.id.clone()]);
    assert_eq!(events.try_recv(), Err(TryRecvError::Empty));
}

#[tokio::test]
async fn test_long_poll_aborts_are_retried_transparently() {
    let backend = ScriptedBackend::new();
    let proxy = proxy_for(backend.clone(), 10);
    let b1 = proxy.set_breakpoint(&snapshot_at("/a.js", 1)).await.unwrap();

    for _ in 0..3 {
        backend.push_list_error(BackendError::Aborted);
    }
    backend.push_list(&[b1.id.as_str()], "t1");

    let report = proxy.update_pending_breakpoints(true).await.unwrap();
    assert_eq!(report.retries, 3);
    assert_eq!(report.pending, vec![b1.id.clone()]);
    assert_eq!(backend.tokens().len(), 4);
    assert!(proxy.is_owned(&b1.id));
}

#[tokio::test]
async fn test_other_list_errors_abort_the_pass() {
    let backend = ScriptedBackend::new();
    let proxy = proxy_for(backend.clone(), 10);
    let b1 = proxy.set_breakpoint(&snapshot_at("/a.js", 1)).await.unwrap();
    backend.finalize(&b1.id);

    backend.push_list_error(BackendError::Transport("502".to_string()));
    let err = proxy.update_pending_breakpoints(true).await.unwrap_err();

    assert!(matches!(err, ProxyError::Backend(BackendError::Transport(_))));
    assert_eq!(backend.tokens().len(), 1);
    assert!(backend.gets().is_empty());
    assert_eq!(proxy.registry().get(&b1.id).unwrap().state(), HitState::Pending);
}

#[tokio::test]
async fn test_wait_token_is_echoed_only_when_blocking() {
    let backend = ScriptedBackend::new();
    let proxy = proxy_for(backend.clone(), 10);

    backend.push_list(&[], "t1");
    backend.push_list(&[], "t2");
    backend.push_list(&[], "t3");
    backend.push_list(&[], "t4");

    proxy.update_pending_breakpoints(true).await.unwrap();
    proxy.update_pending_breakpoints(true).await.unwrap();
    proxy.update_pending_breakpoints(false).await.unwrap();
    proxy.update_pending_breakpoints(true).await.unwrap();

    assert_eq!(backend.tokens(), vec!["", "t1", "", "t3"]);
}

#[tokio::test]
async fn test_foreign_breakpoints_are_never_touched() {
    let backend = ScriptedBackend::new();
    let proxy = proxy_for(backend.clone(), 10);
    let b1 = proxy.set_breakpoint(&snapshot_at("/a.js", 1)).await.unwrap();

    let mut foreign = snapshot_bp("someone-elses", "/a.js", 9);
    foreign.user_email = Some("other@example.com".to_string());
    backend.set_remote(foreign);
    backend.push_list(&[b1.id.as_str(), "someone-elses"], "t1");
    backend.push_list(&[b1.id.as_str()], "t2");

    proxy.update_pending_breakpoints(true).await.unwrap();
    let report = proxy.update_pending_breakpoints(true).await.unwrap();

    assert!(!proxy.is_owned("someone-elses"));
    assert!(report.evicted.is_empty());
    assert!(backend.gets().is_empty());
    assert!(backend.deletes().is_empty());
    assert!(backend.remote("someone-elses").is_some());
}

#[tokio::test]
async fn test_failed_get_aborts_pass_without_mutation() {
    let backend = ScriptedBackend::new();
    let proxy = proxy_for(backend.clone(), 10);
    let mut events = proxy.subscribe();

    let b1 = proxy.set_breakpoint(&snapshot_at("/a.js", 1)).await.unwrap();
    let b2 = proxy.set_breakpoint(&snapshot_at("/a.js", 2)).await.unwrap();
    backend.finalize(&b1.id);
    backend.fail_get(&b2.id, BackendError::Transport("reset".to_string()));
    backend.push_list(&[], "t1");

    let err = proxy.update_pending_breakpoints(true).await.unwrap_err();
    assert!(matches!(err, ProxyError::Backend(BackendError::Transport(_))));

    assert!(proxy.breakpoints(HitState::Hit).is_empty());
    assert_eq!(proxy.breakpoints(HitState::Pending).len(), 2);
    assert!(backend.deletes().is_empty());
    assert_eq!(events.try_recv(), Err(TryRecvError::Empty));
}

#[tokio::test]
async fn test_one_notification_for_many_hits() {
    let backend = ScriptedBackend::new();
    let proxy = proxy_for(backend.clone(), 2);
    let mut events = proxy.subscribe();

    let mut ids = Vec::new();
    for line in 1..=5 {
        let bp = proxy.set_breakpoint(&snapshot_at("/a.js", line)).await.unwrap();
        backend.finalize(&bp.id);
        ids.push(bp.id);
    }
    backend.push_list(&[], "t1");

    let mut report = proxy.update_pending_breakpoints(true).await.unwrap();
    report.hit.sort();
    ids.sort();

    assert_eq!(report.hit, ids);
    assert_eq!(events.try_recv(), Ok(ProxyEvent::BreakpointHit));
    assert_eq!(events.try_recv(), Err(TryRecvError::Empty));
}

#[tokio::test]
async fn test_already_hit_breakpoint_is_not_reported_again() {
    let backend = ScriptedBackend::new();
    let proxy = proxy_for(backend.clone(), 10);
    let mut events = proxy.subscribe();

    let b1 = proxy.set_breakpoint(&snapshot_at("/a.js", 1)).await.unwrap();
    backend.finalize(&b1.id);
    backend.push_list(&[], "t1");
    backend.push_list(&[], "t2");

    assert_eq!(proxy.update_pending_breakpoints(true).await.unwrap().hit.len(), 1);
    let second = proxy.update_pending_breakpoints(true).await.unwrap();

    assert!(second.hit.is_empty());
    assert_eq!(events.try_recv(), Ok(ProxyEvent::BreakpointHit));
    assert_eq!(events.try_recv(), Err(TryRecvError::Empty));
    assert_eq!(proxy.registry().get(&b1.id).unwrap().state(), HitState::Hit);
}

#[tokio::test]
async fn test_divergent_final_snapshot_is_an_invariant_violation() {
    let backend = ScriptedBackend::new();
    let proxy = proxy_for(backend.clone(), 10);

    let b1 = proxy.set_breakpoint(&snapshot_at("/a.js", 1)).await.unwrap();
    backend.finalize(&b1.id);
    backend.push_list(&[], "t1");
    proxy.update_pending_breakpoints(true).await.unwrap();

    let mut changed = backend.remote(&b1.id).unwrap();
    changed.stack_frames.clear();
    backend.set_remote(changed);
    backend.push_list(&[], "t2");

    let err = proxy.update_pending_breakpoints(true).await.unwrap_err();
    assert!(matches!(err, ProxyError::Invariant(_)));
    assert_eq!(proxy.registry().get(&b1.id).unwrap().state(), HitState::Hit);
}

#[tokio::test]
async fn test_hit_breakpoint_listed_as_pending_is_an_invariant_violation() {
    let backend = ScriptedBackend::new();
    let proxy = proxy_for(backend.clone(), 10);

    let b1 = proxy.set_breakpoint(&snapshot_at("/a.js", 1)).await.unwrap();
    backend.finalize(&b1.id);
    backend.push_list(&[], "t1");
    proxy.update_pending_breakpoints(true).await.unwrap();

    let mut regressed = backend.remote(&b1.id).unwrap();
    regressed.is_final_state = false;
    backend.push_list_raw(ListBreakpointsResponse {
        breakpoints: vec![regressed],
        next_wait_token: "t2".to_string(),
    });

    let err = proxy.update_pending_breakpoints(true).await.unwrap_err();
    assert!(matches!(err, ProxyError::Invariant(_)));
    assert!(proxy.registry().get(&b1.id).unwrap().is_hit());
}

#[tokio::test]
async fn test_malformed_list_entry_rejects_whole_response() {
    let backend = ScriptedBackend::new();
    let proxy = proxy_for(backend.clone(), 10);
    let b1 = proxy.set_breakpoint(&snapshot_at("/a.js", 1)).await.unwrap();

    backend.push_list_raw(ListBreakpointsResponse {
        breakpoints: vec![snapshot_bp("other", "", 3)],
        next_wait_token: "t1".to_string(),
    });

    let err = proxy.update_pending_breakpoints(true).await.unwrap_err();
    assert!(matches!(err, ProxyError::Validation(_)));
    assert!(backend.gets().is_empty());
    assert!(proxy.is_owned(&b1.id));

    // The token from a rejected response is not adopted
    backend.push_list(&[b1.id.as_str()], "t2");
    proxy.update_pending_breakpoints(true).await.unwrap();
    assert_eq!(backend.tokens(), vec!["", ""]);
}

#[tokio::test]
async fn test_unknown_breakpoint_during_resolve_aborts_pass() {
    let backend = ScriptedBackend::new();
    let proxy = proxy_for(backend.clone(), 10);
    let mut events = proxy.subscribe();
    let b1 = proxy.set_breakpoint(&snapshot_at("/a.js", 1)).await.unwrap();

    backend.fail_get(&b1.id, BackendError::NotFound(b1.id.clone()));
    backend.push_list(&[], "t1");

    let err = proxy.update_pending_breakpoints(true).await.unwrap_err();
    assert!(matches!(err, ProxyError::Backend(BackendError::NotFound(_))));
    assert_eq!(proxy.registry().get(&b1.id).unwrap().state(), HitState::Pending);
    assert!(backend.deletes().is_empty());
    assert_eq!(events.try_recv(), Err(TryRecvError::Empty));
}

#[tokio::test]
async fn test_hit_breakpoint_is_rechecked_until_removed_locally() {
    let backend = ScriptedBackend::new();
    let proxy = proxy_for(backend.clone(), 10);
    let b1 = proxy.set_breakpoint(&snapshot_at("/a.js", 1)).await.unwrap();
    backend.finalize(&b1.id);
    backend.push_list(&[], "t1");
    backend.push_list(&[], "t2");
    proxy.update_pending_breakpoints(true).await.unwrap();
    proxy.update_pending_breakpoints(true).await.unwrap();
    assert_eq!(backend.gets(), vec![b1.id.clone(), b1.id.clone()]);

    // Server copy vanished: the pass fails and the snapshot is kept
    backend.fail_get(&b1.id, BackendError::NotFound(b1.id.clone()));
    backend.push_list(&[], "t3");
    let err = proxy.update_pending_breakpoints(true).await.unwrap_err();
    assert!(matches!(err, ProxyError::Backend(BackendError::NotFound(_))));
    assert!(proxy.registry().get(&b1.id).unwrap().is_hit());

    proxy.remove_breakpoint(&b1.id).await.unwrap();
    backend.push_list(&[], "t4");
    proxy.update_pending_breakpoints(true).await.unwrap();
    assert_eq!(backend.gets().len(), 3);
}

#[tokio::test]
async fn test_failed_cleanup_delete_does_not_fail_pass() {
    let backend = ScriptedBackend::new();
    let proxy = proxy_for(backend.clone(), 2);
    let b1 = proxy.set_breakpoint(&snapshot_at("/a.js", 1)).await.unwrap();
    let b2 = proxy.set_breakpoint(&snapshot_at("/a.js", 2)).await.unwrap();
    let b3 = proxy.set_breakpoint(&snapshot_at("/a.js", 3)).await.unwrap();

    backend.fail_delete(&b2.id, BackendError::Transport("reset".to_string()));
    backend.fail_delete(&b3.id, BackendError::NotFound(b3.id.clone()));
    backend.push_list(&[], "t1");

    let mut report = proxy.update_pending_breakpoints(true).await.unwrap();
    report.evicted.sort();
    assert_eq!(report.evicted, vec![b1.id.clone(), b2.id.clone(), b3.id.clone()]);
    assert!(!report.cleanup.is_empty());

    let summary = report.cleanup.wait().await;
    assert_eq!(summary.deleted, 2);
    assert_eq!(summary.failed, 1);
    assert!(proxy.registry().is_empty());
}

#[tokio::test]
async fn test_pending_snapshot_refreshed_from_list() {
    let backend = ScriptedBackend::new();
    let proxy = proxy_for(backend.clone(), 10);
    let b1 = proxy.set_breakpoint(&snapshot_at("/a.js", 1)).await.unwrap();

    let mut updated = backend.remote(&b1.id).unwrap();
    updated.labels.insert("agent".to_string(), "seen".to_string());
    backend.set_remote(updated.clone());
    backend.push_list(&[b1.id.as_str()], "t1");

    proxy.update_pending_breakpoints(true).await.unwrap();
    assert_eq!(proxy.registry().get(&b1.id).unwrap().breakpoint(), &updated);
}

#[tokio::test]
async fn test_no_debuggee_selected() {
    let backend = ScriptedBackend::new();
    let proxy = proxy::DebugProxy::new(backend.clone());

    assert!(matches!(
        proxy.update_pending_breakpoints(true).await,
        Err(ProxyError::NoDebuggee)
    ));
    assert!(backend.tokens().is_empty());
}
