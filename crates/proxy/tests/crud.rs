mod common;

use common::{proxy_for, snapshot_at, ScriptedBackend};
use proxy::{HitState, ProxyError};
use stakeout_core::{BackendError, BreakpointRequest, LogLevel, SourceLocation};

#[tokio::test]
async fn test_remove_pending_for_file_keeps_hit_and_other_files() {
    let backend = ScriptedBackend::new();
    let proxy = proxy_for(backend.clone(), 10);

    let b1 = proxy.set_breakpoint(&snapshot_at("/a.js", 1)).await.unwrap();
    let b2 = proxy.set_breakpoint(&snapshot_at("/a.js", 2)).await.unwrap();
    let b3 = proxy.set_breakpoint(&snapshot_at("/b.js", 3)).await.unwrap();

    backend.finalize(&b2.id);
    backend.push_list(&[b1.id.as_str(), b3.id.as_str()], "t1");
    let report = proxy.update_pending_breakpoints(true).await.unwrap();
    assert_eq!(report.hit, vec![b2.id.clone()]);

    let removed = proxy.remove_pending_breakpoints_for_file("/a.js").await.unwrap();

    assert_eq!(removed, vec![b1.id.clone()]);
    assert_eq!(backend.deletes(), vec![b1.id.clone()]);
    assert!(!proxy.is_owned(&b1.id));
    assert_eq!(proxy.registry().get(&b2.id).unwrap().state(), HitState::Hit);
    assert_eq!(proxy.registry().get(&b3.id).unwrap().state(), HitState::Pending);
}

#[tokio::test]
async fn test_remove_pending_for_unknown_file_is_noop() {
    let backend = ScriptedBackend::new();
    let proxy = proxy_for(backend.clone(), 10);
    proxy.set_breakpoint(&snapshot_at("/a.js", 1)).await.unwrap();

    let removed = proxy.remove_pending_breakpoints_for_file("/missing.js").await.unwrap();
    assert!(removed.is_empty());
    assert!(backend.deletes().is_empty());
    assert_eq!(proxy.registry().len(), 1);
}

#[tokio::test]
async fn test_set_then_remove_deletes_once() {
    let backend = ScriptedBackend::new();
    let proxy = proxy_for(backend.clone(), 10);

    let bp = proxy.set_breakpoint(&snapshot_at("/a.js", 7)).await.unwrap();
    assert!(proxy.is_owned(&bp.id));
    assert_eq!(proxy.registry().get(&bp.id).unwrap().state(), HitState::Pending);

    proxy.remove_breakpoint(&bp.id).await.unwrap();

    assert!(!proxy.is_owned(&bp.id));
    assert_eq!(backend.deletes(), vec![bp.id.clone()]);
    assert!(backend.remote(&bp.id).is_none());
}

#[tokio::test]
async fn test_remove_unowned_breakpoint_is_rejected() {
    let backend = ScriptedBackend::new();
    let proxy = proxy_for(backend.clone(), 10);

    assert!(matches!(
        proxy.remove_breakpoint("nope").await,
        Err(ProxyError::NotOwned(_))
    ));
    assert!(backend.deletes().is_empty());
}

#[tokio::test]
async fn test_get_breakpoint_is_idempotent() {
    let backend = ScriptedBackend::new();
    let proxy = proxy_for(backend.clone(), 10);
    let bp = proxy.set_breakpoint(&snapshot_at("/a.js", 4)).await.unwrap();

    let first = proxy.get_breakpoint(&bp.id).await.unwrap();
    let second = proxy.get_breakpoint(&bp.id).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first, bp);
    assert_eq!(backend.gets().len(), 2);
    assert_eq!(proxy.registry().get(&bp.id).unwrap().state(), HitState::Pending);
}

#[tokio::test]
async fn test_get_breakpoint_requires_ownership() {
    let backend = ScriptedBackend::new();
    let proxy = proxy_for(backend.clone(), 10);

    assert!(matches!(
        proxy.get_breakpoint("b99").await,
        Err(ProxyError::NotOwned(_))
    ));
    assert!(backend.gets().is_empty());
}

#[tokio::test]
async fn test_get_breakpoint_surfaces_backend_errors() {
    let backend = ScriptedBackend::new();
    let proxy = proxy_for(backend.clone(), 10);
    let bp = proxy.set_breakpoint(&snapshot_at("/a.js", 4)).await.unwrap();
    backend.fail_get(&bp.id, BackendError::Unauthorized("expired".to_string()));

    assert!(matches!(
        proxy.get_breakpoint(&bp.id).await,
        Err(ProxyError::Backend(BackendError::Unauthorized(_)))
    ));
    assert!(proxy.is_owned(&bp.id));
}

#[tokio::test]
async fn test_logpoint_requires_format() {
    let backend = ScriptedBackend::new();
    let proxy = proxy_for(backend.clone(), 10);

    let missing = BreakpointRequest::logpoint(SourceLocation::new("/a.js", 2), "", LogLevel::Info);
    assert!(matches!(
        proxy.set_breakpoint(&missing).await,
        Err(ProxyError::Validation(_))
    ));

    let logpoint = BreakpointRequest::logpoint(
        SourceLocation::new("/a.js", 2).with_column(5),
        "x = $0",
        LogLevel::Warning,
    )
    .with_expressions(["x"]);
    let bp = proxy.set_breakpoint(&logpoint).await.unwrap();

    assert_eq!(bp.request(), logpoint);
    assert_eq!(proxy.registry().len(), 1);
}

#[tokio::test]
async fn test_remove_all_clears_registry() {
    let backend = ScriptedBackend::new();
    let proxy = proxy_for(backend.clone(), 3);
    for line in 1..=6 {
        proxy.set_breakpoint(&snapshot_at("/a.js", line)).await.unwrap();
    }

    assert_eq!(proxy.remove_all_breakpoints().await.unwrap(), 6);
    assert!(proxy.registry().is_empty());

    let mut deleted = backend.deletes();
    deleted.sort();
    let mut expected: Vec<String> = (1..=6).map(|n| format!("b{}", n)).collect();
    expected.sort();
    assert_eq!(deleted, expected);
}
