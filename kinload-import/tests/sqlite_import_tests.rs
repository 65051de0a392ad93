//! Integration tests against an on-disk SQLite database
//!
//! Exercises the production pairing: `SqliteStore` for entities and links,
//! `SessionRepository` for checkpoints, both on one pool.

mod helpers;

use helpers::*;
use kinload_import::db::SessionRepository;
use kinload_import::{
    BatchLimits, ConflictPolicy, EntityKind, ImportOptions, ImportOrchestrator, ImportState,
    SqliteStore, StepOutcome,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_import_persists_entities_and_links() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let store = Arc::new(SqliteStore::new(pool.clone()));
    let sessions = Arc::new(SessionRepository::new(pool.clone()));

    let text = family_tree(&TreeConfig {
        individuals: 7,
        families: 3,
        ..TreeConfig::default()
    });
    let result = run_import(text, ImportOptions::default(), store.clone(), sessions.clone()).await;

    assert!(result.completed);
    assert!(result.errors.is_empty(), "unexpected errors: {:?}", result.errors);
    assert_eq!(store.count(EntityKind::Individual, "tree").await.unwrap(), 7);
    assert_eq!(store.count(EntityKind::Family, "tree").await.unwrap(), 3);
    assert_eq!(store.count(EntityKind::Header, "tree").await.unwrap(), 1);

    let links = store.links("tree").await.unwrap();
    assert_eq!(links.len(), 9);
    assert!(links.iter().all(|l| l.to_id.is_some()));

    // Birth and death per individual, marriage per family
    let events = store.events("tree").await.unwrap();
    assert_eq!(events.len(), 17);
    assert_eq!(result.statistics.events_written, 17);
    assert!(events.iter().all(|e| e.date_jd.is_some()));

    // A completed session leaves no checkpoint behind
    assert!(sessions.list_active().await.unwrap().is_empty());
    assert!(sessions.load(result.session_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_dates_stored_with_ordinals() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let store = Arc::new(SqliteStore::new(pool.clone()));
    let sessions = Arc::new(SessionRepository::new(pool));

    let text = "0 HEAD\n0 @I1@ INDI\n1 BIRT\n2 DATE abt 15 mar 1990\n0 @I2@ INDI\n1 BIRT\n2 DATE @#DJULIAN@ 2 MAR 1990\n0 TRLR\n";
    run_import(text, ImportOptions::default(), store.clone(), sessions).await;

    let rows: Vec<(String, String, i64)> = sqlx::query_as(
        "SELECT xref, birth_date, birth_date_jd FROM individuals WHERE collection = 'tree' ORDER BY xref",
    )
    .fetch_all(store.pool())
    .await
    .unwrap();

    assert_eq!(rows[0].1, "ABT 15 MAR 1990");
    assert_eq!(rows[1].1, "@#DJULIAN@ 2 MAR 1990");
    // Julian 2 March 1990 is Gregorian 15 March 1990
    assert_eq!(rows[0].2, rows[1].2);
}

#[tokio::test]
async fn test_resume_through_session_repository() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let store = Arc::new(SqliteStore::new(pool.clone()));
    let sessions = Arc::new(SessionRepository::new(pool.clone()));
    let source = individuals(30);

    let mut orchestrator = ImportOrchestrator::start(
        source.clone().into_bytes(),
        "tree",
        ImportOptions::default(),
        store.clone(),
        sessions.clone(),
    )
    .await
    .unwrap();
    let session_id = orchestrator.session().session_id;
    let outcome = orchestrator
        .run_batch(BatchLimits::new(11, Duration::from_secs(60)))
        .await
        .unwrap();
    assert!(matches!(outcome, StepOutcome::Suspended(_)));
    drop(orchestrator);

    let active = sessions.list_active().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].session_id, session_id);
    assert_eq!(active[0].state, "PARSING");

    let checkpoint = sessions.load(session_id).await.unwrap().unwrap();
    let mut resumed =
        ImportOrchestrator::resume(&checkpoint, source.into_bytes(), store.clone(), sessions.clone())
            .unwrap();
    let result = resumed.run_to_completion(BatchLimits::unbounded()).await.unwrap();

    assert!(result.completed);
    assert_eq!(result.statistics.count(EntityKind::Individual), 30);
    assert_eq!(store.count(EntityKind::Individual, "tree").await.unwrap(), 30);
}

#[tokio::test]
async fn test_replace_and_merge_on_sqlite() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let store = Arc::new(SqliteStore::new(pool.clone()));
    let sessions = Arc::new(SessionRepository::new(pool));

    run_import(individuals(8), ImportOptions::default(), store.clone(), sessions.clone()).await;
    run_import(
        individuals(5),
        ImportOptions::with_policy(ConflictPolicy::Replace),
        store.clone(),
        sessions.clone(),
    )
    .await;
    assert_eq!(store.count(EntityKind::Individual, "tree").await.unwrap(), 5);

    let renamed = "0 HEAD\n0 @I1@ INDI\n1 NAME Renamed /Person/\n0 TRLR\n";
    run_import(
        renamed,
        ImportOptions::with_policy(ConflictPolicy::Merge),
        store.clone(),
        sessions,
    )
    .await;
    assert_eq!(store.count(EntityKind::Individual, "tree").await.unwrap(), 5);

    let id: i64 = sqlx::query_scalar(
        "SELECT id FROM individuals WHERE collection = 'tree' AND xref = 'I1'",
    )
    .fetch_one(store.pool())
    .await
    .unwrap();
    let name = store
        .text_field(EntityKind::Individual, kinload_import::store::StorageId(id), "full_name")
        .await
        .unwrap();
    assert_eq!(name.as_deref(), Some("Renamed Person"));

    // The merged record carries no events, so the old ones are gone
    let events = store.events("tree").await.unwrap();
    assert!(events.iter().all(|e| e.owner_id.0 != id));
    assert_eq!(events.len(), 8);
}

#[tokio::test]
async fn test_abort_removes_session_row() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let store = Arc::new(SqliteStore::new(pool.clone()));
    let sessions = Arc::new(SessionRepository::new(pool));

    let mut orchestrator = ImportOrchestrator::start(
        individuals(20).into_bytes(),
        "tree",
        ImportOptions::default(),
        store,
        sessions.clone(),
    )
    .await
    .unwrap();
    orchestrator
        .run_batch(BatchLimits::new(5, Duration::from_secs(60)))
        .await
        .unwrap();

    let result = orchestrator.abort().await.unwrap();
    assert_eq!(result.state, ImportState::Cancelled);
    assert!(sessions.load(result.session_id).await.unwrap().is_none());
}
