// End-to-end tests: the matrix engine running against the SQLite collaborators.
//
// Every test seeds an in-memory database with observations and accumulation
// windows, then drives the engine through its public entry points.

use std::sync::Arc;

use dropstats_core::{
    DropMatrixElement, LastUpdateTimes, MatrixEngine, MatrixQuery, Server, StageItemRange, TimeRange, UpdateKey,
};
use dropstats_db::{Database, NewItemDrop};
use pretty_assertions::assert_eq;

const STAGE: &str = "main_01-07";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn seeded(windows: &[(&str, TimeRange)]) -> Arc<Database> {
    let db = Database::new_in_memory().await.unwrap();
    for (item_id, range) in windows {
        db.insert_drop_info(Server::Cn, &StageItemRange::new(STAGE, *item_id, range.clone()))
            .await
            .unwrap();
    }
    for drop in [
        NewItemDrop::new(Server::Cn, STAGE, "u1", 1000).with_drop("30012", 2),
        NewItemDrop::new(Server::Cn, STAGE, "u2", 1500).with_drop("30012", 1),
        NewItemDrop::new(Server::Cn, STAGE, "u1", 2000),
    ] {
        db.insert_item_drop(&drop).await.unwrap();
    }
    Arc::new(db)
}

fn engine_over(db: &Arc<Database>) -> MatrixEngine {
    MatrixEngine::new(db.clone(), db.clone(), db.clone(), Arc::new(LastUpdateTimes::new()))
}

fn summary(elements: &[DropMatrixElement]) -> Vec<(&str, i64, i64, i64, Option<i64>)> {
    elements
        .iter()
        .map(|el| (el.item_id.as_str(), el.quantity, el.times, el.start, el.end))
        .collect()
}

// ---------------------------------------------------------------------------
// Global matrix
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_current_matrix_zero_fills_from_drop_set() {
    let db = seeded(&[("30012", TimeRange::open(0)), ("30013", TimeRange::open(0))]).await;
    let engine = engine_over(&db);

    let result = engine.compute_global_matrix(Server::Cn, None, false, 5000).await.unwrap();
    assert_eq!(
        summary(&result),
        vec![("30012", 3, 3, 0, None), ("30013", 0, 3, 0, None)]
    );
    assert_eq!(engine.last_updates().get(&UpdateKey::CurrentMatrix(Server::Cn)), Some(5000));
    assert!(engine
        .compute_global_matrix(Server::Cn, None, true, 5000)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_personal_matrix_skips_freshness() {
    let db = seeded(&[("30012", TimeRange::open(0)), ("30013", TimeRange::open(0))]).await;
    let engine = engine_over(&db);

    let result = engine
        .compute_global_matrix(Server::Cn, Some("u2"), false, 5000)
        .await
        .unwrap();
    assert_eq!(
        summary(&result),
        vec![("30012", 1, 1, 0, None), ("30013", 0, 1, 0, None)]
    );
    assert_eq!(engine.last_updates().get(&UpdateKey::CurrentMatrix(Server::Cn)), None);
}

#[tokio::test]
async fn test_adjacent_windows_merge_into_one() {
    let db = seeded(&[
        ("30012", TimeRange::bounded(0, 1200)),
        ("30012", TimeRange::bounded(1200, 1800)),
        ("30012", TimeRange::open(1800)),
    ])
    .await;
    let engine = engine_over(&db);

    // All three records merge into one window still open at "now".
    let current = engine.compute_global_matrix(Server::Cn, None, false, 5000).await.unwrap();
    assert_eq!(summary(&current), vec![("30012", 3, 3, 0, None)]);
}

#[tokio::test]
async fn test_past_matrix_over_closed_window() {
    let db = seeded(&[("30012", TimeRange::bounded(0, 1800)), ("30013", TimeRange::open(1800))]).await;
    let engine = engine_over(&db);

    let past = engine.compute_global_matrix(Server::Cn, None, true, 5000).await.unwrap();
    assert_eq!(summary(&past), vec![("30012", 3, 2, 0, Some(1800))]);

    let current = engine.compute_global_matrix(Server::Cn, None, false, 5000).await.unwrap();
    assert_eq!(summary(&current), vec![("30013", 0, 1, 1800, None)]);
}

// ---------------------------------------------------------------------------
// Custom queries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_custom_query_splits_where_drop_set_changes() {
    let db = seeded(&[
        ("30012", TimeRange::open(0)),
        ("30013", TimeRange::open(0)),
        ("30014", TimeRange::bounded(0, 1800)),
    ])
    .await;
    let engine = engine_over(&db);

    let query = MatrixQuery::Custom {
        server: Server::Cn,
        stage_id: STAGE.to_string(),
        item_ids: Vec::new(),
        start: 0,
        end: Some(3000),
        user_ids: Vec::new(),
        interval: None,
    };
    let result = engine.execute(&query, None).await.unwrap();
    assert_eq!(
        summary(&result),
        vec![
            ("30012", 3, 3, 0, Some(3000)),
            ("30013", 0, 3, 0, Some(3000)),
            ("30014", 0, 2, 0, Some(1800)),
        ]
    );
}

#[tokio::test]
async fn test_custom_query_with_interval_buckets_observations() {
    let db = seeded(&[("30012", TimeRange::open(0))]).await;
    let engine = engine_over(&db);

    let query = MatrixQuery::Custom {
        server: Server::Cn,
        stage_id: STAGE.to_string(),
        item_ids: Vec::new(),
        start: 1000,
        end: Some(3000),
        user_ids: Vec::new(),
        interval: Some(1000),
    };
    let result = engine.execute(&query, None).await.unwrap();
    assert_eq!(
        summary(&result),
        vec![("30012", 3, 2, 1000, Some(2000)), ("30012", 0, 1, 2000, Some(3000))]
    );
}

#[tokio::test]
async fn test_deleted_and_unreliable_drops_are_ignored() {
    let db = seeded(&[("30012", TimeRange::open(0))]).await;
    let id = db
        .insert_item_drop(&NewItemDrop::new(Server::Cn, STAGE, "u3", 2500).with_drop("30012", 7))
        .await
        .unwrap();
    db.insert_item_drop(
        &NewItemDrop::new(Server::Cn, STAGE, "u3", 2600)
            .with_drop("30012", 7)
            .unreliable(),
    )
    .await
    .unwrap();
    db.delete_item_drop("u3", id).await.unwrap();

    let result = engine_over(&db)
        .compute_global_matrix(Server::Cn, None, false, 5000)
        .await
        .unwrap();
    assert_eq!(summary(&result), vec![("30012", 3, 3, 0, None)]);
}
