//! Integration tests for `NotificationStore` persistence and polling rules.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use common::{memory_store, serve_silent, GatedSource, ScriptedSource, STORE};
use quantdash_notifications::{
    CheckOutcome, EtfUpdatesApi, FileStorage, MemoryStorage, NotificationError, NotificationStore,
    StateStorage, UpdatesApiError,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

// ---------------------------------------------------------------------------
// Test: the id set survives a save/load cycle as a set
// ---------------------------------------------------------------------------

#[tokio::test]
async fn id_set_round_trips_through_file_storage() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let source = ScriptedSource::new();
    source.set_flagged(&["7", "12"]);

    {
        let storage = Arc::new(FileStorage::new(&path));
        let store = NotificationStore::load(STORE, source.clone(), storage).await.unwrap();
        store.check_for_updates().await.unwrap();
    }

    let on_disk: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(on_disk[STORE]["version"], 0);
    assert_eq!(on_disk[STORE]["state"]["updatedIds"], json!(["12", "7"]));

    let storage = Arc::new(FileStorage::new(&path));
    let reloaded = NotificationStore::load(STORE, source, storage).await.unwrap();
    let snapshot = reloaded.snapshot();
    assert_eq!(snapshot.updated_ids.len(), 2);
    assert!(reloaded.has_update("7"));
    assert!(reloaded.has_update("12"));
    assert!(snapshot.has_updates);
    // Transient fields start fresh.
    assert!(snapshot.last_checked_at.is_none());
    assert!(!snapshot.is_checking);
}

// ---------------------------------------------------------------------------
// Test: duplicate ids in a stored record collapse, hasUpdates is recomputed
// ---------------------------------------------------------------------------

#[tokio::test]
async fn load_collapses_duplicates_and_ignores_stored_flag() {
    let storage = Arc::new(MemoryStorage::new());
    storage
        .insert(
            STORE,
            json!({
                "state": {
                    "lastViewedAt": "2026-02-01T08:00:00Z",
                    "updatedIds": ["7", "7", "12"],
                    "hasUpdates": false
                },
                "version": 0
            }),
        )
        .await;

    let store = NotificationStore::load(STORE, ScriptedSource::new(), storage)
        .await
        .unwrap();

    let snapshot = store.snapshot();
    assert_eq!(snapshot.updated_ids.len(), 2);
    assert!(snapshot.has_updates);
    assert!(snapshot.last_viewed_at.is_some());
}

#[tokio::test]
async fn stored_empty_set_with_true_flag_loads_as_no_updates() {
    let storage = Arc::new(MemoryStorage::new());
    storage
        .insert(STORE, json!({"state": {"updatedIds": [], "hasUpdates": true}, "version": 0}))
        .await;

    let store = NotificationStore::load(STORE, ScriptedSource::new(), storage)
        .await
        .unwrap();

    assert!(!store.snapshot().has_updates);
}

// ---------------------------------------------------------------------------
// Test: check passes last_viewed_at as `since`
// ---------------------------------------------------------------------------

#[tokio::test]
async fn check_sends_last_viewed_at() {
    let source = ScriptedSource::new();
    let (store, _storage) = memory_store(source.clone()).await;

    store.check_for_updates().await.unwrap();
    store.mark_as_viewed().await.unwrap();
    let viewed_at = store.snapshot().last_viewed_at;
    store.check_for_updates().await.unwrap();

    let since = source.since_args();
    assert_eq!(since.len(), 2);
    assert_eq!(since[0], None);
    assert_eq!(since[1], viewed_at);
}

// ---------------------------------------------------------------------------
// Test: mark_as_viewed and clear_update
// ---------------------------------------------------------------------------

#[tokio::test]
async fn mark_as_viewed_clears_and_persists() {
    let source = ScriptedSource::new();
    source.set_flagged(&["7", "12"]);
    let (store, storage) = memory_store(source.clone()).await;
    store.check_for_updates().await.unwrap();

    store.mark_as_viewed().await.unwrap();

    let snapshot = store.snapshot();
    assert!(snapshot.updated_ids.is_empty());
    assert!(!snapshot.has_updates);
    assert!(snapshot.last_viewed_at.is_some());
    let saved = storage.load(STORE).await.unwrap().unwrap();
    assert_eq!(saved["state"]["updatedIds"], json!([]));
    assert_eq!(saved["state"]["hasUpdates"], false);
    assert!(saved["state"]["lastViewedAt"].is_string());
    // Viewing makes no request.
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn clear_update_removes_one_id() {
    let source = ScriptedSource::new();
    source.set_flagged(&["7", "12"]);
    let (store, storage) = memory_store(source).await;
    store.check_for_updates().await.unwrap();

    assert!(store.clear_update("7").await.unwrap());

    assert!(!store.has_update("7"));
    assert!(store.has_update("12"));
    assert!(store.snapshot().has_updates);
    let saved = storage.load(STORE).await.unwrap().unwrap();
    assert_eq!(saved["state"]["updatedIds"], json!(["12"]));

    assert!(store.clear_update("12").await.unwrap());
    assert!(!store.snapshot().has_updates);
}

// ---------------------------------------------------------------------------
// Test: a failed check keeps the flagged ids
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_check_preserves_ids_and_records_error() {
    let source = ScriptedSource::new();
    source.set_flagged(&["7"]);
    let (store, storage) = memory_store(source.clone()).await;
    store.check_for_updates().await.unwrap();
    let saved_before = storage.load(STORE).await.unwrap();

    source.set_failing(true);
    let result = store.check_for_updates().await;

    assert_matches!(result, Err(NotificationError::Check(_)));
    let snapshot = store.snapshot();
    assert!(snapshot.updated_ids.contains("7"));
    assert!(snapshot.error.as_deref().unwrap().contains("upstream unavailable"));
    assert!(!snapshot.is_checking);
    assert_eq!(storage.load(STORE).await.unwrap(), saved_before);

    // The next successful check clears the error.
    source.set_failing(false);
    store.check_for_updates().await.unwrap();
    assert!(store.snapshot().error.is_none());
}

// ---------------------------------------------------------------------------
// Test: overlapping checks make exactly one request
// ---------------------------------------------------------------------------

#[tokio::test]
async fn overlapping_checks_make_one_request() {
    let source = Arc::new(GatedSource::default());
    let (store, _storage) = memory_store(source.clone()).await;

    let first = tokio::spawn({
        let store = Arc::clone(&store);
        async move { store.check_for_updates().await }
    });
    source.entered.notified().await;
    assert!(store.snapshot().is_checking);

    let second = store.check_for_updates().await.unwrap();
    assert_eq!(second, CheckOutcome::Skipped);

    source.release.notify_one();
    let first = first.await.unwrap().unwrap();
    assert_eq!(first, CheckOutcome::Checked { updated: 1 });
    assert_eq!(source.calls(), 1);
    assert!(!store.snapshot().is_checking);
}

// ---------------------------------------------------------------------------
// Test: a check whose caller gives up still lands, then frees the next check
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn abandoned_check_is_applied_on_arrival() {
    let source = Arc::new(GatedSource::default());
    let (store, storage) = memory_store(source.clone()).await;
    let mut snapshots = store.subscribe();

    let abandoned = tokio::time::timeout(Duration::from_secs(10), store.check_for_updates()).await;
    assert!(abandoned.is_err());
    assert_eq!(source.calls(), 1);

    // The request is still in flight, so a new check must not start another.
    assert_eq!(store.check_for_updates().await.unwrap(), CheckOutcome::Skipped);
    assert_eq!(source.calls(), 1);

    source.release.notify_one();
    snapshots
        .wait_for(|s| !s.is_checking && s.has_updates)
        .await
        .unwrap();
    assert!(store.has_update("42"));
    assert!(storage.load(STORE).await.unwrap().is_some());

    source.release.notify_one();
    assert_eq!(
        store.check_for_updates().await.unwrap(),
        CheckOutcome::Checked { updated: 1 }
    );
    assert_eq!(source.calls(), 2);
}

// ---------------------------------------------------------------------------
// Test: a stalled request times out as a recorded failure
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stalled_request_times_out_and_releases_flag() {
    let url = serve_silent().await;
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(200))
        .build()
        .unwrap();
    let source = Arc::new(EtfUpdatesApi::with_client(client, url));
    let (store, storage) = memory_store(source).await;

    let result = store.check_for_updates().await;

    assert_matches!(
        result,
        Err(NotificationError::Check(UpdatesApiError::Request(e))) => assert!(e.is_timeout())
    );
    let snapshot = store.snapshot();
    assert!(!snapshot.is_checking);
    assert!(snapshot.error.is_some());
    assert_eq!(storage.load(STORE).await.unwrap(), None);

    // Not skipped: the next check makes its own request and fails the same way.
    assert_matches!(
        store.check_for_updates().await,
        Err(NotificationError::Check(UpdatesApiError::Request(_)))
    );
}

// ---------------------------------------------------------------------------
// Test: random operation sequences keep has_updates derived
// ---------------------------------------------------------------------------

#[tokio::test]
async fn has_updates_tracks_set_under_random_operations() {
    const IDS: [&str; 6] = ["1", "2", "3", "5", "8", "13"];

    let mut rng = StdRng::seed_from_u64(0x5EED);
    let source = ScriptedSource::new();
    let (store, storage) = memory_store(source.clone()).await;

    for step in 0..300 {
        match rng.random_range(0..4) {
            0 => {
                let flagged: Vec<&str> =
                    IDS.iter().copied().filter(|_| rng.random_bool(0.4)).collect();
                source.set_flagged(&flagged);
                source.set_failing(rng.random_bool(0.2));
                let _ = store.check_for_updates().await;
            }
            1 => store.mark_as_viewed().await.unwrap(),
            _ => {
                let id = IDS[rng.random_range(0..IDS.len())];
                store.clear_update(id).await.unwrap();
            }
        }

        let snapshot = store.snapshot();
        assert_eq!(
            snapshot.has_updates,
            !snapshot.updated_ids.is_empty(),
            "step {step}"
        );

        if let Some(saved) = storage.load(STORE).await.unwrap() {
            let ids = saved["state"]["updatedIds"].as_array().unwrap();
            assert_eq!(saved["state"]["hasUpdates"], !ids.is_empty(), "step {step}");
            assert_eq!(ids.len(), snapshot.updated_ids.len(), "step {step}");
        }
    }
}
