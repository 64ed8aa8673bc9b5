//! Normalization and two-phase validation against an on-disk catalog

mod common;

use std::time::Duration;

use common::{commit, control, default_catalog, Fixture};
use devrec_collector::db::{bounds, devices, CatalogDb};
use devrec_collector::models::{Device, ValidationPhase};
use devrec_collector::monitor::ErrorCategory;
use devrec_collector::scoring::{self, normalizer, validator};

const TIMEOUT: Duration = Duration::from_secs(10);

async fn load(catalog: &CatalogDb, name: &str) -> Device {
    devices::find_by_name(catalog.pool(), name)
        .await
        .unwrap()
        .unwrap_or_else(|| panic!("{} not in catalog", name))
}

async fn all_devices(catalog: &CatalogDb) -> Vec<Device> {
    let ids = devices::list_device_ids(catalog.pool()).await.unwrap();
    let mut out = Vec::new();
    for id in ids {
        out.push(devices::load_device(catalog.pool(), id).await.unwrap());
    }
    out
}

/// Only single core varies; every other dimension is flat and the refresh
/// rate scores nothing, so the final score is 30 x normalized single core
fn single_core_only(single_core: f64) -> Fixture {
    Fixture::new("Acme", 2024, 3)
        .benchmark(single_core, 400.0)
        .refresh_rate(0)
}

#[tokio::test]
async fn expanding_the_box_renormalizes_existing_devices() {
    let (_dir, catalog) = default_catalog().await;

    commit(&catalog, single_core_only(50.0).device("Acme X")).await;
    commit(&catalog, single_core_only(100.0).device("Acme A")).await;

    let a = load(&catalog, "Acme A").await;
    assert!((a.unvalidated_final_score - 30.0).abs() < 1e-9, "A normalizes to 1.0");
    assert!((a.validated_final_score - 30.0).abs() < 1e-9);

    commit(&catalog, single_core_only(150.0).device("Acme B")).await;

    let a = load(&catalog, "Acme A").await;
    assert!((a.unvalidated_final_score - 15.0).abs() < 1e-9, "A drops to 0.5");
    assert!((a.validated_final_score - 15.0).abs() < 1e-9);

    let stored = catalog.get_min_max(&control()).await.unwrap();
    assert_eq!(stored.validated.single_core.min, 50.0);
    assert_eq!(stored.validated.single_core.max, 150.0);
    assert_eq!(stored.validated.device_count, 3);
    assert!(stored.unvalidated.same_bounds(&stored.validated));
}

#[tokio::test]
async fn bounds_never_shrink() {
    let (_dir, catalog) = default_catalog().await;
    let ctrl = control();

    let mut previous = catalog.get_min_max(&ctrl).await.unwrap().unvalidated;
    for (i, single_core) in [120.0, 80.0, 100.0, 60.0, 140.0].into_iter().enumerate() {
        commit(
            &catalog,
            single_core_only(single_core).device(&format!("Acme {}", i)),
        )
        .await;
        let current = catalog.get_min_max(&ctrl).await.unwrap().unvalidated;
        assert!(current.contains(&previous));
        previous = current;
    }
    assert_eq!(previous.single_core.min, 60.0);
    assert_eq!(previous.single_core.max, 140.0);
}

#[tokio::test]
async fn recompute_is_idempotent() {
    let (_dir, catalog) = default_catalog().await;
    let ctrl = control();

    commit(&catalog, Fixture::new("Acme", 2023, 1).benchmark(80.0, 200.0).device("Acme 1")).await;
    commit(&catalog, Fixture::new("Acme", 2023, 6).benchmark(120.0, 500.0).battery(4000.0).device("Acme 2")).await;

    let bigger = Fixture::new("Acme", 2024, 1)
        .benchmark(200.0, 900.0)
        .battery(6000.0)
        .device("Acme 3");
    let new_box = catalog
        .get_min_max(&ctrl)
        .await
        .unwrap()
        .unvalidated
        .folded(&bigger);

    normalizer::recompute_all(catalog.pool(), &new_box, &ctrl, TIMEOUT).await.unwrap();
    let first = all_devices(&catalog).await;
    normalizer::recompute_all(catalog.pool(), &new_box, &ctrl, TIMEOUT).await.unwrap();
    let second = all_devices(&catalog).await;

    assert_eq!(first, second);

    // Stored values are exactly what the pure score functions give
    for device in &second {
        let mut expected = device.clone();
        scoring::apply_unvalidated(&new_box, &mut expected);
        assert_eq!(device.unvalidated_final_score, expected.unvalidated_final_score);
        assert_eq!(device.review.unvalidated_score, expected.review.unvalidated_score);
    }
}

#[tokio::test]
async fn interrupted_validation_is_replayed_to_the_same_state() {
    let (_dir, catalog) = default_catalog().await;
    let ctrl = control();

    commit(&catalog, single_core_only(50.0).device("Acme 1")).await;
    commit(&catalog, single_core_only(100.0).device("Acme 2")).await;
    commit(&catalog, single_core_only(75.0).device("Acme 3")).await;

    // A newcomer widens the box; the catalog is re-normalized but the
    // promotion dies after the first device
    let newcomer = single_core_only(200.0).device("Acme 4");
    let new_box = catalog
        .get_min_max(&ctrl)
        .await
        .unwrap()
        .unvalidated
        .folded(&newcomer);
    catalog.normalize_unvalidated(&new_box, &ctrl).await.unwrap();

    validator::begin_promotion(catalog.pool(), &new_box, &ctrl, TIMEOUT).await.unwrap();
    let ids = devices::list_device_ids(catalog.pool()).await.unwrap();
    devices::promote_scores(catalog.pool(), ids[0]).await.unwrap();

    assert!(catalog.is_interrupted_validation(&ctrl).await.unwrap());
    let half_done = all_devices(&catalog).await;
    assert!(half_done
        .iter()
        .any(|d| d.validated_final_score != d.unvalidated_final_score));

    assert!(catalog.recover_validation(&ctrl).await.unwrap());

    assert!(!catalog.is_interrupted_validation(&ctrl).await.unwrap());
    assert_eq!(bounds::phase(catalog.pool()).await.unwrap(), ValidationPhase::Idle);
    for device in all_devices(&catalog).await {
        assert_eq!(device.validated_final_score, device.unvalidated_final_score);
        assert_eq!(device.review.validated_score, device.review.unvalidated_score);
    }

    let stored = catalog.get_min_max(&ctrl).await.unwrap();
    assert!(stored.validated.same_bounds(&new_box));
    assert_eq!(stored.validated.device_count, 3);

    // Device count agreed with the box, so nothing was recorded
    let counters = catalog.monitor().snapshot().await.unwrap();
    assert_eq!(counters.get(ErrorCategory::MissingDocument), 0);

    // Nothing left to recover
    assert!(!catalog.recover_validation(&ctrl).await.unwrap());
}

#[tokio::test]
async fn count_mismatch_is_recorded_but_validation_completes() {
    let (_dir, catalog) = default_catalog().await;
    let ctrl = control();

    commit(&catalog, single_core_only(50.0).device("Acme 1")).await;

    let stored = catalog.get_min_max(&ctrl).await.unwrap();
    let wrong_count = stored.unvalidated.with_device_count(5);
    catalog.validate(&wrong_count, &ctrl).await.unwrap();

    assert!(!catalog.is_interrupted_validation(&ctrl).await.unwrap());
    let counters = catalog.monitor().snapshot().await.unwrap();
    assert_eq!(counters.get(ErrorCategory::MissingDocument), 1);
}

#[tokio::test]
async fn reset_clears_catalog_queue_and_bounds() {
    let (_dir, catalog) = default_catalog().await;
    let ctrl = control();

    commit(&catalog, single_core_only(50.0).device("Acme 1")).await;
    catalog
        .enqueue_batch(&[common::entry("Acme 2")], &ctrl)
        .await
        .unwrap();

    catalog.reset_all(&ctrl).await.unwrap();

    assert!(all_devices(&catalog).await.is_empty());
    assert_eq!(catalog.queue_size(&ctrl).await.unwrap(), 0);
    let stored = catalog.get_min_max(&ctrl).await.unwrap();
    assert!(stored.validated.single_core.is_empty());
    assert_eq!(stored.unvalidated.device_count, 0);
    assert!(!catalog.is_interrupted_validation(&ctrl).await.unwrap());
}

#[tokio::test]
async fn storing_bounds_waits_out_a_concurrent_writer() {
    let (_dir, catalog) = default_catalog().await;
    let ctrl = control();

    // Another writer holds the lock, as a queue write from the enqueuer would
    let mut blocker = catalog.pool().begin().await.unwrap();
    sqlx::query("UPDATE queue_size SET size = size WHERE id = 1")
        .execute(&mut *blocker)
        .await
        .unwrap();

    let wider = catalog
        .get_min_max(&ctrl)
        .await
        .unwrap()
        .unvalidated
        .folded(&single_core_only(80.0).device("Acme W"));
    let normalize = tokio::spawn({
        let catalog = catalog.clone();
        async move { catalog.normalize_unvalidated(&wider, &control()).await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    blocker.commit().await.unwrap();

    normalize.await.unwrap().unwrap();
    let stored = catalog.get_min_max(&ctrl).await.unwrap();
    assert!(stored.unvalidated.same_bounds(&wider));
    assert_eq!(stored.unvalidated.device_count, 0);
}
