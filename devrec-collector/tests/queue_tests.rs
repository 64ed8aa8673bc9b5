//! Bounded work queue: capacity, deduplication and the size counter

mod common;

use std::collections::HashSet;

use common::{commit, control, default_catalog, entries, entry, Fixture};
use devrec_collector::db::queue;
use devrec_collector::CollectorError;

async fn assert_counter_matches(catalog: &devrec_collector::db::CatalogDb) {
    let size = queue::queue_size(catalog.pool()).await.unwrap();
    let count = queue::entry_count(catalog.pool()).await.unwrap();
    assert_eq!(size, count, "size counter must equal entry count");
}

#[tokio::test]
async fn full_queue_accepts_nothing_and_partial_queue_fills_to_capacity() {
    let (_dir, catalog) = default_catalog().await;
    let ctrl = control();

    let inserted = catalog.enqueue_batch(&entries("First", 30), &ctrl).await.unwrap();
    assert_eq!(inserted, 30);
    assert_counter_matches(&catalog).await;

    let inserted = catalog.enqueue_batch(&entries("Second", 40), &ctrl).await.unwrap();
    assert_eq!(inserted, 0, "queue at capacity must not grow");
    assert_eq!(catalog.queue_size(&ctrl).await.unwrap(), 30);

    catalog.dequeue(&ctrl).await.unwrap();
    catalog.dequeue(&ctrl).await.unwrap();
    assert_eq!(catalog.queue_size(&ctrl).await.unwrap(), 28);

    let third = entries("Third", 5);
    let inserted = catalog.enqueue_batch(&third, &ctrl).await.unwrap();
    assert_eq!(inserted, 2);
    assert_eq!(catalog.queue_size(&ctrl).await.unwrap(), 30);
    assert_counter_matches(&catalog).await;

    // The two admitted entries come from the batch, without repeats
    let mut remaining = Vec::new();
    while let Ok(entry) = catalog.dequeue(&ctrl).await {
        remaining.push(entry.name);
    }
    let from_third: HashSet<_> = remaining
        .iter()
        .filter(|name| name.starts_with("Third"))
        .collect();
    assert_eq!(from_third.len(), 2);
}

#[tokio::test]
async fn dequeue_is_fifo_and_empty_queue_is_reported() {
    let (_dir, catalog) = default_catalog().await;
    let ctrl = control();

    for name in ["Alpha 1", "Beta 2", "Gamma 3"] {
        catalog.enqueue_batch(&[entry(name)], &ctrl).await.unwrap();
    }

    assert_eq!(catalog.dequeue(&ctrl).await.unwrap().name, "Alpha 1");
    assert_eq!(catalog.dequeue(&ctrl).await.unwrap().name, "Beta 2");
    assert_eq!(catalog.dequeue(&ctrl).await.unwrap().name, "Gamma 3");

    let err = catalog.dequeue(&ctrl).await.unwrap_err();
    assert_eq!(err, CollectorError::EmptyQueue);
    assert_eq!(catalog.queue_size(&ctrl).await.unwrap(), 0);
    assert_counter_matches(&catalog).await;
}

#[tokio::test]
async fn candidates_already_queued_or_cataloged_are_skipped() {
    let (_dir, catalog) = default_catalog().await;
    let ctrl = control();

    commit(&catalog, Fixture::new("Google", 2023, 10).device("Pixel 8")).await;
    catalog.enqueue_batch(&[entry("Pixel 9")], &ctrl).await.unwrap();

    let batch = vec![
        entry("Pixel 8"),
        entry("Pixel 9"),
        entry("Pixel 10"),
        entry("Pixel 10"),
    ];
    let inserted = catalog.enqueue_batch(&batch, &ctrl).await.unwrap();

    assert_eq!(inserted, 1);
    assert_eq!(catalog.queue_size(&ctrl).await.unwrap(), 2);
    assert_counter_matches(&catalog).await;
}

#[tokio::test]
async fn cancelled_control_leaves_queue_untouched() {
    let (_dir, catalog) = default_catalog().await;
    let ctrl = control();
    ctrl.cancel();

    let err = catalog.enqueue_batch(&entries("Late", 3), &ctrl).await.unwrap_err();
    assert!(err.is_cancelled());

    let fresh = control();
    assert_eq!(catalog.queue_size(&fresh).await.unwrap(), 0);
}
