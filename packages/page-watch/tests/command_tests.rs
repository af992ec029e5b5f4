//! Operator commands against a live engine.

mod common;

use std::time::Duration;

use common::Harness;
use page_watch::testing::MockFetcher;
use page_watch::{AddOutcome, Fingerprint, FingerprintRecord, NormalizationMode, RegistryError};

const HOME: &str = "https://example.test/home";
const OTHER: &str = "https://example.test/other";

#[tokio::test]
async fn duplicate_label_is_rejected_and_original_kept() {
    let harness = Harness::new(MockFetcher::new().with_page(HOME, "A").with_page(OTHER, "Z"));
    harness.commands.add("home", HOME).await.unwrap();

    let err = harness.commands.add("home", OTHER).await.unwrap_err();

    assert!(matches!(err, RegistryError::DuplicateLabel { .. }));
    assert_eq!(harness.commands.list().get("home").unwrap(), HOME);
    assert_eq!(
        harness.watcher.store().get("home").unwrap().fingerprint,
        Fingerprint::of(b"A")
    );
    assert_eq!(harness.fetcher.call_count(OTHER), 0);
}

#[tokio::test]
async fn remove_then_re_add_starts_from_a_fresh_baseline() {
    let fetcher = MockFetcher::new().with_pages(HOME, ["A\n", "A\n", "B\n"]);
    let harness = Harness::new(fetcher);
    harness.commands.add("home", HOME).await.unwrap();
    harness.scheduler.sweep().await;

    let removed = harness.commands.remove("home").await.unwrap();
    assert_eq!(removed.url, HOME);
    assert!(harness.watcher.store().get("home").is_none());

    // Content moved on while the label was gone.
    let outcome = harness.commands.add("home", HOME).await.unwrap();

    assert!(matches!(
        outcome,
        AddOutcome::Monitoring { fingerprint } if fingerprint == Fingerprint::of(b"B\n")
    ));
    assert!(harness.notifier.messages().is_empty());
}

#[tokio::test]
async fn remove_deletes_the_labels_diff_history() {
    let fetcher = MockFetcher::new().with_pages(HOME, ["A\n", "B\n"]);
    let harness = Harness::new(fetcher);
    harness.commands.add("home", HOME).await.unwrap();
    harness.scheduler.sweep().await;
    assert_eq!(harness.watcher.artifacts().list("home").unwrap().len(), 1);

    harness.commands.remove("home").await.unwrap();

    assert!(harness.watcher.artifacts().list("home").unwrap().is_empty());
    assert!(!harness.watcher.config().diffs_dir().join("home").exists());
}

#[tokio::test]
async fn add_purges_state_left_behind_by_an_interrupted_remove() {
    let harness = Harness::new(MockFetcher::new().with_page(HOME, "new"));
    harness
        .watcher
        .store()
        .put(
            "home",
            FingerprintRecord::new(Fingerprint::of(b"old"), NormalizationMode::Raw),
        )
        .unwrap();

    let outcome = harness.commands.add("home", HOME).await.unwrap();

    assert!(matches!(
        outcome,
        AddOutcome::Monitoring { fingerprint } if fingerprint == Fingerprint::of(b"new")
    ));
    assert!(harness.notifier.messages().is_empty());
}

#[tokio::test]
async fn remove_waits_for_the_pipeline_in_flight() {
    let fetcher = MockFetcher::new()
        .with_page(HOME, "A")
        .with_delay(HOME, Duration::from_millis(200));
    let harness = Harness::new(fetcher);
    harness.commands.add("home", HOME).await.unwrap();

    let (report, removed) = tokio::join!(harness.scheduler.sweep(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        harness.commands.remove("home").await
    });

    assert_eq!(report.unchanged, 1);
    removed.unwrap();
    // The sweep's record write happened before the remove, so nothing is
    // left behind.
    assert!(harness.watcher.store().get("home").is_none());
    assert!(harness.commands.list().is_empty());
}

#[tokio::test]
async fn list_is_sorted_by_label() {
    let harness = Harness::new(MockFetcher::new());
    harness.commands.add("zeta", HOME).await.unwrap();
    harness.commands.add("alpha", OTHER).await.unwrap();

    let labels = harness.commands.list().into_keys().collect::<Vec<_>>();
    assert_eq!(labels, vec!["alpha".to_string(), "zeta".to_string()]);
}

#[tokio::test]
async fn hand_edited_path_label_cannot_reach_outside_the_diff_dir() {
    let harness = Harness::new(MockFetcher::new().with_page(HOME, "A"));
    harness.commands.add("home", HOME).await.unwrap();
    let targets = harness.watcher.config().targets_path();
    std::fs::write(
        &targets,
        r#"{"..": "https://example.test/dots", "home": "https://example.test/home"}"#,
    )
    .unwrap();

    let harness = harness.restart();

    assert_eq!(harness.commands.list().len(), 1);
    let err = harness.commands.remove("..").await.unwrap_err();
    assert!(matches!(err, RegistryError::InvalidLabel { .. }));
    assert!(targets.exists());
    assert!(harness.watcher.config().fingerprints_path().exists());
}
