//! Monitor checks, history persistence and watch mode

mod common;

use common::{at, twelve_duplicates};
use lexr_dedup::artifacts::{ArtifactDir, RunLog};
use lexr_dedup::monitor::{History, Monitor, MonitorOptions, WatchExit};
use lexr_dedup::scoring::RecencyAndQuality;
use lexr_dedup::store::MemoryRecordStore;
use lexr_dedup::{KeyMode, Record};
use std::time::Duration;

fn options(retention: usize, ci: bool) -> MonitorOptions {
    MonitorOptions {
        key_mode: KeyMode::WordVerse,
        retention,
        top_n: 2,
        alert: true,
        ci,
    }
}

fn clean_store() -> MemoryRecordStore {
    MemoryRecordStore::new(vec![
        Record::new("אור", "gen-1-3", at(1)).with_id("a"),
        Record::new("יהי", "gen-1-3", at(1)).with_id("b"),
    ])
}

#[tokio::test]
async fn test_check_alerts_with_largest_groups() {
    let temp = tempfile::tempdir().unwrap();
    let artifacts = ArtifactDir::open(temp.path()).unwrap();
    let store = MemoryRecordStore::new(twelve_duplicates());
    let policy = RecencyAndQuality::default();

    let mut monitor = Monitor::open(&store, &policy, options(10, false), artifacts.history_path()).unwrap();
    let outcome = monitor.check(&mut RunLog::tracing_only()).await.unwrap();

    let alert = outcome.alert.unwrap();
    assert_eq!(alert.duplicate_groups, 3);
    assert_eq!(alert.total_duplicate_records, 9);
    assert_eq!(alert.top_groups.len(), 2);
    for group in &alert.top_groups {
        assert_eq!(group.size, 4);
        // Newest record gets the recency bonus
        assert!(group.suggested_keep.as_deref().unwrap().ends_with("-r3"));
    }

    let history = History::load(&artifacts.history_path()).unwrap();
    assert_eq!(history.total_checks, 1);
    assert_eq!(history.duplicates_detected, 1);
    assert_eq!(history.checks[0].sample_groups.as_ref().unwrap().len(), 2);
}

#[tokio::test]
async fn test_clean_check_has_no_alert() {
    let temp = tempfile::tempdir().unwrap();
    let artifacts = ArtifactDir::open(temp.path()).unwrap();
    let store = clean_store();
    let policy = RecencyAndQuality::default();

    let mut monitor = Monitor::open(&store, &policy, options(10, true), artifacts.history_path()).unwrap();
    let outcome = monitor.check(&mut RunLog::tracing_only()).await.unwrap();

    assert!(outcome.alert.is_none());
    assert_eq!(outcome.snapshot.unique_combinations, 2);
    assert!(outcome.snapshot.sample_groups.is_none());
}

#[tokio::test]
async fn test_history_survives_reopen_and_is_trimmed() {
    let temp = tempfile::tempdir().unwrap();
    let artifacts = ArtifactDir::open(temp.path()).unwrap();
    let store = clean_store();
    let policy = RecencyAndQuality::default();

    for _ in 0..3 {
        let mut monitor = Monitor::open(&store, &policy, options(2, false), artifacts.history_path()).unwrap();
        monitor.check(&mut RunLog::tracing_only()).await.unwrap();
    }

    let history = History::load(&artifacts.history_path()).unwrap();
    assert_eq!(history.checks.len(), 2);
    assert_eq!(history.total_checks, 3);
    assert_eq!(history.duplicates_detected, 0);
    assert!(history.first_check.unwrap() <= history.last_check.unwrap());
}

#[tokio::test]
async fn test_watch_stops_on_shutdown_and_flushes() {
    let temp = tempfile::tempdir().unwrap();
    let artifacts = ArtifactDir::open(temp.path()).unwrap();
    let store = clean_store();
    let policy = RecencyAndQuality::default();
    let mut monitor = Monitor::open(&store, &policy, options(10, false), artifacts.history_path()).unwrap();

    let exit = monitor
        .watch(
            Duration::from_secs(3600),
            tokio::time::sleep(Duration::from_millis(50)),
            &mut RunLog::tracing_only(),
        )
        .await
        .unwrap();

    assert_eq!(exit, WatchExit::Cancelled { checks: 1 });
    assert_eq!(exit.exit_code(), 0);
    assert_eq!(History::load(&artifacts.history_path()).unwrap().total_checks, 1);
}

#[tokio::test]
async fn test_watch_repeats_on_interval() {
    let temp = tempfile::tempdir().unwrap();
    let artifacts = ArtifactDir::open(temp.path()).unwrap();
    let store = clean_store();
    let policy = RecencyAndQuality::default();
    let mut monitor = Monitor::open(&store, &policy, options(100, false), artifacts.history_path()).unwrap();

    let exit = monitor
        .watch(
            Duration::from_millis(5),
            tokio::time::sleep(Duration::from_millis(200)),
            &mut RunLog::tracing_only(),
        )
        .await
        .unwrap();

    match exit {
        WatchExit::Cancelled { checks } => assert!(checks >= 2, "only {} checks", checks),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_watch_in_ci_mode_stops_at_first_alert() {
    let temp = tempfile::tempdir().unwrap();
    let artifacts = ArtifactDir::open(temp.path()).unwrap();
    let store = MemoryRecordStore::new(twelve_duplicates());
    let policy = RecencyAndQuality::default();
    let mut monitor = Monitor::open(&store, &policy, options(10, true), artifacts.history_path()).unwrap();

    let exit = monitor
        .watch(
            Duration::from_millis(5),
            std::future::pending::<()>(),
            &mut RunLog::tracing_only(),
        )
        .await
        .unwrap();

    assert_eq!(exit, WatchExit::Alerted { checks: 1 });
    assert_eq!(exit.exit_code(), 1);
    assert_eq!(History::load(&artifacts.history_path()).unwrap().duplicates_detected, 1);
}
