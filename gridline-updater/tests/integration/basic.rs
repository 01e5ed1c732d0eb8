// Copyright (c) The gridline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use chrono::DateTime;
use color_eyre::eyre::Result;
use gridline_updater::{
    column::{InflatedColumn, TestStatus},
    convert::{OVERALL_ROW, POD_ROW},
    errors::{BuildReadError, ReadColumnsError, StorageError},
    read::{ColumnReader, MAX_COLUMNS, read_columns},
    storage::{Build, MemoryStore, list_builds},
};
use pretty_assertions::assert_eq;
use std::{collections::BTreeSet, io, sync::Arc, time::Duration};
use test_case::test_case;
use tokio_util::sync::CancellationToken;

const TIMEOUT: Duration = Duration::from_secs(60);

fn reader(store: MemoryStore, concurrency: usize) -> ColumnReader<MemoryStore> {
    ColumnReader::new(Arc::new(store), TIMEOUT, concurrency)
}

fn ids(cols: &[InflatedColumn]) -> Vec<&str> {
    cols.iter().map(|c| c.column.build.as_str()).collect()
}

#[test_case(1 ; "serial")]
#[test_case(4 ; "concurrent")]
#[test_case(64 ; "more readers than builds")]
#[tokio::test]
async fn reads_newest_first(concurrency: usize) -> Result<()> {
    test_init();

    let cols = reader(store_with_builds(12), concurrency)
        .read(
            &CancellationToken::new(),
            &test_group(),
            &[],
            DateTime::UNIX_EPOCH,
        )
        .await?;

    let expected: Vec<String> = (1..=12).rev().map(|id: u32| id.to_string()).collect();
    assert_eq!(ids(&cols), expected);

    let newest = &cols[0];
    assert_eq!(newest.column.started, 1_200_000.0);
    assert_eq!(newest.column.hint, "12");
    assert_eq!(newest.cells[OVERALL_ROW].result, TestStatus::Pass);
    assert_eq!(newest.cells[POD_ROW].result, TestStatus::Pass);
    assert_eq!(newest.cells["Test0"].result, TestStatus::Pass);
    assert_eq!(newest.cells.len(), 5);
    Ok(())
}

#[tokio::test]
async fn caps_to_newest_builds() -> Result<()> {
    test_init();

    let store = Arc::new(store_with_builds(60));
    let cols = ColumnReader::new(Arc::clone(&store), TIMEOUT, 8)
        .read(
            &CancellationToken::new(),
            &test_group(),
            &[],
            DateTime::UNIX_EPOCH,
        )
        .await?;

    assert_eq!(cols.len(), MAX_COLUMNS);
    assert_eq!(cols[0].column.build, "60");
    assert_eq!(cols[MAX_COLUMNS - 1].column.build, "11");
    // Older builds are never fetched.
    assert_eq!(opened_builds(&store).await, (11..=60).collect::<BTreeSet<_>>());
    Ok(())
}

#[test_case(1 ; "serial")]
#[test_case(5 ; "concurrent")]
#[tokio::test]
async fn stops_at_old_builds(concurrency: usize) -> Result<()> {
    test_init();

    // Builds 12 and older started before the stop time; 12 is kept as the boundary.
    let stop = DateTime::from_timestamp(1250, 0).expect("valid timestamp");
    let cols = reader(store_with_builds(20), concurrency)
        .read(&CancellationToken::new(), &test_group(), &[], stop)
        .await?;

    assert_eq!(
        ids(&cols),
        ["20", "19", "18", "17", "16", "15", "14", "13", "12"]
    );
    Ok(())
}

#[test_case(1, 19 ; "serial")]
#[test_case(4, 11 ; "concurrent")]
#[tokio::test]
async fn old_builds_stop_fetching(concurrency: usize, oldest_fetched: u32) -> Result<()> {
    test_init();

    // Every build started before the stop time, so the newest one ends the read.
    let store = Arc::new(store_with_builds(20));
    let stop = DateTime::from_timestamp(10_000, 0).expect("valid timestamp");
    let cols = ColumnReader::new(Arc::clone(&store), TIMEOUT, concurrency)
        .read(&CancellationToken::new(), &test_group(), &[], stop)
        .await?;
    assert_eq!(ids(&cols), ["20"]);

    // Builds already handed out are still read, but nothing past them.
    let opened = opened_builds(&store).await;
    assert!(opened.contains(&20), "{opened:?}");
    assert!(
        opened.iter().all(|&id| id >= oldest_fetched),
        "builds older than {oldest_fetched} were fetched: {opened:?}"
    );
    Ok(())
}

#[tokio::test]
async fn resumes_from_old_columns() -> Result<()> {
    test_init();

    let store = store_with_builds(20);
    let reader = reader(store, 3);
    let cancel = CancellationToken::new();
    let group = test_group();

    let mut old = reader
        .read(&cancel, &group, &[], DateTime::UNIX_EPOCH)
        .await?;
    // Pretend the previous pass read up to build 12, which started at 1450s.
    old.retain(|c| c.column.build == "12");
    old[0].column.started = 1_450_000.0;

    // Builds before 12 aren't listed; builds that started before 1450s end the read.
    let cols = reader
        .read(&cancel, &group, &old, DateTime::UNIX_EPOCH)
        .await?;
    assert_eq!(ids(&cols), ["20", "19", "18", "17", "16", "15", "14"]);
    Ok(())
}

#[tokio::test]
async fn malformed_builds_are_columns() -> Result<()> {
    test_init();

    let mut store = store_with_builds(2);
    let build = Build::new(build_path(3));
    store
        .insert(build.path.join(Build::FINISHED), r#"{"passed": false}"#)
        .insert(build.path.join("artifacts/junit.xml"), "<html/>");

    let cols = reader(store, 2)
        .read(
            &CancellationToken::new(),
            &test_group(),
            &[],
            DateTime::UNIX_EPOCH,
        )
        .await?;
    assert_eq!(ids(&cols), ["3", "2", "1"]);

    let broken = &cols[0];
    assert_eq!(broken.column.started, 0.0);
    let overall = &broken.cells[OVERALL_ROW];
    assert_eq!(overall.result, TestStatus::Fail);
    assert_eq!(
        overall.message,
        "Malformed artifacts: artifacts/junit.xml, podinfo.json, started.json"
    );
    // Only the overall row: no pod info and the suites were discarded.
    assert_eq!(broken.cells.len(), 1);
    Ok(())
}

#[tokio::test]
async fn large_junit_files_are_truncated() -> Result<()> {
    test_init();

    let mut store = MemoryStore::new();
    let build = add_build(&mut store, 1, 100);
    store.insert(build.path.join("artifacts/junit_01.xml"), junit(1500, 10));

    let cols = reader(store, 1)
        .read(
            &CancellationToken::new(),
            &test_group(),
            &[],
            DateTime::UNIX_EPOCH,
        )
        .await?;

    let cells = &cols[0].cells;
    let tests = cells
        .keys()
        .filter(|name| *name != OVERALL_ROW && *name != POD_ROW)
        .count();
    assert_eq!(tests, 1000);
    assert_eq!(cells["Test3"].result, TestStatus::Fail);
    assert_eq!(cells["Test3"].message, "boom");
    assert!(!cells.contains_key("Test1000"));
    Ok(())
}

#[tokio::test]
async fn hard_errors_fail_the_read() {
    test_init();

    let mut store = store_with_builds(10);
    let broken = build_path(7);
    store.fail_read(broken.join(Build::FINISHED), io::ErrorKind::PermissionDenied);

    let err = reader(store, 3)
        .read(
            &CancellationToken::new(),
            &test_group(),
            &[],
            DateTime::UNIX_EPOCH,
        )
        .await
        .expect_err("unreadable finished.json fails the read");
    match &err {
        ReadColumnsError::ReadBuild { build, err } => {
            assert_eq!(build, &broken);
            assert!(
                matches!(err, BuildReadError::Finished(StorageError::Read { .. })),
                "{err:?}"
            );
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!err.is_timeout());
}

#[tokio::test(start_paused = true)]
async fn slow_builds_time_out() {
    test_init();

    let mut store = store_with_builds(4);
    store.delay(build_path(2).join(Build::STARTED), Duration::from_secs(600));

    let cancel = CancellationToken::new();
    let builds = list_builds(&store, "", &[build_path(0).parent().expect("job prefix")])
        .await
        .expect("builds listed");
    assert_eq!(builds.len(), 4);

    let err = read_columns(
        &cancel,
        &Arc::new(store),
        &test_group(),
        builds,
        DateTime::UNIX_EPOCH,
        MAX_COLUMNS,
        Duration::from_secs(5),
        2,
    )
    .await
    .expect_err("slow build times out");
    assert!(
        matches!(
            err,
            ReadColumnsError::ReadBuild {
                err: BuildReadError::TimedOut { .. },
                ..
            }
        ),
        "{err:?}"
    );
    assert!(err.is_timeout());
    // The shared token belongs to the caller and is left alone.
    assert!(!cancel.is_cancelled());
}

#[tokio::test]
async fn zero_readers() {
    test_init();

    let err = reader(store_with_builds(1), 0)
        .read(
            &CancellationToken::new(),
            &test_group(),
            &[],
            DateTime::UNIX_EPOCH,
        )
        .await
        .expect_err("no readers");
    assert!(matches!(err, ReadColumnsError::ZeroReaders), "{err:?}");
}

#[tokio::test]
async fn cancelled_reads() {
    test_init();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = reader(store_with_builds(5), 2)
        .read(&cancel, &test_group(), &[], DateTime::UNIX_EPOCH)
        .await
        .expect_err("cancelled");
    assert!(matches!(err, ReadColumnsError::Cancelled), "{err:?}");
    assert!(err.is_timeout());
}

#[tokio::test]
async fn listing_failures() {
    test_init();

    let mut store = store_with_builds(3);
    store.fail_list(
        build_path(0).parent().expect("job prefix"),
        io::ErrorKind::ConnectionRefused,
    );
    let err = reader(store, 2)
        .read(
            &CancellationToken::new(),
            &test_group(),
            &[],
            DateTime::UNIX_EPOCH,
        )
        .await
        .expect_err("listing fails");
    assert!(
        matches!(err, ReadColumnsError::ListBuilds(StorageError::List { .. })),
        "{err:?}"
    );
}
