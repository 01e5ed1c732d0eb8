// Copyright (c) The gridline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use camino::Utf8Path;
use camino_tempfile::Utf8TempDir;
use chrono::DateTime;
use color_eyre::eyre::Result;
use gridline_updater::{
    column::TestStatus,
    config::{DefaultConfigWarnings, GridlineConfig},
    convert::OVERALL_ROW,
    read::ColumnReader,
    storage::LocalStore,
};
use indoc::indoc;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn write(root: &Utf8Path, rel: &str, contents: &str) -> Result<()> {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)?;
    Ok(())
}

#[tokio::test]
async fn reads_configured_groups_from_disk() -> Result<()> {
    test_init();

    let dir = Utf8TempDir::with_prefix("gridline-local-")?;
    let root = dir.path();

    for (job, id, started, passed) in [
        ("ci-unit", "1001", 1000, true),
        ("ci-unit", "1002", 2000, false),
        ("ci-e2e", "77", 1500, true),
    ] {
        let build = format!("bucket/logs/{job}/{id}");
        write(
            root,
            &format!("{build}/started.json"),
            &format!(r#"{{"timestamp": {started}, "metadata": {{"version": "v{id}"}}}}"#),
        )?;
        write(
            root,
            &format!("{build}/finished.json"),
            &format!(r#"{{"timestamp": {}, "passed": {passed}}}"#, started + 120),
        )?;
        write(
            root,
            &format!("{build}/artifacts/junit_{job}.xml"),
            &junit(2, usize::from(!passed)),
        )?;
    }

    let config_file = root.join("gridline.toml");
    std::fs::write(
        &config_file,
        indoc! {r#"
            [updater]
            concurrency = 2

            [[test-group]]
            name = "combined"
            gcs-prefix = "bucket/logs/ci-unit,gs://bucket/logs/ci-e2e"
            column-header = [{ configuration-value = "version" }]
            disable-prowjob-analysis = true

            [test-group.test-name-config]
            name-format = "%s: %s"
            name-elements = [{ target-config = "Tests name" }, { test-property = "Context" }]
        "#},
    )?;
    let config = GridlineConfig::from_file(Some(&config_file), &mut DefaultConfigWarnings)?;
    let group = config.test_group("combined").expect("group is configured");

    let reader = ColumnReader::new(
        Arc::new(LocalStore::new(root.join("empty"))),
        config.build_timeout(),
        config.concurrency().compute(),
    );
    // A store rooted somewhere empty sees no builds.
    let cols = reader
        .read(&CancellationToken::new(), group, &[], DateTime::UNIX_EPOCH)
        .await?;
    assert!(cols.is_empty());

    let reader = ColumnReader::new(
        Arc::new(LocalStore::new(root)),
        config.build_timeout(),
        config.concurrency().compute(),
    );
    let cols = reader
        .read(&CancellationToken::new(), group, &[], DateTime::UNIX_EPOCH)
        .await?;

    let ids: Vec<_> = cols.iter().map(|c| c.column.build.as_str()).collect();
    assert_eq!(ids, ["1002", "1001", "77"]);
    assert_eq!(cols[0].column.extra, ["v1002"]);

    let failed = &cols[0];
    assert_eq!(failed.cells[OVERALL_ROW].result, TestStatus::Fail);
    // Multiple jobs: the job name leads every row.
    assert_eq!(
        failed.cells["ci-unit.Test0: ci-unit"].result,
        TestStatus::Fail
    );
    assert_eq!(
        cols[2].cells["ci-e2e.Test1: ci-e2e"].result,
        TestStatus::Pass
    );
    Ok(())
}
