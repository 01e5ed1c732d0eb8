// Copyright (c) The gridline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use gridline_updater::{
    config::elements::TestGroup,
    storage::{Build, MemoryStore, ObjectPath},
};
use std::{collections::BTreeSet, fmt::Write};

pub(crate) const BUCKET: &str = "gs://bucket";
pub(crate) const JOB_PREFIX: &str = "bucket/logs/ci-unit";

pub(crate) fn test_init() {
    // Installing twice is an error; other tests in the binary may have done so already.
    let _ = color_eyre::install();
}

pub(crate) fn test_group() -> TestGroup {
    TestGroup::new("unit", JOB_PREFIX)
}

pub(crate) fn build_path(id: u32) -> ObjectPath {
    format!("{BUCKET}/logs/ci-unit/{id}/")
        .parse()
        .expect("valid object path")
}

/// A JUnit file with `cases` passing tests named `TestN`, of which the first `failing` fail.
pub(crate) fn junit(cases: usize, failing: usize) -> String {
    let mut xml = String::from(r#"<testsuite name="unit">"#);
    for i in 0..cases {
        if i < failing {
            write!(
                xml,
                r#"<testcase name="Test{i}" time="0.5"><failure message="boom"/></testcase>"#
            )
            .unwrap();
        } else {
            write!(xml, r#"<testcase name="Test{i}" time="0.5"/>"#).unwrap();
        }
    }
    xml.push_str("</testsuite>");
    xml
}

/// Adds a complete build that started at `started` seconds and ran for a minute.
pub(crate) fn add_build(store: &mut MemoryStore, id: u32, started: i64) -> Build {
    let build = Build::new(build_path(id));
    store
        .insert(
            build.path.join(Build::PODINFO),
            r#"{"pod": {"metadata": {"name": "pod"}, "status": {"phase": "Succeeded"}}}"#,
        )
        .insert(
            build.path.join(Build::STARTED),
            format!(r#"{{"timestamp": {started}, "metadata": {{"node": "n{id}"}}}}"#),
        )
        .insert(
            build.path.join(Build::FINISHED),
            format!(r#"{{"timestamp": {}, "passed": true}}"#, started + 60),
        )
        .insert(build.path.join("artifacts/junit_01.xml"), junit(3, 0));
    build
}

/// A store holding builds `1..=count`, build `n` having started at `n * 100` seconds.
pub(crate) fn store_with_builds(count: u32) -> MemoryStore {
    let mut store = MemoryStore::new();
    for id in 1..=count {
        add_build(&mut store, id, i64::from(id) * 100);
    }
    store
}

/// The ids of the builds that had any of their objects opened.
pub(crate) async fn opened_builds(store: &MemoryStore) -> BTreeSet<u32> {
    let job = build_path(0).parent().expect("job prefix");
    store
        .opened()
        .await
        .iter()
        .filter_map(|path| path.strip_prefix(&job)?.split('/').next()?.parse().ok())
        .collect()
}
