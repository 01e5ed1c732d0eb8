// Copyright (c) The gridline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversion of a downloaded build into a column.

use crate::{
    column::{Cell, Column, InflatedColumn, TestStatus},
    config::elements::TestGroup,
    metadata::{PodInfo, string_metadata},
    name::NameConfig,
    read::BuildResult,
};
use gridline_junit::{Property, TestcaseStatus};
use std::collections::BTreeMap;
use tracing::trace;

/// The name of the row summarizing the build as a whole.
pub const OVERALL_ROW: &str = "Overall";

/// The name of the row summarizing the pod the build ran in.
pub const POD_ROW: &str = "Pod";

/// The metric recording a build's duration.
pub const DURATION_METRIC: &str = "test-duration-minutes";

/// The metric recording a test case's duration.
pub const ELAPSED_METRIC: &str = "elapsed";

/// Settings derived from a test group that control how builds turn into cells.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GroupOptions {
    /// Fold repeated runs of a test into one cell.
    pub merge: bool,

    /// Add a row describing the pod the build ran in.
    pub analyze_prow_job: bool,

    /// Record the build id on every cell.
    pub add_cell_id: bool,

    /// The test property holding a numeric metric, or empty.
    pub metric_key: String,

    /// The test property copied onto cells, or empty.
    pub user_key: String,
}

impl GroupOptions {
    /// Derives the options for a test group.
    pub fn from_group(group: &TestGroup) -> Self {
        Self {
            merge: !group.disable_merged_status,
            analyze_prow_job: !group.disable_prowjob_analysis,
            add_cell_id: !group.build_override_strftime.is_empty(),
            metric_key: group.short_text_metric.clone(),
            user_key: group.user_property.clone(),
        }
    }
}

/// Converts a downloaded build into a column.
///
/// `id` is shown in the column header; `headers` are the metadata keys filling the column's extra
/// values.
pub fn convert_result(
    name_config: &NameConfig,
    id: &str,
    headers: &[&str],
    result: &BuildResult,
    opts: &GroupOptions,
) -> InflatedColumn {
    let started_meta = result
        .started
        .as_ref()
        .map(|s| string_metadata(&s.metadata))
        .unwrap_or_default();
    let finished_meta = result
        .finished
        .as_ref()
        .map(|f| string_metadata(&f.metadata))
        .unwrap_or_default();

    let column = Column {
        build: id.to_owned(),
        started: result
            .started
            .as_ref()
            .map_or(0.0, |s| s.timestamp as f64 * 1000.0),
        hint: result.build.clone(),
        extra: headers
            .iter()
            .map(|key| {
                finished_meta
                    .get(*key)
                    .or_else(|| started_meta.get(*key))
                    .cloned()
                    .unwrap_or_default()
            })
            .collect(),
    };

    let mut rows = Rows::new(opts.merge);
    rows.push(OVERALL_ROW.to_owned(), overall_cell(result));
    if opts.analyze_prow_job {
        if let Some(cell) = result.pod_info.as_ref().and_then(pod_cell) {
            rows.push(POD_ROW.to_owned(), cell);
        }
    }

    for meta in &result.suites {
        for suite in &meta.suites.testsuites {
            let suite_props = property_map(&suite.properties);
            for case in &suite.testcases {
                let case_props = property_map(&case.properties);
                let name = name_config.render(
                    &result.job,
                    &case.name,
                    &[&case_props, &suite_props, &meta.metadata, &started_meta],
                );

                let mut cell = match &case.status {
                    TestcaseStatus::Success { flaky_runs } if flaky_runs.is_empty() => {
                        Cell::new(TestStatus::Pass)
                    }
                    TestcaseStatus::Success { flaky_runs } => Cell {
                        result: TestStatus::Flaky,
                        message: format!("passed after {} failed runs", flaky_runs.len()),
                        ..Default::default()
                    },
                    status @ TestcaseStatus::NonSuccess { .. } => Cell {
                        result: TestStatus::Fail,
                        message: status.message().unwrap_or_default().to_owned(),
                        ..Default::default()
                    },
                    status @ TestcaseStatus::Skipped { .. } => match status.message() {
                        Some(message) => Cell {
                            result: TestStatus::PassWithSkips,
                            message: message.to_owned(),
                            ..Default::default()
                        },
                        None => {
                            trace!(test = %name, "omitting skipped test without a message");
                            continue;
                        }
                    },
                };

                if let Some(time) = case.time {
                    cell.metrics
                        .insert(ELAPSED_METRIC.to_owned(), time.as_secs_f64());
                }
                if !opts.metric_key.is_empty() {
                    let value = case_props
                        .get(&opts.metric_key)
                        .or_else(|| suite_props.get(&opts.metric_key))
                        .and_then(|v| v.trim().parse::<f64>().ok());
                    if let Some(value) = value {
                        cell.metrics.insert(opts.metric_key.clone(), value);
                        cell.icon = format!("{value}");
                    }
                }
                if !opts.user_key.is_empty() {
                    cell.user_property = case_props
                        .get(&opts.user_key)
                        .or_else(|| suite_props.get(&opts.user_key))
                        .cloned();
                }
                if opts.add_cell_id {
                    cell.cell_id = result.build.clone();
                }

                rows.push(name, cell);
            }
        }
    }

    InflatedColumn {
        column,
        cells: rows.finish(),
    }
}

fn overall_cell(result: &BuildResult) -> Cell {
    let mut cell = match &result.finished {
        Some(finished) => {
            let status = if finished.passed() {
                TestStatus::Pass
            } else {
                TestStatus::Fail
            };
            let mut cell = Cell::new(status);
            if let (Some(started), Some(finished)) = (&result.started, finished.timestamp) {
                let minutes = (finished - started.timestamp) as f64 / 60.0;
                cell.metrics.insert(DURATION_METRIC.to_owned(), minutes);
            }
            if status == TestStatus::Fail {
                cell.message = "Build failed".to_owned();
            }
            cell
        }
        None => Cell {
            result: TestStatus::Running,
            message: "Build still running".to_owned(),
            ..Default::default()
        },
    };

    if !result.malformed.is_empty() {
        cell.message = format!("Malformed artifacts: {}", result.malformed.join(", "));
    }
    cell
}

fn pod_cell(info: &PodInfo) -> Option<Cell> {
    let pod = info.pod.as_ref()?;
    let status = &pod.status;
    let cell = match status.phase.as_deref() {
        Some("Succeeded") => Cell::new(TestStatus::Pass),
        Some("Failed") => {
            let message = match (status.reason.as_deref(), status.message.as_deref()) {
                (Some(reason), Some(message)) => format!("{reason}: {message}"),
                (Some(text), None) | (None, Some(text)) => text.to_owned(),
                (None, None) => "Pod failed".to_owned(),
            };
            Cell {
                result: TestStatus::Fail,
                message,
                ..Default::default()
            }
        }
        phase => Cell {
            result: TestStatus::Running,
            message: phase.unwrap_or("Pending").to_owned(),
            ..Default::default()
        },
    };
    Some(cell)
}

fn property_map(properties: &[Property]) -> BTreeMap<String, String> {
    // Later properties override earlier ones.
    properties
        .iter()
        .map(|p| (p.name.clone(), p.value.clone()))
        .collect()
}

/// Accumulates cells by row name, either merging or renaming duplicates.
struct Rows {
    merge: bool,
    cells: BTreeMap<String, Vec<Cell>>,
}

impl Rows {
    fn new(merge: bool) -> Self {
        Self {
            merge,
            cells: BTreeMap::new(),
        }
    }

    fn push(&mut self, name: String, cell: Cell) {
        if self.merge || !self.cells.contains_key(&name) {
            self.cells.entry(name).or_default().push(cell);
            return;
        }

        let unique = (1..)
            .map(|n| format!("{name} [{n}]"))
            .find(|candidate| !self.cells.contains_key(candidate))
            .unwrap_or(name);
        self.cells.insert(unique, vec![cell]);
    }

    fn finish(self) -> BTreeMap<String, Cell> {
        self.cells
            .into_iter()
            .filter_map(|(name, cells)| merge_cells(cells).map(|cell| (name, cell)))
            .collect()
    }
}

fn merge_cells(cells: Vec<Cell>) -> Option<Cell> {
    let total = cells.len();
    let passed = cells.iter().filter(|c| c.result.is_pass()).count();
    let failed = cells
        .iter()
        .filter(|c| c.result == TestStatus::Fail)
        .count();

    let mut first = cells.into_iter().next()?;
    if total == 1 || passed == total || failed == total {
        return Some(first);
    }

    first.result = TestStatus::Flaky;
    first.message = format!("{passed}/{total} runs passed");
    Some(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{Finished, Pod, PodStatus, Started},
        storage::SuitesMeta,
    };
    use gridline_junit::{NonSuccessKind, Report, Testcase, Testsuite};
    use maplit::btreemap;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn suites(cases: Vec<Testcase>) -> SuitesMeta {
        let mut suite = Testsuite::new("suite");
        suite.add_property(("Context", "suite-ctx"));
        for case in cases {
            suite.add_testcase(case);
        }
        let mut report = Report::default();
        report.add_testsuite(suite);
        SuitesMeta {
            suites: report,
            metadata: btreemap! { "Thread".to_owned() => "3".to_owned() },
            path: "gs://b/logs/job/42/artifacts/junit_3.xml".parse().unwrap(),
        }
    }

    fn result(cases: Vec<Testcase>) -> BuildResult {
        BuildResult {
            job: "job".into(),
            build: "42".into(),
            pod_info: None,
            started: Some(Started {
                timestamp: 100,
                ..Default::default()
            }),
            finished: Some(Finished {
                timestamp: Some(400),
                passed: Some(true),
                ..Default::default()
            }),
            suites: vec![suites(cases)],
            malformed: vec![],
        }
    }

    fn failed(name: &str, message: &str) -> Testcase {
        let mut status = TestcaseStatus::non_success(NonSuccessKind::Failure);
        status.set_message(message);
        Testcase::new(name, status)
    }

    #[test]
    fn header_and_overall() {
        let mut result = result(vec![]);
        result.started.as_mut().unwrap().metadata =
            btreemap! { "node".to_owned() => "n1".into() };
        result.finished.as_mut().unwrap().metadata =
            btreemap! { "version".to_owned() => "v2".into() };

        let col = convert_result(
            &NameConfig::default(),
            "42",
            &["version", "node", "missing"],
            &result,
            &GroupOptions::default(),
        );
        assert_eq!(
            col.column,
            Column {
                build: "42".into(),
                started: 100_000.0,
                hint: "42".into(),
                extra: vec!["v2".into(), "n1".into(), String::new()],
            }
        );

        let overall = &col.cells[OVERALL_ROW];
        assert_eq!(overall.result, TestStatus::Pass);
        assert_eq!(overall.metrics[DURATION_METRIC], 5.0);
    }

    #[test]
    fn running_and_malformed() {
        let mut result = result(vec![]);
        result.started = None;
        result.finished = None;
        result.malformed = vec!["finished.json".into(), "started.json".into()];

        let col = convert_result(
            &NameConfig::default(),
            "42",
            &[],
            &result,
            &GroupOptions::default(),
        );
        assert_eq!(col.column.started, 0.0);
        let overall = &col.cells[OVERALL_ROW];
        assert_eq!(overall.result, TestStatus::Running);
        assert_eq!(
            overall.message,
            "Malformed artifacts: finished.json, started.json"
        );
    }

    #[test]
    fn test_case_cells() {
        let mut timed = Testcase::new("TestTimed", TestcaseStatus::success());
        timed
            .set_time(Duration::from_millis(1500))
            .add_property(("coverage", "87.5"))
            .add_property(("owner", "team-a"));
        let mut skipped_quiet = Testcase::new("TestSkipQuiet", TestcaseStatus::skipped());
        skipped_quiet.add_property(("x", "y"));
        let mut skipped_loud = TestcaseStatus::skipped();
        skipped_loud.set_message("not on this platform");

        let result = result(vec![
            timed,
            failed("TestBroken", "assertion failed"),
            skipped_quiet,
            Testcase::new("TestSkipLoud", skipped_loud),
        ]);
        let opts = GroupOptions {
            merge: true,
            add_cell_id: true,
            metric_key: "coverage".into(),
            user_key: "owner".into(),
            ..Default::default()
        };
        let col = convert_result(&NameConfig::default(), "42", &[], &result, &opts);

        let names: Vec<_> = col.cells.keys().map(String::as_str).collect();
        assert_eq!(names, ["Overall", "TestBroken", "TestSkipLoud", "TestTimed"]);

        let timed = &col.cells["TestTimed"];
        assert_eq!(timed.result, TestStatus::Pass);
        assert_eq!(timed.metrics[ELAPSED_METRIC], 1.5);
        assert_eq!(timed.metrics["coverage"], 87.5);
        assert_eq!(timed.icon, "87.5");
        assert_eq!(timed.user_property.as_deref(), Some("team-a"));
        assert_eq!(timed.cell_id, "42");

        let broken = &col.cells["TestBroken"];
        assert_eq!(broken.result, TestStatus::Fail);
        assert_eq!(broken.message, "assertion failed");

        assert_eq!(col.cells["TestSkipLoud"].result, TestStatus::PassWithSkips);
    }

    #[test]
    fn names_use_metadata_priority() {
        let mut case = Testcase::new("TestFoo", TestcaseStatus::success());
        case.add_property(("Context", "case-ctx"));
        let result = result(vec![case, Testcase::new("TestBar", TestcaseStatus::success())]);
        let name_config = NameConfig::new(
            "%s [%s] #%s",
            [
                crate::name::NamePart::TestName,
                crate::name::NamePart::Metadata("Context".into()),
                crate::name::NamePart::Metadata("Thread".into()),
            ],
        );

        let col = convert_result(&name_config, "42", &[], &result, &GroupOptions::default());
        assert!(col.cells.contains_key("TestFoo [case-ctx] #3"));
        assert!(col.cells.contains_key("TestBar [suite-ctx] #3"));
    }

    #[test]
    fn duplicates_merge() {
        let result = result(vec![
            Testcase::new("TestDup", TestcaseStatus::success()),
            failed("TestDup", "boom"),
            failed("TestFail", "one"),
            failed("TestFail", "two"),
        ]);
        let opts = GroupOptions {
            merge: true,
            ..Default::default()
        };
        let col = convert_result(&NameConfig::default(), "42", &[], &result, &opts);

        let dup = &col.cells["TestDup"];
        assert_eq!(dup.result, TestStatus::Flaky);
        assert_eq!(dup.message, "1/2 runs passed");

        let fail = &col.cells["TestFail"];
        assert_eq!(fail.result, TestStatus::Fail);
        assert_eq!(fail.message, "one");
    }

    #[test]
    fn duplicates_renamed_without_merge() {
        let result = result(vec![
            Testcase::new("TestDup", TestcaseStatus::success()),
            failed("TestDup", "boom"),
            Testcase::new("TestDup", TestcaseStatus::success()),
        ]);
        let col = convert_result(
            &NameConfig::default(),
            "42",
            &[],
            &result,
            &GroupOptions::default(),
        );

        assert_eq!(col.cells["TestDup"].result, TestStatus::Pass);
        assert_eq!(col.cells["TestDup [1]"].result, TestStatus::Fail);
        assert_eq!(col.cells["TestDup [2]"].result, TestStatus::Pass);
    }

    #[test]
    fn pod_row() {
        let mut result = result(vec![]);
        result.pod_info = Some(PodInfo {
            pod: Some(Pod {
                status: PodStatus {
                    phase: Some("Failed".into()),
                    reason: Some("Evicted".into()),
                    message: Some("low on memory".into()),
                },
                ..Default::default()
            }),
        });

        let opts = GroupOptions {
            analyze_prow_job: true,
            ..Default::default()
        };
        let col = convert_result(&NameConfig::default(), "42", &[], &result, &opts);
        let pod = &col.cells[POD_ROW];
        assert_eq!(pod.result, TestStatus::Fail);
        assert_eq!(pod.message, "Evicted: low on memory");

        let col = convert_result(
            &NameConfig::default(),
            "42",
            &[],
            &result,
            &GroupOptions::default(),
        );
        assert!(!col.cells.contains_key(POD_ROW));
    }

    #[test]
    fn options_from_group() {
        let mut group = TestGroup::new("g", "bucket/logs/job");
        group.disable_prowjob_analysis = true;
        group.build_override_strftime = "%Y%m%d".into();
        group.user_property = "owner".into();
        assert_eq!(
            GroupOptions::from_group(&group),
            GroupOptions {
                merge: true,
                analyze_prow_job: false,
                add_cell_id: true,
                metric_key: String::new(),
                user_key: "owner".into(),
            }
        );
    }
}
