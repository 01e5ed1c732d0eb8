// Copyright (c) The gridline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The column model: the digested, storable form of one build.

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// One build's column header.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Column {
    /// The build identifier shown in the header.
    pub build: String,

    /// Start time in milliseconds since the epoch.
    pub started: f64,

    /// An opaque resume marker, ordered naturally across builds.
    #[serde(default)]
    pub hint: String,

    /// One value per configured column header.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<String>,
}

/// A column along with every cell it contains, keyed by row name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InflatedColumn {
    /// The column header.
    pub column: Column,

    /// The cells in this column.
    #[serde(default)]
    pub cells: BTreeMap<String, Cell>,
}

/// The outcome of one row in one column.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Cell {
    /// The test status.
    pub result: TestStatus,

    /// A message explaining the result, typically a failure message.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    /// Short text shown in place of the status icon.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub icon: String,

    /// Numeric metrics by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, f64>,

    /// The value of the group's user property, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_property: Option<String>,

    /// An identifier for the build this cell came from.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cell_id: String,
}

impl Cell {
    /// Creates a cell with the given result and nothing else.
    pub fn new(result: TestStatus) -> Self {
        Self {
            result,
            ..Default::default()
        }
    }
}

/// The status of a cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestStatus {
    /// No result was recorded.
    #[default]
    NoResult,

    /// The test passed.
    Pass,

    /// The test passed but some of it was skipped.
    PassWithSkips,

    /// The build is still running.
    Running,

    /// The test both passed and failed.
    Flaky,

    /// The test failed.
    Fail,
}

impl TestStatus {
    /// Returns true for statuses that count as passing.
    pub fn is_pass(self) -> bool {
        matches!(self, Self::Pass | Self::PassWithSkips)
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoResult => "no result",
            Self::Pass => "pass",
            Self::PassWithSkips => "pass with skips",
            Self::Running => "running",
            Self::Flaky => "flaky",
            Self::Fail => "fail",
        };
        f.write_str(s)
    }
}
