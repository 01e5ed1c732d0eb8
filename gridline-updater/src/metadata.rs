// Copyright (c) The gridline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Build metadata files written next to each build's artifacts.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Free-form metadata attached to `started.json` or `finished.json`.
pub type Metadata = BTreeMap<String, Value>;

/// The contents of `started.json`, written when a build begins.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Started {
    /// Start time in seconds since the epoch.
    pub timestamp: i64,

    /// The node the build ran on.
    pub node: Option<String>,

    /// The version of the code under test.
    #[serde(alias = "repo-version")]
    pub repo_version: Option<String>,

    /// Additional metadata.
    pub metadata: Metadata,
}

/// The contents of `finished.json`, written when a build completes.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Finished {
    /// Completion time in seconds since the epoch.
    pub timestamp: Option<i64>,

    /// Whether the build passed.
    pub passed: Option<bool>,

    /// The textual result, typically `SUCCESS` or `FAILURE`.
    pub result: Option<String>,

    /// Additional metadata.
    pub metadata: Metadata,
}

impl Finished {
    /// Returns whether the build passed, consulting `result` if `passed` is absent.
    pub fn passed(&self) -> bool {
        match (self.passed, &self.result) {
            (Some(passed), _) => passed,
            (None, Some(result)) => result.eq_ignore_ascii_case("SUCCESS"),
            (None, None) => false,
        }
    }
}

/// The contents of `podinfo.json`, describing the pod a build ran in.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct PodInfo {
    /// The pod, if one was recorded.
    pub pod: Option<Pod>,
}

/// A summary of a Kubernetes pod.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Pod {
    /// Pod metadata.
    pub metadata: PodMetadata,

    /// Pod status.
    pub status: PodStatus,
}

/// Pod metadata relevant to build analysis.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct PodMetadata {
    /// The pod's name.
    pub name: Option<String>,
}

/// Pod status relevant to build analysis.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct PodStatus {
    /// The pod phase, such as `Succeeded` or `Failed`.
    pub phase: Option<String>,

    /// A machine-readable reason for the current phase.
    pub reason: Option<String>,

    /// A human-readable message about the current phase.
    pub message: Option<String>,
}

/// Renders a metadata map as strings for name rendering and column headers.
///
/// Strings are used verbatim; other values are rendered as JSON.
pub fn string_metadata(metadata: &Metadata) -> BTreeMap<String, String> {
    metadata
        .iter()
        .map(|(k, v)| {
            let v = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), v)
        })
        .collect()
}
