// Copyright (c) The gridline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{errors::GroupPathError, storage::ObjectPath};
use serde::{Deserialize, Serialize};

/// A test group: a set of jobs whose builds are read into a single column history.
///
/// Declared in the config as a `[[test-group]]` table.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct TestGroup {
    /// The unique name of the group.
    pub name: String,

    /// The storage prefix of the group's job, without the `gs://` scheme.
    ///
    /// Multiple jobs may be merged into one group by separating their prefixes with commas.
    pub gcs_prefix: String,

    /// Metadata values shown as extra headers on every column.
    #[serde(default)]
    pub column_header: Vec<ColumnHeader>,

    /// If true, repeated runs of a test within a build get their own rows instead of being merged
    /// into one cell.
    #[serde(default)]
    pub disable_merged_status: bool,

    /// If true, pod information is not turned into a `Pod` row.
    #[serde(default)]
    pub disable_prowjob_analysis: bool,

    /// A strftime-style format for build identifiers. When set, every cell carries its build id.
    #[serde(default)]
    pub build_override_strftime: String,

    /// A test property holding a numeric metric to show as each cell's short text.
    #[serde(default)]
    pub short_text_metric: String,

    /// A test property copied onto each cell.
    #[serde(default)]
    pub user_property: String,

    /// How test names are rendered. Test names are used verbatim if absent.
    #[serde(default)]
    pub test_name_config: Option<TestNameConfig>,
}

impl TestGroup {
    /// Creates a group with the given name and prefix, and default settings otherwise.
    pub fn new(name: impl Into<String>, gcs_prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            gcs_prefix: gcs_prefix.into(),
            ..Default::default()
        }
    }

    /// Returns true if this group merges several jobs.
    pub fn is_multi_job(&self) -> bool {
        self.gcs_prefix.contains(',')
    }

    /// Resolves the group's job prefixes into storage paths, one per comma-separated element.
    pub fn paths(&self) -> Result<Vec<ObjectPath>, GroupPathError> {
        if self.gcs_prefix.trim().is_empty() {
            return Err(GroupPathError::Empty {
                group: self.name.clone(),
            });
        }

        self.gcs_prefix
            .split(',')
            .map(|element| {
                let trimmed = element.trim();
                let trimmed = trimmed.strip_prefix(ObjectPath::SCHEME).unwrap_or(trimmed);
                format!("{}{trimmed}", ObjectPath::SCHEME)
                    .parse::<ObjectPath>()
                    .map(|path| path.as_dir())
                    .map_err(|err| GroupPathError::InvalidElement {
                        group: self.name.clone(),
                        element: element.to_owned(),
                        err,
                    })
            })
            .collect()
    }

    /// Returns the metadata keys configured as column headers.
    pub fn column_headers(&self) -> Vec<&str> {
        self.column_header
            .iter()
            .map(|header| header.configuration_value.as_str())
            .collect()
    }
}

/// A column header, filled in from build metadata.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct ColumnHeader {
    /// The metadata key whose value is shown.
    #[serde(default)]
    pub configuration_value: String,
}

/// The template used to render test names.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct TestNameConfig {
    /// A format string where each `%s` is replaced by the next name element.
    pub name_format: String,

    /// The values substituted into the format, in order.
    #[serde(default)]
    pub name_elements: Vec<NameElement>,
}

/// One value substituted into a [`TestNameConfig`] format.
///
/// `target-config` takes precedence over `test-property` when both are set.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct NameElement {
    /// Either `Tests name`, `Job name`, or a metadata key.
    #[serde(default)]
    pub target_config: String,

    /// A test property or metadata key.
    #[serde(default)]
    pub test_property: String,
}

impl NameElement {
    /// Returns the first non-empty field.
    pub fn key(&self) -> &str {
        if self.target_config.is_empty() {
            &self.test_property
        } else {
            &self.target_config
        }
    }
}
