// Copyright (c) The gridline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rendering of test names from a configurable template.

use crate::config::elements::TestGroup;
use std::{collections::BTreeMap, fmt};

/// One value substituted into a name template.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum NamePart {
    /// The name of the job the build belongs to.
    JobName,

    /// The name of the test case.
    TestName,

    /// A metadata value, looked up by key.
    Metadata(String),
}

impl NamePart {
    /// The configured spelling of [`NamePart::JobName`].
    pub const JOB_NAME: &'static str = "Job name";

    /// The configured spelling of [`NamePart::TestName`].
    pub const TEST_NAME: &'static str = "Tests name";

    /// Parses a configured name element.
    pub fn from_key(key: &str) -> Self {
        match key {
            Self::JOB_NAME => Self::JobName,
            Self::TEST_NAME => Self::TestName,
            other => Self::Metadata(other.to_owned()),
        }
    }
}

impl fmt::Display for NamePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::JobName => f.write_str(Self::JOB_NAME),
            Self::TestName => f.write_str(Self::TEST_NAME),
            Self::Metadata(key) => f.write_str(key),
        }
    }
}

/// A name template: a format string where each `%s` is replaced by the next part.
///
/// `%%` renders a literal `%`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NameConfig {
    format: String,
    parts: Vec<NamePart>,
    multi_job: bool,
}

impl Default for NameConfig {
    fn default() -> Self {
        Self {
            format: "%s".to_owned(),
            parts: vec![NamePart::TestName],
            multi_job: false,
        }
    }
}

impl NameConfig {
    /// Creates a name config from a format and its parts.
    pub fn new(format: impl Into<String>, parts: impl IntoIterator<Item = NamePart>) -> Self {
        Self {
            format: format.into(),
            parts: parts.into_iter().collect(),
            multi_job: false,
        }
    }

    /// Builds the name config for a test group.
    ///
    /// Groups without a test name config render the test name alone. Groups that merge several
    /// jobs always include the job name.
    pub fn from_group(group: &TestGroup) -> Self {
        let mut config = match &group.test_name_config {
            Some(tnc) => Self::new(
                tnc.name_format.clone(),
                tnc.name_elements
                    .iter()
                    .map(|element| NamePart::from_key(element.key())),
            ),
            None => Self::default(),
        };
        if group.is_multi_job() {
            config.multi_job = true;
            config.ensure_job_name();
        }
        config
    }

    /// Returns the format string.
    pub fn format(&self) -> &str {
        &self.format
    }

    /// Returns the parts substituted into the format.
    pub fn parts(&self) -> &[NamePart] {
        &self.parts
    }

    /// Returns true if this config was built for a group merging several jobs.
    pub fn is_multi_job(&self) -> bool {
        self.multi_job
    }

    /// Prepends the job name to the template unless a part already refers to it.
    fn ensure_job_name(&mut self) {
        if self.parts.contains(&NamePart::JobName) {
            return;
        }
        self.format.insert_str(0, "%s.");
        self.parts.insert(0, NamePart::JobName);
    }

    /// Renders a name.
    ///
    /// Metadata parts are looked up in `metadata` in order; the first map holding the key wins. A
    /// key found nowhere, or a `%s` with no matching part, renders as an empty string.
    pub fn render(&self, job: &str, test: &str, metadata: &[&BTreeMap<String, String>]) -> String {
        let mut values = self.parts.iter().map(|part| match part {
            NamePart::JobName => job,
            NamePart::TestName => test,
            NamePart::Metadata(key) => metadata
                .iter()
                .find_map(|m| m.get(key))
                .map_or("", String::as_str),
        });

        let mut out = String::with_capacity(self.format.len() + test.len());
        let mut chars = self.format.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '%' {
                out.push(c);
                continue;
            }
            match chars.peek() {
                Some('s') => {
                    chars.next();
                    out.push_str(values.next().unwrap_or_default());
                }
                Some('%') => {
                    chars.next();
                    out.push('%');
                }
                _ => out.push('%'),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::elements::{NameElement, TestNameConfig};
    use maplit::btreemap;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn element(key: &str) -> NameElement {
        NameElement {
            target_config: key.to_owned(),
            ..Default::default()
        }
    }

    #[test]
    fn render_job_and_test() {
        let config = NameConfig::new("%s:%s", [NamePart::JobName, NamePart::TestName]);
        assert_eq!(config.render("j1", "t1", &[]), "j1:t1");
    }

    #[test]
    fn render_metadata_priority() {
        let config = NameConfig::new(
            "%s [%s] (%s)",
            [
                NamePart::TestName,
                NamePart::Metadata("Context".into()),
                NamePart::Metadata("missing".into()),
            ],
        );
        let case = btreemap! { "Context".to_owned() => "case".to_owned() };
        let suite = btreemap! {
            "Context".to_owned() => "suite".to_owned(),
            "other".to_owned() => "x".to_owned(),
        };
        assert_eq!(config.render("j", "t", &[&case, &suite]), "t [case] ()");
        assert_eq!(config.render("j", "t", &[&suite, &case]), "t [suite] ()");
    }

    #[test_case("100%% %s", "100% t"; "escaped percent")]
    #[test_case("%s %s", "t "; "too few parts")]
    #[test_case("50% off", "50% off"; "lone percent")]
    #[test_case("%d", "%d"; "unknown verb")]
    fn render_format_edge_cases(format: &str, expected: &str) {
        let config = NameConfig::new(format, [NamePart::TestName]);
        assert_eq!(config.render("j", "t", &[]), expected);
    }

    #[test]
    fn default_renders_test_name() {
        let group = TestGroup::new("g", "bucket/logs/job");
        let config = NameConfig::from_group(&group);
        assert_eq!(config, NameConfig::default());
        assert_eq!(config.render("job", "TestFoo", &[]), "TestFoo");
    }

    #[test]
    fn multi_job_prepends_job_name() {
        let group = TestGroup::new("g", "bucket/logs/a,bucket/logs/b");
        let config = NameConfig::from_group(&group);
        assert!(config.is_multi_job());
        assert_eq!(config.format(), "%s.%s");
        assert_eq!(config.parts(), [NamePart::JobName, NamePart::TestName]);
        assert_eq!(config.render("a", "TestFoo", &[]), "a.TestFoo");
    }

    #[test]
    fn multi_job_keeps_existing_job_name() {
        let mut group = TestGroup::new("g", "bucket/logs/a,bucket/logs/b");
        group.test_name_config = Some(TestNameConfig {
            name_format: "%s/%s".into(),
            name_elements: vec![element("Tests name"), element("Job name")],
        });
        let config = NameConfig::from_group(&group);
        assert_eq!(config.format(), "%s/%s");
        assert_eq!(config.parts(), [NamePart::TestName, NamePart::JobName]);

        // Building twice never adds the job name twice.
        assert_eq!(NameConfig::from_group(&group), config);
    }

    #[test]
    fn configured_elements() {
        let mut group = TestGroup::new("g", "bucket/logs/a");
        group.test_name_config = Some(TestNameConfig {
            name_format: "%s [%s]".into(),
            name_elements: vec![
                element("Tests name"),
                NameElement {
                    test_property: "Context".into(),
                    ..Default::default()
                },
            ],
        });
        let config = NameConfig::from_group(&group);
        let metadata = btreemap! { "Context".to_owned() => "e2e".to_owned() };
        assert_eq!(config.render("a", "TestFoo", &[&metadata]), "TestFoo [e2e]");
    }
}
