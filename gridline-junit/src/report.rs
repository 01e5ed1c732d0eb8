// Copyright (c) The gridline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{deserialize::deserialize_report, errors::DeserializeError};
use chrono::{DateTime, FixedOffset};
use indexmap::map::IndexMap;
use std::time::Duration;

/// The root element of a JUnit report.
///
/// Files with a bare `<testsuite>` root are read as a report containing a single suite.
#[derive(Clone, Debug, Default)]
pub struct Report {
    /// The name of this report, if the root element carried one.
    pub name: Option<String>,

    /// The overall time taken by the test run.
    pub time: Option<Duration>,

    /// The test suites contained in this report.
    pub testsuites: Vec<Testsuite>,
}

impl Report {
    /// Reads a report from raw XML bytes.
    pub fn deserialize_from_slice(bytes: &[u8]) -> Result<Self, DeserializeError> {
        deserialize_report(bytes)
    }

    /// Reads a report from an XML string.
    pub fn deserialize_from_str(s: &str) -> Result<Self, DeserializeError> {
        deserialize_report(s.as_bytes())
    }

    /// Adds a testsuite to this report.
    pub fn add_testsuite(&mut self, testsuite: Testsuite) -> &mut Self {
        self.testsuites.push(testsuite);
        self
    }

    /// Returns the total number of testcases across all suites.
    pub fn testcase_count(&self) -> usize {
        self.testsuites.iter().map(|s| s.testcases.len()).sum()
    }

    /// Iterates over every testcase along with the suite it belongs to.
    pub fn testcases(&self) -> impl Iterator<Item = (&Testsuite, &Testcase)> {
        self.testsuites
            .iter()
            .flat_map(|suite| suite.testcases.iter().map(move |case| (suite, case)))
    }

    /// Keeps at most `max` testcases across all suites, dropping the rest.
    ///
    /// Suites are visited in document order; suites left without any testcases are kept so that
    /// their properties remain available.
    pub fn truncate(&mut self, max: usize) {
        let mut remaining = max;
        for suite in &mut self.testsuites {
            if suite.testcases.len() > remaining {
                suite.testcases.truncate(remaining);
            }
            remaining -= suite.testcases.len();
        }
    }
}

/// Represents a single testsuite.
#[derive(Clone, Debug, Default)]
#[non_exhaustive]
pub struct Testsuite {
    /// The name of this testsuite.
    pub name: String,

    /// The overall time taken by the testsuite.
    pub time: Option<Duration>,

    /// The time at which the testsuite began execution.
    pub timestamp: Option<DateTime<FixedOffset>>,

    /// The testcases that form this testsuite.
    pub testcases: Vec<Testcase>,

    /// Custom properties recorded for the whole suite.
    pub properties: Vec<Property>,

    /// Data written to standard output while the testsuite was executed.
    pub system_out: Option<Output>,

    /// Data written to standard error while the testsuite was executed.
    pub system_err: Option<Output>,

    /// Attributes other than the ones modeled above, such as "hostname" or "package".
    pub extra: IndexMap<String, String>,
}

impl Testsuite {
    /// Creates a new, empty `Testsuite`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Adds a property to this testsuite.
    pub fn add_property(&mut self, property: impl Into<Property>) -> &mut Self {
        self.properties.push(property.into());
        self
    }

    /// Adds a testcase to this testsuite.
    pub fn add_testcase(&mut self, testcase: Testcase) -> &mut Self {
        self.testcases.push(testcase);
        self
    }

    /// Looks up a suite-level property by name. The last definition wins.
    pub fn property(&self, name: &str) -> Option<&str> {
        find_property(&self.properties, name)
    }
}

/// Represents a single testcase.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct Testcase {
    /// The name of the testcase.
    pub name: String,

    /// The "classname" of the testcase.
    pub classname: Option<String>,

    /// The time it took to execute this testcase.
    pub time: Option<Duration>,

    /// The status of this test.
    pub status: TestcaseStatus,

    /// Properties attached directly to the testcase.
    ///
    /// Not part of the original JUnit schema, but emitted by many harnesses to carry metrics and
    /// test metadata.
    pub properties: Vec<Property>,

    /// Data written to standard output while the testcase was executed.
    pub system_out: Option<Output>,

    /// Data written to standard error while the testcase was executed.
    pub system_err: Option<Output>,

    /// Attributes other than the ones modeled above.
    pub extra: IndexMap<String, String>,
}

impl Testcase {
    /// Creates a new testcase.
    pub fn new(name: impl Into<String>, status: TestcaseStatus) -> Self {
        Self {
            name: name.into(),
            classname: None,
            time: None,
            status,
            properties: vec![],
            system_out: None,
            system_err: None,
            extra: IndexMap::new(),
        }
    }

    /// Sets the time taken by this testcase.
    pub fn set_time(&mut self, time: Duration) -> &mut Self {
        self.time = Some(time);
        self
    }

    /// Adds a property to this testcase.
    pub fn add_property(&mut self, property: impl Into<Property>) -> &mut Self {
        self.properties.push(property.into());
        self
    }

    /// Looks up a testcase-level property by name. The last definition wins.
    pub fn property(&self, name: &str) -> Option<&str> {
        find_property(&self.properties, name)
    }
}

fn find_property<'a>(properties: &'a [Property], name: &str) -> Option<&'a str> {
    properties
        .iter()
        .rev()
        .find(|p| p.name == name)
        .map(|p| p.value.as_str())
}

/// Represents the success or failure of a testcase.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TestcaseStatus {
    /// This testcase passed.
    Success {
        /// Prior failed runs of the test, read from `flakyFailure` or `flakyError`.
        flaky_runs: Vec<TestRerun>,
    },

    /// This testcase did not pass.
    NonSuccess {
        /// Whether this testcase failed in an expected way (failure) or an unexpected way (error).
        kind: NonSuccessKind,

        /// The failure message.
        message: Option<String>,

        /// The "type" of failure that occurred.
        ty: Option<String>,

        /// The text node of the failure element.
        description: Option<String>,
    },

    /// This testcase was not run.
    Skipped {
        /// The skip message.
        message: Option<String>,

        /// The text node of the skipped element.
        description: Option<String>,
    },
}

impl TestcaseStatus {
    /// Creates a new `TestcaseStatus` that represents a successful test.
    pub fn success() -> Self {
        TestcaseStatus::Success { flaky_runs: vec![] }
    }

    /// Creates a new `TestcaseStatus` that represents an unsuccessful test.
    pub fn non_success(kind: NonSuccessKind) -> Self {
        TestcaseStatus::NonSuccess {
            kind,
            message: None,
            ty: None,
            description: None,
        }
    }

    /// Creates a new `TestcaseStatus` that represents a skipped test.
    pub fn skipped() -> Self {
        TestcaseStatus::Skipped {
            message: None,
            description: None,
        }
    }

    /// Sets the message. No-op for successes.
    pub fn set_message(&mut self, new_message: impl Into<String>) -> &mut Self {
        match self {
            TestcaseStatus::Success { .. } => {}
            TestcaseStatus::NonSuccess { message, .. } | TestcaseStatus::Skipped { message, .. } => {
                *message = Some(new_message.into());
            }
        }
        self
    }

    /// Returns the message, falling back to the description if no message was recorded.
    pub fn message(&self) -> Option<&str> {
        match self {
            TestcaseStatus::Success { .. } => None,
            TestcaseStatus::NonSuccess {
                message,
                description,
                ..
            }
            | TestcaseStatus::Skipped {
                message,
                description,
            } => message
                .as_deref()
                .filter(|m| !m.is_empty())
                .or(description.as_deref().filter(|d| !d.is_empty())),
        }
    }
}

/// A prior run of a testcase that eventually passed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestRerun {
    /// Whether the run failed or errored.
    pub kind: NonSuccessKind,

    /// The failure message.
    pub message: Option<String>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NonSuccessKind {
    /// An expected failure, read from `failure`.
    Failure,

    /// An unexpected error, read from `error`.
    Error,
}

/// A name/value property recorded during test execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Property {
    /// The name of the property.
    pub name: String,

    /// The value of the property.
    pub value: String,
}

impl Property {
    /// Creates a new `Property` instance.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl<T> From<(T, T)> for Property
where
    T: Into<String>,
{
    fn from((k, v): (T, T)) -> Self {
        Property::new(k, v)
    }
}

/// Text written to standard output or standard error during test execution.
///
/// Non-printable control characters are stripped on construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Output {
    output: Box<str>,
}

impl Output {
    /// Creates a new output, removing any non-printable characters from it.
    pub fn new(output: impl AsRef<str>) -> Self {
        let output = output
            .as_ref()
            .replace(
                |c| matches!(c, '\x00'..='\x08' | '\x0b' | '\x0c' | '\x0e'..='\x1f'),
                "",
            )
            .into_boxed_str();
        Self { output }
    }

    /// Returns the output.
    pub fn as_str(&self) -> &str {
        &self.output
    }
}

impl AsRef<str> for Output {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}
