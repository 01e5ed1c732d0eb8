// Copyright (c) The gridline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read a `Report` from JUnit XML.
//!
//! The reader is lenient about attributes (unparseable times are dropped, unknown attributes are
//! kept in `extra`) but strict about XML well-formedness.

use crate::{
    NonSuccessKind, Output, Property, Report, TestRerun, Testcase, TestcaseStatus, Testsuite,
    errors::DeserializeError,
};
use chrono::DateTime;
use indexmap::IndexMap;
use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};
use std::time::Duration;

static TESTSUITES_TAG: &[u8] = b"testsuites";
static TESTSUITE_TAG: &[u8] = b"testsuite";
static TESTCASE_TAG: &[u8] = b"testcase";
static PROPERTY_TAG: &[u8] = b"property";
static FAILURE_TAG: &[u8] = b"failure";
static ERROR_TAG: &[u8] = b"error";
static SKIPPED_TAG: &[u8] = b"skipped";
static FLAKY_FAILURE_TAG: &[u8] = b"flakyFailure";
static FLAKY_ERROR_TAG: &[u8] = b"flakyError";
static SYSTEM_OUT_TAG: &[u8] = b"system-out";
static SYSTEM_ERR_TAG: &[u8] = b"system-err";

/// Where text nodes are currently being accumulated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TextTarget {
    None,
    StatusDescription,
    PropertyValue,
    SystemOut,
    SystemErr,
}

#[derive(Debug, Default)]
struct ReportBuilder {
    report: Report,
    saw_root: bool,
    suites: Vec<Testsuite>,
    testcase: Option<Testcase>,
    pending_property: Option<String>,
    text: String,
}

pub(crate) fn deserialize_report(bytes: &[u8]) -> Result<Report, DeserializeError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut builder = ReportBuilder::default();
    let mut target = TextTarget::None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                target = builder.start(&e)?;
            }
            Event::Empty(e) => {
                builder.start(&e)?;
                builder.end(e.name().as_ref());
                target = TextTarget::None;
            }
            Event::End(e) => {
                builder.end(e.name().as_ref());
                target = TextTarget::None;
            }
            Event::Text(t) if target != TextTarget::None => {
                builder.text.push_str(&t.unescape()?);
            }
            Event::CData(c) if target != TextTarget::None => {
                builder.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !builder.saw_root {
        return Err(DeserializeError::MissingRoot);
    }
    Ok(builder.finish())
}

impl ReportBuilder {
    fn start(&mut self, e: &BytesStart<'_>) -> Result<TextTarget, DeserializeError> {
        let name = e.name();
        let name = name.as_ref();

        if !self.saw_root {
            if name != TESTSUITES_TAG && name != TESTSUITE_TAG {
                return Err(DeserializeError::UnexpectedRoot {
                    name: String::from_utf8_lossy(name).into_owned(),
                });
            }
            self.saw_root = true;
        }

        let mut attrs = read_attributes(e)?;
        self.text.clear();

        let target = if name == TESTSUITES_TAG {
            self.report.name = attrs.shift_remove("name");
            self.report.time = attrs.get("time").and_then(|t| parse_time(t));
            TextTarget::None
        } else if name == TESTSUITE_TAG {
            let mut suite = Testsuite::new(attrs.shift_remove("name").unwrap_or_default());
            suite.time = attrs.shift_remove("time").and_then(|t| parse_time(&t));
            suite.timestamp = attrs
                .shift_remove("timestamp")
                .and_then(|t| DateTime::parse_from_rfc3339(&t).ok());
            // Counts are recomputed from the testcases that are actually present.
            for count in ["tests", "failures", "errors", "skipped", "disabled"] {
                attrs.shift_remove(count);
            }
            suite.extra = attrs;
            self.suites.push(suite);
            TextTarget::None
        } else if name == TESTCASE_TAG {
            let mut testcase = Testcase::new(
                attrs.shift_remove("name").unwrap_or_default(),
                TestcaseStatus::success(),
            );
            testcase.classname = attrs.shift_remove("classname");
            testcase.time = attrs.shift_remove("time").and_then(|t| parse_time(&t));
            testcase.extra = attrs;
            self.testcase = Some(testcase);
            TextTarget::None
        } else if name == FAILURE_TAG || name == ERROR_TAG {
            let kind = if name == FAILURE_TAG {
                NonSuccessKind::Failure
            } else {
                NonSuccessKind::Error
            };
            if let Some(testcase) = &mut self.testcase {
                testcase.status = TestcaseStatus::NonSuccess {
                    kind,
                    message: attrs.shift_remove("message"),
                    ty: attrs.shift_remove("type"),
                    description: None,
                };
            }
            TextTarget::StatusDescription
        } else if name == SKIPPED_TAG {
            if let Some(testcase) = &mut self.testcase {
                // A skip never overrides a recorded failure.
                if !matches!(testcase.status, TestcaseStatus::NonSuccess { .. }) {
                    testcase.status = TestcaseStatus::Skipped {
                        message: attrs.shift_remove("message"),
                        description: None,
                    };
                }
            }
            TextTarget::StatusDescription
        } else if name == FLAKY_FAILURE_TAG || name == FLAKY_ERROR_TAG {
            let kind = if name == FLAKY_FAILURE_TAG {
                NonSuccessKind::Failure
            } else {
                NonSuccessKind::Error
            };
            if let Some(Testcase {
                status: TestcaseStatus::Success { flaky_runs },
                ..
            }) = &mut self.testcase
            {
                flaky_runs.push(TestRerun {
                    kind,
                    message: attrs.shift_remove("message"),
                });
            }
            TextTarget::None
        } else if name == PROPERTY_TAG {
            let prop_name = attrs.shift_remove("name").unwrap_or_default();
            match attrs.shift_remove("value") {
                Some(value) => {
                    self.add_property(Property::new(prop_name, value));
                    TextTarget::None
                }
                None => {
                    self.pending_property = Some(prop_name);
                    TextTarget::PropertyValue
                }
            }
        } else if name == SYSTEM_OUT_TAG {
            TextTarget::SystemOut
        } else if name == SYSTEM_ERR_TAG {
            TextTarget::SystemErr
        } else {
            TextTarget::None
        };

        Ok(target)
    }

    fn end(&mut self, name: &[u8]) {
        let text = std::mem::take(&mut self.text);

        if name == TESTSUITE_TAG {
            if let Some(suite) = self.suites.pop() {
                self.report.testsuites.push(suite);
            }
        } else if name == TESTCASE_TAG {
            if let Some(testcase) = self.testcase.take() {
                self.current_suite().add_testcase(testcase);
            }
        } else if name == FAILURE_TAG || name == ERROR_TAG || name == SKIPPED_TAG {
            if let Some(testcase) = &mut self.testcase {
                if let TestcaseStatus::NonSuccess { description, .. }
                | TestcaseStatus::Skipped { description, .. } = &mut testcase.status
                {
                    if !text.is_empty() && description.is_none() {
                        *description = Some(text);
                    }
                }
            }
        } else if name == PROPERTY_TAG {
            if let Some(prop_name) = self.pending_property.take() {
                self.add_property(Property::new(prop_name, text));
            }
        } else if name == SYSTEM_OUT_TAG || name == SYSTEM_ERR_TAG {
            let output = Some(Output::new(text));
            let is_out = name == SYSTEM_OUT_TAG;
            if let Some(testcase) = &mut self.testcase {
                if is_out {
                    testcase.system_out = output;
                } else {
                    testcase.system_err = output;
                }
            } else {
                let suite = self.current_suite();
                if is_out {
                    suite.system_out = output;
                } else {
                    suite.system_err = output;
                }
            }
        }
    }

    fn add_property(&mut self, property: Property) {
        if let Some(testcase) = &mut self.testcase {
            testcase.add_property(property);
        } else {
            self.current_suite().add_property(property);
        }
    }

    /// Returns the innermost open suite, opening an anonymous one for testcases that appear
    /// directly beneath `<testsuites>`.
    fn current_suite(&mut self) -> &mut Testsuite {
        if self.suites.is_empty() {
            self.suites.push(Testsuite::default());
        }
        let last = self.suites.len() - 1;
        &mut self.suites[last]
    }

    fn finish(mut self) -> Report {
        // Suites left open by a lenient producer are still reported.
        while let Some(suite) = self.suites.pop() {
            self.report.testsuites.push(suite);
        }
        self.report
    }
}

fn read_attributes(e: &BytesStart<'_>) -> Result<IndexMap<String, String>, DeserializeError> {
    let mut attrs = IndexMap::new();
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        attrs.insert(key, value);
    }
    Ok(attrs)
}

fn parse_time(s: &str) -> Option<Duration> {
    // Some harnesses emit thousands separators.
    let secs: f64 = s.replace(',', "").trim().parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}
