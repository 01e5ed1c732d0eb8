// Copyright (c) The gridline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read JUnit reports in Rust.
//!
//! The data model mirrors the common subset of JUnit/XUnit XML emitted by CI test harnesses:
//! suites, testcases, properties and failure/skip status.

mod deserialize;
mod errors;
mod report;

pub use errors::DeserializeError;
pub use report::*;
