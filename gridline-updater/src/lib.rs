// Copyright (c) The gridline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for gridline: reading CI builds out of an object store and turning them
//! into dashboard columns.
//!
//! The basic flow for a test group is:
//!
//! 1. [`config::GridlineConfig`] loads the test groups and reader settings.
//! 2. [`storage::list_builds`] lists the builds under the group's prefixes, newest first.
//! 3. [`read::read_columns`] reads those builds concurrently, stopping early once it reaches
//!    builds older than the stop time.
//! 4. [`convert::convert_result`] turns each build's artifacts into an
//!    [`InflatedColumn`](column::InflatedColumn): one cell per test, plus overall and pod rows.
//!
//! [`read::ColumnReader`] drives steps 2 to 4, resuming from columns read on a previous pass.

pub mod column;
pub mod config;
pub mod convert;
pub mod errors;
mod helpers;
pub mod metadata;
pub mod name;
pub mod read;
pub mod resume;
pub mod storage;

pub use helpers::{natural_cmp, natural_less};
