// Copyright (c) The gridline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reading builds into columns.
//!
//! The read proceeds in three layers:
//!
//! * [`read_suites`] lists a build's artifacts and downloads its JUnit files, as two concurrent
//!   stages connected by a channel of object names.
//! * [`read_result`] downloads everything a build produced: pod info, `started.json`,
//!   `finished.json` and the suites. Missing artifacts are recorded rather than failing the build.
//! * [`read_columns`] reads many builds with a bounded pool of workers, converting each into a
//!   column, and stops early once it reaches builds older than the stop time.
//!
//! [`ColumnReader`] ties these together for a single test group.

mod columns;
mod result;
mod suites;

pub use columns::*;
pub use result::*;
pub use suites::*;
