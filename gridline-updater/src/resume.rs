// Copyright (c) The gridline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Estimating where to resume reading from previously read columns.

use crate::{column::InflatedColumn, helpers::natural_less};
use chrono::{DateTime, TimeDelta, Utc};

/// Returns the naturally greatest hint and the latest start time across `cols`.
///
/// An empty slice yields an empty hint and the Unix epoch.
///
/// The start time is split into whole seconds (truncated) and a millisecond offset taken as the
/// IEEE remainder of the millisecond value, so e.g. `1500.0` maps to 1s - 500ms.
pub fn hint_started(cols: &[InflatedColumn]) -> (String, DateTime<Utc>) {
    let mut hint: &str = "";
    let mut started = 0.0_f64;
    for (i, col) in cols.iter().enumerate() {
        if i == 0 || natural_less(hint, &col.column.hint) {
            hint = &col.column.hint;
        }
        if i == 0 || col.column.started > started {
            started = col.column.started;
        }
    }

    (hint.to_owned(), millis_to_time(started))
}

/// Returns the later of `stop` and `newest`.
pub fn advance_stop(stop: DateTime<Utc>, newest: DateTime<Utc>) -> DateTime<Utc> {
    stop.max(newest)
}

/// The stop threshold in milliseconds: the stop time's whole seconds times 1000.
pub fn stop_millis(stop: DateTime<Utc>) -> i64 {
    stop.timestamp().saturating_mul(1000)
}

/// Returns true if a column that started at `started` milliseconds is older than the threshold.
pub fn started_before(started: f64, stop_millis: i64) -> bool {
    (started as i64) < stop_millis
}

fn millis_to_time(millis: f64) -> DateTime<Utc> {
    let secs = (millis / 1000.0) as i64;
    let offset = ieee_remainder(millis, 1000.0) as i64;
    DateTime::from_timestamp(secs, 0)
        .and_then(|t| t.checked_add_signed(TimeDelta::milliseconds(offset)))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// `x - n * y` where `n` is `x / y` rounded to the nearest integer, ties to even.
fn ieee_remainder(x: f64, y: f64) -> f64 {
    x - (x / y).round_ties_even() * y
}
