// Copyright (c) The gridline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! General support code for gridline-updater.

use std::cmp::Ordering;

/// Utilities for pluralizing various words based on count or plurality.
pub mod plural {
    /// Returns "build" if `count` is 1, otherwise "builds".
    pub fn builds_str(count: usize) -> &'static str {
        if count == 1 { "build" } else { "builds" }
    }

    /// Returns "key" if `count` is 1, otherwise "keys".
    pub fn keys_str(count: usize) -> &'static str {
        if count == 1 { "key" } else { "keys" }
    }

    /// Returns "column" if `count` is 1, otherwise "columns".
    pub fn columns_str(count: usize) -> &'static str {
        if count == 1 { "column" } else { "columns" }
    }
}

/// Compares two strings in natural order: runs of ASCII digits compare numerically, everything
/// else compares bytewise.
///
/// * Digits sort before non-digits at the first point of difference.
/// * Leading zeros are ignored when comparing numbers; if two numbers are otherwise equal, the one
///   with fewer leading zeros sorts first.
/// * A string that is a prefix of another sorts first.
///
/// Two strings compare equal if and only if they are identical, so this is a total order.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    let (mut i, mut j) = (0, 0);

    while i < a.len() && j < b.len() {
        let (c1, c2) = (a[i], b[j]);
        match (c1.is_ascii_digit(), c2.is_ascii_digit()) {
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => {
                if c1 != c2 {
                    return c1.cmp(&c2);
                }
                i += 1;
                j += 1;
            }
            (true, true) => {
                while i < a.len() && a[i] == b'0' {
                    i += 1;
                }
                while j < b.len() && b[j] == b'0' {
                    j += 1;
                }
                let (start1, start2) = (i, j);
                while i < a.len() && a[i].is_ascii_digit() {
                    i += 1;
                }
                while j < b.len() && b[j].is_ascii_digit() {
                    j += 1;
                }

                // With leading zeros stripped, the shorter number is smaller and equal-length
                // numbers compare lexically.
                let ord = (i - start1)
                    .cmp(&(j - start2))
                    .then_with(|| a[start1..i].cmp(&b[start2..j]))
                    .then_with(|| start1.cmp(&start2));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }

    a.len().cmp(&b.len())
}

/// Returns true if `a` sorts strictly before `b` in natural order.
#[inline]
pub fn natural_less(a: &str, b: &str) -> bool {
    natural_cmp(a, b) == Ordering::Less
}
