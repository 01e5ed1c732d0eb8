// Copyright (c) The gridline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for reading builds into columns.

mod basic;
mod fixtures;
mod local;
