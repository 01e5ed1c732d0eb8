// Copyright (c) The gridline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Individual configuration elements.

mod concurrency;
mod test_group;

pub use concurrency::*;
pub use test_group::*;
