// Copyright (c) The gridline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration support for gridline.
//!
//! Configuration is read from a TOML file layered over an embedded default config. See
//! [`GridlineConfig`] for the entry point and [`elements`] for the individual settings.

pub mod elements;
mod imp;

pub use imp::*;
