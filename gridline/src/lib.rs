// Copyright (c) The gridline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reads CI builds out of an object store mirror and prints them as test dashboard columns.
//!
//! The heavy lifting happens in [`gridline_updater`]; this crate wires configuration, logging,
//! the async runtime and Ctrl-C handling around it.

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::{OutputContext, OutputWriter};
