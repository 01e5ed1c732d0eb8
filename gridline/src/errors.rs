// Copyright (c) The gridline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING, StderrStyles};
use camino::Utf8PathBuf;
use gridline_updater::errors::{ConfigParseError, ReadColumnsError};
use itertools::Itertools;
use owo_colors::OwoColorize;
use std::error::Error;
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

/// Documented exit codes for `gridline` failures.
///
/// Unknown or unexpected failures always result in exit code 1.
pub enum GridlineExitCode {}

impl GridlineExitCode {
    /// No errors occurred and gridline exited normally.
    pub const OK: i32 = 0;

    /// Reading builds into columns failed.
    pub const READ_FAILED: i32 = 100;

    /// The read was interrupted, or a build took too long to read.
    pub const READ_INTERRUPTED: i32 = 101;

    /// Writing data to stdout produced an error.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;

    /// A user issue happened while setting up the read.
    pub const SETUP_ERROR: i32 = 96;
}

// The #[error()] strings are placeholders: errors are meant to be printed with
// display_to_stderr, which adds colors and the chain of causes.

/// An error that gridline expects to run into, with a documented exit code.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("config parse error")]
    ConfigParseError { err: Box<ConfigParseError> },
    #[error("unknown test groups")]
    UnknownTestGroups {
        unknown: Vec<String>,
        known: Vec<String>,
    },
    #[error("no test groups")]
    NoTestGroups { config_file: Option<Utf8PathBuf> },
    #[error("error reading previous columns")]
    PreviousReadError {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("error parsing previous columns")]
    PreviousParseError {
        path: Utf8PathBuf,
        #[source]
        err: serde_json::Error,
    },
    #[error("error creating async runtime")]
    RuntimeCreateError {
        #[source]
        err: std::io::Error,
    },
    #[error("error reading columns")]
    ReadColumnsError {
        group: String,
        #[source]
        err: ReadColumnsError,
    },
    #[error("error writing output")]
    WriteOutputError {
        #[source]
        err: std::io::Error,
    },
}

impl ExpectedError {
    pub(crate) fn config_parse_error(err: ConfigParseError) -> Self {
        Self::ConfigParseError { err: Box::new(err) }
    }

    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::ConfigParseError { .. }
            | Self::UnknownTestGroups { .. }
            | Self::NoTestGroups { .. }
            | Self::PreviousReadError { .. }
            | Self::PreviousParseError { .. }
            | Self::RuntimeCreateError { .. } => GridlineExitCode::SETUP_ERROR,
            Self::ReadColumnsError { err, .. } if err.is_timeout() => {
                GridlineExitCode::READ_INTERRUPTED
            }
            Self::ReadColumnsError { .. } => GridlineExitCode::READ_FAILED,
            Self::WriteOutputError { .. } => GridlineExitCode::WRITE_OUTPUT_ERROR,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match self {
            Self::ConfigParseError { err } => {
                error!(
                    "failed to parse config file `{}`",
                    err.config_file().style(styles.bold)
                );
                Some(err.kind() as &dyn Error)
            }
            Self::UnknownTestGroups { unknown, known } => {
                let known = if known.is_empty() {
                    "(none)".to_owned()
                } else {
                    known
                        .iter()
                        .map(|name| name.style(styles.bold).to_string())
                        .join(", ")
                };
                error!(
                    "unknown test {} {} (known groups: {known})",
                    if unknown.len() == 1 { "group" } else { "groups" },
                    unknown
                        .iter()
                        .map(|name| name.style(styles.warning_text).to_string())
                        .join(", "),
                );
                None
            }
            Self::NoTestGroups { config_file } => {
                match config_file {
                    Some(config_file) => error!(
                        "no test groups defined in `{}`",
                        config_file.style(styles.bold)
                    ),
                    None => error!("no config file found, so no test groups are defined"),
                }
                None
            }
            Self::PreviousReadError { path, err } => {
                error!(
                    "failed to read previous columns from `{}`",
                    path.style(styles.bold)
                );
                Some(err as &dyn Error)
            }
            Self::PreviousParseError { path, err } => {
                error!(
                    "failed to parse previous columns in `{}`",
                    path.style(styles.bold)
                );
                Some(err as &dyn Error)
            }
            Self::RuntimeCreateError { err } => {
                error!("failed to create async runtime");
                Some(err as &dyn Error)
            }
            Self::ReadColumnsError { group, err } => {
                error!(
                    "failed to read columns for test group `{}`",
                    group.style(styles.bold)
                );
                Some(err as &dyn Error)
            }
            Self::WriteOutputError { err } => {
                error!("failed to write output");
                Some(err as &dyn Error)
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING, "\nCaused by:\n  {err}");
            next_error = err.source();
        }
    }
}
