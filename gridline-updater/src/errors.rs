// Copyright (c) The gridline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by gridline-updater.

use crate::storage::ObjectPath;
use camino::{Utf8Path, Utf8PathBuf};
use config::ConfigError;
use std::{io, time::Duration};
use thiserror::Error;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse gridline config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8Path {
        &self.config_file
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing a config.
///
/// Returned by [`ConfigParseError::kind`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),

    /// Two test groups share a name.
    #[error("test group `{name}` is defined more than once")]
    DuplicateTestGroup {
        /// The duplicated name.
        name: String,
    },

    /// A test group's storage prefix could not be resolved.
    #[error("invalid storage prefix")]
    InvalidTestGroup(#[source] GroupPathError),
}

/// An error that occurs while parsing a
/// [`Concurrency`](crate::config::elements::Concurrency) value from a string.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid concurrency `{input}`: {reason}")]
pub struct ConcurrencyParseError {
    input: String,
    reason: &'static str,
}

impl ConcurrencyParseError {
    pub(crate) fn new(input: impl Into<String>, reason: &'static str) -> Self {
        Self {
            input: input.into(),
            reason,
        }
    }
}

/// An error that occurs while parsing an [`ObjectPath`] from a string.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ObjectPathParseError {
    /// The path does not start with `gs://`.
    #[error("object path `{input}` does not start with `gs://`")]
    MissingScheme {
        /// The input provided.
        input: String,
    },

    /// The bucket component is empty.
    #[error("object path `{input}` has an empty bucket name")]
    EmptyBucket {
        /// The input provided.
        input: String,
    },
}

/// An error that occurs while resolving the storage paths of a test group.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum GroupPathError {
    /// The group has no storage prefix at all.
    #[error("test group `{group}` has an empty gcs-prefix")]
    Empty {
        /// The name of the test group.
        group: String,
    },

    /// One of the comma-separated prefixes is empty or malformed.
    #[error("test group `{group}` has an invalid element `{element}` in gcs-prefix")]
    InvalidElement {
        /// The name of the test group.
        group: String,

        /// The offending element of the prefix list.
        element: String,

        /// The underlying parse error.
        #[source]
        err: ObjectPathParseError,
    },
}

/// An error returned by a [`Downloader`](crate::storage::Downloader).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// The object does not exist.
    #[error("object `{path}` not found")]
    NotFound {
        /// The path that was requested.
        path: ObjectPath,
    },

    /// The object exists but could not be read.
    #[error("failed to read `{path}`")]
    Read {
        /// The path that was requested.
        path: ObjectPath,

        /// The underlying error.
        #[source]
        err: io::Error,
    },

    /// A listing could not be completed.
    #[error("failed to list `{prefix}`")]
    List {
        /// The prefix that was listed.
        prefix: ObjectPath,

        /// The underlying error.
        #[source]
        err: io::Error,
    },

    /// A JSON metadata file could not be decoded.
    #[error("failed to decode JSON at `{path}`")]
    DecodeJson {
        /// The path of the object.
        path: ObjectPath,

        /// The underlying error.
        #[source]
        err: serde_json::Error,
    },

    /// A JUnit file could not be decoded.
    #[error("failed to decode JUnit XML at `{path}`")]
    DecodeJunit {
        /// The path of the object.
        path: ObjectPath,

        /// The underlying error.
        #[source]
        err: gridline_junit::DeserializeError,
    },
}

impl StorageError {
    /// Returns the path of the object this error is about, if the error means that object is
    /// missing or cannot be decoded.
    ///
    /// Transport-level failures (reads, listings) return `None`: they say nothing about the
    /// object's contents.
    pub fn malformed_object(&self) -> Option<&ObjectPath> {
        match self {
            Self::NotFound { path }
            | Self::DecodeJson { path, .. }
            | Self::DecodeJunit { path, .. } => Some(path),
            Self::Read { .. } | Self::List { .. } => None,
        }
    }
}

/// An error that occurs while listing and downloading a build's JUnit files.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SuitesReadError {
    /// Listing the artifacts failed.
    #[error("list")]
    List(#[source] StorageError),

    /// Downloading or decoding a JUnit file failed.
    #[error("download")]
    Download(#[source] StorageError),

    /// The read was cancelled or timed out before finishing.
    #[error("timeout: suites read cancelled")]
    Cancelled,
}

impl SuitesReadError {
    /// Returns the storage error underlying this error, if any.
    pub fn storage_error(&self) -> Option<&StorageError> {
        match self {
            Self::List(err) | Self::Download(err) => Some(err),
            Self::Cancelled => None,
        }
    }
}

/// An error that occurs while reading every artifact of a single build.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BuildReadError {
    /// Reading `podinfo.json` failed.
    #[error("podinfo")]
    PodInfo(#[source] StorageError),

    /// Reading `started.json` failed.
    #[error("started")]
    Started(#[source] StorageError),

    /// Reading `finished.json` failed.
    #[error("finished")]
    Finished(#[source] StorageError),

    /// Reading the JUnit files failed.
    #[error("suites")]
    Suites(#[source] SuitesReadError),

    /// The shared read was cancelled before this build finished.
    #[error("timeout: build read cancelled")]
    Cancelled,

    /// The build took longer than the per-build timeout.
    #[error("timeout: build read exceeded {timeout:?}")]
    TimedOut {
        /// The configured per-build timeout.
        timeout: Duration,
    },
}

/// An error that occurs while reading the columns of a test group.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReadColumnsError {
    /// The group's storage paths could not be resolved.
    #[error("group path")]
    GroupPath(#[from] GroupPathError),

    /// Listing builds failed.
    #[error("list builds")]
    ListBuilds(#[source] StorageError),

    /// The reader was configured with zero concurrency.
    #[error("zero readers: concurrency must be at least 1")]
    ZeroReaders,

    /// Reading one of the builds failed.
    #[error("read {build}")]
    ReadBuild {
        /// The build that failed.
        build: ObjectPath,

        /// The underlying error.
        #[source]
        err: BuildReadError,
    },

    /// The read was cancelled before it finished.
    #[error("timeout: column read cancelled")]
    Cancelled,

    /// A reader task panicked.
    #[error("column reader task panicked")]
    TaskPanicked(#[source] tokio::task::JoinError),
}

impl ReadColumnsError {
    /// Returns true if this error was caused by a cancellation or timeout rather than a failure to
    /// read data.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Cancelled
                | Self::ReadBuild {
                    err: BuildReadError::Cancelled
                        | BuildReadError::TimedOut { .. }
                        | BuildReadError::Suites(SuitesReadError::Cancelled),
                    ..
                }
        )
    }
}
