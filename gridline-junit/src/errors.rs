// Copyright (c) The gridline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use thiserror::Error;

/// An error that occurs while reading a [`Report`](crate::Report).
///
/// Returned by [`Report::deserialize_from_slice`](crate::Report::deserialize_from_slice) and
/// [`Report::deserialize_from_str`](crate::Report::deserialize_from_str).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DeserializeError {
    /// The document is not well-formed XML.
    #[error("error reading JUnit XML")]
    Xml(#[from] quick_xml::Error),

    /// The document does not contain a root element.
    #[error("JUnit XML has no root element")]
    MissingRoot,

    /// The root element is neither `testsuites` nor `testsuite`.
    #[error("unexpected root element `{name}` (expected `testsuites` or `testsuite`)")]
    UnexpectedRoot {
        /// The name of the root element.
        name: String,
    },
}
