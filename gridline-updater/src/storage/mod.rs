// Copyright (c) The gridline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Access to the object store holding CI build artifacts.
//!
//! The store is abstracted behind [`Downloader`]. Two implementations are provided:
//! [`MemoryStore`] for tests and fixtures, and [`LocalStore`] for a directory tree laid out as
//! `<root>/<bucket>/<object>`.

mod build;
mod local;
mod memory;

pub use build::*;
pub use local::LocalStore;
pub use memory::MemoryStore;

use crate::errors::{ObjectPathParseError, StorageError};
use bytes::Bytes;
use std::{fmt, future::Future, str::FromStr};

/// The location of an object or object prefix, written `gs://bucket/object`.
///
/// Prefixes that denote a "directory" end with `/`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectPath {
    bucket: String,
    object: String,
}

impl ObjectPath {
    /// The URL scheme used to write object paths.
    pub const SCHEME: &'static str = "gs://";

    /// Creates a new object path from its components.
    pub fn new(bucket: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            object: object.into(),
        }
    }

    /// Returns the bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Returns the object name within the bucket.
    pub fn object(&self) -> &str {
        &self.object
    }

    /// Returns true if this path denotes a prefix rather than a single object.
    pub fn is_dir(&self) -> bool {
        self.object.is_empty() || self.object.ends_with('/')
    }

    /// Returns this path with a trailing `/`, so that it denotes a prefix.
    pub fn as_dir(&self) -> Self {
        if self.is_dir() {
            self.clone()
        } else {
            Self::new(&self.bucket, format!("{}/", self.object))
        }
    }

    /// Resolves `name` relative to this path, treating this path as a directory.
    pub fn join(&self, name: &str) -> Self {
        let name = name.trim_start_matches('/');
        if self.is_dir() {
            Self::new(&self.bucket, format!("{}{name}", self.object))
        } else {
            Self::new(&self.bucket, format!("{}/{name}", self.object))
        }
    }

    /// Returns a path in the same bucket with the given object name.
    pub fn with_object(&self, object: impl Into<String>) -> Self {
        Self::new(&self.bucket, object)
    }

    /// If `prefix` is in the same bucket and its object name is a prefix of this one, returns the
    /// remainder.
    pub fn strip_prefix(&self, prefix: &ObjectPath) -> Option<&str> {
        if self.bucket != prefix.bucket {
            return None;
        }
        self.object.strip_prefix(prefix.object.as_str())
    }

    /// Returns the last non-empty component of the object name.
    pub fn base_name(&self) -> &str {
        self.object
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }

    /// Returns the directory containing this path, or `None` at the root of the bucket.
    pub fn parent(&self) -> Option<Self> {
        let trimmed = self.object.trim_end_matches('/');
        if trimmed.is_empty() {
            return None;
        }
        let parent = match trimmed.rfind('/') {
            Some(idx) => &trimmed[..=idx],
            None => "",
        };
        Some(Self::new(&self.bucket, parent))
    }
}

impl FromStr for ObjectPath {
    type Err = ObjectPathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix(Self::SCHEME)
            .ok_or_else(|| ObjectPathParseError::MissingScheme {
                input: s.to_owned(),
            })?;
        let (bucket, object) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(ObjectPathParseError::EmptyBucket {
                input: s.to_owned(),
            });
        }
        Ok(Self::new(bucket, object))
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{}", Self::SCHEME, self.bucket, self.object)
    }
}

/// An entry returned by [`Downloader::list`].
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectEntry {
    /// A single object.
    Object(ObjectPath),

    /// A collapsed prefix ("directory"), only returned by delimited listings.
    Prefix(ObjectPath),
}

impl ObjectEntry {
    /// Returns the path of this entry.
    pub fn path(&self) -> &ObjectPath {
        match self {
            Self::Object(path) | Self::Prefix(path) => path,
        }
    }
}

/// Read access to an object store.
pub trait Downloader: Send + Sync + 'static {
    /// Lists entries beneath `prefix` in lexical order.
    ///
    /// If `delimited` is true, only direct children are returned and deeper objects are collapsed
    /// into [`ObjectEntry::Prefix`] entries. Listing a prefix with nothing under it succeeds with
    /// an empty list.
    fn list(
        &self,
        prefix: &ObjectPath,
        delimited: bool,
    ) -> impl Future<Output = Result<Vec<ObjectEntry>, StorageError>> + Send;

    /// Reads the full contents of an object.
    ///
    /// A missing object is reported as [`StorageError::NotFound`].
    fn open(&self, path: &ObjectPath) -> impl Future<Output = Result<Bytes, StorageError>> + Send;
}
