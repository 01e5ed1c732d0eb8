// Copyright (c) The gridline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{Downloader, ObjectEntry, ObjectPath};
use crate::errors::StorageError;
use bytes::Bytes;
use std::{
    collections::{BTreeMap, BTreeSet},
    io,
    time::Duration,
};
use tokio::sync::Mutex;

/// An in-memory object store.
///
/// Besides holding objects, the store can inject failures and delays for individual paths, and
/// records every object that was opened.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: BTreeMap<ObjectPath, Bytes>,
    fail_read: BTreeMap<ObjectPath, io::ErrorKind>,
    fail_list: BTreeMap<ObjectPath, io::ErrorKind>,
    delay: BTreeMap<ObjectPath, Duration>,
    opened: Mutex<Vec<ObjectPath>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an object.
    pub fn insert(&mut self, path: ObjectPath, contents: impl Into<Bytes>) -> &mut Self {
        self.objects.insert(path, contents.into());
        self
    }

    /// Makes reads of `path` fail with a transport error of the given kind.
    pub fn fail_read(&mut self, path: ObjectPath, kind: io::ErrorKind) -> &mut Self {
        self.fail_read.insert(path, kind);
        self
    }

    /// Makes listings of `prefix` fail with a transport error of the given kind.
    pub fn fail_list(&mut self, prefix: ObjectPath, kind: io::ErrorKind) -> &mut Self {
        self.fail_list.insert(prefix.as_dir(), kind);
        self
    }

    /// Delays reads of `path` by `delay`.
    pub fn delay(&mut self, path: ObjectPath, delay: Duration) -> &mut Self {
        self.delay.insert(path, delay);
        self
    }

    /// Returns the number of objects in the store.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns true if the store holds no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Returns every path opened so far, in the order reads were issued.
    pub async fn opened(&self) -> Vec<ObjectPath> {
        self.opened.lock().await.clone()
    }
}

impl Downloader for MemoryStore {
    async fn list(
        &self,
        prefix: &ObjectPath,
        delimited: bool,
    ) -> Result<Vec<ObjectEntry>, StorageError> {
        if let Some(&kind) = self.fail_list.get(&prefix.as_dir()) {
            return Err(StorageError::List {
                prefix: prefix.clone(),
                err: io::Error::from(kind),
            });
        }

        let mut objects = Vec::new();
        let mut prefixes = BTreeSet::new();
        for path in self.objects.keys() {
            let Some(rest) = path.strip_prefix(prefix) else {
                continue;
            };
            match rest.find('/') {
                Some(idx) if delimited => {
                    let dir = format!("{}{}", prefix.object(), &rest[..=idx]);
                    prefixes.insert(path.with_object(dir));
                }
                _ => objects.push(ObjectEntry::Object(path.clone())),
            }
        }

        let mut entries: Vec<_> = objects
            .into_iter()
            .chain(prefixes.into_iter().map(ObjectEntry::Prefix))
            .collect();
        entries.sort_by(|a, b| a.path().cmp(b.path()));
        Ok(entries)
    }

    async fn open(&self, path: &ObjectPath) -> Result<Bytes, StorageError> {
        self.opened.lock().await.push(path.clone());

        if let Some(&delay) = self.delay.get(path) {
            tokio::time::sleep(delay).await;
        }
        if let Some(&kind) = self.fail_read.get(path) {
            return Err(StorageError::Read {
                path: path.clone(),
                err: io::Error::from(kind),
            });
        }
        self.objects
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound { path: path.clone() })
    }
}
