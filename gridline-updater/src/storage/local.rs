// Copyright (c) The gridline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{Downloader, ObjectEntry, ObjectPath};
use crate::errors::StorageError;
use bytes::Bytes;
use camino::{Utf8Path, Utf8PathBuf};
use std::io;
use tracing::trace;

/// An object store backed by a local directory laid out as `<root>/<bucket>/<object>`.
///
/// This is typically a mirror of a cloud bucket made with a sync tool.
#[derive(Clone, Debug)]
pub struct LocalStore {
    root: Utf8PathBuf,
}

impl LocalStore {
    /// Creates a store rooted at `root`.
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn local_path(&self, path: &ObjectPath) -> Utf8PathBuf {
        let mut local = self.root.join(path.bucket());
        for component in path.object().split('/').filter(|c| !c.is_empty()) {
            local.push(component);
        }
        local
    }
}

impl Downloader for LocalStore {
    async fn list(
        &self,
        prefix: &ObjectPath,
        delimited: bool,
    ) -> Result<Vec<ObjectEntry>, StorageError> {
        // Only directory prefixes are meaningful on a filesystem.
        let prefix_dir = prefix.as_dir();
        let mut entries = Vec::new();
        walk(
            self.local_path(&prefix_dir),
            prefix_dir.object().to_owned(),
            &prefix_dir,
            delimited,
            &mut entries,
        )
        .await
        .map_err(|err| StorageError::List {
            prefix: prefix.clone(),
            err,
        })?;

        entries.sort_by(|a, b| a.path().cmp(b.path()));
        Ok(entries)
    }

    async fn open(&self, path: &ObjectPath) -> Result<Bytes, StorageError> {
        let local = self.local_path(path);
        match tokio::fs::read(&local).await {
            Ok(contents) => Ok(Bytes::from(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(StorageError::NotFound { path: path.clone() })
            }
            Err(err) => Err(StorageError::Read {
                path: path.clone(),
                err,
            }),
        }
    }
}

async fn walk(
    dir: Utf8PathBuf,
    object_dir: String,
    bucket_root: &ObjectPath,
    delimited: bool,
    entries: &mut Vec<ObjectEntry>,
) -> io::Result<()> {
    // Iterative to avoid boxing recursive futures.
    let mut stack = vec![(dir, object_dir)];
    while let Some((dir, object_dir)) = stack.pop() {
        let mut read_dir = match tokio::fs::read_dir(&dir).await {
            Ok(read_dir) => read_dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => return Err(err),
        };
        while let Some(entry) = read_dir.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                trace!(dir = %dir, "skipping non-UTF-8 file name");
                continue;
            };
            let object = format!("{object_dir}{name}");
            if entry.file_type().await?.is_dir() {
                if delimited {
                    entries.push(ObjectEntry::Prefix(
                        bucket_root.with_object(format!("{object}/")),
                    ));
                } else {
                    stack.push((dir.join(&name), format!("{object}/")));
                }
            } else {
                entries.push(ObjectEntry::Object(bucket_root.with_object(object)));
            }
        }
    }
    Ok(())
}
