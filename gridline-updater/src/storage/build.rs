// Copyright (c) The gridline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{Downloader, ObjectEntry, ObjectPath};
use crate::{
    errors::StorageError,
    helpers::natural_cmp,
    metadata::{Finished, PodInfo, Started},
};
use futures::{StreamExt, future};
use gridline_junit::Report;
use regex::Regex;
use serde::de::DeserializeOwned;
use std::{collections::BTreeMap, fmt, sync::LazyLock};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// The number of JUnit files downloaded concurrently for a single build.
const SUITE_DOWNLOAD_CONCURRENCY: usize = 5;

/// JUnit file names, optionally carrying a context, a timestamp range and a thread number:
/// `junit_<context>_<start>-<end>_<thread>.xml`.
static JUNIT_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^junit(_[^_]+)?(_\d+-\d+)?(_\d+)?\.xml$").expect("junit name regex is valid")
});

/// One CI run's stored artifact set, rooted at a prefix such as `gs://bucket/logs/job/1234/`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Build {
    /// The build's prefix. Always ends with `/`.
    pub path: ObjectPath,
}

impl Build {
    /// The pod information file.
    pub const PODINFO: &'static str = "podinfo.json";

    /// The metadata file written when a build starts.
    pub const STARTED: &'static str = "started.json";

    /// The metadata file written when a build finishes.
    pub const FINISHED: &'static str = "finished.json";

    /// The directory holding the build's test artifacts.
    pub const ARTIFACTS: &'static str = "artifacts/";

    /// Creates a build rooted at `path`.
    pub fn new(path: ObjectPath) -> Self {
        Self {
            path: path.as_dir(),
        }
    }

    /// The name of the job this build belongs to: the component above the build's own.
    pub fn job(&self) -> &str {
        let trimmed = self.path.object().trim_end_matches('/');
        let parent = trimmed.rsplit_once('/').map_or("", |(parent, _)| parent);
        parent.rsplit('/').next().unwrap_or_default()
    }

    /// The build identifier: the last component of the build's path.
    pub fn build_id(&self) -> &str {
        self.path.base_name()
    }

    /// Reads `podinfo.json`. Returns `None` if the file is absent or empty.
    pub async fn pod_info<D: Downloader>(&self, client: &D) -> Result<Option<PodInfo>, StorageError> {
        read_json(client, &self.path.join(Self::PODINFO)).await
    }

    /// Reads `started.json`. Returns `None` if the file is absent or empty.
    pub async fn started<D: Downloader>(&self, client: &D) -> Result<Option<Started>, StorageError> {
        read_json(client, &self.path.join(Self::STARTED)).await
    }

    /// Reads `finished.json`. Returns `None` if the file is absent or empty.
    pub async fn finished<D: Downloader>(
        &self,
        client: &D,
    ) -> Result<Option<Finished>, StorageError> {
        read_json(client, &self.path.join(Self::FINISHED)).await
    }

    /// Lists every object beneath the build's artifacts directory, sending each object name to
    /// `names`.
    ///
    /// `names` is dropped on return, which tells the consumer there is no more work. Returns
    /// early without error if `cancel` fires or the consumer goes away.
    pub async fn artifacts<D: Downloader>(
        &self,
        client: &D,
        cancel: &CancellationToken,
        names: mpsc::Sender<String>,
    ) -> Result<(), StorageError> {
        let prefix = self.path.join(Self::ARTIFACTS);
        let entries = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            entries = client.list(&prefix, false) => entries?,
        };

        for entry in entries {
            let ObjectEntry::Object(path) = entry else {
                continue;
            };
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                res = names.send(path.object().to_owned()) => {
                    if res.is_err() {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }

    /// Consumes object names from `names`, downloading and decoding the ones that look like
    /// JUnit files and sending them to `suites`.
    ///
    /// Downloads run concurrently. The first download or decode error stops the whole read.
    /// Returns once `names` is closed and every download has been sent, or early without error
    /// if `cancel` fires or the consumer goes away.
    pub async fn suites<D: Downloader>(
        &self,
        client: &D,
        cancel: &CancellationToken,
        names: mpsc::Receiver<String>,
        suites: mpsc::Sender<SuitesMeta>,
    ) -> Result<(), StorageError> {
        let downloads = ReceiverStream::new(names)
            .filter_map(|name| {
                let metadata = parse_suite_name(&name);
                future::ready(metadata.map(|metadata| (name, metadata)))
            })
            .map(|(name, metadata)| {
                let path = self.path.with_object(name);
                async move {
                    let bytes = client.open(&path).await?;
                    let report = Report::deserialize_from_slice(&bytes).map_err(|err| {
                        StorageError::DecodeJunit {
                            path: path.clone(),
                            err,
                        }
                    })?;
                    debug!(path = %path, cases = report.testcase_count(), "read suites");
                    Ok::<_, StorageError>(SuitesMeta {
                        suites: report,
                        metadata,
                        path,
                    })
                }
            })
            .buffer_unordered(SUITE_DOWNLOAD_CONCURRENCY);
        let mut downloads = std::pin::pin!(downloads);

        loop {
            let suite = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                next = downloads.next() => match next {
                    Some(suite) => suite?,
                    None => return Ok(()),
                },
            };
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                res = suites.send(suite) => {
                    if res.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }
}

impl fmt::Display for Build {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

/// A decoded JUnit file along with where it came from.
#[derive(Clone, Debug)]
pub struct SuitesMeta {
    /// The decoded report.
    pub suites: Report,

    /// Metadata parsed from the file name: `Context`, `Timestamp` and `Thread`, when present.
    pub metadata: BTreeMap<String, String>,

    /// The object the report was read from.
    pub path: ObjectPath,
}

/// Returns the file-name metadata of a JUnit artifact, or `None` if the object name doesn't
/// look like a JUnit file.
pub fn parse_suite_name(object: &str) -> Option<BTreeMap<String, String>> {
    let base = object.rsplit('/').next().unwrap_or(object);
    let captures = JUNIT_NAME_REGEX.captures(base)?;

    let mut metadata = BTreeMap::new();
    for (idx, key) in [(1, "Context"), (2, "Timestamp"), (3, "Thread")] {
        if let Some(m) = captures.get(idx) {
            metadata.insert(key.to_owned(), m.as_str()[1..].to_owned());
        }
    }
    Some(metadata)
}

/// Lists the builds beneath each of the given job prefixes, newest first.
///
/// Builds are ordered by the natural order of their identifiers. If `since` is non-empty, only
/// builds whose identifier sorts at or after it are returned.
pub async fn list_builds<D: Downloader>(
    client: &D,
    since: &str,
    paths: &[ObjectPath],
) -> Result<Vec<Build>, StorageError> {
    let mut builds = Vec::new();
    for path in paths {
        let entries = client.list(&path.as_dir(), true).await?;
        let before = builds.len();
        builds.extend(
            entries
                .into_iter()
                .filter_map(|entry| match entry {
                    ObjectEntry::Prefix(path) => Some(Build::new(path)),
                    ObjectEntry::Object(_) => None,
                })
                .filter(|build| since.is_empty() || !natural_cmp(build.build_id(), since).is_lt()),
        );
        debug!(
            prefix = %path,
            count = builds.len() - before,
            since,
            "listed builds"
        );
    }

    builds.sort_by(|a, b| {
        natural_cmp(b.build_id(), a.build_id()).then_with(|| a.path.cmp(&b.path))
    });
    Ok(builds)
}

async fn read_json<D, T>(client: &D, path: &ObjectPath) -> Result<Option<T>, StorageError>
where
    D: Downloader,
    T: DeserializeOwned,
{
    let bytes = match client.open(path).await {
        Ok(bytes) => bytes,
        Err(StorageError::NotFound { .. }) => return Ok(None),
        Err(err) => return Err(err),
    };
    // An empty file is treated like a missing one: there's nothing to decode.
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|err| StorageError::DecodeJson {
            path: path.clone(),
            err,
        })
}
