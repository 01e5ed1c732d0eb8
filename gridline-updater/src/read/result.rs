// Copyright (c) The gridline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::read_suites;
use crate::{
    errors::{BuildReadError, StorageError},
    metadata::{Finished, PodInfo, Started},
    storage::{Build, Downloader, SuitesMeta},
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Everything downloaded for a single build.
#[derive(Clone, Debug, Default)]
pub struct BuildResult {
    /// The job the build belongs to.
    pub job: String,

    /// The build identifier.
    pub build: String,

    /// The contents of `podinfo.json`, if present.
    pub pod_info: Option<PodInfo>,

    /// The contents of `started.json`, if present.
    pub started: Option<Started>,

    /// The contents of `finished.json`, if present.
    pub finished: Option<Finished>,

    /// Every JUnit file read from the build's artifacts.
    pub suites: Vec<SuitesMeta>,

    /// Artifacts that were expected but missing or unreadable, relative to the build, sorted.
    pub malformed: Vec<String>,
}

/// Downloads pod info, `started.json`, `finished.json` and every JUnit file of `build`
/// concurrently.
///
/// A missing metadata file is recorded in [`BuildResult::malformed`] and the read continues. So
/// is a missing or undecodable JUnit file beneath the build's own prefix, in which case no suites
/// are returned. Any other error fails the whole read, and the remaining downloads are dropped.
#[instrument(level = "debug", skip_all, fields(build = %build))]
pub async fn read_result<D: Downloader>(
    cancel: &CancellationToken,
    client: &D,
    build: &Build,
) -> Result<BuildResult, BuildReadError> {
    let malformed = Mutex::new(Vec::new());

    let pod_info = async {
        let res = build.pod_info(client).await;
        absent_is_malformed(&malformed, Build::PODINFO, res, BuildReadError::PodInfo).await
    };
    let started = async {
        let res = build.started(client).await;
        absent_is_malformed(&malformed, Build::STARTED, res, BuildReadError::Started).await
    };
    let finished = async {
        let res = build.finished(client).await;
        absent_is_malformed(&malformed, Build::FINISHED, res, BuildReadError::Finished).await
    };
    let suites = async {
        let err = match read_suites(cancel, client, build).await {
            Ok(suites) => return Ok(suites),
            Err(err) => err,
        };
        let relative = err
            .storage_error()
            .and_then(StorageError::malformed_object)
            .and_then(|path| path.strip_prefix(&build.path));
        match relative {
            Some(relative) => {
                debug!(artifact = relative, error = %err, "malformed suites");
                malformed.lock().await.push(relative.to_owned());
                Ok(Vec::new())
            }
            None => Err(BuildReadError::Suites(err)),
        }
    };

    let (pod_info, started, finished, suites) = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(BuildReadError::Cancelled),
        joined = async { tokio::try_join!(pod_info, started, finished, suites) } => joined?,
    };

    let mut malformed = malformed.into_inner();
    malformed.sort();
    Ok(BuildResult {
        job: build.job().to_owned(),
        build: build.build_id().to_owned(),
        pod_info,
        started,
        finished,
        suites,
        malformed,
    })
}

async fn absent_is_malformed<T>(
    malformed: &Mutex<Vec<String>>,
    name: &str,
    res: Result<Option<T>, StorageError>,
    wrap: fn(StorageError) -> BuildReadError,
) -> Result<Option<T>, BuildReadError> {
    match res {
        Ok(Some(value)) => Ok(Some(value)),
        Ok(None) => {
            malformed.lock().await.push(name.to_owned());
            Ok(None)
        }
        Err(err) => Err(wrap(err)),
    }
}
