// Copyright (c) The gridline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::SuitesReadError,
    storage::{Build, Downloader, SuitesMeta},
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// The maximum number of test cases kept from a single JUnit file.
pub const MAX_CASES_PER_FILE: usize = 1000;

/// Lists and downloads every JUnit file of `build`.
///
/// Listing and downloading run concurrently: object names stream from the lister to the
/// downloader as they are found. Each file is capped at [`MAX_CASES_PER_FILE`] test cases.
///
/// The read is all or nothing. A failure in either stage fails the whole read, and cancelling
/// `cancel` fails it with [`SuitesReadError::Cancelled`].
pub async fn read_suites<D: Downloader>(
    cancel: &CancellationToken,
    client: &D,
    build: &Build,
) -> Result<Vec<SuitesMeta>, SuitesReadError> {
    let (names_tx, names_rx) = mpsc::channel(1);
    let (suites_tx, mut suites_rx) = mpsc::channel(1);

    let list = async {
        build
            .artifacts(client, cancel, names_tx)
            .await
            .map_err(SuitesReadError::List)
    };
    let download = async {
        build
            .suites(client, cancel, names_rx, suites_tx)
            .await
            .map_err(SuitesReadError::Download)
    };
    let collect = async {
        let mut suites = Vec::new();
        // Ends once the downloader drops its sender.
        while let Some(mut suite) = suites_rx.recv().await {
            suite.suites.truncate(MAX_CASES_PER_FILE);
            suites.push(suite);
        }
        Ok::<_, SuitesReadError>(suites)
    };

    let (_, _, suites) = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(SuitesReadError::Cancelled),
        joined = async { tokio::try_join!(list, download, collect) } => joined?,
    };

    // The stages return early without error on cancellation, so a cancelled read may look
    // complete here.
    if cancel.is_cancelled() {
        return Err(SuitesReadError::Cancelled);
    }
    debug!(build = %build, files = suites.len(), "read suites");
    Ok(suites)
}
