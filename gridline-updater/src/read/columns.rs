// Copyright (c) The gridline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::read_result;
use crate::{
    column::InflatedColumn,
    config::elements::TestGroup,
    convert::{GroupOptions, convert_result},
    errors::{BuildReadError, ReadColumnsError},
    helpers::plural,
    name::NameConfig,
    resume::{advance_stop, hint_started, started_before, stop_millis},
    storage::{Build, Downloader, list_builds},
};
use chrono::{DateTime, Utc};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{Mutex, mpsc, oneshot},
    task::JoinSet,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{Instrument, debug, info, info_span};

/// The maximum number of builds read for a group in one pass.
pub const MAX_COLUMNS: usize = 50;

/// Reads the columns of test groups from an object store.
#[derive(Debug)]
pub struct ColumnReader<D> {
    client: Arc<D>,
    build_timeout: Duration,
    concurrency: usize,
}

impl<D: Downloader> ColumnReader<D> {
    /// Creates a reader that reads `concurrency` builds at a time, giving each `build_timeout` to
    /// finish.
    pub fn new(client: Arc<D>, build_timeout: Duration, concurrency: usize) -> Self {
        Self {
            client,
            build_timeout,
            concurrency,
        }
    }

    /// Reads the newest columns of `group`.
    ///
    /// `old_cols` are the columns read on a previous pass, if any. Reading resumes from the newest
    /// of them, and stops at builds that started before `stop` or before the newest old column,
    /// whichever is later.
    ///
    /// Columns are returned newest first.
    pub async fn read(
        &self,
        cancel: &CancellationToken,
        group: &TestGroup,
        old_cols: &[InflatedColumn],
        stop: DateTime<Utc>,
    ) -> Result<Vec<InflatedColumn>, ReadColumnsError> {
        let paths = group.paths()?;

        let (since, newest) = hint_started(old_cols);
        let advanced = advance_stop(stop, newest);
        if advanced != stop {
            debug!(
                group = %group.name,
                old_columns = old_cols.len(),
                previously = %stop,
                stop = %advanced,
                since = %since,
                "advanced stop"
            );
        }

        let builds = list_builds(&*self.client, &since, &paths)
            .await
            .map_err(ReadColumnsError::ListBuilds)?;
        debug!(group = %group.name, total = builds.len(), "listed builds");

        read_columns(
            cancel,
            &self.client,
            group,
            builds,
            advanced,
            MAX_COLUMNS,
            self.build_timeout,
            self.concurrency,
        )
        .await
    }
}

/// Reads `builds` (newest first) into columns with `concurrency` concurrent readers.
///
/// At most `max` builds are read, keeping the newest. Once a build that started before `stop` has
/// been read, no further builds are handed out, and every build older than it is dropped from the
/// result. Builds already in flight when that happens are still read, then discarded.
///
/// Any error reading a build fails the whole read, as does cancelling `parent`. Each build must be
/// read within `build_timeout`.
#[expect(clippy::too_many_arguments)]
pub async fn read_columns<D: Downloader>(
    parent: &CancellationToken,
    client: &Arc<D>,
    group: &TestGroup,
    mut builds: Vec<Build>,
    stop: DateTime<Utc>,
    max: usize,
    build_timeout: Duration,
    concurrency: usize,
) -> Result<Vec<InflatedColumn>, ReadColumnsError> {
    if concurrency == 0 {
        return Err(ReadColumnsError::ZeroReaders);
    }

    let span = info_span!("read_columns", group = %group.name, prefix = %group.gcs_prefix);

    let cancel = parent.child_token();
    // Stops the dispatcher and any stragglers however this function returns.
    let _guard = cancel.clone().drop_guard();

    if builds.len() > max {
        span.in_scope(|| {
            debug!(
                "truncating {} listed {} to the newest {max}",
                builds.len(),
                plural::builds_str(builds.len())
            )
        });
        builds.truncate(max);
    }
    let total = builds.len();
    let builds: Arc<[Build]> = builds.into();
    span.in_scope(|| debug!(timeout = ?build_timeout, total, "reading"));

    let (stop_tx, stop_rx) = oneshot::channel();
    let state = Arc::new(Mutex::new(StopState {
        max_idx: total,
        stop_vending: Some(stop_tx),
    }));
    let detectors = TaskTracker::new();

    let (req_tx, req_rx) = mpsc::channel(concurrency);
    detectors.spawn(dispatch(cancel.clone(), total, req_rx, stop_rx).instrument(span.clone()));

    let worker = Worker {
        client: Arc::clone(client),
        builds: Arc::clone(&builds),
        requests: req_tx,
        cancel: cancel.clone(),
        state: Arc::clone(&state),
        detectors: detectors.clone(),
        name_config: NameConfig::from_group(group),
        opts: GroupOptions::from_group(group),
        headers: group
            .column_headers()
            .into_iter()
            .map(str::to_owned)
            .collect(),
        build_timeout,
        stop,
        stop_millis: stop_millis(stop),
        total,
    };
    let mut workers = JoinSet::new();
    for _ in 0..concurrency {
        workers.spawn(worker.clone().run().instrument(span.clone()));
    }

    let mut cols: Vec<Option<InflatedColumn>> = (0..total).map(|_| None).collect();
    loop {
        let joined = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ReadColumnsError::Cancelled),
            joined = workers.join_next() => joined,
        };
        let Some(joined) = joined else {
            break;
        };
        for (idx, col) in joined.map_err(ReadColumnsError::TaskPanicked)?? {
            cols[idx] = Some(col);
        }
    }

    // Every worker is done, so every detector has been spawned.
    cancel.cancel();
    detectors.close();
    detectors.wait().await;

    let max_idx = state.lock().await.max_idx;
    let cols: Vec<_> = cols.into_iter().take(max_idx).flatten().collect();
    span.in_scope(|| {
        info!(
            "read {} {} of {total} listed",
            cols.len(),
            plural::columns_str(cols.len())
        )
    });
    Ok(cols)
}

/// Shared between detectors: how many columns to keep, and how to stop handing out builds.
#[derive(Debug)]
struct StopState {
    max_idx: usize,
    stop_vending: Option<oneshot::Sender<usize>>,
}

/// A worker's request for the next build index.
type IndexRequest = oneshot::Sender<usize>;

/// Hands out build indices in order until every build has been handed out, the read is
/// cancelled, or a detector asks it to stop.
///
/// An index is only chosen once a worker asks for one, so nothing is queued ahead of the workers
/// and a stop takes effect at the next request.
async fn dispatch(
    cancel: CancellationToken,
    total: usize,
    mut requests: mpsc::Receiver<IndexRequest>,
    mut stop_vending: oneshot::Receiver<usize>,
) {
    let mut idx = 0;
    while idx < total {
        let request = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = &mut stop_vending => return,
            request = requests.recv() => request,
        };
        let Some(request) = request else {
            return;
        };
        // A worker that stopped waiting doesn't use up the index.
        if request.send(idx).is_ok() {
            idx += 1;
        }
    }
}

/// Asks the dispatcher for the next index, returning `None` once it has stopped.
async fn request_index(requests: &mpsc::Sender<IndexRequest>) -> Option<usize> {
    let (reply_tx, reply_rx) = oneshot::channel();
    requests.send(reply_tx).await.ok()?;
    reply_rx.await.ok()
}

struct Worker<D> {
    client: Arc<D>,
    builds: Arc<[Build]>,
    requests: mpsc::Sender<IndexRequest>,
    cancel: CancellationToken,
    state: Arc<Mutex<StopState>>,
    detectors: TaskTracker,
    name_config: NameConfig,
    opts: GroupOptions,
    headers: Vec<String>,
    build_timeout: Duration,
    stop: DateTime<Utc>,
    stop_millis: i64,
    total: usize,
}

// Derived Clone would require D: Clone.
impl<D> Clone for Worker<D> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            builds: Arc::clone(&self.builds),
            requests: self.requests.clone(),
            cancel: self.cancel.clone(),
            state: Arc::clone(&self.state),
            detectors: self.detectors.clone(),
            name_config: self.name_config.clone(),
            opts: self.opts.clone(),
            headers: self.headers.clone(),
            build_timeout: self.build_timeout,
            stop: self.stop,
            stop_millis: self.stop_millis,
            total: self.total,
        }
    }
}

impl<D: Downloader> Worker<D> {
    async fn run(self) -> Result<Vec<(usize, InflatedColumn)>, ReadColumnsError> {
        let headers: Vec<&str> = self.headers.iter().map(String::as_str).collect();
        let mut cols = Vec::new();

        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => return Err(ReadColumnsError::Cancelled),
                next = request_index(&self.requests) => next,
            };
            let Some(idx) = next else {
                // No more builds to read.
                return Ok(cols);
            };

            let build = &self.builds[idx];
            let read = tokio::time::timeout(
                self.build_timeout,
                read_result(&self.cancel, &*self.client, build),
            );
            let result = match read.await {
                Ok(Ok(result)) => result,
                Ok(Err(err)) => {
                    return Err(ReadColumnsError::ReadBuild {
                        build: build.path.clone(),
                        err,
                    });
                }
                Err(_elapsed) => {
                    return Err(ReadColumnsError::ReadBuild {
                        build: build.path.clone(),
                        err: BuildReadError::TimedOut {
                            timeout: self.build_timeout,
                        },
                    });
                }
            };

            let id = build.path.base_name();
            let col = convert_result(&self.name_config, id, &headers, &result, &self.opts);
            if started_before(col.column.started, self.stop_millis) {
                self.detectors.spawn(
                    detect_stop(
                        Arc::clone(&self.state),
                        self.total,
                        idx,
                        id.to_owned(),
                        col.column.started,
                        self.stop,
                    )
                    .in_current_span(),
                );
            }
            cols.push((idx, col));
        }
    }
}

/// Records that the build at `idx` started before the stop time.
///
/// Several workers may find old builds at once. The first one stops the dispatcher; every one of
/// them shrinks the number of kept columns to at most `idx + 1`, so the smallest wins.
async fn detect_stop(
    state: Arc<Mutex<StopState>>,
    total: usize,
    idx: usize,
    id: String,
    started: f64,
    stop: DateTime<Utc>,
) {
    let mut state = state.lock().await;
    if state.max_idx == total {
        if let Some(stop_vending) = state.stop_vending.take() {
            if stop_vending.send(idx).is_ok() {
                debug!(
                    idx,
                    id = %id,
                    started = (started / 1000.0) as i64,
                    %stop,
                    "stopped"
                );
            }
        }
    }
    if state.max_idx > idx + 1 {
        state.max_idx = idx + 1;
    }
}
