// Copyright (c) The gridline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    ExpectedError, GridlineExitCode, Result,
    output::{OutputContext, OutputOpts, OutputWriter},
};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, TimeDelta, Utc};
use clap::{Args, Parser, Subcommand};
use gridline_updater::{
    column::InflatedColumn,
    config::{DefaultConfigWarnings, GridlineConfig, elements::Concurrency},
    read::ColumnReader,
    storage::LocalStore,
};
use std::{collections::BTreeMap, io::Write, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Read CI builds out of an object store mirror into test dashboard columns.
#[derive(Debug, Parser)]
#[command(
    version,
    styles = crate::output::clap_styles::style(),
    max_term_width = 100
)]
pub struct GridlineApp {
    #[clap(flatten)]
    output: OutputOpts,

    #[clap(subcommand)]
    command: Command,
}

impl GridlineApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app.
    pub fn exec(self, _output: OutputContext, output_writer: &mut OutputWriter) -> Result<i32> {
        match self.command {
            Command::Read(opts) => opts.exec(output_writer),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Read test groups into columns and print them as JSON.
    ///
    /// The output is a JSON object mapping each test group's name to its columns, newest first.
    Read(ReadOpts),
}

#[derive(Debug, Args)]
struct ReadOpts {
    /// Root of the bucket mirror, laid out as <ROOT>/<bucket>/<object>
    #[arg(long, value_name = "DIR")]
    root: Utf8PathBuf,

    /// Config file [default: .config/gridline.toml]
    #[arg(long, value_name = "PATH")]
    config: Option<Utf8PathBuf>,

    /// Test groups to read [default: all configured groups]
    #[arg(long = "group", value_name = "NAME")]
    groups: Vec<String>,

    /// Ignore builds that started before this time, in RFC 3339 format [default: now minus the
    /// configured lookback]
    #[arg(long, value_name = "TIME", value_parser = parse_stop)]
    stop: Option<DateTime<Utc>>,

    /// Columns printed by an earlier run, to resume from
    #[arg(long, value_name = "FILE")]
    previous: Option<Utf8PathBuf>,

    /// Number of builds to read at once (overrides config)
    #[arg(long, short = 'j', value_name = "N", env = "GRIDLINE_CONCURRENCY")]
    concurrency: Option<Concurrency>,

    /// Time limit for reading a single build, e.g. "90s" (overrides config)
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    build_timeout: Option<Duration>,
}

impl ReadOpts {
    fn exec(self, output_writer: &mut OutputWriter) -> Result<i32> {
        let config = GridlineConfig::from_file(self.config.as_deref(), &mut DefaultConfigWarnings)
            .map_err(ExpectedError::config_parse_error)?;

        let groups: Vec<_> = if self.groups.is_empty() {
            config.test_groups().iter().collect()
        } else {
            let unknown: Vec<_> = self
                .groups
                .iter()
                .filter(|name| config.test_group(name).is_none())
                .cloned()
                .collect();
            if !unknown.is_empty() {
                return Err(ExpectedError::UnknownTestGroups {
                    unknown,
                    known: config
                        .test_groups()
                        .iter()
                        .map(|group| group.name.clone())
                        .collect(),
                });
            }
            config
                .test_groups()
                .iter()
                .filter(|group| self.groups.contains(&group.name))
                .collect()
        };
        if groups.is_empty() {
            return Err(ExpectedError::NoTestGroups {
                config_file: config.config_file().map(Utf8Path::to_owned),
            });
        }

        let previous = match &self.previous {
            Some(path) => read_previous(path)?,
            None => BTreeMap::new(),
        };

        let stop = self
            .stop
            .unwrap_or_else(|| default_stop(Utc::now(), config.lookback()));
        let concurrency = self
            .concurrency
            .unwrap_or(config.concurrency())
            .compute();
        let build_timeout = self.build_timeout.unwrap_or(config.build_timeout());
        debug!(
            root = %self.root,
            %stop,
            concurrency,
            timeout = ?build_timeout,
            "reading {} test groups",
            groups.len(),
        );

        let reader = ColumnReader::new(
            Arc::new(LocalStore::new(self.root)),
            build_timeout,
            concurrency,
        );

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|err| ExpectedError::RuntimeCreateError { err })?;

        let columns = runtime.block_on(async {
            let cancel = CancellationToken::new();
            let interrupt = {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        warn!("interrupted, cancelling reads");
                        cancel.cancel();
                    }
                })
            };

            let mut columns = BTreeMap::new();
            for group in &groups {
                let old = previous.get(&group.name).map_or(&[][..], Vec::as_slice);
                let cols = reader
                    .read(&cancel, group, old, stop)
                    .await
                    .map_err(|err| ExpectedError::ReadColumnsError {
                        group: group.name.clone(),
                        err,
                    })?;
                info!(group = %group.name, "read {} columns", cols.len());
                columns.insert(group.name.as_str(), cols);
            }

            interrupt.abort();
            Ok::<_, ExpectedError>(columns)
        })?;

        let mut writer = output_writer.stdout_writer();
        serde_json::to_writer_pretty(&mut writer, &columns)
            .map_err(|err| ExpectedError::WriteOutputError { err: err.into() })?;
        writeln!(writer)
            .and_then(|()| writer.flush())
            .map_err(|err| ExpectedError::WriteOutputError { err })?;

        Ok(GridlineExitCode::OK)
    }
}

fn parse_stop(input: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(input).map(|time| time.with_timezone(&Utc))
}

fn default_stop(now: DateTime<Utc>, lookback: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(lookback)
        .ok()
        .and_then(|lookback| now.checked_sub_signed(lookback))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

fn read_previous(path: &Utf8Path) -> Result<BTreeMap<String, Vec<InflatedColumn>>> {
    let contents = std::fs::read_to_string(path).map_err(|err| {
        ExpectedError::PreviousReadError {
            path: path.to_owned(),
            err,
        }
    })?;
    serde_json::from_str(&contents).map_err(|err| ExpectedError::PreviousParseError {
        path: path.to_owned(),
        err,
    })
}
