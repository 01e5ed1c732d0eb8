// Copyright (c) The gridline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::elements::{Concurrency, TestGroup};
use crate::{
    errors::{ConfigParseError, ConfigParseErrorKind},
    helpers::plural,
};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use std::{
    collections::{BTreeSet, HashSet},
    sync::LazyLock,
    time::Duration,
};
use tracing::warn;

/// Trait for handling configuration warnings.
///
/// The default implementation, [`DefaultConfigWarnings`], logs them.
pub trait ConfigWarnings {
    /// Handle unknown configuration keys found in a config file.
    fn unknown_config_keys(&mut self, config_file: &Utf8Path, unknown: &BTreeSet<String>);
}

/// Logs configuration warnings with `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultConfigWarnings;

impl ConfigWarnings for DefaultConfigWarnings {
    fn unknown_config_keys(&mut self, config_file: &Utf8Path, unknown: &BTreeSet<String>) {
        let mut unknown_str = String::new();
        if unknown.len() == 1 {
            // Print this on the same line.
            unknown_str.push(' ');
            unknown_str.push_str(unknown.iter().next().map_or("", String::as_str));
        } else {
            for ignored_key in unknown {
                unknown_str.push_str("\n  - ");
                unknown_str.push_str(ignored_key);
            }
        }

        warn!(
            "ignoring unknown configuration {} in config file {config_file}:{unknown_str}",
            plural::keys_str(unknown.len()),
        );
    }
}

/// Gets the number of available CPUs and caches the value.
#[inline]
pub fn get_num_cpus() -> usize {
    static NUM_CPUS: LazyLock<usize> =
        LazyLock::new(|| match std::thread::available_parallelism() {
            Ok(count) => count.into(),
            Err(err) => {
                warn!("unable to determine num-cpus ({err}), assuming 1 logical CPU");
                1
            }
        });

    *NUM_CPUS
}

/// Overall configuration for gridline.
#[derive(Clone, Debug)]
pub struct GridlineConfig {
    config_file: Option<Utf8PathBuf>,
    concurrency: Concurrency,
    build_timeout: Duration,
    lookback: Duration,
    test_groups: Vec<TestGroup>,
}

impl GridlineConfig {
    /// The default location of the config, relative to the current directory.
    pub const CONFIG_PATH: &'static str = ".config/gridline.toml";

    /// Contains the default config as a TOML file.
    ///
    /// User configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../../default-config.toml");

    /// Reads the config from `config_file`, or if not specified from [`Self::CONFIG_PATH`] if it
    /// exists.
    ///
    /// If no config file is found, the default config is used.
    pub fn from_file(
        config_file: Option<&Utf8Path>,
        warnings: &mut impl ConfigWarnings,
    ) -> Result<Self, ConfigParseError> {
        let (config_file, source) = match config_file {
            Some(file) => (
                file.to_owned(),
                File::new(file.as_str(), FileFormat::Toml).required(true),
            ),
            None => {
                let file = Utf8PathBuf::from(Self::CONFIG_PATH);
                let source = File::new(file.as_str(), FileFormat::Toml).required(false);
                (file, source)
            }
        };

        let builder = Self::make_default_config().add_source(source);
        let (deserialized, unknown) = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(&config_file, kind))?;
        if !unknown.is_empty() {
            warnings.unknown_config_keys(&config_file, &unknown);
        }

        let config_file_exists = config_file.exists();
        Self::from_deserialized(deserialized, config_file_exists.then_some(config_file))
    }

    /// Returns the default config, with no test groups.
    #[cfg(test)]
    pub(crate) fn default_config() -> Self {
        use itertools::Itertools;

        let config = Self::make_default_config()
            .build()
            .expect("default config is always valid");

        let mut unknown = BTreeSet::new();
        let deserialized: GridlineConfigDeserialize =
            serde_ignored::deserialize(config, |path: serde_ignored::Path| {
                unknown.insert(path.to_string());
            })
            .expect("default config is always valid");

        // The default config is embedded in the binary, so it must not have unknown keys.
        if !unknown.is_empty() {
            panic!(
                "found unknown keys in default config: {}",
                unknown.iter().join(", ")
            );
        }

        Self::from_deserialized(deserialized, None).expect("default config is always valid")
    }

    /// Returns the config file this config was read from, if any.
    pub fn config_file(&self) -> Option<&Utf8Path> {
        self.config_file.as_deref()
    }

    /// Returns the number of builds read concurrently.
    pub fn concurrency(&self) -> Concurrency {
        self.concurrency
    }

    /// Returns the time limit for reading a single build.
    pub fn build_timeout(&self) -> Duration {
        self.build_timeout
    }

    /// Returns how far back builds are read when no stop time is given.
    pub fn lookback(&self) -> Duration {
        self.lookback
    }

    /// Returns every configured test group, in declaration order.
    pub fn test_groups(&self) -> &[TestGroup] {
        &self.test_groups
    }

    /// Returns the test group with the given name.
    pub fn test_group(&self, name: &str) -> Option<&TestGroup> {
        self.test_groups.iter().find(|group| group.name == name)
    }

    // ---
    // Helper methods
    // ---

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn from_deserialized(
        deserialized: GridlineConfigDeserialize,
        config_file: Option<Utf8PathBuf>,
    ) -> Result<Self, ConfigParseError> {
        let error_file = || {
            config_file
                .clone()
                .unwrap_or_else(|| Utf8PathBuf::from(Self::CONFIG_PATH))
        };

        let mut seen = HashSet::new();
        for group in &deserialized.test_groups {
            if !seen.insert(group.name.as_str()) {
                return Err(ConfigParseError::new(
                    error_file(),
                    ConfigParseErrorKind::DuplicateTestGroup {
                        name: group.name.clone(),
                    },
                ));
            }
            group.paths().map_err(|err| {
                ConfigParseError::new(error_file(), ConfigParseErrorKind::InvalidTestGroup(err))
            })?;
        }

        Ok(Self {
            config_file,
            concurrency: deserialized.updater.concurrency,
            build_timeout: deserialized.updater.build_timeout,
            lookback: deserialized.updater.lookback,
            test_groups: deserialized.test_groups,
        })
    }

    /// This returns a tuple of (config, ignored paths).
    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<(GridlineConfigDeserialize, BTreeSet<String>), ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        let mut ignored = BTreeSet::new();
        let mut cb = |path: serde_ignored::Path| {
            ignored.insert(path.to_string());
        };
        let ignored_de = serde_ignored::Deserializer::new(config, &mut cb);
        let config: GridlineConfigDeserialize = serde_path_to_error::deserialize(ignored_de)
            .map_err(|error| {
                // The config crate reports the key too; keep only the path from
                // serde_path_to_error.
                let path = error.path().clone();
                let config_error = error.into_inner();
                let error = match config_error {
                    ConfigError::At { error, .. } => *error,
                    other => other,
                };
                ConfigParseErrorKind::DeserializeError(Box::new(serde_path_to_error::Error::new(
                    path, error,
                )))
            })?;

        Ok((config, ignored))
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct GridlineConfigDeserialize {
    updater: UpdaterConfigDeserialize,
    #[serde(default, rename = "test-group")]
    test_groups: Vec<TestGroup>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct UpdaterConfigDeserialize {
    concurrency: Concurrency,
    #[serde(with = "humantime_serde")]
    build_timeout: Duration,
    #[serde(with = "humantime_serde")]
    lookback: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct TestConfigWarnings {
        unknown: Vec<BTreeSet<String>>,
    }

    impl ConfigWarnings for TestConfigWarnings {
        fn unknown_config_keys(&mut self, _config_file: &Utf8Path, unknown: &BTreeSet<String>) {
            self.unknown.push(unknown.clone());
        }
    }

    fn write_config(contents: &str) -> (Utf8TempDir, Utf8PathBuf) {
        let dir = Utf8TempDir::new().unwrap();
        let config_file = dir.path().join("gridline.toml");
        std::fs::write(&config_file, contents).unwrap();
        (dir, config_file)
    }

    #[test]
    fn default_config_is_valid() {
        let config = GridlineConfig::default_config();
        assert_eq!(config.concurrency(), Concurrency::Count(20));
        assert_eq!(config.build_timeout(), Duration::from_secs(180));
        assert_eq!(config.lookback(), Duration::from_secs(7 * 24 * 60 * 60));
        assert!(config.test_groups().is_empty());
    }

    #[test]
    fn test_groups_and_overrides() {
        let (_dir, config_file) = write_config(indoc! {r#"
            [updater]
            build-timeout = "30s"

            [[test-group]]
            name = "ci-foo"
            gcs-prefix = "bucket/logs/ci-foo"
            column-header = [{ configuration-value = "node" }]
            short-text-metric = "coverage"

            [test-group.test-name-config]
            name-format = "%s [%s]"
            name-elements = [{ target-config = "Tests name" }, { test-property = "Context" }]

            [[test-group]]
            name = "ci-merged"
            gcs-prefix = "bucket/logs/a,bucket/logs/b"
            disable-merged-status = true
        "#});

        let mut warnings = TestConfigWarnings::default();
        let config = GridlineConfig::from_file(Some(&config_file), &mut warnings)
            .expect("config is valid");
        assert!(warnings.unknown.is_empty(), "{:?}", warnings.unknown);
        assert_eq!(config.config_file(), Some(config_file.as_path()));
        assert_eq!(config.concurrency(), Concurrency::Count(20));
        assert_eq!(config.build_timeout(), Duration::from_secs(30));

        let foo = config.test_group("ci-foo").expect("ci-foo exists");
        assert_eq!(foo.column_headers(), ["node"]);
        assert_eq!(foo.short_text_metric, "coverage");
        let name_config = foo.test_name_config.as_ref().expect("name config set");
        assert_eq!(name_config.name_format, "%s [%s]");
        assert_eq!(name_config.name_elements[1].key(), "Context");

        let merged = config.test_group("ci-merged").expect("ci-merged exists");
        assert!(merged.disable_merged_status);
        assert!(merged.is_multi_job());
        assert_eq!(merged.paths().unwrap().len(), 2);
    }

    #[test]
    fn unknown_keys_are_reported() {
        let (_dir, config_file) = write_config(indoc! {r#"
            [updater]
            concurency = 4

            [[test-group]]
            name = "g"
            gcs-prefix = "bucket/g"
            colour = "blue"
        "#});

        let mut warnings = TestConfigWarnings::default();
        GridlineConfig::from_file(Some(&config_file), &mut warnings).expect("config is valid");
        assert_eq!(warnings.unknown.len(), 1);
        let unknown: Vec<_> = warnings.unknown[0].iter().cloned().collect();
        assert_eq!(unknown, ["test-group.0.colour", "updater.concurency"]);
    }

    #[test]
    fn duplicate_test_groups() {
        let (_dir, config_file) = write_config(indoc! {r#"
            [[test-group]]
            name = "g"
            gcs-prefix = "bucket/a"

            [[test-group]]
            name = "g"
            gcs-prefix = "bucket/b"
        "#});

        let err = GridlineConfig::from_file(Some(&config_file), &mut DefaultConfigWarnings)
            .expect_err("duplicate names are rejected");
        assert!(
            matches!(err.kind(), ConfigParseErrorKind::DuplicateTestGroup { name } if name == "g"),
            "{err:?}"
        );
    }

    #[test]
    fn invalid_prefix() {
        let (_dir, config_file) = write_config(indoc! {r#"
            [[test-group]]
            name = "g"
            gcs-prefix = "bucket/a,"
        "#});

        let err = GridlineConfig::from_file(Some(&config_file), &mut DefaultConfigWarnings)
            .expect_err("empty element is rejected");
        assert!(
            matches!(err.kind(), ConfigParseErrorKind::InvalidTestGroup(_)),
            "{err:?}"
        );
    }

    #[test]
    fn bad_duration_reports_path() {
        let (_dir, config_file) = write_config(indoc! {r#"
            [updater]
            build-timeout = "soon"
        "#});

        let err = GridlineConfig::from_file(Some(&config_file), &mut DefaultConfigWarnings)
            .expect_err("duration is invalid");
        let ConfigParseErrorKind::DeserializeError(err) = err.kind() else {
            panic!("expected a deserialize error, found {err:?}");
        };
        assert_eq!(err.path().to_string(), "updater.build-timeout");
    }
}
