// Copyright (c) The gridline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{config::get_num_cpus, errors::ConcurrencyParseError};
use serde::Deserialize;
use std::{cmp::Ordering, fmt, str::FromStr};

/// Type for the `updater.concurrency` config key: the number of builds read at once.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Concurrency {
    /// Read a specified number of builds at once.
    Count(usize),

    /// Read as many builds at once as there are logical CPUs.
    NumCpus,
}

impl Concurrency {
    /// Gets the actual number of readers computed at runtime.
    pub fn compute(self) -> usize {
        match self {
            Self::Count(readers) => readers,
            Self::NumCpus => get_num_cpus(),
        }
    }

    fn from_signed(value: i64) -> Option<Self> {
        match value.cmp(&0) {
            Ordering::Greater => Some(Self::Count(value as usize)),
            Ordering::Less => Some(Self::Count((get_num_cpus() as i64 + value).max(1) as usize)),
            Ordering::Equal => None,
        }
    }
}

impl FromStr for Concurrency {
    type Err = ConcurrencyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "num-cpus" {
            return Ok(Self::NumCpus);
        }

        let value = s
            .parse::<i64>()
            .map_err(|_| ConcurrencyParseError::new(s, "expected an integer or \"num-cpus\""))?;
        Self::from_signed(value).ok_or_else(|| ConcurrencyParseError::new(s, "may not be 0"))
    }
}

impl fmt::Display for Concurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(readers) => write!(f, "{readers}"),
            Self::NumCpus => write!(f, "num-cpus"),
        }
    }
}

impl<'de> Deserialize<'de> for Concurrency {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = Concurrency;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "a non-zero integer or the string \"num-cpus\"")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if v == "num-cpus" {
                    Ok(Concurrency::NumCpus)
                } else {
                    Err(serde::de::Error::invalid_value(
                        serde::de::Unexpected::Str(v),
                        &self,
                    ))
                }
            }

            // TOML integers are i64.
            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Concurrency::from_signed(v).ok_or_else(|| {
                    serde::de::Error::invalid_value(serde::de::Unexpected::Signed(v), &self)
                })
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                match v {
                    0 => Err(serde::de::Error::invalid_value(
                        serde::de::Unexpected::Unsigned(v),
                        &self,
                    )),
                    v => Ok(Concurrency::Count(v as usize)),
                }
            }
        }

        deserializer.deserialize_any(V)
    }
}
