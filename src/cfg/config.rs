// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// Which instrument to talk to.
    pub instrument: InstrumentConfig,
    /// Session behavior outside the SCPI protocol itself.
    pub runtime: RuntimeConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct InstrumentConfig {
    /// Host name or IP address; the literal `simulated` selects the
    /// in-memory double.
    pub address: String,
    /// SCPI-over-TCP port.
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RuntimeConfig {
    /// Deadline applied to the dial and to every read and write, in
    /// seconds.
    #[serde(default = "default_timeout", with = "serde_secs")]
    pub timeout: Duration,
    /// Enables the inline progress bar during long queries.
    #[serde(default)]
    pub interactive: bool,
}

/// Raw-socket SCPI port most instruments listen on.
fn default_port() -> u16 {
    5025
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Config {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.instrument.address.is_empty(),
            "instrument.address must not be empty"
        );
        ensure!(self.instrument.port != 0, "instrument.port must be >= 1");
        ensure!(
            !self.runtime.timeout.is_zero(),
            "runtime.timeout must be > 0"
        );
        Ok(())
    }
}

/// Serde helpers for representing `Duration` as a number of seconds.
mod serde_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}
