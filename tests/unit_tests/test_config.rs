// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::Result;
use scpi_client_rs::cfg::{cli::resolve_config_path, config::Config};

#[test]
fn test_load_test_config_with_defaulted_port() -> Result<()> {
    let cfg = resolve_config_path("tests/config.yaml").and_then(Config::load_from_file)?;
    assert_eq!(cfg.instrument.address, "simulated");
    assert_eq!(cfg.instrument.port, 5025);
    assert_eq!(cfg.runtime.timeout, Duration::from_secs(5));
    assert!(!cfg.runtime.interactive);
    Ok(())
}

#[test]
fn test_empty_address_is_rejected() -> Result<()> {
    let cfg: Config = serde_yaml::from_str(
        "instrument:\n  address: \"\"\nruntime:\n  timeout: 10\n",
    )?;
    assert!(cfg.validate().is_err());
    Ok(())
}

#[test]
fn test_zero_timeout_is_rejected() -> Result<()> {
    let cfg: Config = serde_yaml::from_str(
        "instrument:\n  address: \"simulated\"\nruntime:\n  timeout: 0\n",
    )?;
    assert!(cfg.validate().is_err());
    Ok(())
}

#[test]
fn test_zero_port_is_rejected() -> Result<()> {
    let cfg: Config = serde_yaml::from_str(
        "instrument:\n  address: \"10.0.0.5\"\n  port: 0\nruntime:\n  timeout: 10\n",
    )?;
    assert!(cfg.validate().is_err());
    Ok(())
}
