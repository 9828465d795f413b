// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use anyhow::{Context, Result};
use scpi_client_rs::{
    cfg::{
        cli::{config_path_from_args, resolve_config_path},
        config::Config,
        logger::init_logger,
    },
    client::{
        cache::ConnectionCache,
        instrument::{Instrument, ProgressFn},
        retry::with_instrument,
    },
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let _logger_guard = init_logger("config/logger.yaml")?;

    let cfg = resolve_config_path(&config_path_from_args("config/scpi.yaml"))
        .and_then(Config::load_from_file)
        .context("failed to resolve or load config")?;

    let cache = ConnectionCache::new(cfg.runtime.interactive);
    let host = cfg.instrument.address;
    let port = cfg.instrument.port;
    let timeout = cfg.runtime.timeout;

    let progress: ProgressFn = Arc::new(|step| info!(step, "connect progress"));

    let idn = with_instrument(&cache, &host, port, timeout, Some(&progress), |inst| {
        async move { inst.query("*IDN?").await }
    })
    .await
    .context("*IDN? failed")?;
    info!(
        identity = %String::from_utf8_lossy(&idn).trim_end(),
        "instrument identified"
    );

    let (star, colon) =
        with_instrument(&cache, &host, port, timeout, Some(&progress), |inst| {
            async move { inst.supported_commands_tree().await }
        })
        .await
        .context("headers fetch failed")?;
    info!(
        star_commands = star.children.len(),
        colon_commands = colon.children.len(),
        "command catalog loaded"
    );

    let errors = with_instrument(&cache, &host, port, timeout, Some(&progress), |inst| {
        async move { inst.query_error(Vec::new()).await }
    })
    .await
    .context("error queue drain failed")?;
    for error in &errors {
        info!(%error, "instrument reported an error");
    }

    cache.invalidate(&host, port).await;
    Ok(())
}
