// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::Result;
use tracing::debug;

use crate::client::{
    cache::ConnectionCache,
    error::is_connection_closed,
    instrument::{Instrument, ProgressFn, SharedInstrument},
};

/// Runs `op` against the cached session for `host:port`.
///
/// When the session turns out to be dead (`ConnectionClosed` anywhere in
/// the error chain), the cache entry is invalidated, a fresh session is
/// dialed, and `op` runs exactly once more; whatever that attempt returns
/// is surfaced. Timeouts, framing errors and SCPI-level errors are never
/// retried.
pub async fn with_instrument<T, F, Fut>(
    cache: &ConnectionCache,
    host: &str,
    port: u16,
    timeout: Duration,
    progress: Option<&ProgressFn>,
    op: F,
) -> Result<T>
where
    F: Fn(SharedInstrument) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let instrument = cache.get(host, port, timeout, progress).await?;
    instrument.set_timeout(timeout);

    match op(instrument).await {
        Ok(value) => Ok(value),
        Err(err) if is_connection_closed(&err) => {
            debug!(host, port, "connection lost, reconnecting once");
            cache.invalidate(host, port).await;
            let instrument = cache.get(host, port, timeout, progress).await?;
            instrument.set_timeout(timeout);
            op(instrument).await
        },
        Err(err) => Err(err),
    }
}
