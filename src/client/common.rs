// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::Result;
use tokio::time::timeout;

use crate::client::error::{InstrumentError, is_disconnect};

/// Bounds one read or write future with the session's current deadline and
/// translates dead-peer failures into the distinguished
/// `ConnectionClosed`. An elapsed deadline becomes `Timeout`, never
/// `ConnectionClosed`, so the retry layer does not reconnect on a merely
/// slow instrument.
pub(super) async fn io_with_timeout<F, T>(
    label: &'static str,
    fut: F,
    io_timeout: Duration,
) -> Result<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    match timeout(io_timeout, fut).await {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(e)) if is_disconnect(&e) => Err(InstrumentError::ConnectionClosed(e).into()),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(InstrumentError::Timeout {
            op: label,
            timeout: io_timeout,
        }
        .into()),
    }
}
