// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    client::{
        codec::encode_command,
        instrument::{Instrument, ProgressFn},
        progress::QueryProgress,
    },
    scpi::{
        node::ScpiNode,
        parser::{parse_scpi, split_headers},
    },
};

/// Headers file the simulated session reads, resolved against the working
/// directory.
pub const SIM_HEADERS_FILE: &str = "SCPI.txt";

/// In-memory instrument double: queries echo back and the command catalog
/// comes from a local headers file, so the front-ends run with nothing on
/// the bench.
#[derive(Debug)]
pub struct SimSession {
    timeout_ms: AtomicU64,
    interactive: bool,
    headers_path: PathBuf,
}

impl SimSession {
    /// "Connects" by advancing `progress` by 40; there is nothing to dial.
    pub fn connect(
        timeout: Duration,
        interactive: bool,
        progress: Option<&ProgressFn>,
    ) -> Self {
        if let Some(progress) = progress {
            progress(40);
        }
        Self {
            timeout_ms: AtomicU64::new(timeout.as_millis() as u64),
            interactive,
            headers_path: PathBuf::from(SIM_HEADERS_FILE),
        }
    }

    /// Points the session at a headers file other than `SCPI.txt`.
    pub fn with_headers_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.headers_path = path.into();
        self
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.load(Ordering::Relaxed))
    }
}

#[async_trait]
impl Instrument for SimSession {
    fn set_timeout(&self, timeout: Duration) {
        self.timeout_ms
            .store(timeout.as_millis() as u64, Ordering::Relaxed);
    }

    async fn command(&self, _scpi: &str) -> Result<()> {
        Ok(())
    }

    async fn query(&self, scpi: &str) -> Result<Bytes> {
        // These two literals route through the progress worker, one as a
        // success and one as a failure, so the progress path can be
        // exercised with no instrument attached.
        if scpi == "*ESR?" || scpi == "*ID?" {
            let progress = QueryProgress::spawn(self.timeout(), self.interactive);
            if scpi == "*ID?" {
                progress.fail().await;
            } else {
                progress.complete().await;
            }
        }
        Ok(encode_command(scpi))
    }

    async fn query_error(&self, acc: Vec<String>) -> Result<Vec<String>> {
        Ok(acc)
    }

    async fn supported_commands_tree(&self) -> Result<(ScpiNode, ScpiNode)> {
        let payload = tokio::fs::read_to_string(&self.headers_path)
            .await
            .with_context(|| {
                format!(
                    "failed to read simulated headers file {:?}",
                    self.headers_path
                )
            })?;
        let (star_lines, colon_lines) = split_headers(&payload);
        Ok((parse_scpi(star_lines)?, parse_scpi(colon_lines)?))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
