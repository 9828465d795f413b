// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    io,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::{
    io::AsyncWriteExt,
    net::{TcpStream, lookup_host},
    sync::Mutex,
};
use tracing::debug;

use crate::{
    client::{
        codec::{encode_command, read_response},
        common::io_with_timeout,
        error::{InstrumentError, already_closed},
        instrument::{Instrument, ProgressFn},
        progress::QueryProgress,
    },
    scpi::{
        node::ScpiNode,
        parser::{parse_scpi, split_headers},
    },
    utils::fnv1a_32,
};

/// Query draining one entry of the instrument error queue.
const ERROR_QUERY: &str = "SYST:ERR?";
/// Query returning the compact command catalog.
const HEADERS_QUERY: &str = ":SYST:HELP:HEAD?";
/// Upper bound on consecutive error-queue reads. A sane instrument
/// reports `+0,"No error"` long before this.
const MAX_ERROR_READS: usize = 64;

/// One live TCP session with a SCPI instrument.
///
/// All byte-level I/O is serialized by the stream mutex: a query holds it
/// across its entire write-then-read framing, so concurrent callers queue
/// behind the lock and never observe a partial frame. Deadlines are
/// re-armed from the current timeout at the start of every read and
/// write.
#[derive(Debug)]
pub struct ScpiSession {
    address: String,
    stream: Mutex<Option<TcpStream>>,
    timeout_ms: AtomicU64,
    interactive: bool,
    headers: Mutex<Option<HeadersCache>>,
}

/// Parsed trees keyed by the hash of the raw headers payload.
#[derive(Debug)]
struct HeadersCache {
    hash: u32,
    star: ScpiNode,
    colon: ScpiNode,
}

impl ScpiSession {
    /// Resolves and dials `address` (`host:port`), advancing `progress` by
    /// 20 after each step. The dial itself is bounded by `timeout`.
    pub async fn connect(
        address: &str,
        timeout: Duration,
        interactive: bool,
        progress: Option<&ProgressFn>,
    ) -> Result<Self> {
        let resolved = lookup_host(address)
            .await
            .map_err(|source| InstrumentError::AddressResolve {
                address: address.to_string(),
                source,
            })?
            .next()
            .ok_or_else(|| InstrumentError::AddressResolve {
                address: address.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "no addresses returned"),
            })?;
        if let Some(progress) = progress {
            progress(20);
        }

        let stream = match tokio::time::timeout(timeout, TcpStream::connect(resolved)).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(InstrumentError::DialFailed {
                    address: address.to_string(),
                    source,
                }
                .into());
            },
            Err(_) => {
                return Err(InstrumentError::DialFailed {
                    address: address.to_string(),
                    source: io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("dial timed out after {timeout:?}"),
                    ),
                }
                .into());
            },
        };
        stream.set_nodelay(true)?;
        if let Some(progress) = progress {
            progress(20);
        }

        debug!(address, "connected to instrument");
        Ok(Self {
            address: address.to_string(),
            stream: Mutex::new(Some(stream)),
            timeout_ms: AtomicU64::new(timeout.as_millis() as u64),
            interactive,
            headers: Mutex::new(None),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.load(Ordering::Relaxed))
    }

    /// Writes `scpi` + `\n` under a fresh write deadline.
    async fn write_command(&self, stream: &mut TcpStream, scpi: &str) -> Result<()> {
        let frame = encode_command(scpi);
        io_with_timeout("write command", stream.write_all(&frame), self.timeout()).await
    }

    async fn exec(&self, scpi: &str) -> Result<()> {
        let mut guard = self.stream.lock().await;
        let stream = locked_stream(&mut guard)?;
        self.write_command(stream, scpi).await
    }

    async fn query_inner(&self, scpi: &str) -> Result<Bytes> {
        let timeout = self.timeout();
        let mut guard = self.stream.lock().await;
        let stream = locked_stream(&mut guard)?;
        self.write_command(stream, scpi).await?;

        let progress = QueryProgress::spawn(timeout, self.interactive);
        match read_response(stream, timeout).await {
            Ok(response) => {
                progress.complete().await;
                Ok(response)
            },
            Err(err) => {
                progress.fail().await;
                Err(err)
            },
        }
    }
}

fn locked_stream(guard: &mut Option<TcpStream>) -> Result<&mut TcpStream> {
    guard
        .as_mut()
        .ok_or_else(|| InstrumentError::ConnectionClosed(already_closed()).into())
}

#[async_trait]
impl Instrument for ScpiSession {
    fn set_timeout(&self, timeout: Duration) {
        self.timeout_ms
            .store(timeout.as_millis() as u64, Ordering::Relaxed);
    }

    async fn command(&self, scpi: &str) -> Result<()> {
        self.exec(scpi)
            .await
            .with_context(|| format!("failed to execute the command '{scpi}'"))
    }

    async fn query(&self, scpi: &str) -> Result<Bytes> {
        self.query_inner(scpi).await
    }

    async fn query_error(&self, mut acc: Vec<String>) -> Result<Vec<String>> {
        for _ in 0..MAX_ERROR_READS {
            let response = self.query_inner(ERROR_QUERY).await?;
            if response.starts_with(b"+0") {
                return Ok(acc);
            }
            acc.push(
                String::from_utf8_lossy(&response)
                    .trim_end_matches('\n')
                    .to_string(),
            );
        }
        bail!("instrument kept reporting errors after {MAX_ERROR_READS} reads of {ERROR_QUERY}")
    }

    async fn supported_commands_tree(&self) -> Result<(ScpiNode, ScpiNode)> {
        let raw = self.query_inner(HEADERS_QUERY).await?;
        let hash = fnv1a_32(&raw);

        {
            let cached = self.headers.lock().await;
            if let Some(cache) = cached.as_ref()
                && cache.hash == hash
            {
                return Ok((cache.star.clone(), cache.colon.clone()));
            }
        }

        // Rebuild with no locks held; the parser is CPU-only. The finished
        // trees are swapped in atomically below.
        let payload = String::from_utf8_lossy(&raw);
        let (star_lines, colon_lines) = split_headers(&payload);
        let star = parse_scpi(star_lines)?;
        let colon = parse_scpi(colon_lines)?;
        debug!(address = %self.address, hash, "rebuilt command catalog");

        let mut cached = self.headers.lock().await;
        *cached = Some(HeadersCache {
            hash,
            star: star.clone(),
            colon: colon.clone(),
        });
        Ok((star, colon))
    }

    async fn close(&self) -> Result<()> {
        let mut guard = self.stream.lock().await;
        if let Some(mut stream) = guard.take() {
            let _ = stream.shutdown().await; // ignore errors if already closed
        }
        Ok(())
    }
}
