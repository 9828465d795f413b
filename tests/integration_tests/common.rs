// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use anyhow::Result;
use scpi_client_rs::client::codec::encode_block;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};

pub const MOCK_IDN: &str = "MOCK,SCPI-1000,0,A.01\n";

pub const MOCK_HEADERS: &str = "*CLS/nquery/\n*ESR?/qonly/\n*IDN?/qonly/\n:ABORt/nquery/\n:OUTPut{1:2}[:STATe]\n:SYSTem:ERRor[:NEXT]?/qonly/\n";

/// Payload served for `BIG?`, larger than one buffered read.
pub fn big_payload() -> Vec<u8> {
    (0..10_000u32).map(|i| (i % 251) as u8).collect()
}

/// In-process stand-in for a SCPI instrument on a loopback port.
///
/// Each connection gets its own error queue, so `SYST:ERR?` drains
/// `+1,"a"` then `+2,"b"` before settling on the `+0` sentinel.
pub struct MockInstrument {
    host: String,
    port: u16,
    accepted: Arc<AtomicUsize>,
}

impl MockInstrument {
    /// Serves every accepted connection until the test ends.
    pub async fn spawn() -> Result<Self> {
        Self::spawn_inner(0).await
    }

    /// Drops the first `flaky_conns` accepted connections right away,
    /// then serves normally.
    pub async fn spawn_flaky(flaky_conns: usize) -> Result<Self> {
        Self::spawn_inner(flaky_conns).await
    }

    async fn spawn_inner(flaky_conns: usize) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let accepted = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&accepted);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let seen = counter.fetch_add(1, Ordering::SeqCst);
                if seen < flaky_conns {
                    drop(stream);
                    continue;
                }
                tokio::spawn(async move {
                    let _ = serve_connection(stream).await;
                });
            }
        });

        Ok(Self {
            host: addr.ip().to_string(),
            port: addr.port(),
            accepted,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

async fn serve_connection(stream: TcpStream) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    let mut pending_errors = vec!["+2,\"b\"".to_string(), "+1,\"a\"".to_string()];

    while let Some(line) = lines.next_line().await? {
        match line.as_str() {
            "*IDN?" => write_half.write_all(MOCK_IDN.as_bytes()).await?,
            ":SYST:HELP:HEAD?" => {
                write_half
                    .write_all(&encode_block(MOCK_HEADERS.as_bytes()))
                    .await?;
            },
            "SYST:ERR?" => {
                let response = pending_errors
                    .pop()
                    .map(|error| format!("{error}\n"))
                    .unwrap_or_else(|| "+0,\"No error\"\n".to_string());
                write_half.write_all(response.as_bytes()).await?;
            },
            "BIG?" => {
                write_half.write_all(&encode_block(&big_payload())).await?;
            },
            // A stuck instrument: accepts the query and says nothing.
            "SLOW?" => {},
            query if query.ends_with('?') => {
                write_half.write_all(format!("{query}\n").as_bytes()).await?;
            },
            // Bare commands produce no response, like the real thing.
            _ => {},
        }
    }
    Ok(())
}
