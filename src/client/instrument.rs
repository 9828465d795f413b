// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    client::{session::ScpiSession, sim::SimSession},
    scpi::node::ScpiNode,
};

/// Sink advanced by percentage steps while connecting (20 after resolve
/// and 20 after dial for a real session, 40 for the simulated one).
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

/// A connected instrument as handed out by the cache.
pub type SharedInstrument = Arc<dyn Instrument>;

/// Host name that selects the in-memory double instead of a TCP dial.
pub const SIMULATED_HOST: &str = "simulated";

/// The contract every instrument variant implements. Adding a variant
/// means implementing this trait; nothing existing changes.
#[async_trait]
pub trait Instrument: Send + Sync {
    /// Takes effect on the next operation; dial, read and write deadlines
    /// all derive from this value.
    fn set_timeout(&self, timeout: Duration);

    /// Writes `scpi` without waiting for any response.
    async fn command(&self, scpi: &str) -> Result<()>;

    /// Writes `scpi` and reads one response, returned as received
    /// (trailing newline included for plain ASCII replies).
    async fn query(&self, scpi: &str) -> Result<Bytes>;

    /// Drains the instrument error queue into `acc` until the `+0` "no
    /// error" sentinel shows up; entries are right-trimmed of `\n`.
    async fn query_error(&self, acc: Vec<String>) -> Result<Vec<String>>;

    /// Returns `(star_tree, colon_tree)` snapshots of the command
    /// catalog, re-parsed only when the raw headers payload changed.
    async fn supported_commands_tree(&self) -> Result<(ScpiNode, ScpiNode)>;

    /// Safe to call more than once.
    async fn close(&self) -> Result<()>;
}

/// Dispatch rule used by the interactive shell: anything containing `?`
/// is a query and expects a response, everything else is a bare command.
pub fn is_query(scpi: &str) -> bool {
    scpi.contains('?')
}

/// Builds and connects the right variant for `host`, advancing `progress`
/// along the way.
pub async fn connect_instrument(
    host: &str,
    port: u16,
    timeout: Duration,
    interactive: bool,
    progress: Option<&ProgressFn>,
) -> Result<SharedInstrument> {
    if host == SIMULATED_HOST {
        return Ok(Arc::new(SimSession::connect(timeout, interactive, progress)));
    }
    let address = format!("{host}:{port}");
    let session = ScpiSession::connect(&address, timeout, interactive, progress).await?;
    Ok(Arc::new(session))
}
