// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{collections::HashMap, sync::Arc, time::Duration};

use anyhow::Result;
use once_cell::sync::Lazy;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::client::instrument::{
    Instrument, ProgressFn, SharedInstrument, connect_instrument,
};

/// Process-wide cache used by the front-ends. Tests build private caches
/// with [`ConnectionCache::new`].
pub static INSTRUMENT_CACHE: Lazy<ConnectionCache> =
    Lazy::new(|| ConnectionCache::new(false));

/// Map from `"host:port"` to the single live session for that endpoint.
///
/// Lookups take the read lock; a miss upgrades to the write lock,
/// re-checks, and dials while still holding it. Two concurrent callers can
/// therefore never race a second session into existence for the same key,
/// and no reader ever observes a half-constructed entry.
pub struct ConnectionCache {
    instruments: RwLock<HashMap<String, SharedInstrument>>,
    interactive: bool,
}

impl ConnectionCache {
    pub fn new(interactive: bool) -> Self {
        Self {
            instruments: RwLock::new(HashMap::new()),
            interactive,
        }
    }

    /// Returns the cached session for `host:port`, dialing one on first
    /// use.
    pub async fn get(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
        progress: Option<&ProgressFn>,
    ) -> Result<SharedInstrument> {
        let key = cache_key(host, port);
        {
            let instruments = self.instruments.read().await;
            if let Some(instrument) = instruments.get(&key) {
                return Ok(Arc::clone(instrument));
            }
        }

        let mut instruments = self.instruments.write().await;
        if let Some(instrument) = instruments.get(&key) {
            return Ok(Arc::clone(instrument));
        }
        let instrument =
            connect_instrument(host, port, timeout, self.interactive, progress).await?;
        instruments.insert(key, Arc::clone(&instrument));
        Ok(instrument)
    }

    /// Closes and forgets the session for `host:port`, if any. Safe to
    /// call for keys that were never cached.
    pub async fn invalidate(&self, host: &str, port: u16) {
        let key = cache_key(host, port);
        let mut instruments = self.instruments.write().await;
        if let Some(instrument) = instruments.remove(&key) {
            debug!(%key, "invalidating cached instrument");
            if let Err(err) = instrument.close().await {
                warn!(%key, "failed to close invalidated instrument: {err:#}");
            }
        }
    }
}

fn cache_key(host: &str, port: u16) -> String {
    format!("{host}:{port}")
}
