// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Cooperative progress reporting for one in-flight query.
//!
//! The worker stays silent for the first second so fast queries never
//! flash a bar. After that, an interactive session gets a 0–100 bar that
//! jumps to 10 and ticks +10 every `timeout/10` up to 90; completion fills
//! it to 100. Whatever happened, the line is erased before `done` fires,
//! which orders any later terminal output after the cleanup. The worker
//! never touches the connection and owns no I/O deadline.

use std::{
    cmp::min,
    io::{self, Write},
    time::Duration,
};

use tokio::{sync::oneshot, time::sleep};

/// Handle held by the querying side. Exactly one of [`complete`] or
/// [`fail`] must be awaited before the query returns.
///
/// [`complete`]: QueryProgress::complete
/// [`fail`]: QueryProgress::fail
#[derive(Debug)]
pub struct QueryProgress {
    completed: oneshot::Sender<()>,
    failed: oneshot::Sender<()>,
    done: oneshot::Receiver<()>,
}

impl QueryProgress {
    pub fn spawn(timeout: Duration, interactive: bool) -> Self {
        let (completed_tx, completed_rx) = oneshot::channel();
        let (failed_tx, failed_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();

        tokio::spawn(progress_loop(
            completed_rx,
            failed_rx,
            done_tx,
            timeout,
            interactive,
        ));

        Self {
            completed: completed_tx,
            failed: failed_tx,
            done: done_rx,
        }
    }

    /// Signals a finished query and waits for the bar line to be erased.
    pub async fn complete(self) {
        let _ = self.completed.send(());
        let _ = self.done.await;
    }

    /// Signals a failed query and waits for the bar line to be erased.
    pub async fn fail(self) {
        let _ = self.failed.send(());
        let _ = self.done.await;
    }
}

async fn progress_loop(
    mut completed: oneshot::Receiver<()>,
    mut failed: oneshot::Receiver<()>,
    done: oneshot::Sender<()>,
    timeout: Duration,
    interactive: bool,
) {
    // Quiet window: a query settling here draws nothing at all. A dropped
    // handle resolves the receivers too and is treated the same way.
    tokio::select! {
        _ = &mut completed => {
            let _ = done.send(());
            return;
        },
        _ = &mut failed => {
            let _ = done.send(());
            return;
        },
        _ = sleep(Duration::from_secs(1)) => {},
    }

    let mut bar = interactive.then(ProgressBar::start);
    let tick = (timeout / 10).max(Duration::from_millis(1));
    loop {
        tokio::select! {
            _ = &mut completed => {
                if let Some(bar) = bar.as_mut() {
                    bar.set(100);
                }
                break;
            },
            _ = &mut failed => break,
            _ = sleep(tick) => {
                if let Some(bar) = bar.as_mut()
                    && bar.percent < 90
                {
                    bar.set(bar.percent + 10);
                }
            },
        }
    }

    if let Some(bar) = bar {
        bar.clear();
    }
    let _ = done.send(());
}

const BAR_WIDTH: usize = 40;

/// Minimal inline bar, redrawn in place on the current line.
#[derive(Debug)]
struct ProgressBar {
    percent: u8,
}

impl ProgressBar {
    fn start() -> Self {
        let mut bar = Self { percent: 0 };
        bar.set(10);
        bar
    }

    fn set(&mut self, percent: u8) {
        self.percent = min(percent, 100);
        let filled = BAR_WIDTH * usize::from(self.percent) / 100;
        print!(
            "\r[{:#<filled$}{:.<rest$}] {:>3}%",
            "",
            "",
            self.percent,
            filled = filled,
            rest = BAR_WIDTH - filled
        );
        let _ = io::stdout().flush();
    }

    /// Carriage return plus ANSI erase-to-end-of-line.
    fn clear(&self) {
        print!("\r\x1b[K");
        let _ = io::stdout().flush();
    }
}
