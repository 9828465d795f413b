// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::Result;
use scpi_client_rs::client::{
    cache::ConnectionCache,
    error::{InstrumentError, is_connection_closed},
    instrument::Instrument,
    retry::with_instrument,
    session::ScpiSession,
};
use tokio::net::TcpListener;

use crate::integration_tests::common::{MOCK_IDN, MockInstrument};

const TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn test_dead_connection_is_retried_exactly_once() -> Result<()> {
    // The first accepted connection is dropped immediately; the retry
    // wrapper must invalidate, redial and succeed on the second.
    let mock = MockInstrument::spawn_flaky(1).await?;
    let cache = ConnectionCache::new(false);

    let idn = with_instrument(&cache, mock.host(), mock.port(), TIMEOUT, None, |inst| {
        async move { inst.query("*IDN?").await }
    })
    .await?;

    assert_eq!(&idn[..], MOCK_IDN.as_bytes());
    assert_eq!(mock.accepted(), 2);
    Ok(())
}

#[tokio::test]
async fn test_two_dead_connections_surface_the_failure() -> Result<()> {
    let mock = MockInstrument::spawn_flaky(2).await?;
    let cache = ConnectionCache::new(false);

    let err = with_instrument(&cache, mock.host(), mock.port(), TIMEOUT, None, |inst| {
        async move { inst.query("*IDN?").await }
    })
    .await
    .expect_err("both attempts hit a dead connection");

    assert!(is_connection_closed(&err));
    assert_eq!(mock.accepted(), 2);
    Ok(())
}

#[tokio::test]
async fn test_timeout_is_not_retried() -> Result<()> {
    let mock = MockInstrument::spawn().await?;
    let cache = ConnectionCache::new(false);

    let err = with_instrument(
        &cache,
        mock.host(),
        mock.port(),
        Duration::from_millis(200),
        None,
        |inst| async move { inst.query("SLOW?").await },
    )
    .await
    .expect_err("a silent instrument must time out");

    assert!(matches!(
        err.downcast_ref::<InstrumentError>(),
        Some(InstrumentError::Timeout { .. })
    ));
    assert!(!is_connection_closed(&err));
    assert_eq!(mock.accepted(), 1, "a timeout must not trigger a redial");
    Ok(())
}

#[tokio::test]
async fn test_dial_failure_surfaces_dial_failed() {
    // Grab a free port and release it; nobody is listening there.
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("loopback bind works");
        listener.local_addr().expect("bound socket has an addr").port()
    };

    let err = ScpiSession::connect(
        &format!("127.0.0.1:{port}"),
        Duration::from_millis(500),
        false,
        None,
    )
    .await
    .expect_err("nobody listens on the released port");

    assert!(matches!(
        err.downcast_ref::<InstrumentError>(),
        Some(InstrumentError::DialFailed { .. })
    ));
}

#[tokio::test]
async fn test_unresolvable_host_surfaces_address_resolve() {
    let err = ScpiSession::connect(
        "host.invalid:5025",
        Duration::from_millis(500),
        false,
        None,
    )
    .await
    .expect_err(".invalid never resolves");

    assert!(matches!(
        err.downcast_ref::<InstrumentError>(),
        Some(InstrumentError::AddressResolve { .. })
    ));
}
