// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::Result;
use scpi_client_rs::client::{
    codec::{BlockHeader, encode_block, encode_command, parse_block_header, read_response},
    error::{InstrumentError, is_connection_closed},
};
use tokio::io::{AsyncWriteExt, duplex};

#[test]
fn test_encode_command_appends_newline() {
    assert_eq!(&encode_command(":ABORt")[..], b":ABORt\n");
    assert_eq!(&encode_command("*IDN?")[..], b"*IDN?\n");
}

#[test]
fn test_parse_block_header_positional_form() -> Result<()> {
    let header = parse_block_header(b"#18Abcdefgh\n")?;
    assert_eq!(header, BlockHeader { payload_len: 8, header_len: 3 });
    Ok(())
}

#[test]
fn test_parse_block_header_line_oriented_form() -> Result<()> {
    // Some firmwares terminate the introduction with its own newline.
    let header = parse_block_header(b"#18\nAbcdefgh\n")?;
    assert_eq!(header, BlockHeader { payload_len: 8, header_len: 4 });
    Ok(())
}

#[test]
fn test_parse_block_header_rejects_bad_digit_count() {
    let err = parse_block_header(b"#x8abc").expect_err("digit count is not a digit");
    assert!(matches!(err, InstrumentError::InvalidFraming(_)));
}

#[test]
fn test_parse_block_header_rejects_non_numeric_length() {
    let err = parse_block_header(b"#2a5xyz").expect_err("length is not numeric");
    assert!(matches!(err, InstrumentError::InvalidFraming(_)));
}

#[test]
fn test_parse_block_header_rejects_truncated_length() {
    let err = parse_block_header(b"#42").expect_err("length digits missing");
    assert!(matches!(err, InstrumentError::InvalidFraming(_)));
}

#[tokio::test]
async fn test_plain_response_is_returned_as_received() -> Result<()> {
    let (mut client, mut server) = duplex(1024);
    server.write_all(b"+0,\"No error\"\n").await?;

    let response = read_response(&mut client, Duration::from_secs(1)).await?;
    assert_eq!(&response[..], b"+0,\"No error\"\n");
    Ok(())
}

#[tokio::test]
async fn test_block_response_returns_exact_payload() -> Result<()> {
    let (mut client, mut server) = duplex(1024);
    server.write_all(b"#18Abcdefgh\n").await?;

    let response = read_response(&mut client, Duration::from_secs(1)).await?;
    assert_eq!(&response[..], b"Abcdefgh");
    Ok(())
}

#[tokio::test]
async fn test_block_round_trip_preserves_every_byte() -> Result<()> {
    let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    let framed = encode_block(&payload);

    let (mut client, mut server) = duplex(64 * 1024);
    server.write_all(&framed).await?;

    let response = read_response(&mut client, Duration::from_secs(1)).await?;
    assert_eq!(response.len(), payload.len());
    assert_eq!(&response[..], &payload[..]);
    Ok(())
}

#[tokio::test]
async fn test_block_payload_accumulates_across_writes() -> Result<()> {
    let (mut client, mut server) = duplex(1024);
    server.write_all(b"#18Abcd").await?;

    let reader = tokio::spawn(async move {
        read_response(&mut client, Duration::from_secs(1)).await
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    server.write_all(b"efgh\n").await?;

    let response = reader.await??;
    assert_eq!(&response[..], b"Abcdefgh");
    Ok(())
}

#[tokio::test]
async fn test_read_timeout_is_not_connection_closed() -> Result<()> {
    let (mut client, _server) = duplex(64);

    let err = read_response(&mut client, Duration::from_millis(50))
        .await
        .expect_err("nothing was written, the read must time out");
    assert!(matches!(
        err.downcast_ref::<InstrumentError>(),
        Some(InstrumentError::Timeout { .. })
    ));
    assert!(!is_connection_closed(&err));
    Ok(())
}

#[tokio::test]
async fn test_eof_maps_to_connection_closed() -> Result<()> {
    let (mut client, server) = duplex(64);
    drop(server);

    let err = read_response(&mut client, Duration::from_millis(100))
        .await
        .expect_err("a dropped peer must surface as closed");
    assert!(is_connection_closed(&err));
    Ok(())
}
