// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The SCPI wire dialect.
//!
//! Outgoing traffic is `<text>\n`. Incoming traffic has two shapes:
//!
//! * a plain ASCII reply, delivered as whatever the first buffered read
//!   returned (instruments with more than [`READ_BUF_LEN`] bytes to say
//!   are expected to block-frame the response);
//! * an IEEE 488.2 definite-length arbitrary block, `#<D><LEN><data…>\n`,
//!   where `<D>` is one ASCII digit counting the `<LEN>` digits. The
//!   decoder accumulates reads until `<LEN>` payload bytes arrived and
//!   returns exactly that many.

use std::time::Duration;

use anyhow::Result;
use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::client::{
    common::io_with_timeout,
    error::{InstrumentError, closed_eof},
};

/// Size of one buffered read. Plain ASCII replies are capped at this; the
/// block decoder loops past it.
pub const READ_BUF_LEN: usize = 4096;

/// Appends the line terminator the dialect expects.
pub fn encode_command(scpi: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(scpi.len() + 1);
    buf.put_slice(scpi.as_bytes());
    buf.put_u8(b'\n');
    buf.freeze()
}

/// A parsed definite-length block introduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Total payload bytes announced by the instrument.
    pub payload_len: usize,
    /// Bytes consumed by the introduction itself, including the optional
    /// newline some line-oriented firmwares emit after the length digits.
    pub header_len: usize,
}

/// Parses `#<D><LEN>` off the front of a buffered read.
pub fn parse_block_header(buf: &[u8]) -> Result<BlockHeader, InstrumentError> {
    if buf.first() != Some(&b'#') {
        return Err(invalid_framing(buf));
    }

    let digit_count = buf
        .get(1)
        .and_then(|digit| char::from(*digit).to_digit(10))
        .ok_or_else(|| invalid_framing(buf))? as usize;

    let digits = buf
        .get(2..2 + digit_count)
        .ok_or_else(|| invalid_framing(buf))?;
    let payload_len = std::str::from_utf8(digits)
        .ok()
        .and_then(|digits| digits.parse::<usize>().ok())
        .ok_or_else(|| invalid_framing(buf))?;

    let mut header_len = 2 + digit_count;
    if buf.get(header_len) == Some(&b'\n') {
        header_len += 1;
    }

    Ok(BlockHeader {
        payload_len,
        header_len,
    })
}

fn invalid_framing(buf: &[u8]) -> InstrumentError {
    let shown = buf.len().min(16);
    InstrumentError::InvalidFraming(String::from_utf8_lossy(&buf[..shown]).into_owned())
}

/// Frames a payload as a definite-length block. The inverse of the read
/// path; used by the simulated side of the house and by tests.
pub fn encode_block(payload: &[u8]) -> Bytes {
    let len = payload.len().to_string();
    let mut buf = BytesMut::with_capacity(2 + len.len() + payload.len() + 1);
    buf.put_u8(b'#');
    buf.put_slice(len.len().to_string().as_bytes());
    buf.put_slice(len.as_bytes());
    buf.put_slice(payload);
    buf.put_u8(b'\n');
    buf.freeze()
}

/// Reads one response off the stream: the first buffered read for plain
/// ASCII, or the fully accumulated payload for a block-framed reply. Every
/// read carries its own deadline.
pub async fn read_response<S>(stream: &mut S, io_timeout: Duration) -> Result<Bytes>
where S: AsyncRead + Unpin {
    let mut buf = [0u8; READ_BUF_LEN];
    let n = io_with_timeout("read response", stream.read(&mut buf), io_timeout).await?;
    if n == 0 {
        return Err(InstrumentError::ConnectionClosed(closed_eof()).into());
    }
    if buf[0] != b'#' {
        return Ok(Bytes::copy_from_slice(&buf[..n]));
    }

    let header = parse_block_header(&buf[..n])?;
    let mut payload = BytesMut::with_capacity(header.payload_len);
    payload.put_slice(&buf[header.header_len.min(n)..n]);

    while payload.len() < header.payload_len {
        let n =
            io_with_timeout("read block payload", stream.read(&mut buf), io_timeout).await?;
        if n == 0 {
            return Err(InstrumentError::ConnectionClosed(closed_eof()).into());
        }
        payload.put_slice(&buf[..n]);
    }

    payload.truncate(header.payload_len);
    Ok(payload.freeze())
}
