// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The session layer's error taxonomy, distinguished by variant so policy
//! can match on kind instead of message text. A SCPI-level error reported
//! by the instrument through `:SYST:ERR?` is data, not an error here.

use std::{io, time::Duration};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InstrumentError {
    /// The TCP peer went away mid-operation. This is the only kind the
    /// retry wrapper reconnects on, exactly once.
    #[error("connection closed: {0}")]
    ConnectionClosed(#[source] io::Error),

    /// A read or write deadline elapsed. Deliberately distinct from
    /// `ConnectionClosed`: a slow instrument does not warrant a reconnect.
    #[error("{op} timed out after {timeout:?}")]
    Timeout {
        op: &'static str,
        timeout: Duration,
    },

    /// A response starting with `#` did not carry a well-formed IEEE 488.2
    /// definite-length block introduction.
    #[error("unrecognized response block header: {0}")]
    InvalidFraming(String),

    #[error("failed to resolve instrument address {address}")]
    AddressResolve {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to dial {address}")]
    DialFailed {
        address: String,
        #[source]
        source: io::Error,
    },
}

/// io::Error kinds that mean the peer is gone, as opposed to transient or
/// application-level failures.
pub(crate) fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::NotConnected
    )
}

/// True when a `ConnectionClosed` sits anywhere in the error chain,
/// however much context was layered on top of it.
pub fn is_connection_closed(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<InstrumentError>(),
            Some(InstrumentError::ConnectionClosed(_))
        )
    })
}

/// The closed-connection error used when a read hits end-of-stream.
pub(crate) fn closed_eof() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "EOF")
}

/// The closed-connection error used when a session is driven after
/// `close`.
pub(crate) fn already_closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "session already closed")
}
