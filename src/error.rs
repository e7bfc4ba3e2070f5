/********************************************************************************
 * Copyright (c) 2026 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Crate-level error type shared by the bus, both transports and the store.

use thiserror::Error;

/// Errors surfaced by the transport SDK.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Broker connection could not be opened or was lost.
    #[error("connection error: {0}")]
    Connection(String),

    /// Sender or receiver link could not be attached or was detached.
    #[error("link error: {0}")]
    Link(String),

    /// Outbound delivery failed before a terminal disposition was reached.
    #[error("send error: {0}")]
    Send(String),

    /// Inbound delivery could not be received or decoded.
    #[error("receive error: {0}")]
    Receive(String),

    /// The internal bus channel is closed; no further envelopes can be queued.
    #[error("bus channel is closed")]
    BusClosed,

    /// Subscription registration handshake with a remote peer failed.
    #[error("registration error: {0}")]
    Registration(String),

    /// Lookup against the resource store found no matching record.
    #[error("not found: {0}")]
    NotFound(String),

    /// A URI supplied at construction or registration time was unusable.
    #[error("invalid uri: {0}")]
    InvalidUri(String),

    /// TLS material could not be loaded or the configuration was rejected.
    #[error("tls error: {0}")]
    Tls(String),

    /// Store persistence I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload or record (de)serialization failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Outbound HTTP request failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TransportError>;
