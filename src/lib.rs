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

//! Event-transport SDK for cloud native events.
//!
//! Two interchangeable wire protocols sit behind one protocol-agnostic bus:
//! AMQP 1.0 relayed through a QDR-style interconnect ([`amqp::AmqpRouter`])
//! and point-to-point HTTP(S) webhook delivery ([`http::HttpServer`]).
//! Callers queue [`envelope::Envelope`]s on a router's data-in channel and
//! observe results and received events on its data-out channel; the
//! [`commands`] module provides the common envelope constructors.

pub mod amqp;
pub mod commands;
pub mod config;
pub mod envelope;
pub mod error;
pub mod event;
pub mod http;
pub mod observability;
pub mod pubsub;
pub mod status;
pub mod store;

pub use config::{AmqpConfig, HttpConfig, TlsConfig};
pub use envelope::{
    Envelope, EnvelopeKind, EnvelopeStatus, EventProcessor, ReceiveHandler, StatusHandler,
};
pub use error::{Result, TransportError};
pub use event::{CloudEvent, DataType, DataValue, EventData, ValueType};
pub use pubsub::{client_id_for_uri, PubSub};
