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

//! The protocol-agnostic bus message and its dispatch vocabulary.
//!
//! Every interaction with a transport router travels as an [`Envelope`] over a
//! bounded mpsc channel. The router consumes envelopes one at a time, so
//! envelopes for the same address are handled in FIFO order.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{Result, TransportError};
use crate::event::CloudEvent;

/// What the envelope is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EnvelopeKind {
    /// An outbound link (or, on HTTP, an outbound delivery client).
    Sender,
    /// An inbound link (or, on HTTP, a subscription registration).
    Listener,
    /// An event payload to deliver or that was received.
    Event,
    /// A status probe or its reply.
    Status,
}

impl EnvelopeKind {
    /// Publish-side alias for [`EnvelopeKind::Sender`].
    pub const PUBLISHER: EnvelopeKind = EnvelopeKind::Sender;
    /// Subscribe-side alias for [`EnvelopeKind::Listener`].
    pub const SUBSCRIBER: EnvelopeKind = EnvelopeKind::Listener;
}

impl fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EnvelopeKind::Sender => "sender",
            EnvelopeKind::Listener => "listener",
            EnvelopeKind::Event => "event",
            EnvelopeKind::Status => "status",
        };
        f.write_str(name)
    }
}

/// Lifecycle stage of the envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EnvelopeStatus {
    /// A request the router has not acted on yet.
    New,
    /// The requested operation completed.
    Success,
    /// The requested operation failed terminally.
    Failed,
    /// Tear down the addressed resource.
    Delete,
}

impl fmt::Display for EnvelopeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EnvelopeStatus::New => "new",
            EnvelopeStatus::Success => "success",
            EnvelopeStatus::Failed => "failed",
            EnvelopeStatus::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Caller hook invoked for every envelope a receiver task emits.
#[async_trait]
pub trait ReceiveHandler: Send + Sync {
    async fn on_receive(&self, envelope: &Envelope);
}

/// Caller hook that consumes a received event payload.
#[async_trait]
pub trait EventProcessor: Send + Sync {
    async fn process(&self, event: &CloudEvent) -> Result<()>;
}

/// Caller hook that answers status probes for a resource.
#[async_trait]
pub trait StatusHandler: Send + Sync {
    async fn current_state(&self, resource: &str) -> Result<CloudEvent>;
}

/// The bus message.
#[derive(Clone)]
pub struct Envelope {
    /// Queue address (AMQP) or resource path (HTTP).
    pub address: String,
    pub kind: EnvelopeKind,
    pub status: EnvelopeStatus,
    pub payload: Option<CloudEvent>,
    /// Remote client identity, where the transport tracks one.
    pub client_id: Option<Uuid>,
    /// Correlation id for status probes.
    pub seq: Option<u64>,
    pub on_receive: Option<Arc<dyn ReceiveHandler>>,
    pub process_event: Option<Arc<dyn EventProcessor>>,
}

impl Envelope {
    pub fn new(address: impl Into<String>, kind: EnvelopeKind, status: EnvelopeStatus) -> Self {
        Self {
            address: address.into(),
            kind,
            status,
            payload: None,
            client_id: None,
            seq: None,
            on_receive: None,
            process_event: None,
        }
    }

    pub fn with_payload(mut self, payload: CloudEvent) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_client_id(mut self, client_id: Uuid) -> Self {
        self.client_id = Some(client_id);
        self
    }

    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = Some(seq);
        self
    }

    pub fn with_receive_handler(mut self, handler: Arc<dyn ReceiveHandler>) -> Self {
        self.on_receive = Some(handler);
        self
    }

    pub fn with_event_processor(mut self, processor: Arc<dyn EventProcessor>) -> Self {
        self.process_event = Some(processor);
        self
    }

    /// Derived result envelope for the same address and kind.
    pub fn resolved(&self, status: EnvelopeStatus) -> Envelope {
        let mut resolved = Envelope::new(self.address.clone(), self.kind, status);
        resolved.payload = self.payload.clone();
        resolved.client_id = self.client_id;
        resolved.seq = self.seq;
        resolved
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("address", &self.address)
            .field("kind", &self.kind)
            .field("status", &self.status)
            .field("payload", &self.payload.as_ref().map(|p| p.id()))
            .field("client_id", &self.client_id)
            .field("seq", &self.seq)
            .field("on_receive", &self.on_receive.is_some())
            .field("process_event", &self.process_event.is_some())
            .finish()
    }
}

pub type BusSender = mpsc::Sender<Envelope>;
pub type BusReceiver = mpsc::Receiver<Envelope>;

/// Default depth of the bus channels.
pub const DEFAULT_BUS_CAPACITY: usize = 100;

pub fn bus_channel(capacity: usize) -> (BusSender, BusReceiver) {
    mpsc::channel(capacity)
}

/// Queues an envelope, surfacing a closed bus as an explicit error.
pub async fn send_on_bus(bus: &BusSender, envelope: Envelope) -> Result<()> {
    bus.send(envelope)
        .await
        .map_err(|_| TransportError::BusClosed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publisher_and_subscriber_alias_the_link_kinds() {
        assert_eq!(EnvelopeKind::PUBLISHER, EnvelopeKind::Sender);
        assert_eq!(EnvelopeKind::SUBSCRIBER, EnvelopeKind::Listener);
    }

    #[test]
    fn kind_and_status_display_lowercase_names() {
        assert_eq!(EnvelopeKind::Listener.to_string(), "listener");
        assert_eq!(EnvelopeStatus::Delete.to_string(), "delete");
    }

    #[test]
    fn resolved_keeps_identity_and_drops_handlers() {
        struct Noop;
        #[async_trait]
        impl ReceiveHandler for Noop {
            async fn on_receive(&self, _envelope: &Envelope) {}
        }

        let envelope = Envelope::new("/test/queue", EnvelopeKind::Sender, EnvelopeStatus::New)
            .with_seq(7)
            .with_receive_handler(Arc::new(Noop));
        let resolved = envelope.resolved(EnvelopeStatus::Success);

        assert_eq!(resolved.address, "/test/queue");
        assert_eq!(resolved.kind, EnvelopeKind::Sender);
        assert_eq!(resolved.status, EnvelopeStatus::Success);
        assert_eq!(resolved.seq, Some(7));
        assert!(resolved.on_receive.is_none());
    }

    #[tokio::test]
    async fn send_on_closed_bus_is_an_explicit_error() {
        let (tx, rx) = bus_channel(1);
        drop(rx);

        let err = send_on_bus(
            &tx,
            Envelope::new("/test/queue", EnvelopeKind::Event, EnvelopeStatus::New),
        )
        .await
        .expect_err("send on closed bus should fail");
        assert!(matches!(err, TransportError::BusClosed));
    }

    #[tokio::test]
    async fn envelopes_keep_fifo_order_per_channel() {
        let (tx, mut rx) = bus_channel(8);
        for i in 0..4 {
            send_on_bus(
                &tx,
                Envelope::new(format!("/q/{i}"), EnvelopeKind::Event, EnvelopeStatus::New),
            )
            .await
            .expect("bus should accept envelope");
        }
        for i in 0..4 {
            let envelope = rx.recv().await.expect("envelope should arrive");
            assert_eq!(envelope.address, format!("/q/{i}"));
        }
    }
}
