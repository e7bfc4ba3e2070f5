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

//! Convenience constructors for the common bus commands. Each helper queues
//! one envelope on a router's data-in bus and surfaces a closed bus as an
//! error.

use std::sync::Arc;

use crate::envelope::{
    send_on_bus, BusSender, Envelope, EnvelopeKind, EnvelopeStatus, EventProcessor, ReceiveHandler,
};
use crate::error::Result;
use crate::event::CloudEvent;

/// Requests an outbound link (AMQP) or delivery client (HTTP) for `address`.
pub async fn create_sender(bus: &BusSender, address: &str) -> Result<()> {
    send_on_bus(
        bus,
        Envelope::new(address, EnvelopeKind::Sender, EnvelopeStatus::New),
    )
    .await
}

pub async fn delete_sender(bus: &BusSender, address: &str) -> Result<()> {
    send_on_bus(
        bus,
        Envelope::new(address, EnvelopeKind::Sender, EnvelopeStatus::Delete),
    )
    .await
}

/// Requests an inbound link for `address`; received events run through the
/// optional hooks before they reach the data-out channel.
pub async fn create_listener(
    bus: &BusSender,
    address: &str,
    on_receive: Option<Arc<dyn ReceiveHandler>>,
    processor: Option<Arc<dyn EventProcessor>>,
) -> Result<()> {
    let mut envelope = Envelope::new(address, EnvelopeKind::Listener, EnvelopeStatus::New);
    envelope.on_receive = on_receive;
    envelope.process_event = processor;
    send_on_bus(bus, envelope).await
}

pub async fn delete_listener(bus: &BusSender, address: &str) -> Result<()> {
    send_on_bus(
        bus,
        Envelope::new(address, EnvelopeKind::Listener, EnvelopeStatus::Delete),
    )
    .await
}

/// Queues one event for delivery to `address`.
pub async fn send_event(bus: &BusSender, address: &str, event: CloudEvent) -> Result<()> {
    send_on_bus(
        bus,
        Envelope::new(address, EnvelopeKind::Event, EnvelopeStatus::New).with_payload(event),
    )
    .await
}

/// Queues a status probe for `address`; on AMQP this also guarantees a
/// listener on the address so the reply has somewhere to land.
pub async fn status_probe(bus: &BusSender, address: &str, seq: Option<u64>) -> Result<()> {
    let mut envelope = Envelope::new(address, EnvelopeKind::Status, EnvelopeStatus::New);
    envelope.seq = seq;
    send_on_bus(bus, envelope).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::bus_channel;

    #[tokio::test]
    async fn helpers_queue_the_expected_envelopes() {
        let (tx, mut rx) = bus_channel(8);

        create_sender(&tx, "/q").await.expect("create sender");
        delete_listener(&tx, "/q").await.expect("delete listener");
        send_event(&tx, "/q", CloudEvent::new("e-1", "event.sync"))
            .await
            .expect("send event");
        status_probe(&tx, "/q", Some(3))
            .await
            .expect("status probe");

        let sender = rx.recv().await.expect("sender envelope");
        assert_eq!(
            (sender.kind, sender.status),
            (EnvelopeKind::Sender, EnvelopeStatus::New)
        );
        let listener = rx.recv().await.expect("listener envelope");
        assert_eq!(
            (listener.kind, listener.status),
            (EnvelopeKind::Listener, EnvelopeStatus::Delete)
        );
        let event = rx.recv().await.expect("event envelope");
        assert_eq!(event.kind, EnvelopeKind::Event);
        assert_eq!(event.payload.expect("payload").id(), "e-1");
        let status = rx.recv().await.expect("status envelope");
        assert_eq!(status.kind, EnvelopeKind::Status);
        assert_eq!(status.seq, Some(3));
    }
}
