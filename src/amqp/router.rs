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

//! The AMQP dispatch router.
//!
//! One task owns the inbound bus and mutates the link registries; each
//! listener address gets its own receiver task with a watch-based cancel.
//! Registry invariants:
//!   - at most one sender and one listener per address
//!   - a listener entry leaves the registry only after its link close returns
//!   - outbound deliveries are bounded by the configured send timeout

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::amqp::connection::{BrokerConnection, BrokerReceiver, BrokerSender, DeliveryOutcome};
use crate::config::AmqpConfig;
use crate::envelope::{
    bus_channel, BusReceiver, BusSender, Envelope, EnvelopeKind, EnvelopeStatus,
    DEFAULT_BUS_CAPACITY,
};
use crate::event::CloudEvent;
use crate::observability::{events, fields};

const COMPONENT: &str = fields::COMPONENT_AMQP_ROUTER;

struct SenderEntry {
    link: Arc<Mutex<Box<dyn BrokerSender>>>,
}

struct ListenerEntry {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

type SenderRegistry = Arc<Mutex<HashMap<String, SenderEntry>>>;
type ListenerRegistry = Arc<Mutex<HashMap<String, ListenerEntry>>>;

/// Router over one broker connection.
///
/// Envelopes queued on the bus are dispatched strictly in order by a single
/// task, so operations on the same address never interleave.
pub struct AmqpRouter {
    connection: Arc<dyn BrokerConnection>,
    data_in: BusReceiver,
    data_out: BusSender,
    send_timeout: Duration,
    senders: SenderRegistry,
    listeners: ListenerRegistry,
}

impl AmqpRouter {
    /// Builds a router and its introspection handle. The returned receiver is
    /// the data-out side: delivery failures and received events arrive there.
    pub fn new(
        connection: Arc<dyn BrokerConnection>,
        config: &AmqpConfig,
    ) -> (Self, AmqpRouterHandle, BusReceiver) {
        let (bus, data_in) = bus_channel(DEFAULT_BUS_CAPACITY);
        let (data_out, out_rx) = bus_channel(DEFAULT_BUS_CAPACITY);
        let senders: SenderRegistry = Arc::new(Mutex::new(HashMap::new()));
        let listeners: ListenerRegistry = Arc::new(Mutex::new(HashMap::new()));
        let handle = AmqpRouterHandle {
            bus,
            senders: senders.clone(),
            listeners: listeners.clone(),
        };
        let router = Self {
            connection,
            data_in,
            data_out,
            send_timeout: config.send_timeout,
            senders,
            listeners,
        };
        (router, handle, out_rx)
    }

    /// Consumes the router into its dispatch task. The task ends when every
    /// bus sender (the handle included) has been dropped.
    pub fn run(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(envelope) = self.data_in.recv().await {
                self.dispatch(envelope).await;
            }
            info!(
                event = events::BUS_CLOSED,
                component = COMPONENT,
                "bus closed; dispatch loop stopping"
            );
            self.shutdown().await;
        })
    }

    async fn dispatch(&self, envelope: Envelope) {
        match (envelope.kind, envelope.status) {
            (EnvelopeKind::Sender, EnvelopeStatus::New) => {
                if let Err(err) = self.ensure_sender(&envelope.address).await {
                    warn!(
                        event = events::SENDER_CREATE_FAILED,
                        component = COMPONENT,
                        address = envelope.address.as_str(),
                        err = %err,
                    );
                    self.push_out(envelope.resolved(EnvelopeStatus::Failed)).await;
                }
            }
            (EnvelopeKind::Sender, EnvelopeStatus::Delete) => {
                self.delete_sender(&envelope.address).await;
            }
            (EnvelopeKind::Listener, EnvelopeStatus::New) => {
                if let Err(err) = self.ensure_listener(&envelope).await {
                    warn!(
                        event = events::LISTENER_CREATE_FAILED,
                        component = COMPONENT,
                        address = envelope.address.as_str(),
                        err = %err,
                    );
                    self.push_out(envelope.resolved(EnvelopeStatus::Failed)).await;
                }
            }
            (EnvelopeKind::Listener, EnvelopeStatus::Delete) => {
                self.delete_listener(&envelope.address).await;
            }
            (EnvelopeKind::Event, EnvelopeStatus::New) => {
                self.deliver(&envelope).await;
            }
            (EnvelopeKind::Status, EnvelopeStatus::New) => {
                self.status_probe(&envelope).await;
            }
            (kind, status) => {
                debug!(
                    component = COMPONENT,
                    address = envelope.address.as_str(),
                    kind = %kind,
                    status = %status,
                    "ignoring envelope"
                );
            }
        }
    }

    /// Idempotent sender creation: an existing link is reused as-is.
    async fn ensure_sender(&self, address: &str) -> crate::error::Result<()> {
        let mut senders = self.senders.lock().await;
        if senders.contains_key(address) {
            debug!(
                event = events::SENDER_REUSE,
                component = COMPONENT,
                address,
            );
            return Ok(());
        }
        let link = self.connection.new_sender(address).await?;
        senders.insert(
            address.to_string(),
            SenderEntry {
                link: Arc::new(Mutex::new(link)),
            },
        );
        info!(event = events::SENDER_CREATE, component = COMPONENT, address);
        Ok(())
    }

    async fn delete_sender(&self, address: &str) {
        let mut senders = self.senders.lock().await;
        match senders.remove(address) {
            Some(entry) => {
                let mut link = entry.link.lock().await;
                if let Err(err) = link.close().await {
                    warn!(
                        event = events::SENDER_DELETE,
                        component = COMPONENT,
                        address,
                        err = %err,
                        "sender link close failed"
                    );
                } else {
                    info!(event = events::SENDER_DELETE, component = COMPONENT, address);
                }
            }
            None => {
                debug!(
                    event = events::SENDER_DELETE,
                    component = COMPONENT,
                    address,
                    reason = "no such sender",
                );
            }
        }
    }

    /// Idempotent listener creation: spawns one receiver task per address.
    async fn ensure_listener(&self, envelope: &Envelope) -> crate::error::Result<()> {
        let address = envelope.address.clone();
        let mut listeners = self.listeners.lock().await;
        if listeners.contains_key(&address) {
            debug!(
                event = events::LISTENER_REUSE,
                component = COMPONENT,
                address = address.as_str(),
            );
            return Ok(());
        }
        let receiver = self.connection.new_receiver(&address).await?;
        let (cancel, cancel_rx) = watch::channel(false);
        let task = spawn_receiver_task(
            receiver,
            cancel_rx,
            address.clone(),
            self.data_out.clone(),
            envelope.clone(),
        );
        listeners.insert(address.clone(), ListenerEntry { cancel, task });
        info!(
            event = events::LISTENER_CREATE,
            component = COMPONENT,
            address = address.as_str(),
        );
        Ok(())
    }

    /// Cancels the receiver task and waits for it to close its link; the
    /// registry lock is held throughout, so no observer sees a half-closed
    /// listener.
    async fn delete_listener(&self, address: &str) {
        let mut listeners = self.listeners.lock().await;
        match listeners.remove(address) {
            Some(entry) => {
                let _ = entry.cancel.send(true);
                if let Err(err) = entry.task.await {
                    warn!(
                        event = events::LISTENER_DELETE,
                        component = COMPONENT,
                        address,
                        err = %err,
                        "receiver task join failed"
                    );
                } else {
                    info!(
                        event = events::LISTENER_DELETE,
                        component = COMPONENT,
                        address,
                    );
                }
            }
            None => {
                debug!(
                    event = events::LISTENER_DELETE,
                    component = COMPONENT,
                    address,
                    reason = "no such listener",
                );
            }
        }
    }

    /// Delivers one event over the sender for its address. The send runs in
    /// its own task bounded by the configured timeout, so a slow broker never
    /// stalls the dispatch loop. Delivered events produce no envelope; every
    /// failure path pushes `{Sender, Failed}`.
    async fn deliver(&self, envelope: &Envelope) {
        let Some(event) = envelope.payload.as_ref() else {
            warn!(
                event = events::EVENT_POST_FAILED,
                component = COMPONENT,
                address = envelope.address.as_str(),
                reason = "event envelope without payload",
            );
            push_failed(&self.data_out, envelope).await;
            return;
        };
        let link = {
            let senders = self.senders.lock().await;
            match senders.get(&envelope.address) {
                Some(entry) => entry.link.clone(),
                None => {
                    warn!(
                        event = events::DELIVERY_NO_SENDER,
                        component = COMPONENT,
                        address = envelope.address.as_str(),
                        event_id = event.id(),
                    );
                    push_failed(&self.data_out, envelope).await;
                    return;
                }
            }
        };
        let json = match event.to_json_string() {
            Ok(json) => json,
            Err(err) => {
                warn!(
                    event = events::EVENT_POST_FAILED,
                    component = COMPONENT,
                    address = envelope.address.as_str(),
                    err = %err,
                );
                push_failed(&self.data_out, envelope).await;
                return;
            }
        };
        debug!(
            event = events::DELIVERY_ATTEMPT,
            component = COMPONENT,
            address = envelope.address.as_str(),
            event_id = event.id(),
        );
        let data_out = self.data_out.clone();
        let send_timeout = self.send_timeout;
        let request = envelope.clone();
        let event_id = event.id().to_string();
        tokio::spawn(async move {
            let mut link = link.lock().await;
            match timeout(send_timeout, link.send_json(json)).await {
                Ok(Ok(DeliveryOutcome::Accepted)) => {
                    debug!(
                        event = events::DELIVERY_ACCEPTED,
                        component = COMPONENT,
                        address = request.address.as_str(),
                        event_id = event_id.as_str(),
                    );
                }
                Ok(Ok(DeliveryOutcome::Rejected(reason))) => {
                    warn!(
                        event = events::DELIVERY_REJECTED,
                        component = COMPONENT,
                        address = request.address.as_str(),
                        event_id = event_id.as_str(),
                        reason = reason.as_deref().unwrap_or(fields::NONE),
                    );
                    push_failed(&data_out, &request).await;
                }
                Ok(Ok(DeliveryOutcome::Released)) => {
                    warn!(
                        event = events::DELIVERY_RELEASED,
                        component = COMPONENT,
                        address = request.address.as_str(),
                        event_id = event_id.as_str(),
                    );
                    push_failed(&data_out, &request).await;
                }
                Ok(Err(err)) => {
                    warn!(
                        event = events::EVENT_POST_FAILED,
                        component = COMPONENT,
                        address = request.address.as_str(),
                        event_id = event_id.as_str(),
                        err = %err,
                    );
                    push_failed(&data_out, &request).await;
                }
                Err(_) => {
                    warn!(
                        event = events::DELIVERY_TIMEOUT,
                        component = COMPONENT,
                        address = request.address.as_str(),
                        event_id = event_id.as_str(),
                    );
                    push_failed(&data_out, &request).await;
                }
            }
        });
    }

    /// A probe guarantees a listener on the address so the reply has
    /// somewhere to land. A probe that already carries a payload is
    /// malformed and is logged without acting.
    async fn status_probe(&self, envelope: &Envelope) {
        if envelope.payload.is_some() {
            warn!(
                event = events::STATUS_PROBE_SENT,
                component = COMPONENT,
                address = envelope.address.as_str(),
                reason = "status probe with payload ignored",
            );
            return;
        }
        if let Err(err) = self.ensure_listener(envelope).await {
            warn!(
                event = events::LISTENER_CREATE_FAILED,
                component = COMPONENT,
                address = envelope.address.as_str(),
                err = %err,
            );
            self.push_out(envelope.resolved(EnvelopeStatus::Failed)).await;
            return;
        }
        debug!(
            event = events::STATUS_PROBE_SENT,
            component = COMPONENT,
            address = envelope.address.as_str(),
            seq = envelope.seq.unwrap_or_default(),
        );
    }

    async fn push_out(&self, envelope: Envelope) {
        if self.data_out.send(envelope).await.is_err() {
            warn!(
                event = events::BUS_SEND_FAILED,
                component = COMPONENT,
                reason = "data-out channel closed",
            );
        }
    }

    async fn shutdown(&self) {
        let mut listeners = self.listeners.lock().await;
        for (address, entry) in listeners.drain() {
            let _ = entry.cancel.send(true);
            if let Err(err) = entry.task.await {
                warn!(
                    event = events::LISTENER_DELETE,
                    component = COMPONENT,
                    address = address.as_str(),
                    err = %err,
                    "receiver task join failed during shutdown"
                );
            }
        }
        drop(listeners);
        let mut senders = self.senders.lock().await;
        for (_, entry) in senders.drain() {
            let mut link = entry.link.lock().await;
            let _ = link.close().await;
        }
    }
}

/// Cloneable view onto a running router.
#[derive(Clone)]
pub struct AmqpRouterHandle {
    bus: BusSender,
    senders: SenderRegistry,
    listeners: ListenerRegistry,
}

impl AmqpRouterHandle {
    /// The data-in side of the bus: queue envelopes here.
    pub fn bus(&self) -> BusSender {
        self.bus.clone()
    }

    pub async fn sender_addresses(&self) -> Vec<String> {
        self.senders.lock().await.keys().cloned().collect()
    }

    pub async fn listener_addresses(&self) -> Vec<String> {
        self.listeners.lock().await.keys().cloned().collect()
    }

    /// Fans one event out to every currently registered sender address.
    pub async fn send_to_all(&self, event: CloudEvent) -> crate::error::Result<()> {
        let addresses = self.sender_addresses().await;
        for address in addresses {
            let envelope = Envelope::new(address, EnvelopeKind::Event, EnvelopeStatus::New)
                .with_payload(event.clone());
            crate::envelope::send_on_bus(&self.bus, envelope).await?;
        }
        Ok(())
    }
}

/// Failed deliveries surface as `{Sender, Failed}` on the data-out side.
async fn push_failed(data_out: &BusSender, request: &Envelope) {
    let mut failed = request.resolved(EnvelopeStatus::Failed);
    failed.kind = EnvelopeKind::Sender;
    if data_out.send(failed).await.is_err() {
        warn!(
            event = events::BUS_SEND_FAILED,
            component = COMPONENT,
            address = request.address.as_str(),
            reason = "data-out channel closed",
        );
    }
}

fn spawn_receiver_task(
    mut receiver: Box<dyn BrokerReceiver>,
    mut cancel: watch::Receiver<bool>,
    address: String,
    data_out: BusSender,
    request: Envelope,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        break;
                    }
                }
                received = receiver.recv_json() => {
                    match received {
                        Ok(json) => {
                            handle_received(&address, &json, &data_out, &request).await;
                        }
                        Err(err) => {
                            info!(
                                event = events::RECEIVE_LINK_CLOSED,
                                component = COMPONENT,
                                address = address.as_str(),
                                err = %err,
                            );
                            break;
                        }
                    }
                }
            }
        }
        // Close the link before the registry entry disappears.
        if let Err(err) = receiver.close().await {
            warn!(
                event = events::RECEIVE_LINK_CLOSED,
                component = COMPONENT,
                address = address.as_str(),
                err = %err,
                "receiver link close failed"
            );
        }
    })
}

async fn handle_received(address: &str, json: &str, data_out: &BusSender, request: &Envelope) {
    let event = match CloudEvent::from_json_str(json) {
        Ok(event) => event,
        Err(err) => {
            warn!(
                event = events::RECEIVE_DECODE_FAILED,
                component = COMPONENT,
                address,
                err = %err,
            );
            return;
        }
    };
    debug!(
        event = events::RECEIVE_OK,
        component = COMPONENT,
        address,
        event_id = event.id(),
    );
    if let Some(processor) = request.process_event.as_ref() {
        if let Err(err) = processor.process(&event).await {
            warn!(
                event = events::RECEIVE_DECODE_FAILED,
                component = COMPONENT,
                address,
                err = %err,
                "event processor failed"
            );
        }
    }
    let out = Envelope::new(address, EnvelopeKind::Event, EnvelopeStatus::New)
        .with_payload(event);
    if let Some(handler) = request.on_receive.as_ref() {
        handler.on_receive(&out).await;
    }
    if data_out.send(out).await.is_err() {
        warn!(
            event = events::BUS_SEND_FAILED,
            component = COMPONENT,
            address,
            reason = "data-out channel closed",
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio::time::{sleep, Duration};

    use crate::error::{Result, TransportError};
    use crate::event::{DataType, DataValue, EventData, ValueType};

    fn test_event(id: &str) -> CloudEvent {
        let mut data = EventData::new("1.0");
        data.append_value(DataValue {
            resource: "/cluster/node/ptp".to_string(),
            data_type: DataType::Notification,
            value_type: ValueType::Enumeration,
            value: json!("LOCKED"),
        });
        let mut event = CloudEvent::new(id, "event.synchronization-state-change");
        event.set_data(data);
        event
    }

    struct RecordingSender {
        outcome: DeliveryOutcome,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl BrokerSender for RecordingSender {
        async fn send_json(&mut self, body: String) -> Result<DeliveryOutcome> {
            if self.closed.load(Ordering::SeqCst) {
                return Err(TransportError::Link("sender link is closed".to_string()));
            }
            self.sent.lock().expect("sent lock").push(body);
            Ok(self.outcome.clone())
        }

        async fn close(&mut self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FeedReceiver {
        feed: mpsc::Receiver<String>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl BrokerReceiver for FeedReceiver {
        async fn recv_json(&mut self) -> Result<String> {
            self.feed
                .recv()
                .await
                .ok_or_else(|| TransportError::Receive("feed closed".to_string()))
        }

        async fn close(&mut self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct MockConnection {
        outcome: DeliveryOutcome,
        sent: Arc<StdMutex<Vec<String>>>,
        sender_attaches: AtomicUsize,
        receiver_attaches: AtomicUsize,
        sender_closed: Arc<AtomicBool>,
        receiver_closed: Arc<AtomicBool>,
        feeds: StdMutex<Vec<mpsc::Receiver<String>>>,
    }

    impl MockConnection {
        fn new(outcome: DeliveryOutcome) -> Self {
            Self {
                outcome,
                sent: Arc::new(StdMutex::new(Vec::new())),
                sender_attaches: AtomicUsize::new(0),
                receiver_attaches: AtomicUsize::new(0),
                sender_closed: Arc::new(AtomicBool::new(false)),
                receiver_closed: Arc::new(AtomicBool::new(false)),
                feeds: StdMutex::new(Vec::new()),
            }
        }

        /// Queues a feed channel handed to the next attached receiver.
        fn push_feed(&self) -> mpsc::Sender<String> {
            let (tx, rx) = mpsc::channel(8);
            self.feeds.lock().expect("feeds lock").push(rx);
            tx
        }
    }

    #[async_trait]
    impl BrokerConnection for MockConnection {
        async fn new_sender(&self, _address: &str) -> Result<Box<dyn BrokerSender>> {
            self.sender_attaches.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(RecordingSender {
                outcome: self.outcome.clone(),
                sent: self.sent.clone(),
                closed: self.sender_closed.clone(),
            }))
        }

        async fn new_receiver(&self, _address: &str) -> Result<Box<dyn BrokerReceiver>> {
            self.receiver_attaches.fetch_add(1, Ordering::SeqCst);
            let feed = self
                .feeds
                .lock()
                .expect("feeds lock")
                .pop()
                .unwrap_or_else(|| mpsc::channel(1).1);
            Ok(Box::new(FeedReceiver {
                feed,
                closed: self.receiver_closed.clone(),
            }))
        }
    }

    fn router_with(
        connection: Arc<MockConnection>,
    ) -> (AmqpRouterHandle, BusReceiver, JoinHandle<()>) {
        let config = AmqpConfig::new("amqp://localhost:5672");
        let (router, handle, out_rx) = AmqpRouter::new(connection, &config);
        let task = router.run();
        (handle, out_rx, task)
    }

    async fn send(handle: &AmqpRouterHandle, envelope: Envelope) {
        crate::envelope::send_on_bus(&handle.bus(), envelope)
            .await
            .expect("bus should accept envelope");
        // Give the dispatch task a chance to run.
        sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn duplicate_sender_create_attaches_once() {
        let connection = Arc::new(MockConnection::new(DeliveryOutcome::Accepted));
        let (handle, _out, _task) = router_with(connection.clone());

        let create = Envelope::new("/test/queue", EnvelopeKind::Sender, EnvelopeStatus::New);
        send(&handle, create.clone()).await;
        send(&handle, create).await;

        assert_eq!(connection.sender_attaches.load(Ordering::SeqCst), 1);
        assert_eq!(handle.sender_addresses().await, vec!["/test/queue"]);
    }

    #[tokio::test]
    async fn sender_lifecycle_empties_registry_and_closes_link() {
        let connection = Arc::new(MockConnection::new(DeliveryOutcome::Accepted));
        let (handle, _out, _task) = router_with(connection.clone());

        send(
            &handle,
            Envelope::new("/test/queue", EnvelopeKind::Sender, EnvelopeStatus::New),
        )
        .await;
        send(
            &handle,
            Envelope::new("/test/queue", EnvelopeKind::Sender, EnvelopeStatus::Delete),
        )
        .await;

        assert!(handle.sender_addresses().await.is_empty());
        assert!(connection.sender_closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn accepted_delivery_records_body_and_pushes_nothing() {
        let connection = Arc::new(MockConnection::new(DeliveryOutcome::Accepted));
        let (handle, mut out, _task) = router_with(connection.clone());

        send(
            &handle,
            Envelope::new("/test/queue", EnvelopeKind::Sender, EnvelopeStatus::New),
        )
        .await;
        send(
            &handle,
            Envelope::new("/test/queue", EnvelopeKind::Event, EnvelopeStatus::New)
                .with_payload(test_event("e-accept")),
        )
        .await;

        let sent = connection.sent.lock().expect("sent lock").clone();
        assert_eq!(sent.len(), 1);
        let decoded = CloudEvent::from_json_str(&sent[0]).expect("body should decode");
        assert_eq!(decoded.id(), "e-accept");
        assert_eq!(decoded.data().expect("data").version, "1.0");
        assert!(out.try_recv().is_err());
    }

    #[tokio::test]
    async fn rejected_delivery_pushes_sender_failed() {
        let connection = Arc::new(MockConnection::new(DeliveryOutcome::Rejected(Some(
            "no route".to_string(),
        ))));
        let (handle, mut out, _task) = router_with(connection);

        send(
            &handle,
            Envelope::new("/test/queue", EnvelopeKind::Sender, EnvelopeStatus::New),
        )
        .await;
        send(
            &handle,
            Envelope::new("/test/queue", EnvelopeKind::Event, EnvelopeStatus::New)
                .with_payload(test_event("e-reject")),
        )
        .await;

        let failed = out.recv().await.expect("failed envelope should arrive");
        assert_eq!(failed.kind, EnvelopeKind::Sender);
        assert_eq!(failed.status, EnvelopeStatus::Failed);
        assert_eq!(failed.address, "/test/queue");
    }

    #[tokio::test]
    async fn delivery_without_sender_pushes_sender_failed() {
        let connection = Arc::new(MockConnection::new(DeliveryOutcome::Accepted));
        let (handle, mut out, _task) = router_with(connection);

        send(
            &handle,
            Envelope::new("/no/sender", EnvelopeKind::Event, EnvelopeStatus::New)
                .with_payload(test_event("e-orphan")),
        )
        .await;

        let failed = out.recv().await.expect("failed envelope should arrive");
        assert_eq!(failed.kind, EnvelopeKind::Sender);
        assert_eq!(failed.status, EnvelopeStatus::Failed);
    }

    #[tokio::test]
    async fn listener_pushes_received_event_and_runs_processor() {
        struct Counting {
            count: AtomicUsize,
        }
        #[async_trait]
        impl crate::envelope::EventProcessor for Counting {
            async fn process(&self, _event: &CloudEvent) -> Result<()> {
                self.count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let connection = Arc::new(MockConnection::new(DeliveryOutcome::Accepted));
        let feed = connection.push_feed();
        let (handle, mut out, _task) = router_with(connection);
        let processor = Arc::new(Counting {
            count: AtomicUsize::new(0),
        });

        send(
            &handle,
            Envelope::new("/test/queue", EnvelopeKind::Listener, EnvelopeStatus::New)
                .with_event_processor(processor.clone()),
        )
        .await;
        feed.send(test_event("e-in").to_json_string().expect("encode"))
            .await
            .expect("feed should accept");

        let received = out.recv().await.expect("event envelope should arrive");
        assert_eq!(received.kind, EnvelopeKind::Event);
        assert_eq!(received.address, "/test/queue");
        let payload = received.payload.expect("payload should be present");
        assert_eq!(payload.id(), "e-in");
        assert_eq!(payload.data().expect("data").version, "1.0");
        assert_eq!(processor.count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn status_probe_creates_listener_side_effect() {
        let connection = Arc::new(MockConnection::new(DeliveryOutcome::Accepted));
        connection.push_feed();
        let (handle, _out, _task) = router_with(connection.clone());

        send(
            &handle,
            Envelope::new("/test/queue", EnvelopeKind::Status, EnvelopeStatus::New),
        )
        .await;

        assert_eq!(handle.listener_addresses().await, vec!["/test/queue"]);
        assert_eq!(connection.receiver_attaches.load(Ordering::SeqCst), 1);
        // No payload, so nothing was sent and no sender was attached.
        assert_eq!(connection.sender_attaches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn payload_bearing_probe_is_a_logged_no_op() {
        let connection = Arc::new(MockConnection::new(DeliveryOutcome::Accepted));
        let (handle, mut out, _task) = router_with(connection.clone());

        send(
            &handle,
            Envelope::new("/test/queue", EnvelopeKind::Status, EnvelopeStatus::New)
                .with_payload(test_event("e-bad-probe")),
        )
        .await;

        assert!(handle.listener_addresses().await.is_empty());
        assert_eq!(connection.receiver_attaches.load(Ordering::SeqCst), 0);
        assert_eq!(connection.sender_attaches.load(Ordering::SeqCst), 0);
        assert!(connection.sent.lock().expect("sent lock").is_empty());
        assert!(out.try_recv().is_err());
    }

    #[tokio::test]
    async fn delete_listener_closes_link_before_entry_is_dropped() {
        let connection = Arc::new(MockConnection::new(DeliveryOutcome::Accepted));
        connection.push_feed();
        let (handle, _out, _task) = router_with(connection.clone());

        send(
            &handle,
            Envelope::new("/test/queue", EnvelopeKind::Listener, EnvelopeStatus::New),
        )
        .await;
        assert_eq!(handle.listener_addresses().await, vec!["/test/queue"]);

        send(
            &handle,
            Envelope::new("/test/queue", EnvelopeKind::Listener, EnvelopeStatus::Delete),
        )
        .await;

        assert!(handle.listener_addresses().await.is_empty());
        assert!(connection.receiver_closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn send_to_all_fans_out_to_every_sender() {
        let connection = Arc::new(MockConnection::new(DeliveryOutcome::Accepted));
        let (handle, _out, _task) = router_with(connection.clone());

        for address in ["/q/a", "/q/b"] {
            send(
                &handle,
                Envelope::new(address, EnvelopeKind::Sender, EnvelopeStatus::New),
            )
            .await;
        }
        handle
            .send_to_all(test_event("e-all"))
            .await
            .expect("fan-out should queue");
        sleep(Duration::from_millis(100)).await;

        assert_eq!(connection.sent.lock().expect("sent lock").len(), 2);
    }
}
