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

//! Broker link seam and its fe2o3-amqp implementation.
//!
//! The router is written against these traits so tests can substitute
//! recording links; [`QdrConnection`] is the real QDR-backed implementation.
//! Event payloads travel as JSON strings in an AMQP value body.

use async_trait::async_trait;
use fe2o3_amqp::connection::ConnectionHandle;
use fe2o3_amqp::session::SessionHandle;
use fe2o3_amqp::types::messaging::{AmqpValue, Body, Message, Outcome};
use fe2o3_amqp::types::primitives::Value;
use fe2o3_amqp::{Connection, Receiver, Sender, Session};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::AmqpConfig;
use crate::error::{Result, TransportError};

/// Terminal disposition of one outbound delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Accepted,
    Rejected(Option<String>),
    Released,
}

/// Outbound link bound to one address.
#[async_trait]
pub trait BrokerSender: Send + Sync {
    async fn send_json(&mut self, body: String) -> Result<DeliveryOutcome>;
    /// Detaches the link. A send after close fails with a link error.
    async fn close(&mut self) -> Result<()>;
}

/// Inbound link bound to one address.
#[async_trait]
pub trait BrokerReceiver: Send {
    async fn recv_json(&mut self) -> Result<String>;
    async fn close(&mut self) -> Result<()>;
}

/// Factory for links on one broker connection.
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    async fn new_sender(&self, address: &str) -> Result<Box<dyn BrokerSender>>;
    async fn new_receiver(&self, address: &str) -> Result<Box<dyn BrokerReceiver>>;
}

/// AMQP 1.0 connection to a QDR-style interconnect.
pub struct QdrConnection {
    session: Mutex<SessionHandle<()>>,
    // Held so the connection outlives the session; dropped on shutdown.
    _connection: ConnectionHandle<()>,
}

impl QdrConnection {
    pub async fn open(config: &AmqpConfig) -> Result<Self> {
        let container_id = format!("cne-transport-{}", Uuid::new_v4());
        let mut connection = Connection::open(container_id, &*config.host_uri)
            .await
            .map_err(|err| TransportError::Connection(err.to_string()))?;
        let session = Session::begin(&mut connection)
            .await
            .map_err(|err| TransportError::Connection(err.to_string()))?;
        Ok(Self {
            session: Mutex::new(session),
            _connection: connection,
        })
    }
}

#[async_trait]
impl BrokerConnection for QdrConnection {
    async fn new_sender(&self, address: &str) -> Result<Box<dyn BrokerSender>> {
        let mut session = self.session.lock().await;
        let link_name = format!("sender-{}-{}", address.trim_start_matches('/'), Uuid::new_v4());
        let sender = Sender::attach(&mut session, link_name, address)
            .await
            .map_err(|err| TransportError::Link(err.to_string()))?;
        Ok(Box::new(QdrSender {
            inner: Some(sender),
        }))
    }

    async fn new_receiver(&self, address: &str) -> Result<Box<dyn BrokerReceiver>> {
        let mut session = self.session.lock().await;
        let link_name = format!(
            "receiver-{}-{}",
            address.trim_start_matches('/'),
            Uuid::new_v4()
        );
        let receiver = Receiver::attach(&mut session, link_name, address)
            .await
            .map_err(|err| TransportError::Link(err.to_string()))?;
        Ok(Box::new(QdrReceiver {
            inner: Some(receiver),
        }))
    }
}

struct QdrSender {
    // Taken on close; fe2o3-amqp detach consumes the link.
    inner: Option<Sender>,
}

#[async_trait]
impl BrokerSender for QdrSender {
    async fn send_json(&mut self, body: String) -> Result<DeliveryOutcome> {
        let sender = self
            .inner
            .as_mut()
            .ok_or_else(|| TransportError::Link("sender link is closed".to_string()))?;
        let message = Message::builder()
            .body(Body::Value(AmqpValue(Value::String(body))))
            .build();
        let outcome = sender
            .send(message)
            .await
            .map_err(|err| TransportError::Send(err.to_string()))?;
        match outcome {
            Outcome::Accepted(_) => Ok(DeliveryOutcome::Accepted),
            Outcome::Rejected(rejected) => Ok(DeliveryOutcome::Rejected(
                rejected.error.map(|err| format!("{err:?}")),
            )),
            Outcome::Released(_) => Ok(DeliveryOutcome::Released),
            Outcome::Modified(_) => Ok(DeliveryOutcome::Released),
            other => Err(TransportError::Send(format!(
                "unexpected delivery outcome: {other:?}"
            ))),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(sender) = self.inner.take() {
            sender
                .close()
                .await
                .map_err(|err| TransportError::Link(err.to_string()))?;
        }
        Ok(())
    }
}

struct QdrReceiver {
    inner: Option<Receiver>,
}

#[async_trait]
impl BrokerReceiver for QdrReceiver {
    async fn recv_json(&mut self) -> Result<String> {
        let receiver = self
            .inner
            .as_mut()
            .ok_or_else(|| TransportError::Link("receiver link is closed".to_string()))?;
        let delivery = receiver
            .recv::<Body<Value>>()
            .await
            .map_err(|err| TransportError::Receive(err.to_string()))?;
        receiver
            .accept(&delivery)
            .await
            .map_err(|err| TransportError::Receive(err.to_string()))?;
        match delivery.body() {
            Body::Value(AmqpValue(Value::String(json))) => Ok(json.clone()),
            other => Err(TransportError::Receive(format!(
                "unsupported message body: {other:?}"
            ))),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(receiver) = self.inner.take() {
            receiver
                .close()
                .await
                .map_err(|err| TransportError::Link(err.to_string()))?;
        }
        Ok(())
    }
}
