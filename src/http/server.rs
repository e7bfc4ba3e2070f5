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

//! The HTTP transport server.
//!
//! One axum listener carries the inbound surface (event delivery, health,
//! subscription registration, ack, status queries) while a single dispatch
//! task consumes the bus and drives the outbound side: the registration
//! handshake, per-subscriber delivery clients and status probes.
//!
//! Registration handshake:
//!   1. subscriber POSTs its record to the publisher's `/subscription`
//!   2. the publisher liveness-checks the subscriber's ack callback (204)
//!   3. only then is the record persisted and a delivery client created
//!   4. the publisher replies `201 Created` with the canonical record

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::HttpConfig;
use crate::envelope::{
    bus_channel, send_on_bus, BusReceiver, BusSender, Envelope, EnvelopeKind, EnvelopeStatus,
    EventProcessor, StatusHandler, DEFAULT_BUS_CAPACITY,
};
use crate::error::Result;
use crate::event::CloudEvent;
use crate::http::client::{build_client, HttpSender};
use crate::http::tls;
use crate::observability::{events, fields};
use crate::pubsub::{client_id_for_uri, normalize_resource, PubSub};
use crate::status::StatusDispatcher;
use crate::store::{FileStore, PubSubStore};

const COMPONENT: &str = fields::COMPONENT_HTTP_SERVER;

struct ServerState {
    client_id: Uuid,
    service_uri: String,
    publisher_uri: Option<String>,
    store: Arc<PubSubStore>,
    publishers: RwLock<HashSet<String>>,
    senders: Mutex<HashMap<Uuid, HttpSender>>,
    data_out: BusSender,
    status: Arc<StatusDispatcher>,
    status_handler: RwLock<Option<Arc<dyn StatusHandler>>>,
    processor: RwLock<Option<Arc<dyn EventProcessor>>>,
    client: reqwest::Client,
}

/// HTTP transport endpoint: inbound axum surface plus the bus dispatch loop.
pub struct HttpServer {
    config: HttpConfig,
    state: Arc<ServerState>,
    data_in: BusReceiver,
}

impl HttpServer {
    /// Builds the server and its handle. The returned receiver is the
    /// data-out side: received events, delivery results and handshake
    /// outcomes arrive there.
    pub fn new(config: HttpConfig) -> Result<(Self, HttpServerHandle, BusReceiver)> {
        let service_uri = with_trailing_slash(&config.service_uri);
        let publisher_uri = config.publisher_uri.as_deref().map(with_trailing_slash);
        let client_id = client_id_for_uri(&service_uri);
        let store = match &config.store_dir {
            Some(dir) => Arc::new(PubSubStore::with_persistence(FileStore::for_client(
                dir, client_id,
            ))?),
            None => Arc::new(PubSubStore::new()),
        };
        let client = build_client(config.tls.as_ref())?;
        let (bus, data_in) = bus_channel(DEFAULT_BUS_CAPACITY);
        let (data_out, out_rx) = bus_channel(DEFAULT_BUS_CAPACITY);
        let state = Arc::new(ServerState {
            client_id,
            service_uri,
            publisher_uri,
            store,
            publishers: RwLock::new(HashSet::new()),
            senders: Mutex::new(HashMap::new()),
            data_out,
            status: Arc::new(StatusDispatcher::new()),
            status_handler: RwLock::new(None),
            processor: RwLock::new(None),
            client,
        });
        let handle = HttpServerHandle {
            bus,
            state: state.clone(),
        };
        Ok((
            Self {
                config,
                state,
                data_in,
            },
            handle,
            out_rx,
        ))
    }

    /// The inbound route surface.
    fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/event", post(receive_event))
            .route("/subscription", post(subscribe))
            .route("/ack", post(ack))
            // Multi-segment resource paths end in /{clientId}/CurrentState.
            .route("/*path", get(current_state))
            .with_state(self.state.clone())
    }

    /// Binds the listener and spawns the serve task, returning the bound
    /// address.
    pub async fn start(&self) -> Result<SocketAddr> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        info!(
            event = events::HTTP_SERVE_START,
            component = COMPONENT,
            addr = %addr,
            client_id = %self.state.client_id,
            tls = self.config.tls.is_some(),
        );
        match &self.config.tls {
            Some(tls_config) => {
                let server_config = tls::load_server_config(tls_config)?;
                tokio::spawn(async move {
                    if let Err(err) = tls::serve_tls(listener, server_config, app).await {
                        warn!(
                            event = events::HTTP_SERVE_STOPPED,
                            component = COMPONENT,
                            err = %err,
                        );
                    }
                });
            }
            None => {
                tokio::spawn(async move {
                    if let Err(err) = axum::serve(listener, app).await {
                        warn!(
                            event = events::HTTP_SERVE_STOPPED,
                            component = COMPONENT,
                            err = %err,
                        );
                    }
                });
            }
        }
        Ok(addr)
    }

    /// Consumes the server into its dispatch task. The task ends when every
    /// bus sender (the handle included) has been dropped.
    pub fn run(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(envelope) = self.data_in.recv().await {
                dispatch(&self.state, envelope).await;
            }
            info!(
                event = events::BUS_CLOSED,
                component = COMPONENT,
                "bus closed; dispatch loop stopping"
            );
        })
    }
}

/// Cloneable view onto a running HTTP server.
#[derive(Clone)]
pub struct HttpServerHandle {
    bus: BusSender,
    state: Arc<ServerState>,
}

impl HttpServerHandle {
    /// The data-in side of the bus: queue envelopes here.
    pub fn bus(&self) -> BusSender {
        self.bus.clone()
    }

    pub fn client_id(&self) -> Uuid {
        self.state.client_id
    }

    /// Declares a resource this node publishes; subscription requests for
    /// unregistered resources are refused.
    pub fn register_publisher(&self, resource: &str) {
        self.state
            .publishers
            .write()
            .expect("publishers lock poisoned")
            .insert(normalize_resource(resource));
    }

    pub fn registered_publishers(&self) -> Vec<String> {
        self.state
            .publishers
            .read()
            .expect("publishers lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    pub fn subscriptions(&self) -> Vec<PubSub> {
        self.state.store.all()
    }

    pub async fn sender_count(&self) -> usize {
        self.state.senders.lock().await.len()
    }

    /// Installs the hook that answers inbound `CurrentState` queries.
    pub fn set_status_handler(&self, handler: Arc<dyn StatusHandler>) {
        *self
            .state
            .status_handler
            .write()
            .expect("status handler lock poisoned") = Some(handler);
    }

    /// Installs the hook invoked for every event received on `/event`.
    pub fn set_event_processor(&self, processor: Arc<dyn EventProcessor>) {
        *self
            .state
            .processor
            .write()
            .expect("processor lock poisoned") = Some(processor);
    }

    /// Probes the remote publisher for the current state of `resource`,
    /// correlated through the status dispatcher.
    pub async fn current_state(&self, resource: &str, deadline: Duration) -> Result<CloudEvent> {
        let (seq, rx) = self.state.status.register();
        let envelope =
            Envelope::new(resource, EnvelopeKind::Status, EnvelopeStatus::New).with_seq(seq);
        send_on_bus(&self.bus, envelope).await?;
        self.state.status.wait(seq, rx, deadline).await
    }
}

fn with_trailing_slash(uri: &str) -> String {
    format!("{}/", uri.trim_end_matches('/'))
}

/// Operations that talk to a peer run in their own tasks, so a slow or
/// unresponsive remote never stalls the dispatch loop; lifecycle operations
/// on local state stay inline and keep their FIFO order.
async fn dispatch(state: &Arc<ServerState>, envelope: Envelope) {
    match (envelope.kind, envelope.status) {
        (EnvelopeKind::Listener, EnvelopeStatus::New) => {
            let state = Arc::clone(state);
            tokio::spawn(async move { subscribe_remote(&state, &envelope).await });
        }
        (EnvelopeKind::Listener, EnvelopeStatus::Delete) => {
            if let Some(record) = state.store.find_by_resource(&envelope.address) {
                if let Err(err) = state.store.delete(&record.id) {
                    warn!(
                        event = events::STORE_PERSIST_FAILED,
                        component = COMPONENT,
                        resource = envelope.address.as_str(),
                        err = %err,
                    );
                }
            }
        }
        (EnvelopeKind::Sender, EnvelopeStatus::New) => {
            create_sender(state, &envelope).await;
        }
        (EnvelopeKind::Sender, EnvelopeStatus::Delete) => {
            delete_sender(state, &envelope).await;
        }
        (EnvelopeKind::Event, EnvelopeStatus::New) => {
            let state = Arc::clone(state);
            tokio::spawn(async move { deliver(&state, &envelope).await });
        }
        (EnvelopeKind::Status, EnvelopeStatus::New) => {
            let state = Arc::clone(state);
            tokio::spawn(async move { probe_current_state(&state, &envelope).await });
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

/// Subscriber side of the registration handshake.
async fn subscribe_remote(state: &Arc<ServerState>, envelope: &Envelope) {
    let Some(publisher) = state.publisher_uri.as_deref() else {
        warn!(
            event = events::REGISTRATION_FAILED,
            component = COMPONENT,
            resource = envelope.address.as_str(),
            reason = "no publisher configured",
        );
        push_out(state, envelope.resolved(EnvelopeStatus::Failed)).await;
        return;
    };
    let request = PubSub::new(
        format!("{}ack", state.service_uri),
        normalize_resource(&envelope.address),
    );
    info!(
        event = events::REGISTRATION_START,
        component = COMPONENT,
        resource = envelope.address.as_str(),
        endpoint = request.endpoint_uri.as_str(),
    );
    let url = format!("{publisher}subscription");
    let response = state.client.post(&url).json(&request).send().await;
    let confirmed = match response {
        Ok(response) if response.status() == StatusCode::CREATED => {
            response.json::<PubSub>().await.ok()
        }
        Ok(response) => {
            warn!(
                event = events::REGISTRATION_FAILED,
                component = COMPONENT,
                resource = envelope.address.as_str(),
                status_code = response.status().as_u16(),
            );
            None
        }
        Err(err) => {
            warn!(
                event = events::REGISTRATION_FAILED,
                component = COMPONENT,
                resource = envelope.address.as_str(),
                err = %err,
            );
            None
        }
    };
    match confirmed {
        Some(record) => {
            if let Err(err) = state.store.set(record) {
                warn!(
                    event = events::STORE_PERSIST_FAILED,
                    component = COMPONENT,
                    resource = envelope.address.as_str(),
                    err = %err,
                );
            }
            info!(
                event = events::REGISTRATION_OK,
                component = COMPONENT,
                resource = envelope.address.as_str(),
            );
            push_out(state, envelope.resolved(EnvelopeStatus::Success)).await;
        }
        None => {
            push_out(state, envelope.resolved(EnvelopeStatus::Failed)).await;
        }
    }
}

/// Builds the delivery client for an already registered subscriber.
async fn create_sender(state: &Arc<ServerState>, envelope: &Envelope) {
    match state.store.find_by_resource(&envelope.address) {
        Some(record) => {
            let sender = HttpSender::from_endpoint(state.client.clone(), &record.endpoint_uri);
            let mut senders = state.senders.lock().await;
            let client_id = sender.client_id();
            senders.entry(client_id).or_insert(sender);
            info!(
                event = events::SENDER_CREATE,
                component = COMPONENT,
                resource = envelope.address.as_str(),
                client_id = %client_id,
            );
        }
        None => {
            warn!(
                event = events::SENDER_CREATE_FAILED,
                component = COMPONENT,
                resource = envelope.address.as_str(),
                reason = "no registered subscriber",
            );
            push_out(state, envelope.resolved(EnvelopeStatus::Failed)).await;
        }
    }
}

async fn delete_sender(state: &Arc<ServerState>, envelope: &Envelope) {
    if let Some(record) = state.store.find_by_resource(&envelope.address) {
        let client_id = HttpSender::from_endpoint(state.client.clone(), &record.endpoint_uri)
            .client_id();
        state.senders.lock().await.remove(&client_id);
        if let Err(err) = state.store.delete(&record.id) {
            warn!(
                event = events::STORE_PERSIST_FAILED,
                component = COMPONENT,
                resource = envelope.address.as_str(),
                err = %err,
            );
        }
        info!(
            event = events::SENDER_DELETE,
            component = COMPONENT,
            resource = envelope.address.as_str(),
            client_id = %client_id,
        );
    }
}

/// Delivers an event to the subscriber registered for the address; 2xx from
/// the peer maps to `{Event, Success}`, anything else to `{Event, Failed}`.
async fn deliver(state: &Arc<ServerState>, envelope: &Envelope) {
    let Some(event) = envelope.payload.as_ref() else {
        warn!(
            event = events::EVENT_POST_FAILED,
            component = COMPONENT,
            resource = envelope.address.as_str(),
            reason = "event envelope without payload",
        );
        push_out(state, envelope.resolved(EnvelopeStatus::Failed)).await;
        return;
    };
    let Some(record) = state.store.find_by_resource(&envelope.address) else {
        warn!(
            event = events::DELIVERY_NO_SENDER,
            component = COMPONENT,
            resource = envelope.address.as_str(),
            event_id = event.id(),
        );
        push_out(state, envelope.resolved(EnvelopeStatus::Failed)).await;
        return;
    };
    let sender = {
        let mut senders = state.senders.lock().await;
        let candidate = HttpSender::from_endpoint(state.client.clone(), &record.endpoint_uri);
        senders
            .entry(candidate.client_id())
            .or_insert(candidate)
            .clone()
    };
    match sender.send_event(event).await {
        Ok(status) if status.is_success() => {
            let mut out = envelope.resolved(EnvelopeStatus::Success);
            out.client_id = Some(sender.client_id());
            push_out(state, out).await;
        }
        Ok(status) => {
            warn!(
                event = events::EVENT_POST_FAILED,
                component = COMPONENT,
                resource = envelope.address.as_str(),
                event_id = event.id(),
                status_code = status.as_u16(),
            );
            push_out(state, envelope.resolved(EnvelopeStatus::Failed)).await;
        }
        Err(err) => {
            warn!(
                event = events::EVENT_POST_FAILED,
                component = COMPONENT,
                resource = envelope.address.as_str(),
                event_id = event.id(),
                err = %err,
            );
            push_out(state, envelope.resolved(EnvelopeStatus::Failed)).await;
        }
    }
}

/// Subscriber-side status probe against the remote publisher.
async fn probe_current_state(state: &Arc<ServerState>, envelope: &Envelope) {
    let Some(publisher) = state.publisher_uri.as_deref() else {
        warn!(
            event = events::STATUS_PROBE_TIMEOUT,
            component = COMPONENT,
            resource = envelope.address.as_str(),
            reason = "no publisher configured",
        );
        push_out(state, envelope.resolved(EnvelopeStatus::Failed)).await;
        return;
    };
    let url = format!(
        "{}{}/{}/CurrentState",
        publisher.trim_end_matches('/'),
        normalize_resource(&envelope.address),
        state.client_id,
    );
    debug!(
        event = events::STATUS_PROBE_SENT,
        component = COMPONENT,
        endpoint = url.as_str(),
        seq = envelope.seq.unwrap_or_default(),
    );
    let reply = match state.client.get(&url).send().await {
        Ok(response) if response.status().is_success() => {
            response.json::<CloudEvent>().await.ok()
        }
        Ok(response) => {
            warn!(
                event = events::STATUS_PROBE_TIMEOUT,
                component = COMPONENT,
                endpoint = url.as_str(),
                status_code = response.status().as_u16(),
            );
            None
        }
        Err(err) => {
            warn!(
                event = events::STATUS_PROBE_TIMEOUT,
                component = COMPONENT,
                endpoint = url.as_str(),
                err = %err,
            );
            None
        }
    };
    match reply {
        Some(reply) => {
            if let Some(seq) = envelope.seq {
                state.status.resolve(seq, reply.clone());
            }
            let mut out = envelope.resolved(EnvelopeStatus::Success);
            out.payload = Some(reply);
            push_out(state, out).await;
        }
        None => {
            if let Some(seq) = envelope.seq {
                state.status.abandon(seq);
            }
            push_out(state, envelope.resolved(EnvelopeStatus::Failed)).await;
        }
    }
}

async fn push_out(state: &Arc<ServerState>, envelope: Envelope) {
    if state.data_out.send(envelope).await.is_err() {
        warn!(
            event = events::BUS_SEND_FAILED,
            component = COMPONENT,
            reason = "data-out channel closed",
        );
    }
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn ack() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn receive_event(
    State(state): State<Arc<ServerState>>,
    Json(event): Json<CloudEvent>,
) -> StatusCode {
    debug!(
        event = events::EVENT_RECEIVED,
        component = COMPONENT,
        event_id = event.id(),
        event_type = event.event_type(),
    );
    let processor = state
        .processor
        .read()
        .expect("processor lock poisoned")
        .clone();
    if let Some(processor) = processor {
        if let Err(err) = processor.process(&event).await {
            warn!(
                event = events::EVENT_RECEIVED,
                component = COMPONENT,
                event_id = event.id(),
                err = %err,
                "event processor failed"
            );
        }
    }
    let address = event.source().unwrap_or_default().to_string();
    let out = Envelope::new(address, EnvelopeKind::Event, EnvelopeStatus::New).with_payload(event);
    push_out(&state, out).await;
    StatusCode::OK
}

/// Publisher side of the registration handshake.
async fn subscribe(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<PubSub>,
) -> Response {
    let resource = normalize_resource(&request.resource);
    let known = state
        .publishers
        .read()
        .expect("publishers lock poisoned")
        .contains(&resource);
    if !known {
        warn!(
            event = events::REGISTRATION_FAILED,
            component = COMPONENT,
            resource = resource.as_str(),
            reason = "resource not published here",
        );
        return StatusCode::NOT_FOUND.into_response();
    }
    let sender = HttpSender::from_endpoint(state.client.clone(), &request.endpoint_uri);
    match sender.check_alive(&request.endpoint_uri).await {
        Ok(true) => {}
        Ok(false) | Err(_) => {
            warn!(
                event = events::LIVENESS_CHECK_FAILED,
                component = COMPONENT,
                endpoint = request.endpoint_uri.as_str(),
            );
            return StatusCode::BAD_REQUEST.into_response();
        }
    }
    // A registration that cannot be persisted is not recorded; refuse it.
    let record = match state.store.set(request) {
        Ok(record) => record,
        Err(err) => {
            warn!(
                event = events::STORE_PERSIST_FAILED,
                component = COMPONENT,
                resource = resource.as_str(),
                err = %err,
            );
            return StatusCode::BAD_REQUEST.into_response();
        }
    };
    let client_id = sender.client_id();
    state.senders.lock().await.entry(client_id).or_insert(sender);
    info!(
        event = events::REGISTRATION_OK,
        component = COMPONENT,
        resource = resource.as_str(),
        client_id = %client_id,
    );
    (StatusCode::CREATED, Json(record)).into_response()
}

/// `GET /{resource…}/{clientId}/CurrentState` where the resource part spans
/// multiple path segments.
async fn current_state(State(state): State<Arc<ServerState>>, Path(path): Path<String>) -> Response {
    let full = format!("/{}", path.trim_start_matches('/'));
    let Some(prefix) = full.strip_suffix("/CurrentState") else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some((resource, client_part)) = prefix.rsplit_once('/') else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    if client_part.parse::<Uuid>().is_err() {
        return StatusCode::BAD_REQUEST.into_response();
    }
    if state.store.find_by_resource(resource).is_none() {
        warn!(
            event = events::CURRENT_STATE_UNKNOWN_RESOURCE,
            component = COMPONENT,
            resource,
        );
        return StatusCode::BAD_REQUEST.into_response();
    }
    let handler = state
        .status_handler
        .read()
        .expect("status handler lock poisoned")
        .clone();
    let Some(handler) = handler else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match handler.current_state(resource).await {
        Ok(reply) => (StatusCode::OK, Json(reply)).into_response(),
        Err(err) => {
            warn!(
                event = events::CURRENT_STATE_UNKNOWN_RESOURCE,
                component = COMPONENT,
                resource,
                err = %err,
            );
            StatusCode::BAD_REQUEST.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_uri_normalization_is_idempotent() {
        assert_eq!(
            with_trailing_slash("http://127.0.0.1:8089"),
            "http://127.0.0.1:8089/"
        );
        assert_eq!(
            with_trailing_slash("http://127.0.0.1:8089/"),
            "http://127.0.0.1:8089/"
        );
    }

    #[tokio::test]
    async fn server_derives_a_deterministic_client_identity() {
        let config = HttpConfig::new("127.0.0.1:0", "http://127.0.0.1:8089/api/test-cloud/");
        let (_server, handle, _out) = HttpServer::new(config).expect("server should build");
        assert_eq!(
            handle.client_id(),
            client_id_for_uri("http://127.0.0.1:8089/api/test-cloud/")
        );
    }
}
