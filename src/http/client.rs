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

//! Outbound HTTP delivery.

use std::fs;
use std::time::Duration;

use reqwest::StatusCode;
use tracing::debug;
use uuid::Uuid;

use crate::config::TlsConfig;
use crate::error::{Result, TransportError};
use crate::event::CloudEvent;
use crate::observability::{events, fields};
use crate::pubsub::client_id_for_uri;

const COMPONENT: &str = fields::COMPONENT_HTTP_CLIENT;

/// Every outbound request is bounded so an unresponsive peer cannot hold a
/// delivery open indefinitely.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Builds the shared outbound client; with TLS material this is a mutual-TLS
/// client pinned to the configured root CA and TLS 1.3.
pub fn build_client(tls: Option<&TlsConfig>) -> Result<reqwest::Client> {
    let builder = reqwest::Client::builder().timeout(REQUEST_TIMEOUT);
    let builder = match tls {
        None => builder,
        Some(tls) => {
            let ca = reqwest::Certificate::from_pem(&fs::read(&tls.ca_path)?)
                .map_err(|err| TransportError::Tls(err.to_string()))?;
            let mut identity_pem = fs::read(&tls.key_path)?;
            identity_pem.extend_from_slice(&fs::read(&tls.cert_path)?);
            let identity = reqwest::Identity::from_pem(&identity_pem)
                .map_err(|err| TransportError::Tls(err.to_string()))?;
            builder
                .use_rustls_tls()
                .add_root_certificate(ca)
                .identity(identity)
                .min_tls_version(reqwest::tls::Version::TLS_1_3)
        }
    };
    builder
        .build()
        .map_err(|err| TransportError::Tls(err.to_string()))
}

/// Fetches a URL and returns the body as text.
pub async fn get(client: &reqwest::Client, url: &str) -> Result<String> {
    Ok(client.get(url).send().await?.text().await?)
}

/// Posts an empty body, returning the response status.
pub async fn post(client: &reqwest::Client, url: &str) -> Result<StatusCode> {
    Ok(client.post(url).send().await?.status())
}

/// Outbound delivery endpoint for one registered subscriber.
///
/// The registration record carries the subscriber's ack callback; event
/// deliveries go to the sibling `/event` route of the same service.
#[derive(Clone)]
pub struct HttpSender {
    client: reqwest::Client,
    endpoint_base: String,
    client_id: Uuid,
}

impl HttpSender {
    pub fn from_endpoint(client: reqwest::Client, endpoint_uri: &str) -> Self {
        let endpoint_base = endpoint_base(endpoint_uri);
        let client_id = client_id_for_uri(&format!("{endpoint_base}/"));
        Self {
            client,
            endpoint_base,
            client_id,
        }
    }

    pub fn client_id(&self) -> Uuid {
        self.client_id
    }

    pub fn endpoint_base(&self) -> &str {
        &self.endpoint_base
    }

    /// Delivers one event, returning the peer's response status.
    pub async fn send_event(&self, event: &CloudEvent) -> Result<StatusCode> {
        let url = format!("{}/event", self.endpoint_base);
        let status = self.client.post(&url).json(event).send().await?.status();
        if status.is_success() {
            debug!(
                event = events::EVENT_POST_OK,
                component = COMPONENT,
                endpoint = url.as_str(),
                event_id = event.id(),
                status_code = status.as_u16(),
            );
        }
        Ok(status)
    }

    /// Liveness check against the subscriber's ack callback; the peer answers
    /// `204 No Content` when it is ready to receive.
    pub async fn check_alive(&self, endpoint_uri: &str) -> Result<bool> {
        let status = post(&self.client, endpoint_uri).await?;
        Ok(status == StatusCode::NO_CONTENT)
    }
}

/// Service base of a callback URI: `http://host/ack` maps to `http://host`.
fn endpoint_base(endpoint_uri: &str) -> String {
    let trimmed = endpoint_uri.trim_end_matches('/');
    trimmed
        .strip_suffix("/ack")
        .unwrap_or(trimmed)
        .to_string()
}
