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

//! Construction-time configuration. Nothing here mutates at runtime.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// AMQP router configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AmqpConfig {
    /// Broker URI, e.g. `amqp://localhost:5672`.
    pub host_uri: String,
    /// Upper bound applied to each outbound delivery.
    #[serde(default = "default_send_timeout", with = "duration_ms")]
    pub send_timeout: Duration,
}

impl AmqpConfig {
    pub fn new(host_uri: impl Into<String>) -> Self {
        Self {
            host_uri: host_uri.into(),
            send_timeout: default_send_timeout(),
        }
    }
}

fn default_send_timeout() -> Duration {
    Duration::from_secs(2)
}

/// HTTP transport configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HttpConfig {
    /// Address the server binds, e.g. `127.0.0.1:8089`.
    pub bind_addr: String,
    /// Public URI of this service, used to derive client identity and the
    /// callback endpoints sent to peers.
    pub service_uri: String,
    /// Remote publisher this node subscribes to and probes; `None` for a
    /// publish-only node.
    #[serde(default)]
    pub publisher_uri: Option<String>,
    /// Directory for the `{client_id}.json` persistence snapshot; `None`
    /// keeps the store memory-only.
    #[serde(default)]
    pub store_dir: Option<PathBuf>,
    /// Mutual-TLS material; `None` serves plain HTTP.
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

impl HttpConfig {
    pub fn new(bind_addr: impl Into<String>, service_uri: impl Into<String>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            service_uri: service_uri.into(),
            publisher_uri: None,
            store_dir: None,
            tls: None,
        }
    }
}

/// PEM paths for mutual TLS on both the listener and outbound client.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    /// Root CA used both to verify peers and to anchor client certificates.
    pub ca_path: PathBuf,
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amqp_send_timeout_defaults_to_two_seconds() {
        let config: AmqpConfig =
            serde_json::from_str(r#"{"host_uri":"amqp://localhost:5672"}"#).expect("parse");
        assert_eq!(config.send_timeout, Duration::from_secs(2));
    }

    #[test]
    fn send_timeout_round_trips_as_millis() {
        let mut config = AmqpConfig::new("amqp://localhost:5672");
        config.send_timeout = Duration::from_millis(1500);
        let json = serde_json::to_string(&config).expect("serialize");
        let parsed: AmqpConfig = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed.send_timeout, Duration::from_millis(1500));
    }
}
