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

//! Publisher/subscription records exchanged during registration and held in
//! the resource store.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A publisher or subscription registration record.
///
/// The serde names are part of the persisted-file and wire contract and must
/// not change.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PubSub {
    pub id: Uuid,
    /// Callback URI the counterpart delivers to.
    #[serde(rename = "endpointUri")]
    pub endpoint_uri: String,
    /// URI at which this record itself can be addressed.
    #[serde(rename = "uriLocation")]
    pub uri_location: String,
    pub resource: String,
}

impl PubSub {
    pub fn new(endpoint_uri: impl Into<String>, resource: impl Into<String>) -> Self {
        let id = Uuid::new_v4();
        let endpoint_uri = endpoint_uri.into();
        let uri_location = format!("{}/{}", endpoint_uri.trim_end_matches('/'), id);
        Self {
            id,
            endpoint_uri,
            uri_location,
            resource: resource.into(),
        }
    }

    /// Resource path with a guaranteed leading slash, for store comparisons.
    pub fn normalized_resource(&self) -> String {
        normalize_resource(&self.resource)
    }
}

/// Resource paths compare leading-slash-insensitively on both sides.
pub fn normalize_resource(resource: &str) -> String {
    format!("/{}", resource.trim_start_matches('/'))
}

/// Deterministic client identity derived from a service URI.
///
/// Uses the MD5 name-based UUID over the URL namespace, so two processes
/// configured with the same URI resolve to the same identity.
pub fn client_id_for_uri(uri: &str) -> Uuid {
    Uuid::new_v3(&Uuid::NAMESPACE_URL, uri.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_id_is_deterministic_per_uri() {
        let a = client_id_for_uri("http://localhost:8089/api/test-cloud/");
        let b = client_id_for_uri("http://localhost:8089/api/test-cloud/");
        let c = client_id_for_uri("http://localhost:9085/api/test-cloud/");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn record_serializes_with_contract_names() {
        let record = PubSub::new("http://localhost:8089/api/test-cloud/", "/cluster/node/ptp");
        let json = serde_json::to_value(&record).expect("record should serialize");
        assert!(json.get("endpointUri").is_some());
        assert!(json.get("uriLocation").is_some());
        assert!(json.get("resource").is_some());
        assert_eq!(
            json["uriLocation"],
            format!("http://localhost:8089/api/test-cloud/{}", record.id)
        );
    }

    #[test]
    fn resource_comparison_ignores_leading_slash() {
        assert_eq!(normalize_resource("cluster/node/ptp"), "/cluster/node/ptp");
        assert_eq!(normalize_resource("/cluster/node/ptp"), "/cluster/node/ptp");
    }
}
