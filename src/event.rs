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

//! Minimal cloud-event collaborator carried as the envelope payload.
//!
//! The transport layer treats the event as opaque beyond identity and byte
//! (de)serialization; the versioned [`EventData`] shape matches the JSON the
//! wire peers exchange (`dataContentType` is always `application/json`).

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const APPLICATION_JSON: &str = "application/json";

/// Classification of a single data value.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataType {
    #[serde(rename = "notification")]
    Notification,
    #[serde(rename = "metric")]
    Metric,
}

/// Wire type of a single data value.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueType {
    #[serde(rename = "enumeration")]
    Enumeration,
    #[serde(rename = "decimal64.3")]
    Decimal64_3,
}

/// One entry of an event's data section.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DataValue {
    pub resource: String,
    #[serde(rename = "dataType")]
    pub data_type: DataType,
    #[serde(rename = "valueType")]
    pub value_type: ValueType,
    pub value: serde_json::Value,
}

/// Versioned event data section.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct EventData {
    pub version: String,
    pub values: Vec<DataValue>,
}

impl EventData {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            values: Vec::new(),
        }
    }

    pub fn append_value(&mut self, value: DataValue) {
        self.values.push(value);
    }
}

/// Structured cloud native event.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CloudEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    #[serde(rename = "dataContentType")]
    data_content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<EventData>,
}

impl CloudEvent {
    pub fn new(id: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            event_type: event_type.into(),
            source: None,
            data_content_type: APPLICATION_JSON.to_string(),
            time: None,
            data: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn set_source(&mut self, source: impl Into<String>) {
        self.source = Some(source.into());
    }

    pub fn time(&self) -> Option<DateTime<Utc>> {
        self.time
    }

    pub fn set_time(&mut self, time: DateTime<Utc>) {
        self.time = Some(time);
    }

    /// Stamps the event with the current UTC time.
    pub fn set_current_time(&mut self) {
        self.time = Some(Utc::now());
    }

    pub fn data(&self) -> Option<&EventData> {
        self.data.as_ref()
    }

    pub fn set_data(&mut self, data: EventData) {
        self.data = Some(data);
    }

    pub fn data_content_type(&self) -> &str {
        &self.data_content_type
    }

    /// RFC 3339 rendering of the event time, if stamped.
    pub fn time_rfc3339(&self) -> Option<String> {
        self.time
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_event() -> CloudEvent {
        let mut data = EventData::new("1.0");
        data.append_value(DataValue {
            resource: "/cluster/node/ptp".to_string(),
            data_type: DataType::Notification,
            value_type: ValueType::Enumeration,
            value: json!("ACQUIRING-SYNC"),
        });
        let mut event = CloudEvent::new("e-1", "event.synchronization-state-change");
        event.set_source("/cluster/node/ptp");
        event.set_current_time();
        event.set_data(data);
        event
    }

    #[test]
    fn serializes_with_wire_field_names() {
        let event = sample_event();
        let json = serde_json::to_value(&event).expect("event should serialize");
        assert_eq!(json["type"], "event.synchronization-state-change");
        assert_eq!(json["dataContentType"], APPLICATION_JSON);
        assert_eq!(json["data"]["version"], "1.0");
        assert_eq!(json["data"]["values"][0]["dataType"], "notification");
        assert_eq!(json["data"]["values"][0]["valueType"], "enumeration");
    }

    #[test]
    fn byte_round_trip_preserves_event() {
        let event = sample_event();
        let bytes = event.to_bytes().expect("event should encode");
        let decoded = CloudEvent::from_bytes(&bytes).expect("event should decode");
        assert_eq!(decoded, event);
    }

    #[test]
    fn decimal_values_survive_decoding() {
        let mut data = EventData::new("1.0");
        data.append_value(DataValue {
            resource: "/cluster/node/clock".to_string(),
            data_type: DataType::Metric,
            value_type: ValueType::Decimal64_3,
            value: json!(-97.3),
        });
        let mut event = CloudEvent::new("e-2", "event.sync-status-change");
        event.set_data(data);

        let json = event.to_json_string().expect("event should encode");
        let decoded = CloudEvent::from_json_str(&json).expect("event should decode");
        let value = &decoded.data().expect("data should be present").values[0];
        assert_eq!(value.value_type, ValueType::Decimal64_3);
        assert_eq!(value.value, json!(-97.3));
    }
}
