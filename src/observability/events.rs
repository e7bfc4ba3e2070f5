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

//! Canonical structured event names used across `cne-transport`.

// AMQP router lifecycle events.
pub const SENDER_CREATE: &str = "sender_create";
pub const SENDER_REUSE: &str = "sender_reuse";
pub const SENDER_CREATE_FAILED: &str = "sender_create_failed";
pub const SENDER_DELETE: &str = "sender_delete";
pub const LISTENER_CREATE: &str = "listener_create";
pub const LISTENER_REUSE: &str = "listener_reuse";
pub const LISTENER_CREATE_FAILED: &str = "listener_create_failed";
pub const LISTENER_DELETE: &str = "listener_delete";

// AMQP delivery events.
pub const DELIVERY_ATTEMPT: &str = "delivery_attempt";
pub const DELIVERY_ACCEPTED: &str = "delivery_accepted";
pub const DELIVERY_REJECTED: &str = "delivery_rejected";
pub const DELIVERY_RELEASED: &str = "delivery_released";
pub const DELIVERY_TIMEOUT: &str = "delivery_timeout";
pub const DELIVERY_NO_SENDER: &str = "delivery_no_sender";
pub const RECEIVE_OK: &str = "receive_ok";
pub const RECEIVE_DECODE_FAILED: &str = "receive_decode_failed";
pub const RECEIVE_LINK_CLOSED: &str = "receive_link_closed";

// Status sub-protocol events.
pub const STATUS_PROBE_SENT: &str = "status_probe_sent";
pub const STATUS_PROBE_REPLIED: &str = "status_probe_replied";
pub const STATUS_PROBE_TIMEOUT: &str = "status_probe_timeout";
pub const STATUS_RESOLVE_NO_WAITER: &str = "status_resolve_no_waiter";

// HTTP server and registration events.
pub const HTTP_SERVE_START: &str = "http_serve_start";
pub const HTTP_SERVE_STOPPED: &str = "http_serve_stopped";
pub const HTTP_TLS_HANDSHAKE_FAILED: &str = "http_tls_handshake_failed";
pub const REGISTRATION_START: &str = "registration_start";
pub const REGISTRATION_OK: &str = "registration_ok";
pub const REGISTRATION_FAILED: &str = "registration_failed";
pub const LIVENESS_CHECK_FAILED: &str = "liveness_check_failed";
pub const EVENT_POST_OK: &str = "event_post_ok";
pub const EVENT_POST_FAILED: &str = "event_post_failed";
pub const EVENT_RECEIVED: &str = "event_received";
pub const CURRENT_STATE_UNKNOWN_RESOURCE: &str = "current_state_unknown_resource";

// Bus and store events.
pub const BUS_SEND_FAILED: &str = "bus_send_failed";
pub const BUS_CLOSED: &str = "bus_closed";
pub const STORE_LOAD_OK: &str = "store_load_ok";
pub const STORE_LOAD_EMPTY: &str = "store_load_empty";
pub const STORE_PERSIST_FAILED: &str = "store_persist_failed";
