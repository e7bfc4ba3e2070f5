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

//! Canonical `component` field values shared by the tracing call sites.

pub const COMPONENT_AMQP_ROUTER: &str = "amqp_router";
pub const COMPONENT_HTTP_SERVER: &str = "http_server";
pub const COMPONENT_HTTP_CLIENT: &str = "http_client";
pub const COMPONENT_STATUS: &str = "status_dispatcher";
pub const COMPONENT_STORE: &str = "pubsub_store";

/// Placeholder for absent optional field values.
pub const NONE: &str = "none";
