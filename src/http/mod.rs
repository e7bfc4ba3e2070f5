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

//! HTTP(S) transport: point-to-point webhook delivery with a registration
//! handshake instead of broker links.

mod client;
mod server;
mod tls;

pub use client::{build_client, get, post, HttpSender};
pub use server::{HttpServer, HttpServerHandle};
pub use tls::load_server_config;
