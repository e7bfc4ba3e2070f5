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

//! Structured-logging vocabulary for the crate.
//!
//! All `tracing` calls name a canonical event from [`events`] and tag the
//! emitting component with a constant from [`fields`], so logs stay greppable
//! across the AMQP and HTTP transports.

pub mod events;
pub mod fields;
