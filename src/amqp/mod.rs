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

//! AMQP 1.0 transport: broker link abstraction and the dispatch router.

mod connection;
mod router;

pub use connection::{
    BrokerConnection, BrokerReceiver, BrokerSender, DeliveryOutcome, QdrConnection,
};
pub use router::{AmqpRouter, AmqpRouterHandle};
