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

//! Status-probe correlation.
//!
//! A probe is fire-and-forget on the wire; the caller parks on a one-shot
//! channel registered against a sequence id, and the receiver task resolves
//! that id when the reply arrives. Each slot resolves at most once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{Result, TransportError};
use crate::event::CloudEvent;
use crate::observability::{events, fields};

const COMPONENT: &str = fields::COMPONENT_STATUS;

/// Lifecycle of one status probe, driven by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeState {
    Idle,
    ProbeSent,
    Replied,
    TimedOut,
}

/// Maps probe sequence ids to parked reply channels.
pub struct StatusDispatcher {
    next_seq: AtomicU64,
    waiters: Mutex<HashMap<u64, oneshot::Sender<CloudEvent>>>,
}

impl StatusDispatcher {
    pub fn new() -> Self {
        Self {
            next_seq: AtomicU64::new(1),
            waiters: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a fresh probe slot, returning its sequence id and the
    /// channel the reply will arrive on.
    pub fn register(&self) -> (u64, oneshot::Receiver<CloudEvent>) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.waiters
            .lock()
            .expect("dispatcher lock poisoned")
            .insert(seq, tx);
        (seq, rx)
    }

    /// Delivers a reply to the waiter parked on `seq`, clearing the slot.
    /// Returns false when no waiter exists (late or duplicate reply).
    pub fn resolve(&self, seq: u64, reply: CloudEvent) -> bool {
        let waiter = self
            .waiters
            .lock()
            .expect("dispatcher lock poisoned")
            .remove(&seq);
        match waiter {
            Some(tx) => {
                debug!(
                    event = events::STATUS_PROBE_REPLIED,
                    component = COMPONENT,
                    seq,
                    event_id = reply.id(),
                );
                tx.send(reply).is_ok()
            }
            None => {
                warn!(
                    event = events::STATUS_RESOLVE_NO_WAITER,
                    component = COMPONENT,
                    seq,
                    "dropping uncorrelated status reply"
                );
                false
            }
        }
    }

    /// Drops the slot for `seq` without delivering, after a caller timeout.
    pub fn abandon(&self, seq: u64) {
        self.waiters
            .lock()
            .expect("dispatcher lock poisoned")
            .remove(&seq);
    }

    /// Awaits the reply for `seq` with a caller-applied deadline.
    pub async fn wait(
        &self,
        seq: u64,
        rx: oneshot::Receiver<CloudEvent>,
        deadline: Duration,
    ) -> Result<CloudEvent> {
        match timeout(deadline, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(TransportError::Receive(format!(
                "status probe {seq} channel dropped"
            ))),
            Err(_) => {
                warn!(
                    event = events::STATUS_PROBE_TIMEOUT,
                    component = COMPONENT,
                    seq,
                );
                self.abandon(seq);
                Err(TransportError::Receive(format!(
                    "status probe {seq} timed out"
                )))
            }
        }
    }
}

impl Default for StatusDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
