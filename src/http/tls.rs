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

//! Mutual-TLS listener plumbing.
//!
//! The listener is TLS 1.3 only and requires a client certificate anchored to
//! the configured root CA. Accepted streams are served through hyper's auto
//! connection builder with the axum router behind a tower-to-hyper bridge.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::service::TowerToHyperService;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig, SupportedCipherSuite};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, warn};

use crate::config::TlsConfig;
use crate::error::{Result, TransportError};
use crate::observability::{events, fields};

const COMPONENT: &str = fields::COMPONENT_HTTP_SERVER;

fn read_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = BufReader::new(File::open(path)?);
    rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|err| TransportError::Tls(format!("{}: {err}", path.display())))
}

fn read_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let mut reader = BufReader::new(File::open(path)?);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|err| TransportError::Tls(format!("{}: {err}", path.display())))?
        .ok_or_else(|| TransportError::Tls(format!("{}: no private key found", path.display())))
}

/// Builds the rustls server configuration for the mutual-TLS listener.
pub fn load_server_config(tls: &TlsConfig) -> Result<Arc<ServerConfig>> {
    let certs = read_certs(&tls.cert_path)?;
    let key = read_key(&tls.key_path)?;

    let mut roots = RootCertStore::empty();
    for ca in read_certs(&tls.ca_path)? {
        roots
            .add(ca)
            .map_err(|err| TransportError::Tls(err.to_string()))?;
    }
    let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
        .build()
        .map_err(|err| TransportError::Tls(err.to_string()))?;

    let mut provider = rustls::crypto::aws_lc_rs::default_provider();
    provider
        .cipher_suites
        .retain(|suite| matches!(suite, SupportedCipherSuite::Tls13(_)));

    let config = ServerConfig::builder_with_provider(Arc::new(provider))
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(|err| TransportError::Tls(err.to_string()))?
        .with_client_cert_verifier(verifier)
        .with_single_cert(certs, key)
        .map_err(|err| TransportError::Tls(err.to_string()))?;
    Ok(Arc::new(config))
}

/// Accept loop for the TLS listener; each accepted stream gets its own
/// connection task.
pub(crate) async fn serve_tls(
    listener: TcpListener,
    config: Arc<ServerConfig>,
    app: Router,
) -> Result<()> {
    let acceptor = TlsAcceptor::from(config);
    loop {
        let (stream, peer) = listener.accept().await?;
        let acceptor = acceptor.clone();
        let app = app.clone();
        tokio::spawn(async move {
            let stream = match acceptor.accept(stream).await {
                Ok(stream) => stream,
                Err(err) => {
                    warn!(
                        event = events::HTTP_TLS_HANDSHAKE_FAILED,
                        component = COMPONENT,
                        peer = %peer,
                        err = %err,
                    );
                    return;
                }
            };
            let service = TowerToHyperService::new(app);
            if let Err(err) = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                debug!(
                    component = COMPONENT,
                    peer = %peer,
                    err = %err,
                    "connection ended with error"
                );
            }
        });
    }
}
