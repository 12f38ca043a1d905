//! The server: listeners, the per-connection driver, and command handlers.

pub mod config;
pub mod connection;
pub(crate) mod command;
pub(crate) mod handlers;
pub(crate) mod sasl;
pub(crate) mod session;

use std::sync::Arc;

use log::{error, info};
use tokio::{net::TcpListener, sync::watch};
use tokio_rustls::TlsAcceptor;

use crate::{
    backend::{Directory, Storage},
    server::{config::ImapConfig, connection::Connection},
};

/// Everything shared between connections: the backend, the configuration,
/// and the TLS acceptor.
pub struct Engine<B> {
    pub backend: Arc<B>,
    pub config: ImapConfig,
    pub tls: Option<TlsAcceptor>,
}

impl<B> std::fmt::Debug for Engine<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("tls", &self.tls.is_some())
            .finish()
    }
}

impl<B> Engine<B>
where
    B: Storage + Directory,
{
    pub fn new(backend: Arc<B>, config: ImapConfig, tls: Option<TlsAcceptor>) -> Arc<Self> {
        Arc::new(Self {
            backend,
            config,
            tls,
        })
    }

    /// Accepts connections until `shutdown` flips to true.
    ///
    /// When `implicit_tls` is set (the `imaps-port` listener), the TLS
    /// handshake runs before the greeting.
    pub async fn serve(
        self: &Arc<Self>,
        listener: TcpListener,
        implicit_tls: bool,
        shutdown: watch::Receiver<bool>,
    ) -> std::io::Result<()> {
        info!(
            "listening on {} ({})",
            listener.local_addr()?,
            if implicit_tls { "imaps" } else { "imap" },
        );

        let mut accept_shutdown = shutdown.clone();

        loop {
            let (socket, peer) = tokio::select! {
                accepted = listener.accept() => accepted?,
                _ = accept_shutdown.changed() => return Ok(()),
            };

            info!("connection from {peer}");

            let engine = Arc::clone(self);
            let shutdown = shutdown.clone();

            tokio::spawn(async move {
                let result = if implicit_tls {
                    match engine.tls.clone() {
                        Some(acceptor) => match acceptor.accept(socket).await {
                            Ok(socket) => {
                                Connection::new(engine, socket, true, shutdown).run().await
                            }
                            Err(err) => {
                                error!("TLS handshake with {peer} failed: {err}");
                                return;
                            }
                        },
                        None => {
                            error!("imaps listener without TLS configuration");
                            return;
                        }
                    }
                } else {
                    Connection::new(engine, socket, false, shutdown).run().await
                };

                match result {
                    Ok(()) => info!("connection from {peer} closed"),
                    Err(err) => info!("connection from {peer} aborted: {err}"),
                }
            });
        }
    }
}
