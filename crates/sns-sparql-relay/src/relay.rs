// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Relay assembly and shutdown sequencing.
//!
//! A [`RelayConfig`] value produces one fresh set of components: registry,
//! lifecycle manager, dispatcher and webhook server. Reloading means
//! shutting one set down and starting another.
//!
//! Shutdown order matters: confirmations stop being accepted, subscriptions
//! are drained (the provider still needs the listener to deliver
//! unsubscribe traffic), then the listener closes and the registry is
//! cleared.

use crate::config::{ConfigError, RelayConfig};
use crate::dispatch::{DispatchFailure, UpdateDispatcher};
use crate::provider::PubSubClient;
use crate::receiver::{router, Pipeline};
use crate::registry::TopicRegistry;
use crate::subscription::{SubscriptionManager, UnsubscribeReport};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Relay startup errors.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Dispatcher error: {0}")]
    Dispatch(#[from] DispatchFailure),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Entry point for starting a relay.
pub struct Relay;

impl Relay {
    /// Bind `BindAddress:PrivatePort`, serve the webhook and subscribe to
    /// every configured topic.
    pub async fn start<P: PubSubClient>(
        config: RelayConfig,
        client: Arc<P>,
    ) -> Result<RelayHandle<P>, RelayError> {
        let listener = TcpListener::bind(config.listen_addr()).await?;
        Self::start_on(config, client, listener).await
    }

    /// Like [`start`](Self::start), on an already bound listener.
    pub async fn start_on<P: PubSubClient>(
        config: RelayConfig,
        client: Arc<P>,
        listener: TcpListener,
    ) -> Result<RelayHandle<P>, RelayError> {
        config.validate()?;
        if config.use_nat_pmp {
            tracing::warn!("UseNATPNP is set but NAT port mapping is not supported, ignoring");
        }

        let registry = Arc::new(TopicRegistry::from_config(&config));
        if registry.is_empty() {
            tracing::warn!("No SNS topics configured, every notification will be ignored");
        }
        let subscriptions = Arc::new(SubscriptionManager::new(
            client,
            registry.clone(),
            &config.endpoint_url,
            Duration::from_secs(config.provider_timeout_secs),
        ));
        let dispatcher = Arc::new(UpdateDispatcher::from_config(&config)?);
        if dispatcher.is_dry_run() {
            tracing::warn!("FakePublish is set, SPARQL updates will only be logged");
        }
        let app = router(Arc::new(Pipeline::new(subscriptions.clone(), dispatcher)));

        let local_addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });
        tracing::info!(
            "Webhook listening on http://{} ({} topics)",
            local_addr,
            registry.len()
        );

        subscriptions.subscribe_all().await;

        Ok(RelayHandle {
            grace: Duration::from_secs(config.reload_grace_secs),
            config,
            registry,
            subscriptions,
            local_addr,
            shutdown_tx,
            server,
        })
    }
}

/// A running relay.
pub struct RelayHandle<P: PubSubClient> {
    config: RelayConfig,
    registry: Arc<TopicRegistry>,
    subscriptions: Arc<SubscriptionManager<P>>,
    local_addr: SocketAddr,
    grace: Duration,
    shutdown_tx: oneshot::Sender<()>,
    server: JoinHandle<std::io::Result<()>>,
}

impl<P: PubSubClient> RelayHandle<P> {
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Address the webhook listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &Arc<TopicRegistry> {
        &self.registry
    }

    pub fn subscriptions(&self) -> &Arc<SubscriptionManager<P>> {
        &self.subscriptions
    }

    /// Stop accepting confirmations, drain subscriptions, wait the grace
    /// period, close the listener and clear the registry.
    pub async fn shutdown(self) -> UnsubscribeReport {
        tracing::info!("Shutting down relay");
        self.subscriptions.close();
        let report = self.subscriptions.unsubscribe_all().await;

        if !self.grace.is_zero() {
            tracing::debug!("Waiting {:?} before closing the listener", self.grace);
            tokio::time::sleep(self.grace).await;
        }

        let _ = self.shutdown_tx.send(());
        match self.server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Webhook server error: {}", e),
            Err(e) => tracing::warn!("Webhook server task failed: {}", e),
        }

        self.registry.clear_all();
        tracing::info!("Relay stopped");
        report
    }
}
