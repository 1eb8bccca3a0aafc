// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Webhook receiver.
//!
//! One endpoint on every path. `POST` bodies are read in full, acknowledged
//! with an empty `200` and processed on a spawned task; every other method
//! gets the same `200` without processing. Application-level failures are
//! only logged, never reported through the HTTP status.

use crate::dispatch::{DispatchOutcome, UpdateDispatcher};
use crate::mapper::{MapOutcome, TripleMapper};
use crate::notification::{Notification, WebhookMessage};
use crate::provider::PubSubClient;
use crate::registry::TopicRegistry;
use crate::subscription::SubscriptionManager;
use axum::extract::{DefaultBodyLimit, State};
use axum::{body::Bytes, http::Method, http::StatusCode, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// What happened to one webhook payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadOutcome {
    Confirmed { topic_id: String, handle: String },
    ConfirmationFailed { topic_id: String },
    Dispatched(DispatchOutcome),
    Suppressed { topic_id: String },
    UnknownTopic(String),
    /// Message types the relay does not act on.
    Ignored { kind: Option<String> },
    Malformed,
}

/// Routes decoded payloads to the lifecycle manager or through
/// mapper and dispatcher.
pub struct Pipeline<P: PubSubClient> {
    registry: Arc<TopicRegistry>,
    subscriptions: Arc<SubscriptionManager<P>>,
    dispatcher: Arc<UpdateDispatcher>,
}

impl<P: PubSubClient> Pipeline<P> {
    pub fn new(subscriptions: Arc<SubscriptionManager<P>>, dispatcher: Arc<UpdateDispatcher>) -> Self {
        Self {
            registry: subscriptions.registry().clone(),
            subscriptions,
            dispatcher,
        }
    }

    /// Process one complete request body.
    pub async fn handle_payload(&self, body: &[u8]) -> PayloadOutcome {
        let message = match WebhookMessage::parse(body) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(bytes = body.len(), "Dropping webhook payload: {}", e);
                return PayloadOutcome::Malformed;
            }
        };

        match message {
            WebhookMessage::SubscriptionConfirmation(confirmation) => {
                tracing::info!(
                    topic = %confirmation.topic_id,
                    "Received subscription confirmation token"
                );
                match self
                    .subscriptions
                    .on_confirmation(&confirmation.topic_id, &confirmation.token)
                    .await
                {
                    Ok(handle) => PayloadOutcome::Confirmed {
                        topic_id: confirmation.topic_id,
                        handle,
                    },
                    Err(_) => PayloadOutcome::ConfirmationFailed {
                        topic_id: confirmation.topic_id,
                    },
                }
            }
            WebhookMessage::Notification(notification) => self.handle_notification(notification).await,
            WebhookMessage::Other { kind } => {
                tracing::info!("Ignoring webhook message of type {:?}", kind);
                PayloadOutcome::Ignored { kind }
            }
        }
    }

    async fn handle_notification(&self, notification: Notification) -> PayloadOutcome {
        let topic = match self.registry.lookup(&notification.topic_id) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(message_id = %notification.message_id, "Dropping notification: {}", e);
                return PayloadOutcome::UnknownTopic(notification.topic_id);
            }
        };

        tracing::debug!(
            topic = %notification.topic_id,
            message_id = %notification.message_id,
            attributes = notification.attributes.len(),
            "Notification received"
        );

        match TripleMapper::map(&notification, &topic) {
            MapOutcome::Emit(triples) => {
                PayloadOutcome::Dispatched(self.dispatcher.dispatch(&triples).await)
            }
            MapOutcome::Suppressed { field, value } => {
                tracing::info!(
                    topic = %notification.topic_id,
                    message_id = %notification.message_id,
                    "Filtered out: {} is {:?}",
                    field,
                    value
                );
                PayloadOutcome::Suppressed {
                    topic_id: notification.topic_id,
                }
            }
        }
    }
}

/// Build the webhook router.
pub fn router<P: PubSubClient>(pipeline: Arc<Pipeline<P>>) -> Router {
    Router::new()
        .fallback(webhook::<P>)
        // Every request is acknowledged with 200, whatever its size.
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .with_state(pipeline)
}

async fn webhook<P: PubSubClient>(
    State(pipeline): State<Arc<Pipeline<P>>>,
    method: Method,
    body: Bytes,
) -> StatusCode {
    if method != Method::POST {
        tracing::debug!(%method, "Acknowledging non-POST request");
        return StatusCode::OK;
    }

    tokio::spawn(async move {
        pipeline.handle_payload(&body).await;
    });
    StatusCode::OK
}
