// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Webhook payloads.
//!
//! SNS posts a JSON envelope whose `Type` tells confirmations and
//! notifications apart. For notifications, `Message` is itself a
//! JSON-encoded object whose members become the notification attributes.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Payload parse errors.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{kind} payload is missing {field}")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },

    #[error("Message is not a JSON object: {0}")]
    Message(String),
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "Type")]
    kind: Option<String>,
    #[serde(rename = "TopicArn")]
    topic_arn: Option<String>,
    #[serde(rename = "Token")]
    token: Option<String>,
    #[serde(rename = "MessageId")]
    message_id: Option<String>,
    #[serde(rename = "Message")]
    message: Option<String>,
    #[serde(rename = "SubscribeURL")]
    subscribe_url: Option<String>,
}

/// A `SubscriptionConfirmation` webhook call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionConfirmation {
    pub topic_id: String,
    pub token: String,
    pub subscribe_url: Option<String>,
}

/// A `Notification` webhook call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub topic_id: String,
    pub message_id: String,
    /// Attribute name and stringified value, in message order.
    pub attributes: Vec<(String, String)>,
}

impl Notification {
    /// Build a notification from a decoded `Message` object.
    pub fn from_message(
        topic_id: impl Into<String>,
        message_id: impl Into<String>,
        message: &str,
    ) -> Result<Self, NotificationError> {
        let value: Value = serde_json::from_str(message)?;
        let Value::Object(map) = value else {
            return Err(NotificationError::Message(message.chars().take(64).collect()));
        };

        Ok(Self {
            topic_id: topic_id.into(),
            message_id: message_id.into(),
            attributes: map
                .into_iter()
                .map(|(name, value)| (name, stringify(&value)))
                .collect(),
        })
    }
}

/// Textual form of an attribute value. Structured values are kept as
/// compact JSON text.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A decoded webhook call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookMessage {
    SubscriptionConfirmation(SubscriptionConfirmation),
    Notification(Notification),
    /// Any other message type (e.g. `UnsubscribeConfirmation`).
    Other { kind: Option<String> },
}

impl WebhookMessage {
    /// Parse a complete request body.
    pub fn parse(body: &[u8]) -> Result<Self, NotificationError> {
        let envelope: Envelope = serde_json::from_slice(body)?;

        match envelope.kind.as_deref() {
            Some("SubscriptionConfirmation") => {
                const KIND: &str = "SubscriptionConfirmation";
                Ok(Self::SubscriptionConfirmation(SubscriptionConfirmation {
                    topic_id: envelope.topic_arn.ok_or(NotificationError::MissingField {
                        kind: KIND,
                        field: "TopicArn",
                    })?,
                    token: envelope.token.ok_or(NotificationError::MissingField {
                        kind: KIND,
                        field: "Token",
                    })?,
                    subscribe_url: envelope.subscribe_url,
                }))
            }
            Some("Notification") => {
                const KIND: &str = "Notification";
                let topic_id = envelope.topic_arn.ok_or(NotificationError::MissingField {
                    kind: KIND,
                    field: "TopicArn",
                })?;
                let message_id = envelope.message_id.ok_or(NotificationError::MissingField {
                    kind: KIND,
                    field: "MessageId",
                })?;
                let message = envelope.message.ok_or(NotificationError::MissingField {
                    kind: KIND,
                    field: "Message",
                })?;
                Notification::from_message(topic_id, message_id, &message)
                    .map(Self::Notification)
            }
            _ => Ok(Self::Other {
                kind: envelope.kind,
            }),
        }
    }
}
