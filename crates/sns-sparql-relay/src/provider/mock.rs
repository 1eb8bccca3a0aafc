// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-memory provider for tests and `--mock` runs.

use super::{ProviderError, PubSubClient};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// A call received by [`MockPubSubClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    Subscribe { topic_id: String, endpoint: String },
    Confirm { topic_id: String, token: String },
    Unsubscribe { handle: String },
}

#[derive(Default)]
struct Script {
    failing_topics: HashSet<String>,
    failing_tokens: HashSet<String>,
    failing_handles: HashSet<String>,
    hanging_handles: HashSet<String>,
    unsubscribe_delays: HashMap<String, Duration>,
    confirm_delays: HashMap<String, Duration>,
}

/// Scripted in-memory [`PubSubClient`].
///
/// Confirmations return the handle `"<topic_id>:<token>"`.
#[derive(Default)]
pub struct MockPubSubClient {
    calls: Mutex<Vec<ProviderCall>>,
    script: Mutex<Script>,
}

impl MockPubSubClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `subscribe` fail for a topic.
    pub fn fail_subscribe(&self, topic_id: &str) {
        self.script.lock().failing_topics.insert(topic_id.to_string());
    }

    /// Make `confirm_subscription` fail for a token.
    pub fn fail_confirm(&self, token: &str) {
        self.script.lock().failing_tokens.insert(token.to_string());
    }

    /// Make `unsubscribe` fail for a handle.
    pub fn fail_unsubscribe(&self, handle: &str) {
        self.script.lock().failing_handles.insert(handle.to_string());
    }

    /// Make `unsubscribe` never complete for a handle.
    pub fn hang_unsubscribe(&self, handle: &str) {
        self.script.lock().hanging_handles.insert(handle.to_string());
    }

    /// Delay the completion of `unsubscribe` for a handle.
    pub fn delay_unsubscribe(&self, handle: &str, delay: Duration) {
        self.script
            .lock()
            .unsubscribe_delays
            .insert(handle.to_string(), delay);
    }

    /// Delay the completion of `confirm_subscription` for a token.
    pub fn delay_confirm(&self, token: &str, delay: Duration) {
        self.script
            .lock()
            .confirm_delays
            .insert(token.to_string(), delay);
    }

    /// All calls received so far, in arrival order.
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().clone()
    }

    /// Handles passed to `unsubscribe`, in completion order.
    pub fn unsubscribed(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                ProviderCall::Unsubscribe { handle } => Some(handle.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: ProviderCall) {
        self.calls.lock().push(call);
    }
}

impl PubSubClient for MockPubSubClient {
    async fn subscribe(&self, topic_id: &str, endpoint: &str) -> Result<Option<String>, ProviderError> {
        self.record(ProviderCall::Subscribe {
            topic_id: topic_id.to_string(),
            endpoint: endpoint.to_string(),
        });
        if self.script.lock().failing_topics.contains(topic_id) {
            return Err(ProviderError::Api {
                code: "NotFound".into(),
                message: format!("Topic does not exist: {}", topic_id),
            });
        }
        Ok(Some("pending confirmation".to_string()))
    }

    async fn confirm_subscription(&self, topic_id: &str, token: &str) -> Result<String, ProviderError> {
        self.record(ProviderCall::Confirm {
            topic_id: topic_id.to_string(),
            token: token.to_string(),
        });
        let delay = self.script.lock().confirm_delays.get(token).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.script.lock().failing_tokens.contains(token) {
            return Err(ProviderError::Api {
                code: "InvalidParameter".into(),
                message: "Invalid token".into(),
            });
        }
        Ok(format!("{}:{}", topic_id, token))
    }

    async fn unsubscribe(&self, subscription_handle: &str) -> Result<(), ProviderError> {
        let (delay, hang, fail) = {
            let script = self.script.lock();
            (
                script.unsubscribe_delays.get(subscription_handle).copied(),
                script.hanging_handles.contains(subscription_handle),
                script.failing_handles.contains(subscription_handle),
            )
        };
        if hang {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.record(ProviderCall::Unsubscribe {
            handle: subscription_handle.to_string(),
        });
        if fail {
            return Err(ProviderError::Http("connection reset".into()));
        }
        Ok(())
    }
}
