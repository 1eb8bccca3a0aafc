// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pub/sub provider abstraction.
//!
//! The relay only needs three management calls from the provider. They are
//! expressed as the [`PubSubClient`] trait so the subscription lifecycle can
//! run against SNS in production and against [`MockPubSubClient`] in tests.
//!
//! ```text
//! PubSubClient Trait
//! +-- SnsClient        (SNS Query API, SigV4 signed)
//! +-- MockPubSubClient (in-memory, scripted outcomes)
//! ```

pub mod mock;
pub mod sigv4;
pub mod sns;

pub use mock::{MockPubSubClient, ProviderCall};
pub use sns::SnsClient;

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Provider call errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("provider returned {code}: {message}")]
    Api { code: String, message: String },

    #[error("malformed provider response: {0}")]
    Response(String),

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("provider credentials missing: {0}")]
    Credentials(String),
}

/// Management calls the relay issues to the pub/sub provider.
pub trait PubSubClient: Send + Sync + 'static {
    /// Request a subscription of `endpoint` to `topic_id`.
    ///
    /// Returns whatever subscription identifier the provider reports at this
    /// stage (SNS answers "pending confirmation" until the endpoint confirms).
    fn subscribe(
        &self,
        topic_id: &str,
        endpoint: &str,
    ) -> impl Future<Output = Result<Option<String>, ProviderError>> + Send;

    /// Confirm a pending subscription with the token the provider delivered.
    ///
    /// Returns the subscription handle used later to unsubscribe.
    fn confirm_subscription(
        &self,
        topic_id: &str,
        token: &str,
    ) -> impl Future<Output = Result<String, ProviderError>> + Send;

    /// Remove a confirmed subscription.
    fn unsubscribe(
        &self,
        subscription_handle: &str,
    ) -> impl Future<Output = Result<(), ProviderError>> + Send;
}
