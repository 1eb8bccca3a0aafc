// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SPARQL update dispatch.
//!
//! Triples are rendered as one `INSERT DATA` statement and POSTed as the
//! `update` form field to the triple store. Deciding whether the store
//! accepted the update is delegated to an [`UpdateClassifier`]; the default
//! one looks for the `Update succeeded` marker in the response body.

use crate::config::RelayConfig;
use crate::rdf::{insert_data, RdfError, Triple};
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

/// Body marker the default classifier treats as success.
pub const UPDATE_SUCCEEDED_MARKER: &str = "Update succeeded";

/// Why an update did not reach the store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchFailure {
    #[error("update rejected (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("update request failed: {0}")]
    Transport(String),

    #[error("triples are not valid RDF: {0}")]
    Serialize(#[from] RdfError),
}

/// Result of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The store accepted the update.
    Success,
    /// Dry-run: the statement was logged, not sent.
    DryRun,
    Failure(DispatchFailure),
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DispatchOutcome::Success | DispatchOutcome::DryRun)
    }
}

/// Decides whether an update response means success.
pub trait UpdateClassifier: Send + Sync {
    fn is_success(&self, status: u16, body: &str) -> bool;
}

/// Success iff the body contains a marker string.
#[derive(Debug, Clone)]
pub struct BodyMarkerClassifier {
    marker: String,
}

impl BodyMarkerClassifier {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }
}

impl Default for BodyMarkerClassifier {
    fn default() -> Self {
        Self::new(UPDATE_SUCCEEDED_MARKER)
    }
}

impl UpdateClassifier for BodyMarkerClassifier {
    fn is_success(&self, _status: u16, body: &str) -> bool {
        body.contains(&self.marker)
    }
}

/// Sends triple batches to the SPARQL update endpoint.
pub struct UpdateDispatcher {
    client: Client,
    endpoint: String,
    dry_run: bool,
    classifier: Box<dyn UpdateClassifier>,
}

impl UpdateDispatcher {
    pub fn new(endpoint: impl Into<String>, dry_run: bool) -> Result<Self, DispatchFailure> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DispatchFailure::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            dry_run,
            classifier: Box::new(BodyMarkerClassifier::default()),
        })
    }

    pub fn from_config(config: &RelayConfig) -> Result<Self, DispatchFailure> {
        Self::new(&config.update_endpoint, config.fake_publish)
    }

    /// Replace the response classifier.
    pub fn with_classifier(mut self, classifier: impl UpdateClassifier + 'static) -> Self {
        self.classifier = Box::new(classifier);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Insert a batch of triples. Never retries.
    pub async fn dispatch(&self, triples: &[Triple]) -> DispatchOutcome {
        if triples.is_empty() {
            tracing::debug!("no triples to dispatch");
            return DispatchOutcome::Success;
        }
        let outcome = match insert_data(triples) {
            Ok(statement) => self.send_update(&statement).await,
            Err(e) => DispatchOutcome::Failure(e.into()),
        };

        match &outcome {
            DispatchOutcome::Success => {
                tracing::info!(triples = triples.len(), "SPARQL update succeeded");
            }
            DispatchOutcome::DryRun => {
                tracing::info!(triples = triples.len(), "dry-run, SPARQL update not sent");
            }
            DispatchOutcome::Failure(failure) => {
                tracing::error!(triples = triples.len(), "SPARQL update failed: {}", failure);
            }
        }
        outcome
    }

    /// Send one update statement.
    pub async fn send_update(&self, statement: &str) -> DispatchOutcome {
        tracing::debug!("SPARQL statement: {}", statement);

        if self.dry_run {
            return DispatchOutcome::DryRun;
        }

        let response = match self
            .client
            .post(&self.endpoint)
            .form(&[("update", statement)])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return DispatchOutcome::Failure(DispatchFailure::Transport(e.to_string())),
        };

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return DispatchOutcome::Failure(DispatchFailure::Transport(e.to_string())),
        };

        if self.classifier.is_success(status, &body) {
            DispatchOutcome::Success
        } else {
            DispatchOutcome::Failure(DispatchFailure::Rejected { status, body })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdf::Term;
    use axum::{extract::State, routing::post, Form, Router};
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    type Received = Arc<Mutex<Vec<String>>>;

    /// Fake triple store answering every update with `reply`.
    async fn spawn_store(reply: &'static str) -> (String, Received) {
        async fn update(
            State((received, reply)): State<(Received, &'static str)>,
            Form(form): Form<HashMap<String, String>>,
        ) -> &'static str {
            received.lock().push(form.get("update").cloned().unwrap_or_default());
            reply
        }

        let received: Received = Arc::default();
        let app = Router::new()
            .route("/update", post(update))
            .with_state((received.clone(), reply));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/update", addr), received)
    }

    fn triples() -> Vec<Triple> {
        vec![Triple::new(
            "http://ex.org/e/m1",
            "http://ex.org/e#status",
            Term::plain("ok"),
        )]
    }

    #[test]
    fn test_body_marker_classifier() {
        let c = BodyMarkerClassifier::default();
        assert!(c.is_success(200, "<p>Update succeeded</p>"));
        assert!(c.is_success(200, "Update succeeded"));
        assert!(!c.is_success(200, "Update failed"));
        assert!(!c.is_success(500, ""));
    }

    #[tokio::test]
    async fn test_dispatch_success() {
        let (endpoint, received) = spawn_store("<html>Update succeeded</html>").await;
        let dispatcher = UpdateDispatcher::new(endpoint, false).unwrap();

        assert_eq!(dispatcher.dispatch(&triples()).await, DispatchOutcome::Success);

        let received = received.lock();
        assert_eq!(received.len(), 1);
        assert_eq!(
            received[0],
            "INSERT DATA {\n<http://ex.org/e/m1> <http://ex.org/e#status> \"ok\" .\n}"
        );
    }

    #[tokio::test]
    async fn test_dispatch_failure_keeps_body() {
        let (endpoint, _) = spawn_store("MALFORMED QUERY").await;
        let dispatcher = UpdateDispatcher::new(endpoint, false).unwrap();

        let outcome = dispatcher.dispatch(&triples()).await;
        assert_eq!(
            outcome,
            DispatchOutcome::Failure(DispatchFailure::Rejected {
                status: 200,
                body: "MALFORMED QUERY".into()
            })
        );
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn test_invalid_rdf_never_sent() {
        let (endpoint, received) = spawn_store("Update succeeded").await;
        let dispatcher = UpdateDispatcher::new(endpoint, false).unwrap();

        let mut batch = triples();
        batch.push(Triple::new(
            "http://ex.org/e/m1",
            "http://ex.org/e#count",
            Term::typed("1", "ex:int"),
        ));
        assert_eq!(
            dispatcher.dispatch(&batch).await,
            DispatchOutcome::Failure(DispatchFailure::Serialize(RdfError::Datatype(
                "ex:int".into()
            )))
        );
        assert!(received.lock().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_never_sends() {
        let (endpoint, received) = spawn_store("Update succeeded").await;
        let dispatcher = UpdateDispatcher::new(endpoint, true).unwrap();

        let outcome = dispatcher.dispatch(&triples()).await;
        assert_eq!(outcome, DispatchOutcome::DryRun);
        assert!(outcome.is_success());
        assert!(received.lock().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_store_is_transport_failure() {
        // Bind then drop to get a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let dispatcher = UpdateDispatcher::new(format!("http://{}/update", addr), false).unwrap();
        assert!(matches!(
            dispatcher.dispatch(&triples()).await,
            DispatchOutcome::Failure(DispatchFailure::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_custom_classifier() {
        struct StatusOnly;
        impl UpdateClassifier for StatusOnly {
            fn is_success(&self, status: u16, _body: &str) -> bool {
                status == 204 || status == 200
            }
        }

        let (endpoint, _) = spawn_store("").await;
        let dispatcher = UpdateDispatcher::new(endpoint, false)
            .unwrap()
            .with_classifier(StatusOnly);
        assert_eq!(dispatcher.dispatch(&triples()).await, DispatchOutcome::Success);
    }
}
