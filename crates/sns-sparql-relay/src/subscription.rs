// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Subscription lifecycle.
//!
//! ```text
//! Unsubscribed --subscribe--> SubscriptionRequested --confirm--> Confirmed
//! Confirmed --unsubscribe--> UnsubscriptionRequested --done--> Unsubscribed
//! ```
//!
//! [`SubscriptionManager`] is the only writer of subscription state in the
//! [`TopicRegistry`]. Every provider call is bounded by a timeout, so
//! draining unsubscriptions always terminates.
//!
//! Once [`close`](SubscriptionManager::close) has been called, new
//! confirmations are refused and a confirmation that was already in flight
//! unsubscribes its own handle, so a drain never leaves a live
//! subscription behind.

use crate::provider::{ProviderError, PubSubClient};
use crate::registry::{RegistryError, SubscriptionState, TopicRegistry};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;

/// Confirmation errors.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("relay is shutting down, confirmation refused")]
    Closed,
}

/// Outcome of draining every confirmed subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnsubscribeReport {
    /// Unsubscribe calls issued.
    pub requested: usize,
    pub succeeded: usize,
    /// Failed, timed out or aborted calls.
    pub failed: usize,
}

impl UnsubscribeReport {
    /// Calls that have completed, successfully or not.
    pub fn completed(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Drives subscribe / confirm / unsubscribe against the provider.
pub struct SubscriptionManager<P: PubSubClient> {
    client: Arc<P>,
    registry: Arc<TopicRegistry>,
    callback_url: String,
    call_timeout: Duration,
    closed: AtomicBool,
}

impl<P: PubSubClient> SubscriptionManager<P> {
    pub fn new(
        client: Arc<P>,
        registry: Arc<TopicRegistry>,
        callback_url: impl Into<String>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            client,
            registry,
            callback_url: callback_url.into(),
            call_timeout,
            closed: AtomicBool::new(false),
        }
    }

    pub fn registry(&self) -> &Arc<TopicRegistry> {
        &self.registry
    }

    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }

    /// Refuse confirmations from now on. Called before the final drain.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Request a subscription for every `Unsubscribed` topic.
    ///
    /// Returns the number of requests the provider accepted. Failed topics
    /// stay `Unsubscribed` and are not retried.
    pub async fn subscribe_all(&self) -> usize {
        let pending = self
            .registry
            .topics_where(|s| *s == SubscriptionState::Unsubscribed);
        let mut accepted = 0;

        for (topic, _) in pending {
            let topic_id = topic.topic_id.as_str();
            let claimed = self.registry.compare_and_set(
                topic_id,
                &SubscriptionState::Unsubscribed,
                SubscriptionState::SubscriptionRequested,
            );
            if !matches!(claimed, Ok(true)) {
                continue;
            }

            tracing::info!(topic = topic_id, "Subscribing to topic");
            match bounded(
                self.call_timeout,
                self.client.subscribe(topic_id, &self.callback_url),
            )
            .await
            {
                Ok(arn) => {
                    accepted += 1;
                    tracing::info!(
                        topic = topic_id,
                        "Subscription requested, provider answered {}",
                        arn.as_deref().unwrap_or("<nothing>")
                    );
                }
                Err(e) => {
                    tracing::warn!(topic = topic_id, "Subscribe failed: {}", e);
                    // A confirmation may already have moved the topic on.
                    let _ = self.registry.compare_and_set(
                        topic_id,
                        &SubscriptionState::SubscriptionRequested,
                        SubscriptionState::Unsubscribed,
                    );
                }
            }
        }
        accepted
    }

    /// Confirm a subscription with a token the provider delivered.
    ///
    /// Runs whatever the current state is, since the provider may redeliver
    /// confirmations. On failure the state is left unchanged. After
    /// [`close`](Self::close) it fails with [`SubscriptionError::Closed`].
    pub async fn on_confirmation(
        &self,
        topic_id: &str,
        token: &str,
    ) -> Result<String, SubscriptionError> {
        let result = self.confirm(topic_id, token).await;
        if let Err(e) = &result {
            tracing::warn!(topic = topic_id, "Confirmation failed: {}", e);
        }
        result
    }

    async fn confirm(&self, topic_id: &str, token: &str) -> Result<String, SubscriptionError> {
        // Confirming an unknown topic would leave a subscription nobody
        // could unsubscribe later.
        self.registry.lookup(topic_id)?;
        if self.is_closed() {
            return Err(SubscriptionError::Closed);
        }

        let handle = bounded(
            self.call_timeout,
            self.client.confirm_subscription(topic_id, token),
        )
        .await?;

        let previous = self.registry.record_subscription_handle(topic_id, &handle)?;
        match previous {
            Some(old) if old != handle => tracing::warn!(
                topic = topic_id,
                handle = %handle,
                "Confirmed again, replacing handle {}",
                old
            ),
            _ => tracing::info!(topic = topic_id, handle = %handle, "Subscription confirmed"),
        }

        // The drain may have taken its snapshot before this handle landed.
        if self.is_closed() {
            self.withdraw(topic_id, &handle).await;
            return Err(SubscriptionError::Closed);
        }
        Ok(handle)
    }

    /// Unsubscribe a handle confirmed after [`close`](Self::close), unless
    /// the drain already claimed it.
    async fn withdraw(&self, topic_id: &str, handle: &str) {
        let confirmed = SubscriptionState::Confirmed {
            handle: handle.to_string(),
        };
        let requested = SubscriptionState::UnsubscriptionRequested {
            handle: handle.to_string(),
        };
        if !matches!(
            self.registry
                .compare_and_set(topic_id, &confirmed, requested.clone()),
            Ok(true)
        ) {
            return;
        }

        tracing::info!(topic = topic_id, handle = %handle, "Late confirmation, unsubscribing");
        let next = match bounded(self.call_timeout, self.client.unsubscribe(handle)).await {
            Ok(()) => SubscriptionState::Unsubscribed,
            Err(e) => {
                tracing::warn!(topic = topic_id, handle = %handle, "Unsubscribe failed: {}", e);
                confirmed
            }
        };
        let _ = self.registry.compare_and_set(topic_id, &requested, next);
    }

    /// Unsubscribe every confirmed topic and wait for all calls to finish.
    ///
    /// Completions are counted in whatever order they arrive; failures count
    /// too. Topics whose call failed go back to `Confirmed`.
    pub async fn unsubscribe_all(&self) -> UnsubscribeReport {
        let mut tasks = JoinSet::new();
        let mut report = UnsubscribeReport::default();

        let confirmed = self
            .registry
            .topics_where(|s| matches!(s, SubscriptionState::Confirmed { .. }));
        for (topic, state) in confirmed {
            let Some(handle) = state.handle().map(str::to_string) else {
                continue;
            };
            let claimed = self.registry.compare_and_set(
                &topic.topic_id,
                &state,
                SubscriptionState::UnsubscriptionRequested {
                    handle: handle.clone(),
                },
            );
            if !matches!(claimed, Ok(true)) {
                continue;
            }

            tracing::info!(topic = %topic.topic_id, handle = %handle, "Unsubscribing");
            report.requested += 1;

            let client = self.client.clone();
            let limit = self.call_timeout;
            let topic_id = topic.topic_id.clone();
            tasks.spawn(async move {
                let result = bounded(limit, client.unsubscribe(&handle)).await;
                (topic_id, handle, result)
            });
        }

        if report.requested == 0 {
            tracing::debug!("No confirmed subscriptions to remove");
            return report;
        }

        while let Some(joined) = tasks.join_next().await {
            let (topic_id, handle, result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    report.failed += 1;
                    tracing::error!("Unsubscribe task aborted: {}", e);
                    continue;
                }
            };
            let requested = SubscriptionState::UnsubscriptionRequested {
                handle: handle.clone(),
            };

            match result {
                Ok(()) => {
                    report.succeeded += 1;
                    let _ = self.registry.compare_and_set(
                        &topic_id,
                        &requested,
                        SubscriptionState::Unsubscribed,
                    );
                    tracing::info!(topic = %topic_id, handle = %handle, "Unsubscribed");
                }
                Err(e) => {
                    report.failed += 1;
                    let _ = self.registry.compare_and_set(
                        &topic_id,
                        &requested,
                        SubscriptionState::Confirmed {
                            handle: handle.clone(),
                        },
                    );
                    tracing::warn!(topic = %topic_id, handle = %handle, "Unsubscribe failed: {}", e);
                }
            }
        }

        tracing::info!(
            requested = report.requested,
            succeeded = report.succeeded,
            failed = report.failed,
            "All unsubscribe calls completed"
        );
        report
    }

    /// Run [`unsubscribe_all`](Self::unsubscribe_all), then call
    /// `on_complete` exactly once with the report.
    pub async fn unsubscribe_all_then<F>(&self, on_complete: F)
    where
        F: FnOnce(UnsubscribeReport),
    {
        let report = self.unsubscribe_all().await;
        on_complete(report);
    }
}

/// Await a provider call for at most `limit`.
async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, ProviderError>>,
) -> Result<T, ProviderError> {
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Err(ProviderError::Timeout(limit)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{MockPubSubClient, ProviderCall};
    use crate::registry::TopicConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const CALLBACK: &str = "http://relay.example.org:8765/";

    fn manager(
        topics: &[&str],
        call_timeout: Duration,
    ) -> (SubscriptionManager<MockPubSubClient>, Arc<MockPubSubClient>) {
        let registry = Arc::new(TopicRegistry::new(
            topics
                .iter()
                .map(|id| TopicConfig::new(*id, "http://ex.org/e", "http://ex.org#Event"))
                .collect(),
        ));
        let client = Arc::new(MockPubSubClient::new());
        (
            SubscriptionManager::new(client.clone(), registry, CALLBACK, call_timeout),
            client,
        )
    }

    #[tokio::test]
    async fn test_subscribe_all() {
        let (mgr, client) = manager(&["T1", "T2", "T3"], Duration::from_secs(5));
        client.fail_subscribe("T2");

        assert_eq!(mgr.subscribe_all().await, 2);
        assert_eq!(
            mgr.registry().state("T1").unwrap(),
            SubscriptionState::SubscriptionRequested
        );
        assert_eq!(
            mgr.registry().state("T2").unwrap(),
            SubscriptionState::Unsubscribed
        );
        assert_eq!(
            client.calls()[0],
            ProviderCall::Subscribe {
                topic_id: "T1".into(),
                endpoint: CALLBACK.into()
            }
        );

        // Only the failed topic is requested again.
        assert_eq!(mgr.subscribe_all().await, 0);
        let subscribes = client
            .calls()
            .into_iter()
            .filter(|c| matches!(c, ProviderCall::Subscribe { .. }))
            .count();
        assert_eq!(subscribes, 4);
    }

    #[tokio::test]
    async fn test_confirmation_records_handle_in_any_state() {
        let (mgr, client) = manager(&["T1"], Duration::from_secs(5));

        // Never subscribed: a redelivered confirmation is still honored.
        let handle = mgr.on_confirmation("T1", "tok").await.unwrap();
        assert_eq!(handle, "T1:tok");
        assert_eq!(
            mgr.registry().subscription_handle("T1").as_deref(),
            Some("T1:tok")
        );

        client.fail_confirm("bad");
        assert!(matches!(
            mgr.on_confirmation("T1", "bad").await,
            Err(SubscriptionError::Provider(_))
        ));
        assert_eq!(
            mgr.registry().state("T1").unwrap(),
            SubscriptionState::Confirmed {
                handle: "T1:tok".into()
            }
        );
    }

    #[tokio::test]
    async fn test_confirmation_for_unknown_topic_is_dropped() {
        let (mgr, client) = manager(&["T1"], Duration::from_secs(5));
        assert!(matches!(
            mgr.on_confirmation("T9", "tok").await,
            Err(SubscriptionError::Registry(RegistryError::UnknownTopic(_)))
        ));
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_all_without_handles_completes_immediately() {
        let (mgr, client) = manager(&["T1", "T2"], Duration::from_secs(5));
        let fired = AtomicUsize::new(0);

        mgr.unsubscribe_all_then(|report| {
            assert_eq!(report, UnsubscribeReport::default());
            fired.fetch_add(1, Ordering::SeqCst);
        })
        .await;

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(client.calls().is_empty());

        let (empty, _) = manager(&[], Duration::from_secs(5));
        assert_eq!(empty.unsubscribe_all().await.requested, 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_all_counts_out_of_order_completions() {
        let (mgr, client) = manager(&["T1", "T2", "T3"], Duration::from_secs(5));
        for (topic, delay) in [("T1", 60), ("T2", 30), ("T3", 0)] {
            let handle = mgr.on_confirmation(topic, "tok").await.unwrap();
            client.delay_unsubscribe(&handle, Duration::from_millis(delay));
        }

        let fired = AtomicUsize::new(0);
        mgr.unsubscribe_all_then(|report| {
            assert_eq!(report.requested, 3);
            assert_eq!(report.completed(), 3);
            fired.fetch_add(1, Ordering::SeqCst);
        })
        .await;

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(client.unsubscribed(), vec!["T3:tok", "T2:tok", "T1:tok"]);
        for topic in ["T1", "T2", "T3"] {
            assert_eq!(
                mgr.registry().state(topic).unwrap(),
                SubscriptionState::Unsubscribed
            );
        }
    }

    #[tokio::test]
    async fn test_unsubscribe_failures_count_toward_completion() {
        let (mgr, client) = manager(&["T1", "T2", "T3"], Duration::from_millis(100));
        for topic in ["T1", "T2", "T3"] {
            mgr.on_confirmation(topic, "tok").await.unwrap();
        }
        client.fail_unsubscribe("T1:tok");
        client.hang_unsubscribe("T2:tok");

        let report = mgr.unsubscribe_all().await;
        assert_eq!(
            report,
            UnsubscribeReport {
                requested: 3,
                succeeded: 1,
                failed: 2
            }
        );

        // Failed calls keep their handle so a later drain can retry.
        assert_eq!(
            mgr.registry().subscription_handle("T1").as_deref(),
            Some("T1:tok")
        );
        assert_eq!(
            mgr.registry().subscription_handle("T2").as_deref(),
            Some("T2:tok")
        );
        assert_eq!(
            mgr.registry().state("T3").unwrap(),
            SubscriptionState::Unsubscribed
        );
    }

    #[tokio::test]
    async fn test_closed_manager_refuses_confirmations() {
        let (mgr, client) = manager(&["T1"], Duration::from_secs(5));
        mgr.close();
        assert!(mgr.is_closed());

        assert!(matches!(
            mgr.on_confirmation("T1", "tok").await,
            Err(SubscriptionError::Closed)
        ));
        assert!(client.calls().is_empty());
        assert_eq!(
            mgr.registry().state("T1").unwrap(),
            SubscriptionState::Unsubscribed
        );
    }

    #[tokio::test]
    async fn test_confirmation_in_flight_during_drain_is_withdrawn() {
        let (mgr, client) = manager(&["T1"], Duration::from_secs(5));
        let mgr = Arc::new(mgr);
        client.delay_confirm("late", Duration::from_millis(100));

        let confirming = tokio::spawn({
            let mgr = mgr.clone();
            async move { mgr.on_confirmation("T1", "late").await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        mgr.close();
        assert_eq!(mgr.unsubscribe_all().await.requested, 0);

        assert!(matches!(
            confirming.await.unwrap(),
            Err(SubscriptionError::Closed)
        ));
        assert_eq!(client.unsubscribed(), vec!["T1:late"]);
        assert_eq!(
            mgr.registry().state("T1").unwrap(),
            SubscriptionState::Unsubscribed
        );
    }

    #[tokio::test]
    async fn test_withdraw_leaves_drained_handle_alone() {
        let (mgr, client) = manager(&["T1"], Duration::from_secs(5));
        mgr.on_confirmation("T1", "tok").await.unwrap();
        mgr.registry()
            .set_state(
                "T1",
                SubscriptionState::UnsubscriptionRequested {
                    handle: "T1:tok".into(),
                },
            )
            .unwrap();

        mgr.withdraw("T1", "T1:tok").await;
        assert!(client.unsubscribed().is_empty());
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let result: Result<(), _> = bounded(
            Duration::from_millis(10),
            std::future::pending::<Result<(), ProviderError>>(),
        )
        .await;
        assert_eq!(result, Err(ProviderError::Timeout(Duration::from_millis(10))));
    }
}
