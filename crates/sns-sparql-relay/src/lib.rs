// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SNS to SPARQL relay
//!
//! Subscribes an HTTP webhook to Amazon SNS topics, turns every delivered
//! notification into RDF triples and inserts them into a SPARQL 1.1 triple
//! store.
//!
//! ```text
//! SNS --POST--> Receiver --> TripleMapper --> UpdateDispatcher --> triple store
//!                  |
//!                  +--> SubscriptionManager --> SNS (confirm / unsubscribe)
//! ```
//!
//! # Features
//!
//! - **Subscription lifecycle**: subscribe, confirm and drain unsubscriptions
//!   with every provider call bounded by a timeout
//! - **Per-topic mapping**: subject prefix, subject class, attribute filter
//!   and typed-literal conversions
//! - **Dry-run**: log `INSERT DATA` statements without sending them
//!
//! # Quick Start
//!
//! ```bash
//! # Write an example configuration
//! sns-sparql-relay gen-config --output configuration.json
//!
//! # Run, reloading whenever the file changes
//! sns-sparql-relay --config configuration.json
//! ```
//!
//! # Configuration File
//!
//! ```json
//! {
//!   "SNSTopics": [{
//!     "TopicARN": "arn:aws:sns:us-east-1:123456789012:sensor-events",
//!     "SubjectURIPrefix": "http://example.org/events",
//!     "SubjectType": "http://example.org/ns#Event",
//!     "ObjectTypes": [
//!       { "property": "timestamp", "convert": "DateTimeFromEpochOrString", "type": "xsd:dateTime" }
//!     ]
//!   }],
//!   "snsEndpointURL": "http://relay.example.org:8765/",
//!   "PrivatePort": 8765,
//!   "SPARQL_Update_Endpoint": "http://localhost:8080/repositories/events/statements"
//! }
//! ```

pub mod config;
pub mod convert;
pub mod dispatch;
pub mod mapper;
pub mod notification;
pub mod provider;
pub mod rdf;
pub mod receiver;
pub mod registry;
pub mod relay;
pub mod subscription;

pub use config::{ConfigError, RelayConfig, SnsTopicConfig};
pub use dispatch::{DispatchFailure, DispatchOutcome, UpdateClassifier, UpdateDispatcher};
pub use mapper::{MapOutcome, TripleMapper};
pub use notification::{Notification, NotificationError, WebhookMessage};
pub use provider::{MockPubSubClient, ProviderError, PubSubClient, SnsClient};
pub use rdf::{RdfError, Term, Triple};
pub use receiver::{Pipeline, PayloadOutcome};
pub use registry::{RegistryError, SubscriptionState, TopicConfig, TopicRegistry};
pub use relay::{Relay, RelayError, RelayHandle};
pub use subscription::{SubscriptionError, SubscriptionManager, UnsubscribeReport};
