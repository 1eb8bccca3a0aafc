// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Topic registry.
//!
//! Holds every configured topic together with its RDF mapping rules and its
//! subscription state. Mapping rules are immutable once loaded; the
//! subscription state is written only by the subscription lifecycle manager
//! and read everywhere else.
//!
//! Lookups go through a `HashMap` index, so they are O(1) regardless of the
//! number of topics.

use crate::config::{RelayConfig, SnsTopicConfig};
use crate::convert::TypeConversion;
use crate::rdf::encode_iri_segment;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Registry errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Unknown topic: {0}")]
    UnknownTopic(String),
}

/// Subscription state of one topic.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SubscriptionState {
    #[default]
    Unsubscribed,
    SubscriptionRequested,
    Confirmed {
        handle: String,
    },
    UnsubscriptionRequested {
        handle: String,
    },
}

impl SubscriptionState {
    /// Live subscription handle, if the provider has confirmed one.
    pub fn handle(&self) -> Option<&str> {
        match self {
            Self::Confirmed { handle } | Self::UnsubscriptionRequested { handle } => Some(handle),
            Self::Unsubscribed | Self::SubscriptionRequested => None,
        }
    }
}

/// Attribute filter of a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicFilter {
    pub field: String,
    pub value: String,
}

impl TopicFilter {
    /// True when `name` designates the filter attribute.
    pub fn applies_to(&self, name: &str) -> bool {
        eq_ignore_case(&self.field, name)
    }

    /// True when `value` satisfies the filter.
    pub fn accepts(&self, value: &str) -> bool {
        eq_ignore_case(&self.value, value)
    }
}

/// Mapping rules for one topic.
#[derive(Debug, Clone)]
pub struct TopicConfig {
    /// Provider topic identifier.
    pub topic_id: String,
    /// Subject URI prefix, always ending in exactly one added `/`.
    pub subject_uri_prefix: String,
    /// RDF class of every subject.
    pub subject_type: String,
    pub filter: Option<TopicFilter>,
    /// Lowercased attribute name -> first matching rule.
    conversions: HashMap<String, TypeConversion>,
}

impl TopicConfig {
    pub fn new(
        topic_id: impl Into<String>,
        subject_uri_prefix: &str,
        subject_type: impl Into<String>,
    ) -> Self {
        Self {
            topic_id: topic_id.into(),
            subject_uri_prefix: normalize_prefix(subject_uri_prefix),
            subject_type: subject_type.into(),
            filter: None,
            conversions: HashMap::new(),
        }
    }

    /// Set the attribute filter.
    pub fn with_filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filter = Some(TopicFilter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Add a conversion rule. An earlier rule for the same name wins.
    pub fn with_conversion(mut self, rule: TypeConversion) -> Self {
        self.conversions
            .entry(rule.attribute.to_lowercase())
            .or_insert(rule);
        self
    }

    /// Build the runtime form of a configured topic.
    pub fn from_config(cfg: &SnsTopicConfig) -> Self {
        let mut topic = Self::new(&cfg.topic_arn, &cfg.subject_uri_prefix, &cfg.subject_type);
        if let (Some(field), Some(value)) = (&cfg.filter_field, &cfg.filter_value) {
            topic = topic.with_filter(field, value);
        }
        for rule in &cfg.object_types {
            topic = topic.with_conversion(TypeConversion::new(
                &rule.property,
                &rule.datatype,
                rule.convert,
            ));
        }
        topic
    }

    /// Subject URI for a message. The id is percent-encoded where IRIs
    /// forbid its characters.
    pub fn subject_for(&self, message_id: &str) -> String {
        format!("{}{}", self.subject_uri_prefix, encode_iri_segment(message_id))
    }

    /// Predicate URI for an attribute: the prefix without its trailing
    /// slash, then `#`, then the attribute name.
    pub fn predicate_for(&self, attribute: &str) -> String {
        let namespace = self
            .subject_uri_prefix
            .strip_suffix('/')
            .unwrap_or(&self.subject_uri_prefix);
        format!("{}#{}", namespace, encode_iri_segment(attribute))
    }

    /// Conversion rule for an attribute, matched case-insensitively.
    pub fn conversion_for(&self, attribute: &str) -> Option<&TypeConversion> {
        self.conversions.get(&attribute.to_lowercase())
    }
}

/// Append a trailing `/` unless one is already there.
pub fn normalize_prefix(prefix: &str) -> String {
    if prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{}/", prefix)
    }
}

fn eq_ignore_case(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

struct TopicEntry {
    config: Arc<TopicConfig>,
    state: RwLock<SubscriptionState>,
}

/// Configured topics keyed by topic id.
pub struct TopicRegistry {
    entries: Vec<TopicEntry>,
    index: HashMap<String, usize>,
}

impl TopicRegistry {
    /// Create a registry. Later duplicates of a topic id are ignored.
    pub fn new(topics: Vec<TopicConfig>) -> Self {
        let mut entries = Vec::with_capacity(topics.len());
        let mut index = HashMap::with_capacity(topics.len());
        for topic in topics {
            if index.contains_key(&topic.topic_id) {
                tracing::warn!(topic = %topic.topic_id, "duplicate topic ignored");
                continue;
            }
            index.insert(topic.topic_id.clone(), entries.len());
            entries.push(TopicEntry {
                config: Arc::new(topic),
                state: RwLock::new(SubscriptionState::Unsubscribed),
            });
        }
        Self { entries, index }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(config.topics.iter().map(TopicConfig::from_config).collect())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, topic_id: &str) -> Result<&TopicEntry, RegistryError> {
        self.index
            .get(topic_id)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| RegistryError::UnknownTopic(topic_id.to_string()))
    }

    /// Look up the mapping rules of a topic.
    pub fn lookup(&self, topic_id: &str) -> Result<Arc<TopicConfig>, RegistryError> {
        self.entry(topic_id).map(|e| e.config.clone())
    }

    /// Current subscription state of a topic.
    pub fn state(&self, topic_id: &str) -> Result<SubscriptionState, RegistryError> {
        self.entry(topic_id).map(|e| e.state.read().clone())
    }

    /// Live subscription handle of a topic.
    pub fn subscription_handle(&self, topic_id: &str) -> Option<String> {
        self.entry(topic_id)
            .ok()
            .and_then(|e| e.state.read().handle().map(str::to_string))
    }

    /// Record the handle returned by a successful confirmation.
    ///
    /// Returns the handle previously recorded, if any.
    pub fn record_subscription_handle(
        &self,
        topic_id: &str,
        handle: impl Into<String>,
    ) -> Result<Option<String>, RegistryError> {
        let entry = self.entry(topic_id)?;
        let mut state = entry.state.write();
        let previous = state.handle().map(str::to_string);
        *state = SubscriptionState::Confirmed {
            handle: handle.into(),
        };
        Ok(previous)
    }

    /// Replace the state of a topic, returning the previous one.
    #[cfg(test)]
    pub(crate) fn set_state(
        &self,
        topic_id: &str,
        new_state: SubscriptionState,
    ) -> Result<SubscriptionState, RegistryError> {
        let entry = self.entry(topic_id)?;
        Ok(std::mem::replace(&mut *entry.state.write(), new_state))
    }

    /// Replace the state of a topic only if it still equals `expected`.
    pub(crate) fn compare_and_set(
        &self,
        topic_id: &str,
        expected: &SubscriptionState,
        new_state: SubscriptionState,
    ) -> Result<bool, RegistryError> {
        let entry = self.entry(topic_id)?;
        let mut state = entry.state.write();
        if *state != *expected {
            return Ok(false);
        }
        *state = new_state;
        Ok(true)
    }

    /// Topics whose state satisfies `pred`, in configuration order.
    pub(crate) fn topics_where<F>(&self, pred: F) -> Vec<(Arc<TopicConfig>, SubscriptionState)>
    where
        F: Fn(&SubscriptionState) -> bool,
    {
        self.entries
            .iter()
            .filter_map(|e| {
                let state = e.state.read().clone();
                pred(&state).then(|| (e.config.clone(), state))
            })
            .collect()
    }

    /// Snapshot of every topic and its state, in configuration order.
    pub fn snapshot(&self) -> Vec<(Arc<TopicConfig>, SubscriptionState)> {
        self.topics_where(|_| true)
    }

    /// Forget every subscription handle.
    pub fn clear_all(&self) {
        for entry in &self.entries {
            *entry.state.write() = SubscriptionState::Unsubscribed;
        }
    }
}
