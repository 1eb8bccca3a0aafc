// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Notification to RDF triple mapping.
//!
//! ```text
//! Notification + TopicConfig --> TripleMapper --> [Triple] | Suppressed
//! ```
//!
//! Every notification yields one `rdf:type` triple plus one triple per
//! attribute. When the topic has a filter and the filter attribute is
//! present with a different value (case-insensitive), the whole batch is
//! suppressed. A filter attribute absent from the message does not
//! suppress anything.

use crate::notification::Notification;
use crate::rdf::{Term, Triple, RDF_TYPE};
use crate::registry::TopicConfig;

/// Result of mapping one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapOutcome {
    /// Triples to insert, `rdf:type` first, then attributes in message order.
    Emit(Vec<Triple>),
    /// The filter attribute was present and did not match.
    Suppressed { field: String, value: String },
}

impl MapOutcome {
    pub fn triples(&self) -> &[Triple] {
        match self {
            MapOutcome::Emit(triples) => triples,
            MapOutcome::Suppressed { .. } => &[],
        }
    }

    pub fn is_suppressed(&self) -> bool {
        matches!(self, MapOutcome::Suppressed { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterState {
    NotConfigured,
    NotSeen,
    Passed,
    Failed,
}

/// Maps notifications to triples using a topic's rules.
pub struct TripleMapper;

impl TripleMapper {
    pub fn map(notification: &Notification, topic: &TopicConfig) -> MapOutcome {
        let subject = topic.subject_for(&notification.message_id);
        let mut triples = Vec::with_capacity(notification.attributes.len() + 1);
        triples.push(Triple::new(
            subject.clone(),
            RDF_TYPE,
            Term::iri(&topic.subject_type),
        ));

        let mut filter_state = match topic.filter {
            Some(_) => FilterState::NotSeen,
            None => FilterState::NotConfigured,
        };
        let mut rejected_value = None;

        for (name, value) in &notification.attributes {
            if let Some(filter) = &topic.filter {
                if filter_state == FilterState::NotSeen && filter.applies_to(name) {
                    if filter.accepts(value) {
                        filter_state = FilterState::Passed;
                    } else {
                        filter_state = FilterState::Failed;
                        rejected_value = Some(value.clone());
                    }
                }
            }

            triples.push(Triple::new(
                subject.clone(),
                topic.predicate_for(name),
                object_for(topic, &notification.message_id, name, value),
            ));
        }

        match (filter_state, &topic.filter) {
            (FilterState::Failed, Some(filter)) => MapOutcome::Suppressed {
                field: filter.field.clone(),
                value: rejected_value.unwrap_or_default(),
            },
            (FilterState::NotSeen, Some(filter)) => {
                tracing::debug!(
                    topic = %topic.topic_id,
                    message_id = %notification.message_id,
                    "filter field {} absent, passing notification through",
                    filter.field
                );
                MapOutcome::Emit(triples)
            }
            _ => MapOutcome::Emit(triples),
        }
    }
}

/// Object term of an attribute: typed when a conversion rule matches,
/// a plain literal otherwise or when the conversion fails.
fn object_for(topic: &TopicConfig, message_id: &str, name: &str, value: &str) -> Term {
    let Some(rule) = topic.conversion_for(name) else {
        return Term::plain(value);
    };
    match rule.apply(value) {
        Ok(term) => term,
        Err(e) => {
            tracing::warn!(
                topic = %topic.topic_id,
                message_id,
                attribute = name,
                "{}; storing as plain literal",
                e
            );
            Term::plain(value)
        }
    }
}
