// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Relay configuration.
//!
//! The configuration file is JSON and keeps the key names the relay has
//! always used (`SNSTopics`, `snsEndpointURL`, `SPARQL_Update_Endpoint`, ...).
//! A loaded [`RelayConfig`] is an immutable value: a reload produces a new
//! value and a fresh set of components rather than mutating this one.

use crate::convert::ConversionKind;
use crate::rdf::{datatype_node, named_node};
use crate::registry::normalize_prefix;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Credentials and region for the SNS management API.
    #[serde(rename = "AWS", default, skip_serializing_if = "Option::is_none")]
    pub aws: Option<AwsConfig>,

    /// Topics to subscribe to, with their RDF mapping rules.
    #[serde(rename = "SNSTopics")]
    pub topics: Vec<SnsTopicConfig>,

    /// Public callback URL handed to the provider on subscribe.
    #[serde(rename = "snsEndpointURL")]
    pub endpoint_url: String,

    /// Local port the webhook listener binds to.
    #[serde(rename = "PrivatePort")]
    pub private_port: u16,

    /// Externally forwarded port. Informational only.
    #[serde(rename = "PublicPort", default, skip_serializing_if = "Option::is_none")]
    pub public_port: Option<u16>,

    /// NAT port mapping request. Not supported; a warning is logged.
    #[serde(rename = "UseNATPNP", default)]
    pub use_nat_pmp: bool,

    /// Local address the webhook listener binds to.
    #[serde(rename = "BindAddress", default = "default_bind_address")]
    pub bind_address: String,

    /// SPARQL 1.1 update endpoint of the triple store.
    #[serde(rename = "SPARQL_Update_Endpoint")]
    pub update_endpoint: String,

    /// Verbose logging.
    #[serde(default)]
    pub debug: bool,

    /// Dry-run: log update statements instead of sending them.
    #[serde(rename = "FakePublish", default)]
    pub fake_publish: bool,

    /// Upper bound for a single subscribe / confirm / unsubscribe call.
    #[serde(rename = "ProviderTimeoutSecs", default = "default_provider_timeout")]
    pub provider_timeout_secs: u64,

    /// Pause between draining unsubscriptions and closing the listener.
    #[serde(rename = "ReloadGraceSecs", default = "default_reload_grace")]
    pub reload_grace_secs: u64,
}

/// SNS management API credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    #[serde(rename = "defaultRegion")]
    pub region: String,

    #[serde(rename = "accessKeyId")]
    pub access_key_id: String,

    #[serde(rename = "secretAccessKey")]
    pub secret_access_key: String,

    #[serde(rename = "sessionToken", default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
}

/// Configuration for a single topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnsTopicConfig {
    /// Provider topic identifier (ARN).
    #[serde(rename = "TopicARN")]
    pub topic_arn: String,

    /// Prefix used to build subject and predicate URIs.
    #[serde(rename = "SubjectURIPrefix")]
    pub subject_uri_prefix: String,

    /// RDF class of every subject created for this topic.
    #[serde(rename = "SubjectType")]
    pub subject_type: String,

    /// Attribute name the filter applies to.
    #[serde(rename = "FilterField", default, skip_serializing_if = "Option::is_none")]
    pub filter_field: Option<String>,

    /// Value the filter attribute must equal (case-insensitive).
    #[serde(rename = "FilterValue", default, skip_serializing_if = "Option::is_none")]
    pub filter_value: Option<String>,

    /// Typed-literal conversions, first match wins.
    #[serde(rename = "ObjectTypes", default, skip_serializing_if = "Vec::is_empty")]
    pub object_types: Vec<ObjectTypeConfig>,
}

/// A typed-literal rule for one attribute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectTypeConfig {
    /// Attribute name (matched case-insensitively).
    pub property: String,

    /// Conversion applied to the raw value.
    #[serde(default)]
    pub convert: ConversionKind,

    /// Datatype tag for the literal (e.g. `xsd:dateTime`).
    #[serde(rename = "type")]
    pub datatype: String,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_provider_timeout() -> u64 {
    30
}

fn default_reload_grace() -> u64 {
    5
}

impl RelayConfig {
    /// Load configuration from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse and validate configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration. An empty topic list is valid: the relay
    /// then serves the webhook without subscribing anywhere.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for (i, topic) in self.topics.iter().enumerate() {
            if topic.topic_arn.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("Topic {} has an empty TopicARN", i)));
            }
            if !seen.insert(topic.topic_arn.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "Topic {} is configured more than once",
                    topic.topic_arn
                )));
            }
            if topic.subject_uri_prefix.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "Topic {} has an empty SubjectURIPrefix",
                    topic.topic_arn
                )));
            }
            if topic.subject_type.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "Topic {} has an empty SubjectType",
                    topic.topic_arn
                )));
            }
            if let Err(e) = named_node(&normalize_prefix(&topic.subject_uri_prefix))
                .and_then(|_| named_node(&topic.subject_type))
            {
                return Err(ConfigError::Invalid(format!("Topic {}: {}", topic.topic_arn, e)));
            }
            if topic.filter_field.is_some() != topic.filter_value.is_some() {
                return Err(ConfigError::Invalid(format!(
                    "Topic {} must set FilterField and FilterValue together",
                    topic.topic_arn
                )));
            }
            for rule in &topic.object_types {
                if rule.property.is_empty() || rule.datatype.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "Topic {} has an ObjectTypes entry without property or type",
                        topic.topic_arn
                    )));
                }
                if let Err(e) = datatype_node(&rule.datatype) {
                    return Err(ConfigError::Invalid(format!(
                        "Topic {} property {}: {}",
                        topic.topic_arn, rule.property, e
                    )));
                }
            }
        }

        if !(self.endpoint_url.starts_with("http://") || self.endpoint_url.starts_with("https://"))
        {
            return Err(ConfigError::Invalid(format!(
                "snsEndpointURL must be an http(s) URL, got {:?}",
                self.endpoint_url
            )));
        }
        if self.update_endpoint.is_empty() {
            return Err(ConfigError::Invalid("SPARQL_Update_Endpoint is empty".into()));
        }
        if self.private_port == 0 {
            return Err(ConfigError::Invalid("PrivatePort must be non-zero".into()));
        }

        Ok(())
    }

    /// Address the webhook listener binds to.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.private_port)
    }

    /// Example configuration used by `gen-config`.
    pub fn example() -> Self {
        Self {
            aws: Some(AwsConfig {
                region: "us-east-1".into(),
                access_key_id: "AKIDEXAMPLE".into(),
                secret_access_key: "change-me".into(),
                session_token: None,
            }),
            topics: vec![SnsTopicConfig {
                topic_arn: "arn:aws:sns:us-east-1:123456789012:sensor-events".into(),
                subject_uri_prefix: "http://example.org/events".into(),
                subject_type: "http://example.org/ns#Event".into(),
                filter_field: Some("status".into()),
                filter_value: Some("ok".into()),
                object_types: vec![ObjectTypeConfig {
                    property: "timestamp".into(),
                    convert: ConversionKind::DateTimeFromEpochOrString,
                    datatype: "xsd:dateTime".into(),
                }],
            }],
            endpoint_url: "http://relay.example.org:8765/".into(),
            private_port: 8765,
            public_port: None,
            use_nat_pmp: false,
            bind_address: default_bind_address(),
            update_endpoint: "http://localhost:8080/openrdf-sesame/repositories/events/statements"
                .into(),
            debug: false,
            fake_publish: false,
            provider_timeout_secs: default_provider_timeout(),
            reload_grace_secs: default_reload_grace(),
        }
    }
}
