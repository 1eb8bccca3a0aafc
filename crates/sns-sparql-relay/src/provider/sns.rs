// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Amazon SNS management client.
//!
//! Issues `Subscribe`, `ConfirmSubscription` and `Unsubscribe` through the
//! SNS Query API: a SigV4-signed, form-encoded POST to
//! `https://sns.<region>.amazonaws.com/` answered with an XML document.

use super::sigv4::{self, AwsCredentials};
use super::{ProviderError, PubSubClient};
use crate::config::AwsConfig;
use reqwest::Client;
use std::time::Duration;

const SNS_API_VERSION: &str = "2010-03-31";
const SNS_SERVICE: &str = "sns";

/// SNS Query API client.
#[derive(Debug, Clone)]
pub struct SnsClient {
    client: Client,
    region: String,
    endpoint: String,
    host: String,
    credentials: AwsCredentials,
}

impl SnsClient {
    /// Create a client for the regional SNS endpoint.
    pub fn new(region: impl Into<String>, credentials: AwsCredentials) -> Result<Self, ProviderError> {
        let region = region.into();
        let host = format!("sns.{}.amazonaws.com", region);
        let endpoint = format!("https://{}/", host);
        Self::with_endpoint(region, credentials, endpoint, host)
    }

    /// Create a client against an explicit endpoint (e.g. a local SNS emulator).
    pub fn with_endpoint(
        region: impl Into<String>,
        credentials: AwsCredentials,
        endpoint: impl Into<String>,
        host: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        Ok(Self {
            client,
            region: region.into(),
            endpoint: endpoint.into(),
            host: host.into(),
            credentials,
        })
    }

    /// Build a client from the `AWS` configuration section.
    pub fn from_config(aws: Option<&AwsConfig>) -> Result<Self, ProviderError> {
        let aws = aws.ok_or_else(|| ProviderError::Credentials("no AWS section".into()))?;
        if aws.access_key_id.is_empty() || aws.secret_access_key.is_empty() {
            return Err(ProviderError::Credentials("empty access key".into()));
        }
        Self::new(
            &aws.region,
            AwsCredentials {
                access_key_id: aws.access_key_id.clone(),
                secret_access_key: aws.secret_access_key.clone(),
                session_token: aws.session_token.clone(),
            },
        )
    }

    /// Run one Query API action and return the response document.
    async fn call(&self, action: &str, params: &[(&str, &str)]) -> Result<String, ProviderError> {
        let mut all = vec![("Action", action), ("Version", SNS_API_VERSION)];
        all.extend_from_slice(params);
        let body = sigv4::form_encode(&all);

        let datetime = chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
        let mut headers = vec![
            ("host".to_string(), self.host.clone()),
            (
                "content-type".to_string(),
                "application/x-www-form-urlencoded; charset=utf-8".to_string(),
            ),
        ];
        let authorization = sigv4::sign_request(
            &self.credentials,
            "POST",
            "/",
            &mut headers,
            body.as_bytes(),
            &self.region,
            SNS_SERVICE,
            &datetime,
        );

        let mut request = self
            .client
            .post(&self.endpoint)
            .header("authorization", authorization);
        for (name, value) in headers.iter().filter(|(k, _)| k != "host") {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(parse_error(&text).unwrap_or_else(|| ProviderError::Api {
                code: status.as_u16().to_string(),
                message: text,
            }));
        }
        tracing::debug!(action, "SNS responded: {}", text);
        Ok(text)
    }
}

/// Protocol SNS should use to reach the callback URL.
fn protocol_for(endpoint: &str) -> &'static str {
    if endpoint.starts_with("https://") {
        "https"
    } else {
        "http"
    }
}

/// Text of the first element named `tag` in an XML document.
fn element_text(xml: &str, tag: &str) -> Result<Option<String>, ProviderError> {
    let doc = roxmltree::Document::parse(xml).map_err(|e| ProviderError::Response(e.to_string()))?;
    Ok(doc
        .descendants()
        .find(|n| n.has_tag_name(tag))
        .and_then(|n| n.text())
        .map(|t| t.trim().to_string()))
}

/// Turn an SNS `<ErrorResponse>` document into an API error.
fn parse_error(xml: &str) -> Option<ProviderError> {
    let code = element_text(xml, "Code").ok().flatten()?;
    let message = element_text(xml, "Message").ok().flatten().unwrap_or_default();
    Some(ProviderError::Api { code, message })
}

impl PubSubClient for SnsClient {
    async fn subscribe(&self, topic_id: &str, endpoint: &str) -> Result<Option<String>, ProviderError> {
        let xml = self
            .call(
                "Subscribe",
                &[
                    ("TopicArn", topic_id),
                    ("Protocol", protocol_for(endpoint)),
                    ("Endpoint", endpoint),
                ],
            )
            .await?;
        element_text(&xml, "SubscriptionArn")
    }

    async fn confirm_subscription(&self, topic_id: &str, token: &str) -> Result<String, ProviderError> {
        let xml = self
            .call(
                "ConfirmSubscription",
                &[("TopicArn", topic_id), ("Token", token)],
            )
            .await?;
        element_text(&xml, "SubscriptionArn")?
            .ok_or_else(|| ProviderError::Response("no SubscriptionArn in response".into()))
    }

    async fn unsubscribe(&self, subscription_handle: &str) -> Result<(), ProviderError> {
        self.call("Unsubscribe", &[("SubscriptionArn", subscription_handle)])
            .await
            .map(|_| ())
    }
}
