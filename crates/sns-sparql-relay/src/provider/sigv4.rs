// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! AWS Signature Version 4 for form-encoded Query API requests.

use ring::{digest, hmac};

/// AWS credentials
#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(digest::digest(&digest::SHA256, data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> hmac::Tag {
    hmac::sign(&hmac::Key::new(hmac::HMAC_SHA256, key), data)
}

/// URI-encode a string per AWS rules (RFC 3986 unreserved set kept as-is)
pub fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut result = String::with_capacity(input.len() * 2);
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            b'/' if !encode_slash => result.push('/'),
            _ => result.push_str(&format!("%{:02X}", byte)),
        }
    }
    result
}

/// Encode Query API parameters as an `application/x-www-form-urlencoded` body.
pub fn form_encode(params: &[(&str, &str)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", uri_encode(k, true), uri_encode(v, true)))
        .collect::<Vec<_>>()
        .join("&")
}

fn canonical_request(
    method: &str,
    path: &str,
    headers: &[(String, String)],
    signed_headers: &str,
    payload_hash: &str,
) -> String {
    let mut canonical_headers = String::new();
    for (name, value) in headers {
        canonical_headers.push_str(&format!("{}:{}\n", name.to_lowercase(), value.trim()));
    }

    // Query API actions travel in the body; the query string is always empty.
    format!(
        "{}\n{}\n\n{}\n{}\n{}",
        method,
        uri_encode(path, false),
        canonical_headers,
        signed_headers,
        payload_hash,
    )
}

fn credential_scope(date: &str, region: &str, service: &str) -> String {
    format!("{}/{}/{}/aws4_request", date, region, service)
}

fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> hmac::Tag {
    let k_date = hmac_sha256(format!("AWS4{}", secret).as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(k_date.as_ref(), region.as_bytes());
    let k_service = hmac_sha256(k_region.as_ref(), service.as_bytes());
    hmac_sha256(k_service.as_ref(), b"aws4_request")
}

/// Sign a request and return the `Authorization` header value.
///
/// `headers` must contain `host`; `x-amz-date` and (when a session token is
/// present) `x-amz-security-token` are added. On return `headers` is sorted
/// and holds every header that was signed.
#[allow(clippy::too_many_arguments)]
pub fn sign_request(
    credentials: &AwsCredentials,
    method: &str,
    url_path: &str,
    headers: &mut Vec<(String, String)>,
    body: &[u8],
    region: &str,
    service: &str,
    datetime: &str, // "20260213T120000Z"
) -> String {
    let date = &datetime[..datetime.len().min(8)];
    let payload_hash = sha256_hex(body);

    if !headers.iter().any(|(k, _)| k == "x-amz-date") {
        headers.push(("x-amz-date".to_string(), datetime.to_string()));
    }
    if let Some(ref token) = credentials.session_token {
        if !headers.iter().any(|(k, _)| k == "x-amz-security-token") {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
    }

    headers.sort_by_key(|(k, _)| k.to_lowercase());

    let signed_headers = headers
        .iter()
        .map(|(k, _)| k.to_lowercase())
        .collect::<Vec<_>>()
        .join(";");

    let creq = canonical_request(method, url_path, headers, &signed_headers, &payload_hash);
    let scope = credential_scope(date, region, service);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        datetime,
        scope,
        sha256_hex(creq.as_bytes())
    );

    let key = signing_key(&credentials.secret_access_key, date, region, service);
    let signature = hex::encode(hmac_sha256(key.as_ref(), string_to_sign.as_bytes()));

    format!(
        "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
        credentials.access_key_id, scope, signed_headers, signature
    )
}
