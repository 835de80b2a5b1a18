//! Shared HTTP plumbing for the source adapters.

use rates_types::{SourceError, classify_failure};
use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde_json::Value;
use std::time::Duration;

/// Largest rate accepted from any vendor.
pub const MAX_PLAUSIBLE_RATE: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

/// Longest error body excerpt kept in messages.
const BODY_EXCERPT_LEN: usize = 200;

/// Builds a client with a bounded per-request timeout.
pub fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|err| {
            tracing::warn!("Falling back to default HTTP client: {}", err);
            Client::new()
        })
}

/// Performs a GET and decodes the JSON body, classifying every failure.
pub async fn get_json(
    client: &Client,
    source_name: &str,
    url: &str,
    user_agent: Option<&str>,
) -> Result<Value, SourceError> {
    let mut request = client.get(url);
    if let Some(ua) = user_agent {
        request = request.header(reqwest::header::USER_AGENT, ua);
    }

    let response = request.send().await.map_err(|err| transport_error(source_name, &err))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|err| transport_error(source_name, &err))?;

    if !status.is_success() {
        return Err(classify_failure(
            source_name,
            Some(status.as_u16()),
            excerpt(&body),
        ));
    }

    serde_json::from_str(&body).map_err(|err| {
        // Some vendors answer a throttled request with a 200 and a plain-text body.
        match classify_failure(source_name, None, excerpt(&body)) {
            limited @ SourceError::RateLimited { .. } => limited,
            _ => SourceError::unavailable(source_name, format!("malformed JSON: {}", err)),
        }
    })
}

fn transport_error(source_name: &str, err: &reqwest::Error) -> SourceError {
    if err.is_timeout() {
        return SourceError::unavailable(source_name, "request timed out");
    }
    match classify_failure(source_name, err.status().map(|s| s.as_u16()), &err.to_string()) {
        limited @ SourceError::RateLimited { .. } => limited,
        _ => SourceError::Http {
            source_name: source_name.to_string(),
            message: err.to_string(),
        },
    }
}

fn excerpt(body: &str) -> &str {
    match body.char_indices().nth(BODY_EXCERPT_LEN) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

/// Reads a JSON number (or numeric string) as a decimal.
pub fn decimal_from_json(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => n.as_f64().and_then(Decimal::from_f64),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A rate is usable only if it is positive and below the sanity bound.
pub fn is_plausible(value: Decimal) -> bool {
    value > Decimal::ZERO && value < MAX_PLAUSIBLE_RATE
}

/// Returns `1 / value`, or `None` for zero.
pub fn invert(value: Decimal) -> Option<Decimal> {
    Decimal::ONE.checked_div(value)
}
