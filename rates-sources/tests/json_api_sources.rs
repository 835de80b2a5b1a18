//! Integration tests for the JSON currency API sources.

use chrono::NaiveDate;
use rates_sources::{JsonApiConfig, JsonApiSource, JsonApiVendor};
use rates_types::{CurrencyPair, Fetched, RateSource};
use rust_decimal_macros::dec;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn pair(from: &str, to: &str) -> CurrencyPair {
    CurrencyPair::new(from, to).unwrap()
}

fn config(vendor: JsonApiVendor, base_url: String) -> JsonApiConfig {
    JsonApiConfig {
        timeout: Duration::from_secs(2),
        ..JsonApiConfig::for_vendor(vendor).with_base_url(base_url)
    }
}

#[tokio::test]
async fn test_exchangerate_api_current_rate() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v4/latest/USD"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "base": "USD",
            "date": "2024-03-15",
            "rates": {"USD": 1, "TRY": 32.25, "EUR": 0.92}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let source = JsonApiSource::new(config(JsonApiVendor::ExchangeRateApi, server.uri()));

    assert_eq!(source.fetch(&pair("usd", "try"), None).await.unwrap(), Fetched::live(dec!(32.25)));
    // Second call is a source-cache hit.
    assert_eq!(source.fetch(&pair("USD", "TRY"), None).await.unwrap(), Fetched::live(dec!(32.25)));
}

#[tokio::test]
async fn test_exchangerate_api_refuses_history_without_request() {
    let server = MockServer::start().await;
    let source = JsonApiSource::new(config(JsonApiVendor::ExchangeRateApi, server.uri()));
    let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();

    let err = source.fetch(&pair("USD", "TRY"), Some(date)).await.unwrap_err();

    assert!(err.is_no_data());
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_currency_api_embeds_date_in_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/currency-api@2024-03-06/v1/currencies/eur.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "date": "2024-03-06",
            "eur": {"try": 34.71, "usd": 1.09}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let base = format!("{}/currency-api@", server.uri());
    let source = JsonApiSource::new(config(JsonApiVendor::CurrencyApi, base));
    let date = NaiveDate::from_ymd_opt(2024, 3, 6).unwrap();

    let rate = source.fetch(&pair("EUR", "TRY"), Some(date)).await.unwrap();

    assert_eq!(rate.value, dec!(34.71));
    assert!(!rate.stale);
}

#[tokio::test]
async fn test_frankfurter_substituted_date_is_no_data() {
    let server = MockServer::start().await;
    // Asked for a Sunday, the vendor answers with Friday's rate.
    Mock::given(method("GET"))
        .and(path("/2024-03-10"))
        .and(query_param("from", "USD"))
        .and(query_param("to", "TRY"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "amount": 1.0,
            "base": "USD",
            "date": "2024-03-08",
            "rates": {"TRY": 31.98}
        })))
        .mount(&server)
        .await;

    let source = JsonApiSource::new(config(JsonApiVendor::Frankfurter, server.uri()));
    let date = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();

    let err = source.fetch(&pair("USD", "TRY"), Some(date)).await.unwrap_err();

    assert!(err.is_no_data());
}

#[tokio::test]
async fn test_quota_exhaustion_skips_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "rates": {"TRY": 32.25, "GBP": 0.79}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let source = JsonApiSource::new(JsonApiConfig {
        requests_per_minute: 1,
        ..config(JsonApiVendor::ExchangeRateApi, server.uri())
    });

    assert!(source.fetch(&pair("USD", "TRY"), None).await.is_ok());
    let err = source.fetch(&pair("USD", "GBP"), None).await.unwrap_err();

    assert!(!err.is_rate_limit());
    assert!(err.to_string().contains("quota exhausted"));
}

#[tokio::test]
async fn test_http_429_is_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let source = JsonApiSource::new(config(JsonApiVendor::Frankfurter, server.uri()));

    let err = source.fetch(&pair("USD", "TRY"), None).await.unwrap_err();

    assert!(err.is_rate_limit());
}

#[tokio::test]
async fn test_stale_source_cache_is_marked_stale_when_vendor_fails() {
    let server = MockServer::start().await;
    let source = JsonApiSource::new(JsonApiConfig {
        fresh_ttl: Duration::ZERO,
        stale_ttl: Duration::from_secs(3600),
        ..config(JsonApiVendor::ExchangeRateApi, server.uri())
    });

    {
        let _guard = Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "rates": {"TRY": 32.25}
            })))
            .mount_as_scoped(&server)
            .await;

        assert_eq!(source.fetch(&pair("USD", "TRY"), None).await.unwrap(), Fetched::live(dec!(32.25)));
    }

    let _guard = Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .mount_as_scoped(&server)
        .await;

    let fetched = source.fetch(&pair("USD", "TRY"), None).await.unwrap();
    assert_eq!(fetched, Fetched::stale(dec!(32.25)));
}
