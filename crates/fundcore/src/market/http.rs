//! Shared HTTP client for exchange REST calls.

use crate::core::config;
use crate::core::error::{AppError, AppResult};
use crate::core::retry::{retry, RetryConfig};
use reqwest::Client;
use serde::de::DeserializeOwned;

/// reqwest client plus the retry policy applied to every GET.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    retry: RetryConfig,
}

impl HttpClient {
    pub fn new() -> AppResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("fundbot/", env!("CARGO_PKG_VERSION")))
            .timeout(config::market::http_timeout())
            .connect_timeout(config::market::http_timeout())
            .build()?;

        Ok(Self {
            client,
            retry: RetryConfig::default(),
        })
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// GETs `url` with `query` and decodes the JSON body.
    ///
    /// Non-2xx statuses become [`AppError::HttpStatus`]; timeouts, connect
    /// errors, 429 and 5xx are retried.
    pub async fn get_json<T>(&self, url: &str, query: &[(&str, &str)]) -> AppResult<T>
    where
        T: DeserializeOwned,
    {
        let client = &self.client;
        let outcome = retry(&self.retry, || async move {
            let response = client.get(url).query(query).send().await?;
            let status = response.status();
            if !status.is_success() {
                log::debug!("GET {} returned {}", url, status);
                return Err(AppError::HttpStatus(status));
            }
            let body = response.bytes().await?;
            Ok::<T, AppError>(serde_json::from_slice(&body)?)
        })
        .await;

        if outcome.attempts > 1 && outcome.is_ok() {
            log::debug!("GET {} succeeded after {} attempts", url, outcome.attempts);
        }

        outcome.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_get_json_passes_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v5/market/tickers"))
            .and(query_param("category", "linear"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"retCode": 0})))
            .mount(&server)
            .await;

        let http = HttpClient::new().unwrap().with_retry(RetryConfig::none());
        let url = format!("{}/v5/market/tickers", server.uri());
        let body: Value = http.get_json(&url, &[("category", "linear")]).await.unwrap();

        assert_eq!(body["retCode"], 0);
    }

    #[tokio::test]
    async fn test_get_json_maps_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(418))
            .mount(&server)
            .await;

        let http = HttpClient::new().unwrap().with_retry(RetryConfig::none());
        let err = http.get_json::<Value>(&server.uri(), &[]).await.unwrap_err();

        assert!(matches!(err, AppError::HttpStatus(s) if s.as_u16() == 418));
    }

    #[tokio::test]
    async fn test_get_json_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let retry = RetryConfig::new()
            .max_retries(2)
            .initial_delay(std::time::Duration::from_millis(1))
            .no_jitter();
        let http = HttpClient::new().unwrap().with_retry(retry);
        let body: Value = http.get_json(&server.uri(), &[]).await.unwrap();

        assert_eq!(body["ok"], true);
    }
}
