//! HTTP client for the marketplace API.

use std::time::Duration;

use reqwest::{header, Client, StatusCode};
use serde_json::Value as Json;
use tracing::debug;
use url::Url;

use lenda_common::{Error, Record, Result};

use crate::auth::{Credentials, TokenManager};
use crate::source::RemoteSource;

/// Page size requested via the X-Size header.
const PAGE_SIZE: usize = 100;
/// Minimum interval between requests; the remote service rate-limits.
const PACE_INTERVAL: Duration = Duration::from_millis(500);

/// Parse the host, requiring a trailing slash so path joins append instead
/// of replacing the last segment.
fn parse_host(host: &str) -> Result<Url> {
    let normalized = if host.ends_with('/') {
        host.to_string()
    } else {
        format!("{}/", host)
    };
    Url::parse(&normalized).map_err(|e| Error::Config(format!("invalid API host '{}': {}", host, e)))
}

fn as_record(body: Json) -> Result<Record> {
    match body {
        Json::Object(map) => Ok(map),
        other => Err(Error::Network(format!(
            "expected a JSON object, got: {}",
            other
        ))),
    }
}

fn as_records(body: Json) -> Result<Vec<Record>> {
    match body {
        Json::Array(items) => items.into_iter().map(as_record).collect(),
        other => Err(Error::Network(format!(
            "expected a JSON array, got: {}",
            other
        ))),
    }
}

/// Authenticated, paced, paginating client over the marketplace API.
pub struct ApiClient {
    http: Client,
    host: Url,
    tokens: TokenManager,
    next_request_at: tokio::sync::Mutex<Option<tokio::time::Instant>>,
}

impl ApiClient {
    /// Authenticate against the API and return a ready client.
    pub async fn connect(host: &str, credentials: &Credentials) -> Result<Self> {
        let host = parse_host(host)?;
        let http = Client::builder()
            .user_agent(concat!("lenda/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Network(format!("failed to create HTTP client: {}", e)))?;

        let tokens = TokenManager::login(http.clone(), host.clone(), credentials).await?;

        Ok(Self {
            http,
            host,
            tokens,
            next_request_at: tokio::sync::Mutex::new(None),
        })
    }

    /// Wait out the pacing interval left by the previous request.
    async fn pace(&self) {
        let mut next_at = self.next_request_at.lock().await;
        if let Some(at) = *next_at {
            tokio::time::sleep_until(at).await;
        }
        *next_at = Some(tokio::time::Instant::now() + PACE_INTERVAL);
    }

    async fn get(
        &self,
        path: &str,
        query: &[(&str, &str)],
        page: Option<usize>,
        order: Option<&str>,
    ) -> Result<reqwest::Response> {
        let url = self
            .host
            .join(path)
            .map_err(|e| Error::Network(format!("invalid request path '{}': {}", path, e)))?;
        let token = self.tokens.get_access_token().await?;

        let mut request = self
            .http
            .get(url)
            .bearer_auth(token)
            .header(header::ACCEPT, "application/json")
            .query(query);

        if let Some(page) = page {
            request = request
                .header("X-Page", page.to_string())
                .header("X-Size", PAGE_SIZE.to_string());
        }
        if let Some(order) = order {
            request = request.header("X-Order", order);
        }

        self.pace().await;
        debug!(path, ?page, "requesting");

        let response = request
            .send()
            .await
            .map_err(|e| Error::Network(format!("request to '{}' failed: {}", path, e)))?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::Authentication(
                format!("'{}' rejected the access token", path),
            )),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(Error::Network(format!(
                    "'{}' returned {}: {}",
                    path, status, body
                )))
            }
        }
    }

    /// Fetch a single-object resource.
    async fn get_object(&self, path: &str) -> Result<Record> {
        let response = self.get(path, &[], None, None).await?;
        let body: Json = response
            .json()
            .await
            .map_err(|e| Error::Network(format!("malformed response from '{}': {}", path, e)))?;
        as_record(body)
    }

    /// Fetch a collection resource, advancing X-Page until X-Total is
    /// exhausted.
    async fn get_paged(
        &self,
        path: &str,
        query: &[(&str, &str)],
        order: Option<&str>,
    ) -> Result<Vec<Record>> {
        let mut page = 0;
        let mut records = Vec::new();

        loop {
            let response = self.get(path, query, Some(page), order).await?;

            let total: Option<usize> = response
                .headers()
                .get("X-Total")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());

            let body: Json = response.json().await.map_err(|e| {
                Error::Network(format!("malformed response from '{}': {}", path, e))
            })?;
            records.extend(as_records(body)?);

            match total {
                Some(total) if (page + 1) * PAGE_SIZE < total => page += 1,
                _ => break,
            }
        }

        Ok(records)
    }
}

#[async_trait::async_trait]
impl RemoteSource for ApiClient {
    async fn fetch_wallet(&self) -> Result<Record> {
        self.get_object("users/me/wallet").await
    }

    async fn fetch_blocked_amounts(&self) -> Result<Vec<Record>> {
        self.get_paged("users/me/wallet/blocked-amounts", &[], None)
            .await
    }

    async fn fetch_transactions(&self, since: Option<&str>) -> Result<Vec<Record>> {
        let mut query = Vec::new();
        if let Some(since) = since {
            query.push(("transaction.transactionDate__gte", since));
        }
        self.get_paged(
            "users/me/wallet/transactions",
            &query,
            Some("transaction.transactionDate"),
        )
        .await
    }

    async fn fetch_loan(&self, loan_id: i64) -> Result<Record> {
        self.get_object(&format!("loans/{}", loan_id)).await
    }

    async fn fetch_loan_investments(&self, loan_id: i64) -> Result<Vec<Record>> {
        self.get_paged(
            &format!("loans/{}/investments", loan_id),
            &[],
            Some("timeCreated"),
        )
        .await
    }

    async fn fetch_user_investments(&self) -> Result<Vec<Record>> {
        self.get_paged("users/me/investments", &[], Some("timeCreated"))
            .await
    }

    async fn fetch_notifications(&self) -> Result<Vec<Record>> {
        self.get_paged("users/me/notifications", &[], None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_host_appends_slash() {
        let host = parse_host("https://api.example.com").unwrap();
        assert_eq!(host.as_str(), "https://api.example.com/");

        let joined = host.join("users/me/wallet").unwrap();
        assert_eq!(joined.as_str(), "https://api.example.com/users/me/wallet");
    }

    #[test]
    fn test_parse_host_rejects_garbage() {
        assert!(matches!(parse_host("not a url"), Err(Error::Config(_))));
    }

    #[test]
    fn test_as_records_requires_array_of_objects() {
        let records = as_records(json!([{"id": 1}, {"id": 2}])).unwrap();
        assert_eq!(records.len(), 2);

        assert!(as_records(json!({"id": 1})).is_err());
        assert!(as_records(json!([1, 2])).is_err());
    }
}
