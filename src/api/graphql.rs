use std::time::Duration;

use anyhow::{Context, Result};
use log::{error, warn};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use url::Url;

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    #[serde(default)]
    message: String,
}

/// Minimal GraphQL-over-HTTP client shared by the pool and staking sources.
#[derive(Debug, Clone)]
pub(crate) struct GraphQlClient {
    http_client: Client,
    label: &'static str,
}

impl GraphQlClient {
    pub(crate) fn new(label: &'static str, timeout_secs: u64, user_agent: &str) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(user_agent)
            .build()
            .with_context(|| format!("Failed to build HTTP client for {label}"))?;

        Ok(Self { http_client, label })
    }

    /// POST `query` to `endpoint` and decode the `data` member.
    ///
    /// Returns `None` on transport errors, non-success statuses, GraphQL
    /// errors and undecodable payloads. Each case is logged.
    pub(crate) async fn query<T: DeserializeOwned>(
        &self,
        endpoint: &Url,
        query: &str,
        variables: Option<Value>,
    ) -> Option<T> {
        let mut body = json!({ "query": query });
        if let Some(variables) = variables {
            body["variables"] = variables;
        }

        let response = match self.http_client.post(endpoint.clone()).json(&body).send().await {
            Ok(response) => response,
            Err(e) => {
                error!("{} request failed: {}", self.label, e);
                return None;
            },
        };

        let status = response.status();
        if !status.is_success() {
            error!("{} returned HTTP {}", self.label, status);
            return None;
        }

        let payload = match response.json::<GraphQlResponse<T>>().await {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to decode {} response: {}", self.label, e);
                return None;
            },
        };

        if let Some(errors) = payload.errors.filter(|errors| !errors.is_empty()) {
            let messages: Vec<&str> = errors.iter().map(|e| e.message.as_str()).collect();
            warn!("{} GraphQL errors: {}", self.label, messages.join("; "));
            return None;
        }

        payload.data
    }
}

/// Parse a configured endpoint, logging instead of failing.
pub(crate) fn parse_endpoint(label: &str, raw: &str) -> Option<Url> {
    match Url::parse(raw) {
        Ok(url) => Some(url),
        Err(e) => {
            warn!("Invalid {} endpoint {:?}: {}", label, raw, e);
            None
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_with_errors_decodes() {
        let raw = r#"{"data": null, "errors": [{"message": "boom"}]}"#;
        let payload: GraphQlResponse<Value> = serde_json::from_str(raw).unwrap();
        assert!(payload.data.is_none());
        assert_eq!(payload.errors.unwrap()[0].message, "boom");
    }

    #[test]
    fn test_parse_endpoint() {
        assert!(parse_endpoint("test", "https://api-v3.balancer.fi/").is_some());
        assert!(parse_endpoint("test", "not a url").is_none());
    }
}
