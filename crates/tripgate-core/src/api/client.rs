//! reqwest client for the issuing service and authenticated app requests.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use super::{ApiError, Endpoint, Issuer, IssuerReply};
use crate::config::Config;
use crate::store::TokenStore;

/// Client for the issuing service and the application origin.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    api_base_url: String,
    app_origin: String,
}

impl ApiClient {
    /// Create a client that sends the cookies held in `jar`.
    pub fn new(api_base_url: &str, app_origin: &str, timeout: Duration, jar: Arc<Jar>) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .cookie_provider(jar)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            app_origin: app_origin.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config, jar: Arc<Jar>) -> Result<Self> {
        Self::new(
            &config.api_base_url,
            &config.app_origin,
            Duration::from_secs(config.request_timeout_secs),
            jar,
        )
    }

    fn endpoint_url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.api_base_url, endpoint.path())
    }

    fn app_url(&self, path: &str) -> String {
        format!("{}/{}", self.app_origin, path.trim_start_matches('/'))
    }

    /// Start a request to the application, with the stored token as a
    /// bearer credential when there is one.
    pub fn fetch_with_auth(&self, store: &TokenStore, method: Method, path: &str) -> RequestBuilder {
        let request = self.client.request(method, self.app_url(path));
        match store.get() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// GET a JSON resource from the application with the stored token.
    pub async fn get_json<T: DeserializeOwned>(&self, store: &TokenStore, path: &str) -> Result<T> {
        let response = self
            .fetch_with_auth(store, Method::GET, path)
            .send()
            .await
            .with_context(|| format!("Failed to send GET request to {}", path))?;

        let response = Self::check_response(response).await?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse JSON response from {}", path))
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }
}

#[async_trait]
impl Issuer for ApiClient {
    async fn exchange(&self, endpoint: Endpoint, body: Value) -> Result<IssuerReply, ApiError> {
        let url = self.endpoint_url(endpoint);
        debug!(url = %url, "Sending credential exchange");

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await.map_err(ApiError::from);

        reply_from_body(status, text)
    }
}

/// Turn an issuer response into a reply.
///
/// A success must carry a readable JSON body. An error status keeps
/// whatever JSON it carries, and an unreadable body becomes `Null` so the
/// session falls back to its generic message.
fn reply_from_body(status: StatusCode, text: Result<String, ApiError>) -> Result<IssuerReply, ApiError> {
    if !status.is_success() {
        let body = match text.map(|t| serde_json::from_str::<Value>(&t)) {
            Ok(Ok(body)) => body,
            Ok(Err(_)) => {
                warn!(status = status.as_u16(), "Issuer error response is not JSON");
                Value::Null
            }
            Err(e) => {
                warn!(status = status.as_u16(), error = %e, "Failed to read issuer error response");
                Value::Null
            }
        };
        return Ok(IssuerReply::new(status.as_u16(), body));
    }

    let body = serde_json::from_str::<Value>(&text?).map_err(|e| {
        ApiError::InvalidResponse(format!("Failed to parse issuer response: {}", e))
    })?;
    Ok(IssuerReply::new(status.as_u16(), body))
}
