//! HTTP utilities for OTC REST API calls

use anyhow::{Context, Result};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde_json::Value;

/// Header carrying the Keystone token on every API call
pub const AUTH_HEADER: &str = "X-Auth-Token";

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and strips non-printable characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let cut = (0..=MAX_LOG_BODY_LENGTH)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Pull a human readable message out of a provider error body.
///
/// Services answer in several shapes: `{"NeutronError": {"message"}}`,
/// `{"error": {"message"}}`, `{"error_msg"}` or a plain `{"message"}`.
pub fn extract_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;

    let candidates = [
        value.pointer("/NeutronError/message"),
        value.pointer("/error/message"),
        value.pointer("/error_msg"),
        value.pointer("/message"),
        value.pointer("/errMsg"),
    ];

    let message = candidates
        .into_iter()
        .flatten()
        .find_map(|v| v.as_str())
        .map(|s| s.to_string());
    message
}

/// HTTP client wrapper for OTC API calls
#[derive(Clone)]
pub struct OtcHttpClient {
    client: Client,
}

impl OtcHttpClient {
    /// Create a new HTTP client
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(format!("otc-modules/{}", crate::VERSION))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// Access the underlying reqwest client (used for unauthenticated calls)
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Make a GET request
    pub async fn get(&self, url: &str, token: &str) -> Result<Value> {
        let request = self.client.get(url).header(AUTH_HEADER, token);
        let body = send(Method::GET, url, request).await?;
        decode(&body)
    }

    /// Make a GET request, mapping 404 to `None`
    pub async fn get_optional(&self, url: &str, token: &str) -> Result<Option<Value>> {
        let request = self.client.get(url).header(AUTH_HEADER, token);
        let (status, body) = send_raw(Method::GET, url, request).await?;

        if status == StatusCode::NOT_FOUND {
            tracing::debug!("GET {} -> 404", url);
            return Ok(None);
        }

        check_status(status, &body)?;
        decode(&body).map(Some)
    }

    /// Make a POST request with a JSON body
    pub async fn post(&self, url: &str, token: &str, body: &Value) -> Result<Value> {
        let request = self.client.post(url).header(AUTH_HEADER, token).json(body);
        let body = send(Method::POST, url, request).await?;
        decode(&body)
    }

    /// Make a PUT request with a JSON body
    pub async fn put(&self, url: &str, token: &str, body: &Value) -> Result<Value> {
        let request = self.client.put(url).header(AUTH_HEADER, token).json(body);
        let body = send(Method::PUT, url, request).await?;
        decode(&body)
    }

    /// Make a DELETE request
    pub async fn delete(&self, url: &str, token: &str) -> Result<Value> {
        let request = self.client.delete(url).header(AUTH_HEADER, token);
        let body = send(Method::DELETE, url, request).await?;
        decode(&body)
    }
}

/// Send a request and return status and body without judging the status
async fn send_raw(method: Method, url: &str, request: RequestBuilder) -> Result<(StatusCode, String)> {
    tracing::debug!("{} {}", method, url);

    let response = request.send().await.context("Failed to send request")?;

    let status = response.status();
    let body = response
        .text()
        .await
        .context("Failed to read response body")?;

    Ok((status, body))
}

/// Send a request and fail on any non-success status
async fn send(method: Method, url: &str, request: RequestBuilder) -> Result<String> {
    let (status, body) = send_raw(method, url, request).await?;
    check_status(status, &body)?;
    Ok(body)
}

fn check_status(status: StatusCode, body: &str) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }

    // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
    tracing::error!("API error: {} - {}", status, sanitize_for_log(body));

    match extract_error_message(body) {
        Some(message) => Err(anyhow::anyhow!("API request failed: {}: {}", status, message)),
        None => Err(anyhow::anyhow!("API request failed: {}", status)),
    }
}

fn decode(body: &str) -> Result<Value> {
    // Handle empty response (204 and friends)
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(body).context("Failed to parse response JSON")
}
