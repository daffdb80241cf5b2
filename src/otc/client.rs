//! OTC Client
//!
//! Main client for interacting with OTC APIs, combining authentication,
//! endpoint resolution and HTTP functionality.

use super::auth::{find_catalog_endpoint, AuthMethod, OtcCredentials, Session};
use super::http::OtcHttpClient;
use crate::config::CloudConfig;
use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashMap;
use url::Url;

/// Public host prefix of each service type used by the modules
const SERVICE_HOSTS: &[(&str, &str)] = &[("network", "vpc"), ("css", "css"), ("deh", "deh")];

/// Main OTC client
#[derive(Clone)]
pub struct OtcClient {
    pub credentials: OtcCredentials,
    pub http: OtcHttpClient,
    pub region: String,
    endpoint_overrides: HashMap<String, String>,
}

impl OtcClient {
    /// Create a new client from a cloud configuration
    pub fn new(config: &CloudConfig) -> Result<Self> {
        let method = AuthMethod::from_config(&config.auth)
            .context("Failed to initialize OTC credentials")?;
        let http = OtcHttpClient::new()?;
        let credentials = OtcCredentials::new(method, http.inner().clone());

        Ok(Self {
            credentials,
            http,
            region: config.effective_region(),
            endpoint_overrides: config.endpoints.clone(),
        })
    }

    /// Get the current authenticated session
    pub async fn session(&self) -> Result<Session> {
        self.credentials.session().await
    }

    /// Get the current access token
    pub async fn get_token(&self) -> Result<String> {
        self.credentials.get_token().await
    }

    /// Project the active token is scoped to
    pub async fn project_id(&self) -> Result<String> {
        Ok(self.session().await?.project_id)
    }

    /// Make a GET request to an OTC API
    pub async fn get(&self, url: &str) -> Result<Value> {
        let token = self.get_token().await?;
        self.http.get(url, &token).await
    }

    /// Make a GET request, `None` when the resource does not exist
    pub async fn get_optional(&self, url: &str) -> Result<Option<Value>> {
        let token = self.get_token().await?;
        self.http.get_optional(url, &token).await
    }

    /// Make a POST request to an OTC API
    pub async fn post(&self, url: &str, body: &Value) -> Result<Value> {
        let token = self.get_token().await?;
        self.http.post(url, &token, body).await
    }

    /// Make a PUT request to an OTC API
    pub async fn put(&self, url: &str, body: &Value) -> Result<Value> {
        let token = self.get_token().await?;
        self.http.put(url, &token, body).await
    }

    /// Make a DELETE request to an OTC API
    pub async fn delete(&self, url: &str) -> Result<Value> {
        let token = self.get_token().await?;
        self.http.delete(url, &token).await
    }

    /// Resolve the base URL (scheme + host + port) of a service.
    ///
    /// Order: configured override, token catalog, public naming scheme.
    pub async fn endpoint(&self, service_type: &str) -> Result<String> {
        if let Some(url) = self.endpoint_overrides.get(service_type) {
            return service_origin(url);
        }

        let session = self.session().await?;
        if let Some(url) = find_catalog_endpoint(&session.catalog, service_type, &self.region) {
            return service_origin(url);
        }

        let host = SERVICE_HOSTS
            .iter()
            .find(|(kind, _)| *kind == service_type)
            .map(|(_, host)| *host)
            .unwrap_or(service_type);
        Ok(format!("https://{}.{}.otc.t-systems.com", host, self.region))
    }

    // =========================================================================
    // Service URL helpers
    // =========================================================================

    /// Build a VPC (network) API URL
    pub async fn network_url(&self, path: &str) -> Result<String> {
        Ok(format!("{}/v2.0/{}", self.endpoint("network").await?, path))
    }

    /// Build a Cloud Search Service API URL
    pub async fn css_url(&self, path: &str) -> Result<String> {
        let base = self.endpoint("css").await?;
        Ok(format!("{}/v1.0/{}/{}", base, self.project_id().await?, path))
    }

    /// Build a Dedicated Host API URL
    pub async fn deh_url(&self, path: &str) -> Result<String> {
        let base = self.endpoint("deh").await?;
        Ok(format!("{}/v1.0/{}/{}", base, self.project_id().await?, path))
    }
}

/// Reduce an endpoint URL to its origin, dropping version and project paths
pub fn service_origin(raw: &str) -> Result<String> {
    let url = Url::parse(raw).with_context(|| format!("Invalid endpoint URL: {}", raw))?;
    if !url.has_host() {
        anyhow::bail!("Endpoint URL has no host: {}", raw);
    }
    Ok(url.origin().ascii_serialization())
}

/// Append query parameters to a URL, skipping empty values
pub fn add_query_params(url: &str, params: &[(&str, String)]) -> String {
    let query_parts: Vec<String> = params
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
        .collect();

    if query_parts.is_empty() {
        url.to_string()
    } else if url.contains('?') {
        format!("{}&{}", url, query_parts.join("&"))
    } else {
        format!("{}?{}", url, query_parts.join("&"))
    }
}
