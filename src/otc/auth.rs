//! OTC Authentication
//!
//! Obtains project-scoped Keystone v3 tokens from the IAM service, either
//! with a username/password or by reusing a pre-issued token.

use crate::config::AuthConfig;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Response header carrying a freshly issued token
pub const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";

/// Token expiry buffer - refresh tokens this much before they actually expire
/// This prevents using tokens that are about to expire during a request
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Default token TTL if we can't determine expiry (conservative: 30 minutes)
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// How the token is scoped to a project
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectScope {
    Id(String),
    Name(String),
}

/// Supported authentication methods
#[derive(Debug, Clone)]
pub enum AuthMethod {
    Password {
        auth_url: String,
        username: String,
        password: String,
        domain: String,
        project: ProjectScope,
    },
    Token {
        token: String,
        project_id: String,
    },
}

impl AuthMethod {
    /// Derive the method from a cloud's auth block
    pub fn from_config(auth: &AuthConfig) -> Result<Self> {
        if let Some(token) = auth.token.clone() {
            let project_id = auth
                .project_id
                .clone()
                .context("project_id is required with token authentication")?;
            return Ok(Self::Token { token, project_id });
        }

        let project = auth
            .project_id
            .clone()
            .map(ProjectScope::Id)
            .or_else(|| auth.project_name.clone().map(ProjectScope::Name));

        match (
            auth.auth_url.clone(),
            auth.username.clone(),
            auth.password.clone(),
            auth.user_domain_name.clone(),
            project,
        ) {
            (Some(auth_url), Some(username), Some(password), Some(domain), Some(project)) => {
                Ok(Self::Password {
                    auth_url,
                    username,
                    password,
                    domain,
                    project,
                })
            }
            (auth_url, username, password, domain, project) => {
                let missing: Vec<&str> = [
                    (auth_url.is_none(), "auth_url"),
                    (username.is_none(), "username"),
                    (password.is_none(), "password"),
                    (domain.is_none(), "user_domain_name"),
                    (project.is_none(), "project_id or project_name"),
                ]
                .into_iter()
                .filter(|(absent, _)| *absent)
                .map(|(_, name)| name)
                .collect();
                anyhow::bail!("Missing auth parameters: {}", missing.join(", "))
            }
        }
    }
}

/// Build the Keystone token URL from an auth_url with or without `/v3`
pub fn token_url(auth_url: &str) -> String {
    let base = auth_url.trim_end_matches('/');
    if base.ends_with("/v3") {
        format!("{}/auth/tokens", base)
    } else {
        format!("{}/v3/auth/tokens", base)
    }
}

/// Keystone password-auth request body
pub fn password_request(
    username: &str,
    password: &str,
    domain: &str,
    project: &ProjectScope,
) -> serde_json::Value {
    let scope = match project {
        ProjectScope::Id(id) => json!({ "project": { "id": id } }),
        ProjectScope::Name(name) => json!({
            "project": { "name": name, "domain": { "name": domain } }
        }),
    };

    json!({
        "auth": {
            "identity": {
                "methods": ["password"],
                "password": {
                    "user": {
                        "name": username,
                        "password": password,
                        "domain": { "name": domain }
                    }
                }
            },
            "scope": scope
        }
    })
}

/// One endpoint of a catalog service
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEndpoint {
    #[serde(default)]
    pub interface: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub region_id: Option<String>,
    pub url: String,
}

/// A service in the token's catalog
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogService {
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(default)]
    pub endpoints: Vec<CatalogEndpoint>,
}

/// Find the public endpoint of a service, preferring the given region
pub fn find_catalog_endpoint<'a>(
    catalog: &'a [CatalogService],
    service_type: &str,
    region: &str,
) -> Option<&'a str> {
    let endpoints: Vec<&CatalogEndpoint> = catalog
        .iter()
        .filter(|s| s.service_type == service_type)
        .flat_map(|s| s.endpoints.iter())
        .filter(|e| e.interface == "public")
        .collect();

    endpoints
        .iter()
        .find(|e| {
            e.region.as_deref() == Some(region) || e.region_id.as_deref() == Some(region)
        })
        .or_else(|| endpoints.first())
        .map(|e| e.url.as_str())
}

#[derive(Deserialize)]
struct TokenResponse {
    token: TokenBody,
}

#[derive(Deserialize)]
struct TokenBody {
    #[serde(default)]
    expires_at: Option<String>,
    #[serde(default)]
    project: Option<ProjectRef>,
    #[serde(default)]
    catalog: Vec<CatalogService>,
}

#[derive(Deserialize)]
struct ProjectRef {
    id: String,
}

/// An authenticated session: token, its project and service catalog
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub project_id: String,
    pub catalog: Arc<Vec<CatalogService>>,
}

#[derive(Clone)]
struct CachedToken {
    session: Session,
    /// When this token expires (with buffer applied)
    expires_at: Instant,
}

impl CachedToken {
    /// Check if this cached token is still valid
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Remaining lifetime of a token given its RFC 3339 `expires_at`
fn token_lifetime(expires_at: Option<&str>) -> Duration {
    expires_at
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .and_then(|at| (at.with_timezone(&Utc) - Utc::now()).to_std().ok())
        .unwrap_or(DEFAULT_TOKEN_TTL)
}

/// OTC credentials holder with token caching
#[derive(Clone)]
pub struct OtcCredentials {
    method: Arc<AuthMethod>,
    http: reqwest::Client,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

impl OtcCredentials {
    pub fn new(method: AuthMethod, http: reqwest::Client) -> Self {
        Self {
            method: Arc::new(method),
            http,
            token_cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Get the active session, issuing a new token when the cached one expired
    pub async fn session(&self) -> Result<Session> {
        // Check cache first - but only return if token is still valid
        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.session.clone());
                }
                tracing::debug!("Cached token expired, fetching new token");
            }
        }

        let (session, lifetime) = self.issue().await?;
        let expires_at = Instant::now() + lifetime.saturating_sub(TOKEN_EXPIRY_BUFFER);

        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                session: session.clone(),
                expires_at,
            });
        }

        tracing::debug!(
            "New token cached for project {}, expires in ~{} minutes",
            session.project_id,
            lifetime.saturating_sub(TOKEN_EXPIRY_BUFFER).as_secs() / 60
        );

        Ok(session)
    }

    /// Get an access token for API calls
    pub async fn get_token(&self) -> Result<String> {
        Ok(self.session().await?.token)
    }

    /// Force refresh the token
    pub async fn refresh_token(&self) -> Result<String> {
        {
            let mut cache = self.token_cache.write().await;
            *cache = None;
        }

        self.get_token().await
    }

    async fn issue(&self) -> Result<(Session, Duration)> {
        match self.method.as_ref() {
            AuthMethod::Token { token, project_id } => Ok((
                Session {
                    token: token.clone(),
                    project_id: project_id.clone(),
                    catalog: Arc::new(Vec::new()),
                },
                DEFAULT_TOKEN_TTL,
            )),
            AuthMethod::Password {
                auth_url,
                username,
                password,
                domain,
                project,
            } => {
                let url = token_url(auth_url);
                tracing::info!("Requesting token from {} for user {}", url, username);

                let body = password_request(username, password, domain, project);
                let response = self
                    .http
                    .post(&url)
                    .json(&body)
                    .send()
                    .await
                    .context("Failed to reach the identity service")?;

                let status = response.status();
                if !status.is_success() {
                    let text = response.text().await.unwrap_or_default();
                    return Err(match super::http::extract_error_message(&text) {
                        Some(message) => {
                            anyhow::anyhow!("Authentication failed: {}: {}", status, message)
                        }
                        None => anyhow::anyhow!("Authentication failed: {}", status),
                    });
                }

                let token = response
                    .headers()
                    .get(SUBJECT_TOKEN_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .map(|s| s.to_string())
                    .context("Identity service did not return a token")?;

                let parsed: TokenResponse = response
                    .json()
                    .await
                    .context("Failed to parse token response")?;

                let project_id = match (parsed.token.project, project) {
                    (Some(p), _) => p.id,
                    (None, ProjectScope::Id(id)) => id.clone(),
                    (None, ProjectScope::Name(name)) => {
                        anyhow::bail!("Token response carries no id for project {}", name)
                    }
                };

                let lifetime = token_lifetime(parsed.token.expires_at.as_deref());

                Ok((
                    Session {
                        token,
                        project_id,
                        catalog: Arc::new(parsed.token.catalog),
                    },
                    lifetime,
                ))
            }
        }
    }
}
