//! Configuration Management
//!
//! Loads cloud connection settings from a `clouds.yaml` file and the usual
//! `OS_*` environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Region used when neither the file nor the environment names one
pub const DEFAULT_REGION: &str = "eu-de";

/// Root of a `clouds.yaml` file
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CloudsFile {
    #[serde(default)]
    pub clouds: HashMap<String, CloudConfig>,
}

/// Settings for a single cloud entry
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CloudConfig {
    #[serde(default)]
    pub region_name: Option<String>,
    #[serde(default)]
    pub auth: AuthConfig,
    /// Per service-type endpoint overrides (e.g. `network: https://...`)
    #[serde(default)]
    pub endpoints: HashMap<String, String>,
}

/// Credentials block of a cloud entry
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub auth_url: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default, alias = "domain_name")]
    pub user_domain_name: Option<String>,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

impl CloudConfig {
    /// Load the named cloud (or the only one) and apply environment overrides.
    ///
    /// A missing file is not an error: the environment alone may carry the
    /// whole configuration.
    pub fn load(path: Option<&Path>, cloud: Option<&str>) -> Result<Self> {
        let mut config = match Self::find_file(path)? {
            Some(file) => {
                let content = std::fs::read_to_string(&file)
                    .with_context(|| format!("Failed to read {}", file.display()))?;
                let parsed: CloudsFile = serde_yaml::from_str(&content)
                    .with_context(|| format!("Failed to parse {}", file.display()))?;
                tracing::debug!("Loaded clouds file {:?}", file);

                let requested = cloud
                    .map(str::to_string)
                    .or_else(|| std::env::var("OS_CLOUD").ok());
                Self::select(parsed, requested.as_deref())
                    .with_context(|| format!("Invalid cloud selection in {}", file.display()))?
            }
            None => Self::default(),
        };

        config.apply_env();
        Ok(config)
    }

    /// Locate the clouds file (flag > OS_CLIENT_CONFIG_FILE > cwd > config dir)
    fn find_file(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if !path.exists() {
                anyhow::bail!("Configuration file not found: {}", path.display());
            }
            return Ok(Some(path.to_path_buf()));
        }

        if let Ok(path) = std::env::var("OS_CLIENT_CONFIG_FILE") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Ok(Some(path));
            }
            tracing::warn!("OS_CLIENT_CONFIG_FILE points to a missing file: {:?}", path);
        }

        let local = PathBuf::from("clouds.yaml");
        if local.exists() {
            return Ok(Some(local));
        }

        Ok(dirs::config_dir()
            .map(|p| p.join("openstack").join("clouds.yaml"))
            .filter(|p| p.exists()))
    }

    /// Pick a cloud entry out of a parsed file
    pub fn select(mut file: CloudsFile, name: Option<&str>) -> Result<Self> {
        match name {
            Some(name) => file
                .clouds
                .remove(name)
                .ok_or_else(|| anyhow::anyhow!("Cloud '{}' is not defined", name)),
            None if file.clouds.len() == 1 => Ok(file
                .clouds
                .into_values()
                .next()
                .unwrap_or_default()),
            None if file.clouds.is_empty() => Ok(Self::default()),
            None => Err(anyhow::anyhow!(
                "Several clouds are defined, pick one with --cloud or OS_CLOUD"
            )),
        }
    }

    /// Apply `OS_*` overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply `OS_*` overrides from an arbitrary lookup
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |slot: &mut Option<String>, key: &str| {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *slot = Some(value);
            }
        };

        set(&mut self.auth.auth_url, "OS_AUTH_URL");
        set(&mut self.auth.username, "OS_USERNAME");
        set(&mut self.auth.password, "OS_PASSWORD");
        set(&mut self.auth.user_domain_name, "OS_USER_DOMAIN_NAME");
        set(&mut self.auth.project_name, "OS_PROJECT_NAME");
        set(&mut self.auth.project_id, "OS_PROJECT_ID");
        set(&mut self.auth.token, "OS_AUTH_TOKEN");
        set(&mut self.region_name, "OS_REGION_NAME");
    }

    /// Get effective region (flag/env/file > default)
    pub fn effective_region(&self) -> String {
        self.region_name
            .clone()
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_REGION.to_string())
    }
}
