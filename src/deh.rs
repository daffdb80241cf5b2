//! Dedicated Host info

use crate::otc::client::{add_query_params, OtcClient};
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;

/// Allocation state of a dedicated host
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum HostStatus {
    Available,
    Fault,
    Released,
}

impl HostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostStatus::Available => "available",
            HostStatus::Fault => "fault",
            HostStatus::Released => "released",
        }
    }
}

/// Parameters of a host info query
#[derive(Debug, Clone, Default, clap::Args)]
pub struct HostInfoParams {
    /// Host name or id
    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub availability_zone: Option<String>,

    /// Only hosts changed since this timestamp
    #[arg(long)]
    pub changes_since: Option<String>,

    #[arg(long)]
    pub flavor: Option<String>,

    #[arg(long)]
    pub host_type: Option<String>,

    #[arg(long)]
    pub host_type_name: Option<String>,

    /// Only hosts running this instance
    #[arg(long)]
    pub instance_uuid: Option<String>,

    #[arg(long)]
    pub released_at: Option<String>,

    #[arg(long, value_enum)]
    pub status: Option<HostStatus>,

    /// Tags, comma separated
    #[arg(long, value_delimiter = ',')]
    pub tags: Vec<String>,
}

impl HostInfoParams {
    /// Query filters for the listing, `host_id` being the resolved host
    fn query(&self, host_id: Option<&str>) -> Vec<(&'static str, String)> {
        let optional = [
            ("dedicated_host_id", host_id.map(str::to_string)),
            ("availability_zone", self.availability_zone.clone()),
            ("changes-since", self.changes_since.clone()),
            ("flavor", self.flavor.clone()),
            ("host_type", self.host_type.clone()),
            ("host_type_name", self.host_type_name.clone()),
            ("instance_uuid", self.instance_uuid.clone()),
            ("released_at", self.released_at.clone()),
            ("state", self.status.map(|s| s.as_str().to_string())),
        ];

        let mut query: Vec<_> = optional
            .into_iter()
            .filter_map(|(key, value)| value.map(|v| (key, v)))
            .collect();
        if !self.tags.is_empty() {
            query.push(("tags", self.tags.join(",")));
        }
        query
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostInfo {
    pub changed: bool,
    pub deh_hosts: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

pub async fn host_info(client: &OtcClient, params: &HostInfoParams) -> Result<HostInfo> {
    let host_id = match &params.host {
        Some(host) => match find_host_id(client, host).await? {
            Some(id) => Some(id),
            None => {
                tracing::info!("No dedicated host matches {}", host);
                return Ok(HostInfo {
                    changed: false,
                    deh_hosts: Vec::new(),
                    msg: Some(format!("No DEH host found with name or id: {}", host)),
                });
            }
        },
        None => None,
    };

    let base = client.deh_url("dedicated-hosts").await?;
    let url = add_query_params(&base, &params.query(host_id.as_deref()));
    let deh_hosts = hosts_of(client.get(&url).await?)?;

    tracing::debug!("Found {} dedicated hosts", deh_hosts.len());
    Ok(HostInfo {
        changed: false,
        deh_hosts,
        msg: None,
    })
}

/// Resolve a host by id, then by exact name
async fn find_host_id(client: &OtcClient, name_or_id: &str) -> Result<Option<String>> {
    let url = client
        .deh_url(&format!("dedicated-hosts/{}", urlencoding::encode(name_or_id)))
        .await?;
    if let Some(response) = client.get_optional(&url).await? {
        if let Some(id) = host_id_of(response.get("dedicated_host")) {
            return Ok(Some(id));
        }
    }

    let base = client.deh_url("dedicated-hosts").await?;
    let url = add_query_params(&base, &[("name", name_or_id.to_string())]);
    let found = hosts_of(client.get(&url).await?)?
        .iter()
        .find(|h| h.get("name").and_then(Value::as_str) == Some(name_or_id))
        .and_then(|h| host_id_of(Some(h)));
    Ok(found)
}

fn host_id_of(host: Option<&Value>) -> Option<String> {
    host?
        .get("dedicated_host_id")
        .or_else(|| host?.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn hosts_of(mut response: Value) -> Result<Vec<Value>> {
    let hosts = response
        .get_mut("dedicated_hosts")
        .map(Value::take)
        .context("Response has no 'dedicated_hosts' field")?;
    serde_json::from_value(hosts).context("Failed to decode dedicated hosts")
}
