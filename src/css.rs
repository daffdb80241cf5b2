//! Cloud Search Service cluster info

use crate::otc::client::{add_query_params, OtcClient};
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;

/// Parameters of a cluster info query
#[derive(Debug, Clone, clap::Args)]
pub struct ClusterInfoParams {
    /// Cluster name or id
    #[arg(long)]
    pub name: Option<String>,

    /// Index of the first cluster to list
    #[arg(long, default_value_t = 1)]
    pub start: u32,

    /// Maximum number of clusters to list
    #[arg(long)]
    pub limit: Option<u32>,
}

impl Default for ClusterInfoParams {
    fn default() -> Self {
        Self {
            name: None,
            start: 1,
            limit: None,
        }
    }
}

impl ClusterInfoParams {
    fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if self.start > 0 {
            query.push(("start", self.start.to_string()));
        }
        if let Some(limit) = self.limit.filter(|l| *l > 0) {
            query.push(("limit", limit.to_string()));
        }
        query
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterInfo {
    pub changed: bool,
    pub clusters: Vec<Value>,
}

pub async fn cluster_info(client: &OtcClient, params: &ClusterInfoParams) -> Result<ClusterInfo> {
    let clusters = match &params.name {
        Some(name) => find_cluster(client, name).await?.into_iter().collect(),
        None => list_clusters(client, params).await?,
    };

    tracing::debug!("Found {} CSS clusters", clusters.len());
    Ok(ClusterInfo {
        changed: false,
        clusters,
    })
}

async fn list_clusters(client: &OtcClient, params: &ClusterInfoParams) -> Result<Vec<Value>> {
    let url = add_query_params(&client.css_url("clusters").await?, &params.query());
    let response = client.get(&url).await?;
    clusters_of(response)
}

/// Look a cluster up by id, then by exact name in the full listing
async fn find_cluster(client: &OtcClient, name_or_id: &str) -> Result<Option<Value>> {
    let url = client
        .css_url(&format!("clusters/{}", urlencoding::encode(name_or_id)))
        .await?;
    if let Some(mut response) = client.get_optional(&url).await? {
        if let Some(cluster) = response.get_mut("cluster").map(Value::take) {
            return Ok(Some(cluster));
        }
    }

    let response = client.get(&client.css_url("clusters").await?).await?;
    Ok(clusters_of(response)?
        .into_iter()
        .find(|c| c.get("name").and_then(Value::as_str) == Some(name_or_id)))
}

fn clusters_of(mut response: Value) -> Result<Vec<Value>> {
    let clusters = response
        .get_mut("clusters")
        .map(Value::take)
        .context("Response has no 'clusters' field")?;
    serde_json::from_value(clusters).context("Failed to decode CSS clusters")
}
