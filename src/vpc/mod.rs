//! VPC resources
//!
//! Peering and router models, the [`VpcApi`] seam the peering reconciler
//! works against, and its implementations.
//!
//! - [`api`] - `VpcApi` over the real OTC client
//! - `mock` - in-memory `VpcApi` that records every call, for tests
//! - [`peering`] - create/update/delete reconciliation of peerings

pub mod api;
#[doc(hidden)]
pub mod mock;
pub mod peering;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use peering::{DesiredState, PeeringOutcome, PeeringReconciler, PeeringRequest};

/// One side of an existing peering connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpcInfo {
    pub vpc_id: String,
    #[serde(
        default,
        rename = "tenant_id",
        alias = "project_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub project_id: Option<String>,
}

/// A VPC peering connection as returned by the provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeeringRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(rename = "request_vpc_info")]
    pub local_vpc_info: VpcInfo,
    #[serde(rename = "accept_vpc_info")]
    pub peer_vpc_info: VpcInfo,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl PeeringRecord {
    /// True when this peering joins `a` and `b`, in either direction
    pub fn connects(&self, a: &str, b: &str) -> bool {
        let local = self.local_vpc_info.vpc_id.as_str();
        let peer = self.peer_vpc_info.vpc_id.as_str();
        (local == a && peer == b) || (local == b && peer == a)
    }
}

/// One side of a peering create request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VpcRef {
    pub vpc_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

/// Body of a peering create request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PeeringAttributes {
    pub name: String,
    #[serde(rename = "request_vpc_info")]
    pub local_vpc_info: VpcRef,
    #[serde(rename = "accept_vpc_info")]
    pub peer_vpc_info: VpcRef,
}

/// Updatable peering attributes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PeeringUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl PeeringUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
    }
}

/// A router (the VPC itself in OTC's network API)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Router {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, alias = "project_id")]
    pub tenant_id: Option<String>,
}

/// Operations the peering reconciler needs from the cloud
#[async_trait::async_trait]
pub trait VpcApi: Send + Sync {
    /// Find a peering by id, then by name; `None` when absent
    async fn find_peering(&self, name_or_id: &str) -> Result<Option<PeeringRecord>>;

    async fn list_peerings(&self) -> Result<Vec<PeeringRecord>>;

    async fn create_peering(&self, attrs: &PeeringAttributes) -> Result<PeeringRecord>;

    async fn update_peering(
        &self,
        peering: &PeeringRecord,
        update: &PeeringUpdate,
    ) -> Result<PeeringRecord>;

    async fn delete_peering(&self, peering: &PeeringRecord) -> Result<()>;

    /// Find a router by id, then by name; `None` when absent
    async fn find_router(&self, name_or_id: &str) -> Result<Option<Router>>;

    /// Project the caller is authenticated against
    async fn current_project_id(&self) -> Result<String>;
}
