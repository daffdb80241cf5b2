//! In-memory VPC backend.
//!
//! Serves peerings and routers from memory and records every call, so the
//! reconciler can be exercised deterministically without a cloud.

use super::{PeeringAttributes, PeeringRecord, PeeringUpdate, Router, VpcApi, VpcInfo};
use anyhow::Result;
use std::sync::Mutex;

/// A call made against [`MockVpc`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VpcCall {
    FindPeering(String),
    ListPeerings,
    CreatePeering(PeeringAttributes),
    UpdatePeering { id: String, update: PeeringUpdate },
    DeletePeering(String),
    FindRouter(String),
    CurrentProjectId,
}

impl VpcCall {
    /// True for calls that change provider state
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            VpcCall::CreatePeering(_) | VpcCall::UpdatePeering { .. } | VpcCall::DeletePeering(_)
        )
    }
}

#[derive(Debug, Default)]
struct State {
    peerings: Vec<PeeringRecord>,
    routers: Vec<Router>,
    calls: Vec<VpcCall>,
    next_id: usize,
}

/// A test-double backed by in-memory peerings and routers.
#[derive(Debug)]
pub struct MockVpc {
    project_id: String,
    state: Mutex<State>,
}

impl MockVpc {
    pub fn new(project_id: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            state: Mutex::new(State::default()),
        }
    }

    /// Add a router the backend can resolve by id or name.
    pub fn with_router(self, id: &str, name: &str) -> Self {
        self.lock().routers.push(Router {
            id: id.to_string(),
            name: name.to_string(),
            status: "ACTIVE".to_string(),
            tenant_id: Some(self.project_id.clone()),
        });
        self
    }

    /// Add an existing peering between two VPC ids.
    pub fn with_peering(self, id: &str, name: &str, local: &str, peer: &str) -> Self {
        self.lock().peerings.push(PeeringRecord {
            id: id.to_string(),
            name: name.to_string(),
            status: "ACTIVE".to_string(),
            local_vpc_info: VpcInfo {
                vpc_id: local.to_string(),
                project_id: Some(self.project_id.clone()),
            },
            peer_vpc_info: VpcInfo {
                vpc_id: peer.to_string(),
                project_id: Some(self.project_id.clone()),
            },
            ..Default::default()
        });
        self
    }

    /// All calls made so far, in order.
    pub fn calls(&self) -> Vec<VpcCall> {
        self.lock().calls.clone()
    }

    /// Only the calls that changed state.
    pub fn mutations(&self) -> Vec<VpcCall> {
        self.calls().into_iter().filter(VpcCall::is_mutation).collect()
    }

    /// Current peerings.
    pub fn peerings(&self) -> Vec<PeeringRecord> {
        self.lock().peerings.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A panicking test thread must not hide the recorded calls from others
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, call: VpcCall) {
        self.lock().calls.push(call);
    }
}

#[async_trait::async_trait]
impl VpcApi for MockVpc {
    async fn find_peering(&self, name_or_id: &str) -> Result<Option<PeeringRecord>> {
        self.record(VpcCall::FindPeering(name_or_id.to_string()));
        let state = self.lock();
        let found = state
            .peerings
            .iter()
            .find(|p| p.id == name_or_id)
            .or_else(|| state.peerings.iter().find(|p| p.name == name_or_id))
            .cloned();
        Ok(found)
    }

    async fn list_peerings(&self) -> Result<Vec<PeeringRecord>> {
        self.record(VpcCall::ListPeerings);
        Ok(self.peerings())
    }

    async fn create_peering(&self, attrs: &PeeringAttributes) -> Result<PeeringRecord> {
        self.record(VpcCall::CreatePeering(attrs.clone()));
        let mut state = self.lock();
        state.next_id += 1;
        let record = PeeringRecord {
            id: format!("peering-{}", state.next_id),
            name: attrs.name.clone(),
            status: "PENDING_ACCEPTANCE".to_string(),
            local_vpc_info: VpcInfo {
                vpc_id: attrs.local_vpc_info.vpc_id.clone(),
                project_id: attrs.local_vpc_info.tenant_id.clone(),
            },
            peer_vpc_info: VpcInfo {
                vpc_id: attrs.peer_vpc_info.vpc_id.clone(),
                project_id: attrs.peer_vpc_info.tenant_id.clone(),
            },
            ..Default::default()
        };
        state.peerings.push(record.clone());
        Ok(record)
    }

    async fn update_peering(
        &self,
        peering: &PeeringRecord,
        update: &PeeringUpdate,
    ) -> Result<PeeringRecord> {
        self.record(VpcCall::UpdatePeering {
            id: peering.id.clone(),
            update: update.clone(),
        });
        let mut state = self.lock();
        let stored = state
            .peerings
            .iter_mut()
            .find(|p| p.id == peering.id)
            .ok_or_else(|| anyhow::anyhow!("API request failed: 404 Not Found"))?;
        if let Some(name) = &update.name {
            stored.name = name.clone();
        }
        Ok(stored.clone())
    }

    async fn delete_peering(&self, peering: &PeeringRecord) -> Result<()> {
        self.record(VpcCall::DeletePeering(peering.id.clone()));
        self.lock().peerings.retain(|p| p.id != peering.id);
        Ok(())
    }

    async fn find_router(&self, name_or_id: &str) -> Result<Option<Router>> {
        self.record(VpcCall::FindRouter(name_or_id.to_string()));
        let state = self.lock();
        let found = state
            .routers
            .iter()
            .find(|r| r.id == name_or_id)
            .or_else(|| state.routers.iter().find(|r| r.name == name_or_id))
            .cloned();
        Ok(found)
    }

    async fn current_project_id(&self) -> Result<String> {
        self.record(VpcCall::CurrentProjectId);
        Ok(self.project_id.clone())
    }
}
