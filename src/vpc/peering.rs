//! VPC peering reconciliation
//!
//! Drives a peering connection towards the requested state. The procedure is
//! a single pass: look up the existing peering, then create, rename, delete or
//! leave it alone. In check mode every decision is still computed but the
//! mutating call is skipped.
//!
//! The duplicate scan and the create call are two separate requests, so two
//! concurrent invocations can both pass the scan and both create. The
//! provider offers no conditional create to close that window.

use super::{PeeringAttributes, PeeringRecord, PeeringUpdate, VpcApi, VpcRef};
use crate::error::{ModuleError, Result};
use serde::Serialize;

pub const MSG_LOCAL_ROUTER_NOT_FOUND: &str = "Local router not found";
pub const MSG_ALREADY_PEERED: &str =
    "A VPC peering connection already exists between the two routers.";
pub const MSG_PEERING_NOT_FOUND: &str = "Resource with this name doesn't exist";
pub const MSG_DELETED: &str = "Resource was deleted";

/// Whether the peering should exist
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum DesiredState {
    #[default]
    Present,
    Absent,
}

/// Parameters of one peering invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeeringRequest {
    /// Name of the peering; lookup key when no id is given
    pub name: Option<String>,
    pub id: Option<String>,
    pub state: DesiredState,
    /// Name or id of the local router
    pub local_router: Option<String>,
    pub local_project: Option<String>,
    /// Id of the remote router, never resolved locally
    pub remote_router: Option<String>,
    pub remote_project: Option<String>,
}

impl PeeringRequest {
    /// Check the parameters every invocation needs.
    ///
    /// The router and project parameters are only demanded once the create
    /// path is reached, see [`PeeringRequest::create_params`].
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.name.is_none() && self.id.is_none() {
            missing.push("name or id".to_string());
        }
        if self.state == DesiredState::Present && self.name.is_none() && missing.is_empty() {
            missing.push("name".to_string());
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ModuleError::InvalidParameters(missing))
        }
    }

    /// The name/router/project parameters the create path needs
    pub fn create_params(&self) -> Result<CreateParams<'_>> {
        match (
            self.name.as_deref(),
            self.local_router.as_deref(),
            self.local_project.as_deref(),
            self.remote_router.as_deref(),
            self.remote_project.as_deref(),
        ) {
            (
                Some(name),
                Some(local_router),
                Some(local_project),
                Some(remote_router),
                Some(remote_project),
            ) => Ok(CreateParams {
                name,
                local_router,
                local_project,
                remote_router,
                remote_project,
            }),
            (name, local_router, local_project, remote_router, remote_project) => {
                let missing = [
                    ("name", name.is_none()),
                    ("local_router", local_router.is_none()),
                    ("local_project", local_project.is_none()),
                    ("remote_router", remote_router.is_none()),
                    ("remote_project", remote_project.is_none()),
                ]
                .into_iter()
                .filter(|(_, absent)| *absent)
                .map(|(key, _)| key.to_string())
                .collect();
                Err(ModuleError::InvalidParameters(missing))
            }
        }
    }

    fn lookup_key(&self) -> Option<&str> {
        self.id.as_deref().or(self.name.as_deref())
    }
}

/// Borrowed view of the parameters required to create a peering
#[derive(Debug, Clone, Copy)]
pub struct CreateParams<'a> {
    pub name: &'a str,
    pub local_router: &'a str,
    pub local_project: &'a str,
    pub remote_router: &'a str,
    pub remote_project: &'a str,
}

/// Result of a reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PeeringOutcome {
    pub changed: bool,
    #[serde(rename = "vpc_peering", skip_serializing_if = "Option::is_none")]
    pub peering: Option<PeeringRecord>,
    #[serde(rename = "result", skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PeeringOutcome {
    fn predicted(changed: bool) -> Self {
        Self {
            changed,
            ..Default::default()
        }
    }
}

/// Build the create body for a peering between a resolved local router and
/// an opaque remote router id.
///
/// The provider rejects `tenant_id` when both sides live in the same project,
/// but needs it on both sides when the caller creates from the local project
/// towards a different one.
pub fn build_attributes(
    params: &CreateParams<'_>,
    local_router_id: &str,
    active_project: &str,
) -> PeeringAttributes {
    let cross_project =
        active_project == params.local_project && params.local_project != params.remote_project;

    PeeringAttributes {
        name: params.name.to_string(),
        local_vpc_info: VpcRef {
            vpc_id: local_router_id.to_string(),
            tenant_id: cross_project.then(|| params.local_project.to_string()),
        },
        peer_vpc_info: VpcRef {
            vpc_id: params.remote_router.to_string(),
            tenant_id: cross_project.then(|| params.remote_project.to_string()),
        },
    }
}

/// Attribute changes needed to bring `existing` in line with the request
pub fn diff(request: &PeeringRequest, existing: &PeeringRecord) -> PeeringUpdate {
    PeeringUpdate {
        name: request
            .name
            .as_ref()
            .filter(|name| **name != existing.name)
            .cloned(),
    }
}

/// Reconciles one peering against a [`VpcApi`]
pub struct PeeringReconciler<'a, A: VpcApi + ?Sized> {
    api: &'a A,
    check_mode: bool,
}

impl<'a, A: VpcApi + ?Sized> PeeringReconciler<'a, A> {
    pub fn new(api: &'a A) -> Self {
        Self {
            api,
            check_mode: false,
        }
    }

    /// Predict the outcome without issuing create/update/delete calls
    pub fn check_mode(mut self, enabled: bool) -> Self {
        self.check_mode = enabled;
        self
    }

    pub async fn reconcile(&self, request: &PeeringRequest) -> Result<PeeringOutcome> {
        request.validate()?;

        let existing = match request.lookup_key() {
            Some(key) => self.api.find_peering(key).await?,
            None => None,
        };

        match request.state {
            DesiredState::Present => match existing {
                Some(peering) => self.update(request, peering).await,
                None => self.create(request).await,
            },
            DesiredState::Absent => self.delete(existing).await,
        }
    }

    async fn update(
        &self,
        request: &PeeringRequest,
        existing: PeeringRecord,
    ) -> Result<PeeringOutcome> {
        let update = diff(request, &existing);

        if update.is_empty() {
            tracing::info!("Peering {} is up to date", existing.id);
            if self.check_mode {
                return Ok(PeeringOutcome::predicted(false));
            }
            return Ok(PeeringOutcome {
                changed: false,
                peering: Some(existing),
                message: None,
            });
        }

        if self.check_mode {
            tracing::info!("Check mode: would rename peering {}", existing.id);
            return Ok(PeeringOutcome::predicted(true));
        }

        tracing::info!("Renaming peering {} to {:?}", existing.id, update.name);
        let updated = self.api.update_peering(&existing, &update).await?;

        Ok(PeeringOutcome {
            changed: true,
            peering: Some(updated),
            message: None,
        })
    }

    async fn create(&self, request: &PeeringRequest) -> Result<PeeringOutcome> {
        let params = request.create_params()?;

        let local_router = self
            .api
            .find_router(params.local_router)
            .await?
            .ok_or_else(|| ModuleError::not_found(MSG_LOCAL_ROUTER_NOT_FOUND))?;

        let active_project = self.api.current_project_id().await?;
        let attrs = build_attributes(&params, &local_router.id, &active_project);

        if self.peering_exists(&local_router.id, params.remote_router).await? {
            tracing::warn!(
                "Peering between {} and {} already exists",
                local_router.id,
                params.remote_router
            );
            return Err(ModuleError::conflict(MSG_ALREADY_PEERED));
        }

        if self.check_mode {
            tracing::info!("Check mode: would create peering {}", params.name);
            return Ok(PeeringOutcome::predicted(true));
        }

        tracing::info!(
            "Creating peering {} between {} and {}",
            params.name,
            local_router.id,
            params.remote_router
        );
        let created = self.api.create_peering(&attrs).await?;

        Ok(PeeringOutcome {
            changed: true,
            peering: Some(created),
            message: None,
        })
    }

    async fn delete(&self, existing: Option<PeeringRecord>) -> Result<PeeringOutcome> {
        let Some(peering) = existing else {
            return Err(ModuleError::not_found(MSG_PEERING_NOT_FOUND));
        };

        if self.check_mode {
            tracing::info!("Check mode: would delete peering {}", peering.id);
            return Ok(PeeringOutcome::predicted(true));
        }

        tracing::info!("Deleting peering {}", peering.id);
        self.api.delete_peering(&peering).await?;

        Ok(PeeringOutcome {
            changed: true,
            peering: None,
            message: Some(MSG_DELETED.to_string()),
        })
    }

    /// Scan every peering for one joining the two VPCs in either direction
    async fn peering_exists(&self, local_id: &str, remote_id: &str) -> Result<bool> {
        let peerings = self.api.list_peerings().await?;
        Ok(peerings.iter().any(|p| p.connects(local_id, remote_id)))
    }
}
