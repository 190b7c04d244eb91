//! Tenant context.
//!
//! The per-request principal and its effective site set. The context is
//! established once per request and passed explicitly to every service and
//! repository call; query layers build their site predicate from it rather
//! than looking anything up ambiently.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::{ActorId, ContractorId, SiteId};

/// Principal roles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Unrestricted site set
    GlobalAdmin,
    /// Sites the contractor is bound to
    ContractorAdmin,
    /// Exactly the worker's home site
    Worker,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GlobalAdmin => "GLOBAL_ADMIN",
            Self::ContractorAdmin => "CONTRACTOR_ADMIN",
            Self::Worker => "WORKER",
        }
    }
}

/// Site predicate derived from a context, consumed by every query builder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SiteFilter {
    /// No restriction (global admin)
    All,
    /// Restricted to the listed sites; an empty list denies everything
    Sites(Vec<SiteId>),
}

impl SiteFilter {
    /// Whether the filter admits the given site
    pub fn allows(&self, site_id: &SiteId) -> bool {
        match self {
            Self::All => true,
            Self::Sites(sites) => sites.contains(site_id),
        }
    }
}

/// Per-request principal and effective site visibility.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TenantContext {
    /// Authenticated principal
    pub actor_id: ActorId,
    /// Principal role
    pub role: Role,
    /// Home site, when the principal has one
    pub site_id: Option<SiteId>,
    /// Contractor binding, for contractor admins
    pub contractor_id: Option<ContractorId>,
    /// Effective site set; ignored for global admins
    pub accessible_sites: Vec<SiteId>,
}

impl TenantContext {
    /// Context for the global administrator
    pub fn global_admin(actor_id: ActorId) -> Self {
        Self {
            actor_id,
            role: Role::GlobalAdmin,
            site_id: None,
            contractor_id: None,
            accessible_sites: Vec::new(),
        }
    }

    /// Context for a contractor administrator with the sites the contractor
    /// is bound to. Until the set is computed the context authorizes nothing
    /// tenant-scoped.
    pub fn contractor_admin(
        actor_id: ActorId,
        contractor_id: ContractorId,
        accessible_sites: Vec<SiteId>,
    ) -> Self {
        Self {
            actor_id,
            role: Role::ContractorAdmin,
            site_id: accessible_sites.first().cloned(),
            contractor_id: Some(contractor_id),
            accessible_sites,
        }
    }

    /// Context for a worker, scoped to the home site
    pub fn worker(actor_id: ActorId, site_id: SiteId) -> Self {
        Self {
            actor_id,
            role: Role::Worker,
            site_id: Some(site_id.clone()),
            contractor_id: None,
            accessible_sites: vec![site_id],
        }
    }

    /// Whether the principal sees every site
    pub fn is_unrestricted(&self) -> bool {
        self.role == Role::GlobalAdmin
    }

    /// Whether the principal may act on the given site
    pub fn can_access_site(&self, site_id: &SiteId) -> bool {
        self.is_unrestricted() || self.accessible_sites.contains(site_id)
    }

    /// Fail with an authorization error if the site is out of scope
    pub fn require_site(&self, site_id: &SiteId) -> CoreResult<()> {
        if self.can_access_site(site_id) {
            Ok(())
        } else {
            Err(CoreError::authorization(format!(
                "site {site_id} is outside the principal's scope"
            )))
        }
    }

    /// Fail unless the principal holds one of the given roles
    pub fn require_role(&self, roles: &[Role]) -> CoreResult<()> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(CoreError::authorization(format!(
                "operation requires one of {:?}",
                roles
            )))
        }
    }

    /// Build the site predicate for queries issued under this context
    pub fn site_filter(&self) -> SiteFilter {
        if self.is_unrestricted() {
            SiteFilter::All
        } else {
            SiteFilter::Sites(self.accessible_sites.clone())
        }
    }
}
