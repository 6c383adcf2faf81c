//! Organization-scoped role checks.
//!
//! Roles form a strict total order, `Viewer < Member < Admin < Owner`, and
//! threshold checks compare against it. Owner-only actions do not go
//! through the threshold path; they use [`require_owner`], which demands
//! the exact top role. The instance-wide superuser flag never bypasses
//! these checks.

use serde::{Deserialize, Serialize};

use crate::orgs::MembershipRepository;
use crate::AuthError;

/// Role of a member within one organization.
///
/// Variant order is the privilege order; the derived `Ord` is load-bearing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrgRole {
    Viewer,
    Member,
    Admin,
    Owner,
}

impl OrgRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrgRole::Viewer => "viewer",
            OrgRole::Member => "member",
            OrgRole::Admin => "admin",
            OrgRole::Owner => "owner",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "viewer" => Some(OrgRole::Viewer),
            "member" => Some(OrgRole::Member),
            "admin" => Some(OrgRole::Admin),
            "owner" => Some(OrgRole::Owner),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrgRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requires the user to hold `minimum` or better in the organization.
///
/// Distinguishes "not a member at all" from "a member below the bar" so
/// callers can surface the two differently. Returns the membership's actual
/// role on success.
pub async fn require_role<M: MembershipRepository + ?Sized>(
    memberships: &M,
    org_id: i64,
    user_id: i64,
    minimum: OrgRole,
) -> Result<OrgRole, AuthError> {
    let membership = memberships
        .find(org_id, user_id)
        .await?
        .ok_or(AuthError::NotAMember)?;
    if membership.role < minimum {
        return Err(AuthError::InsufficientRole);
    }
    Ok(membership.role)
}

/// Requires the user to hold exactly the owner role.
pub async fn require_owner<M: MembershipRepository + ?Sized>(
    memberships: &M,
    org_id: i64,
    user_id: i64,
) -> Result<(), AuthError> {
    let membership = memberships
        .find(org_id, user_id)
        .await?
        .ok_or(AuthError::NotAMember)?;
    if membership.role != OrgRole::Owner {
        return Err(AuthError::InsufficientRole);
    }
    Ok(())
}

/// Convenience wrapper binding the checks to one membership store.
pub struct AccessGuard<M> {
    memberships: M,
}

impl<M: MembershipRepository> AccessGuard<M> {
    pub fn new(memberships: M) -> Self {
        Self { memberships }
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "access_check", skip(self), err)
    )]
    pub async fn check(
        &self,
        org_id: i64,
        user_id: i64,
        minimum: OrgRole,
    ) -> Result<OrgRole, AuthError> {
        require_role(&self.memberships, org_id, user_id, minimum).await
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "owner_check", skip(self), err)
    )]
    pub async fn check_owner(&self, org_id: i64, user_id: i64) -> Result<(), AuthError> {
        require_owner(&self.memberships, org_id, user_id).await
    }
}
