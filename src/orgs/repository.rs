use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::types::{Invitation, InvitationStatus, Organization, OrganizationMembership};
use crate::access::OrgRole;
use crate::AuthError;

#[async_trait]
pub trait OrganizationRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Organization>, AuthError>;

    async fn create(&self, name: &str, slug: &str) -> Result<Organization, AuthError>;
}

#[async_trait]
pub trait MembershipRepository: Send + Sync {
    async fn find(
        &self,
        org_id: i64,
        user_id: i64,
    ) -> Result<Option<OrganizationMembership>, AuthError>;

    /// Inserts the membership, or updates its role if one already exists.
    async fn upsert(
        &self,
        org_id: i64,
        user_id: i64,
        role: OrgRole,
    ) -> Result<OrganizationMembership, AuthError>;

    async fn remove(&self, org_id: i64, user_id: i64) -> Result<(), AuthError>;

    async fn list_for_org(&self, org_id: i64) -> Result<Vec<OrganizationMembership>, AuthError>;

    /// Number of members holding the owner role. Guards the last-owner
    /// invariant, so it must count from current state, not a cache.
    async fn count_owners(&self, org_id: i64) -> Result<u64, AuthError>;
}

#[async_trait]
pub trait InvitationRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Invitation>, AuthError>;

    async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<Invitation>, AuthError>;

    /// Stored-pending invitations for this org and (lowercased) email.
    /// Callers still apply the expiry check; stored status lags reality.
    async fn find_pending(&self, org_id: i64, email: &str) -> Result<Vec<Invitation>, AuthError>;

    async fn create(&self, invitation: NewInvitation) -> Result<Invitation, AuthError>;

    /// Atomic compare-and-set on status: transitions `id` from `from` to
    /// `to` and reports whether this call performed the transition. Exactly
    /// one of any number of concurrent callers gets `true`.
    async fn conditional_update_status(
        &self,
        id: i64,
        from: InvitationStatus,
        to: InvitationStatus,
    ) -> Result<bool, AuthError>;

    /// Rewrites stored-pending invitations whose deadline passed before
    /// `cutoff` to `Expired`. Cosmetic; every read path already treats them
    /// as expired. Returns the number of rows touched.
    async fn mark_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AuthError>;
}

/// Fields required to create an invitation.
#[derive(Debug, Clone)]
pub struct NewInvitation {
    pub organization_id: i64,
    pub email: String,
    pub role: OrgRole,
    pub token_hash: String,
    pub invited_by: i64,
    pub expires_at: DateTime<Utc>,
}
