use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::repository::{
    InvitationRepository, MembershipRepository, NewInvitation, OrganizationRepository,
};
use super::types::{Invitation, InvitationStatus, Organization, OrganizationMembership};
use crate::access::OrgRole;
use crate::AuthError;

/// In-memory implementation of all three organization-side repositories.
///
/// Cloning shares the underlying store. The status compare-and-set runs
/// under a single write lock, so concurrent accept attempts in tests race
/// exactly the way they would against a database row.
#[derive(Clone, Default)]
pub struct MockOrgStore {
    inner: Arc<RwLock<StoreState>>,
}

#[derive(Default)]
struct StoreState {
    organizations: HashMap<i64, Organization>,
    memberships: HashMap<(i64, i64), OrganizationMembership>,
    invitations: HashMap<i64, Invitation>,
    next_org_id: i64,
    next_invitation_id: i64,
}

impl MockOrgStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_organization(&self, name: &str) -> Result<Organization, AuthError> {
        let mut state = self.write()?;
        Ok(insert_org(&mut state, name, &slugify(name)))
    }

    pub fn seed_membership(
        &self,
        org_id: i64,
        user_id: i64,
        role: OrgRole,
    ) -> Result<OrganizationMembership, AuthError> {
        let mut state = self.write()?;
        let now = Utc::now();
        let membership = OrganizationMembership {
            organization_id: org_id,
            user_id,
            role,
            created_at: now,
            updated_at: now,
        };
        state
            .memberships
            .insert((org_id, user_id), membership.clone());
        Ok(membership)
    }

    /// Direct read of a stored invitation, bypassing repository semantics.
    pub fn invitation(&self, id: i64) -> Option<Invitation> {
        self.inner
            .read()
            .ok()
            .and_then(|s| s.invitations.get(&id).cloned())
    }

    pub fn membership_count(&self, org_id: i64) -> usize {
        self.inner
            .read()
            .map(|s| {
                s.memberships
                    .keys()
                    .filter(|(org, _)| *org == org_id)
                    .count()
            })
            .unwrap_or(0)
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, StoreState>, AuthError> {
        self.inner
            .write()
            .map_err(|_| AuthError::Database("mock org store lock poisoned".into()))
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, StoreState>, AuthError> {
        self.inner
            .read()
            .map_err(|_| AuthError::Database("mock org store lock poisoned".into()))
    }
}

fn insert_org(state: &mut StoreState, name: &str, slug: &str) -> Organization {
    state.next_org_id += 1;
    let now = Utc::now();
    let org = Organization {
        id: state.next_org_id,
        name: name.to_owned(),
        slug: slug.to_owned(),
        created_at: now,
        updated_at: now,
    };
    state.organizations.insert(org.id, org.clone());
    org
}

fn slugify(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect()
}

#[async_trait]
impl OrganizationRepository for MockOrgStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<Organization>, AuthError> {
        Ok(self.read()?.organizations.get(&id).cloned())
    }

    async fn create(&self, name: &str, slug: &str) -> Result<Organization, AuthError> {
        let mut state = self.write()?;
        Ok(insert_org(&mut state, name, slug))
    }
}

#[async_trait]
impl MembershipRepository for MockOrgStore {
    async fn find(
        &self,
        org_id: i64,
        user_id: i64,
    ) -> Result<Option<OrganizationMembership>, AuthError> {
        Ok(self.read()?.memberships.get(&(org_id, user_id)).cloned())
    }

    async fn upsert(
        &self,
        org_id: i64,
        user_id: i64,
        role: OrgRole,
    ) -> Result<OrganizationMembership, AuthError> {
        let mut state = self.write()?;
        let now = Utc::now();
        let membership = state
            .memberships
            .entry((org_id, user_id))
            .and_modify(|m| {
                m.role = role;
                m.updated_at = now;
            })
            .or_insert(OrganizationMembership {
                organization_id: org_id,
                user_id,
                role,
                created_at: now,
                updated_at: now,
            });
        Ok(membership.clone())
    }

    async fn remove(&self, org_id: i64, user_id: i64) -> Result<(), AuthError> {
        self.write()?.memberships.remove(&(org_id, user_id));
        Ok(())
    }

    async fn list_for_org(&self, org_id: i64) -> Result<Vec<OrganizationMembership>, AuthError> {
        let mut members: Vec<_> = self
            .read()?
            .memberships
            .values()
            .filter(|m| m.organization_id == org_id)
            .cloned()
            .collect();
        members.sort_by_key(|m| m.user_id);
        Ok(members)
    }

    async fn count_owners(&self, org_id: i64) -> Result<u64, AuthError> {
        Ok(self
            .read()?
            .memberships
            .values()
            .filter(|m| m.organization_id == org_id && m.role == OrgRole::Owner)
            .count() as u64)
    }
}

#[async_trait]
impl InvitationRepository for MockOrgStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<Invitation>, AuthError> {
        Ok(self.read()?.invitations.get(&id).cloned())
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<Invitation>, AuthError> {
        Ok(self
            .read()?
            .invitations
            .values()
            .find(|i| i.token_hash == token_hash)
            .cloned())
    }

    async fn find_pending(&self, org_id: i64, email: &str) -> Result<Vec<Invitation>, AuthError> {
        let needle = email.to_lowercase();
        Ok(self
            .read()?
            .invitations
            .values()
            .filter(|i| {
                i.organization_id == org_id
                    && i.email == needle
                    && i.status == InvitationStatus::Pending
            })
            .cloned()
            .collect())
    }

    async fn create(&self, invitation: NewInvitation) -> Result<Invitation, AuthError> {
        let mut state = self.write()?;
        state.next_invitation_id += 1;
        let now = Utc::now();
        let invitation = Invitation {
            id: state.next_invitation_id,
            organization_id: invitation.organization_id,
            email: invitation.email.to_lowercase(),
            role: invitation.role,
            token_hash: invitation.token_hash,
            status: InvitationStatus::Pending,
            invited_by: invitation.invited_by,
            expires_at: invitation.expires_at,
            created_at: now,
            updated_at: now,
        };
        state.invitations.insert(invitation.id, invitation.clone());
        Ok(invitation)
    }

    async fn conditional_update_status(
        &self,
        id: i64,
        from: InvitationStatus,
        to: InvitationStatus,
    ) -> Result<bool, AuthError> {
        let mut state = self.write()?;
        let invitation = state
            .invitations
            .get_mut(&id)
            .ok_or(AuthError::InvitationNotFound)?;
        if invitation.status != from {
            return Ok(false);
        }
        invitation.status = to;
        invitation.updated_at = Utc::now();
        Ok(true)
    }

    async fn mark_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AuthError> {
        let mut state = self.write()?;
        let now = Utc::now();
        let mut touched = 0;
        for invitation in state.invitations.values_mut() {
            if invitation.status == InvitationStatus::Pending && invitation.expires_at < cutoff {
                invitation.status = InvitationStatus::Expired;
                invitation.updated_at = now;
                touched += 1;
            }
        }
        Ok(touched)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn new_invitation(org_id: i64, email: &str, expires_in: Duration) -> NewInvitation {
        NewInvitation {
            organization_id: org_id,
            email: email.to_owned(),
            role: OrgRole::Member,
            token_hash: format!("hash-{email}"),
            invited_by: 1,
            expires_at: Utc::now() + expires_in,
        }
    }

    #[tokio::test]
    async fn test_conditional_update_only_succeeds_once() {
        let store = MockOrgStore::new();
        let inv = InvitationRepository::create(
            &store,
            new_invitation(1, "eve@example.com", Duration::days(7)),
        )
        .await
        .unwrap();

        let first = store
            .conditional_update_status(inv.id, InvitationStatus::Pending, InvitationStatus::Accepted)
            .await
            .unwrap();
        let second = store
            .conditional_update_status(inv.id, InvitationStatus::Pending, InvitationStatus::Declined)
            .await
            .unwrap();

        assert!(first);
        assert!(!second);
        assert_eq!(
            store.invitation(inv.id).unwrap().status,
            InvitationStatus::Accepted
        );
    }

    #[tokio::test]
    async fn test_mark_expired_before_only_touches_overdue_pending() {
        let store = MockOrgStore::new();
        let overdue = InvitationRepository::create(
            &store,
            new_invitation(1, "a@example.com", Duration::days(-1)),
        )
        .await
        .unwrap();
        let current = InvitationRepository::create(
            &store,
            new_invitation(1, "b@example.com", Duration::days(7)),
        )
        .await
        .unwrap();

        let touched = store.mark_expired_before(Utc::now()).await.unwrap();
        assert_eq!(touched, 1);
        assert_eq!(
            store.invitation(overdue.id).unwrap().status,
            InvitationStatus::Expired
        );
        assert_eq!(
            store.invitation(current.id).unwrap().status,
            InvitationStatus::Pending
        );
    }
}
