use std::sync::Arc;

use serde_json::json;

use crate::access::{require_owner, require_role, OrgRole};
use crate::orgs::repository::MembershipRepository;
use crate::orgs::types::OrganizationMembership;
use crate::sinks::{AuditEvent, AuditSink, NullAuditSink};
use crate::AuthError;

pub struct ChangeMemberRoleAction<S> {
    store: S,
    audit: Arc<dyn AuditSink>,
}

impl<S: MembershipRepository> ChangeMemberRoleAction<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            audit: Arc::new(NullAuditSink),
        }
    }

    #[must_use]
    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Changes a member's role.
    ///
    /// Admins can move members between the non-owner roles; granting the
    /// owner role requires the caller to be an owner (this is also how
    /// ownership transfer works). Demoting the last remaining owner fails
    /// with `LastOwnerViolation`, leaving state untouched.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "change_member_role", skip(self), err)
    )]
    pub async fn execute(
        &self,
        org_id: i64,
        actor_id: i64,
        target_id: i64,
        new_role: OrgRole,
    ) -> Result<OrganizationMembership, AuthError> {
        require_role(&self.store, org_id, actor_id, OrgRole::Admin).await?;
        if new_role == OrgRole::Owner {
            require_owner(&self.store, org_id, actor_id).await?;
        }

        let target = self
            .store
            .find(org_id, target_id)
            .await?
            .ok_or(AuthError::NotAMember)?;

        if target.role == OrgRole::Owner && new_role != OrgRole::Owner {
            if self.store.count_owners(org_id).await? <= 1 {
                return Err(AuthError::LastOwnerViolation);
            }
            // Only an owner may demote another owner.
            require_owner(&self.store, org_id, actor_id).await?;
        }

        let membership = self.store.upsert(org_id, target_id, new_role).await?;

        let event = AuditEvent::new("membership.role_changed", org_id, Some(actor_id))
            .with_detail(json!({
                "user_id": target_id,
                "from": target.role.as_str(),
                "to": new_role.as_str(),
            }));
        if let Err(e) = self.audit.record(event).await {
            log::warn!(
                target: "portcullis",
                "msg=\"audit record failed\", action=\"membership.role_changed\", error=\"{e}\""
            );
        }

        log::info!(
            target: "portcullis",
            "msg=\"member role changed\", org_id={org_id}, user_id={target_id}, role={new_role}"
        );
        Ok(membership)
    }
}

pub struct RemoveMemberAction<S> {
    store: S,
    audit: Arc<dyn AuditSink>,
}

impl<S: MembershipRepository> RemoveMemberAction<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            audit: Arc::new(NullAuditSink),
        }
    }

    #[must_use]
    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Removes a member. Admins remove others; anyone may leave on their
    /// own. Removing an owner is itself an ownership revocation, so only
    /// another owner may do it, and the sole owner can neither be removed
    /// nor leave until ownership moves on.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "remove_member", skip(self), err)
    )]
    pub async fn execute(&self, org_id: i64, actor_id: i64, target_id: i64) -> Result<(), AuthError> {
        if actor_id != target_id {
            require_role(&self.store, org_id, actor_id, OrgRole::Admin).await?;
        }

        let target = self
            .store
            .find(org_id, target_id)
            .await?
            .ok_or(AuthError::NotAMember)?;

        if target.role == OrgRole::Owner {
            if actor_id != target_id {
                require_owner(&self.store, org_id, actor_id).await?;
            }
            if self.store.count_owners(org_id).await? <= 1 {
                return Err(AuthError::LastOwnerViolation);
            }
        }

        self.store.remove(org_id, target_id).await?;

        let event = AuditEvent::new("membership.removed", org_id, Some(actor_id))
            .with_detail(json!({ "user_id": target_id }));
        if let Err(e) = self.audit.record(event).await {
            log::warn!(
                target: "portcullis",
                "msg=\"audit record failed\", action=\"membership.removed\", error=\"{e}\""
            );
        }

        log::info!(
            target: "portcullis",
            "msg=\"member removed\", org_id={org_id}, user_id={target_id}"
        );
        Ok(())
    }
}
