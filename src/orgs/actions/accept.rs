use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use crate::crypto::hash_token;
use crate::orgs::repository::{InvitationRepository, MembershipRepository};
use crate::orgs::types::{InvitationStatus, OrganizationMembership};
use crate::repository::User;
use crate::sinks::{AuditEvent, AuditSink, NullAuditSink};
use crate::AuthError;

/// Whether the accepting user's email must match the invitee address.
///
/// There is no default; deployments choose explicitly. `Strict` refuses a
/// mismatch, `BySession` trusts that holding both a valid session and the
/// invitation token is proof enough.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailMatchPolicy {
    Strict,
    BySession,
}

#[derive(Debug, Clone)]
pub struct AcceptConfig {
    pub email_match: EmailMatchPolicy,
}

impl AcceptConfig {
    pub fn new(email_match: EmailMatchPolicy) -> Self {
        Self { email_match }
    }
}

pub struct AcceptInvitationAction<S> {
    store: S,
    audit: Arc<dyn AuditSink>,
    config: AcceptConfig,
}

impl<S> AcceptInvitationAction<S>
where
    S: InvitationRepository + MembershipRepository,
{
    pub fn new(store: S, config: AcceptConfig) -> Self {
        Self {
            store,
            audit: Arc::new(NullAuditSink),
            config,
        }
    }

    #[must_use]
    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Redeems an invitation token for a membership.
    ///
    /// The expiry check runs before the status check, so a pending row past
    /// its deadline reads as expired no matter what is stored. The
    /// pending-to-accepted transition is a compare-and-set; of any number
    /// of concurrent redeemers exactly one wins and creates the
    /// membership, the rest see `InvitationAlreadyUsed`.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "accept_invitation", skip_all, err)
    )]
    pub async fn execute(
        &self,
        token: &str,
        user: &User,
    ) -> Result<OrganizationMembership, AuthError> {
        let invitation = self
            .store
            .find_by_token_hash(&hash_token(token))
            .await?
            .ok_or(AuthError::InvitationNotFound)?;

        if invitation.is_expired(Utc::now()) {
            return Err(AuthError::InvitationExpired);
        }
        if invitation.status != InvitationStatus::Pending {
            return Err(AuthError::InvitationAlreadyUsed);
        }

        if self.config.email_match == EmailMatchPolicy::Strict
            && !user.email.eq_ignore_ascii_case(&invitation.email)
        {
            return Err(AuthError::InvitationEmailMismatch);
        }

        let won = self
            .store
            .conditional_update_status(
                invitation.id,
                InvitationStatus::Pending,
                InvitationStatus::Accepted,
            )
            .await?;
        if !won {
            return Err(AuthError::InvitationAlreadyUsed);
        }

        // An invitation grants a role, it never takes one away: an existing
        // member redeeming one for a lower role keeps their current role.
        // Otherwise a sole owner accepting a member-role invitation would
        // demote themselves and leave the organization ownerless.
        let granted_role = match self.store.find(invitation.organization_id, user.id).await? {
            Some(current) if current.role > invitation.role => current.role,
            _ => invitation.role,
        };
        let membership = self
            .store
            .upsert(invitation.organization_id, user.id, granted_role)
            .await?;

        let event = AuditEvent::new(
            "invitation.accepted",
            invitation.organization_id,
            Some(user.id),
        )
        .with_detail(json!({ "invitation_id": invitation.id, "role": invitation.role.as_str() }));
        if let Err(e) = self.audit.record(event).await {
            log::warn!(
                target: "portcullis",
                "msg=\"audit record failed\", action=\"invitation.accepted\", error=\"{e}\""
            );
        }

        log::info!(
            target: "portcullis",
            "msg=\"invitation accepted\", invitation_id={}, org_id={}, user_id={}",
            invitation.id,
            invitation.organization_id,
            user.id
        );
        Ok(membership)
    }
}
