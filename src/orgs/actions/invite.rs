use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;

use crate::access::{require_role, OrgRole};
use crate::crypto::{generate_token_default, hash_token};
use crate::orgs::repository::{
    InvitationRepository, MembershipRepository, NewInvitation, OrganizationRepository,
};
use crate::orgs::types::Invitation;
use crate::sinks::{AuditEvent, AuditSink, EmailSink, NullAuditSink, NullEmailSink};
use crate::AuthError;

#[derive(Debug, Clone)]
pub struct InvitationConfig {
    pub expiry_days: i64,
}

impl Default for InvitationConfig {
    fn default() -> Self {
        Self { expiry_days: 7 }
    }
}

pub struct IssueInvitationAction<S> {
    store: S,
    email: Arc<dyn EmailSink>,
    audit: Arc<dyn AuditSink>,
    config: InvitationConfig,
}

impl<S> IssueInvitationAction<S>
where
    S: InvitationRepository + MembershipRepository + OrganizationRepository,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            email: Arc::new(NullEmailSink),
            audit: Arc::new(NullAuditSink),
            config: InvitationConfig::default(),
        }
    }

    #[must_use]
    pub fn with_email_sink(mut self, email: Arc<dyn EmailSink>) -> Self {
        self.email = email;
        self
    }

    #[must_use]
    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: InvitationConfig) -> Self {
        self.config = config;
        self
    }

    /// Issues a single-use invitation and emails the plain token to the
    /// invitee. Only the token's hash is persisted.
    ///
    /// Email delivery and audit recording happen after the row is
    /// committed; their failures are logged, never rolled back.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "issue_invitation", skip(self, email), err)
    )]
    pub async fn execute(
        &self,
        org_id: i64,
        actor_id: i64,
        email: &str,
        role: OrgRole,
    ) -> Result<Invitation, AuthError> {
        require_role(&self.store, org_id, actor_id, OrgRole::Admin).await?;

        let organization = OrganizationRepository::find_by_id(&self.store, org_id)
            .await?
            .ok_or(AuthError::OrganizationNotFound)?;

        let email = email.to_lowercase();
        let now = Utc::now();
        let has_open_invitation = self
            .store
            .find_pending(org_id, &email)
            .await?
            .iter()
            .any(|inv| !inv.is_expired(now));
        if has_open_invitation {
            return Err(AuthError::DuplicateInvitation);
        }

        let token = generate_token_default();
        let invitation = InvitationRepository::create(
            &self.store,
            NewInvitation {
                organization_id: org_id,
                email: email.clone(),
                role,
                token_hash: hash_token(&token),
                invited_by: actor_id,
                expires_at: now + Duration::days(self.config.expiry_days),
            },
        )
        .await?;

        if let Err(e) = self
            .email
            .send_invitation(&email, &organization.name, &token)
            .await
        {
            log::warn!(
                target: "portcullis",
                "msg=\"invitation email failed\", invitation_id={}, error=\"{e}\"",
                invitation.id
            );
        }

        let event = AuditEvent::new("invitation.issued", org_id, Some(actor_id))
            .with_detail(json!({ "invitation_id": invitation.id, "role": role.as_str() }));
        if let Err(e) = self.audit.record(event).await {
            log::warn!(
                target: "portcullis",
                "msg=\"audit record failed\", action=\"invitation.issued\", error=\"{e}\""
            );
        }

        log::info!(
            target: "portcullis",
            "msg=\"invitation issued\", invitation_id={}, org_id={org_id}, role={role}",
            invitation.id
        );
        Ok(invitation)
    }
}
