use std::sync::Arc;

use serde_json::json;

use crate::access::{require_role, OrgRole};
use crate::orgs::repository::{InvitationRepository, MembershipRepository};
use crate::orgs::types::InvitationStatus;
use crate::sinks::{AuditEvent, AuditSink, NullAuditSink};
use crate::AuthError;

pub struct CancelInvitationAction<S> {
    store: S,
    audit: Arc<dyn AuditSink>,
}

impl<S> CancelInvitationAction<S>
where
    S: InvitationRepository + MembershipRepository,
{
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

    /// Withdraws a pending invitation. Admin-side operation, addressed by
    /// id rather than token (the caller never held the token).
    ///
    /// A pending row past its deadline can still be cancelled; nothing is
    /// lost by letting an admin tidy up what lazy expiry would catch
    /// anyway.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "cancel_invitation", skip(self), err)
    )]
    pub async fn execute(&self, invitation_id: i64, actor_id: i64) -> Result<(), AuthError> {
        let invitation = InvitationRepository::find_by_id(&self.store, invitation_id)
            .await?
            .ok_or(AuthError::InvitationNotFound)?;

        require_role(
            &self.store,
            invitation.organization_id,
            actor_id,
            OrgRole::Admin,
        )
        .await?;

        if invitation.status != InvitationStatus::Pending {
            return Err(AuthError::InvitationAlreadyUsed);
        }

        let won = self
            .store
            .conditional_update_status(
                invitation.id,
                InvitationStatus::Pending,
                InvitationStatus::Cancelled,
            )
            .await?;
        if !won {
            return Err(AuthError::InvitationAlreadyUsed);
        }

        let event = AuditEvent::new(
            "invitation.cancelled",
            invitation.organization_id,
            Some(actor_id),
        )
        .with_detail(json!({ "invitation_id": invitation.id }));
        if let Err(e) = self.audit.record(event).await {
            log::warn!(
                target: "portcullis",
                "msg=\"audit record failed\", action=\"invitation.cancelled\", error=\"{e}\""
            );
        }

        log::info!(
            target: "portcullis",
            "msg=\"invitation cancelled\", invitation_id={}, org_id={}",
            invitation.id,
            invitation.organization_id
        );
        Ok(())
    }
}
