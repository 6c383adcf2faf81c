use chrono::Utc;

use crate::crypto::hash_token;
use crate::orgs::repository::InvitationRepository;
use crate::orgs::types::InvitationStatus;
use crate::AuthError;

pub struct DeclineInvitationAction<S> {
    store: S,
}

impl<S: InvitationRepository> DeclineInvitationAction<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Declines by invitation token. Terminal; no membership is created
    /// and the token cannot be redeemed afterwards.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "decline_invitation", skip_all, err)
    )]
    pub async fn execute(&self, token: &str) -> Result<(), AuthError> {
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

        let won = self
            .store
            .conditional_update_status(
                invitation.id,
                InvitationStatus::Pending,
                InvitationStatus::Declined,
            )
            .await?;
        if !won {
            return Err(AuthError::InvitationAlreadyUsed);
        }

        log::info!(
            target: "portcullis",
            "msg=\"invitation declined\", invitation_id={}, org_id={}",
            invitation.id,
            invitation.organization_id
        );
        Ok(())
    }
}
