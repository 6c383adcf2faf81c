use chrono::Utc;

use crate::orgs::repository::InvitationRepository;
use crate::AuthError;

/// Batch-marks overdue pending invitations as `Expired`.
///
/// Cosmetic: every read path already treats an overdue pending row as
/// expired, so correctness never depends on this running. Run it
/// periodically so listings and reports reflect reality.
pub struct PruneInvitationsAction<S> {
    store: S,
}

impl<S: InvitationRepository> PruneInvitationsAction<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the number of rows rewritten.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(skip(self), name = "prune_invitations")
    )]
    pub async fn execute(&self) -> Result<u64, AuthError> {
        let pruned = self.store.mark_expired_before(Utc::now()).await?;
        log::info!(
            target: "portcullis",
            "msg=\"invitations pruned\", expired={pruned}"
        );
        Ok(pruned)
    }
}
