//! Organization-scoped authentication and invitation lifecycle core.
//!
//! portcullis accepts bearer tokens minted by two different issuers (an
//! internal symmetric issuer and an external identity-provider-compatible
//! issuer), resolves them to a single user identity, enforces
//! organization-scoped role checks, and manages single-use, time-bounded
//! invitation tokens.
//!
//! Storage, email delivery, and audit persistence are collaborator traits;
//! bring your own implementations or enable the `mocks` feature for the
//! in-memory ones used throughout the test suite.

use thiserror::Error;

pub mod access;
#[cfg(feature = "axum")]
pub mod api;
pub mod crypto;
pub mod orgs;
pub mod repository;
pub mod session;
pub mod sinks;
pub mod token;

pub use access::{AccessGuard, OrgRole};
pub use crypto::SecretString;
pub use repository::{NewUser, User, UserRepository};
pub use session::{ProvisioningPolicy, ResolverConfig, SessionResolver};
pub use token::{ClaimSet, TokenScheme, TokenVerifier};

#[cfg(any(test, feature = "mocks"))]
pub use repository::MockUserRepository;

/// Errors returned by every fallible operation in this crate.
///
/// Verification and authorization failures are deliberately coarse so the
/// HTTP boundary can surface them without leaking internals; invitation
/// failures are specific enough to be user-actionable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("token is malformed or its signature does not match")]
    InvalidToken,
    #[error("token has expired")]
    ExpiredToken,
    #[error("no verification scheme configured for this token's issuer")]
    UnknownIssuer,
    #[error("verification keys unavailable: {0}")]
    KeyUnavailable(String),
    #[error("user not found")]
    UserNotFound,
    #[error("user account is disabled")]
    UserDisabled,
    #[error("not a member of this organization")]
    NotAMember,
    #[error("role is below the required level for this action")]
    InsufficientRole,
    #[error("invitation not found")]
    InvitationNotFound,
    #[error("invitation has expired")]
    InvitationExpired,
    #[error("invitation has already been used")]
    InvitationAlreadyUsed,
    #[error("invitation was issued for a different email address")]
    InvitationEmailMismatch,
    #[error("a pending invitation already exists for this email")]
    DuplicateInvitation,
    #[error("organization must retain at least one owner")]
    LastOwnerViolation,
    #[error("organization not found")]
    OrganizationNotFound,
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("database error: {0}")]
    Database(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// True for failures that are transient from the caller's point of view
    /// and safe to retry (surfaced as 5xx at the HTTP boundary).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AuthError::KeyUnavailable(_) | AuthError::Database(_) | AuthError::Internal(_)
        )
    }
}
