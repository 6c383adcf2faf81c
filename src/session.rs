//! Claim-to-user resolution.
//!
//! Verified claims name an identity in scheme-specific terms: internal
//! tokens carry a local user id in `sub`, external tokens identify the
//! user by email. [`SessionResolver`] turns either into exactly one local
//! [`User`] or a precise refusal.

use crate::repository::{NewUser, User, UserRepository};
use crate::token::{ClaimSet, TokenScheme};
use crate::AuthError;

/// What to do when an externally authenticated identity has no local
/// account yet. There is no default; deployments must choose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningPolicy {
    /// Create a verified, externally-authenticated account on first sight.
    Provision,
    /// Refuse the session; accounts are created out of band.
    Reject,
}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Claim holding the email address on external tokens.
    pub email_claim: String,
    /// The external issuer puts the email in `sub` instead of a dedicated
    /// claim.
    pub sub_is_email: bool,
    pub provisioning: ProvisioningPolicy,
}

impl ResolverConfig {
    pub fn new(provisioning: ProvisioningPolicy) -> Self {
        Self {
            email_claim: "email".to_owned(),
            sub_is_email: false,
            provisioning,
        }
    }

    #[must_use]
    pub fn with_email_claim(mut self, claim: impl Into<String>) -> Self {
        self.email_claim = claim.into();
        self
    }

    #[must_use]
    pub fn sub_is_email(mut self) -> Self {
        self.sub_is_email = true;
        self
    }
}

pub struct SessionResolver<U> {
    users: U,
    config: ResolverConfig,
}

impl<U: UserRepository> SessionResolver<U> {
    pub fn new(users: U, config: ResolverConfig) -> Self {
        Self { users, config }
    }

    /// Resolves verified claims to the local user they speak for.
    ///
    /// A disabled account fails regardless of scheme; tokens minted before
    /// the account was disabled stop working immediately.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "resolve_session", skip_all, err)
    )]
    pub async fn resolve(&self, claims: &ClaimSet) -> Result<User, AuthError> {
        let user = match claims.scheme {
            TokenScheme::Internal => self.resolve_internal(claims).await?,
            TokenScheme::External => self.resolve_external(claims).await?,
        };

        if !user.is_active() {
            log::info!(
                target: "portcullis",
                "msg=\"session refused for disabled account\", user_id={}",
                user.id
            );
            return Err(AuthError::UserDisabled);
        }
        Ok(user)
    }

    async fn resolve_internal(&self, claims: &ClaimSet) -> Result<User, AuthError> {
        let id = claims.user_id()?;
        self.users
            .find_by_id(id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    async fn resolve_external(&self, claims: &ClaimSet) -> Result<User, AuthError> {
        let email = if self.config.sub_is_email {
            claims.subject.as_str()
        } else {
            claims
                .string_claim(&self.config.email_claim)
                .ok_or(AuthError::InvalidToken)?
        };
        let email = email.to_lowercase();

        if let Some(user) = self.users.find_by_email(&email).await? {
            return Ok(user);
        }

        match self.config.provisioning {
            ProvisioningPolicy::Provision => {
                let name = claims.string_claim("name").map(str::to_owned);
                let user = self.users.create(NewUser::provisioned(email, name)).await?;
                log::info!(
                    target: "portcullis",
                    "msg=\"provisioned user from external identity\", user_id={}",
                    user.id
                );
                Ok(user)
            }
            ProvisioningPolicy::Reject => Err(AuthError::UserNotFound),
        }
    }
}
