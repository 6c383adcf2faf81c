use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AuthError;

/// A user account.
///
/// Accounts are soft-disabled: `disabled_at` is set instead of deleting the
/// row, so existing foreign keys (memberships, invitations) stay intact
/// while every token resolution for the account starts failing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: Option<String>,
    /// Email address has been confirmed.
    pub verified: bool,
    /// Instance-wide administrative flag. Does not bypass organization
    /// role checks.
    pub superuser: bool,
    /// Account was provisioned from an external identity provider and has
    /// no local credentials.
    pub external_auth: bool,
    pub disabled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.disabled_at.is_none()
    }
}

/// Fields required to create a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: Option<String>,
    pub verified: bool,
    pub external_auth: bool,
}

impl NewUser {
    /// A just-in-time provisioned account for an externally authenticated
    /// identity. The provider already verified the address.
    pub fn provisioned(email: impl Into<String>, name: Option<String>) -> Self {
        Self {
            email: email.into(),
            name,
            verified: true,
            external_auth: true,
        }
    }
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AuthError>;

    /// Lookup by email, case-insensitively.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AuthError>;

    async fn create(&self, new_user: NewUser) -> Result<User, AuthError>;

    async fn update(&self, user: &User) -> Result<(), AuthError>;

    /// Soft-disables the account. Idempotent.
    async fn disable(&self, id: i64) -> Result<(), AuthError>;
}
