use std::fmt;
use std::time::Duration;

use crate::{AuthError, SecretString};

/// Minimum length for symmetric signing secrets, in bytes.
pub const MIN_SECRET_LENGTH: usize = 32;

/// Configuration for the internal symmetric token scheme.
///
/// Issuer and audience are fixed strings and always validated; tokens whose
/// claims disagree are rejected outright.
#[derive(Clone)]
pub struct InternalTokenConfig {
    pub(crate) secret: String,
    pub(crate) issuer: String,
    pub(crate) audience: String,
    pub(crate) lifetime: chrono::Duration,
}

impl fmt::Debug for InternalTokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InternalTokenConfig")
            .field("secret", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("lifetime", &self.lifetime)
            .finish()
    }
}

impl InternalTokenConfig {
    /// Creates the internal scheme configuration.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the secret is shorter than
    /// [`MIN_SECRET_LENGTH`] bytes.
    pub fn new(
        secret: impl Into<String>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Result<Self, AuthError> {
        let secret = secret.into();
        if secret.len() < MIN_SECRET_LENGTH {
            return Err(AuthError::Configuration(format!(
                "signing secret must be at least {MIN_SECRET_LENGTH} bytes, got {}",
                secret.len()
            )));
        }

        Ok(Self {
            secret,
            issuer: issuer.into(),
            audience: audience.into(),
            lifetime: chrono::Duration::minutes(30),
        })
    }

    /// Sets the lifetime of newly signed tokens. Default: 30 minutes.
    #[must_use]
    pub fn with_lifetime(mut self, lifetime: chrono::Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }
}

/// Key material source for the external scheme, fixed at configuration load.
///
/// The two variants are a tagged union on purpose: the verification path is
/// selected once here, never re-decided per request from ad hoc flags.
#[derive(Debug, Clone)]
pub enum ExternalKeys {
    /// HS256 with a secret shared with the external issuer.
    SharedSecret(SecretString),
    /// RS256 with public keys fetched from the issuer's JWKS endpoint.
    Jwks(JwksConfig),
}

/// Fetch and cache policy for a remote JWKS endpoint.
#[derive(Debug, Clone)]
pub struct JwksConfig {
    pub url: String,
    /// How long a fetched key set is considered fresh.
    pub ttl: Duration,
    /// Hard ceiling on serving a stale key set after fetch failures; past
    /// this the resolver fails closed.
    pub max_stale: Duration,
    /// Bound on each outbound fetch.
    pub fetch_timeout: Duration,
}

impl JwksConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ttl: Duration::from_secs(300),
            max_stale: Duration::from_secs(3600),
            fetch_timeout: Duration::from_secs(5),
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_max_stale(mut self, max_stale: Duration) -> Self {
        self.max_stale = max_stale;
        self
    }

    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }
}

/// Configuration for the external token scheme.
///
/// Issuer and audience checks are each independently optional: a configured
/// value is validated, an unconfigured one is explicitly skipped. There is
/// no ambiguous default.
#[derive(Debug, Clone)]
pub struct ExternalTokenConfig {
    pub keys: ExternalKeys,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

impl ExternalTokenConfig {
    pub fn new(keys: ExternalKeys) -> Self {
        Self {
            keys,
            issuer: None,
            audience: None,
        }
    }

    /// Enables issuer equality checking.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Enables audience checking.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }
}
