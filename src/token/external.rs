use jsonwebtoken::{Algorithm, DecodingKey, Header, Validation};
use serde_json::Value;

use super::claims::{ClaimSet, TokenScheme};
use super::config::{ExternalKeys, ExternalTokenConfig};
use super::jwks::JwksCache;
use crate::AuthError;

enum KeyStore {
    Secret(DecodingKey),
    Jwks(JwksCache),
}

/// The external identity-provider scheme.
///
/// Key material is either a shared HS256 secret or an RS256 JWKS cache,
/// decided once when the configuration is loaded. Issuer and audience are
/// validated only when configured; an unconfigured check is skipped
/// explicitly rather than defaulted.
pub struct ExternalScheme {
    keys: KeyStore,
    issuer: Option<String>,
    audience: Option<String>,
}

impl ExternalScheme {
    pub fn new(config: ExternalTokenConfig) -> Result<Self, AuthError> {
        let keys = match &config.keys {
            ExternalKeys::SharedSecret(secret) => {
                KeyStore::Secret(DecodingKey::from_secret(secret.expose_secret().as_bytes()))
            }
            ExternalKeys::Jwks(jwks) => KeyStore::Jwks(JwksCache::from_config(jwks)?),
        };
        Ok(Self {
            keys,
            issuer: config.issuer,
            audience: config.audience,
        })
    }

    #[cfg(any(test, feature = "mocks"))]
    pub fn with_key_cache(config: ExternalTokenConfig, cache: JwksCache) -> Self {
        Self {
            keys: KeyStore::Jwks(cache),
            issuer: config.issuer,
            audience: config.audience,
        }
    }

    pub fn issuer(&self) -> Option<&str> {
        self.issuer.as_deref()
    }

    /// True when this scheme verifies against remotely published keys,
    /// i.e. tokens are expected to carry a `kid` header.
    pub fn is_asymmetric(&self) -> bool {
        matches!(self.keys, KeyStore::Jwks(_))
    }

    pub async fn verify(&self, token: &str, header: &Header) -> Result<ClaimSet, AuthError> {
        let (key, algorithm) = match &self.keys {
            KeyStore::Secret(key) => (key.clone(), Algorithm::HS256),
            KeyStore::Jwks(cache) => {
                let kid = header.kid.as_deref().ok_or(AuthError::InvalidToken)?;
                (cache.resolve(kid).await?, Algorithm::RS256)
            }
        };

        let mut validation = Validation::new(algorithm);
        if let Some(iss) = &self.issuer {
            validation.set_issuer(&[iss]);
        }
        match &self.audience {
            Some(aud) => validation.set_audience(&[aud]),
            // An unconfigured audience is skipped, not defaulted.
            None => validation.validate_aud = false,
        }

        let data =
            jsonwebtoken::decode::<Value>(token, &key, &validation).map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                _ => AuthError::InvalidToken,
            })?;

        ClaimSet::from_value(TokenScheme::External, data.claims)
    }
}
