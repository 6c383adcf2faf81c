use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;
use serde_json::Value;

use super::claims::{ClaimSet, TokenScheme};
use super::config::InternalTokenConfig;
use crate::repository::User;
use crate::AuthError;

#[derive(Serialize)]
struct SignedClaims<'a> {
    sub: String,
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    iat: i64,
    exp: i64,
    // Single-element array for compatibility with tokens minted by the
    // legacy password issuer.
    aud: [&'a str; 1],
    iss: &'a str,
}

/// The internal symmetric scheme: HS256 with a fixed issuer and audience.
///
/// Covers tokens minted by the platform's own login path. Verification
/// checks signature, expiry, audience, and issuer equality; all four are
/// mandatory for this scheme.
#[derive(Clone)]
pub struct InternalScheme {
    config: InternalTokenConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl InternalScheme {
    pub fn new(config: InternalTokenConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    pub fn issuer(&self) -> &str {
        self.config.issuer()
    }

    /// Mints a session token for a user, embedding the email and display
    /// name claims the frontend session endpoint reads back.
    pub fn sign(&self, user: &User) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = SignedClaims {
            sub: user.id.to_string(),
            email: &user.email,
            name: user.name.as_deref(),
            iat: now.timestamp(),
            exp: (now + self.config.lifetime).timestamp(),
            aud: [self.config.audience()],
            iss: self.config.issuer(),
        };

        jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|_| AuthError::InvalidToken)
    }

    /// Validates signature, expiry, audience, and issuer, returning the
    /// decoded claims.
    pub fn verify(&self, token: &str) -> Result<ClaimSet, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.config.issuer()]);
        validation.set_audience(&[self.config.audience()]);

        let data = jsonwebtoken::decode::<Value>(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                _ => AuthError::InvalidToken,
            })?;

        ClaimSet::from_value(TokenScheme::Internal, data.claims)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn test_user(id: i64, email: &str) -> User {
        let now = Utc::now();
        User {
            id,
            email: email.to_owned(),
            name: Some("Test User".to_owned()),
            verified: true,
            superuser: false,
            external_auth: false,
            disabled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn scheme(secret: &str) -> InternalScheme {
        let config = InternalTokenConfig::new(secret, "portcullis", "platform:auth").unwrap();
        InternalScheme::new(config)
    }

    #[test]
    fn test_sign_verify_round_trip() {
        let scheme = scheme("test-secret-32-bytes-long-key-01");
        let user = test_user(42, "alice@example.com");

        let token = scheme.sign(&user).unwrap();
        let claims = scheme.verify(&token).unwrap();

        assert_eq!(claims.scheme, TokenScheme::Internal);
        assert_eq!(claims.user_id().unwrap(), 42);
        assert_eq!(claims.issuer.as_deref(), Some("portcullis"));
        assert_eq!(claims.audience.as_deref(), Some("platform:auth"));
        assert_eq!(claims.string_claim("email"), Some("alice@example.com"));
        assert_eq!(claims.string_claim("name"), Some("Test User"));
        assert!(claims.expires_at > claims.issued_at);
    }

    #[test]
    fn test_garbage_token_invalid() {
        let scheme = scheme("test-secret-32-bytes-long-key-02");
        assert_eq!(
            scheme.verify("not-a-token").unwrap_err(),
            AuthError::InvalidToken
        );
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let signer = scheme("test-secret-32-bytes-long-key-03");
        let other = scheme("test-secret-32-bytes-long-key-04");

        let token = signer.sign(&test_user(1, "a@example.com")).unwrap();
        assert_eq!(other.verify(&token).unwrap_err(), AuthError::InvalidToken);
    }

    #[test]
    fn test_expired_token_rejected() {
        let scheme = scheme("test-secret-32-bytes-long-key-05");
        let user = test_user(7, "late@example.com");

        // Sign with an already-elapsed lifetime; the signature itself stays
        // valid.
        let config =
            InternalTokenConfig::new("test-secret-32-bytes-long-key-05", "portcullis", "platform:auth")
                .unwrap()
                .with_lifetime(chrono::Duration::hours(-1));
        let expired = InternalScheme::new(config).sign(&user).unwrap();

        assert_eq!(scheme.verify(&expired).unwrap_err(), AuthError::ExpiredToken);
    }

    #[test]
    fn test_wrong_audience_rejected() {
        let signer = InternalScheme::new(
            InternalTokenConfig::new("test-secret-32-bytes-long-key-06", "portcullis", "other:aud")
                .unwrap(),
        );
        let verifier = scheme("test-secret-32-bytes-long-key-06");

        let token = signer.sign(&test_user(1, "a@example.com")).unwrap();
        assert_eq!(verifier.verify(&token).unwrap_err(), AuthError::InvalidToken);
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let signer = InternalScheme::new(
            InternalTokenConfig::new("test-secret-32-bytes-long-key-07", "someone-else", "platform:auth")
                .unwrap(),
        );
        let verifier = scheme("test-secret-32-bytes-long-key-07");

        let token = signer.sign(&test_user(1, "a@example.com")).unwrap();
        assert_eq!(verifier.verify(&token).unwrap_err(), AuthError::InvalidToken);
    }
}
