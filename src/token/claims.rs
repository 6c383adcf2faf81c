use serde_json::{Map, Value};

use crate::AuthError;

/// Which verification scheme produced a [`ClaimSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenScheme {
    /// Symmetric tokens minted by this platform's own issuer.
    Internal,
    /// Tokens minted by the configured external identity provider.
    External,
}

/// Decoded, signature-verified token payload.
///
/// Lives only for the duration of one request; never persisted.
#[derive(Debug, Clone)]
pub struct ClaimSet {
    pub scheme: TokenScheme,
    /// `sub`: user id for internal tokens, provider-assigned id otherwise.
    pub subject: String,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    /// `exp` as a unix timestamp.
    pub expires_at: i64,
    /// `iat` as a unix timestamp.
    pub issued_at: i64,
    /// Remaining claims, including any configurable email-like claim.
    pub extra: Map<String, Value>,
}

impl ClaimSet {
    /// Builds a claim set from a raw decoded payload.
    ///
    /// Registered claims are pulled out of the map; everything else stays in
    /// `extra`. `aud` may be a string or an array (the internal issuer has
    /// historically written a single-element array).
    pub fn from_value(scheme: TokenScheme, value: Value) -> Result<Self, AuthError> {
        let Value::Object(mut map) = value else {
            return Err(AuthError::InvalidToken);
        };

        let subject = match map.remove("sub") {
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => return Err(AuthError::InvalidToken),
        };
        let issuer = match map.remove("iss") {
            Some(Value::String(s)) => Some(s),
            _ => None,
        };
        let audience = match map.remove("aud") {
            Some(Value::String(s)) => Some(s),
            Some(Value::Array(items)) => items.into_iter().find_map(|v| match v {
                Value::String(s) => Some(s),
                _ => None,
            }),
            _ => None,
        };
        let expires_at = map
            .remove("exp")
            .and_then(|v| v.as_i64())
            .ok_or(AuthError::InvalidToken)?;
        let issued_at = map.remove("iat").and_then(|v| v.as_i64()).unwrap_or(0);

        Ok(Self {
            scheme,
            subject,
            issuer,
            audience,
            expires_at,
            issued_at,
            extra: map,
        })
    }

    /// Looks up a custom claim by name.
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.extra.get(name)
    }

    /// Looks up a custom string claim by name.
    pub fn string_claim(&self, name: &str) -> Option<&str> {
        self.extra.get(name).and_then(Value::as_str)
    }

    /// Parses `sub` as the internal user id.
    pub fn user_id(&self) -> Result<i64, AuthError> {
        self.subject.parse().map_err(|_| AuthError::InvalidToken)
    }
}
