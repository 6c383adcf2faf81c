//! Bearer token verification.
//!
//! Two schemes coexist: internal session tokens minted by this service
//! (HS256, fixed issuer and audience) and external identity-provider tokens
//! (HS256 shared secret or RS256 against a cached JWKS). [`TokenVerifier`]
//! routes each token to exactly one scheme by structure, never by trying
//! both.

mod claims;
mod config;
mod external;
mod internal;
mod jwks;
mod verifier;

pub use claims::{ClaimSet, TokenScheme};
pub use config::{
    ExternalKeys, ExternalTokenConfig, InternalTokenConfig, JwksConfig, MIN_SECRET_LENGTH,
};
pub use external::ExternalScheme;
pub use internal::InternalScheme;
pub use jwks::{JwksCache, JwksFetcher, KeySource};
pub use verifier::TokenVerifier;
