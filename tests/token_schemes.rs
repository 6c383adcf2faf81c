//! End-to-end token verification: both schemes through the verifier, then
//! through session resolution.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use httpmock::prelude::*;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
use rsa::rand_core::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde::Serialize;
use serde_json::json;

use portcullis::token::{
    ExternalKeys, ExternalTokenConfig, InternalTokenConfig, JwksConfig, TokenVerifier,
};
use portcullis::{
    AuthError, MockUserRepository, ProvisioningPolicy, ResolverConfig, SecretString,
    SessionResolver, TokenScheme,
};

const INTERNAL_SECRET: &str = "internal-signing-secret-32-bytes";
const EXTERNAL_SECRET: &str = "external-shared-secret-32-bytes!";
const EXTERNAL_ISSUER: &str = "https://id.example.com";

fn internal_config() -> InternalTokenConfig {
    InternalTokenConfig::new(INTERNAL_SECRET, "better-auth-compat", "fastapi-users:auth")
        .expect("valid internal config")
}

#[derive(Serialize)]
struct ProviderClaims<'a> {
    sub: &'a str,
    email: &'a str,
    name: &'a str,
    iss: &'a str,
    exp: i64,
    iat: i64,
}

fn provider_claims<'a>(email: &'a str, name: &'a str) -> ProviderClaims<'a> {
    let now = Utc::now().timestamp();
    ProviderClaims {
        sub: "provider-subject-1",
        email,
        name,
        iss: EXTERNAL_ISSUER,
        exp: now + 600,
        iat: now,
    }
}

#[tokio::test]
async fn internal_token_round_trips_to_the_signed_user() {
    let users = MockUserRepository::new();
    let user = users.seed("alice@example.com", Some("Alice")).unwrap();

    let verifier = TokenVerifier::new(
        internal_config(),
        ExternalTokenConfig::new(ExternalKeys::SharedSecret(SecretString::new(
            EXTERNAL_SECRET,
        )))
        .with_issuer(EXTERNAL_ISSUER),
    )
    .unwrap();
    let resolver = SessionResolver::new(users, ResolverConfig::new(ProvisioningPolicy::Reject));

    let token = verifier.internal_scheme().unwrap().sign(&user).unwrap();
    let claims = verifier.verify(&token).await.unwrap();
    assert_eq!(claims.scheme, TokenScheme::Internal);

    let resolved = resolver.resolve(&claims).await.unwrap();
    assert_eq!(resolved.id, user.id);
    assert_eq!(resolved.email, "alice@example.com");
}

#[tokio::test]
async fn external_hs256_token_provisions_a_user() {
    let users = MockUserRepository::new();
    let verifier = TokenVerifier::external_only(
        ExternalTokenConfig::new(ExternalKeys::SharedSecret(SecretString::new(
            EXTERNAL_SECRET,
        )))
        .with_issuer(EXTERNAL_ISSUER),
    )
    .unwrap();
    let resolver = SessionResolver::new(
        users.clone(),
        ResolverConfig::new(ProvisioningPolicy::Provision),
    );

    let token = encode(
        &Header::default(),
        &provider_claims("Newcomer@Example.com", "New Person"),
        &EncodingKey::from_secret(EXTERNAL_SECRET.as_bytes()),
    )
    .unwrap();

    let claims = verifier.verify(&token).await.unwrap();
    assert_eq!(claims.scheme, TokenScheme::External);

    let user = resolver.resolve(&claims).await.unwrap();
    assert_eq!(user.email, "newcomer@example.com");
    assert!(user.external_auth);
    assert_eq!(users.user_count(), 1);
}

#[tokio::test]
async fn schemes_never_fall_back_to_each_other() {
    let verifier = TokenVerifier::new(
        internal_config(),
        ExternalTokenConfig::new(ExternalKeys::SharedSecret(SecretString::new(
            EXTERNAL_SECRET,
        )))
        .with_issuer(EXTERNAL_ISSUER),
    )
    .unwrap();

    // Signed with the internal secret but claiming the external issuer:
    // routed externally, rejected there, never retried internally.
    let now = Utc::now().timestamp();
    let cross = encode(
        &Header::default(),
        &json!({ "sub": "42", "iss": EXTERNAL_ISSUER, "exp": now + 600, "iat": now }),
        &EncodingKey::from_secret(INTERNAL_SECRET.as_bytes()),
    )
    .unwrap();
    assert_eq!(
        verifier.verify(&cross).await.unwrap_err(),
        AuthError::InvalidToken
    );

    let unknown = encode(
        &Header::default(),
        &json!({ "sub": "42", "iss": "https://rogue.example.com", "exp": now + 600, "iat": now }),
        &EncodingKey::from_secret(EXTERNAL_SECRET.as_bytes()),
    )
    .unwrap();
    assert_eq!(
        verifier.verify(&unknown).await.unwrap_err(),
        AuthError::UnknownIssuer
    );
}

struct KeyMaterial {
    encoding: EncodingKey,
    modulus: String,
    exponent: String,
}

fn generate_key_material() -> KeyMaterial {
    let mut rng = OsRng;
    let private_key = RsaPrivateKey::new(&mut rng, 2048).expect("key generation");
    let public_key = private_key.to_public_key();

    let private_pem = private_key
        .to_pkcs1_pem(LineEnding::LF)
        .expect("private pem");

    KeyMaterial {
        encoding: EncodingKey::from_rsa_pem(private_pem.as_bytes()).expect("encoding key"),
        modulus: URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
        exponent: URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
    }
}

fn rs256_token(material: &KeyMaterial, kid: &str, email: &str) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_owned());
    encode(&header, &provider_claims(email, "Carol"), &material.encoding).unwrap()
}

fn jwks_body(material: &KeyMaterial, kid: &str) -> serde_json::Value {
    json!({
        "keys": [{
            "kid": kid,
            "kty": "RSA",
            "alg": "RS256",
            "use": "sig",
            "n": material.modulus,
            "e": material.exponent,
        }]
    })
}

#[tokio::test]
async fn external_rs256_token_verifies_against_fetched_jwks() {
    let material = generate_key_material();
    let server = MockServer::start_async().await;
    let jwks = server
        .mock_async(|when, then| {
            when.method(GET).path("/jwks.json");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(jwks_body(&material, "key-1"));
        })
        .await;

    let verifier = TokenVerifier::external_only(
        ExternalTokenConfig::new(ExternalKeys::Jwks(JwksConfig::new(
            server.url("/jwks.json"),
        )))
        .with_issuer(EXTERNAL_ISSUER),
    )
    .unwrap();

    let token = rs256_token(&material, "key-1", "carol@example.com");
    let claims = verifier.verify(&token).await.unwrap();
    assert_eq!(claims.scheme, TokenScheme::External);
    assert_eq!(claims.string_claim("email"), Some("carol@example.com"));

    // Second verification is served from the cache.
    verifier.verify(&token).await.unwrap();
    jwks.assert_hits_async(1).await;
}

#[tokio::test]
async fn unknown_kid_forces_one_refetch_then_rejects() {
    let material = generate_key_material();
    let server = MockServer::start_async().await;
    let jwks = server
        .mock_async(|when, then| {
            when.method(GET).path("/jwks.json");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(jwks_body(&material, "key-1"));
        })
        .await;

    let verifier = TokenVerifier::external_only(ExternalTokenConfig::new(ExternalKeys::Jwks(
        JwksConfig::new(server.url("/jwks.json")),
    )))
    .unwrap();

    // Warm the cache, then present a token naming a key the issuer does
    // not publish.
    verifier
        .verify(&rs256_token(&material, "key-1", "carol@example.com"))
        .await
        .unwrap();
    let err = verifier
        .verify(&rs256_token(&material, "key-rotated", "carol@example.com"))
        .await
        .unwrap_err();

    assert_eq!(err, AuthError::InvalidToken);
    jwks.assert_hits_async(2).await;
}

#[tokio::test]
async fn jwks_endpoint_failure_fails_closed_on_cold_cache() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/jwks.json");
            then.status(503);
        })
        .await;

    let material = generate_key_material();
    let verifier = TokenVerifier::external_only(ExternalTokenConfig::new(ExternalKeys::Jwks(
        JwksConfig::new(server.url("/jwks.json")),
    )))
    .unwrap();

    let err = verifier
        .verify(&rs256_token(&material, "key-1", "carol@example.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::KeyUnavailable(_)));
}
