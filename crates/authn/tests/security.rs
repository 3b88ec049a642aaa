//! Adversarial token handling: forgery, tampering, algorithm substitution,
//! and key rotation boundaries.

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use rstest::rstest;
use serde_json::json;
use shortlink_authn::{
    AuthConfig, Claims, ManualClock, SystemClock, TokenManager, assert_auth_error,
    testutil::{
        craft_raw_jwt, deterministic_kid, test_config, test_manager, test_private_pem,
        test_private_pem_alt, write_key_files,
    },
};

fn manager() -> TokenManager {
    test_manager(Arc::new(SystemClock))
}

#[test]
fn test_tampered_payload_is_rejected() {
    let manager = manager();
    let pair = manager.create_token_pair(&Claims { sub: "user-1".into(), ..Claims::default() })
        .expect("pair");

    let parts: Vec<&str> = pair.access_token.split('.').collect();
    let payload = URL_SAFE_NO_PAD.decode(parts[1]).expect("payload base64");
    let mut claims: serde_json::Value = serde_json::from_slice(&payload).expect("payload json");
    claims["sub"] = json!("user-2");

    let forged = format!(
        "{}.{}.{}",
        parts[0],
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).expect("re-encode")),
        parts[2],
    );

    assert_auth_error!(manager.verify(&forged), InvalidSignature);
    assert_auth_error!(manager.parse(&forged), InvalidSignature, "parse must also check");
}

#[test]
fn test_appended_bytes_break_the_signature() {
    let manager = manager();
    let pair = manager.create_token_pair(&Claims::default()).expect("pair");

    let stretched = format!("{}AAAA", pair.access_token);
    assert!(manager.verify(&stretched).is_err());
    assert!(manager.parse(&stretched).is_err());
}

#[test]
fn test_rotation_keeps_old_tokens_valid_but_not_the_reverse() {
    let dir = tempfile::tempdir().expect("tempdir");
    let two_keys = write_key_files(dir.path(), 2);
    let one_key: std::collections::HashMap<_, _> = two_keys
        .iter()
        .filter(|(kid, _)| **kid == deterministic_kid(1).to_string())
        .map(|(kid, path)| (kid.clone(), path.clone()))
        .collect();

    let clock = Arc::new(ManualClock::start_now());
    let before = TokenManager::with_clock(
        AuthConfig { keys: one_key, ..test_config() },
        clock.clone(),
    )
    .expect("pre-rotation manager");
    let after = TokenManager::with_clock(
        AuthConfig { keys: two_keys, ..test_config() },
        clock.clone(),
    )
    .expect("post-rotation manager");

    assert_eq!(before.current_key_id(), deterministic_kid(1));
    assert_eq!(after.current_key_id(), deterministic_kid(2), "newest key signs");

    // Tokens issued before the rotation verify against the new ring, which
    // still holds the old key.
    let old_pair = before.create_token_pair(&Claims::default()).expect("old pair");
    after.verify(&old_pair.access_token).expect("old token valid after rotation");

    // Tokens signed with the new key are opaque to a ring without it.
    let new_pair = after.create_token_pair(&Claims::default()).expect("new pair");
    assert_auth_error!(before.verify(&new_pair.access_token), UnknownSigningKey);
}

#[test]
fn test_token_from_unrelated_issuer_has_unknown_key() {
    let manager = manager();
    let stranger = TokenManager::with_key(
        test_config(),
        test_private_pem_alt(),
        Arc::new(SystemClock),
    )
    .expect("unrelated manager");

    let pair = stranger.create_token_pair(&Claims::default()).expect("foreign pair");
    assert_auth_error!(manager.verify(&pair.access_token), UnknownSigningKey);
}

#[test]
fn test_wrong_key_under_stolen_kid_fails_signature_check() {
    let manager = manager();
    let claims = manager.access_claims(&Claims::default()).expect("claims");

    // Correct kid, signature from a different private key.
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(manager.current_key_id().to_string());
    let wrong_key =
        EncodingKey::from_rsa_pem(test_private_pem_alt().as_bytes()).expect("alt key");
    let forged = jsonwebtoken::encode(&header, &claims, &wrong_key).expect("encode");

    assert_auth_error!(manager.verify(&forged), InvalidSignature);
}

#[test]
fn test_hmac_substitution_is_rejected_before_signature_check() {
    let manager = manager();
    let claims = manager.access_claims(&Claims::default()).expect("claims");

    // Classic confusion attack: re-sign with HS256 using a guessable secret.
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(manager.current_key_id().to_string());
    let token =
        jsonwebtoken::encode(&header, &claims, &EncodingKey::from_secret(b"guessable"))
            .expect("encode");

    assert_auth_error!(manager.verify(&token), UnexpectedSigningMethod);
}

#[test]
fn test_alg_none_is_rejected() {
    let manager = manager();
    let kid = manager.current_key_id().to_string();

    let token = craft_raw_jwt(
        &json!({"alg": "none", "typ": "JWT", "kid": kid}),
        &json!({"sub": "user-1", "exp": 99_999_999_999_i64}),
    );

    assert_auth_error!(manager.verify(&token), InvalidTokenFormat);
}

#[test]
fn test_missing_kid_is_rejected() {
    let manager = manager();
    let claims = manager.access_claims(&Claims::default()).expect("claims");

    let header = Header::new(Algorithm::RS256);
    let key = EncodingKey::from_rsa_pem(test_private_pem().as_bytes()).expect("key");
    let token = jsonwebtoken::encode(&header, &claims, &key).expect("encode");

    assert_auth_error!(manager.verify(&token), InvalidTokenFormat);
}

#[test]
fn test_non_ulid_kid_is_treated_as_unknown_key() {
    let manager = manager();
    let claims = manager.access_claims(&Claims::default()).expect("claims");

    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some("../../etc/passwd".into());
    let key = EncodingKey::from_rsa_pem(test_private_pem().as_bytes()).expect("key");
    let token = jsonwebtoken::encode(&header, &claims, &key).expect("encode");

    assert_auth_error!(manager.verify(&token), UnknownSigningKey);
}

#[test]
fn test_wrong_audience_and_issuer_are_rejected() {
    let manager = manager();

    let mut claims = manager.access_claims(&Claims::default()).expect("claims");
    claims.aud = vec!["https://someone-else.example".into()];
    let token = manager.sign(&claims).expect("sign");
    assert_auth_error!(manager.verify(&token), InvalidAudience);

    let mut claims = manager.access_claims(&Claims::default()).expect("claims");
    claims.iss = "https://someone-else.example".into();
    let token = manager.sign(&claims).expect("sign");
    assert_auth_error!(manager.verify(&token), InvalidIssuer);

    // Extra audiences are fine as long as ours is present.
    let mut claims = manager.access_claims(&Claims::default()).expect("claims");
    claims.aud.push("https://someone-else.example".into());
    let token = manager.sign(&claims).expect("sign");
    manager.verify(&token).expect("audience list containing ours verifies");
}

#[rstest]
#[case::empty("")]
#[case::one_part("YWJj")]
#[case::two_parts("YWJj.YWJj")]
#[case::dots_only("....")]
#[case::not_base64("ab!.cd!.ef!")]
#[case::binary_noise("\u{0}\u{1}\u{2}.\u{fffd}.x")]
#[case::header_not_json("YWJj.YWJj.YWJj")]
fn test_malformed_tokens_error_without_panicking(#[case] token: &str) {
    let manager = manager();
    let result = manager.verify(token);
    assert!(result.is_err(), "malformed token must be rejected: {token:?}");
    assert!(!result.unwrap_err().is_fatal(), "request-level failure only");
}
