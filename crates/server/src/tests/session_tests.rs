use super::*;
use jsonwebtoken::{decode, DecodingKey, Validation};

#[test]
fn minted_tokens_round_trip() {
    let keys = SessionKeys::new("test-secret");
    let token = keys
        .mint(UserId(7), UserRole::Provider, 3600)
        .expect("token");

    let identity = keys.verify(&token).expect("verify");
    assert_eq!(identity.user_id, UserId(7));
    assert_eq!(identity.role, UserRole::Provider);
}

#[test]
fn claims_carry_subject_and_role() {
    let keys = SessionKeys::new("test-secret");
    let token = keys.mint(UserId(42), UserRole::Client, 60).expect("token");

    let decoded = decode::<serde_json::Value>(
        &token,
        &DecodingKey::from_secret("test-secret".as_bytes()),
        &Validation::default(),
    )
    .expect("decode");

    assert_eq!(decoded.claims["sub"], 42);
    assert_eq!(decoded.claims["role"], "client");
}

#[test]
fn tokens_signed_with_another_secret_are_rejected() {
    let keys = SessionKeys::new("test-secret");
    let token = keys.mint(UserId(7), UserRole::Client, 3600).expect("token");

    let other = SessionKeys::new("other-secret");
    let err = other.verify(&token).expect_err("should fail");
    assert_eq!(err.code, ErrorCode::Unauthorized);
}

#[test]
fn expired_tokens_are_rejected() {
    let keys = SessionKeys::new("test-secret");
    let token = keys
        .mint(UserId(7), UserRole::Client, -120)
        .expect("token");

    assert!(keys.verify(&token).is_err());
}
