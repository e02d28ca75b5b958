use chrono::Utc;
use plt_auth::TokenIssuer;
use plt_schemas::{Role, User};
use uuid::Uuid;

fn user(role: Role) -> User {
    User {
        user_id: Uuid::new_v4(),
        name: "Kiran".to_string(),
        email: "kiran@example.com".to_string(),
        role,
        created_at_utc: Utc::now(),
    }
}

#[test]
fn issued_token_round_trips_claims() {
    let issuer = TokenIssuer::new(b"test-signing-key", 3600);
    let u = user(Role::Customer);
    let token = issuer.issue(&u).unwrap();

    let claims = issuer.verify(&token).unwrap();
    assert_eq!(claims.sub, u.user_id);
    assert_eq!(claims.role, Role::Customer);
    assert_eq!(claims.exp - claims.iat, 3600);
    assert!(claims.require_admin().is_err());
}

#[test]
fn admin_claims_pass_admin_check() {
    let issuer = TokenIssuer::new(b"test-signing-key", 60);
    let token = issuer.issue(&user(Role::Admin)).unwrap();
    assert!(issuer.verify(&token).unwrap().require_admin().is_ok());
}

#[test]
fn token_from_another_key_is_rejected() {
    let a = TokenIssuer::new(b"key-a", 60);
    let b = TokenIssuer::new(b"key-b", 60);
    let token = a.issue(&user(Role::Admin)).unwrap();
    assert!(b.verify(&token).is_err());
}

#[test]
fn expired_token_is_rejected() {
    let issuer = TokenIssuer::new(b"test-signing-key", 60);
    let long_ago = Utc::now().timestamp() - 3600;
    let token = issuer.issue_at(Uuid::new_v4(), Role::Customer, long_ago).unwrap();
    assert!(issuer.verify(&token).is_err());
}

#[test]
fn tampered_payload_is_rejected() {
    let issuer = TokenIssuer::new(b"test-signing-key", 60);
    let token = issuer.issue(&user(Role::Customer)).unwrap();
    let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
    // Swap in the payload of an admin token signed by someone else.
    let forged = TokenIssuer::new(b"attacker", 60)
        .issue(&user(Role::Admin))
        .unwrap();
    parts[1] = forged.split('.').nth(1).unwrap().to_string();
    assert!(issuer.verify(&parts.join(".")).is_err());
}

#[test]
fn ephemeral_issuers_do_not_share_keys() {
    let a = TokenIssuer::ephemeral(60);
    let b = TokenIssuer::ephemeral(60);
    let token = a.issue(&user(Role::Customer)).unwrap();
    assert!(a.verify(&token).is_ok());
    assert!(b.verify(&token).is_err());
}
