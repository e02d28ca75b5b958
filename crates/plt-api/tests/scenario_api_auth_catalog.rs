//! In-process scenarios for health, auth, catalog and admin catalog routes.
//!
//! The router is driven via `tower::ServiceExt::oneshot` over a `MemStore`;
//! no network I/O.

mod common;

use axum::http::StatusCode;
use common::Harness;
use serde_json::json;

#[tokio::test]
async fn health_reports_backends() {
    let h = Harness::new();
    let (status, body) = h.call("GET", "/v1/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["service"], "plt-api");
    assert_eq!(body["storage"], "memory");
    assert_eq!(body["payments"], "fake");
}

#[tokio::test]
async fn register_login_me_roundtrip() {
    let h = Harness::new();
    let (status, body) = h
        .call(
            "POST",
            "/v1/auth/register",
            None,
            Some(json!({"name": " Ravi ", "email": "Ravi@Example.COM", "password": "longenough"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user"]["email"], "ravi@example.com");
    assert_eq!(body["user"]["name"], "Ravi");
    assert_eq!(body["user"]["role"], "customer");
    assert!(body.get("password_hash").is_none());
    assert!(body["user"].get("password_hash").is_none());

    let (status, body) = h
        .call(
            "POST",
            "/v1/auth/login",
            None,
            Some(json!({"email": "ravi@example.com", "password": "longenough"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_string();

    let (status, me) = h.call("GET", "/v1/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "ravi@example.com");
}

#[tokio::test]
async fn register_rejects_bad_input_and_duplicates() {
    let h = Harness::new();
    h.customer("dup@example.com").await;

    let (status, body) = h
        .call(
            "POST",
            "/v1/auth/register",
            None,
            Some(json!({"name": "Dup", "email": "DUP@example.com", "password": "longenough"})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");

    let (status, body) = h
        .call(
            "POST",
            "/v1/auth/register",
            None,
            Some(json!({"name": "Short", "email": "short@example.com", "password": "short"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");

    let (status, _) = h
        .call(
            "POST",
            "/v1/auth/register",
            None,
            Some(json!({"name": "NoAt", "email": "not-an-email", "password": "longenough"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Malformed JSON still comes back as a JSON error body.
    let (status, body) = h
        .call("POST", "/v1/auth/register", None, Some(json!({"name": 5})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn login_failures_are_indistinguishable() {
    let h = Harness::new();
    h.customer("known@example.com").await;

    let (s1, b1) = h
        .call(
            "POST",
            "/v1/auth/login",
            None,
            Some(json!({"email": "known@example.com", "password": "wrong password"})),
        )
        .await;
    let (s2, b2) = h
        .call(
            "POST",
            "/v1/auth/login",
            None,
            Some(json!({"email": "nobody@example.com", "password": "wrong password"})),
        )
        .await;
    assert_eq!(s1, StatusCode::UNAUTHORIZED);
    assert_eq!(s2, StatusCode::UNAUTHORIZED);
    assert_eq!(b1["error"], b2["error"]);
}

#[tokio::test]
async fn protected_routes_require_valid_token() {
    let h = Harness::new();
    let (status, body) = h.call("GET", "/v1/cart", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, _) = h.call("GET", "/v1/auth/me", Some("not.a.jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Token signed by another key.
    let other = plt_auth::TokenIssuer::new(b"other-secret", 60);
    let forged = other
        .issue_at(uuid::Uuid::new_v4(), plt_schemas::Role::Admin, chrono::Utc::now().timestamp())
        .unwrap();
    let (status, _) = h
        .call("GET", "/v1/admin/dashboard", Some(&forged), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_routes_forbid_customers() {
    let h = Harness::new();
    let (token, _) = h.customer("cust@example.com").await;
    for (method, uri) in [
        ("GET", "/v1/admin/foods"),
        ("GET", "/v1/admin/orders"),
        ("GET", "/v1/admin/dashboard"),
        ("GET", "/v1/admin/stream"),
    ] {
        let (status, body) = h.call(method, uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{method} {uri}");
        assert_eq!(body["code"], "FORBIDDEN");
    }
}

#[tokio::test]
async fn public_catalog_hides_unavailable_items() {
    let h = Harness::new();
    let admin = h.admin().await;
    let dosa = h.food("Masala Dosa", 12_000).await;
    let idli = h.food("Idli", 6_000).await;

    let (status, _) = h
        .call(
            "PATCH",
            &format!("/v1/admin/foods/{idli}"),
            Some(&admin),
            Some(json!({"available": false})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, foods) = h
        .call("GET", "/v1/foods?include_unavailable=true", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = foods
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Masala Dosa"]);

    let (status, _) = h.call("GET", &format!("/v1/foods/{idli}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, item) = h.call("GET", &format!("/v1/foods/{dosa}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(item["price_minor"], 12_000);

    let (_, all) = h.call("GET", "/v1/admin/foods", Some(&admin), None).await;
    assert_eq!(all.as_array().unwrap().len(), 2);

    let (_, cats) = h.call("GET", "/v1/categories", None, None).await;
    assert_eq!(cats, json!([{"category": "Mains", "item_count": 1}]));

    let (_, found) = h.call("GET", "/v1/foods?q=dosa", None, None).await;
    assert_eq!(found.as_array().unwrap().len(), 1);
    let (_, none) = h.call("GET", "/v1/foods?category=Desserts", None, None).await;
    assert!(none.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn admin_food_crud() {
    let h = Harness::new();
    let admin = h.admin().await;

    let (status, created) = h
        .call(
            "POST",
            "/v1/admin/foods",
            Some(&admin),
            Some(json!({
                "name": "Gulab Jamun",
                "price_minor": 8_000,
                "category": "Desserts",
                "image_url": "https://cdn.example.com/gj.jpg"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["available"], true);
    let id = created["food_id"].as_str().unwrap().to_string();

    let (status, patched) = h
        .call(
            "PATCH",
            &format!("/v1/admin/foods/{id}"),
            Some(&admin),
            Some(json!({"price_minor": 9_000, "image_url": null})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patched["price_minor"], 9_000);
    assert!(patched["image_url"].is_null());
    assert_eq!(patched["name"], "Gulab Jamun");

    let (status, body) = h
        .call(
            "POST",
            "/v1/admin/foods",
            Some(&admin),
            Some(json!({"name": "Bad", "price_minor": -1, "category": "X"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, body) = h
        .call("DELETE", &format!("/v1/admin/foods/{id}"), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_null());

    let (status, _) = h
        .call("DELETE", &format!("/v1/admin/foods/{id}"), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = h
        .call("PATCH", "/v1/admin/foods/not-a-uuid", Some(&admin), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
}
