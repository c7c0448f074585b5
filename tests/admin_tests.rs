//! Tests for the admin-only tenant and user management endpoints.

mod common;

use axum::http::StatusCode;
use common::{
    body_json, create_test_app, extract_set_cookies, has_cleared_cookie, json_request, request,
};

#[tokio::test]
async fn test_tenants_require_authentication() {
    let t = create_test_app().await;

    let response = t.send(request("GET", "/tenants", None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = t
        .send(request("GET", "/tenants", Some("accessToken=garbage")))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let cookies = extract_set_cookies(&response);
    assert!(has_cleared_cookie(&cookies, "accessToken"));
}

#[tokio::test]
async fn test_customer_is_forbidden() {
    let t = create_test_app().await;
    let customer = t.register("a@x.com", "pw123456").await;

    let response = t
        .send(json_request(
            "POST",
            "/tenants",
            serde_json::json!({ "name": "Shop", "address": "Main street" }),
            Some(&customer.access_cookie()),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    // A valid but unauthorized session keeps its cookies
    assert!(extract_set_cookies(&response).is_empty());

    let response = t
        .send(request("GET", "/users", Some(&customer.access_cookie())))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    assert!(t.db.tenants().list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_admin_tenant_crud() {
    let t = create_test_app().await;
    let admin = t.admin_session().await;
    let cookie = admin.access_cookie();

    let response = t
        .send(json_request(
            "POST",
            "/tenants",
            serde_json::json!({ "name": "Shop", "address": "Main street" }),
            Some(&cookie),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let id = body_json(response).await["id"].as_i64().unwrap();

    let response = t.send(request("GET", "/tenants", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let list = body_json(response).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["name"], "Shop");

    let response = t
        .send(json_request(
            "PATCH",
            &format!("/tenants/{}", id),
            serde_json::json!({ "name": "Shop 2", "address": "Side street" }),
            Some(&cookie),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = t
        .send(request("GET", &format!("/tenants/{}", id), Some(&cookie)))
        .await;
    let tenant = body_json(response).await;
    assert_eq!(tenant["name"], "Shop 2");
    assert_eq!(tenant["address"], "Side street");

    let response = t
        .send(request("DELETE", &format!("/tenants/{}", id), Some(&cookie)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = t
        .send(request("GET", &format!("/tenants/{}", id), Some(&cookie)))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_tenant_validation() {
    let t = create_test_app().await;
    let admin = t.admin_session().await;

    let response = t
        .send(json_request(
            "POST",
            "/tenants",
            serde_json::json!({ "name": " ", "address": "Main street" }),
            Some(&admin.access_cookie()),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_creates_manager_in_tenant() {
    let t = create_test_app().await;
    let admin = t.admin_session().await;
    let cookie = admin.access_cookie();
    let tenant = t.db.tenants().create("Shop", "Main street").await.unwrap();

    // Managers need a tenant
    let response = t
        .send(json_request(
            "POST",
            "/users",
            serde_json::json!({
                "firstName": "Mia",
                "lastName": "Manager",
                "email": "m@x.com",
                "password": "pw123456",
                "role": "manager"
            }),
            Some(&cookie),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = t
        .send(json_request(
            "POST",
            "/users",
            serde_json::json!({
                "firstName": "Mia",
                "lastName": "Manager",
                "email": "m@x.com",
                "password": "pw123456",
                "role": "manager",
                "tenantId": tenant.id
            }),
            Some(&cookie),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let id = body_json(response).await["id"].as_i64().unwrap();

    let user = t.db.users().get_by_id(id).await.unwrap().unwrap();
    assert_eq!(user.tenant_id, Some(tenant.id));

    // The new manager can log in and carries the manager role
    let manager = t.login("m@x.com", "pw123456").await;
    let claims = t.codec.verify_access_token(&manager.access).unwrap();
    assert_eq!(claims.role, warden::db::Role::Manager);

    // But is not an admin
    let response = t
        .send(request("GET", "/users", Some(&manager.access_cookie())))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_create_user_rejects_unknown_role() {
    let t = create_test_app().await;
    let admin = t.admin_session().await;

    let response = t
        .send(json_request(
            "POST",
            "/users",
            serde_json::json!({
                "email": "r@x.com",
                "password": "pw123456",
                "role": "root"
            }),
            Some(&admin.access_cookie()),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(!t.db.users().email_exists("r@x.com").await.unwrap());
}

#[tokio::test]
async fn test_admin_user_management() {
    let t = create_test_app().await;
    let admin = t.admin_session().await;
    let cookie = admin.access_cookie();
    let customer = t.register("a@x.com", "pw123456").await;

    let response = t.send(request("GET", "/users", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let users = body_json(response).await;
    assert_eq!(users.as_array().unwrap().len(), 2);
    assert!(users[0].get("passwordHash").is_none());

    let response = t
        .send(json_request(
            "PATCH",
            &format!("/users/{}", customer.id),
            serde_json::json!({ "firstName": "Renamed" }),
            Some(&cookie),
        ))
        .await;
    // Customers need a tenant and this one has none
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let tenant = t.db.tenants().create("Shop", "Main street").await.unwrap();
    let response = t
        .send(json_request(
            "PATCH",
            &format!("/users/{}", customer.id),
            serde_json::json!({ "firstName": "Renamed", "tenantId": tenant.id }),
            Some(&cookie),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = t
        .send(request("GET", &format!("/users/{}", customer.id), Some(&cookie)))
        .await;
    let user = body_json(response).await;
    assert_eq!(user["firstName"], "Renamed");
    assert_eq!(user["tenantId"], tenant.id);
    assert_eq!(user["email"], "a@x.com");

    let response = t
        .send(request("DELETE", &format!("/users/{}", customer.id), Some(&cookie)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(t.refresh_count(customer.id).await, 0);

    let response = t
        .send(request("GET", &format!("/users/{}", customer.id), Some(&cookie)))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // The deleted user's refresh token no longer works
    let response = t
        .send(request(
            "POST",
            "/auth/refresh",
            Some(&customer.refresh_cookie()),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_demoted_admin_cannot_refresh() {
    let t = create_test_app().await;
    let admin = t.admin_session().await;
    let cookie = admin.access_cookie();
    let tenant = t.db.tenants().create("Shop", "Main street").await.unwrap();

    let response = t
        .send(json_request(
            "POST",
            "/users",
            serde_json::json!({
                "email": "second@x.com",
                "password": "pw123456",
                "role": "admin"
            }),
            Some(&cookie),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let second = t.login("second@x.com", "pw123456").await;

    let response = t
        .send(json_request(
            "PATCH",
            &format!("/users/{}", second.id),
            serde_json::json!({ "role": "customer", "tenantId": tenant.id }),
            Some(&cookie),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(t.refresh_count(second.id).await, 0);

    // The refresh token issued while still an admin is gone
    let response = t
        .send(request("POST", "/auth/refresh", Some(&second.refresh_cookie())))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // A fresh login carries the new role
    let demoted = t.login("second@x.com", "pw123456").await;
    let claims = t.codec.verify_access_token(&demoted.access).unwrap();
    assert_eq!(claims.role, warden::db::Role::Customer);
    let response = t
        .send(request("GET", "/users", Some(&demoted.access_cookie())))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_renaming_keeps_sessions() {
    let t = create_test_app().await;
    let admin = t.admin_session().await;
    let tenant = t.db.tenants().create("Shop", "Main street").await.unwrap();

    let response = t
        .send(json_request(
            "POST",
            "/users",
            serde_json::json!({
                "email": "m@x.com",
                "password": "pw123456",
                "role": "manager",
                "tenantId": tenant.id
            }),
            Some(&admin.access_cookie()),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let manager = t.login("m@x.com", "pw123456").await;

    let response = t
        .send(json_request(
            "PATCH",
            &format!("/users/{}", manager.id),
            serde_json::json!({ "firstName": "Mia" }),
            Some(&admin.access_cookie()),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = t
        .send(request("POST", "/auth/refresh", Some(&manager.refresh_cookie())))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_health() {
    let t = create_test_app().await;

    let response = t.send(request("GET", "/health", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!({ "status": "UP" }));
}
