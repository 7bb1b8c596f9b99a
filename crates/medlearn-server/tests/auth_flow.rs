mod common;

use common::{ADMIN_EMAIL, TestServer, USER_PASSWORD, assert_error, json_body};
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
async fn register_login_and_profile() {
    let server = TestServer::start().await;

    let res = server
        .post(
            "/api/auth/register",
            None,
            json!({
                "email": "  Nadia.Haddad@Clinic.ORG ",
                "password": USER_PASSWORD,
                "full_name": " Nadia Haddad ",
                "profession": "Nurse"
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body = json_body(res).await;
    assert_eq!(body["user"]["email"], "nadia.haddad@clinic.org");
    assert_eq!(body["user"]["full_name"], "Nadia Haddad");
    assert_eq!(body["user"]["role"], "user");
    assert!(body["user"].get("password_hash").is_none());
    assert_eq!(body["token"]["token_type"], "Bearer");

    let res = server
        .post(
            "/api/auth/login",
            None,
            json!({ "email": "NADIA.HADDAD@clinic.org", "password": USER_PASSWORD }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = json_body(res).await;
    let token = body["token"]["access_token"].as_str().unwrap().to_string();
    assert!(body["user"]["last_login_at"].is_string());

    let me = json_body(server.get("/api/auth/me", Some(&token)).await).await;
    assert_eq!(me["profession"], "Nurse");

    let res = server
        .put(
            "/api/users/me",
            &token,
            json!({ "institution": "St. Mary's", "profession": "" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let updated = json_body(res).await;
    assert_eq!(updated["institution"], "St. Mary's");
    assert!(updated.get("profession").is_none());

    server.stop().await;
}

#[tokio::test]
async fn registration_validation_and_duplicates() {
    let server = TestServer::start().await;

    let res = server
        .post(
            "/api/auth/register",
            None,
            json!({ "email": "not-an-email", "password": "short", "full_name": "  " }),
        )
        .await;
    let body = assert_error(res, StatusCode::UNPROCESSABLE_ENTITY, "validation").await;
    let fields: Vec<&str> = body["error"]["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["email", "password", "full_name"]);

    server.register("dup@medlearn.test", "First").await;
    let res = server
        .post(
            "/api/auth/register",
            None,
            json!({ "email": "DUP@medlearn.test", "password": USER_PASSWORD, "full_name": "Second" }),
        )
        .await;
    assert_error(res, StatusCode::CONFLICT, "conflict").await;

    server.stop().await;
}

#[tokio::test]
async fn login_failures_look_the_same() {
    let server = TestServer::start().await;
    server.register("known@medlearn.test", "Known").await;

    let unknown = server
        .post(
            "/api/auth/login",
            None,
            json!({ "email": "nobody@medlearn.test", "password": USER_PASSWORD }),
        )
        .await;
    let unknown = assert_error(unknown, StatusCode::UNAUTHORIZED, "unauthorized").await;

    let wrong = server
        .post(
            "/api/auth/login",
            None,
            json!({ "email": "known@medlearn.test", "password": "wrong-password" }),
        )
        .await;
    let wrong = assert_error(wrong, StatusCode::UNAUTHORIZED, "unauthorized").await;
    assert_eq!(unknown["error"]["message"], wrong["error"]["message"]);

    server.stop().await;
}

#[tokio::test]
async fn change_password() {
    let server = TestServer::start().await;
    let (token, _) = server.register("pw@medlearn.test", "Pat").await;

    let res = server
        .post(
            "/api/users/me/password",
            Some(&token),
            json!({ "current_password": "not-it-at-all", "new_password": "brand-new-pass" }),
        )
        .await;
    assert_error(res, StatusCode::UNPROCESSABLE_ENTITY, "validation").await;

    let res = server
        .post(
            "/api/users/me/password",
            Some(&token),
            json!({ "current_password": USER_PASSWORD, "new_password": "brand-new-pass" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = server
        .post(
            "/api/auth/login",
            None,
            json!({ "email": "pw@medlearn.test", "password": "brand-new-pass" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    server.stop().await;
}

#[tokio::test]
async fn admin_manages_users() {
    let server = TestServer::start().await;
    let admin = server.admin_token().await;
    let (user_token, user_id) = server.register("resident@medlearn.test", "Resident").await;

    // Regular users cannot reach admin routes
    let res = server.get("/api/admin/users", Some(&user_token)).await;
    assert_error(res, StatusCode::FORBIDDEN, "forbidden").await;

    let list = json_body(server.get("/api/admin/users?role=user", Some(&admin)).await).await;
    assert_eq!(list["total"], 1);
    assert_eq!(list["items"][0]["id"], user_id.as_str());

    // Deactivation takes effect for tokens already issued
    let res = server
        .patch(&format!("/api/admin/users/{user_id}"), &admin, json!({ "active": false }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let res = server.get("/api/auth/me", Some(&user_token)).await;
    assert_error(res, StatusCode::FORBIDDEN, "forbidden").await;
    let res = server
        .post(
            "/api/auth/login",
            None,
            json!({ "email": "resident@medlearn.test", "password": USER_PASSWORD }),
        )
        .await;
    assert_error(res, StatusCode::FORBIDDEN, "forbidden").await;

    // Admins cannot lock themselves out
    let admins = json_body(
        server
            .get(&format!("/api/admin/users?email={ADMIN_EMAIL}"), Some(&admin))
            .await,
    )
    .await;
    let admin_id = admins["items"][0]["id"].as_str().unwrap().to_string();
    let res = server
        .patch(&format!("/api/admin/users/{admin_id}"), &admin, json!({ "role": "user" }))
        .await;
    assert_error(res, StatusCode::CONFLICT, "conflict").await;

    let res = server
        .patch("/api/admin/users/missing", &admin, json!({ "active": true }))
        .await;
    assert_error(res, StatusCode::NOT_FOUND, "not-found").await;

    server.stop().await;
}

#[tokio::test]
async fn deactivation_during_login_stays_in_force() {
    let server = TestServer::start().await;
    let admin = server.admin_token().await;
    let (_, user_id) = server.register("racer@medlearn.test", "Racer").await;
    let user_path = format!("/api/admin/users/{user_id}");

    for round in 0..10 {
        let client = server.client.clone();
        let url = server.url("/api/auth/login");
        let login = tokio::spawn(async move {
            client
                .post(url)
                .json(&json!({ "email": "racer@medlearn.test", "password": USER_PASSWORD }))
                .send()
                .await
                .unwrap()
                .status()
        });
        tokio::time::sleep(std::time::Duration::from_millis(3)).await;
        let res = server.patch(&user_path, &admin, json!({ "active": false })).await;
        assert_eq!(res.status(), StatusCode::OK);

        let status = login.await.unwrap();
        assert!(
            status == StatusCode::OK || status == StatusCode::FORBIDDEN,
            "round {round}: login answered {status}"
        );
        let list = json_body(
            server
                .get("/api/admin/users?email=racer@medlearn.test", Some(&admin))
                .await,
        )
        .await;
        assert_eq!(list["items"][0]["active"], false, "round {round}");

        let res = server.patch(&user_path, &admin, json!({ "active": true })).await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    server.stop().await;
}

#[tokio::test]
async fn role_changes_apply_to_issued_tokens() {
    let server = TestServer::start().await;
    let admin = server.admin_token().await;
    let (token, user_id) = server.register("promoted@medlearn.test", "Promoted").await;
    let path = format!("/api/admin/users/{user_id}");

    let res = server.get("/api/admin/users", Some(&token)).await;
    assert_error(res, StatusCode::FORBIDDEN, "forbidden").await;

    let res = server.patch(&path, &admin, json!({ "role": "admin" })).await;
    assert_eq!(res.status(), StatusCode::OK);
    let res = server.get("/api/admin/users", Some(&token)).await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = server.patch(&path, &admin, json!({ "role": "user" })).await;
    assert_eq!(res.status(), StatusCode::OK);
    let res = server.get("/api/admin/users", Some(&token)).await;
    assert_error(res, StatusCode::FORBIDDEN, "forbidden").await;

    server.stop().await;
}
