mod common;

use common::helpers::{spawn_app, RegisteredOrg, TestApp};
use serde_json::json;
use uuid::Uuid;

/// spec.md §8: "Login, refresh token, reuse old refresh token → detect
/// reuse." Each refresh revokes the token it was issued against, so the
/// same refresh token can never be redeemed twice.
#[tokio::test]
async fn reusing_a_rotated_refresh_token_is_rejected() {
    let app = spawn_app().await;
    let admin_email = format!("owner-{}@example.com", Uuid::new_v4());
    let admin_password = "correct horse battery staple 1";
    let org = register_org(&app, &admin_email, admin_password).await;

    let login_body = json!({ "email": admin_email, "password": admin_password });
    let res = send_signed(&app, &org, "POST", "/v1/auth/login", &login_body).await;
    assert!(res.status().is_success());
    let body: serde_json::Value = res.json().await.unwrap();
    let refresh_token = body["data"]["refresh_token"].as_str().unwrap().to_string();

    let refresh_body = json!({ "refresh_token": refresh_token });

    let first = send_signed(&app, &org, "POST", "/v1/auth/refresh", &refresh_body).await;
    assert!(first.status().is_success(), "first refresh should succeed");

    let second = send_signed(&app, &org, "POST", "/v1/auth/refresh", &refresh_body).await;
    assert_eq!(second.status(), reqwest::StatusCode::UNAUTHORIZED);
    let second_body: serde_json::Value = second.json().await.unwrap();
    assert_eq!(second_body["error_code"], "INVALID_REFRESH_TOKEN");
}

async fn register_org(app: &TestApp, admin_email: &str, admin_password: &str) -> RegisteredOrg {
    let register_body = json!({
        "org_name": format!("acme-{}", Uuid::new_v4()),
        "admin_email": admin_email,
        "admin_password": admin_password,
    });

    let res = app
        .api_client
        .post(format!("{}/v1/org/register", &app.address))
        .json(&register_body)
        .send()
        .await
        .unwrap();
    assert!(res.status().is_success());

    let body: serde_json::Value = res.json().await.unwrap();
    RegisteredOrg {
        org_id: body["data"]["org_id"].as_str().unwrap().parse().unwrap(),
        client_id: body["data"]["client_id"].as_str().unwrap().to_string(),
        client_secret: body["data"]["client_secret"].as_str().unwrap().to_string(),
    }
}

async fn send_signed(
    app: &TestApp,
    org: &RegisteredOrg,
    method: &str,
    path: &str,
    body: &serde_json::Value,
) -> reqwest::Response {
    let headers = app.sign(org, method, path, body);
    let mut req = app.api_client.request(method.parse().unwrap(), format!("{}{}", &app.address, path)).json(body);
    for (name, value) in headers {
        req = req.header(name, value);
    }
    req.send().await.unwrap()
}
