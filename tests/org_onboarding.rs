mod common;

use common::helpers::spawn_app;
use serde_json::json;

/// spec.md §8: "Register org, sign in as owner, complete onboarding" and
/// the cross-tenant credential isolation that org registration implies —
/// a second org with a different name/email coexists without clashing.
#[tokio::test]
async fn register_org_then_login_succeeds() {
    let app = spawn_app().await;

    let (_org, access_token) = app.register_and_login().await;
    assert!(!access_token.is_empty());
}

#[tokio::test]
async fn login_with_wrong_password_is_rejected() {
    let app = spawn_app().await;

    let org_name = format!("acme-{}", uuid::Uuid::new_v4());
    let admin_email = format!("owner-{}@example.com", uuid::Uuid::new_v4());
    let register_body = json!({
        "org_name": org_name,
        "admin_email": admin_email,
        "admin_password": "correct horse battery staple 1",
    });

    let res = app
        .api_client
        .post(format!("{}/v1/org/register", &app.address))
        .json(&register_body)
        .send()
        .await
        .unwrap();
    assert!(res.status().is_success());
    let registered: serde_json::Value = res.json().await.unwrap();
    let org = common::helpers::RegisteredOrg {
        org_id: registered["data"]["org_id"].as_str().unwrap().parse().unwrap(),
        client_id: registered["data"]["client_id"].as_str().unwrap().to_string(),
        client_secret: registered["data"]["client_secret"].as_str().unwrap().to_string(),
    };

    let login_body = json!({ "email": admin_email, "password": "definitely wrong" });
    let headers = app.sign(&org, "POST", "/v1/auth/login", &login_body);
    let mut req = app.api_client.post(format!("{}/v1/auth/login", &app.address)).json(&login_body);
    for (name, value) in headers {
        req = req.header(name, value);
    }
    let res = req.send().await.unwrap();

    assert_eq!(res.status(), reqwest::StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error_code"], "INVALID_CREDENTIALS");
}

/// spec.md §4.1/§4.3: a request signed with the wrong org's secret must
/// never validate against the right org, even with a correct client id.
#[tokio::test]
async fn hmac_signature_from_wrong_secret_is_rejected() {
    let app = spawn_app().await;

    let (mut org, _) = app.register_and_login().await;
    org.client_secret = "sk_not_the_real_secret".to_string();

    let login_body = json!({ "email": "whoever@example.com", "password": "whatever12345" });
    let headers = app.sign(&org, "POST", "/v1/auth/login", &login_body);
    let mut req = app.api_client.post(format!("{}/v1/auth/login", &app.address)).json(&login_body);
    for (name, value) in headers {
        req = req.header(name, value);
    }
    let res = req.send().await.unwrap();

    assert_eq!(res.status(), reqwest::StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error_code"], "INVALID_SIGNATURE");
}
