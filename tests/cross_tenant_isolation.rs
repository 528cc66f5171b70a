mod common;

use common::helpers::spawn_app;
use serde_json::json;

/// spec.md §8: "org A member cannot access org B's documents" — a document
/// owned by one org must 404, never 403 or 200, when looked up under a
/// different org's bearer token (spec.md §4.4 invariant on leak-free
/// not-found).
#[tokio::test]
async fn document_issued_by_one_org_is_invisible_to_another() {
    let app = spawn_app().await;

    let (_org_a, token_a) = app.register_and_login().await;
    let (_org_b, token_b) = app.register_and_login().await;

    let upload_body = json!({
        "filename": "handbook.pdf",
        "content_type": "pdf",
        "file_size": 1024,
    });
    let res = app
        .api_client
        .post(format!("{}/v1/documents/upload", &app.address))
        .bearer_auth(&token_a)
        .json(&upload_body)
        .send()
        .await
        .unwrap();
    assert!(res.status().is_success(), "upload should succeed: {:?}", res.text().await);

    let body: serde_json::Value = res.json().await.unwrap();
    let document_id = body["data"]["document_id"].as_str().unwrap().to_string();

    let res = app
        .api_client
        .get(format!("{}/v1/documents/{}/status", &app.address, document_id))
        .bearer_auth(&token_a)
        .send()
        .await
        .unwrap();
    assert!(res.status().is_success());

    let res = app
        .api_client
        .get(format!("{}/v1/documents/{}/status", &app.address, document_id))
        .bearer_auth(&token_b)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::NOT_FOUND);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error_code"], "DOCUMENT_NOT_FOUND");
}

/// spec.md §6.1: `/v1/users` only ever lists members of the caller's own
/// org, never a sibling org's.
#[tokio::test]
async fn user_listing_is_scoped_to_the_callers_org() {
    let app = spawn_app().await;

    let (org_a, token_a) = app.register_and_login().await;
    let (org_b, token_b) = app.register_and_login().await;

    let empty = serde_json::json!({});
    let headers_a = app.sign(&org_a, "GET", "/v1/users", &empty);
    let mut req_a = app.api_client.get(format!("{}/v1/users", &app.address)).bearer_auth(&token_a);
    for (name, value) in headers_a {
        req_a = req_a.header(name, value);
    }
    let a_users: serde_json::Value = req_a.send().await.unwrap().json().await.unwrap();

    let headers_b = app.sign(&org_b, "GET", "/v1/users", &empty);
    let mut req_b = app.api_client.get(format!("{}/v1/users", &app.address)).bearer_auth(&token_b);
    for (name, value) in headers_b {
        req_b = req_b.header(name, value);
    }
    let b_users: serde_json::Value = req_b.send().await.unwrap().json().await.unwrap();

    let a_ids: Vec<&str> = a_users["data"].as_array().unwrap().iter().map(|u| u["user_id"].as_str().unwrap()).collect();
    let b_ids: Vec<&str> = b_users["data"].as_array().unwrap().iter().map(|u| u["user_id"].as_str().unwrap()).collect();

    assert_eq!(a_ids.len(), 1);
    assert_eq!(b_ids.len(), 1);
    assert_ne!(a_ids[0], b_ids[0]);
}
