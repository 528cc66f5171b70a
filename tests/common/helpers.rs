use std::sync::LazyLock;

use faqline::{
    app::{get_db_connection_pool, Application},
    config::AppConfig,
    crypto::{canonical_payload, hash_identifier, sign_hmac},
    telemetry::{build_telemetry, register_telemetry},
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use sqlx::{Connection, Executor, PgConnection, PgPool};
use uuid::Uuid;

static TELEMETRY: LazyLock<()> = LazyLock::new(|| {
    let default_filter_level = "info".to_string();
    if std::env::var("TEST_LOG").is_ok() {
        register_telemetry(build_telemetry("test".into(), default_filter_level, std::io::stdout));
    } else {
        register_telemetry(build_telemetry("test".into(), default_filter_level, std::io::sink));
    }
});

/// Swaps the database name out of a `postgres://...` connection string,
/// since [`AppConfig`] (unlike the teacher's) carries a single connection
/// string rather than discrete host/user/db fields.
fn with_database(url: &str, db_name: &str) -> String {
    let (base, query) = url.split_once('?').unwrap_or((url, ""));
    let head = base.rsplit_once('/').map(|(h, _)| h).unwrap_or(base);
    if query.is_empty() {
        format!("{head}/{db_name}")
    } else {
        format!("{head}/{db_name}?{query}")
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RegisteredOrg {
    pub org_id: Uuid,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginData {
    pub access_token: String,
}

/// Everything a test needs to drive a live `faqline-api` instance: the
/// address it's bound to, a plain HTTP client, the test database pool, and
/// a signing helper so tests can build valid HMAC headers the way a real
/// SDK client would. Mirrors the teacher's `TestApp` (`tests/common/helpers.rs`),
/// generalized from a single bearer-auth stack to this crate's dual HMAC +
/// bearer trust fabric.
pub struct TestApp {
    pub address: String,
    pub api_client: reqwest::Client,
    pub db_pool: PgPool,
}

impl TestApp {
    /// Signs `body` as `method`/`path` would require and returns the three
    /// `X-Client-*` headers plus the body bytes, ready to attach to a
    /// request (spec.md §4.1/§4.3).
    pub fn sign(&self, org: &RegisteredOrg, method: &str, path: &str, body: &Value) -> [(&'static str, String); 3] {
        let secret_hash = hash_identifier(&org.client_secret);
        let timestamp = (time::OffsetDateTime::now_utc().unix_timestamp() * 1000).to_string();
        let payload = canonical_payload(method, path, &timestamp, body);
        let signature = sign_hmac(&secret_hash, &payload);

        [
            ("x-client-id", org.client_id.clone()),
            ("x-timestamp", timestamp),
            ("x-signature", signature),
        ]
    }

    /// Registers a fresh org and returns its credentials plus the owner's
    /// bearer access token, ready for `Authorization: Bearer ...`.
    pub async fn register_and_login(&self) -> (RegisteredOrg, String) {
        let org_name = format!("acme-{}", Uuid::new_v4());
        let admin_email = format!("owner-{}@example.com", Uuid::new_v4());
        let register_body = serde_json::json!({
            "org_name": org_name,
            "admin_email": admin_email,
            "admin_password": "correct horse battery staple 1",
        });

        let res = self
            .api_client
            .post(format!("{}/v1/org/register", &self.address))
            .json(&register_body)
            .send()
            .await
            .expect("failed to execute request");
        assert!(res.status().is_success(), "register_org failed: {:?}", res.text().await);

        let registered: Envelope<RegisteredOrg> = res.json().await.expect("register_org response decodes");
        let org = registered.data;

        let login_body = serde_json::json!({
            "email": admin_email,
            "password": "correct horse battery staple 1",
        });
        let headers = self.sign(&org, "POST", "/v1/auth/login", &login_body);

        let mut req = self.api_client.post(format!("{}/v1/auth/login", &self.address)).json(&login_body);
        for (name, value) in headers {
            req = req.header(name, value);
        }
        let res = req.send().await.expect("failed to execute request");
        assert!(res.status().is_success(), "login failed: {:?}", res.text().await);

        let login: Envelope<LoginData> = res.json().await.expect("login response decodes");

        (org, login.data.access_token)
    }
}

pub async fn spawn_app() -> TestApp {
    dotenvy::dotenv().ok();
    LazyLock::force(&TELEMETRY);

    let mut app_config = AppConfig::parse();

    let db_name = format!("faqline_test_{}", Uuid::new_v4().simple());
    let base_url = app_config.database_url.expose_secret().to_string();
    setup_database(&base_url, &db_name).await;
    app_config.database_url = SecretString::from(with_database(&base_url, &db_name));

    app_config.port = 0;
    app_config.local_test_mode = true;
    app_config.storage_type = faqline::config::StorageType::Local;
    app_config.storage_path = std::env::temp_dir()
        .join(format!("faqline-test-{db_name}"))
        .to_string_lossy()
        .into_owned();

    let db_pool = get_db_connection_pool(&app_config);

    let api_client = reqwest::Client::builder().build().unwrap();
    let app = Application::build(app_config).await.expect("failed to build application");
    let address = format!("http://127.0.0.1:{}", app.port);

    tokio::spawn(app.run_until_stopped());

    TestApp { address, api_client, db_pool }
}

async fn setup_database(base_url: &str, db_name: &str) {
    let maintenance_url = with_database(base_url, "postgres");
    let mut connection = PgConnection::connect(&maintenance_url)
        .await
        .expect("failed to connect to postgres for test database setup");

    connection
        .execute(format!(r#"CREATE DATABASE "{db_name}";"#).as_str())
        .await
        .expect("failed to create test database");

    let pool = PgPool::connect(&with_database(base_url, db_name))
        .await
        .expect("failed to connect to freshly created test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations against test database");
}
