//! Lead writer tests against a mock CRM endpoint and an in-memory entity table

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use leadflow_common::config::CrmConfig;
use leadflow_intake::crm::rest::CrmRestClient;
use leadflow_intake::crm::sqlite_store::SqliteLeadStore;
use leadflow_intake::crm::{
    DbWrite, FieldMap, LeadRequest, LeadStore, LeadWriteOutcome, LeadWriter, RestFailure,
};
use leadflow_intake::extraction::pattern::PatternExtractor;
use leadflow_intake::fields::{ExtractedFields, FieldKey};
use leadflow_intake::validation::validate;

const FIELD_MAP: &[(&str, i64)] = &[
    ("first_name", 3),
    ("last_name", 4),
    ("phone", 7),
    ("year", 9),
    ("make", 10),
    ("model", 11),
    ("notes", 12),
];

async fn entity_table() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::query(
        "CREATE TABLE app_entity_25 (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            created_by INTEGER NOT NULL,
            date_added INTEGER NOT NULL,
            date_updated INTEGER,
            parent_item_id INTEGER NOT NULL DEFAULT 0,
            sort_order INTEGER NOT NULL DEFAULT 0,
            field_3 TEXT,
            field_4 TEXT,
            field_7 TEXT,
            field_9 TEXT,
            field_10 TEXT,
            field_11 TEXT,
            field_12 TEXT,
            field_30 INT NOT NULL,
            field_31 VARCHAR(64) NOT NULL
        )",
    )
    .execute(&pool)
    .await
    .unwrap();
    pool
}

fn crm_config(server: &MockServer) -> CrmConfig {
    CrmConfig {
        api_url: Some(format!("{}/api/rest.php", server.uri())),
        api_key: Some("static-key".into()),
        leads_entity_id: 25,
        ..Default::default()
    }
}

fn writer(server: &MockServer, pool: &SqlitePool) -> LeadWriter {
    let config = crm_config(server);
    let store: Arc<dyn LeadStore> = Arc::new(SqliteLeadStore::from_pool(pool.clone()));
    LeadWriter::new(
        FieldMap::from_entries(FIELD_MAP.iter().copied()).unwrap(),
        Some(CrmRestClient::new(&config).unwrap()),
        Some(store),
        25,
        1,
    )
}

fn sarah_request() -> LeadRequest {
    let transcript = "my name is Sarah Johnson, 2018 Honda Accord, check engine light, call 904-555-7890";
    let fields = PatternExtractor::new().extract_fields(transcript);
    LeadRequest::new(validate(&fields))
}

async fn mount_insert_status(server: &MockServer, status: u16, body: &str) {
    Mock::given(method("POST"))
        .and(path("/api/rest.php"))
        .and(body_string_contains("action=insert"))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_rest_success_is_terminal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/rest.php"))
        .and(body_string_contains("key=static-key"))
        .and(body_string_contains("fields%5Bfield_7%5D=9045557890"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"{"status":"success","data":{"id":812}}"#),
        )
        .expect(1)
        .mount(&server)
        .await;

    let pool = entity_table().await;
    let outcome = writer(&server, &pool).create_lead(sarah_request()).await;

    assert!(matches!(outcome, LeadWriteOutcome::RestSuccess { lead_id: Some(812) }));
    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM app_entity_25")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 0);
}

#[tokio::test]
async fn test_client_error_is_rejected_without_fallback() {
    let server = MockServer::start().await;
    mount_insert_status(&server, 401, "bad key").await;

    let pool = entity_table().await;
    let outcome = writer(&server, &pool).create_lead(sarah_request()).await;

    assert!(matches!(
        outcome,
        LeadWriteOutcome::RestRejected { failure: RestFailure::Rejected { status: 401, .. } }
    ));
    assert_eq!(outcome.lead_id(), None);
}

#[tokio::test]
async fn test_server_error_falls_back_and_fills_required_columns() {
    let server = MockServer::start().await;
    mount_insert_status(&server, 503, "maintenance").await;

    let pool = entity_table().await;
    let outcome = writer(&server, &pool).create_lead(sarah_request()).await;

    let id = match &outcome {
        LeadWriteOutcome::RestFailedFallbackAttempted {
            rest_failure: RestFailure::Server { status: 503, .. },
            db: Ok(DbWrite::Inserted { id }),
        } => *id,
        other => panic!("unexpected outcome {:?}", other),
    };

    let (first, last, phone, year, make, model, filler_int, filler_text, created_by): (
        String,
        String,
        String,
        String,
        String,
        String,
        i64,
        String,
        i64,
    ) = sqlx::query_as(
        "SELECT field_3, field_4, field_7, field_9, field_10, field_11, field_30, field_31, created_by
         FROM app_entity_25 WHERE id = ?",
    )
    .bind(id)
    .fetch_one(&pool)
    .await
    .unwrap();

    assert_eq!((first.as_str(), last.as_str()), ("Sarah", "Johnson"));
    assert_eq!(phone, "9045557890");
    assert_eq!(year, "2018");
    assert_eq!((make.as_str(), model.as_str()), ("Honda", "Accord"));
    assert_eq!(filler_int, 0);
    assert_eq!(filler_text, "");
    assert_eq!(created_by, 1);
}

#[tokio::test]
async fn test_unusable_body_falls_back() {
    let server = MockServer::start().await;
    mount_insert_status(&server, 200, "<html>Fatal error</html>").await;

    let pool = entity_table().await;
    let outcome = writer(&server, &pool).create_lead(sarah_request()).await;
    assert_eq!(outcome.kind(), "inserted");
}

async fn seed_lead(pool: &SqlitePool, age_secs: i64) -> i64 {
    let result = sqlx::query(
        "INSERT INTO app_entity_25 (created_by, date_added, field_3, field_7, field_10, field_30, field_31)
         VALUES (1, ?, 'Sara', '9045557890', '', 0, '')",
    )
    .bind(Utc::now().timestamp() - age_secs)
    .execute(pool)
    .await
    .unwrap();
    result.last_insert_rowid()
}

#[tokio::test]
async fn test_repeat_call_inside_window_updates_existing_lead() {
    let server = MockServer::start().await;
    mount_insert_status(&server, 502, "").await;

    let pool = entity_table().await;
    let existing = seed_lead(&pool, 1800).await;
    let outcome = writer(&server, &pool).create_lead(sarah_request()).await;

    match &outcome {
        LeadWriteOutcome::RestFailedFallbackAttempted { db: Ok(DbWrite::DuplicateUpdated { id, updated }), .. } => {
            assert_eq!(*id, existing);
            assert!(*updated);
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    let (first, make, date_updated): (String, String, Option<i64>) =
        sqlx::query_as("SELECT field_3, field_10, date_updated FROM app_entity_25 WHERE id = ?")
            .bind(existing)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(first, "Sara");
    assert_eq!(make, "Honda");
    assert!(date_updated.is_some());

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM app_entity_25")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 1);
}

#[tokio::test]
async fn test_repeat_call_outside_window_inserts() {
    let server = MockServer::start().await;
    mount_insert_status(&server, 500, "").await;

    let pool = entity_table().await;
    let existing = seed_lead(&pool, 7200).await;
    let outcome = writer(&server, &pool).create_lead(sarah_request()).await;

    assert_eq!(outcome.kind(), "inserted");
    assert_ne!(outcome.lead_id(), Some(existing));
}

#[tokio::test]
async fn test_transport_failure_falls_back() {
    let pool = entity_table().await;
    let config = CrmConfig {
        // Nothing listens on the discard port
        api_url: Some("http://127.0.0.1:9/api/rest.php".into()),
        leads_entity_id: 25,
        connect_timeout_secs: 1,
        timeout_secs: 2,
        ..Default::default()
    };
    let store: Arc<dyn LeadStore> = Arc::new(SqliteLeadStore::from_pool(pool.clone()));
    let writer = LeadWriter::new(
        FieldMap::from_entries(FIELD_MAP.iter().copied()).unwrap(),
        Some(CrmRestClient::new(&config).unwrap()),
        Some(store),
        25,
        1,
    );

    let extracted: ExtractedFields = [(FieldKey::Phone, "9045550000")].into_iter().collect();
    let outcome = writer.create_lead(LeadRequest::new(validate(&extracted))).await;

    assert!(matches!(
        outcome,
        LeadWriteOutcome::RestFailedFallbackAttempted { rest_failure: RestFailure::Transport(_), db: Ok(_) }
    ));
}

#[tokio::test]
async fn test_login_token_used_for_insert() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/rest.php"))
        .and(body_string_contains("action=login"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"token":"session-123"}"#))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/rest.php"))
        .and(body_string_contains("token=session-123"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"status":"success","id":"77"}"#))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = crm_config(&server);
    config.username = Some("intake".into());
    config.password = Some("secret".into());
    let writer = LeadWriter::new(
        FieldMap::from_entries(FIELD_MAP.iter().copied()).unwrap(),
        Some(CrmRestClient::new(&config).unwrap()),
        None,
        25,
        1,
    );

    let outcome = writer.create_lead(sarah_request()).await;
    assert_eq!(outcome.lead_id(), Some(77));
}

#[tokio::test]
async fn test_slow_insert_times_out_and_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/rest.php"))
        .and(body_string_contains("action=insert"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"status":"success","id":"900"}"#)
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let pool = entity_table().await;
    let config = CrmConfig {
        timeout_secs: 1,
        ..crm_config(&server)
    };
    let store: Arc<dyn LeadStore> = Arc::new(SqliteLeadStore::from_pool(pool.clone()));
    let writer = LeadWriter::new(
        FieldMap::from_entries(FIELD_MAP.iter().copied()).unwrap(),
        Some(CrmRestClient::new(&config).unwrap()),
        Some(store),
        25,
        1,
    );

    let outcome = writer.create_lead(sarah_request()).await;

    assert!(matches!(
        outcome,
        LeadWriteOutcome::RestFailedFallbackAttempted {
            rest_failure: RestFailure::Transport(_),
            db: Ok(DbWrite::Inserted { .. }),
        }
    ));
    assert_ne!(outcome.lead_id(), Some(900));
}

#[tokio::test]
async fn test_failed_login_uses_static_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/rest.php"))
        .and(body_string_contains("action=login"))
        .respond_with(ResponseTemplate::new(500).set_body_string("login unavailable"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/rest.php"))
        .and(body_string_contains("action=insert"))
        .and(body_string_contains("key=static-key"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"status":"success","id":"78"}"#))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = crm_config(&server);
    config.username = Some("intake".into());
    config.password = Some("secret".into());
    let writer = LeadWriter::new(
        FieldMap::from_entries(FIELD_MAP.iter().copied()).unwrap(),
        Some(CrmRestClient::new(&config).unwrap()),
        None,
        25,
        1,
    );

    let outcome = writer.create_lead(sarah_request()).await;
    assert!(matches!(outcome, LeadWriteOutcome::RestSuccess { lead_id: Some(78) }));
}
