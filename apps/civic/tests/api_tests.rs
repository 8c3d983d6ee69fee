//! Integration tests for the HTTP/GraphQL API.
//!
//! Drives the full router (tenant resolution, auth, GraphQL) with axum-test
//! against a temporary data directory.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum_test::TestServer;
use chrono::Utc;
use civic::api::{AppState, build_router};
use civic::config::{ApiKey, ServerConfig};
use civic::plugins::PluginsManager;
use civic_core::{Tenant, TenantId, TenantPool};
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;

const STAFF_KEY: &str = "k-ana";

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

fn setup_with_keys(api_keys: Vec<ApiKey>) -> (TempDir, TestServer) {
    setup_with_limit(api_keys, 0)
}

fn setup_with_limit(api_keys: Vec<ApiKey>, rate_limit: u32) -> (TempDir, TestServer) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let pool = Arc::new(TenantPool::open(dir.path()).unwrap());
    let tenant = Tenant::new(TenantId::new("acme").unwrap(), "Acme City", ["acme.example.org"], Utc::now()).unwrap();
    pool.create_tenant(tenant).unwrap();

    let config = ServerConfig {
        api_keys,
        rate_limit,
        sweep_interval: None,
        ..ServerConfig::default()
    };
    let state = AppState::new(pool, Arc::new(PluginsManager::builtin()), &config);
    (dir, TestServer::new(build_router(state)).unwrap())
}

fn staff_keys() -> Vec<ApiKey> {
    vec![ApiKey {
        label: "ana".into(),
        key: STAFF_KEY.into(),
    }]
}

fn setup() -> (TempDir, TestServer) {
    setup_with_keys(staff_keys())
}

fn tenant_header() -> HeaderName {
    HeaderName::from_static("x-tenant")
}

async fn graphql(server: &TestServer, key: Option<&str>, query: &str, variables: Value) -> Value {
    let mut request = server
        .post("/graphql")
        .add_header(tenant_header(), HeaderValue::from_static("acme"))
        .json(&json!({ "query": query, "variables": variables }));
    if let Some(key) = key {
        request = request.authorization_bearer(key);
    }
    let response = request.await;
    response.assert_status_ok();
    response.json::<Value>()
}

async fn staff(server: &TestServer, query: &str, variables: Value) -> Value {
    graphql(server, Some(STAFF_KEY), query, variables).await
}

async fn create_vehicle_type(server: &TestServer) -> String {
    let body = staff(
        server,
        "mutation($input: EntryTypeInput!) { entryTypeCreate(input: $input) { errors { field code } entryType { id kind } } }",
        json!({ "input": { "name": "Buses", "kind": "VEHICLE" } }),
    )
    .await;
    let payload = &body["data"]["entryTypeCreate"];
    assert_eq!(payload["errors"], json!([]));
    assert_eq!(payload["entryType"]["kind"], "VEHICLE");
    payload["entryType"]["id"].as_str().unwrap().to_string()
}

async fn create_vehicle(server: &TestServer, entry_type: &str, name: &str, plate: &str, published: bool) -> String {
    let body = staff(
        server,
        "mutation($input: EntryInput!) { entryCreate(input: $input) { errors { field code message } entry { id documentNumber } } }",
        json!({ "input": {
            "entryType": entry_type,
            "name": name,
            "documentNumber": plate,
            "isPublished": published,
        } }),
    )
    .await;
    let payload = &body["data"]["entryCreate"];
    assert_eq!(payload["errors"], json!([]), "unexpected errors: {payload}");
    payload["entry"]["id"].as_str().unwrap().to_string()
}

// =============================================================================
// ROUTING & AUTH
// =============================================================================

#[tokio::test]
async fn test_health_needs_no_tenant() {
    let (_dir, server) = setup();

    let response = server.get("/health").await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "ok");
}

#[tokio::test]
async fn test_unknown_tenant_is_404() {
    let (_dir, server) = setup();

    let response = server
        .post("/graphql")
        .add_header(tenant_header(), HeaderValue::from_static("nowhere"))
        .json(&json!({ "query": "{ tenant { id } }" }))
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["error"]["code"], "TENANT_NOT_FOUND");
}

#[tokio::test]
async fn test_tenant_resolved_from_host() {
    let (_dir, server) = setup();

    let response = server
        .post("/graphql")
        .add_header(header::HOST, HeaderValue::from_static("ACME.example.org:8000"))
        .json(&json!({ "query": "{ tenant { id name domains } }" }))
        .await;

    response.assert_status_ok();
    let body = response.json::<Value>();
    assert_eq!(body["data"]["tenant"]["id"], "acme");
    assert_eq!(body["data"]["tenant"]["name"], "Acme City");
}

#[tokio::test]
async fn test_unknown_api_key_is_401() {
    let (_dir, server) = setup();

    let response = server
        .post("/graphql")
        .add_header(tenant_header(), HeaderValue::from_static("acme"))
        .authorization_bearer("not-a-key")
        .json(&json!({ "query": "{ tenant { id } }" }))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_anonymous_mutation_is_denied() {
    let (_dir, server) = setup();

    let body = graphql(
        &server,
        None,
        "mutation { channelCreate(input: { name: \"Portal\" }) { errors { field code } channel { id } } }",
        json!({}),
    )
    .await;

    let payload = &body["data"]["channelCreate"];
    assert_eq!(payload["errors"][0]["code"], "PERMISSION_DENIED");
    assert_eq!(payload["errors"][0]["field"], Value::Null);
    assert_eq!(payload["channel"], Value::Null);
}

#[tokio::test]
async fn test_everyone_is_staff_without_keys() {
    let (_dir, server) = setup_with_keys(Vec::new());

    let body = graphql(
        &server,
        None,
        "mutation { channelCreate(input: { name: \"Portal\" }) { errors { code } channel { slug isActive } } }",
        json!({}),
    )
    .await;

    let payload = &body["data"]["channelCreate"];
    assert_eq!(payload["errors"], json!([]));
    assert_eq!(payload["channel"]["slug"], "portal");
}

#[tokio::test]
async fn test_staff_only_queries_fail_for_anonymous() {
    let (_dir, server) = setup();

    let body = graphql(&server, None, "{ events { id kind } }", json!({})).await;

    assert_eq!(body["errors"][0]["message"], "PERMISSION_DENIED");
}

// =============================================================================
// CRUD
// =============================================================================

#[tokio::test]
async fn test_entry_crud_and_events() {
    let (_dir, server) = setup();
    let entry_type = create_vehicle_type(&server).await;
    let entry = create_vehicle(&server, &entry_type, "Bus 12", "abc-1234", true).await;

    let body = staff(
        &server,
        "query($id: ID!) { entry(id: $id) { name slug documentNumber entryType { name } } }",
        json!({ "id": entry }),
    )
    .await;
    assert_eq!(body["data"]["entry"]["documentNumber"], "ABC1234");
    assert_eq!(body["data"]["entry"]["slug"], "bus-12");
    assert_eq!(body["data"]["entry"]["entryType"]["name"], "Buses");

    let body = staff(
        &server,
        "mutation($id: ID!) { entryUpdate(id: $id, input: { name: \"Bus 12A\" }) { errors { code } entry { name } } }",
        json!({ "id": entry }),
    )
    .await;
    assert_eq!(body["data"]["entryUpdate"]["entry"]["name"], "Bus 12A");

    let body = staff(
        &server,
        "mutation($id: ID!) { entryDelete(id: $id) { errors { code } entry { id } } }",
        json!({ "id": entry }),
    )
    .await;
    assert_eq!(body["data"]["entryDelete"]["entry"]["id"], entry.as_str());

    let body = staff(&server, "{ events { kind actor } }", json!({})).await;
    let kinds: Vec<&str> = body["data"]["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["kind"].as_str().unwrap())
        .collect();
    assert!(kinds.contains(&"ENTRY_CREATED"));
    assert!(kinds.contains(&"ENTRY_DELETED"));
    assert_eq!(body["data"]["events"][0]["actor"], "ana");
}

#[tokio::test]
async fn test_validation_errors_are_payload_data() {
    let (_dir, server) = setup();
    let entry_type = create_vehicle_type(&server).await;

    let body = staff(
        &server,
        "mutation($input: EntryInput!) { entryCreate(input: $input) { errors { field code } entry { id } } }",
        json!({ "input": { "entryType": entry_type, "documentNumber": "not a plate" } }),
    )
    .await;

    let payload = &body["data"]["entryCreate"];
    assert_eq!(payload["entry"], Value::Null);
    let fields: Vec<&str> = payload["errors"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["field"].as_str())
        .collect();
    assert!(fields.contains(&"name"));
    assert!(fields.contains(&"document_number"));
}

#[tokio::test]
async fn test_malformed_ids_are_reported() {
    let (_dir, server) = setup();

    let body = staff(
        &server,
        "mutation { entryUpdate(id: \"bogus\", input: { name: \"x\" }) { errors { field code } entry { id } } }",
        json!({}),
    )
    .await;

    let payload = &body["data"]["entryUpdate"];
    assert_eq!(payload["errors"][0]["field"], "id");
    assert_eq!(payload["errors"][0]["code"], "INVALID");
}

#[tokio::test]
async fn test_anonymous_sees_published_entries_only() {
    let (_dir, server) = setup();
    let entry_type = create_vehicle_type(&server).await;
    create_vehicle(&server, &entry_type, "Bus 1", "ABC1234", true).await;
    let hidden = create_vehicle(&server, &entry_type, "Bus 2", "BRA2E19", false).await;

    let query = "{ entries { totalCount items { name } } }";
    let staff_view = staff(&server, query, json!({})).await;
    let public_view = graphql(&server, None, query, json!({})).await;

    assert_eq!(staff_view["data"]["entries"]["totalCount"], 2);
    assert_eq!(public_view["data"]["entries"]["totalCount"], 1);
    assert_eq!(public_view["data"]["entries"]["items"][0]["name"], "Bus 1");

    let body = graphql(&server, None, "query($id: ID!) { entry(id: $id) { name } }", json!({ "id": hidden })).await;
    assert_eq!(body["data"]["entry"], Value::Null);
}

#[tokio::test]
async fn test_entries_are_paged() {
    let (_dir, server) = setup();
    let entry_type = create_vehicle_type(&server).await;
    for (name, plate) in [("Bus 1", "ABC1234"), ("Bus 2", "BRA2E19"), ("Bus 3", "XYZ9876")] {
        create_vehicle(&server, &entry_type, name, plate, true).await;
    }

    let query = "query($first: Int, $offset: Int) { entries(first: $first, offset: $offset) { totalCount items { name } } }";
    let body = graphql(&server, None, query, json!({ "first": 2, "offset": 1 })).await;
    let page = &body["data"]["entries"];
    assert_eq!(page["totalCount"], 3);
    assert_eq!(page["items"], json!([{ "name": "Bus 2" }, { "name": "Bus 3" }]));

    let body = graphql(&server, None, query, json!({ "offset": 5 })).await;
    assert_eq!(body["data"]["entries"]["totalCount"], 3);
    assert_eq!(body["data"]["entries"]["items"], json!([]));
}

#[tokio::test]
async fn test_rate_limit_rejects_bursts() {
    let (_dir, server) = setup_with_limit(staff_keys(), 1);

    server.get("/health").await.assert_status_ok();
    let response = server.get("/health").await;

    response.assert_status(StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.json::<Value>()["error"]["code"], "RATE_LIMITED");
}

async fn create_attribute(server: &TestServer, input: Value) -> String {
    let body = staff(
        server,
        "mutation($input: AttributeInput!) { attributeCreate(input: $input) { errors { field code } attribute { id } } }",
        json!({ "input": input }),
    )
    .await;
    let payload = &body["data"]["attributeCreate"];
    assert_eq!(payload["errors"], json!([]), "unexpected errors: {payload}");
    payload["attribute"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_anonymous_attribute_views_hide_private_data() {
    let (_dir, server) = setup();
    let notes = create_attribute(
        &server,
        json!({ "name": "Internal notes", "target": "ENTRY", "inputType": "PLAIN_TEXT", "visibleInWebsite": false }),
    )
    .await;
    let garage = create_attribute(&server, json!({ "name": "Garage", "target": "ENTRY", "inputType": "REFERENCE" })).await;
    let entry_type = create_vehicle_type(&server).await;
    let body = staff(
        &server,
        "mutation($id: ID!, $input: EntryTypeInput!) { entryTypeUpdate(id: $id, input: $input) { errors { field code } } }",
        json!({ "id": entry_type, "input": { "entryAttributes": [notes, garage] } }),
    )
    .await;
    assert_eq!(body["data"]["entryTypeUpdate"]["errors"], json!([]));

    let query = "query($id: ID!) { entryType(id: $id) { entryAttributes { name } } }";
    let public_view = graphql(&server, None, query, json!({ "id": entry_type })).await;
    assert_eq!(public_view["data"]["entryType"]["entryAttributes"], json!([{ "name": "Garage" }]));
    let staff_view = staff(&server, query, json!({ "id": entry_type })).await;
    assert_eq!(staff_view["data"]["entryType"]["entryAttributes"].as_array().unwrap().len(), 2);

    let depot = create_vehicle(&server, &entry_type, "Secret depot", "DEP0001", false).await;
    let body = staff(
        &server,
        "mutation($input: EntryInput!) { entryCreate(input: $input) { errors { field code } entry { id } } }",
        json!({ "input": {
            "entryType": entry_type,
            "name": "Bus 1",
            "documentNumber": "ABC1234",
            "isPublished": true,
            "attributes": [{ "id": garage, "references": [depot] }],
        } }),
    )
    .await;
    assert_eq!(body["data"]["entryCreate"]["errors"], json!([]));
    let bus = body["data"]["entryCreate"]["entry"]["id"].as_str().unwrap().to_string();

    let query = "query($id: ID!) { entry(id: $id) { attributes { attribute { name } values { name } } } }";
    let public_view = graphql(&server, None, query, json!({ "id": bus })).await;
    let attributes = &public_view["data"]["entry"]["attributes"];
    assert_eq!(attributes, &json!([{ "attribute": { "name": "Garage" }, "values": [] }]));
    assert!(!public_view.to_string().contains("Secret depot"));

    let staff_view = staff(&server, query, json!({ "id": bus })).await;
    assert_eq!(staff_view["data"]["entry"]["attributes"][0]["values"][0]["name"], "Secret depot");
}

// =============================================================================
// DOCUMENT WORKFLOW
// =============================================================================

#[tokio::test]
async fn test_file_approval_workflow() {
    let (_dir, server) = setup();
    let entry_type = create_vehicle_type(&server).await;
    let entry = create_vehicle(&server, &entry_type, "Bus 1", "ABC1234", true).await;

    let body = staff(
        &server,
        "mutation($input: DocumentInput!) { documentCreate(input: $input) { errors { field code } document { id status } } }",
        json!({ "input": { "entry": entry, "name": "Insurance", "expires": true } }),
    )
    .await;
    let document = body["data"]["documentCreate"]["document"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["documentCreate"]["document"]["status"], "MISSING");

    let body = staff(
        &server,
        "mutation($input: DocumentFileInput!) { documentFileCreate(input: $input) { errors { field code } documentFile { id } } }",
        json!({ "input": { "document": document, "fileUrl": "https://files.example.org/a.pdf" } }),
    )
    .await;
    assert_eq!(body["data"]["documentFileCreate"]["errors"][0]["field"], "expiration_date");

    let body = staff(
        &server,
        "mutation($input: DocumentFileInput!) { documentFileCreate(input: $input) { errors { code } documentFile { id status } } }",
        json!({ "input": {
            "document": document,
            "fileUrl": "https://files.example.org/a.pdf",
            "expirationDate": "2099-01-31",
        } }),
    )
    .await;
    let file = &body["data"]["documentFileCreate"]["documentFile"];
    assert_eq!(file["status"], "WAITING");
    let file_id = file["id"].as_str().unwrap().to_string();

    let body = staff(
        &server,
        "mutation($id: ID!) { documentFileApprove(id: $id) { errors { code } documentFile { status decidedAt } } }",
        json!({ "id": file_id }),
    )
    .await;
    assert_eq!(body["data"]["documentFileApprove"]["documentFile"]["status"], "APPROVED");

    let body = staff(
        &server,
        "mutation($id: ID!) { documentFileRefuse(id: $id, reason: \"blurry\") { errors { code } } }",
        json!({ "id": file_id }),
    )
    .await;
    assert_eq!(body["data"]["documentFileRefuse"]["errors"][0]["code"], "INVALID_STATUS");

    let body = staff(
        &server,
        "query($id: ID!) { document(id: $id) { status activeFile { fileUrl expirationDate } } }",
        json!({ "id": document }),
    )
    .await;
    assert_eq!(body["data"]["document"]["status"], "APPROVED");
    assert_eq!(body["data"]["document"]["activeFile"]["expirationDate"], "2099-01-31");
}

#[tokio::test]
async fn test_anonymous_compliance_counts_published_only() {
    let (_dir, server) = setup();
    let entry_type = create_vehicle_type(&server).await;
    let public = create_vehicle(&server, &entry_type, "Bus 1", "ABC1234", true).await;
    let hidden = create_vehicle(&server, &entry_type, "Bus 2", "BRA2E19", false).await;
    for (entry, name, published) in [(&public, "Insurance", true), (&public, "Draft", false), (&hidden, "Insurance", true)] {
        let body = staff(
            &server,
            "mutation($input: DocumentInput!) { documentCreate(input: $input) { errors { field code } } }",
            json!({ "input": { "entry": entry, "name": name, "isPublished": published } }),
        )
        .await;
        assert_eq!(body["data"]["documentCreate"]["errors"], json!([]));
    }

    let query = "{ complianceSummary { entries documents missing } }";
    let staff_view = staff(&server, query, json!({})).await;
    assert_eq!(staff_view["data"]["complianceSummary"]["entries"], 2);
    assert_eq!(staff_view["data"]["complianceSummary"]["documents"], 3);

    let public_view = graphql(&server, None, query, json!({})).await;
    assert_eq!(public_view["data"]["complianceSummary"]["entries"], 1);
    assert_eq!(public_view["data"]["complianceSummary"]["documents"], 1);
    assert_eq!(public_view["data"]["complianceSummary"]["missing"], 1);

    let body = graphql(
        &server,
        None,
        "query($id: ID!) { complianceSummary(entry: $id) { entries documents } }",
        json!({ "id": hidden }),
    )
    .await;
    assert_eq!(body["data"]["complianceSummary"]["entries"], 0);
    assert_eq!(body["data"]["complianceSummary"]["documents"], 0);
}

#[tokio::test]
async fn test_manual_documents_cannot_be_loaded() {
    let (_dir, server) = setup();
    let entry_type = create_vehicle_type(&server).await;
    let entry = create_vehicle(&server, &entry_type, "Bus 1", "ABC1234", true).await;
    let body = staff(
        &server,
        "mutation($input: DocumentInput!) { documentCreate(input: $input) { document { id loadType } } }",
        json!({ "input": { "entry": entry, "name": "Licence" } }),
    )
    .await;
    let document = body["data"]["documentCreate"]["document"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["documentCreate"]["document"]["loadType"], "manual");

    let body = staff(
        &server,
        "mutation($id: ID!) { documentLoad(id: $id) { status errors { code } } }",
        json!({ "id": document }),
    )
    .await;
    assert_eq!(body["data"]["documentLoad"]["status"], "MANUAL");
}

// =============================================================================
// PLUGINS
// =============================================================================

#[tokio::test]
async fn test_plugin_configuration_masks_secrets() {
    let (_dir, server) = setup();

    let body = staff(
        &server,
        r#"mutation {
            pluginUpdate(identifier: "civic.notifications.sendgrid", input: {
                active: true,
                values: [{ key: "api_key", value: "SG.secret" }, { key: "from_email", value: "noreply@acme.gov" }]
            }) {
                errors { code message }
                plugin { active configuration { key value secret } }
            }
        }"#,
        json!({}),
    )
    .await;

    let payload = &body["data"]["pluginUpdate"];
    assert_eq!(payload["errors"], json!([]));
    assert_eq!(payload["plugin"]["active"], true);
    let values = payload["plugin"]["configuration"].as_array().unwrap();
    let api_key = values.iter().find(|v| v["key"] == "api_key").unwrap();
    assert_eq!(api_key["value"], "********");
    let from = values.iter().find(|v| v["key"] == "from_email").unwrap();
    assert_eq!(from["value"], "noreply@acme.gov");
}

#[tokio::test]
async fn test_plugin_activation_requires_settings() {
    let (_dir, server) = setup();

    let body = staff(
        &server,
        r#"mutation {
            pluginUpdate(identifier: "civic.notifications.webhook", input: { active: true }) {
                errors { code message }
                plugin { active }
            }
        }"#,
        json!({}),
    )
    .await;

    let payload = &body["data"]["pluginUpdate"];
    assert_eq!(payload["plugin"], Value::Null);
    assert_eq!(payload["errors"][0]["code"], "PLUGIN_ERROR");
    assert!(payload["errors"][0]["message"].as_str().unwrap().contains("url"));
}

#[tokio::test]
async fn test_load_types_include_plugins() {
    let (_dir, server) = setup();

    let body = graphql(&server, None, "{ loadTypes }", json!({})).await;

    let types = body["data"]["loadTypes"].as_array().unwrap();
    assert_eq!(types[0], "manual");
    assert!(types.contains(&json!("cndt")));
}
