//! HTTP API tests over a live server bound to an ephemeral port.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use pulsewatch::api::{spawn_api_server, ApiState};
use pulsewatch::model::{AlertRecord, AlertStatus};
use pulsewatch::notify::Notifier;
use pulsewatch::probe::ProbeRegistry;
use pulsewatch::scheduler::Scheduler;
use pulsewatch::service::auth::AuthService;
use pulsewatch::service::targets::TargetService;
use pulsewatch::silence::SilenceTable;
use pulsewatch::storage::{MemoryStore, Store};
use serde_json::{json, Value};

struct TestApp {
    addr: SocketAddr,
    client: reqwest::Client,
    token: String,
    store: Arc<MemoryStore>,
    silences: Arc<SilenceTable>,
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(&self.token)
            .send()
            .await
            .unwrap()
    }

    async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn put(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .put(self.url(path))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn delete(&self, path: &str) -> reqwest::Response {
        self.client
            .delete(self.url(path))
            .bearer_auth(&self.token)
            .send()
            .await
            .unwrap()
    }
}

async fn spawn_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(ProbeRegistry::with_builtins());

    let (scheduler, _result_rx, _edge_rx) =
        Scheduler::new(registry.clone(), store.clone(), 3);
    let scheduler = Arc::new(scheduler);

    let auth = Arc::new(AuthService::new(
        store.clone() as Arc<dyn Store>,
        "test-secret",
        24,
    ));
    auth.bootstrap_admin("admin123").await.unwrap();

    let targets = Arc::new(TargetService::new(
        store.clone(),
        registry.clone(),
        scheduler.clone(),
        30,
        5,
    ));

    let silences = Arc::new(SilenceTable::new());
    let notifier = Arc::new(Notifier::new(store.clone() as Arc<dyn Store>));

    let state = ApiState {
        store: store.clone(),
        registry,
        scheduler,
        targets,
        auth,
        notifier,
        silences: silences.clone(),
    };

    let addr = spawn_api_server("127.0.0.1:0".parse().unwrap(), state)
        .await
        .unwrap();

    let client = reqwest::Client::new();
    let login: Value = client
        .post(format!("http://{addr}/api/v1/auth/login"))
        .json(&json!({"username": "admin", "password": "admin123"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let token = login["data"]["token"].as_str().unwrap().to_string();

    TestApp {
        addr,
        client,
        token,
        store,
        silences,
    }
}

fn tcp_target_body(name: &str) -> Value {
    json!({
        "name": name,
        "type": "tcp",
        "config": {"host": "localhost", "port": 5432},
        "timeout_seconds": 3,
        "interval_seconds": 60,
        "enabled": false
    })
}

#[tokio::test]
async fn health_is_open_and_ok() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(app.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn protected_routes_require_a_valid_token() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(app.url("/api/v1/targets"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    let response = app
        .client
        .get(app.url("/api/v1/targets"))
        .bearer_auth("not-a-token")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    let response = app.get("/api/v1/targets").await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn login_rejects_bad_credentials() {
    let app = spawn_app().await;

    let response = app
        .client
        .post(app.url("/api/v1/auth/login"))
        .json(&json!({"username": "admin", "password": "wrong"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], 401);
}

#[tokio::test]
async fn probe_types_are_enumerated() {
    let app = spawn_app().await;

    let body: Value = app.get("/api/v1/probe/types").await.json().await.unwrap();
    assert_eq!(body["code"], 0);
    let values: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["value"].as_str().unwrap())
        .collect();
    assert!(values.contains(&"tcp"));
    assert!(values.contains(&"http"));

    let schema: Value = app
        .get("/api/v1/probe/schema/tcp")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(schema["data"]["host"]["required"], true);

    let missing = app.get("/api/v1/probe/schema/nope").await;
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn target_crud_round_trips() {
    let app = spawn_app().await;

    // Create.
    let created: Value = app
        .post("/api/v1/targets", tcp_target_body("db"))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(created["code"], 0);
    let id = created["data"]["id"].as_i64().unwrap();
    assert_eq!(created["data"]["status"], "disabled");

    // Read equals create.
    let fetched: Value = app
        .get(&format!("/api/v1/targets/{id}"))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["data"]["name"], "db");
    assert_eq!(fetched["data"]["type"], "tcp");
    assert_eq!(fetched["data"]["timeout_seconds"], 3);
    assert_eq!(fetched["data"]["interval_seconds"], 60);

    // No-op update keeps stored values.
    let updated: Value = app
        .put(&format!("/api/v1/targets/{id}"), json!({}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(updated["data"]["name"], fetched["data"]["name"]);
    assert_eq!(updated["data"]["config"], fetched["data"]["config"]);
    assert_eq!(
        updated["data"]["interval_seconds"],
        fetched["data"]["interval_seconds"]
    );

    // Listed.
    let listed: Value = app.get("/api/v1/targets").await.json().await.unwrap();
    assert_eq!(listed["data"]["total"], 1);

    // Delete, then gone.
    let deleted = app.delete(&format!("/api/v1/targets/{id}")).await;
    assert_eq!(deleted.status(), 200);
    let missing = app.get(&format!("/api/v1/targets/{id}")).await;
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn delete_of_nonexistent_target_is_not_found() {
    let app = spawn_app().await;

    let response = app.delete("/api/v1/targets/4242").await;
    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], 404);
}

#[tokio::test]
async fn invalid_probe_config_is_a_bad_request() {
    let app = spawn_app().await;

    let response = app
        .post(
            "/api/v1/targets",
            json!({
                "name": "broken",
                "type": "tcp",
                "config": {"host": "localhost"},
                "enabled": false
            }),
        )
        .await;
    assert_eq!(response.status(), 400);

    let response = app
        .post(
            "/api/v1/targets",
            json!({
                "name": "broken",
                "type": "smoke-signal",
                "config": {},
                "enabled": false
            }),
        )
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn silence_endpoint_mutes_the_record_target() {
    let app = spawn_app().await;

    let alert_id = app
        .store
        .insert_alert(&AlertRecord {
            id: 0,
            target_id: 77,
            target_name: "db".to_string(),
            target_kind: "tcp".to_string(),
            status: AlertStatus::Firing,
            message: "down".to_string(),
            latency_ms: 10,
            fired_at: Utc::now(),
            resolved_at: None,
            notified: false,
        })
        .await
        .unwrap();

    // Default duration is 30 minutes.
    let response: Value = app
        .put(&format!("/api/v1/alerts/{alert_id}/silence"), json!({}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(response["code"], 0);
    assert_eq!(response["data"]["target_id"], 77);
    assert!(app.silences.is_silenced(77));

    // Zero is rejected.
    let response = app
        .put(
            &format!("/api/v1/alerts/{alert_id}/silence"),
            json!({"duration_minutes": 0}),
        )
        .await;
    assert_eq!(response.status(), 400);

    // Unknown record is not found.
    let response = app.put("/api/v1/alerts/9999/silence", json!({})).await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn notifier_crud_validates_templates_at_write_time() {
    let app = spawn_app().await;

    let response = app
        .post(
            "/api/v1/notifiers",
            json!({
                "name": "bad",
                "webhook_url": "http://example.com/hook",
                "message_template": "{{not_a_variable}}"
            }),
        )
        .await;
    assert_eq!(response.status(), 400);

    let created: Value = app
        .post(
            "/api/v1/notifiers",
            json!({
                "name": "ops",
                "webhook_url": "http://example.com/hook",
                "message_template": "{{target_name}} is down: {{message}}"
            }),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(created["code"], 0);
    let id = created["data"]["id"].as_i64().unwrap();

    let response = app
        .put(
            &format!("/api/v1/notifiers/{id}"),
            json!({"message_template": "{{broken"}),
        )
        .await;
    assert_eq!(response.status(), 400);

    let listed: Value = app.get("/api/v1/notifiers").await.json().await.unwrap();
    assert_eq!(listed["data"].as_array().unwrap().len(), 1);

    let deleted = app.delete(&format!("/api/v1/notifiers/{id}")).await;
    assert_eq!(deleted.status(), 200);
}

#[tokio::test]
async fn stats_for_unknown_target_is_not_found() {
    let app = spawn_app().await;
    let response = app.get("/api/v1/targets/123/stats").await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn dashboard_summary_counts_by_status() {
    let app = spawn_app().await;

    app.post("/api/v1/targets", tcp_target_body("a")).await;
    app.post("/api/v1/targets", tcp_target_body("b")).await;

    let summary: Value = app
        .get("/api/v1/dashboard/summary")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(summary["data"]["total_targets"], 2);
    assert_eq!(summary["data"]["disabled_count"], 2);
    assert_eq!(summary["data"]["healthy_count"], 0);

    let metrics: Value = app
        .get("/api/v1/dashboard/metrics")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(metrics["data"]["targets"].as_array().unwrap().len(), 2);
    assert_eq!(metrics["data"]["stream_drops"]["results"], 0);
}
