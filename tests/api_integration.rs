//! ---
//! cms_section: "15-testing-qa-runbook"
//! cms_subsection: "integration-tests"
//! cms_type: "source"
//! cms_scope: "code"
//! cms_description: "End-to-end tests of the dashboard HTTP API."
//! cms_version: "v0.0.0-prealpha"
//! cms_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use cms_net::{
    InferenceClient, MaintenanceAlertClient, MaintenanceFeatures, RestApiBuilder, RestApiHandle,
    USER_HEADER,
};
use cms_security::{AccessGuard, InMemoryRoleStore, PlantRole};
use cms_sim::StreamSettings;
use reqwest::Client;
use serde_json::{json, Value};
use url::Url;

struct TestApi {
    handle: RestApiHandle,
    guard: AccessGuard,
    client: Client,
}

impl TestApi {
    async fn start(builder: impl FnOnce(RestApiBuilder) -> RestApiBuilder) -> Self {
        let guard = AccessGuard::new(Arc::new(InMemoryRoleStore::new()));
        let stream = StreamSettings::new("nmdc_demo_01", Duration::from_millis(50));
        let base = RestApiBuilder::new("127.0.0.1:0".parse().unwrap(), guard.clone(), stream);
        let handle = builder(base).spawn().await.unwrap();
        Self {
            handle,
            guard,
            client: Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.handle.local_addr(), path)
    }

    async fn grant(&self, user: &str, role: PlantRole) {
        self.guard
            .assign(user, [role].into_iter().collect())
            .await
            .unwrap();
    }

    async fn post(&self, path: &str, user: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .header(USER_HEADER, user)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn send_raw(
        &self,
        method: reqwest::Method,
        path: &str,
        user: Option<&str>,
        body: &'static str,
    ) -> reqwest::Response {
        let mut request = self.client.request(method, self.url(path)).body(body);
        if let Some(user) = user {
            request = request.header(USER_HEADER, user);
        }
        request.send().await.unwrap()
    }

    async fn get(&self, path: &str, user: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .header(USER_HEADER, user)
            .send()
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn simulation_clamps_and_defaults() {
    let api = TestApi::start(|b| b).await;
    api.grant("eng@plant.io", PlantRole::ProcessEngineer).await;

    let run: Value = api
        .post(
            "/api/simulate/run",
            "eng@plant.io",
            json!({"rpm": "330", "load_tph": 60, "horizon": 5000}),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(run["timeseries"].as_array().unwrap().len(), 600);
    assert_eq!(run["kpi"]["load_tph"], 60.0);

    let defaults: Value = api
        .client
        .post(api.url("/api/simulate/run"))
        .header(USER_HEADER, "eng@plant.io")
        .body("not json")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(defaults["timeseries"].as_array().unwrap().len(), 60);
    assert_eq!(defaults["kpi"]["load_tph"], 55.0);

    // Operators may watch but not simulate.
    api.grant("op@plant.io", PlantRole::Operator).await;
    let denied = api.post("/api/simulate/run", "op@plant.io", json!({})).await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    api.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn mocked_models_answer_with_recommendations() {
    let api = TestApi::start(|b| b).await;
    api.grant("admin@plant.io", PlantRole::NmdcAdmin).await;

    let energy: Value = api
        .post(
            "/api/models/energy/predict",
            "admin@plant.io",
            json!({"metric": {"power_kw": 1000, "load_tph": 50, "rpm": 320}}),
        )
        .await
        .json()
        .await
        .unwrap();
    assert!(energy["predicted_kwh_per_ton"].as_f64().unwrap() > 0.0);
    assert_eq!(energy["recommendations"][0]["param"], "rpm");
    assert_eq!(energy["recommendations"][0]["to"], 305.0);
    assert_eq!(energy["explainability"]["shap"][0]["feature"], "load_tph");

    let pdm: Value = api
        .post(
            "/api/models/pdm/predict",
            "admin@plant.io",
            json!({"metric": {"vibration": 8.5, "temperature_c": 95}}),
        )
        .await
        .json()
        .await
        .unwrap();
    let risk = pdm["failure_risk"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&risk));
    assert!(pdm["recommendation"].is_string());
    api.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn tickets_need_maintenance_rights_to_create() {
    let api = TestApi::start(|b| b).await;
    api.grant("fitter@plant.io", PlantRole::Maintenance).await;
    api.grant("op@plant.io", PlantRole::Operator).await;

    let denied = api
        .post("/api/maintenance/tickets", "op@plant.io", json!({"title": "x"}))
        .await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let created: Value = api
        .post(
            "/api/maintenance/tickets",
            "fitter@plant.io",
            json!({"title": "Liner wear", "description": "inspect shell liners"}),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(created["ok"], true);
    assert_eq!(created["ticket"]["status"], "OPEN");

    let untitled: Value = api
        .post("/api/maintenance/tickets", "fitter@plant.io", json!({}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(untitled["ticket"]["title"], "Untitled");

    let listed: Value = api
        .get("/api/maintenance/tickets", "op@plant.io")
        .await
        .json()
        .await
        .unwrap();
    let tickets = listed["tickets"].as_array().unwrap();
    assert_eq!(tickets.len(), 2);
    assert_eq!(tickets[0]["title"], "Untitled");
    assert_eq!(tickets[1]["title"], "Liner wear");
    api.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn role_selection_and_administration() {
    let api = TestApi::start(|b| b).await;

    // No roles yet: navigation redirects to role selection.
    let nav = api.get("/api/nav", "new@plant.io").await;
    assert_eq!(nav.status(), StatusCode::FORBIDDEN);
    let body: Value = nav.json().await.unwrap();
    assert_eq!(body["redirect"], "/select-role");

    // Self-service selection of the first role.
    let chosen = api
        .client
        .put(api.url("/api/roles/new@plant.io"))
        .header(USER_HEADER, "new@plant.io")
        .json(&json!({"roles": ["OPERATOR"]}))
        .send()
        .await
        .unwrap();
    assert_eq!(chosen.status(), StatusCode::OK);

    let nav: Value = api
        .get("/api/nav", "new@plant.io")
        .await
        .json()
        .await
        .unwrap();
    let hrefs: Vec<&str> = nav
        .as_array()
        .unwrap()
        .iter()
        .map(|link| link["href"].as_str().unwrap())
        .collect();
    assert_eq!(hrefs, vec!["/", "/machines/grinder_01"]);

    // Escalation afterwards is refused.
    let escalate = api
        .client
        .put(api.url("/api/roles/new@plant.io"))
        .header(USER_HEADER, "new@plant.io")
        .json(&json!({"roles": ["NMDC_ADMIN"]}))
        .send()
        .await
        .unwrap();
    assert_eq!(escalate.status(), StatusCode::FORBIDDEN);

    // An admin can reassign, read, and inspect the matrix.
    api.grant("admin@plant.io", PlantRole::NmdcAdmin).await;
    let reassigned: Value = api
        .client
        .put(api.url("/api/roles/new@plant.io"))
        .header(USER_HEADER, "admin@plant.io")
        .json(&json!({"roles": ["SUPERVISOR", "MAINTENANCE"]}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reassigned["roles"], json!(["SUPERVISOR", "MAINTENANCE"]));

    let unknown = api
        .client
        .put(api.url("/api/roles/new@plant.io"))
        .header(USER_HEADER, "admin@plant.io")
        .json(&json!({"roles": ["JANITOR"]}))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);

    let foreign = api.get("/api/roles/admin@plant.io", "new@plant.io").await;
    assert_eq!(foreign.status(), StatusCode::FORBIDDEN);

    let matrix: Value = api
        .get("/api/rbac/matrix", "admin@plant.io")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(matrix.as_array().unwrap().len(), 6);
    let matrix = api.get("/api/rbac/matrix", "new@plant.io").await;
    assert_eq!(matrix.status(), StatusCode::FORBIDDEN);
    api.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn open_mode_skips_identity() {
    let api = TestApi::start(|b| b.enforce(false)).await;
    let run = api
        .client
        .post(api.url("/api/simulate/run"))
        .json(&json!({"horizon": 3}))
        .send()
        .await
        .unwrap();
    assert_eq!(run.status(), StatusCode::OK);
    let run: Value = run.json().await.unwrap();
    assert_eq!(run["timeseries"].as_array().unwrap().len(), 10);

    let nav: Value = api
        .client
        .get(api.url("/api/nav"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(nav.as_array().unwrap().len(), 9);
    api.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn console_menu_uses_job_titles() {
    let api = TestApi::start(|b| b).await;
    let menu: Value = api
        .client
        .get(api.url("/api/console/menu?role=operator"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let paths: Vec<&str> = menu
        .as_array()
        .unwrap()
        .iter()
        .map(|page| page["path"].as_str().unwrap())
        .collect();
    assert!(paths.contains(&"/dashboard"));
    assert!(!paths.contains(&"/maintenance"));
    assert!(!paths.contains(&"/admin"));

    let anonymous: Value = api
        .client
        .get(api.url("/api/console/menu"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(anonymous.as_array().unwrap().is_empty());
    api.handle.shutdown().await.unwrap();
}

async fn spawn_model_server(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn predict_proxies_the_model_service() {
    let upstream = spawn_model_server(Router::new().route(
        "/predict",
        post(|Json(features): Json<Value>| async move {
            Json(json!({
                "predicted_kwh_per_ton": 21.5,
                "echo_rpm": features["rpm"],
            }))
        }),
    ))
    .await;
    let endpoint = Url::parse(&format!("http://{upstream}/predict")).unwrap();
    let client = InferenceClient::new(endpoint, Duration::from_secs(5)).unwrap();
    let api = TestApi::start(|b| b.with_inference(client)).await;
    api.grant("eng@plant.io", PlantRole::ProcessEngineer).await;

    let features = json!({
        "power_kw": 1250.5, "load_tph": 55.2, "rpm": 320.0, "vibration": 0.02,
        "temperature_c": 78.5, "ore_grade": 0.48, "moisture_pct": 3.2,
        "mill_fill_pct": 85.0, "media_size_mm": 8.0,
        "last_15m_power_avg": 1230.0, "last_15m_load_avg": 54.5
    });
    let answer: Value = api
        .post("/api/predict", "eng@plant.io", features)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(answer["predicted_kwh_per_ton"], 21.5);
    assert_eq!(answer["echo_rpm"], 320.0);
    api.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn predict_surfaces_model_errors() {
    let upstream = spawn_model_server(Router::new().route(
        "/predict",
        post(|| async {
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({"detail": "rpm out of range"})),
            )
        }),
    ))
    .await;
    let endpoint = Url::parse(&format!("http://{upstream}/predict")).unwrap();
    let client = InferenceClient::new(endpoint, Duration::from_secs(5)).unwrap();
    let api = TestApi::start(|b| b.with_inference(client)).await;
    api.grant("eng@plant.io", PlantRole::ProcessEngineer).await;

    let features = serde_json::to_value(cms_net::EnergyFeatures::default()).unwrap();
    let response = api.post("/api/predict", "eng@plant.io", features).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body["error"],
        "API Error 422: Validation Failed: \"rpm out of range\""
    );
    api.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn predict_without_endpoint_is_unavailable() {
    let api = TestApi::start(|b| b).await;
    api.grant("eng@plant.io", PlantRole::ProcessEngineer).await;
    let features = serde_json::to_value(cms_net::EnergyFeatures::default()).unwrap();
    let response = api.post("/api/predict", "eng@plant.io", features).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    api.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn metrics_are_exported_when_registered() {
    let registry = Arc::new(prometheus::Registry::new());
    let api = TestApi::start(|b| b.with_metrics_registry(registry.clone())).await;
    api.grant("eng@plant.io", PlantRole::ProcessEngineer).await;
    api.post("/api/simulate/run", "eng@plant.io", json!({}))
        .await;

    let body = api
        .client
        .get(api.url("/metrics"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("simulation_runs_total 1"));
    assert!(body.contains("telemetry_streams_active 0"));

    let bare = TestApi::start(|b| b).await;
    let status = bare.client.get(bare.url("/metrics")).send().await.unwrap();
    assert_eq!(status.status(), StatusCode::SERVICE_UNAVAILABLE);
    api.handle.shutdown().await.unwrap();
    bare.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn malformed_bodies_are_checked_after_identity() {
    let api = TestApi::start(|b| b).await;
    api.grant("eng@plant.io", PlantRole::ProcessEngineer).await;
    api.grant("op@plant.io", PlantRole::Operator).await;
    let post = reqwest::Method::POST;
    let put = reqwest::Method::PUT;

    let anonymous = api.send_raw(post.clone(), "/api/predict", None, "{").await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
    let anonymous = api
        .send_raw(put.clone(), "/api/roles/eng@plant.io", None, "garbage")
        .await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
    let anonymous = api
        .send_raw(post.clone(), "/api/maintenance/alert", None, "")
        .await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let operator = api
        .send_raw(post.clone(), "/api/predict", Some("op@plant.io"), "{")
        .await;
    assert_eq!(operator.status(), StatusCode::FORBIDDEN);
    let foreign = api
        .send_raw(put.clone(), "/api/roles/eng@plant.io", Some("op@plant.io"), "{")
        .await;
    assert_eq!(foreign.status(), StatusCode::FORBIDDEN);

    let engineer = api
        .send_raw(post, "/api/predict", Some("eng@plant.io"), "{")
        .await;
    assert_eq!(engineer.status(), StatusCode::BAD_REQUEST);
    let body: Value = engineer.json().await.unwrap();
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("invalid request body"));

    let own = api
        .send_raw(put, "/api/roles/new@plant.io", Some("new@plant.io"), "not json")
        .await;
    assert_eq!(own.status(), StatusCode::BAD_REQUEST);
    api.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn maintenance_alert_relays_the_alert_service() {
    let upstream = spawn_model_server(Router::new().route(
        "/maintenance/alert",
        post(|Json(features): Json<Value>| async move {
            let score = features["vibration"].as_f64().unwrap_or_default() * 10.0;
            Json(json!({
                "alert_level": if score > 0.75 { "Critical" } else { "Normal" },
                "maintenance_risk_score": score,
                "status_color": if score > 0.75 { "red" } else { "green" },
                "primary_action": "Immediate inspection required!",
                "recommendations": [
                    {
                        "param": "historical_failures",
                        "value": features["historical_failures"],
                        "suggestion": "Review failure logs and replace aging components"
                    }
                ]
            }))
        }),
    ))
    .await;
    let endpoint = Url::parse(&format!("http://{upstream}/maintenance/alert")).unwrap();
    let client = MaintenanceAlertClient::new(endpoint, Duration::from_secs(5)).unwrap();
    let api = TestApi::start(|b| b.with_maintenance_alerts(client)).await;
    api.grant("fitter@plant.io", PlantRole::Maintenance).await;
    api.grant("op@plant.io", PlantRole::Operator).await;

    let features = MaintenanceFeatures {
        vibration: 0.09,
        historical_failures: 4,
        ..MaintenanceFeatures::default()
    };
    let body = serde_json::to_value(features).unwrap();
    let response = api
        .post("/api/maintenance/alert", "fitter@plant.io", body.clone())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let alert: Value = response.json().await.unwrap();
    assert_eq!(alert["alert_level"], "Critical");
    assert_eq!(alert["status_color"], "red");
    assert_eq!(alert["recommendations"][0]["value"], 4.0);

    let denied = api
        .post("/api/maintenance/alert", "op@plant.io", body)
        .await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let status: Value = api
        .client
        .get(api.url("/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["maintenance_alerts_configured"], true);
    assert_eq!(status["inference_configured"], false);
    api.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn maintenance_alert_surfaces_server_errors() {
    let upstream = spawn_model_server(Router::new().route(
        "/maintenance/alert",
        post(|| async {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"detail": "model not loaded"})),
            )
        }),
    ))
    .await;
    let endpoint = Url::parse(&format!("http://{upstream}/maintenance/alert")).unwrap();
    let client = MaintenanceAlertClient::new(endpoint, Duration::from_secs(5)).unwrap();
    let api = TestApi::start(|b| b.with_maintenance_alerts(client)).await;
    api.grant("fitter@plant.io", PlantRole::Maintenance).await;

    let body = serde_json::to_value(MaintenanceFeatures::default()).unwrap();
    let response = api
        .post("/api/maintenance/alert", "fitter@plant.io", body.clone())
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let error: Value = response.json().await.unwrap();
    assert_eq!(error["error"], "Server error: 500");

    let bare = TestApi::start(|b| b).await;
    bare.grant("fitter@plant.io", PlantRole::Maintenance).await;
    let unavailable = bare
        .post("/api/maintenance/alert", "fitter@plant.io", body)
        .await;
    assert_eq!(unavailable.status(), StatusCode::SERVICE_UNAVAILABLE);
    api.handle.shutdown().await.unwrap();
    bare.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn energy_report_downloads_as_csv() {
    let api = TestApi::start(|b| b).await;
    api.grant("eng@plant.io", PlantRole::ProcessEngineer).await;
    api.grant("op@plant.io", PlantRole::Operator).await;

    let response = api
        .get(
            "/api/reports/energy.csv?machine_id=grinder_01&rows=3",
            "eng@plant.io",
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/csv");
    assert_eq!(
        response.headers()["content-disposition"],
        "attachment; filename=\"energy_report.csv\""
    );
    let csv = response.text().await.unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "timestamp,power_kw,load_tph,kwh_per_ton");
    for line in &lines[1..] {
        let fields: Vec<&str> = line.split(',').collect();
        assert_eq!(fields.len(), 4);
        assert!(fields[0].ends_with('Z'));
        let load: f64 = fields[2].parse().unwrap();
        assert!((49.0..=61.0).contains(&load), "load {load}");
        let ratio = fields[3].split_once('.').unwrap().1;
        assert_eq!(ratio.len(), 2);
    }

    let defaults = api.get("/api/reports/energy.csv", "eng@plant.io").await;
    assert_eq!(defaults.text().await.unwrap().lines().count(), 61);

    let denied = api.get("/api/reports/energy.csv", "op@plant.io").await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    api.handle.shutdown().await.unwrap();
}
