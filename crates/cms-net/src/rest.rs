//! ---
//! cms_section: "05-networking-external-interfaces"
//! cms_subsection: "module"
//! cms_type: "source"
//! cms_scope: "code"
//! cms_description: "REST and server-sent event routes of the dashboard backend."
//! cms_version: "v0.0.0-prealpha"
//! cms_owner: "tbd"
//! ---
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use cms_security::{
    console_menu, parse_roles, visible_links, AccessDecision, AccessGuard, ConsolePage,
    DashboardLink, JobRole, Permission, PlantRole, RoleGrant, DASHBOARD_LINKS,
};
use cms_sim::{
    energy_report, predict_energy, predict_maintenance, render_csv, report_rows, simulate,
    subscribe, EnergyPrediction, MachineTarget, MaintenancePrediction, ModelRequest,
    SimulationParams, SimulationRequest, SimulationRun, StreamSettings, TelemetryGenerator,
    REPORT_FILE_NAME,
};
use futures::StreamExt;
use prometheus::{Registry, TextEncoder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::alerts::{MaintenanceAlert, MaintenanceAlertClient, MaintenanceFeatures};
use crate::error::ApiError;
use crate::inference::{EnergyFeatures, InferenceClient};
use crate::metrics::ApiMetrics;
use crate::tickets::{NewTicket, Ticket, TicketBoard};

/// Header carrying the signed-in user's identifier.
pub const USER_HEADER: &str = "x-user-id";

/// Service summary returned by `/status`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusSnapshot {
    pub service: String,
    pub version: String,
    pub plant_id: String,
    pub rbac_enforced: bool,
    pub inference_configured: bool,
    pub maintenance_alerts_configured: bool,
    pub streams_active: i64,
    pub tickets: usize,
}

/// Role assignment as exchanged with the admin and role-selection pages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoleAssignmentView {
    pub user_id: String,
    pub roles: Vec<PlantRole>,
}

#[derive(Debug, Deserialize)]
struct RoleUpdate {
    roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct StreamQuery {
    #[serde(default)]
    machine_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReportQuery {
    #[serde(default)]
    machine_id: Option<String>,
    #[serde(default)]
    rows: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ConsoleQuery {
    #[serde(default)]
    role: Option<String>,
}

#[derive(Debug, Serialize)]
struct TicketList {
    tickets: Vec<Ticket>,
}

#[derive(Debug, Serialize)]
struct TicketCreated {
    ok: bool,
    ticket: Ticket,
}

/// Identity of the caller taken from [`USER_HEADER`]. Authentication happens upstream.
#[derive(Debug, Clone)]
pub struct Caller(Option<String>);

impl Caller {
    pub fn user_id(&self) -> Option<&str> {
        self.0.as_deref()
    }

    fn require(&self) -> Result<&str, ApiError> {
        self.user_id().ok_or(ApiError::Unauthenticated)
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_owned);
        Ok(Caller(user))
    }
}

/// Shared state injected into the axum handlers.
struct ApiState {
    guard: AccessGuard,
    enforce: bool,
    stream: StreamSettings,
    tickets: TicketBoard,
    inference: Option<InferenceClient>,
    alerts: Option<MaintenanceAlertClient>,
    metrics: ApiMetrics,
    registry: Option<Arc<Registry>>,
}

impl ApiState {
    async fn authorize(&self, caller: &Caller, permission: Permission) -> Result<(), ApiError> {
        if !self.enforce {
            return Ok(());
        }
        let user_id = caller.require()?;
        match self.guard.check(user_id, permission.label()).await? {
            AccessDecision::Granted => Ok(()),
            AccessDecision::RoleSelectionRequired => Err(ApiError::RoleSelectionRequired),
            AccessDecision::Forbidden => Err(ApiError::Forbidden(permission)),
        }
    }
}

/// Builder used to configure and spawn the API server.
#[derive(Clone)]
pub struct RestApiBuilder {
    listen: SocketAddr,
    guard: AccessGuard,
    stream: StreamSettings,
    tickets: TicketBoard,
    inference: Option<InferenceClient>,
    alerts: Option<MaintenanceAlertClient>,
    enforce: bool,
    metrics: Option<Arc<Registry>>,
}

impl RestApiBuilder {
    /// Construct a builder with RBAC enforcement switched on.
    pub fn new(listen: SocketAddr, guard: AccessGuard, stream: StreamSettings) -> Self {
        Self {
            listen,
            guard,
            stream,
            tickets: TicketBoard::new(),
            inference: None,
            alerts: None,
            enforce: true,
            metrics: None,
        }
    }

    /// Switch permission checks on or off.
    pub fn enforce(mut self, enforce: bool) -> Self {
        self.enforce = enforce;
        self
    }

    pub fn with_inference(mut self, client: InferenceClient) -> Self {
        self.inference = Some(client);
        self
    }

    pub fn with_maintenance_alerts(mut self, client: MaintenanceAlertClient) -> Self {
        self.alerts = Some(client);
        self
    }

    pub fn with_tickets(mut self, tickets: TicketBoard) -> Self {
        self.tickets = tickets;
        self
    }

    /// Attach a Prometheus registry exposed at `/metrics`.
    pub fn with_metrics_registry(mut self, registry: Arc<Registry>) -> Self {
        self.metrics = Some(registry);
        self
    }

    /// Assemble the router without binding a socket.
    pub fn router(self) -> anyhow::Result<Router> {
        let metrics = match &self.metrics {
            Some(registry) => ApiMetrics::new(registry)?,
            None => ApiMetrics::new(&Registry::new())?,
        };
        let state = ApiState {
            guard: self.guard,
            enforce: self.enforce,
            stream: self.stream,
            tickets: self.tickets,
            inference: self.inference,
            alerts: self.alerts,
            metrics,
            registry: self.metrics,
        };

        Ok(Router::new()
            .route("/status", get(get_status))
            .route("/metrics", get(get_metrics))
            .route("/api/telemetry/stream", get(telemetry_stream))
            .route("/api/simulate/run", post(run_simulation))
            .route("/api/models/energy/predict", post(energy_predict))
            .route("/api/models/pdm/predict", post(maintenance_predict))
            .route("/api/predict", post(remote_predict))
            .route("/api/maintenance/alert", post(maintenance_alert))
            .route(
                "/api/maintenance/tickets",
                get(list_tickets).post(create_ticket),
            )
            .route("/api/reports/energy.csv", get(export_energy_report))
            .route("/api/roles/:user_id", get(get_roles).put(put_roles))
            .route("/api/rbac/matrix", get(get_matrix))
            .route("/api/nav", get(get_nav))
            .route("/api/console/menu", get(get_console_menu))
            .with_state(Arc::new(state)))
    }

    /// Spawn the API server and return a handle that can be awaited for shutdown.
    pub async fn spawn(self) -> anyhow::Result<RestApiHandle> {
        let listener = TcpListener::bind(self.listen).await?;
        let local_addr = listener.local_addr()?;
        let router = self.router()?;
        info!(address = %local_addr, "rest api listening");

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let server = axum::serve(listener, router).with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        });
        let task = tokio::spawn(async move {
            if let Err(err) = server.await {
                warn!(error = %err, "rest api server exited with error");
            }
        });

        Ok(RestApiHandle {
            address: local_addr,
            task,
            shutdown: shutdown_tx,
        })
    }
}

/// Handle returned from [`RestApiBuilder::spawn`].
pub struct RestApiHandle {
    address: SocketAddr,
    task: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl RestApiHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    /// Request graceful shutdown and wait for the server task to finish.
    ///
    /// Open telemetry streams keep the server alive until their clients disconnect.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.shutdown.send(true);
        match self.task.await {
            Ok(()) => Ok(()),
            Err(join) => Err(anyhow::anyhow!(join)),
        }
    }
}

/// Decode a JSON body, treating an empty or malformed one as `{}`.
fn lenient_body<T: DeserializeOwned + Default>(body: &Bytes) -> T {
    serde_json::from_slice(body).unwrap_or_default()
}

/// Decode a JSON body that must be well formed. Handlers call this only
/// once the caller is authorised.
fn strict_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|err| ApiError::BadRequest(format!("invalid request body: {err}")))
}

async fn get_status(State(state): State<Arc<ApiState>>) -> Json<StatusSnapshot> {
    Json(StatusSnapshot {
        service: "cmsd".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        plant_id: state.stream.plant_id.clone(),
        rbac_enforced: state.enforce,
        inference_configured: state.inference.is_some(),
        maintenance_alerts_configured: state.alerts.is_some(),
        streams_active: state.metrics.streams_active(),
        tickets: state.tickets.len(),
    })
}

async fn get_metrics(State(state): State<Arc<ApiState>>) -> Response {
    let Some(registry) = &state.registry else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics registry unavailable",
        )
            .into_response();
    };

    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&registry.gather()) {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(err) => {
            warn!(error = %err, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn telemetry_stream(
    State(state): State<Arc<ApiState>>,
    caller: Caller,
    query: Option<Query<StreamQuery>>,
) -> Result<Response, ApiError> {
    state
        .authorize(&caller, Permission::TelemetryStream)
        .await?;

    let requested = query.as_ref().and_then(|q| q.machine_id.as_deref());
    let target = MachineTarget::resolve(requested);
    info!(machine_id = %target.id(), user_id = ?caller.user_id(), "telemetry stream opened");

    let subscription = subscribe(&state.stream, target);
    let open = state.metrics.stream_opened();
    let metrics = state.metrics.clone();
    // The subscription and gauge live inside the body stream; hyper drops both
    // when the client disconnects.
    let events = subscription.into_stream().map(move |sample| {
        let _open = &open;
        metrics.inc_sample();
        Event::default().json_data(&sample)
    });

    let headers = [
        (header::CONNECTION, HeaderValue::from_static("keep-alive")),
        (
            HeaderName::from_static("x-accel-buffering"),
            HeaderValue::from_static("no"),
        ),
    ];
    Ok((headers, Sse::new(events)).into_response())
}

async fn run_simulation(
    State(state): State<Arc<ApiState>>,
    caller: Caller,
    body: Bytes,
) -> Result<Json<SimulationRun>, ApiError> {
    state.authorize(&caller, Permission::SimulationRun).await?;
    let request: SimulationRequest = lenient_body(&body);
    let params = SimulationParams::from_request(&request);
    let run = simulate(&params);
    state.metrics.inc_simulation();
    debug!(
        rpm = params.rpm,
        load_tph = params.load_tph,
        horizon = params.horizon,
        avg_power_kw = run.kpi.avg_power_kw,
        "simulation computed"
    );
    Ok(Json(run))
}

async fn energy_predict(
    State(state): State<Arc<ApiState>>,
    caller: Caller,
    body: Bytes,
) -> Result<Json<EnergyPrediction>, ApiError> {
    state
        .authorize(&caller, Permission::RecommendationApply)
        .await?;
    let request: ModelRequest = lenient_body(&body);
    Ok(Json(predict_energy(&request)))
}

async fn maintenance_predict(
    State(state): State<Arc<ApiState>>,
    caller: Caller,
    body: Bytes,
) -> Result<Json<MaintenancePrediction>, ApiError> {
    state
        .authorize(&caller, Permission::MaintenanceCreate)
        .await?;
    let request: ModelRequest = lenient_body(&body);
    Ok(Json(predict_maintenance(&request)))
}

async fn remote_predict(
    State(state): State<Arc<ApiState>>,
    caller: Caller,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    state.authorize(&caller, Permission::SimulationRun).await?;
    let features: EnergyFeatures = strict_body(&body)?;
    let client = state
        .inference
        .as_ref()
        .ok_or(ApiError::InferenceUnavailable)?;
    let payload = client.predict(&features).await?;
    Ok(Json(payload))
}

async fn maintenance_alert(
    State(state): State<Arc<ApiState>>,
    caller: Caller,
    body: Bytes,
) -> Result<Json<MaintenanceAlert>, ApiError> {
    state
        .authorize(&caller, Permission::MaintenanceCreate)
        .await?;
    let features: MaintenanceFeatures = strict_body(&body)?;
    let client = state
        .alerts
        .as_ref()
        .ok_or(ApiError::InferenceUnavailable)?;
    let alert = client.assess(&features).await?;
    info!(
        level = ?alert.alert_level,
        score = alert.maintenance_risk_score,
        "maintenance alert assessed"
    );
    Ok(Json(alert))
}

async fn export_energy_report(
    State(state): State<Arc<ApiState>>,
    caller: Caller,
    query: Option<Query<ReportQuery>>,
) -> Result<Response, ApiError> {
    state.authorize(&caller, Permission::ReportExport).await?;
    let query = query.map(|Query(query)| query);
    let target = MachineTarget::resolve(query.as_ref().and_then(|q| q.machine_id.as_deref()));
    let rows = report_rows(query.as_ref().and_then(|q| q.rows));
    let step = chrono::Duration::from_std(state.stream.cadence)
        .unwrap_or_else(|_| chrono::Duration::seconds(1));

    let mut generator = TelemetryGenerator::new(state.stream.plant_id.clone(), target);
    let report = energy_report(&mut generator, rows, chrono::Utc::now(), step);
    let csv = render_csv(&report)?;
    debug!(machine_id = %generator.target().id(), rows, "energy report exported");

    let headers = [
        (header::CONTENT_TYPE, "text/csv".to_owned()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{REPORT_FILE_NAME}\""),
        ),
    ];
    Ok((headers, csv).into_response())
}

async fn list_tickets(
    State(state): State<Arc<ApiState>>,
    caller: Caller,
) -> Result<Json<TicketList>, ApiError> {
    state.authorize(&caller, Permission::TelemetryRead).await?;
    Ok(Json(TicketList {
        tickets: state.tickets.list(),
    }))
}

async fn create_ticket(
    State(state): State<Arc<ApiState>>,
    caller: Caller,
    body: Bytes,
) -> Result<Json<TicketCreated>, ApiError> {
    state
        .authorize(&caller, Permission::MaintenanceCreate)
        .await?;
    let request: NewTicket = lenient_body(&body);
    let ticket = state.tickets.create(request);
    info!(ticket_id = %ticket.id, title = %ticket.title, "maintenance ticket created");
    Ok(Json(TicketCreated { ok: true, ticket }))
}

async fn get_roles(
    State(state): State<Arc<ApiState>>,
    caller: Caller,
    Path(user_id): Path<String>,
) -> Result<Json<RoleAssignmentView>, ApiError> {
    if state.enforce {
        let caller_id = caller.require()?;
        if !state.guard.may_read(caller_id, &user_id).await? {
            return Err(ApiError::Forbidden(Permission::UserManage));
        }
    }
    let roles = state.guard.roles(&user_id).await?;
    Ok(Json(RoleAssignmentView {
        user_id,
        roles: roles.into_iter().collect(),
    }))
}

async fn put_roles(
    State(state): State<Arc<ApiState>>,
    caller: Caller,
    Path(user_id): Path<String>,
    body: Bytes,
) -> Result<Json<RoleAssignmentView>, ApiError> {
    if state.enforce {
        let caller_id = caller.require()?;
        if !state.guard.may_assign(caller_id, &user_id).await? {
            return Err(ApiError::Forbidden(Permission::UserManage));
        }
    }
    let update: RoleUpdate = strict_body(&body)?;
    let roles = parse_roles(&update.roles)
        .map_err(|label| ApiError::BadRequest(format!("unknown role: {label}")))?;
    state.guard.assign(&user_id, roles.clone()).await?;
    info!(user_id = %user_id, assigned_by = ?caller.user_id(), count = roles.len(), "roles assigned");
    Ok(Json(RoleAssignmentView {
        user_id,
        roles: roles.into_iter().collect(),
    }))
}

async fn get_matrix(
    State(state): State<Arc<ApiState>>,
    caller: Caller,
) -> Result<Json<Vec<RoleGrant>>, ApiError> {
    state.authorize(&caller, Permission::UserManage).await?;
    Ok(Json(state.guard.engine().matrix()))
}

async fn get_nav(
    State(state): State<Arc<ApiState>>,
    caller: Caller,
) -> Result<Json<Vec<DashboardLink>>, ApiError> {
    if !state.enforce {
        return Ok(Json(DASHBOARD_LINKS.to_vec()));
    }
    let user_id = caller.require()?;
    let roles = state.guard.roles(user_id).await?;
    if roles.is_empty() {
        return Err(ApiError::RoleSelectionRequired);
    }
    Ok(Json(visible_links(state.guard.engine(), &roles)))
}

async fn get_console_menu(query: Option<Query<ConsoleQuery>>) -> Json<Vec<ConsolePage>> {
    let role = query
        .as_ref()
        .and_then(|q| q.role.as_deref())
        .and_then(JobRole::parse);
    Json(console_menu(role))
}
