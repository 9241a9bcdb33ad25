//! ---
//! cms_section: "01-core-functionality"
//! cms_subsection: "binary"
//! cms_type: "source"
//! cms_scope: "code"
//! cms_description: "Binary entrypoint for the ComminuSense daemon."
//! cms_version: "v0.0.0-prealpha"
//! cms_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use cms_common::{init_tracing, AppConfig, RbacConfig, RoleStoreBackend};
use cms_net::{InferenceClient, MaintenanceAlertClient, RestApiBuilder};
use cms_security::{
    parse_roles, AccessGuard, InMemoryRoleStore, JsonFileRoleStore, RbacEngine, SecurityMetrics,
    SharedRoleStore,
};
use cms_sim::batch::{DEFAULT_HORIZON, DEFAULT_LOAD_TPH, DEFAULT_MOISTURE_PCT, DEFAULT_RPM};
use cms_sim::{
    simulate, subscribe, MachineTarget, RollingWindow, SimulationParams, StreamSettings,
    PLANT_AGGREGATE,
};
use prometheus::Registry;
use tokio::signal;
use tracing::{info, warn};

/// Open telemetry streams hold graceful shutdown until this elapses.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(author, version, about = "ComminuSense daemon", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, help = "Serve every route without permission checks")]
    no_rbac: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Serve the dashboard API")]
    Run,
    #[command(about = "Run one batch simulation and print it as JSON")]
    Simulate {
        #[arg(long, default_value_t = DEFAULT_RPM)]
        rpm: f64,
        #[arg(long, default_value_t = DEFAULT_LOAD_TPH)]
        load_tph: f64,
        #[arg(long, default_value_t = DEFAULT_MOISTURE_PCT)]
        moisture_pct: f64,
        #[arg(long, default_value_t = DEFAULT_HORIZON as f64)]
        horizon: f64,
    },
    #[command(about = "Print live telemetry samples as JSON lines")]
    Tail {
        #[arg(long, help = "Machine to follow; the plant aggregate when omitted")]
        machine_id: Option<String>,
        #[arg(long, default_value_t = 10)]
        count: usize,
    },
    #[command(about = "Inspect or change stored role assignments")]
    Roles {
        #[command(subcommand)]
        action: RolesCommand,
    },
    #[command(about = "Print the role to permission matrix")]
    Matrix,
}

#[derive(Debug, Subcommand)]
enum RolesCommand {
    Get {
        user_id: String,
    },
    /// Replace the user's roles; no roles clears the assignment.
    Set {
        user_id: String,
        roles: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/cmsd.toml"));
    candidates.push(PathBuf::from("configs/example.toml"));

    let loaded =
        AppConfig::load_with_source(&candidates).context("failed to load configuration")?;
    let mut config = loaded.config;
    if cli.no_rbac {
        config.rbac.enforce = false;
    }
    init_tracing("cmsd", &config.logging)?;
    match &loaded.source {
        Some(path) => info!(config_path = %path.display(), "configuration loaded"),
        None => info!("no configuration file found; running with defaults"),
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_daemon(config).await?,
        Commands::Simulate {
            rpm,
            load_tph,
            moisture_pct,
            horizon,
        } => {
            let params = SimulationParams::new(rpm, load_tph, moisture_pct, horizon);
            let run = simulate(&params);
            println!("{}", serde_json::to_string_pretty(&run)?);
        }
        Commands::Tail { machine_id, count } => tail(&config, machine_id, count).await?,
        Commands::Roles { action } => roles(&config.rbac, action).await?,
        Commands::Matrix => {
            for grant in RbacEngine::new().matrix() {
                let permissions: Vec<&str> =
                    grant.permissions.iter().map(|p| p.label()).collect();
                println!("{:<18} {}", grant.role.label(), permissions.join(", "));
            }
        }
    }

    Ok(())
}

fn role_store(config: &RbacConfig) -> SharedRoleStore {
    match config.store {
        RoleStoreBackend::Memory => Arc::new(InMemoryRoleStore::new()),
        RoleStoreBackend::File => Arc::new(JsonFileRoleStore::new(config.store_path.clone())),
    }
}

async fn run_daemon(config: AppConfig) -> Result<()> {
    if !config.api.enabled {
        info!("api server disabled by configuration; nothing to serve");
        return Ok(());
    }

    let registry = Arc::new(Registry::new());
    let guard = AccessGuard::new(role_store(&config.rbac))
        .with_metrics(SecurityMetrics::new(registry.clone())?);
    if !config.rbac.enforce {
        warn!("rbac enforcement disabled; every caller may perform every action");
    }

    let stream = StreamSettings::new(
        config.simulation.plant_id.clone(),
        config.simulation.cadence,
    );
    let mut builder =
        RestApiBuilder::new(config.api.listen, guard, stream).enforce(config.rbac.enforce);
    match InferenceClient::from_config(&config.inference)? {
        Some(client) => {
            info!(endpoint = %client.endpoint(), "inference proxy enabled");
            builder = builder.with_inference(client);
        }
        None => info!("no inference endpoint configured; /api/predict answers 503"),
    }
    match MaintenanceAlertClient::from_config(&config.inference)? {
        Some(client) => {
            info!(endpoint = %client.endpoint(), "maintenance alert proxy enabled");
            builder = builder.with_maintenance_alerts(client);
        }
        None => info!("no maintenance alert endpoint configured; /api/maintenance/alert answers 503"),
    }
    if config.metrics.enabled {
        builder = builder.with_metrics_registry(registry);
    } else {
        info!("metrics exporter disabled by configuration");
    }

    let api = builder
        .spawn()
        .await
        .with_context(|| format!("failed to bind api listener on {}", config.api.listen))?;
    info!(
        address = %api.local_addr(),
        plant_id = %config.simulation.plant_id,
        "daemon running; waiting for termination signal"
    );
    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");

    if tokio::time::timeout(SHUTDOWN_GRACE, api.shutdown())
        .await
        .is_err()
    {
        warn!(
            grace_secs = SHUTDOWN_GRACE.as_secs(),
            "telemetry streams still open; abandoning graceful shutdown"
        );
    }
    Ok(())
}

async fn tail(config: &AppConfig, machine_id: Option<String>, count: usize) -> Result<()> {
    let settings = StreamSettings::new(
        config.simulation.plant_id.clone(),
        config.simulation.cadence,
    );
    let target = MachineTarget::resolve(machine_id.as_deref());
    if target.is_aggregate() && machine_id.as_deref().is_some_and(|id| id != PLANT_AGGREGATE) {
        warn!(requested = ?machine_id, "machine id rejected; following the plant aggregate");
    }

    let mut subscription = subscribe(&settings, target);
    let mut window = RollingWindow::new(config.simulation.window_capacity);
    for _ in 0..count {
        let Some(sample) = subscription.recv().await else {
            break;
        };
        println!("{}", serde_json::to_string(&sample)?);
        window.push(sample);
    }

    if let Some(mean) = window.mean_by(|sample| sample.metric.power_kw) {
        println!(
            "mean power_kw over last {} samples of {}: {:.2}",
            window.len(),
            subscription.machine_id(),
            mean
        );
    }
    info!(
        machine_id = %subscription.machine_id(),
        emitted = subscription.emitted(),
        "tail finished"
    );
    subscription.shutdown().await;
    Ok(())
}

async fn roles(config: &RbacConfig, action: RolesCommand) -> Result<()> {
    if config.store == RoleStoreBackend::Memory {
        warn!("role store is in-memory; assignments do not outlive this process");
    }
    let guard = AccessGuard::new(role_store(config));
    let store_path = config.store_path.display();
    match action {
        RolesCommand::Get { user_id } => {
            let roles = guard
                .roles(&user_id)
                .await
                .with_context(|| format!("failed to read role store {store_path}"))?;
            println!("{}", serde_json::to_string(&roles)?);
        }
        RolesCommand::Set { user_id, roles } => {
            let roles = match parse_roles(&roles) {
                Ok(roles) => roles,
                Err(label) => bail!("unknown role: {label}"),
            };
            guard
                .assign(&user_id, roles.clone())
                .await
                .with_context(|| format!("failed to write role store {store_path}"))?;
            info!(user_id = %user_id, count = roles.len(), "roles stored");
            println!("{}", serde_json::to_string(&roles)?);
        }
    }
    Ok(())
}
