mod cookies;
mod error;
mod middleware;
mod routes;
mod state;

use axum::{extract::Extension, routing::get, Json, Router};
use clap::{Parser, Subcommand};
use pgconsole_core::license::{resolve_plan, JwtLicenseValidator};
use pgconsole_core::{Plan, Policy};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "pgconsole", version, about = "Self-hosted PostgreSQL gateway")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the gateway.
    Serve {
        /// Path to the policy file.
        #[arg(long, short, default_value = "pgconsole.toml")]
        config: PathBuf,

        /// Bind address.
        #[arg(long, default_value = "0.0.0.0:8080")]
        listen: String,
    },

    /// Validate the policy file and exit.
    Check {
        /// Path to the policy file.
        #[arg(long, short, default_value = "pgconsole.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter("info")
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Check { config } => {
            let policy = load_policy_or_exit(&config);
            println!(
                "policy ok: {} connection(s), {} user(s), {} iam rule(s)",
                policy.get_connections().len(),
                policy.get_users().len(),
                policy.get_iam_rules().len()
            );
        }
        Command::Serve { config, listen } => serve(&config, &listen).await?,
    }
    Ok(())
}

/// Startup validation failures exit with a single diagnostic line.
fn load_policy_or_exit(path: &Path) -> Policy {
    match Policy::load(path) {
        Ok(policy) => policy,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    }
}

async fn serve(config: &Path, listen: &str) -> anyhow::Result<()> {
    let policy = load_policy_or_exit(config);
    let plan = resolve_license();
    if let Err(err) = policy.enforce_seat_limit(&plan) {
        eprintln!("{err}");
        std::process::exit(1);
    }

    let state = Arc::new(AppState::init(Arc::new(policy), plan));

    // Warm the connection-info cache for everything not marked lazy.
    tokio::spawn(probe_connections(Arc::clone(&state)));

    let app: Router = routes::router()
        .route("/healthz", get(healthz))
        .layer(axum::middleware::from_fn(middleware::resolve_principal))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(Extension(state));

    tracing::info!("pgconsole listening on {}", listen);
    let listener = tokio::net::TcpListener::bind(listen).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Resolve the plan from the license environment.
///
/// `PGCONSOLE_LICENSE` holds the token, `PGCONSOLE_LICENSE_KEY` the
/// verification secret. Anything missing or invalid clamps to FREE.
fn resolve_license() -> Plan {
    let token = std::env::var("PGCONSOLE_LICENSE").ok();
    match std::env::var("PGCONSOLE_LICENSE_KEY") {
        Ok(key) => {
            let validator = JwtLicenseValidator::hs256(key.as_bytes());
            resolve_plan(token.as_deref(), &validator)
        }
        Err(_) => {
            if token.is_some() {
                tracing::warn!(
                    "PGCONSOLE_LICENSE is set but PGCONSOLE_LICENSE_KEY is not, running on the FREE plan"
                );
            }
            Plan::free()
        }
    }
}

async fn probe_connections(state: Arc<AppState>) {
    for conn in state.policy.get_connections() {
        if conn.lazy {
            continue;
        }
        match state.broker.probe_connection(conn).await {
            Ok(info) => tracing::info!(
                connection = conn.id.as_str(),
                version = info.server_major_version,
                "connection probe ok"
            ),
            Err(err) => tracing::warn!(
                connection = conn.id.as_str(),
                %err,
                "connection probe failed"
            ),
        }
    }
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "ok": true, "service": "pgconsole" }))
}
