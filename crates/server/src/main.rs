mod api;
mod audits;
mod commands;
mod router;
mod rules;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::info;

// ── CLI ─────────────────────────────────────────────────────────────

/// Tax-audit rule engine: HTTP API plus offline rule tooling.
#[derive(Parser, Debug)]
#[command(name = "oraculo", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP server (default).
    Serve {
        /// Overrides the configured HOST.
        #[arg(long)]
        host: Option<String>,
        /// Overrides the configured PORT.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Validate a rule set file and print every error and warning.
    Validate {
        path: PathBuf,
    },
    /// Compose a baseline with an optional override and print the effective YAML.
    Compose {
        baseline: PathBuf,
        #[arg(long = "override")]
        override_path: Option<PathBuf>,
    },
    /// Evaluate rule sets against a JSON invoice file and print the run.
    Audit {
        /// Baseline rule set (defaults to the embedded ZFM pack).
        #[arg(long)]
        baseline: Option<PathBuf>,
        #[arg(long = "override")]
        override_path: Option<PathBuf>,
        /// JSON array of invoices.
        invoices: PathBuf,
        /// Organization the invoices belong to.
        #[arg(long, default_value = "local")]
        org: String,
        /// First issue date (defaults to the earliest invoice).
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last issue date (defaults to the latest invoice).
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Print the full run as JSON instead of a findings table.
        #[arg(long)]
        json: bool,
    },
}

fn load_config() -> oraculo_core::Config {
    oraculo_core::config::load_dotenv();
    oraculo_core::Config::from_env()
}

async fn serve(mut config: oraculo_core::Config, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config.log_summary();

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(state::AppState::open(config)?);
    let app = router::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);
    info!("API docs at http://{}/docs", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config();

    match cli.command.unwrap_or(Command::Serve { host: None, port: None }) {
        Command::Serve { host, port } => serve(config, host, port).await?,
        Command::Validate { path } => {
            let valid = commands::validate(&path)?;
            if !valid {
                std::process::exit(1);
            }
        }
        Command::Compose { baseline, override_path } => {
            commands::compose_files(&baseline, override_path.as_deref())?;
        }
        Command::Audit {
            baseline,
            override_path,
            invoices,
            org,
            from,
            to,
            json,
        } => {
            let args = commands::AuditArgs {
                baseline,
                override_path,
                invoices,
                org,
                from,
                to,
                json,
            };
            commands::audit(&config, args).await?;
        }
    }

    Ok(())
}
