//! Parapet command line.
//!
//! Serves the demo inventory API, prints its OpenAPI document, or scaffolds
//! a new service module.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;

use parapet::{create_service, demo, ApiConfig};
use parapet_telemetry::{log_listening, LogFormat, Telemetry, TelemetryConfig};

#[derive(Parser, Debug)]
#[command(name = "parapet", about = "Schema-validated APIs with OpenAPI documents", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the demo API server.
    Serve {
        /// Listen address.
        #[arg(long, default_value = "127.0.0.1:5000")]
        listen: String,

        #[command(flatten)]
        config: ApiConfig,

        /// Log format (json or pretty).
        #[arg(long, env = "LOG_FORMAT", default_value = "json")]
        log_format: LogFormat,

        /// Log level.
        #[arg(long, env = "LOG_LEVEL", default_value = "info")]
        log_level: String,
    },

    /// Print the demo API's OpenAPI document.
    Spec {
        #[command(flatten)]
        config: ApiConfig,

        /// Indent the output.
        #[arg(long)]
        pretty: bool,
    },

    /// Scaffold a service module.
    ///
    /// Creates `<name>/mod.rs`, `routes.rs`, `errors.rs` and the `views`,
    /// `specs` and `services` submodules. Existing files are never touched.
    New {
        /// Module name (lowercase, digits and underscores).
        name: String,

        /// Directory to create the module in.
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
}

/// Run the spec command.
fn run_spec(config: ApiConfig, pretty: bool) -> anyhow::Result<()> {
    let mut api = demo::build(config).context("failed to define the demo API")?;
    let document = api.resolve().context("failed to resolve the document")?;
    let json = if pretty {
        serde_json::to_string_pretty(document)?
    } else {
        document.to_json()?
    };
    println!("{json}");
    Ok(())
}

/// Run the new command.
fn run_new(name: &str, dir: &Path) -> anyhow::Result<()> {
    let files = create_service(dir, name)?;
    eprintln!("created service '{}' ({} files)", name, files.len());
    for file in files {
        eprintln!("  {}", file.display());
    }
    Ok(())
}

/// Run the serve command.
async fn run_serve(listen: &str, config: ApiConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = listen
        .parse()
        .with_context(|| format!("invalid listen address: {listen}"))?;

    let spec_url = config.spec_url.clone();
    let docs_url = config.swagger_ui_url.clone();
    let router = demo::build(config)?.into_router()?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    log_listening!(address = %addr, spec = %spec_url, docs = %docs_url, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("server error")
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve {
            listen,
            config,
            log_format,
            log_level,
        } => {
            let telemetry_config = TelemetryConfig::new()
                .with_log_format(log_format)
                .with_log_level(log_level);
            match Telemetry::init(telemetry_config) {
                Ok(telemetry) => {
                    let result = run_serve(&listen, config).await;
                    telemetry.shutdown();
                    result
                }
                Err(e) => Err(e.into()),
            }
        }
        Commands::Spec { config, pretty } => run_spec(config, pretty),
        Commands::New { name, dir } => run_new(&name, &dir),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}
