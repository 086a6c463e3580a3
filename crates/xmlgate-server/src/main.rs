//! xmlgate entry point.

use std::path::PathBuf;

use anyhow::Context;
use xmlgate_config::{ConfigLoader, DEFAULT_ENV_PREFIX};
use xmlgate_server::{mount_from_config, Server, ShutdownSignal};
use xmlgate_telemetry::init_telemetry;

const DEFAULT_CONFIG_FILE: &str = "xmlgate.toml";

/// Command-line arguments.
struct Args {
    /// Path to configuration file.
    config: Option<PathBuf>,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => config = args.next().map(PathBuf::from),
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("xmlgate {}", env!("CARGO_PKG_VERSION"));
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {other}");
                    eprintln!("Use --help for usage information");
                    std::process::exit(2);
                }
            }
        }

        Self { config }
    }
}

fn print_help() {
    println!(
        r"xmlgate - XML protocol adapter for JSON resource services

USAGE:
    xmlgate [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Configuration file, TOML or JSON (default: ./xmlgate.toml if present)
    -h, --help             Print help information
    -v, --version          Print version information

ENVIRONMENT VARIABLES:
    XMLGATE__SERVER__HTTP_ADDR              Bind address (default: 0.0.0.0:4004)
    XMLGATE__SERVER__MOUNT_PATH             Adapter mount path (default: /xml)
    XMLGATE__ADAPTER__MODE                  full_dispatch or passthrough
    XMLGATE__ADAPTER__ERROR_HANDLER         Render raised errors as JSON (default: true)
    XMLGATE__MODEL__PATH                    Service model file (required)
    XMLGATE__TELEMETRY__LOGGING__LEVEL      Log filter (default: info)
    XMLGATE__TELEMETRY__METRICS__ADDR       Prometheus address (default: 0.0.0.0:9090)
"
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let loader = ConfigLoader::new();
    let loader = match &args.config {
        Some(path) => loader.with_file(path),
        None => loader.with_optional_file(DEFAULT_CONFIG_FILE),
    }
    .context("failed to read configuration file")?;
    let config = loader
        .with_dotenv()
        .context("failed to read .env")?
        .with_env_prefix(DEFAULT_ENV_PREFIX)
        .load()
        .context("invalid configuration")?;

    init_telemetry(&config.telemetry_config()).context("failed to initialize telemetry")?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.telemetry.environment,
        mode = %config.adapter.mode,
        "starting xmlgate"
    );

    let services = mount_from_config(&config)?;

    let mut builder = Server::builder(services)
        .config(config.server.clone())
        .service_name(config.telemetry.service_name.clone());
    if config.telemetry.metrics.enabled {
        builder = builder.metrics_addr(config.telemetry.metrics.addr.clone());
    }

    builder
        .build()?
        .run_with_shutdown(ShutdownSignal::with_os_signals())
        .await?;
    Ok(())
}
