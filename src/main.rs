use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ctsd::{Catalog, Server, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "ctsd")]
#[command(about = "Limits monitoring and event distribution core of a command and telemetry server")]
struct Args {
    /// Packet catalog (JSON)
    #[arg(short, long)]
    catalog: PathBuf,

    /// Server configuration file (TOML, YAML or JSON). `CTSD__*` environment
    /// variables override values from the file.
    #[arg(short = 'f', long)]
    config: Option<PathBuf>,

    /// Log filter used when `RUST_LOG` is unset
    #[arg(long, default_value = "info")]
    log: String,

    /// Validate the catalog and configuration, print a summary and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let catalog = Catalog::load(&args.catalog)
        .with_context(|| format!("loading catalog {}", args.catalog.display()))?;
    let config = ServerConfig::load(args.config.as_deref()).context("loading configuration")?;
    let server = Server::builder(catalog).config(config).build()?;

    if args.check {
        return print_summary(&server);
    }

    server.start()?;
    server.post_server_message("Server started");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    server.post_server_message("Server stopping");
    server.stop().await;
    Ok(())
}

fn print_summary(server: &Server) -> Result<()> {
    let summary = serde_json::json!({
        "targets": server.registry().get_all_target_info(),
        "interfaces": server.registry().get_interface_names(),
        "routers": server.registry().get_router_names(),
        "packet_loggers": server.loggers().get_all_packet_logger_info(),
        "limits_sets": server.limits().get_limits_sets(),
        "limits_groups": server.limits().get_limits_groups(),
        "background_tasks": server.supervisor().get_background_tasks(),
        "status": server.get_server_status(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
