//! Jeeves resilience server - main entry point.
//!
//! Loads configuration, probes the local backend and the network once,
//! then runs the queue processor and the admin HTTP server until Ctrl-C.

use clap::Parser;
use jeeves_resilience::admin::AdminServer;
use jeeves_resilience::resilience::{QueueProcessor, ResilienceService};
use jeeves_resilience::Config;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "jeeves-resilience", version, about = "Backend failover core with admin API")]
struct Args {
    /// JSON config file. Defaults apply when omitted.
    #[arg(long, env = "JEEVES_CONFIG")]
    config: Option<PathBuf>,

    /// Admin listen address, overrides config and JEEVES_ADMIN_ADDR.
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration: file, then env, then flags
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.apply_env()?;
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }
    config.validate()?;

    jeeves_resilience::observability::init_tracing(&config.observability);

    let addr: SocketAddr = config.server.listen_addr.parse()?;
    let service = Arc::new(ResilienceService::from_config(config)?);

    let local = service.initialize_local_backend().await;
    let network = service.check_network(true).await;
    tracing::info!(
        "resilience_started: local_available={}, network_available={}, mode={}",
        local,
        network,
        service.mode().await,
    );

    let mut processor = QueueProcessor::new(service.clone());
    let processor_handle = processor.start();

    let server = AdminServer::new(service.clone(), addr);
    let cancel = server.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown_requested");
        }
        cancel.cancel();
    });

    server.serve().await?;

    processor.stop();
    processor_handle.await?;
    Ok(())
}
