//! hostPath Provisioner
//!
//! Per-node daemon that provisions hostPath PersistentVolumes.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                     hostpath-provisioner                       │
//! ├───────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌────────────────────┐    ┌───────────┐  │
//! │  │  PVC / PV    │───▶│ HostPathProvisioner│───▶│ <root>/…  │  │
//! │  │  controllers │    │  (node resolver)   │    │ dirs      │  │
//! │  └──────────────┘    └────────────────────┘    └───────────┘  │
//! └───────────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use kube::Client;
use tracing::{error, info, Level};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hostpath_provisioner::adapters::{
    client_config, KubeNodeMetadataSource, LocalFilesystem, LoggingEventPublisher,
};
use hostpath_provisioner::controller::{self, ControllerContext, ControllerSettings};
use hostpath_provisioner::endpoints::{self, Endpoints};
use hostpath_provisioner::error::{Error, Result};
use hostpath_provisioner::metrics::ProvisionerMetrics;
use hostpath_provisioner::provisioner::{
    HostPathProvisioner, ProvisionerConfig, PROVISIONER_NAME,
};
use hostpath_provisioner::NodeName;

// =============================================================================
// CLI Arguments
// =============================================================================

/// hostPath Provisioner - node-local directories as PersistentVolumes
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Name of the node this provisioner runs on
    #[arg(long, env = "NODE_NAME")]
    node_name: String,

    /// Absolute path of the host root mountpoint
    #[arg(long, env = "HOSTPATH_ROOT", default_value = "/")]
    root: PathBuf,

    /// Path to a kubeconfig file; in-cluster or `KUBECONFIG` when unset
    #[arg(long, env = "KUBECONFIG_PATH")]
    kubeconfig: Option<PathBuf>,

    /// API server URL, overriding the one in the client configuration
    #[arg(long, env = "KUBE_MASTER")]
    master: Option<String>,

    /// Provisioner name matched against StorageClass `provisioner`
    #[arg(long, env = "PROVISIONER_NAME", default_value = PROVISIONER_NAME)]
    provisioner_name: String,

    /// Failed attempts per object before giving up
    #[arg(long, env = "FAILED_RETRY_THRESHOLD", default_value = "5")]
    failed_retry_threshold: u32,

    /// Seconds before revisiting a claim served by another node
    #[arg(long, env = "RESYNC_PERIOD_SECONDS", default_value = "15")]
    resync_period_seconds: u64,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: SocketAddr,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: SocketAddr,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    let node_name = NodeName::new(args.node_name.clone()).inspect_err(|e| {
        error!("{}", e);
    })?;

    info!("Starting hostPath provisioner");
    info!("  Node: {}", node_name);
    info!("  Root: {}", args.root.display());
    info!("  Provisioner name: {}", args.provisioner_name);

    let config = client_config(args.kubeconfig.as_deref(), args.master.as_deref())
        .await
        .inspect_err(|e| error!("{}", e))?;
    let client = Client::try_from(config).map_err(|e| {
        error!("Failed to create Kubernetes client: {}", e);
        Error::Internal(format!("Kubernetes client creation failed: {}", e))
    })?;

    info!("Connected to Kubernetes cluster");

    let provisioner = Arc::new(HostPathProvisioner::new(
        ProvisionerConfig::new(node_name, args.root.clone()),
        Arc::new(KubeNodeMetadataSource::new(client.clone())),
        Arc::new(LocalFilesystem::new()),
        Arc::new(LoggingEventPublisher::new()),
    ));

    let metrics = ProvisionerMetrics::new()?;

    let settings = ControllerSettings {
        provisioner_name: args.provisioner_name.clone(),
        resync_period: Duration::from_secs(args.resync_period_seconds),
        failed_retry_threshold: args.failed_retry_threshold,
    };

    let ctx = ControllerContext::new(client, provisioner, metrics.clone(), settings);

    for (addr, routes) in [
        (args.health_addr, Endpoints::Health),
        (args.metrics_addr, Endpoints::Metrics(metrics)),
    ] {
        tokio::spawn(async move {
            if let Err(e) = endpoints::serve(addr, routes).await {
                error!("{}", e);
            }
        });
    }

    controller::run(ctx).await?;

    info!("Provisioner shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "kube=info", "tower=warn"] {
        let directive = directive
            .parse::<Directive>()
            .map_err(|e| Error::Internal(format!("Invalid log directive: {}", e)))?;
        filter = filter.add_directive(directive);
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
    Ok(())
}
