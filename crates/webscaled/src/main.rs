//! webscaled: custom autoscaler for the web tier.
//!
//! # Usage
//!
//! ```text
//! webscaled local --api-server http://127.0.0.1:8001 --namespace prod
//! webscaled in-cluster
//! ```
//!
//! The scaling policy comes from `MIN_REPLICAS`, `MAX_REPLICAS`,
//! `UPPER_CPU_THRESHOLD`, `LOWER_CPU_THRESHOLD`, `LOOP_TIME_S` and
//! `NO_SCALE_DOWN_PERIOD`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use webscale_cluster::credentials::DEFAULT_LOCAL_API_SERVER;
use webscale_cluster::{KubeClient, KubeConfig, PodWatcher, ReadyAddresses, Workload, run_applier};
use webscale_probe::{DEFAULT_PROBE_PORT, HttpDatasetProbe};
use webscaled::{ScaleLoop, ScalerSettings};

const DEFAULT_LOG_FILTER: &str = "info,webscaled=debug,webscale=debug";

#[derive(Parser)]
#[command(name = "webscaled", about = "Dataset-aware autoscaler for the web tier")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run from outside the cluster. Start `kubectl proxy` first: kubeconfig
    /// files are not read, so the proxy (or an explicit token and CA file)
    /// supplies the credentials.
    Local {
        /// API server URL; `kubectl proxy` listens here by default.
        #[arg(long, default_value = DEFAULT_LOCAL_API_SERVER)]
        api_server: String,

        /// Bearer token for the API server.
        #[arg(long, env = "KUBE_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// CA bundle for an https API server.
        #[arg(long)]
        ca_file: Option<PathBuf>,

        #[command(flatten)]
        workload: WorkloadArgs,
    },
    /// Run inside the cluster with the pod's service account.
    InCluster {
        #[command(flatten)]
        workload: WorkloadArgs,
    },
}

#[derive(Args, Debug, Clone)]
struct WorkloadArgs {
    /// Namespace of the workload.
    #[arg(long)]
    namespace: Option<String>,

    /// Deployment to scale.
    #[arg(long, default_value = "web")]
    deployment: String,

    /// Container whose CPU and readiness count.
    #[arg(long, default_value = "web")]
    container: String,

    /// `app` label of the workload's pods.
    #[arg(long, default_value = "my_app")]
    app_label: String,

    /// `role` label of the workload's pods.
    #[arg(long, default_value = "web")]
    role_label: String,

    /// Port replicas serve dataset info on.
    #[arg(long, default_value_t = DEFAULT_PROBE_PORT)]
    probe_port: u16,

    /// Dataset probe timeout in milliseconds.
    #[arg(long, default_value_t = 2000)]
    probe_timeout_ms: u64,

    /// Kubernetes API request timeout in milliseconds.
    #[arg(long, default_value_t = 10_000)]
    api_timeout_ms: u64,
}

impl WorkloadArgs {
    fn workload(&self) -> Workload {
        Workload {
            deployment: self.deployment.clone(),
            container: self.container.clone(),
            app: self.app_label.clone(),
            role: self.role_label.clone(),
        }
    }

    fn probe(&self) -> HttpDatasetProbe {
        HttpDatasetProbe::new(self.probe_port, Duration::from_millis(self.probe_timeout_ms))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let settings = ScalerSettings::from_env().context("loading scaling policy")?;

    let (config, workload) = match cli.command {
        Command::Local {
            api_server,
            token,
            ca_file,
            workload,
        } => {
            let config = KubeConfig::local(&api_server, token, ca_file.as_deref(), workload.namespace.clone())
                .context("loading local credentials")?;
            (config, workload)
        }
        Command::InCluster { workload } => {
            let config =
                KubeConfig::in_cluster(workload.namespace.clone()).context("loading in-cluster credentials")?;
            (config, workload)
        }
    };

    let config = config.with_request_timeout(Duration::from_millis(workload.api_timeout_ms));
    run(settings, config, workload).await
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn run(settings: ScalerSettings, config: KubeConfig, args: WorkloadArgs) -> anyhow::Result<()> {
    let client = KubeClient::new(&config, args.workload());
    info!(
        namespace = %client.namespace(),
        deployment = %client.workload().deployment,
        "webscaled starting"
    );

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown signal received"),
            Err(e) => error!(error = %e, "failed to listen for ctrl-c, shutting down"),
        }
        let _ = shutdown_tx.send(true);
    });

    // ── Readiness watch ────────────────────────────────────────

    let ready = ReadyAddresses::new();
    let (events_tx, events_rx) = mpsc::channel(64);
    let applier_handle = tokio::spawn(run_applier(events_rx, ready.clone()));
    let watcher = PodWatcher::new(client.clone(), events_tx).with_retry_interval(settings.loop_interval);
    let watcher_handle = tokio::spawn(watcher.run(shutdown_rx.clone()));

    // ── Scale loop ─────────────────────────────────────────────

    let mut scale_loop = ScaleLoop::new(client, args.probe(), &settings).with_watched(ready);
    scale_loop.run(shutdown_rx).await;

    join_logged("pod watcher", watcher_handle).await;
    join_logged("readiness applier", applier_handle).await;

    info!("webscaled stopped");
    Ok(())
}

/// Wait for a background task, logging it if it panicked or was cancelled.
async fn join_logged(name: &str, handle: JoinHandle<()>) -> bool {
    match handle.await {
        Ok(()) => true,
        Err(e) => {
            error!(task = name, error = %e, "background task failed");
            false
        }
    }
}
