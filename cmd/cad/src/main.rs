//! The `cad` binary: one process per incident event (webhook mode), plus a
//! manual investigation mode and one-off fleet checks.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use cad_client_aws::{AwsCredentialChain, ChainConfig, EgressVerifier};
use cad_client_backplane::BackplaneClient;
use cad_client_ocm::OcmClient;
use cad_client_pagerduty::PagerDutyClient;
use cad_configs::CadConfig;
use cad_core::{
    capabilities::IncidentTracker,
    controller::{Controller, ControllerOptions},
    payload::AlertPayload,
    resources::Services,
};

#[derive(Parser)]
#[command(
    name = "cad",
    about = "Configuration Anomaly Detection: automated triage for managed cluster incidents",
    version
)]
struct Cli {
    /// Log level; overrides the LOG_LEVEL environment variable.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Handle one incident event from a webhook payload file.
    Run {
        /// Path to the incident payload JSON.
        #[arg(long)]
        payload_path: PathBuf,
    },
    /// Run a single investigation against a cluster, without an incident.
    Investigate {
        /// Registered investigation name.
        name: String,
        /// External cluster id to investigate.
        #[arg(long)]
        cluster_id: String,
        /// Validate and log the actions without executing them.
        #[arg(long)]
        dry_run: bool,
    },
    /// One-off sweeps across the managed fleet.
    Checks {
        #[command(subcommand)]
        check: Check,
    },
}

#[derive(Subcommand)]
enum Check {
    /// Apply the credentials investigation wherever the chain is denied.
    Credentials,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = CadConfig::from_env().context("loading configuration from the environment")?;
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.log_level.clone());
    init_tracing(&level);

    let recorder = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .context("installing the metrics recorder")?;

    let controller = build_controller(&config, matches!(cli.command, Command::Run { .. }))
        .await
        .context("assembling service clients")?;

    let outcome = match cli.command {
        Command::Run { payload_path } => {
            let raw = tokio::fs::read_to_string(&payload_path)
                .await
                .with_context(|| format!("reading payload file {}", payload_path.display()))?;
            let payload = AlertPayload::parse(&raw).context("parsing the incident payload")?;
            controller
                .run_webhook(payload)
                .await
                .context("handling the incident event")
        }
        Command::Investigate {
            name,
            cluster_id,
            dry_run,
        } => controller
            .run_manual(&name, &cluster_id, dry_run)
            .await
            .with_context(|| format!("running investigation '{name}'")),
        Command::Checks {
            check: Check::Credentials,
        } => controller
            .run_credentials_check()
            .await
            .context("sweeping the fleet for missing credentials"),
    };

    debug!(metrics = %recorder.render(), "run metrics");
    outcome?;
    info!("run complete");
    Ok(())
}

async fn build_controller(config: &CadConfig, webhook: bool) -> anyhow::Result<Controller> {
    let ocm = Arc::new(
        OcmClient::new(
            &config.ocm.url,
            config.ocm.client_id.clone(),
            config.ocm.client_secret.clone(),
        )
        .context("building the cluster-management client")?,
    );

    // Webhook runs must be able to reach the incident tracker; manual runs
    // and sweeps work without one.
    if webhook {
        config
            .require_pagerduty()
            .context("webhook mode requires the incident tracker")?;
    }
    let incident_tracker: Option<Arc<dyn IncidentTracker>> = match config.pagerduty.as_ref() {
        Some(pagerduty) => Some(Arc::new(
            PagerDutyClient::new(
                pagerduty.token.clone(),
                pagerduty.silent_policy.clone(),
                pagerduty.escalation_policy.clone(),
            )
            .context("building the incident-tracker client")?,
        )),
        None => None,
    };

    let base_sdk = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let chain = AwsCredentialChain::new(
        base_sdk,
        ChainConfig {
            jump_role_arn: config.cloud.jump_role_arn.clone(),
            support_role_arn: config.cloud.support_role_arn.clone(),
        },
        ocm.clone(),
    );

    let backplane = Arc::new(
        BackplaneClient::new(
            &config.backplane.url,
            config.backplane.proxy_url.clone(),
            ocm.clone(),
        )
        .context("building the backplane client")?,
    );

    let services = Services {
        cluster_mgmt: ocm,
        incident_tracker,
        cloud: Arc::new(chain),
        kube: backplane.clone(),
        report_store: backplane,
        network_verifier: Arc::new(
            EgressVerifier::new().context("building the egress verifier")?,
        ),
    };

    let registry = cad_investigations::registry().context("registering investigations")?;
    Ok(Controller::new(
        registry,
        services,
        ControllerOptions {
            experimental_enabled: config.experimental_enabled,
            pipeline_name: config.pipeline_name.clone(),
        },
    ))
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
