//! "Cluster provisioning delay": installation is taking longer than the
//! paging threshold. Checks the usual self-inflicted causes before handing
//! the incident to a human.

use async_trait::async_trait;
use tracing::info;

use cad_core::{
    action::Action,
    capabilities::VerifierOutcome,
    cluster::ClusterState,
    investigation::{Investigation, InvestigationResult, ResourceRequest},
    resources::Resources,
    TriageError,
};

/// Investigates delayed installations: resolved state, DNS, provisioning
/// error codes, private-link wiring, and network egress.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClusterProvisioningDelay;

#[async_trait]
impl Investigation for ClusterProvisioningDelay {
    fn name(&self) -> &'static str {
        "cpd"
    }

    fn alert_token(&self) -> &'static str {
        "clusterprovisioningdelay"
    }

    fn description(&self) -> &'static str {
        "Investigates delayed cluster installations: DNS readiness, \
         provisioning error codes, private-link configuration, and egress \
         verification"
    }

    fn required_resources(&self) -> ResourceRequest {
        ResourceRequest::cluster_only()
            .with_cluster_deployment()
            .with_network_verifier()
    }

    async fn run(&self, resources: &Resources) -> Result<InvestigationResult, TriageError> {
        let cluster = &resources.cluster;

        if cluster.state == ClusterState::Ready {
            info!("cluster became ready since the alert fired");
            return Ok(InvestigationResult::from_actions(vec![
                Action::note("Cluster became ready; the provisioning delay resolved itself"),
                Action::silence("provisioning completed"),
            ]));
        }

        if !cluster.dns_ready {
            return Ok(InvestigationResult::from_actions(vec![
                Action::note("Cluster DNS is not yet ready; provisioning is still blocked on DNS"),
                Action::escalate("provisioning delayed with DNS unready"),
            ]));
        }

        if cluster.private_link && cluster.subnets.is_empty() {
            return Ok(InvestigationResult::from_actions(vec![
                Action::note(
                    "Private-link cluster has no subnets configured; installation cannot proceed",
                ),
                Action::escalate("private-link misconfiguration"),
            ]));
        }

        let deployment = resources.cluster_deployment()?;
        let verifier = resources.network_verifier()?;
        let outcome = verifier.verify_egress(cluster, deployment).await?;

        let actions = match outcome {
            VerifierOutcome::Failures(failures) => {
                info!(failures = failures.len(), "network verifier found issues");
                vec![
                    Action::note(format!(
                        "Network verifier found issues: {}",
                        failures.join(", ")
                    )),
                    Action::escalate("network egress blocked"),
                ]
            }
            VerifierOutcome::Passed => {
                let mut line =
                    "Network verifier found no issues; provisioning delay cause unknown".to_owned();
                if let Some(code) = cluster
                    .provision_error_code
                    .as_deref()
                    .filter(|code| !code.is_empty())
                {
                    line.push_str(&format!(" (provisioning error code {code})"));
                }
                vec![
                    Action::note(line),
                    Action::escalate("provisioning delayed, cause undetermined"),
                ]
            }
        };

        Ok(InvestigationResult::from_actions(actions))
    }
}
