//! "Cloud credentials are missing": the role-assumption chain into the
//! customer account was denied. Not selected by alert title; the controller
//! reroutes here whenever resource assembly reports the denial.

use async_trait::async_trait;
use tracing::info;

use cad_core::{
    action::{Action, LimitedSupportParams},
    investigation::{Investigation, InvestigationResult, ResourceRequest},
    resources::Resources,
    TriageError,
};

pub const LIMITED_SUPPORT_SUMMARY: &str = "Restore missing cloud credentials";

/// Declares limited support and silences the incident when the customer has
/// revoked the access CAD (and SRE) depend on.
#[derive(Clone, Copy, Debug, Default)]
pub struct CloudCredentialsAreMissing;

#[async_trait]
impl Investigation for CloudCredentialsAreMissing {
    fn name(&self) -> &'static str {
        "ccam"
    }

    // Never matched by title: the controller invokes this directly when the
    // credential chain is denied.
    fn alert_token(&self) -> &'static str {
        ""
    }

    fn description(&self) -> &'static str {
        "Handles denied cloud credential chains: declares limited support \
         and silences the incident until access is restored"
    }

    fn required_resources(&self) -> ResourceRequest {
        ResourceRequest::cluster_only().with_limited_support_reasons()
    }

    async fn run(&self, resources: &Resources) -> Result<InvestigationResult, TriageError> {
        let reasons = resources.limited_support_reasons()?;
        if reasons
            .iter()
            .any(|reason| reason.summary == LIMITED_SUPPORT_SUMMARY)
        {
            info!("limited-support reason already present; nothing to declare");
            return Ok(InvestigationResult::default());
        }

        Ok(InvestigationResult::from_actions(vec![
            Action::LimitedSupport(LimitedSupportParams {
                summary: LIMITED_SUPPORT_SUMMARY.to_owned(),
                details: "Your cluster requires you to take action: the cloud credentials \
                          used by the managed service to operate it are missing or lack the \
                          required permissions. Restore the support role to return to full \
                          support."
                    .to_owned(),
                context_label: "ccam".to_owned(),
                allow_duplicates: false,
            }),
            Action::silence("cloud credentials are missing"),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use cad_core::{
        capabilities::LimitedSupportReason,
        cluster::{Cluster, ClusterState, NodeCounts, Product},
        notes::NoteWriter,
    };

    use super::*;

    fn resources_with(reasons: Vec<LimitedSupportReason>) -> Resources {
        Resources {
            cluster: Arc::new(Cluster {
                external_id: "ext-1".to_owned(),
                internal_id: "int-1".to_owned(),
                name: "sample".to_owned(),
                domain_prefix: "sample".to_owned(),
                region: "us-east-1".to_owned(),
                product: Product::Classic,
                state: ClusterState::Ready,
                provision_error_code: None,
                dns_ready: true,
                subnets: Vec::new(),
                private_link: false,
                node_counts: NodeCounts::default(),
                machine_pools: Vec::new(),
            }),
            cluster_deployment: None,
            cloud_client: None,
            kube_config: None,
            management_client: None,
            network_verifier: None,
            limited_support_reasons: Some(reasons),
            hcp_namespace: None,
            notes: Arc::new(Mutex::new(NoteWriter::new("ccam"))),
            payload: None,
        }
    }

    #[tokio::test]
    async fn declares_limited_support_and_silences() {
        let result = CloudCredentialsAreMissing
            .run(&resources_with(Vec::new()))
            .await
            .expect("investigation runs");

        assert_eq!(result.actions.len(), 2);
        let Action::LimitedSupport(reason) = &result.actions[0] else {
            panic!("expected limited support, got {:?}", result.actions[0]);
        };
        assert_eq!(reason.summary, LIMITED_SUPPORT_SUMMARY);
        assert_eq!(reason.context_label, "ccam");
        assert!(matches!(result.actions[1], Action::SilenceIncident(_)));
    }

    #[tokio::test]
    async fn existing_reason_produces_no_actions() {
        let result = CloudCredentialsAreMissing
            .run(&resources_with(vec![LimitedSupportReason {
                summary: LIMITED_SUPPORT_SUMMARY.to_owned(),
                details: "from an earlier run".to_owned(),
            }]))
            .await
            .expect("investigation runs");

        assert!(result.actions.is_empty());
    }
}
