//! "Cluster has gone missing": the cluster stopped answering while its
//! cloud account still exists. The usual cause is someone stopping the
//! instances; the audit trail tells us who.

use async_trait::async_trait;
use tracing::{debug, info};

use cad_core::{
    action::{Action, ServiceLogParams, Severity},
    capabilities::{InstanceState, StopEvent},
    investigation::{Investigation, InvestigationResult, ResourceRequest},
    resources::Resources,
    TriageError,
};

const SERVICE_NAME: &str = "SREManualAction";

/// Investigates stopped or vanished cluster instances through the cloud
/// audit trail.
#[derive(Clone, Debug)]
pub struct ClusterHasGoneMissing {
    /// Audit-event schema version accepted for user attribution. Events
    /// carrying any other version cannot be attributed and escalate.
    accepted_event_version: String,
    /// Role/user prefixes owned by the customer's managed-admin credential.
    operator_prefixes: Vec<String>,
    /// Exact usernames additionally treated as customer-authorised.
    authorized_users: Vec<String>,
}

impl Default for ClusterHasGoneMissing {
    fn default() -> Self {
        Self {
            accepted_event_version: "1.08".to_owned(),
            operator_prefixes: vec!["osdManagedAdmin".to_owned()],
            authorized_users: vec!["OrganizationAccountAccessRole".to_owned()],
        }
    }
}

impl ClusterHasGoneMissing {
    #[must_use]
    pub fn with_accepted_event_version(mut self, version: impl Into<String>) -> Self {
        self.accepted_event_version = version.into();
        self
    }

    fn is_authorized(&self, username: &str) -> bool {
        self.operator_prefixes
            .iter()
            .any(|prefix| username.starts_with(prefix.as_str()))
            || self
                .authorized_users
                .iter()
                .any(|user| user == username)
    }

    fn customer_shutdown_result(&self, events: &[StopEvent]) -> InvestigationResult {
        let mut users: Vec<&str> = events.iter().map(|event| event.username.as_str()).collect();
        users.sort_unstable();
        users.dedup();

        InvestigationResult::from_actions(vec![
            Action::ServiceLog(ServiceLogParams {
                severity: Severity::Warning,
                service_name: SERVICE_NAME.to_owned(),
                summary: "Instances stopped by customer".to_owned(),
                description: format!(
                    "Your cluster is unreachable because its instances were stopped by {}. \
                     Restart the instances to restore the cluster.",
                    users.join(", ")
                ),
                internal_only: false,
                allow_duplicates: false,
            }),
            Action::silence("customer-initiated"),
        ])
    }
}

#[async_trait]
impl Investigation for ClusterHasGoneMissing {
    fn name(&self) -> &'static str {
        "chgm"
    }

    fn alert_token(&self) -> &'static str {
        "has gone missing"
    }

    fn description(&self) -> &'static str {
        "Investigates clusters that stopped answering: checks DNS, instance \
         state, and who stopped the instances according to the audit trail"
    }

    fn required_resources(&self) -> ResourceRequest {
        ResourceRequest::cluster_only()
            .with_cluster_deployment()
            .with_cloud_client()
    }

    async fn run(&self, resources: &Resources) -> Result<InvestigationResult, TriageError> {
        let cluster = &resources.cluster;
        if !cluster.dns_ready {
            return Ok(InvestigationResult::from_actions(vec![
                Action::note("Cluster DNS is not ready; cannot attribute the outage"),
                Action::escalate("DNS not ready on a missing cluster"),
            ]));
        }

        let deployment = resources.cluster_deployment()?;
        let cloud = resources.cloud_client()?;

        let instances = cloud
            .instances(&deployment.infra_id)
            .await
            .map_err(|source| TriageError::infrastructure("listing cluster instances", source))?;
        debug!(
            infra_id = %deployment.infra_id,
            instances = instances.len(),
            "fetched instance state"
        );

        if instances.is_empty() {
            return Ok(InvestigationResult::from_actions(vec![
                Action::note(format!(
                    "No instances found for infra id '{}'; the cluster may have been deleted \
                     outside of the platform",
                    deployment.infra_id
                )),
                Action::escalate("missing cluster has no instances"),
            ]));
        }

        let stopped: Vec<String> = instances
            .iter()
            .filter(|instance| instance.state != InstanceState::Running)
            .map(|instance| instance.id.clone())
            .collect();

        if stopped.is_empty() {
            return Ok(InvestigationResult::from_actions(vec![
                Action::note("All instances are running; the cluster may be recovering"),
                Action::escalate("missing cluster with running instances"),
            ]));
        }

        let events = cloud
            .stop_events(&stopped)
            .await
            .map_err(|source| TriageError::infrastructure("reading the audit trail", source))?;

        if events.is_empty() {
            return Ok(InvestigationResult::from_actions(vec![
                Action::note(format!(
                    "{} instance(s) are stopped but the audit trail has no stop events for them",
                    stopped.len()
                )),
                Action::escalate("unattributed instance shutdown"),
            ]));
        }

        let attributable: Vec<&StopEvent> = events
            .iter()
            .filter(|event| event.event_version == self.accepted_event_version)
            .collect();

        if attributable.is_empty() {
            return Ok(InvestigationResult::from_actions(vec![
                Action::note(format!(
                    "Audit events carry unsupported schema version(s); expected {}",
                    self.accepted_event_version
                )),
                Action::escalate("unattributable audit events"),
            ]));
        }

        if let Some(event) = attributable
            .iter()
            .find(|event| !self.is_authorized(&event.username))
        {
            info!(username = %event.username, "unauthorised shutdown detected");
            return Ok(InvestigationResult::from_actions(vec![
                Action::note(format!(
                    "non-operator user {} stopped instances",
                    event.username
                )),
                Action::escalate("unauthorised instance shutdown"),
            ]));
        }

        info!("shutdown attributed to customer-owned credentials");
        let events: Vec<StopEvent> = attributable.into_iter().cloned().collect();
        Ok(self.customer_shutdown_result(&events))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use cad_core::{
        capabilities::{CloudClient, Instance, InstanceState, StopEvent},
        cluster::{Cluster, ClusterDeployment},
        errors::DynError,
        notes::NoteWriter,
    };
    use chrono::Utc;

    use super::*;

    struct FakeCloud {
        instances: Vec<Instance>,
        events: Vec<StopEvent>,
    }

    #[async_trait]
    impl CloudClient for FakeCloud {
        fn region(&self) -> &str {
            "us-east-1"
        }

        async fn instances(&self, _infra_id: &str) -> Result<Vec<Instance>, DynError> {
            Ok(self.instances.clone())
        }

        async fn stop_events(&self, _instance_ids: &[String]) -> Result<Vec<StopEvent>, DynError> {
            Ok(self.events.clone())
        }
    }

    fn cluster() -> Cluster {
        Cluster {
            external_id: "ext-1".to_owned(),
            internal_id: "int-1".to_owned(),
            name: "sample".to_owned(),
            domain_prefix: "sample".to_owned(),
            region: "us-east-1".to_owned(),
            product: cad_core::cluster::Product::Classic,
            state: cad_core::cluster::ClusterState::Ready,
            provision_error_code: None,
            dns_ready: true,
            subnets: Vec::new(),
            private_link: false,
            node_counts: cad_core::cluster::NodeCounts::default(),
            machine_pools: Vec::new(),
        }
    }

    fn stop_event(username: &str, version: &str) -> StopEvent {
        StopEvent {
            username: username.to_owned(),
            event_version: version.to_owned(),
            instance_ids: vec!["i-1".to_owned()],
            occurred_at: Utc::now(),
        }
    }

    fn resources_with(cloud: FakeCloud) -> Resources {
        Resources {
            cluster: Arc::new(cluster()),
            cluster_deployment: Some(Arc::new(ClusterDeployment {
                infra_id: "sample-abc12".to_owned(),
                platform: "aws".to_owned(),
                aws_region: Some("us-east-1".to_owned()),
            })),
            cloud_client: Some(Arc::new(cloud)),
            kube_config: None,
            management_client: None,
            network_verifier: None,
            limited_support_reasons: None,
            hcp_namespace: None,
            notes: Arc::new(Mutex::new(NoteWriter::new("chgm"))),
            payload: None,
        }
    }

    fn stopped_instance() -> Instance {
        Instance {
            id: "i-1".to_owned(),
            state: InstanceState::Stopped,
        }
    }

    #[tokio::test]
    async fn operator_credential_shutdown_is_customer_initiated() {
        let resources = resources_with(FakeCloud {
            instances: vec![stopped_instance()],
            events: vec![stop_event("osdManagedAdmin-abcd", "1.08")],
        });

        let result = ClusterHasGoneMissing::default()
            .run(&resources)
            .await
            .expect("investigation runs");

        assert_eq!(result.actions.len(), 2);
        let Action::ServiceLog(log) = &result.actions[0] else {
            panic!("expected a service log first, got {:?}", result.actions[0]);
        };
        assert_eq!(log.summary, "Instances stopped by customer");
        assert_eq!(log.severity, Severity::Warning);
        let Action::SilenceIncident(silence) = &result.actions[1] else {
            panic!("expected a silence second, got {:?}", result.actions[1]);
        };
        assert_eq!(silence.reason.as_deref(), Some("customer-initiated"));
    }

    #[tokio::test]
    async fn unknown_user_shutdown_escalates() {
        let resources = resources_with(FakeCloud {
            instances: vec![stopped_instance()],
            events: vec![stop_event("eve-user", "1.08")],
        });

        let result = ClusterHasGoneMissing::default()
            .run(&resources)
            .await
            .expect("investigation runs");

        let Action::PagerdutyNote(note) = &result.actions[0] else {
            panic!("expected a note first, got {:?}", result.actions[0]);
        };
        assert_eq!(note.content, "non-operator user eve-user stopped instances");
        assert!(matches!(result.actions[1], Action::EscalateIncident(_)));
    }

    #[tokio::test]
    async fn unsupported_event_version_escalates() {
        let resources = resources_with(FakeCloud {
            instances: vec![stopped_instance()],
            events: vec![stop_event("osdManagedAdmin-abcd", "1.09")],
        });

        let result = ClusterHasGoneMissing::default()
            .run(&resources)
            .await
            .expect("investigation runs");

        assert!(matches!(result.actions[1], Action::EscalateIncident(_)));
    }

    #[tokio::test]
    async fn configured_event_version_widens_attribution() {
        let resources = resources_with(FakeCloud {
            instances: vec![stopped_instance()],
            events: vec![stop_event("osdManagedAdmin-abcd", "1.09")],
        });

        let result = ClusterHasGoneMissing::default()
            .with_accepted_event_version("1.09")
            .run(&resources)
            .await
            .expect("investigation runs");

        assert!(matches!(result.actions[0], Action::ServiceLog(_)));
    }

    #[tokio::test]
    async fn running_instances_escalate_without_service_log() {
        let resources = resources_with(FakeCloud {
            instances: vec![Instance {
                id: "i-1".to_owned(),
                state: InstanceState::Running,
            }],
            events: Vec::new(),
        });

        let result = ClusterHasGoneMissing::default()
            .run(&resources)
            .await
            .expect("investigation runs");

        assert!(matches!(result.actions[0], Action::PagerdutyNote(_)));
        assert!(matches!(result.actions[1], Action::EscalateIncident(_)));
    }
}
