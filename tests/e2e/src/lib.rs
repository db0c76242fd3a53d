//! Mock capability clients for the end-to-end scenarios. Every
//! side-effecting call is appended to one shared, ordered log so tests can
//! assert exactly what a run did.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use chrono::Utc;

use cad_core::{
    capabilities::{
        CloudClient, CloudProvider, ClusterMgmt, IncidentTracker, Instance, InstanceState,
        KubeAccess, LimitedSupportReason, NetworkVerifier, ReportStore, ServiceLogEntry,
        StopEvent, VerifierOutcome,
    },
    cluster::{Cluster, ClusterDeployment, ClusterState, NodeCounts, Product},
    controller::{Controller, ControllerOptions},
    errors::{DynError, TriageError},
    investigation::Registry,
    payload::{AlertPayload, EventType},
    resources::Services,
};

pub type CallLog = Arc<Mutex<Vec<String>>>;

#[must_use]
pub fn sample_cluster() -> Cluster {
    Cluster {
        external_id: "ext-cluster-1".to_owned(),
        internal_id: "int-cluster-1".to_owned(),
        name: "prod-a".to_owned(),
        domain_prefix: "prod-a".to_owned(),
        region: "us-east-1".to_owned(),
        product: Product::Classic,
        state: ClusterState::Ready,
        provision_error_code: None,
        dns_ready: true,
        subnets: vec!["subnet-1".to_owned()],
        private_link: false,
        node_counts: NodeCounts::default(),
        machine_pools: Vec::new(),
    }
}

#[must_use]
pub fn triggered_payload(title: &str) -> AlertPayload {
    AlertPayload {
        incident_id: "PINC1".to_owned(),
        service_id: "PSVC1".to_owned(),
        event_type: EventType::Triggered,
        alert_title: title.to_owned(),
        external_cluster_id: "ext-cluster-1".to_owned(),
        hcp_namespace: None,
    }
}

#[must_use]
pub fn stop_event(username: &str, version: &str) -> StopEvent {
    StopEvent {
        username: username.to_owned(),
        event_version: version.to_owned(),
        instance_ids: vec!["i-0001".to_owned()],
        occurred_at: Utc::now(),
    }
}

#[must_use]
pub fn stopped_instance() -> Instance {
    Instance {
        id: "i-0001".to_owned(),
        state: InstanceState::Stopped,
    }
}

/// One mock environment per test; build `Services` from it and keep the
/// handles to steer behaviour.
pub struct MockEnv {
    pub cluster: Cluster,
    pub calls: CallLog,
    pub credentials_missing: Arc<AtomicBool>,
    pub instances: Arc<Mutex<Vec<Instance>>>,
    pub stop_events: Arc<Mutex<Vec<StopEvent>>>,
    pub verifier_outcome: Arc<Mutex<VerifierOutcome>>,
    pub existing_service_logs: Arc<Mutex<Vec<ServiceLogEntry>>>,
    pub existing_reasons: Arc<Mutex<Vec<LimitedSupportReason>>>,
    pub incident_title: Arc<Mutex<String>>,
}

impl MockEnv {
    #[must_use]
    pub fn new(cluster: Cluster) -> Self {
        Self {
            cluster,
            calls: Arc::new(Mutex::new(Vec::new())),
            credentials_missing: Arc::new(AtomicBool::new(false)),
            instances: Arc::new(Mutex::new(vec![stopped_instance()])),
            stop_events: Arc::new(Mutex::new(Vec::new())),
            verifier_outcome: Arc::new(Mutex::new(VerifierOutcome::Passed)),
            existing_service_logs: Arc::new(Mutex::new(Vec::new())),
            existing_reasons: Arc::new(Mutex::new(Vec::new())),
            incident_title: Arc::new(Mutex::new("SomethingWrong".to_owned())),
        }
    }

    #[must_use]
    pub fn recorded_calls(&self) -> Vec<String> {
        self.calls.lock().expect("call log lock").clone()
    }

    #[must_use]
    pub fn controller(&self, registry: Registry) -> Controller {
        Controller::new(registry, self.services(), ControllerOptions::default())
    }

    #[must_use]
    pub fn services(&self) -> Services {
        Services {
            cluster_mgmt: Arc::new(MockClusterMgmt {
                calls: Arc::clone(&self.calls),
                cluster: self.cluster.clone(),
                service_logs: Arc::clone(&self.existing_service_logs),
                reasons: Arc::clone(&self.existing_reasons),
            }),
            incident_tracker: Some(Arc::new(MockIncidentTracker {
                calls: Arc::clone(&self.calls),
                title: Arc::clone(&self.incident_title),
            })),
            cloud: Arc::new(MockCloudProvider {
                credentials_missing: Arc::clone(&self.credentials_missing),
                instances: Arc::clone(&self.instances),
                stop_events: Arc::clone(&self.stop_events),
            }),
            kube: Arc::new(MockKubeAccess),
            report_store: Arc::new(MockReportStore {
                calls: Arc::clone(&self.calls),
            }),
            network_verifier: Arc::new(MockVerifier {
                outcome: Arc::clone(&self.verifier_outcome),
            }),
        }
    }
}

struct MockClusterMgmt {
    calls: CallLog,
    cluster: Cluster,
    service_logs: Arc<Mutex<Vec<ServiceLogEntry>>>,
    reasons: Arc<Mutex<Vec<LimitedSupportReason>>>,
}

#[async_trait]
impl ClusterMgmt for MockClusterMgmt {
    async fn cluster_by_external_id(&self, external_id: &str) -> Result<Cluster, DynError> {
        if external_id == self.cluster.external_id {
            Ok(self.cluster.clone())
        } else {
            Err(format!("no cluster with external id '{external_id}'").into())
        }
    }

    async fn cluster_deployment(&self, _internal_id: &str) -> Result<ClusterDeployment, DynError> {
        Ok(ClusterDeployment {
            infra_id: "prod-a-x7k2p".to_owned(),
            platform: "aws".to_owned(),
            aws_region: Some("us-east-1".to_owned()),
        })
    }

    async fn post_service_log(
        &self,
        _internal_id: &str,
        entry: &ServiceLogEntry,
    ) -> Result<(), DynError> {
        self.calls
            .lock()
            .expect("call log lock")
            .push(format!("service_log:{}", entry.summary));
        self.service_logs
            .lock()
            .expect("service log lock")
            .push(entry.clone());
        Ok(())
    }

    async fn service_logs(&self, _internal_id: &str) -> Result<Vec<ServiceLogEntry>, DynError> {
        Ok(self.service_logs.lock().expect("service log lock").clone())
    }

    async fn post_limited_support(
        &self,
        _internal_id: &str,
        reason: &LimitedSupportReason,
    ) -> Result<(), DynError> {
        self.calls
            .lock()
            .expect("call log lock")
            .push(format!("limited_support:{}", reason.summary));
        self.reasons
            .lock()
            .expect("reasons lock")
            .push(reason.clone());
        Ok(())
    }

    async fn limited_support_reasons(
        &self,
        _internal_id: &str,
    ) -> Result<Vec<LimitedSupportReason>, DynError> {
        Ok(self.reasons.lock().expect("reasons lock").clone())
    }

    async fn support_role_arn(&self, _internal_id: &str) -> Result<String, DynError> {
        Ok("arn:aws:iam::000000000000:role/CustomerSupport".to_owned())
    }

    async fn managed_clusters(&self, page: u32) -> Result<Vec<Cluster>, DynError> {
        if page == 1 {
            Ok(vec![self.cluster.clone()])
        } else {
            Ok(Vec::new())
        }
    }
}

struct MockIncidentTracker {
    calls: CallLog,
    title: Arc<Mutex<String>>,
}

#[async_trait]
impl IncidentTracker for MockIncidentTracker {
    async fn incident_title(&self, _incident_id: &str) -> Result<String, DynError> {
        Ok(self.title.lock().expect("title lock").clone())
    }

    async fn set_incident_title(&self, _incident_id: &str, title: &str) -> Result<(), DynError> {
        self.calls
            .lock()
            .expect("call log lock")
            .push(format!("set_title:{title}"));
        *self.title.lock().expect("title lock") = title.to_owned();
        Ok(())
    }

    async fn add_note(&self, _incident_id: &str, content: &str) -> Result<(), DynError> {
        self.calls
            .lock()
            .expect("call log lock")
            .push(format!("note:{content}"));
        Ok(())
    }

    async fn silence(&self, _incident_id: &str) -> Result<(), DynError> {
        self.calls
            .lock()
            .expect("call log lock")
            .push("silence".to_owned());
        Ok(())
    }

    async fn escalate(&self, _incident_id: &str) -> Result<(), DynError> {
        self.calls
            .lock()
            .expect("call log lock")
            .push("escalate".to_owned());
        Ok(())
    }
}

struct MockCloudProvider {
    credentials_missing: Arc<AtomicBool>,
    instances: Arc<Mutex<Vec<Instance>>>,
    stop_events: Arc<Mutex<Vec<StopEvent>>>,
}

#[async_trait]
impl CloudProvider for MockCloudProvider {
    async fn customer_client(
        &self,
        _cluster: &Cluster,
    ) -> Result<Arc<dyn CloudClient>, TriageError> {
        if self.credentials_missing.load(Ordering::SeqCst) {
            return Err(TriageError::credentials_missing(
                "AccessDenied: failed to assume into support-role",
            ));
        }
        Ok(Arc::new(MockCloudClient {
            instances: self.instances.lock().expect("instances lock").clone(),
            stop_events: self.stop_events.lock().expect("stop events lock").clone(),
        }))
    }
}

struct MockCloudClient {
    instances: Vec<Instance>,
    stop_events: Vec<StopEvent>,
}

#[async_trait]
impl CloudClient for MockCloudClient {
    fn region(&self) -> &str {
        "us-east-1"
    }

    async fn instances(&self, _infra_id: &str) -> Result<Vec<Instance>, DynError> {
        Ok(self.instances.clone())
    }

    async fn stop_events(&self, _instance_ids: &[String]) -> Result<Vec<StopEvent>, DynError> {
        Ok(self.stop_events.clone())
    }
}

struct MockKubeAccess;

#[async_trait]
impl KubeAccess for MockKubeAccess {
    async fn rest_config(&self, _cluster_id: &str) -> Result<kube::Config, TriageError> {
        let uri: http::Uri = "https://kube.invalid"
            .parse()
            .map_err(|_| TriageError::internal("fixture uri"))?;
        Ok(kube::Config::new(uri))
    }

    async fn management_client(&self, _cluster_id: &str) -> Result<kube::Client, TriageError> {
        let uri: http::Uri = "https://kube.invalid"
            .parse()
            .map_err(|_| TriageError::internal("fixture uri"))?;
        kube::Client::try_from(kube::Config::new(uri))
            .map_err(|err| TriageError::infrastructure("building fixture client", Box::new(err)))
    }
}

struct MockReportStore {
    calls: CallLog,
}

#[async_trait]
impl ReportStore for MockReportStore {
    async fn upload_report(
        &self,
        cluster_id: &str,
        _summary: &str,
        _data: &[u8],
    ) -> Result<String, DynError> {
        self.calls
            .lock()
            .expect("call log lock")
            .push(format!("report:{cluster_id}"));
        Ok("report-0001".to_owned())
    }
}

struct MockVerifier {
    outcome: Arc<Mutex<VerifierOutcome>>,
}

#[async_trait]
impl NetworkVerifier for MockVerifier {
    async fn verify_egress(
        &self,
        _cluster: &Cluster,
        _deployment: &ClusterDeployment,
    ) -> Result<VerifierOutcome, TriageError> {
        Ok(self.outcome.lock().expect("outcome lock").clone())
    }
}
