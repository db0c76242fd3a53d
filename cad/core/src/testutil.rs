//! Shared fakes for the core test suites. Each fake records the calls it
//! receives in a shared, ordered log so ordering guarantees can be asserted.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use chrono::Utc;

use crate::{
    capabilities::{
        CloudClient, CloudProvider, ClusterMgmt, IncidentTracker, Instance, KubeAccess,
        LimitedSupportReason, NetworkVerifier, ReportStore, ServiceLogEntry, StopEvent,
        VerifierOutcome,
    },
    cluster::{Cluster, ClusterDeployment, ClusterState, NodeCounts, Product},
    errors::{DynError, TriageError},
    resources::Services,
};

#[must_use]
pub fn cluster_fixture() -> Cluster {
    Cluster {
        external_id: "ext-1".to_owned(),
        internal_id: "int-1".to_owned(),
        name: "sample".to_owned(),
        domain_prefix: "sample".to_owned(),
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
pub fn deployment_fixture() -> ClusterDeployment {
    ClusterDeployment {
        infra_id: "sample-abc12".to_owned(),
        platform: "aws".to_owned(),
        aws_region: Some("us-east-1".to_owned()),
    }
}

/// Ordered log of every side-effecting call across all fakes.
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub struct FakeServices {
    pub calls: CallLog,
    cluster: Cluster,
    cluster_fetches: Arc<AtomicUsize>,
    deployment_fetches: Arc<AtomicUsize>,
    credentials_missing: Arc<AtomicBool>,
    pub existing_service_logs: Arc<Mutex<Vec<ServiceLogEntry>>>,
    pub existing_reasons: Arc<Mutex<Vec<LimitedSupportReason>>>,
    pub incident_title: Arc<Mutex<String>>,
    pub instances: Arc<Mutex<Vec<Instance>>>,
    pub stop_events: Arc<Mutex<Vec<StopEvent>>>,
    pub verifier_outcome: Arc<Mutex<VerifierOutcome>>,
    /// When set, `add_note` fails with this message on every call.
    pub note_error: Arc<Mutex<Option<String>>>,
}

impl FakeServices {
    #[must_use]
    pub fn new(cluster: Cluster) -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            cluster,
            cluster_fetches: Arc::new(AtomicUsize::new(0)),
            deployment_fetches: Arc::new(AtomicUsize::new(0)),
            credentials_missing: Arc::new(AtomicBool::new(false)),
            existing_service_logs: Arc::new(Mutex::new(Vec::new())),
            existing_reasons: Arc::new(Mutex::new(Vec::new())),
            incident_title: Arc::new(Mutex::new("SomethingWrong".to_owned())),
            instances: Arc::new(Mutex::new(Vec::new())),
            stop_events: Arc::new(Mutex::new(Vec::new())),
            verifier_outcome: Arc::new(Mutex::new(VerifierOutcome::Passed)),
            note_error: Arc::new(Mutex::new(None)),
        }
    }

    #[must_use]
    pub fn with_credentials_missing(self) -> Self {
        self.credentials_missing.store(true, Ordering::SeqCst);
        self
    }

    #[must_use]
    pub fn cluster_fetches(&self) -> usize {
        self.cluster_fetches.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn deployment_fetches(&self) -> usize {
        self.deployment_fetches.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn recorded_calls(&self) -> Vec<String> {
        self.calls.lock().expect("call log lock").clone()
    }

    #[must_use]
    pub fn services(&self) -> Services {
        Services {
            cluster_mgmt: Arc::new(FakeClusterMgmt {
                calls: Arc::clone(&self.calls),
                cluster: self.cluster.clone(),
                cluster_fetches: Arc::clone(&self.cluster_fetches),
                deployment_fetches: Arc::clone(&self.deployment_fetches),
                service_logs: Arc::clone(&self.existing_service_logs),
                reasons: Arc::clone(&self.existing_reasons),
            }),
            incident_tracker: Some(Arc::new(FakeIncidentTracker {
                calls: Arc::clone(&self.calls),
                title: Arc::clone(&self.incident_title),
                note_error: Arc::clone(&self.note_error),
            })),
            cloud: Arc::new(FakeCloudProvider {
                credentials_missing: Arc::clone(&self.credentials_missing),
                instances: Arc::clone(&self.instances),
                stop_events: Arc::clone(&self.stop_events),
                region: self.cluster.region.clone(),
            }),
            kube: Arc::new(FakeKubeAccess),
            report_store: Arc::new(FakeReportStore {
                calls: Arc::clone(&self.calls),
            }),
            network_verifier: Arc::new(FakeVerifier {
                outcome: Arc::clone(&self.verifier_outcome),
            }),
        }
    }
}

pub struct FakeClusterMgmt {
    calls: CallLog,
    cluster: Cluster,
    cluster_fetches: Arc<AtomicUsize>,
    deployment_fetches: Arc<AtomicUsize>,
    service_logs: Arc<Mutex<Vec<ServiceLogEntry>>>,
    reasons: Arc<Mutex<Vec<LimitedSupportReason>>>,
}

#[async_trait]
impl ClusterMgmt for FakeClusterMgmt {
    async fn cluster_by_external_id(&self, external_id: &str) -> Result<Cluster, DynError> {
        self.cluster_fetches.fetch_add(1, Ordering::SeqCst);
        if external_id == self.cluster.external_id {
            Ok(self.cluster.clone())
        } else {
            Err(format!("no cluster with external id '{external_id}'").into())
        }
    }

    async fn cluster_deployment(&self, _internal_id: &str) -> Result<ClusterDeployment, DynError> {
        self.deployment_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(deployment_fixture())
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

pub struct FakeIncidentTracker {
    calls: CallLog,
    title: Arc<Mutex<String>>,
    note_error: Arc<Mutex<Option<String>>>,
}

#[async_trait]
impl IncidentTracker for FakeIncidentTracker {
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
        if let Some(message) = self.note_error.lock().expect("note error lock").clone() {
            return Err(message.into());
        }
        self.calls
            .lock()
            .expect("call log lock")
            .push(format!("note:{content}"));
        Ok(())
    }

    async fn silence(&self, _incident_id: &str) -> Result<(), DynError> {
        self.calls.lock().expect("call log lock").push("silence".to_owned());
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

pub struct FakeCloudProvider {
    credentials_missing: Arc<AtomicBool>,
    instances: Arc<Mutex<Vec<Instance>>>,
    stop_events: Arc<Mutex<Vec<StopEvent>>>,
    region: String,
}

#[async_trait]
impl CloudProvider for FakeCloudProvider {
    async fn customer_client(
        &self,
        _cluster: &Cluster,
    ) -> Result<Arc<dyn CloudClient>, TriageError> {
        if self.credentials_missing.load(Ordering::SeqCst) {
            return Err(TriageError::credentials_missing(
                "AccessDenied: failed to assume into support-role",
            ));
        }
        Ok(Arc::new(FakeCloudClient {
            instances: self.instances.lock().expect("instances lock").clone(),
            stop_events: self.stop_events.lock().expect("stop events lock").clone(),
            region: self.region.clone(),
        }))
    }
}

pub struct FakeCloudClient {
    instances: Vec<Instance>,
    stop_events: Vec<StopEvent>,
    region: String,
}

#[async_trait]
impl CloudClient for FakeCloudClient {
    fn region(&self) -> &str {
        &self.region
    }

    async fn instances(&self, _infra_id: &str) -> Result<Vec<Instance>, DynError> {
        Ok(self.instances.clone())
    }

    async fn stop_events(&self, _instance_ids: &[String]) -> Result<Vec<StopEvent>, DynError> {
        Ok(self.stop_events.clone())
    }
}

pub struct FakeKubeAccess;

#[async_trait]
impl KubeAccess for FakeKubeAccess {
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

pub struct FakeReportStore {
    calls: CallLog,
}

#[async_trait]
impl ReportStore for FakeReportStore {
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

pub struct FakeVerifier {
    outcome: Arc<Mutex<VerifierOutcome>>,
}

#[async_trait]
impl NetworkVerifier for FakeVerifier {
    async fn verify_egress(
        &self,
        _cluster: &Cluster,
        _deployment: &ClusterDeployment,
    ) -> Result<VerifierOutcome, TriageError> {
        Ok(self.outcome.lock().expect("outcome lock").clone())
    }
}

/// Execution context wired to the fakes, as the controller would build it
/// for a webhook run.
#[must_use]
pub fn execution_context(
    fake: &FakeServices,
    investigation: &str,
) -> crate::executor::ExecutionContext {
    let services = fake.services();
    crate::executor::ExecutionContext {
        cluster: Some(Arc::new(fake.cluster.clone())),
        incident_id: Some("PINC1".to_owned()),
        cluster_mgmt: services.cluster_mgmt,
        incident_tracker: services.incident_tracker,
        report_store: services.report_store,
        notes: Arc::new(Mutex::new(crate::notes::NoteWriter::new(investigation))),
        investigation: investigation.to_owned(),
    }
}

#[must_use]
pub fn stop_event(username: &str, version: &str, instance_ids: &[&str]) -> StopEvent {
    StopEvent {
        username: username.to_owned(),
        event_version: version.to_owned(),
        instance_ids: instance_ids.iter().map(|id| (*id).to_owned()).collect(),
        occurred_at: Utc::now(),
    }
}
