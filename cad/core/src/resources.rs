//! Assembly of the per-run resource bundle. Every fetch happens at most
//! once per run, however many components asked for it, and `build` either
//! returns a complete bundle or nothing.

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::{
    capabilities::{
        CloudClient, CloudProvider, ClusterMgmt, IncidentTracker, KubeAccess,
        LimitedSupportReason, NetworkVerifier, ReportStore,
    },
    cluster::{Cluster, ClusterDeployment},
    errors::TriageError,
    investigation::ResourceRequest,
    notes::NoteWriter,
    payload::AlertPayload,
};

/// Capability handles owned by the controller for the whole run.
#[derive(Clone)]
pub struct Services {
    pub cluster_mgmt: Arc<dyn ClusterMgmt>,
    pub incident_tracker: Option<Arc<dyn IncidentTracker>>,
    pub cloud: Arc<dyn CloudProvider>,
    pub kube: Arc<dyn KubeAccess>,
    pub report_store: Arc<dyn ReportStore>,
    pub network_verifier: Arc<dyn NetworkVerifier>,
}

/// The bundle handed to an investigation. Lives for exactly one run.
pub struct Resources {
    pub cluster: Arc<Cluster>,
    pub cluster_deployment: Option<Arc<ClusterDeployment>>,
    pub cloud_client: Option<Arc<dyn CloudClient>>,
    pub kube_config: Option<kube::Config>,
    pub management_client: Option<kube::Client>,
    pub network_verifier: Option<Arc<dyn NetworkVerifier>>,
    pub limited_support_reasons: Option<Vec<LimitedSupportReason>>,
    pub hcp_namespace: Option<String>,
    pub notes: Arc<Mutex<NoteWriter>>,
    pub payload: Option<AlertPayload>,
}

impl Resources {
    pub fn cluster_deployment(&self) -> Result<&ClusterDeployment, TriageError> {
        self.cluster_deployment.as_deref().ok_or_else(|| {
            TriageError::internal("cluster deployment was not requested by this investigation")
        })
    }

    pub fn cloud_client(&self) -> Result<&Arc<dyn CloudClient>, TriageError> {
        self.cloud_client.as_ref().ok_or_else(|| {
            TriageError::internal("cloud client was not requested by this investigation")
        })
    }

    pub fn network_verifier(&self) -> Result<&Arc<dyn NetworkVerifier>, TriageError> {
        self.network_verifier.as_ref().ok_or_else(|| {
            TriageError::internal("network verifier was not requested by this investigation")
        })
    }

    pub fn limited_support_reasons(&self) -> Result<&[LimitedSupportReason], TriageError> {
        self.limited_support_reasons.as_deref().ok_or_else(|| {
            TriageError::internal("limited-support reasons were not requested by this investigation")
        })
    }
}

/// Composable, idempotent builder for [`Resources`].
pub struct ResourceBuilder<'a> {
    services: &'a Services,
    external_cluster_id: String,
    investigation_name: String,
    request: ResourceRequest,
    payload: Option<AlertPayload>,
    known_cluster: Option<Arc<Cluster>>,
}

impl<'a> ResourceBuilder<'a> {
    #[must_use]
    pub fn new(
        services: &'a Services,
        external_cluster_id: impl Into<String>,
        investigation_name: impl Into<String>,
    ) -> Self {
        Self {
            services,
            external_cluster_id: external_cluster_id.into(),
            investigation_name: investigation_name.into(),
            request: ResourceRequest::cluster_only(),
            payload: None,
            known_cluster: None,
        }
    }

    /// Merges a request declared by an investigation; flags only ever turn
    /// on, so repeated calls are idempotent.
    #[must_use]
    pub fn with_request(mut self, request: ResourceRequest) -> Self {
        self.request.cluster |= request.cluster;
        self.request.cluster_deployment |= request.cluster_deployment;
        self.request.cloud_client |= request.cloud_client;
        self.request.kube_config |= request.kube_config;
        self.request.network_verifier |= request.network_verifier;
        self.request.limited_support_reasons |= request.limited_support_reasons;
        self
    }

    #[must_use]
    pub fn with_cluster_deployment(self) -> Self {
        let request = self.request.with_cluster_deployment();
        self.with_request(request)
    }

    #[must_use]
    pub fn with_cloud_client(self) -> Self {
        let request = self.request.with_cloud_client();
        self.with_request(request)
    }

    #[must_use]
    pub fn with_kube_config(self) -> Self {
        let request = self.request.with_kube_config();
        self.with_request(request)
    }

    #[must_use]
    pub fn with_payload(mut self, payload: AlertPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Seeds the cluster cache with an already-fetched record so a re-build
    /// in the same run does not fetch it again.
    #[must_use]
    pub fn with_known_cluster(mut self, cluster: Arc<Cluster>) -> Self {
        self.known_cluster = Some(cluster);
        self
    }

    /// Assembles the bundle, fail-fast: on any error nothing is returned.
    pub async fn build(self) -> Result<Resources, TriageError> {
        let Self {
            services,
            external_cluster_id,
            investigation_name,
            request,
            payload,
            known_cluster,
        } = self;

        let cluster = match known_cluster {
            Some(cluster) => cluster,
            None => Arc::new(
                services
                    .cluster_mgmt
                    .cluster_by_external_id(&external_cluster_id)
                    .await
                    .map_err(|source| {
                        TriageError::infrastructure(
                            format!("fetching cluster '{external_cluster_id}'"),
                            source,
                        )
                    })?,
            ),
        };

        let limited_support_reasons = if request.limited_support_reasons {
            Some(
                services
                    .cluster_mgmt
                    .limited_support_reasons(&cluster.internal_id)
                    .await
                    .map_err(|source| {
                        TriageError::infrastructure("fetching limited-support reasons", source)
                    })?,
            )
        } else {
            None
        };

        let cluster_deployment = if request.cluster_deployment {
            Some(Arc::new(
                services
                    .cluster_mgmt
                    .cluster_deployment(&cluster.internal_id)
                    .await
                    .map_err(|source| {
                        TriageError::infrastructure("fetching cluster deployment", source)
                    })?,
            ))
        } else {
            None
        };

        let cloud_client = if request.cloud_client {
            Some(services.cloud.customer_client(&cluster).await?)
        } else {
            None
        };

        let (kube_config, management_client) = if request.kube_config {
            let config = services.kube.rest_config(&cluster.internal_id).await?;
            let management = if cluster.is_hcp() {
                Some(
                    services
                        .kube
                        .management_client(&cluster.internal_id)
                        .await
                        .map_err(|err| match err {
                            TriageError::Infrastructure { context, source } => {
                                TriageError::Infrastructure {
                                    context: format!(
                                        "management cluster access for hosted control plane: {context}"
                                    ),
                                    source,
                                }
                            }
                            other => other,
                        })?,
                )
            } else {
                None
            };
            (Some(config), management)
        } else {
            (None, None)
        };

        let network_verifier = request
            .network_verifier
            .then(|| Arc::clone(&services.network_verifier));

        let hcp_namespace = payload
            .as_ref()
            .and_then(|payload| payload.hcp_namespace.clone());

        debug!(
            investigation = %investigation_name,
            cluster = %cluster.internal_id,
            deployment = cluster_deployment.is_some(),
            cloud = cloud_client.is_some(),
            kube = kube_config.is_some(),
            "resource bundle assembled"
        );

        Ok(Resources {
            cluster,
            cluster_deployment,
            cloud_client,
            kube_config,
            management_client,
            network_verifier,
            limited_support_reasons,
            hcp_namespace,
            notes: Arc::new(Mutex::new(NoteWriter::new(investigation_name))),
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testutil::{FakeServices, cluster_fixture};

    #[tokio::test]
    async fn build_fetches_the_cluster_exactly_once() {
        let fake = FakeServices::new(cluster_fixture());
        let services = fake.services();

        let resources = ResourceBuilder::new(&services, "ext-1", "chgm")
            .with_cluster_deployment()
            .with_cluster_deployment()
            .build()
            .await
            .expect("bundle builds");

        assert_eq!(resources.cluster.external_id, "ext-1");
        assert_eq!(fake.cluster_fetches(), 1);
        assert_eq!(fake.deployment_fetches(), 1);
    }

    #[tokio::test]
    async fn known_cluster_skips_the_fetch() {
        let fake = FakeServices::new(cluster_fixture());
        let services = fake.services();

        let resources = ResourceBuilder::new(&services, "ext-1", "ccam")
            .with_known_cluster(Arc::new(cluster_fixture()))
            .build()
            .await
            .expect("bundle builds");

        assert_eq!(fake.cluster_fetches(), 0);
        assert!(resources.cluster_deployment.is_none());
    }

    #[tokio::test]
    async fn credentials_missing_fails_the_whole_build() {
        let fake = FakeServices::new(cluster_fixture()).with_credentials_missing();
        let services = fake.services();

        let err = ResourceBuilder::new(&services, "ext-1", "chgm")
            .with_cloud_client()
            .build()
            .await
            .expect_err("chain denial must fail the build");

        assert!(err.is_credentials_missing());
    }

    #[tokio::test]
    async fn hcp_cluster_requesting_kube_gets_a_management_client() {
        let mut cluster = cluster_fixture();
        cluster.product = crate::cluster::Product::Hcp;
        let fake = FakeServices::new(cluster);
        let services = fake.services();

        let resources = ResourceBuilder::new(&services, "ext-1", "hcp-check")
            .with_kube_config()
            .build()
            .await
            .expect("bundle builds");

        assert!(resources.kube_config.is_some());
        assert!(resources.management_client.is_some());
    }

    #[tokio::test]
    async fn classic_cluster_requesting_kube_gets_no_management_client() {
        let fake = FakeServices::new(cluster_fixture());
        let services = fake.services();

        let resources = ResourceBuilder::new(&services, "ext-1", "classic-check")
            .with_kube_config()
            .build()
            .await
            .expect("bundle builds");

        assert!(resources.kube_config.is_some());
        assert!(resources.management_client.is_none());
    }

    #[tokio::test]
    async fn missing_resource_accessors_are_internal_errors() {
        let fake = FakeServices::new(cluster_fixture());
        let services = fake.services();

        let resources = ResourceBuilder::new(&services, "ext-1", "chgm")
            .build()
            .await
            .expect("bundle builds");

        assert!(matches!(
            resources.cloud_client(),
            Err(TriageError::Internal { .. })
        ));
        assert!(matches!(
            resources.cluster_deployment(),
            Err(TriageError::Internal { .. })
        ));
    }
}
