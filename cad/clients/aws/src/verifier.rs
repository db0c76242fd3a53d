//! Egress verification: probes the endpoints a cluster must reach during
//! installation and reports the ones that are blocked.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use cad_core::{
    capabilities::{NetworkVerifier, VerifierOutcome},
    cluster::{Cluster, ClusterDeployment},
    errors::TriageError,
};

/// Endpoints every installation must be able to reach.
const REQUIRED_ENDPOINTS: &[&str] = &[
    "https://quay.io",
    "https://registry.redhat.io",
    "https://api.openshift.com",
    "https://sso.redhat.com",
];

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const PROBE_ATTEMPTS: u32 = 2;

/// HTTP-reachability verifier over the required endpoint set.
pub struct EgressVerifier {
    http: reqwest::Client,
    endpoints: Vec<String>,
}

impl EgressVerifier {
    pub fn new() -> Result<Self, TriageError> {
        let http = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .map_err(|err| {
                TriageError::internal(format!("building the egress probe client: {err}"))
            })?;
        Ok(Self {
            http,
            endpoints: REQUIRED_ENDPOINTS.iter().map(|s| (*s).to_owned()).collect(),
        })
    }

    #[must_use]
    pub fn with_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.endpoints = endpoints;
        self
    }

    async fn reachable(&self, endpoint: &str) -> bool {
        for attempt in 1..=PROBE_ATTEMPTS {
            match self.http.get(endpoint).send().await {
                Ok(_) => return true,
                Err(err) => {
                    debug!(%endpoint, attempt, error = %err, "egress probe failed");
                }
            }
        }
        false
    }
}

#[async_trait]
impl NetworkVerifier for EgressVerifier {
    async fn verify_egress(
        &self,
        cluster: &Cluster,
        deployment: &ClusterDeployment,
    ) -> Result<VerifierOutcome, TriageError> {
        info!(
            cluster = %cluster.internal_id,
            infra_id = %deployment.infra_id,
            endpoints = self.endpoints.len(),
            "running egress verification"
        );

        let mut failures = Vec::new();
        for endpoint in &self.endpoints {
            if !self.reachable(endpoint).await {
                let host = endpoint
                    .strip_prefix("https://")
                    .unwrap_or(endpoint.as_str());
                failures.push(format!("egress blocked to {host}"));
            }
        }

        if failures.is_empty() {
            Ok(VerifierOutcome::Passed)
        } else {
            Ok(VerifierOutcome::Failures(failures))
        }
    }
}
