//! Cluster-management (OCM) adapter: OAuth2 client-credentials session plus
//! the handful of REST resources CAD reads and writes.

mod wire;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use cad_core::{
    capabilities::{
        AccessTokenSource, ClusterMgmt, LimitedSupportReason, ServiceLogEntry,
    },
    cluster::{Cluster, ClusterDeployment},
    errors::DynError,
};

use wire::{
    LimitedSupportList, LimitedSupportPost, LiveResources, MachinePoolList, ServiceLogList,
    ServiceLogPost, SupportRole, WireClusterList,
};

const DEFAULT_TOKEN_URL: &str =
    "https://sso.redhat.com/auth/realms/redhat-external/protocol/openid-connect/token";
const CLUSTERS_API: &str = "/api/clusters_mgmt/v1/clusters";
const SERVICE_LOGS_API: &str = "/api/service_logs/v1/cluster_logs";
const PAGE_SIZE: u32 = 100;

/// Refresh this long before the token actually expires.
const TOKEN_EXPIRY_SLACK_SECS: i64 = 60;

#[derive(Debug, Error)]
pub enum OcmError {
    #[error("cluster-management request failed: {source}")]
    Http {
        #[from]
        source: reqwest::Error,
    },
    #[error("cluster-management returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("no cluster with external id '{external_id}'")]
    ClusterNotFound { external_id: String },
    #[error("malformed cluster-management response: {context}")]
    Malformed { context: String },
    #[error("invalid cluster-management configuration: {0}")]
    Config(String),
}

struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// REST client holding one refreshing service-account session.
pub struct OcmClient {
    http: reqwest::Client,
    base_url: Url,
    token_url: Url,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<CachedToken>>,
}

impl OcmClient {
    pub fn new(
        url: &str,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self, OcmError> {
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: Url::parse(url).map_err(|err| OcmError::Config(err.to_string()))?,
            token_url: Url::parse(DEFAULT_TOKEN_URL)
                .map_err(|err| OcmError::Config(err.to_string()))?,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn with_token_url(mut self, token_url: Url) -> Self {
        self.token_url = token_url;
        self
    }

    async fn token(&self) -> Result<String, OcmError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Utc::now() {
                return Ok(token.access_token.clone());
            }
        }

        debug!("requesting a fresh cluster-management access token");
        let response = self
            .http
            .post(self.token_url.clone())
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;
        let token: TokenResponse = Self::check(response).await?.json().await?;

        let expires_at = Utc::now()
            + Duration::seconds((token.expires_in - TOKEN_EXPIRY_SLACK_SECS).max(0));
        let access_token = token.access_token.clone();
        *cached = Some(CachedToken {
            access_token: token.access_token,
            expires_at,
        });
        Ok(access_token)
    }

    fn endpoint(&self, path: &str) -> Result<Url, OcmError> {
        self.base_url
            .join(path)
            .map_err(|err| OcmError::Config(err.to_string()))
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, OcmError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(OcmError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, OcmError> {
        let token = self.token().await?;
        let response = self.http.get(url).bearer_auth(token).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn post_json<B: serde::Serialize>(&self, url: Url, body: &B) -> Result<(), OcmError> {
        let token = self.token().await?;
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn fetch_cluster(&self, external_id: &str) -> Result<Cluster, OcmError> {
        let mut url = self.endpoint(CLUSTERS_API)?;
        url.query_pairs_mut()
            .append_pair("search", &format!("external_id = '{external_id}'"))
            .append_pair("size", "1");
        let list: WireClusterList = self.get_json(url).await?;
        let wire = list
            .items
            .into_iter()
            .flatten()
            .next()
            .ok_or_else(|| OcmError::ClusterNotFound {
                external_id: external_id.to_owned(),
            })?;

        let mut cluster = wire.into_cluster()?;
        cluster.machine_pools = self.fetch_machine_pools(&cluster.internal_id).await?;
        Ok(cluster)
    }

    async fn fetch_machine_pools(
        &self,
        internal_id: &str,
    ) -> Result<Vec<cad_core::cluster::MachinePool>, OcmError> {
        let url = self.endpoint(&format!("{CLUSTERS_API}/{internal_id}/machine_pools"))?;
        let list: MachinePoolList = match self.get_json(url).await {
            Ok(list) => list,
            // Hosted control planes expose node pools instead; treat the
            // missing resource as an empty set.
            Err(OcmError::Api { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        };
        Ok(list
            .items
            .into_iter()
            .flatten()
            .map(wire::WireMachinePool::into_machine_pool)
            .collect())
    }

    async fn fetch_cluster_deployment(
        &self,
        internal_id: &str,
    ) -> Result<ClusterDeployment, OcmError> {
        let url = self.endpoint(&format!("{CLUSTERS_API}/{internal_id}/resources/live"))?;
        let live: LiveResources = self.get_json(url).await?;
        live.into_cluster_deployment()
    }
}

#[async_trait]
impl ClusterMgmt for OcmClient {
    async fn cluster_by_external_id(&self, external_id: &str) -> Result<Cluster, DynError> {
        let cluster = self.fetch_cluster(external_id).await?;
        info!(
            external_id,
            internal_id = %cluster.internal_id,
            state = %cluster.state,
            "fetched cluster record"
        );
        Ok(cluster)
    }

    async fn cluster_deployment(&self, internal_id: &str) -> Result<ClusterDeployment, DynError> {
        Ok(self.fetch_cluster_deployment(internal_id).await?)
    }

    async fn post_service_log(
        &self,
        internal_id: &str,
        entry: &ServiceLogEntry,
    ) -> Result<(), DynError> {
        let url = self.endpoint(SERVICE_LOGS_API)?;
        info!(internal_id, summary = %entry.summary, "posting service log");
        self.post_json(url, &ServiceLogPost::from_entry(internal_id, entry))
            .await?;
        Ok(())
    }

    async fn service_logs(&self, internal_id: &str) -> Result<Vec<ServiceLogEntry>, DynError> {
        let mut url = self.endpoint(SERVICE_LOGS_API)?;
        url.query_pairs_mut()
            .append_pair("search", &format!("cluster_id = '{internal_id}'"));
        let list: ServiceLogList = self.get_json(url).await?;
        Ok(list
            .items
            .into_iter()
            .flatten()
            .map(wire::WireServiceLog::into_entry)
            .collect())
    }

    async fn post_limited_support(
        &self,
        internal_id: &str,
        reason: &LimitedSupportReason,
    ) -> Result<(), DynError> {
        let url =
            self.endpoint(&format!("{CLUSTERS_API}/{internal_id}/limited_support_reasons"))?;
        info!(internal_id, summary = %reason.summary, "posting limited-support reason");
        self.post_json(url, &LimitedSupportPost::from_reason(reason))
            .await?;
        Ok(())
    }

    async fn limited_support_reasons(
        &self,
        internal_id: &str,
    ) -> Result<Vec<LimitedSupportReason>, DynError> {
        let url =
            self.endpoint(&format!("{CLUSTERS_API}/{internal_id}/limited_support_reasons"))?;
        let list: LimitedSupportList = self.get_json(url).await?;
        Ok(list
            .items
            .into_iter()
            .flatten()
            .map(wire::WireLimitedSupport::into_reason)
            .collect())
    }

    async fn support_role_arn(&self, internal_id: &str) -> Result<String, DynError> {
        let url = self.endpoint(&format!("{CLUSTERS_API}/{internal_id}/sts_support_jump_role"))?;
        let role: SupportRole = self.get_json(url).await?;
        Ok(role.role_arn)
    }

    async fn managed_clusters(&self, page: u32) -> Result<Vec<Cluster>, DynError> {
        let mut url = self.endpoint(CLUSTERS_API)?;
        url.query_pairs_mut()
            .append_pair("search", "managed = 'true'")
            .append_pair("page", &page.to_string())
            .append_pair("size", &PAGE_SIZE.to_string());
        let list: WireClusterList = self.get_json(url).await?;
        let clusters = list
            .items
            .into_iter()
            .flatten()
            .map(wire::WireCluster::into_cluster)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(clusters)
    }
}

#[async_trait]
impl AccessTokenSource for OcmClient {
    async fn access_token(&self) -> Result<String, DynError> {
        Ok(self.token().await?)
    }
}
