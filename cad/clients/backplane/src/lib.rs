//! Backplane gateway adapter: structured cluster-report uploads and
//! Kubernetes API access to customer and management clusters. All requests
//! authenticate with the cluster-management session token.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use cad_core::{
    capabilities::{AccessTokenSource, KubeAccess, ReportStore},
    errors::{DynError, TriageError},
};

#[derive(Debug, Error)]
pub enum BackplaneError {
    #[error("backplane request failed: {source}")]
    Http {
        #[from]
        source: reqwest::Error,
    },
    #[error("backplane returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("invalid backplane configuration: {0}")]
    Config(String),
    #[error("fetching the session token: {source}")]
    Token { source: DynError },
}

#[derive(Debug, Serialize)]
struct ReportUpload<'a> {
    cluster_id: &'a str,
    summary: &'a str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct ReportReceipt {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ProxyTarget {
    proxy_uri: String,
}

/// Gateway client; one instance per process.
pub struct BackplaneClient {
    http: reqwest::Client,
    base_url: Url,
    proxy_url: Option<String>,
    token_source: Arc<dyn AccessTokenSource>,
}

impl BackplaneClient {
    pub fn new(
        base_url: &str,
        proxy_url: Option<String>,
        token_source: Arc<dyn AccessTokenSource>,
    ) -> Result<Self, BackplaneError> {
        let mut builder = reqwest::Client::builder();
        if let Some(proxy) = proxy_url.as_deref() {
            builder = builder.proxy(
                reqwest::Proxy::all(proxy).map_err(|err| BackplaneError::Config(err.to_string()))?,
            );
        }
        Ok(Self {
            http: builder
                .build()
                .map_err(|err| BackplaneError::Config(err.to_string()))?,
            base_url: Url::parse(base_url).map_err(|err| BackplaneError::Config(err.to_string()))?,
            proxy_url,
            token_source,
        })
    }

    async fn token(&self) -> Result<String, BackplaneError> {
        self.token_source
            .access_token()
            .await
            .map_err(|source| BackplaneError::Token { source })
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackplaneError> {
        self.base_url
            .join(path)
            .map_err(|err| BackplaneError::Config(err.to_string()))
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, BackplaneError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(BackplaneError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn proxy_target(&self, path: &str) -> Result<ProxyTarget, BackplaneError> {
        let url = self.endpoint(path)?;
        let token = self.token().await?;
        let response = self.http.get(url).bearer_auth(token).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// Builds a rest config pointed at a gateway proxy path.
    async fn config_for(&self, path: &str) -> Result<kube::Config, TriageError> {
        let target = self.proxy_target(path).await.map_err(|err| {
            TriageError::infrastructure("resolving the cluster proxy target", Box::new(err))
        })?;

        let cluster_url = format!(
            "{}{}",
            self.base_url.as_str().trim_end_matches('/'),
            target.proxy_uri
        );
        let uri: http::Uri = cluster_url.parse().map_err(|err| {
            TriageError::internal(format!("gateway returned an invalid proxy uri: {err}"))
        })?;

        let token = self
            .token()
            .await
            .map_err(|err| TriageError::infrastructure("fetching the session token", Box::new(err)))?;

        let mut config = kube::Config::new(uri);
        config.auth_info.token = Some(token.into());
        if let Some(proxy) = self.proxy_url.as_deref() {
            config.proxy_url = Some(proxy.parse().map_err(|err| {
                TriageError::internal(format!("invalid backplane proxy url: {err}"))
            })?);
        }
        debug!(path, "built rest config through the gateway");
        Ok(config)
    }
}

#[async_trait]
impl ReportStore for BackplaneClient {
    async fn upload_report(
        &self,
        cluster_id: &str,
        summary: &str,
        data: &[u8],
    ) -> Result<String, DynError> {
        let url = self.endpoint(&format!("/backplane/cluster/{cluster_id}/reports"))?;
        let token = self.token().await?;
        let body = ReportUpload {
            cluster_id,
            summary,
            data: base64::engine::general_purpose::STANDARD.encode(data),
        };
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(BackplaneError::from)?;
        let receipt: ReportReceipt = BackplaneClient::check(response).await?.json().await?;
        info!(cluster_id, report_id = %receipt.id, "cluster report uploaded");
        Ok(receipt.id)
    }
}

#[async_trait]
impl KubeAccess for BackplaneClient {
    async fn rest_config(&self, cluster_id: &str) -> Result<kube::Config, TriageError> {
        self.config_for(&format!("/backplane/cluster/{cluster_id}"))
            .await
    }

    async fn management_client(&self, cluster_id: &str) -> Result<kube::Client, TriageError> {
        let config = self
            .config_for(&format!("/backplane/managementcluster/{cluster_id}"))
            .await?;
        kube::Client::try_from(config).map_err(|err| {
            TriageError::infrastructure("building the management cluster client", Box::new(err))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_upload_body_encodes_the_data() {
        let body = ReportUpload {
            cluster_id: "int-1",
            summary: "node dump",
            data: base64::engine::general_purpose::STANDARD.encode(b"{\"nodes\":[]}"),
        };
        let encoded = serde_json::to_value(&body).expect("serialises");
        assert_eq!(encoded["cluster_id"], "int-1");
        assert_eq!(encoded["data"], "eyJub2RlcyI6W119");
    }
}
