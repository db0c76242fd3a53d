//! The fixed role-assumption sequence producing a customer-scoped cloud
//! client: CAD principal → jump role → support role → per-cluster customer
//! role. The chain itself is never retried; the SDK retries individual
//! calls per its own policy.

use std::sync::Arc;

use async_trait::async_trait;
use aws_config::{Region, SdkConfig};
use aws_sdk_sts::error::ProvideErrorMetadata as _;
use chrono::{DateTime, TimeZone, Utc};
use tracing::{debug, info};

use cad_core::{
    capabilities::{CloudClient, CloudProvider, ClusterMgmt},
    cluster::Cluster,
    errors::{CREDENTIALS_MISSING_MARKER, TriageError},
};

use crate::client::AwsCloudClient;

const SESSION_NAME: &str = "CAD";

/// Short-lived credentials produced by one assume-role step. Never
/// persisted.
#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub region: String,
    pub expires_at: DateTime<Utc>,
}

impl Credentials {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Secrets stay out of the logs.
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("region", &self.region)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// The two fixed role ARNs the chain starts from.
#[derive(Clone, Debug)]
pub struct ChainConfig {
    pub jump_role_arn: String,
    pub support_role_arn: String,
}

/// Which link of the chain an assume-role failure belongs to; only the
/// customer link maps plain access denials to the credentials-missing
/// signal.
#[derive(Clone, Copy, Debug)]
enum ChainLink {
    Jump,
    Support,
    Customer,
}

impl ChainLink {
    const fn describe(self) -> &'static str {
        match self {
            Self::Jump => "assuming the jump role",
            Self::Support => "assuming the support role",
            Self::Customer => "assuming the customer support role",
        }
    }
}

/// Builds customer-scoped cloud clients through the role chain. One
/// instance serves the whole run; nothing is cached across runs.
pub struct AwsCredentialChain {
    base: SdkConfig,
    config: ChainConfig,
    cluster_mgmt: Arc<dyn ClusterMgmt>,
}

impl AwsCredentialChain {
    #[must_use]
    pub fn new(base: SdkConfig, config: ChainConfig, cluster_mgmt: Arc<dyn ClusterMgmt>) -> Self {
        Self {
            base,
            config,
            cluster_mgmt,
        }
    }

    fn sts_for(&self, credentials: Option<&Credentials>, region: &str) -> aws_sdk_sts::Client {
        let mut builder =
            aws_sdk_sts::config::Builder::from(&self.base).region(Region::new(region.to_owned()));
        if let Some(credentials) = credentials {
            builder = builder.credentials_provider(aws_credential_types::Credentials::new(
                credentials.access_key_id.clone(),
                credentials.secret_access_key.clone(),
                Some(credentials.session_token.clone()),
                None,
                "cad-credential-chain",
            ));
        }
        aws_sdk_sts::Client::from_conf(builder.build())
    }

    async fn assume(
        &self,
        sts: &aws_sdk_sts::Client,
        role_arn: &str,
        region: &str,
        link: ChainLink,
    ) -> Result<Credentials, TriageError> {
        debug!(role_arn, ?link, "assuming role");
        let output = sts
            .assume_role()
            .role_arn(role_arn)
            .role_session_name(SESSION_NAME)
            .send()
            .await
            .map_err(|err| classify_assume_failure(link, &err.to_string(), err.code(), err.message()))?;

        let credentials = output.credentials().ok_or_else(|| {
            TriageError::internal(format!(
                "assume-role for '{role_arn}' returned no credentials"
            ))
        })?;

        let expiration = credentials.expiration();
        let expires_at = Utc
            .timestamp_opt(expiration.secs(), expiration.subsec_nanos())
            .single()
            .unwrap_or_else(Utc::now);

        Ok(Credentials {
            access_key_id: credentials.access_key_id().to_owned(),
            secret_access_key: credentials.secret_access_key().to_owned(),
            session_token: credentials.session_token().to_owned(),
            region: region.to_owned(),
            expires_at,
        })
    }
}

fn classify_assume_failure(
    link: ChainLink,
    rendered: &str,
    code: Option<&str>,
    message: Option<&str>,
) -> TriageError {
    let message = message.unwrap_or(rendered);
    if message.contains(CREDENTIALS_MISSING_MARKER) {
        return TriageError::credentials_missing(message.to_owned());
    }
    if matches!(link, ChainLink::Customer) && code == Some("AccessDenied") {
        return TriageError::credentials_missing(format!(
            "{}: {message}",
            CREDENTIALS_MISSING_MARKER
        ));
    }
    TriageError::infrastructure(link.describe().to_owned(), message.to_owned())
}

#[async_trait]
impl CloudProvider for AwsCredentialChain {
    async fn customer_client(
        &self,
        cluster: &Cluster,
    ) -> Result<Arc<dyn CloudClient>, TriageError> {
        let region = &cluster.region;

        let base_sts = self.sts_for(None, region);
        let jump = self
            .assume(&base_sts, &self.config.jump_role_arn, region, ChainLink::Jump)
            .await?;

        let jump_sts = self.sts_for(Some(&jump), region);
        let support = self
            .assume(
                &jump_sts,
                &self.config.support_role_arn,
                region,
                ChainLink::Support,
            )
            .await?;

        let customer_role_arn = self
            .cluster_mgmt
            .support_role_arn(&cluster.internal_id)
            .await
            .map_err(|source| {
                TriageError::infrastructure("fetching the customer support-role ARN", source)
            })?;
        if customer_role_arn.is_empty() {
            return Err(TriageError::validation(format!(
                "cluster '{}' has no customer support-role ARN configured",
                cluster.internal_id
            )));
        }

        let support_sts = self.sts_for(Some(&support), region);
        let customer = self
            .assume(&support_sts, &customer_role_arn, region, ChainLink::Customer)
            .await?;

        info!(
            cluster = %cluster.internal_id,
            region = %region,
            expires_at = %customer.expires_at,
            "customer-account credentials established"
        );
        Ok(Arc::new(AwsCloudClient::from_credentials(
            &self.base, &customer,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_message_is_credentials_missing_on_every_link() {
        for link in [ChainLink::Jump, ChainLink::Support, ChainLink::Customer] {
            let err = classify_assume_failure(
                link,
                "AccessDenied: failed to assume into support-role",
                Some("AccessDenied"),
                Some("AccessDenied: failed to assume into support-role"),
            );
            assert!(err.is_credentials_missing(), "{link:?}");
        }
    }

    #[test]
    fn customer_link_access_denied_is_credentials_missing() {
        let err = classify_assume_failure(
            ChainLink::Customer,
            "service error",
            Some("AccessDenied"),
            Some("User is not authorized to perform sts:AssumeRole"),
        );
        assert!(err.is_credentials_missing());
    }

    #[test]
    fn other_failures_stay_infrastructure() {
        let err = classify_assume_failure(
            ChainLink::Jump,
            "service error",
            Some("Throttling"),
            Some("Rate exceeded"),
        );
        assert!(matches!(err, TriageError::Infrastructure { .. }));
    }
}
