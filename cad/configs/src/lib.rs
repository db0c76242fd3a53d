//! Structured configuration records assembled from the environment at
//! startup. Nothing in here reads the environment after construction; the
//! records are passed down explicitly.

use thiserror::Error;

pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    MissingVar(&'static str),
}

/// Cluster-management service credentials and endpoint.
#[derive(Clone, Debug)]
pub struct OcmConfig {
    pub client_id: String,
    pub client_secret: String,
    pub url: String,
}

impl OcmConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            client_id: cad_env::ocm_client_id()
                .ok_or(ConfigError::MissingVar("CAD_OCM_CLIENT_ID"))?,
            client_secret: cad_env::ocm_client_secret()
                .ok_or(ConfigError::MissingVar("CAD_OCM_CLIENT_SECRET"))?,
            url: cad_env::ocm_url().ok_or(ConfigError::MissingVar("CAD_OCM_URL"))?,
        })
    }
}

/// Incident-tracker access. Required for webhook runs; manual runs operate
/// without an incident and may omit it.
#[derive(Clone, Debug)]
pub struct PagerDutyConfig {
    pub token: String,
    pub silent_policy: String,
    pub escalation_policy: String,
}

impl PagerDutyConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            token: cad_env::pagerduty_token().ok_or(ConfigError::MissingVar("CAD_PD_TOKEN"))?,
            silent_policy: cad_env::silent_policy()
                .ok_or(ConfigError::MissingVar("CAD_SILENT_POLICY"))?,
            escalation_policy: cad_env::escalation_policy()
                .ok_or(ConfigError::MissingVar("CAD_ESCALATION_POLICY"))?,
        })
    }

    /// Present only when the token is configured; missing policy ids with a
    /// present token are still a hard error.
    pub fn from_env_optional() -> Result<Option<Self>, ConfigError> {
        if cad_env::pagerduty_token().is_none() {
            return Ok(None);
        }
        Self::from_env().map(Some)
    }
}

/// Backplane gateway access used for the report store, Kubernetes access,
/// and the start of the cloud credential chain.
#[derive(Clone, Debug)]
pub struct BackplaneConfig {
    pub url: String,
    pub proxy_url: Option<String>,
    pub initial_arn: String,
}

impl BackplaneConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: cad_env::backplane_url().ok_or(ConfigError::MissingVar("BACKPLANE_URL"))?,
            proxy_url: cad_env::backplane_proxy_url(),
            initial_arn: cad_env::backplane_initial_arn()
                .ok_or(ConfigError::MissingVar("BACKPLANE_INITIAL_ARN"))?,
        })
    }
}

/// Role ARNs and proxy for the customer-account credential chain. The jump
/// role is the backplane initial principal; the support role is configured
/// separately.
#[derive(Clone, Debug)]
pub struct CloudConfig {
    pub jump_role_arn: String,
    pub support_role_arn: String,
    pub proxy_url: Option<String>,
}

impl CloudConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            jump_role_arn: cad_env::backplane_initial_arn()
                .ok_or(ConfigError::MissingVar("BACKPLANE_INITIAL_ARN"))?,
            support_role_arn: cad_env::aws_support_role_arn()
                .ok_or(ConfigError::MissingVar("CAD_AWS_SUPPORT_ROLE_ARN"))?,
            proxy_url: cad_env::cloud_proxy_url(),
        })
    }
}

/// Everything a CAD process needs, assembled once at startup.
#[derive(Clone, Debug)]
pub struct CadConfig {
    pub ocm: OcmConfig,
    pub pagerduty: Option<PagerDutyConfig>,
    pub backplane: BackplaneConfig,
    pub cloud: CloudConfig,
    pub experimental_enabled: bool,
    pub pipeline_name: Option<String>,
    pub log_level: String,
}

impl CadConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            ocm: OcmConfig::from_env()?,
            pagerduty: PagerDutyConfig::from_env_optional()?,
            backplane: BackplaneConfig::from_env()?,
            cloud: CloudConfig::from_env()?,
            experimental_enabled: cad_env::experimental_enabled(),
            pipeline_name: cad_env::pipeline_name(),
            log_level: cad_env::log_level().unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_owned()),
        })
    }

    /// Webhook runs must be able to reach the incident tracker.
    pub fn require_pagerduty(&self) -> Result<&PagerDutyConfig, ConfigError> {
        self.pagerduty
            .as_ref()
            .ok_or(ConfigError::MissingVar("CAD_PD_TOKEN"))
    }
}
