//! Raw environment-variable accessors. Variable names are part of the
//! deployment contract; structured configuration lives in `cad-configs`.

use std::env;

#[must_use]
pub fn ocm_client_id() -> Option<String> {
    env::var("CAD_OCM_CLIENT_ID").ok()
}

#[must_use]
pub fn ocm_client_secret() -> Option<String> {
    env::var("CAD_OCM_CLIENT_SECRET").ok()
}

#[must_use]
pub fn ocm_url() -> Option<String> {
    env::var("CAD_OCM_URL").ok()
}

#[must_use]
pub fn pagerduty_token() -> Option<String> {
    env::var("CAD_PD_TOKEN").ok()
}

#[must_use]
pub fn silent_policy() -> Option<String> {
    env::var("CAD_SILENT_POLICY").ok()
}

#[must_use]
pub fn escalation_policy() -> Option<String> {
    env::var("CAD_ESCALATION_POLICY").ok()
}

#[must_use]
pub fn backplane_url() -> Option<String> {
    env::var("BACKPLANE_URL").ok()
}

#[must_use]
pub fn backplane_proxy_url() -> Option<String> {
    env::var("BACKPLANE_PROXY_URL").ok()
}

#[must_use]
pub fn backplane_initial_arn() -> Option<String> {
    env::var("BACKPLANE_INITIAL_ARN").ok()
}

#[must_use]
pub fn aws_support_role_arn() -> Option<String> {
    env::var("CAD_AWS_SUPPORT_ROLE_ARN").ok()
}

#[must_use]
pub fn cloud_proxy_url() -> Option<String> {
    env::var("HTTPS_PROXY").ok()
}

#[must_use]
pub fn experimental_enabled() -> bool {
    env::var("CAD_EXPERIMENTAL_ENABLED").is_ok()
}

#[must_use]
pub fn pipeline_name() -> Option<String> {
    env::var("PIPELINE_NAME").ok()
}

#[must_use]
pub fn log_level() -> Option<String> {
    env::var("LOG_LEVEL").ok()
}

#[must_use]
pub fn acm_hcp_must_gather_image() -> Option<String> {
    env::var("CAD_ACM_HCP_MUST_GATHER_IMAGE").ok()
}
