//! Cloud adapter: the customer-account role-assumption chain and the
//! read-only EC2/CloudTrail surface the investigations depend on.

mod chain;
mod client;
mod verifier;

pub use chain::{AwsCredentialChain, ChainConfig, Credentials};
pub use client::AwsCloudClient;
pub use verifier::EgressVerifier;
