//! Concrete triage strategies and the default registry wiring.

pub mod ccam;
pub mod chgm;
pub mod cpd;

use std::sync::Arc;

use cad_core::investigation::{registry::DuplicateName, Registry};

pub use ccam::CloudCredentialsAreMissing;
pub use chgm::ClusterHasGoneMissing;
pub use cpd::ClusterProvisioningDelay;

/// The default investigation set, in selection-priority order.
pub fn registry() -> Result<Registry, DuplicateName> {
    let mut registry = Registry::new();
    registry.register(Arc::new(ClusterHasGoneMissing::default()))?;
    registry.register(Arc::new(ClusterProvisioningDelay))?;
    registry.register(Arc::new(CloudCredentialsAreMissing))?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_registers_every_investigation() {
        let registry = registry().expect("unique names");
        assert_eq!(registry.names(false), vec!["chgm", "cpd", "ccam"]);
    }

    #[test]
    fn chgm_is_selected_for_its_alert() {
        let registry = registry().expect("unique names");
        let selected = registry
            .select("ClusterHasGoneMissingSRE: cluster has gone missing", false)
            .expect("chgm matches");
        assert_eq!(selected.name(), "chgm");
    }

    #[test]
    fn ccam_is_never_selected_by_title() {
        let registry = registry().expect("unique names");
        assert!(registry.select("ccam", false).is_none());
    }
}
