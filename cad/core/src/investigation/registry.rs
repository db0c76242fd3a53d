//! Deterministic alert-title → investigation mapping.

use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use super::Investigation;

#[derive(Debug, Error)]
#[error("investigation '{name}' is already registered")]
pub struct DuplicateName {
    pub name: String,
}

/// Ordered set of investigations; registration order is the tie-breaker for
/// ambiguous title matches.
#[derive(Default)]
pub struct Registry {
    entries: Vec<Arc<dyn Investigation>>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, investigation: Arc<dyn Investigation>) -> Result<(), DuplicateName> {
        if self
            .entries
            .iter()
            .any(|existing| existing.name() == investigation.name())
        {
            return Err(DuplicateName {
                name: investigation.name().to_owned(),
            });
        }
        self.entries.push(investigation);
        Ok(())
    }

    /// Picks the investigation whose matcher accepts the title. The first
    /// registered match wins; further matches are logged, not raced.
    #[must_use]
    pub fn select(
        &self,
        alert_title: &str,
        experimental_enabled: bool,
    ) -> Option<Arc<dyn Investigation>> {
        let mut matches = self
            .entries
            .iter()
            .filter(|inv| experimental_enabled || !inv.is_experimental())
            .filter(|inv| inv.matches_alert(alert_title));

        let selected = matches.next()?;
        for shadowed in matches {
            warn!(
                alert_title,
                selected = selected.name(),
                shadowed = shadowed.name(),
                "alert title matches more than one investigation"
            );
        }
        Some(Arc::clone(selected))
    }

    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<Arc<dyn Investigation>> {
        self.entries
            .iter()
            .find(|inv| inv.name() == name)
            .map(Arc::clone)
    }

    /// Registered names, used by manual-mode help and metrics.
    #[must_use]
    pub fn names(&self, experimental_enabled: bool) -> Vec<&'static str> {
        self.entries
            .iter()
            .filter(|inv| experimental_enabled || !inv.is_experimental())
            .map(|inv| inv.name())
            .collect()
    }
}
