//! Engine settings that are fixed for the lifetime of the process.

use crate::{BranchName, ConfigError, SectionMarkers};

/// Prefix of every working branch the bot creates.
pub const DEFAULT_BRANCH_PREFIX: &str = "repo-ingestion-";

/// Naming and body-format settings shared by every reconcile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionSettings {
    branch_prefix: BranchName,
    markers: SectionMarkers,
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            branch_prefix: BranchName(DEFAULT_BRANCH_PREFIX.to_string()),
            markers: SectionMarkers::default(),
        }
    }
}

impl IngestionSettings {
    /// Creates settings with a custom branch prefix and markers.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `branch_prefix` is empty: without a
    /// prefix the bot could be asked to reconcile arbitrary branches.
    pub fn new(
        branch_prefix: impl Into<String>,
        markers: SectionMarkers,
    ) -> Result<Self, ConfigError> {
        let branch_prefix = BranchName::new(branch_prefix).ok_or_else(|| ConfigError::Invalid {
            message: "branch prefix must not be empty".to_string(),
        })?;
        Ok(Self {
            branch_prefix,
            markers,
        })
    }

    /// The managed-section markers.
    pub fn markers(&self) -> &SectionMarkers {
        &self.markers
    }

    /// The working branch for `suffix`. Deterministic: the same suffix always
    /// names the same branch.
    pub fn working_branch(&self, suffix: &str) -> BranchName {
        self.branch_prefix.with_suffix(suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn working_branch_is_prefix_plus_suffix() {
        let settings = IngestionSettings::default();
        assert_eq!(
            settings.working_branch("feature-1").as_str(),
            "repo-ingestion-feature-1"
        );
        assert_eq!(
            settings.working_branch("feature-1"),
            settings.working_branch("feature-1")
        );
    }

    #[test]
    fn empty_prefix_is_rejected() {
        assert!(IngestionSettings::new("", SectionMarkers::default()).is_err());
        assert!(IngestionSettings::new("bot/", SectionMarkers::default()).is_ok());
    }
}
