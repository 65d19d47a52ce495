//! Newtype domain identifiers.
//!
//! Names that travel between the request, the allowlist, and the remote
//! repository are wrapped in distinct newtypes, so a [`BranchName`] cannot be
//! passed where a [`FilePath`] or a [`VersionToken`] is expected.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub(crate) String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers: integer-backed
// ---------------------------------------------------------------------------

/// Identifies a pull request by the number GitHub assigned to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PullRequestNumber(u64);

impl PullRequestNumber {
    /// Creates a new identifier from a raw integer.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the underlying integer value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for PullRequestNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Identifiers: string-backed (Git names)
// ---------------------------------------------------------------------------

string_id! {
    /// A Git branch name (e.g. `"main"`, `"repo-ingestion-feature-1"`).
    BranchName
}

impl BranchName {
    /// Appends `suffix`; the result is non-empty because `self` is.
    pub fn with_suffix(&self, suffix: &str) -> Self {
        Self(format!("{}{suffix}", self.0))
    }
}

string_id! {
    /// A Git commit SHA (40-character lowercase hex string).
    CommitSha
}

string_id! {
    /// A file path relative to the repository root.
    FilePath
}

string_id! {
    /// An opaque value identifying one content revision of a file blob.
    ///
    /// Supplied back to the remote on update so that a write against a stale
    /// revision is rejected instead of silently overwriting a concurrent change.
    VersionToken
}

// ---------------------------------------------------------------------------
// Repository identifier
// ---------------------------------------------------------------------------

/// Identifies a GitHub repository in `"owner/name"` format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepositoryId(String);

impl RepositoryId {
    /// Parses an `owner/name` pair.
    ///
    /// Returns `None` unless the value has exactly one `/` with a non-empty
    /// segment on each side.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let v = value.into();
        match v.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
                Some(Self(v))
            }
            _ => None,
        }
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the owning user or organisation.
    pub fn owner(&self) -> &str {
        self.0.split_once('/').map_or("", |(owner, _)| owner)
    }

    /// Returns the repository name without its owner.
    pub fn name(&self) -> &str {
        self.0.split_once('/').map_or("", |(_, name)| name)
    }
}

impl TryFrom<String> for RepositoryId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value.clone()).ok_or_else(|| format!("'{value}' is not an owner/name pair"))
    }
}

impl From<RepositoryId> for String {
    fn from(value: RepositoryId) -> Self {
        value.0
    }
}

impl std::fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_id_splits_owner_and_name() {
        let repo = RepositoryId::new("WATonomous/infra-config").unwrap();
        assert_eq!(repo.owner(), "WATonomous");
        assert_eq!(repo.name(), "infra-config");
    }

    #[test]
    fn repository_id_rejects_malformed_values() {
        assert!(RepositoryId::new("no-slash").is_none());
        assert!(RepositoryId::new("/name").is_none());
        assert!(RepositoryId::new("owner/").is_none());
        assert!(RepositoryId::new("a/b/c").is_none());
    }

    #[test]
    fn repository_id_deserialises_from_string() {
        let repo: RepositoryId = serde_json::from_str("\"acme/widgets\"").unwrap();
        assert_eq!(repo.as_str(), "acme/widgets");
        assert!(serde_json::from_str::<RepositoryId>("\"widgets\"").is_err());
    }

    #[test]
    fn empty_string_ids_are_rejected() {
        assert!(BranchName::new("").is_none());
        assert_eq!(FilePath::new("a.yaml").unwrap().as_str(), "a.yaml");
    }
}
