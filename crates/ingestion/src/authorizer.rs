//! Payload authorizer: the allowlist every request must satisfy.
//!
//! A rule is four regular expressions. A request is authorized when one
//! single rule matches its repository, its branch suffix, and the path and
//! content of every file it carries. Rules are never combined.
//!
//! Patterns are compiled when the allowlist is loaded. Each is anchored at the
//! start of its subject but not at the end, so `acme/.*` and `acme/` both
//! accept `acme/site`; append `$` for a full-string match.

use regex::Regex;
use serde::Deserialize;

use crate::{ConfigError, FileChange, IngestError, IngestRequest};

/// Wire shape of one rule in the `ALLOWED_INGEST_PAYLOADS` document.
#[derive(Debug, Clone, Deserialize)]
pub struct AllowRuleConfig {
    /// Pattern for `owner/name`.
    pub repo: String,
    /// Pattern for the branch suffix.
    pub branch_suffix: String,
    /// Patterns applied to every file.
    pub files: FilePatternConfig,
}

/// File-level patterns of an [`AllowRuleConfig`].
#[derive(Debug, Clone, Deserialize)]
pub struct FilePatternConfig {
    pub path: String,
    pub content: String,
}

/// A compiled allowlist rule.
#[derive(Debug, Clone)]
pub struct AllowRule {
    repository: Regex,
    branch_suffix: Regex,
    file_path: Regex,
    file_content: Regex,
}

impl AllowRule {
    /// Compiles the four patterns of `config`.
    ///
    /// `index` is the rule's position in the configured list and is only used
    /// to name the rule in errors.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPattern`] for the first pattern that does
    /// not compile.
    pub fn compile(index: usize, config: &AllowRuleConfig) -> Result<Self, ConfigError> {
        let compile = |field: &'static str, pattern: &str| {
            Regex::new(&format!("^(?:{pattern})")).map_err(|source| ConfigError::InvalidPattern {
                rule: index,
                field,
                source,
            })
        };

        Ok(Self {
            repository: compile("repo", &config.repo)?,
            branch_suffix: compile("branch_suffix", &config.branch_suffix)?,
            file_path: compile("files.path", &config.files.path)?,
            file_content: compile("files.content", &config.files.content)?,
        })
    }

    fn applies_to(&self, request: &IngestRequest) -> bool {
        self.repository.is_match(request.repository.as_str())
            && self.branch_suffix.is_match(&request.branch_suffix)
    }

    fn covers(&self, file: &FileChange) -> bool {
        self.file_path.is_match(file.path.as_str()) && self.file_content.is_match(&file.content)
    }
}

/// The ordered list of rules a request is checked against.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    rules: Vec<AllowRule>,
}

impl AllowList {
    /// Parses and compiles a JSON array of [`AllowRuleConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::AllowlistFormat`] when the document is not an
    /// array of rules, or [`ConfigError::InvalidPattern`] when a pattern does
    /// not compile.
    pub fn from_json(document: &str) -> Result<Self, ConfigError> {
        let configs: Vec<AllowRuleConfig> = serde_json::from_str(document)?;
        let rules = configs
            .iter()
            .enumerate()
            .map(|(index, config)| AllowRule::compile(index, config))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// Number of configured rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns `true` when no rule is configured; every request is rejected.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Checks `request` against the rules in order.
    ///
    /// The first rule that covers the whole request authorizes it. A rule
    /// whose repository and suffix patterns match but which rejects a file is
    /// remembered, and the first such file is named in the error if no later
    /// rule succeeds. When no rule applies at all, the error is generic.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Unauthorized`] when no rule covers the request.
    pub fn authorize(&self, request: &IngestRequest) -> Result<(), IngestError> {
        let mut first_violation: Option<String> = None;

        for (index, rule) in self.rules.iter().enumerate() {
            if !rule.applies_to(request) {
                continue;
            }
            match request.files.iter().find(|file| !rule.covers(file)) {
                None => {
                    tracing::debug!(rule = index, "Payload authorized");
                    return Ok(());
                }
                Some(file) => {
                    tracing::debug!(rule = index, path = %file.path, "File rejected by allowlist rule");
                    first_violation.get_or_insert_with(|| {
                        format!("file '{}' does not match allowlist rule {index}", file.path)
                    });
                }
            }
        }

        Err(IngestError::Unauthorized {
            reason: first_violation
                .unwrap_or_else(|| "payload does not match any allowlist rule".to_string()),
        })
    }
}
