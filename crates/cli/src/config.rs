//! Start-up configuration.
//!
//! Every option is a flag or an environment variable. Configuration is read
//! once; nothing here is consulted at request time.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use github::{GitHubAppTokenProvider, DEFAULT_API_URL};
use ingestion::{AllowList, StaticTokenProvider, TokenProvider};
use serde_json::Value;

/// Output format of the log layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Parser)]
#[command(name = "repo-ingestion")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Turns ingest payloads into pull requests", long_about = None)]
pub struct Args {
    /// JSON array of allow rules: [{"repo", "branch_suffix", "files": {"path", "content"}}].
    #[arg(long, env = "ALLOWED_INGEST_PAYLOADS", hide_env_values = true)]
    pub allowed_ingest_payloads: String,

    /// GitHub App id.
    #[arg(long, env = "GITHUB_APP_ID")]
    pub github_app_id: Option<u64>,

    /// GitHub App installation id.
    #[arg(long, env = "GITHUB_APP_INSTALLATION_ID")]
    pub github_app_installation_id: Option<u64>,

    /// Path to the GitHub App private key (PEM).
    #[arg(long, env = "GITHUB_APP_PRIVATE_KEY_PATH")]
    pub github_app_private_key_path: Option<PathBuf>,

    /// Static bearer token; replaces the App identity when set.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_API_URL)]
    pub github_api_url: String,

    /// Log filter directive (e.g. `info`, `reconciler=debug`).
    #[arg(long, env = "APP_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,

    #[arg(long, env = "BIND_ADDRESS", default_value = "0.0.0.0:8000")]
    pub bind_address: SocketAddr,

    /// Build metadata returned by `/build-info`.
    #[arg(long, env = "DOCKER_METADATA_OUTPUT_JSON")]
    pub docker_metadata_output_json: Option<String>,

    #[arg(long, env = "DEPLOYMENT_ENVIRONMENT", default_value = "unknown")]
    pub deployment_environment: String,

    /// OTLP collector endpoint; tracing export is off when unset.
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otel_exporter_otlp_endpoint: Option<String>,
}

/// How the service authenticates to GitHub.
#[derive(Debug, PartialEq, Eq)]
pub enum Credentials {
    Token,
    App {
        app_id: u64,
        installation_id: u64,
        private_key_path: PathBuf,
    },
}

impl Args {
    /// Compiles the allowlist; an invalid pattern fails start-up.
    pub fn allow_list(&self) -> Result<AllowList> {
        let allow_list = AllowList::from_json(&self.allowed_ingest_payloads)
            .context("invalid ALLOWED_INGEST_PAYLOADS")?;
        if allow_list.is_empty() {
            tracing::warn!("Allowlist is empty; every ingest request will be rejected");
        }
        Ok(allow_list)
    }

    pub fn build_info(&self) -> Result<Value> {
        match self.docker_metadata_output_json.as_deref() {
            None => Ok(Value::Object(Default::default())),
            Some(raw) => {
                serde_json::from_str(raw).context("invalid DOCKER_METADATA_OUTPUT_JSON")
            }
        }
    }

    /// Chooses between the static token and the App identity.
    pub fn credentials(&self) -> Result<Credentials> {
        if self.github_token.is_some() {
            return Ok(Credentials::Token);
        }
        match (
            self.github_app_id,
            self.github_app_installation_id,
            self.github_app_private_key_path.clone(),
        ) {
            (Some(app_id), Some(installation_id), Some(private_key_path)) => Ok(Credentials::App {
                app_id,
                installation_id,
                private_key_path,
            }),
            _ => bail!(
                "set GITHUB_TOKEN, or all of GITHUB_APP_ID, GITHUB_APP_INSTALLATION_ID and \
                 GITHUB_APP_PRIVATE_KEY_PATH"
            ),
        }
    }

    pub fn token_provider(&self) -> Result<Arc<dyn TokenProvider>> {
        match self.credentials()? {
            Credentials::Token => {
                let token = self.github_token.clone().unwrap_or_default();
                Ok(Arc::new(StaticTokenProvider::new(token)))
            }
            Credentials::App {
                app_id,
                installation_id,
                private_key_path,
            } => {
                let provider = GitHubAppTokenProvider::from_key_file(
                    app_id,
                    installation_id,
                    &private_key_path,
                    &self.github_api_url,
                )
                .context("cannot initialise GitHub App authentication")?;
                Ok(Arc::new(provider))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec![
            "repo-ingestion",
            "--allowed-ingest-payloads",
            r#"[{"repo": "acme/.*", "branch_suffix": ".*", "files": {"path": ".*", "content": ".*"}}]"#,
        ];
        argv.extend_from_slice(extra);
        let mut args = Args::try_parse_from(argv).unwrap();
        // Isolate from whatever the test environment exports.
        if !extra.contains(&"--github-token") {
            args.github_token = None;
        }
        args
    }

    #[test]
    fn static_token_wins_over_app_identity() {
        let args = args(&["--github-token", "ghp_x", "--github-app-id", "1"]);
        assert_eq!(args.credentials().unwrap(), Credentials::Token);
    }

    #[test]
    fn complete_app_identity_is_accepted() {
        let mut args = args(&[]);
        args.github_app_id = Some(1);
        args.github_app_installation_id = Some(2);
        args.github_app_private_key_path = Some(PathBuf::from("/keys/app.pem"));
        assert_eq!(
            args.credentials().unwrap(),
            Credentials::App {
                app_id: 1,
                installation_id: 2,
                private_key_path: PathBuf::from("/keys/app.pem"),
            }
        );
    }

    #[test]
    fn partial_app_identity_is_rejected() {
        let mut args = args(&[]);
        args.github_app_id = Some(1);
        args.github_app_installation_id = None;
        args.github_app_private_key_path = None;
        assert!(args.credentials().is_err());
    }

    #[test]
    fn allow_list_is_compiled() {
        assert_eq!(args(&[]).allow_list().unwrap().len(), 1);
    }

    #[test]
    fn invalid_allow_rule_pattern_fails_start_up() {
        let mut args = args(&[]);
        args.allowed_ingest_payloads =
            r#"[{"repo": "(", "branch_suffix": ".*", "files": {"path": ".*", "content": ".*"}}]"#
                .into();
        assert!(args.allow_list().is_err());
    }

    #[test]
    fn build_info_defaults_to_empty_object() {
        let mut args = args(&[]);
        args.docker_metadata_output_json = None;
        assert_eq!(args.build_info().unwrap(), serde_json::json!({}));

        args.docker_metadata_output_json = Some(r#"{"tags": ["v1"]}"#.into());
        assert_eq!(args.build_info().unwrap(), serde_json::json!({"tags": ["v1"]}));

        args.docker_metadata_output_json = Some("not json".into());
        assert!(args.build_info().is_err());
    }
}
