//! Run configuration.
//!
//! [`AgentConfig`] is built once at startup and passed explicitly to every
//! component. [`AgentConfig::from_lookup`] reads variables through a closure
//! so tests can inject values without touching the process environment.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::error::{AgentError, Result};

/// Default model requested from the provider.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Default OpenAI-compatible API base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";

/// Artifact location relative to the working-tree root.
pub const DEFAULT_ARTIFACT_PATH: &str = ".harness/pipeline.yaml";

pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_REMOTE: &str = "origin";
pub const DEFAULT_COMMIT_MESSAGE: &str = "Autogen update: Harness pipeline";

/// Task sent to the model on every run.
pub const DEFAULT_TASK: &str = "\
Generate a Harness.io pipeline YAML file for deploying a static HTML site.
Requirements:
1. Pipeline should have a build-and-deploy stage.
2. It should checkout code from GitHub.
3. Run a simple shell step that ensures index.html exists.
4. Push changes to GitHub main branch.
Return only valid YAML content (no markdown).
";

pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_MODEL: &str = "OPENAI_MODEL";
pub const ENV_API_BASE_URL: &str = "OPENAI_BASE_URL";
pub const ENV_REPO: &str = "HARNESS_AGENT_REPO";
pub const ENV_REMOTE_URL: &str = "HARNESS_AGENT_REMOTE_URL";
pub const ENV_REMOTE: &str = "HARNESS_AGENT_REMOTE";
pub const ENV_BRANCH: &str = "HARNESS_AGENT_BRANCH";
pub const ENV_ARTIFACT: &str = "HARNESS_AGENT_ARTIFACT";
pub const ENV_COMMIT_MESSAGE: &str = "HARNESS_AGENT_COMMIT_MESSAGE";
pub const ENV_AUTHOR_NAME: &str = "HARNESS_AGENT_GIT_AUTHOR_NAME";
pub const ENV_AUTHOR_EMAIL: &str = "HARNESS_AGENT_GIT_AUTHOR_EMAIL";
pub const ENV_TIMEOUT_SECS: &str = "HARNESS_AGENT_TIMEOUT_SECS";

/// Author identity used for the publish commit when git config has none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
}

impl CommitIdentity {
    pub fn new(name: &str, email: &str) -> Self {
        CommitIdentity {
            name: name.to_string(),
            email: email.to_string(),
        }
    }
}

/// Everything a run needs, resolved up front.
#[derive(Clone)]
pub struct AgentConfig {
    /// Provider credential. Never logged.
    pub api_key: String,
    /// Model identifier
    pub model: String,
    /// OpenAI-compatible API base URL (no trailing `/chat/completions`)
    pub api_base_url: String,
    /// Optional timeout for the generation request
    pub request_timeout: Option<Duration>,
    /// Natural-language task sent to the model
    pub task: String,
    /// Working-tree root
    pub repo_root: PathBuf,
    /// Artifact path relative to `repo_root`
    pub artifact_path: PathBuf,
    /// Target branch
    pub branch: String,
    /// Remote name
    pub remote_name: String,
    /// Remote URL
    pub remote_url: String,
    /// Commit message for published changes
    pub commit_message: String,
    /// Optional commit identity override
    pub identity: Option<CommitIdentity>,
}

impl std::fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("api_base_url", &self.api_base_url)
            .field("request_timeout", &self.request_timeout)
            .field("repo_root", &self.repo_root)
            .field("artifact_path", &self.artifact_path)
            .field("branch", &self.branch)
            .field("remote_name", &self.remote_name)
            .field("remote_url", &self.remote_url)
            .field("commit_message", &self.commit_message)
            .field("identity", &self.identity)
            .finish()
    }
}

impl AgentConfig {
    /// Create a config with defaults for everything except the credential,
    /// the working tree and the remote URL.
    pub fn new(api_key: &str, repo_root: impl Into<PathBuf>, remote_url: &str) -> Self {
        AgentConfig {
            api_key: api_key.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout: None,
            task: DEFAULT_TASK.to_string(),
            repo_root: repo_root.into(),
            artifact_path: PathBuf::from(DEFAULT_ARTIFACT_PATH),
            branch: DEFAULT_BRANCH.to_string(),
            remote_name: DEFAULT_REMOTE.to_string(),
            remote_url: remote_url.to_string(),
            commit_message: DEFAULT_COMMIT_MESSAGE.to_string(),
            identity: None,
        }
    }

    /// Build from the process environment.
    ///
    /// `default_root` is used when `HARNESS_AGENT_REPO` is unset.
    pub fn from_env(default_root: &Path) -> Result<Self> {
        Self::from_lookup(default_root, |key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup.
    ///
    /// Fails with [`AgentError::Configuration`] when the credential or remote
    /// URL is missing, or when any value is malformed.
    pub fn from_lookup<F>(default_root: &Path, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = get(ENV_API_KEY).ok_or_else(|| {
            AgentError::Configuration(format!("{ENV_API_KEY} is not set"))
        })?;
        let remote_url = get(ENV_REMOTE_URL).ok_or_else(|| {
            AgentError::Configuration(format!("{ENV_REMOTE_URL} is not set"))
        })?;
        let repo_root = get(ENV_REPO)
            .map(PathBuf::from)
            .unwrap_or_else(|| default_root.to_path_buf());

        let mut config = AgentConfig::new(api_key.trim(), repo_root, remote_url.trim());

        if let Some(model) = get(ENV_MODEL) {
            config.model = model;
        }
        if let Some(url) = get(ENV_API_BASE_URL) {
            config.api_base_url = url;
        }
        if let Some(branch) = get(ENV_BRANCH) {
            config.branch = branch;
        }
        if let Some(remote) = get(ENV_REMOTE) {
            config.remote_name = remote;
        }
        if let Some(artifact) = get(ENV_ARTIFACT) {
            config.artifact_path = PathBuf::from(artifact);
        }
        if let Some(message) = get(ENV_COMMIT_MESSAGE) {
            config.commit_message = message;
        }
        if let Some(secs) = get(ENV_TIMEOUT_SECS) {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                AgentError::Configuration(format!(
                    "{ENV_TIMEOUT_SECS} must be a whole number of seconds, got '{secs}'"
                ))
            })?;
            config.request_timeout = Some(Duration::from_secs(secs));
        }
        match (get(ENV_AUTHOR_NAME), get(ENV_AUTHOR_EMAIL)) {
            (Some(name), Some(email)) => config.identity = Some(CommitIdentity { name, email }),
            (None, None) => {}
            _ => {
                return Err(AgentError::Configuration(format!(
                    "{ENV_AUTHOR_NAME} and {ENV_AUTHOR_EMAIL} must be set together"
                )))
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_api_base_url(mut self, url: &str) -> Self {
        self.api_base_url = url.to_string();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_task(mut self, task: &str) -> Self {
        self.task = task.to_string();
        self
    }

    pub fn with_branch(mut self, branch: &str) -> Self {
        self.branch = branch.to_string();
        self
    }

    pub fn with_remote_name(mut self, remote: &str) -> Self {
        self.remote_name = remote.to_string();
        self
    }

    pub fn with_artifact_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.artifact_path = path.into();
        self
    }

    pub fn with_commit_message(mut self, message: &str) -> Self {
        self.commit_message = message.to_string();
        self
    }

    pub fn with_identity(mut self, identity: CommitIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Absolute location of the artifact inside the working tree.
    pub fn artifact_location(&self) -> PathBuf {
        self.repo_root.join(&self.artifact_path)
    }

    /// Explicit push refspec, e.g. `main:main`.
    pub fn refspec(&self) -> String {
        format!("{0}:{0}", self.branch)
    }

    /// Reject configurations that would fail later in a less obvious way.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(AgentError::Configuration(msg));

        if self.api_key.trim().is_empty() {
            return fail(format!("{ENV_API_KEY} is empty"));
        }
        if self.task.trim().is_empty() {
            return fail("task description must not be empty".to_string());
        }
        if self.model.trim().is_empty() {
            return fail("model identifier must not be empty".to_string());
        }
        if self.remote_url.trim().is_empty() {
            return fail("remote URL must not be empty".to_string());
        }
        for (what, value) in [("branch", &self.branch), ("remote", &self.remote_name)] {
            if value.is_empty()
                || value.starts_with('-')
                || value.contains(char::is_whitespace)
                || value.contains(':')
            {
                return fail(format!("invalid {what} name '{value}'"));
            }
        }
        let components: Vec<Component<'_>> = self.artifact_path.components().collect();
        let inside_tree = components
            .iter()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        let names_file = components.iter().any(|c| matches!(c, Component::Normal(_)));
        if !inside_tree || !names_file {
            return fail(format!(
                "artifact path {:?} must name a file inside the working tree",
                self.artifact_path
            ));
        }
        // git never tracks files under a metadata directory
        if components.iter().any(|c| c.as_os_str() == ".git") {
            return fail(format!(
                "artifact path {:?} points into repository metadata",
                self.artifact_path
            ));
        }
        Ok(())
    }
}
