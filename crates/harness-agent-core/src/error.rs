//! Error taxonomy for the harness agent workflow.
//!
//! Every variant of [`AgentError`] is fatal to a run. Stage-level variants wrap
//! the lower-level [`GitError`] or [`ValidationError`] that caused them so
//! callers can match on the failing stage without inspecting message text.

use std::path::PathBuf;

/// Errors produced while turning a model response into a valid document.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("generated document is empty")]
    EmptyDocument,

    #[error("document is not well-formed YAML: {0}")]
    Syntax(#[from] serde_yaml::Error),
}

/// Failures reported by a repository backend.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("failed to run git: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("git {command} failed: {stderr}")]
    Failed { command: String, stderr: String },

    #[error("unexpected git output: {0}")]
    UnexpectedOutput(String),
}

/// Harness agent errors, tagged by the stage that failed.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("authentication error: {0}")]
    Authentication(String),

    #[error("generation error: {0}")]
    Generation(String),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("failed to write artifact {path}: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("repository init error at {path}: {source}")]
    RepositoryInit {
        path: PathBuf,
        #[source]
        source: GitError,
    },

    #[error("branch error for '{branch}': {source}")]
    Branch {
        branch: String,
        #[source]
        source: GitError,
    },

    #[error("commit error: {0}")]
    Commit(#[source] GitError),

    #[error("publish error pushing {refspec} to '{remote}': {source}")]
    Publish {
        remote: String,
        refspec: String,
        #[source]
        source: GitError,
    },
}

impl AgentError {
    /// Short name of the workflow stage that produced this error.
    pub fn stage(&self) -> &'static str {
        match self {
            AgentError::Configuration(_) => "configuration",
            AgentError::Authentication(_) | AgentError::Generation(_) => "generation",
            AgentError::Validation(_) => "validation",
            AgentError::Artifact { .. } => "artifact",
            AgentError::RepositoryInit { .. } => "repository_init",
            AgentError::Branch { .. } => "branch",
            AgentError::Commit(_) => "commit",
            AgentError::Publish { .. } => "publish",
        }
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        AgentError::Generation(err.to_string())
    }
}

/// Result type for harness agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_carries_parser_diagnostic() {
        let parse_err = serde_yaml::from_str::<serde_yaml::Value>("stages: [").unwrap_err();
        let err = AgentError::from(ValidationError::from(parse_err));
        assert!(err.to_string().contains("validation error"));
        assert!(err.to_string().contains("not well-formed YAML"));
        assert_eq!(err.stage(), "validation");
    }

    #[test]
    fn test_git_failure_display() {
        let err = AgentError::Publish {
            remote: "origin".to_string(),
            refspec: "main:main".to_string(),
            source: GitError::Failed {
                command: "push origin main:main".to_string(),
                stderr: "rejected (non-fast-forward)".to_string(),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("origin"));
        assert!(msg.contains("main:main"));
        assert!(msg.contains("non-fast-forward"));
        assert_eq!(err.stage(), "publish");
    }

    #[test]
    fn test_authentication_and_generation_share_stage() {
        assert_eq!(
            AgentError::Authentication("bad key".to_string()).stage(),
            "generation"
        );
        assert_eq!(
            AgentError::Generation("timeout".to_string()).stage(),
            "generation"
        );
    }
}
