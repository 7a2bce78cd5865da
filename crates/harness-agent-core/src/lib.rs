//! Harness Agent Core Library
//!
//! Asks a generative model for a Harness pipeline document, validates it as
//! YAML, writes it to `.harness/pipeline.yaml` and publishes the change to a
//! git remote only when the working tree actually changed.

pub mod artifact;
pub mod config;
pub mod error;
pub mod fakes;
pub mod generator;
pub mod git;
pub mod obs;
pub mod publisher;
pub mod telemetry;
pub mod validator;
pub mod workflow;

pub use artifact::write_artifact;
pub use config::{AgentConfig, CommitIdentity};
pub use error::{AgentError, GitError, Result, ValidationError};
pub use generator::{ContentGenerator, OpenAiGenerator};
pub use git::{capture_head_sha, is_git_repo, GitCli, HeadState, RepositoryBackend};
pub use obs::{
    emit_artifact_written, emit_document_validated, emit_publish_completed, emit_run_failed,
    emit_run_finished, emit_run_started, RunSpan,
};
pub use publisher::{
    BranchAction, BranchReady, Initialized, Inspection, PublishOutcome, PublishSettings,
    RemoteAction, Uninitialized,
};
pub use telemetry::{init_tracing, LogFormat};
pub use validator::{
    strip_code_fences, validate_document, validate_file, DocumentDigest, ValidatedDocument,
};
pub use workflow::{AgentWorkflow, RunReport};

/// Harness agent version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
