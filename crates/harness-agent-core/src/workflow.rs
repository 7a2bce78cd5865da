//! Generate, validate and persist a pipeline, then publish it if anything changed.
//!
//! [`AgentWorkflow::run`] is the single entry point. Stages run strictly in
//! order and the first failure aborts the run:
//!
//! 1. ask the generator for a document (the only `.await`)
//! 2. validate it; nothing on disk or in the repository changes before this passes
//! 3. open or initialize the repository and make the target branch current
//! 4. write the artifact
//! 5. publish if the working tree is dirty

use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use crate::artifact::write_artifact;
use crate::config::AgentConfig;
use crate::error::Result;
use crate::generator::ContentGenerator;
use crate::git::RepositoryBackend;
use crate::obs::{self, RunSpan};
use crate::publisher::{BranchAction, PublishOutcome, PublishSettings, Uninitialized};
use crate::validator::{validate_document, DocumentDigest};

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub model: String,
    pub artifact_path: PathBuf,
    pub document_digest: DocumentDigest,
    /// Whether the run had to initialize version-control metadata.
    pub repository_created: bool,
    pub branch: String,
    pub branch_action: BranchAction,
    pub outcome: PublishOutcome,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn published(&self) -> bool {
        self.outcome.is_published()
    }
}

/// Harness agent workflow orchestrator.
pub struct AgentWorkflow;

impl AgentWorkflow {
    /// Run the workflow once against `backend`.
    ///
    /// Errors are returned as-is after being logged with the failing stage.
    pub async fn run<G, B>(config: &AgentConfig, generator: &G, backend: B) -> Result<RunReport>
    where
        G: ContentGenerator + ?Sized,
        B: RepositoryBackend,
    {
        let run_id = Uuid::new_v4().to_string();
        let span = RunSpan::new(&run_id);

        let result = Self::run_stages(&run_id, config, generator, backend)
            .instrument(span.span().clone())
            .await;

        if let Err(ref err) = result {
            let _guard = span.enter();
            obs::emit_run_failed(&run_id, err.stage(), err);
        }
        result
    }

    async fn run_stages<G, B>(
        run_id: &str,
        config: &AgentConfig,
        generator: &G,
        backend: B,
    ) -> Result<RunReport>
    where
        G: ContentGenerator + ?Sized,
        B: RepositoryBackend,
    {
        let start = Instant::now();
        let started_at = Utc::now();
        config.validate()?;
        obs::emit_run_started(run_id, generator.model_name(), &config.repo_root);

        let raw = generator.generate(&config.task).await?;
        let document = validate_document(&raw)?;
        obs::emit_document_validated(run_id, document.digest.short(), document.len());

        let initialized =
            Uninitialized::new(backend, PublishSettings::from_config(config)).open()?;
        let repository_created = initialized.was_created();
        let ready = initialized.ensure_branch()?;
        let branch_action = ready.branch_action();

        let artifact_path = write_artifact(&config.artifact_location(), &document)?;
        obs::emit_artifact_written(run_id, &artifact_path);

        let (outcome, _backend) = ready.publish()?;
        obs::emit_publish_completed(run_id, &outcome);

        let duration_ms = start.elapsed().as_millis() as u64;
        obs::emit_run_finished(run_id, duration_ms, outcome.is_published());

        Ok(RunReport {
            run_id: run_id.to_string(),
            started_at,
            model: generator.model_name().to_string(),
            artifact_path,
            document_digest: document.digest,
            repository_created,
            branch: config.branch.clone(),
            branch_action,
            outcome,
            duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AgentError, ValidationError};
    use crate::fakes::{FailPoint, MemoryRepository, StaticGenerator};

    fn config(root: &std::path::Path) -> AgentConfig {
        AgentConfig::new("sk-test", root, "https://example.com/site.git")
    }

    #[tokio::test]
    async fn test_fresh_directory_is_initialized_and_published() {
        let dir = tempfile::tempdir().unwrap();
        let repo = MemoryRepository::new(dir.path());
        let generator = StaticGenerator::new("```yaml\nstages: []\n```");

        let report = AgentWorkflow::run(&config(dir.path()), &generator, repo.clone())
            .await
            .unwrap();

        assert!(report.repository_created);
        assert_eq!(report.branch_action, BranchAction::Created);
        assert!(report.published());
        assert_eq!(generator.calls(), 1);
        assert_eq!(repo.commits().len(), 1);
        assert_eq!(repo.pushes().len(), 1);
        assert_eq!(
            std::fs::read_to_string(dir.path().join(".harness/pipeline.yaml")).unwrap(),
            "stages: []\n"
        );
    }

    #[tokio::test]
    async fn test_second_identical_run_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let repo = MemoryRepository::new(dir.path());
        let generator = StaticGenerator::new("stages: []");
        let config = config(dir.path());

        AgentWorkflow::run(&config, &generator, repo.clone()).await.unwrap();
        let second = AgentWorkflow::run(&config, &generator, repo.clone())
            .await
            .unwrap();

        assert_eq!(second.outcome, PublishOutcome::NothingToPublish);
        assert!(!second.repository_created);
        assert_eq!(second.branch_action, BranchAction::AlreadyCurrent);
        assert_eq!(repo.commits().len(), 1);
        assert_eq!(repo.pushes().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_output_leaves_everything_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join(".harness/pipeline.yaml");
        std::fs::create_dir_all(artifact.parent().unwrap()).unwrap();
        std::fs::write(&artifact, "stages: []\n").unwrap();

        let repo = MemoryRepository::new(dir.path());
        let generator = StaticGenerator::new("stages: [");
        let err = AgentWorkflow::run(&config(dir.path()), &generator, repo.clone())
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::Validation(ValidationError::Syntax(_))));
        assert_eq!(std::fs::read_to_string(&artifact).unwrap(), "stages: []\n");
        assert!(repo.calls().is_empty());
        assert!(!repo.was_mutated());
    }

    #[tokio::test]
    async fn test_empty_output_is_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let repo = MemoryRepository::new(dir.path());
        let err = AgentWorkflow::run(&config(dir.path()), &StaticGenerator::new(""), repo.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Validation(ValidationError::EmptyDocument)));
        assert!(!dir.path().join(".harness").exists());
    }

    #[tokio::test]
    async fn test_generation_failures_touch_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let repo = MemoryRepository::new(dir.path());

        let err = AgentWorkflow::run(
            &config(dir.path()),
            &StaticGenerator::rejecting("invalid api key"),
            repo.clone(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AgentError::Authentication(_)));

        let err = AgentWorkflow::run(
            &config(dir.path()),
            &StaticGenerator::failing("connection reset"),
            repo.clone(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AgentError::Generation(_)));
        assert!(repo.calls().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_config_fails_before_generation() {
        let dir = tempfile::tempdir().unwrap();
        let generator = StaticGenerator::new("stages: []");
        let config = config(dir.path()).with_task("");

        let err = AgentWorkflow::run(&config, &generator, MemoryRepository::new(dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Configuration(_)));
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_push_failure_leaves_artifact_and_commit() {
        let dir = tempfile::tempdir().unwrap();
        let repo = MemoryRepository::new(dir.path());
        repo.fail_on(FailPoint::Push);

        let err = AgentWorkflow::run(
            &config(dir.path()),
            &StaticGenerator::new("stages: []"),
            repo.clone(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AgentError::Publish { .. }));
        assert_eq!(err.stage(), "publish");
        assert!(dir.path().join(".harness/pipeline.yaml").exists());
        assert_eq!(repo.commits().len(), 1);
    }

    #[tokio::test]
    async fn test_report_serializes_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let report = AgentWorkflow::run(
            &config(dir.path()),
            &StaticGenerator::new("stages: []"),
            MemoryRepository::new(dir.path()),
        )
        .await
        .unwrap();

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"]["status"], "published");
        assert_eq!(json["outcome"]["refspec"], "main:main");
        assert_eq!(json["branch_action"], "created");
        assert_eq!(json["model"], "static");
        assert_eq!(
            json["document_digest"].as_str().map(str::len),
            Some(64)
        );
    }
}
