//! Repository publisher state machine.
//!
//! Each state owns the repository backend and consumes itself on transition,
//! returning the next state or a stage-tagged [`AgentError`]:
//!
//! ```text
//! Uninitialized --open--> Initialized --ensure_branch--> BranchReady
//! BranchReady --inspect--> Clean (nothing to publish) | StagingChanges
//! StagingChanges --commit--> Committed --bind_remote--> RemoteBound --push--> Published
//! ```
//!
//! The artifact is written by the caller between `ensure_branch` and `inspect`.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{AgentConfig, CommitIdentity};
use crate::error::{AgentError, Result};
use crate::git::{HeadState, RepositoryBackend};

/// Publish parameters taken from [`AgentConfig`].
#[derive(Debug, Clone)]
pub struct PublishSettings {
    pub branch: String,
    pub remote_name: String,
    pub remote_url: String,
    pub commit_message: String,
    pub identity: Option<CommitIdentity>,
}

impl PublishSettings {
    pub fn from_config(config: &AgentConfig) -> Self {
        PublishSettings {
            branch: config.branch.clone(),
            remote_name: config.remote_name.clone(),
            remote_url: config.remote_url.clone(),
            commit_message: config.commit_message.clone(),
            identity: config.identity.clone(),
        }
    }

    pub fn refspec(&self) -> String {
        format!("{0}:{0}", self.branch)
    }
}

/// How the target branch was made current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchAction {
    AlreadyCurrent,
    Switched,
    Created,
}

/// How the named remote was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteAction {
    Reused,
    Created,
    Rebound,
}

/// Final result of the publish step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PublishOutcome {
    /// Working tree matched the last commit; nothing was staged, committed or pushed.
    NothingToPublish,
    Published {
        commit: String,
        remote: String,
        refspec: String,
        remote_action: RemoteAction,
    },
}

impl PublishOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, PublishOutcome::Published { .. })
    }
}

struct Repo<B> {
    backend: B,
    settings: PublishSettings,
}

/// Backend not yet opened.
pub struct Uninitialized<B> {
    repo: Repo<B>,
}

/// Metadata present; branch not yet checked.
pub struct Initialized<B> {
    repo: Repo<B>,
    created: bool,
}

/// Target branch is checked out.
pub struct BranchReady<B> {
    repo: Repo<B>,
    action: BranchAction,
}

/// Working tree differs from the last commit.
pub struct StagingChanges<B> {
    repo: Repo<B>,
}

pub struct Committed<B> {
    repo: Repo<B>,
    commit: String,
}

pub struct RemoteBound<B> {
    repo: Repo<B>,
    commit: String,
    remote_action: RemoteAction,
}

pub struct Published<B> {
    repo: Repo<B>,
    outcome: PublishOutcome,
}

/// Result of inspecting a [`BranchReady`] working tree.
pub enum Inspection<B> {
    Clean(B),
    Dirty(StagingChanges<B>),
}

impl<B: RepositoryBackend> Uninitialized<B> {
    pub fn new(backend: B, settings: PublishSettings) -> Self {
        Uninitialized {
            repo: Repo { backend, settings },
        }
    }

    /// Open existing metadata or initialize it.
    ///
    /// Either way the result must be a repository rooted at the working
    /// tree; anything else is [`AgentError::RepositoryInit`].
    pub fn open(self) -> Result<Initialized<B>> {
        let mut repo = self.repo;
        let root = repo.backend.root().to_path_buf();
        let init_err = |source| AgentError::RepositoryInit {
            path: root.clone(),
            source,
        };

        let created = !repo.backend.has_metadata();
        if created {
            info!(root = ?root, "initializing repository");
            repo.backend.init().map_err(init_err)?;
        } else {
            debug!(root = ?root, "opening existing repository");
        }
        repo.backend.verify().map_err(init_err)?;
        Ok(Initialized { repo, created })
    }
}

impl<B: RepositoryBackend> Initialized<B> {
    /// Whether `open` had to create the metadata.
    pub fn was_created(&self) -> bool {
        self.created
    }

    /// Make the target branch current: keep it, switch to it, or create it.
    pub fn ensure_branch(self) -> Result<BranchReady<B>> {
        let mut repo = self.repo;
        let target = repo.settings.branch.clone();
        let branch_err = |source| AgentError::Branch {
            branch: target.clone(),
            source,
        };

        let head = repo.backend.head().map_err(branch_err)?;
        let action = match head {
            HeadState::Branch(ref name) if *name == target => BranchAction::AlreadyCurrent,
            _ => {
                if repo.backend.branch_exists(&target).map_err(branch_err)? {
                    info!(from = ?head, branch = %target, "switching to target branch");
                    repo.backend.switch_branch(&target).map_err(branch_err)?;
                    BranchAction::Switched
                } else {
                    info!(from = ?head, branch = %target, "creating target branch");
                    repo.backend.create_branch(&target).map_err(branch_err)?;
                    BranchAction::Created
                }
            }
        };
        Ok(BranchReady { repo, action })
    }
}

impl<B: RepositoryBackend> BranchReady<B> {
    pub fn branch_action(&self) -> BranchAction {
        self.action
    }

    pub fn backend(&self) -> &B {
        &self.repo.backend
    }

    /// Check the working tree, untracked files included.
    pub fn inspect(self) -> Result<Inspection<B>> {
        let repo = self.repo;
        let dirty = repo.backend.is_dirty().map_err(AgentError::Commit)?;
        if dirty {
            Ok(Inspection::Dirty(StagingChanges { repo }))
        } else {
            info!("working tree clean, nothing to publish");
            Ok(Inspection::Clean(repo.backend))
        }
    }

    /// Drive inspect, commit, remote binding and push in order.
    pub fn publish(self) -> Result<(PublishOutcome, B)> {
        match self.inspect()? {
            Inspection::Clean(backend) => Ok((PublishOutcome::NothingToPublish, backend)),
            Inspection::Dirty(staging) => {
                let published = staging.commit()?.bind_remote()?.push()?;
                Ok(published.finish())
            }
        }
    }
}

impl<B: RepositoryBackend> StagingChanges<B> {
    /// Stage everything and commit with the configured message.
    pub fn commit(self) -> Result<Committed<B>> {
        let mut repo = self.repo;
        repo.backend.stage_all().map_err(AgentError::Commit)?;
        if !repo.backend.has_staged_changes().map_err(AgentError::Commit)? {
            return Err(AgentError::Commit(crate::error::GitError::UnexpectedOutput(
                "working tree reported changes but nothing was staged".to_string(),
            )));
        }
        let commit = repo
            .backend
            .commit(&repo.settings.commit_message, repo.settings.identity.as_ref())
            .map_err(AgentError::Commit)?;
        info!(commit = %commit, message = %repo.settings.commit_message, "changes committed");
        Ok(Committed { repo, commit })
    }
}

impl<B: RepositoryBackend> Committed<B> {
    pub fn commit_id(&self) -> &str {
        &self.commit
    }

    /// Reuse the named remote, or create it bound to the configured URL.
    pub fn bind_remote(self) -> Result<RemoteBound<B>> {
        let mut repo = self.repo;
        let name = repo.settings.remote_name.clone();
        let url = repo.settings.remote_url.clone();
        let refspec = repo.settings.refspec();
        let publish_err = |source| AgentError::Publish {
            remote: name.clone(),
            refspec: refspec.clone(),
            source,
        };

        let remote_action = match repo.backend.remote_url(&name).map_err(publish_err)? {
            None => {
                info!(remote = %name, url = %url, "creating remote");
                repo.backend.add_remote(&name, &url).map_err(publish_err)?;
                RemoteAction::Created
            }
            Some(existing) if existing == url => RemoteAction::Reused,
            Some(existing) => {
                warn!(remote = %name, from = %existing, to = %url, "rebinding remote to configured URL");
                repo.backend.set_remote_url(&name, &url).map_err(publish_err)?;
                RemoteAction::Rebound
            }
        };
        Ok(RemoteBound {
            repo,
            commit: self.commit,
            remote_action,
        })
    }
}

impl<B: RepositoryBackend> RemoteBound<B> {
    /// Push `branch:branch` to the bound remote. No force, no retry.
    pub fn push(self) -> Result<Published<B>> {
        let mut repo = self.repo;
        let remote = repo.settings.remote_name.clone();
        let refspec = repo.settings.refspec();
        repo.backend
            .push(&remote, &refspec)
            .map_err(|source| AgentError::Publish {
                remote: remote.clone(),
                refspec: refspec.clone(),
                source,
            })?;
        info!(remote = %remote, refspec = %refspec, commit = %self.commit, "changes pushed");
        Ok(Published {
            repo,
            outcome: PublishOutcome::Published {
                commit: self.commit,
                remote,
                refspec,
                remote_action: self.remote_action,
            },
        })
    }
}

impl<B> Published<B> {
    pub fn outcome(&self) -> &PublishOutcome {
        &self.outcome
    }

    pub fn finish(self) -> (PublishOutcome, B) {
        (self.outcome, self.repo.backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FailPoint, MemoryRepository};

    const URL: &str = "https://example.com/site.git";

    fn settings() -> PublishSettings {
        PublishSettings {
            branch: "main".to_string(),
            remote_name: "origin".to_string(),
            remote_url: URL.to_string(),
            commit_message: "Autogen update: Harness pipeline".to_string(),
            identity: None,
        }
    }

    fn ready(repo: &MemoryRepository) -> BranchReady<MemoryRepository> {
        Uninitialized::new(repo.clone(), settings())
            .open()
            .unwrap()
            .ensure_branch()
            .unwrap()
    }

    fn write(dir: &tempfile::TempDir, name: &str, body: &str) {
        std::fs::write(dir.path().join(name), body).unwrap();
    }

    #[test]
    fn test_open_initializes_missing_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let repo = MemoryRepository::new(dir.path());
        let initialized = Uninitialized::new(repo.clone(), settings()).open().unwrap();
        assert!(initialized.was_created());
        assert!(repo.is_initialized());
    }

    #[test]
    fn test_open_reuses_existing_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let repo = MemoryRepository::initialized(dir.path(), "main");
        let initialized = Uninitialized::new(repo.clone(), settings()).open().unwrap();
        assert!(!initialized.was_created());
        assert!(!repo.calls().contains(&"init".to_string()));
    }

    #[test]
    fn test_init_failure_is_repository_init_error() {
        let dir = tempfile::tempdir().unwrap();
        let repo = MemoryRepository::new(dir.path());
        repo.fail_on(FailPoint::Init);
        let err = Uninitialized::new(repo, settings()).open().err().unwrap();
        assert!(matches!(err, AgentError::RepositoryInit { .. }));
    }

    #[test]
    fn test_unusable_metadata_is_repository_init_error() {
        let dir = tempfile::tempdir().unwrap();
        let repo = MemoryRepository::initialized(dir.path(), "main");
        repo.fail_on(FailPoint::Verify);

        let err = Uninitialized::new(repo.clone(), settings()).open().err().unwrap();
        assert!(matches!(err, AgentError::RepositoryInit { .. }));
        assert_eq!(err.stage(), "repository_init");
        assert!(!repo.calls().contains(&"head".to_string()));
    }

    #[test]
    fn test_branch_already_current() {
        let dir = tempfile::tempdir().unwrap();
        let repo = MemoryRepository::initialized(dir.path(), "main");
        assert_eq!(ready(&repo).branch_action(), BranchAction::AlreadyCurrent);
    }

    #[test]
    fn test_branch_created_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir, "index.html", "<html></html>");
        let repo = MemoryRepository::new(dir.path());
        repo.seed_commit("master", "initial");

        assert_eq!(ready(&repo).branch_action(), BranchAction::Created);
        assert_eq!(repo.head_state(), Some(HeadState::Branch("main".to_string())));
        assert!(repo.branches().contains(&"main".to_string()));
    }

    #[test]
    fn test_branch_switched_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let repo = MemoryRepository::new(dir.path());
        repo.seed_commit("main", "initial");
        repo.seed_commit("feature", "work");

        assert_eq!(ready(&repo).branch_action(), BranchAction::Switched);
        assert_eq!(repo.head_state(), Some(HeadState::Branch("main".to_string())));
    }

    #[test]
    fn test_detached_head_moves_to_target() {
        let dir = tempfile::tempdir().unwrap();
        let repo = MemoryRepository::new(dir.path());
        repo.seed_commit("main", "initial");
        repo.detach_head();

        assert_eq!(ready(&repo).branch_action(), BranchAction::Switched);
        assert_eq!(repo.head_state(), Some(HeadState::Branch("main".to_string())));
    }

    #[test]
    fn test_branch_failure_is_branch_error() {
        let dir = tempfile::tempdir().unwrap();
        let repo = MemoryRepository::new(dir.path());
        repo.seed_commit("master", "initial");
        repo.fail_on(FailPoint::CreateBranch);
        let err = Uninitialized::new(repo, settings())
            .open()
            .unwrap()
            .ensure_branch()
            .err()
            .unwrap();
        assert!(matches!(err, AgentError::Branch { ref branch, .. } if branch == "main"));
    }

    #[test]
    fn test_clean_tree_publishes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir, "pipeline.yaml", "stages: []\n");
        let repo = MemoryRepository::new(dir.path());
        repo.seed_commit("main", "initial");

        let (outcome, _) = ready(&repo).publish().unwrap();
        assert_eq!(outcome, PublishOutcome::NothingToPublish);
        assert_eq!(repo.commits().len(), 1);
        assert!(repo.pushes().is_empty());
        let calls = repo.calls();
        assert!(!calls.contains(&"stage_all".to_string()));
        assert!(!calls.contains(&"push".to_string()));
    }

    #[test]
    fn test_dirty_tree_commits_creates_remote_and_pushes() {
        let dir = tempfile::tempdir().unwrap();
        let repo = MemoryRepository::initialized(dir.path(), "master");
        write(&dir, "pipeline.yaml", "stages: []\n");

        let (outcome, _) = ready(&repo).publish().unwrap();
        match outcome {
            PublishOutcome::Published {
                remote,
                refspec,
                remote_action,
                ..
            } => {
                assert_eq!(remote, "origin");
                assert_eq!(refspec, "main:main");
                assert_eq!(remote_action, RemoteAction::Created);
            }
            other => panic!("expected publish, got {other:?}"),
        }
        assert_eq!(repo.commits().len(), 1);
        assert_eq!(repo.commits()[0].branch, "main");
        assert_eq!(repo.commits()[0].message, "Autogen update: Harness pipeline");
        assert_eq!(repo.remotes().get("origin").map(String::as_str), Some(URL));
        assert_eq!(
            repo.pushes(),
            vec![("origin".to_string(), "main:main".to_string())]
        );
    }

    #[test]
    fn test_existing_remote_reused() {
        let dir = tempfile::tempdir().unwrap();
        let repo = MemoryRepository::initialized(dir.path(), "main");
        repo.set_remote("origin", URL);
        write(&dir, "pipeline.yaml", "a: 1\n");

        let (outcome, _) = ready(&repo).publish().unwrap();
        assert!(matches!(
            outcome,
            PublishOutcome::Published {
                remote_action: RemoteAction::Reused,
                ..
            }
        ));
        assert_eq!(repo.remotes().len(), 1);
        assert!(!repo.calls().contains(&"add_remote".to_string()));
    }

    #[test]
    fn test_remote_with_other_url_rebound() {
        let dir = tempfile::tempdir().unwrap();
        let repo = MemoryRepository::initialized(dir.path(), "main");
        repo.set_remote("origin", "https://example.com/old.git");
        write(&dir, "pipeline.yaml", "a: 1\n");

        let (outcome, _) = ready(&repo).publish().unwrap();
        assert!(matches!(
            outcome,
            PublishOutcome::Published {
                remote_action: RemoteAction::Rebound,
                ..
            }
        ));
        assert_eq!(repo.remotes().get("origin").map(String::as_str), Some(URL));
    }

    #[test]
    fn test_commit_identity_passed_through() {
        let dir = tempfile::tempdir().unwrap();
        let repo = MemoryRepository::initialized(dir.path(), "main");
        write(&dir, "pipeline.yaml", "a: 1\n");

        let mut settings = settings();
        settings.identity = Some(CommitIdentity::new("bot", "bot@example.com"));
        Uninitialized::new(repo.clone(), settings)
            .open()
            .unwrap()
            .ensure_branch()
            .unwrap()
            .publish()
            .unwrap();
        assert_eq!(
            repo.commits()[0].author,
            Some(CommitIdentity::new("bot", "bot@example.com"))
        );
    }

    #[test]
    fn test_commit_failure_is_commit_error() {
        let dir = tempfile::tempdir().unwrap();
        let repo = MemoryRepository::initialized(dir.path(), "main");
        write(&dir, "pipeline.yaml", "a: 1\n");
        repo.fail_on(FailPoint::Commit);

        let err = ready(&repo).publish().err().unwrap();
        assert!(matches!(err, AgentError::Commit(_)));
        assert!(repo.commits().is_empty());
        assert!(repo.pushes().is_empty());
    }

    #[test]
    fn test_push_failure_keeps_local_commit() {
        let dir = tempfile::tempdir().unwrap();
        let repo = MemoryRepository::initialized(dir.path(), "main");
        write(&dir, "pipeline.yaml", "a: 1\n");
        repo.fail_on(FailPoint::Push);

        let err = ready(&repo).publish().err().unwrap();
        assert!(matches!(
            err,
            AgentError::Publish { ref refspec, .. } if refspec == "main:main"
        ));
        assert_eq!(repo.commits().len(), 1);
        assert!(repo.pushes().is_empty());
    }

    #[test]
    fn test_transitions_can_be_driven_one_by_one() {
        let dir = tempfile::tempdir().unwrap();
        let repo = MemoryRepository::initialized(dir.path(), "main");
        write(&dir, "pipeline.yaml", "a: 1\n");

        let staging = match ready(&repo).inspect().unwrap() {
            Inspection::Dirty(staging) => staging,
            Inspection::Clean(_) => panic!("tree should be dirty"),
        };
        let committed = staging.commit().unwrap();
        assert_eq!(committed.commit_id(), repo.commits()[0].id);
        let published = committed.bind_remote().unwrap().push().unwrap();
        assert!(published.outcome().is_published());
    }
}
