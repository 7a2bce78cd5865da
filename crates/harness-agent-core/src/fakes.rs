//! In-memory fakes for the workflow seams (testing only)
//!
//! `MemoryRepository` implements [`RepositoryBackend`] by snapshotting the
//! files under its root, so dirty/stage/commit behave like git without
//! running it. `StaticGenerator` answers every request with a fixed result.
//! Both are cheap `Clone` handles over shared state so a test can keep one
//! copy for inspection after handing the other to the code under test.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::config::CommitIdentity;
use crate::error::{AgentError, GitError, Result};
use crate::generator::ContentGenerator;
use crate::git::{GitResult, HeadState, RepositoryBackend};

// ---------------------------------------------------------------------------
// MemoryRepository
// ---------------------------------------------------------------------------

/// Backend operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    Init,
    Verify,
    Head,
    SwitchBranch,
    CreateBranch,
    Status,
    Stage,
    Commit,
    Remote,
    Push,
}

type Tree = BTreeMap<PathBuf, Vec<u8>>;

/// A commit recorded by [`MemoryRepository`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryCommit {
    pub id: String,
    pub branch: String,
    pub message: String,
    pub author: Option<CommitIdentity>,
}

#[derive(Debug, Default)]
struct RepoState {
    initialized: bool,
    head: Option<HeadState>,
    /// branch name -> tree of its tip commit
    branches: BTreeMap<String, Tree>,
    index: Tree,
    commits: Vec<MemoryCommit>,
    remotes: BTreeMap<String, String>,
    pushes: Vec<(String, String)>,
    calls: Vec<String>,
    fail: Option<FailPoint>,
    /// branch to create when the first commit lands on an unborn HEAD
    unborn: Option<String>,
}

/// In-memory repository rooted at a real directory.
#[derive(Debug, Clone)]
pub struct MemoryRepository {
    root: PathBuf,
    state: Arc<Mutex<RepoState>>,
}

impl MemoryRepository {
    /// Repository with no metadata yet.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        MemoryRepository {
            root: root.into(),
            state: Arc::new(Mutex::new(RepoState::default())),
        }
    }

    /// Initialized repository with no commits, HEAD on unborn `branch`.
    pub fn initialized(root: impl Into<PathBuf>, branch: &str) -> Self {
        let repo = Self::new(root);
        {
            let mut state = repo.state.lock().unwrap();
            state.initialized = true;
            state.head = Some(HeadState::Branch(branch.to_string()));
            state.unborn = Some(branch.to_string());
        }
        repo
    }

    /// Commit the current tree contents on `branch` and check it out.
    pub fn seed_commit(&self, branch: &str, message: &str) {
        let tree = snapshot(&self.root);
        let mut state = self.state.lock().unwrap();
        state.initialized = true;
        state.unborn = None;
        state.branches.insert(branch.to_string(), tree.clone());
        state.index = tree;
        state.head = Some(HeadState::Branch(branch.to_string()));
        let id = format!("{:040x}", state.commits.len() + 1);
        state.commits.push(MemoryCommit {
            id,
            branch: branch.to_string(),
            message: message.to_string(),
            author: None,
        });
    }

    pub fn detach_head(&self) {
        self.state.lock().unwrap().head = Some(HeadState::Detached);
    }

    pub fn set_remote(&self, name: &str, url: &str) {
        let mut state = self.state.lock().unwrap();
        state.remotes.insert(name.to_string(), url.to_string());
    }

    /// Make the next call of `point` fail.
    pub fn fail_on(&self, point: FailPoint) {
        self.state.lock().unwrap().fail = Some(point);
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().unwrap().initialized
    }

    pub fn head_state(&self) -> Option<HeadState> {
        self.state.lock().unwrap().head.clone()
    }

    pub fn branches(&self) -> Vec<String> {
        self.state.lock().unwrap().branches.keys().cloned().collect()
    }

    pub fn commits(&self) -> Vec<MemoryCommit> {
        self.state.lock().unwrap().commits.clone()
    }

    pub fn remotes(&self) -> BTreeMap<String, String> {
        self.state.lock().unwrap().remotes.clone()
    }

    /// `(remote, refspec)` pairs pushed so far.
    pub fn pushes(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().pushes.clone()
    }

    /// Names of every backend operation invoked, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Whether any state-changing operation ran.
    pub fn was_mutated(&self) -> bool {
        const MUTATING: [&str; 8] = [
            "init",
            "switch_branch",
            "create_branch",
            "stage_all",
            "commit",
            "add_remote",
            "set_remote_url",
            "push",
        ];
        self.calls().iter().any(|c| MUTATING.contains(&c.as_str()))
    }

    fn enter(&self, call: &str, point: Option<FailPoint>) -> GitResult<std::sync::MutexGuard<'_, RepoState>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call.to_string());
        if point.is_some() && state.fail == point {
            state.fail = None;
            return Err(GitError::Failed {
                command: call.to_string(),
                stderr: "injected failure".to_string(),
            });
        }
        Ok(state)
    }

    fn current_branch(state: &RepoState) -> GitResult<String> {
        match &state.head {
            Some(HeadState::Branch(name)) => Ok(name.clone()),
            Some(HeadState::Detached) => Err(GitError::Failed {
                command: "commit".to_string(),
                stderr: "HEAD is detached".to_string(),
            }),
            None => Err(GitError::Failed {
                command: "commit".to_string(),
                stderr: "not a git repository".to_string(),
            }),
        }
    }

    fn head_tree(state: &RepoState) -> Tree {
        match &state.head {
            Some(HeadState::Branch(name)) => state.branches.get(name).cloned().unwrap_or_default(),
            _ => state
                .commits
                .last()
                .and_then(|c| state.branches.get(&c.branch).cloned())
                .unwrap_or_default(),
        }
    }
}

/// Read every file under `root` (skipping `.git`) into a path -> bytes map.
fn snapshot(root: &Path) -> Tree {
    fn walk(root: &Path, dir: &Path, tree: &mut Tree) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.file_name().is_some_and(|n| n == ".git") {
                continue;
            }
            if path.is_dir() {
                walk(root, &path, tree);
            } else if let Ok(bytes) = std::fs::read(&path) {
                let relative = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
                tree.insert(relative, bytes);
            }
        }
    }
    let mut tree = Tree::new();
    walk(root, root, &mut tree);
    tree
}

impl RepositoryBackend for MemoryRepository {
    fn root(&self) -> &Path {
        &self.root
    }

    fn has_metadata(&self) -> bool {
        self.is_initialized()
    }

    fn init(&mut self) -> GitResult<()> {
        let mut state = self.enter("init", Some(FailPoint::Init))?;
        state.initialized = true;
        state.head = Some(HeadState::Branch("master".to_string()));
        state.unborn = Some("master".to_string());
        Ok(())
    }

    fn verify(&self) -> GitResult<()> {
        let state = self.enter("verify", Some(FailPoint::Verify))?;
        if !state.initialized {
            return Err(GitError::Failed {
                command: "verify".to_string(),
                stderr: "not a git repository".to_string(),
            });
        }
        Ok(())
    }

    fn head(&self) -> GitResult<HeadState> {
        let state = self.enter("head", Some(FailPoint::Head))?;
        state.head.clone().ok_or_else(|| GitError::Failed {
            command: "head".to_string(),
            stderr: "not a git repository".to_string(),
        })
    }

    fn branch_exists(&self, name: &str) -> GitResult<bool> {
        let state = self.enter("branch_exists", None)?;
        Ok(state.branches.contains_key(name))
    }

    fn switch_branch(&mut self, name: &str) -> GitResult<()> {
        let mut state = self.enter("switch_branch", Some(FailPoint::SwitchBranch))?;
        let tree = state.branches.get(name).cloned().ok_or_else(|| GitError::Failed {
            command: "switch_branch".to_string(),
            stderr: format!("pathspec '{name}' did not match any branch"),
        })?;
        state.index = tree;
        state.head = Some(HeadState::Branch(name.to_string()));
        Ok(())
    }

    fn create_branch(&mut self, name: &str) -> GitResult<()> {
        let mut state = self.enter("create_branch", Some(FailPoint::CreateBranch))?;
        if state.branches.contains_key(name) {
            return Err(GitError::Failed {
                command: "create_branch".to_string(),
                stderr: format!("a branch named '{name}' already exists"),
            });
        }
        if state.unborn.is_some() {
            state.unborn = Some(name.to_string());
        } else {
            let tree = Self::head_tree(&state);
            state.branches.insert(name.to_string(), tree);
        }
        state.head = Some(HeadState::Branch(name.to_string()));
        Ok(())
    }

    fn is_dirty(&self) -> GitResult<bool> {
        let state = self.enter("is_dirty", Some(FailPoint::Status))?;
        Ok(snapshot(&self.root) != Self::head_tree(&state))
    }

    fn stage_all(&mut self) -> GitResult<()> {
        let mut state = self.enter("stage_all", Some(FailPoint::Stage))?;
        state.index = snapshot(&self.root);
        Ok(())
    }

    fn has_staged_changes(&self) -> GitResult<bool> {
        let state = self.enter("has_staged_changes", None)?;
        Ok(state.index != Self::head_tree(&state))
    }

    fn commit(&mut self, message: &str, identity: Option<&CommitIdentity>) -> GitResult<String> {
        let mut state = self.enter("commit", Some(FailPoint::Commit))?;
        let branch = Self::current_branch(&state)?;
        let index = state.index.clone();
        state.branches.insert(branch.clone(), index);
        state.unborn = None;
        let id = format!("{:040x}", state.commits.len() + 1);
        state.commits.push(MemoryCommit {
            id: id.clone(),
            branch,
            message: message.to_string(),
            author: identity.cloned(),
        });
        Ok(id)
    }

    fn remote_url(&self, name: &str) -> GitResult<Option<String>> {
        let state = self.enter("remote_url", Some(FailPoint::Remote))?;
        Ok(state.remotes.get(name).cloned())
    }

    fn add_remote(&mut self, name: &str, url: &str) -> GitResult<()> {
        let mut state = self.enter("add_remote", Some(FailPoint::Remote))?;
        if state.remotes.contains_key(name) {
            return Err(GitError::Failed {
                command: "add_remote".to_string(),
                stderr: format!("remote {name} already exists"),
            });
        }
        state.remotes.insert(name.to_string(), url.to_string());
        Ok(())
    }

    fn set_remote_url(&mut self, name: &str, url: &str) -> GitResult<()> {
        let mut state = self.enter("set_remote_url", Some(FailPoint::Remote))?;
        state.remotes.insert(name.to_string(), url.to_string());
        Ok(())
    }

    fn push(&mut self, remote: &str, refspec: &str) -> GitResult<()> {
        let mut state = self.enter("push", Some(FailPoint::Push))?;
        if !state.remotes.contains_key(remote) {
            return Err(GitError::Failed {
                command: "push".to_string(),
                stderr: format!("'{remote}' does not appear to be a git repository"),
            });
        }
        state.pushes.push((remote.to_string(), refspec.to_string()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// StaticGenerator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    AuthFailure(String),
    Failure(String),
}

/// Generator that returns the same reply to every request.
#[derive(Debug, Clone)]
pub struct StaticGenerator {
    reply: Reply,
    calls: Arc<AtomicUsize>,
}

impl StaticGenerator {
    pub fn new(text: &str) -> Self {
        Self::with_reply(Reply::Text(text.to_string()))
    }

    /// Fails every request with [`AgentError::Authentication`].
    pub fn rejecting(message: &str) -> Self {
        Self::with_reply(Reply::AuthFailure(message.to_string()))
    }

    /// Fails every request with [`AgentError::Generation`].
    pub fn failing(message: &str) -> Self {
        Self::with_reply(Reply::Failure(message.to_string()))
    }

    fn with_reply(reply: Reply) -> Self {
        StaticGenerator {
            reply,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of `generate` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentGenerator for StaticGenerator {
    async fn generate(&self, _task: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            Reply::Text(text) => Ok(text.clone()),
            Reply::AuthFailure(msg) => Err(AgentError::Authentication(msg.clone())),
            Reply::Failure(msg) => Err(AgentError::Generation(msg.clone())),
        }
    }

    fn model_name(&self) -> &str {
        "static"
    }
}
