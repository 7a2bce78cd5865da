//! Git access for the publisher.
//!
//! [`RepositoryBackend`] is the seam between the publish state machine and
//! version control. [`GitCli`] implements it by running the `git` binary in
//! the working tree; `fakes::MemoryRepository` implements it in memory.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use crate::config::CommitIdentity;
use crate::error::GitError;

pub type GitResult<T> = std::result::Result<T, GitError>;

/// Where HEAD points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadState {
    /// HEAD names a branch (possibly one with no commits yet).
    Branch(String),
    Detached,
}

/// Version-control operations the publisher needs, in the order it uses them.
pub trait RepositoryBackend {
    /// Working-tree root.
    fn root(&self) -> &Path;

    /// Whether version-control metadata exists at the root.
    fn has_metadata(&self) -> bool;

    /// Create metadata at the root (and the root itself if missing).
    fn init(&mut self) -> GitResult<()>;

    /// Confirm the metadata is a usable repository whose work tree is the root.
    fn verify(&self) -> GitResult<()>;

    fn head(&self) -> GitResult<HeadState>;

    /// Whether a local branch named `name` exists (has a ref).
    fn branch_exists(&self, name: &str) -> GitResult<bool>;

    /// Point HEAD (and the working tree) at an existing branch.
    fn switch_branch(&mut self, name: &str) -> GitResult<()>;

    /// Create `name` from the current position and check it out.
    fn create_branch(&mut self, name: &str) -> GitResult<()>;

    /// Whether anything differs from the last commit, untracked files included.
    fn is_dirty(&self) -> GitResult<bool>;

    /// Stage every change, tracked and untracked, in one index update.
    fn stage_all(&mut self) -> GitResult<()>;

    /// Whether the index differs from HEAD.
    fn has_staged_changes(&self) -> GitResult<bool>;

    /// Commit the index and return the new commit id.
    fn commit(&mut self, message: &str, identity: Option<&CommitIdentity>) -> GitResult<String>;

    /// URL of remote `name`, or `None` if it is not configured.
    fn remote_url(&self, name: &str) -> GitResult<Option<String>>;

    fn add_remote(&mut self, name: &str, url: &str) -> GitResult<()>;

    fn set_remote_url(&mut self, name: &str, url: &str) -> GitResult<()>;

    /// Push with an explicit `src:dst` refspec.
    fn push(&mut self, remote: &str, refspec: &str) -> GitResult<()>;
}

/// [`RepositoryBackend`] backed by the `git` command-line tool.
#[derive(Debug, Clone)]
pub struct GitCli {
    root: PathBuf,
}

impl GitCli {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        GitCli { root: root.into() }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.args(args)
            .current_dir(&self.root)
            .env("GIT_TERMINAL_PROMPT", "0");
        // Stop repository discovery at the root so an enclosing repository
        // is never picked up in place of a missing or broken one.
        if let Some(parent) = std::path::absolute(&self.root)
            .ok()
            .and_then(|root| root.parent().map(Path::to_path_buf))
        {
            cmd.env("GIT_CEILING_DIRECTORIES", parent);
        }
        cmd
    }

    fn output(&self, args: &[&str]) -> GitResult<Output> {
        tracing::trace!(args = ?args, "git");
        Ok(self.command(args).output()?)
    }

    /// Run git and return trimmed stdout, failing on a non-zero exit.
    fn run(&self, args: &[&str]) -> GitResult<String> {
        let output = self.output(args)?;
        if !output.status.success() {
            return Err(failure(args, &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Run a git query whose exit code 0/1 means yes/no.
    fn exit_flag(&self, args: &[&str]) -> GitResult<bool> {
        let output = self.output(args)?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(failure(args, &output)),
        }
    }
}

fn failure(args: &[&str], output: &Output) -> GitError {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    GitError::Failed {
        command: args.join(" "),
        stderr: if stderr.is_empty() {
            format!("exited with {}", output.status)
        } else {
            stderr
        },
    }
}

impl RepositoryBackend for GitCli {
    fn root(&self) -> &Path {
        &self.root
    }

    fn has_metadata(&self) -> bool {
        self.root.join(".git").exists()
    }

    fn init(&mut self) -> GitResult<()> {
        std::fs::create_dir_all(&self.root)?;
        self.run(&["init", "--quiet"]).map(drop)
    }

    fn verify(&self) -> GitResult<()> {
        let toplevel = self.run(&["rev-parse", "--show-toplevel"])?;
        let found = std::fs::canonicalize(&toplevel)?;
        let expected = std::fs::canonicalize(&self.root)?;
        if found != expected {
            return Err(GitError::UnexpectedOutput(format!(
                "work tree is {}, expected {}",
                found.display(),
                expected.display()
            )));
        }
        Ok(())
    }

    fn head(&self) -> GitResult<HeadState> {
        let args = ["symbolic-ref", "--quiet", "--short", "HEAD"];
        let output = self.output(&args)?;
        match output.status.code() {
            Some(0) => {
                let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if name.is_empty() {
                    return Err(GitError::UnexpectedOutput(
                        "symbolic-ref HEAD returned an empty branch name".to_string(),
                    ));
                }
                Ok(HeadState::Branch(name))
            }
            Some(1) => Ok(HeadState::Detached),
            _ => Err(failure(&args, &output)),
        }
    }

    fn branch_exists(&self, name: &str) -> GitResult<bool> {
        let reference = format!("refs/heads/{name}");
        self.exit_flag(&["show-ref", "--verify", "--quiet", &reference])
    }

    fn switch_branch(&mut self, name: &str) -> GitResult<()> {
        self.run(&["checkout", "--quiet", name]).map(drop)
    }

    fn create_branch(&mut self, name: &str) -> GitResult<()> {
        self.run(&["checkout", "--quiet", "-b", name]).map(drop)
    }

    fn is_dirty(&self) -> GitResult<bool> {
        let status = self.run(&["status", "--porcelain", "--untracked-files=all"])?;
        Ok(!status.is_empty())
    }

    fn stage_all(&mut self) -> GitResult<()> {
        self.run(&["add", "--all"]).map(drop)
    }

    fn has_staged_changes(&self) -> GitResult<bool> {
        // exit 1 means the index differs from HEAD
        self.exit_flag(&["diff", "--cached", "--quiet"]).map(|same| !same)
    }

    fn commit(&mut self, message: &str, identity: Option<&CommitIdentity>) -> GitResult<String> {
        let mut args: Vec<String> = Vec::new();
        if let Some(identity) = identity {
            args.push("-c".to_string());
            args.push(format!("user.name={}", identity.name));
            args.push("-c".to_string());
            args.push(format!("user.email={}", identity.email));
        }
        args.extend(["commit", "--quiet", "-m", message].map(String::from));
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&args)?;
        capture_head_sha(&self.root)
    }

    fn remote_url(&self, name: &str) -> GitResult<Option<String>> {
        let remotes = self.run(&["remote"])?;
        if !remotes.lines().any(|r| r.trim() == name) {
            return Ok(None);
        }
        self.run(&["remote", "get-url", name]).map(Some)
    }

    fn add_remote(&mut self, name: &str, url: &str) -> GitResult<()> {
        self.run(&["remote", "add", name, url]).map(drop)
    }

    fn set_remote_url(&mut self, name: &str, url: &str) -> GitResult<()> {
        self.run(&["remote", "set-url", name, url]).map(drop)
    }

    fn push(&mut self, remote: &str, refspec: &str) -> GitResult<()> {
        self.run(&["push", "--quiet", remote, refspec]).map(drop)
    }
}

/// Capture the HEAD commit SHA from a git repository.
///
/// Runs `git rev-parse HEAD` in the given directory. Returns an error if the
/// directory is not inside a git repository or if git is not available.
pub fn capture_head_sha(repo_dir: &Path) -> GitResult<String> {
    let sha = GitCli::new(repo_dir).run(&["rev-parse", "HEAD"])?;
    if sha.is_empty() {
        return Err(GitError::UnexpectedOutput(
            "git rev-parse HEAD returned empty output".to_string(),
        ));
    }
    Ok(sha)
}

/// Check whether a directory is inside a git work tree.
pub fn is_git_repo(dir: &Path) -> bool {
    Command::new("git")
        .args(["rev-parse", "--is-inside-work-tree"])
        .current_dir(dir)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
