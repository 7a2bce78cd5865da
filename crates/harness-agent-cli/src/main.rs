//! Harness Agent CLI
//!
//! The `harness-agent` command asks a model for a Harness pipeline, validates
//! it and publishes it to a git remote.
//!
//! ## Commands
//!
//! - `run`: Generate, validate, write and publish the pipeline
//! - `validate`: Check an existing pipeline document offline
//! - `prompt`: Print the task sent to the model

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, Level};

use harness_agent_core::config::{
    ENV_API_BASE_URL, ENV_API_KEY, ENV_ARTIFACT, ENV_AUTHOR_EMAIL, ENV_AUTHOR_NAME, ENV_BRANCH,
    ENV_COMMIT_MESSAGE, ENV_MODEL, ENV_REMOTE, ENV_REMOTE_URL, ENV_REPO, ENV_TIMEOUT_SECS,
};
use harness_agent_core::{
    init_tracing, validate_file, AgentConfig, AgentWorkflow, GitCli, LogFormat, OpenAiGenerator,
    PublishOutcome, RunReport,
};

#[derive(Parser)]
#[command(name = "harness-agent")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Generate a Harness pipeline with an LLM and publish it to git", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the pipeline, write it and push it if anything changed
    Run(RunArgs),

    /// Validate an existing pipeline document
    Validate {
        /// Path to the YAML document
        path: PathBuf,
    },

    /// Print the task prompt sent to the model
    Prompt,
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Provider API key
    #[arg(long, env = ENV_API_KEY, hide_env_values = true)]
    api_key: Option<String>,

    /// Model identifier
    #[arg(long, env = ENV_MODEL)]
    model: Option<String>,

    /// OpenAI-compatible API base URL
    #[arg(long, env = ENV_API_BASE_URL)]
    api_base_url: Option<String>,

    /// Working-tree root (default: current directory)
    #[arg(long, env = ENV_REPO)]
    repo: Option<PathBuf>,

    /// URL the remote must point at
    #[arg(long, env = ENV_REMOTE_URL)]
    remote_url: Option<String>,

    /// Remote name
    #[arg(long, env = ENV_REMOTE)]
    remote: Option<String>,

    /// Target branch
    #[arg(long, env = ENV_BRANCH)]
    branch: Option<String>,

    /// Artifact path relative to the repository root
    #[arg(long, env = ENV_ARTIFACT)]
    artifact: Option<PathBuf>,

    /// Commit message for the publish commit
    #[arg(short, long, env = ENV_COMMIT_MESSAGE)]
    message: Option<String>,

    /// Commit author name (requires --author-email)
    #[arg(long, env = ENV_AUTHOR_NAME)]
    author_name: Option<String>,

    /// Commit author email (requires --author-name)
    #[arg(long, env = ENV_AUTHOR_EMAIL)]
    author_email: Option<String>,

    /// Timeout in seconds for the generation request
    #[arg(long, env = ENV_TIMEOUT_SECS)]
    timeout_secs: Option<String>,

    /// Print the run report as JSON on success
    #[arg(long)]
    emit_report: bool,
}

impl RunArgs {
    /// Resolved value for a configuration variable, flag or environment.
    fn value(&self, key: &str) -> Option<String> {
        let path = |p: &Option<PathBuf>| p.as_ref().map(|p| p.display().to_string());
        match key {
            ENV_API_KEY => self.api_key.clone(),
            ENV_MODEL => self.model.clone(),
            ENV_API_BASE_URL => self.api_base_url.clone(),
            ENV_REPO => path(&self.repo),
            ENV_REMOTE_URL => self.remote_url.clone(),
            ENV_REMOTE => self.remote.clone(),
            ENV_BRANCH => self.branch.clone(),
            ENV_ARTIFACT => path(&self.artifact),
            ENV_COMMIT_MESSAGE => self.message.clone(),
            ENV_AUTHOR_NAME => self.author_name.clone(),
            ENV_AUTHOR_EMAIL => self.author_email.clone(),
            ENV_TIMEOUT_SECS => self.timeout_secs.clone(),
            _ => None,
        }
    }

    fn config(&self, cwd: &Path) -> Result<AgentConfig> {
        AgentConfig::from_lookup(cwd, |key| self.value(key)).context("Invalid configuration")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; the environment may already be populated.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(LogFormat::from_json_flag(cli.json), level, std::io::stderr);

    match cli.command {
        Commands::Run(args) => cmd_run(&args).await,
        Commands::Validate { path } => cmd_validate(&path),
        Commands::Prompt => cmd_prompt(),
    }
}

async fn cmd_run(args: &RunArgs) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let config = args.config(&cwd)?;
    info!(model = %config.model, root = ?config.repo_root, "Starting harness agent");

    let generator = OpenAiGenerator::from_config(&config).context("Failed to build model client")?;
    let backend = GitCli::new(&config.repo_root);

    let report = tokio::select! {
        result = AgentWorkflow::run(&config, &generator, backend) => {
            result.context("Harness agent run failed")?
        }
        _ = tokio::signal::ctrl_c() => {
            anyhow::bail!("Interrupted before the run completed");
        }
    };

    print_report(&report, args.emit_report)
}

fn print_report(report: &RunReport, emit_json: bool) -> Result<()> {
    for line in summary_lines(report) {
        println!("{line}");
    }
    if emit_json {
        let json = serde_json::to_string_pretty(report).context("Failed to serialize run report")?;
        println!("{json}");
    }
    Ok(())
}

fn summary_lines(report: &RunReport) -> Vec<String> {
    let mut lines = vec![format!(
        "Harness pipeline generated at: {}",
        report.artifact_path.display()
    )];
    match &report.outcome {
        PublishOutcome::Published {
            remote, refspec, ..
        } => lines.push(format!("Changes committed and pushed to {remote} ({refspec})")),
        PublishOutcome::NothingToPublish => {
            lines.push("No changes to commit. Agent finished.".to_string())
        }
    }
    lines
}

fn cmd_validate(path: &Path) -> Result<()> {
    let document = validate_file(path)
        .with_context(|| format!("{} is not a valid pipeline document", path.display()))?;

    println!("✓ {} is valid YAML", path.display());
    println!("  Bytes:  {}", document.len());
    println!("  Digest: {}", document.digest);
    Ok(())
}

fn cmd_prompt() -> Result<()> {
    print!("{}", harness_agent_core::config::DEFAULT_TASK);
    Ok(())
}
