//! Contribs - organization contributor ranking CLI
//!
//! The `contribs` command lists every repository of a GitHub organization,
//! fetches each repository's contributors with the selected execution
//! strategy and prints the merged ranking.
//!
//! ## Commands
//!
//! - `load`: Load and rank an organization's contributors
//! - `variants`: List the available execution strategies

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use contribs_core::{
    init_tracing, AggregatedContributor, AggregatedResult, ExecutionConfig, LoadController,
    LoadState, Organization, SourceGateway, TracingSink, Variant, DEFAULT_STREAM_BUFFER,
};
use contribs_core::metrics::METRICS;
use contribs_github::{GitHubConfig, GitHubGateway, DEFAULT_API_URL};
use serde::Serialize;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "contribs")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Rank an organization's contributors across all of its repositories", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines and a JSON report
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and rank an organization's contributors
    Load(LoadArgs),

    /// List the available execution strategies
    Variants,
}

#[derive(Args, Debug)]
struct LoadArgs {
    /// Organization to load
    #[arg(short, long, env = "CONTRIBS_ORG")]
    org: String,

    /// Execution strategy (see `contribs variants`)
    #[arg(long, default_value = "fan-out")]
    variant: Variant,

    /// GitHub account name for basic auth
    #[arg(short, long, env = "GITHUB_USERNAME")]
    username: Option<String>,

    /// GitHub personal access token
    #[arg(short, long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// GitHub API base URL
    #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Cancel the load after this many seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Buffer capacity of the buffered-streaming strategy
    #[arg(long, env = "CONTRIBS_STREAM_BUFFER", default_value_t = DEFAULT_STREAM_BUFFER)]
    stream_buffer: usize,

    /// Show only the first N contributors
    #[arg(long, value_name = "N")]
    top: Option<usize>,
}

impl LoadArgs {
    fn github_config(&self) -> GitHubConfig {
        let config = GitHubConfig::new(&self.api_url);
        match (&self.username, &self.token) {
            (Some(username), Some(token)) => config.with_credentials(username, token),
            (None, Some(token)) => config.with_token(token),
            _ => config,
        }
    }

    fn execution_config(&self) -> ExecutionConfig {
        ExecutionConfig::default().with_stream_buffer(self.stream_buffer)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    match cli.command {
        Commands::Load(args) => cmd_load(&args, cli.json).await,
        Commands::Variants => cmd_variants(cli.json),
    }
}

/// Load an organization and print the ranking
async fn cmd_load(args: &LoadArgs, json: bool) -> Result<()> {
    if args.username.is_some() && args.token.is_none() {
        bail!("--username requires --token (or GITHUB_TOKEN)");
    }
    let gateway = GitHubGateway::new(args.github_config())
        .context("Failed to configure GitHub client")?;

    let org = Organization::new(args.org.as_str());
    let deadline = args.timeout.map(Duration::from_secs);
    let state = load_until_settled(
        Arc::new(gateway),
        args.execution_config(),
        org.clone(),
        args.variant,
        deadline,
    )
    .await;
    METRICS.flush();

    let output = render_outcome(&org, args.variant, state, args.top, json)?;
    println!("{}", output);
    Ok(())
}

/// Run one load to its terminal state; Ctrl-C cancels it.
async fn load_until_settled(
    gateway: Arc<dyn SourceGateway>,
    config: ExecutionConfig,
    org: Organization,
    variant: Variant,
    deadline: Option<Duration>,
) -> LoadState {
    let controller = LoadController::new(gateway, Arc::new(TracingSink)).with_config(config);
    let run = controller.run(org, variant, deadline);
    tokio::pin!(run);

    tokio::select! {
        state = &mut run => state,
        Ok(()) = tokio::signal::ctrl_c() => {
            warn!("interrupted, canceling load");
            controller.cancel();
            run.await
        }
    }
}

/// Turn a terminal state into printable output, or an error for loads that
/// did not complete.
fn render_outcome(
    org: &Organization,
    variant: Variant,
    state: LoadState,
    top: Option<usize>,
    json: bool,
) -> Result<String> {
    let status = state.status_line();
    match state {
        LoadState::Completed { result, elapsed } => {
            info!(org = %org, users = result.len(), "load completed");
            if json {
                let report = Report::new(org, variant, &result, elapsed, top);
                Ok(serde_json::to_string_pretty(&report)?)
            } else {
                Ok(format!("{}\n{}", render_table(&result, top), status))
            }
        }
        LoadState::Canceled => bail!("load of '{}' canceled", org),
        LoadState::Failed { cause } => {
            Err(anyhow::Error::new(cause).context(format!("load of '{}' failed", org)))
        }
        LoadState::InProgress { .. } => bail!("load of '{}' did not settle", org),
    }
}

/// JSON report of a completed load
#[derive(Debug, Serialize)]
struct Report<'a> {
    org: &'a str,
    variant: Variant,
    finished_at: DateTime<Utc>,
    elapsed_ms: u64,
    contributors: &'a [AggregatedContributor],
}

impl<'a> Report<'a> {
    fn new(
        org: &'a Organization,
        variant: Variant,
        result: &'a AggregatedResult,
        elapsed: Duration,
        top: Option<usize>,
    ) -> Self {
        let all = result.as_slice();
        let shown = top.map_or(all.len(), |n| n.min(all.len()));
        Report {
            org: org.as_str(),
            variant,
            finished_at: Utc::now(),
            elapsed_ms: elapsed.as_millis() as u64,
            contributors: &all[..shown],
        }
    }
}

fn render_table(result: &AggregatedResult, top: Option<usize>) -> String {
    if result.is_empty() {
        return "No contributors found".to_string();
    }
    let shown = top.unwrap_or(result.len());
    let width = result
        .iter()
        .take(shown)
        .map(|c| c.login.len())
        .max()
        .unwrap_or(0)
        .max("LOGIN".len());

    let mut out = format!("{:>4}  {:<width$}  {:>13}", "RANK", "LOGIN", "CONTRIBUTIONS");
    for (rank, contributor) in result.iter().take(shown).enumerate() {
        out.push_str(&format!(
            "\n{:>4}  {:<width$}  {:>13}",
            rank + 1,
            contributor.login,
            contributor.total_contributions
        ));
    }
    if shown < result.len() {
        out.push_str(&format!("\n... {} more", result.len() - shown));
    }
    out
}

/// List execution strategies
fn cmd_variants(json: bool) -> Result<()> {
    println!("{}", render_variants(json)?);
    Ok(())
}

fn render_variants(json: bool) -> Result<String> {
    if json {
        let entries: Vec<serde_json::Value> = Variant::ALL
            .iter()
            .map(|v| {
                serde_json::json!({
                    "name": v.as_str(),
                    "description": v.describe(),
                    "reports_progress": v.reports_progress(),
                })
            })
            .collect();
        return Ok(serde_json::to_string_pretty(&entries)?);
    }

    let lines: Vec<String> = Variant::ALL
        .iter()
        .map(|v| format!("{:<24} {}", v.as_str(), v.describe()))
        .collect();
    Ok(lines.join("\n"))
}
