//! CLI binary for running and inspecting the content pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;

use contentflow_llm::{ClientService, GenerationService, LlmClient, LoggingMiddleware, UsageTrackingMiddleware};
use contentflow_pipeline::{validate, ContentPipeline, PipelineConfig, RunRequest, Severity};
use contentflow_tools::{FirecrawlSearchTool, SearchTool, StaticSearchTool};
use contentflow_types::ErrorReport;

#[derive(Parser)]
#[command(name = "contentflow", version, about = "Research, write and score social content")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Produce one piece of content
    Run {
        /// tweet, blog or linkedin
        #[arg(short, long)]
        content_type: String,

        /// What the content is about
        #[arg(short, long)]
        topic: String,

        #[command(flatten)]
        settings: Settings,

        /// Use this file as research notes instead of searching the web
        #[arg(long)]
        research_file: Option<PathBuf>,

        /// Abort the run after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Write the JSON run report here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the content graph
    Graph {
        #[arg(long, value_enum, default_value = "dot")]
        format: GraphFormat,
    },

    /// Lint the content graph and check the settings
    Validate {
        #[command(flatten)]
        settings: Settings,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum GraphFormat {
    Dot,
    Json,
}

#[derive(clap::Args)]
struct Settings {
    /// Model passed to the generation provider
    #[arg(long, default_value = "gpt-5-mini")]
    model: String,

    /// Minimum accepted score (0-10)
    #[arg(long, default_value = "8")]
    threshold: u8,

    /// Regenerate cycles before accepting a low-scoring draft
    #[arg(long, default_value = "3")]
    max_retries: u32,

    /// Characters of research kept for the writer
    #[arg(long, default_value = "2000")]
    research_budget: usize,

    /// Hard cap on engine epochs
    #[arg(long, default_value = "64")]
    max_epochs: usize,
}

impl Settings {
    fn config(&self) -> PipelineConfig {
        PipelineConfig {
            model: self.model.clone(),
            threshold: self.threshold,
            max_retries: self.max_retries,
            research_budget_chars: self.research_budget,
            max_epochs: self.max_epochs,
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            content_type,
            topic,
            settings,
            research_file,
            timeout_secs,
            output,
        } => {
            let mut config = settings.config();
            config.timeout = timeout_secs.map(Duration::from_secs);
            cmd_run(
                RunRequest::new(content_type, topic),
                config,
                research_file.as_deref(),
                output.as_deref(),
            )
            .await?;
        }
        Commands::Graph { format } => {
            cmd_graph(format)?;
        }
        Commands::Validate { settings } => {
            cmd_validate(settings.config())?;
        }
    }

    Ok(())
}

/// A pipeline whose collaborators are never called, for introspection.
fn offline_pipeline(config: PipelineConfig) -> contentflow_types::Result<ContentPipeline> {
    let service = ClientService::new(LlmClient::new(), config.model.clone());
    ContentPipeline::new(Arc::new(service), Arc::new(StaticSearchTool::new("")), config)
}

async fn cmd_run(
    request: RunRequest,
    config: PipelineConfig,
    research_file: Option<&Path>,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    // Bad inputs are reported before any provider credentials are needed
    if let Err(e) = request.validate() {
        fail(&e)?;
    }

    let usage = UsageTrackingMiddleware::new();
    let client = LlmClient::from_env()?
        .with_middleware(LoggingMiddleware)
        .with_middleware(usage.clone());
    let service: Arc<dyn GenerationService> = Arc::new(ClientService::new(client, config.model.clone()));

    let search: Arc<dyn SearchTool> = match research_file {
        Some(path) => Arc::new(StaticSearchTool::new(std::fs::read_to_string(path)?)),
        None => Arc::new(FirecrawlSearchTool::from_env()?),
    };

    let pipeline = ContentPipeline::new(service, search, config)?;

    let token = CancellationToken::new();
    let on_interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping before the next stage");
            on_interrupt.cancel();
        }
    });

    let report = match pipeline.run_with_cancel(request, token).await {
        Ok(report) => report,
        Err(e) => return fail(&e),
    };

    println!("{}", report.artifact.render());
    println!();
    match &report.score {
        Some(score) => println!("Score: {}/10 ({})", score.value, score.reason),
        None => println!("Score: none"),
    }
    println!("Regenerations: {}", report.retry_count);
    for warning in &report.warnings {
        println!("Warning [{}]: {}", warning.stage, warning.message);
    }
    println!(
        "Tokens: {} in / {} out over {} requests",
        usage.total_input_tokens(),
        usage.total_output_tokens(),
        usage.requests()
    );

    if let Some(path) = output {
        report.save(path)?;
        println!("Report written to {}", path.display());
    }

    Ok(())
}

/// Print the structured error report to stderr and exit 1.
fn fail(err: &contentflow_types::ContentflowError) -> anyhow::Result<()> {
    let report = ErrorReport::from(err);
    eprintln!("{}", serde_json::to_string_pretty(&report)?);
    std::process::exit(1);
}

fn cmd_graph(format: GraphFormat) -> anyhow::Result<()> {
    let pipeline = offline_pipeline(PipelineConfig::default())?;
    match format {
        GraphFormat::Dot => print!("{}", pipeline.graph().to_dot()),
        GraphFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&pipeline.graph().describe())?)
        }
    }
    Ok(())
}

fn cmd_validate(config: PipelineConfig) -> anyhow::Result<()> {
    let pipeline = match offline_pipeline(config) {
        Ok(p) => p,
        Err(e) => {
            println!("[ERROR] {}", e);
            std::process::exit(1);
        }
    };

    let diagnostics = validate(&pipeline.graph().describe());
    if diagnostics.is_empty() {
        println!("Content graph is valid");
        return Ok(());
    }

    let mut has_error = false;
    for diag in &diagnostics {
        if diag.severity == Severity::Error {
            has_error = true;
        }
        println!("[{}] {}: {}", diag.severity, diag.rule, diag.message);
    }

    if has_error {
        std::process::exit(1);
    }
    Ok(())
}
