use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};
use prompt_eval_core::{
    CoreError, CustomMetricStore, EvaluationOptions, EvaluationRepository, ProjectId, TaskType,
};
use prompt_eval_metrics::CustomMetricsEvaluator;
use prompt_eval_storage::{
    create_pool_with_config, migrate, InMemoryCustomMetricStore, InMemoryEvaluationRepository,
    PgCustomMetricStore, PgEvaluationRepository, PostgresConfig,
};
use prompt_eval_workflow::{EvaluationOrchestrator, HeuristicErrorAnalyzer, HeuristicOptimizer};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

mod config;
mod fixtures;

use config::{Config, LogFormat};
use fixtures::{load_metric_definitions, FileTestGenerator, FixedAnalyzer};

/// Prompt evaluation pipeline
#[derive(Debug, Parser)]
#[command(name = "prompt-eval", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one evaluation and print the finished record as JSON
    Run(RunArgs),

    /// Apply database migrations
    Migrate,
}

#[derive(Debug, Args)]
struct RunArgs {
    /// File containing the prompt text
    #[arg(short, long)]
    prompt_file: PathBuf,

    /// JSON array of test cases
    #[arg(short, long)]
    cases_file: PathBuf,

    /// Task type reported for the prompt
    #[arg(short, long, default_value = "classification")]
    task_type: TaskType,

    /// Output classes (comma-separated)
    #[arg(long, value_delimiter = ',')]
    classes: Vec<String>,

    /// JSON array of custom metric definitions
    #[arg(short, long)]
    metrics_file: Option<PathBuf>,

    /// Project the evaluation belongs to
    #[arg(long, default_value = "1")]
    project: i64,

    /// Evaluation name
    #[arg(short, long)]
    name: Option<String>,

    /// Seed for simulated execution
    #[arg(long)]
    seed: Option<u64>,
}

struct Backend {
    repository: Arc<dyn EvaluationRepository>,
    metric_store: Arc<dyn CustomMetricStore>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load().context("failed to load configuration")?;
    init_logging(&config)?;

    match cli.command {
        Command::Run(args) => run(&config, args).await,
        Command::Migrate => {
            let url = config
                .database_url
                .as_deref()
                .context("database_url must be set to run migrations")?;
            let pool = create_pool_with_config(&PostgresConfig::new(url.to_string())).await?;
            migrate(&pool).await?;
            tracing::info!("Migrations applied");
            Ok(())
        }
    }
}

fn init_logging(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("invalid log filter")?;

    // stdout carries the evaluation JSON.
    match config.log_format {
        LogFormat::Json => {
            let layer = fmt::layer()
                .json()
                .with_current_span(true)
                .with_writer(std::io::stderr)
                .with_filter(filter);
            tracing_subscriber::registry().with(layer).init();
        }
        LogFormat::Pretty => {
            let layer = fmt::layer()
                .pretty()
                .with_writer(std::io::stderr)
                .with_filter(filter);
            tracing_subscriber::registry().with(layer).init();
        }
    }

    Ok(())
}

async fn connect(config: &Config) -> Result<Backend> {
    match &config.database_url {
        Some(url) => {
            let pool = create_pool_with_config(&PostgresConfig::new(url.clone())).await?;
            migrate(&pool).await?;
            tracing::info!("Using PostgreSQL storage");
            Ok(Backend {
                repository: Arc::new(PgEvaluationRepository::new(pool.clone())),
                metric_store: Arc::new(PgCustomMetricStore::new(pool)),
            })
        }
        None => {
            tracing::info!("No database configured, using in-memory storage");
            Ok(Backend {
                repository: Arc::new(InMemoryEvaluationRepository::new()),
                metric_store: Arc::new(InMemoryCustomMetricStore::new()),
            })
        }
    }
}

async fn run(config: &Config, args: RunArgs) -> Result<()> {
    let prompt = tokio::fs::read_to_string(&args.prompt_file)
        .await
        .with_context(|| format!("failed to read {}", args.prompt_file.display()))?;
    let project_id = ProjectId(args.project);
    let backend = connect(config).await?;

    let custom_metrics = Arc::new(CustomMetricsEvaluator::new(backend.metric_store));
    if let Some(path) = &args.metrics_file {
        for metric in load_metric_definitions(path, project_id).await? {
            match custom_metrics.save_metric(&metric).await {
                Ok(saved) => tracing::info!("Registered custom metric {}", saved.name),
                Err(CoreError::AlreadyExists(_)) => {
                    tracing::info!("Custom metric {} already registered", metric.name)
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    let mut orchestrator_config = config.orchestrator_config();
    if args.seed.is_some() {
        orchestrator_config.simulation_seed = args.seed;
    }

    let orchestrator = EvaluationOrchestrator::new(
        backend.repository,
        Arc::new(FixedAnalyzer::new(args.task_type, args.classes)),
        Arc::new(FileTestGenerator::new(&args.cases_file)),
        Arc::new(HeuristicOptimizer::new()),
    )
    .with_error_analyzer(Arc::new(HeuristicErrorAnalyzer))
    .with_custom_metrics(custom_metrics)
    .with_config(orchestrator_config);

    let options = EvaluationOptions {
        name: args.name.unwrap_or_else(|| "cli evaluation".to_string()),
        ..Default::default()
    };
    let evaluation = orchestrator.create_evaluation(project_id, prompt, options).await?;

    let token = CancellationToken::new();
    let interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling evaluation");
            interrupt.cancel();
        }
    });

    let finished = orchestrator
        .run_evaluation_with_cancel(evaluation.id, token)
        .await
        .with_context(|| format!("evaluation {} failed", evaluation.id))?;

    println!("{}", serde_json::to_string_pretty(&finished)?);
    Ok(())
}
