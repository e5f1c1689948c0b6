//! uuid-pg-migrate CLI - load UUID-keyed exports into integer-keyed PostgreSQL tables.

use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use uuid_pg_migrate::{Config, LoadPlan, MigrateError, Orchestrator, RunStatus};

#[derive(Parser)]
#[command(name = "uuid-pg-migrate")]
#[command(about = "Migrate UUID-keyed records into integer-keyed PostgreSQL tables")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "migrate.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load every table (the default when no command is given)
    Run {
        /// Override source directory (json_dir sources)
        #[arg(long)]
        source_dir: Option<PathBuf>,

        /// Override target schema
        #[arg(long)]
        target_schema: Option<String>,

        /// Dry run: load into memory without touching the target database
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the table load order without connecting
    Plan,

    /// Test source and target connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitCode, MigrateError> {
    let cli = Cli::parse();

    // Connection settings may live in a .env file next to the config.
    if let Ok(path) = dotenvy::dotenv() {
        eprintln!("Loaded environment from {}", path.display());
    }

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| MigrateError::Config(e.to_string()))?;

    let mut config = Config::read(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    let command = cli.command.unwrap_or(Commands::Run {
        source_dir: None,
        target_schema: None,
        dry_run: false,
    });

    // Validate after overrides: --source-dir may supply source.dir.
    if let Commands::Run {
        source_dir,
        target_schema,
        ..
    } = &command
    {
        if let Some(dir) = source_dir {
            config.source.dir = Some(dir.clone());
        }
        if let Some(schema) = target_schema {
            config.target.schema = schema.clone();
        }
    }
    config.validate()?;

    match command {
        Commands::Run { dry_run, .. } => {
            let report = Orchestrator::new(config)?
                .with_dry_run(dry_run)
                .run()
                .await?;

            if cli.output_json {
                println!("{}", report.to_json()?);
            } else {
                println!("\n{}", report.render_text());
            }

            if report.status == RunStatus::Aborted {
                eprintln!("Migration aborted: a source table could not be read");
                return Ok(ExitCode::from(1));
            }
        }

        Commands::Plan => {
            let plan = LoadPlan::build(&config.tables)?;
            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&plan_json(&plan))?);
            } else {
                println!("Load order ({} tables):", plan.len());
                for (i, spec) in plan.tables().iter().enumerate() {
                    let mut notes = Vec::new();
                    if let Some(identity) = &spec.identity {
                        notes.push(format!("identity: {}", identity.scope));
                    }
                    let refs: Vec<&str> = spec.referenced_scopes().collect();
                    if !refs.is_empty() {
                        notes.push(format!("references: {}", refs.join(", ")));
                    }
                    if notes.is_empty() {
                        println!("  {}. {}", i + 1, spec.name);
                    } else {
                        println!("  {}. {} ({})", i + 1, spec.name, notes.join("; "));
                    }
                }
            }
        }

        Commands::HealthCheck => {
            let orchestrator = Orchestrator::new(config)?;
            let result = orchestrator.health_check().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source ({}): {} ({}ms)",
                    result.source_type,
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Target (PostgreSQL): {} ({}ms)",
                    if result.target_connected { "OK" } else { "FAILED" },
                    result.target_latency_ms
                );
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(MigrateError::Config("Health check failed".to_string()));
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn plan_json(plan: &LoadPlan) -> serde_json::Value {
    let tables: Vec<serde_json::Value> = plan
        .tables()
        .iter()
        .enumerate()
        .map(|(i, spec)| {
            json!({
                "position": i + 1,
                "table": spec.name,
                "source": spec.source_table(),
                "identity": spec.identity.as_ref().map(|id| id.scope.clone()),
                "references": spec.referenced_scopes().collect::<Vec<_>>(),
            })
        })
        .collect();
    json!({ "tables": tables })
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}
