use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tabload::app::{LoadUseCase, VerifyUseCase};
use tabload::config::{LoadPlan, Overrides, WriteMode};
use tabload::logging;
use tracing::error;

#[derive(Parser)]
#[command(name = "tabload")]
#[command(about = "Load CSV tables into SQLite or a SPARQL endpoint")]
#[command(version = "0.1.0")]
struct Cli {
    /// Directory for JSON log files
    #[arg(long, global = true, default_value = "logs")]
    log_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load, identify, join and persist every source of a plan
    Load {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Print verification queries against the plan's destination
    Verify {
        #[command(flatten)]
        target: TargetArgs,
        /// Sample rows printed per table
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
    /// Load, identify and join without persisting; print records as JSON lines
    Inspect {
        #[arg(long, default_value = "load_plan.toml")]
        plan: PathBuf,
    },
}

#[derive(clap::Args)]
struct TargetArgs {
    /// Load plan (TOML)
    #[arg(long, default_value = "load_plan.toml")]
    plan: PathBuf,
    /// Write to this SQLite file instead of the plan's destination
    #[arg(long, conflicts_with = "endpoint")]
    sqlite: Option<PathBuf>,
    /// Write to this SPARQL endpoint instead of the plan's destination
    #[arg(long)]
    endpoint: Option<String>,
    /// Base URI for subject IRIs
    #[arg(long)]
    base_uri: Option<String>,
    /// replace or append (relational destinations)
    #[arg(long)]
    mode: Option<WriteMode>,
    /// Prefix prepended to every table name
    #[arg(long)]
    table_prefix: Option<String>,
}

impl TargetArgs {
    fn resolve(self) -> anyhow::Result<LoadPlan> {
        let mut plan = read_plan(&self.plan)?;
        plan.apply_overrides(Overrides {
            sqlite: self.sqlite,
            endpoint: self.endpoint,
            base_uri: self.base_uri,
            mode: self.mode,
            table_prefix: self.table_prefix,
        })?;
        Ok(plan)
    }
}

fn read_plan(path: &Path) -> anyhow::Result<LoadPlan> {
    let mut plan = LoadPlan::from_path(path)
        .with_context(|| format!("invalid load plan {}", path.display()))?;
    plan.apply_env();
    Ok(plan)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let _guard = logging::init_logging(&cli.log_dir);

    let outcome = run(cli.command).await;
    if let Err(e) = &outcome {
        error!("{:#}", e);
    }
    outcome
}

async fn run(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Load { target } => {
            let plan = target.resolve()?;
            let use_case = LoadUseCase::new(plan)?;
            let report = use_case.run().await?;

            println!("\n📊 Load results (run {}):", report.run_id);
            for set in &report.sets {
                println!("   {} -> {}", set.name, set.target);
                println!("      Loaded: {}", set.loaded);
                println!("      Persisted rows/subjects: {}", set.rows);
                if set.statements > 0 {
                    println!("      Statements: {}", set.statements);
                }
            }
        }
        Commands::Verify { target, limit } => {
            let plan = target.resolve()?;
            let use_case = VerifyUseCase::new(plan)?;
            let report = use_case.run(limit).await?;
            print!("{}", report);
        }
        Commands::Inspect { plan } => {
            let plan = read_plan(&plan)?;
            let use_case = LoadUseCase::new(plan)?;
            for set in use_case.prepare()? {
                println!("# {} ({} records)", set.name, set.len());
                for record in &set.records {
                    println!("{}", serde_json::to_string(record)?);
                }
            }
        }
    }
    Ok(())
}
