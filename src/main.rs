//! GHG Ledger CLI
//!
//! Runs one activity file through the engine and prints the compliance report
//! as JSON on stdout. Logs go to stderr.

use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::info;

use ghg_ledger::activities::ActivityLoader;
use ghg_ledger::factors::RegistryLoader;
use ghg_ledger::{telemetry, ConfigLoader, Engine, FactorCatalog, FactorRegistry, VerificationLevel};

#[derive(Parser, Debug)]
#[command(name = "ghg_ledger", version)]
#[command(about = "Compute a GHG inventory with GUM uncertainty and a compliance score")]
struct Cli {
    /// Activity records, JSON or YAML.
    activities: PathBuf,
    /// Factor registry replacing the built-in dataset.
    #[arg(long, env = "GHG_LEDGER_REGISTRY")]
    registry: Option<PathBuf>,
    /// Engine configuration file.
    #[arg(long, env = "GHG_LEDGER_CONFIG")]
    config: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = VerificationCli::Unverified)]
    verification: VerificationCli,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum VerificationCli {
    #[value(alias = "none")]
    Unverified,
    #[value(alias = "internal")]
    InternalReview,
    #[value(alias = "limited")]
    LimitedAssurance,
    #[value(alias = "reasonable")]
    ReasonableAssurance,
}

impl From<VerificationCli> for VerificationLevel {
    fn from(value: VerificationCli) -> Self {
        match value {
            VerificationCli::Unverified => VerificationLevel::Unverified,
            VerificationCli::InternalReview => VerificationLevel::InternalReview,
            VerificationCli::LimitedAssurance => VerificationLevel::LimitedAssurance,
            VerificationCli::ReasonableAssurance => VerificationLevel::ReasonableAssurance,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();
    telemetry::init_tracing();

    let args = Cli::parse();

    let config = match &args.config {
        Some(path) => ConfigLoader::new(path).load().await?,
        None => Default::default(),
    };
    let engine = Engine::new(config)?;

    let catalog = FactorCatalog::new(FactorRegistry::builtin()?);
    if let Some(path) = &args.registry {
        catalog.replace(RegistryLoader::new(path).load().await?).await;
    }

    let records = ActivityLoader::new(&args.activities).load().await?;
    let run = engine
        .run_with_catalog(&catalog, &records, args.verification.into())
        .await?;

    info!(
        "Report {}: {} results, {} failures, score {:.1}",
        run.report.report_id,
        run.results.len(),
        run.failures.len(),
        run.report.compliance_score
    );

    println!("{}", run.report.to_json()?);
    Ok(())
}
