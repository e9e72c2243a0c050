use ans_etl::config::PipelineConfig;
use ans_etl::infra::http_client::ReqwestHttp;
use ans_etl::pipeline::checksum::is_valid_tax_id;
use ans_etl::pipeline::Pipeline;
use ans_etl::{logging, metrics};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "ans_etl")]
#[command(about = "Consolidates and aggregates ANS operator expenses from quarterly statements")]
#[command(version)]
struct Cli {
    /// TOML config file (defaults to ans_etl.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Root directory for downloaded, intermediate and output files
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Number of most recent quarterly archives to obtain
    #[arg(long, global = true)]
    max_periods: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every stage, from download to aggregation
    Run,
    /// Download the most recent quarterly archives
    Fetch,
    /// Extract relevant files from downloaded archives
    Extract,
    /// Build the consolidated expense file from extracted files
    Consolidate,
    /// Join consolidated expenses with the operator registry
    Enrich,
    /// Compute per-operator statistics from the enriched file
    Aggregate,
    /// Write dashboard totals from the aggregated report
    Summary,
    /// Check a CNPJ against its check digits
    Validate {
        tax_id: String,
    },
    /// Show the registered operator for a CNPJ
    Lookup {
        tax_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut config = PipelineConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(max_periods) = cli.max_periods {
        config.max_periods = max_periods;
    }

    let _guard = logging::init_logging(&config.log_dir);
    metrics::init_metrics();

    let http = ReqwestHttp::new(config.timeout())?;
    let pipeline = Pipeline::new(&config, &http);

    let outcome: anyhow::Result<()> = async {
        match cli.command {
            Commands::Run => {
                let summary = pipeline.run().await?;
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
            Commands::Fetch => {
                let report = pipeline.fetch().await?;
                info!(
                    "{} periods available ({} downloaded, {} failed)",
                    report.periods(),
                    report.downloaded,
                    report.failed
                );
            }
            Commands::Extract => {
                let (manifest, report) = pipeline.extract()?;
                info!(
                    "{} files extracted from {} archives",
                    manifest.len(),
                    report.archives_processed
                );
            }
            Commands::Consolidate => {
                let report = pipeline.consolidate()?;
                info!(
                    "{} files processed, {} expense records",
                    report.files_processed, report.records_written
                );
            }
            Commands::Enrich => {
                let registry = pipeline.load_registry().await?;
                pipeline.enrich(&registry)?;
            }
            Commands::Aggregate => {
                pipeline.aggregate()?;
            }
            Commands::Summary => {
                let registry = pipeline.load_registry().await?;
                let stats = pipeline.summarize(&registry)?;
                println!("{}", serde_json::to_string_pretty(&stats)?);
            }
            Commands::Validate { tax_id } => {
                let valid = is_valid_tax_id(&tax_id);
                println!("{}: {}", tax_id, if valid { "valid" } else { "invalid" });
                if !valid {
                    anyhow::bail!("{} failed check-digit validation", tax_id);
                }
            }
            Commands::Lookup { tax_id } => match pipeline.lookup(&tax_id).await? {
                Some(operator) => println!("{}", serde_json::to_string_pretty(&operator)?),
                None => anyhow::bail!("no registered operator with CNPJ {}", tax_id),
            },
        }
        Ok(())
    }
    .await;

    if let Err(e) = &outcome {
        error!("Run failed: {:#}", e);
    }
    outcome
}
