//! CLI entry point for the SLR discovery pipeline.

use clap::{Parser, Subcommand};
use slr_discovery::pipeline::criteria::{CriteriaMode, CriteriaOptions};
use slr_discovery::pipeline::harvest::HarvestOptions;
use slr_discovery::pipeline::harvest_other::HarvestOtherOptions;
use slr_discovery::pipeline::keywords::KeywordsOptions;
use slr_discovery::pipeline::seed::SeedOptions;
use slr_discovery::pipeline::snowball::SnowballOptions;
use slr_discovery::pipeline::snowball_iterate::{SnowballIterateOptions, StoppingMode};
use slr_discovery::pipeline::{criteria, filter_seed, harvest, harvest_other, keywords, review, seed, snowball, snowball_iterate};
use slr_discovery::pipeline::runner::StageResult;
use slr_discovery::shared::config::{Config, LlmProviderType};
use slr_discovery::shared::logger::init_logger;
use slr_discovery::services::Services;
use slr_discovery::workspace::WorkspaceLayout;
use std::path::PathBuf;

/// SLR Discovery - staged, resumable systematic literature review discovery pipeline.
#[derive(Parser)]
#[command(name = "slr-discovery")]
#[command(version, about, long_about = None)]
struct Cli {
    /// The review topic, e.g. "diffusion models for audio synthesis".
    #[arg(long, global = true)]
    topic: String,

    /// Root directory under which per-topic workspaces are created.
    #[arg(long, global = true, default_value = "workspaces")]
    workspace_root: PathBuf,

    /// LLM provider backend.
    #[arg(long, global = true)]
    provider: Option<LlmProviderType>,

    /// Re-run the stage even if its primary output already exists.
    #[arg(long, global = true)]
    force: bool,

    /// Emit structured JSON logs instead of compact human-readable ones.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover seed surveys on arXiv and apply the same-name cutoff rule.
    Seed {
        #[arg(long, default_value = "200")]
        max_results: usize,
        #[arg(long, default_value = "10")]
        download_top_k: usize,
    },
    /// Screen the seed pool's title+abstract for topical relevance.
    FilterSeed {
        #[arg(long, default_value = "5")]
        k_min: usize,
    },
    /// Extract anchor terms and per-category search terms from filtered seeds.
    Keywords {
        #[arg(long, default_value = "10")]
        max_pdfs: usize,
    },
    /// Harvest arXiv metadata across the generated search-term matrix.
    Harvest,
    /// Harvest Semantic Scholar, DBLP, and OpenAlex in parallel.
    HarvestOther,
    /// Synthesize inclusion/exclusion criteria from web research.
    Criteria {
        /// Also ground the criteria in a background PDF's extracted text.
        #[arg(long)]
        background_pdf: Option<PathBuf>,
    },
    /// Run the hard pre-filter and LatteReview workflow over harvested papers.
    Review,
    /// Run a single Snowball round (citation expansion from the prior round's inclusions).
    Snowball {
        #[arg(long, default_value = "1")]
        round: u32,
    },
    /// Run Snowball Iterate: repeated citation expansion until a stopping condition fires.
    SnowballIterate {
        #[arg(long, default_value = "loop")]
        mode: String,
        #[arg(long, default_value = "3")]
        max_rounds: u32,
        #[arg(long)]
        stop_raw_threshold: Option<usize>,
        #[arg(long)]
        stop_included_threshold: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();
    init_logger(cli.json_logs)?;

    let config = Config::from_env()?;
    let provider = cli.provider.unwrap_or(config.default_llm_provider);
    config.require_provider_ready(provider)?;

    let services = Services::from_config(&config, provider)?;
    let layout = WorkspaceLayout::for_topic(&cli.workspace_root, &cli.topic);

    let result = match cli.command {
        Commands::Seed { max_results, download_top_k } => {
            let options = SeedOptions { max_results, download_top_k, ..SeedOptions::default() };
            seed::run(&services, &layout, &cli.topic, &options, cli.force).await
        }
        Commands::FilterSeed { k_min } => {
            let options = filter_seed::FilterSeedOptions { k_min, ..filter_seed::FilterSeedOptions::default() };
            filter_seed::run(&services, &layout, &cli.topic, &options, cli.force).await
        }
        Commands::Keywords { max_pdfs } => {
            let options = KeywordsOptions { max_pdfs, ..KeywordsOptions::default() };
            keywords::run(&services, &layout, &cli.topic, &options, cli.force).await
        }
        Commands::Harvest => harvest::run(&services, &layout, &HarvestOptions::default(), cli.force).await,
        Commands::HarvestOther => {
            harvest_other::run(&services, &layout, &HarvestOtherOptions::default(), cli.force).await
        }
        Commands::Criteria { background_pdf } => {
            let mode = if background_pdf.is_some() { CriteriaMode::PdfAndWeb } else { CriteriaMode::Web };
            let options = CriteriaOptions { mode, background_pdf, ..CriteriaOptions::default() };
            criteria::run(&services, &layout, &cli.topic, &options, cli.force).await
        }
        Commands::Review => review::run(&services, &layout, cli.force).await,
        Commands::Snowball { round } => {
            let criteria_doc = load_criteria(&layout)?;
            snowball::run(&services, &layout, &criteria_doc, &SnowballOptions::default(), round, cli.force).await
        }
        Commands::SnowballIterate { mode, max_rounds, stop_raw_threshold, stop_included_threshold } => {
            let criteria_doc = load_criteria(&layout)?;
            let options = SnowballIterateOptions {
                mode: if mode == "while" { StoppingMode::While } else { StoppingMode::Loop },
                max_rounds,
                stop_raw_threshold: stop_raw_threshold.unwrap_or(usize::MAX),
                stop_included_threshold: stop_included_threshold.unwrap_or(usize::MAX),
                round: SnowballOptions::default(),
            };
            run_snowball_iterate(&services, &layout, &criteria_doc, &options, cli.force).await
        }
    };

    match result.status {
        slr_discovery::pipeline::runner::StageStatus::Failed => eprintln!("{}", result.describe()),
        _ => {
            println!("{}: {:?}", result.stage, result.status);
            for (key, value) in &result.metrics {
                println!("  {key}: {value}");
            }
        }
    }
    std::process::exit(result.exit_code());
}

fn load_criteria(layout: &WorkspaceLayout) -> anyhow::Result<slr_discovery::models::CriteriaDocument> {
    let bytes = std::fs::read(layout.criteria_json())?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn run_snowball_iterate(
    services: &Services,
    layout: &WorkspaceLayout,
    criteria: &slr_discovery::models::CriteriaDocument,
    options: &SnowballIterateOptions,
    force: bool,
) -> StageResult {
    snowball_iterate::run_stage(services, layout, criteria, options, force).await
}
