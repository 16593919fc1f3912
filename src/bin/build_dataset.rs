use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tracing::{error, info};

use vehicle_pricing::logging::{init_tracing, DEFAULT_FILTER};
use vehicle_pricing::model::VehicleType;
use vehicle_pricing::sources::{AuxiliarySource, HtmlAuxiliarySource, HttpFetcher, TableRowParser};
use vehicle_pricing::{run_pipeline, PipelineConfig};

#[derive(Parser, Debug)]
#[command(
    name = "build_dataset",
    version,
    about = "Build the vehicle pricing dataset (vehicles.json, vehicles.json.gz, metadata.json)"
)]
struct Cli {
    /// Ignore the previous dataset in the output directory instead of merging into it
    #[arg(long, action = ArgAction::SetTrue)]
    reset: bool,
    /// Run everything, verify in memory, write nothing
    #[arg(long, action = ArgAction::SetTrue)]
    dry_run: bool,
    /// Skip the live API; every category comes from the seed catalogs
    #[arg(long, action = ArgAction::SetTrue)]
    offline: bool,
    /// Output directory (overrides VEHICLE_OUT_DIR)
    #[arg(long)]
    out_dir: Option<PathBuf>,
    /// Pricing API root (overrides VEHICLE_API_BASE)
    #[arg(long)]
    api_base: Option<String>,
    /// Cap on brands walked per category
    #[arg(long)]
    max_brands: Option<usize>,
    /// Cap on models walked per brand
    #[arg(long)]
    max_models: Option<usize>,
    /// Auxiliary HTML table page for a category, as TYPE=URL (repeatable)
    #[arg(long = "aux-page", value_parser = parse_aux_page)]
    aux_pages: Vec<(VehicleType, String)>,
}

fn parse_aux_page(raw: &str) -> Result<(VehicleType, String), String> {
    let (kind, url) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected TYPE=URL, got {raw:?}"))?;
    let kind: VehicleType = kind.parse()?;
    let url = url.trim();
    if url.is_empty() {
        return Err(format!("missing URL for {kind}"));
    }
    Ok((kind, url.to_string()))
}

impl Cli {
    fn apply(&self, cfg: &mut PipelineConfig) {
        cfg.reset |= self.reset;
        cfg.dry_run |= self.dry_run;
        if self.offline {
            cfg.live_enabled = false;
        }
        if let Some(dir) = &self.out_dir {
            cfg.out_dir = dir.clone();
        }
        if let Some(base) = &self.api_base {
            cfg.api_base = base.clone();
        }
        if self.max_brands.is_some() {
            cfg.max_brands = self.max_brands;
        }
        if self.max_models.is_some() {
            cfg.max_models_per_brand = self.max_models;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(DEFAULT_FILTER)?;
    vehicle_pricing::util::env::bootstrap_cli("build_dataset");

    let cli = Cli::parse();
    let mut cfg = PipelineConfig::from_env();
    cli.apply(&mut cfg);

    let mut auxiliary: Vec<Box<dyn AuxiliarySource>> = Vec::new();
    if !cli.aux_pages.is_empty() {
        let fetcher = HttpFetcher::from_config(&cfg)?;
        let source = cli
            .aux_pages
            .iter()
            .fold(HtmlAuxiliarySource::new("html", fetcher, TableRowParser), |s, (t, url)| {
                s.with_page(*t, url.clone())
            });
        auxiliary.push(Box::new(source));
    }

    match run_pipeline(cfg, auxiliary).await {
        Ok(summary) => {
            println!("{summary}");
            info!(vehicles = summary.total_vehicles(), "dataset build finished");
            Ok(())
        }
        Err(err) => {
            error!(error = %format!("{err:#}"), "dataset build failed");
            Err(err).context("dataset build failed")
        }
    }
}
