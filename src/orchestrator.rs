//! Run driver: collect every category in order, fill gaps with seed data,
//! merge, then write and verify the artifacts.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::dataset::{load_existing, merge, ArtifactReport, ArtifactWriter, MergeReport};
use crate::error::PipelineError;
use crate::model::{VehicleRecord, VehicleType};
use crate::pricing::PriceModel;
use crate::sources::auxiliary::{collect_auxiliary, AuxiliarySource};
use crate::sources::catalog::SeedCatalog;
use crate::sources::fallback::{generate_seed, PriceStrategy};
use crate::sources::fetcher::{HttpFetcher, JsonFetch};
use crate::sources::price_api::PriceApiCollector;

/// Why a category was (also) filled from the seed catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FallbackReason {
    /// The upstream API has no such category.
    NotExposed,
    /// Live collection is switched off.
    Disabled,
    Failed(String),
    /// Live collection produced fewer records than the configured minimum.
    InsufficientYield(usize),
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::NotExposed => f.write_str("not exposed"),
            FallbackReason::Disabled => f.write_str("live disabled"),
            FallbackReason::Failed(msg) => write!(f, "failed: {msg}"),
            FallbackReason::InsufficientYield(n) => write!(f, "only {n} live"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryReport {
    pub vehicle_type: VehicleType,
    pub live: usize,
    pub auxiliary: usize,
    pub fallback: usize,
    pub skipped_branches: usize,
    pub discarded: usize,
    pub fallback_reason: Option<FallbackReason>,
}

impl CategoryReport {
    fn new(vehicle_type: VehicleType) -> Self {
        Self {
            vehicle_type,
            live: 0,
            auxiliary: 0,
            fallback: 0,
            skipped_branches: 0,
            discarded: 0,
            fallback_reason: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub generated_at: DateTime<Utc>,
    pub previous_records: usize,
    pub categories: Vec<CategoryReport>,
    pub merge: MergeReport,
    pub stats: BTreeMap<VehicleType, usize>,
    pub artifacts: ArtifactReport,
}

impl RunSummary {
    pub fn category(&self, vehicle_type: VehicleType) -> Option<&CategoryReport> {
        self.categories.iter().find(|c| c.vehicle_type == vehicle_type)
    }

    pub fn total_vehicles(&self) -> usize {
        self.merge.kept
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<11} {:>7} {:>5} {:>7} {:>8} {:>8}  fallback",
            "category", "live", "aux", "seed", "skipped", "final"
        )?;
        for c in &self.categories {
            writeln!(
                f,
                "{:<11} {:>7} {:>5} {:>7} {:>8} {:>8}  {}",
                c.vehicle_type.as_str(),
                c.live,
                c.auxiliary,
                c.fallback,
                c.skipped_branches,
                self.stats.get(&c.vehicle_type).copied().unwrap_or(0),
                c.fallback_reason
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "-".into())
            )?;
        }
        writeln!(
            f,
            "previous: {}  merged: {}  invalid dropped: {}  duplicates replaced: {}",
            self.previous_records,
            self.merge.kept,
            self.merge.dropped_invalid,
            self.merge.duplicates_replaced
        )?;
        let ratio = if self.artifacts.json_bytes == 0 {
            0.0
        } else {
            100.0 * self.artifacts.gzip_bytes as f64 / self.artifacts.json_bytes as f64
        };
        write!(
            f,
            "{} json {} bytes, gzip {} bytes ({ratio:.1}%) in {}",
            if self.artifacts.dry_run { "projected" } else { "wrote" },
            self.artifacts.json_bytes,
            self.artifacts.gzip_bytes,
            self.artifacts.out_dir.display()
        )
    }
}

pub struct Pipeline<F> {
    cfg: PipelineConfig,
    collector: PriceApiCollector<F>,
    auxiliary: Vec<Box<dyn AuxiliarySource>>,
    catalogs: BTreeMap<VehicleType, SeedCatalog>,
    prices: PriceModel,
}

impl<F: JsonFetch> Pipeline<F> {
    pub fn new(cfg: PipelineConfig, fetcher: F) -> Self {
        let collector = PriceApiCollector::new(fetcher, &cfg);
        let catalogs = VehicleType::ALL
            .into_iter()
            .map(|t| (t, SeedCatalog::builtin(t)))
            .collect();
        let prices = PriceModel::for_year(cfg.current_year);
        Self {
            cfg,
            collector,
            auxiliary: Vec::new(),
            catalogs,
            prices,
        }
    }

    pub fn with_auxiliary(mut self, source: Box<dyn AuxiliarySource>) -> Self {
        self.auxiliary.push(source);
        self
    }

    fn strategy_for(&self, vehicle_type: VehicleType) -> PriceStrategy {
        match (vehicle_type, self.cfg.price_seed) {
            (VehicleType::Boat, Some(seed)) => PriceStrategy::Seeded(seed),
            _ => PriceStrategy::Deterministic,
        }
    }

    /// Live phase for one category. Returns the records kept plus the reason a
    /// fallback is needed, if any.
    async fn collect_live(
        &self,
        vehicle_type: VehicleType,
        report: &mut CategoryReport,
        now: DateTime<Utc>,
    ) -> (Vec<VehicleRecord>, Option<FallbackReason>) {
        let Some(api) = vehicle_type.api_category() else {
            return (Vec::new(), Some(FallbackReason::NotExposed));
        };
        if !self.cfg.live_enabled {
            return (Vec::new(), Some(FallbackReason::Disabled));
        }
        match self.collector.collect_category(api, now).await {
            Ok(harvest) => {
                report.skipped_branches = harvest.skipped.len();
                report.discarded = harvest.discarded;
                let n = harvest.records.len();
                let reason =
                    (n < self.cfg.min_live_records).then_some(FallbackReason::InsufficientYield(n));
                (harvest.records, reason)
            }
            Err(err) => (Vec::new(), Some(FallbackReason::Failed(err.to_string()))),
        }
    }

    /// Execute one full run. Categories are processed strictly one after another.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<RunSummary, PipelineError> {
        let previous = if self.cfg.reset {
            info!("reset requested; previous dataset ignored");
            Vec::new()
        } else {
            load_existing(&self.cfg.out_dir)
        };
        let previous_records = previous.len();

        let mut live = Vec::new();
        let mut auxiliary = Vec::new();
        let mut seeded = Vec::new();
        let mut categories = Vec::with_capacity(VehicleType::ALL.len());

        for vehicle_type in VehicleType::ALL {
            let mut report = CategoryReport::new(vehicle_type);

            let (records, reason) = self.collect_live(vehicle_type, &mut report, now).await;
            report.live = records.len();
            live.extend(records);

            let aux = collect_auxiliary(
                &self.auxiliary,
                vehicle_type,
                &self.prices,
                self.cfg.live_window(),
                now,
            )
            .await;
            report.auxiliary = aux.len();
            auxiliary.extend(aux);

            if let Some(reason) = &reason {
                match reason {
                    FallbackReason::NotExposed | FallbackReason::Disabled => {
                        info!(category = %vehicle_type, reason = %reason, "using seed data")
                    }
                    _ => warn!(category = %vehicle_type, reason = %reason, "falling back to seed data"),
                }
                let catalog = self.catalogs.get(&vehicle_type).cloned().unwrap_or_default();
                let seed = generate_seed(
                    vehicle_type,
                    &catalog,
                    self.cfg.seed_window(vehicle_type),
                    &self.prices,
                    self.strategy_for(vehicle_type),
                    now,
                );
                report.fallback = seed.len();
                seeded.extend(seed);
            }
            report.fallback_reason = reason;

            info!(
                category = %vehicle_type,
                live = report.live,
                auxiliary = report.auxiliary,
                fallback = report.fallback,
                skipped = report.skipped_branches,
                "category done"
            );
            categories.push(report);
        }

        // later sources overwrite earlier ones on id collision
        let ordered = previous
            .into_iter()
            .chain(live)
            .chain(auxiliary)
            .chain(seeded);
        let (dataset, merge_report) = merge(ordered, now)?;

        let artifacts =
            ArtifactWriter::new(&self.cfg.out_dir, self.cfg.dry_run).write_dataset(&dataset)?;

        Ok(RunSummary {
            generated_at: now,
            previous_records,
            categories,
            merge: merge_report,
            stats: dataset.stats,
            artifacts,
        })
    }
}

/// Build the production pipeline over HTTP and run it.
pub async fn run_pipeline(
    cfg: PipelineConfig,
    auxiliary: Vec<Box<dyn AuxiliarySource>>,
) -> anyhow::Result<RunSummary> {
    let fetcher = HttpFetcher::from_config(&cfg)?;
    info!(
        api = %cfg.api_base,
        out_dir = %cfg.out_dir.display(),
        live = cfg.live_enabled,
        dry_run = cfg.dry_run,
        reset = cfg.reset,
        "starting dataset build"
    );
    let pipeline = auxiliary
        .into_iter()
        .fold(Pipeline::new(cfg, fetcher), |p, source| p.with_auxiliary(source));
    let summary = pipeline.run(Utc::now()).await?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::artifact::{DATASET_FILE, METADATA_FILE};
    use crate::model::{Dataset, RawRecord, SOURCE_SEED, SOURCE_SEED_RANDOM};
    use crate::sources::test_support::{StubApi, STUB_BASE};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::path::Path;
    use std::time::Duration;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 6, 0, 0).unwrap()
    }

    fn cfg(out_dir: &Path) -> PipelineConfig {
        PipelineConfig {
            api_base: STUB_BASE.to_string(),
            out_dir: out_dir.to_path_buf(),
            pacing: Duration::ZERO,
            current_year: 2026,
            year_start: 2010,
            ..PipelineConfig::default()
        }
    }

    fn seed_count(t: VehicleType, c: &PipelineConfig) -> usize {
        SeedCatalog::builtin(t).model_count() * c.seed_window(t).len()
    }

    #[tokio::test]
    async fn offline_run_seeds_every_category() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = cfg(dir.path());
        c.live_enabled = false;
        let api = StubApi::new();
        let summary = Pipeline::new(c.clone(), api).run(now()).await.unwrap();

        for t in VehicleType::ALL {
            assert_eq!(summary.stats[&t], seed_count(t, &c), "{t}");
        }
        assert_eq!(
            summary.category(VehicleType::Car).unwrap().fallback_reason,
            Some(FallbackReason::Disabled)
        );
        assert_eq!(
            summary.category(VehicleType::Tractor).unwrap().fallback_reason,
            Some(FallbackReason::NotExposed)
        );
        assert!(dir.path().join(DATASET_FILE).exists());
        assert!(dir.path().join(METADATA_FILE).exists());
    }

    #[tokio::test]
    async fn no_requests_are_made_when_live_is_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = cfg(dir.path());
        c.live_enabled = false;
        c.dry_run = true;
        let pipeline = Pipeline::new(c, StubApi::new());
        pipeline.run(now()).await.unwrap();
        assert!(pipeline.collector.fetcher().calls().is_empty());
    }

    #[tokio::test]
    async fn tractors_are_exactly_catalog_times_window() {
        let dir = tempfile::tempdir().unwrap();
        let c = cfg(dir.path());
        let summary = Pipeline::new(c.clone(), StubApi::new()).run(now()).await.unwrap();
        let window = c.seed_window(VehicleType::Tractor);
        assert_eq!((window.start, window.end), (2015, 2027));
        assert_eq!(
            summary.stats[&VehicleType::Tractor],
            SeedCatalog::builtin(VehicleType::Tractor).model_count() * 13
        );
    }

    #[tokio::test]
    async fn live_category_skips_fallback_and_failures_are_seeded() {
        let dir = tempfile::tempdir().unwrap();
        let c = cfg(dir.path());
        let api = StubApi::new()
            .category_tree(
                "motos",
                &[
                    ("80", "Honda", &[(5001, "Pop 110i")]),
                    ("101", "Yamaha", &[(6001, "Crosser 150")]),
                ],
                2010..=2026,
            )
            .fail(format!("{STUB_BASE}/carros/marcas"));
        let summary = Pipeline::new(c.clone(), api).run(now()).await.unwrap();

        let moto = summary.category(VehicleType::Motorcycle).unwrap();
        assert_eq!(moto.live, 34);
        assert_eq!(moto.fallback, 0);
        assert_eq!(moto.fallback_reason, None);
        assert_eq!(summary.stats[&VehicleType::Motorcycle], 34);

        let car = summary.category(VehicleType::Car).unwrap();
        assert!(matches!(car.fallback_reason, Some(FallbackReason::Failed(_))));
        assert_eq!(summary.stats[&VehicleType::Car], seed_count(VehicleType::Car, &c));

        // caminhoes has no routes at all
        let truck = summary.category(VehicleType::Truck).unwrap();
        assert!(matches!(truck.fallback_reason, Some(FallbackReason::Failed(_))));

        let written: Dataset =
            serde_json::from_slice(&std::fs::read(dir.path().join(DATASET_FILE)).unwrap()).unwrap();
        assert!(written
            .vehicles
            .iter()
            .filter(|v| v.vehicle_type == VehicleType::Motorcycle)
            .all(|v| v.source_code.as_deref() != Some(SOURCE_SEED)));
    }

    #[tokio::test]
    async fn thin_live_yield_is_topped_up_with_seed() {
        let dir = tempfile::tempdir().unwrap();
        let c = cfg(dir.path());
        let api = StubApi::new().category_tree(
            "motos",
            &[("80", "Honda", &[(5002, "Pop 110i")])],
            2024..=2026,
        );
        let summary = Pipeline::new(c.clone(), api).run(now()).await.unwrap();
        let moto = summary.category(VehicleType::Motorcycle).unwrap();
        assert_eq!(moto.fallback_reason, Some(FallbackReason::InsufficientYield(3)));
        assert_eq!(
            summary.stats[&VehicleType::Motorcycle],
            3 + seed_count(VehicleType::Motorcycle, &c)
        );
    }

    #[tokio::test]
    async fn previous_dataset_is_carried_unless_reset() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = cfg(dir.path());
        c.live_enabled = false;
        let legacy = VehicleRecord::new(
            VehicleType::Boat,
            "Riva",
            "Aquariva Super",
            2018,
            2_900_000.0,
            Some("MANUAL".into()),
            now(),
        );
        let (previous, _) = merge(vec![legacy.clone()], now()).unwrap();
        ArtifactWriter::new(dir.path(), false)
            .write_dataset(&previous)
            .unwrap();

        let carried = Pipeline::new(c.clone(), StubApi::new()).run(now()).await.unwrap();
        assert_eq!(carried.previous_records, 1);
        assert_eq!(
            carried.stats[&VehicleType::Boat],
            seed_count(VehicleType::Boat, &c) + 1
        );

        c.reset = true;
        let fresh = Pipeline::new(c.clone(), StubApi::new()).run(now()).await.unwrap();
        assert_eq!(fresh.previous_records, 0);
        assert_eq!(fresh.stats[&VehicleType::Boat], seed_count(VehicleType::Boat, &c));
    }

    #[tokio::test]
    async fn dry_run_reports_sizes_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = cfg(&dir.path().join("dist"));
        c.live_enabled = false;
        c.dry_run = true;
        let summary = Pipeline::new(c, StubApi::new()).run(now()).await.unwrap();
        assert!(summary.artifacts.dry_run);
        assert!(summary.artifacts.gzip_bytes > 0);
        assert!(!dir.path().join("dist").exists());
        assert!(summary.to_string().contains("projected"));
    }

    #[tokio::test]
    async fn price_seed_switches_boats_to_randomised_prices() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = cfg(dir.path());
        c.live_enabled = false;
        c.price_seed = Some(42);
        Pipeline::new(c, StubApi::new()).run(now()).await.unwrap();
        let written: Dataset =
            serde_json::from_slice(&std::fs::read(dir.path().join(DATASET_FILE)).unwrap()).unwrap();
        for v in &written.vehicles {
            let expected = if v.vehicle_type == VehicleType::Boat {
                SOURCE_SEED_RANDOM
            } else {
                SOURCE_SEED
            };
            assert_eq!(v.source_code.as_deref(), Some(expected));
        }
    }

    struct OneBoat;

    #[async_trait]
    impl AuxiliarySource for OneBoat {
        fn name(&self) -> &str {
            "marina"
        }
        async fn fetch_raw(&self, t: VehicleType) -> anyhow::Result<Vec<RawRecord>> {
            if t != VehicleType::Boat {
                return Ok(Vec::new());
            }
            Ok(vec![RawRecord {
                brand: Some("Schaefer".into()),
                model: Some("Phantom 303".into()),
                year: Some("2020".into()),
                price: Some("R$ 1.000.000,00".into()),
            }])
        }
    }

    #[tokio::test]
    async fn seed_overrides_auxiliary_on_collision() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = cfg(dir.path());
        c.live_enabled = false;
        let summary = Pipeline::new(c, StubApi::new())
            .with_auxiliary(Box::new(OneBoat))
            .run(now())
            .await
            .unwrap();
        assert_eq!(summary.category(VehicleType::Boat).unwrap().auxiliary, 1);
        assert_eq!(summary.merge.duplicates_replaced, 1);
        let written: Dataset =
            serde_json::from_slice(&std::fs::read(dir.path().join(DATASET_FILE)).unwrap()).unwrap();
        let phantom = written
            .vehicles
            .iter()
            .find(|v| v.id == "boat-schaefer-phantom-303-2020")
            .unwrap();
        assert_eq!(phantom.source_code.as_deref(), Some(SOURCE_SEED));
    }
}
