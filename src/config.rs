use std::path::PathBuf;
use std::time::Duration;

use chrono::{Datelike, Utc};

use crate::model::VehicleType;
use crate::sources::fetcher::RetryPolicy;
use crate::util::env::{env_flag, env_opt, env_parse, env_parse_opt};

pub const DEFAULT_API_BASE: &str = "https://parallelum.com.br/fipe/api/v1";

/// Inclusive range of model years.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearWindow {
    pub start: i32,
    pub end: i32,
}

impl YearWindow {
    pub fn new(start: i32, end: i32) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, year: i32) -> bool {
        (self.start..=self.end).contains(&year)
    }

    pub fn years(&self) -> impl Iterator<Item = i32> {
        self.start..=self.end
    }

    pub fn len(&self) -> usize {
        if self.end < self.start {
            0
        } else {
            (self.end - self.start + 1) as usize
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub api_base: String,
    pub out_dir: PathBuf,
    /// When false no upstream request is made; every category is seeded.
    pub live_enabled: bool,
    pub dry_run: bool,
    /// Ignore any previous dataset in `out_dir`.
    pub reset: bool,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    pub max_redirects: u32,
    /// Pause between consecutive child fetches in the collector.
    pub pacing: Duration,
    pub min_live_records: usize,
    pub max_brands: Option<usize>,
    pub max_models_per_brand: Option<usize>,
    pub current_year: i32,
    pub year_start: i32,
    /// Trailing window length for heavy categories.
    pub heavy_window_years: i32,
    /// Enables the seeded-random price variant for boats.
    pub price_seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            out_dir: PathBuf::from("data"),
            live_enabled: true,
            dry_run: false,
            reset: false,
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(30),
            max_redirects: 5,
            pacing: Duration::from_millis(300),
            min_live_records: 10,
            max_brands: None,
            max_models_per_brand: None,
            current_year: Utc::now().year(),
            year_start: 2010,
            heavy_window_years: 13,
            price_seed: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            api_base: env_opt("VEHICLE_API_BASE").unwrap_or(d.api_base),
            out_dir: env_opt("VEHICLE_OUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.out_dir),
            live_enabled: env_flag("VEHICLE_LIVE", d.live_enabled),
            dry_run: d.dry_run,
            reset: d.reset,
            retry: RetryPolicy {
                max_attempts: env_parse("VEHICLE_RETRY_ATTEMPTS", d.retry.max_attempts).max(1),
                base_delay: Duration::from_millis(env_parse(
                    "VEHICLE_BACKOFF_MS",
                    d.retry.base_delay.as_millis() as u64,
                )),
                max_jitter: Duration::from_millis(env_parse(
                    "VEHICLE_JITTER_MS",
                    d.retry.max_jitter.as_millis() as u64,
                )),
            },
            request_timeout: Duration::from_secs(env_parse(
                "VEHICLE_TIMEOUT_SECS",
                d.request_timeout.as_secs(),
            )),
            max_redirects: env_parse("VEHICLE_MAX_REDIRECTS", d.max_redirects),
            pacing: Duration::from_millis(env_parse(
                "VEHICLE_PACING_MS",
                d.pacing.as_millis() as u64,
            )),
            min_live_records: env_parse("VEHICLE_MIN_LIVE_RECORDS", d.min_live_records),
            max_brands: env_parse_opt("VEHICLE_MAX_BRANDS"),
            max_models_per_brand: env_parse_opt("VEHICLE_MAX_MODELS"),
            current_year: d.current_year,
            year_start: env_parse("VEHICLE_YEAR_START", d.year_start),
            heavy_window_years: env_parse("VEHICLE_HEAVY_WINDOW", d.heavy_window_years).max(1),
            price_seed: env_parse_opt("VEHICLE_PRICE_SEED"),
        }
    }

    /// Years accepted from the live API: `year_start ..= current_year + 1`.
    pub fn live_window(&self) -> YearWindow {
        YearWindow::new(self.year_start, self.current_year + 1)
    }

    /// Seed window per category. Heavy categories get a trailing window ending at
    /// `current_year + 1`.
    pub fn seed_window(&self, vehicle_type: VehicleType) -> YearWindow {
        let end = self.current_year + 1;
        if vehicle_type.is_heavy() {
            YearWindow::new(end - self.heavy_window_years + 1, end)
        } else {
            YearWindow::new(self.year_start, end)
        }
    }
}
