//! Optional auxiliary sources (scraped pages). Whatever they return is treated
//! as loose `RawRecord`s; a failing source contributes nothing.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::YearWindow;
use crate::model::{RawRecord, VehicleRecord, VehicleType, SOURCE_SCRAPED_PREFIX};
use crate::pricing::{parse_price_text, year_from_code, PriceModel};
use crate::sources::fetcher::HttpFetcher;

#[async_trait]
pub trait AuxiliarySource: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch_raw(&self, vehicle_type: VehicleType) -> anyhow::Result<Vec<RawRecord>>;
}

/// Turns a page body into raw rows.
pub trait MarkupParser: Send + Sync {
    fn parse(&self, html: &str) -> Vec<RawRecord>;
}

fn row_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<tr[^>]*>(.*?)</tr>").expect("static regex"))
}

fn cell_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<td[^>]*>(.*?)</td>").expect("static regex"))
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]+>").expect("static regex"))
}

fn cell_text(inner: &str) -> Option<String> {
    let text = tag_re()
        .replace_all(inner, " ")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

/// Reads `<tr><td>brand</td><td>model</td><td>year</td><td>price</td></tr>` rows.
/// Header rows (`<th>`) and rows with fewer than three data cells are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableRowParser;

impl MarkupParser for TableRowParser {
    fn parse(&self, html: &str) -> Vec<RawRecord> {
        row_re()
            .captures_iter(html)
            .filter_map(|row| {
                let mut cells = cell_re()
                    .captures_iter(row.get(1)?.as_str())
                    .map(|c| c.get(1).and_then(|m| cell_text(m.as_str())));
                let brand = cells.next()?;
                let model = cells.next()?;
                let year = cells.next()?;
                let price = cells.next().flatten();
                Some(RawRecord {
                    brand,
                    model,
                    year,
                    price,
                })
            })
            .collect()
    }
}

/// Scrapes one configured page per vehicle type.
pub struct HtmlAuxiliarySource<P> {
    name: String,
    fetcher: HttpFetcher,
    pages: BTreeMap<VehicleType, String>,
    parser: P,
}

impl<P: MarkupParser> HtmlAuxiliarySource<P> {
    pub fn new(name: impl Into<String>, fetcher: HttpFetcher, parser: P) -> Self {
        Self {
            name: name.into(),
            fetcher,
            pages: BTreeMap::new(),
            parser,
        }
    }

    pub fn with_page(mut self, vehicle_type: VehicleType, url: impl Into<String>) -> Self {
        self.pages.insert(vehicle_type, url.into());
        self
    }
}

#[async_trait]
impl<P: MarkupParser> AuxiliarySource for HtmlAuxiliarySource<P> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_raw(&self, vehicle_type: VehicleType) -> anyhow::Result<Vec<RawRecord>> {
        let Some(url) = self.pages.get(&vehicle_type) else {
            return Ok(Vec::new());
        };
        let html = self
            .fetcher
            .fetch_text(url)
            .await
            .with_context(|| format!("fetching auxiliary page for {vehicle_type}"))?;
        let rows = self.parser.parse(&html);
        debug!(source = %self.name, category = %vehicle_type, rows = rows.len(), "auxiliary page parsed");
        Ok(rows)
    }
}

/// Normalize one raw row. Rows without brand, model or a readable year inside
/// `years` are dropped; a missing or unusable price is synthesized.
pub fn raw_to_record(
    raw: &RawRecord,
    vehicle_type: VehicleType,
    source_name: &str,
    prices: &PriceModel,
    years: YearWindow,
    now: DateTime<Utc>,
) -> Option<VehicleRecord> {
    let brand = raw.brand.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
    let model = raw.model.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
    let year_token = raw
        .year
        .as_deref()?
        .split(|c: char| !c.is_ascii_digit())
        .find(|s| !s.is_empty())?;
    let year = year_from_code(year_token, prices.current_year).filter(|y| years.contains(*y))?;

    let price = match raw
        .price
        .as_deref()
        .and_then(parse_price_text)
        .filter(|p| *p > 0.0)
    {
        Some(p) => p,
        None => prices.synthesize(vehicle_type, brand, model, year)? as f64,
    };

    Some(VehicleRecord::new(
        vehicle_type,
        brand,
        model,
        year,
        price,
        Some(format!("{SOURCE_SCRAPED_PREFIX}{source_name}")),
        now,
    ))
}

/// Run every source for one category. Failing sources are logged and skipped.
pub async fn collect_auxiliary(
    sources: &[Box<dyn AuxiliarySource>],
    vehicle_type: VehicleType,
    prices: &PriceModel,
    years: YearWindow,
    now: DateTime<Utc>,
) -> Vec<VehicleRecord> {
    let mut out = Vec::new();
    for source in sources {
        let raw = match source.fetch_raw(vehicle_type).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(source = source.name(), category = %vehicle_type, error = %format!("{err:#}"), "auxiliary source failed");
                continue;
            }
        };
        let before = out.len();
        out.extend(
            raw.iter()
                .filter_map(|r| raw_to_record(r, vehicle_type, source.name(), prices, years, now)),
        );
        let kept = out.len() - before;
        if !raw.is_empty() {
            info!(source = source.name(), category = %vehicle_type, rows = raw.len(), kept, "auxiliary rows converted");
        }
    }
    out
}
