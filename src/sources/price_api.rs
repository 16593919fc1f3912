//! Hierarchical collector over the upstream pricing API
//! (category -> brands -> models -> years -> price).
//!
//! Only the brand list is load-bearing: if it cannot be fetched the whole
//! category fails. Any deeper node that fails is logged, recorded as a skipped
//! branch and its siblings carry on.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{PipelineConfig, YearWindow};
use crate::error::{CollectError, FetchError};
use crate::model::{ApiCategory, VehicleRecord, VehicleType};
use crate::pricing::{parse_price_text, year_from_code};
use crate::sources::fetcher::JsonFetch;

/// `{"codigo": .., "nome": ..}` node; codes arrive as strings or numbers.
#[derive(Debug, Clone, Deserialize)]
struct CodeName {
    #[serde(deserialize_with = "code_as_string")]
    codigo: String,
    nome: String,
}

#[derive(Debug, Deserialize)]
struct ModelsPage {
    #[serde(default)]
    modelos: Vec<CodeName>,
}

#[derive(Debug, Deserialize)]
struct PriceQuote {
    #[serde(rename = "Valor")]
    valor: String,
    #[serde(rename = "CodigoFipe", default)]
    codigo_fipe: Option<String>,
}

fn code_as_string<'de, D>(de: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(de)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "unexpected code value {other}"
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchLevel {
    Models,
    Years,
    Price,
}

impl fmt::Display for BranchLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BranchLevel::Models => "models",
            BranchLevel::Years => "years",
            BranchLevel::Price => "price",
        })
    }
}

/// A subtree that was dropped because its fetch failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedBranch {
    pub level: BranchLevel,
    /// `brand/model/year` labels down to the failed node.
    pub path: String,
    pub reason: String,
}

/// Best-effort output of one category.
#[derive(Debug, Clone, Default)]
pub struct CategoryHarvest {
    pub records: Vec<VehicleRecord>,
    pub skipped: Vec<SkippedBranch>,
    /// Leaves thrown away for an unparseable/out-of-window year or a non-positive price.
    pub discarded: usize,
}

pub struct PriceApiCollector<F> {
    fetcher: F,
    base_url: String,
    pacing: Duration,
    years: YearWindow,
    current_year: i32,
    max_brands: Option<usize>,
    max_models_per_brand: Option<usize>,
}

impl<F: JsonFetch> PriceApiCollector<F> {
    pub fn new(fetcher: F, cfg: &PipelineConfig) -> Self {
        Self {
            fetcher,
            base_url: cfg.api_base.trim_end_matches('/').to_string(),
            pacing: cfg.pacing,
            years: cfg.live_window(),
            current_year: cfg.current_year,
            max_brands: cfg.max_brands,
            max_models_per_brand: cfg.max_models_per_brand,
        }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    async fn get_as<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let value = self.fetcher.fetch_json(url).await?;
        serde_json::from_value(value).map_err(|source| FetchError::Parse {
            url: url.to_string(),
            source,
        })
    }

    async fn pause(&self) {
        if !self.pacing.is_zero() {
            tokio::time::sleep(self.pacing).await;
        }
    }

    /// Walk every brand/model/year of `api` and price each leaf.
    pub async fn collect_category(
        &self,
        api: ApiCategory,
        now: DateTime<Utc>,
    ) -> Result<CategoryHarvest, CollectError> {
        let vehicle_type = api.vehicle_type();
        let brands_url = format!("{}/{}/marcas", self.base_url, api.path_segment());
        let brands: Vec<CodeName> =
            self.get_as(&brands_url)
                .await
                .map_err(|source| CollectError::CategoryFailed {
                    category: vehicle_type,
                    source,
                })?;
        info!(category = %vehicle_type, api = %api, brands = brands.len(), "brand list fetched");

        let mut harvest = CategoryHarvest::default();
        let brand_limit = self.max_brands.unwrap_or(usize::MAX);
        for brand in brands.iter().take(brand_limit) {
            self.collect_brand(vehicle_type, &brands_url, brand, now, &mut harvest)
                .await;
        }

        info!(
            category = %vehicle_type,
            records = harvest.records.len(),
            skipped = harvest.skipped.len(),
            discarded = harvest.discarded,
            "category collected"
        );
        Ok(harvest)
    }

    async fn collect_brand(
        &self,
        vehicle_type: VehicleType,
        brands_url: &str,
        brand: &CodeName,
        now: DateTime<Utc>,
        harvest: &mut CategoryHarvest,
    ) {
        let models_url = format!("{brands_url}/{}/modelos", brand.codigo);
        self.pause().await;
        let models = match self.get_as::<ModelsPage>(&models_url).await {
            Ok(page) => page.modelos,
            Err(err) => {
                skip(harvest, BranchLevel::Models, brand.nome.clone(), &err);
                return;
            }
        };

        let model_limit = self.max_models_per_brand.unwrap_or(usize::MAX);
        for model in models.iter().take(model_limit) {
            let years_url = format!("{models_url}/{}/anos", model.codigo);
            self.pause().await;
            let years = match self.get_as::<Vec<CodeName>>(&years_url).await {
                Ok(years) => years,
                Err(err) => {
                    let path = format!("{}/{}", brand.nome, model.nome);
                    skip(harvest, BranchLevel::Years, path, &err);
                    continue;
                }
            };

            for year in &years {
                let Some(model_year) = year_from_code(&year.codigo, self.current_year)
                    .filter(|y| self.years.contains(*y))
                else {
                    debug!(brand = %brand.nome, model = %model.nome, code = %year.codigo, "year outside window or unparseable");
                    harvest.discarded += 1;
                    continue;
                };

                let price_url = format!("{years_url}/{}", year.codigo);
                self.pause().await;
                let quote = match self.get_as::<PriceQuote>(&price_url).await {
                    Ok(q) => q,
                    Err(err) => {
                        let path = format!("{}/{}/{}", brand.nome, model.nome, year.codigo);
                        skip(harvest, BranchLevel::Price, path, &err);
                        continue;
                    }
                };

                match parse_price_text(&quote.valor).filter(|p| *p > 0.0) {
                    Some(price) => harvest.records.push(VehicleRecord::new(
                        vehicle_type,
                        brand.nome.as_str(),
                        model.nome.as_str(),
                        model_year,
                        price,
                        quote.codigo_fipe.filter(|c| !c.trim().is_empty()),
                        now,
                    )),
                    None => {
                        debug!(url = %price_url, valor = %quote.valor, "non-positive or unparseable price");
                        harvest.discarded += 1;
                    }
                }
            }
        }
    }
}

fn skip(harvest: &mut CategoryHarvest, level: BranchLevel, path: String, err: &FetchError) {
    warn!(level = %level, path = %path, url = err.url(), error = %err, "branch skipped");
    harvest.skipped.push(SkippedBranch {
        level,
        path,
        reason: err.to_string(),
    });
}
