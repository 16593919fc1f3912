use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::normalization::id::normalize_id;

/// Source code stamped on records produced by the deterministic seed generator.
pub const SOURCE_SEED: &str = "SEED";
/// Source code stamped on seed records whose price went through the seeded-random variant.
pub const SOURCE_SEED_RANDOM: &str = "SEED-RANDOM";
/// Prefix for records that came from an auxiliary (scraped) source.
pub const SOURCE_SCRAPED_PREFIX: &str = "SCRAPED:";

/// Domain vehicle category. Serialized lowercase; this is the vocabulary of the dataset,
/// not of the upstream API (see [`ApiCategory`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleType {
    Car,
    Motorcycle,
    Truck,
    #[serde(alias = "harvester")]
    Tractor,
    Boat,
}

impl VehicleType {
    /// Processing order for a run. Live-capable categories come first.
    pub const ALL: [VehicleType; 5] = [
        VehicleType::Car,
        VehicleType::Motorcycle,
        VehicleType::Truck,
        VehicleType::Tractor,
        VehicleType::Boat,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            VehicleType::Car => "car",
            VehicleType::Motorcycle => "motorcycle",
            VehicleType::Truck => "truck",
            VehicleType::Tractor => "tractor",
            VehicleType::Boat => "boat",
        }
    }

    /// Upstream category exposing this vehicle type, if any.
    pub fn api_category(self) -> Option<ApiCategory> {
        match self {
            VehicleType::Car => Some(ApiCategory::Carros),
            VehicleType::Motorcycle => Some(ApiCategory::Motos),
            VehicleType::Truck => Some(ApiCategory::Caminhoes),
            VehicleType::Tractor | VehicleType::Boat => None,
        }
    }

    /// Heavy categories get a shorter trailing seed window.
    pub fn is_heavy(self) -> bool {
        matches!(
            self,
            VehicleType::Truck | VehicleType::Tractor | VehicleType::Boat
        )
    }
}

impl fmt::Display for VehicleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VehicleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "car" => Ok(VehicleType::Car),
            "motorcycle" => Ok(VehicleType::Motorcycle),
            "truck" => Ok(VehicleType::Truck),
            "tractor" | "harvester" => Ok(VehicleType::Tractor),
            "boat" => Ok(VehicleType::Boat),
            other => Err(format!("unknown vehicle type: {other}")),
        }
    }
}

/// Category vocabulary of the upstream pricing API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiCategory {
    Carros,
    Motos,
    Caminhoes,
}

impl ApiCategory {
    pub fn path_segment(self) -> &'static str {
        match self {
            ApiCategory::Carros => "carros",
            ApiCategory::Motos => "motos",
            ApiCategory::Caminhoes => "caminhoes",
        }
    }

    pub fn vehicle_type(self) -> VehicleType {
        match self {
            ApiCategory::Carros => VehicleType::Car,
            ApiCategory::Motos => VehicleType::Motorcycle,
            ApiCategory::Caminhoes => VehicleType::Truck,
        }
    }
}

impl fmt::Display for ApiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

/// One priced vehicle. `id` is always derived from (type, brand, model, year).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub vehicle_type: VehicleType,
    pub brand: String,
    pub model: String,
    pub year: i32,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_code: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl VehicleRecord {
    pub fn new(
        vehicle_type: VehicleType,
        brand: impl Into<String>,
        model: impl Into<String>,
        year: i32,
        price: f64,
        source_code: Option<String>,
        last_updated: DateTime<Utc>,
    ) -> Self {
        let brand = brand.into().trim().to_string();
        let model = model.into().trim().to_string();
        let id = normalize_id(vehicle_type, &brand, &model, year);
        Self {
            id,
            vehicle_type,
            brand,
            model,
            year,
            price,
            source_code,
            last_updated,
        }
    }

    /// Dataset invariants: non-empty id/brand/model, a plausible year and a positive finite price.
    pub fn is_valid(&self) -> bool {
        !self.id.is_empty()
            && !self.brand.trim().is_empty()
            && !self.model.trim().is_empty()
            && self.year > 0
            && self.price.is_finite()
            && self.price > 0.0
    }
}

/// Loosely-typed row handed over by an auxiliary source. Any field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub brand: Option<String>,
    pub model: Option<String>,
    pub year: Option<String>,
    pub price: Option<String>,
}

/// Persisted aggregate. `stats` counts vehicles per type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub version: String,
    pub generated_at: DateTime<Utc>,
    pub vehicles: Vec<VehicleRecord>,
    pub stats: BTreeMap<VehicleType, usize>,
}

impl Dataset {
    /// Date-derived version tag, `YYYY.MM.DD`.
    pub fn version_for(ts: DateTime<Utc>) -> String {
        ts.format("%Y.%m.%d").to_string()
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    pub fn count_of(&self, vehicle_type: VehicleType) -> usize {
        self.stats.get(&vehicle_type).copied().unwrap_or(0)
    }
}
