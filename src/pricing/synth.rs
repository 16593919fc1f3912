use chrono::{Datelike, Utc};
use rand::Rng;

use crate::model::VehicleType;

/// Brands that get the luxury multiplier. Matched as lowercase substrings of the brand.
const LUXURY_BRANDS: &[&str] = &[
    "porsche",
    "ferrari",
    "lamborghini",
    "maserati",
    "bentley",
    "rolls-royce",
    "aston martin",
    "mclaren",
    "land rover",
    "jaguar",
    "mercedes-benz",
    "bmw",
    "audi",
    "ducati",
    "harley-davidson",
    "azimut",
    "ferretti",
    "sunseeker",
];

/// High-end model lines per category, matched as lowercase substrings of the model.
/// First match wins.
const PREMIUM_MODELS: &[(VehicleType, &str, f64)] = &[
    (VehicleType::Truck, "actros", 1.6),
    (VehicleType::Truck, "fh ", 1.6),
    (VehicleType::Truck, "r 540", 1.7),
    (VehicleType::Truck, "s 500", 1.8),
    (VehicleType::Motorcycle, "hayabusa", 1.6),
    (VehicleType::Motorcycle, "gold wing", 1.8),
    (VehicleType::Motorcycle, "panigale", 1.7),
    (VehicleType::Motorcycle, "r 1250", 1.5),
    (VehicleType::Tractor, "8r", 1.5),
    (VehicleType::Tractor, "magnum", 1.5),
];

/// Reference price before any adjustment. Ordered motorcycle < car < tractor < boat < truck.
pub const fn base_price(vehicle_type: VehicleType) -> f64 {
    match vehicle_type {
        VehicleType::Motorcycle => 15_000.0,
        VehicleType::Car => 60_000.0,
        VehicleType::Tractor => 250_000.0,
        VehicleType::Boat => 320_000.0,
        VehicleType::Truck => 480_000.0,
    }
}

/// Yearly value retention.
pub const fn depreciation_rate(vehicle_type: VehicleType) -> f64 {
    match vehicle_type {
        VehicleType::Motorcycle => 0.90,
        VehicleType::Car => 0.92,
        VehicleType::Truck | VehicleType::Boat => 0.93,
        VehicleType::Tractor => 0.94,
    }
}

/// Character-code sum of brand+model.
pub fn label_hash(brand: &str, model: &str) -> u64 {
    brand
        .chars()
        .chain(model.chars())
        .map(|c| u64::from(u32::from(c)))
        .sum()
}

/// Deterministic price estimator. Every input that affects the output lives on
/// this struct, so the same model yields the same price for the same vehicle.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceModel {
    /// Year that counts as age zero.
    pub current_year: i32,
    /// Currency units added per point of [`label_hash`].
    pub hash_scale: f64,
    pub luxury_multiplier: f64,
    /// Depreciation never takes the price below this fraction of its undepreciated value.
    pub residual_floor: f64,
    /// Bounds of the seeded-random factor.
    pub jitter_range: (f64, f64),
    /// Seeded-random prices are clamped to these multiples of the base price.
    pub jitter_bounds: (f64, f64),
}

impl Default for PriceModel {
    fn default() -> Self {
        Self::for_year(Utc::now().year())
    }
}

impl PriceModel {
    pub fn for_year(current_year: i32) -> Self {
        Self {
            current_year,
            hash_scale: 25.0,
            luxury_multiplier: 2.5,
            residual_floor: 0.2,
            jitter_range: (0.85, 1.25),
            jitter_bounds: (0.6, 3.0),
        }
    }

    pub fn is_luxury(brand: &str) -> bool {
        let brand = brand.to_lowercase();
        LUXURY_BRANDS.iter().any(|b| brand.contains(b))
    }

    pub fn model_multiplier(vehicle_type: VehicleType, model: &str) -> f64 {
        // pad so "fh " also matches a trailing "FH"
        let model = format!("{} ", model.to_lowercase());
        PREMIUM_MODELS
            .iter()
            .find(|(t, needle, _)| *t == vehicle_type && model.contains(needle))
            .map(|(_, _, m)| *m)
            .unwrap_or(1.0)
    }

    fn raw_estimate(&self, vehicle_type: VehicleType, brand: &str, model: &str, year: i32) -> f64 {
        let mut price =
            base_price(vehicle_type) + label_hash(brand, model) as f64 * self.hash_scale;

        let age = self.current_year - year;
        if age > 0 {
            let retained = depreciation_rate(vehicle_type)
                .powi(age)
                .max(self.residual_floor);
            price *= retained;
        }
        if Self::is_luxury(brand) {
            price *= self.luxury_multiplier;
        }
        price * Self::model_multiplier(vehicle_type, model)
    }

    /// Deterministic price for a vehicle, rounded to whole units.
    /// `None` when the arithmetic produced a non-finite or non-positive value.
    pub fn synthesize(
        &self,
        vehicle_type: VehicleType,
        brand: &str,
        model: &str,
        year: i32,
    ) -> Option<u64> {
        finite_positive(self.raw_estimate(vehicle_type, brand, model, year))
    }

    /// Seeded-random variant for categories that need visible price spread.
    /// Output depends on `rng` state; use a seeded rng for reproducible runs.
    pub fn synthesize_jittered<R: Rng + ?Sized>(
        &self,
        vehicle_type: VehicleType,
        brand: &str,
        model: &str,
        year: i32,
        rng: &mut R,
    ) -> Option<u64> {
        let (lo, hi) = self.jitter_range;
        let factor = rng.gen_range(lo..=hi);
        let base = base_price(vehicle_type);
        let (floor, ceiling) = self.jitter_bounds;
        let price = (self.raw_estimate(vehicle_type, brand, model, year) * factor)
            .clamp(base * floor, base * ceiling);
        finite_positive(price)
    }
}

fn finite_positive(value: f64) -> Option<u64> {
    let rounded = value.round();
    if rounded.is_finite() && rounded >= 1.0 {
        Some(rounded as u64)
    } else {
        None
    }
}
