use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::model::{Dataset, VehicleRecord};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub input: usize,
    pub dropped_invalid: usize,
    pub duplicates_replaced: usize,
    pub kept: usize,
}

/// Fold records into a dataset keyed by id.
///
/// Invalid records are dropped before deduplication, so an invalid late record
/// never displaces a valid earlier one. On an id collision the later record
/// wins but keeps the position where the id was first seen.
pub fn merge<I>(records: I, generated_at: DateTime<Utc>) -> Result<(Dataset, MergeReport), PipelineError>
where
    I: IntoIterator<Item = VehicleRecord>,
{
    let mut report = MergeReport::default();
    let mut by_id: IndexMap<String, VehicleRecord> = IndexMap::new();

    for record in records {
        report.input += 1;
        if !record.is_valid() {
            debug!(id = %record.id, price = record.price, "dropping invalid record");
            report.dropped_invalid += 1;
            continue;
        }
        if by_id.insert(record.id.clone(), record).is_some() {
            report.duplicates_replaced += 1;
        }
    }

    if by_id.is_empty() {
        return Err(PipelineError::EmptyDataset);
    }

    let mut stats = BTreeMap::new();
    let vehicles: Vec<VehicleRecord> = by_id
        .into_values()
        .inspect(|r| *stats.entry(r.vehicle_type).or_insert(0) += 1)
        .collect();
    report.kept = vehicles.len();

    info!(
        input = report.input,
        kept = report.kept,
        dropped_invalid = report.dropped_invalid,
        duplicates_replaced = report.duplicates_replaced,
        "records merged"
    );

    Ok((
        Dataset {
            version: Dataset::version_for(generated_at),
            generated_at,
            vehicles,
            stats,
        },
        report,
    ))
}
