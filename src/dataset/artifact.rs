//! Write path for the dataset artifacts.
//!
//! `vehicles.json` and `vehicles.json.gz` carry the same bytes. Both are staged
//! as `*.tmp`, the staged gzip is read back and decoded, and only a passing
//! check renames them into place and publishes `metadata.json`.

use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::model::{Dataset, VehicleRecord, VehicleType};

pub const DATASET_FILE: &str = "vehicles.json";
pub const COMPRESSED_FILE: &str = "vehicles.json.gz";
pub const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub version: String,
    pub generated_at: DateTime<Utc>,
    pub total_vehicles: usize,
    pub json_bytes: u64,
    pub gzip_bytes: u64,
    pub compression_ratio: f64,
    pub stats: BTreeMap<VehicleType, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactReport {
    pub json_bytes: u64,
    pub gzip_bytes: u64,
    pub verified_vehicles: usize,
    /// True when nothing was written and the sizes are projections.
    pub dry_run: bool,
    pub out_dir: PathBuf,
}

#[derive(Deserialize)]
struct VehicleCount {
    vehicles: Vec<IgnoredAny>,
}

/// Gzip `bytes` at the best compression level. The header carries no
/// timestamp, so equal input gives equal output.
pub fn gzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity((bytes.len() / 4).max(256)), Compression::best());
    encoder.write_all(bytes)?;
    encoder.finish()
}

/// Decode a compressed artifact and count its vehicles.
pub fn verify_gzip_bytes(compressed: &[u8], expected: usize) -> Result<usize, PipelineError> {
    let mut decoder = GzDecoder::new(compressed);
    let mut raw = Vec::new();
    let found = match decoder.read_to_end(&mut raw) {
        Ok(_) => serde_json::from_slice::<VehicleCount>(&raw)
            .map(|doc| doc.vehicles.len())
            .unwrap_or(0),
        Err(err) => {
            warn!(error = %err, "compressed artifact does not decode");
            0
        }
    };
    if found != expected {
        return Err(PipelineError::Integrity { expected, found });
    }
    Ok(found)
}

pub struct ArtifactWriter {
    out_dir: PathBuf,
    dry_run: bool,
}

impl ArtifactWriter {
    pub fn new(out_dir: impl Into<PathBuf>, dry_run: bool) -> Self {
        Self {
            out_dir: out_dir.into(),
            dry_run,
        }
    }

    pub fn write_dataset(&self, dataset: &Dataset) -> Result<ArtifactReport, PipelineError> {
        if dataset.is_empty() {
            return Err(PipelineError::EmptyDataset);
        }
        let json = serde_json::to_vec(dataset)?;
        let compressed = gzip(&json).map_err(|e| PipelineError::io(COMPRESSED_FILE, e))?;

        let verified_vehicles = if self.dry_run {
            verify_gzip_bytes(&compressed, dataset.len())?
        } else {
            self.persist(&json, &compressed, dataset)?
        };

        let report = ArtifactReport {
            json_bytes: json.len() as u64,
            gzip_bytes: compressed.len() as u64,
            verified_vehicles,
            dry_run: self.dry_run,
            out_dir: self.out_dir.clone(),
        };
        info!(
            json_bytes = report.json_bytes,
            gzip_bytes = report.gzip_bytes,
            vehicles = verified_vehicles,
            dry_run = self.dry_run,
            out_dir = %self.out_dir.display(),
            "dataset artifacts ready"
        );
        Ok(report)
    }

    /// Stage both artifacts under temporary names, verify the staged gzip from
    /// disk, then move them into place. A failed check leaves the previous
    /// artifacts and their metadata untouched.
    fn persist(&self, json: &[u8], compressed: &[u8], dataset: &Dataset) -> Result<usize, PipelineError> {
        fs::create_dir_all(&self.out_dir).map_err(|e| PipelineError::io(&self.out_dir, e))?;

        let json_path = self.out_dir.join(DATASET_FILE);
        let gz_path = self.out_dir.join(COMPRESSED_FILE);
        let json_tmp = staging_path(&json_path);
        let gz_tmp = staging_path(&gz_path);

        let staged = stage(&json_tmp, json)
            .and_then(|_| stage(&gz_tmp, compressed))
            .and_then(|_| fs::read(&gz_tmp).map_err(|e| PipelineError::io(&gz_tmp, e)))
            .and_then(|on_disk| verify_gzip_bytes(&on_disk, dataset.len()));
        let verified = match staged {
            Ok(n) => n,
            Err(err) => {
                let _ = fs::remove_file(&json_tmp);
                let _ = fs::remove_file(&gz_tmp);
                return Err(err);
            }
        };

        fs::rename(&json_tmp, &json_path).map_err(|e| PipelineError::io(&json_path, e))?;
        fs::rename(&gz_tmp, &gz_path).map_err(|e| PipelineError::io(&gz_path, e))?;

        let json_bytes = json.len() as u64;
        let gzip_bytes = compressed.len() as u64;
        let metadata = DatasetMetadata {
            version: dataset.version.clone(),
            generated_at: dataset.generated_at,
            total_vehicles: verified,
            json_bytes,
            gzip_bytes,
            compression_ratio: if json_bytes == 0 {
                0.0
            } else {
                gzip_bytes as f64 / json_bytes as f64
            },
            stats: dataset.stats.clone(),
        };
        let meta_path = self.out_dir.join(METADATA_FILE);
        let body = serde_json::to_vec_pretty(&metadata)?;
        fs::write(&meta_path, body).map_err(|e| PipelineError::io(&meta_path, e))?;
        Ok(verified)
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn stage(path: &Path, bytes: &[u8]) -> Result<(), PipelineError> {
    fs::write(path, bytes).map_err(|e| PipelineError::io(path, e))
}

/// Records of a previously written dataset, for incremental runs.
/// A missing file is normal; an unreadable one is logged and ignored.
pub fn load_existing(out_dir: &Path) -> Vec<VehicleRecord> {
    let path = out_dir.join(DATASET_FILE);
    let raw = match fs::read(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "previous dataset unreadable; starting fresh");
            return Vec::new();
        }
    };
    match serde_json::from_slice::<Dataset>(&raw) {
        Ok(previous) => {
            info!(path = %path.display(), vehicles = previous.len(), version = %previous.version, "loaded previous dataset");
            previous.vehicles
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "previous dataset is corrupt; starting fresh");
            Vec::new()
        }
    }
}
