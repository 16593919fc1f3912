pub mod artifact;
pub mod merge;

pub use artifact::{load_existing, ArtifactReport, ArtifactWriter, DatasetMetadata};
pub use merge::{merge, MergeReport};
