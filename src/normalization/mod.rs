pub mod id;

pub use id::{normalize_id, slugify};
