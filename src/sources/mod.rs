pub mod auxiliary;
pub mod catalog;
pub mod fallback;
pub mod fetcher;
pub mod price_api;
#[cfg(test)]
pub(crate) mod test_support;

pub use auxiliary::{AuxiliarySource, HtmlAuxiliarySource, MarkupParser, TableRowParser};
pub use catalog::SeedCatalog;
pub use fallback::{generate_seed, PriceStrategy};
pub use fetcher::{execute_with_retry, HttpFetcher, JsonFetch, RetryPolicy};
pub use price_api::{BranchLevel, CategoryHarvest, PriceApiCollector, SkippedBranch};
