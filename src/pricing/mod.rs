pub mod parse;
pub mod synth;

pub use parse::{parse_price_text, year_from_code};
pub use synth::{base_price, depreciation_rate, PriceModel};
