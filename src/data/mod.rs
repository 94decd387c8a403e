pub mod ingestion;
pub mod processing;
pub mod table;

pub use ingestion::{PriceSource, YahooPriceSource};
pub use processing::{DataNormalizer, FieldSelection, NormalizedPrices, ReturnsCalculator};
pub use table::{Column, PriceField, PriceSeries, PriceTable, RawPriceTable, ReturnTable};
