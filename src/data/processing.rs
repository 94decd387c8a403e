use super::table::{Column, PriceField, PriceTable, RawPriceTable, ReturnTable};
use crate::error::{PipelineError, Result};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

/// Canonical labels accepted as the adjustment-aware close, in order.
const ADJUSTED_CLOSE_LABELS: &[&str] = &["adjclose", "adjustedclose"];

/// Canonical labels accepted as the plain close.
const CLOSE_LABELS: &[&str] = &["close"];

/// Strategy used to pick the price field out of a multi-field raw table,
/// listed in priority order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FieldSelection {
    /// An adjusted close field was found.
    AdjustedClose,
    /// No adjusted close, but a plain close field was found.
    Close,
    /// Neither labeled field exists; the first field was used as a best
    /// effort.
    FirstAvailable { label: String },
}

impl FieldSelection {
    pub fn is_degraded(&self) -> bool {
        matches!(self, FieldSelection::FirstAvailable { .. })
    }
}

impl fmt::Display for FieldSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldSelection::AdjustedClose => write!(f, "adjusted close"),
            FieldSelection::Close => write!(f, "close"),
            FieldSelection::FirstAvailable { label } => {
                write!(f, "first available field ({})", label)
            }
        }
    }
}

/// Output of [`DataNormalizer::normalize`].
#[derive(Debug, Clone)]
pub struct NormalizedPrices {
    pub table: PriceTable,
    pub selection: FieldSelection,
    /// Assets removed because they had no observed price at all.
    pub dropped: Vec<String>,
}

/// Cleans a raw multi-field price table into a single-field price table.
///
/// Picks the price field according to [`FieldSelection`] priority and drops
/// every asset column that has no observation at all. Dropped assets are
/// reported in the result but are not errors.
#[derive(Debug, Default, Clone, Copy)]
pub struct DataNormalizer;

impl DataNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Selects the price field and removes unusable assets.
    ///
    /// # Arguments
    /// * `raw`: Raw price table as delivered by the price source
    ///
    /// # Errors
    /// Returns [`PipelineError::NoUsableData`] if the raw table has no field
    /// or if every asset column is empty after selection.
    pub fn normalize(&self, raw: RawPriceTable) -> Result<NormalizedPrices> {
        let fields = raw.into_fields();
        let index = Self::select_field(&fields).ok_or(PipelineError::NoUsableData)?;
        let selection = Self::classify(&fields[index].0, index);
        let (field, mut table) = match fields.into_iter().nth(index) {
            Some(entry) => entry,
            None => return Err(PipelineError::NoUsableData),
        };

        if selection.is_degraded() {
            warn!(
                field = %field.label,
                "No adjusted or plain close field in price data, falling back to first available field"
            );
        } else {
            info!(field = %field.label, strategy = %selection, "Selected price field");
        }

        let mut dropped = Vec::new();
        table.retain_columns(|column| {
            if column.observed() == 0 {
                debug!(asset = %column.asset, "Dropping asset with no observed prices");
                dropped.push(column.asset.clone());
                false
            } else {
                true
            }
        });

        if table.is_empty() {
            return Err(PipelineError::NoUsableData);
        }

        info!(
            kept = table.len(),
            dropped = dropped.len(),
            "Normalized price table"
        );

        Ok(NormalizedPrices {
            table,
            selection,
            dropped,
        })
    }

    fn select_field(fields: &[(PriceField, PriceTable)]) -> Option<usize> {
        let find = |labels: &[&str]| {
            labels.iter().find_map(|label| {
                fields
                    .iter()
                    .position(|(field, _)| field.canonical() == *label)
            })
        };

        find(ADJUSTED_CLOSE_LABELS)
            .or_else(|| find(CLOSE_LABELS))
            .or_else(|| if fields.is_empty() { None } else { Some(0) })
    }

    fn classify(field: &PriceField, index: usize) -> FieldSelection {
        let canonical = field.canonical();
        if ADJUSTED_CLOSE_LABELS.contains(&canonical.as_str()) {
            FieldSelection::AdjustedClose
        } else if CLOSE_LABELS.contains(&canonical.as_str()) {
            FieldSelection::Close
        } else {
            debug!(index, "Using positional price field");
            FieldSelection::FirstAvailable {
                label: field.label.clone(),
            }
        }
    }
}

/// Converts prices into simple period-over-period returns.
///
/// Returns are taken between consecutive rows of the shared axis without
/// forward-filling: a missing price leaves both its own row and the row
/// after it undefined.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReturnsCalculator;

impl ReturnsCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Computes `price[t] / price[t-1] - 1` per asset.
    ///
    /// # Arguments
    /// * `prices`: Cleaned price table
    ///
    /// # Returns
    /// A `ReturnTable` with the same axis and asset order as `prices`
    pub fn calculate(&self, prices: &PriceTable) -> ReturnTable {
        let columns = prices
            .columns()
            .iter()
            .map(|column| Column {
                asset: column.asset.clone(),
                values: Self::simple_returns(&column.values),
            })
            .collect();

        ReturnTable::new(prices.timestamps().to_vec(), columns)
    }

    fn simple_returns(prices: &[Option<f64>]) -> Vec<Option<f64>> {
        let mut returns = Vec::with_capacity(prices.len());
        if prices.is_empty() {
            return returns;
        }

        returns.push(None);
        for window in prices.windows(2) {
            let value = match (window[0], window[1]) {
                (Some(previous), Some(current)) if previous != 0.0 && previous.is_finite() => {
                    Some(current / previous - 1.0).filter(|r| r.is_finite())
                }
                _ => None,
            };
            returns.push(value);
        }

        returns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, 0, 0, 0).unwrap()
    }

    fn create_test_table(assets: &[(&str, &[Option<f64>])]) -> PriceTable {
        let len = assets.iter().map(|(_, prices)| prices.len()).max().unwrap_or(0);
        let axis = (0..len).map(|i| day(i as u32 + 1)).collect();
        let columns = assets
            .iter()
            .map(|(asset, prices)| Column {
                asset: asset.to_string(),
                values: prices.to_vec(),
            })
            .collect();
        PriceTable::new(axis, columns)
    }

    fn labeled(labels: &[&str]) -> RawPriceTable {
        let mut raw = RawPriceTable::new();
        for (i, label) in labels.iter().enumerate() {
            let price = 100.0 + i as f64;
            raw.push_field(
                PriceField::new(*label),
                create_test_table(&[("A", &[Some(price), Some(price + 1.0)])]),
            );
        }
        raw
    }

    #[test]
    fn test_prefers_adjusted_close() {
        let normalized = DataNormalizer::new()
            .normalize(labeled(&["Close", "Adj Close", "Open"]))
            .unwrap();

        assert_eq!(normalized.selection, FieldSelection::AdjustedClose);
        assert_eq!(
            normalized.table.column("A").unwrap().values[0],
            Some(101.0)
        );
    }

    #[test]
    fn test_falls_back_to_close() {
        let normalized = DataNormalizer::new()
            .normalize(labeled(&["Open", "close"]))
            .unwrap();

        assert_eq!(normalized.selection, FieldSelection::Close);
        assert_eq!(
            normalized.table.column("A").unwrap().values[0],
            Some(101.0)
        );
    }

    #[test]
    fn test_degraded_selection_uses_first_field() {
        let normalized = DataNormalizer::new()
            .normalize(labeled(&["Price", "Open"]))
            .unwrap();

        assert!(normalized.selection.is_degraded());
        assert_eq!(
            normalized.selection,
            FieldSelection::FirstAvailable {
                label: "Price".to_string()
            }
        );
        assert_eq!(
            normalized.table.column("A").unwrap().values[0],
            Some(100.0)
        );
    }

    #[test]
    fn test_drops_fully_missing_assets() {
        let table = create_test_table(&[
            ("A", &[Some(1.0), Some(2.0)]),
            ("B", &[None, None]),
            ("C", &[None, Some(3.0)]),
        ]);
        let raw = RawPriceTable::single(PriceField::new("Adj Close"), table);

        let normalized = DataNormalizer::new().normalize(raw).unwrap();

        assert_eq!(normalized.table.assets().collect::<Vec<_>>(), vec!["A", "C"]);
        assert_eq!(normalized.dropped, vec!["B".to_string()]);
    }

    #[test]
    fn test_no_usable_data() {
        let empty = DataNormalizer::new().normalize(RawPriceTable::new());
        assert!(matches!(empty, Err(PipelineError::NoUsableData)));

        let table = create_test_table(&[("A", &[None, None])]);
        let all_missing = DataNormalizer::new()
            .normalize(RawPriceTable::single(PriceField::new("Close"), table));
        assert!(matches!(all_missing, Err(PipelineError::NoUsableData)));
    }

    #[test]
    fn test_simple_returns() {
        let table = create_test_table(&[("A", &[Some(100.0), Some(110.0), Some(99.0)])]);
        let returns = ReturnsCalculator::new().calculate(&table);
        let values = &returns.column("A").unwrap().values;

        assert_eq!(values[0], None);
        assert!((values[1].unwrap() - 0.1).abs() < 1e-12);
        assert!((values[2].unwrap() + 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_gap_is_not_forward_filled() {
        let table = create_test_table(&[(
            "A",
            &[Some(100.0), None, Some(120.0), Some(132.0)],
        )]);
        let returns = ReturnsCalculator::new().calculate(&table);
        let values = &returns.column("A").unwrap().values;

        assert_eq!(values[0], None);
        assert_eq!(values[1], None);
        assert_eq!(values[2], None);
        assert!((values[3].unwrap() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_zero_previous_price_is_undefined() {
        let table = create_test_table(&[("A", &[Some(0.0), Some(1.0), Some(2.0)])]);
        let returns = ReturnsCalculator::new().calculate(&table);
        let values = &returns.column("A").unwrap().values;

        assert_eq!(values[1], None);
        assert_eq!(values[2], Some(1.0));
    }

    #[test]
    fn test_returns_keep_asset_set() {
        let table = create_test_table(&[
            ("A", &[Some(1.0), Some(2.0)]),
            ("B", &[None, Some(3.0)]),
        ]);
        let returns = ReturnsCalculator::new().calculate(&table);

        assert_eq!(returns.len(), 2);
        assert_eq!(returns.timestamps(), table.timestamps());
        assert_eq!(returns.column("B").unwrap().observed(), 0);
    }
}
