use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Observed prices of a single asset, ascending by timestamp.
///
/// Construction sorts the points and collapses duplicate timestamps, keeping
/// the last price seen for a given instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub asset: String,
    points: Vec<(DateTime<Utc>, f64)>,
}

impl PriceSeries {
    pub fn new(asset: impl Into<String>, mut points: Vec<(DateTime<Utc>, f64)>) -> Self {
        points.sort_by(|a, b| a.0.cmp(&b.0));
        let mut deduped: Vec<(DateTime<Utc>, f64)> = Vec::with_capacity(points.len());
        for (timestamp, price) in points {
            match deduped.last_mut() {
                Some(last) if last.0 == timestamp => last.1 = price,
                _ => deduped.push((timestamp, price)),
            }
        }

        Self {
            asset: asset.into(),
            points: deduped,
        }
    }

    /// A series with no observations, used for assets whose retrieval failed.
    pub fn empty(asset: impl Into<String>) -> Self {
        Self::new(asset, Vec::new())
    }

    pub fn points(&self) -> &[(DateTime<Utc>, f64)] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// One asset's values laid out on the owning table's timestamp axis.
/// `None` marks a timestamp the asset has no value for.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub asset: String,
    pub values: Vec<Option<f64>>,
}

impl Column {
    pub fn observed(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }
}

/// Prices of many assets aligned on a shared, ascending timestamp axis.
///
/// Column order is significant: it is the asset order used by every later
/// stage, including node and edge ordering in the final graph.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PriceTable {
    timestamps: Vec<DateTime<Utc>>,
    columns: Vec<Column>,
}

impl PriceTable {
    /// Builds a table from pre-aligned columns.
    ///
    /// Columns whose length differs from the axis are padded with `None` or
    /// truncated so that every column lines up with `timestamps`.
    pub fn new(timestamps: Vec<DateTime<Utc>>, columns: Vec<Column>) -> Self {
        let len = timestamps.len();
        let columns = columns
            .into_iter()
            .map(|mut column| {
                column.values.resize(len, None);
                column
            })
            .collect();

        Self {
            timestamps,
            columns,
        }
    }

    /// Aligns independent series on the union of their timestamps.
    ///
    /// Asset order follows the order of `series`.
    pub fn from_series(series: Vec<PriceSeries>) -> Self {
        let axis: BTreeSet<DateTime<Utc>> = series
            .iter()
            .flat_map(|s| s.points.iter().map(|(timestamp, _)| *timestamp))
            .collect();
        let timestamps: Vec<DateTime<Utc>> = axis.into_iter().collect();

        let columns = series
            .into_iter()
            .map(|s| {
                let mut values = vec![None; timestamps.len()];
                for (timestamp, price) in s.points {
                    if let Ok(index) = timestamps.binary_search(&timestamp) {
                        values[index] = Some(price);
                    }
                }
                Column {
                    asset: s.asset,
                    values,
                }
            })
            .collect();

        Self {
            timestamps,
            columns,
        }
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, asset: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.asset == asset)
    }

    pub fn assets(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.asset.as_str())
    }

    /// Number of asset columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Keeps only the columns for which `keep` returns true.
    pub fn retain_columns<F>(&mut self, keep: F)
    where
        F: FnMut(&Column) -> bool,
    {
        self.columns.retain(keep);
    }
}

/// A labeled price field as delivered by the market-data source,
/// e.g. "Adj Close" or "Close".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PriceField {
    pub label: String,
}

impl PriceField {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }

    /// Label lowercased with spaces, underscores and dashes removed, so that
    /// "Adj Close", "adj_close" and "adjclose" compare equal.
    pub fn canonical(&self) -> String {
        self.label
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .flat_map(char::to_lowercase)
            .collect()
    }
}

/// Raw, possibly multi-field price data for the whole asset universe.
///
/// Fields are kept in the order the source produced them; that order matters
/// only when neither a labeled adjusted nor a plain close field can be found.
#[derive(Debug, Clone, Default)]
pub struct RawPriceTable {
    fields: Vec<(PriceField, PriceTable)>,
}

impl RawPriceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A raw table carrying a single price field.
    pub fn single(field: PriceField, table: PriceTable) -> Self {
        Self {
            fields: vec![(field, table)],
        }
    }

    pub fn push_field(&mut self, field: PriceField, table: PriceTable) {
        self.fields.push((field, table));
    }

    pub fn fields(&self) -> &[(PriceField, PriceTable)] {
        &self.fields
    }

    pub fn into_fields(self) -> Vec<(PriceField, PriceTable)> {
        self.fields
    }
}

/// Period-over-period simple returns aligned on the price table's axis.
///
/// `None` marks an undefined return: the first timestamp of every asset and
/// any timestamp where the current or previous price is missing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReturnTable {
    timestamps: Vec<DateTime<Utc>>,
    columns: Vec<Column>,
}

impl ReturnTable {
    pub fn new(timestamps: Vec<DateTime<Utc>>, columns: Vec<Column>) -> Self {
        Self {
            timestamps,
            columns,
        }
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, asset: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.asset == asset)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
