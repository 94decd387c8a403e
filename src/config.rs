use crate::error::{PipelineError, Result};
use chrono::Duration;
use std::collections::{HashMap, HashSet};
use std::env;
use std::path::PathBuf;

/// Group label for identifiers missing from the sector taxonomy.
pub const UNKNOWN_GROUP: &str = "Unknown";

/// Minimum absolute correlation for a pair to become an edge.
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Roughly six months of calendar days.
pub const DEFAULT_LOOKBACK_DAYS: i64 = 183;

/// A century of calendar days.
pub const MAX_LOOKBACK_DAYS: i64 = 36_525;

pub const DEFAULT_INTERVAL: &str = "1d";

pub const DEFAULT_QUOTE_SUFFIX: &str = "-USD";

pub const DEFAULT_OUTPUT_PATH: &str = "src/data/correlations.json";

pub const DEFAULT_SNAPSHOT_PATH: &str = "correlation_data.json";

const DEFAULT_ASSETS: &[&str] = &[
    // Tech
    "AAPL", "MSFT", "NVDA", "GOOGL", "AMD", "META",
    // Consumer / Auto
    "TSLA", "AMZN", "COST",
    // Finance
    "JPM", "BAC", "V", "MA", "GS", "BLK",
    // Energy
    "XOM", "CVX", "COP",
    // Health
    "JNJ", "PFE", "UNH", "LLY", "MRK", "ABBV",
    // Consumer staples
    "KO", "PEP", "WMT",
    // Crypto
    "BTC-USD", "ETH-USD", "SOL-USD",
    // High beta / crypto proxies
    "COIN", "MSTR", "PLTR", "MARA", "RIOT", "DKNG",
];

const DEFAULT_SECTORS: &[(&str, &[&str])] = &[
    ("Tech", &["AAPL", "MSFT", "NVDA", "GOOGL", "AMD", "META", "PLTR"]),
    (
        "Consumer",
        &["TSLA", "AMZN", "COST", "DKNG", "KO", "PEP", "WMT"],
    ),
    ("Finance", &["JPM", "BAC", "V", "MA", "GS", "BLK"]),
    ("Energy", &["XOM", "CVX", "COP"]),
    ("Health", &["JNJ", "PFE", "UNH", "LLY", "MRK", "ABBV"]),
    (
        "Crypto",
        &["BTC-USD", "ETH-USD", "SOL-USD", "COIN", "MSTR", "MARA", "RIOT"],
    ),
];

/// Static mapping from asset identifier to sector group.
///
/// Lookups are exact-match on the raw identifier (before any display
/// formatting). Anything not listed maps to [`UNKNOWN_GROUP`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectorTaxonomy {
    groups: HashMap<String, String>,
}

impl SectorTaxonomy {
    /// Builds the lookup table from `(group, members)` rows.
    ///
    /// An identifier listed under several groups keeps the first one.
    pub fn from_table(table: &[(&str, &[&str])]) -> Self {
        let mut groups = HashMap::new();
        for (group, members) in table {
            for member in members.iter() {
                groups
                    .entry((*member).to_string())
                    .or_insert_with(|| (*group).to_string());
            }
        }
        Self { groups }
    }

    pub fn group_of(&self, asset: &str) -> &str {
        self.groups
            .get(asset)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_GROUP)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// How asset identifiers are turned into node ids.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayFormat {
    /// Trailing quote-currency marker removed from identifiers, e.g. "-USD".
    pub strip_suffix: Option<String>,
}

impl DisplayFormat {
    pub fn verbatim() -> Self {
        Self { strip_suffix: None }
    }

    pub fn display_id(&self, asset: &str) -> String {
        match &self.strip_suffix {
            Some(suffix) if !suffix.is_empty() => asset
                .strip_suffix(suffix.as_str())
                .filter(|stripped| !stripped.is_empty())
                .unwrap_or(asset)
                .to_string(),
            _ => asset.to_string(),
        }
    }
}

impl Default for DisplayFormat {
    fn default() -> Self {
        Self {
            strip_suffix: Some(DEFAULT_QUOTE_SUFFIX.to_string()),
        }
    }
}

/// Everything a pipeline run depends on besides the price data itself.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub assets: Vec<String>,
    pub taxonomy: SectorTaxonomy,
    pub threshold: f64,
    pub lookback_days: i64,
    pub interval: String,
    pub display: DisplayFormat,
    pub output_path: PathBuf,
    pub snapshot_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            assets: DEFAULT_ASSETS.iter().map(|a| a.to_string()).collect(),
            taxonomy: SectorTaxonomy::from_table(DEFAULT_SECTORS),
            threshold: DEFAULT_THRESHOLD,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            interval: DEFAULT_INTERVAL.to_string(),
            display: DisplayFormat::default(),
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            snapshot_path: Some(PathBuf::from(DEFAULT_SNAPSHOT_PATH)),
        }
    }
}

impl PipelineConfig {
    /// Default configuration restricted to a custom asset universe.
    pub fn for_assets<I, S>(assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            assets: dedup_assets(assets.into_iter().map(Into::into)),
            ..Self::default()
        }
    }

    /// Loads `.env` if present and applies `CORRELATION_*` overrides on top
    /// of the defaults.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::default().with_overrides(|key| env::var(key).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(assets) = lookup("CORRELATION_ASSETS") {
            let assets = dedup_assets(
                assets
                    .split(',')
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .map(str::to_string),
            );
            if assets.is_empty() {
                return Err(PipelineError::Config(
                    "CORRELATION_ASSETS lists no identifiers".to_string(),
                ));
            }
            self.assets = assets;
        }

        if let Some(threshold) = lookup("CORRELATION_THRESHOLD") {
            let threshold: f64 = threshold.trim().parse().map_err(|e| {
                PipelineError::Config(format!("CORRELATION_THRESHOLD {:?}: {}", threshold, e))
            })?;
            if !(0.0..1.0).contains(&threshold) {
                return Err(PipelineError::Config(format!(
                    "CORRELATION_THRESHOLD must be in [0, 1), got {}",
                    threshold
                )));
            }
            self.threshold = threshold;
        }

        if let Some(days) = lookup("CORRELATION_LOOKBACK_DAYS") {
            let days: i64 = days.trim().parse().map_err(|e| {
                PipelineError::Config(format!("CORRELATION_LOOKBACK_DAYS {:?}: {}", days, e))
            })?;
            if days <= 0 || days > MAX_LOOKBACK_DAYS {
                return Err(PipelineError::Config(format!(
                    "CORRELATION_LOOKBACK_DAYS must be in 1..={}, got {}",
                    MAX_LOOKBACK_DAYS, days
                )));
            }
            self.lookback_days = days;
        }

        if let Some(interval) = lookup("CORRELATION_INTERVAL") {
            self.interval = interval.trim().to_string();
        }

        if let Some(path) = lookup("CORRELATION_OUTPUT_PATH") {
            self.output_path = PathBuf::from(path);
        }

        if let Some(path) = lookup("CORRELATION_SNAPSHOT_PATH") {
            self.snapshot_path = if path.trim().is_empty() {
                None
            } else {
                Some(PathBuf::from(path))
            };
        }

        if let Some(suffix) = lookup("CORRELATION_DISPLAY_SUFFIX") {
            self.display.strip_suffix = if suffix.is_empty() {
                None
            } else {
                Some(suffix)
            };
        }

        Ok(self)
    }
}

/// Lookback window as a duration, if it is representable.
pub fn lookback_window(days: i64) -> Result<Duration> {
    Duration::try_days(days)
        .filter(|_| days > 0)
        .ok_or_else(|| PipelineError::Config(format!("invalid lookback of {} days", days)))
}

/// Keeps the first occurrence of every identifier, in order.
fn dedup_assets<I>(assets: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    assets
        .into_iter()
        .filter(|asset| seen.insert(asset.clone()))
        .collect()
}
