use crate::data::ReturnTable;
use tracing::{debug, info};

/// Minimum number of observations for a correlation to be defined.
const MIN_OBSERVATIONS: usize = 2;

/// Square, symmetric matrix of pairwise Pearson correlations.
///
/// Entries are `None` where the correlation is undefined (too few joint
/// observations or zero variance on the joint sample). The diagonal is
/// always `Some(1.0)`.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    assets: Vec<String>,
    values: Vec<Option<f64>>,
}

impl CorrelationMatrix {
    /// Builds a matrix from the upper triangle given row by row.
    ///
    /// `upper` yields the entries `(i, j)` for `i < j` in row-major order;
    /// the lower triangle is mirrored from it and the diagonal is set to 1.
    /// Missing trailing entries are treated as undefined.
    pub fn from_upper_triangle<I>(assets: Vec<String>, upper: I) -> Self
    where
        I: IntoIterator<Item = Option<f64>>,
    {
        let n = assets.len();
        let mut values = vec![None; n * n];
        let mut upper = upper.into_iter();

        for i in 0..n {
            values[i * n + i] = Some(1.0);
            for j in (i + 1)..n {
                let value = upper.next().flatten();
                values[i * n + j] = value;
                values[j * n + i] = value;
            }
        }

        Self { assets, values }
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Correlation between the assets at positions `i` and `j`.
    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        let n = self.assets.len();
        if i >= n || j >= n {
            return None;
        }
        self.values[i * n + j]
    }

    /// Correlation between two assets looked up by identifier.
    pub fn between(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.index_of(a)?;
        let j = self.index_of(b)?;
        self.get(i, j)
    }

    pub fn index_of(&self, asset: &str) -> Option<usize> {
        self.assets.iter().position(|a| a == asset)
    }

    /// Iterates the unordered pairs `(i, j, correlation)` with `i < j`, in
    /// row-major order.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize, Option<f64>)> + '_ {
        let n = self.assets.len();
        (0..n).flat_map(move |i| ((i + 1)..n).map(move |j| (i, j, self.get(i, j))))
    }
}

/// Computes pairwise-complete Pearson correlations from a return table.
#[derive(Debug, Default, Clone, Copy)]
pub struct CorrelationMatrixBuilder;

impl CorrelationMatrixBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Builds the correlation matrix.
    ///
    /// Assets with fewer than two defined returns are left out of the
    /// matrix entirely. For every remaining pair only the timestamps where
    /// both returns are defined are used; a pair sharing fewer than two such
    /// timestamps gets an undefined entry.
    ///
    /// # Arguments
    /// * `returns`: Return table produced by the returns calculator
    ///
    /// # Returns
    /// A `CorrelationMatrix` whose asset order follows the return table
    pub fn build(&self, returns: &ReturnTable) -> CorrelationMatrix {
        let columns: Vec<_> = returns
            .columns()
            .iter()
            .filter(|column| {
                let enough = column.observed() >= MIN_OBSERVATIONS;
                if !enough {
                    debug!(asset = %column.asset, "Too few returns for correlation, excluding asset");
                }
                enough
            })
            .collect();

        let assets: Vec<String> = columns.iter().map(|c| c.asset.clone()).collect();
        let mut upper = Vec::with_capacity(columns.len() * columns.len().saturating_sub(1) / 2);
        for (i, a) in columns.iter().enumerate() {
            for b in &columns[i + 1..] {
                upper.push(pearson(&a.values, &b.values));
            }
        }

        let undefined = upper.iter().filter(|v| v.is_none()).count();
        info!(
            assets = assets.len(),
            excluded = returns.len() - assets.len(),
            pairs = upper.len(),
            undefined,
            "Built correlation matrix"
        );

        CorrelationMatrix::from_upper_triangle(assets, upper)
    }
}

/// Pearson correlation over the indices where both series are defined.
///
/// Returns `None` when fewer than two joint observations exist or either
/// series is constant over them.
pub fn pearson(a: &[Option<f64>], b: &[Option<f64>]) -> Option<f64> {
    let joint: Vec<(f64, f64)> = a
        .iter()
        .zip(b)
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .collect();

    if joint.len() < MIN_OBSERVATIONS {
        return None;
    }

    let count = joint.len() as f64;
    let mean_a = joint.iter().map(|(x, _)| x).sum::<f64>() / count;
    let mean_b = joint.iter().map(|(_, y)| y).sum::<f64>() / count;

    let (mut covariance, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (x, y) in &joint {
        let dx = x - mean_a;
        let dy = y - mean_b;
        covariance += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    if var_a <= 0.0 || var_b <= 0.0 {
        return None;
    }

    let correlation = covariance / (var_a.sqrt() * var_b.sqrt());
    if correlation.is_finite() {
        Some(correlation.clamp(-1.0, 1.0))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::table::Column;
    use chrono::{Duration, TimeZone, Utc};

    fn create_test_returns(columns: &[(&str, &[Option<f64>])]) -> ReturnTable {
        let len = columns.iter().map(|(_, v)| v.len()).max().unwrap_or(0);
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let axis = (0..len).map(|i| start + Duration::days(i as i64)).collect();
        let columns = columns
            .iter()
            .map(|(asset, values)| Column {
                asset: asset.to_string(),
                values: values.to_vec(),
            })
            .collect();
        ReturnTable::new(axis, columns)
    }

    #[test]
    fn test_pearson_perfect_correlation() {
        let a = [Some(1.0), Some(2.0), Some(3.0)];
        let b = [Some(2.0), Some(4.0), Some(6.0)];
        let c = [Some(3.0), Some(2.0), Some(1.0)];

        assert!((pearson(&a, &b).unwrap() - 1.0).abs() < 1e-12);
        assert!((pearson(&a, &c).unwrap() + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pearson_uses_joint_observations_only() {
        let a = [None, Some(1.0), Some(2.0), Some(100.0), Some(3.0)];
        let b = [Some(5.0), Some(1.0), Some(2.0), None, Some(3.0)];

        assert!((pearson(&a, &b).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pearson_undefined_cases() {
        let a = [Some(1.0), None, Some(3.0)];
        let b = [None, Some(2.0), Some(3.0)];
        assert_eq!(pearson(&a, &b), None);

        let flat = [Some(1.0), Some(1.0), Some(1.0)];
        let moving = [Some(1.0), Some(2.0), Some(3.0)];
        assert_eq!(pearson(&flat, &moving), None);
    }

    #[test]
    fn test_matrix_is_symmetric_with_unit_diagonal() {
        let returns = create_test_returns(&[
            ("A", &[None, Some(0.01), Some(-0.02), Some(0.03), Some(0.01)]),
            ("B", &[None, Some(0.02), Some(-0.01), Some(0.02), Some(0.00)]),
            ("C", &[None, Some(-0.01), Some(0.02), None, Some(-0.03)]),
        ]);
        let matrix = CorrelationMatrixBuilder::new().build(&returns);

        assert_eq!(matrix.len(), 3);
        for i in 0..matrix.len() {
            assert_eq!(matrix.get(i, i), Some(1.0));
            for j in 0..matrix.len() {
                assert_eq!(matrix.get(i, j), matrix.get(j, i));
                if let Some(value) = matrix.get(i, j) {
                    assert!((-1.0..=1.0).contains(&value));
                }
            }
        }
    }

    #[test]
    fn test_missing_timestamp_only_affects_its_pairs() {
        // C has no return on day 4; that must not change corr(A, B).
        let a: &[Option<f64>] = &[None, Some(0.01), Some(-0.02), Some(0.03), Some(0.01)];
        let b: &[Option<f64>] = &[None, Some(0.02), Some(-0.01), Some(0.02), Some(0.00)];
        let with_c = create_test_returns(&[
            ("A", a),
            ("B", b),
            ("C", &[None, Some(-0.01), Some(0.02), None, Some(-0.03)]),
        ]);
        let without_c = create_test_returns(&[("A", a), ("B", b)]);

        let m1 = CorrelationMatrixBuilder::new().build(&with_c);
        let m2 = CorrelationMatrixBuilder::new().build(&without_c);

        assert_eq!(m1.between("A", "B"), m2.between("A", "B"));
        assert!(m1.between("A", "C").is_some());
    }

    #[test]
    fn test_sparse_assets_excluded() {
        let returns = create_test_returns(&[
            ("A", &[None, Some(0.01), Some(-0.02), Some(0.03)]),
            ("B", &[None, Some(0.02), Some(-0.01), Some(0.02)]),
            ("ONE", &[None, None, Some(0.05), None]),
            ("NONE", &[None, None, None, None]),
        ]);
        let matrix = CorrelationMatrixBuilder::new().build(&returns);

        assert_eq!(matrix.assets(), &["A".to_string(), "B".to_string()]);
        assert!(matrix.index_of("ONE").is_none());
    }

    #[test]
    fn test_pair_without_overlap_is_undefined() {
        let returns = create_test_returns(&[
            ("EARLY", &[None, Some(0.01), Some(-0.02), Some(0.03), None, None, None]),
            ("LATE", &[None, None, None, None, Some(0.01), Some(0.02), Some(-0.01)]),
        ]);
        let matrix = CorrelationMatrixBuilder::new().build(&returns);

        assert_eq!(matrix.len(), 2);
        assert_eq!(matrix.between("EARLY", "LATE"), None);
        assert_eq!(matrix.between("EARLY", "EARLY"), Some(1.0));
    }

    #[test]
    fn test_pairs_enumerate_upper_triangle_once() {
        let assets = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let matrix =
            CorrelationMatrix::from_upper_triangle(assets, vec![Some(0.1), Some(0.2), None]);

        let pairs: Vec<_> = matrix.pairs().collect();
        assert_eq!(
            pairs,
            vec![(0, 1, Some(0.1)), (0, 2, Some(0.2)), (1, 2, None)]
        );
        assert_eq!(matrix.between("C", "A"), Some(0.2));
    }
}
