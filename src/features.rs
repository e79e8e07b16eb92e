use crate::table::Table;

/// Raw feature columns the scorer knows about. Columns absent from the
/// input are synthesized as zeros so the matrix shape is stable.
pub const FEATURE_CANDIDATES: [&str; 9] = [
    "postings_90d",
    "postings_365d",
    "last_post_days",
    "competitor_postings_30d",
    "census_index",
    "seasonality_index",
    "turnover_index",
    "credentialing_days",
    "beds",
];

pub const RECENCY_COLUMN: &str = "recency_1_over";
pub const BIAS_COLUMN: &str = "const";

/// The one place numeric cells are coerced. Hyphenated ranges like
/// "16-18" become the mean of their parseable segments; anything else is
/// parsed as a plain float; failures are missing, never errors.
pub fn parse_numeric_or_range(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if s.contains('-') {
        let parsed: Vec<f64> = s
            .split('-')
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .filter_map(|p| p.parse::<f64>().ok())
            .collect();
        if parsed.is_empty() {
            return None;
        }
        return Some(parsed.iter().sum::<f64>() / parsed.len() as f64);
    }
    s.parse::<f64>().ok()
}

/// Lenient truthiness for flag cells ("1", "true", "yes" in any case).
pub fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes")
}

/// Dense column-major feature matrix. Invariant: every column is fully
/// populated once `build_matrix` returns.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
    rows: usize,
}

impl FeatureMatrix {
    pub fn new(rows: usize) -> Self {
        Self {
            names: Vec::new(),
            columns: Vec::new(),
            rows,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        let idx = self.names.iter().position(|n| n == name)?;
        Some(&self.columns[idx])
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.names
            .iter()
            .map(|n| n.as_str())
            .zip(self.columns.iter().map(|c| c.as_slice()))
    }

    pub fn push_column(&mut self, name: &str, values: Vec<f64>) {
        debug_assert_eq!(values.len(), self.rows);
        self.names.push(name.to_string());
        self.columns.push(values);
    }

    /// Appends the intercept column. Idempotent: a matrix that already
    /// carries one is left untouched.
    pub fn add_bias(&mut self) {
        if self.column(BIAS_COLUMN).is_some() {
            return;
        }
        self.push_column(BIAS_COLUMN, vec![1.0; self.rows]);
    }
}

/// Builds the numeric feature matrix for a facility table: the nine raw
/// columns (zero-filled when absent), the derived recency signal, and the
/// intercept. Malformed cells degrade to missing and then to 0.0.
pub fn build_matrix(table: &Table) -> FeatureMatrix {
    let rows = table.len();
    let mut matrix = FeatureMatrix::new(rows);

    let mut last_post_days: Vec<Option<f64>> = vec![Some(0.0); rows];

    for name in FEATURE_CANDIDATES {
        let parsed: Vec<Option<f64>> = if table.has_column(name) {
            (0..rows)
                .map(|i| table.get(i, name).and_then(parse_numeric_or_range))
                .collect()
        } else {
            vec![Some(0.0); rows]
        };

        if name == "last_post_days" {
            last_post_days = parsed.clone();
        }

        matrix.push_column(name, parsed.iter().map(|v| v.unwrap_or(0.0)).collect());
    }

    // Recency boost: a missing last_post_days cell means "very stale"
    // (999 days), not "unknown". A fully absent column stays at zero days.
    let recency: Vec<f64> = last_post_days
        .iter()
        .map(|days| 1.0 / (1.0 + days.unwrap_or(999.0)))
        .collect();
    matrix.push_column(RECENCY_COLUMN, recency);

    matrix.add_bias();
    matrix
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ranges_and_plain_numbers() {
        assert_eq!(parse_numeric_or_range("16-18"), Some(17.0));
        assert_eq!(parse_numeric_or_range("20"), Some(20.0));
        assert_eq!(parse_numeric_or_range(" 20 "), Some(20.0));
        assert_eq!(parse_numeric_or_range("abc"), None);
        assert_eq!(parse_numeric_or_range(""), None);
        assert_eq!(parse_numeric_or_range("10-"), Some(10.0));
    }

    #[test]
    fn matrix_has_no_missing_cells() {
        let table = Table::from_csv_str(
            "facility_id,postings_90d,beds\nf1,3,16-18\nf2,abc,\nf3,,220\n",
        )
        .unwrap();
        let matrix = build_matrix(&table);
        for (_, column) in matrix.columns() {
            assert_eq!(column.len(), 3);
            assert!(column.iter().all(|v| v.is_finite()));
        }
        assert_eq!(matrix.column("beds").unwrap()[0], 17.0);
        assert_eq!(matrix.column("postings_90d").unwrap()[1], 0.0);
    }

    #[test]
    fn bias_column_is_never_duplicated() {
        let table = Table::from_csv_str("facility_id\nf1\n").unwrap();
        let mut matrix = build_matrix(&table);
        matrix.add_bias();
        matrix.add_bias();
        let bias_count = matrix.names().iter().filter(|n| *n == BIAS_COLUMN).count();
        assert_eq!(bias_count, 1);
        assert_eq!(matrix.column(BIAS_COLUMN).unwrap(), &[1.0]);
    }

    #[test]
    fn missing_last_post_cell_reads_as_stale() {
        let table = Table::from_csv_str("last_post_days\n4\n\n").unwrap();
        let matrix = build_matrix(&table);
        let recency = matrix.column(RECENCY_COLUMN).unwrap();
        assert!((recency[0] - 1.0 / 5.0).abs() < 1e-12);
        assert!((recency[1] - 1.0 / 1000.0).abs() < 1e-12);
    }

    #[test]
    fn absent_last_post_column_means_fresh() {
        let table = Table::from_csv_str("facility_id\nf1\n").unwrap();
        let matrix = build_matrix(&table);
        assert_eq!(matrix.column(RECENCY_COLUMN).unwrap(), &[1.0]);
    }
}
