use std::collections::HashMap;

use crate::config::Config;
use crate::store;
use crate::table::Table;

/// Columns joined out of the Scores Store when enriching an input table.
pub const SCORE_PROJECTION: [&str; 6] = [
    "facility_id",
    "score",
    "high_likelihood",
    "active_posting",
    "lat",
    "lon",
];

/// Returns a table of scored facilities. With no input the full Scores
/// Store is returned (fatal when absent); an input that already carries
/// scores is passed through untouched; otherwise the input is enriched by
/// a left join against the store where possible.
pub fn predict_needs(config: &Config, input: Option<Table>) -> anyhow::Result<Table> {
    let store = if config.scores_path.exists() {
        Some(store::load_scores(&config.scores_path)?)
    } else {
        None
    };
    resolve(input, store, config)
}

fn resolve(input: Option<Table>, store: Option<Table>, config: &Config) -> anyhow::Result<Table> {
    let input = match input {
        Some(input) => input,
        None => {
            return store.ok_or_else(|| {
                anyhow::anyhow!("scores store not found: {}", config.scores_path.display())
            })
        }
    };

    // Caller-supplied scores always win; the resolver never overwrites.
    if input.has_column("score") {
        return Ok(input);
    }

    match store {
        Some(store) if input.has_column("facility_id") => Ok(join_scores(&input, &store)),
        _ => Ok(input),
    }
}

/// Left join on facility_id against the fixed store projection. Every
/// input row survives; unmatched rows get empty score fields. Projection
/// columns the input already has are left alone rather than duplicated.
pub fn join_scores(input: &Table, store: &Table) -> Table {
    let mut by_id: HashMap<&str, usize> = HashMap::new();
    for i in 0..store.len() {
        if let Some(id) = store.get(i, "facility_id") {
            by_id.entry(id).or_insert(i);
        }
    }

    let joined_columns: Vec<&str> = SCORE_PROJECTION
        .iter()
        .skip(1)
        .filter(|c| !input.has_column(c))
        .copied()
        .collect();

    let mut headers: Vec<String> = input.headers().to_vec();
    headers.extend(joined_columns.iter().map(|c| c.to_string()));
    let mut out = Table::new(headers);

    for i in 0..input.len() {
        let mut row: Vec<String> = input
            .headers()
            .iter()
            .map(|h| input.get(i, h).unwrap_or("").to_string())
            .collect();

        let matched = input
            .get(i, "facility_id")
            .and_then(|id| by_id.get(id).copied());
        for column in &joined_columns {
            let cell = matched
                .and_then(|row_idx| store.get(row_idx, column))
                .unwrap_or("");
            row.push(cell.to_string());
        }
        out.push_row(row);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::threshold::Thresholds;

    fn test_config() -> Config {
        Config {
            features_path: "nonexistent/features.csv".into(),
            scores_path: "nonexistent/scores_latest.csv".into(),
            contacts_path: "nonexistent/contacts.csv".into(),
            model_path: "nonexistent/model.json".into(),
            thresholds: Thresholds::new(0.70),
            digest_top_n: 20,
            mail_from: "ops@example.com".to_string(),
            mail_to: vec![],
            sendgrid_api_key: None,
        }
    }

    fn sample_store() -> Table {
        Table::from_csv_str(
            "facility_id,score,high_likelihood,active_posting,lat,lon,beds\n\
             f1,0.91,true,false,40.1,-88.2,120\n\
             f2,0.12,false,false,41.0,-87.5,40\n",
        )
        .unwrap()
    }

    #[test]
    fn existing_score_column_passes_through_unchanged() {
        let input = Table::from_csv_str("facility_id,score\nf9,0.5\n").unwrap();
        let out = resolve(Some(input.clone()), Some(sample_store()), &test_config()).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn left_join_preserves_unmatched_rows() {
        let input = Table::from_csv_str("facility_id,city\nf1,Urbana\nf404,Nowhere\n").unwrap();
        let out = join_scores(&input, &sample_store());
        assert_eq!(out.len(), 2);
        assert_eq!(out.get(0, "score"), Some("0.91"));
        assert_eq!(out.get(0, "city"), Some("Urbana"));
        assert_eq!(out.get(1, "score"), Some(""));
        // beds is not part of the projection
        assert!(!out.has_column("beds"));
    }

    #[test]
    fn join_does_not_duplicate_existing_columns() {
        let input = Table::from_csv_str("facility_id,lat\nf1,39.0\n").unwrap();
        let out = join_scores(&input, &sample_store());
        let lat_count = out.headers().iter().filter(|h| *h == "lat").count();
        assert_eq!(lat_count, 1);
        assert_eq!(out.get(0, "lat"), Some("39.0"));
    }

    #[test]
    fn input_without_key_is_returned_as_is() {
        let input = Table::from_csv_str("facility_name\nGeneral\n").unwrap();
        let out = resolve(Some(input.clone()), Some(sample_store()), &test_config()).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn missing_store_without_input_is_fatal() {
        let err = resolve(None, None, &test_config()).unwrap_err();
        assert!(err.to_string().contains("scores store not found"));
    }

    #[test]
    fn no_input_returns_whole_store() {
        let out = resolve(None, Some(sample_store()), &test_config()).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.has_column("beds"));
    }
}
