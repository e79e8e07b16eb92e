use std::path::Path;

use anyhow::Context;
use chrono::Utc;

use crate::config::Config;
use crate::models::{ContactRecord, ModelRecord};
use crate::scorer;
use crate::table::Table;
use crate::threshold::Thresholds;

/// Label columns that trigger a supervised fit, in preference order.
pub const LABEL_CANDIDATES: [&str; 3] =
    ["had_locum_next_45d", "need_within_45d", "need_within_30d"];

/// Scores a feature batch: supervised when a usable label column exists,
/// heuristic otherwise. A refused fit (too little label variation) falls
/// back to the heuristic and persists no model.
pub fn score_batch(table: &Table) -> (Vec<f64>, Option<ModelRecord>) {
    let label_col = LABEL_CANDIDATES
        .iter()
        .find(|c| table.has_column(c))
        .copied();

    if let Some(label_col) = label_col {
        tracing::info!("using supervised label: {label_col}");
        if let Some((probabilities, coefficients)) = scorer::fit_logit(table, label_col) {
            let scores = probabilities.iter().map(|p| p.clamp(0.0, 1.0)).collect();
            let model = ModelRecord {
                trained_at: Utc::now().to_rfc3339(),
                label_col: label_col.to_string(),
                coefficients,
            };
            return (scores, Some(model));
        }
        tracing::warn!("not enough label variation; falling back to heuristic");
    } else {
        tracing::info!("no label column; using heuristic scoring");
    }

    (scorer::heuristic_score(table), None)
}

/// Appends the score, high_likelihood and active_posting columns to a
/// scored batch. All original columns pass through untouched.
pub fn attach_scores(
    table: &mut Table,
    scores: &[f64],
    thresholds: &Thresholds,
) -> anyhow::Result<()> {
    let score_cells: Vec<String> = scores.iter().map(|s| format!("{s:.4}")).collect();

    let flags: Vec<String> = scores
        .iter()
        .enumerate()
        .map(|(i, score)| {
            let specialty = table.get(i, "specialty").unwrap_or("HO").trim().to_string();
            thresholds.classify(*score, &specialty).to_string()
        })
        .collect();

    table.set_column("score", score_cells)?;
    table.set_column("high_likelihood", flags)?;
    if !table.has_column("active_posting") {
        table.set_column("active_posting", vec!["false".to_string(); table.len()])?;
    }
    Ok(())
}

/// The training run: read the features file, score, flag, persist. The
/// features file being absent is the one fatal condition here.
pub fn run_training(config: &Config) -> anyhow::Result<()> {
    if !config.features_path.exists() {
        anyhow::bail!("missing features file: {}", config.features_path.display());
    }
    let mut table = Table::from_csv_path(&config.features_path)?;

    let (scores, model) = score_batch(&table);
    attach_scores(&mut table, &scores, &config.thresholds)?;
    table.write_csv_path(&config.scores_path)?;
    tracing::info!("wrote scores to {}", config.scores_path.display());

    if let Some(model) = model {
        save_model(&config.model_path, &model)?;
        tracing::info!("wrote model to {}", config.model_path.display());
    }

    print_preview(&table);
    Ok(())
}

/// Top-10 preview, sorted by specialty then score descending, mirroring
/// what operators see after every training run.
fn print_preview(table: &Table) {
    let mut order: Vec<usize> = (0..table.len()).collect();
    order.sort_by(|&a, &b| {
        let spec_a = table.get(a, "specialty").unwrap_or("");
        let spec_b = table.get(b, "specialty").unwrap_or("");
        let score_a = score_of(table, a);
        let score_b = score_of(table, b);
        spec_a.cmp(spec_b).then(
            score_b
                .partial_cmp(&score_a)
                .unwrap_or(std::cmp::Ordering::Equal),
        )
    });

    println!("Top facilities by score:");
    for &i in order.iter().take(10) {
        println!(
            "- {} ({}, {}) score {:.4} high_likelihood={}",
            table.get(i, "facility_name").unwrap_or("unknown"),
            table.get(i, "state").unwrap_or("?"),
            table.get(i, "specialty").unwrap_or("?"),
            score_of(table, i),
            table.get(i, "high_likelihood").unwrap_or("false"),
        );
    }
}

fn score_of(table: &Table, row: usize) -> f64 {
    table
        .get(row, "score")
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0.0)
}

/// Loads the persisted Scores Store; a missing store is fatal and names
/// the path it looked for.
pub fn load_scores(path: &Path) -> anyhow::Result<Table> {
    if !path.exists() {
        anyhow::bail!("scores store not found: {}", path.display());
    }
    Table::from_csv_path(path)
}

/// Contacts are optional context: a missing or unreadable file degrades
/// to an empty list so the map still renders.
pub fn load_contacts(path: &Path) -> Vec<ContactRecord> {
    let reader = match csv::Reader::from_path(path) {
        Ok(reader) => reader,
        Err(_) => {
            tracing::warn!("no contacts file at {}", path.display());
            return Vec::new();
        }
    };
    reader
        .into_deserialize::<ContactRecord>()
        .filter_map(|row| row.ok())
        .collect()
}

pub fn save_model(path: &Path, model: &ModelRecord) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let json = serde_json::to_string_pretty(model)?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
}

pub fn load_model(path: &Path) -> anyhow::Result<ModelRecord> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("missing model file: {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("malformed model file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_class_label_falls_back_to_heuristic() {
        let mut table = Table::from_csv_str(
            "facility_id,facility_name,specialty,postings_90d,had_locum_next_45d\n\
             f1,General,HO,8,1\n\
             f2,Mercy,HO,1,1\n\
             f3,Childrens,PDH,4,1\n",
        )
        .unwrap();

        let (scores, model) = score_batch(&table);
        assert!(model.is_none(), "constant label must refuse the fit");
        assert_eq!(scores.len(), 3);
        assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));

        attach_scores(&mut table, &scores, &Thresholds::new(0.70)).unwrap();
        assert!(table.has_column("high_likelihood"));
        assert_eq!(table.get(0, "active_posting"), Some("false"));
        // Min-max normalization pins the batch extremes to the ends.
        assert_eq!(table.get(1, "high_likelihood"), Some("false"));
    }

    #[test]
    fn varied_label_persists_a_model() {
        let table = Table::from_csv_str(
            "facility_id,postings_90d,need_within_30d\n\
             f1,9,1\nf2,8,1\nf3,1,0\nf4,0,0\n",
        )
        .unwrap();
        let (scores, model) = score_batch(&table);
        let model = model.expect("two-class label should fit");
        assert_eq!(model.label_col, "need_within_30d");
        assert!(model.coefficients.contains_key("postings_90d"));
        assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));
    }

    #[test]
    fn label_candidates_are_checked_in_order() {
        let table = Table::from_csv_str(
            "facility_id,had_locum_next_45d,need_within_30d\nf1,1,0\nf2,0,1\n",
        )
        .unwrap();
        let (_, model) = score_batch(&table);
        assert_eq!(model.unwrap().label_col, "had_locum_next_45d");
    }

    #[test]
    fn existing_active_posting_column_is_kept() {
        let mut table =
            Table::from_csv_str("facility_id,active_posting\nf1,true\n").unwrap();
        attach_scores(&mut table, &[0.9], &Thresholds::new(0.70)).unwrap();
        assert_eq!(table.get(0, "active_posting"), Some("true"));
        assert_eq!(table.get(0, "score"), Some("0.9000"));
    }
}
