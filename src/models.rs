use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One outreach contact row. A facility may have zero or many contacts;
/// everything past the facility key is optional because contact exports
/// are frequently incomplete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactRecord {
    pub facility_id: String,
    #[serde(default)]
    pub specialty: Option<String>,
    #[serde(default)]
    pub contact_rank: Option<String>,
    #[serde(default)]
    pub last_verified: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default)]
    pub ext: Option<String>,
}

impl ContactRecord {
    /// Rank for ordering; unparseable or missing ranks sort last.
    pub fn rank(&self) -> i64 {
        let raw = match &self.contact_rank {
            Some(r) => r.trim(),
            None => return i64::MAX,
        };
        if let Ok(n) = raw.parse::<i64>() {
            return n;
        }
        if let Ok(f) = raw.parse::<f64>() {
            return f as i64;
        }
        i64::MAX
    }

    pub fn full_name(&self) -> String {
        let first = self.first_name.as_deref().unwrap_or("").trim();
        let last = self.last_name.as_deref().unwrap_or("").trim();
        [first, last]
            .iter()
            .filter(|p| !p.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Persisted logistic model: the sole channel for re-scoring new batches
/// without retraining.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRecord {
    pub trained_at: String,
    pub label_col: String,
    pub coefficients: BTreeMap<String, f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(rank: Option<&str>) -> ContactRecord {
        ContactRecord {
            facility_id: "f1".to_string(),
            specialty: None,
            contact_rank: rank.map(|r| r.to_string()),
            last_verified: None,
            first_name: Some("Dana".to_string()),
            last_name: Some("Reyes".to_string()),
            title: None,
            email: None,
            phone: None,
            mobile: None,
            ext: None,
        }
    }

    #[test]
    fn rank_parses_leniently() {
        assert_eq!(contact(Some("2")).rank(), 2);
        assert_eq!(contact(Some("2.0")).rank(), 2);
        assert_eq!(contact(Some("n/a")).rank(), i64::MAX);
        assert_eq!(contact(None).rank(), i64::MAX);
    }

    #[test]
    fn full_name_skips_missing_parts() {
        let mut c = contact(None);
        assert_eq!(c.full_name(), "Dana Reyes");
        c.first_name = None;
        assert_eq!(c.full_name(), "Reyes");
    }
}
