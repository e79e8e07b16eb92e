use std::path::PathBuf;

use crate::threshold::Thresholds;

pub const DEFAULT_RED_THRESHOLD: f64 = 0.70;
pub const DEFAULT_DIGEST_TOP_N: usize = 20;
pub const DEFAULT_MAIL_FROM: &str = "locum-agent@yourdomain.com";

/// All runtime configuration, resolved once from the environment and
/// passed into components explicitly so tests can construct their own.
#[derive(Debug, Clone)]
pub struct Config {
    pub features_path: PathBuf,
    pub scores_path: PathBuf,
    pub contacts_path: PathBuf,
    pub model_path: PathBuf,
    pub thresholds: Thresholds,
    pub digest_top_n: usize,
    pub mail_from: String,
    pub mail_to: Vec<String>,
    pub sendgrid_api_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        let mut thresholds = Thresholds::new(
            env_parsed("RED_THRESHOLD").unwrap_or(DEFAULT_RED_THRESHOLD),
        );
        // A malformed per-specialty override is ignored, not fatal.
        for specialty in ["HO", "PDH"] {
            if let Some(cutoff) = specialty_override(specialty) {
                thresholds = thresholds.with_override(specialty, cutoff);
            }
        }

        Self {
            features_path: env_path("FEATURES_PATH", "data/processed/facility_features.csv"),
            scores_path: env_path("SCORES_PATH", "data/processed/scores_latest.csv"),
            contacts_path: env_path("CONTACTS_PATH", "data/processed/contacts.csv"),
            model_path: env_path("MODEL_PATH", "data/models/predictor_logit.json"),
            thresholds,
            digest_top_n: env_parsed("DIGEST_TOP_N").unwrap_or(DEFAULT_DIGEST_TOP_N),
            mail_from: std::env::var("MAIL_FROM").unwrap_or_else(|_| DEFAULT_MAIL_FROM.to_string()),
            mail_to: recipients(std::env::var("MAIL_TO").ok().as_deref()),
            sendgrid_api_key: std::env::var("SENDGRID_API_KEY").ok().filter(|k| !k.is_empty()),
        }
    }
}

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var(key)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn specialty_override(specialty: &str) -> Option<f64> {
    let raw = std::env::var(format!("RED_THRESHOLD_{specialty}")).ok()?;
    match raw.trim().parse::<f64>() {
        Ok(cutoff) => Some(cutoff),
        Err(_) => {
            tracing::warn!("ignoring unparseable RED_THRESHOLD_{specialty}={raw}");
            None
        }
    }
}

/// Comma-separated recipient list; blank entries are dropped.
pub fn recipients(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or("")
        .split(',')
        .map(|r| r.trim())
        .filter(|r| !r.is_empty())
        .map(|r| r.to_string())
        .collect()
}
