use std::collections::HashMap;

/// Per-specialty score cutoffs for the high-likelihood flag. An override
/// wins over the global default; specialties without one fall back to it.
#[derive(Debug, Clone)]
pub struct Thresholds {
    default: f64,
    overrides: HashMap<String, f64>,
}

impl Thresholds {
    pub fn new(default: f64) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, specialty: &str, cutoff: f64) -> Self {
        self.overrides.insert(specialty.to_string(), cutoff);
        self
    }

    pub fn cutoff_for(&self, specialty: &str) -> f64 {
        self.overrides
            .get(specialty)
            .copied()
            .unwrap_or(self.default)
    }

    pub fn classify(&self, score: f64, specialty: &str) -> bool {
        score >= self.cutoff_for(specialty)
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_RED_THRESHOLD)
    }
}
