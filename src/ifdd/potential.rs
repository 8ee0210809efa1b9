// Candidate conjunctions and their relevance statistics

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::lattice::FeatureSet;
use crate::error::FddError;

/// How the relevance of a potential is computed
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RelevanceMode {
    /// iFDD+: `|cumtderr| / sqrt(count)`
    #[default]
    Plus,
    /// Classic iFDD: `cumabstderr`
    Classic,
    /// Per-inspection coin flip, iFDD+ with probability `plus_probability`
    Mixed { plus_probability: f64 },
}

impl RelevanceMode {
    /// Mode used where no random draw is allowed (batch discovery)
    pub fn deterministic_plus(&self) -> bool {
        !matches!(self, RelevanceMode::Classic)
    }
}

impl fmt::Display for RelevanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelevanceMode::Plus => write!(f, "plus"),
            RelevanceMode::Classic => write!(f, "classic"),
            RelevanceMode::Mixed { plus_probability } => write!(f, "mixed:{}", plus_probability),
        }
    }
}

impl FromStr for RelevanceMode {
    type Err = FddError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        match lowered.as_str() {
            "plus" | "ifdd+" => Ok(RelevanceMode::Plus),
            "classic" | "ifdd" => Ok(RelevanceMode::Classic),
            other => {
                let p = other
                    .strip_prefix("mixed:")
                    .ok_or_else(|| FddError::config(format!("unknown relevance mode '{}'", s)))?;
                let plus_probability: f64 = p.trim().parse().map_err(|_| {
                    FddError::config(format!("invalid mixing probability in relevance mode '{}'", s))
                })?;
                if !(0.0..=1.0).contains(&plus_probability) {
                    return Err(FddError::config(format!(
                        "mixing probability {} must lie in [0, 1]",
                        plus_probability
                    )));
                }
                Ok(RelevanceMode::Mixed { plus_probability })
            }
        }
    }
}

impl TryFrom<String> for RelevanceMode {
    type Error = FddError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RelevanceMode> for String {
    fn from(mode: RelevanceMode) -> Self {
        mode.to_string()
    }
}

/// A conjunction under evaluation, not yet part of the feature vector
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Potential {
    pub f_set: FeatureSet,
    /// Active features whose union first produced this conjunction
    pub parents: (usize, usize),
    /// Signed sum of TD errors seen while both parents were active
    pub cumtderr: f64,
    /// Sum of absolute TD errors
    pub cumabstderr: f64,
    pub count: u64,
}

impl Potential {
    pub fn new(f_set: FeatureSet, p1: usize, p2: usize) -> Self {
        Self {
            f_set,
            parents: (p1, p2),
            cumtderr: 0.0,
            cumabstderr: 0.0,
            count: 0,
        }
    }

    /// Record one joint activation with TD error `td_error`
    pub fn observe(&mut self, td_error: f64) {
        self.cumtderr += td_error;
        self.cumabstderr += td_error.abs();
        self.count += 1;
    }

    /// Relevance under iFDD+ (`plus`) or classic iFDD. Zero until observed.
    pub fn relevance(&self, plus: bool) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        if plus {
            self.cumtderr.abs() / (self.count as f64).sqrt()
        } else {
            self.cumabstderr
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_relevance_mode() {
        assert_eq!("plus".parse::<RelevanceMode>().unwrap(), RelevanceMode::Plus);
        assert_eq!(" Classic ".parse::<RelevanceMode>().unwrap(), RelevanceMode::Classic);
        assert_eq!(
            "mixed:0.25".parse::<RelevanceMode>().unwrap(),
            RelevanceMode::Mixed { plus_probability: 0.25 }
        );
        assert!("mixed:2".parse::<RelevanceMode>().unwrap_err().is_config());
        assert!("mixed:x".parse::<RelevanceMode>().unwrap_err().is_config());
        assert!("greedy".parse::<RelevanceMode>().unwrap_err().is_config());
        assert_eq!(RelevanceMode::Mixed { plus_probability: 0.5 }.to_string(), "mixed:0.5");
    }

    #[test]
    fn test_relevance_mode_serde() {
        let json = serde_json::to_string(&RelevanceMode::Classic).unwrap();
        assert_eq!(json, "\"classic\"");
        let mode: RelevanceMode = serde_json::from_str("\"mixed:0.75\"").unwrap();
        assert_eq!(mode, RelevanceMode::Mixed { plus_probability: 0.75 });
        assert!(serde_json::from_str::<RelevanceMode>("\"bogus\"").is_err());
    }

    #[test]
    fn test_unobserved_potential_has_zero_relevance() {
        let p = Potential::new(FeatureSet::from_indices([0, 1]), 0, 1);
        assert_eq!(p.relevance(true), 0.0);
        assert_eq!(p.relevance(false), 0.0);
    }

    #[test]
    fn test_relevance_modes() {
        let mut p = Potential::new(FeatureSet::from_indices([0, 1]), 0, 1);
        p.observe(1.0);
        p.observe(-3.0);
        assert_eq!(p.count, 2);
        assert_eq!(p.relevance(false), 4.0);
        assert!((p.relevance(true) - 2.0 / 2f64.sqrt()).abs() < 1e-12);
    }
}
