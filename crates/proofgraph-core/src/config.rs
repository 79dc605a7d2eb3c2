use serde::{Deserialize, Serialize};

use crate::error::{ProofGraphError, Result};
use crate::hash::sha256_hex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntailmentMode {
    /// Heuristic coverage floor; some paraphrase tolerated.
    Calibrated,
    /// Full evidence coverage, zero new terms, rationale checked too.
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudienceLevel {
    Beginner,
    Intermediate,
    Expert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProofDetailMode {
    Sketch,
    Standard,
    Detailed,
}

/// Model-provider settings consumed by the summary pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: usize,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model: "claude-3-5-sonnet-20241022".to_string(),
            temperature: 0.1,
            max_output_tokens: 1024,
        }
    }
}

/// Numeric knobs the critic uses. The specific constants were tuned against
/// real corpora; treat them as configuration, not contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticThresholds {
    /// Base token-coverage floor in calibrated entailment mode.
    pub calibrated_coverage_floor: f32,
    /// Base token-coverage floor in strict entailment mode.
    pub strict_coverage_floor: f32,
    /// Floor shift applied per audience step away from intermediate.
    pub audience_adjustment: f32,
    /// Floor shift applied per proof-detail step away from standard.
    pub proof_detail_adjustment: f32,
    pub min_coverage_floor: f32,
    pub max_coverage_floor: f32,
    /// Configured env secrets shorter than this are ignored as likely
    /// false positives.
    pub min_secret_value_len: usize,
}

impl Default for CriticThresholds {
    fn default() -> Self {
        Self {
            calibrated_coverage_floor: 0.55,
            strict_coverage_floor: 0.80,
            audience_adjustment: 0.05,
            proof_detail_adjustment: 0.05,
            min_coverage_floor: 0.30,
            max_coverage_floor: 0.95,
            min_secret_value_len: 8,
        }
    }
}

/// Normalized generation configuration. Callers validate once via
/// `validate`; the engine consumes the already-validated form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplanationConfig {
    pub max_children_per_parent: usize,
    /// Target complexity for synthesized parents, in [1, 5].
    pub complexity_level: f32,
    /// Inclusive band half-width around the target, in [0, 3].
    pub complexity_band_width: f32,
    /// Maximum new terms a parent may introduce (ignored in strict mode,
    /// where the budget is zero).
    pub term_introduction_budget: usize,
    pub audience_level: AudienceLevel,
    pub proof_detail_mode: ProofDetailMode,
    pub entailment_mode: EntailmentMode,
    pub model: ModelSettings,
    pub thresholds: CriticThresholds,
}

impl Default for ExplanationConfig {
    fn default() -> Self {
        Self {
            max_children_per_parent: 4,
            complexity_level: 3.0,
            complexity_band_width: 1.0,
            term_introduction_budget: 3,
            audience_level: AudienceLevel::Intermediate,
            proof_detail_mode: ProofDetailMode::Standard,
            entailment_mode: EntailmentMode::Calibrated,
            model: ModelSettings::default(),
            thresholds: CriticThresholds::default(),
        }
    }
}

impl ExplanationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_children_per_parent < 2 {
            return Err(ProofGraphError::InvalidInput(format!(
                "max_children_per_parent must be >= 2, got {}",
                self.max_children_per_parent
            )));
        }
        if !(1.0..=5.0).contains(&self.complexity_level) {
            return Err(ProofGraphError::InvalidInput(format!(
                "complexity_level must be in [1, 5], got {}",
                self.complexity_level
            )));
        }
        if !(0.0..=3.0).contains(&self.complexity_band_width) {
            return Err(ProofGraphError::InvalidInput(format!(
                "complexity_band_width must be in [0, 3], got {}",
                self.complexity_band_width
            )));
        }
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(ProofGraphError::InvalidInput(format!(
                "temperature must be in [0, 2], got {}",
                self.model.temperature
            )));
        }
        Ok(())
    }

    /// Effective number of new terms a parent may introduce.
    pub fn effective_term_budget(&self) -> usize {
        match self.entailment_mode {
            EntailmentMode::Strict => 0,
            EntailmentMode::Calibrated => self.term_introduction_budget,
        }
    }

    /// The complexity band a parent's score must fall within, clipped to
    /// the [1, 5] scale.
    pub fn complexity_band(&self) -> (f32, f32) {
        let lo = (self.complexity_level - self.complexity_band_width).max(1.0);
        let hi = (self.complexity_level + self.complexity_band_width).min(5.0);
        (lo, hi)
    }

    /// Fraction of a parent statement's content tokens that must trace back
    /// to child vocabulary or declared new terms. Varies by entailment
    /// mode, audience, and proof-detail mode.
    pub fn coverage_floor(&self) -> f32 {
        let t = &self.thresholds;
        let mut floor = match self.entailment_mode {
            EntailmentMode::Calibrated => t.calibrated_coverage_floor,
            EntailmentMode::Strict => t.strict_coverage_floor,
        };
        floor += match self.audience_level {
            AudienceLevel::Beginner => -t.audience_adjustment,
            AudienceLevel::Intermediate => 0.0,
            AudienceLevel::Expert => t.audience_adjustment,
        };
        floor += match self.proof_detail_mode {
            ProofDetailMode::Sketch => -t.proof_detail_adjustment,
            ProofDetailMode::Standard => 0.0,
            ProofDetailMode::Detailed => t.proof_detail_adjustment,
        };
        floor.clamp(t.min_coverage_floor, t.max_coverage_floor)
    }

    /// SHA-256 over the canonical JSON form, tying a generated tree to the
    /// exact configuration that produced it.
    pub fn config_hash(&self) -> Result<String> {
        let canonical = serde_json::to_vec(self)?;
        Ok(sha256_hex(&canonical))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ExplanationConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_single_child_parents() {
        let config = ExplanationConfig {
            max_children_per_parent: 1,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ProofGraphError::InvalidInput(_))
        ));
    }

    #[test]
    fn complexity_band_is_clipped_to_scale() {
        let config = ExplanationConfig {
            complexity_level: 5.0,
            complexity_band_width: 2.0,
            ..Default::default()
        };
        assert_eq!(config.complexity_band(), (3.0, 5.0));
    }

    #[test]
    fn strict_mode_zeroes_term_budget() {
        let config = ExplanationConfig {
            entailment_mode: EntailmentMode::Strict,
            term_introduction_budget: 5,
            ..Default::default()
        };
        assert_eq!(config.effective_term_budget(), 0);
    }

    #[test]
    fn coverage_floor_tracks_mode_and_audience() {
        let calibrated = ExplanationConfig::default();
        let strict = ExplanationConfig {
            entailment_mode: EntailmentMode::Strict,
            ..Default::default()
        };
        assert!(strict.coverage_floor() > calibrated.coverage_floor());

        let beginner = ExplanationConfig {
            audience_level: AudienceLevel::Beginner,
            ..Default::default()
        };
        assert!(beginner.coverage_floor() < calibrated.coverage_floor());
    }

    #[test]
    fn config_hash_is_stable_and_sensitive() {
        let a = ExplanationConfig::default();
        let b = ExplanationConfig::default();
        assert_eq!(a.config_hash().unwrap(), b.config_hash().unwrap());

        let c = ExplanationConfig {
            complexity_level: 4.0,
            ..Default::default()
        };
        assert_ne!(a.config_hash().unwrap(), c.config_hash().unwrap());
    }
}
