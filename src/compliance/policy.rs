use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{EngineError, EngineResult};

/// Third-party assurance obtained on the inventory, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VerificationLevel {
    #[default]
    Unverified,
    InternalReview,
    LimitedAssurance,
    ReasonableAssurance,
}

impl VerificationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationLevel::Unverified => "unverified",
            VerificationLevel::InternalReview => "internal_review",
            VerificationLevel::LimitedAssurance => "limited_assurance",
            VerificationLevel::ReasonableAssurance => "reasonable_assurance",
        }
    }
}

impl fmt::Display for VerificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerificationLevel {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "unverified" | "none" => Ok(VerificationLevel::Unverified),
            "internal_review" | "internal" => Ok(VerificationLevel::InternalReview),
            "limited_assurance" | "limited" => Ok(VerificationLevel::LimitedAssurance),
            "reasonable_assurance" | "reasonable" => Ok(VerificationLevel::ReasonableAssurance),
            other => Err(EngineError::Config(format!("unknown verification level '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => f.write_str("low"),
            RiskLevel::Medium => f.write_str("medium"),
            RiskLevel::High => f.write_str("high"),
        }
    }
}

/// Penalty applied once the relative expanded uncertainty exceeds `above_percent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncertaintyBand {
    pub above_percent: f64,
    pub points: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationPenalties {
    pub unverified: f64,
    pub internal_review: f64,
    pub limited_assurance: f64,
    pub reasonable_assurance: f64,
}

impl Default for VerificationPenalties {
    fn default() -> Self {
        Self {
            unverified: 20.0,
            internal_review: 10.0,
            limited_assurance: 5.0,
            reasonable_assurance: 0.0,
        }
    }
}

impl VerificationPenalties {
    pub fn for_level(&self, level: VerificationLevel) -> f64 {
        match level {
            VerificationLevel::Unverified => self.unverified,
            VerificationLevel::InternalReview => self.internal_review,
            VerificationLevel::LimitedAssurance => self.limited_assurance,
            VerificationLevel::ReasonableAssurance => self.reasonable_assurance,
        }
    }
}

/// Scoring policy. Thresholds and weights are configuration, never caller constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompliancePolicy {
    /// Score at or above which risk is low.
    pub low_risk_threshold: f64,
    /// Score at or above which risk is medium.
    pub medium_risk_threshold: f64,
    pub primary_coverage_target_percent: f64,
    /// Points lost when primary coverage is zero; scaled linearly up to the target.
    pub coverage_weight: f64,
    pub uncertainty_bands: Vec<UncertaintyBand>,
    pub verification: VerificationPenalties,
    pub fallback_penalty: f64,
    pub fallback_cap: f64,
    pub failure_penalty: f64,
    pub failure_cap: f64,
}

impl Default for CompliancePolicy {
    fn default() -> Self {
        Self {
            low_risk_threshold: 80.0,
            medium_risk_threshold: 50.0,
            primary_coverage_target_percent: 80.0,
            coverage_weight: 30.0,
            uncertainty_bands: vec![
                UncertaintyBand { above_percent: 10.0, points: 10.0 },
                UncertaintyBand { above_percent: 20.0, points: 20.0 },
                UncertaintyBand { above_percent: 30.0, points: 30.0 },
            ],
            verification: VerificationPenalties::default(),
            fallback_penalty: 5.0,
            fallback_cap: 15.0,
            failure_penalty: 5.0,
            failure_cap: 20.0,
        }
    }
}

impl CompliancePolicy {
    pub fn risk_level(&self, score: f64) -> RiskLevel {
        if score >= self.low_risk_threshold {
            RiskLevel::Low
        } else if score >= self.medium_risk_threshold {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }

    /// Points of the highest band the relative uncertainty exceeds.
    pub fn uncertainty_penalty(&self, relative_percent: f64) -> f64 {
        self.uncertainty_bands
            .iter()
            .filter(|b| relative_percent > b.above_percent)
            .map(|b| b.points)
            .fold(0.0, f64::max)
    }

    pub fn validate(&self) -> EngineResult<()> {
        let in_range = |v: f64| v.is_finite() && (0.0..=100.0).contains(&v);

        if !in_range(self.low_risk_threshold) || !in_range(self.medium_risk_threshold) {
            return Err(EngineError::Config("risk thresholds must lie in [0, 100]".into()));
        }
        if self.medium_risk_threshold > self.low_risk_threshold {
            return Err(EngineError::Config(format!(
                "medium risk threshold {} exceeds low risk threshold {}",
                self.medium_risk_threshold, self.low_risk_threshold
            )));
        }
        if !(self.primary_coverage_target_percent > 0.0 && self.primary_coverage_target_percent <= 100.0) {
            return Err(EngineError::Config(
                "primary_coverage_target_percent must lie in (0, 100]".into(),
            ));
        }

        let v = &self.verification;
        let weights = [
            ("coverage_weight", self.coverage_weight),
            ("fallback_penalty", self.fallback_penalty),
            ("fallback_cap", self.fallback_cap),
            ("failure_penalty", self.failure_penalty),
            ("failure_cap", self.failure_cap),
            ("verification.unverified", v.unverified),
            ("verification.internal_review", v.internal_review),
            ("verification.limited_assurance", v.limited_assurance),
            ("verification.reasonable_assurance", v.reasonable_assurance),
        ];
        for (name, w) in weights {
            if !in_range(w) {
                return Err(EngineError::Config(format!("{name} must lie in [0, 100], got {w}")));
            }
        }

        for band in &self.uncertainty_bands {
            if !band.above_percent.is_finite() || band.above_percent < 0.0 || !in_range(band.points) {
                return Err(EngineError::Config(format!(
                    "invalid uncertainty band above {}% -> {} points",
                    band.above_percent, band.points
                )));
            }
        }
        Ok(())
    }
}
