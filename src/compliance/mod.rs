//! Compliance Scoring
//!
//! Turns an aggregated inventory into a 0-100 compliance score, a regulatory
//! risk level and a ranked list of improvement recommendations. Pure per call.

pub mod policy;
pub mod recommendations;

pub use policy::{CompliancePolicy, RiskLevel, UncertaintyBand, VerificationLevel, VerificationPenalties};
pub use recommendations::{CostBucket, Priority, Recommendation, Timeline};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::aggregate::Aggregate;
use crate::engine::calculator::CalculationResult;
use crate::factors::MethodUsed;

/// Data-quality indicators the score is derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQuality {
    /// Share of emissions computed with the `actual` method.
    pub primary_data_coverage_percent: f64,
    /// Relative expanded uncertainty of the grand total.
    pub relative_uncertainty_percent: f64,
    pub verification_level: VerificationLevel,
    pub fallback_count: usize,
    pub failed_count: usize,
}

impl DataQuality {
    pub fn assess(results: &[CalculationResult], aggregate: &Aggregate, verification_level: VerificationLevel) -> Self {
        let total = aggregate.grand_total.total;
        let primary: f64 = results
            .iter()
            .filter(|r| r.method_used == MethodUsed::Actual)
            .map(|r| r.emissions_kg)
            .sum();

        Self {
            primary_data_coverage_percent: if total > 0.0 { primary / total * 100.0 } else { 0.0 },
            relative_uncertainty_percent: aggregate.grand_total.relative_expanded_uncertainty_percent,
            verification_level,
            fallback_count: results.iter().filter(|r| r.fallback_used()).count(),
            failed_count: aggregate.grand_total.failed_count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PenaltyKind {
    PrimaryDataCoverage,
    Uncertainty,
    Verification,
    FallbackFactors,
    UnresolvedRecords,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Penalty {
    pub kind: PenaltyKind,
    pub points: f64,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceAssessment {
    pub compliance_score: f64,
    pub regulatory_risk_level: RiskLevel,
    /// Penalties that fired, in evaluation order.
    pub penalties: Vec<Penalty>,
    pub recommendations: Vec<Recommendation>,
}

pub struct ComplianceScorer<'a> {
    policy: &'a CompliancePolicy,
}

impl<'a> ComplianceScorer<'a> {
    pub fn new(policy: &'a CompliancePolicy) -> Self {
        Self { policy }
    }

    pub fn penalties(&self, quality: &DataQuality) -> Vec<Penalty> {
        let policy = self.policy;
        let mut penalties = Vec::new();

        let target = policy.primary_coverage_target_percent;
        let coverage = quality.primary_data_coverage_percent.clamp(0.0, 100.0);
        if coverage < target {
            penalties.push(Penalty {
                kind: PenaltyKind::PrimaryDataCoverage,
                points: (target - coverage) / target * policy.coverage_weight,
                detail: format!("primary data covers {coverage:.1}% of emissions, target {target:.0}%"),
            });
        }

        let band = policy.uncertainty_penalty(quality.relative_uncertainty_percent);
        if band > 0.0 {
            penalties.push(Penalty {
                kind: PenaltyKind::Uncertainty,
                points: band,
                detail: format!(
                    "relative expanded uncertainty ±{:.1}% (k=2)",
                    quality.relative_uncertainty_percent
                ),
            });
        }

        let verification = policy.verification.for_level(quality.verification_level);
        if verification > 0.0 {
            penalties.push(Penalty {
                kind: PenaltyKind::Verification,
                points: verification,
                detail: format!("verification status: {}", quality.verification_level),
            });
        }

        if quality.fallback_count > 0 {
            penalties.push(Penalty {
                kind: PenaltyKind::FallbackFactors,
                points: (quality.fallback_count as f64 * policy.fallback_penalty).min(policy.fallback_cap),
                detail: format!("{} record(s) use a category fallback factor", quality.fallback_count),
            });
        }

        if quality.failed_count > 0 {
            penalties.push(Penalty {
                kind: PenaltyKind::UnresolvedRecords,
                points: (quality.failed_count as f64 * policy.failure_penalty).min(policy.failure_cap),
                detail: format!("{} record(s) could not be calculated", quality.failed_count),
            });
        }

        penalties.retain(|p| p.points > 0.0);
        penalties
    }

    pub fn score(&self, aggregate: &Aggregate, quality: &DataQuality) -> ComplianceAssessment {
        let penalties = self.penalties(quality);
        let deducted: f64 = penalties.iter().map(|p| p.points).sum();
        let compliance_score = (100.0 - deducted).clamp(0.0, 100.0);
        let regulatory_risk_level = self.policy.risk_level(compliance_score);
        let recommendations = recommendations::recommend(&penalties, aggregate, quality.verification_level);

        info!(
            "Compliance score {:.1} ({} risk), {} penalties",
            compliance_score,
            regulatory_risk_level,
            penalties.len()
        );

        ComplianceAssessment {
            compliance_score,
            regulatory_risk_level,
            penalties,
            recommendations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::aggregate::ScopeSummary;

    fn summary(total: f64, rel: f64, failed: usize) -> ScopeSummary {
        ScopeSummary {
            total,
            standard_uncertainty: total * rel / 200.0,
            expanded_uncertainty: total * rel / 100.0,
            effective_degrees_of_freedom: 30.0,
            coverage_factor: 2.0,
            relative_expanded_uncertainty_percent: rel,
            item_count: 1,
            failed_count: failed,
            incomplete: failed > 0,
        }
    }

    fn aggregate() -> Aggregate {
        let s = summary(100.0, 5.0, 0);
        Aggregate {
            scope1: s.clone(),
            scope2: s.clone(),
            scope3_upstream: s.clone(),
            scope3_downstream: s.clone(),
            scope3: s.clone(),
            grand_total: s,
            uncertainty_budget: vec![],
            category_budget: vec![],
        }
    }

    fn quality(coverage: f64, rel: f64, level: VerificationLevel, fallbacks: usize, failed: usize) -> DataQuality {
        DataQuality {
            primary_data_coverage_percent: coverage,
            relative_uncertainty_percent: rel,
            verification_level: level,
            fallback_count: fallbacks,
            failed_count: failed,
        }
    }

    #[test]
    fn test_perfect_inventory_scores_100() {
        let policy = CompliancePolicy::default();
        let scorer = ComplianceScorer::new(&policy);
        let result = scorer.score(
            &aggregate(),
            &quality(100.0, 5.0, VerificationLevel::ReasonableAssurance, 0, 0),
        );
        assert_eq!(result.compliance_score, 100.0);
        assert_eq!(result.regulatory_risk_level, RiskLevel::Low);
        assert!(result.penalties.is_empty());
        assert!(result.recommendations.is_empty());
    }

    #[test]
    fn test_penalties_accumulate() {
        let policy = CompliancePolicy::default();
        let scorer = ComplianceScorer::new(&policy);
        // coverage 40% -> 15, uncertainty 12% -> 10, unverified -> 20, 1 fallback -> 5
        let result = scorer.score(&aggregate(), &quality(40.0, 12.0, VerificationLevel::Unverified, 1, 0));
        assert!((result.compliance_score - 50.0).abs() < 1e-9);
        assert_eq!(result.regulatory_risk_level, RiskLevel::Medium);
        assert_eq!(result.penalties.len(), 4);
    }

    #[test]
    fn test_score_clamped_at_zero() {
        let policy = CompliancePolicy::default();
        let scorer = ComplianceScorer::new(&policy);
        let result = scorer.score(&aggregate(), &quality(0.0, 90.0, VerificationLevel::Unverified, 10, 10));
        assert_eq!(result.compliance_score, 0.0);
        assert_eq!(result.regulatory_risk_level, RiskLevel::High);
    }

    #[test]
    fn test_caps_apply() {
        let policy = CompliancePolicy::default();
        let scorer = ComplianceScorer::new(&policy);
        let penalties = scorer.penalties(&quality(100.0, 0.0, VerificationLevel::ReasonableAssurance, 9, 9));
        let fallback = penalties.iter().find(|p| p.kind == PenaltyKind::FallbackFactors).unwrap();
        let failed = penalties.iter().find(|p| p.kind == PenaltyKind::UnresolvedRecords).unwrap();
        assert_eq!(fallback.points, 15.0);
        assert_eq!(failed.points, 20.0);
    }

    #[test]
    fn test_recommendations_ranked_by_potential() {
        let policy = CompliancePolicy::default();
        let scorer = ComplianceScorer::new(&policy);
        let result = scorer.score(&aggregate(), &quality(40.0, 12.0, VerificationLevel::Unverified, 1, 0));

        let kinds: Vec<_> = result.recommendations.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                PenaltyKind::Verification,
                PenaltyKind::PrimaryDataCoverage,
                PenaltyKind::Uncertainty,
                PenaltyKind::FallbackFactors,
            ]
        );
        assert_eq!(result.recommendations[0].priority, Priority::High);
        assert_eq!(result.recommendations[2].priority, Priority::Medium);
        assert_eq!(result.recommendations[3].priority, Priority::Low);
        assert_eq!(result.recommendations[3].timeline, Timeline::Weeks);
    }

    #[test]
    fn test_thresholds_come_from_policy() {
        let policy = CompliancePolicy {
            low_risk_threshold: 95.0,
            ..CompliancePolicy::default()
        };
        let scorer = ComplianceScorer::new(&policy);
        let result = scorer.score(
            &aggregate(),
            &quality(100.0, 5.0, VerificationLevel::LimitedAssurance, 0, 0),
        );
        assert_eq!(result.compliance_score, 95.0);
        assert_eq!(result.regulatory_risk_level, RiskLevel::Low);

        let result = scorer.score(&aggregate(), &quality(100.0, 5.0, VerificationLevel::InternalReview, 0, 0));
        assert_eq!(result.regulatory_risk_level, RiskLevel::Medium);
    }
}
