use serde::{Deserialize, Serialize};

use super::policy::VerificationLevel;
use super::{Penalty, PenaltyKind};
use crate::engine::aggregate::Aggregate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn for_points(points: f64) -> Self {
        if points >= 15.0 {
            Priority::High
        } else if points >= 7.0 {
            Priority::Medium
        } else {
            Priority::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostBucket {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeline {
    Weeks,
    Months,
    Quarters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub kind: PenaltyKind,
    pub title: String,
    pub action: String,
    pub priority: Priority,
    /// Score points recovered once the penalty no longer fires.
    pub potential_improvement: f64,
    pub cost: CostBucket,
    pub timeline: Timeline,
}

/// One recommendation per fired penalty, best payoff first.
pub fn recommend(
    penalties: &[Penalty],
    aggregate: &Aggregate,
    verification: VerificationLevel,
) -> Vec<Recommendation> {
    let mut recommendations: Vec<Recommendation> = penalties
        .iter()
        .filter(|p| p.points > 0.0)
        .map(|p| build(p, aggregate, verification))
        .collect();

    recommendations.sort_by(|a, b| {
        b.potential_improvement
            .total_cmp(&a.potential_improvement)
            .then_with(|| b.priority.cmp(&a.priority))
            .then_with(|| a.kind.cmp(&b.kind))
    });
    recommendations
}

fn build(penalty: &Penalty, aggregate: &Aggregate, verification: VerificationLevel) -> Recommendation {
    let (title, action, cost, timeline) = match penalty.kind {
        PenaltyKind::PrimaryDataCoverage => (
            "Increase primary data coverage",
            "Replace spend-based and estimated quantities with invoiced or metered activity data for the largest emitters"
                .to_string(),
            CostBucket::Medium,
            Timeline::Months,
        ),
        PenaltyKind::Uncertainty => {
            let action = match aggregate.category_budget.first() {
                Some(top) => format!(
                    "Target '{}', which carries {:.1}% of the combined variance: {}",
                    top.component,
                    top.contribution_percent,
                    top.improvement_potential
                        .as_deref()
                        .unwrap_or("collect more precise activity data")
                ),
                None => "Collect more precise activity data for the dominant contributors".to_string(),
            };
            ("Reduce inventory uncertainty", action, CostBucket::Medium, Timeline::Months)
        }
        PenaltyKind::Verification => {
            let action = match verification {
                VerificationLevel::Unverified | VerificationLevel::InternalReview => {
                    "Engage an accredited verifier for a limited assurance engagement"
                }
                _ => "Upgrade the verification engagement to reasonable assurance",
            };
            ("Strengthen verification", action.to_string(), CostBucket::High, Timeline::Quarters)
        }
        PenaltyKind::FallbackFactors => (
            "Replace fallback emission factors",
            "Map the affected records to subcategories with specific emission factors".to_string(),
            CostBucket::Low,
            Timeline::Weeks,
        ),
        PenaltyKind::UnresolvedRecords => (
            "Resolve rejected activity records",
            "Correct units, categories or method overrides of the failed records and rerun the inventory"
                .to_string(),
            CostBucket::Low,
            Timeline::Weeks,
        ),
    };

    Recommendation {
        kind: penalty.kind,
        title: title.to_string(),
        action,
        priority: Priority::for_points(penalty.points),
        potential_improvement: penalty.points,
        cost,
        timeline,
    }
}
