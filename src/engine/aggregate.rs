use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use super::audit::{AuditStage, AuditTrail};
use super::calculator::{CalculationResult, RecordFailure};
use super::uncertainty::{
    BudgetGroup, CombinedUncertainty, Contribution, UncertaintyBudgetEntry, UncertaintyEngine,
};
use crate::error::EngineResult;
use crate::factors::{Direction, Scope};

/// Reporting group; Scope 3 is split by category direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeGroup {
    Scope1,
    Scope2,
    Scope3Upstream,
    Scope3Downstream,
}

impl ScopeGroup {
    pub const ALL: [ScopeGroup; 4] = [
        ScopeGroup::Scope1,
        ScopeGroup::Scope2,
        ScopeGroup::Scope3Upstream,
        ScopeGroup::Scope3Downstream,
    ];

    pub fn of(scope: Scope, direction: Direction) -> Self {
        match (scope, direction) {
            (Scope::Scope1, _) => ScopeGroup::Scope1,
            (Scope::Scope2, _) => ScopeGroup::Scope2,
            (Scope::Scope3, Direction::Downstream) => ScopeGroup::Scope3Downstream,
            (Scope::Scope3, _) => ScopeGroup::Scope3Upstream,
        }
    }

    pub fn scope(&self) -> Scope {
        match self {
            ScopeGroup::Scope1 => Scope::Scope1,
            ScopeGroup::Scope2 => Scope::Scope2,
            ScopeGroup::Scope3Upstream | ScopeGroup::Scope3Downstream => Scope::Scope3,
        }
    }
}

impl fmt::Display for ScopeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeGroup::Scope1 => f.write_str("Scope 1"),
            ScopeGroup::Scope2 => f.write_str("Scope 2"),
            ScopeGroup::Scope3Upstream => f.write_str("Scope 3 upstream"),
            ScopeGroup::Scope3Downstream => f.write_str("Scope 3 downstream"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeSummary {
    /// kgCO2e.
    pub total: f64,
    pub standard_uncertainty: f64,
    pub expanded_uncertainty: f64,
    pub effective_degrees_of_freedom: f64,
    pub coverage_factor: f64,
    pub relative_expanded_uncertainty_percent: f64,
    pub item_count: usize,
    pub failed_count: usize,
    /// Set when a record belonging here failed; the total under-reports.
    pub incomplete: bool,
}

impl ScopeSummary {
    fn new(combined: CombinedUncertainty, item_count: usize, failed_count: usize) -> Self {
        Self {
            total: combined.total,
            standard_uncertainty: combined.standard_uncertainty,
            expanded_uncertainty: combined.expanded_uncertainty,
            effective_degrees_of_freedom: combined.effective_degrees_of_freedom,
            coverage_factor: combined.coverage_factor,
            relative_expanded_uncertainty_percent: combined.relative_expanded_uncertainty_percent,
            item_count,
            failed_count,
            incomplete: failed_count > 0,
        }
    }

    fn as_contribution(&self, component: impl Into<String>) -> Contribution {
        Contribution::new(
            component,
            self.total,
            self.standard_uncertainty,
            self.effective_degrees_of_freedom,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub scope1: ScopeSummary,
    pub scope2: ScopeSummary,
    pub scope3_upstream: ScopeSummary,
    pub scope3_downstream: ScopeSummary,
    /// Upstream and downstream combined.
    pub scope3: ScopeSummary,
    pub grand_total: ScopeSummary,
    /// Variance shares of Scope 1, 2 and 3.
    pub uncertainty_budget: Vec<UncertaintyBudgetEntry>,
    /// Variance shares per category id.
    pub category_budget: Vec<UncertaintyBudgetEntry>,
}

impl Aggregate {
    pub fn is_complete(&self) -> bool {
        !self.grand_total.incomplete
    }
}

/// Sums results per scope group and propagates their uncertainties.
pub struct ScopeAggregator<'a> {
    engine: &'a UncertaintyEngine,
    input_coverage_factor: f64,
    budget_top_contributors: usize,
}

impl<'a> ScopeAggregator<'a> {
    pub fn new(engine: &'a UncertaintyEngine, input_coverage_factor: f64, budget_top_contributors: usize) -> Self {
        Self {
            engine,
            input_coverage_factor,
            budget_top_contributors,
        }
    }

    pub fn aggregate(
        &self,
        results: &[CalculationResult],
        failures: &[RecordFailure],
        trail: &mut AuditTrail,
    ) -> EngineResult<Aggregate> {
        let mut groups: BTreeMap<ScopeGroup, Vec<Contribution>> =
            ScopeGroup::ALL.iter().map(|g| (*g, Vec::new())).collect();
        let mut by_category: BTreeMap<&str, Vec<Contribution>> = BTreeMap::new();

        for result in results {
            let contribution = Contribution::from_result(result, self.input_coverage_factor);
            by_category
                .entry(result.category_id.as_str())
                .or_default()
                .push(contribution.clone());
            groups
                .entry(ScopeGroup::of(result.scope, result.direction))
                .or_default()
                .push(contribution);
        }

        let failed = |group: ScopeGroup| {
            failures
                .iter()
                .filter(|f| match f.direction {
                    Some(direction) => ScopeGroup::of(f.scope, direction) == group,
                    // Unknown category: charge every group of the declared scope.
                    None => f.scope == group.scope(),
                })
                .count()
        };

        let mut summaries = BTreeMap::new();
        for (group, contributions) in &groups {
            let combined = self.engine.combine(contributions)?;
            let summary = ScopeSummary::new(combined, contributions.len(), failed(*group));
            self.audit_group(trail, &group.to_string(), &summary);
            summaries.insert(*group, summary);
        }

        let scope3_items: Vec<Contribution> = [ScopeGroup::Scope3Upstream, ScopeGroup::Scope3Downstream]
            .iter()
            .flat_map(|g| groups[g].iter().cloned())
            .collect();
        let scope3_failed = failures.iter().filter(|f| f.scope == Scope::Scope3).count();
        let scope3 = ScopeSummary::new(self.engine.combine(&scope3_items)?, scope3_items.len(), scope3_failed);
        self.audit_group(trail, "Scope 3", &scope3);

        let scope1 = summaries[&ScopeGroup::Scope1].clone();
        let scope2 = summaries[&ScopeGroup::Scope2].clone();

        // The grand total combines the three scope totals as independent inputs.
        let grand = self.engine.combine(&[
            scope1.as_contribution("Scope 1"),
            scope2.as_contribution("Scope 2"),
            scope3.as_contribution("Scope 3"),
        ])?;
        let grand_total = ScopeSummary::new(grand, results.len(), failures.len());
        trail
            .record(AuditStage::Aggregation, "Grand total", "sum of Scope 1, 2 and 3 totals")
            .with_formula("E = E₁ + E₂ + E₃; u_c = √(u₁² + u₂² + u₃²); U = k·u_c")
            .with_value("total_kg", grand_total.total)
            .with_value("standard_uncertainty_kg", grand_total.standard_uncertainty)
            .with_value("expanded_uncertainty_kg", grand_total.expanded_uncertainty)
            .with_value("effective_dof", grand_total.effective_degrees_of_freedom)
            .with_value("relative_expanded_uncertainty_percent", grand_total.relative_expanded_uncertainty_percent);

        let uncertainty_budget = self.engine.budget(
            &[
                BudgetGroup::new("Scope 1", groups[&ScopeGroup::Scope1].clone()),
                BudgetGroup::new("Scope 2", groups[&ScopeGroup::Scope2].clone()),
                BudgetGroup::new("Scope 3", scope3_items),
            ],
            self.budget_top_contributors,
        )?;
        let category_groups: Vec<BudgetGroup> = by_category
            .into_iter()
            .map(|(id, contributions)| BudgetGroup::new(id, contributions))
            .collect();
        let category_budget = self.engine.budget(&category_groups, self.budget_top_contributors)?;

        for entry in &uncertainty_budget {
            let step = trail
                .record(
                    AuditStage::Budget,
                    entry.component.clone(),
                    "share of combined variance",
                )
                .with_formula("p_g = Σ_{i∈g} u_i² / u_c² × 100")
                .with_value("contribution_percent", entry.contribution_percent);
            if let Some(hint) = &entry.improvement_potential {
                step.description = format!("share of combined variance; {hint}");
            }
        }

        debug!(
            "Aggregated {} results ({} failed): {:.3} kgCO2e ± {:.3} (k={})",
            results.len(),
            failures.len(),
            grand_total.total,
            grand_total.expanded_uncertainty,
            grand_total.coverage_factor
        );

        Ok(Aggregate {
            scope1,
            scope2,
            scope3_upstream: summaries[&ScopeGroup::Scope3Upstream].clone(),
            scope3_downstream: summaries[&ScopeGroup::Scope3Downstream].clone(),
            scope3,
            grand_total,
            uncertainty_budget,
            category_budget,
        })
    }

    fn audit_group(&self, trail: &mut AuditTrail, subject: &str, summary: &ScopeSummary) {
        let description = if summary.incomplete {
            format!(
                "sum of {} items, incomplete: {} record(s) failed",
                summary.item_count, summary.failed_count
            )
        } else {
            format!("sum of {} items", summary.item_count)
        };
        trail
            .record(AuditStage::Aggregation, subject, description)
            .with_formula("E = Σ E_i; u_c = √Σ u_i²; U = k·u_c; ν_eff = u_c⁴ / Σ(u_i⁴/ν_i)")
            .with_value("total_kg", summary.total)
            .with_value("standard_uncertainty_kg", summary.standard_uncertainty)
            .with_value("expanded_uncertainty_kg", summary.expanded_uncertainty)
            .with_value("effective_dof", summary.effective_degrees_of_freedom)
            .with_value("coverage_factor", summary.coverage_factor);
    }
}
