//! Uncertainty Propagation
//!
//! GUM law of propagation for a pure summation model (all sensitivity
//! coefficients equal 1): contributions combine in quadrature, expanded
//! uncertainty is `k × u_c`, and effective degrees of freedom follow
//! Welch–Satterthwaite (GUM §G.4.1).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::calculator::CalculationResult;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::factors::MethodUsed;

/// One independent input to a combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub component: String,
    /// Emissions in kgCO2e.
    pub value: f64,
    /// 1σ absolute uncertainty in kgCO2e.
    pub standard_uncertainty: f64,
    pub dof: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<MethodUsed>,
}

impl Contribution {
    pub fn new(component: impl Into<String>, value: f64, standard_uncertainty: f64, dof: f64) -> Self {
        Self {
            component: component.into(),
            value,
            standard_uncertainty,
            dof,
            method: None,
        }
    }

    /// `u_i = E_i × (r_i / 100) / k_in`.
    pub fn from_result(result: &CalculationResult, input_coverage_factor: f64) -> Self {
        Self {
            component: result.record_id.clone(),
            value: result.emissions_kg,
            standard_uncertainty: result.standard_uncertainty(input_coverage_factor),
            dof: result.degrees_of_freedom,
            method: Some(result.method_used),
        }
    }

    /// A combined total reused as a single contribution one level up.
    pub fn from_combined(component: impl Into<String>, combined: &CombinedUncertainty) -> Self {
        Self::new(
            component,
            combined.total,
            combined.standard_uncertainty,
            combined.effective_degrees_of_freedom,
        )
    }

    fn variance(&self) -> f64 {
        self.standard_uncertainty * self.standard_uncertainty
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedUncertainty {
    pub total: f64,
    pub standard_uncertainty: f64,
    pub expanded_uncertainty: f64,
    pub effective_degrees_of_freedom: f64,
    pub coverage_factor: f64,
    /// `U / total × 100`; 0 when the total is 0.
    pub relative_expanded_uncertainty_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncertaintyBudgetEntry {
    pub component: String,
    /// Share of the combined variance.
    pub contribution_percent: f64,
    pub standard_uncertainty_kg: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub improvement_potential: Option<String>,
}

/// A named group of contributions for budget reporting.
#[derive(Debug, Clone, Default)]
pub struct BudgetGroup {
    pub name: String,
    pub contributions: Vec<Contribution>,
}

impl BudgetGroup {
    pub fn new(name: impl Into<String>, contributions: Vec<Contribution>) -> Self {
        Self {
            name: name.into(),
            contributions,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UncertaintyEngine {
    coverage_factor: f64,
    zero_uncertainty_dof: f64,
}

impl UncertaintyEngine {
    pub fn new(coverage_factor: f64, zero_uncertainty_dof: f64) -> Self {
        Self {
            coverage_factor,
            zero_uncertainty_dof,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.coverage_factor, config.zero_uncertainty_dof)
    }

    fn check(contribution: &Contribution) -> EngineResult<()> {
        let invalid = |reason: String| EngineError::InvalidContribution {
            component: contribution.component.clone(),
            reason,
        };

        if !contribution.value.is_finite() || contribution.value < 0.0 {
            return Err(invalid(format!("value {} must be finite and >= 0", contribution.value)));
        }
        if !contribution.standard_uncertainty.is_finite() || contribution.standard_uncertainty < 0.0 {
            return Err(invalid(format!(
                "standard uncertainty {} must be finite and >= 0",
                contribution.standard_uncertainty
            )));
        }
        // Zero-variance inputs never enter the Welch–Satterthwaite sum, so their dof is irrelevant.
        if contribution.standard_uncertainty > 0.0 && (contribution.dof.is_nan() || contribution.dof <= 0.0) {
            return Err(invalid(format!("degrees of freedom {} must be > 0", contribution.dof)));
        }
        Ok(())
    }

    pub fn combine(&self, contributions: &[Contribution]) -> EngineResult<CombinedUncertainty> {
        let mut total = 0.0;
        let mut variance = 0.0;
        let mut ws_denominator = 0.0;

        for c in contributions {
            Self::check(c)?;
            total += c.value;
            let v = c.variance();
            variance += v;
            if v > 0.0 {
                ws_denominator += v * v / c.dof;
            }
        }

        let standard_uncertainty = variance.sqrt();
        let effective_degrees_of_freedom = if variance > 0.0 && ws_denominator > 0.0 {
            variance * variance / ws_denominator
        } else {
            self.zero_uncertainty_dof
        };
        let expanded_uncertainty = self.coverage_factor * standard_uncertainty;
        let relative_expanded_uncertainty_percent = if total > 0.0 {
            expanded_uncertainty / total * 100.0
        } else {
            0.0
        };

        Ok(CombinedUncertainty {
            total,
            standard_uncertainty,
            expanded_uncertainty,
            effective_degrees_of_freedom,
            coverage_factor: self.coverage_factor,
            relative_expanded_uncertainty_percent,
        })
    }

    /// Variance share of each group, descending; zero-variance groups are
    /// left out and an all-zero input yields an empty budget. The first
    /// `annotate_top` entries carry an improvement hint.
    pub fn budget(&self, groups: &[BudgetGroup], annotate_top: usize) -> EngineResult<Vec<UncertaintyBudgetEntry>> {
        let mut variances = Vec::with_capacity(groups.len());
        for group in groups {
            let mut v = 0.0;
            for c in &group.contributions {
                Self::check(c)?;
                v += c.variance();
            }
            variances.push((group, v));
        }

        let total_variance: f64 = variances.iter().map(|(_, v)| v).sum();
        if total_variance <= 0.0 {
            return Ok(Vec::new());
        }

        let mut ranked: Vec<_> = variances.into_iter().filter(|(_, v)| *v > 0.0).collect();
        ranked.sort_by(|(ga, va), (gb, vb)| vb.total_cmp(va).then_with(|| ga.name.cmp(&gb.name)));

        Ok(ranked
            .into_iter()
            .enumerate()
            .map(|(position, (group, v))| UncertaintyBudgetEntry {
                component: group.name.clone(),
                contribution_percent: v / total_variance * 100.0,
                standard_uncertainty_kg: v.sqrt(),
                improvement_potential: (position < annotate_top).then(|| improvement_hint(group)),
            })
            .collect())
    }
}

/// Hint keyed on the provenance carrying most of a group's variance.
fn improvement_hint(group: &BudgetGroup) -> String {
    let mut by_method: HashMap<Option<MethodUsed>, f64> = HashMap::new();
    for c in &group.contributions {
        *by_method.entry(c.method).or_default() += c.variance();
    }

    let dominant = by_method
        .into_iter()
        .max_by(|(ma, va), (mb, vb)| va.total_cmp(vb).then_with(|| provenance_rank(*mb).cmp(&provenance_rank(*ma))))
        .and_then(|(m, _)| m);

    match dominant {
        Some(MethodUsed::Default) => {
            "replace category fallback factors with subcategory-specific factors".to_string()
        }
        Some(MethodUsed::Monetary) => "switch from monetary to actual data".to_string(),
        Some(MethodUsed::Technical) => {
            "replace engineering estimates with measured or invoiced quantities".to_string()
        }
        Some(MethodUsed::Actual) => {
            "request supplier-specific factors to tighten factor uncertainty".to_string()
        }
        None => format!("break '{}' down to item level to locate dominant sources", group.name),
    }
}

// Deterministic tie-break between equal variances: coarser provenance wins.
fn provenance_rank(method: Option<MethodUsed>) -> u8 {
    match method {
        Some(MethodUsed::Default) => 0,
        Some(MethodUsed::Monetary) => 1,
        Some(MethodUsed::Technical) => 2,
        Some(MethodUsed::Actual) => 3,
        None => 4,
    }
}
