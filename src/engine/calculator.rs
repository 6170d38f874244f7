use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::method::MethodResolver;
use crate::config::DofPolicy;
use crate::error::{EngineError, EngineResult, ErrorKind};
use crate::factors::{Direction, EmissionFactor, FactorRegistry, Method, MethodUsed, Scope};
use crate::units::{self, Unit};

/// One line of activity data handed over by data collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: String,
    pub quantity: f64,
    pub unit: String,
    pub category_id: String,
    pub subcategory_id: String,
    pub scope: Scope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method_override: Option<Method>,
}

impl ActivityRecord {
    pub fn new(
        id: impl Into<String>,
        quantity: f64,
        unit: impl Into<String>,
        category_id: impl Into<String>,
        subcategory_id: impl Into<String>,
        scope: Scope,
    ) -> Self {
        Self {
            id: id.into(),
            quantity,
            unit: unit.into(),
            category_id: category_id.into(),
            subcategory_id: subcategory_id.into(),
            scope,
            method_override: None,
        }
    }

    pub fn with_override(mut self, method: Method) -> Self {
        self.method_override = Some(method);
        self
    }

    /// Structural checks; negative or non-finite quantities never reach the engine.
    pub fn validate(&self) -> EngineResult<()> {
        let invalid = |reason: String| EngineError::InvalidActivity {
            record_id: self.id.clone(),
            reason,
        };

        if self.id.trim().is_empty() {
            return Err(invalid("record id must not be empty".into()));
        }
        if self.category_id.trim().is_empty() || self.subcategory_id.trim().is_empty() {
            return Err(invalid("category and subcategory ids are required".into()));
        }
        if !self.quantity.is_finite() {
            return Err(invalid(format!("quantity {} is not finite", self.quantity)));
        }
        if self.quantity < 0.0 {
            return Err(invalid(format!("quantity {} is negative", self.quantity)));
        }
        Ok(())
    }
}

/// Emissions of one activity record, computed against one registry snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationResult {
    pub record_id: String,
    pub scope: Scope,
    pub direction: Direction,
    pub category_id: String,
    pub subcategory_id: String,
    pub normalized_quantity: f64,
    pub activity_unit: Unit,
    pub emissions_kg: f64,
    /// At k=2, copied from the factor.
    pub relative_uncertainty_percent: f64,
    pub method_used: MethodUsed,
    pub factor_value: f64,
    pub factor_unit: String,
    pub factor_source: String,
    pub degrees_of_freedom: f64,
    /// Method substitutions and fallbacks worth flagging to an auditor.
    #[serde(default)]
    pub notes: Vec<String>,
}

impl CalculationResult {
    pub fn fallback_used(&self) -> bool {
        self.method_used == MethodUsed::Default
    }

    /// 1σ uncertainty in kg, given the coverage factor the factor uncertainty is stated at.
    pub fn standard_uncertainty(&self, input_coverage_factor: f64) -> f64 {
        self.emissions_kg * (self.relative_uncertainty_percent / 100.0) / input_coverage_factor
    }
}

/// A record the engine could not turn into a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordFailure {
    pub record_id: String,
    pub scope: Scope,
    /// Known when the record's category exists in the registry.
    pub direction: Option<Direction>,
    pub category_id: String,
    pub subcategory_id: String,
    pub kind: ErrorKind,
    pub reason: String,
}

/// Partial-failure outcome of a batch: results plus the records that failed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub results: Vec<CalculationResult>,
    pub failures: Vec<RecordFailure>,
}

fn fits(factor: &EmissionFactor, unit: Unit) -> bool {
    factor
        .activity_unit()
        .is_ok_and(|target| units::is_convertible(unit, target))
}

/// Pure record -> result transformation against one registry snapshot.
pub struct EmissionsCalculator<'a> {
    registry: &'a FactorRegistry,
    dof: &'a DofPolicy,
}

impl<'a> EmissionsCalculator<'a> {
    pub fn new(registry: &'a FactorRegistry, dof: &'a DofPolicy) -> Self {
        Self { registry, dof }
    }

    pub fn compute(&self, record: &ActivityRecord) -> EngineResult<CalculationResult> {
        record.validate()?;

        let category = self
            .registry
            .category(&record.category_id)
            .ok_or_else(|| EngineError::Calculation {
                record_id: record.id.clone(),
                reason: format!("unknown category '{}'", record.category_id),
            })?;

        if category.scope() != record.scope {
            return Err(EngineError::InvalidActivity {
                record_id: record.id.clone(),
                reason: format!(
                    "category '{}' belongs to {}, record declares {}",
                    category.id,
                    category.scope(),
                    record.scope
                ),
            });
        }

        let from: Unit = record.unit.parse()?;
        let mut notes = Vec::new();

        // Resolve a method and its factor; anything short of an explicit
        // override failure may still be covered by the category fallback.
        let resolved: Result<(MethodUsed, &EmissionFactor), EngineError> =
            match category.subcategory(&record.subcategory_id) {
                Some(sub) => match MethodResolver::resolve(category, sub, from, record.method_override) {
                    Ok(resolution) => {
                        notes.extend(resolution.note);
                        self.registry
                            .lookup(&category.id, &sub.id, resolution.method)
                            .map(|f| (MethodUsed::from(resolution.method), f))
                    }
                    Err(e) => Err(e),
                },
                None => match record.method_override {
                    Some(method) => Err(EngineError::MethodUnavailable {
                        category_id: category.id.clone(),
                        subcategory_id: record.subcategory_id.clone(),
                        method,
                    }),
                    None => Err(EngineError::FactorNotFound {
                        category_id: category.id.clone(),
                        subcategory_id: record.subcategory_id.clone(),
                        method: category.default_method.to_string(),
                    }),
                },
            };

        let (method_used, factor) = match resolved {
            Ok(found) => found,
            Err(e @ EngineError::MethodUnavailable { .. }) if record.method_override.is_some() => {
                return Err(e);
            }
            Err(e) => match self.registry.fallback(&category.id) {
                Some(fallback) if fits(fallback, from) => {
                    warn!(
                        "Record {} uses the fallback factor of category '{}': {}",
                        record.id, category.id, e
                    );
                    notes.push(format!("fallback factor applied: {e}"));
                    (MethodUsed::Default, fallback)
                }
                _ if e.is_unit_error() => return Err(e),
                // The fallback was the last factor left; report why it cannot take the unit.
                Some(fallback) => {
                    return Err(units::ensure_convertible(from, fallback.activity_unit()?)
                        .err()
                        .unwrap_or(e))
                }
                None => {
                    return Err(EngineError::Calculation {
                        record_id: record.id.clone(),
                        reason: e.to_string(),
                    })
                }
            },
        };

        let target = factor.activity_unit()?;
        let normalized_quantity = units::convert(record.quantity, from, target)?;

        let emissions_kg = normalized_quantity * factor.value;
        if !emissions_kg.is_finite() {
            return Err(EngineError::Calculation {
                record_id: record.id.clone(),
                reason: "emissions overflowed to a non-finite value".into(),
            });
        }

        debug!(
            "Record {}: {} {} × {} {} -> {} kgCO2e ({})",
            record.id, normalized_quantity, target, factor.value, factor.unit, emissions_kg, method_used
        );

        Ok(CalculationResult {
            record_id: record.id.clone(),
            scope: record.scope,
            direction: category.direction,
            category_id: category.id.clone(),
            subcategory_id: record.subcategory_id.clone(),
            normalized_quantity,
            activity_unit: target,
            emissions_kg,
            relative_uncertainty_percent: factor.uncertainty_percent,
            method_used,
            factor_value: factor.value,
            factor_unit: factor.unit.clone(),
            factor_source: factor.source.clone(),
            degrees_of_freedom: self.dof.for_method(method_used),
            notes,
        })
    }

    /// Compute every record in parallel; failures are collected, never fatal.
    /// Both lists keep the input order.
    pub fn compute_batch(&self, records: &[ActivityRecord]) -> BatchOutcome {
        let computed: Vec<_> = records.par_iter().map(|r| (r, self.compute(r))).collect();

        let mut outcome = BatchOutcome::default();
        for (record, result) in computed {
            match result {
                Ok(result) => outcome.results.push(result),
                Err(e) => {
                    warn!("Record {} rejected: {}", record.id, e);
                    outcome.failures.push(RecordFailure {
                        record_id: record.id.clone(),
                        scope: record.scope,
                        direction: self.registry.category(&record.category_id).map(|c| c.direction),
                        category_id: record.category_id.clone(),
                        subcategory_id: record.subcategory_id.clone(),
                        kind: e.kind(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> FactorRegistry {
        FactorRegistry::builtin().unwrap()
    }

    #[test]
    fn test_steel_actual_factor() {
        let registry = registry();
        let dof = DofPolicy::default();
        let calc = EmissionsCalculator::new(&registry, &dof);

        let record = ActivityRecord::new("r1", 1000.0, "kg", "purchased_goods", "steel", Scope::Scope3);
        let result = calc.compute(&record).unwrap();
        assert!((result.emissions_kg - 1460.0).abs() < 1e-9);
        assert_eq!(result.relative_uncertainty_percent, 10.0);
        assert_eq!(result.method_used, MethodUsed::Actual);
        assert_eq!(result.degrees_of_freedom, 30.0);
        assert_eq!(result.direction, Direction::Upstream);
    }

    #[test]
    fn test_quantity_is_normalized_before_factor() {
        let registry = registry();
        let dof = DofPolicy::default();
        let calc = EmissionsCalculator::new(&registry, &dof);

        let record = ActivityRecord::new("r1", 2.0, "t", "purchased_goods", "steel", Scope::Scope3);
        let result = calc.compute(&record).unwrap();
        assert_eq!(result.normalized_quantity, 2000.0);
        assert_eq!(result.emissions_kg, result.normalized_quantity * result.factor_value);
    }

    #[test]
    fn test_monetary_override_without_factor_fails() {
        let registry = registry();
        let dof = DofPolicy::default();
        let calc = EmissionsCalculator::new(&registry, &dof);

        let record = ActivityRecord::new("r1", 500.0, "EUR", "purchased_goods", "steel", Scope::Scope3)
            .with_override(Method::Monetary);
        let err = calc.compute(&record).unwrap_err();
        assert!(matches!(err, EngineError::MethodUnavailable { .. }));
    }

    #[test]
    fn test_unknown_subcategory_uses_category_fallback() {
        let registry = registry();
        let dof = DofPolicy::default();
        let calc = EmissionsCalculator::new(&registry, &dof);

        let record = ActivityRecord::new("r1", 100.0, "EUR", "purchased_goods", "copper", Scope::Scope3);
        let result = calc.compute(&record).unwrap();
        assert_eq!(result.method_used, MethodUsed::Default);
        assert!(result.fallback_used());
        assert_eq!(result.degrees_of_freedom, 3.0);
        assert!((result.emissions_kg - 50.0).abs() < 1e-9);
        assert!(result.notes.iter().any(|n| n.contains("fallback")));
    }

    #[test]
    fn test_natural_gas_method_follows_activity_unit() {
        let registry = registry();
        let dof = DofPolicy::default();
        let calc = EmissionsCalculator::new(&registry, &dof);

        let by_volume = ActivityRecord::new("gas-m3", 500.0, "m3", "stationary_combustion", "natural_gas", Scope::Scope1);
        let result = calc.compute(&by_volume).unwrap();
        assert_eq!(result.method_used, MethodUsed::Technical);
        assert_eq!(result.activity_unit, Unit::CubicMetre);
        assert!((result.emissions_kg - 1010.0).abs() < 1e-9);
        assert_eq!(result.degrees_of_freedom, 10.0);
        assert!(result.notes.iter().any(|n| n.contains("resolved to technical")));

        let by_spend = ActivityRecord::new("gas-eur", 1000.0, "EUR", "stationary_combustion", "natural_gas", Scope::Scope1);
        let result = calc.compute(&by_spend).unwrap();
        assert_eq!(result.method_used, MethodUsed::Monetary);
        assert!((result.emissions_kg - 2400.0).abs() < 1e-9);
        assert_eq!(result.degrees_of_freedom, 3.0);
    }

    #[test]
    fn test_spend_on_physical_subcategory_uses_fallback() {
        let registry = registry();
        let dof = DofPolicy::default();
        let calc = EmissionsCalculator::new(&registry, &dof);

        // Steel has mass factors only; the category fallback is spend-based.
        let record = ActivityRecord::new("r1", 100.0, "EUR", "purchased_goods", "steel", Scope::Scope3);
        let result = calc.compute(&record).unwrap();
        assert_eq!(result.method_used, MethodUsed::Default);
        assert!((result.emissions_kg - 50.0).abs() < 1e-9);

        let record = ActivityRecord::new("r2", 100.0, "USD", "purchased_goods", "steel", Scope::Scope3);
        assert!(calc.compute(&record).unwrap_err().is_unit_error());
    }

    #[test]
    fn test_no_fallback_is_calculation_error() {
        let registry = registry();
        let dof = DofPolicy::default();
        let calc = EmissionsCalculator::new(&registry, &dof);

        let record = ActivityRecord::new("r1", 10.0, "kg", "fugitive_emissions", "sf6", Scope::Scope1);
        let err = calc.compute(&record).unwrap_err();
        assert!(matches!(err, EngineError::Calculation { .. }));
    }

    #[test]
    fn test_rejects_negative_and_non_finite() {
        let registry = registry();
        let dof = DofPolicy::default();
        let calc = EmissionsCalculator::new(&registry, &dof);

        for q in [-1.0, f64::NAN, f64::INFINITY] {
            let record = ActivityRecord::new("r1", q, "kg", "purchased_goods", "steel", Scope::Scope3);
            assert!(matches!(
                calc.compute(&record),
                Err(EngineError::InvalidActivity { .. })
            ));
        }
    }

    #[test]
    fn test_scope_must_match_category() {
        let registry = registry();
        let dof = DofPolicy::default();
        let calc = EmissionsCalculator::new(&registry, &dof);

        let record = ActivityRecord::new("r1", 10.0, "kg", "purchased_goods", "steel", Scope::Scope1);
        assert!(matches!(
            calc.compute(&record),
            Err(EngineError::InvalidActivity { .. })
        ));
    }

    #[test]
    fn test_batch_keeps_going_after_failures() {
        let registry = registry();
        let dof = DofPolicy::default();
        let calc = EmissionsCalculator::new(&registry, &dof);

        let records = vec![
            ActivityRecord::new("ok-1", 1000.0, "kWh", "purchased_electricity", "grid_fr", Scope::Scope2),
            ActivityRecord::new("bad-unit", 5.0, "kg", "purchased_electricity", "grid_fr", Scope::Scope2),
            ActivityRecord::new("ok-2", 10.0, "L", "mobile_combustion", "diesel_fleet", Scope::Scope1),
        ];
        let outcome = calc.compute_batch(&records);

        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.results[0].record_id, "ok-1");
        assert_eq!(outcome.results[1].record_id, "ok-2");
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].kind, ErrorKind::UnsupportedUnit);
        assert_eq!(outcome.failures[0].direction, Some(Direction::Indirect));
    }
}
