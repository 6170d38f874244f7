//! Emissions Engine
//!
//! Activity records in, compliance report out. A run reads exactly one
//! registry snapshot from start to finish and never performs I/O.

pub mod aggregate;
pub mod audit;
pub mod calculator;
pub mod method;
pub mod uncertainty;

pub use aggregate::{Aggregate, ScopeAggregator, ScopeGroup, ScopeSummary};
pub use audit::{AuditStage, AuditStep, AuditTrail};
pub use calculator::{ActivityRecord, BatchOutcome, CalculationResult, EmissionsCalculator, RecordFailure};
pub use method::{MethodResolver, Resolution};
pub use uncertainty::{BudgetGroup, CombinedUncertainty, Contribution, UncertaintyBudgetEntry, UncertaintyEngine};

use tracing::{info, info_span};

use crate::compliance::{ComplianceScorer, DataQuality, VerificationLevel};
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::factors::{FactorCatalog, FactorRegistry};
use crate::persistence::ResultRecord;
use crate::report::ComplianceReport;

/// Everything one run produced.
#[derive(Debug, Clone)]
pub struct EngineRun {
    pub results: Vec<CalculationResult>,
    pub failures: Vec<RecordFailure>,
    pub report: ComplianceReport,
}

impl EngineRun {
    /// Results tagged with the registry version and report timestamp, ready to store.
    pub fn result_records(&self) -> Vec<ResultRecord> {
        self.results
            .iter()
            .cloned()
            .map(|r| ResultRecord::new(r, self.report.registry_version.clone(), self.report.generated_at))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Per-record results only, without aggregation.
    pub fn calculate(&self, registry: &FactorRegistry, records: &[ActivityRecord]) -> BatchOutcome {
        EmissionsCalculator::new(registry, &self.config.dof).compute_batch(records)
    }

    pub fn run(
        &self,
        registry: &FactorRegistry,
        records: &[ActivityRecord],
        verification: VerificationLevel,
    ) -> EngineResult<EngineRun> {
        let span = info_span!(
            "emissions_batch",
            registry_version = %registry.version(),
            records = records.len()
        );
        let _enter = span.enter();

        let BatchOutcome { results, failures } = self.calculate(registry, records);

        let mut trail = AuditTrail::new(registry.version());
        self.audit_records(&mut trail, &results, &failures);

        let uncertainty = UncertaintyEngine::from_config(&self.config);
        let aggregate = ScopeAggregator::new(
            &uncertainty,
            self.config.input_coverage_factor,
            self.config.budget_top_contributors,
        )
        .aggregate(&results, &failures, &mut trail)?;

        let quality = DataQuality::assess(&results, &aggregate, verification);
        let assessment = ComplianceScorer::new(&self.config.compliance).score(&aggregate, &quality);
        trail
            .record(
                AuditStage::Compliance,
                "Compliance",
                format!(
                    "score 100 minus {} penalties, {} risk",
                    assessment.penalties.len(),
                    assessment.regulatory_risk_level
                ),
            )
            .with_formula("score = clamp(100 − Σ penalties, 0, 100)")
            .with_value("compliance_score", assessment.compliance_score)
            .with_value("primary_data_coverage_percent", quality.primary_data_coverage_percent)
            .with_value("relative_uncertainty_percent", quality.relative_uncertainty_percent);

        info!(
            "Run {} computed {} results ({} failed) against registry {}",
            trail.run_id,
            results.len(),
            failures.len(),
            registry.version()
        );

        let report = ComplianceReport::assemble(aggregate, quality, assessment, failures.clone(), trail);
        Ok(EngineRun {
            results,
            failures,
            report,
        })
    }

    /// Take one snapshot from the catalog and run against it end to end.
    pub async fn run_with_catalog(
        &self,
        catalog: &FactorCatalog,
        records: &[ActivityRecord],
        verification: VerificationLevel,
    ) -> EngineResult<EngineRun> {
        let registry = catalog.snapshot().await;
        self.run(&registry, records, verification)
    }

    fn audit_records(&self, trail: &mut AuditTrail, results: &[CalculationResult], failures: &[RecordFailure]) {
        for r in results {
            trail
                .record(
                    AuditStage::Calculation,
                    r.record_id.clone(),
                    format!(
                        "{}/{} via {} factor from {}",
                        r.category_id, r.subcategory_id, r.method_used, r.factor_source
                    ),
                )
                .with_formula("E = q × EF; u = E × r / 100 / k_in")
                .with_value("normalized_quantity", r.normalized_quantity)
                .with_value("factor_value", r.factor_value)
                .with_value("emissions_kg", r.emissions_kg)
                .with_value("relative_uncertainty_percent", r.relative_uncertainty_percent)
                .with_value("degrees_of_freedom", r.degrees_of_freedom);

            let stage = if r.fallback_used() {
                AuditStage::Fallback
            } else {
                AuditStage::MethodSelection
            };
            for note in &r.notes {
                trail.record(stage, r.record_id.clone(), note.clone());
            }
        }

        for f in failures {
            trail.record(AuditStage::Failure, f.record_id.clone(), f.reason.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::Scope;

    #[test]
    fn test_run_records_every_stage() {
        let registry = FactorRegistry::builtin().unwrap();
        let engine = Engine::new(EngineConfig::default()).unwrap();
        let records = vec![
            ActivityRecord::new("steel", 1000.0, "kg", "purchased_goods", "steel", Scope::Scope3),
            ActivityRecord::new("other", 100.0, "EUR", "purchased_goods", "copper", Scope::Scope3),
            ActivityRecord::new("broken", 1.0, "kg", "purchased_electricity", "grid_fr", Scope::Scope2),
        ];

        let run = engine.run(&registry, &records, VerificationLevel::Unverified).unwrap();
        let trail = &run.report.audit_trail;

        assert_eq!(run.results.len(), 2);
        assert_eq!(run.failures.len(), 1);
        assert_eq!(trail.steps_for(AuditStage::Calculation).count(), 2);
        assert_eq!(trail.steps_for(AuditStage::Fallback).count(), 1);
        assert_eq!(trail.steps_for(AuditStage::Failure).count(), 1);
        assert_eq!(trail.steps_for(AuditStage::Compliance).count(), 1);
        assert_eq!(trail.registry_version, registry.version());
        assert!(run.report.scope2.incomplete);
        assert_eq!(run.result_records().len(), 2);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig {
            input_coverage_factor: -2.0,
            ..EngineConfig::default()
        };
        assert!(Engine::new(config).is_err());
    }
}
