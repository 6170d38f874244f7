//! Compliance Report
//!
//! The serializable end product of a run. Every number a presentation layer
//! needs is already here in raw form; nothing is pre-formatted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::compliance::{ComplianceAssessment, DataQuality, Penalty, Recommendation, RiskLevel};
use crate::engine::aggregate::{Aggregate, ScopeSummary};
use crate::engine::audit::AuditTrail;
use crate::engine::calculator::RecordFailure;
use crate::engine::uncertainty::UncertaintyBudgetEntry;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub report_id: String,
    pub generated_at: DateTime<Utc>,
    pub registry_version: String,
    pub scope1: ScopeSummary,
    pub scope2: ScopeSummary,
    pub scope3_upstream: ScopeSummary,
    pub scope3_downstream: ScopeSummary,
    pub scope3: ScopeSummary,
    pub grand_total: ScopeSummary,
    pub compliance_score: f64,
    pub regulatory_risk_level: RiskLevel,
    pub uncertainty_budget: Vec<UncertaintyBudgetEntry>,
    pub category_budget: Vec<UncertaintyBudgetEntry>,
    pub data_quality: DataQuality,
    pub penalties: Vec<Penalty>,
    pub recommendations: Vec<Recommendation>,
    pub failures: Vec<RecordFailure>,
    pub audit_trail: AuditTrail,
}

impl ComplianceReport {
    pub fn assemble(
        aggregate: Aggregate,
        data_quality: DataQuality,
        assessment: ComplianceAssessment,
        failures: Vec<RecordFailure>,
        audit_trail: AuditTrail,
    ) -> Self {
        Self {
            report_id: Uuid::new_v4().to_string(),
            generated_at: Utc::now(),
            registry_version: audit_trail.registry_version.clone(),
            scope1: aggregate.scope1,
            scope2: aggregate.scope2,
            scope3_upstream: aggregate.scope3_upstream,
            scope3_downstream: aggregate.scope3_downstream,
            scope3: aggregate.scope3,
            grand_total: aggregate.grand_total,
            compliance_score: assessment.compliance_score,
            regulatory_risk_level: assessment.regulatory_risk_level,
            uncertainty_budget: aggregate.uncertainty_budget,
            category_budget: aggregate.category_budget,
            data_quality,
            penalties: assessment.penalties,
            recommendations: assessment.recommendations,
            failures,
            audit_trail,
        }
    }

    /// True when no record failed, so no total under-reports.
    pub fn is_complete(&self) -> bool {
        !self.grand_total.incomplete
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
