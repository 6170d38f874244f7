use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Stage of the computation an audit step documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStage {
    Calculation,
    MethodSelection,
    Fallback,
    Failure,
    Aggregation,
    Budget,
    Compliance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditStep {
    pub sequence: usize,
    pub stage: AuditStage,
    /// Record id, scope group or other subject of the step.
    pub subject: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    /// Raw numeric inputs and outputs of the step, unformatted.
    #[serde(default)]
    pub values: BTreeMap<String, f64>,
}

impl AuditStep {
    pub fn with_formula(&mut self, formula: impl Into<String>) -> &mut Self {
        self.formula = Some(formula.into());
        self
    }

    pub fn with_value(&mut self, key: impl Into<String>, value: f64) -> &mut Self {
        self.values.insert(key.into(), value);
        self
    }
}

/// Ordered ledger of every step behind one report, tied to one registry version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditTrail {
    pub run_id: String,
    pub registry_version: String,
    pub steps: Vec<AuditStep>,
}

impl AuditTrail {
    pub fn new(registry_version: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            registry_version: registry_version.into(),
            steps: Vec::new(),
        }
    }

    pub fn record(
        &mut self,
        stage: AuditStage,
        subject: impl Into<String>,
        description: impl Into<String>,
    ) -> &mut AuditStep {
        let sequence = self.steps.len() + 1;
        self.steps.push(AuditStep {
            sequence,
            stage,
            subject: subject.into(),
            description: description.into(),
            formula: None,
            values: BTreeMap::new(),
        });
        let last = self.steps.len() - 1;
        &mut self.steps[last]
    }

    pub fn steps_for(&self, stage: AuditStage) -> impl Iterator<Item = &AuditStep> {
        self.steps.iter().filter(move |s| s.stage == stage)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_are_sequenced_in_order() {
        let mut trail = AuditTrail::new("2024.1");
        trail
            .record(AuditStage::Calculation, "r1", "emissions from activity")
            .with_formula("E = q × EF")
            .with_value("emissions_kg", 1460.0);
        trail.record(AuditStage::Aggregation, "Scope 1", "sum");

        assert_eq!(trail.len(), 2);
        assert_eq!(trail.steps[0].sequence, 1);
        assert_eq!(trail.steps[1].sequence, 2);
        assert_eq!(trail.steps[0].values["emissions_kg"], 1460.0);
        assert_eq!(trail.steps_for(AuditStage::Aggregation).count(), 1);
        assert!(Uuid::parse_str(&trail.run_id).is_ok());
    }
}
