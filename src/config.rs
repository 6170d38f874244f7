//! Engine Configuration
//!
//! Policy knobs of the engine: coverage factors, degrees-of-freedom convention
//! per data provenance, budget reporting depth and compliance scoring policy.
//! Every field has a default, so a partial file only overrides what it names.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

use crate::compliance::CompliancePolicy;
use crate::error::{EngineError, EngineResult};
use crate::factors::loader::is_yaml;
use crate::factors::MethodUsed;

/// Degrees of freedom assigned to a result by the provenance of its factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DofPolicy {
    pub actual: f64,
    pub technical: f64,
    pub monetary: f64,
    pub default_factor: f64,
}

impl Default for DofPolicy {
    fn default() -> Self {
        Self {
            actual: 30.0,
            technical: 10.0,
            monetary: 3.0,
            default_factor: 3.0,
        }
    }
}

impl DofPolicy {
    pub fn for_method(&self, method: MethodUsed) -> f64 {
        match method {
            MethodUsed::Actual => self.actual,
            MethodUsed::Technical => self.technical,
            MethodUsed::Monetary => self.monetary,
            MethodUsed::Default => self.default_factor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Coverage factor at which factor uncertainties are stated.
    pub input_coverage_factor: f64,
    /// Coverage factor applied to combined standard uncertainties.
    pub coverage_factor: f64,
    pub dof: DofPolicy,
    /// Effective dof reported when every contribution has zero uncertainty.
    pub zero_uncertainty_dof: f64,
    /// Number of leading budget entries annotated with an improvement hint.
    pub budget_top_contributors: usize,
    pub compliance: CompliancePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            input_coverage_factor: 2.0,
            coverage_factor: 2.0,
            dof: DofPolicy::default(),
            zero_uncertainty_dof: 1e6,
            budget_top_contributors: 3,
            compliance: CompliancePolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> EngineResult<()> {
        for (name, k) in [
            ("input_coverage_factor", self.input_coverage_factor),
            ("coverage_factor", self.coverage_factor),
        ] {
            if !k.is_finite() || k <= 0.0 {
                return Err(EngineError::Config(format!("{name} must be > 0, got {k}")));
            }
        }

        let dof = &self.dof;
        for (name, v) in [
            ("dof.actual", dof.actual),
            ("dof.technical", dof.technical),
            ("dof.monetary", dof.monetary),
            ("dof.default_factor", dof.default_factor),
            ("zero_uncertainty_dof", self.zero_uncertainty_dof),
        ] {
            if !v.is_finite() || v <= 0.0 {
                return Err(EngineError::Config(format!("{name} must be > 0, got {v}")));
            }
        }

        self.compliance.validate()
    }
}

/// Loads [`EngineConfig`] from YAML or JSON; a missing file means defaults.
pub struct ConfigLoader {
    path: PathBuf,
}

impl ConfigLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn load(&self) -> Result<EngineConfig> {
        if !self.path.exists() {
            return Ok(EngineConfig::default());
        }

        let content = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read engine config {:?}", self.path))?;
        let config: EngineConfig = if is_yaml(&self.path) {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config {:?}", self.path))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config {:?}", self.path))?
        };
        config.validate()?;
        Ok(config)
    }

    pub async fn save(&self, config: &EngineConfig) -> Result<()> {
        let content = if is_yaml(&self.path) {
            serde_yaml::to_string(config)?
        } else {
            serde_json::to_string_pretty(config)?
        };
        fs::write(&self.path, content).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dof.for_method(MethodUsed::Actual), 30.0);
        assert_eq!(config.dof.for_method(MethodUsed::Technical), 10.0);
        assert_eq!(config.dof.for_method(MethodUsed::Monetary), 3.0);
    }

    #[test]
    fn test_rejects_non_positive_coverage_factor() {
        let config = EngineConfig {
            coverage_factor: 0.0,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));
    }

    #[tokio::test]
    async fn test_partial_yaml_overrides() {
        let file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        tokio::fs::write(file.path(), "coverage_factor: 3.0\ndof:\n  monetary: 2.0\n")
            .await
            .unwrap();

        let config = ConfigLoader::new(file.path()).load().await.unwrap();
        assert_eq!(config.coverage_factor, 3.0);
        assert_eq!(config.dof.monetary, 2.0);
        assert_eq!(config.dof.actual, 30.0);
        assert_eq!(config.input_coverage_factor, 2.0);
    }

    #[tokio::test]
    async fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigLoader::new(dir.path().join("none.json")).load().await.unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[tokio::test]
    async fn test_save_then_load_json() {
        let file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        let loader = ConfigLoader::new(file.path());
        let config = EngineConfig {
            budget_top_contributors: 5,
            ..EngineConfig::default()
        };
        loader.save(&config).await.unwrap();
        assert_eq!(loader.load().await.unwrap(), config);
    }
}
