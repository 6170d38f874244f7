//! Factor Registry Module
//!
//! Emission factors keyed by (category, subcategory, method), loaded once into an
//! immutable, versioned [`FactorRegistry`] and shared through a [`FactorCatalog`].

pub mod catalog;
pub mod loader;
pub mod registry;

pub use catalog::FactorCatalog;
pub use loader::RegistryLoader;
pub use registry::{FactorRegistry, RegistryDocument, RegistryStats};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{EngineError, EngineResult};
use crate::units::Unit;

/// Calculation methods, declared in order of preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    /// Measured or invoiced physical data.
    Actual,
    /// Engineering estimate.
    Technical,
    /// Spend-based ratio.
    Monetary,
}

impl Method {
    pub const PREFERENCE: [Method; 3] = [Method::Actual, Method::Technical, Method::Monetary];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Actual => "actual",
            Method::Technical => "technical",
            Method::Monetary => "monetary",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Method a result was actually computed with; `Default` marks a category fallback factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodUsed {
    Actual,
    Technical,
    Monetary,
    Default,
}

impl From<Method> for MethodUsed {
    fn from(method: Method) -> Self {
        match method {
            Method::Actual => MethodUsed::Actual,
            Method::Technical => MethodUsed::Technical,
            Method::Monetary => MethodUsed::Monetary,
        }
    }
}

impl MethodUsed {
    pub fn as_str(&self) -> &'static str {
        match self {
            MethodUsed::Actual => "actual",
            MethodUsed::Technical => "technical",
            MethodUsed::Monetary => "monetary",
            MethodUsed::Default => "default",
        }
    }
}

impl fmt::Display for MethodUsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Scope1,
    Scope2,
    Scope3,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Scope1 => f.write_str("Scope 1"),
            Scope::Scope2 => f.write_str("Scope 2"),
            Scope::Scope3 => f.write_str("Scope 3"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Upstream,
    Downstream,
    Direct,
    Indirect,
}

impl Direction {
    /// GHG Protocol scope a category with this direction belongs to.
    pub fn scope(&self) -> Scope {
        match self {
            Direction::Direct => Scope::Scope1,
            Direction::Indirect => Scope::Scope2,
            Direction::Upstream | Direction::Downstream => Scope::Scope3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmissionFactor {
    /// kgCO2e per activity unit.
    pub value: f64,
    /// e.g. `kgCO2e/kWh`; the denominator is the activity unit.
    pub unit: String,
    pub source: String,
    /// Relative uncertainty in percent, stated at k=2 (95 %).
    pub uncertainty_percent: f64,
}

impl EmissionFactor {
    pub fn new(value: f64, unit: impl Into<String>, source: impl Into<String>, uncertainty_percent: f64) -> Self {
        Self {
            value,
            unit: unit.into(),
            source: source.into(),
            uncertainty_percent,
        }
    }

    /// Activity unit the factor applies to, parsed from the `unit` denominator.
    pub fn activity_unit(&self) -> EngineResult<Unit> {
        let (numerator, denominator) = self.unit.split_once('/').ok_or_else(|| {
            EngineError::Registry(format!("factor unit '{}' has no activity denominator", self.unit))
        })?;

        let numerator: String = numerator
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase()
            .replace('₂', "2");
        if numerator != "kgco2e" && numerator != "kgco2eq" {
            return Err(EngineError::Registry(format!(
                "factor unit '{}' must express kgCO2e",
                self.unit
            )));
        }

        denominator.parse::<Unit>()
    }

    pub(crate) fn validate(&self, owner: &str) -> EngineResult<()> {
        if !self.value.is_finite() || self.value < 0.0 {
            return Err(EngineError::Registry(format!(
                "{owner}: factor value {} must be finite and >= 0",
                self.value
            )));
        }
        if !(0.0..=100.0).contains(&self.uncertainty_percent) {
            return Err(EngineError::Registry(format!(
                "{owner}: uncertainty {}% outside [0, 100]",
                self.uncertainty_percent
            )));
        }
        self.activity_unit()
            .map_err(|e| EngineError::Registry(format!("{owner}: {e}")))?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subcategory {
    pub id: String,
    pub name: String,
    /// Unit physical activity data for this subcategory is usually reported in.
    /// Descriptive only: quantities are always converted into the unit of the
    /// factor that was selected, never into this one.
    pub canonical_unit: Unit,
    /// Sparse: not every method has a factor.
    #[serde(default)]
    pub emission_factors: BTreeMap<Method, EmissionFactor>,
}

impl Subcategory {
    pub fn factor(&self, method: Method) -> Option<&EmissionFactor> {
        self.emission_factors.get(&method)
    }

    pub fn has_factor(&self, method: Method) -> bool {
        self.emission_factors.contains_key(&method)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    /// GHG Protocol Scope 3 category number (1-15), 0 for Scope 1/2.
    pub number: u8,
    pub name: String,
    pub direction: Direction,
    pub default_method: Method,
    pub available_methods: Vec<Method>,
    pub subcategories: Vec<Subcategory>,
    /// Applied when no subcategory factor can be used.
    #[serde(default)]
    pub fallback: Option<EmissionFactor>,
}

impl Category {
    pub fn scope(&self) -> Scope {
        self.direction.scope()
    }

    pub fn subcategory(&self, id: &str) -> Option<&Subcategory> {
        self.subcategories.iter().find(|s| s.id == id)
    }

    pub fn allows(&self, method: Method) -> bool {
        self.available_methods.contains(&method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_unit_parsing() {
        let f = EmissionFactor::new(0.052, "kgCO2e/kWh", "ADEME", 10.0);
        assert_eq!(f.activity_unit().unwrap(), Unit::KilowattHour);

        let f = EmissionFactor::new(0.35, "kg CO2e / EUR", "EXIOBASE", 50.0);
        assert_eq!(f.activity_unit().unwrap(), Unit::Currency(crate::units::Currency::Eur));

        let f = EmissionFactor::new(1.0, "tCO2e/t", "x", 10.0);
        assert!(f.activity_unit().is_err());
    }

    #[test]
    fn test_factor_validation_bounds() {
        assert!(EmissionFactor::new(-1.0, "kgCO2e/kg", "x", 5.0).validate("t").is_err());
        assert!(EmissionFactor::new(f64::NAN, "kgCO2e/kg", "x", 5.0).validate("t").is_err());
        assert!(EmissionFactor::new(1.0, "kgCO2e/kg", "x", 120.0).validate("t").is_err());
        assert!(EmissionFactor::new(1.0, "kgCO2e/kg", "x", 0.0).validate("t").is_ok());
    }

    #[test]
    fn test_method_preference_order() {
        assert!(Method::Actual < Method::Technical);
        assert_eq!(Method::PREFERENCE[0], Method::Actual);
        assert_eq!(Direction::Downstream.scope(), Scope::Scope3);
    }
}
