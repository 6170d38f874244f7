//! Unit Normalizer
//!
//! Closed set of activity units and the conversions between them. Every unit
//! belongs to one dimension; conversion only happens inside a dimension, via the
//! dimension's base unit. Currencies never convert: exchange rates are an input
//! of the caller, not of the engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Mass,
    Energy,
    Volume,
    /// Mass moved over a distance (freight), base unit t.km.
    FreightDistance,
    Currency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Currency {
    Eur,
    Usd,
    Gbp,
    Chf,
    Cad,
    Jpy,
    Cny,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Eur => "EUR",
            Currency::Usd => "USD",
            Currency::Gbp => "GBP",
            Currency::Chf => "CHF",
            Currency::Cad => "CAD",
            Currency::Jpy => "JPY",
            Currency::Cny => "CNY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Unit {
    Gram,
    Kilogram,
    Tonne,
    KilowattHour,
    MegawattHour,
    GigawattHour,
    Megajoule,
    Gigajoule,
    /// French thermie, 1 th = 1 Mcal = 1.163 kWh.
    Thermie,
    Litre,
    CubicMetre,
    KilogramKilometre,
    TonneKilometre,
    Currency(Currency),
}

impl Unit {
    pub fn dimension(&self) -> Dimension {
        match self {
            Unit::Gram | Unit::Kilogram | Unit::Tonne => Dimension::Mass,
            Unit::KilowattHour
            | Unit::MegawattHour
            | Unit::GigawattHour
            | Unit::Megajoule
            | Unit::Gigajoule
            | Unit::Thermie => Dimension::Energy,
            Unit::Litre | Unit::CubicMetre => Dimension::Volume,
            Unit::KilogramKilometre | Unit::TonneKilometre => Dimension::FreightDistance,
            Unit::Currency(_) => Dimension::Currency,
        }
    }

    /// Multiplier into the dimension's base unit (kg, kWh, L, t.km).
    /// Currencies are their own base.
    fn to_base(&self) -> f64 {
        match self {
            Unit::Gram => 1e-3,
            Unit::Kilogram => 1.0,
            Unit::Tonne => 1e3,
            Unit::KilowattHour => 1.0,
            Unit::MegawattHour => 1e3,
            Unit::GigawattHour => 1e6,
            Unit::Megajoule => 1.0 / 3.6,
            Unit::Gigajoule => 1e3 / 3.6,
            Unit::Thermie => 1.163,
            Unit::Litre => 1.0,
            Unit::CubicMetre => 1e3,
            Unit::KilogramKilometre => 1e-3,
            Unit::TonneKilometre => 1.0,
            Unit::Currency(_) => 1.0,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Unit::Gram => "g",
            Unit::Kilogram => "kg",
            Unit::Tonne => "t",
            Unit::KilowattHour => "kWh",
            Unit::MegawattHour => "MWh",
            Unit::GigawattHour => "GWh",
            Unit::Megajoule => "MJ",
            Unit::Gigajoule => "GJ",
            Unit::Thermie => "thermie",
            Unit::Litre => "L",
            Unit::CubicMetre => "m3",
            Unit::KilogramKilometre => "kg.km",
            Unit::TonneKilometre => "t.km",
            Unit::Currency(c) => c.code(),
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Unit {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();

        let unit = match key.as_str() {
            "g" | "gram" | "grams" => Unit::Gram,
            "kg" | "kgs" | "kilogram" | "kilograms" => Unit::Kilogram,
            "t" | "tonne" | "tonnes" | "metric_ton" => Unit::Tonne,
            "kwh" => Unit::KilowattHour,
            "mwh" => Unit::MegawattHour,
            "gwh" => Unit::GigawattHour,
            "mj" => Unit::Megajoule,
            "gj" => Unit::Gigajoule,
            "th" | "thermie" | "thermies" => Unit::Thermie,
            "l" | "litre" | "litres" | "liter" | "liters" => Unit::Litre,
            "m3" | "m³" | "cubic_metre" | "cubic_meter" => Unit::CubicMetre,
            "kg.km" | "kgkm" | "kg·km" | "kg-km" => Unit::KilogramKilometre,
            "t.km" | "tkm" | "t·km" | "t-km" | "tonne.km" | "tonne-km" => Unit::TonneKilometre,
            "eur" | "€" => Unit::Currency(Currency::Eur),
            "usd" | "$" => Unit::Currency(Currency::Usd),
            "gbp" | "£" => Unit::Currency(Currency::Gbp),
            "chf" => Unit::Currency(Currency::Chf),
            "cad" => Unit::Currency(Currency::Cad),
            "jpy" | "¥" => Unit::Currency(Currency::Jpy),
            "cny" => Unit::Currency(Currency::Cny),
            _ => return Err(EngineError::unsupported_unit(s, "<known unit>")),
        };
        Ok(unit)
    }
}

impl TryFrom<String> for Unit {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Unit> for String {
    fn from(unit: Unit) -> Self {
        unit.symbol().to_string()
    }
}

/// Convert `quantity` expressed in `from` into `to`.
///
/// Same-unit conversions return the quantity untouched so that results stay
/// bit-exact when no scaling is involved.
pub fn convert(quantity: f64, from: Unit, to: Unit) -> EngineResult<f64> {
    if from == to {
        return Ok(quantity);
    }
    ensure_convertible(from, to)?;
    Ok(quantity * from.to_base() / to.to_base())
}

/// Fails with the error `convert` would raise for this pair.
pub fn ensure_convertible(from: Unit, to: Unit) -> EngineResult<()> {
    if from == to {
        return Ok(());
    }

    match (from.dimension(), to.dimension()) {
        (Dimension::Currency, Dimension::Currency) => Err(EngineError::UnitMismatch {
            from: from.to_string(),
            to: to.to_string(),
        }),
        (a, b) if a != b => Err(EngineError::unsupported_unit(from.to_string(), to.to_string())),
        _ => Ok(()),
    }
}

pub fn is_convertible(from: Unit, to: Unit) -> bool {
    ensure_convertible(from, to).is_ok()
}

/// Normalize an activity quantity given as free-form unit strings.
pub fn normalize(quantity: f64, unit: &str, canonical_unit: &str) -> EngineResult<f64> {
    let from: Unit = unit
        .parse()
        .map_err(|_| EngineError::unsupported_unit(unit, canonical_unit))?;
    let to: Unit = canonical_unit
        .parse()
        .map_err(|_| EngineError::unsupported_unit(unit, canonical_unit))?;
    convert(quantity, from, to)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9 * b.abs().max(1.0)
    }

    #[test]
    fn test_mass_and_energy_scaling() {
        assert!(close(normalize(2.5, "t", "kg").unwrap(), 2500.0));
        assert!(close(normalize(1500.0, "kg", "tonne").unwrap(), 1.5));
        assert!(close(normalize(3.0, "MWh", "kWh").unwrap(), 3000.0));
        assert!(close(normalize(100.0, "thermies", "kWh").unwrap(), 116.3));
        assert!(close(normalize(36.0, "MJ", "kWh").unwrap(), 10.0));
        assert!(close(normalize(2.0, "m3", "L").unwrap(), 2000.0));
        assert!(close(normalize(5000.0, "kg.km", "t.km").unwrap(), 5.0));
    }

    #[test]
    fn test_same_unit_is_exact() {
        let q = 0.1 + 0.2;
        assert_eq!(normalize(q, "kg", "KG").unwrap(), q);
        assert_eq!(normalize(42.0, "EUR", "eur").unwrap(), 42.0);
    }

    #[test]
    fn test_currency_mismatch() {
        let err = normalize(10.0, "USD", "EUR").unwrap_err();
        assert!(matches!(err, EngineError::UnitMismatch { .. }));
    }

    #[test]
    fn test_cross_dimension_is_unsupported() {
        let err = normalize(10.0, "kg", "kWh").unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedUnit { .. }));
        let err = normalize(10.0, "EUR", "kg").unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedUnit { .. }));
    }

    #[test]
    fn test_convertible_pairs() {
        assert!(is_convertible(Unit::CubicMetre, Unit::Litre));
        assert!(is_convertible(Unit::Currency(Currency::Eur), Unit::Currency(Currency::Eur)));
        assert!(!is_convertible(Unit::Currency(Currency::Usd), Unit::Currency(Currency::Eur)));
        assert!(!is_convertible(Unit::CubicMetre, Unit::KilowattHour));
    }

    #[test]
    fn test_unknown_unit_is_unsupported() {
        let err = normalize(1.0, "furlong", "kg").unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedUnit { .. }));
    }

    #[test]
    fn test_unit_serde_uses_symbols() {
        let json = serde_json::to_string(&Unit::TonneKilometre).unwrap();
        assert_eq!(json, "\"t.km\"");
        let back: Unit = serde_json::from_str("\"tkm\"").unwrap();
        assert_eq!(back, Unit::TonneKilometre);
    }
}
