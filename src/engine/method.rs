use crate::error::{EngineError, EngineResult};
use crate::factors::{Category, Method, Subcategory};
use crate::units::{self, Unit};

/// Outcome of method resolution; `note` is set whenever the chosen method is
/// not the category's declared default, so the substitution reaches the audit trail.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub method: Method,
    pub note: Option<String>,
}

/// Picks the calculation method: actual > technical > monetary, restricted to
/// methods the category allows, the subcategory has a factor for, and whose
/// factor takes the record's activity unit.
pub struct MethodResolver;

impl MethodResolver {
    /// Usable methods in order of preference, regardless of activity unit.
    pub fn candidates(category: &Category, subcategory: &Subcategory) -> Vec<Method> {
        Method::PREFERENCE
            .iter()
            .copied()
            .filter(|m| category.allows(*m) && subcategory.has_factor(*m))
            .collect()
    }

    /// Candidates whose factor unit is convertible from `unit`.
    pub fn candidates_for(category: &Category, subcategory: &Subcategory, unit: Unit) -> Vec<Method> {
        Self::candidates(category, subcategory)
            .into_iter()
            .filter(|m| {
                factor_unit(category, subcategory, *m)
                    .ok()
                    .is_some_and(|target| units::is_convertible(unit, target))
            })
            .collect()
    }

    /// An override is taken as-is; its unit is checked at conversion time.
    /// Without one, a unit that fits no candidate yields the conversion
    /// error against the preferred method's factor so the caller can try
    /// the category fallback.
    pub fn resolve(
        category: &Category,
        subcategory: &Subcategory,
        unit: Unit,
        method_override: Option<Method>,
    ) -> EngineResult<Resolution> {
        let unavailable = |method: Method| EngineError::MethodUnavailable {
            category_id: category.id.clone(),
            subcategory_id: subcategory.id.clone(),
            method,
        };

        if let Some(requested) = method_override {
            if category.allows(requested) && subcategory.has_factor(requested) {
                let note = (requested != category.default_method).then(|| {
                    format!(
                        "method override {requested} used instead of category default {}",
                        category.default_method
                    )
                });
                return Ok(Resolution { method: requested, note });
            }
            return Err(unavailable(requested));
        }

        let available = Self::candidates(category, subcategory);
        let preferred = *available
            .first()
            .ok_or_else(|| unavailable(category.default_method))?;

        let method = match Self::candidates_for(category, subcategory, unit).first() {
            Some(method) => *method,
            None => {
                let target = factor_unit(category, subcategory, preferred)?;
                units::ensure_convertible(unit, target)?;
                return Err(EngineError::unsupported_unit(unit.to_string(), target.to_string()));
            }
        };

        let note = if method != preferred {
            Some(format!(
                "activity unit {unit} does not fit the {preferred} factor, resolved to {method}"
            ))
        } else if method != category.default_method {
            Some(if subcategory.has_factor(category.default_method) {
                format!(
                    "{method} data preferred over category default {}",
                    category.default_method
                )
            } else {
                format!(
                    "category default {} has no factor for '{}', resolved to {method}",
                    category.default_method, subcategory.id
                )
            })
        } else {
            None
        };

        Ok(Resolution { method, note })
    }
}

fn factor_unit(category: &Category, subcategory: &Subcategory, method: Method) -> EngineResult<Unit> {
    subcategory
        .factor(method)
        .ok_or_else(|| EngineError::FactorNotFound {
            category_id: category.id.clone(),
            subcategory_id: subcategory.id.clone(),
            method: method.to_string(),
        })?
        .activity_unit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::{Direction, EmissionFactor};
    use crate::units::Currency;
    use std::collections::BTreeMap;

    fn fixture(methods: &[Method], factors: &[Method], default: Method) -> (Category, Subcategory) {
        let emission_factors: BTreeMap<_, _> = factors
            .iter()
            .map(|m| (*m, EmissionFactor::new(1.0, "kgCO2e/kg", "test", 10.0)))
            .collect();
        let sub = Subcategory {
            id: "steel".into(),
            name: "Steel".into(),
            canonical_unit: Unit::Kilogram,
            emission_factors,
        };
        let cat = Category {
            id: "purchased_goods".into(),
            number: 1,
            name: "Purchased goods".into(),
            direction: Direction::Upstream,
            default_method: default,
            available_methods: methods.to_vec(),
            subcategories: vec![sub.clone()],
            fallback: None,
        };
        (cat, sub)
    }

    fn gas() -> (Category, Subcategory) {
        let all = [Method::Actual, Method::Technical, Method::Monetary];
        let (mut cat, mut sub) = fixture(&all, &[], Method::Actual);
        for (method, unit) in [
            (Method::Actual, "kgCO2e/kWh"),
            (Method::Technical, "kgCO2e/m3"),
            (Method::Monetary, "kgCO2e/EUR"),
        ] {
            sub.emission_factors
                .insert(method, EmissionFactor::new(1.0, unit, "test", 10.0));
        }
        sub.id = "natural_gas".into();
        sub.canonical_unit = Unit::KilowattHour;
        cat.subcategories = vec![sub.clone()];
        (cat, sub)
    }

    #[test]
    fn test_activity_unit_selects_matching_factor() {
        let (cat, sub) = gas();

        let res = MethodResolver::resolve(&cat, &sub, Unit::MegawattHour, None).unwrap();
        assert_eq!(res.method, Method::Actual);
        assert!(res.note.is_none());

        let res = MethodResolver::resolve(&cat, &sub, Unit::CubicMetre, None).unwrap();
        assert_eq!(res.method, Method::Technical);
        assert!(res.note.unwrap().contains("m3"));

        let res = MethodResolver::resolve(&cat, &sub, Unit::Currency(Currency::Eur), None).unwrap();
        assert_eq!(res.method, Method::Monetary);
        assert!(res.note.is_some());
    }

    #[test]
    fn test_unit_fitting_no_factor_is_reported() {
        let (cat, sub) = gas();

        let err = MethodResolver::resolve(&cat, &sub, Unit::Tonne, None).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedUnit { .. }));

        // Currencies never convert into one another.
        let err = MethodResolver::resolve(&cat, &sub, Unit::Currency(Currency::Usd), None).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedUnit { .. }));
    }

    #[test]
    fn test_prefers_actual_then_technical() {
        let all = [Method::Actual, Method::Technical, Method::Monetary];
        let (cat, sub) = fixture(&all, &[Method::Technical, Method::Monetary], Method::Actual);
        let res = MethodResolver::resolve(&cat, &sub, Unit::Kilogram, None).unwrap();
        assert_eq!(res.method, Method::Technical);
        assert!(res.note.is_some());

        let (cat, sub) = fixture(&all, &all, Method::Actual);
        let res = MethodResolver::resolve(&cat, &sub, Unit::Kilogram, None).unwrap();
        assert_eq!(res.method, Method::Actual);
        assert!(res.note.is_none());
    }

    #[test]
    fn test_never_selects_method_outside_intersection() {
        // Category allows only monetary; subcategory only has actual.
        let (cat, sub) = fixture(&[Method::Monetary], &[Method::Actual], Method::Monetary);
        assert!(MethodResolver::candidates(&cat, &sub).is_empty());
        let err = MethodResolver::resolve(&cat, &sub, Unit::Kilogram, None).unwrap_err();
        assert!(matches!(err, EngineError::MethodUnavailable { .. }));
    }

    #[test]
    fn test_override_without_factor_fails() {
        let all = [Method::Actual, Method::Technical, Method::Monetary];
        let (cat, sub) = fixture(&all, &[Method::Actual], Method::Actual);
        let err = MethodResolver::resolve(&cat, &sub, Unit::Kilogram, Some(Method::Monetary)).unwrap_err();
        match err {
            EngineError::MethodUnavailable { method, .. } => assert_eq!(method, Method::Monetary),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_override_honoured_and_flagged() {
        let all = [Method::Actual, Method::Technical, Method::Monetary];
        let (cat, sub) = fixture(&all, &all, Method::Actual);
        let res = MethodResolver::resolve(&cat, &sub, Unit::Kilogram, Some(Method::Monetary)).unwrap();
        assert_eq!(res.method, Method::Monetary);
        assert!(res.note.unwrap().contains("override"));
    }
}
