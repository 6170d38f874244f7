use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::{Category, Direction, EmissionFactor, Method, Subcategory};
use crate::error::{EngineError, EngineResult};

const BUILTIN_DATASET: &str = include_str!("../../data/factors.yaml");

/// Serialized shape of a registry dataset (JSON or YAML).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryDocument {
    pub version: String,
    #[serde(default)]
    pub name: String,
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub categories: usize,
    pub subcategories: usize,
    pub factors: usize,
    pub fallbacks: usize,
}

/// Immutable, versioned snapshot of emission factors.
///
/// Built only through [`FactorRegistry::new`], which validates the dataset, so
/// every lookup works against consistent data.
#[derive(Debug, Clone)]
pub struct FactorRegistry {
    version: String,
    name: String,
    categories: Vec<Category>,
    index: HashMap<String, usize>,
}

impl FactorRegistry {
    pub fn new(version: impl Into<String>, name: impl Into<String>, categories: Vec<Category>) -> EngineResult<Self> {
        let version = version.into();
        if version.trim().is_empty() {
            return Err(EngineError::Registry("dataset version must not be empty".into()));
        }

        let mut index = HashMap::with_capacity(categories.len());
        for (i, category) in categories.iter().enumerate() {
            validate_category(category)?;
            if index.insert(category.id.clone(), i).is_some() {
                return Err(EngineError::Registry(format!("duplicate category id '{}'", category.id)));
            }
        }

        Ok(Self {
            version,
            name: name.into(),
            categories,
            index,
        })
    }

    /// Dataset bundled with the crate: Scope 1, Scope 2 and the 15 Scope 3 categories.
    pub fn builtin() -> EngineResult<Self> {
        Self::from_yaml_str(BUILTIN_DATASET)
    }

    pub fn from_yaml_str(content: &str) -> EngineResult<Self> {
        let doc: RegistryDocument = serde_yaml::from_str(content)
            .map_err(|e| EngineError::Registry(format!("unreadable YAML dataset: {e}")))?;
        Self::try_from(doc)
    }

    pub fn from_json_str(content: &str) -> EngineResult<Self> {
        let doc: RegistryDocument = serde_json::from_str(content)
            .map_err(|e| EngineError::Registry(format!("unreadable JSON dataset: {e}")))?;
        Self::try_from(doc)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn category(&self, id: &str) -> Option<&Category> {
        self.index.get(id).map(|&i| &self.categories[i])
    }

    pub fn subcategory(&self, category_id: &str, subcategory_id: &str) -> Option<&Subcategory> {
        self.category(category_id)?.subcategory(subcategory_id)
    }

    pub fn lookup(&self, category_id: &str, subcategory_id: &str, method: Method) -> EngineResult<&EmissionFactor> {
        self.subcategory(category_id, subcategory_id)
            .and_then(|s| s.factor(method))
            .ok_or_else(|| EngineError::FactorNotFound {
                category_id: category_id.to_string(),
                subcategory_id: subcategory_id.to_string(),
                method: method.to_string(),
            })
    }

    /// Registry-declared fallback factor for a category.
    pub fn fallback(&self, category_id: &str) -> Option<&EmissionFactor> {
        self.category(category_id)?.fallback.as_ref()
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            categories: self.categories.len(),
            subcategories: self.categories.iter().map(|c| c.subcategories.len()).sum(),
            factors: self
                .categories
                .iter()
                .flat_map(|c| c.subcategories.iter())
                .map(|s| s.emission_factors.len())
                .sum(),
            fallbacks: self.categories.iter().filter(|c| c.fallback.is_some()).count(),
        }
    }

    pub fn to_document(&self) -> RegistryDocument {
        RegistryDocument {
            version: self.version.clone(),
            name: self.name.clone(),
            categories: self.categories.clone(),
        }
    }
}

impl TryFrom<RegistryDocument> for FactorRegistry {
    type Error = EngineError;

    fn try_from(doc: RegistryDocument) -> Result<Self, Self::Error> {
        FactorRegistry::new(doc.version, doc.name, doc.categories)
    }
}

fn validate_category(category: &Category) -> EngineResult<()> {
    let id = &category.id;
    if id.trim().is_empty() {
        return Err(EngineError::Registry("category id must not be empty".into()));
    }

    match category.direction {
        Direction::Direct | Direction::Indirect if category.number != 0 => {
            return Err(EngineError::Registry(format!(
                "category '{id}': Scope 1/2 categories use number 0, got {}",
                category.number
            )));
        }
        Direction::Upstream | Direction::Downstream if !(1..=15).contains(&category.number) => {
            return Err(EngineError::Registry(format!(
                "category '{id}': Scope 3 category number must be 1-15, got {}",
                category.number
            )));
        }
        _ => {}
    }

    if category.available_methods.is_empty() {
        return Err(EngineError::Registry(format!("category '{id}' declares no available methods")));
    }
    if !category.allows(category.default_method) {
        return Err(EngineError::Registry(format!(
            "category '{id}': default method {} is not among available methods",
            category.default_method
        )));
    }

    let mut seen = HashSet::new();
    for sub in &category.subcategories {
        if !seen.insert(sub.id.as_str()) {
            return Err(EngineError::Registry(format!(
                "category '{id}': duplicate subcategory id '{}'",
                sub.id
            )));
        }
        for (method, factor) in &sub.emission_factors {
            factor.validate(&format!("{id}/{}/{method}", sub.id))?;
        }
    }

    if let Some(fallback) = &category.fallback {
        fallback.validate(&format!("{id}/fallback"))?;
    }

    Ok(())
}
