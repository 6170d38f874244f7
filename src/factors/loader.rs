use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

use super::{FactorRegistry, RegistryDocument};

/// Reads a registry dataset from a JSON or YAML file.
pub struct RegistryLoader {
    path: PathBuf,
}

impl RegistryLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn load(&self) -> Result<FactorRegistry> {
        let content = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read factor dataset {:?}", self.path))?;

        let registry = if is_yaml(&self.path) {
            FactorRegistry::from_yaml_str(&content)
        } else {
            FactorRegistry::from_json_str(&content)
        }
        .with_context(|| format!("Invalid factor dataset {:?}", self.path))?;

        let stats = registry.stats();
        info!(
            "Loaded factor registry '{}' v{}: {} categories, {} subcategories, {} factors",
            registry.name(),
            registry.version(),
            stats.categories,
            stats.subcategories,
            stats.factors
        );
        Ok(registry)
    }

    pub async fn save(&self, registry: &FactorRegistry) -> Result<()> {
        let doc: RegistryDocument = registry.to_document();
        let content = if is_yaml(&self.path) {
            serde_yaml::to_string(&doc)?
        } else {
            serde_json::to_string_pretty(&doc)?
        };
        fs::write(&self.path, content)
            .await
            .with_context(|| format!("Failed to write factor dataset {:?}", self.path))?;
        Ok(())
    }
}

pub(crate) fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::Method;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_save_load_yaml_and_json() {
        let dir = tempdir().unwrap();
        let registry = FactorRegistry::builtin().unwrap();

        for name in ["factors.yaml", "factors.json"] {
            let loader = RegistryLoader::new(dir.path().join(name));
            loader.save(&registry).await.unwrap();
            let loaded = loader.load().await.unwrap();
            assert_eq!(loaded.version(), registry.version());
            assert_eq!(loaded.stats(), registry.stats());
            assert_eq!(
                loaded.lookup("purchased_goods", "steel", Method::Actual).unwrap().value,
                1.46
            );
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let loader = RegistryLoader::new(dir.path().join("absent.json"));
        assert!(loader.load().await.is_err());
    }
}
