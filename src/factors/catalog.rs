use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use super::{FactorRegistry, RegistryLoader};

/// Holder of the current registry snapshot.
///
/// Readers take an `Arc` to one immutable [`FactorRegistry`] and keep it for a
/// whole run; a refresh swaps the pointer and never touches a snapshot that is
/// already handed out.
pub struct FactorCatalog {
    current: RwLock<Arc<FactorRegistry>>,
}

impl FactorCatalog {
    pub fn new(registry: FactorRegistry) -> Self {
        Self {
            current: RwLock::new(Arc::new(registry)),
        }
    }

    pub async fn snapshot(&self) -> Arc<FactorRegistry> {
        self.current.read().await.clone()
    }

    pub async fn version(&self) -> String {
        self.current.read().await.version().to_string()
    }

    /// Swap in a new registry, returning the one it replaced.
    pub async fn replace(&self, registry: FactorRegistry) -> Arc<FactorRegistry> {
        let next = Arc::new(registry);
        let mut current = self.current.write().await;
        info!(
            "Factor registry replaced: {} -> {} ({} categories)",
            current.version(),
            next.version(),
            next.stats().categories
        );
        std::mem::replace(&mut *current, next)
    }

    /// Load a dataset from disk and swap it in, returning the replaced snapshot.
    /// The current snapshot stays live on failure.
    pub async fn refresh_from_file(&self, path: impl AsRef<Path>) -> Result<Arc<FactorRegistry>> {
        let registry = RegistryLoader::new(path.as_ref()).load().await?;
        Ok(self.replace(registry).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_snapshot_survives_replace() {
        let catalog = FactorCatalog::new(FactorRegistry::builtin().unwrap());
        let before = catalog.snapshot().await;

        let mut doc = before.to_document();
        doc.version = "2025.1".to_string();
        let old = catalog.replace(FactorRegistry::try_from(doc).unwrap()).await;

        assert_eq!(before.version(), "2024.1");
        assert_eq!(old.version(), "2024.1");
        assert_eq!(catalog.version().await, "2025.1");
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_current() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let catalog = FactorCatalog::new(FactorRegistry::builtin().unwrap());
        assert!(catalog.refresh_from_file(&path).await.is_err());
        assert_eq!(catalog.version().await, "2024.1");
    }
}
