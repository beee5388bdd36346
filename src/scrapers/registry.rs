use crate::models::Source;
use crate::scrapers::cards::CardAdapter;
use crate::scrapers::traits::SourceAdapter;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;

/// Lookup table from source to the adapter that scrapes it
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    adapters: HashMap<Source, Arc<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a [`CardAdapter`] for every source that has a selector table
    pub fn with_builtin_adapters() -> Result<Self> {
        let mut registry = Self::new();
        for source in Source::ALL {
            if let Some(adapter) = CardAdapter::for_source(source)? {
                registry.register(Arc::new(adapter));
            }
        }
        Ok(registry)
    }

    /// Add or replace the adapter for `adapter.source()`
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.insert(adapter.source(), adapter);
    }

    /// Adapter for a config portal name, if the name is known and registered
    pub fn get(&self, source_name: &str) -> Option<Arc<dyn SourceAdapter>> {
        let source: Source = source_name.parse().ok()?;
        self.adapters.get(&source).cloned()
    }

    pub fn sources(&self) -> Vec<Source> {
        let mut sources: Vec<Source> = self.adapters.keys().copied().collect();
        sources.sort();
        sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_covers_selector_tables() {
        let registry = AdapterRegistry::with_builtin_adapters().unwrap();
        assert_eq!(
            registry.sources(),
            vec![Source::Olx, Source::Otodom, Source::Morizon, Source::Trojmiasto]
        );
        assert!(registry.get("OLX").is_some());
        assert!(registry.get("gratka").is_none());
        assert!(registry.get("zillow").is_none());
    }
}
