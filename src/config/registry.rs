//! Filter registry: maps configuration type names to constructors.

use crate::error::{EngineError, Result};
use crate::filter::{Filter, FilterPlugin};
use crate::filters::{FileSink, FileSource, Passthrough, SignalSource};

/// Metadata for a filter type, including its factory function.
#[derive(Clone)]
pub struct FilterKindInfo {
    pub type_name: &'static str,
    pub description: &'static str,
    pub factory: fn() -> Box<dyn FilterPlugin>,
}

impl std::fmt::Debug for FilterKindInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterKindInfo")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FilterRegistry {
    kinds: Vec<FilterKindInfo>,
}

impl FilterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every filter in [`crate::filters`].
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(FilterKindInfo {
            type_name: SignalSource::TYPE_NAME,
            description: "Synthetic cosine samples",
            factory: || Box::new(SignalSource::new()),
        });
        registry.register(FilterKindInfo {
            type_name: Passthrough::TYPE_NAME,
            description: "Forwards each source to the matching sink",
            factory: || Box::new(Passthrough::new()),
        });
        registry.register(FilterKindInfo {
            type_name: FileSink::TYPE_NAME,
            description: "Records queues to disk",
            factory: || Box::new(FileSink::new()),
        });
        registry.register(FilterKindInfo {
            type_name: FileSource::TYPE_NAME,
            description: "Replays a recorded queue",
            factory: || Box::new(FileSource::new()),
        });
        registry
    }

    /// Add or replace the entry for `info.type_name`.
    pub fn register(&mut self, info: FilterKindInfo) {
        match self.kinds.iter_mut().find(|k| k.type_name == info.type_name) {
            Some(existing) => *existing = info,
            None => self.kinds.push(info),
        }
    }

    pub fn get(&self, type_name: &str) -> Option<&FilterKindInfo> {
        self.kinds.iter().find(|k| k.type_name == type_name)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.kinds.iter().map(|k| k.type_name)
    }

    /// Construct a `Closed` filter of `type_name` called `name`.
    pub fn create(&self, type_name: &str, name: impl Into<String>) -> Result<Filter> {
        let info = self
            .get(type_name)
            .ok_or_else(|| EngineError::Config(format!("Unknown filter type '{}'", type_name)))?;
        Ok(Filter::from_boxed(name, (info.factory)())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterState;

    #[test]
    fn test_builtins_are_registered() {
        let registry = FilterRegistry::with_builtins();
        let names: Vec<_> = registry.type_names().collect();
        assert_eq!(
            names,
            vec!["SignalSource", "Passthrough", "FileSink", "FileSource"]
        );
    }

    #[test]
    fn test_create_by_type_name() {
        let registry = FilterRegistry::with_builtins();
        let filter = registry.create("FileSink", "rec").unwrap();
        assert_eq!(filter.name(), "rec");
        assert_eq!(filter.type_name(), "FileSink");
        assert_eq!(filter.state(), FilterState::Closed);

        assert!(matches!(
            registry.create("Nope", "x"),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn test_register_replaces_existing() {
        let mut registry = FilterRegistry::with_builtins();
        registry.register(FilterKindInfo {
            type_name: "FileSink",
            description: "replacement",
            factory: || Box::new(Passthrough::new()),
        });
        assert_eq!(registry.type_names().count(), 4);
        assert_eq!(registry.get("FileSink").unwrap().description, "replacement");
    }
}
