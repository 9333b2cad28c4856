//! Grammar registry
//!
//! Binds message name + version to a shared grammar. An explicit registry
//! instance is handed to the interchange parser; nothing here is global.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use crate::model::Edimap;
use crate::{Error, Result};

/// Concurrent name+version → grammar lookup table
///
/// Registration validates eagerly, so a grammar that made it into the
/// registry can no longer fail configuration checks at parse time. Lookups
/// hand out `Arc` clones; concurrent parses share one read-only grammar.
#[derive(Debug, Default)]
pub struct GrammarRegistry {
    grammars: DashMap<String, Arc<Edimap>>,
}

impl GrammarRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn key(name: &str, version: &str) -> String {
        format!("{name}:{version}")
    }

    /// Validate and register a grammar under its description's name + version
    pub fn register(&self, edimap: Edimap) -> Result<()> {
        edimap.validate()?;
        let key = Self::key(&edimap.description.name, &edimap.description.version);
        match self.grammars.entry(key.clone()) {
            Entry::Occupied(_) => Err(Error::DuplicateGrammar { key }),
            Entry::Vacant(slot) => {
                debug!(%key, "registered grammar");
                slot.insert(Arc::new(edimap));
                Ok(())
            }
        }
    }

    /// Look up a grammar, failing when none is registered
    pub fn resolve(&self, name: &str, version: &str) -> Result<Arc<Edimap>> {
        self.get(name, version).ok_or_else(|| {
            debug!(name, version, "grammar lookup miss");
            Error::UnknownMessageType {
                name: name.to_string(),
                version: version.to_string(),
            }
        })
    }

    /// Look up a grammar
    pub fn get(&self, name: &str, version: &str) -> Option<Arc<Edimap>> {
        self.grammars
            .get(&Self::key(name, version))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// True when a grammar is registered for this name + version
    pub fn contains(&self, name: &str, version: &str) -> bool {
        self.grammars.contains_key(&Self::key(name, version))
    }

    /// Number of registered grammars
    pub fn len(&self) -> usize {
        self.grammars.len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.grammars.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delimiters::Delimiters;
    use crate::model::{Description, Segment, SegmentGroup};

    fn orders_grammar(version: &str) -> Edimap {
        Edimap::new(
            Description::new("ORDERS", version),
            Delimiters::default(),
            SegmentGroup::new("order").segment(Segment::new("BGM", "header")),
        )
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = GrammarRegistry::new();
        registry.register(orders_grammar("D:03B")).unwrap();

        assert!(registry.contains("ORDERS", "D:03B"));
        let grammar = registry.resolve("ORDERS", "D:03B").unwrap();
        assert_eq!(grammar.description.name, "ORDERS");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_message_type_is_hard_error() {
        let registry = GrammarRegistry::new();
        let err = registry.resolve("INVOIC", "D:03B").unwrap_err();
        assert!(matches!(
            err,
            Error::UnknownMessageType { ref name, ref version }
                if name == "INVOIC" && version == "D:03B"
        ));
    }

    #[test]
    fn test_versions_resolve_independently() -> anyhow::Result<()> {
        let registry = GrammarRegistry::new();
        registry.register(orders_grammar("D:03B"))?;
        registry.register(orders_grammar("D:96A"))?;

        assert_eq!(registry.len(), 2);
        assert!(registry.resolve("ORDERS", "D:96A").is_ok());
        Ok(())
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = GrammarRegistry::new();
        registry.register(orders_grammar("D:03B")).unwrap();
        let err = registry.register(orders_grammar("D:03B")).unwrap_err();
        assert!(matches!(err, Error::DuplicateGrammar { .. }));
    }

    #[test]
    fn test_invalid_grammar_rejected_at_registration() {
        let registry = GrammarRegistry::new();
        let invalid = Edimap::new(
            Description::new("ORDERS", "D:03B"),
            Delimiters::default(),
            SegmentGroup::new("order")
                .segment(Segment::new("BGM", "a"))
                .segment(Segment::new("BGM", "b")),
        );
        assert!(registry.register(invalid).is_err());
        assert!(registry.is_empty());
    }
}
