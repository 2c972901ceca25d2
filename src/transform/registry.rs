//! Annotation interning for one transformation pass.

use std::collections::BTreeMap;
use std::sync::Arc;

use hashbrown::HashMap;

use crate::model::{Annotation, AnnotationId};

/// Deduplicates annotations by content hash.
///
/// Every node carrying the same `(key, value)` pair shares one
/// `Arc<Annotation>`. Lives for exactly one pass; nothing is evicted.
#[derive(Debug, Default)]
pub struct AnnotationRegistry {
    entries: HashMap<AnnotationId, Arc<Annotation>>,
}

impl AnnotationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the registered annotation for `(key, value)`, creating it on
    /// first sight.
    pub fn intern(&mut self, key: &str, value: &str) -> Arc<Annotation> {
        let id = AnnotationId::of(key, value);
        if let Some(existing) = self.entries.get(&id) {
            return existing.clone();
        }
        let annotation = Arc::new(Annotation {
            id: id.clone(),
            key: key.to_string(),
            value: value.to_string(),
        });
        self.entries.insert(id, annotation.clone());
        annotation
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hand the interned set over, ordered by id.
    pub fn into_map(self) -> BTreeMap<AnnotationId, Arc<Annotation>> {
        self.entries.into_iter().collect()
    }
}
