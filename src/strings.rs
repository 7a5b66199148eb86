//! Deduplicating string -> stable-ref registry.
//!
//! Grounded on `string_value_registry.cpp`: a map from string to a 32-bit id
//! generated by an injected labeller function, first insert allocates,
//! subsequent inserts of the same string return the prior id. Per spec.md §9
//! Open Question (c), we use an explicit `contains_key` check instead of
//! comparing against a stored "default" sentinel value, to avoid a collision
//! with a legitimate zero-valued label.

use std::collections::BTreeMap;

use crate::ids::StringRef;

/// Injected id-allocator, analogous to the original's `labeller_fn`.
pub trait Labeller {
    fn next_ref(&self) -> StringRef;
}

pub struct StringRegistry<L: Labeller> {
    labels: BTreeMap<String, StringRef>,
    labeller: L,
}

impl<L: Labeller> StringRegistry<L> {
    pub fn new(labeller: L) -> Self {
        Self {
            labels: BTreeMap::new(),
            labeller,
        }
    }

    /// Inserts `text`, returning its stable ref. Idempotent: repeated inserts
    /// of the same string always return the same ref.
    pub fn insert(&mut self, text: &str) -> StringRef {
        if let Some(existing) = self.labels.get(text) {
            return *existing;
        }
        let new_ref = self.labeller.next_ref();
        self.labels.insert(text.to_owned(), new_ref);
        new_ref
    }

    /// All `(string, ref)` pairs currently registered, in insertion-stable
    /// (lexicographic) order -- used when flushing string definitions to the
    /// archive at finalise.
    pub fn iter(&self) -> impl Iterator<Item = (&str, StringRef)> {
        self.labels.iter().map(|(s, r)| (s.as_str(), *r))
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
