//! Deduplicated, insertion-ordered container of [`Fact`]s.
//!
//! `Insert` is a linear scan (expected small `n` per §3.5); a `HashSet`
//! would lose the deterministic enumeration order the solver relies on for
//! P4 (determinism), so this stays a `Vec` with an equality-based contains
//! check rather than swapping in a hash-based set.

use crate::term::Fact;

#[derive(Debug, Clone, Default)]
pub struct FactSet {
    facts: Vec<Fact>,
}

impl FactSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `fact` if not already present. Returns `true` if it was new.
    pub fn insert(&mut self, fact: Fact) -> bool {
        if self.facts.contains(&fact) {
            false
        } else {
            self.facts.push(fact);
            true
        }
    }

    /// Fold `insert` over `facts`, returning the number of facts that were
    /// actually new.
    pub fn insert_all(&mut self, facts: impl IntoIterator<Item = Fact>) -> usize {
        facts.into_iter().filter(|f| self.insert(f.clone())).count()
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fact> {
        self.facts.iter()
    }
}
