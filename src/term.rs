//! The `Term` value model and `Predicate`/`Fact` built on top of it.
//!
//! # Invariants
//! - A `Term::Set` contains only non-variable, non-`Set` elements, and every
//!   element shares a single variant. Empty sets are disallowed (they
//!   cannot be typed). These invariants are enforced by [`Term::new_set`]
//!   and re-checked at the wire boundary (`wire.rs`) since a decoded set
//!   did not pass through the constructor.
//! - `Term::Variable` may appear in rule heads, rule bodies, and
//!   expressions, but never inside a [`Fact`] — `Fact::new` rejects it.
//!
//! Two terms are equal iff their variant and payload are equal; set
//! equality is unordered (`BTreeSet` equality already ignores insertion
//! order, so this falls out of the representation).
//!
//! # Canonical order
//! `Term` is `Ord` so that it can live inside a `BTreeSet` (for `Set`) and
//! so that wire encoding has one reproducible byte layout (`spec.md` §9's
//! first open question: sort by `(variant tag, encoded bytes)` ascending).

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::error::FormatError;

/// A closed-variant Datalog value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    Variable(u32),
    Integer(i64),
    String(u64),
    Date(u64),
    Bytes(Vec<u8>),
    Bool(bool),
    Set(BTreeSet<Term>),
}

/// Stable discriminant used for canonical ordering and wire tags. The
/// numeric values are part of the wire format (`TermMsg`'s tagged union)
/// and must not be reassigned once published.
fn variant_tag(t: &Term) -> u8 {
    match t {
        Term::Variable(_) => 0,
        Term::Integer(_) => 1,
        Term::String(_) => 2,
        Term::Date(_) => 3,
        Term::Bytes(_) => 4,
        Term::Bool(_) => 5,
        Term::Set(_) => 6,
    }
}

impl PartialOrd for Term {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Term {
    fn cmp(&self, other: &Self) -> Ordering {
        variant_tag(self).cmp(&variant_tag(other)).then_with(|| match (self, other) {
            (Term::Variable(a), Term::Variable(b)) => a.cmp(b),
            (Term::Integer(a), Term::Integer(b)) => a.cmp(b),
            (Term::String(a), Term::String(b)) => a.cmp(b),
            (Term::Date(a), Term::Date(b)) => a.cmp(b),
            (Term::Bytes(a), Term::Bytes(b)) => a.cmp(b),
            (Term::Bool(a), Term::Bool(b)) => a.cmp(b),
            (Term::Set(a), Term::Set(b)) => a.iter().cmp(b.iter()),
            _ => unreachable!("variant_tag ordering guarantees matching variants here"),
        })
    }
}

impl Term {
    /// The type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Term::Variable(_) => "Variable",
            Term::Integer(_) => "Integer",
            Term::String(_) => "String",
            Term::Date(_) => "Date",
            Term::Bytes(_) => "Bytes",
            Term::Bool(_) => "Bool",
            Term::Set(_) => "Set",
        }
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, Term::Variable(_))
    }

    /// Build a `Set` term, enforcing the non-empty / single-variant /
    /// non-`Set`-non-`Variable`-element invariants.
    pub fn new_set(elements: impl IntoIterator<Item = Term>) -> Result<Term, FormatError> {
        let set: BTreeSet<Term> = elements.into_iter().collect();
        validate_set(&set)?;
        Ok(Term::Set(set))
    }
}

pub(crate) fn validate_set(set: &BTreeSet<Term>) -> Result<(), FormatError> {
    if set.is_empty() {
        return Err(FormatError::EmptySet);
    }
    let mut tag = None;
    for el in set {
        match el {
            Term::Set(_) | Term::Variable(_) => return Err(FormatError::InvalidSetElement),
            _ => {}
        }
        let t = variant_tag(el);
        match tag {
            None => tag = Some(t),
            Some(prev) if prev != t => return Err(FormatError::MixedTypeSet),
            _ => {}
        }
    }
    Ok(())
}

/// `(name, ordered terms)`. A `Predicate` is a `Fact` iff none of its terms
/// is a `Variable`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Predicate {
    pub name: u64,
    pub terms: Vec<Term>,
}

impl Predicate {
    pub fn new(name: u64, terms: Vec<Term>) -> Self {
        Self { name, terms }
    }

    pub fn is_ground(&self) -> bool {
        self.terms.iter().all(|t| !t.is_variable())
    }

    pub fn arity(&self) -> usize {
        self.terms.len()
    }
}

/// A ground `Predicate` — no `Variable` among its terms.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fact(Predicate);

impl Fact {
    /// Wrap a ground predicate as a `Fact`. Returns `None` if it contains a
    /// `Variable` anywhere (the spec's "never inside a Fact" invariant).
    pub fn new(predicate: Predicate) -> Option<Fact> {
        if predicate.is_ground() {
            Some(Fact(predicate))
        } else {
            None
        }
    }

    pub fn predicate(&self) -> &Predicate {
        &self.0
    }

    pub fn into_predicate(self) -> Predicate {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_rejected() {
        assert!(matches!(Term::new_set(vec![]), Err(FormatError::EmptySet)));
    }

    #[test]
    fn mixed_type_set_rejected() {
        let res = Term::new_set(vec![Term::Integer(1), Term::Bool(true)]);
        assert!(matches!(res, Err(FormatError::MixedTypeSet)));
    }

    #[test]
    fn nested_set_rejected() {
        let inner = Term::new_set(vec![Term::Integer(1)]).unwrap();
        let res = Term::new_set(vec![inner]);
        assert!(matches!(res, Err(FormatError::InvalidSetElement)));
    }

    #[test]
    fn set_equality_is_unordered() {
        let a = Term::new_set(vec![Term::Integer(1), Term::Integer(2)]).unwrap();
        let b = Term::new_set(vec![Term::Integer(2), Term::Integer(1)]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn fact_rejects_variables() {
        let p = Predicate::new(0, vec![Term::Variable(0)]);
        assert!(Fact::new(p).is_none());
    }

    #[test]
    fn canonical_order_is_total_and_stable() {
        let mut v = vec![
            Term::Bool(true),
            Term::Integer(5),
            Term::Variable(1),
            Term::Integer(-1),
        ];
        v.sort();
        assert_eq!(
            v,
            vec![
                Term::Variable(1),
                Term::Integer(-1),
                Term::Integer(5),
                Term::Bool(true),
            ]
        );
    }
}
