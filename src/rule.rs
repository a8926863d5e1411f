//! `Rule`, `Check`, `Policy`, and the variable binding map used while
//! matching a rule body against a fact set.

use std::collections::{HashMap, HashSet};

use crate::error::EvalError;
use crate::expr::Expression;
use crate::term::{Predicate, Term};

/// Partial function `Variable -> Term` with conflict detection on insert.
/// Represented as a small association map; cloning (used when the solver
/// backtracks across body predicates) is shallow since `Term` itself is
/// cheap-ish to clone (its heaviest variant, `Bytes`, is already what the
/// caller owns).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchedVariables(HashMap<u32, Term>);

impl MatchedVariables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `v` to `t`. Succeeds if `v` is unbound, or already bound to a
    /// term equal to `t`; fails (returning `false`, no mutation) on a
    /// conflicting binding.
    pub fn insert(&mut self, v: u32, t: Term) -> bool {
        match self.0.get(&v) {
            None => {
                self.0.insert(v, t);
                true
            }
            Some(existing) => existing == &t,
        }
    }

    pub fn get(&self, v: u32) -> Option<&Term> {
        self.0.get(&v)
    }

    pub fn is_complete(&self, vars_needed: &HashSet<u32>) -> bool {
        vars_needed.iter().all(|v| self.0.contains_key(v))
    }

    pub fn as_map(&self) -> &HashMap<u32, Term> {
        &self.0
    }
}

/// `(head, body, expressions, forbidden_ids)`.
#[derive(Debug, Clone)]
pub struct Rule {
    pub head: Predicate,
    pub body: Vec<Predicate>,
    pub expressions: Vec<Expression>,
    /// Terms that, if they appear in a head solution, cause that solution
    /// to be silently dropped (§4.2 step 4, the attenuation guard). Empty
    /// for rules loaded from the authority block.
    pub forbidden_ids: HashSet<Term>,
}

impl Rule {
    pub fn new(head: Predicate, body: Vec<Predicate>, expressions: Vec<Expression>) -> Self {
        Self { head, body, expressions, forbidden_ids: HashSet::new() }
    }

    pub fn with_forbidden_ids(mut self, forbidden_ids: HashSet<Term>) -> Self {
        self.forbidden_ids = forbidden_ids;
        self
    }

    /// A rule is well-formed iff every variable in the head appears in at
    /// least one body predicate.
    pub fn validate(&self) -> Result<(), EvalError> {
        let body_vars = self.body_variables();
        for t in &self.head.terms {
            if let Term::Variable(v) = t {
                if !body_vars.contains(v) {
                    return Err(EvalError::InvalidRule(Term::Variable(*v)));
                }
            }
        }
        Ok(())
    }

    pub fn body_variables(&self) -> HashSet<u32> {
        let mut vars = HashSet::new();
        for p in &self.body {
            for t in &p.terms {
                if let Term::Variable(v) = t {
                    vars.insert(*v);
                }
            }
        }
        vars
    }

    /// The sentinel predicate name used for query heads (`query()`).
    pub fn is_query(&self) -> bool {
        self.head.name == crate::block::QUERY_SENTINEL_NAME && self.head.terms.is_empty()
    }
}

/// An ordered disjunction of queries (rules whose head is the sentinel
/// `query()`). Holds iff at least one query yields >= 1 solution.
#[derive(Debug, Clone)]
pub struct Check {
    pub queries: Vec<Rule>,
    /// A human-readable rendering kept for diagnostics (`FailedCheck`).
    pub source_text: Option<String>,
}

impl Check {
    pub fn new(queries: Vec<Rule>) -> Self {
        Self { queries, source_text: None }
    }

    pub fn with_source_text(mut self, text: impl Into<String>) -> Self {
        self.source_text = Some(text.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    Allow,
    Deny,
}

/// `(kind, queries)` with the same disjunction semantics as `Check`.
#[derive(Debug, Clone)]
pub struct Policy {
    pub kind: PolicyKind,
    pub queries: Vec<Rule>,
}

impl Policy {
    pub fn allow(queries: Vec<Rule>) -> Self {
        Self { kind: PolicyKind::Allow, queries }
    }

    pub fn deny(queries: Vec<Rule>) -> Self {
        Self { kind: PolicyKind::Deny, queries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matched_variables_detects_conflict() {
        let mut mv = MatchedVariables::new();
        assert!(mv.insert(0, Term::Integer(1)));
        assert!(mv.insert(0, Term::Integer(1)));
        assert!(!mv.insert(0, Term::Integer(2)));
    }

    #[test]
    fn ill_formed_rule_is_rejected() {
        let head = Predicate::new(0, vec![Term::Variable(0)]);
        let rule = Rule::new(head, vec![], vec![]);
        assert!(matches!(rule.validate(), Err(EvalError::InvalidRule(_))));
    }

    #[test]
    fn well_formed_rule_passes() {
        let head = Predicate::new(0, vec![Term::Variable(0)]);
        let body = vec![Predicate::new(1, vec![Term::Variable(0)])];
        let rule = Rule::new(head, body, vec![]);
        assert!(rule.validate().is_ok());
    }
}
