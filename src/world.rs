//! `World`: a rule set, a fact set, and the bounded saturation loop that
//! drives them to a fixed point.

use std::time::{Duration, Instant};

use crate::error::{EvalError, SaturationError};
use crate::fact_set::FactSet;
use crate::rule::Rule;
use crate::solver::{solve_rule, SolveOutcome};
use crate::symbol::SymbolTable;
use crate::term::{Fact, Predicate, Term};

/// Everything that can abort a `World::run`: either a saturation limit, or
/// a hard expression-evaluation error that propagated out of the solver
/// (§7: errors indicating programmer error or state corruption, as opposed
/// to "absence of evidence", are never absorbed).
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum WorldError {
    #[error(transparent)]
    Saturation(#[from] SaturationError),
    #[error(transparent)]
    Eval(#[from] EvalError),
}

/// Limits bounding a single `World::run`. Defaults match `spec.md` §3.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLimits {
    pub max_facts: usize,
    pub max_iterations: usize,
    pub max_duration: Duration,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            max_facts: 1000,
            max_iterations: 100,
            max_duration: Duration::from_millis(2),
        }
    }
}

impl RunLimits {
    /// A generously-bounded set of limits for tests that deliberately
    /// build larger-than-default fact sets. Test-only by convention, not by
    /// compiler enforcement: production callers should rely on `Default`,
    /// which enforces the spec's bounded-compute guarantee.
    pub fn unbounded_for_tests() -> Self {
        Self {
            max_facts: 1_000_000,
            max_iterations: 10_000,
            max_duration: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct World {
    pub facts: FactSet,
    pub rules: Vec<Rule>,
    pub limits: RunLimits,
}

impl World {
    pub fn new(limits: RunLimits) -> Self {
        Self { facts: FactSet::new(), rules: Vec::new(), limits }
    }

    /// Run every rule to a fixed point, absorbing world-safe ("no match")
    /// outcomes and propagating everything else.
    pub fn run(&mut self, symbols: &SymbolTable) -> Result<(), WorldError> {
        let deadline = Instant::now() + self.limits.max_duration;

        for iter in 0..self.limits.max_iterations {
            let _span = tracing::debug_span!("saturation_iteration", iter).entered();
            if Instant::now() >= deadline {
                return Err(SaturationError::Timeout.into());
            }

            let before = self.facts.len();
            let mut added = 0;
            for rule in &self.rules {
                if Instant::now() >= deadline {
                    return Err(SaturationError::Timeout.into());
                }
                match solve_rule(rule, &self.facts, symbols) {
                    Ok(SolveOutcome::Solutions(facts)) => {
                        for fact in facts {
                            if self.facts.insert(fact) {
                                added += 1;
                            }
                            if self.facts.len() >= self.limits.max_facts {
                                return Err(SaturationError::MaxFacts.into());
                            }
                        }
                    }
                    Ok(SolveOutcome::NoMatch) => {}
                    Err(e) => return Err(e.into()),
                }
            }

            let after = self.facts.len();
            tracing::trace!(iter, before, after, added, "saturation iteration applied");

            if after == before {
                return Ok(());
            }
        }
        Err(SaturationError::MaxIterations.into())
    }

    /// Return facts matching `predicate` (exact arity, exact match on
    /// non-variable positions), without running the saturation loop.
    pub fn query(&self, predicate: &Predicate) -> Vec<Fact> {
        self.facts
            .iter()
            .filter(|f| {
                let fp = f.predicate();
                fp.name == predicate.name
                    && fp.terms.len() == predicate.terms.len()
                    && fp
                        .terms
                        .iter()
                        .zip(predicate.terms.iter())
                        .all(|(ft, pt)| matches!(pt, Term::Variable(_)) || ft == pt)
            })
            .cloned()
            .collect()
    }

    /// Single-shot solve of `rule` against the current fact set, without
    /// mutating it or running the saturation loop.
    pub fn query_rule(
        &self,
        rule: &Rule,
        symbols: &SymbolTable,
    ) -> Result<Vec<Fact>, crate::error::EvalError> {
        match solve_rule(rule, &self.facts, symbols)? {
            SolveOutcome::Solutions(facts) => Ok(facts),
            SolveOutcome::NoMatch => Ok(Vec::new()),
        }
    }
}
