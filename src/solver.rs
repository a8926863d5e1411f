//! The matching combinator: enumerates body matches against a [`FactSet`],
//! applies each rule's expressions, and instantiates head facts.
//!
//! This is naturally recursive on body length (§9 design notes): bodies are
//! always small, so explicit recursion bounded by `rule.body.len()` is
//! preferred over an iterative worklist. The outer saturation loop
//! (`world.rs`) is flat; only this per-rule matching step recurses.

use crate::error::EvalError;
use crate::fact_set::FactSet;
use crate::rule::{MatchedVariables, Rule};
use crate::symbol::SymbolTable;
use crate::term::{Fact, Predicate, Term};

/// Outcome of attempting to solve a single rule against the current fact
/// set. `NoMatch` is the "world-safe" signal of §4.2/§7: some body
/// predicate currently has no matching facts at all, so the rule
/// contributes nothing this iteration. It must never reach a public API —
/// the saturation loop absorbs it silently.
pub enum SolveOutcome {
    Solutions(Vec<Fact>),
    NoMatch,
}

/// Solve `rule` against `facts`, instantiating head facts for every
/// complete, expression-satisfying binding, minus any whose head
/// instantiation contains a forbidden id (the attenuation guard).
pub fn solve_rule(
    rule: &Rule,
    facts: &FactSet,
    symbols: &SymbolTable,
) -> Result<SolveOutcome, EvalError> {
    rule.validate()?;

    // Pre-index: a coarse, binding-independent filter on literal
    // (non-variable) positions. If any body predicate has no matching
    // fact at all, the whole conjunction is unsatisfiable this round.
    let mut candidates: Vec<Vec<&Fact>> = Vec::with_capacity(rule.body.len());
    for p in &rule.body {
        let matching: Vec<&Fact> =
            facts.iter().filter(|f| matches_nonvar_positions(p, f.predicate())).collect();
        if matching.is_empty() {
            return Ok(SolveOutcome::NoMatch);
        }
        candidates.push(matching);
    }

    let mut solutions = Vec::new();
    recurse(rule, &candidates, 0, MatchedVariables::new(), symbols, &mut solutions)?;

    if solutions.is_empty() {
        return Ok(SolveOutcome::NoMatch);
    }
    Ok(SolveOutcome::Solutions(solutions))
}

/// True iff `fact` could possibly unify with `predicate`: same name,
/// arity, and every non-variable position of `predicate` equal to the
/// fact's term at that position.
fn matches_nonvar_positions(predicate: &Predicate, fact: &Predicate) -> bool {
    if predicate.name != fact.name || predicate.terms.len() != fact.terms.len() {
        return false;
    }
    predicate
        .terms
        .iter()
        .zip(fact.terms.iter())
        .all(|(pt, ft)| matches!(pt, Term::Variable(_)) || pt == ft)
}

/// Extend `bindings` by unifying every variable position of `predicate`
/// with `fact`'s corresponding term. Returns `None` on a conflicting
/// binding (a variable already bound to a different term).
fn unify(predicate: &Predicate, fact: &Predicate, bindings: &MatchedVariables) -> Option<MatchedVariables> {
    let mut next = bindings.clone();
    for (pt, ft) in predicate.terms.iter().zip(fact.terms.iter()) {
        if let Term::Variable(v) = pt {
            if !next.insert(*v, ft.clone()) {
                return None;
            }
        }
    }
    Some(next)
}

fn recurse(
    rule: &Rule,
    candidates: &[Vec<&Fact>],
    idx: usize,
    bindings: MatchedVariables,
    symbols: &SymbolTable,
    solutions: &mut Vec<Fact>,
) -> Result<(), EvalError> {
    if idx == rule.body.len() {
        return emit(rule, &bindings, symbols, solutions);
    }
    for candidate in &candidates[idx] {
        if let Some(next) = unify(&rule.body[idx], candidate.predicate(), &bindings) {
            recurse(rule, candidates, idx + 1, next, symbols, solutions)?;
        }
    }
    Ok(())
}

/// A complete set of bindings has reached the end of the body: check
/// head-completeness, evaluate expressions, and instantiate the head.
///
/// Expression errors classified as "absence of evidence" (currently:
/// `TypeMismatch`) discard just this solution and let enumeration
/// continue; every other expression error is treated as a bug or a
/// runtime-defined failure (overflow, div-by-zero, a malformed regex, a
/// stack fault, or an expression referencing a variable the body never
/// bound) and propagates, aborting the run (`spec.md` §8 scenario 6).
fn emit(
    rule: &Rule,
    bindings: &MatchedVariables,
    symbols: &SymbolTable,
    solutions: &mut Vec<Fact>,
) -> Result<(), EvalError> {
    for expr in &rule.expressions {
        match expr.evaluate(bindings.as_map(), symbols) {
            Ok(Term::Bool(true)) => {}
            Ok(_) => return Ok(()),
            Err(EvalError::TypeMismatch { .. }) => return Ok(()),
            Err(e) => return Err(e),
        }
    }

    let mut terms = Vec::with_capacity(rule.head.terms.len());
    for t in &rule.head.terms {
        match t {
            Term::Variable(v) => {
                let bound = bindings.get(*v).cloned().ok_or(EvalError::MissingVariable(*v))?;
                terms.push(bound);
            }
            other => terms.push(other.clone()),
        }
    }

    if terms.iter().any(|t| rule.forbidden_ids.contains(t)) {
        return Ok(());
    }

    let predicate = Predicate::new(rule.head.name, terms);
    if let Some(fact) = Fact::new(predicate) {
        solutions.push(fact);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{BinaryKind, Expression, Op};
    use crate::term::Predicate;

    fn fact(name: u64, terms: Vec<Term>) -> Fact {
        Fact::new(Predicate::new(name, terms)).unwrap()
    }

    #[test]
    fn grandparent_transitive_closure() {
        const PARENT: u64 = 100;
        const GRANDPARENT: u64 = 101;
        let mut facts = FactSet::new();
        facts.insert(fact(PARENT, vec![Term::Integer(1), Term::Integer(2)]));
        facts.insert(fact(PARENT, vec![Term::Integer(2), Term::Integer(3)]));

        let rule = Rule::new(
            Predicate::new(GRANDPARENT, vec![Term::Variable(0), Term::Variable(2)]),
            vec![
                Predicate::new(PARENT, vec![Term::Variable(0), Term::Variable(1)]),
                Predicate::new(PARENT, vec![Term::Variable(1), Term::Variable(2)]),
            ],
            vec![],
        );

        let outcome = solve_rule(&rule, &facts, &SymbolTable::new()).unwrap();
        match outcome {
            SolveOutcome::Solutions(sols) => {
                assert_eq!(sols.len(), 1);
                assert_eq!(
                    sols[0].predicate().terms,
                    vec![Term::Integer(1), Term::Integer(3)]
                );
            }
            SolveOutcome::NoMatch => panic!("expected a solution"),
        }
    }

    #[test]
    fn no_matching_facts_is_world_safe() {
        let facts = FactSet::new();
        let rule = Rule::new(
            Predicate::new(1, vec![Term::Variable(0)]),
            vec![Predicate::new(2, vec![Term::Variable(0)])],
            vec![],
        );
        let outcome = solve_rule(&rule, &facts, &SymbolTable::new()).unwrap();
        assert!(matches!(outcome, SolveOutcome::NoMatch));
    }

    #[test]
    fn division_by_zero_propagates() {
        let mut facts = FactSet::new();
        facts.insert(fact(1, vec![Term::Integer(5)]));
        let rule = Rule::new(
            Predicate::new(2, vec![Term::Variable(0)]),
            vec![Predicate::new(1, vec![Term::Variable(0)])],
            vec![Expression::new(vec![
                Op::Value(Term::Variable(0)),
                Op::Value(Term::Integer(0)),
                Op::BinaryOp(BinaryKind::Div),
                Op::Value(Term::Integer(0)),
                Op::BinaryOp(BinaryKind::Equal),
            ])],
        );
        let err = solve_rule(&rule, &facts, &SymbolTable::new()).unwrap_err();
        assert_eq!(err, EvalError::DivByZero);
    }

    #[test]
    fn forbidden_id_drops_solution() {
        let mut facts = FactSet::new();
        facts.insert(fact(1, vec![Term::Integer(1)]));
        let mut forbidden = std::collections::HashSet::new();
        forbidden.insert(Term::Integer(1));
        let rule = Rule::new(
            Predicate::new(2, vec![Term::Variable(0)]),
            vec![Predicate::new(1, vec![Term::Variable(0)])],
            vec![],
        )
        .with_forbidden_ids(forbidden);
        let outcome = solve_rule(&rule, &facts, &SymbolTable::new()).unwrap();
        assert!(matches!(outcome, SolveOutcome::NoMatch));
    }
}
