//! `Authorizer`: merges every block's facts, rules, and checks into one
//! `World`, adds the caller's own ambient facts/rules/checks/policies, runs
//! the five-step pipeline of `spec.md` §4.7, and decides `Allow`/`Deny`.

use std::collections::HashSet;

use crate::block::Block;
use crate::error::{AuthorizationError, FailedCheck, Result, WarrantError};
use crate::rule::{Check, Policy, PolicyKind, Rule};
use crate::symbol::{SymbolTable, AUTHORITY_SYMBOL};
use crate::term::{Fact, Predicate, Term};
use crate::world::{RunLimits, World};

pub struct Authorizer {
    blocks: Vec<Block>,
    injected_facts: Vec<Fact>,
    injected_rules: Vec<Rule>,
    injected_checks: Vec<Check>,
    policies: Vec<Policy>,
}

impl Authorizer {
    pub(crate) fn new(blocks: Vec<Block>) -> Self {
        Self {
            blocks,
            injected_facts: Vec::new(),
            injected_rules: Vec::new(),
            injected_checks: Vec::new(),
            policies: Vec::new(),
        }
    }

    pub fn add_fact(&mut self, fact: Fact) -> &mut Self {
        self.injected_facts.push(fact);
        self
    }

    pub fn add_rule(&mut self, rule: Rule) -> &mut Self {
        self.injected_rules.push(rule);
        self
    }

    pub fn add_check(&mut self, check: Check) -> &mut Self {
        self.injected_checks.push(check);
        self
    }

    pub fn add_policy(&mut self, policy: Policy) -> &mut Self {
        self.policies.push(policy);
        self
    }

    /// Clear injected facts, rules, checks, and policies. The loaded token's
    /// blocks are retained.
    pub fn reset(&mut self) {
        self.injected_facts.clear();
        self.injected_rules.clear();
        self.injected_checks.clear();
        self.policies.clear();
    }

    /// Build the merged symbol table (every block's user-region symbols, in
    /// block order — blocks are disjoint by construction, `Token::verify`
    /// already checked it) and remap every block's facts/rules/checks into
    /// it. Returns `(merged_symbols, world, checks)`.
    fn build_world(&self) -> (SymbolTable, World, Vec<(u32, Check)>) {
        let mut merged = SymbolTable::new();
        for b in &self.blocks {
            merged.extend(&b.symbols);
        }

        let mut world = World::new(RunLimits::default());
        let mut checks = Vec::new();

        for b in &self.blocks {
            for f in &b.facts {
                world.facts.insert(remap_fact(f, &b.symbols, &mut merged));
            }
            for r in &b.rules {
                let remapped = remap_rule(r, &b.symbols, &mut merged);
                let remapped = if b.is_authority() {
                    remapped
                } else {
                    remapped.with_forbidden_ids(authority_guard(&merged))
                };
                world.rules.push(remapped);
            }
            for c in &b.checks {
                checks.push((b.index, remap_check(c, &b.symbols, &mut merged)));
            }
        }

        for f in &self.injected_facts {
            world.facts.insert(f.clone());
        }
        for r in &self.injected_rules {
            world.rules.push(r.clone());
        }
        for c in &self.injected_checks {
            checks.push((u32::MAX, c.clone()));
        }

        (merged, world, checks)
    }

    /// Single-shot evaluation of `rule` against the merged world (no
    /// mutation of the authorizer's state).
    pub fn query(&self, rule: &Rule) -> Result<Vec<Fact>> {
        let (symbols, mut world, _checks) = self.build_world();
        world.run(&symbols)?;
        Ok(world.query_rule(rule, &symbols)?)
    }

    /// Run the full pipeline of `spec.md` §4.7.
    pub fn authorize(&self) -> Result<()> {
        let (symbols, mut world, checks) = self.build_world();
        world.run(&symbols)?;

        let mut failed = Vec::new();
        for (block_index, check) in &checks {
            if !any_query_holds(&check.queries, &world, &symbols)? {
                tracing::warn!(block_index, "check failed");
                failed.push(FailedCheck {
                    block_index: *block_index,
                    rendering: check.source_text.clone().unwrap_or_else(|| "<check>".into()),
                });
            }
        }

        for policy in &self.policies {
            if any_query_holds(&policy.queries, &world, &symbols)? {
                return match policy.kind {
                    PolicyKind::Allow => {
                        if failed.is_empty() {
                            tracing::info!("authorize: allow");
                            Ok(())
                        } else {
                            tracing::info!(failed = failed.len(), "authorize: failed logic");
                            Err(WarrantError::Authorization(AuthorizationError::FailedLogic(failed)))
                        }
                    }
                    PolicyKind::Deny => {
                        tracing::info!("authorize: deny policy matched");
                        Err(WarrantError::Authorization(AuthorizationError::DenyPolicyMatched))
                    }
                };
            }
        }

        if !failed.is_empty() {
            tracing::info!(failed = failed.len(), "authorize: failed logic");
            return Err(WarrantError::Authorization(AuthorizationError::FailedLogic(failed)));
        }
        tracing::info!("authorize: no matching policy");
        Err(WarrantError::Authorization(AuthorizationError::NoMatchingPolicy))
    }

    /// Debug dump of the merged world's facts via `tracing`. Never executed
    /// on a hot path; intended for diagnostics only.
    pub fn print_world(&self) {
        let (symbols, mut world, _checks) = self.build_world();
        if world.run(&symbols).is_err() {
            tracing::warn!("print_world: saturation did not complete");
        }
        for fact in world.facts.iter() {
            tracing::debug!(predicate = ?fact.predicate(), "world fact");
        }
    }
}

fn authority_guard(merged: &SymbolTable) -> HashSet<Term> {
    let mut set = HashSet::new();
    if let Some(id) = merged.sym(AUTHORITY_SYMBOL) {
        set.insert(Term::String(id));
    }
    set
}

fn any_query_holds(queries: &[Rule], world: &World, symbols: &SymbolTable) -> Result<bool> {
    for q in queries {
        if !world.query_rule(q, symbols)?.is_empty() {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Remap a `Term::String`'s id from `local`'s numbering into `merged`'s.
/// Default-region ids (< `USER_SYMBOL_OFFSET`) are shared across every
/// table by construction and never need remapping.
fn remap_term(term: &Term, local: &SymbolTable, merged: &mut SymbolTable) -> Term {
    match term {
        Term::String(id) if *id >= crate::symbol::USER_SYMBOL_OFFSET => {
            let s = local.str(*id).unwrap_or("");
            Term::String(merged.insert(s))
        }
        Term::Set(set) => {
            let remapped: std::collections::BTreeSet<Term> =
                set.iter().map(|t| remap_term(t, local, merged)).collect();
            Term::Set(remapped)
        }
        other => other.clone(),
    }
}

fn remap_predicate(p: &Predicate, local: &SymbolTable, merged: &mut SymbolTable) -> Predicate {
    Predicate::new(p.name, p.terms.iter().map(|t| remap_term(t, local, merged)).collect())
}

fn remap_fact(f: &Fact, local: &SymbolTable, merged: &mut SymbolTable) -> Fact {
    let p = remap_predicate(f.predicate(), local, merged);
    Fact::new(p).expect("remapping preserves groundness")
}

fn remap_expression(
    e: &crate::expr::Expression,
    local: &SymbolTable,
    merged: &mut SymbolTable,
) -> crate::expr::Expression {
    use crate::expr::Op;
    let ops = e
        .ops()
        .iter()
        .map(|op| match op {
            Op::Value(t) => Op::Value(remap_term(t, local, merged)),
            other => other.clone(),
        })
        .collect();
    crate::expr::Expression::new(ops)
}

fn remap_rule(r: &Rule, local: &SymbolTable, merged: &mut SymbolTable) -> Rule {
    Rule::new(
        remap_predicate(&r.head, local, merged),
        r.body.iter().map(|p| remap_predicate(p, local, merged)).collect(),
        r.expressions.iter().map(|e| remap_expression(e, local, merged)).collect(),
    )
}

fn remap_check(c: &Check, local: &SymbolTable, merged: &mut SymbolTable) -> Check {
    let mut check = Check::new(c.queries.iter().map(|q| remap_rule(q, local, merged)).collect());
    check.source_text = c.source_text.clone();
    check
}
