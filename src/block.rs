//! `Block`: a Datalog program unit plus its local symbol table and context.

use crate::error::AttenuationError;
use crate::rule::{Check, Rule};
use crate::symbol::{SymbolTable, AUTHORITY_SYMBOL};
use crate::term::{Fact, Term};

/// Predicate name reserved for query/check/policy heads. Not a real
/// predicate a fact could ever assert; `solver.rs` never looks it up in
/// the fact set.
pub const QUERY_SENTINEL_NAME: u64 = u64::MAX;

/// The schema version this implementation emits and the maximum version it
/// will load (`spec.md` §6, "Compatibility").
pub const CURRENT_VERSION: u32 = 1;

#[derive(Debug, Clone)]
pub struct Block {
    pub index: u32,
    pub symbols: SymbolTable,
    pub facts: Vec<Fact>,
    pub rules: Vec<Rule>,
    pub checks: Vec<Check>,
    pub context: String,
    pub version: u32,
}

impl Block {
    pub fn new(index: u32, symbols: SymbolTable) -> Self {
        Self {
            index,
            symbols,
            facts: Vec::new(),
            rules: Vec::new(),
            checks: Vec::new(),
            context: String::new(),
            version: CURRENT_VERSION,
        }
    }

    pub fn is_authority(&self) -> bool {
        self.index == 0
    }

    /// Reject direct facts/rules that reference the reserved authority
    /// marker symbol in a non-authority block (§4.5). Rule *outputs* that
    /// would forge authority facts are instead caught at solve time via
    /// `forbidden_ids` (§4.2 step 4); this check only covers facts and rule
    /// heads/bodies declared verbatim in the block.
    pub fn validate_attenuation(&self) -> Result<(), AttenuationError> {
        if self.is_authority() {
            return Ok(());
        }
        let authority_id = self.symbols.sym(AUTHORITY_SYMBOL);
        let Some(authority_id) = authority_id else {
            return Ok(());
        };
        let authority_term = Term::String(authority_id);
        for fact in &self.facts {
            if fact.predicate().terms.contains(&authority_term) {
                return Err(AttenuationError::AuthorityFactInAttenuationBlock(self.index));
            }
        }
        for rule in &self.rules {
            let touches_authority = rule.head.terms.contains(&authority_term)
                || rule.body.iter().any(|p| p.terms.contains(&authority_term));
            if touches_authority {
                return Err(AttenuationError::AuthorityRuleInAttenuationBlock(self.index));
            }
        }
        Ok(())
    }
}
