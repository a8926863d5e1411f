//! `Builder` (issuer-side: accumulates the authority block) and
//! `BlockBuilder` (holder-side: accumulates an attenuation block scoped to
//! its own fresh, disjoint symbol table).

use ed25519_dalek::SigningKey;
use rand_core::{CryptoRng, RngCore};

use crate::block::Block;
use crate::rule::{Check, Rule};
use crate::symbol::SymbolTable;
use crate::term::{Fact, Term};
use crate::token::Token;

/// Accumulates the authority block (index 0) around the issuer's root
/// private key. `build()` consumes it and signs the result.
pub struct Builder {
    root: SigningKey,
    block: Block,
}

impl Builder {
    pub fn new(root: SigningKey) -> Self {
        Self { root, block: Block::new(0, SymbolTable::new()) }
    }

    /// Intern `s` into this block's own symbol table, returning the
    /// `Term::String` to use in facts/rules added to this builder. Callers
    /// must intern through this method (rather than a table of their own)
    /// so that ids line up with the block's table once it's merged by the
    /// authorizer.
    pub fn intern(&mut self, s: &str) -> Term {
        Term::String(self.block.symbols.insert(s))
    }

    pub fn add_authority_fact(&mut self, fact: Fact) -> &mut Self {
        self.block.facts.push(fact);
        self
    }

    pub fn add_authority_rule(&mut self, rule: Rule) -> &mut Self {
        self.block.rules.push(rule);
        self
    }

    pub fn add_authority_check(&mut self, check: Check) -> &mut Self {
        self.block.checks.push(check);
        self
    }

    pub fn set_context(&mut self, context: impl Into<String>) -> &mut Self {
        self.block.context = context.into();
        self
    }

    /// Finalize: sign the authority block and produce a one-block `Token`.
    pub fn build<R: RngCore + CryptoRng>(self, rng: &mut R) -> crate::error::Result<Token> {
        Token::build(self.root, self.block, rng)
    }
}

/// Accumulates a new, non-authority block. Its symbol table is always
/// freshly created and therefore disjoint from every block already present
/// in the token it will be appended to (`Token::create_block` is the only
/// constructor).
pub struct BlockBuilder {
    block: Block,
}

impl BlockBuilder {
    pub(crate) fn new(index: u32) -> Self {
        Self { block: Block::new(index, SymbolTable::new()) }
    }

    /// Intern `s` into this block's own symbol table; see `Builder::intern`.
    pub fn intern(&mut self, s: &str) -> Term {
        Term::String(self.block.symbols.insert(s))
    }

    pub fn add_fact(&mut self, fact: Fact) -> &mut Self {
        self.block.facts.push(fact);
        self
    }

    pub fn add_rule(&mut self, rule: Rule) -> &mut Self {
        self.block.rules.push(rule);
        self
    }

    pub fn add_check(&mut self, check: Check) -> &mut Self {
        self.block.checks.push(check);
        self
    }

    pub fn set_context(&mut self, context: impl Into<String>) -> &mut Self {
        self.block.context = context.into();
        self
    }

    pub(crate) fn into_block(self) -> Block {
        self.block
    }
}
