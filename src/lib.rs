//! Offline, attenuable authorization tokens over a bounded Datalog core.
//!
//! An issuer builds a [`Token`] around a root signing key and an authority
//! block of facts, rules, and checks (`Builder`). Holders can attenuate it
//! further by appending additional blocks (`Token::create_block`,
//! `Token::append`) that can only narrow what the token authorizes, never
//! widen it — the attenuation guard in `block`/`solver` rejects any rule
//! output that forges authority. A verifier loads the bytes
//! (`Token::unmarshal`), checks the signature chain and symbol-table
//! disjointness (`Token::verify`), and runs the resulting [`Authorizer`]'s
//! five-step pipeline to accept or reject a request.
//!
//! ## Module map
//! - [`term`], [`symbol`], [`expr`] — the value model: `Term`, symbol
//!   interning, and the postfix expression stack machine.
//! - [`rule`], [`fact_set`], [`solver`], [`world`] — the Datalog core: rule
//!   matching, the deduplicated fact store, and the bounded saturation loop.
//! - [`block`] — a block's local symbol table, facts/rules/checks, and the
//!   attenuation guard.
//! - [`crypto`], [`wire`], [`token`], [`builder`] — the token chain: Ed25519
//!   chain-linkage, the hand-authored wire encoding, and the
//!   build/append/seal/verify state machine.
//! - [`authorizer`] — merges a verified token's blocks into one `World` and
//!   decides `Allow`/`Deny`.
//! - [`error`] — the crate-wide error taxonomy.

#![forbid(unsafe_code)]

pub mod authorizer;
pub mod block;
pub mod builder;
pub mod crypto;
pub mod error;
pub mod expr;
pub mod fact_set;
pub mod rule;
pub mod solver;
pub mod symbol;
pub mod term;
pub mod token;
pub mod wire;
pub mod world;

pub use authorizer::Authorizer;
pub use block::Block;
pub use builder::{BlockBuilder, Builder};
pub use error::{Result, WarrantError};
pub use rule::{Check, Policy, PolicyKind, Rule};
pub use symbol::SymbolTable;
pub use term::{Fact, Predicate, Term};
pub use token::Token;
pub use world::RunLimits;

/// Construct a [`Builder`] around a freshly-supplied root signing key
/// (`spec.md` §6: `new_builder(root_privkey) -> Builder`).
pub fn new_builder(root_privkey: ed25519_dalek::SigningKey) -> Builder {
    Builder::new(root_privkey)
}

/// Decode a token previously produced by [`Token::serialize`].
pub fn unmarshal(bytes: &[u8]) -> Result<Token> {
    Token::unmarshal(bytes)
}
