//! Crate-wide error taxonomy.
//!
//! Each fallible subsystem gets its own `thiserror` enum; this module
//! composes them into [`WarrantError`], the error type returned by the
//! public API surface (`Builder`, `Token`, `Authorizer`). Internal signals
//! that are absorbed before ever reaching a caller — the "world-safe"
//! no-match case described for the solver — are not represented here at
//! all; see `solver.rs`.

use std::fmt;

use crate::term::Term;

/// Format / wire-level failures: unmarshal, version gating, set discipline.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("failed to decode token container: {0}")]
    Decode(String),
    #[error("block version {found} exceeds supported maximum {max}")]
    VersionTooHigh { found: u32, max: u32 },
    #[error("unknown term variant tag {0}")]
    UnknownVariant(u32),
    #[error("set term is empty; empty sets cannot be typed")]
    EmptySet,
    #[error("set term mixes element types")]
    MixedTypeSet,
    #[error("set term contains a nested Set or a Variable")]
    InvalidSetElement,
    #[error("symbol id {0} has no entry in the merged symbol table")]
    InvalidSymbolId(u64),
}

/// Cryptographic chain-linkage failures.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("signature envelope failed to verify against the root public key")]
    InvalidSignature,
    #[error("cannot append a block to a sealed token")]
    SealedTokenAppend,
    #[error("root key mismatch")]
    RootKeyMismatch,
    #[error("this token's append secret is not available (it was unmarshalled from bytes, which never carry private key material)")]
    AppendKeyUnavailable,
}

/// Attenuation-guard violations detected while loading a block.
#[derive(Debug, thiserror::Error)]
pub enum AttenuationError {
    #[error("block {0} is not the authority block but declares an authority fact")]
    AuthorityFactInAttenuationBlock(u32),
    #[error("block {0} is not the authority block but declares an authority rule")]
    AuthorityRuleInAttenuationBlock(u32),
}

/// Datalog evaluation failures that indicate a bug or state corruption
/// rather than mere absence of evidence (those are absorbed, see `solver.rs`).
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum EvalError {
    #[error("expression type error: {op} does not accept operand(s) of the given type(s)")]
    TypeMismatch { op: &'static str },
    #[error("integer overflow while evaluating {op}")]
    IntegerOverflow { op: &'static str },
    #[error("division by zero")]
    DivByZero,
    #[error("failed to compile regular expression: {0}")]
    RegexCompile(String),
    #[error("expression references unbound variable {0}")]
    MissingVariable(u32),
    #[error("expression evaluation stack overflowed (limit {limit})")]
    StackOverflow { limit: usize },
    #[error("expression evaluation left {0} values on the stack, expected exactly 1")]
    InvalidResultStack(usize),
    #[error("rule head uses variable {0:?} not bound by any body predicate")]
    InvalidRule(Term),
}

/// Saturation-limit failures from `World::run`.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum SaturationError {
    #[error("fact set exceeded max_facts before reaching a fixed point")]
    MaxFacts,
    #[error("saturation did not reach a fixed point within max_iterations")]
    MaxIterations,
    #[error("saturation exceeded its max_duration deadline")]
    Timeout,
}

/// A single failed `Check`, identified by its originating block.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedCheck {
    pub block_index: u32,
    pub rendering: String,
}

impl fmt::Display for FailedCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block {}: {}", self.block_index, self.rendering)
    }
}

/// Outcome failures from `Authorizer::authorize`.
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum AuthorizationError {
    #[error("{} check(s) failed: {}", .0.len(), render_failed_checks(.0))]
    FailedLogic(Vec<FailedCheck>),
    #[error("no policy matched")]
    NoMatchingPolicy,
    #[error("a deny policy matched")]
    DenyPolicyMatched,
}

fn render_failed_checks(checks: &[FailedCheck]) -> String {
    checks
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Top-level error returned by the public API.
#[derive(Debug, thiserror::Error)]
pub enum WarrantError {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Attenuation(#[from] AttenuationError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error(transparent)]
    Saturation(#[from] SaturationError),
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),
}

pub type Result<T> = std::result::Result<T, WarrantError>;

impl From<crate::world::WorldError> for WarrantError {
    fn from(e: crate::world::WorldError) -> Self {
        match e {
            crate::world::WorldError::Saturation(s) => WarrantError::Saturation(s),
            crate::world::WorldError::Eval(e) => WarrantError::Eval(e),
        }
    }
}
