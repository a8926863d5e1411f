//! Wire format: hand-authored `prost::Message`/`prost::Oneof` structs
//! mirroring `spec.md` §6's `BlockMessage`/`TermMsg`/etc., plus the bridge
//! functions converting them to/from the core in-memory types.
//!
//! No `.proto` file and no `prost-build` invocation: these structs *are*
//! the schema, written directly against `prost::Message`/`prost::Oneof`.
//! Decoding re-validates everything the in-memory constructors would have
//! caught on the happy path (set discipline, variable-free facts) since a
//! decoded value never passed through those constructors.

use std::collections::BTreeSet;

use prost::{Message, Oneof};

use crate::error::FormatError;
use crate::expr::{BinaryKind, Expression, Op, UnaryKind};
use crate::rule::{Check, Rule};
use crate::symbol::SymbolTable;
use crate::term::{Fact, Predicate, Term};

/// The highest `BlockMessage.version` this implementation will unmarshal.
pub const MAX_SCHEMA_VERSION: u32 = crate::block::CURRENT_VERSION;

#[derive(Clone, PartialEq, Message)]
pub struct TermMsg {
    #[prost(oneof = "TermVariant", tags = "1,2,3,4,5,6,7")]
    pub variant: Option<TermVariant>,
}

#[derive(Clone, PartialEq, Oneof)]
pub enum TermVariant {
    #[prost(uint32, tag = "1")]
    Variable(u32),
    #[prost(int64, tag = "2")]
    Integer(i64),
    #[prost(uint64, tag = "3")]
    String(u64),
    #[prost(uint64, tag = "4")]
    Date(u64),
    #[prost(bytes, tag = "5")]
    Bytes(Vec<u8>),
    #[prost(bool, tag = "6")]
    Bool(bool),
    #[prost(message, tag = "7")]
    Set(SetMsg),
}

#[derive(Clone, PartialEq, Message)]
pub struct SetMsg {
    #[prost(message, repeated, tag = "1")]
    pub elements: Vec<TermMsg>,
}

#[derive(Clone, PartialEq, Message)]
pub struct PredicateMsg {
    #[prost(uint64, tag = "1")]
    pub name: u64,
    #[prost(message, repeated, tag = "2")]
    pub terms: Vec<TermMsg>,
}

#[derive(Clone, PartialEq, Message)]
pub struct FactMsg {
    #[prost(message, optional, tag = "1")]
    pub predicate: Option<PredicateMsg>,
}

#[derive(Clone, PartialEq, Message)]
pub struct OpMsg {
    #[prost(oneof = "OpVariant", tags = "1,2,3")]
    pub variant: Option<OpVariant>,
}

#[derive(Clone, PartialEq, Oneof)]
pub enum OpVariant {
    #[prost(message, tag = "1")]
    Value(TermMsg),
    #[prost(uint32, tag = "2")]
    Unary(u32),
    #[prost(uint32, tag = "3")]
    Binary(u32),
}

#[derive(Clone, PartialEq, Message)]
pub struct ExpressionMsg {
    #[prost(message, repeated, tag = "1")]
    pub ops: Vec<OpMsg>,
}

#[derive(Clone, PartialEq, Message)]
pub struct RuleMsg {
    #[prost(message, optional, tag = "1")]
    pub head: Option<PredicateMsg>,
    #[prost(message, repeated, tag = "2")]
    pub body: Vec<PredicateMsg>,
    #[prost(message, repeated, tag = "3")]
    pub expressions: Vec<ExpressionMsg>,
}

#[derive(Clone, PartialEq, Message)]
pub struct CheckMsg {
    #[prost(message, repeated, tag = "1")]
    pub queries: Vec<RuleMsg>,
    #[prost(string, optional, tag = "2")]
    pub source_text: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct BlockMessage {
    #[prost(uint32, tag = "1")]
    pub index: u32,
    #[prost(string, repeated, tag = "2")]
    pub symbols: Vec<String>,
    #[prost(uint32, tag = "3")]
    pub version: u32,
    #[prost(string, tag = "4")]
    pub context: String,
    #[prost(message, repeated, tag = "5")]
    pub facts: Vec<FactMsg>,
    #[prost(message, repeated, tag = "6")]
    pub rules: Vec<RuleMsg>,
    #[prost(message, repeated, tag = "7")]
    pub checks: Vec<CheckMsg>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SignedMsg {
    #[prost(bytes, repeated, tag = "1")]
    pub next_keys: Vec<Vec<u8>>,
    #[prost(bytes, repeated, tag = "2")]
    pub signatures: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SealedMsg {
    #[prost(bytes, tag = "1")]
    pub mac_key: Vec<u8>,
    #[prost(bytes, tag = "2")]
    pub mac: Vec<u8>,
}

#[derive(Clone, PartialEq, Oneof)]
pub enum EnvelopeVariant {
    #[prost(message, tag = "1")]
    Signed(SignedMsg),
    #[prost(message, tag = "2")]
    Sealed(SealedMsg),
}

#[derive(Clone, PartialEq, Message)]
pub struct TokenMessage {
    #[prost(uint32, optional, tag = "1")]
    pub root_key_id: Option<u32>,
    #[prost(bytes, repeated, tag = "2")]
    pub blocks: Vec<Vec<u8>>,
    #[prost(oneof = "EnvelopeVariant", tags = "3,4")]
    pub envelope: Option<EnvelopeVariant>,
}

// --- bridge: Term <-> TermMsg ---------------------------------------------

fn unary_tag(k: UnaryKind) -> u32 {
    match k {
        UnaryKind::Negate => 0,
        UnaryKind::Parens => 1,
        UnaryKind::Length => 2,
    }
}

fn unary_from_tag(tag: u32) -> Result<UnaryKind, FormatError> {
    match tag {
        0 => Ok(UnaryKind::Negate),
        1 => Ok(UnaryKind::Parens),
        2 => Ok(UnaryKind::Length),
        other => Err(FormatError::UnknownVariant(other)),
    }
}

fn binary_tag(k: BinaryKind) -> u32 {
    use BinaryKind::*;
    match k {
        LessThan => 0,
        GreaterThan => 1,
        LessOrEqual => 2,
        GreaterOrEqual => 3,
        Equal => 4,
        Contains => 5,
        Prefix => 6,
        Suffix => 7,
        Regex => 8,
        Add => 9,
        Sub => 10,
        Mul => 11,
        Div => 12,
        Intersection => 13,
        Union => 14,
        And => 15,
        Or => 16,
    }
}

fn binary_from_tag(tag: u32) -> Result<BinaryKind, FormatError> {
    use BinaryKind::*;
    Ok(match tag {
        0 => LessThan,
        1 => GreaterThan,
        2 => LessOrEqual,
        3 => GreaterOrEqual,
        4 => Equal,
        5 => Contains,
        6 => Prefix,
        7 => Suffix,
        8 => Regex,
        9 => Add,
        10 => Sub,
        11 => Mul,
        12 => Div,
        13 => Intersection,
        14 => Union,
        15 => And,
        16 => Or,
        other => return Err(FormatError::UnknownVariant(other)),
    })
}

pub fn term_to_msg(t: &Term) -> TermMsg {
    let variant = match t {
        Term::Variable(v) => TermVariant::Variable(*v),
        Term::Integer(i) => TermVariant::Integer(*i),
        Term::String(s) => TermVariant::String(*s),
        Term::Date(d) => TermVariant::Date(*d),
        Term::Bytes(b) => TermVariant::Bytes(b.clone()),
        Term::Bool(b) => TermVariant::Bool(*b),
        Term::Set(s) => {
            TermVariant::Set(SetMsg { elements: s.iter().map(term_to_msg).collect() })
        }
    };
    TermMsg { variant: Some(variant) }
}

pub fn msg_to_term(msg: &TermMsg) -> Result<Term, FormatError> {
    match msg.variant.as_ref().ok_or(FormatError::UnknownVariant(0))? {
        TermVariant::Variable(v) => Ok(Term::Variable(*v)),
        TermVariant::Integer(i) => Ok(Term::Integer(*i)),
        TermVariant::String(s) => Ok(Term::String(*s)),
        TermVariant::Date(d) => Ok(Term::Date(*d)),
        TermVariant::Bytes(b) => Ok(Term::Bytes(b.clone())),
        TermVariant::Bool(b) => Ok(Term::Bool(*b)),
        TermVariant::Set(s) => {
            let elements: BTreeSet<Term> =
                s.elements.iter().map(msg_to_term).collect::<Result<_, _>>()?;
            crate::term::validate_set(&elements)?;
            Ok(Term::Set(elements))
        }
    }
}

pub fn predicate_to_msg(p: &Predicate) -> PredicateMsg {
    PredicateMsg { name: p.name, terms: p.terms.iter().map(term_to_msg).collect() }
}

pub fn msg_to_predicate(msg: &PredicateMsg) -> Result<Predicate, FormatError> {
    let terms = msg.terms.iter().map(msg_to_term).collect::<Result<_, _>>()?;
    Ok(Predicate::new(msg.name, terms))
}

pub fn fact_to_msg(f: &Fact) -> FactMsg {
    FactMsg { predicate: Some(predicate_to_msg(f.predicate())) }
}

pub fn msg_to_fact(msg: &FactMsg) -> Result<Fact, FormatError> {
    let predicate = msg
        .predicate
        .as_ref()
        .ok_or_else(|| FormatError::Decode("fact missing predicate".into()))?;
    let predicate = msg_to_predicate(predicate)?;
    Fact::new(predicate).ok_or_else(|| FormatError::Decode("fact contains a variable".into()))
}

pub fn expression_to_msg(e: &Expression) -> ExpressionMsg {
    let ops = e
        .ops()
        .iter()
        .map(|op| {
            let variant = match op {
                Op::Value(t) => OpVariant::Value(term_to_msg(t)),
                Op::UnaryOp(k) => OpVariant::Unary(unary_tag(*k)),
                Op::BinaryOp(k) => OpVariant::Binary(binary_tag(*k)),
            };
            OpMsg { variant: Some(variant) }
        })
        .collect();
    ExpressionMsg { ops }
}

pub fn msg_to_expression(msg: &ExpressionMsg) -> Result<Expression, FormatError> {
    if msg.ops.is_empty() {
        return Err(FormatError::Decode("expression has no ops".into()));
    }
    let ops = msg
        .ops
        .iter()
        .map(|op| {
            match op.variant.as_ref().ok_or_else(|| FormatError::Decode("op missing variant".into()))? {
                OpVariant::Value(t) => Ok(Op::Value(msg_to_term(t)?)),
                OpVariant::Unary(tag) => Ok(Op::UnaryOp(unary_from_tag(*tag)?)),
                OpVariant::Binary(tag) => Ok(Op::BinaryOp(binary_from_tag(*tag)?)),
            }
        })
        .collect::<Result<_, FormatError>>()?;
    Ok(Expression::new(ops))
}

pub fn rule_to_msg(r: &Rule) -> RuleMsg {
    RuleMsg {
        head: Some(predicate_to_msg(&r.head)),
        body: r.body.iter().map(predicate_to_msg).collect(),
        expressions: r.expressions.iter().map(expression_to_msg).collect(),
    }
}

pub fn msg_to_rule(msg: &RuleMsg) -> Result<Rule, FormatError> {
    let head = msg.head.as_ref().ok_or_else(|| FormatError::Decode("rule missing head".into()))?;
    let head = msg_to_predicate(head)?;
    let body = msg.body.iter().map(msg_to_predicate).collect::<Result<_, _>>()?;
    let expressions = msg.expressions.iter().map(msg_to_expression).collect::<Result<_, _>>()?;
    Ok(Rule::new(head, body, expressions))
}

pub fn check_to_msg(c: &Check) -> CheckMsg {
    CheckMsg {
        queries: c.queries.iter().map(rule_to_msg).collect(),
        source_text: c.source_text.clone(),
    }
}

pub fn msg_to_check(msg: &CheckMsg) -> Result<Check, FormatError> {
    let queries = msg.queries.iter().map(msg_to_rule).collect::<Result<_, _>>()?;
    let mut check = Check::new(queries);
    if let Some(text) = &msg.source_text {
        check = check.with_source_text(text.clone());
    }
    Ok(check)
}

pub fn block_to_msg(b: &crate::block::Block) -> BlockMessage {
    BlockMessage {
        index: b.index,
        symbols: b.symbols.user_symbols().map(|(_, s)| s.to_string()).collect(),
        version: b.version,
        context: b.context.clone(),
        facts: b.facts.iter().map(fact_to_msg).collect(),
        rules: b.rules.iter().map(rule_to_msg).collect(),
        checks: b.checks.iter().map(check_to_msg).collect(),
    }
}

pub fn msg_to_block(msg: &BlockMessage) -> Result<crate::block::Block, FormatError> {
    if msg.version > MAX_SCHEMA_VERSION {
        return Err(FormatError::VersionTooHigh { found: msg.version, max: MAX_SCHEMA_VERSION });
    }
    let mut symbols = SymbolTable::new();
    for s in &msg.symbols {
        symbols.insert(s);
    }
    let facts = msg.facts.iter().map(msg_to_fact).collect::<Result<_, _>>()?;
    let rules = msg.rules.iter().map(msg_to_rule).collect::<Result<_, _>>()?;
    let checks = msg.checks.iter().map(msg_to_check).collect::<Result<_, _>>()?;
    Ok(crate::block::Block {
        index: msg.index,
        symbols,
        facts,
        rules,
        checks,
        context: msg.context.clone(),
        version: msg.version,
    })
}

/// Encode a `BlockMessage` to the opaque bytes stored in `TokenMessage.blocks`.
pub fn encode_block(b: &crate::block::Block) -> Vec<u8> {
    block_to_msg(b).encode_to_vec()
}

pub fn decode_block(bytes: &[u8]) -> Result<crate::block::Block, FormatError> {
    let msg =
        BlockMessage::decode(bytes).map_err(|e| FormatError::Decode(e.to_string()))?;
    msg_to_block(&msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn term_round_trips() {
        for t in [
            Term::Variable(3),
            Term::Integer(-7),
            Term::String(42),
            Term::Date(1_700_000_000),
            Term::Bytes(vec![1, 2, 3]),
            Term::Bool(true),
        ] {
            let msg = term_to_msg(&t);
            assert_eq!(msg_to_term(&msg).unwrap(), t);
        }
    }

    #[test]
    fn set_round_trips_and_revalidates() {
        let set = Term::new_set(vec![Term::Integer(1), Term::Integer(2)]).unwrap();
        let msg = term_to_msg(&set);
        assert_eq!(msg_to_term(&msg).unwrap(), set);
    }

    #[test]
    fn decoding_empty_set_is_rejected() {
        let msg = TermMsg { variant: Some(TermVariant::Set(SetMsg { elements: vec![] })) };
        assert!(matches!(msg_to_term(&msg), Err(FormatError::EmptySet)));
    }

    #[test]
    fn decoding_mixed_type_set_is_rejected() {
        let msg = TermMsg {
            variant: Some(TermVariant::Set(SetMsg {
                elements: vec![term_to_msg(&Term::Integer(1)), term_to_msg(&Term::Bool(true))],
            })),
        };
        assert!(matches!(msg_to_term(&msg), Err(FormatError::MixedTypeSet)));
    }

    #[test]
    fn decoding_version_above_max_is_rejected() {
        let block = crate::block::Block::new(0, SymbolTable::new());
        let mut msg = block_to_msg(&block);
        msg.version = MAX_SCHEMA_VERSION + 1;
        let bytes = msg.encode_to_vec();
        assert!(matches!(
            decode_block(&bytes),
            Err(FormatError::VersionTooHigh { .. })
        ));
    }

    #[test]
    fn block_round_trips_through_bytes() {
        let mut symbols = SymbolTable::new();
        symbols.insert("custom_pred");
        let mut block = crate::block::Block::new(0, symbols);
        block.context = "demo".into();
        block.facts.push(Fact::new(Predicate::new(5, vec![Term::Integer(1)])).unwrap());
        let bytes = encode_block(&block);
        let decoded = decode_block(&bytes).unwrap();
        assert_eq!(decoded.index, block.index);
        assert_eq!(decoded.context, block.context);
        assert_eq!(decoded.facts.len(), 1);
    }
}
