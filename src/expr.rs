//! The expression stack machine.
//!
//! An [`Expression`] is a non-empty postfix sequence of [`Op`]s evaluated
//! against a variable binding map and a [`SymbolTable`] (needed to resolve
//! `Term::String`'s interned id back to text for `Prefix`/`Suffix`/`Regex`).
//! The stack is bounded at [`MAX_STACK_DEPTH`] elements; after processing
//! every op, exactly one value must remain on the stack.

use std::collections::{BTreeSet, HashMap};

use crate::error::EvalError;
use crate::symbol::SymbolTable;
use crate::term::Term;

/// Maximum number of values the evaluator will hold on its stack at once.
pub const MAX_STACK_DEPTH: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryKind {
    Negate,
    /// Identity; carries no runtime effect beyond preserving source
    /// precedence for whoever renders the expression back to text.
    Parens,
    Length,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryKind {
    LessThan,
    GreaterThan,
    LessOrEqual,
    GreaterOrEqual,
    Equal,
    Contains,
    Prefix,
    Suffix,
    Regex,
    Add,
    Sub,
    Mul,
    Div,
    Intersection,
    Union,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Value(Term),
    UnaryOp(UnaryKind),
    BinaryOp(BinaryKind),
}

/// A non-empty postfix op sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression(Vec<Op>);

impl Expression {
    /// Construct an expression from its postfix op sequence. `ops` must be
    /// non-empty; this is a structural precondition enforced by whoever
    /// builds rules (the parser, out of scope here), not re-validated per
    /// evaluation.
    pub fn new(ops: Vec<Op>) -> Self {
        debug_assert!(!ops.is_empty(), "expression must carry at least one op");
        Self(ops)
    }

    pub fn ops(&self) -> &[Op] {
        &self.0
    }

    /// Evaluate against `bindings`, resolving `Term::String`s through
    /// `symbols`, and return the single resulting term.
    pub fn evaluate(
        &self,
        bindings: &HashMap<u32, Term>,
        symbols: &SymbolTable,
    ) -> Result<Term, EvalError> {
        let mut stack: Vec<Term> = Vec::new();
        for op in &self.0 {
            match op {
                Op::Value(Term::Variable(v)) => {
                    let t = bindings.get(v).cloned().ok_or(EvalError::MissingVariable(*v))?;
                    push(&mut stack, t)?;
                }
                Op::Value(t) => push(&mut stack, t.clone())?,
                Op::UnaryOp(kind) => {
                    let a = pop(&mut stack)?;
                    let r = eval_unary(*kind, a, symbols)?;
                    push(&mut stack, r)?;
                }
                Op::BinaryOp(kind) => {
                    let right = pop(&mut stack)?;
                    let left = pop(&mut stack)?;
                    let r = eval_binary(*kind, left, right, symbols)?;
                    push(&mut stack, r)?;
                }
            }
        }
        if stack.len() != 1 {
            return Err(EvalError::InvalidResultStack(stack.len()));
        }
        Ok(stack.pop().unwrap())
    }
}

fn push(stack: &mut Vec<Term>, t: Term) -> Result<(), EvalError> {
    if stack.len() >= MAX_STACK_DEPTH {
        return Err(EvalError::StackOverflow { limit: MAX_STACK_DEPTH });
    }
    stack.push(t);
    Ok(())
}

fn pop(stack: &mut Vec<Term>) -> Result<Term, EvalError> {
    stack.pop().ok_or(EvalError::InvalidResultStack(0))
}

fn eval_unary(kind: UnaryKind, a: Term, symbols: &SymbolTable) -> Result<Term, EvalError> {
    match (kind, a) {
        (UnaryKind::Negate, Term::Integer(i)) => i
            .checked_neg()
            .map(Term::Integer)
            .ok_or(EvalError::IntegerOverflow { op: "Negate" }),
        (UnaryKind::Negate, Term::Bool(b)) => Ok(Term::Bool(!b)),
        (UnaryKind::Parens, t) => Ok(t),
        (UnaryKind::Length, Term::Bytes(b)) => Ok(Term::Integer(b.len() as i64)),
        (UnaryKind::Length, Term::Set(s)) => Ok(Term::Integer(s.len() as i64)),
        (UnaryKind::Length, Term::String(id)) => {
            let s = symbols.str(id).ok_or(EvalError::TypeMismatch { op: "Length" })?;
            Ok(Term::Integer(s.len() as i64))
        }
        _ => Err(EvalError::TypeMismatch { op: "Negate/Length" }),
    }
}

fn eval_binary(
    kind: BinaryKind,
    left: Term,
    right: Term,
    symbols: &SymbolTable,
) -> Result<Term, EvalError> {
    use BinaryKind::*;
    match kind {
        LessThan => int_cmp(left, right, "LessThan", |a, b| a < b),
        GreaterThan => int_cmp(left, right, "GreaterThan", |a, b| a > b),
        LessOrEqual => ord_cmp(left, right, "LessOrEqual", |a, b| a <= b),
        GreaterOrEqual => ord_cmp(left, right, "GreaterOrEqual", |a, b| a >= b),
        Equal => eval_equal(left, right),
        Contains => eval_contains(left, right),
        Prefix => str_pred(left, right, symbols, "Prefix", |a, b| a.starts_with(b)),
        Suffix => str_pred(left, right, symbols, "Suffix", |a, b| a.ends_with(b)),
        Regex => eval_regex(left, right, symbols),
        Add => int_arith(left, right, "Add", i64::checked_add),
        Sub => int_arith(left, right, "Sub", i64::checked_sub),
        Mul => int_arith(left, right, "Mul", i64::checked_mul),
        Div => eval_div(left, right),
        Intersection => set_op(left, right, "Intersection", |a, b| {
            a.intersection(&b).cloned().collect()
        }),
        Union => set_op(left, right, "Union", |a, b| a.union(&b).cloned().collect()),
        And => bool_op(left, right, "And", |a, b| a && b),
        Or => bool_op(left, right, "Or", |a, b| a || b),
    }
}

fn int_cmp(
    left: Term,
    right: Term,
    op: &'static str,
    f: impl Fn(i64, i64) -> bool,
) -> Result<Term, EvalError> {
    match (left, right) {
        (Term::Integer(a), Term::Integer(b)) => Ok(Term::Bool(f(a, b))),
        _ => Err(EvalError::TypeMismatch { op }),
    }
}

/// `LessOrEqual`/`GreaterOrEqual` additionally accept `Date`, which is just
/// a `u64` of unix seconds and orders the same way integers do.
fn ord_cmp(
    left: Term,
    right: Term,
    op: &'static str,
    f: impl Fn(i128, i128) -> bool,
) -> Result<Term, EvalError> {
    match (left, right) {
        (Term::Integer(a), Term::Integer(b)) => Ok(Term::Bool(f(a as i128, b as i128))),
        (Term::Date(a), Term::Date(b)) => Ok(Term::Bool(f(a as i128, b as i128))),
        _ => Err(EvalError::TypeMismatch { op }),
    }
}

fn eval_equal(left: Term, right: Term) -> Result<Term, EvalError> {
    match (&left, &right) {
        (Term::Integer(_), Term::Integer(_))
        | (Term::Bytes(_), Term::Bytes(_))
        | (Term::String(_), Term::String(_))
        | (Term::Set(_), Term::Set(_))
        | (Term::Bool(_), Term::Bool(_)) => Ok(Term::Bool(left == right)),
        _ => Err(EvalError::TypeMismatch { op: "Equal" }),
    }
}

fn eval_contains(left: Term, right: Term) -> Result<Term, EvalError> {
    match left {
        Term::Set(s) => match right {
            Term::Integer(_) | Term::Bytes(_) | Term::String(_) => Ok(Term::Bool(s.contains(&right))),
            _ => Err(EvalError::TypeMismatch { op: "Contains" }),
        },
        _ => Err(EvalError::TypeMismatch { op: "Contains" }),
    }
}

fn str_pred(
    left: Term,
    right: Term,
    symbols: &SymbolTable,
    op: &'static str,
    f: impl Fn(&str, &str) -> bool,
) -> Result<Term, EvalError> {
    let (a, b) = resolve_strings(left, right, symbols, op)?;
    Ok(Term::Bool(f(&a, &b)))
}

fn eval_regex(left: Term, right: Term, symbols: &SymbolTable) -> Result<Term, EvalError> {
    let (subject, pattern) = resolve_strings(left, right, symbols, "Regex")?;
    let re = regex::Regex::new(&pattern).map_err(|e| EvalError::RegexCompile(e.to_string()))?;
    Ok(Term::Bool(re.is_match(&subject)))
}

fn resolve_strings(
    left: Term,
    right: Term,
    symbols: &SymbolTable,
    op: &'static str,
) -> Result<(String, String), EvalError> {
    match (left, right) {
        (Term::String(a), Term::String(b)) => {
            let a = symbols.str(a).ok_or(EvalError::TypeMismatch { op })?;
            let b = symbols.str(b).ok_or(EvalError::TypeMismatch { op })?;
            Ok((a.to_string(), b.to_string()))
        }
        _ => Err(EvalError::TypeMismatch { op }),
    }
}

fn int_arith(
    left: Term,
    right: Term,
    op: &'static str,
    f: impl Fn(i64, i64) -> Option<i64>,
) -> Result<Term, EvalError> {
    match (left, right) {
        (Term::Integer(a), Term::Integer(b)) => {
            f(a, b).map(Term::Integer).ok_or(EvalError::IntegerOverflow { op })
        }
        _ => Err(EvalError::TypeMismatch { op }),
    }
}

fn eval_div(left: Term, right: Term) -> Result<Term, EvalError> {
    match (left, right) {
        (Term::Integer(_), Term::Integer(0)) => Err(EvalError::DivByZero),
        (Term::Integer(a), Term::Integer(b)) => {
            a.checked_div(b).map(Term::Integer).ok_or(EvalError::IntegerOverflow { op: "Div" })
        }
        _ => Err(EvalError::TypeMismatch { op: "Div" }),
    }
}

fn set_op(
    left: Term,
    right: Term,
    op: &'static str,
    f: impl Fn(BTreeSet<Term>, BTreeSet<Term>) -> BTreeSet<Term>,
) -> Result<Term, EvalError> {
    match (left, right) {
        (Term::Set(a), Term::Set(b)) => {
            let out = f(a, b);
            if out.is_empty() {
                // An empty result set cannot be represented as `Term::Set`
                // (the empty-set invariant), so an empty intersection or
                // union is a type error rather than a silently-invalid term.
                return Err(EvalError::TypeMismatch { op });
            }
            Ok(Term::Set(out))
        }
        _ => Err(EvalError::TypeMismatch { op }),
    }
}

fn bool_op(
    left: Term,
    right: Term,
    op: &'static str,
    f: impl Fn(bool, bool) -> bool,
) -> Result<Term, EvalError> {
    match (left, right) {
        (Term::Bool(a), Term::Bool(b)) => Ok(Term::Bool(f(a, b))),
        _ => Err(EvalError::TypeMismatch { op }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> HashMap<u32, Term> {
        HashMap::new()
    }

    #[test]
    fn simple_arithmetic() {
        let e = Expression::new(vec![
            Op::Value(Term::Integer(2)),
            Op::Value(Term::Integer(3)),
            Op::BinaryOp(BinaryKind::Add),
        ]);
        assert_eq!(e.evaluate(&vars(), &SymbolTable::new()).unwrap(), Term::Integer(5));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let e = Expression::new(vec![
            Op::Value(Term::Integer(5)),
            Op::Value(Term::Integer(0)),
            Op::BinaryOp(BinaryKind::Div),
        ]);
        assert_eq!(
            e.evaluate(&vars(), &SymbolTable::new()).unwrap_err(),
            EvalError::DivByZero
        );
    }

    #[test]
    fn overflow_is_detected() {
        let e = Expression::new(vec![
            Op::Value(Term::Integer(i64::MAX)),
            Op::Value(Term::Integer(1)),
            Op::BinaryOp(BinaryKind::Add),
        ]);
        assert!(matches!(
            e.evaluate(&vars(), &SymbolTable::new()),
            Err(EvalError::IntegerOverflow { .. })
        ));
    }

    #[test]
    fn missing_variable_is_an_error() {
        let e = Expression::new(vec![Op::Value(Term::Variable(0))]);
        assert_eq!(
            e.evaluate(&vars(), &SymbolTable::new()).unwrap_err(),
            EvalError::MissingVariable(0)
        );
    }

    #[test]
    fn negate_bool_and_integer() {
        let e = Expression::new(vec![Op::Value(Term::Bool(true)), Op::UnaryOp(UnaryKind::Negate)]);
        assert_eq!(e.evaluate(&vars(), &SymbolTable::new()).unwrap(), Term::Bool(false));
    }

    #[test]
    fn contains_on_set() {
        let set = Term::new_set(vec![Term::Integer(1), Term::Integer(2)]).unwrap();
        let e = Expression::new(vec![
            Op::Value(set),
            Op::Value(Term::Integer(1)),
            Op::BinaryOp(BinaryKind::Contains),
        ]);
        assert_eq!(e.evaluate(&vars(), &SymbolTable::new()).unwrap(), Term::Bool(true));
    }

    #[test]
    fn empty_stack_leftover_is_an_error() {
        let e = Expression::new(vec![
            Op::Value(Term::Integer(1)),
            Op::Value(Term::Integer(2)),
        ]);
        assert!(matches!(
            e.evaluate(&vars(), &SymbolTable::new()),
            Err(EvalError::InvalidResultStack(2))
        ));
    }

    #[test]
    fn length_resolves_interned_string() {
        let mut symbols = SymbolTable::new();
        let host = symbols.insert("www.example.com");
        let e = Expression::new(vec![
            Op::Value(Term::String(host)),
            Op::UnaryOp(UnaryKind::Length),
        ]);
        assert_eq!(e.evaluate(&vars(), &symbols).unwrap(), Term::Integer(15));
    }

    #[test]
    fn suffix_resolves_interned_strings() {
        let mut symbols = SymbolTable::new();
        let host = symbols.insert("www.example.com");
        let suffix = symbols.insert("example.com");
        let e = Expression::new(vec![
            Op::Value(Term::String(host)),
            Op::Value(Term::String(suffix)),
            Op::BinaryOp(BinaryKind::Suffix),
        ]);
        assert_eq!(e.evaluate(&vars(), &symbols).unwrap(), Term::Bool(true));
    }
}
