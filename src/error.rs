//! Crate-wide error types (§7). Grounded in shape on the teacher's small,
//! `Display`-driven error structs (`crates/emit/src/lib.rs::Error`,
//! `crates/diag`'s `thiserror`-backed error enum) rather than panics or
//! stringly-typed errors.

use thiserror::Error;

/// Raised by the recursive-descent selection-expression compiler
/// (§4.7, §7 `MalformedSyntax`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
  #[error("unknown identifier: {0}")]
  UnknownIdentifier(String),
  #[error("invalid operand in set expression")]
  InvalidOperand,
  #[error("expected symbol {0:?}")]
  ExpectSymbol(&'static str),
  #[error("expecting operand in set expression")]
  ExpectOperand,
  #[error("garbage at end of set expression")]
  GarbageAtEnd,
}

/// Raised by the RPN selection-expression evaluator (§4.8, §7
/// `MalformedSelectionExpression`). Deliberately a single unit error: the
/// original throws one exception message ("Invalid selection operation")
/// regardless of the specific cause (underflow, excess, bad reference).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid selection operation")]
pub struct EvalError;
