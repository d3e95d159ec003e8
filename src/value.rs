//! Literal values that flow through the bytecode's literal pool and through
//! constant folding in the peephole optimizer.
//!
//! Grounded on the teacher's treatment of boxed constant values
//! (`crates/op/src/lib.rs`'s `Value` type parameter, `crates/emit/src/ctx.rs`)
//! generalized to the closed, non-generic set this spec calls for: scalar,
//! integer, boolean (tri-state), float, string.

use std::fmt;

use beef::lean::Cow;

/// A literal value. `Boolean` is tri-state: `Some(true)`, `Some(false)`, or
/// `None` standing in for the scripting language's "Empty" truth value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
  Empty,
  Integer(i32),
  Boolean(Option<bool>),
  Float(f64),
  String(Cow<'static, str>),
}

impl Value {
  pub fn boolean(v: bool) -> Self {
    Value::Boolean(Some(v))
  }

  pub fn empty_boolean() -> Self {
    Value::Boolean(None)
  }

  pub fn is_empty(&self) -> bool {
    matches!(self, Value::Empty | Value::Boolean(None))
  }

  pub fn as_integer(&self) -> Option<i32> {
    match self {
      Value::Integer(n) => Some(*n),
      Value::Boolean(Some(b)) => Some(*b as i32),
      Value::Float(f) => Some(*f as i32),
      _ => None,
    }
  }

  pub fn as_float(&self) -> Option<f64> {
    match self {
      Value::Integer(n) => Some(*n as f64),
      Value::Float(f) => Some(*f),
      Value::Boolean(Some(b)) => Some(*b as i32 as f64),
      _ => None,
    }
  }

  pub fn as_bool(&self) -> Option<bool> {
    match self {
      Value::Boolean(b) => *b,
      Value::Integer(n) => Some(*n != 0),
      Value::Float(f) => Some(*f != 0.0),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::String(s) => Some(s.as_ref()),
      _ => None,
    }
  }

  pub fn is_numeric(&self) -> bool {
    matches!(self, Value::Integer(_) | Value::Float(_) | Value::Empty)
  }

  /// Semantic equality used by literal-pool deduplication (§4.2): Integer,
  /// Float and String compare by value; everything else (in practice, only
  /// ever inserted by identity) falls back to derived `PartialEq`.
  pub fn semantic_eq(&self, other: &Value) -> bool {
    match (self, other) {
      (Value::Integer(a), Value::Integer(b)) => a == b,
      (Value::Float(a), Value::Float(b)) => a == b,
      (Value::String(a), Value::String(b)) => a == b,
      _ => self == other,
    }
  }

  /// `true` if this value is representable as a 15-bit signed immediate
  /// operand of `PushInteger`/`PushBoolean` (§4.2 `addPushLiteral`).
  pub fn as_small_immediate(&self) -> Option<(bool, i16)> {
    match self {
      Value::Integer(n) if (-0x4000..0x4000).contains(n) => Some((false, *n as i16)),
      Value::Boolean(Some(b)) => Some((true, *b as i16)),
      Value::Boolean(None) => Some((true, -1)),
      _ => None,
    }
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::Empty => write!(f, "Empty"),
      Value::Integer(n) => write!(f, "{n}"),
      Value::Boolean(Some(true)) => write!(f, "True"),
      Value::Boolean(Some(false)) => write!(f, "False"),
      Value::Boolean(None) => write!(f, "Empty"),
      Value::Float(x) => write!(f, "{x}"),
      Value::String(s) => write!(f, "{s:?}"),
    }
  }
}

/// The finite set of unary operations foldable by `FoldUnaryInt` (§4.6) and
/// fusible by `fuseInstructions` (§4.4). Exhaustively the list `spec.md`
/// names in the `FoldUnaryInt` contract; no operations are invented beyond
/// it (see `DESIGN.md`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UnaryOp {
  Zap,
  Neg,
  Pos,
  Not,
  Not2,
  Bool,
  Abs,
  IsEmpty,
  IsString,
  IsNum,
  Trunc,
  Round,
  Inc,
  Dec,
  BitNot,
}

impl UnaryOp {
  pub fn from_u8(v: u8) -> Option<UnaryOp> {
    use UnaryOp::*;
    const TABLE: &[UnaryOp] = &[
      Zap, Neg, Pos, Not, Not2, Bool, Abs, IsEmpty, IsString, IsNum, Trunc, Round, Inc, Dec, BitNot,
    ];
    TABLE.get(v as usize).copied()
  }

  pub fn as_u8(self) -> u8 {
    self as u8
  }
}

/// Failure mode of [`execute_unary_operation`]: a type the operation is not
/// defined for. The optimizer treats this as `FoldingSoftFailure` (§7) and
/// leaves the code unchanged; it is never surfaced to a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnaryTypeError;

/// Reference unary evaluator used for constant folding. Mirrors the VM's own
/// unary-operation semantics closely enough for literal folding, but is not
/// itself the execution engine (out of scope, §1).
pub fn execute_unary_operation(op: UnaryOp, v: &Value) -> Result<Value, UnaryTypeError> {
  use UnaryOp::*;
  match op {
    Zap => {
      if v.is_empty() {
        Ok(Value::boolean(false))
      } else {
        Ok(v.clone())
      }
    }
    Neg => match v {
      Value::Empty => Ok(Value::Empty),
      Value::Integer(n) => n.checked_neg().map(Value::Integer).ok_or(UnaryTypeError),
      Value::Float(f) => Ok(Value::Float(-f)),
      _ => Err(UnaryTypeError),
    },
    Pos => {
      if v.is_numeric() {
        Ok(v.clone())
      } else {
        Err(UnaryTypeError)
      }
    }
    Not => match v.as_bool() {
      Some(b) => Ok(Value::boolean(!b)),
      None if v.is_empty() => Ok(Value::Empty),
      None => Err(UnaryTypeError),
    },
    Not2 => match v.as_bool() {
      Some(b) => Ok(Value::boolean(!b)),
      None if v.is_empty() => Ok(Value::boolean(true)),
      None => Err(UnaryTypeError),
    },
    Bool => {
      if v.is_empty() {
        Ok(Value::Empty)
      } else {
        v.as_bool().map(Value::boolean).ok_or(UnaryTypeError)
      }
    }
    Abs => match v {
      Value::Empty => Ok(Value::Empty),
      Value::Integer(n) => n.checked_abs().map(Value::Integer).ok_or(UnaryTypeError),
      Value::Float(f) => Ok(Value::Float(f.abs())),
      _ => Err(UnaryTypeError),
    },
    IsEmpty => Ok(Value::boolean(v.is_empty())),
    IsString => Ok(Value::boolean(matches!(v, Value::String(_)))),
    IsNum => Ok(Value::boolean(matches!(v, Value::Integer(_) | Value::Float(_)))),
    Trunc => match v {
      Value::Empty => Ok(Value::Empty),
      Value::Integer(n) => Ok(Value::Integer(*n)),
      Value::Float(f) => Ok(Value::Integer(f.trunc() as i32)),
      _ => Err(UnaryTypeError),
    },
    Round => match v {
      Value::Empty => Ok(Value::Empty),
      Value::Integer(n) => Ok(Value::Integer(*n)),
      Value::Float(f) => Ok(Value::Integer(f.round() as i32)),
      _ => Err(UnaryTypeError),
    },
    Inc => match v {
      Value::Empty => Ok(Value::Empty),
      Value::Integer(n) => n.checked_add(1).map(Value::Integer).ok_or(UnaryTypeError),
      Value::Float(f) => Ok(Value::Float(f + 1.0)),
      _ => Err(UnaryTypeError),
    },
    Dec => match v {
      Value::Empty => Ok(Value::Empty),
      Value::Integer(n) => n.checked_sub(1).map(Value::Integer).ok_or(UnaryTypeError),
      Value::Float(f) => Ok(Value::Float(f - 1.0)),
      _ => Err(UnaryTypeError),
    },
    BitNot => match v.as_integer() {
      Some(n) if v.is_numeric() => Ok(Value::Integer(!n)),
      _ => Err(UnaryTypeError),
    },
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn neg_folds() {
    let out = execute_unary_operation(UnaryOp::Neg, &Value::Integer(5)).unwrap();
    assert_eq!(out, Value::Integer(-5));
  }

  #[test]
  fn is_empty_tracks_tri_state() {
    assert_eq!(
      execute_unary_operation(UnaryOp::IsEmpty, &Value::Empty).unwrap(),
      Value::boolean(true)
    );
    assert_eq!(
      execute_unary_operation(UnaryOp::IsEmpty, &Value::Integer(0)).unwrap(),
      Value::boolean(false)
    );
  }

  #[test]
  fn pos_rejects_string() {
    assert_eq!(
      execute_unary_operation(UnaryOp::Pos, &Value::String("x".into())),
      Err(UnaryTypeError)
    );
  }

  #[test]
  fn semantic_eq_is_value_equality_for_scalars() {
    assert!(Value::Integer(3).semantic_eq(&Value::Integer(3)));
    assert!(!Value::Integer(3).semantic_eq(&Value::Integer(4)));
  }
}
