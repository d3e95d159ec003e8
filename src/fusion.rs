//! Instruction fusion (§4.4): collapses adjacent `(push, consumer)` pairs
//! into wider "fused" majors so the optimizer and (eventually) the VM can
//! reason about them as a single unit. `unfuse_instructions` is the exact
//! inverse (§8 "Fusion round-trip").
//!
//! Grounded directly on `interpreter::fuseInstructions`/`unfuseInstructions`
//! in `examples/original_source/interpreter/fusion.cpp`: the same
//! right-to-left pairwise scan, the same `isDirectStorageClass`/
//! `isComparison`/`isConditionalJump` helper predicates (here expressed via
//! `Opcode::storage`/`Storage::is_direct`, `BinaryOp::is_comparison`, and
//! `JumpMinor::pop_always`), and the same in-place-unary special case
//! driven by [`crate::reach::LocalTracer`].

use crate::bco::BytecodeObject;
use crate::opcode::{BinaryOp, Major, Opcode, Storage};
use crate::reach::{LocalTracer, STORE_DEPTH};
use crate::value::UnaryOp;

fn is_direct_push(op: Opcode) -> bool {
  op.major == Major::Push && op.storage().map(Storage::is_direct).unwrap_or(false)
}

fn is_comparison(op: Opcode) -> bool {
  op.major == Major::Binary && BinaryOp::from_u8(op.minor).map(BinaryOp::is_comparison).unwrap_or(false)
}

fn is_conditional_jump(op: Opcode) -> bool {
  op.is_regular_jump() && op.jump_minor().unwrap().pop_always()
}

/// §4.4: rewrites `bco` in place into its fused form.
pub fn fuse_instructions(bco: &mut BytecodeObject) {
  let n = bco.num_instructions();
  if n == 0 {
    return;
  }

  let tracer = LocalTracer::new();

  // Iterate right-to-left, combining (prev, me) pairs. `prev` is always the
  // side that gets rewritten; scanning backward lets a rewrite at position i
  // feed the decision at position i-1 (e.g. FusedComparison -> FusedComparison2).
  for i in (1..n).rev() {
    let me = bco.get(i);
    let prev = bco.get(i - 1);

    let new_major = match me.major {
      Major::Binary if is_direct_push(prev) => Some(Major::FusedBinary),

      Major::Unary if is_direct_push(prev) => {
        let is_inc_dec = matches!(UnaryOp::from_u8(me.minor), Some(UnaryOp::Inc) | Some(UnaryOp::Dec));
        if prev.storage() == Some(Storage::Local)
          && is_inc_dec
          && tracer.is_overwritten_local(bco, i + 1, prev.arg, STORE_DEPTH)
        {
          Some(Major::InplaceUnary)
        } else {
          Some(Major::FusedUnary)
        }
      }

      Major::Jump if is_conditional_jump(me) && is_comparison(prev) => Some(Major::FusedComparison),

      Major::FusedComparison if is_direct_push(prev) => Some(Major::FusedComparison2),

      _ => None,
    };

    if let Some(major) = new_major {
      bco.get_mut(i - 1).major = major;
    }
  }
}

/// §4.4: the exact inverse of [`fuse_instructions`] — every instruction's
/// major is projected back to its `externalMajor()`.
pub fn unfuse_instructions(bco: &mut BytecodeObject) {
  for i in 0..bco.num_instructions() {
    let external = bco.get(i).external_major();
    bco.get_mut(i).major = external;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::opcode::{JumpMinor, Storage};
  use crate::value::Value;

  #[test]
  fn push_binary_fuses() {
    let mut bco = BytecodeObject::new();
    bco.add_push_literal(Value::Integer(5));
    bco.add_instruction(Major::Binary, BinaryOp::Add.as_u8(), 0);
    fuse_instructions(&mut bco);
    assert_eq!(bco.get(0).major, Major::FusedBinary);
    assert_eq!(bco.get(1).major, Major::Binary);
  }

  #[test]
  fn push_non_local_unary_fuses_not_inplace() {
    let mut bco = BytecodeObject::new();
    bco.add_push_literal(Value::Integer(5));
    bco.add_instruction(Major::Unary, UnaryOp::Inc.as_u8(), 0);
    fuse_instructions(&mut bco);
    assert_eq!(bco.get(0).major, Major::FusedUnary);
  }

  #[test]
  fn push_local_inc_with_provable_overwrite_goes_inplace() {
    let mut bco = BytecodeObject::new();
    bco.add_local_variable("x");
    bco.add_instruction(Major::Push, Storage::Local as u8, 0);
    bco.add_instruction(Major::Unary, UnaryOp::Inc.as_u8(), 0);
    bco.add_instruction(Major::Store, Storage::Local as u8, 0);
    fuse_instructions(&mut bco);
    assert_eq!(bco.get(0).major, Major::InplaceUnary);
  }

  #[test]
  fn push_local_inc_without_overwrite_stays_fused() {
    let mut bco = BytecodeObject::new();
    bco.add_local_variable("x");
    bco.add_instruction(Major::Push, Storage::Local as u8, 0);
    bco.add_instruction(Major::Unary, UnaryOp::Inc.as_u8(), 0);
    // no store follows: the local's old value is still observable.
    fuse_instructions(&mut bco);
    assert_eq!(bco.get(0).major, Major::FusedUnary);
  }

  #[test]
  fn comparison_then_conditional_pop_jump_fuses() {
    let mut bco = BytecodeObject::new();
    let l = bco.make_label();
    bco.add_instruction(Major::Binary, BinaryOp::CompareEQ.as_u8(), 0);
    bco.add_jump(JumpMinor::IF_TRUE | JumpMinor::POP_ALWAYS, l);
    bco.add_label(l);
    fuse_instructions(&mut bco);
    assert_eq!(bco.get(0).major, Major::FusedComparison);
  }

  #[test]
  fn push_before_fused_comparison_becomes_comparison2() {
    let mut bco = BytecodeObject::new();
    let l = bco.make_label();
    bco.add_push_literal(Value::Integer(3));
    bco.add_instruction(Major::Binary, BinaryOp::CompareEQ.as_u8(), 0);
    bco.add_jump(JumpMinor::IF_TRUE | JumpMinor::POP_ALWAYS, l);
    bco.add_label(l);
    fuse_instructions(&mut bco);
    assert_eq!(bco.get(0).major, Major::FusedComparison2);
    assert_eq!(bco.get(1).major, Major::FusedComparison);
  }

  #[test]
  fn fuse_then_unfuse_is_identity() {
    let mut bco = BytecodeObject::new();
    bco.add_local_variable("x");
    bco.add_instruction(Major::Push, Storage::Local as u8, 0);
    bco.add_instruction(Major::Binary, BinaryOp::Add.as_u8(), 0);
    let before = bco.code().to_vec();

    fuse_instructions(&mut bco);
    assert_ne!(bco.code(), before.as_slice());

    unfuse_instructions(&mut bco);
    assert_eq!(bco.code(), before.as_slice());
  }

  #[test]
  fn non_direct_push_does_not_fuse() {
    let mut bco = BytecodeObject::new();
    bco.add_instruction(Major::Push, Storage::NamedVariable as u8, 0);
    bco.add_instruction(Major::Binary, BinaryOp::Add.as_u8(), 0);
    fuse_instructions(&mut bco);
    assert_eq!(bco.get(0).major, Major::Push);
  }
}
