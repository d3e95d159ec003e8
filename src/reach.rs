//! Local-variable reach analyzer (§4.5): "is the local at `address`
//! guaranteed to be overwritten before it is next read, within `depth`
//! traced instructions". Used by the fusion pass to decide between a
//! fused-unary and an in-place-unary rewrite of `(push-local, inc/dec)`.
//!
//! Grounded directly on `LocalTracer` in
//! `examples/original_source/interpreter/fusion.cpp`: the same per-major
//! acceptance rules, the same conditional-jump fork (trace the fall-through
//! first, then continue at the target), and the same cached, tri-state
//! exception-handling check. Structured the Rust way the teacher structures
//! a scoped analysis pass with memoized state (`crates/emit/src/`'s small
//! stateful helper structs) — a plain struct holding a `Cell` rather than
//! the original's lazily-initialized enum field, since there is no
//! observable difference between "not yet computed" and "computed no" once
//! read-only.

use std::cell::Cell;

use crate::bco::{BytecodeObject, Pc};
use crate::opcode::{JumpMinor, Major, Storage};

/// How many instructions `isOverwrittenLocal` will trace before giving up
/// and conservatively assuming the local is still live (§4.4, §5).
pub const STORE_DEPTH: u32 = 10;

#[derive(Default)]
pub struct LocalTracer {
  exception_handling: Cell<Option<bool>>,
}

impl LocalTracer {
  pub fn new() -> Self {
    LocalTracer::default()
  }

  /// §4.5: computed once per BCO and cached (tri-state unknown/no/yes in
  /// the original; `Cell<Option<bool>>` gives us the same memoization).
  pub fn has_exception_handling(&self, bco: &BytecodeObject) -> bool {
    if self.exception_handling.get().is_none() {
      let found = bco
        .code()
        .iter()
        .any(|op| op.major == Major::Jump && (op.minor & !JumpMinor::SYMBOLIC) == JumpMinor::CATCH);
      self.exception_handling.set(Some(found));
    }
    self.exception_handling.get().unwrap()
  }

  /// §4.5 contract, verbatim per-major rules.
  pub fn is_overwritten_local(&self, bco: &BytecodeObject, mut pc: Pc, address: u16, mut depth: u32) -> bool {
    let n = bco.num_instructions();
    while depth > 0 && pc < n {
      let op = bco.get(pc);
      pc += 1;
      depth -= 1;
      match op.major {
        Major::Push | Major::FusedUnary | Major::FusedBinary | Major::FusedComparison2 | Major::InplaceUnary => {
          let accept = match Storage::from_u8(op.minor) {
            Some(Storage::Local) => op.arg != address,
            Some(Storage::Literal) | Some(Storage::Integer) | Some(Storage::Boolean) => true,
            _ => false,
          };
          if !accept {
            return false;
          }
        }
        Major::Binary | Major::FusedComparison | Major::Unary | Major::Ternary => {
          if self.has_exception_handling(bco) {
            return false;
          }
        }
        Major::Jump => {
          if op.is_label() {
            // transparent
          } else if op.is_regular_jump() {
            let jm = op.jump_minor().unwrap();
            if jm.condition() != JumpMinor::ALWAYS {
              // conditional jump: trace the fall-through first.
              if !self.is_overwritten_local(bco, pc, address, depth) {
                return false;
              }
            }
            pc = bco.get_jump_target(op.minor, op.arg);
          } else {
            // Catch or other rare control flow: too complex to reason about.
            return false;
          }
        }
        Major::Indirect | Major::MemRef => return false,
        Major::Stack => {}
        Major::Pop | Major::Store => {
          if matches!(Storage::from_u8(op.minor), Some(Storage::Local)) && op.arg == address {
            return true;
          }
        }
        Major::Dim => {}
        Major::Special => return false,
      }
    }
    false
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::opcode::{StackOp, Storage};
  use crate::value::UnaryOp;

  #[test]
  fn store_to_same_local_is_overwritten() {
    let mut bco = BytecodeObject::new();
    bco.add_instruction(Major::Store, Storage::Local as u8, 0);
    let tracer = LocalTracer::new();
    assert!(tracer.is_overwritten_local(&bco, 0, 0, STORE_DEPTH));
  }

  #[test]
  fn push_of_same_local_blocks_overwrite() {
    let mut bco = BytecodeObject::new();
    bco.add_instruction(Major::Push, Storage::Local as u8, 0);
    bco.add_instruction(Major::Store, Storage::Local as u8, 0);
    let tracer = LocalTracer::new();
    assert!(!tracer.is_overwritten_local(&bco, 0, 0, STORE_DEPTH));
  }

  #[test]
  fn depth_exhaustion_is_conservative() {
    let mut bco = BytecodeObject::new();
    for _ in 0..5 {
      bco.add_instruction(Major::Stack, StackOp::Drop as u8, 1);
    }
    bco.add_instruction(Major::Store, Storage::Local as u8, 0);
    let tracer = LocalTracer::new();
    assert!(!tracer.is_overwritten_local(&bco, 0, 0, 3));
    assert!(tracer.is_overwritten_local(&bco, 0, 0, 10));
  }

  #[test]
  fn indirect_call_blocks_overwrite() {
    let mut bco = BytecodeObject::new();
    bco.add_instruction(Major::Indirect, 0, 0);
    bco.add_instruction(Major::Store, Storage::Local as u8, 0);
    let tracer = LocalTracer::new();
    assert!(!tracer.is_overwritten_local(&bco, 0, 0, STORE_DEPTH));
  }

  #[test]
  fn exception_handling_blocks_throwing_ops() {
    let mut bco = BytecodeObject::new();
    bco.add_catch(bco.make_label());
    bco.add_instruction(Major::Unary, UnaryOp::Neg.as_u8(), 0);
    bco.add_instruction(Major::Store, Storage::Local as u8, 0);
    let tracer = LocalTracer::new();
    assert!(!tracer.is_overwritten_local(&bco, 1, 0, STORE_DEPTH));
  }

  #[test]
  fn conditional_jump_requires_both_paths_to_overwrite() {
    // JIfTrue L1; Store local 0; Jump L2; L1: Store local 0; L2:
    let mut bco = BytecodeObject::new();
    let l1 = bco.make_label();
    let l2 = bco.make_label();
    bco.add_jump(JumpMinor::IF_TRUE, l1);
    bco.add_instruction(Major::Store, Storage::Local as u8, 0);
    bco.add_jump(JumpMinor::ALWAYS, l2);
    bco.add_label(l1);
    bco.add_instruction(Major::Store, Storage::Local as u8, 0);
    bco.add_label(l2);

    let tracer = LocalTracer::new();
    assert!(tracer.is_overwritten_local(&bco, 0, 0, STORE_DEPTH));
  }

  #[test]
  fn conditional_jump_fails_if_either_path_misses() {
    // JIfTrue L1; Store local 0; Jump L2; L1: Drop 1; L2:  (taken branch reads nothing)
    let mut bco = BytecodeObject::new();
    let l1 = bco.make_label();
    let l2 = bco.make_label();
    bco.add_jump(JumpMinor::IF_TRUE, l1);
    bco.add_instruction(Major::Store, Storage::Local as u8, 0);
    bco.add_jump(JumpMinor::ALWAYS, l2);
    bco.add_label(l1);
    bco.add_instruction(Major::Stack, StackOp::Drop as u8, 1);
    bco.add_label(l2);

    let tracer = LocalTracer::new();
    assert!(!tracer.is_overwritten_local(&bco, 0, 0, STORE_DEPTH));
  }

  #[test]
  fn catch_blocks_overwrite() {
    let mut bco = BytecodeObject::new();
    let l = bco.make_label();
    bco.add_catch(l);
    bco.add_instruction(Major::Store, Storage::Local as u8, 0);
    bco.add_label(l);
    let tracer = LocalTracer::new();
    assert!(!tracer.is_overwritten_local(&bco, 0, 0, STORE_DEPTH));
  }
}
