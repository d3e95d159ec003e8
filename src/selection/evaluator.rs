//! Selection-expression evaluator (§4.8): word-parallel RPN over bit-vector
//! layers.
//!
//! Grounded directly on
//! `game::map::SelectionVector::executeCompiledExpression` in
//! `examples/original_source/game/map/selectionvector.cpp`: the same
//! per-word stack machine, run independently for every 32-bit word position
//! so the whole vector is computed without ever materializing a per-bit
//! loop.

use super::vector::SelectionVector;
use super::{OP_AND, OP_CURRENT, OP_FIRST_LAYER, OP_NOT, OP_ONE, OP_OR, OP_PLANET, OP_SHIP, OP_XOR, OP_ZERO};
use crate::error::EvalError;

/// §4.8: evaluates `program` against `layers`, producing `word_count` words.
/// `current_layer` indexes into `layers` for the `c` opcode; `is_planet`
/// selects which of `s`/`p` reads as all-ones.
pub fn evaluate(
  program: &[u8],
  layers: &[SelectionVector],
  current_layer: usize,
  word_count: usize,
  is_planet: bool,
) -> Result<Vec<u32>, EvalError> {
  let mut out = vec![0u32; word_count];
  for (i, slot) in out.iter_mut().enumerate() {
    let mut stack: Vec<u32> = Vec::new();
    for &byte in program {
      match byte {
        OP_AND => {
          let b = stack.pop().ok_or(EvalError)?;
          let a = stack.last_mut().ok_or(EvalError)?;
          *a &= b;
        }
        OP_OR => {
          let b = stack.pop().ok_or(EvalError)?;
          let a = stack.last_mut().ok_or(EvalError)?;
          *a |= b;
        }
        OP_XOR => {
          let b = stack.pop().ok_or(EvalError)?;
          let a = stack.last_mut().ok_or(EvalError)?;
          *a ^= b;
        }
        OP_NOT => {
          let a = stack.last_mut().ok_or(EvalError)?;
          *a = !*a;
        }
        OP_CURRENT => {
          let layer = layers.get(current_layer).ok_or(EvalError)?;
          stack.push(layer.word(i));
        }
        OP_SHIP => stack.push(if is_planet { 0 } else { u32::MAX }),
        OP_PLANET => stack.push(if is_planet { u32::MAX } else { 0 }),
        OP_ZERO => stack.push(0),
        OP_ONE => stack.push(u32::MAX),
        b if b >= OP_FIRST_LAYER => {
          let idx = (b - OP_FIRST_LAYER) as usize;
          let layer = layers.get(idx).ok_or(EvalError)?;
          stack.push(layer.word(i));
        }
        _ => return Err(EvalError),
      }
    }
    if stack.len() != 1 {
      return Err(EvalError);
    }
    *slot = stack[0];
  }
  Ok(out)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn layer_with(ids: &[i32]) -> SelectionVector {
    let mut v = SelectionVector::new();
    for &id in ids {
      v.set(id, true);
    }
    v
  }

  #[test]
  fn and_of_two_layers() {
    // S(A and B): s A B & &
    let a = layer_with(&[1, 2, 3]);
    let b = layer_with(&[2, 3]);
    let program = [OP_SHIP, b'A', b'B', OP_AND, OP_AND];
    let words = evaluate(&program, &[a, b], 0, 1, false).unwrap();
    let mut out = SelectionVector::new();
    out.set_words(words);
    assert!(!out.get(1));
    assert!(out.get(2));
    assert!(out.get(3));
  }

  #[test]
  fn subtraction_is_not_and() {
    // a - b: A B ! &
    let a = layer_with(&[1, 2, 3]);
    let b = layer_with(&[2, 3]);
    let program = [b'A', b'B', OP_NOT, OP_AND];
    let words = evaluate(&program, &[a, b], 0, 1, false).unwrap();
    let mut out = SelectionVector::new();
    out.set_words(words);
    assert!(out.get(1));
    assert!(!out.get(2));
    assert!(!out.get(3));
  }

  #[test]
  fn ship_and_planet_opcodes_are_complementary() {
    let program_ship = [OP_SHIP];
    let program_planet = [OP_PLANET];
    assert_eq!(evaluate(&program_ship, &[], 0, 1, false).unwrap(), vec![u32::MAX]);
    assert_eq!(evaluate(&program_ship, &[], 0, 1, true).unwrap(), vec![0]);
    assert_eq!(evaluate(&program_planet, &[], 0, 1, false).unwrap(), vec![0]);
    assert_eq!(evaluate(&program_planet, &[], 0, 1, true).unwrap(), vec![u32::MAX]);
  }

  #[test]
  fn stack_underflow_is_an_error() {
    let program = [OP_AND];
    assert_eq!(evaluate(&program, &[], 0, 1, false), Err(EvalError));
  }

  #[test]
  fn leftover_stack_depth_is_an_error() {
    let program = [OP_ZERO, OP_ONE];
    assert_eq!(evaluate(&program, &[], 0, 1, false), Err(EvalError));
  }

  #[test]
  fn out_of_range_layer_reference_is_an_error() {
    let program = [b'A'];
    assert_eq!(evaluate(&program, &[], 0, 1, false), Err(EvalError));
  }

  #[test]
  fn current_layer_reads_from_other_vectors() {
    let current = layer_with(&[9]);
    let program = [OP_CURRENT];
    let words = evaluate(&program, &[current], 0, 1, false).unwrap();
    let mut out = SelectionVector::new();
    out.set_words(words);
    assert!(out.get(9));
  }
}
