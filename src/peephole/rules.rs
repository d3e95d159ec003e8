//! The rewrite catalog itself (§4.6). Each `try_*` function examines a
//! fixed window starting at `pc` and either performs its rewrite and
//! returns `true`, or leaves the code untouched and returns `false`.
//! `apply_rules_at` tries them in the catalog's order and stops at the
//! first one that fires — §4.6's "at most one rewrite per position per
//! outer iteration" is satisfied a fortiori, since at most one rule of any
//! kind fires per position per pass.

use log::trace;

use super::{clear_instruction, LabelInfo};
use crate::bco::BytecodeObject;
use crate::opcode::{im, BinaryOp, JumpMinor, Major, Opcode, SpecialOp, StackOp, Storage};
use crate::value::{execute_unary_operation, UnaryOp, Value};

/// Runs `$call`, and if it fired, logs the rule name and program counter
/// (SPEC_FULL's Logging section: "each fired peephole rewrite logs at
/// `trace` level with the rule name and program counter", mirroring the
/// original optimizer's `printf("  %s applied at %d\n", ...)` debug trace).
macro_rules! rule {
  ($name:literal, $pc:expr, $call:expr) => {{
    let fired = $call;
    if fired {
      trace!("{} applied at pc={}", $name, $pc);
    }
    fired
  }};
}

pub(super) fn apply_rules_at(
  bco: &mut BytecodeObject,
  label_info: &mut [LabelInfo],
  pc: usize,
  level: u8,
  allow_backward_jump: &mut bool,
) -> bool {
  rule!("StoreDrop", pc, try_store_drop(bco, pc))
    || rule!("StoreDropMember", pc, try_store_drop_member(bco, pc))
    || rule!("MergeDrop", pc, try_merge_drop(bco, label_info, pc))
    || rule!("NullOp", pc, try_null_op(bco, label_info, pc))
    || rule!("EraseUnusedLabels", pc, try_erase_unused_label(bco, label_info, pc))
    || rule!("InvertJumps", pc, try_invert_jumps(bco, label_info, pc))
    || rule!("ThreadJumps", pc, try_thread_jumps(bco, label_info, pc, allow_backward_jump))
    || rule!("MergeJumps", pc, try_merge_jumps(bco, label_info, pc))
    || rule!("RemoveUnused", pc, try_remove_unused(bco, label_info, pc))
    || rule!("MergeNegation", pc, try_merge_negation(bco, pc))
    || rule!("UnaryCondition", pc, try_unary_condition(bco, label_info, pc))
    || rule!("FoldUnaryInt", pc, try_fold_unary_int(bco, pc))
    || rule!("FoldBinaryInt", pc, try_fold_binary_int(bco, pc))
    || rule!("FoldBinaryTypeCheck", pc, try_fold_binary_type_check(bco, pc))
    || rule!("FoldJump", pc, try_fold_jump(bco, label_info, pc))
    || rule!("PopPush", pc, try_pop_push(bco, pc))
    || rule!("CompareNC", pc, try_compare_nc(bco, pc))
    || rule!("IntCompare", pc, try_int_compare(bco, pc))
    || rule!("TailMerge", pc, try_level2_at(bco, label_info, pc, level))
}

/// `TailMerge` is only compiled in when the `level2` feature is enabled
/// (§4.6, SPEC_FULL's Configuration section): it trades debug line-number
/// precision for size and is opt-in at the Cargo level, not just at runtime.
#[cfg(feature = "level2")]
fn try_level2_at(bco: &mut BytecodeObject, label_info: &mut [LabelInfo], pc: usize, level: u8) -> bool {
  level >= 2 && try_tail_merge(bco, label_info, pc)
}

#[cfg(not(feature = "level2"))]
fn try_level2_at(_bco: &mut BytecodeObject, _label_info: &mut [LabelInfo], _pc: usize, _level: u8) -> bool {
  false
}

fn window2(bco: &BytecodeObject, pc: usize) -> Option<(Opcode, Opcode)> {
  if pc + 1 < bco.num_instructions() {
    Some((bco.get(pc), bco.get(pc + 1)))
  } else {
    None
  }
}

/// `(Store s, Drop n>0)` -> `(Pop s, Drop n-1)` (§4.6 `StoreDrop`).
fn try_store_drop(bco: &mut BytecodeObject, pc: usize) -> bool {
  let (a, b) = match window2(bco, pc) {
    Some(w) => w,
    None => return false,
  };
  if a.major == Major::Store && b.major == Major::Stack && StackOp::from_u8(b.minor) == Some(StackOp::Drop) && b.arg > 0 {
    bco.get_mut(pc).major = Major::Pop;
    bco.get_mut(pc + 1).arg -= 1;
    true
  } else {
    false
  }
}

/// `(MemRef/Indirect store|load, Drop n>0)` -> kind becomes Pop/Call, Drop
/// decrements (§4.6 `StoreDropMember`, both MemRef and Indirect variants).
fn try_store_drop_member(bco: &mut BytecodeObject, pc: usize) -> bool {
  let (a, b) = match window2(bco, pc) {
    Some(w) => w,
    None => return false,
  };
  if !(a.major == Major::MemRef || a.major == Major::Indirect) {
    return false;
  }
  if !(b.major == Major::Stack && StackOp::from_u8(b.minor) == Some(StackOp::Drop) && b.arg > 0) {
    return false;
  }
  let new_kind = match im::kind(a.minor) {
    im::STORE => im::POP,
    im::LOAD => im::CALL,
    _ => return false,
  };
  bco.get_mut(pc).minor = im::with_kind(a.minor, new_kind);
  bco.get_mut(pc + 1).arg -= 1;
  true
}

/// `(Drop a, Drop b)` -> `Drop (a+b)`, second erased (§4.6 `MergeDrop`).
fn try_merge_drop(bco: &mut BytecodeObject, label_info: &mut [LabelInfo], pc: usize) -> bool {
  let (a, b) = match window2(bco, pc) {
    Some(w) => w,
    None => return false,
  };
  if a.major == Major::Stack
    && StackOp::from_u8(a.minor) == Some(StackOp::Drop)
    && b.major == Major::Stack
    && StackOp::from_u8(b.minor) == Some(StackOp::Drop)
  {
    match a.arg.checked_add(b.arg) {
      Some(sum) => {
        bco.get_mut(pc).arg = sum;
        clear_instruction(bco, label_info, pc + 1);
        true
      }
      None => false,
    }
  } else {
    false
  }
}

/// Erase `Drop 0` / `Swap 0` (§4.6 `NullOp`).
fn try_null_op(bco: &mut BytecodeObject, label_info: &mut [LabelInfo], pc: usize) -> bool {
  let op = bco.get(pc);
  if op.major != Major::Stack {
    return false;
  }
  let is_noop = op.arg == 0 && matches!(StackOp::from_u8(op.minor), Some(StackOp::Drop) | Some(StackOp::Swap));
  if is_noop {
    clear_instruction(bco, label_info, pc);
    true
  } else {
    false
  }
}

/// Erase a symbolic label placement with a zero use count (§4.6
/// `EraseUnusedLabels`). Doesn't go through `clear_instruction`: a label
/// placement's `arg` is its own id, not a reference to decrement.
fn try_erase_unused_label(bco: &mut BytecodeObject, label_info: &mut [LabelInfo], pc: usize) -> bool {
  let op = bco.get(pc);
  if !op.is_label() {
    return false;
  }
  let jm = op.jump_minor().unwrap();
  if !jm.symbolic() {
    return false;
  }
  let id = op.arg as usize;
  if label_info.get(id).map(|l| l.use_count == 0).unwrap_or(false) {
    *bco.get_mut(pc) = Opcode::nop();
    true
  } else {
    false
  }
}

/// `(J1 -> L, J2 -> X, L:)`: when J1's target is the label right after J2,
/// J2's own condition only needs to cover the cases J1 didn't already take.
/// Grounded directly on `doInvertJumps` in
/// `examples/original_source/interpreter/optimizer.cpp` (§4.6
/// `InvertJumps`): valid whenever J2 doesn't pop twice — either it doesn't
/// carry `PopAlways` itself, or J1 does but only if J2 is unconditional.
/// J2's rewritten condition is `J2.condition & !J1.condition`; if that comes
/// out empty, J2 is never taken and both jumps collapse away (leaving a
/// `Drop` behind if J1's popped predicate still needs discarding).
fn try_invert_jumps(bco: &mut BytecodeObject, label_info: &mut [LabelInfo], pc: usize) -> bool {
  if pc + 2 >= bco.num_instructions() {
    return false;
  }
  let j1 = bco.get(pc);
  let j2 = bco.get(pc + 1);
  let after = bco.get(pc + 2);
  if !(j1.is_regular_jump() && j2.is_regular_jump()) {
    return false;
  }
  let jm1 = j1.jump_minor().unwrap();
  let jm2 = j2.jump_minor().unwrap();
  if !(jm1.symbolic() && jm2.symbolic()) {
    return false;
  }
  if !(after.is_label() && after.jump_minor().unwrap().symbolic() && after.arg == j1.arg) {
    return false;
  }
  if !(!jm2.pop_always() && (!jm1.pop_always() || jm2.is_always())) {
    return false;
  }
  let new_condition = jm2.condition() & !jm1.condition() & JumpMinor::ALWAYS;
  let new_pop_always = jm1.pop_always();
  let target = j2.arg;
  clear_instruction(bco, label_info, pc);
  if new_condition == 0 {
    // J2 is never taken: eliminate both.
    clear_instruction(bco, label_info, pc + 1);
    if new_pop_always {
      *bco.get_mut(pc + 1) = Opcode::new(Major::Stack, StackOp::Drop as u8, 1);
    }
  } else {
    // J2 is taken sometimes: eliminate only J1, narrow J2's condition.
    *bco.get_mut(pc + 1) = Opcode::new(Major::Jump, JumpMinor::conditional(new_condition, new_pop_always, true).as_u8(), target);
  }
  true
}

/// Follows a jump's target through a run of labels and, while
/// `*allow_backward_jump` still permits it, through a chained unconditional
/// jump, retargeting `pc` directly at the end of the chain (§4.6
/// `ThreadJumps`).
fn try_thread_jumps(bco: &mut BytecodeObject, label_info: &mut [LabelInfo], pc: usize, allow_backward_jump: &mut bool) -> bool {
  let op = bco.get(pc);
  if !(op.is_regular_jump() && op.jump_minor().unwrap().symbolic()) {
    return false;
  }
  let n = bco.num_instructions();
  let mut target_pc = bco.get_jump_target(op.minor, op.arg);
  let mut final_id = op.arg;
  let mut hops = 0usize;
  loop {
    if target_pc >= n || hops > n {
      break;
    }
    let t = bco.get(target_pc);
    if t.is_label() {
      if t.jump_minor().unwrap().symbolic() {
        final_id = t.arg;
      }
      target_pc += 1;
      hops += 1;
      continue;
    }
    if t.is_regular_jump() && t.jump_minor().unwrap().symbolic() && t.jump_minor().unwrap().is_always() {
      let next_pc = bco.get_jump_target(t.minor, t.arg);
      let backward = next_pc <= target_pc;
      if backward {
        if *allow_backward_jump {
          *allow_backward_jump = false;
        } else {
          break;
        }
      }
      final_id = t.arg;
      target_pc = next_pc;
      hops += 1;
      continue;
    }
    break;
  }
  if final_id == op.arg {
    return false;
  }
  if let Some(entry) = label_info.get_mut(op.arg as usize) {
    entry.use_count = entry.use_count.saturating_sub(1);
  }
  if let Some(entry) = label_info.get_mut(final_id as usize) {
    entry.use_count += 1;
  }
  bco.get_mut(pc).arg = final_id;
  true
}

/// `(Jxx -> L, J -> L)`: both paths always end at `L`, so the first jump is
/// dead — either a `Drop 1` (if it consumed its predicate) or a NOP
/// (§4.6 `MergeJumps`).
fn try_merge_jumps(bco: &mut BytecodeObject, label_info: &mut [LabelInfo], pc: usize) -> bool {
  let (j1, j2) = match window2(bco, pc) {
    Some(w) => w,
    None => return false,
  };
  if !(j1.is_regular_jump() && j2.is_regular_jump()) {
    return false;
  }
  let jm1 = j1.jump_minor().unwrap();
  let jm2 = j2.jump_minor().unwrap();
  if !(jm1.symbolic() && jm2.symbolic() && jm2.is_always() && j1.arg == j2.arg) {
    return false;
  }
  if let Some(entry) = label_info.get_mut(j1.arg as usize) {
    entry.use_count = entry.use_count.saturating_sub(1);
  }
  if jm1.pop_always() {
    *bco.get_mut(pc) = Opcode::new(Major::Stack, StackOp::Drop as u8, 1);
  } else {
    *bco.get_mut(pc) = Opcode::nop();
  }
  true
}

/// After an unconditional jump or a `Special` terminator, erase every
/// instruction up to the next real (symbolic) label (§4.6 `RemoveUnused`).
fn try_remove_unused(bco: &mut BytecodeObject, label_info: &mut [LabelInfo], pc: usize) -> bool {
  let op = bco.get(pc);
  let is_terminal = (op.is_regular_jump() && op.jump_minor().unwrap().is_always())
    || (op.major == Major::Special && SpecialOp::from_u8(op.minor).map(SpecialOp::is_terminator).unwrap_or(false));
  if !is_terminal {
    return false;
  }
  let mut changed = false;
  let mut i = pc + 1;
  while i < bco.num_instructions() {
    let next = bco.get(i);
    if next.is_label() && next.jump_minor().map(|j| j.symbolic()).unwrap_or(false) {
      break;
    }
    if next != Opcode::nop() {
      clear_instruction(bco, label_info, i);
      changed = true;
    }
    i += 1;
  }
  changed
}

/// Pairwise unary-negation simplifications (§4.6 `MergeNegation`); exactly
/// the five pairs `spec.md` enumerates — see `DESIGN.md`.
fn try_merge_negation(bco: &mut BytecodeObject, pc: usize) -> bool {
  let (a, b) = match window2(bco, pc) {
    Some(w) => w,
    None => return false,
  };
  if a.major != Major::Unary || b.major != Major::Unary {
    return false;
  }
  let (ua, ub) = match (UnaryOp::from_u8(a.minor), UnaryOp::from_u8(b.minor)) {
    (Some(x), Some(y)) => (x, y),
    _ => return false,
  };
  use UnaryOp::*;
  match (ua, ub) {
    (Not, Not) => {
      bco.get_mut(pc).minor = Bool.as_u8();
      *bco.get_mut(pc + 1) = Opcode::nop();
      true
    }
    (Not, Bool) => {
      bco.get_mut(pc).minor = Not.as_u8();
      *bco.get_mut(pc + 1) = Opcode::nop();
      true
    }
    (Bool, Zap) => {
      bco.get_mut(pc).minor = Zap.as_u8();
      bco.get_mut(pc + 1).minor = Bool.as_u8();
      true
    }
    (Inc, Dec) => {
      bco.get_mut(pc).minor = Pos.as_u8();
      *bco.get_mut(pc + 1) = Opcode::nop();
      true
    }
    (IsEmpty, IsEmpty) => {
      // isEmpty(isEmpty(x)) is always false, regardless of x.
      *bco.get_mut(pc) = Opcode::new(Major::Stack, StackOp::Drop as u8, 1);
      *bco.get_mut(pc + 1) = Opcode::new(Major::Push, Storage::Boolean as u8, 0);
      true
    }
    _ => false,
  }
}

/// `(Unary unIsEmpty, J PopAlways)`: push the condition test through the
/// unary via its truth table; a condition that becomes unsatisfiable turns
/// the jump into an unconditional `Drop 1` (§4.6 `UnaryCondition`). Only
/// the `unIsEmpty` case `spec.md` gives is implemented — see `DESIGN.md`.
fn try_unary_condition(bco: &mut BytecodeObject, label_info: &mut [LabelInfo], pc: usize) -> bool {
  let (u, j) = match window2(bco, pc) {
    Some(w) => w,
    None => return false,
  };
  if u.major != Major::Unary || UnaryOp::from_u8(u.minor) != Some(UnaryOp::IsEmpty) {
    return false;
  }
  if !(j.is_regular_jump() && j.jump_minor().unwrap().pop_always()) {
    return false;
  }
  let jm = j.jump_minor().unwrap();
  let old_cond = jm.condition();
  // unIsEmpty's truth table (§4.6): true -> empty, false -> {true, false},
  // empty -> unreachable (isEmpty never itself produces empty), so
  // `old_cond`'s own IF_EMPTY bit contributes nothing to `new_cond`.
  let mut new_cond = 0u8;
  if old_cond & JumpMinor::IF_TRUE != 0 {
    new_cond |= JumpMinor::IF_EMPTY;
  }
  if old_cond & JumpMinor::IF_FALSE != 0 {
    new_cond |= JumpMinor::IF_TRUE | JumpMinor::IF_FALSE;
  }
  *bco.get_mut(pc) = Opcode::nop();
  if new_cond == 0 {
    if let Some(entry) = label_info.get_mut(j.arg as usize) {
      entry.use_count = entry.use_count.saturating_sub(1);
    }
    *bco.get_mut(pc + 1) = Opcode::new(Major::Stack, StackOp::Drop as u8, 1);
  } else {
    bco.get_mut(pc + 1).minor = JumpMinor::conditional(new_cond, jm.pop_always(), jm.symbolic()).as_u8();
  }
  true
}

fn immediate_to_value(storage: Storage, arg: u16) -> Option<Value> {
  let imm = arg as i16;
  match storage {
    Storage::Integer => Some(Value::Integer(imm as i32)),
    Storage::Boolean => {
      if imm == -1 {
        Some(Value::Boolean(None))
      } else {
        Some(Value::boolean(imm != 0))
      }
    }
    _ => None,
  }
}

fn value_to_immediate(v: &Value) -> Option<(Storage, u16)> {
  if v.is_empty() {
    return Some((Storage::Boolean, (-1i16) as u16));
  }
  v.as_small_immediate().map(|(is_bool, imm)| {
    let storage = if is_bool { Storage::Boolean } else { Storage::Integer };
    (storage, imm as u16)
  })
}

/// `(PushInteger/PushBoolean imm, Unary)` -> evaluate and replace with the
/// folded immediate; leaves the code untouched on a type error or on a
/// result too wide for an immediate operand (§4.6 `FoldUnaryInt`, §7
/// `FoldingSoftFailure`).
fn try_fold_unary_int(bco: &mut BytecodeObject, pc: usize) -> bool {
  let (push, unary) = match window2(bco, pc) {
    Some(w) => w,
    None => return false,
  };
  if push.major != Major::Push || unary.major != Major::Unary {
    return false;
  }
  let storage = match Storage::from_u8(push.minor) {
    Some(s @ (Storage::Integer | Storage::Boolean)) => s,
    _ => return false,
  };
  let op = match UnaryOp::from_u8(unary.minor) {
    Some(o) => o,
    None => return false,
  };
  let v = match immediate_to_value(storage, push.arg) {
    Some(v) => v,
    None => return false,
  };
  let result = match execute_unary_operation(op, &v) {
    Ok(r) => r,
    Err(_) => return false,
  };
  match value_to_immediate(&result) {
    Some((new_storage, new_arg)) => {
      bco.get_mut(pc).minor = new_storage as u8;
      bco.get_mut(pc).arg = new_arg;
      *bco.get_mut(pc + 1) = Opcode::nop();
      true
    }
    None => false,
  }
}

/// `(PushInteger {0,1,-1}, arithmetic Binary)` -> equivalent `Unary`, push
/// erased (§4.6 `FoldBinaryInt`).
fn try_fold_binary_int(bco: &mut BytecodeObject, pc: usize) -> bool {
  let (push, binary) = match window2(bco, pc) {
    Some(w) => w,
    None => return false,
  };
  if push.major != Major::Push || Storage::from_u8(push.minor) != Some(Storage::Integer) {
    return false;
  }
  if binary.major != Major::Binary {
    return false;
  }
  let op = match BinaryOp::from_u8(binary.minor) {
    Some(o) if o.is_arithmetic() => o,
    _ => return false,
  };
  let imm = push.arg as i16;
  use BinaryOp::*;
  let new_unary = match (op, imm) {
    (Add, 0) | (Sub, 0) => Some(UnaryOp::Pos),
    (Add, 1) | (Sub, -1) => Some(UnaryOp::Inc),
    (Add, -1) | (Sub, 1) => Some(UnaryOp::Dec),
    (Mult, 1) | (Divide, 1) | (IntegerDivide, 1) | (Pow, 1) => Some(UnaryOp::Pos),
    (Mult, -1) | (Divide, -1) | (IntegerDivide, -1) => Some(UnaryOp::Neg),
    _ => None,
  };
  match new_unary {
    Some(u) => {
      *bco.get_mut(pc) = Opcode::nop();
      bco.get_mut(pc + 1).major = Major::Unary;
      bco.get_mut(pc + 1).minor = u.as_u8();
      true
    }
    None => false,
  }
}

/// After a `Binary` whose result type is provably known, erase a redundant
/// following type-check `Unary` (`unBool` after a boolean-producing op,
/// `unPos` after a numeric-producing one) (§4.6 `FoldBinaryTypeCheck`).
fn try_fold_binary_type_check(bco: &mut BytecodeObject, pc: usize) -> bool {
  let (bin, una) = match window2(bco, pc) {
    Some(w) => w,
    None => return false,
  };
  if bin.major != Major::Binary || una.major != Major::Unary {
    return false;
  }
  let op = match BinaryOp::from_u8(bin.minor) {
    Some(o) => o,
    None => return false,
  };
  let u = match UnaryOp::from_u8(una.minor) {
    Some(u) => u,
    None => return false,
  };
  let applies = (op.produces_boolean() && u == UnaryOp::Bool) || (op.produces_numeric() && u == UnaryOp::Pos);
  if applies {
    *bco.get_mut(pc + 1) = Opcode::nop();
    true
  } else {
    false
  }
}

/// `(PushInteger/PushBoolean imm, J)` -> constant-fold the branch. When
/// always skipped, both instructions are dead. When always taken and the
/// jump pops its predicate unconditionally, the push is now redundant; when
/// it doesn't pop, the immediate must stay (callees at the target read it
/// off the stack) and only the jump's condition collapses to `Always`
/// (§4.6 `FoldJump`).
fn try_fold_jump(bco: &mut BytecodeObject, label_info: &mut [LabelInfo], pc: usize) -> bool {
  let (push, jump) = match window2(bco, pc) {
    Some(w) => w,
    None => return false,
  };
  if push.major != Major::Push {
    return false;
  }
  let storage = match Storage::from_u8(push.minor) {
    Some(s @ (Storage::Integer | Storage::Boolean)) => s,
    _ => return false,
  };
  if !(jump.is_regular_jump() && jump.jump_minor().unwrap().symbolic()) {
    return false;
  }
  let v = match immediate_to_value(storage, push.arg) {
    Some(v) => v,
    None => return false,
  };
  let jm = jump.jump_minor().unwrap();
  let taken = match v.as_bool() {
    Some(true) => jm.condition() & JumpMinor::IF_TRUE != 0,
    Some(false) => jm.condition() & JumpMinor::IF_FALSE != 0,
    None => jm.condition() & JumpMinor::IF_EMPTY != 0,
  };
  if taken {
    if jm.pop_always() {
      *bco.get_mut(pc) = Opcode::nop();
    }
    bco.get_mut(pc + 1).minor = JumpMinor::conditional(JumpMinor::ALWAYS, jm.pop_always(), true).as_u8();
  } else {
    *bco.get_mut(pc) = Opcode::nop();
    if let Some(entry) = label_info.get_mut(jump.arg as usize) {
      entry.use_count = entry.use_count.saturating_sub(1);
    }
    *bco.get_mut(pc + 1) = Opcode::nop();
  }
  true
}

/// `(Pop s, Push s)` of the same non-named address -> `Store s`, push
/// erased (§4.6 `PopPush`).
fn try_pop_push(bco: &mut BytecodeObject, pc: usize) -> bool {
  let (pop, push) = match window2(bco, pc) {
    Some(w) => w,
    None => return false,
  };
  if pop.major != Major::Pop || push.major != Major::Push {
    return false;
  }
  if pop.minor != push.minor || pop.arg != push.arg {
    return false;
  }
  if Storage::from_u8(pop.minor) == Some(Storage::NamedVariable) {
    return false;
  }
  bco.get_mut(pc).major = Major::Store;
  *bco.get_mut(pc + 1) = Opcode::nop();
  true
}

/// `(Push safe-literal, Binary case-blind op)` -> rewrite to the
/// case-sensitive cousin, when the literal's case can't affect the result
/// (a scalar, or a string with no alphanumerics) (§4.6 `CompareNC`).
fn try_compare_nc(bco: &mut BytecodeObject, pc: usize) -> bool {
  let (push, binary) = match window2(bco, pc) {
    Some(w) => w,
    None => return false,
  };
  if push.major != Major::Push || binary.major != Major::Binary {
    return false;
  }
  let op = match BinaryOp::from_u8(binary.minor) {
    Some(o) => o,
    None => return false,
  };
  let cousin = match op.case_sensitive_cousin() {
    Some(c) => c,
    None => return false,
  };
  let safe = match Storage::from_u8(push.minor) {
    Some(Storage::Integer) | Some(Storage::Boolean) => true,
    Some(Storage::Literal) => match bco.literal(push.arg) {
      Value::String(s) => !s.chars().any(|c| c.is_alphanumeric()),
      Value::Integer(_) | Value::Float(_) => true,
      _ => false,
    },
    _ => false,
  };
  if safe {
    bco.get_mut(pc + 1).minor = cousin.as_u8();
    true
  } else {
    false
  }
}

/// `(Binary int-op, PushInteger/PushBoolean 0, Binary CompareEQ/NE)` ->
/// test the int-op's own result directly: `== 0` becomes `unNot`, `!= 0`
/// becomes `unBool` (§4.6 `IntCompare`).
fn try_int_compare(bco: &mut BytecodeObject, pc: usize) -> bool {
  if pc + 2 >= bco.num_instructions() {
    return false;
  }
  let intop = bco.get(pc);
  let push = bco.get(pc + 1);
  let cmp = bco.get(pc + 2);
  if intop.major != Major::Binary {
    return false;
  }
  match BinaryOp::from_u8(intop.minor) {
    Some(o) if o.produces_numeric() => {}
    _ => return false,
  }
  if push.major != Major::Push {
    return false;
  }
  match Storage::from_u8(push.minor) {
    Some(Storage::Integer) | Some(Storage::Boolean) => {}
    _ => return false,
  }
  if push.arg as i16 != 0 {
    return false;
  }
  if cmp.major != Major::Binary {
    return false;
  }
  let new_unary = match BinaryOp::from_u8(cmp.minor) {
    Some(BinaryOp::CompareEQ) => UnaryOp::Not,
    Some(BinaryOp::CompareNE) => UnaryOp::Bool,
    _ => return false,
  };
  *bco.get_mut(pc + 1) = Opcode::nop();
  bco.get_mut(pc + 2).major = Major::Unary;
  bco.get_mut(pc + 2).minor = new_unary.as_u8();
  true
}

/// `level >= 2`: if the instruction right before an unconditional jump
/// equals the instruction right before an *existing* label that sits right
/// before the jump's target, retarget the jump one label earlier and erase
/// the now-redundant local copy (§4.6 `TailMerge`). Narrowed to the case
/// where that earlier label already exists — see `DESIGN.md`.
#[cfg(feature = "level2")]
fn try_tail_merge(bco: &mut BytecodeObject, label_info: &mut [LabelInfo], pc: usize) -> bool {
  if pc == 0 {
    return false;
  }
  let op = bco.get(pc);
  if !(op.is_regular_jump() && op.jump_minor().unwrap().symbolic() && op.jump_minor().unwrap().is_always()) {
    return false;
  }
  let target_pc = bco.get_jump_target(op.minor, op.arg);
  if target_pc < 2 {
    return false;
  }
  let our_tail = bco.get(pc - 1);
  let their_tail = bco.get(target_pc - 1);
  if our_tail.major == Major::Jump || our_tail != their_tail {
    return false;
  }
  let maybe_label = bco.get(target_pc - 2);
  if !(maybe_label.is_label() && maybe_label.jump_minor().unwrap().symbolic()) {
    return false;
  }
  let new_label = maybe_label.arg;
  let old_label = op.arg;
  if new_label == old_label {
    return false;
  }
  if let Some(entry) = label_info.get_mut(old_label as usize) {
    entry.use_count = entry.use_count.saturating_sub(1);
  }
  if let Some(entry) = label_info.get_mut(new_label as usize) {
    entry.use_count += 1;
  }
  bco.get_mut(pc).arg = new_label;
  *bco.get_mut(pc - 1) = Opcode::nop();
  true
}

/// `level >= 2`: scanning backward from every `Return` and from
/// end-of-code, erase dead stores/pops into locals, converting a dead pop
/// into `Drop 1`. Passes through push-immediate, unary, binary and label
/// instructions; stops the backward walk at anything else (§4.6
/// `DeadStore`).
#[cfg(feature = "level2")]
pub(super) fn apply_dead_store_pass(bco: &mut BytecodeObject, _label_info: &mut [LabelInfo]) -> bool {
  let n = bco.num_instructions();
  let mut scan_starts: Vec<usize> = bco
    .code()
    .iter()
    .enumerate()
    .filter(|(_, op)| op.major == Major::Special && SpecialOp::from_u8(op.minor) == Some(SpecialOp::Return))
    .map(|(i, _)| i)
    .collect();
  scan_starts.push(n);

  let mut changed = false;
  for start in scan_starts {
    let mut i = start;
    while i > 0 {
      i -= 1;
      let op = bco.get(i);
      let is_local_write = matches!(op.major, Major::Pop | Major::Store) && Storage::from_u8(op.minor) == Some(Storage::Local);
      if is_local_write {
        if op.major == Major::Store {
          if op != Opcode::nop() {
            *bco.get_mut(i) = Opcode::nop();
            changed = true;
          }
        } else {
          let drop1 = Opcode::new(Major::Stack, StackOp::Drop as u8, 1);
          if op != drop1 {
            *bco.get_mut(i) = drop1;
            changed = true;
          }
        }
        continue;
      }
      let passthrough = match op.major {
        Major::Push => matches!(Storage::from_u8(op.minor), Some(Storage::Integer) | Some(Storage::Boolean)),
        Major::Unary | Major::Binary => true,
        Major::Jump => op.is_label(),
        _ => false,
      };
      if !passthrough {
        break;
      }
    }
  }
  changed
}
