//! The instruction descriptor (§3, §4.1) and the small sub-vocabularies that
//! hang off its `minor` field: storage classes, jump condition bits, binary
//! and unary operation kinds, member-reference kinds, stack ops and special
//! ops.
//!
//! Grounded in shape on the teacher's opcode tables
//! (`crates/op/src/opcode.rs`, `src/internal/bytecode/opcode.rs`): a sealed,
//! exhaustively-enumerated instruction vocabulary with per-opcode metadata
//! (name, operand shape) used to drive both execution dispatch and
//! disassembly. This spec's instruction is flatter than the teacher's
//! variable-width byte stream — a fixed `(major, minor, arg)` triple (§9
//! DESIGN NOTES) — so the encoding machinery is simpler, but the
//! "exhaustive small enum + per-opcode `Display`/template" idiom is the
//! same one the teacher uses.

use std::fmt;

/// Coarse instruction family. `arg`'s meaning and `minor`'s vocabulary are
/// both determined by `major` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Major {
  Push,
  Pop,
  Store,
  Binary,
  Unary,
  Ternary,
  Jump,
  Indirect,
  Stack,
  MemRef,
  Dim,
  Special,
  FusedBinary,
  FusedUnary,
  FusedComparison,
  FusedComparison2,
  InplaceUnary,
}

impl Major {
  /// Projection of a fused major back to the un-fused family it replaced
  /// (§3 invariant, §4.4). Identity on non-fused majors.
  pub fn external_major(self) -> Major {
    match self {
      Major::FusedBinary => Major::Push,
      Major::FusedUnary => Major::Push,
      Major::InplaceUnary => Major::Push,
      Major::FusedComparison => Major::Binary,
      Major::FusedComparison2 => Major::Push,
      other => other,
    }
  }

  pub fn is_fused(self) -> bool {
    matches!(
      self,
      Major::FusedBinary
        | Major::FusedUnary
        | Major::FusedComparison
        | Major::FusedComparison2
        | Major::InplaceUnary
    )
  }
}

/// An instruction: `(major, minor, arg)` (§3, §9). `minor`'s interpretation
/// depends on `major` — see the `Storage`/`JumpMinor`/`BinaryOp`/`UnaryOp`/
/// `StackOp`/`MemRefKind`/`SpecialOp` helpers in this module for the typed
/// views onto it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opcode {
  pub major: Major,
  pub minor: u8,
  pub arg: u16,
}

impl Opcode {
  pub fn new(major: Major, minor: u8, arg: u16) -> Self {
    Opcode { major, minor, arg }
  }

  /// A zero-initialized `Jump` is a NOP (`Label` subop, no `Symbolic` bit,
  /// arg 0) — the hard constraint `spec.md` §6 calls out for `Label = 0`.
  pub fn nop() -> Self {
    Opcode::new(Major::Jump, JumpMinor::LABEL, 0)
  }

  /// `major = Jump`, minor ignoring the `Symbolic` bit equals `Label` (§4.1).
  pub fn is_label(&self) -> bool {
    self.major == Major::Jump && (self.minor & !JumpMinor::SYMBOLIC) == JumpMinor::LABEL
  }

  /// `major = Jump`, subop is `Label` or `Catch` (§4.1).
  pub fn is_jump_or_catch(&self) -> bool {
    self.major == Major::Jump
      && matches!(self.minor & !JumpMinor::SYMBOLIC, JumpMinor::LABEL | JumpMinor::CATCH)
  }

  /// `major = Jump`, subop is neither `Label` nor `Catch` (§4.1).
  pub fn is_regular_jump(&self) -> bool {
    self.major == Major::Jump
      && !matches!(self.minor & !JumpMinor::SYMBOLIC, JumpMinor::LABEL | JumpMinor::CATCH)
  }

  pub fn is_catch(&self) -> bool {
    self.major == Major::Jump && (self.minor & !JumpMinor::SYMBOLIC) == JumpMinor::CATCH
  }

  /// Cheap equality helper: `op.is(Major::Stack)` / used with raw minor
  /// constants such as `StackOp::DROP` (§4.1 `is(majorOrMinor)`).
  pub fn is_major(&self, major: Major) -> bool {
    self.major == major
  }

  pub fn is_minor(&self, minor: u8) -> bool {
    self.minor == minor
  }

  pub fn external_major(&self) -> Major {
    self.major.external_major()
  }

  /// The "is this a storage-class instruction" projection, valid for
  /// `Push`/`Pop`/`Store` and their fused/in-place counterparts (§3, §4.4).
  pub fn storage(&self) -> Option<Storage> {
    match self.major {
      Major::Push
      | Major::Pop
      | Major::Store
      | Major::FusedBinary
      | Major::FusedUnary
      | Major::FusedComparison2
      | Major::InplaceUnary => Storage::from_u8(self.minor),
      _ => None,
    }
  }

  pub fn is_direct_push(&self) -> bool {
    self.major == Major::Push && self.storage().map(|s| s.is_direct()).unwrap_or(false)
  }

  pub fn jump_minor(&self) -> Option<JumpMinor> {
    (self.major == Major::Jump).then(|| JumpMinor(self.minor))
  }

  /// Produces the format-string template consumed by the BCO disassembler
  /// (§4.1 `getDisassemblyTemplate`). Specifier letters: `%n` name pool,
  /// `%l` literal pool, `%L` local pool by address, `%G` shared pool by
  /// address, `%d`/`%u` signed/unsigned decimal.
  pub fn disassembly_template(&self) -> &'static str {
    match self.major {
      Major::Push | Major::Pop | Major::Store | Major::FusedBinary | Major::FusedUnary
      | Major::FusedComparison2 | Major::InplaceUnary => match self.storage() {
        Some(Storage::Literal) => "%l",
        Some(Storage::Local) => "%L",
        Some(Storage::Shared) | Some(Storage::NamedShared) => "%G",
        Some(Storage::NamedVariable) => "%n",
        Some(Storage::Integer) | Some(Storage::Static) => "%d",
        Some(Storage::Boolean) => "%d",
        None => "?",
      },
      Major::Binary | Major::FusedComparison => "",
      Major::Unary => "",
      Major::Ternary => "",
      Major::Jump => "%u",
      Major::Indirect | Major::MemRef => "%n",
      Major::Stack => "%u",
      Major::Dim => "%n",
      Major::Special => "%n",
    }
  }
}

impl fmt::Display for Opcode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:?}/{} {}", self.major, self.minor, self.arg)
  }
}

/// Storage class: the `minor` of `Push`/`Pop`/`Store` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Storage {
  Literal = 0,
  Integer = 1,
  Boolean = 2,
  Local = 3,
  Static = 4,
  Shared = 5,
  NamedVariable = 6,
  NamedShared = 7,
}

impl Storage {
  pub fn from_u8(v: u8) -> Option<Storage> {
    use Storage::*;
    Some(match v {
      0 => Literal,
      1 => Integer,
      2 => Boolean,
      3 => Local,
      4 => Static,
      5 => Shared,
      6 => NamedVariable,
      7 => NamedShared,
      _ => return None,
    })
  }

  /// A storage class is *direct* if it refers to a pool with clean
  /// ownership semantics (§3): `Local`, `Static`, `Shared`, `NamedShared`,
  /// `Literal`. Fusion only applies to direct pushes (§4.4).
  pub fn is_direct(self) -> bool {
    matches!(
      self,
      Storage::Local | Storage::Static | Storage::Shared | Storage::NamedShared | Storage::Literal
    )
  }
}

/// Jump minor: condition bits, `PopAlways`, `Symbolic`, and the `Label`/
/// `Catch` subops (§3, §6). `Label = 0` so a zero-initialized `Jump` is a
/// NOP, per the hard constraint in §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpMinor(pub u8);

impl JumpMinor {
  pub const IF_TRUE: u8 = 1;
  pub const IF_FALSE: u8 = 2;
  pub const IF_EMPTY: u8 = 4;
  pub const ALWAYS: u8 = Self::IF_TRUE | Self::IF_FALSE | Self::IF_EMPTY;
  pub const POP_ALWAYS: u8 = 8;
  pub const SYMBOLIC: u8 = 16;
  /// Not a condition bit: a standalone subop value meaning "this Jump is a
  /// label placement, not a branch" (§3, §6).
  pub const LABEL: u8 = 0;
  /// Not a condition bit: a standalone subop value meaning "this Jump
  /// installs an exception handler" (§3).
  pub const CATCH: u8 = 32;

  pub fn condition(self) -> u8 {
    self.0 & Self::ALWAYS
  }

  pub fn is_always(self) -> bool {
    self.condition() == Self::ALWAYS
  }

  pub fn pop_always(self) -> bool {
    self.0 & Self::POP_ALWAYS != 0
  }

  pub fn symbolic(self) -> bool {
    self.0 & Self::SYMBOLIC != 0
  }

  pub fn with_symbolic(self, on: bool) -> JumpMinor {
    if on {
      JumpMinor(self.0 | Self::SYMBOLIC)
    } else {
      JumpMinor(self.0 & !Self::SYMBOLIC)
    }
  }

  pub fn conditional(condition: u8, pop_always: bool, symbolic: bool) -> JumpMinor {
    let mut v = condition & Self::ALWAYS;
    if pop_always {
      v |= Self::POP_ALWAYS;
    }
    if symbolic {
      v |= Self::SYMBOLIC;
    }
    JumpMinor(v)
  }

  pub fn label(symbolic: bool) -> JumpMinor {
    JumpMinor(if symbolic { Self::SYMBOLIC } else { 0 })
  }

  pub fn catch(symbolic: bool) -> JumpMinor {
    JumpMinor(Self::CATCH | if symbolic { Self::SYMBOLIC } else { 0 })
  }

  pub fn as_u8(self) -> u8 {
    self.0
  }
}

/// Binary-major operation kinds (§4.4, §4.6). NC (no-case) variants are
/// ordered directly after their case-sensitive cousin so `CompareNC`'s
/// "rewrite to minor - 1" rule (§4.6) is a plain arithmetic step, and so
/// `is_comparison` is a single contiguous range check, mirroring
/// `op.minor >= biCompareEQ && op.minor <= biCompareGT_NC` in
/// `examples/original_source/interpreter/fusion.cpp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BinaryOp {
  Add,
  Sub,
  Mult,
  Divide,
  IntegerDivide,
  Pow,
  BitAnd,
  BitOr,
  BitXor,
  ATan,
  ArrayDim,
  Concat,
  And,
  Or,
  Xor,
  CompareEQ,
  CompareEQNc,
  CompareNE,
  CompareNENc,
  CompareLE,
  CompareLENc,
  CompareLT,
  CompareLTNc,
  CompareGE,
  CompareGENc,
  CompareGT,
  CompareGTNc,
  Find,
  FindNc,
  First,
  FirstNc,
  Rest,
  RestNc,
}

impl BinaryOp {
  pub fn from_u8(v: u8) -> Option<BinaryOp> {
    use BinaryOp::*;
    const TABLE: &[BinaryOp] = &[
      Add, Sub, Mult, Divide, IntegerDivide, Pow, BitAnd, BitOr, BitXor, ATan, ArrayDim, Concat,
      And, Or, Xor, CompareEQ, CompareEQNc, CompareNE, CompareNENc, CompareLE, CompareLENc,
      CompareLT, CompareLTNc, CompareGE, CompareGENc, CompareGT, CompareGTNc, Find, FindNc,
      First, FirstNc, Rest, RestNc,
    ];
    TABLE.get(v as usize).copied()
  }

  pub fn as_u8(self) -> u8 {
    self as u8
  }

  /// §4.4 `isComparison`: binary comparison ops, contiguous range.
  pub fn is_comparison(self) -> bool {
    (BinaryOp::CompareEQ as u8..=BinaryOp::CompareGTNc as u8).contains(&(self as u8))
  }

  /// The case-sensitive cousin of a "no case" (case-blind) op, one slot
  /// earlier, if `self` is one (§4.6 `CompareNC`).
  pub fn case_sensitive_cousin(self) -> Option<BinaryOp> {
    use BinaryOp::*;
    match self {
      CompareEQNc | CompareNENc | CompareLENc | CompareLTNc | CompareGENc | CompareGTNc
      | FindNc | FirstNc | RestNc => BinaryOp::from_u8(self as u8 - 1),
      _ => None,
    }
  }

  /// §4.6 `FoldBinaryTypeCheck`: ops whose result is provably `Boolean`.
  pub fn produces_boolean(self) -> bool {
    use BinaryOp::*;
    matches!(self, And | Or | Xor) || self.is_comparison()
  }

  /// §4.6 `FoldBinaryTypeCheck`: ops whose result is provably numeric
  /// (arithmetic, comparison-`Find`, bitwise, `ATan`, `ArrayDim`).
  pub fn produces_numeric(self) -> bool {
    use BinaryOp::*;
    matches!(
      self,
      Add | Sub
        | Mult
        | Divide
        | IntegerDivide
        | Pow
        | BitAnd
        | BitOr
        | BitXor
        | ATan
        | ArrayDim
        | Find
        | FindNc
        | First
        | FirstNc
        | Rest
        | RestNc
    )
  }

  /// Plain arithmetic ops eligible for `FoldBinaryInt` (§4.6): the ones
  /// with a constant-operand special case (`+0`, `*1`, ...).
  pub fn is_arithmetic(self) -> bool {
    use BinaryOp::*;
    matches!(self, Add | Sub | Mult | Divide | IntegerDivide | Pow)
  }
}

pub use crate::value::UnaryOp;

/// `MemRef`/`Indirect` minor: a 2-bit operation kind plus caller-defined
/// addressing-mode bits above it. `StoreDropMember` (§4.6) only needs to
/// rewrite the kind bits (`Store` → `Pop`, `Load` → `Call`), leaving any
/// addressing bits untouched.
pub mod im {
  pub const KIND_MASK: u8 = 0b0000_0011;
  pub const LOAD: u8 = 0;
  pub const STORE: u8 = 1;
  pub const POP: u8 = 2;
  pub const CALL: u8 = 3;

  pub fn kind(minor: u8) -> u8 {
    minor & KIND_MASK
  }

  pub fn with_kind(minor: u8, kind: u8) -> u8 {
    (minor & !KIND_MASK) | (kind & KIND_MASK)
  }

  pub fn is_store(minor: u8) -> bool {
    kind(minor) == STORE
  }

  pub fn is_load(minor: u8) -> bool {
    kind(minor) == LOAD
  }
}

/// `Stack`-major minor: the operation kind; `arg` is the operand count
/// (§4.6 `MergeDrop`, `NullOp`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StackOp {
  Drop = 0,
  Swap = 1,
  Dup = 2,
}

impl StackOp {
  pub fn from_u8(v: u8) -> Option<StackOp> {
    match v {
      0 => Some(StackOp::Drop),
      1 => Some(StackOp::Swap),
      2 => Some(StackOp::Dup),
      _ => None,
    }
  }
}

/// `Special`-major minor (§4.2 `hasUserCall`, §4.6 `RemoveUnused`). Name-
/// bearing subops (`DefSub`, `DefShipProperty`, `DefPlanetProperty`) carry
/// a name-pool index in `arg` and are re-interned by `append` (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SpecialOp {
  DefSub,
  DefShipProperty,
  DefPlanetProperty,
  EvalStatement,
  EvalExpr,
  RunHook,
  Throw,
  Terminate,
  Return,
  Other,
}

impl SpecialOp {
  pub fn from_u8(v: u8) -> Option<SpecialOp> {
    use SpecialOp::*;
    const TABLE: &[SpecialOp] = &[
      DefSub,
      DefShipProperty,
      DefPlanetProperty,
      EvalStatement,
      EvalExpr,
      RunHook,
      Throw,
      Terminate,
      Return,
      Other,
    ];
    TABLE.get(v as usize).copied()
  }

  pub fn as_u8(self) -> u8 {
    self as u8
  }

  pub fn is_name_bearing(self) -> bool {
    matches!(
      self,
      SpecialOp::DefSub | SpecialOp::DefShipProperty | SpecialOp::DefPlanetProperty
    )
  }

  /// §4.2 `hasUserCall`: `EvalStatement`/`EvalExpr`/`RunHook` can invoke
  /// user-authored code.
  pub fn is_user_call(self) -> bool {
    matches!(self, SpecialOp::EvalStatement | SpecialOp::EvalExpr | SpecialOp::RunHook)
  }

  /// §4.6 `RemoveUnused`: control-flow terminators after which dead code
  /// up to the next label can be erased.
  pub fn is_terminator(self) -> bool {
    matches!(self, SpecialOp::Throw | SpecialOp::Terminate | SpecialOp::Return)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn label_is_zero() {
    assert_eq!(JumpMinor::LABEL, 0);
    let nop = Opcode::nop();
    assert!(nop.is_label());
    assert!(nop.is_jump_or_catch());
    assert!(!nop.is_regular_jump());
  }

  #[test]
  fn symbolic_label_is_still_a_label() {
    let op = Opcode::new(Major::Jump, JumpMinor::label(true).as_u8(), 3);
    assert!(op.is_label());
    assert!(op.jump_minor().unwrap().symbolic());
  }

  #[test]
  fn catch_is_jump_or_catch_but_not_regular() {
    let op = Opcode::new(Major::Jump, JumpMinor::catch(true).as_u8(), 0);
    assert!(op.is_jump_or_catch());
    assert!(!op.is_regular_jump());
    assert!(!op.is_label());
  }

  #[test]
  fn regular_conditional_jump_classifies_correctly() {
    let op = Opcode::new(
      Major::Jump,
      JumpMinor::conditional(JumpMinor::IF_TRUE, true, true).as_u8(),
      5,
    );
    assert!(op.is_regular_jump());
    assert!(!op.is_jump_or_catch());
    assert!(op.jump_minor().unwrap().pop_always());
  }

  #[test]
  fn external_major_projects_fused_forms() {
    assert_eq!(Major::FusedBinary.external_major(), Major::Push);
    assert_eq!(Major::FusedUnary.external_major(), Major::Push);
    assert_eq!(Major::InplaceUnary.external_major(), Major::Push);
    assert_eq!(Major::FusedComparison.external_major(), Major::Binary);
    assert_eq!(Major::FusedComparison2.external_major(), Major::Push);
    assert_eq!(Major::Binary.external_major(), Major::Binary);
  }

  #[test]
  fn direct_storage_classes() {
    assert!(Storage::Local.is_direct());
    assert!(Storage::Literal.is_direct());
    assert!(!Storage::NamedVariable.is_direct());
  }

  #[test]
  fn comparison_range_and_cousins() {
    assert!(BinaryOp::CompareEQ.is_comparison());
    assert!(BinaryOp::CompareGTNc.is_comparison());
    assert!(!BinaryOp::Add.is_comparison());
    assert_eq!(BinaryOp::CompareEQNc.case_sensitive_cousin(), Some(BinaryOp::CompareEQ));
    assert_eq!(BinaryOp::FindNc.case_sensitive_cousin(), Some(BinaryOp::Find));
    assert_eq!(BinaryOp::Add.case_sensitive_cousin(), None);
  }

  #[test]
  fn boolean_and_numeric_classification() {
    assert!(BinaryOp::And.produces_boolean());
    assert!(BinaryOp::CompareEQ.produces_boolean());
    assert!(!BinaryOp::Add.produces_boolean());
    assert!(BinaryOp::Add.produces_numeric());
    assert!(BinaryOp::BitAnd.produces_numeric());
    assert!(BinaryOp::Find.produces_numeric());
  }

  #[test]
  fn im_kind_roundtrip() {
    let minor = im::with_kind(0b1100, im::STORE);
    assert_eq!(im::kind(minor), im::STORE);
    let as_pop = im::with_kind(minor, im::POP);
    assert_eq!(im::kind(as_pop), im::POP);
    assert_eq!(as_pop & !im::KIND_MASK, 0b1100);
  }
}
