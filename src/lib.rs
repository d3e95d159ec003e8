//! `scriptbc`: the bytecode object model, instruction fusion, local-variable
//! reach analysis, peephole optimizer and bit-vector selection-expression
//! engine for an embedded scripting runtime.
//!
//! The three pieces compose in one direction: [`opcode`] and [`value`] are
//! the vocabulary; [`bco`] owns a program built from that vocabulary;
//! [`fusion`] and [`peephole`] rewrite a BCO in place; [`selection`] is a
//! small, independent RPN language over bit-vector layers that happens to
//! share this crate because both were carved out of the same host
//! application's scripting core.

pub mod bco;
pub mod error;
pub mod fusion;
pub mod namemap;
pub mod opcode;
pub mod peephole;
pub mod reach;
pub mod segment;
pub mod selection;
pub mod value;
