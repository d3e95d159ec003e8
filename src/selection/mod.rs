//! Selection expressions (§3, §4.7, §4.8): a tiny RPN language over bit-vector
//! layers, plus the `Selections` aggregate that owns those layers.
//!
//! Grounded directly on `interpreter::SelectionExpression` (opcodes +
//! compiler) and `game::map::SelectionVector`/`game::map::Selections`
//! (evaluator + layer ownership) in `examples/original_source/`.

pub mod compiler;
pub mod evaluator;
pub mod vector;

pub use compiler::compile;
pub use vector::{ObjectMarks, SelectionVector};

use crate::error::EvalError;

/// §6: the persisted opcode byte values. Part of the on-disk selection
/// format; must not be renumbered.
pub const OP_AND: u8 = b'&';
pub const OP_OR: u8 = b'|';
pub const OP_XOR: u8 = b'^';
pub const OP_NOT: u8 = b'!';
pub const OP_CURRENT: u8 = b'c';
pub const OP_SHIP: u8 = b's';
pub const OP_PLANET: u8 = b'p';
pub const OP_ZERO: u8 = b'0';
pub const OP_ONE: u8 = b'1';
/// §6: layer `n` is encoded as `OP_FIRST_LAYER + n`.
pub const OP_FIRST_LAYER: u8 = b'A';

/// §3, §4.7: number of selection layers (`A`..`H`).
pub const NUM_SELECTION_LAYERS: usize = 8;

/// §3 `Selections.Kind` — which per-layer sub-vector an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
  Ship,
  Planet,
}

/// §3 `Selections`: `N=8` layers x {Ship, Planet}, a current-layer cursor,
/// and a change signal.
///
/// Grounded on `game::map::Selections` in
/// `examples/original_source/game/map/selections.hpp`; its
/// `afl::base::Signal<void()> sig_selectionChange` becomes a small,
/// single-threaded observer registry owned by the struct itself (§9 DESIGN
/// NOTES: "Signals/listeners on Selections ... a small observer registry
/// embedded in the data structure, invoked by the owner").
pub struct Selections {
  ships: [SelectionVector; NUM_SELECTION_LAYERS],
  planets: [SelectionVector; NUM_SELECTION_LAYERS],
  current_layer: usize,
  on_change: Vec<Box<dyn FnMut()>>,
}

impl Default for Selections {
  fn default() -> Self {
    Selections::new()
  }
}

impl Selections {
  pub fn new() -> Self {
    Selections {
      ships: std::array::from_fn(|_| SelectionVector::new()),
      planets: std::array::from_fn(|_| SelectionVector::new()),
      current_layer: 0,
      on_change: Vec::new(),
    }
  }

  /// Resets every layer and the current-layer cursor to the blank
  /// post-constructor state. Does not itself fire the change signal, to
  /// match `Selections::clear` in the original which also does not.
  pub fn clear(&mut self) {
    for v in self.ships.iter_mut().chain(self.planets.iter_mut()) {
      v.clear();
    }
    self.current_layer = 0;
  }

  pub fn num_layers(&self) -> usize {
    NUM_SELECTION_LAYERS
  }

  pub fn current_layer(&self) -> usize {
    self.current_layer
  }

  pub fn set_current_layer(&mut self, layer: usize) {
    assert!(layer < NUM_SELECTION_LAYERS, "layer out of range");
    self.current_layer = layer;
    self.notify_change();
  }

  pub fn get(&self, kind: Kind, layer: usize) -> Option<&SelectionVector> {
    match kind {
      Kind::Ship => self.ships.get(layer),
      Kind::Planet => self.planets.get(layer),
    }
  }

  pub fn get_mut(&mut self, kind: Kind, layer: usize) -> Option<&mut SelectionVector> {
    match kind {
      Kind::Ship => self.ships.get_mut(layer),
      Kind::Planet => self.planets.get_mut(layer),
    }
  }

  /// Registers a no-argument callback invoked on every signal-bearing
  /// mutation (§9 "a small observer registry embedded in the data
  /// structure"). Dispatch is synchronous and single-threaded (§5).
  pub fn on_change(&mut self, callback: impl FnMut() + 'static) {
    self.on_change.push(Box::new(callback));
  }

  fn notify_change(&mut self) {
    for f in &mut self.on_change {
      f();
    }
  }

  /// §4.8, "Execute compiled expression": replaces `target_layer`'s content
  /// with the evaluated program; `opCurrent` in the expression refers to
  /// `target_layer` itself.
  pub fn execute_compiled_expression(
    &mut self,
    kind: Kind,
    program: &[u8],
    target_layer: usize,
    limit: usize,
  ) -> Result<(), EvalError> {
    self.execute_one(kind, program, target_layer, limit)?;
    self.notify_change();
    Ok(())
  }

  /// "Execute compiled expression on all layers": replaces every layer of
  /// both kinds, where `opCurrent` refers to the respective layer being
  /// computed.
  pub fn execute_compiled_expression_all(&mut self, program: &[u8], limit: usize) -> Result<(), EvalError> {
    for kind in [Kind::Ship, Kind::Planet] {
      for layer in 0..NUM_SELECTION_LAYERS {
        self.execute_one(kind, program, layer, limit)?;
      }
    }
    self.notify_change();
    Ok(())
  }

  fn execute_one(&mut self, kind: Kind, program: &[u8], target_layer: usize, limit: usize) -> Result<(), EvalError> {
    let is_planet = kind == Kind::Planet;
    let layers = match kind {
      Kind::Ship => &self.ships,
      Kind::Planet => &self.planets,
    };
    let word_count = limit / 32 + 1;
    let words = evaluator::evaluate(program, layers, target_layer, word_count, is_planet)?;
    let slot = match kind {
      Kind::Ship => &mut self.ships[target_layer],
      Kind::Planet => &mut self.planets[target_layer],
    };
    slot.set_words(words);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::cell::Cell;
  use std::rc::Rc;

  #[test]
  fn set_current_layer_fires_change_signal() {
    let mut s = Selections::new();
    let fired = Rc::new(Cell::new(false));
    let fired2 = fired.clone();
    s.on_change(move || fired2.set(true));
    s.set_current_layer(3);
    assert!(fired.get());
    assert_eq!(s.current_layer(), 3);
  }

  #[test]
  fn execute_compiled_expression_updates_target_layer_and_notifies() {
    let mut s = Selections::new();
    s.get_mut(Kind::Ship, 1).unwrap().set(5, true);
    let program = compile("A").unwrap();

    let count = Rc::new(Cell::new(0));
    let count2 = count.clone();
    s.on_change(move || count2.set(count2.get() + 1));

    s.execute_compiled_expression(Kind::Ship, &program, 0, 10).unwrap();
    assert!(s.get(Kind::Ship, 0).unwrap().get(5));
    assert_eq!(count.get(), 1);
  }

  #[test]
  fn execute_compiled_expression_all_covers_every_layer_and_kind() {
    let mut s = Selections::new();
    let program = compile("1").unwrap();
    s.execute_compiled_expression_all(&program, 40).unwrap();
    for layer in 0..NUM_SELECTION_LAYERS {
      assert!(s.get(Kind::Ship, layer).unwrap().get(0));
      assert!(s.get(Kind::Planet, layer).unwrap().get(0));
    }
  }

  #[test]
  fn clear_resets_layers_and_cursor() {
    let mut s = Selections::new();
    s.get_mut(Kind::Ship, 0).unwrap().set(1, true);
    s.set_current_layer(2);
    s.clear();
    assert_eq!(s.current_layer(), 0);
    assert!(!s.get(Kind::Ship, 0).unwrap().get(1));
  }
}
