//! Append-only, deduplicated name pool (§3 `NameMap`).
//!
//! Grounded on the teacher's use of `indexmap::IndexMap`/`IndexSet` for
//! exactly this shape of problem (a pool that hands out stable integer
//! indices and deduplicates by key) — see the teacher's `const_index_map`
//! field in `crates/op/src/builder.rs` and `crates/op/src/lib.rs`, which is a
//! `HashMap<Value, u32>` doing the same job for the literal pool; `NameMap`
//! here is the same idea specialized to `IndexSet<String>` so the pool order
//! *is* the index order for free.

use indexmap::IndexSet;

/// An append-only pool of unique names with stable, monotonically assigned
/// indices. Two BCOs' name pools are never merged in place; cross-BCO
/// references are re-interned (§4.2 `append`).
#[derive(Debug, Clone, Default)]
pub struct NameMap {
  names: IndexSet<String>,
}

impl NameMap {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  /// Interns `name`, returning its existing index if already present.
  pub fn add(&mut self, name: impl AsRef<str>) -> u16 {
    let name = name.as_ref();
    if let Some(idx) = self.names.get_index_of(name) {
      return idx as u16;
    }
    let (idx, _) = self.names.insert_full(name.to_owned());
    idx as u16
  }

  pub fn index_of(&self, name: impl AsRef<str>) -> Option<u16> {
    self.names.get_index_of(name.as_ref()).map(|i| i as u16)
  }

  pub fn contains(&self, name: impl AsRef<str>) -> bool {
    self.names.contains(name.as_ref())
  }

  pub fn name_at(&self, index: u16) -> &str {
    self
      .names
      .get_index(index as usize)
      .map(|s| s.as_str())
      .unwrap_or_else(|| panic!("NameMap index {index} out of range"))
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.names.iter().map(|s| s.as_str())
  }

  /// Appends `other`'s names into `self`, returning a translation table
  /// mapping `other`'s old indices to `self`'s new ones. Used by
  /// `BytecodeObject::copyLocalVariablesFrom`/`append` (§4.2).
  pub fn extend_from(&mut self, other: &NameMap) -> Vec<u16> {
    other.iter().map(|name| self.add(name)).collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn add_is_idempotent() {
    let mut names = NameMap::new();
    let a = names.add("foo");
    let b = names.add("bar");
    let c = names.add("foo");
    assert_eq!(a, c);
    assert_ne!(a, b);
    assert_eq!(names.name_at(a), "foo");
  }

  #[test]
  fn extend_from_remaps_by_name() {
    let mut a = NameMap::new();
    a.add("x");
    a.add("y");

    let mut b = NameMap::new();
    let shared = b.add("y");

    let table = b.extend_from(&a);
    // "x" is new to b, "y" already existed and keeps its index.
    assert_eq!(b.name_at(table[1]), "y");
    assert_eq!(table[1], shared);
  }
}
