//! SymbolStorage - normalises symbol and usage facts before commit

use std::collections::HashSet;

use symdex_core::{Symbol, SymbolUsage};
use tracing::trace;

/// Prepares the symbol half of a file record.
///
/// A collector may report the same symbol many times (once per
/// declaration it sees). The stored record keeps one entry per symbol
/// identifier and one entry per distinct usage, both in a stable order so
/// that re-indexing an unchanged file produces an identical record.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymbolStorage;

impl SymbolStorage {
  pub fn new() -> Self {
    Self
  }

  /// Deduplicate by symbol identifier (first report wins) and sort by identifier.
  pub fn normalize_symbols(&self, symbols: Vec<Symbol>) -> Vec<Symbol> {
    let reported = symbols.len();
    let mut seen = HashSet::with_capacity(symbols.len());
    let mut unique: Vec<Symbol> = symbols.into_iter().filter(|symbol| seen.insert(symbol.id.clone())).collect();
    unique.sort_by(|a, b| a.id.cmp(&b.id));
    if unique.len() != reported {
      trace!(reported, kept = unique.len(), "Collapsed duplicate symbols");
    }
    unique
  }

  /// Drop exact duplicates and sort by location, then symbol.
  pub fn normalize_usages(&self, mut usages: Vec<SymbolUsage>) -> Vec<SymbolUsage> {
    usages.sort_by(|a, b| {
      a.location
        .cmp(&b.location)
        .then_with(|| a.symbol.cmp(&b.symbol))
        .then_with(|| a.kind.cmp(&b.kind))
    });
    usages.dedup();
    usages
  }
}
