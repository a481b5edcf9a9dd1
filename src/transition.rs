//! Weighted next-state selection.
//!
//! Each state's transition row is normalized once into a cumulative
//! distribution and reused for every iteration. Selection draws a value in
//! `[0, 1)`, scales it by the row total, and scans for the first cumulative
//! bound above it; the final entry always absorbs whatever probability mass
//! floating-point rounding leaves over, so a draw can never fall through
//! without a match.

use std::collections::{BTreeMap, HashMap};

use rand::Rng;

/// A normalized cumulative-weight view of one state's transition row.
///
/// Zero-weight entries are dropped during normalization: they can never be
/// selected, and keeping them would let the residual-mass fallback land on
/// an entry the workload declared unreachable.
#[derive(Debug, Clone)]
pub struct TransitionRow {
    /// Target states paired with their cumulative weight bound, in
    /// declaration order.
    entries: Vec<(String, f64)>,
    total: f64,
}

impl TransitionRow {
    /// Builds a row from `(target, weight)` pairs in declaration order.
    ///
    /// Callers must have validated that at least one weight is positive;
    /// the loader rejects rows without a positive entry before a run
    /// starts.
    #[must_use]
    pub fn new(row: &[(String, f64)]) -> Self {
        let mut entries = Vec::with_capacity(row.len());
        let mut total = 0.0;
        for (target, weight) in row {
            if *weight > 0.0 {
                total += weight;
                entries.push((target.clone(), total));
            }
        }
        Self { entries, total }
    }

    /// Picks the target for a draw in `[0, 1)`.
    ///
    /// # Panics
    ///
    /// Panics if the row is empty, which validation rules out.
    #[must_use]
    pub fn pick(&self, draw: f64) -> &str {
        let scaled = draw * self.total;
        for (target, bound) in &self.entries {
            if scaled < *bound {
                return target;
            }
        }
        // Residual floating-point mass lands on the last entry.
        &self.entries.last().expect("row has a positive-weight entry").0
    }

    /// Number of selectable targets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the row has no selectable target.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// All of a workload's transition rows, normalized once and shared
/// read-only by every worker.
#[derive(Debug, Clone)]
pub struct TransitionTable {
    rows: HashMap<String, TransitionRow>,
}

impl TransitionTable {
    /// Normalizes every transition row of a workload.
    #[must_use]
    pub fn new(transitions: &BTreeMap<String, Vec<(String, f64)>>) -> Self {
        let rows = transitions
            .iter()
            .map(|(from, row)| (from.clone(), TransitionRow::new(row)))
            .collect();
        Self { rows }
    }

    /// Selects the next state from `from`'s row using the worker's RNG.
    ///
    /// Returns `None` when `from` has no row with a selectable target,
    /// which validation prevents for any reachable state.
    pub fn select<'a, R: Rng>(&'a self, from: &str, rng: &mut R) -> Option<&'a str> {
        let row = self.rows.get(from)?;
        if row.is_empty() {
            return None;
        }
        Some(row.pick(rng.gen::<f64>()))
    }
}
