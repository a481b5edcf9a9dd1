//! Workload composition: derive a new definition from a base plus
//! overrides.
//!
//! Composition never mutates the base: the override receives a clone of
//! it and may reassign any field. State functions are `Arc`-shared, so a
//! derived definition inherits the base's functions by reference until
//! the override replaces an entry wholesale. Calling through to the
//! parent implementation is spelled out explicitly by cloning the base's
//! function before overriding it:
//!
//! ```ignore
//! let derived = extend(&base, |cfg, base| {
//!     let parent = base.states["insert"].clone();
//!     cfg.states.insert(
//!         "insert".to_string(),
//!         Arc::new(move |handle, coll, data| {
//!             parent(handle, coll, data)?;
//!             // extra behavior after the parent's
//!             Ok(())
//!         }),
//!     );
//!     cfg.thread_count = 5;
//! });
//! assert_eq!(derived.thread_count, 5);
//! ```

use crate::fixture::ClusterFixture;
use crate::workload::Workload;

/// Derives a workload definition from `base` plus an override.
///
/// The override receives `(&mut derived, &base)`; any field it does not
/// touch is inherited unchanged. Mutation-in-place is the supported
/// idiom. `base` is never mutated, so two derivations from the same base
/// are independent, and a derived definition may itself serve as a base
/// for further derivation.
pub fn extend<F, D, O>(base: &Workload<F, D>, override_fn: O) -> Workload<F, D>
where
    F: ClusterFixture,
    D: Clone,
    O: FnOnce(&mut Workload<F, D>, &Workload<F, D>),
{
    let mut derived = base.clone();
    override_fn(&mut derived, base);
    derived
}
