//! Core traits for the per-schema stores.

use std::sync::Arc;

use crate::event::DerivedEvent;

/// A pure, per-schema reducer over an immutable partition.
///
/// Implementors are parameterized by exactly one schema name and must return
/// the very same `Arc` (not merely an equal value) whenever an event does not
/// change anything, so callers can short-circuit with [`Arc::ptr_eq`].
pub trait Reducer {
  type State: Default;

  /// Schema name this reducer owns.
  fn schema(&self) -> &str;

  fn initial_state(&self) -> Arc<Self::State> {
    Arc::new(Self::State::default())
  }

  /// Apply `event` to `state`, producing the next partition.
  fn reduce(&self, state: &Arc<Self::State>, event: &DerivedEvent) -> Arc<Self::State>;

  /// Events addressed to other schemas are never applied.
  fn accepts(&self, event: &DerivedEvent) -> bool {
    event.schema() == self.schema()
  }
}
