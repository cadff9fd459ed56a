use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct GateState {
  collector: Option<ThreadId>,
  depth: usize,
  in_flight: usize,
}

/// Brackets a garbage collection against mutator events.
///
/// Between `begin_collection` and `end_collection` mutator events wait at
/// the gate; `begin_collection` itself waits until mutator events already
/// past the gate have finished. The collecting thread is never held up by
/// its own bracket.
#[derive(Debug, Default)]
pub struct CollectionGate {
  changed: Condvar,
  state: Mutex<GateState>,
}

/// Held by a mutator event while it runs.
#[must_use]
pub struct MutatorPass<'a> {
  gate: Option<&'a CollectionGate>,
}

impl Drop for MutatorPass<'_> {
  fn drop(&mut self) {
    if let Some(gate) = self.gate {
      let mut state = gate.state.lock();
      state.in_flight -= 1;
      if state.in_flight == 0 {
        gate.changed.notify_all();
      }
    }
  }
}

impl CollectionGate {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  /// Wait until no collection is in progress, then admit a mutator event.
  pub fn enter(&self) -> MutatorPass<'_> {
    let current = thread::current().id();
    let mut state = self.state.lock();

    if state.collector == Some(current) {
      return MutatorPass { gate: None };
    }

    self
      .changed
      .wait_while(&mut state, |state| state.collector.is_some());
    state.in_flight += 1;

    MutatorPass { gate: Some(self) }
  }

  /// Close the gate and wait for in-flight mutator events to drain.
  ///
  /// Nested calls from the collecting thread only deepen the bracket.
  pub fn begin_collection(&self) {
    let current = thread::current().id();
    let mut state = self.state.lock();

    if state.collector == Some(current) {
      state.depth += 1;
      tracing::warn!(depth = state.depth, "nested gc_start");
      return;
    }

    self
      .changed
      .wait_while(&mut state, |state| state.collector.is_some());
    state.collector = Some(current);
    state.depth = 1;

    self
      .changed
      .wait_while(&mut state, |state| state.in_flight > 0);
  }

  /// Reopen the gate. Returns `false` if no collection was open.
  pub fn end_collection(&self) -> bool {
    let mut state = self.state.lock();

    if state.depth == 0 {
      return false;
    }

    state.depth -= 1;
    if state.depth == 0 {
      state.collector = None;
      self.changed.notify_all();
    }

    true
  }

  #[must_use]
  pub fn is_collecting(&self) -> bool {
    self.state.lock().collector.is_some()
  }
}
