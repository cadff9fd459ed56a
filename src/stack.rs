use dashmap::DashMap;
use nohash_hasher::BuildNoHashHasher;

use crate::event::{MethodId, ThreadEnv};

/// Logical call stacks of every thread that has entered a tracked method.
///
/// Each thread only ever touches its own entry, so the map needs no lock
/// beyond the per-shard one `DashMap` takes internally.
#[derive(Debug, Default)]
pub struct CallStackTracker {
  stacks: DashMap<ThreadEnv, Vec<MethodId>, BuildNoHashHasher<ThreadEnv>>,
}

impl CallStackTracker {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&self, thread: ThreadEnv, method: MethodId) {
    self.stacks.entry(thread).or_default().push(method);
  }

  /// Pop the innermost frame. Popping an empty stack is a no-op.
  pub fn pop(&self, thread: ThreadEnv) {
    if let Some(mut stack) = self.stacks.get_mut(&thread) {
      stack.pop();
    }
  }

  /// Innermost active method, or `None` when no frame is active.
  #[must_use]
  pub fn top(&self, thread: ThreadEnv) -> Option<MethodId> {
    self
      .stacks
      .get(&thread)
      .and_then(|stack| stack.last().copied())
  }

  #[must_use]
  pub fn depth(&self, thread: ThreadEnv) -> usize {
    self.stacks.get(&thread).map_or(0, |stack| stack.len())
  }

  /// Drop the stack of a thread that has exited.
  pub fn discard(&self, thread: ThreadEnv) {
    self.stacks.remove(&thread);
  }
}
