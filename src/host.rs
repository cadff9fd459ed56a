use std::collections::HashMap;

use nohash_hasher::BuildNoHashHasher;
use parking_lot::Mutex;
use thiserror::Error;

use crate::error::ProfilerError;
use crate::event::{
  ClassId, ClassLoad, Event, ObjectAlloc, ObjectId, ObjectMove,
};
use crate::router::Profiler;

#[derive(Debug, Error)]
pub enum HostError {
  #[error("host does not support {0} replay")]
  Unsupported(&'static str),
  #[error("host has no definition for class {0:#x}")]
  UnknownClass(ClassId),
  #[error("host has no record of object {0:#x}")]
  UnknownObject(ObjectId),
  #[error("replayed event failed: {0}")]
  Replay(#[source] Box<ProfilerError>),
}

impl From<ProfilerError> for HostError {
  fn from(err: ProfilerError) -> Self {
    Self::Replay(Box::new(err))
  }
}

/// The runtime's side of replay requests.
///
/// Implementations answer synchronously: before returning they feed the
/// requested definition back through `profiler.handle` with `requested`
/// set, on the calling thread.
pub trait Host: Send + Sync {
  /// # Errors
  ///
  /// Fails if the host cannot re-emit the class definition.
  fn request_class_definition(
    &self,
    profiler: &Profiler,
    class: ClassId,
  ) -> Result<(), HostError>;

  /// # Errors
  ///
  /// Fails if the host cannot re-emit the allocation.
  fn request_object_alloc(
    &self,
    profiler: &Profiler,
    object: ObjectId,
  ) -> Result<(), HostError>;
}

/// A host that cannot replay anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedHost;

impl Host for DetachedHost {
  fn request_class_definition(
    &self,
    _profiler: &Profiler,
    _class: ClassId,
  ) -> Result<(), HostError> {
    Err(HostError::Unsupported("class definition"))
  }

  fn request_object_alloc(
    &self,
    _profiler: &Profiler,
    _object: ObjectId,
  ) -> Result<(), HostError> {
    Err(HostError::Unsupported("object allocation"))
  }
}

#[derive(Debug, Default)]
struct Recorded {
  classes: HashMap<ClassId, ClassLoad, BuildNoHashHasher<ClassId>>,
  objects: HashMap<ObjectId, ObjectAlloc, BuildNoHashHasher<ObjectId>>,
  requests: usize,
}

/// Stand-in for the runtime when events come from a recorded trace.
///
/// It keeps its own view of every class definition and live object it is
/// shown, independently of the profiler, and replays from that view.
#[derive(Debug, Default)]
pub struct RecordingHost {
  recorded: Mutex<Recorded>,
}

impl RecordingHost {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  /// Remember a class definition without passing it to the profiler.
  pub fn define(&self, load: ClassLoad) {
    self.recorded.lock().classes.insert(load.class, load);
  }

  /// Remember a live object without passing it to the profiler.
  pub fn remember(&self, alloc: ObjectAlloc) {
    self.recorded.lock().objects.insert(alloc.object, alloc);
  }

  /// Number of replay requests answered so far.
  #[must_use]
  pub fn requests(&self) -> usize {
    self.recorded.lock().requests
  }

  /// Update the host's own view with an event about to be delivered.
  pub fn observe(&self, event: &Event) {
    let mut recorded = self.recorded.lock();

    match event {
      Event::ClassLoad(load) => {
        recorded.classes.insert(load.class, load.clone());
      }
      Event::ObjectAlloc(alloc) => {
        recorded.objects.insert(alloc.object, alloc.clone());
      }
      Event::ObjectFree { object, .. } => {
        recorded.objects.remove(object);
      }
      Event::ObjectMove(ObjectMove {
        object,
        new_object,
        new_region,
        ..
      }) => {
        if let Some(mut alloc) = recorded.objects.remove(object) {
          alloc.object = *new_object;
          alloc.region = *new_region;
          recorded.objects.insert(*new_object, alloc);
        }
      }
      Event::RegionDestroy { region } => {
        recorded.objects.retain(|_, alloc| alloc.region != *region);
      }
      Event::ClassUnload { .. }
      | Event::GcStart
      | Event::GcFinish
      | Event::MethodEntry { .. }
      | Event::MethodExit { .. }
      | Event::ThreadEnd { .. } => {}
    }
  }
}

impl Host for RecordingHost {
  fn request_class_definition(
    &self,
    profiler: &Profiler,
    class: ClassId,
  ) -> Result<(), HostError> {
    let load = {
      let mut recorded = self.recorded.lock();
      recorded.requests += 1;
      recorded
        .classes
        .get(&class)
        .cloned()
        .ok_or(HostError::UnknownClass(class))?
    };

    profiler.handle(Event::ClassLoad(load.requested(true)))?;
    Ok(())
  }

  fn request_object_alloc(
    &self,
    profiler: &Profiler,
    object: ObjectId,
  ) -> Result<(), HostError> {
    let alloc = {
      let mut recorded = self.recorded.lock();
      recorded.requests += 1;
      recorded
        .objects
        .get(&object)
        .cloned()
        .ok_or(HostError::UnknownObject(object))?
    };

    profiler.handle(Event::ObjectAlloc(alloc.requested(true)))?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::event::ObjectKind;

  #[test]
  fn observed_moves_and_region_teardown_update_the_shadow_heap() {
    let host = RecordingHost::new();
    host.observe(&ObjectAlloc::new(0xa, 7).size(16).region(1).into());
    host.observe(&ObjectAlloc::new(0xc, 7).size(16).region(3).into());
    host.observe(
      &ObjectMove {
        object: 0xa,
        region: 1,
        new_object: 0xb,
        new_region: 2,
      }
      .into(),
    );
    host.observe(&Event::RegionDestroy { region: 3 });

    let recorded = host.recorded.lock();
    assert!(!recorded.objects.contains_key(&0xa));
    assert!(!recorded.objects.contains_key(&0xc));
    let moved = &recorded.objects[&0xb];
    assert_eq!((moved.object, moved.region, moved.size), (0xb, 2, 16));
  }

  #[test]
  fn frees_forget_objects_but_unloads_keep_definitions() {
    let host = RecordingHost::new();
    host.observe(&ClassLoad::new(7, "Foo").into());
    host.observe(
      &ObjectAlloc::new(0xa, 0)
        .kind(ObjectKind::Byte)
        .size(3)
        .into(),
    );
    host.observe(&Event::ObjectFree {
      thread: 0,
      object: 0xa,
    });
    host.observe(&Event::ClassUnload { class: 7 });

    let recorded = host.recorded.lock();
    assert!(recorded.objects.is_empty());
    assert_eq!(recorded.classes[&7].name, "Foo");
  }
}
