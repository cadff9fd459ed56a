use super::*;

/// Host identity of a loaded class.
pub type ClassId = u64;
/// Host identity of a method.
pub type MethodId = u64;
/// Host identity of an object. Identities are recycled by the host.
pub type ObjectId = u64;
/// Host identity of a memory region (arena).
pub type RegionId = u64;
/// Host identity of the execution thread that produced an event.
pub type ThreadEnv = u64;

/// Shape of an allocated object as reported by the host.
///
/// Everything except `Normal` maps onto a fixed pseudo-class that needs no
/// host lookup.
#[derive(
  Debug, Clone, Copy, Default, Eq, PartialEq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
  #[default]
  Normal,
  ReferenceArray,
  Boolean,
  Byte,
  Char,
  Short,
  Int,
  Long,
  Float,
  Double,
}

/// A method as listed in a class definition.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct MethodDefinition {
  pub id: MethodId,
  pub name: String,
  pub signature: String,
  #[serde(default)]
  pub start_line: i32,
}

impl MethodDefinition {
  #[must_use]
  pub fn new(
    id: MethodId,
    name: impl Into<String>,
    signature: impl Into<String>,
  ) -> Self {
    Self {
      id,
      name: name.into(),
      signature: signature.into(),
      start_line: 0,
    }
  }

  #[must_use]
  pub fn start_line(mut self, line: i32) -> Self {
    self.start_line = line;
    self
  }
}

/// Class definition, either live from the host or replayed on request.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ClassLoad {
  pub class: ClassId,
  pub name: String,
  #[serde(default)]
  pub methods: Vec<MethodDefinition>,
  #[serde(default)]
  pub requested: bool,
}

impl ClassLoad {
  #[must_use]
  pub fn new(class: ClassId, name: impl Into<String>) -> Self {
    Self {
      class,
      name: name.into(),
      methods: Vec::new(),
      requested: false,
    }
  }

  #[must_use]
  pub fn method(mut self, method: MethodDefinition) -> Self {
    self.methods.push(method);
    self
  }

  #[must_use]
  pub fn requested(mut self, requested: bool) -> Self {
    self.requested = requested;
    self
  }
}

/// Allocation of a single object.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ObjectAlloc {
  pub thread: ThreadEnv,
  pub class: ClassId,
  #[serde(default)]
  pub kind: ObjectKind,
  pub size: u64,
  pub object: ObjectId,
  #[serde(default)]
  pub region: RegionId,
  #[serde(default)]
  pub requested: bool,
}

impl ObjectAlloc {
  #[must_use]
  pub fn new(object: ObjectId, class: ClassId) -> Self {
    Self {
      thread: 0,
      class,
      kind: ObjectKind::Normal,
      size: 0,
      object,
      region: 0,
      requested: false,
    }
  }

  #[must_use]
  pub fn kind(mut self, kind: ObjectKind) -> Self {
    self.kind = kind;
    self
  }

  #[must_use]
  pub fn region(mut self, region: RegionId) -> Self {
    self.region = region;
    self
  }

  #[must_use]
  pub fn requested(mut self, requested: bool) -> Self {
    self.requested = requested;
    self
  }

  #[must_use]
  pub fn size(mut self, size: u64) -> Self {
    self.size = size;
    self
  }

  #[must_use]
  pub fn thread(mut self, thread: ThreadEnv) -> Self {
    self.thread = thread;
    self
  }
}

/// Relocation of an object, possibly across regions.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub struct ObjectMove {
  pub object: ObjectId,
  pub region: RegionId,
  pub new_object: ObjectId,
  pub new_region: RegionId,
}

/// How the host serializes an event against the rest of the process.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Delivery {
  /// Delivered from a running application thread; waits while a collection
  /// is in progress.
  Mutator,
  /// Delivered inside a window the host already serializes (a collection or
  /// a synchronous replay), so it must not wait for the collection to end.
  Safepoint,
  /// Touches only the calling thread's own call stack.
  ThreadLocal,
  /// Opens or closes a collection bracket.
  Collector,
}

/// Every lifecycle event the profiler reacts to.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
  ClassLoad(ClassLoad),
  ClassUnload { class: ClassId },
  ObjectAlloc(ObjectAlloc),
  ObjectFree { thread: ThreadEnv, object: ObjectId },
  ObjectMove(ObjectMove),
  RegionDestroy { region: RegionId },
  GcStart,
  GcFinish,
  MethodEntry { thread: ThreadEnv, method: MethodId },
  MethodExit { thread: ThreadEnv, method: MethodId },
  ThreadEnd { thread: ThreadEnv },
}

impl From<ClassLoad> for Event {
  fn from(load: ClassLoad) -> Self {
    Self::ClassLoad(load)
  }
}

impl From<ObjectAlloc> for Event {
  fn from(alloc: ObjectAlloc) -> Self {
    Self::ObjectAlloc(alloc)
  }
}

impl From<ObjectMove> for Event {
  fn from(relocation: ObjectMove) -> Self {
    Self::ObjectMove(relocation)
  }
}

impl Event {
  #[must_use]
  pub fn delivery(&self) -> Delivery {
    match self {
      Self::ClassLoad(load) if load.requested => Delivery::Safepoint,
      Self::ObjectAlloc(alloc) if alloc.requested => Delivery::Safepoint,
      Self::ClassLoad(_) | Self::ClassUnload { .. } | Self::ObjectAlloc(_) => {
        Delivery::Mutator
      }
      Self::ObjectFree { .. }
      | Self::ObjectMove(_)
      | Self::RegionDestroy { .. } => Delivery::Safepoint,
      Self::MethodEntry { .. }
      | Self::MethodExit { .. }
      | Self::ThreadEnd { .. } => Delivery::ThreadLocal,
      Self::GcStart | Self::GcFinish => Delivery::Collector,
    }
  }

  /// Short name used in log records.
  #[must_use]
  pub fn name(&self) -> &'static str {
    match self {
      Self::ClassLoad(_) => "class_load",
      Self::ClassUnload { .. } => "class_unload",
      Self::ObjectAlloc(_) => "object_alloc",
      Self::ObjectFree { .. } => "object_free",
      Self::ObjectMove(_) => "object_move",
      Self::RegionDestroy { .. } => "region_destroy",
      Self::GcStart => "gc_start",
      Self::GcFinish => "gc_finish",
      Self::MethodEntry { .. } => "method_entry",
      Self::MethodExit { .. } => "method_exit",
      Self::ThreadEnd { .. } => "thread_end",
    }
  }
}
