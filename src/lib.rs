//! Allocation-site accounting for a managed runtime's heap.
//!
//! The profiler consumes lifecycle events from the runtime's profiling
//! interface (class definitions, allocations, frees, moves, region teardown,
//! call-stack entry/exit, collection brackets) and keeps a live count of the
//! objects and bytes attributed to each allocation site. At the end of every
//! collection it rewrites a report of the sites that still hold live objects.

mod class;
mod config;
mod error;
mod event;
mod export;
mod gate;
mod host;
mod ledger;
mod method;
mod objects;
mod region;
mod router;
mod snapshot;
mod stack;
mod tables;

use {
  serde::{Deserialize, Serialize, Serializer, ser::SerializeStruct},
  std::{
    collections::{HashMap, HashSet},
    fs::File,
    io::{self, Cursor, Seek, SeekFrom, Write},
    sync::Arc,
    time::SystemTime,
  },
  thiserror::Error,
};

pub use {
  class::{ClassDescriptor, ClassRegistry, ClassSerial},
  config::{
    ConfigError, DEFAULT_CLASS_FILTER, DEFAULT_REPORT_PATH, ProfilerConfig,
    ReportFormat,
  },
  error::{ProfilerError, fatal},
  event::{
    ClassId, ClassLoad, Delivery, Event, MethodDefinition, MethodId,
    ObjectAlloc, ObjectId, ObjectKind, ObjectMove, RegionId, ThreadEnv,
  },
  export::{
    ExportError, FixedWidthReport, JsonReport, NullSink, Rewind, SnapshotSink,
  },
  gate::{CollectionGate, MutatorPass},
  host::{DetachedHost, Host, HostError, RecordingHost},
  ledger::{AllocationSite, AllocationSiteLedger, SiteKey},
  method::{
    LABEL_CLASS_CHARS, LABEL_METHOD_CHARS, MethodDescriptor, MethodRegistry,
  },
  objects::{LiveObject, LiveObjectRegistry},
  region::RegionIndex,
  router::{Profiler, ProfilerBuilder},
  snapshot::{
    CLASS_COLUMN, SITE_COLUMN, SiteDelta, Snapshot, SnapshotDelta,
    SnapshotRecord, UNKNOWN_SITE,
  },
  stack::CallStackTracker,
  tables::{MoveOutcome, Tables},
};
