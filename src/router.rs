use std::{
  sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
  },
  time::SystemTime,
};

use parking_lot::Mutex;

use crate::class::ClassDescriptor;
use crate::config::ProfilerConfig;
use crate::error::{ProfilerError, fatal};
use crate::event::{
  ClassId, Delivery, Event, ObjectAlloc, ObjectKind, ObjectMove,
};
use crate::export::SnapshotSink;
use crate::gate::CollectionGate;
use crate::host::{DetachedHost, Host};
use crate::snapshot::{Snapshot, SnapshotDelta};
use crate::stack::CallStackTracker;
use crate::tables::{MoveOutcome, Tables};

/// Assembles a `Profiler` without exposing every knob up front.
#[derive(Default)]
pub struct ProfilerBuilder {
  config: ProfilerConfig,
  host: Option<Arc<dyn Host>>,
  sink: Option<Box<dyn SnapshotSink + Send>>,
}

impl ProfilerBuilder {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  #[must_use]
  pub fn with_config(mut self, config: ProfilerConfig) -> Self {
    self.config = config;
    self
  }

  #[must_use]
  pub fn host(mut self, host: Arc<dyn Host>) -> Self {
    self.host = Some(host);
    self
  }

  /// Write snapshots here instead of the configured report file.
  #[must_use]
  pub fn sink(mut self, sink: impl SnapshotSink + Send + 'static) -> Self {
    self.sink = Some(Box::new(sink));
    self
  }

  /// # Errors
  ///
  /// Fails if no sink was supplied and the configured report file cannot be
  /// opened.
  pub fn finish(self) -> Result<Profiler, ProfilerError> {
    let sink = match self.sink {
      Some(sink) => sink,
      None => self.config.open_sink()?,
    };
    let host = self.host.unwrap_or_else(|| Arc::new(DetachedHost));

    Ok(Profiler::new(self.config, host, sink))
  }
}

struct Reports {
  latest: Option<Snapshot>,
  previous: Option<Snapshot>,
  sink: Box<dyn SnapshotSink + Send>,
}

/// Entry point for host events.
///
/// Every event runs to completion on the calling thread. Table mutation is
/// serialized by one lock; mutator events additionally wait while a
/// collection is open, so the snapshot written at `gc_finish` sees no
/// concurrent mutation. Call stacks are per-thread and take no table lock.
pub struct Profiler {
  config: ProfilerConfig,
  gate: CollectionGate,
  gc_cycles: AtomicU64,
  host: Arc<dyn Host>,
  reports: Mutex<Reports>,
  stacks: CallStackTracker,
  tables: Mutex<Tables>,
}

impl Profiler {
  #[must_use]
  pub fn new(
    config: ProfilerConfig,
    host: Arc<dyn Host>,
    sink: Box<dyn SnapshotSink + Send>,
  ) -> Self {
    Self {
      config,
      gate: CollectionGate::new(),
      gc_cycles: AtomicU64::new(0),
      host,
      reports: Mutex::new(Reports {
        latest: None,
        previous: None,
        sink,
      }),
      stacks: CallStackTracker::new(),
      tables: Mutex::new(Tables::new()),
    }
  }

  #[must_use]
  pub fn builder() -> ProfilerBuilder {
    ProfilerBuilder::new()
  }

  /// Start-up path: parse the agent option string and open the report file.
  ///
  /// # Errors
  ///
  /// Fails on malformed options or an unopenable report file; both are
  /// fatal at start-up.
  pub fn from_options(
    options: &str,
    host: Arc<dyn Host>,
  ) -> Result<Self, ProfilerError> {
    let config = ProfilerConfig::parse_options(options)?;
    let profiler = Self::builder().with_config(config).host(host).finish()?;

    tracing::info!(
      report = %profiler.config.report_path.display(),
      format = ?profiler.config.report_format,
      "heap profiler attached"
    );

    Ok(profiler)
  }

  #[must_use]
  pub fn config(&self) -> &ProfilerConfig {
    &self.config
  }

  #[must_use]
  pub fn call_stacks(&self) -> &CallStackTracker {
    &self.stacks
  }

  /// Number of completed collection brackets.
  #[must_use]
  pub fn gc_cycles(&self) -> u64 {
    self.gc_cycles.load(Ordering::Acquire)
  }

  /// Host-facing dispatch. Any accounting error terminates the process.
  pub fn notify(&self, event: Event) {
    if let Err(err) = self.handle(event) {
      fatal(&err);
    }
  }

  /// Apply one event, reporting accounting errors to the caller.
  ///
  /// # Errors
  ///
  /// Returns the condition that would have terminated the process under
  /// [`Profiler::notify`].
  pub fn handle(&self, event: Event) -> Result<(), ProfilerError> {
    match event.delivery() {
      Delivery::Mutator => {
        let _pass = self.gate.enter();
        self.apply(event)
      }
      Delivery::Safepoint | Delivery::ThreadLocal | Delivery::Collector => {
        self.apply(event)
      }
    }
  }

  fn apply(&self, event: Event) -> Result<(), ProfilerError> {
    match event {
      Event::ClassLoad(load) => {
        self.tables.lock().define_class(&load);
        Ok(())
      }
      Event::ClassUnload { class } => self.tables.lock().unload_class(class),
      Event::ObjectAlloc(alloc) => self.object_alloc(&alloc),
      Event::ObjectFree { object, .. } => {
        if !self.tables.lock().on_free(object)? {
          tracing::trace!(object, "free of untracked object");
        }
        Ok(())
      }
      Event::ObjectMove(relocation) => self.object_move(&relocation),
      Event::RegionDestroy { region } => {
        let evicted = self.tables.lock().on_region_destroy(region)?;
        tracing::debug!(region, evicted, "region destroyed");
        Ok(())
      }
      Event::GcStart => {
        self.gate.begin_collection();
        Ok(())
      }
      Event::GcFinish => self.finish_collection(),
      Event::MethodEntry { thread, method } => {
        self.stacks.push(thread, method);
        Ok(())
      }
      Event::MethodExit { thread, .. } => {
        self.stacks.pop(thread);
        Ok(())
      }
      Event::ThreadEnd { thread } => {
        self.stacks.discard(thread);
        Ok(())
      }
    }
  }

  fn object_alloc(&self, alloc: &ObjectAlloc) -> Result<(), ProfilerError> {
    let class = self.resolve_class(alloc.class, alloc.kind)?;
    let method = self.stacks.top(alloc.thread);

    self.tables.lock().on_alloc(
      alloc.object,
      &class,
      alloc.size,
      alloc.region,
      method,
    )?;

    Ok(())
  }

  fn object_move(&self, relocation: &ObjectMove) -> Result<(), ProfilerError> {
    let outcome = self.tables.lock().on_move(relocation)?;

    if outcome == MoveOutcome::FirstSighting {
      tracing::debug!(
        object = relocation.object,
        new_object = relocation.new_object,
        "first sighting via move, requesting allocation replay"
      );
      self
        .host
        .request_object_alloc(self, relocation.new_object)?;
    }

    Ok(())
  }

  /// Resolve the class of an allocation, asking the host to replay an
  /// unknown definition once. The table lock is not held across the
  /// request, since the replayed definition takes it again.
  fn resolve_class(
    &self,
    class: ClassId,
    kind: ObjectKind,
  ) -> Result<Arc<ClassDescriptor>, ProfilerError> {
    let known = self.tables.lock().lookup_class(class, kind);
    if let Some(descriptor) = known {
      return Ok(descriptor);
    }

    tracing::debug!(class, ?kind, "requesting class definition");
    self.host.request_class_definition(self, class)?;

    self
      .tables
      .lock()
      .lookup_class(class, kind)
      .ok_or(ProfilerError::UnresolvedClass { class, kind })
  }

  fn finish_collection(&self) -> Result<(), ProfilerError> {
    let written = self.write_snapshot(SystemTime::now());

    if self.gate.end_collection() {
      self.gc_cycles.fetch_add(1, Ordering::AcqRel);
    } else {
      tracing::warn!("gc_finish without a matching gc_start");
    }

    written
  }

  fn write_snapshot(&self, now: SystemTime) -> Result<(), ProfilerError> {
    let tables = self.tables.lock();
    let snapshot = tables.snapshot(now);

    let mut reports = self.reports.lock();
    reports.sink.write_snapshot(&snapshot)?;

    tracing::info!(
      sites = snapshot.records().len(),
      live_objects = snapshot.total_live_count(),
      live_bytes = snapshot.total_live_bytes(),
      "snapshot written"
    );

    reports.previous = reports.latest.replace(snapshot);
    drop(tables);

    Ok(())
  }

  /// Capture the current state without writing a report.
  #[must_use]
  pub fn snapshot(&self) -> Snapshot {
    self.tables.lock().snapshot(SystemTime::now())
  }

  /// Snapshot written at the most recent `gc_finish`.
  #[must_use]
  pub fn last_snapshot(&self) -> Option<Snapshot> {
    self.reports.lock().latest.clone()
  }

  /// Per-site growth between the two most recent written snapshots.
  #[must_use]
  pub fn last_delta(&self) -> Option<SnapshotDelta> {
    let reports = self.reports.lock();
    match (&reports.latest, &reports.previous) {
      (Some(latest), Some(previous)) => {
        Some(SnapshotDelta::from_snapshots(latest, previous))
      }
      _ => None,
    }
  }

  /// Run `inspect` against the tables while holding the table lock.
  pub fn with_tables<R>(&self, inspect: impl FnOnce(&Tables) -> R) -> R {
    inspect(&self.tables.lock())
  }

  /// Check the cross-table invariants.
  ///
  /// # Errors
  ///
  /// Describes the first violation found.
  pub fn verify(&self) -> Result<(), ProfilerError> {
    self.tables.lock().verify()
  }
}
