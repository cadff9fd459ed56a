use std::{collections::HashMap, sync::Arc, time::SystemTime};

use crate::class::{ClassDescriptor, ClassRegistry};
use crate::error::ProfilerError;
use crate::event::{
  ClassId, ClassLoad, MethodId, ObjectId, ObjectKind, ObjectMove, RegionId,
};
use crate::ledger::{AllocationSiteLedger, SiteKey};
use crate::method::MethodRegistry;
use crate::objects::{LiveObject, LiveObjectRegistry};
use crate::region::RegionIndex;
use crate::snapshot::{Snapshot, SnapshotRecord};

/// Result of applying a move event.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum MoveOutcome {
  /// The object was live and now lives under its new identity and region.
  Relocated,
  /// The old identity was never seen live; the host has to replay the new
  /// identity as an allocation.
  FirstSighting,
}

/// All cross-referencing accounting tables.
///
/// Every method leaves the tables consistent or returns an error; callers
/// hold the profiler's table lock for the duration of a call.
#[derive(Debug, Default)]
pub struct Tables {
  classes: ClassRegistry,
  methods: MethodRegistry,
  objects: LiveObjectRegistry,
  regions: RegionIndex,
  sites: AllocationSiteLedger,
}

impl Tables {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  #[must_use]
  pub fn classes(&self) -> &ClassRegistry {
    &self.classes
  }

  #[must_use]
  pub fn methods(&self) -> &MethodRegistry {
    &self.methods
  }

  #[must_use]
  pub fn objects(&self) -> &LiveObjectRegistry {
    &self.objects
  }

  #[must_use]
  pub fn regions(&self) -> &RegionIndex {
    &self.regions
  }

  #[must_use]
  pub fn sites(&self) -> &AllocationSiteLedger {
    &self.sites
  }

  #[must_use]
  pub fn lookup_class(
    &self,
    class: ClassId,
    kind: ObjectKind,
  ) -> Option<Arc<ClassDescriptor>> {
    self.classes.lookup(class, kind)
  }

  /// Register a class and whichever of its methods are new.
  pub fn define_class(&mut self, load: &ClassLoad) -> Arc<ClassDescriptor> {
    let class = self.classes.register(load.class, &load.name);
    let added = self.methods.register_class_methods(&class, &load.methods);

    tracing::debug!(
      class = load.class,
      name = class.name(),
      methods = added,
      requested = load.requested,
      "class defined"
    );

    class
  }

  /// # Errors
  ///
  /// Fails if the class was never registered.
  pub fn unload_class(&mut self, class: ClassId) -> Result<(), ProfilerError> {
    self.classes.unregister(class).map(drop)
  }

  /// Start tracking a newly allocated object.
  ///
  /// # Errors
  ///
  /// Fails if the identity is already live, if the size would overflow the
  /// site's byte counter, or if the region already lists the identity.
  /// Nothing is mutated on failure.
  pub fn on_alloc(
    &mut self,
    object: ObjectId,
    class: &Arc<ClassDescriptor>,
    size: u64,
    region: RegionId,
    method: Option<MethodId>,
  ) -> Result<SiteKey, ProfilerError> {
    let size_signed = i64::try_from(size)
      .map_err(|_| ProfilerError::SizeOverflow { object, size })?;

    if self.objects.contains(object) {
      return Err(ProfilerError::DuplicateAllocation { object });
    }

    if self.regions.is_member(region, object) {
      return Err(ProfilerError::RegionOutOfSync { object, region });
    }

    let key = SiteKey {
      class: class.serial(),
      method,
    };
    if !self.sites.can_record(&key, size_signed) {
      return Err(ProfilerError::SizeOverflow { object, size });
    }

    let site = self.sites.resolve_or_create(class, method);

    self
      .objects
      .insert(
        object,
        LiveObject {
          class: Arc::clone(class),
          region,
          site,
          size: size_signed,
        },
      )
      .map_err(|_| ProfilerError::DuplicateAllocation { object })?;

    self.regions.insert(region, object);
    self.sites.record_alloc(&site, size_signed);

    Ok(site)
  }

  /// Stop tracking a freed object. Returns `false` for identities that were
  /// not live, which happens when the profiler attached after the object
  /// was allocated.
  ///
  /// # Errors
  ///
  /// Fails if the object's region or site no longer lists it.
  pub fn on_free(&mut self, object: ObjectId) -> Result<bool, ProfilerError> {
    let Some(entry) = self.objects.remove(object) else {
      return Ok(false);
    };

    self.release(object, &entry)?;

    Ok(true)
  }

  /// Follow an object to its new identity and region.
  ///
  /// # Errors
  ///
  /// Fails if the move would overwrite a different live object or a known
  /// class, or if the region index has lost track of the object.
  pub fn on_move(
    &mut self,
    relocation: &ObjectMove,
  ) -> Result<MoveOutcome, ProfilerError> {
    let ObjectMove {
      object,
      region,
      new_object,
      new_region,
    } = *relocation;

    let live = self.objects.contains(object);

    if live && new_object != object && self.objects.contains(new_object) {
      return Err(ProfilerError::OccupiedMoveTarget { object, new_object });
    }

    if self.classes.relocate(object, new_object)? {
      tracing::debug!(object, new_object, "class object relocated");
    }

    if !live {
      return Ok(MoveOutcome::FirstSighting);
    }

    let Some(mut entry) = self.objects.remove(object) else {
      return Ok(MoveOutcome::FirstSighting);
    };

    if entry.region != region {
      tracing::debug!(
        object,
        recorded = entry.region,
        reported = region,
        "move reported a different source region"
      );
    }

    if !self.regions.remove(entry.region, object) {
      return Err(ProfilerError::RegionOutOfSync {
        object,
        region: entry.region,
      });
    }

    if !self.regions.insert(new_region, new_object) {
      return Err(ProfilerError::RegionOutOfSync {
        object: new_object,
        region: new_region,
      });
    }

    entry.region = new_region;

    self
      .objects
      .insert(new_object, entry)
      .map_err(|_| ProfilerError::OccupiedMoveTarget { object, new_object })?;

    Ok(MoveOutcome::Relocated)
  }

  /// Evict every object in a destroyed region. Returns how many objects were
  /// released; unknown regions release nothing.
  ///
  /// # Errors
  ///
  /// Fails if a member of the region is not live under that region.
  pub fn on_region_destroy(
    &mut self,
    region: RegionId,
  ) -> Result<usize, ProfilerError> {
    let Some(members) = self.regions.take(region) else {
      return Ok(0);
    };

    for &object in &members {
      let entry = self
        .objects
        .remove(object)
        .ok_or(ProfilerError::RegionOutOfSync { object, region })?;

      if entry.region != region {
        return Err(ProfilerError::RegionOutOfSync { object, region });
      }

      if !self.sites.record_free(&entry.site, entry.size) {
        return Err(ProfilerError::MissingSite { object });
      }
    }

    Ok(members.len())
  }

  fn release(
    &mut self,
    object: ObjectId,
    entry: &LiveObject,
  ) -> Result<(), ProfilerError> {
    if !self.regions.remove(entry.region, object) {
      return Err(ProfilerError::RegionOutOfSync {
        object,
        region: entry.region,
      });
    }

    if !self.sites.record_free(&entry.site, entry.size) {
      return Err(ProfilerError::MissingSite { object });
    }

    Ok(())
  }

  /// Capture every site with live objects.
  #[must_use]
  pub fn snapshot(&self, timestamp: SystemTime) -> Snapshot {
    let records = self
      .sites
      .iter()
      .filter(|site| site.live_count > 0)
      .map(|site| SnapshotRecord {
        class_name: Arc::from(site.class.name()),
        live_bytes: site.live_bytes,
        live_count: site.live_count,
        method: site.method,
        site: site.key(),
        site_label: site
          .method
          .and_then(|method| self.methods.lookup(method))
          .map(|method| Arc::from(method.label())),
      })
      .collect();

    Snapshot::new(records, timestamp)
  }

  /// Check the cross-table invariants: every live object sits in exactly
  /// the region it records and in an existing site, and every site's
  /// counters equal the sum over its live objects.
  ///
  /// # Errors
  ///
  /// Describes the first violation found.
  pub fn verify(&self) -> Result<(), ProfilerError> {
    let mut expected: HashMap<SiteKey, (i64, i64)> = HashMap::new();

    for (object, entry) in self.objects.iter() {
      if !self.regions.is_member(entry.region, object) {
        return Err(ProfilerError::Inconsistent(format!(
          "object {object:#x} missing from region {:#x}",
          entry.region
        )));
      }

      if self.sites.get(&entry.site).is_none() {
        return Err(ProfilerError::Inconsistent(format!(
          "object {object:#x} references a missing site"
        )));
      }

      let totals = expected.entry(entry.site).or_default();
      totals.0 += 1;
      totals.1 += entry.size;
    }

    for (region, members) in self.regions.iter() {
      for &object in members {
        match self.objects.get(object) {
          Some(entry) if entry.region == region => {}
          _ => {
            return Err(ProfilerError::Inconsistent(format!(
              "region {region:#x} lists object {object:#x} that lives elsewhere"
            )));
          }
        }
      }
    }

    for site in self.sites.iter() {
      let (count, bytes) =
        expected.get(&site.key()).copied().unwrap_or_default();

      if (site.live_count, site.live_bytes) != (count, bytes) {
        return Err(ProfilerError::Inconsistent(format!(
          "site {}/{:?} records {} objects ({} bytes), found {count} ({bytes} bytes)",
          site.class.name(),
          site.method,
          site.live_count,
          site.live_bytes,
        )));
      }
    }

    Ok(())
  }
}
