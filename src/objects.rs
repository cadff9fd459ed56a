use std::{collections::HashMap, sync::Arc};

use nohash_hasher::BuildNoHashHasher;

use crate::class::ClassDescriptor;
use crate::event::{ObjectId, RegionId};
use crate::ledger::SiteKey;

/// Bookkeeping for one object the profiler believes is alive.
#[derive(Debug, Clone)]
pub struct LiveObject {
  pub class: Arc<ClassDescriptor>,
  pub region: RegionId,
  pub site: SiteKey,
  pub size: i64,
}

/// Maps each object identity to its current occupant.
///
/// The host recycles identities once an object is freed, so an entry
/// describes whichever object holds the identity now, not a unique object
/// over the lifetime of the process.
#[derive(Debug, Default)]
pub struct LiveObjectRegistry {
  objects: HashMap<ObjectId, LiveObject, BuildNoHashHasher<ObjectId>>,
}

impl LiveObjectRegistry {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  #[must_use]
  pub fn contains(&self, object: ObjectId) -> bool {
    self.objects.contains_key(&object)
  }

  #[must_use]
  pub fn get(&self, object: ObjectId) -> Option<&LiveObject> {
    self.objects.get(&object)
  }

  #[must_use]
  pub fn len(&self) -> usize {
    self.objects.len()
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.objects.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &LiveObject)> {
    self.objects.iter().map(|(id, object)| (*id, object))
  }

  /// Insert a new occupant. Hands the entry back if the identity is already
  /// live.
  pub fn insert(
    &mut self,
    object: ObjectId,
    entry: LiveObject,
  ) -> Result<(), LiveObject> {
    if self.objects.contains_key(&object) {
      return Err(entry);
    }

    self.objects.insert(object, entry);
    Ok(())
  }

  pub fn remove(&mut self, object: ObjectId) -> Option<LiveObject> {
    self.objects.remove(&object)
  }
}
