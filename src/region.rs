use std::collections::{HashMap, HashSet};

use nohash_hasher::{BuildNoHashHasher, IntSet};

use crate::event::{ObjectId, RegionId};

/// Membership sets of every region the profiler has seen, so that a region
/// can be evicted in one step when the host destroys it.
#[derive(Debug, Default)]
pub struct RegionIndex {
  regions: HashMap<RegionId, IntSet<ObjectId>, BuildNoHashHasher<RegionId>>,
}

impl RegionIndex {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  #[must_use]
  pub fn contains_region(&self, region: RegionId) -> bool {
    self.regions.contains_key(&region)
  }

  #[must_use]
  pub fn is_member(&self, region: RegionId, object: ObjectId) -> bool {
    self
      .regions
      .get(&region)
      .is_some_and(|members| members.contains(&object))
  }

  #[must_use]
  pub fn len(&self) -> usize {
    self.regions.len()
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.regions.is_empty()
  }

  #[must_use]
  pub fn member_count(&self, region: RegionId) -> usize {
    self.regions.get(&region).map_or(0, HashSet::len)
  }

  pub fn iter(&self) -> impl Iterator<Item = (RegionId, &IntSet<ObjectId>)> {
    self.regions.iter().map(|(id, members)| (*id, members))
  }

  /// Add `object` to `region`, creating the region on first reference.
  /// Returns `false` if the object was already a member.
  pub fn insert(&mut self, region: RegionId, object: ObjectId) -> bool {
    self.regions.entry(region).or_default().insert(object)
  }

  /// Returns `false` if the object was not a member of the region.
  pub fn remove(&mut self, region: RegionId, object: ObjectId) -> bool {
    self
      .regions
      .get_mut(&region)
      .is_some_and(|members| members.remove(&object))
  }

  /// Forget a region, handing back its members. `None` if the region was
  /// never observed.
  pub fn take(&mut self, region: RegionId) -> Option<IntSet<ObjectId>> {
    self.regions.remove(&region)
  }
}
