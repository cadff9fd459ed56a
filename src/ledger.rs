use std::{collections::HashMap, sync::Arc};

use crate::class::{ClassDescriptor, ClassSerial};
use crate::event::MethodId;

/// Attribution key: the innermost active method (if any) and the class that
/// was allocated.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct SiteKey {
  pub class: ClassSerial,
  pub method: Option<MethodId>,
}

/// Running live totals for one allocation site.
#[derive(Debug, Clone)]
pub struct AllocationSite {
  pub class: Arc<ClassDescriptor>,
  pub live_bytes: i64,
  pub live_count: i64,
  pub method: Option<MethodId>,
}

impl AllocationSite {
  fn new(class: Arc<ClassDescriptor>, method: Option<MethodId>) -> Self {
    Self {
      class,
      live_bytes: 0,
      live_count: 0,
      method,
    }
  }

  #[must_use]
  pub fn key(&self) -> SiteKey {
    SiteKey {
      class: self.class.serial(),
      method: self.method,
    }
  }

  fn on_allocation(&mut self, size: i64) {
    self.live_count += 1;
    self.live_bytes += size;
  }

  fn on_release(&mut self, size: i64) {
    self.live_count -= 1;
    self.live_bytes -= size;

    if self.live_count < 0 || self.live_bytes < 0 {
      tracing::error!(
        class = self.class.name(),
        method = ?self.method,
        live_count = self.live_count,
        live_bytes = self.live_bytes,
        "allocation site counters dropped below zero"
      );
      debug_assert!(
        false,
        "allocation site for {} went negative",
        self.class.name()
      );
    }
  }
}

/// Live-object totals keyed by allocation site.
///
/// Sites are created on first use and never removed, so a site whose
/// objects have all died stays resident with zero counters.
#[derive(Debug, Default)]
pub struct AllocationSiteLedger {
  sites: HashMap<SiteKey, AllocationSite>,
}

impl AllocationSiteLedger {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  #[must_use]
  pub fn get(&self, key: &SiteKey) -> Option<&AllocationSite> {
    self.sites.get(key)
  }

  #[must_use]
  pub fn len(&self) -> usize {
    self.sites.len()
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.sites.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &AllocationSite> {
    self.sites.values()
  }

  /// Look up the site for `(method, class)`, creating it with zero counters
  /// if it does not exist yet.
  pub fn resolve_or_create(
    &mut self,
    class: &Arc<ClassDescriptor>,
    method: Option<MethodId>,
  ) -> SiteKey {
    let key = SiteKey {
      class: class.serial(),
      method,
    };

    self
      .sites
      .entry(key)
      .or_insert_with(|| AllocationSite::new(Arc::clone(class), method));

    key
  }

  /// Whether an allocation of `size` bytes fits the site's byte counter. A
  /// site that does not exist yet starts from zero.
  #[must_use]
  pub fn can_record(&self, key: &SiteKey, size: i64) -> bool {
    self.sites.get(key).map_or(size >= 0, |site| {
      site.live_bytes.checked_add(size).is_some()
        && site.live_count.checked_add(1).is_some()
    })
  }

  /// Returns `false` if the site does not exist.
  pub fn record_alloc(&mut self, key: &SiteKey, size: i64) -> bool {
    match self.sites.get_mut(key) {
      Some(site) => {
        site.on_allocation(size);
        true
      }
      None => false,
    }
  }

  /// Returns `false` if the site does not exist.
  pub fn record_free(&mut self, key: &SiteKey, size: i64) -> bool {
    match self.sites.get_mut(key) {
      Some(site) => {
        site.on_release(size);
        true
      }
      None => false,
    }
  }
}
