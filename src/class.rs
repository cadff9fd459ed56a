use std::{collections::HashMap, sync::Arc};

use nohash_hasher::BuildNoHashHasher;

use crate::error::ProfilerError;
use crate::event::{ClassId, ObjectKind};

/// Distinguishes descriptors that share a recycled class identity.
pub type ClassSerial = u64;

const PSEUDO_CLASS_NAMES: [&str; 9] = [
  "JVMPI_CLASS",
  "JVMPI_BOOLEAN",
  "JVMPI_BYTE",
  "JVMPI_CHAR",
  "JVMPI_SHORT",
  "JVMPI_INT",
  "JVMPI_LONG",
  "JVMPI_FLOAT",
  "JVMPI_DOUBLE",
];

/// Name of a loaded class. Immutable once created.
#[derive(Debug, Eq, PartialEq)]
pub struct ClassDescriptor {
  name: Arc<str>,
  serial: ClassSerial,
}

impl ClassDescriptor {
  #[must_use]
  pub fn name(&self) -> &str {
    &self.name
  }

  #[must_use]
  pub fn serial(&self) -> ClassSerial {
    self.serial
  }
}

/// Identity-keyed table of class descriptors.
///
/// Array and primitive kinds resolve to fixed pseudo-descriptors that are
/// never stored under a host identity.
#[derive(Debug)]
pub struct ClassRegistry {
  by_id: HashMap<ClassId, Arc<ClassDescriptor>, BuildNoHashHasher<ClassId>>,
  next_serial: ClassSerial,
  pseudo: Vec<Arc<ClassDescriptor>>,
}

impl Default for ClassRegistry {
  fn default() -> Self {
    let pseudo = PSEUDO_CLASS_NAMES
      .iter()
      .zip(1..)
      .map(|(name, serial)| {
        Arc::new(ClassDescriptor {
          name: Arc::from(*name),
          serial,
        })
      })
      .collect::<Vec<_>>();

    Self {
      by_id: HashMap::default(),
      next_serial: pseudo.len() as ClassSerial + 1,
      pseudo,
    }
  }
}

impl ClassRegistry {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  #[must_use]
  pub fn contains(&self, class: ClassId) -> bool {
    self.by_id.contains_key(&class)
  }

  #[must_use]
  pub fn get(&self, class: ClassId) -> Option<Arc<ClassDescriptor>> {
    self.by_id.get(&class).cloned()
  }

  #[must_use]
  pub fn len(&self) -> usize {
    self.by_id.len()
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.by_id.is_empty()
  }

  /// Resolve the descriptor for an allocation of the given kind.
  ///
  /// Returns `None` only for a `Normal` object whose class identity has not
  /// been registered; the caller decides whether to ask the host for a
  /// replay.
  #[must_use]
  pub fn lookup(
    &self,
    class: ClassId,
    kind: ObjectKind,
  ) -> Option<Arc<ClassDescriptor>> {
    match pseudo_index(kind) {
      Some(index) => Some(Arc::clone(&self.pseudo[index])),
      None => self.get(class),
    }
  }

  /// Register a class, returning the existing descriptor when the identity
  /// is already known.
  pub fn register(&mut self, class: ClassId, name: &str) -> Arc<ClassDescriptor> {
    if let Some(existing) = self.by_id.get(&class) {
      return Arc::clone(existing);
    }

    let descriptor = Arc::new(ClassDescriptor {
      name: Arc::from(name),
      serial: self.next_serial,
    });
    self.next_serial = self.next_serial.saturating_add(1);
    self.by_id.insert(class, Arc::clone(&descriptor));

    descriptor
  }

  /// Rekey a class identity after the host moved the class object.
  ///
  /// Returns `false` when `old` is not a known class identity.
  ///
  /// # Errors
  ///
  /// Fails if `new` already names a different class.
  pub fn relocate(
    &mut self,
    old: ClassId,
    new: ClassId,
  ) -> Result<bool, ProfilerError> {
    if !self.by_id.contains_key(&old) {
      return Ok(false);
    }

    if old != new && self.by_id.contains_key(&new) {
      return Err(ProfilerError::ClassCollision { old, new });
    }

    if let Some(descriptor) = self.by_id.remove(&old) {
      self.by_id.insert(new, descriptor);
    }

    Ok(true)
  }

  /// # Errors
  ///
  /// Fails if the identity was never registered, which means the profiler
  /// lost track of the host's class table.
  pub fn unregister(
    &mut self,
    class: ClassId,
  ) -> Result<Arc<ClassDescriptor>, ProfilerError> {
    self
      .by_id
      .remove(&class)
      .ok_or(ProfilerError::UnknownClassUnload { class })
  }
}

fn pseudo_index(kind: ObjectKind) -> Option<usize> {
  match kind {
    ObjectKind::Normal => None,
    ObjectKind::ReferenceArray => Some(0),
    ObjectKind::Boolean => Some(1),
    ObjectKind::Byte => Some(2),
    ObjectKind::Char => Some(3),
    ObjectKind::Short => Some(4),
    ObjectKind::Int => Some(5),
    ObjectKind::Long => Some(6),
    ObjectKind::Float => Some(7),
    ObjectKind::Double => Some(8),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn registration_is_idempotent() {
    let mut registry = ClassRegistry::new();
    let first = registry.register(0x40, "Foo");
    let second = registry.register(0x40, "Renamed");

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.name(), "Foo");
    assert_eq!(registry.len(), 1);
  }

  #[test]
  fn pseudo_kinds_resolve_without_registration() {
    let registry = ClassRegistry::new();

    let ints = registry
      .lookup(0xdead, ObjectKind::Int)
      .expect("pseudo class");
    assert_eq!(ints.name(), "JVMPI_INT");
    assert!(registry.lookup(0xdead, ObjectKind::Normal).is_none());
  }

  #[test]
  fn pseudo_and_registered_serials_never_overlap() {
    let mut registry = ClassRegistry::new();
    let foo = registry.register(1, "Foo");
    let doubles = registry
      .lookup(0, ObjectKind::Double)
      .expect("pseudo class");

    assert_ne!(foo.serial(), doubles.serial());
  }

  #[test]
  fn unregistering_an_unknown_class_fails() {
    let mut registry = ClassRegistry::new();
    assert!(matches!(
      registry.unregister(9),
      Err(ProfilerError::UnknownClassUnload { class: 9 })
    ));
  }

  #[test]
  fn reregistering_after_unload_yields_a_fresh_descriptor() {
    let mut registry = ClassRegistry::new();
    let first = registry.register(5, "Foo");
    registry.unregister(5).expect("known class");
    let second = registry.register(5, "Foo");

    assert_ne!(first.serial(), second.serial());
  }

  #[test]
  fn relocation_rekeys_and_rejects_collisions() {
    let mut registry = ClassRegistry::new();
    registry.register(1, "Foo");
    registry.register(2, "Bar");

    assert!(!registry.relocate(7, 8).expect("unknown is not an error"));
    assert!(matches!(
      registry.relocate(1, 2),
      Err(ProfilerError::ClassCollision { old: 1, new: 2 })
    ));
    assert!(registry.relocate(1, 3).expect("free target"));
    assert!(!registry.contains(1));
    assert_eq!(registry.get(3).expect("moved").name(), "Foo");
  }
}
