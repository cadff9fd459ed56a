use std::{collections::HashMap, sync::Arc};

use nohash_hasher::BuildNoHashHasher;

use crate::class::ClassDescriptor;
use crate::event::{MethodDefinition, MethodId};

/// Longest class-name prefix kept in a method label.
pub const LABEL_CLASS_CHARS: usize = 45;
/// Longest method-name prefix kept in a method label.
pub const LABEL_METHOD_CHARS: usize = 15;

/// Metadata describing a method that may appear as an allocation site.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct MethodDescriptor {
  pub class: Arc<ClassDescriptor>,
  pub name: Arc<str>,
  pub signature: Arc<str>,
  pub start_line: i32,
  label: Arc<str>,
}

impl MethodDescriptor {
  #[must_use]
  pub fn new(class: Arc<ClassDescriptor>, definition: &MethodDefinition) -> Self {
    let label = format!(
      "{}.{}",
      truncate_chars(class.name(), LABEL_CLASS_CHARS),
      truncate_chars(&definition.name, LABEL_METHOD_CHARS)
    );

    Self {
      class,
      name: Arc::from(definition.name.as_str()),
      signature: Arc::from(definition.signature.as_str()),
      start_line: definition.start_line,
      label: Arc::from(label),
    }
  }

  /// `Class.method` with both parts cut to their fixed-width prefixes.
  #[must_use]
  pub fn label(&self) -> &str {
    &self.label
  }
}

/// Identity-keyed table of method descriptors.
#[derive(Debug, Default)]
pub struct MethodRegistry {
  by_id: HashMap<MethodId, MethodDescriptor, BuildNoHashHasher<MethodId>>,
}

impl MethodRegistry {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  #[must_use]
  pub fn len(&self) -> usize {
    self.by_id.len()
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.by_id.is_empty()
  }

  #[must_use]
  pub fn lookup(&self, method: MethodId) -> Option<&MethodDescriptor> {
    self.by_id.get(&method)
  }

  /// Register every method of a class that is not already known. Returns how
  /// many descriptors were added.
  pub fn register_class_methods(
    &mut self,
    class: &Arc<ClassDescriptor>,
    methods: &[MethodDefinition],
  ) -> usize {
    let mut added = 0;

    for definition in methods {
      self.by_id.entry(definition.id).or_insert_with(|| {
        added += 1;
        MethodDescriptor::new(Arc::clone(class), definition)
      });
    }

    added
  }
}

/// Cut `value` to at most `max` characters.
pub(crate) fn truncate_chars(value: &str, max: usize) -> &str {
  match value.char_indices().nth(max) {
    Some((end, _)) => &value[..end],
    None => value,
  }
}
