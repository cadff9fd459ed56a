use std::{io, path::PathBuf};

use thiserror::Error;

use crate::config::ConfigError;
use crate::event::{ClassId, ObjectId, ObjectKind, RegionId};
use crate::export::ExportError;
use crate::host::HostError;

/// Conditions that leave the accounting tables out of step with the host.
///
/// None of these are recoverable: continuing would silently produce a wrong
/// report, so the host-facing entry point terminates on any of them.
#[derive(Debug, Error)]
pub enum ProfilerError {
  #[error("class {class:#x} ({kind:?}) is unknown even after a replay request")]
  UnresolvedClass { class: ClassId, kind: ObjectKind },

  #[error("object {object:#x} allocated while already live")]
  DuplicateAllocation { object: ObjectId },

  #[error("object {object:#x} moved onto live identity {new_object:#x}")]
  OccupiedMoveTarget { object: ObjectId, new_object: ObjectId },

  #[error("class {old:#x} moved onto known class identity {new:#x}")]
  ClassCollision { old: ClassId, new: ClassId },

  #[error("unload of unknown class {class:#x}")]
  UnknownClassUnload { class: ClassId },

  #[error("object {object:#x} is out of sync with region {region:#x}")]
  RegionOutOfSync { object: ObjectId, region: RegionId },

  #[error("object {object:#x} references a missing allocation site")]
  MissingSite { object: ObjectId },

  #[error("object {object:#x} has unrepresentable size {size}")]
  SizeOverflow { object: ObjectId, size: u64 },

  #[error("accounting invariant violated: {0}")]
  Inconsistent(String),

  #[error("could not open report file {}: {source}", path.display())]
  OpenReport {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Export(#[from] ExportError),

  #[error(transparent)]
  Host(#[from] HostError),
}

/// Log `err` and terminate the process.
pub fn fatal(err: &ProfilerError) -> ! {
  tracing::error!(error = %err, "heap accounting lost sync with the host");
  std::process::abort()
}
