use super::*;

/// Errors that can occur when exporting or streaming snapshots.
#[derive(Debug, Error)]
pub enum ExportError {
  #[error("i/o error during export: {0}")]
  Io(#[from] io::Error),
  #[error("failed to encode snapshot as json: {0}")]
  Json(#[from] serde_json::Error),
}

/// A writer that can be emptied and rewound to its start.
pub trait Rewind: Write {
  /// # Errors
  ///
  /// Returns an error if the underlying storage cannot be truncated.
  fn rewind_and_truncate(&mut self) -> io::Result<()>;
}

impl Rewind for File {
  fn rewind_and_truncate(&mut self) -> io::Result<()> {
    self.set_len(0)?;
    self.seek(SeekFrom::Start(0))?;
    Ok(())
  }
}

impl Rewind for Cursor<Vec<u8>> {
  fn rewind_and_truncate(&mut self) -> io::Result<()> {
    self.get_mut().clear();
    self.set_position(0);
    Ok(())
  }
}

/// Destination of the snapshot emitted at the end of every collection.
pub trait SnapshotSink {
  /// # Errors
  ///
  /// Returns an `ExportError` if the snapshot cannot be serialized or if
  /// the underlying writer fails to persist the data.
  fn write_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), ExportError>;
}

/// Fixed-width text report, rewritten from the start on every snapshot so
/// the file always shows the current state.
pub struct FixedWidthReport<W: Rewind> {
  writer: W,
}

impl<W: Rewind> FixedWidthReport<W> {
  pub fn new(writer: W) -> Self {
    Self { writer }
  }

  pub fn into_inner(self) -> W {
    self.writer
  }
}

impl<W: Rewind> SnapshotSink for FixedWidthReport<W> {
  fn write_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), ExportError> {
    let mut rendered = Vec::with_capacity(snapshot.records().len() * 140);
    snapshot.write_fixed_width(&mut rendered)?;

    self.writer.rewind_and_truncate()?;
    self.writer.write_all(&rendered)?;
    self.writer.flush()?;
    Ok(())
  }
}

/// JSON rendering of the current snapshot, rewritten on every snapshot.
pub struct JsonReport<W: Rewind> {
  writer: W,
}

impl<W: Rewind> JsonReport<W> {
  pub fn new(writer: W) -> Self {
    Self { writer }
  }

  pub fn into_inner(self) -> W {
    self.writer
  }
}

impl<W: Rewind> SnapshotSink for JsonReport<W> {
  fn write_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), ExportError> {
    let mut encoded = serde_json::to_vec(snapshot)?;
    encoded.push(b'\n');

    self.writer.rewind_and_truncate()?;
    self.writer.write_all(&encoded)?;
    self.writer.flush()?;
    Ok(())
  }
}

/// Discards every snapshot.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl SnapshotSink for NullSink {
  fn write_snapshot(&mut self, _snapshot: &Snapshot) -> Result<(), ExportError> {
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ledger::SiteKey;
  use crate::snapshot::SnapshotRecord;
  use std::io::Read;

  fn snapshot_with(count: usize) -> Snapshot {
    let records = (0..count)
      .map(|i| SnapshotRecord {
        class_name: Arc::from(format!("Class{i}")),
        live_bytes: 16,
        live_count: 1,
        method: None,
        site: SiteKey {
          class: i as u64,
          method: None,
        },
        site_label: None,
      })
      .collect();
    Snapshot::new(records, SystemTime::UNIX_EPOCH)
  }

  #[test]
  fn fixed_width_report_rewrites_from_the_start() {
    let mut report = FixedWidthReport::new(Cursor::new(Vec::new()));

    report.write_snapshot(&snapshot_with(3)).expect("first");
    report.write_snapshot(&snapshot_with(1)).expect("second");

    let text = String::from_utf8(report.into_inner().into_inner())
      .expect("utf8");
    assert_eq!(text.lines().count(), 1);
    assert!(text.contains("Class0"));
  }

  #[test]
  fn json_report_holds_a_single_document() {
    let mut report = JsonReport::new(Cursor::new(Vec::new()));

    report.write_snapshot(&snapshot_with(2)).expect("first");
    report.write_snapshot(&snapshot_with(1)).expect("second");

    let bytes = report.into_inner().into_inner();
    let value: serde_json::Value =
      serde_json::from_slice(&bytes).expect("single json document");
    assert_eq!(value["records"].as_array().map(Vec::len), Some(1));
  }

  #[test]
  fn file_reports_are_truncated() {
    let file = tempfile::tempfile().expect("temp file");
    let mut report = FixedWidthReport::new(file);

    report.write_snapshot(&snapshot_with(4)).expect("first");
    report.write_snapshot(&snapshot_with(2)).expect("second");

    let mut file = report.into_inner();
    file.seek(SeekFrom::Start(0)).expect("seek");
    let mut text = String::new();
    file.read_to_string(&mut text).expect("read back");
    assert_eq!(text.lines().count(), 2);
  }
}
