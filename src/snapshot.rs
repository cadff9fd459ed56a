use super::*;

/// Width of the class column in the fixed-width report.
pub const CLASS_COLUMN: usize = 45;
/// Width of the allocation-site column in the fixed-width report.
pub const SITE_COLUMN: usize = 61;
/// Rendered in place of a site label when the method is unknown or no frame
/// was active.
pub const UNKNOWN_SITE: &str = "???.???";

/// Live totals for one allocation site at the moment of capture.
#[derive(Debug, Clone)]
pub struct SnapshotRecord {
  pub class_name: Arc<str>,
  pub live_bytes: i64,
  pub live_count: i64,
  pub method: Option<MethodId>,
  pub site: SiteKey,
  pub site_label: Option<Arc<str>>,
}

impl SnapshotRecord {
  /// Site label as printed in reports.
  #[must_use]
  pub fn display_site(&self) -> &str {
    self.site_label.as_deref().unwrap_or(UNKNOWN_SITE)
  }

  fn render_row(&self, seconds: u64) -> String {
    format!(
      "{:>10} {} {} {:>8} {:>12}\n",
      seconds,
      fixed_column(&self.class_name, CLASS_COLUMN),
      fixed_column(self.display_site(), SITE_COLUMN),
      self.live_count,
      self.live_bytes
    )
  }
}

/// Cut `value` to at most `width` bytes on a character boundary and pad it
/// with spaces to exactly `width` bytes, so every row has the same length in
/// bytes whatever the names contain.
fn fixed_column(value: &str, width: usize) -> String {
  let mut end = value.len().min(width);
  while !value.is_char_boundary(end) {
    end -= 1;
  }

  let mut column = String::with_capacity(width);
  column.push_str(&value[..end]);
  column.push_str(&" ".repeat(width - end));
  column
}

impl Serialize for SnapshotRecord {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: Serializer,
  {
    let mut state = serializer.serialize_struct("SnapshotRecord", 6)?;
    state.serialize_field("class", self.class_name.as_ref())?;
    state.serialize_field("class_serial", &self.site.class)?;
    state.serialize_field("method", &self.method)?;
    state.serialize_field("site", self.display_site())?;
    state.serialize_field("live_count", &self.live_count)?;
    state.serialize_field("live_bytes", &self.live_bytes)?;
    state.end()
  }
}

/// Immutable view of every allocation site with live objects.
#[derive(Debug, Clone)]
pub struct Snapshot {
  records: Vec<SnapshotRecord>,
  timestamp: SystemTime,
}

impl Default for Snapshot {
  fn default() -> Self {
    Self::new(Vec::new(), SystemTime::UNIX_EPOCH)
  }
}

impl Serialize for Snapshot {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: Serializer,
  {
    let mut state = serializer.serialize_struct("Snapshot", 2)?;
    state.serialize_field("timestamp", &self.timestamp_secs())?;
    state.serialize_field("records", &self.records)?;
    state.end()
  }
}

impl Snapshot {
  /// Build a snapshot, ordering records by live bytes (largest first) so
  /// consecutive reports line up.
  #[must_use]
  pub(crate) fn new(
    mut records: Vec<SnapshotRecord>,
    timestamp: SystemTime,
  ) -> Self {
    records.sort_by(|a, b| {
      b.live_bytes
        .cmp(&a.live_bytes)
        .then_with(|| a.class_name.cmp(&b.class_name))
        .then_with(|| a.display_site().cmp(b.display_site()))
    });

    Self { records, timestamp }
  }

  #[must_use]
  pub fn records(&self) -> &[SnapshotRecord] {
    &self.records
  }

  #[must_use]
  pub fn timestamp(&self) -> SystemTime {
    self.timestamp
  }

  #[must_use]
  pub fn timestamp_secs(&self) -> u64 {
    self
      .timestamp
      .duration_since(SystemTime::UNIX_EPOCH)
      .map_or(0, |elapsed| elapsed.as_secs())
  }

  #[must_use]
  pub fn total_live_bytes(&self) -> i64 {
    self.records.iter().map(|record| record.live_bytes).sum()
  }

  #[must_use]
  pub fn total_live_count(&self) -> i64 {
    self.records.iter().map(|record| record.live_count).sum()
  }

  /// Render one fixed-width row per record.
  ///
  /// # Errors
  ///
  /// Returns an error if the writer fails.
  pub fn write_fixed_width<W: Write>(
    &self,
    mut writer: W,
  ) -> Result<(), ExportError> {
    let seconds = self.timestamp_secs();

    for record in &self.records {
      writer.write_all(record.render_row(seconds).as_bytes())?;
    }

    Ok(())
  }

  /// Serialize the snapshot to JSON using the provided writer.
  ///
  /// # Errors
  ///
  /// Returns an error if serialization to JSON fails.
  pub fn export_json<W: Write>(&self, writer: W) -> Result<(), ExportError> {
    serde_json::to_writer(writer, self)?;
    Ok(())
  }
}

/// Per-site change between two snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct SiteDelta {
  pub class: Arc<str>,
  pub site: String,
  pub count_delta: i64,
  pub bytes_delta: i64,
}

/// Growth of every allocation site between two snapshots.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SnapshotDelta {
  records: Vec<SiteDelta>,
}

impl SnapshotDelta {
  /// Sites missing from one side count as zero there, so a site that
  /// emptied out between the snapshots shows up as a negative delta.
  #[must_use]
  pub fn from_snapshots(newer: &Snapshot, older: &Snapshot) -> Self {
    let baseline = older
      .records()
      .iter()
      .map(|record| (record.site, record))
      .collect::<HashMap<_, _>>();

    let mut records = newer
      .records()
      .iter()
      .map(|record| {
        let (count, bytes) = baseline
          .get(&record.site)
          .map_or((0, 0), |prev| (prev.live_count, prev.live_bytes));

        SiteDelta {
          class: Arc::clone(&record.class_name),
          site: record.display_site().to_string(),
          count_delta: record.live_count - count,
          bytes_delta: record.live_bytes - bytes,
        }
      })
      .collect::<Vec<_>>();

    let current = newer
      .records()
      .iter()
      .map(|record| record.site)
      .collect::<HashSet<_>>();

    records.extend(
      older
        .records()
        .iter()
        .filter(|record| !current.contains(&record.site))
        .map(|record| SiteDelta {
          class: Arc::clone(&record.class_name),
          site: record.display_site().to_string(),
          count_delta: -record.live_count,
          bytes_delta: -record.live_bytes,
        }),
    );

    records.retain(|delta| delta.count_delta != 0 || delta.bytes_delta != 0);
    records.sort_by(|a, b| b.bytes_delta.cmp(&a.bytes_delta));

    Self { records }
  }

  #[must_use]
  pub fn records(&self) -> &[SiteDelta] {
    &self.records
  }

  /// Serialize the delta to JSON using the provided writer.
  ///
  /// # Errors
  ///
  /// Returns an error if serialization to JSON fails.
  pub fn export_json<W: Write>(&self, writer: W) -> Result<(), ExportError> {
    serde_json::to_writer(writer, self)?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  fn record(
    class: &str,
    serial: u64,
    label: Option<&str>,
    count: i64,
    bytes: i64,
  ) -> SnapshotRecord {
    SnapshotRecord {
      class_name: Arc::from(class),
      live_bytes: bytes,
      live_count: count,
      method: label.map(|_| 7),
      site: SiteKey {
        class: serial,
        method: label.map(|_| 7),
      },
      site_label: label.map(Arc::from),
    }
  }

  fn at(seconds: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(seconds)
  }

  #[test]
  fn rows_are_fixed_width_and_truncated() {
    let long_class = "c".repeat(80);
    let long_site = "s".repeat(90);
    let snapshot = Snapshot::new(
      vec![record(&long_class, 10, Some(&long_site), 3, 4096)],
      at(1_700_000_000),
    );

    let mut out = Vec::new();
    snapshot.write_fixed_width(&mut out).expect("write");
    let text = String::from_utf8(out).expect("utf8");

    let expected = format!(
      "1700000000 {} {}        3         4096\n",
      "c".repeat(45),
      "s".repeat(61)
    );
    assert_eq!(text, expected);
  }

  #[test]
  fn columns_are_fixed_in_bytes_for_non_ascii_names() {
    let class = "é".repeat(30);
    let snapshot =
      Snapshot::new(vec![record(&class, 10, Some("Ünïcödé.ñame"), 1, 8)], at(7));

    let mut out = Vec::new();
    snapshot.write_fixed_width(&mut out).expect("write");

    assert_eq!(out.len(), 10 + 1 + 45 + 1 + 61 + 1 + 8 + 1 + 12 + 1);
    let text = String::from_utf8(out).expect("cut on a char boundary");
    assert_eq!(&text[11..56], format!("{} ", "é".repeat(22)));
    assert!(text[57..118].starts_with("Ünïcödé.ñame "));
  }

  #[test]
  fn short_labels_are_padded() {
    let snapshot =
      Snapshot::new(vec![record("Foo", 10, None, 1, 16)], at(42));

    let mut out = Vec::new();
    snapshot.write_fixed_width(&mut out).expect("write");
    let text = String::from_utf8(out).expect("utf8");

    assert_eq!(text.len(), 10 + 1 + 45 + 1 + 61 + 1 + 8 + 1 + 12 + 1);
    assert!(text.starts_with("        42 Foo "));
    assert!(text.contains(" ???.??? "));
  }

  #[test]
  fn records_are_ordered_by_live_bytes() {
    let snapshot = Snapshot::new(
      vec![
        record("Small", 1, None, 1, 8),
        record("Large", 2, None, 1, 800),
      ],
      at(0),
    );

    assert_eq!(snapshot.records()[0].class_name.as_ref(), "Large");
    assert_eq!(snapshot.total_live_bytes(), 808);
    assert_eq!(snapshot.total_live_count(), 2);
  }

  #[test]
  fn json_keeps_full_class_names() {
    let long_class = "x".repeat(70);
    let snapshot =
      Snapshot::new(vec![record(&long_class, 1, Some("X.y"), 2, 64)], at(5));

    let mut out = Vec::new();
    snapshot.export_json(&mut out).expect("json");
    let value: serde_json::Value =
      serde_json::from_slice(&out).expect("valid json");

    assert_eq!(value["timestamp"], 5);
    assert_eq!(value["records"][0]["class"], long_class.as_str());
    assert_eq!(value["records"][0]["site"], "X.y");
    assert_eq!(value["records"][0]["live_bytes"], 64);
  }

  #[test]
  fn delta_tracks_growth_and_emptied_sites() {
    let older = Snapshot::new(
      vec![
        record("Foo", 1, Some("Foo.bar"), 2, 32),
        record("Gone", 2, None, 1, 8),
      ],
      at(10),
    );
    let newer = Snapshot::new(
      vec![
        record("Foo", 1, Some("Foo.bar"), 5, 80),
        record("New", 3, None, 1, 4),
      ],
      at(20),
    );

    let delta = SnapshotDelta::from_snapshots(&newer, &older);
    let by_class = delta
      .records()
      .iter()
      .map(|d| (d.class.as_ref(), (d.count_delta, d.bytes_delta)))
      .collect::<HashMap<_, _>>();

    assert_eq!(by_class["Foo"], (3, 48));
    assert_eq!(by_class["New"], (1, 4));
    assert_eq!(by_class["Gone"], (-1, -8));
    assert_eq!(delta.records()[0].class.as_ref(), "Foo");
  }

  #[test]
  fn deltas_serialize_to_json() {
    let older = Snapshot::new(vec![record("Foo", 1, None, 1, 16)], at(10));
    let newer = Snapshot::new(vec![record("Foo", 1, None, 3, 48)], at(20));

    let mut out = Vec::new();
    SnapshotDelta::from_snapshots(&newer, &older)
      .export_json(&mut out)
      .expect("json");
    let value: serde_json::Value =
      serde_json::from_slice(&out).expect("valid json");

    assert_eq!(value["records"][0]["class"], "Foo");
    assert_eq!(value["records"][0]["site"], "???.???");
    assert_eq!(value["records"][0]["count_delta"], 2);
    assert_eq!(value["records"][0]["bytes_delta"], 32);
  }

  #[test]
  fn unchanged_sites_are_omitted_from_deltas() {
    let snapshot =
      Snapshot::new(vec![record("Foo", 1, None, 2, 32)], at(10));

    let delta = SnapshotDelta::from_snapshots(&snapshot, &snapshot);
    assert!(delta.records().is_empty());
  }
}
