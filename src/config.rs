use std::{
  fs::OpenOptions,
  path::{Path, PathBuf},
  str::FromStr,
};

use regex::Regex;
use thiserror::Error;

use crate::error::ProfilerError;
use crate::export::{FixedWidthReport, JsonReport, SnapshotSink};

/// Report file used when no `log=` option is given.
pub const DEFAULT_REPORT_PATH: &str = "/tmp/heapprof.log";

/// Class-name allow-list compiled at start-up.
pub const DEFAULT_CLASS_FILTER: &str =
  r"^(bamboo|ostore|org\.apache|com\.sleepycat)\..*";

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("invalid class filter {pattern:?}: {source}")]
  InvalidFilter {
    pattern: String,
    #[source]
    source: regex::Error,
  },
  #[error("unknown report format {0:?} (expected `text` or `json`)")]
  UnknownFormat(String),
}

/// Layout of the rolling report file.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum ReportFormat {
  #[default]
  Text,
  Json,
}

impl FromStr for ReportFormat {
  type Err = ConfigError;

  fn from_str(value: &str) -> Result<Self, Self::Err> {
    match value {
      "text" => Ok(Self::Text),
      "json" => Ok(Self::Json),
      other => Err(ConfigError::UnknownFormat(other.to_string())),
    }
  }
}

/// Start-up options of the profiler.
#[derive(Debug, Clone)]
pub struct ProfilerConfig {
  /// Compiled allow-list of class names. Stored for diagnostics; every class
  /// is tracked regardless of whether it matches.
  pub class_filter: Regex,
  pub report_format: ReportFormat,
  pub report_path: PathBuf,
}

impl Default for ProfilerConfig {
  fn default() -> Self {
    Self {
      class_filter: default_filter(),
      report_format: ReportFormat::Text,
      report_path: PathBuf::from(DEFAULT_REPORT_PATH),
    }
  }
}

impl ProfilerConfig {
  /// Parse an agent option string of comma-separated `key=value` pairs:
  /// `format=text|json`, `filter=<regex>` and `log=<path>`.
  ///
  /// `log=` consumes the rest of the string, commas included, so it goes
  /// last. An empty `log=` keeps the default path. Unrecognized options are
  /// logged and ignored.
  ///
  /// # Errors
  ///
  /// Fails on an invalid filter pattern or an unknown report format.
  pub fn parse_options(options: &str) -> Result<Self, ConfigError> {
    let mut config = Self::default();
    let mut rest = options;

    while !rest.is_empty() {
      if let Some(path) = rest.trim_start().strip_prefix("log=") {
        if !path.is_empty() {
          config.report_path = PathBuf::from(path);
        }
        break;
      }

      let (option, tail) = rest.split_once(',').unwrap_or((rest, ""));
      rest = tail;

      let option = option.trim();
      if option.is_empty() {
        continue;
      }

      match option.split_once('=') {
        Some(("format", format)) => config.report_format = format.parse()?,
        Some(("filter", pattern)) => {
          config.class_filter = Regex::new(pattern).map_err(|source| {
            ConfigError::InvalidFilter {
              pattern: pattern.to_string(),
              source,
            }
          })?;
        }
        _ => tracing::warn!(option, "ignoring unrecognized profiler option"),
      }
    }

    Ok(config)
  }

  #[must_use]
  pub fn with_report_format(mut self, format: ReportFormat) -> Self {
    self.report_format = format;
    self
  }

  #[must_use]
  pub fn with_report_path(mut self, path: impl AsRef<Path>) -> Self {
    self.report_path = path.as_ref().to_path_buf();
    self
  }

  /// Whether `class_name` is on the allow-list. Allocation tracking does not
  /// consult this.
  #[must_use]
  pub fn matches_filter(&self, class_name: &str) -> bool {
    self.class_filter.is_match(class_name)
  }

  /// Open the configured report file.
  ///
  /// # Errors
  ///
  /// Fails if the file cannot be created or opened for writing.
  pub fn open_sink(&self) -> Result<Box<dyn SnapshotSink + Send>, ProfilerError> {
    let mut options = OpenOptions::new();
    options.write(true).create(true);

    #[cfg(unix)]
    {
      use std::os::unix::fs::OpenOptionsExt;
      options.mode(0o664);
    }

    let file =
      options
        .open(&self.report_path)
        .map_err(|source| ProfilerError::OpenReport {
          path: self.report_path.clone(),
          source,
        })?;

    Ok(match self.report_format {
      ReportFormat::Text => Box::new(FixedWidthReport::new(file)),
      ReportFormat::Json => Box::new(JsonReport::new(file)),
    })
  }
}

fn default_filter() -> Regex {
  match Regex::new(DEFAULT_CLASS_FILTER) {
    Ok(filter) => filter,
    Err(err) => unreachable!("built-in class filter is invalid: {err}"),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_match_the_agent_defaults() {
    let config = ProfilerConfig::parse_options("").expect("empty options");

    assert_eq!(config.report_path, PathBuf::from(DEFAULT_REPORT_PATH));
    assert_eq!(config.report_format, ReportFormat::Text);
    assert!(config.matches_filter("bamboo.lss.ASyncCore"));
    assert!(config.matches_filter("org.apache.log4j.Logger"));
    assert!(!config.matches_filter("java.lang.String"));
  }

  #[test]
  fn empty_log_value_keeps_the_default_path() {
    let config = ProfilerConfig::parse_options("log=").expect("parse");
    assert_eq!(config.report_path, PathBuf::from(DEFAULT_REPORT_PATH));
  }

  #[test]
  fn parses_every_recognized_option() {
    let config = ProfilerConfig::parse_options(
      "format=json, filter=^java\\.,log=/var/tmp/heap.txt",
    )
    .expect("parse");

    assert_eq!(config.report_path, PathBuf::from("/var/tmp/heap.txt"));
    assert_eq!(config.report_format, ReportFormat::Json);
    assert!(config.matches_filter("java.util.HashMap"));
  }

  #[test]
  fn log_path_takes_the_rest_of_the_string() {
    let config =
      ProfilerConfig::parse_options("format=json,log=/tmp/a,b.log").expect("parse");

    assert_eq!(config.report_path, PathBuf::from("/tmp/a,b.log"));
    assert_eq!(config.report_format, ReportFormat::Json);

    let config = ProfilerConfig::parse_options("log=/tmp/x,format=json")
      .expect("parse");
    assert_eq!(config.report_path, PathBuf::from("/tmp/x,format=json"));
    assert_eq!(config.report_format, ReportFormat::Text);
  }

  #[test]
  fn unknown_options_are_ignored() {
    let config =
      ProfilerConfig::parse_options("verbose,depth=3").expect("tolerated");
    assert_eq!(config.report_path, PathBuf::from(DEFAULT_REPORT_PATH));
  }

  #[test]
  fn rejects_bad_filters_and_formats() {
    assert!(matches!(
      ProfilerConfig::parse_options("filter=(unclosed"),
      Err(ConfigError::InvalidFilter { .. })
    ));
    assert!(matches!(
      ProfilerConfig::parse_options("format=xml"),
      Err(ConfigError::UnknownFormat(format)) if format == "xml"
    ));
  }

  #[test]
  fn unopenable_report_paths_fail() {
    let dir = tempfile::tempdir().expect("temp dir");
    let config = ProfilerConfig::default()
      .with_report_path(dir.path().join("missing").join("heap.log"));

    assert!(matches!(
      config.open_sink(),
      Err(ProfilerError::OpenReport { .. })
    ));
  }

  #[test]
  fn opens_report_files_in_place() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("heap.log");
    let config = ProfilerConfig::default().with_report_path(&path);

    config.open_sink().expect("open");
    assert!(path.exists());
  }
}
