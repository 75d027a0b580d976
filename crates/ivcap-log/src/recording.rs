//! In-memory logger for asserting on emitted records.

use std::fmt;
use std::sync::Mutex;

use crate::Logger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
  Error,
  Info,
  Debug,
}

/// Keeps every record it receives.
#[derive(Debug, Default)]
pub struct RecordingLogger {
  records: Mutex<Vec<(Level, String)>>,
}

impl RecordingLogger {
  pub fn new() -> Self {
    Self::default()
  }

  /// All records so far, oldest first.
  pub fn records(&self) -> Vec<(Level, String)> {
    self.records.lock().unwrap().clone()
  }

  /// Messages logged at `level`.
  pub fn messages(&self, level: Level) -> Vec<String> {
    self
      .records()
      .into_iter()
      .filter(|(l, _)| *l == level)
      .map(|(_, m)| m)
      .collect()
  }

  /// Whether any record at `level` contains `needle`.
  pub fn contains(&self, level: Level, needle: &str) -> bool {
    self.messages(level).iter().any(|m| m.contains(needle))
  }

  fn push(&self, level: Level, args: fmt::Arguments<'_>) {
    self.records.lock().unwrap().push((level, args.to_string()));
  }
}

impl Logger for RecordingLogger {
  fn error(&self, args: fmt::Arguments<'_>) {
    self.push(Level::Error, args);
  }

  fn info(&self, args: fmt::Arguments<'_>) {
    self.push(Level::Info, args);
  }

  fn debug(&self, args: fmt::Arguments<'_>) {
    self.push(Level::Debug, args);
  }
}
