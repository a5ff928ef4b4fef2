//! Data structures produced while building a site.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::OutputTarget;

/// Outcome of writing one output variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetReport {
  /// Variant that was written.
  pub target: OutputTarget,
  /// Directory the files were written into.
  pub directory: PathBuf,
  /// Number of files written.
  pub files_written: usize,
}

/// Outcome of a whole merge-and-write task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
  /// One entry per variant written, bundled first.
  pub targets: Vec<TargetReport>,
}

impl BuildReport {
  /// Variants written by the task.
  pub fn written_targets(&self) -> Vec<OutputTarget> {
    self.targets.iter().map(|report| report.target).collect()
  }

  /// Whether the task wrote nothing at all.
  pub fn is_empty(&self) -> bool {
    self.targets.is_empty()
  }
}

/// One precached file in a generated service worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecacheEntry {
  /// URL relative to the service worker's location.
  pub url: String,
  /// Content hash; a change forces the browser to refetch the file.
  pub revision: String,
}

/// Options understood by the bundled service worker generator.
///
/// This is the subset of the opaque precache configuration the default generator reads;
/// unknown keys are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PrecacheOptions {
  /// Extra files to precache, as globs relative to the build root.
  pub static_file_globs: Vec<String>,
  /// Document served for navigation requests that miss the cache.
  pub navigate_fallback: Option<String>,
  /// Prefix for the cache name.
  pub cache_id: Option<String>,
}
