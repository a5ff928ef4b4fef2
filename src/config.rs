//! Build configuration describing output layout, bundle selection and service worker options.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;

/// File name searched for when no explicit configuration path is given.
pub const DEFAULT_CONFIG_FILE: &str = "site.config.json";

/// Process-wide build configuration, loaded once and shared read-only with every stage.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BuildConfig {
  /// Output directory layout and bundle selection.
  pub build: BuildSection,
  /// Path of the generated service worker, relative to each output root.
  pub service_worker_path: String,
  /// Options forwarded untouched to the service worker generator.
  pub sw_precache_config: Value,
  /// Path to the project descriptor file.
  pub polymer_json_path: String,
  /// Directory relative paths are resolved against.
  #[serde(skip)]
  pub base_dir: PathBuf,
}

/// The `build` section of the configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BuildSection {
  /// Directory holding both output variants.
  pub root_directory: String,
  /// Sub-directory of the root receiving bundled output.
  pub bundled_directory: String,
  /// Sub-directory of the root receiving unbundled output.
  pub unbundled_directory: String,
  /// Which output variants a build produces.
  pub bundle_type: BundleType,
}

impl Default for BuildConfig {
  fn default() -> Self {
    Self {
      build: BuildSection::default(),
      service_worker_path: "service-worker.js".into(),
      sw_precache_config: Value::Null,
      polymer_json_path: "polymer.json".into(),
      base_dir: PathBuf::from("."),
    }
  }
}

impl Default for BuildSection {
  fn default() -> Self {
    Self {
      root_directory: "build".into(),
      bundled_directory: "bundled".into(),
      unbundled_directory: "unbundled".into(),
      bundle_type: BundleType::Both,
    }
  }
}

/// Output variant selection.
///
/// Unknown values are kept rather than rejected so a misspelt configuration produces no
/// output instead of a load failure.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum BundleType {
  /// Only the bundled variant.
  Bundled,
  /// Only the unbundled variant.
  Unbundled,
  /// Both variants.
  Both,
  /// Any other value; selects nothing.
  Unrecognized(String),
}

/// One of the two output variants a build can write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OutputTarget {
  /// Output that has passed through the bundler.
  Bundled,
  /// Output written exactly as produced by the source streams.
  Unbundled,
}

impl BundleType {
  /// Whether this selection requests the given output variant.
  pub fn includes(&self, target: OutputTarget) -> bool {
    matches!(
      (self, target),
      (Self::Both, _)
        | (Self::Bundled, OutputTarget::Bundled)
        | (Self::Unbundled, OutputTarget::Unbundled)
    )
  }

  /// Requested variants, bundled first.
  pub fn targets(&self) -> Vec<OutputTarget> {
    [OutputTarget::Bundled, OutputTarget::Unbundled]
      .into_iter()
      .filter(|target| self.includes(*target))
      .collect()
  }
}

impl From<String> for BundleType {
  fn from(value: String) -> Self {
    match value.as_str() {
      "bundled" => Self::Bundled,
      "unbundled" => Self::Unbundled,
      "both" => Self::Both,
      _ => Self::Unrecognized(value),
    }
  }
}

impl FromStr for BundleType {
  type Err = std::convert::Infallible;

  fn from_str(value: &str) -> Result<Self, Self::Err> {
    Ok(Self::from(value.to_string()))
  }
}

impl fmt::Display for BundleType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Bundled => f.write_str("bundled"),
      Self::Unbundled => f.write_str("unbundled"),
      Self::Both => f.write_str("both"),
      Self::Unrecognized(value) => f.write_str(value),
    }
  }
}

impl fmt::Display for OutputTarget {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Bundled => f.write_str("bundled"),
      Self::Unbundled => f.write_str("unbundled"),
    }
  }
}

/// Errors raised while loading the configuration file.
#[derive(Debug)]
pub enum ConfigError {
  /// Failed to read the configuration file.
  Io {
    /// Path that caused the error.
    path: PathBuf,
    /// Source I/O error.
    source: std::io::Error,
  },
  /// Failed to parse the configuration JSON.
  Parse {
    /// Path that caused the error.
    path: PathBuf,
    /// Source parse error.
    source: serde_json::Error,
  },
}

impl BuildConfig {
  /// Load configuration from the default file inside `dir`, falling back to defaults when
  /// the file does not exist.
  pub fn discover(dir: &Path) -> Result<Self, ConfigError> {
    let candidate = dir.join(DEFAULT_CONFIG_FILE);
    if !candidate.exists() {
      return Ok(Self {
        base_dir: dir.to_path_buf(),
        ..Self::default()
      });
    }
    Self::from_path(&candidate)
  }

  /// Read configuration from a specific JSON file.
  ///
  /// Relative paths inside the file resolve against the file's parent directory.
  pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    let mut config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    config.base_dir = path
      .parent()
      .filter(|parent| !parent.as_os_str().is_empty())
      .map(Path::to_path_buf)
      .unwrap_or_else(|| PathBuf::from("."));
    Ok(config)
  }

  /// Directory holding both output variants.
  pub fn root_path(&self) -> PathBuf {
    self.base_dir.join(&self.build.root_directory)
  }

  /// Absolute-or-base-relative directory for the bundled variant.
  pub fn bundled_path(&self) -> PathBuf {
    self.root_path().join(&self.build.bundled_directory)
  }

  /// Absolute-or-base-relative directory for the unbundled variant.
  pub fn unbundled_path(&self) -> PathBuf {
    self.root_path().join(&self.build.unbundled_directory)
  }

  /// Directory a given output variant is written into.
  pub fn target_directory(&self, target: OutputTarget) -> PathBuf {
    match target {
      OutputTarget::Bundled => self.bundled_path(),
      OutputTarget::Unbundled => self.unbundled_path(),
    }
  }

  /// Location of the project descriptor.
  pub fn project_descriptor_path(&self) -> PathBuf {
    self.base_dir.join(&self.polymer_json_path)
  }
}

impl fmt::Display for ConfigError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Io { path, source } => {
        write!(f, "failed to read {}: {}", path.display(), source)
      }
      Self::Parse { path, source } => {
        write!(f, "failed to parse {}: {}", path.display(), source)
      }
    }
  }
}

impl std::error::Error for ConfigError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      Self::Io { source, .. } => Some(source),
      Self::Parse { source, .. } => Some(source),
    }
  }
}
