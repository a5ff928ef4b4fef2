//! Directory sink terminating a pipeline branch.

use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};

use super::FileStream;

/// Drain `stream` into `directory`, creating parent directories as needed.
///
/// Returns the number of files written. Writing stops at the first failing item; files
/// already written stay on disk.
pub fn write_stream(stream: FileStream, directory: &Path) -> Result<usize> {
  fs::create_dir_all(directory)
    .with_context(|| format!("failed to create {}", directory.display()))?;

  let mut written = 0;
  for item in stream {
    let file = item?;
    let destination = contained_path(directory, &file.path)?;
    if let Some(parent) = destination.parent() {
      fs::create_dir_all(parent)
        .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&destination, &file.contents)
      .with_context(|| format!("failed to write {}", destination.display()))?;
    written += 1;
  }

  Ok(written)
}

/// Join `relative` onto `directory`, refusing anything that could land outside it.
pub(crate) fn contained_path(directory: &Path, relative: &str) -> Result<PathBuf> {
  let path = Path::new(relative);
  if path
    .components()
    .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir))
  {
    bail!("refusing to write {relative} outside {}", directory.display());
  }
  Ok(directory.join(path))
}
