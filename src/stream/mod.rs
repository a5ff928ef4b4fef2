//! Lazy file streams and the combinators the build pipeline is wired from.
//!
//! A [`FileStream`] is single-use. Anything that needs to be consumed twice must either be
//! recreated from its factory or split with [`fork_stream`] before the first item is pulled.

mod fork;
mod sink;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub use fork::fork_stream;
pub use sink::write_stream;
pub(crate) use sink::contained_path;

/// In-memory representation of one file travelling through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteFile {
  /// Path relative to the project root, always using forward slashes.
  pub path: String,
  /// Raw file contents.
  pub contents: Vec<u8>,
}

/// Ordered, lazy, single-use sequence of files.
pub type FileStream = Box<dyn Iterator<Item = Result<SiteFile>> + Send>;

impl SiteFile {
  /// Create a file from a relative path and contents.
  pub fn new(path: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
    Self {
      path: path.into().replace('\\', "/"),
      contents: contents.into(),
    }
  }

  /// Contents decoded as UTF-8, if they are valid text.
  pub fn text(&self) -> Option<&str> {
    std::str::from_utf8(&self.contents).ok()
  }

  /// Lower-cased extension of the file name, without the dot.
  pub fn extension(&self) -> Option<String> {
    let name = self.path.rsplit('/').next()?;
    let (_, ext) = name.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
  }

  /// Whether the file is an HTML document.
  pub fn is_html(&self) -> bool {
    matches!(self.extension().as_deref(), Some("html" | "htm"))
  }
}

/// Wrap already materialised files into a stream.
pub fn stream_from_files(files: Vec<SiteFile>) -> FileStream {
  Box::new(files.into_iter().map(Ok))
}

/// Build a stream over files on disk whose contents are read only when pulled.
///
/// The set of files is fixed by `relative_paths`; a file removed after creation surfaces
/// as an error item rather than being skipped.
pub fn stream_from_disk(root: &Path, relative_paths: Vec<String>) -> FileStream {
  let root: PathBuf = root.to_path_buf();
  Box::new(relative_paths.into_iter().map(move |relative| {
    let full = root.join(&relative);
    let contents =
      fs::read(&full).with_context(|| format!("failed to read {}", full.display()))?;
    Ok(SiteFile::new(relative, contents))
  }))
}

/// Combine two streams into one.
///
/// Items are interleaved one at a time while both inputs have data; once one side is
/// exhausted the rest of the other follows. Relative order within each input is kept.
pub fn merge_streams(first: FileStream, second: FileStream) -> FileStream {
  Box::new(Interleave {
    sides: [first, second],
    done: [false, false],
    next: 0,
  })
}

struct Interleave {
  sides: [FileStream; 2],
  done: [bool; 2],
  next: usize,
}

impl Iterator for Interleave {
  type Item = Result<SiteFile>;

  fn next(&mut self) -> Option<Self::Item> {
    for _ in 0..2 {
      let side = self.next;
      self.next = 1 - self.next;
      if self.done[side] {
        continue;
      }
      match self.sides[side].next() {
        Some(item) => return Some(item),
        None => self.done[side] = true,
      }
    }
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::tempdir;

  fn names(stream: FileStream) -> Vec<String> {
    stream.map(|file| file.unwrap().path).collect()
  }

  #[test]
  fn merge_keeps_every_item_and_relative_order() {
    let source = stream_from_files(vec![
      SiteFile::new("src/a.html", "a"),
      SiteFile::new("src/b.html", "b"),
      SiteFile::new("src/c.html", "c"),
    ]);
    let deps = stream_from_files(vec![SiteFile::new("bower_components/x.js", "x")]);

    let merged = names(merge_streams(source, deps));

    assert_eq!(merged.len(), 4);
    let sources: Vec<&String> = merged.iter().filter(|p| p.starts_with("src/")).collect();
    assert_eq!(sources, vec!["src/a.html", "src/b.html", "src/c.html"]);
  }

  #[test]
  fn merge_of_empty_streams_is_empty() {
    let merged = merge_streams(stream_from_files(Vec::new()), stream_from_files(Vec::new()));
    assert_eq!(merged.count(), 0);
  }

  #[test]
  fn disk_stream_reads_lazily() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("index.html"), "<html></html>").unwrap();

    let mut stream = stream_from_disk(temp.path(), vec!["index.html".into(), "gone.html".into()]);

    let first = stream.next().unwrap().unwrap();
    assert_eq!(first.path, "index.html");
    assert_eq!(first.text(), Some("<html></html>"));
    assert!(stream.next().unwrap().is_err());
    assert!(stream.next().is_none());
  }

  #[test]
  fn detects_html_by_extension() {
    assert!(SiteFile::new("src/app.HTML", "").is_html());
    assert!(!SiteFile::new("src/app.js", "").is_html());
    assert!(!SiteFile::new("LICENSE", "").is_html());
    assert_eq!(SiteFile::new("dir.d\\file", "").path, "dir.d/file");
  }
}
