//! Bundling stage applied to the bundled output branch.

mod html_imports;

use anyhow::Result;

use crate::stream::FileStream;

pub use html_imports::HtmlImportBundler;

/// Transform that reduces a site's file graph into fewer output files.
///
/// Implementations receive the full merged stream of one build and return the stream to
/// write. They may buffer as much of the input as they need.
pub trait Bundler: Send + Sync {
  /// Bundle `stream`, returning the files that make up the bundled site.
  fn bundle(&self, stream: FileStream) -> Result<FileStream>;
}

impl<F> Bundler for F
where
  F: Fn(FileStream) -> Result<FileStream> + Send + Sync,
{
  fn bundle(&self, stream: FileStream) -> Result<FileStream> {
    self(stream)
  }
}
