//! Project descriptor loading and discovery of source and dependency files.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use walkdir::WalkDir;
use wax::{CandidatePath, Glob, Pattern};

use crate::stream::{FileStream, stream_from_disk};

/// Declarative description of a site: its entry documents, source globs and dependency
/// location. Mirrors the shape of a `polymer.json` file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProjectDescriptor {
  /// Main HTML document served for every route.
  pub entrypoint: String,
  /// Application shell document loaded by the entrypoint.
  pub shell: Option<String>,
  /// Lazily loaded documents that get their own bundle.
  pub fragments: Vec<String>,
  /// Globs, relative to the project root, selecting source files.
  pub sources: Vec<String>,
  /// Globs selecting files that are dependencies but live outside the component directory.
  pub extra_dependencies: Vec<String>,
  /// Directory holding third-party components.
  pub component_dir: String,
}

impl Default for ProjectDescriptor {
  fn default() -> Self {
    Self {
      entrypoint: "index.html".into(),
      shell: None,
      fragments: Vec::new(),
      sources: vec!["src/**/*".into()],
      extra_dependencies: Vec::new(),
      component_dir: "bower_components".into(),
    }
  }
}

/// A loaded project: descriptor plus the directory it describes.
#[derive(Debug, Clone)]
pub struct Project {
  root: PathBuf,
  descriptor: ProjectDescriptor,
}

impl Project {
  /// Create a project rooted at `root`.
  pub fn new(root: impl Into<PathBuf>, descriptor: ProjectDescriptor) -> Self {
    Self {
      root: root.into(),
      descriptor,
    }
  }

  /// Load the descriptor at `path`; the project root is the descriptor's directory.
  pub fn load(path: &Path) -> Result<Self> {
    let content =
      fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let descriptor: ProjectDescriptor = serde_json::from_str(&content)
      .with_context(|| format!("failed to parse project descriptor {}", path.display()))?;
    let root = path
      .parent()
      .filter(|parent| !parent.as_os_str().is_empty())
      .map(Path::to_path_buf)
      .unwrap_or_else(|| PathBuf::from("."));
    Ok(Self::new(root, descriptor))
  }

  /// Project root directory.
  pub fn root(&self) -> &Path {
    &self.root
  }

  /// The parsed descriptor.
  pub fn descriptor(&self) -> &ProjectDescriptor {
    &self.descriptor
  }

  /// Entrypoint, shell and fragments, normalised to root-relative paths.
  pub fn entry_documents(&self) -> Vec<String> {
    let mut documents = vec![normalise_relative(&self.descriptor.entrypoint)];
    if let Some(shell) = &self.descriptor.shell {
      documents.push(normalise_relative(shell));
    }
    documents.extend(self.descriptor.fragments.iter().map(|f| normalise_relative(f)));

    let mut seen = BTreeSet::new();
    documents.retain(|doc| !doc.is_empty() && seen.insert(doc.clone()));
    documents
  }

  /// Stream of every source file, ordered by path.
  ///
  /// Sources are the files matched by the descriptor's source globs together with the
  /// entry documents. The component directory is never treated as source.
  pub fn sources(&self) -> Result<FileStream> {
    let globs = compile_globs(&self.descriptor.sources)?;
    let component_dir = normalise_relative(&self.descriptor.component_dir);

    let mut paths = BTreeSet::new();
    for relative in self.walk_files(&self.root)? {
      if is_within(&relative, &component_dir) {
        continue;
      }
      if matches_any(&globs, &relative) {
        paths.insert(relative);
      }
    }
    for document in self.entry_documents() {
      if self.root.join(&document).is_file() {
        paths.insert(document);
      }
    }

    tracing::debug!(count = paths.len(), "collected source files");
    Ok(stream_from_disk(&self.root, paths.into_iter().collect()))
  }

  /// Stream of every dependency file, ordered by path.
  pub fn dependencies(&self) -> Result<FileStream> {
    let globs = compile_globs(&self.descriptor.extra_dependencies)?;
    let component_dir = normalise_relative(&self.descriptor.component_dir);

    let mut paths = BTreeSet::new();
    for relative in self.walk_files(&self.root)? {
      if (!component_dir.is_empty() && is_within(&relative, &component_dir))
        || matches_any(&globs, &relative)
      {
        paths.insert(relative);
      }
    }

    tracing::debug!(count = paths.len(), "collected dependency files");
    Ok(stream_from_disk(&self.root, paths.into_iter().collect()))
  }

  fn walk_files(&self, dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
      return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(dir)
      .sort_by_file_name()
      .into_iter()
      .filter_entry(|entry| {
        entry.depth() == 0 || !entry.file_name().to_string_lossy().starts_with('.')
      });

    for entry in walker {
      let entry = entry.with_context(|| format!("failed to walk {}", dir.display()))?;
      if !entry.file_type().is_file() {
        continue;
      }
      let relative = entry
        .path()
        .strip_prefix(&self.root)
        .map_err(|_| anyhow!("{} is outside {}", entry.path().display(), self.root.display()))?;
      files.push(relative.to_string_lossy().replace('\\', "/"));
    }
    Ok(files)
  }
}

/// Compile glob patterns, ignoring a leading `/` so root-anchored patterns work.
pub(crate) fn compile_globs(patterns: &[String]) -> Result<Vec<Glob<'static>>> {
  patterns
    .iter()
    .map(|pattern| {
      let trimmed = pattern.trim_start_matches('/');
      Glob::new(trimmed)
        .map(Glob::into_owned)
        .map_err(|err| anyhow!("invalid glob `{pattern}`: {err}"))
    })
    .collect()
}

pub(crate) fn matches_any(globs: &[Glob<'static>], relative: &str) -> bool {
  let candidate = CandidatePath::from(relative);
  globs.iter().any(|glob| glob.matched(&candidate).is_some())
}

fn normalise_relative(value: &str) -> String {
  value
    .replace('\\', "/")
    .trim_start_matches("./")
    .trim_matches('/')
    .to_string()
}

fn is_within(relative: &str, dir: &str) -> bool {
  !dir.is_empty()
    && relative
      .strip_prefix(dir)
      .is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::tempdir;

  fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
  }

  fn sample_project() -> (tempfile::TempDir, Project) {
    let temp = tempdir().unwrap();
    let root = temp.path();
    write(root, "polymer.json", r#"{
      "entrypoint": "index.html",
      "shell": "src/my-app.html",
      "fragments": ["src/my-view.html"],
      "sources": ["src/**/*", "images/**/*"],
      "extraDependencies": ["manifest.json"]
    }"#);
    write(root, "index.html", "<html></html>");
    write(root, "manifest.json", "{}");
    write(root, "README.md", "readme");
    write(root, "src/my-app.html", "app");
    write(root, "src/my-view.html", "view");
    write(root, "images/logo.png", "png");
    write(root, "src/.hidden/secret.html", "secret");
    write(root, "bower_components/polymer/polymer.html", "polymer");
    write(root, "bower_components/webcomponentsjs/webcomponents-lite.js", "wc");

    let project = Project::load(&root.join("polymer.json")).unwrap();
    (temp, project)
  }

  fn paths(stream: FileStream) -> Vec<String> {
    stream.map(|f| f.unwrap().path).collect()
  }

  #[test]
  fn collects_sources_and_entry_documents() {
    let (_temp, project) = sample_project();

    assert_eq!(paths(project.sources().unwrap()), vec![
      "images/logo.png",
      "index.html",
      "src/my-app.html",
      "src/my-view.html",
    ]);
  }

  #[test]
  fn collects_component_dir_and_extra_dependencies() {
    let (_temp, project) = sample_project();

    assert_eq!(paths(project.dependencies().unwrap()), vec![
      "bower_components/polymer/polymer.html",
      "bower_components/webcomponentsjs/webcomponents-lite.js",
      "manifest.json",
    ]);
  }

  #[test]
  fn entry_documents_are_deduplicated() {
    let project = Project::new(".", ProjectDescriptor {
      entrypoint: "/index.html".into(),
      shell: Some("./src/app.html".into()),
      fragments: vec!["src/app.html".into(), "src/view.html".into()],
      ..ProjectDescriptor::default()
    });

    assert_eq!(project.entry_documents(), vec![
      "index.html",
      "src/app.html",
      "src/view.html"
    ]);
  }

  #[test]
  fn invalid_globs_are_reported() {
    let project = Project::new(".", ProjectDescriptor {
      sources: vec!["src/{a,b".into()],
      ..ProjectDescriptor::default()
    });

    let err = project.sources().err().unwrap();
    assert!(err.to_string().contains("invalid glob"));
  }

  #[test]
  fn missing_root_yields_empty_streams() {
    let project = Project::new("/definitely/not/here", ProjectDescriptor::default());
    assert_eq!(project.sources().unwrap().count(), 0);
    assert_eq!(project.dependencies().unwrap().count(), 0);
  }
}
