//! Default bundler that inlines HTML imports, scripts and stylesheets into entry documents.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use anyhow::Result;
use regex::{Captures, Regex};

use super::Bundler;
use crate::asset_paths::{relative_reference, resolve_reference, should_ignore_asset_reference};
use crate::project::Project;
use crate::stream::{FileStream, SiteFile, stream_from_files};

fn reference_tag_pattern() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(r"(?is)<link\b[^>]*>|<script\b([^>]*)>\s*</script\s*>")
      .expect("invalid reference tag regex")
  })
}

fn attribute_pattern() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(r#"(?is)([a-z][a-z0-9_:-]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
      .expect("invalid attribute regex")
  })
}

/// Bundles each entry document (entrypoint, shell, fragments) into a single file.
///
/// HTML imports reachable from an entry document are inlined recursively, each at most
/// once per bundle. Local `<script src>` and `<link rel="stylesheet">` references become
/// inline blocks. Imports of another entry document are left as references so fragments
/// keep loading lazily. Files that were inlined somewhere are dropped from the output;
/// everything else passes through unchanged.
#[derive(Debug, Clone)]
pub struct HtmlImportBundler {
  entry_documents: Vec<String>,
}

impl HtmlImportBundler {
  /// Create a bundler for an explicit list of root-relative entry documents.
  pub fn new(entry_documents: Vec<String>) -> Self {
    Self { entry_documents }
  }

  /// Create a bundler using the project's entrypoint, shell and fragments.
  pub fn for_project(project: &Project) -> Self {
    Self::new(project.entry_documents())
  }
}

impl Bundler for HtmlImportBundler {
  fn bundle(&self, stream: FileStream) -> Result<FileStream> {
    let files = stream.collect::<Result<Vec<SiteFile>>>()?;
    let index: BTreeMap<&str, &SiteFile> =
      files.iter().map(|file| (file.path.as_str(), file)).collect();
    let entries: BTreeSet<&str> = self.entry_documents.iter().map(String::as_str).collect();

    let mut consumed = BTreeSet::new();
    let mut bundled = BTreeMap::new();
    for entry in &self.entry_documents {
      let Some(file) = index.get(entry.as_str()) else {
        tracing::warn!(entry = %entry, "entry document missing from build input");
        continue;
      };
      let Some(text) = file.text() else {
        continue;
      };

      let mut context = BundleContext {
        index: &index,
        entries: &entries,
        entry: entry.as_str(),
        visited: BTreeSet::from([entry.clone()]),
        consumed: &mut consumed,
      };
      let output = context.inline_document(entry, text);
      tracing::debug!(entry = %entry, inlined = context.visited.len() - 1, "bundled entry document");
      bundled.insert(entry.clone(), output);
    }

    let output: Vec<SiteFile> = files
      .iter()
      .filter_map(|file| {
        if let Some(text) = bundled.remove(&file.path) {
          return Some(SiteFile::new(file.path.clone(), text));
        }
        if consumed.contains(&file.path) && !entries.contains(file.path.as_str()) {
          return None;
        }
        Some(file.clone())
      })
      .collect();

    Ok(stream_from_files(output))
  }
}

struct BundleContext<'a> {
  index: &'a BTreeMap<&'a str, &'a SiteFile>,
  entries: &'a BTreeSet<&'a str>,
  entry: &'a str,
  visited: BTreeSet<String>,
  consumed: &'a mut BTreeSet<String>,
}

impl BundleContext<'_> {
  fn inline_document(&mut self, document: &str, text: &str) -> String {
    reference_tag_pattern()
      .replace_all(text, |caps: &Captures| self.rewrite_tag(document, caps))
      .into_owned()
  }

  fn rewrite_tag(&mut self, document: &str, caps: &Captures) -> String {
    let whole = caps.get(0).map_or("", |m| m.as_str());
    let attrs = parse_attributes(whole);

    if whole.len() >= 5 && whole[..5].eq_ignore_ascii_case("<link") {
      let rel = attrs.get("rel").map(|v| v.to_ascii_lowercase()).unwrap_or_default();
      let Some(href) = attrs.get("href") else {
        return whole.to_string();
      };
      match rel.as_str() {
        "import" => self.inline_import(document, whole, href),
        "stylesheet" => self.inline_stylesheet(document, whole, href),
        _ => self.rebase_reference(document, whole, href),
      }
    } else {
      match attrs.get("src") {
        Some(src) => self.inline_script(document, whole, caps, src),
        None => whole.to_string(),
      }
    }
  }

  fn inline_import(&mut self, document: &str, tag: &str, href: &str) -> String {
    let Some(target) = self.resolve(document, href) else {
      return tag.to_string();
    };
    if self.visited.contains(&target) {
      return String::new();
    }
    if self.entries.contains(target.as_str()) {
      return self.rebase_reference(document, tag, href);
    }
    let index = self.index;
    let Some(text) = index.get(target.as_str()).and_then(|file| file.text()) else {
      tracing::warn!(document, href, "unresolved html import left in bundle");
      return self.rebase_reference(document, tag, href);
    };

    self.visited.insert(target.clone());
    self.consumed.insert(target.clone());
    self.inline_document(&target, text)
  }

  fn inline_stylesheet(&mut self, document: &str, tag: &str, href: &str) -> String {
    let Some(target) = self.resolve(document, href) else {
      return tag.to_string();
    };
    let index = self.index;
    let Some(css) = index.get(target.as_str()).and_then(|file| file.text()) else {
      return self.rebase_reference(document, tag, href);
    };
    self.consumed.insert(target);
    format!("<style>{css}</style>")
  }

  fn inline_script(&mut self, document: &str, tag: &str, caps: &Captures, src: &str) -> String {
    let Some(target) = self.resolve(document, src) else {
      return tag.to_string();
    };
    let index = self.index;
    let Some(js) = index.get(target.as_str()).and_then(|file| file.text()) else {
      return self.rebase_reference(document, tag, src);
    };
    self.consumed.insert(target);

    let attrs = caps.get(1).map_or("", |m| m.as_str());
    let remaining = remove_attribute(attrs, "src");
    let escaped = js.replace("</script", "<\\/script");
    format!("<script{remaining}>{escaped}</script>")
  }

  /// Rewrite a kept reference so it still points at the same file once the tag has been
  /// moved from `document` into the entry document.
  fn rebase_reference(&self, document: &str, tag: &str, value: &str) -> String {
    if document == self.entry || should_ignore_asset_reference(value) || value.starts_with('/') {
      return tag.to_string();
    }
    let Some(target) = resolve_reference(document, value) else {
      return tag.to_string();
    };
    let rebased = relative_reference(self.entry, &target);
    tag.replacen(value, &rebased, 1)
  }

  fn resolve(&self, document: &str, reference: &str) -> Option<String> {
    if should_ignore_asset_reference(reference) {
      return None;
    }
    resolve_reference(document, reference)
  }
}

fn parse_attributes(tag: &str) -> BTreeMap<String, String> {
  attribute_pattern()
    .captures_iter(tag)
    .filter_map(|caps| {
      let name = caps.get(1)?.as_str().to_ascii_lowercase();
      let value = caps.get(2).or(caps.get(3)).or(caps.get(4))?.as_str().to_string();
      Some((name, value))
    })
    .collect()
}

fn remove_attribute(attrs: &str, name: &str) -> String {
  let mut output = attrs.to_string();
  for caps in attribute_pattern().captures_iter(attrs) {
    if caps
      .get(1)
      .is_some_and(|m| m.as_str().eq_ignore_ascii_case(name))
      && let Some(whole) = caps.get(0)
    {
      output = output.replacen(whole.as_str(), "", 1);
    }
  }
  let collapsed = output.split_whitespace().collect::<Vec<_>>().join(" ");
  if collapsed.is_empty() {
    String::new()
  } else {
    format!(" {collapsed}")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn bundle(entries: &[&str], files: Vec<SiteFile>) -> Vec<SiteFile> {
    let bundler = HtmlImportBundler::new(entries.iter().map(|e| e.to_string()).collect());
    bundler
      .bundle(stream_from_files(files))
      .unwrap()
      .map(|f| f.unwrap())
      .collect()
  }

  fn find<'a>(files: &'a [SiteFile], path: &str) -> Option<&'a SiteFile> {
    files.iter().find(|f| f.path == path)
  }

  #[test]
  fn inlines_import_graph_into_entrypoint() {
    let output = bundle(&["index.html"], vec![
      SiteFile::new(
        "index.html",
        r#"<head><link rel="import" href="src/my-app.html"></head>"#,
      ),
      SiteFile::new(
        "src/my-app.html",
        r#"<link rel="import" href="../bower_components/polymer/polymer.html"><dom-module id="my-app"></dom-module>"#,
      ),
      SiteFile::new("bower_components/polymer/polymer.html", "<script>Polymer={}</script>"),
      SiteFile::new("images/logo.png", vec![0u8, 159, 146, 150]),
    ]);

    let paths: Vec<&str> = output.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["index.html", "images/logo.png"]);
    assert_eq!(
      output[0].text().unwrap(),
      r#"<head><script>Polymer={}</script><dom-module id="my-app"></dom-module></head>"#
    );
    assert_eq!(output[1].contents, vec![0u8, 159, 146, 150]);
  }

  #[test]
  fn inlines_each_import_once() {
    let output = bundle(&["index.html"], vec![
      SiteFile::new(
        "index.html",
        r#"<link rel="import" href="a.html"><link rel="import" href="b.html">"#,
      ),
      SiteFile::new("a.html", r#"<link rel="import" href="shared.html">A"#),
      SiteFile::new("b.html", r#"<link rel="import" href="shared.html">B"#),
      SiteFile::new("shared.html", "S"),
    ]);

    assert_eq!(output.len(), 1);
    assert_eq!(output[0].text(), Some("SAB"));
  }

  #[test]
  fn inlines_local_scripts_and_stylesheets() {
    let output = bundle(&["index.html"], vec![
      SiteFile::new(
        "index.html",
        concat!(
          r#"<link rel="stylesheet" href="styles/main.css">"#,
          r#"<script defer src="app.js"></script>"#,
          r#"<script src="https://cdn.example.com/x.js"></script>"#,
        ),
      ),
      SiteFile::new("styles/main.css", "body{margin:0}"),
      SiteFile::new("app.js", "document.write('</script>')"),
    ]);

    assert_eq!(output.len(), 1);
    assert_eq!(
      output[0].text().unwrap(),
      concat!(
        "<style>body{margin:0}</style>",
        r#"<script defer>document.write('<\/script>')</script>"#,
        r#"<script src="https://cdn.example.com/x.js"></script>"#,
      )
    );
  }

  #[test]
  fn keeps_fragments_as_separate_bundles() {
    let output = bundle(&["index.html", "src/my-app.html", "src/my-view.html"], vec![
      SiteFile::new("index.html", r#"<link rel="import" href="src/my-app.html">"#),
      SiteFile::new(
        "src/my-app.html",
        r#"<link rel="import" href="my-view.html"><link rel="import" href="my-icons.html">"#,
      ),
      SiteFile::new("src/my-view.html", r#"<link rel="import" href="my-icons.html">view"#),
      SiteFile::new("src/my-icons.html", "icons"),
    ]);

    let paths: Vec<&str> = output.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["index.html", "src/my-app.html", "src/my-view.html"]);
    assert_eq!(
      find(&output, "index.html").unwrap().text(),
      Some(r#"<link rel="import" href="src/my-app.html">"#)
    );
    assert_eq!(
      find(&output, "src/my-app.html").unwrap().text(),
      Some(r#"<link rel="import" href="my-view.html">icons"#)
    );
    assert_eq!(find(&output, "src/my-view.html").unwrap().text(), Some("iconsview"));
  }

  #[test]
  fn rebases_references_moved_into_the_entry_document() {
    let output = bundle(&["index.html"], vec![
      SiteFile::new("index.html", r#"<link rel="import" href="src/my-app.html">"#),
      SiteFile::new(
        "src/my-app.html",
        r#"<link rel="icon" href="icon.png"><link rel="import" href="missing.html">"#,
      ),
      SiteFile::new("src/icon.png", "png"),
    ]);

    assert_eq!(
      find(&output, "index.html").unwrap().text(),
      Some(r#"<link rel="icon" href="src/icon.png"><link rel="import" href="src/missing.html">"#)
    );
    assert!(find(&output, "src/icon.png").is_some());
  }

  #[test]
  fn missing_entry_documents_pass_files_through() {
    let input = vec![SiteFile::new("about.html", r#"<script src="a.js"></script>"#)];
    let output = bundle(&["index.html"], input.clone());
    assert_eq!(output, input);
  }

  #[test]
  fn closures_act_as_bundlers() {
    let upper = |stream: FileStream| -> Result<FileStream> {
      Ok(Box::new(stream.map(|item| {
        item.map(|mut file| {
          file.contents.make_ascii_uppercase();
          file
        })
      })))
    };
    let output: Vec<SiteFile> = upper
      .bundle(stream_from_files(vec![SiteFile::new("a.txt", "abc")]))
      .unwrap()
      .map(|f| f.unwrap())
      .collect();
    assert_eq!(output, vec![SiteFile::new("a.txt", "ABC")]);
  }
}
