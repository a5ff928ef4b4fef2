//! Extraction of inline scripts and styles into standalone files, and the inverse.
//!
//! Splitting lets tools that only understand standalone `.js`/`.css` files process code
//! that was authored inline in HTML documents. Every split is recorded on the shared
//! [`HtmlSplitter`] so a later [`HtmlSplitter::rejoin`] can put the (possibly transformed)
//! pieces back where they came from.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, OnceLock};

use anyhow::Result;
use parking_lot::Mutex;
use regex::{Captures, Regex};

use crate::stream::{FileStream, SiteFile};

const JS_TYPES: &[&str] = &[
  "text/javascript",
  "application/javascript",
  "module",
  "text/ecmascript",
];

fn inline_block_pattern() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(r"(?is)<script\b([^>]*)>(.*?)</script\s*>|<style\b([^>]*)>(.*?)</style\s*>")
      .expect("invalid inline block regex")
  })
}

fn attribute_pattern() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(r#"(?i)(?:^|\s)(src|type)\s*=\s*["']?([^"'\s>]*)"#)
      .expect("invalid attribute regex")
  })
}

/// One extracted block.
#[derive(Debug, Clone)]
struct SplitPart {
  /// Path of the synthetic file holding the block contents.
  path: String,
  /// Tag left in the parent document in place of the block.
  placeholder: String,
  /// Original opening tag, restored on rejoin.
  open_tag: String,
  /// Original closing tag, restored on rejoin.
  close_tag: String,
}

#[derive(Debug, Default)]
struct SplitRegistry {
  parents: BTreeMap<String, Vec<SplitPart>>,
  children: BTreeMap<String, String>,
}

/// Splits HTML documents into their inline pieces and rejoins them later.
///
/// Clones share the same record of splits, so the splitter used for `split` can be
/// handed to another stage that performs the `rejoin`.
#[derive(Debug, Clone, Default)]
pub struct HtmlSplitter {
  registry: Arc<Mutex<SplitRegistry>>,
}

impl HtmlSplitter {
  /// Create a splitter with an empty split record.
  pub fn new() -> Self {
    Self::default()
  }

  /// Lazily split every HTML document in `stream`.
  ///
  /// A document with inline blocks is emitted first, with reference tags in place of
  /// the blocks, followed by one synthetic file per block. All other files pass through.
  pub fn split(&self, stream: FileStream) -> FileStream {
    Box::new(SplitStream {
      inner: stream,
      registry: Arc::clone(&self.registry),
      pending: VecDeque::new(),
    })
  }

  /// Lazily rejoin documents previously split by this splitter.
  ///
  /// A split document is held back until all of its pieces have passed, then emitted
  /// with the pieces inlined again. Groups still incomplete when the input ends are
  /// flushed as they are.
  pub fn rejoin(&self, stream: FileStream) -> FileStream {
    Box::new(RejoinStream {
      inner: stream,
      registry: Arc::clone(&self.registry),
      groups: BTreeMap::new(),
      ready: VecDeque::new(),
      finished: false,
    })
  }

  /// Whether `path` is a synthetic file produced by a split.
  pub fn is_split_part(&self, path: &str) -> bool {
    self.registry.lock().children.contains_key(path)
  }
}

/// Split a single document, returning the rewritten parent, the extracted files and the
/// record needed to rejoin them. Returns `None` when there is nothing to extract.
fn split_document(file: &SiteFile) -> Option<(SiteFile, Vec<SiteFile>, Vec<SplitPart>)> {
  if !file.is_html() {
    return None;
  }
  let text = file.text()?;
  let file_name = file.path.rsplit('/').next().unwrap_or(&file.path);

  let mut parts = Vec::new();
  let mut children = Vec::new();
  let mut script_index = 0;
  let mut style_index = 0;

  let rewritten = inline_block_pattern().replace_all(text, |caps: &Captures| {
    let whole = caps.get(0).map_or("", |m| m.as_str());
    let is_script = caps.get(1).is_some();
    let (attrs, body) = if is_script {
      (caps.get(1), caps.get(2))
    } else {
      (caps.get(3), caps.get(4))
    };
    let (Some(attrs), Some(body)) = (attrs, body) else {
      return whole.to_string();
    };
    if is_script && !is_inline_javascript(attrs.as_str()) {
      return whole.to_string();
    }

    let start = caps.get(0).map_or(0, |m| m.start());
    let end = caps.get(0).map_or(0, |m| m.end());
    let open_tag = text[start..=attrs.end()].to_string();
    let close_tag = text[body.end()..end].to_string();

    let (suffix, placeholder) = if is_script {
      let name = format!("{file_name}_script_{script_index}.js");
      script_index += 1;
      let tag = format!("<script{} src=\"{name}\"></script>", attrs.as_str());
      (name, tag)
    } else {
      let name = format!("{file_name}_style_{style_index}.css");
      style_index += 1;
      let tag = format!("<link rel=\"stylesheet\" href=\"{name}\"{}>", attrs.as_str());
      (name, tag)
    };

    let child_path = sibling_path(&file.path, &suffix);
    children.push(SiteFile::new(child_path.clone(), body.as_str()));
    parts.push(SplitPart {
      path: child_path,
      placeholder: placeholder.clone(),
      open_tag,
      close_tag,
    });
    placeholder
  });

  if parts.is_empty() {
    return None;
  }
  let parent = SiteFile::new(file.path.clone(), rewritten.into_owned());
  Some((parent, children, parts))
}

fn is_inline_javascript(attrs: &str) -> bool {
  let mut is_js = true;
  for caps in attribute_pattern().captures_iter(attrs) {
    let name = caps[1].to_ascii_lowercase();
    let value = caps[2].to_ascii_lowercase();
    match name.as_str() {
      "src" => return false,
      "type" => is_js = value.is_empty() || JS_TYPES.contains(&value.as_str()),
      _ => {}
    }
  }
  is_js
}

fn sibling_path(parent: &str, file_name: &str) -> String {
  match parent.rsplit_once('/') {
    Some((dir, _)) => format!("{dir}/{file_name}"),
    None => file_name.to_string(),
  }
}

struct SplitStream {
  inner: FileStream,
  registry: Arc<Mutex<SplitRegistry>>,
  pending: VecDeque<SiteFile>,
}

impl Iterator for SplitStream {
  type Item = Result<SiteFile>;

  fn next(&mut self) -> Option<Self::Item> {
    if let Some(file) = self.pending.pop_front() {
      return Some(Ok(file));
    }

    let file = match self.inner.next()? {
      Ok(file) => file,
      Err(err) => return Some(Err(err)),
    };

    let Some((parent, children, parts)) = split_document(&file) else {
      return Some(Ok(file));
    };

    let mut registry = self.registry.lock();
    for part in &parts {
      registry.children.insert(part.path.clone(), parent.path.clone());
    }
    registry.parents.insert(parent.path.clone(), parts);
    drop(registry);

    self.pending.extend(children);
    Some(Ok(parent))
  }
}

#[derive(Default)]
struct PendingGroup {
  parent: Option<SiteFile>,
  parts: BTreeMap<String, SiteFile>,
}

struct RejoinStream {
  inner: FileStream,
  registry: Arc<Mutex<SplitRegistry>>,
  groups: BTreeMap<String, PendingGroup>,
  ready: VecDeque<SiteFile>,
  finished: bool,
}

impl RejoinStream {
  fn accept(&mut self, file: SiteFile) -> Option<SiteFile> {
    let registry = self.registry.lock();
    let (group_key, is_parent) = if registry.parents.contains_key(&file.path) {
      (file.path.clone(), true)
    } else if let Some(parent) = registry.children.get(&file.path) {
      (parent.clone(), false)
    } else {
      return Some(file);
    };
    let expected = registry
      .parents
      .get(&group_key)
      .cloned()
      .unwrap_or_default();
    drop(registry);

    let group = self.groups.entry(group_key.clone()).or_default();
    if is_parent {
      group.parent = Some(file);
    } else {
      group.parts.insert(file.path.clone(), file);
    }

    let complete = group.parent.is_some()
      && expected
        .iter()
        .all(|part| group.parts.contains_key(&part.path));
    if complete && let Some(group) = self.groups.remove(&group_key) {
      self.ready.extend(assemble(group, &expected));
    }
    None
  }

  fn flush(&mut self) {
    let registry = self.registry.lock();
    let groups = std::mem::take(&mut self.groups);
    for (key, group) in groups {
      let expected = registry.parents.get(&key).cloned().unwrap_or_default();
      self.ready.extend(assemble(group, &expected));
    }
  }
}

/// Rebuild a document from its group. Parts that never arrived leave their reference
/// tag in place; parts without a parent are emitted unchanged.
fn assemble(group: PendingGroup, expected: &[SplitPart]) -> Vec<SiteFile> {
  let PendingGroup { parent, mut parts } = group;
  let Some(parent) = parent else {
    return parts.into_values().collect();
  };
  let Some(text) = parent.text() else {
    let mut files = vec![parent];
    files.extend(parts.into_values());
    return files;
  };

  let mut text = text.to_string();
  for part in expected {
    let Some(piece) = parts.remove(&part.path) else {
      continue;
    };
    let body = String::from_utf8_lossy(&piece.contents);
    let restored = format!("{}{}{}", part.open_tag, body, part.close_tag);
    text = text.replacen(&part.placeholder, &restored, 1);
  }

  let mut files = vec![SiteFile::new(parent.path, text)];
  files.extend(parts.into_values());
  files
}

impl Iterator for RejoinStream {
  type Item = Result<SiteFile>;

  fn next(&mut self) -> Option<Self::Item> {
    loop {
      if let Some(file) = self.ready.pop_front() {
        return Some(Ok(file));
      }
      if self.finished {
        return None;
      }
      match self.inner.next() {
        None => {
          self.finished = true;
          self.flush();
        }
        Some(Err(err)) => return Some(Err(err)),
        Some(Ok(file)) => {
          if let Some(file) = self.accept(file) {
            return Some(Ok(file));
          }
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::stream::stream_from_files;

  const PAGE: &str = r#"<html>
<head>
  <style>body { margin: 0; }</style>
  <script src="vendor.js"></script>
  <script type="text/template"><b>{{name}}</b></script>
</head>
<body>
  <script>window.answer = 42;</script>
  <script type="module">import "./app.js";</script>
</body>
</html>"#;

  fn collect(stream: FileStream) -> Vec<SiteFile> {
    stream.map(|f| f.unwrap()).collect()
  }

  #[test]
  fn extracts_inline_scripts_and_styles() {
    let splitter = HtmlSplitter::new();
    let files = collect(splitter.split(stream_from_files(vec![SiteFile::new(
      "src/index.html",
      PAGE,
    )])));

    let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec![
      "src/index.html",
      "src/index.html_style_0.css",
      "src/index.html_script_0.js",
      "src/index.html_script_1.js",
    ]);

    let parent = files[0].text().unwrap();
    assert!(parent.contains(r#"<link rel="stylesheet" href="index.html_style_0.css">"#));
    assert!(parent.contains(r#"<script src="index.html_script_0.js"></script>"#));
    assert!(parent.contains(r#"<script type="module" src="index.html_script_1.js"></script>"#));
    assert!(parent.contains(r#"<script src="vendor.js"></script>"#));
    assert!(parent.contains("{{name}}"));

    assert_eq!(files[1].text(), Some("body { margin: 0; }"));
    assert_eq!(files[2].text(), Some("window.answer = 42;"));
    assert_eq!(files[3].text(), Some(r#"import "./app.js";"#));
    assert!(splitter.is_split_part("src/index.html_script_1.js"));
  }

  #[test]
  fn data_attributes_do_not_look_like_src_or_type() {
    let splitter = HtmlSplitter::new();
    let files = collect(splitter.split(stream_from_files(vec![SiteFile::new(
      "a.html",
      r#"<script data-src="lazy">run()</script><script data-type="x">go()</script>"#,
    )])));

    let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["a.html", "a.html_script_0.js", "a.html_script_1.js"]);
    assert_eq!(files[1].text(), Some("run()"));
    assert_eq!(files[2].text(), Some("go()"));
    assert_eq!(
      files[0].text(),
      Some(concat!(
        r#"<script data-src="lazy" src="a.html_script_0.js"></script>"#,
        r#"<script data-type="x" src="a.html_script_1.js"></script>"#,
      ))
    );
  }

  #[test]
  fn passes_through_files_without_inline_blocks() {
    let splitter = HtmlSplitter::new();
    let input = vec![
      SiteFile::new("app.js", "<script>not html</script>"),
      SiteFile::new("plain.html", "<p>hi</p>"),
    ];
    let output = collect(splitter.split(stream_from_files(input.clone())));
    assert_eq!(output, input);
  }

  #[test]
  fn split_then_rejoin_restores_original_bytes() {
    let splitter = HtmlSplitter::new();
    let input = vec![
      SiteFile::new("index.html", PAGE),
      SiteFile::new("logo.svg", "<svg/>"),
      SiteFile::new("src/view.html", "<style>p{}</style><script>1</script>"),
    ];

    let output = collect(splitter.rejoin(splitter.split(stream_from_files(input.clone()))));

    assert_eq!(output.len(), 3);
    for original in &input {
      let restored = output.iter().find(|f| f.path == original.path).unwrap();
      assert_eq!(restored, original);
    }
  }

  #[test]
  fn rejoin_uses_transformed_parts() {
    let splitter = HtmlSplitter::new();
    let split = splitter.split(stream_from_files(vec![SiteFile::new(
      "a.html",
      "<script>var x = 1;</script>",
    )]));
    let transformed: FileStream = Box::new(split.map(|item| {
      item.map(|mut file| {
        if file.path.ends_with(".js") {
          file.contents = b"var x=1".to_vec();
        }
        file
      })
    }));

    let output = collect(splitter.rejoin(transformed));
    assert_eq!(output, vec![SiteFile::new("a.html", "<script>var x=1</script>")]);
  }

  #[test]
  fn rejoin_waits_for_parts_arriving_before_the_parent() {
    let splitter = HtmlSplitter::new();
    let mut files = collect(splitter.split(stream_from_files(vec![SiteFile::new(
      "a.html",
      "<style>a{}</style>",
    )])));
    files.reverse();
    files.push(SiteFile::new("b.txt", "b"));

    let output = collect(splitter.rejoin(stream_from_files(files)));
    assert_eq!(output, vec![
      SiteFile::new("a.html", "<style>a{}</style>"),
      SiteFile::new("b.txt", "b"),
    ]);
  }

  #[test]
  fn rejoin_flushes_incomplete_groups() {
    let splitter = HtmlSplitter::new();
    let files = collect(splitter.split(stream_from_files(vec![SiteFile::new(
      "a.html",
      "<script>1</script><script>2</script>",
    )])));
    let without_second: Vec<SiteFile> = files
      .into_iter()
      .filter(|f| f.path != "a.html_script_1.js")
      .collect();

    let output = collect(splitter.rejoin(stream_from_files(without_second)));
    assert_eq!(output, vec![SiteFile::new(
      "a.html",
      r#"<script>1</script><script src="a.html_script_1.js"></script>"#
    )]);
  }
}
