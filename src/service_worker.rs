//! Offline service worker generation for a written build root.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::asset_paths::{relative_reference, url_for_path};
use crate::models::{PrecacheEntry, PrecacheOptions};
use crate::project::{Project, compile_globs, matches_any};
use crate::stream::contained_path;

const DEFAULT_CACHE_ID: &str = "site-pipeline";

/// Everything a generator needs to produce one service worker.
#[derive(Debug, Clone, Copy)]
pub struct ServiceWorkerRequest<'a> {
  /// Project the build was produced from.
  pub project: &'a Project,
  /// Output directory the worker describes.
  pub build_root: &'a Path,
  /// Precache options, passed through from the configuration untouched.
  pub precache_config: &'a Value,
  /// Worker path relative to `build_root`.
  pub path: &'a str,
  /// Whether `build_root` holds bundled output.
  pub bundled: bool,
}

/// Produces a service worker file for a build root.
pub trait ServiceWorkerGenerator: Send + Sync {
  /// Write the worker described by `request`, returning the path written.
  fn generate(&self, request: &ServiceWorkerRequest<'_>) -> Result<PathBuf>;
}

/// Default generator writing a self-contained precaching worker.
///
/// Bundled builds precache the entry documents; unbundled builds precache every file in
/// the build root. Both add files matching `staticFileGlobs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrecacheServiceWorker;

impl ServiceWorkerGenerator for PrecacheServiceWorker {
  fn generate(&self, request: &ServiceWorkerRequest<'_>) -> Result<PathBuf> {
    let destination = contained_path(request.build_root, request.path)?;
    let options = parse_options(request.precache_config)?;
    let entries = collect_precache_entries(request, &options)?;
    let script = render_service_worker(&entries, &options)?;

    if let Some(parent) = destination.parent() {
      fs::create_dir_all(parent)
        .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&destination, script)
      .with_context(|| format!("failed to write {}", destination.display()))?;

    tracing::info!(
      path = %destination.display(),
      precached = entries.len(),
      bundled = request.bundled,
      "wrote service worker"
    );
    Ok(destination)
  }
}

fn parse_options(value: &Value) -> Result<PrecacheOptions> {
  if value.is_null() {
    return Ok(PrecacheOptions::default());
  }
  serde_json::from_value(value.clone()).context("invalid swPrecacheConfig")
}

/// Build the sorted precache manifest for a request.
pub fn collect_precache_entries(
  request: &ServiceWorkerRequest<'_>,
  options: &PrecacheOptions,
) -> Result<Vec<PrecacheEntry>> {
  let root = request.build_root;
  let worker_path = url_for_path(request.path);
  let globs = compile_globs(&options.static_file_globs)?;
  let entry_documents = request.project.entry_documents();

  let mut entries = Vec::new();
  if !root.is_dir() {
    return Ok(entries);
  }

  for entry in WalkDir::new(root).sort_by_file_name() {
    let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
    if !entry.file_type().is_file() {
      continue;
    }
    let Ok(relative) = entry.path().strip_prefix(root) else {
      continue;
    };
    let relative = url_for_path(&relative.to_string_lossy());
    if relative == worker_path {
      continue;
    }

    let wanted = !request.bundled
      || entry_documents.iter().any(|doc| doc == &relative)
      || matches_any(&globs, &relative);
    if !wanted {
      continue;
    }

    let contents = fs::read(entry.path())
      .with_context(|| format!("failed to read {}", entry.path().display()))?;
    entries.push(PrecacheEntry {
      url: relative_reference(&worker_path, &relative),
      revision: format!("{:x}", Sha256::digest(&contents)),
    });
  }

  entries.sort_by(|a, b| a.url.cmp(&b.url));
  Ok(entries)
}

/// Render the worker script for a manifest.
pub fn render_service_worker(
  entries: &[PrecacheEntry],
  options: &PrecacheOptions,
) -> Result<String> {
  let manifest: Vec<[&str; 2]> = entries
    .iter()
    .map(|entry| [entry.url.as_str(), entry.revision.as_str()])
    .collect();
  let manifest_json = serde_json::to_string(&manifest)?;

  let mut hasher = Sha256::new();
  hasher.update(manifest_json.as_bytes());
  let version = format!("{:x}", hasher.finalize());

  let cache_prefix = format!(
    "{}-",
    options.cache_id.as_deref().unwrap_or(DEFAULT_CACHE_ID)
  );
  let cache_name = format!("{cache_prefix}{}", &version[..16]);

  Ok(format!(
    r#"// Generated at build time by site-pipeline. Do not edit.
'use strict';

var PRECACHE_MANIFEST = {manifest};
var CACHE_PREFIX = {prefix};
var CACHE_NAME = {name};
var NAVIGATE_FALLBACK = {fallback};

function precacheUrl(entry) {{
  return new URL(entry[0], self.location).toString();
}}

self.addEventListener('install', function (event) {{
  event.waitUntil(
    caches.open(CACHE_NAME).then(function (cache) {{
      return cache.addAll(PRECACHE_MANIFEST.map(function (entry) {{
        return new Request(precacheUrl(entry), {{ cache: 'reload' }});
      }}));
    }}).then(function () {{
      return self.skipWaiting();
    }})
  );
}});

self.addEventListener('activate', function (event) {{
  event.waitUntil(
    caches.keys().then(function (names) {{
      return Promise.all(names.filter(function (name) {{
        return name.indexOf(CACHE_PREFIX) === 0 && name !== CACHE_NAME;
      }}).map(function (name) {{
        return caches.delete(name);
      }}));
    }}).then(function () {{
      return self.clients.claim();
    }})
  );
}});

self.addEventListener('fetch', function (event) {{
  if (event.request.method !== 'GET') {{
    return;
  }}
  event.respondWith(
    caches.open(CACHE_NAME).then(function (cache) {{
      return cache.match(event.request, {{ ignoreSearch: true }}).then(function (response) {{
        if (response) {{
          return response;
        }}
        if (NAVIGATE_FALLBACK && event.request.mode === 'navigate') {{
          return cache.match(new URL(NAVIGATE_FALLBACK, self.location).toString()).then(function (fallback) {{
            return fallback || fetch(event.request);
          }});
        }}
        return fetch(event.request);
      }});
    }})
  );
}});
"#,
    manifest = manifest_json,
    prefix = serde_json::to_string(&cache_prefix)?,
    name = serde_json::to_string(&cache_name)?,
    fallback = serde_json::to_string(&options.navigate_fallback)?,
  ))
}
