//! Build orchestrator: merges source and dependency streams, fans them out to the
//! bundled and unbundled output directories and generates service workers.

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use rayon::prelude::*;

use crate::bundler::{Bundler, HtmlImportBundler};
use crate::config::{BuildConfig, OutputTarget};
use crate::models::{BuildReport, TargetReport};
use crate::project::Project;
use crate::service_worker::{PrecacheServiceWorker, ServiceWorkerGenerator, ServiceWorkerRequest};
use crate::splitter::HtmlSplitter;
use crate::stream::{FileStream, fork_stream, merge_streams, write_stream};

/// Generic build result type used across the crate.
pub type BuildResult<T> = anyhow::Result<T>;

/// Result of a complete two-phase build.
#[derive(Debug, Clone, Default)]
pub struct BuildOutcome {
  /// What the merge-and-write phase produced.
  pub report: BuildReport,
  /// Service workers written after the output was on disk.
  pub service_workers: Vec<PathBuf>,
}

/// High-level entry point wiring configuration, project and pipeline stages together.
pub struct SiteBuilder<'a> {
  config: &'a BuildConfig,
  project: &'a Project,
  splitter: HtmlSplitter,
  bundler: Box<dyn Bundler + 'a>,
  service_worker: Box<dyn ServiceWorkerGenerator + 'a>,
}

impl<'a> SiteBuilder<'a> {
  /// Create a builder using the default bundler and service worker generator.
  pub fn new(config: &'a BuildConfig, project: &'a Project) -> Self {
    Self {
      config,
      project,
      splitter: HtmlSplitter::new(),
      bundler: Box::new(HtmlImportBundler::for_project(project)),
      service_worker: Box::new(PrecacheServiceWorker),
    }
  }

  /// Replace the bundler applied to the bundled output branch.
  pub fn with_bundler(mut self, bundler: impl Bundler + 'a) -> Self {
    self.bundler = Box::new(bundler);
    self
  }

  /// Replace the service worker generator.
  pub fn with_service_worker_generator(
    mut self,
    generator: impl ServiceWorkerGenerator + 'a,
  ) -> Self {
    self.service_worker = Box::new(generator);
    self
  }

  /// The configuration this builder was created with.
  pub fn config(&self) -> &BuildConfig {
    self.config
  }

  /// Source files with inline scripts and styles split out.
  pub fn split_source(&self) -> BuildResult<FileStream> {
    Ok(self.splitter.split(self.project.sources()?))
  }

  /// Dependency files with inline scripts and styles split out.
  pub fn split_dependencies(&self) -> BuildResult<FileStream> {
    Ok(self.splitter.split(self.project.dependencies()?))
  }

  /// Put split pieces back into the documents they came from.
  pub fn rejoin(&self, stream: FileStream) -> FileStream {
    self.splitter.rejoin(stream)
  }

  /// Return a task that merges fresh source and dependency streams and writes them to the
  /// configured output directories.
  ///
  /// Factories rather than streams are taken so every call of the task starts from new,
  /// unconsumed streams. The task waits for every output branch; if any failed, it
  /// returns the first failure in target order and leaves the other branch's files in
  /// place.
  pub fn merge<S, D>(&self, source: S, dependencies: D) -> impl Fn() -> BuildResult<BuildReport>
  where
    S: Fn() -> BuildResult<FileStream>,
    D: Fn() -> BuildResult<FileStream>,
  {
    move || self.merge_and_write(&source, &dependencies)
  }

  fn merge_and_write(
    &self,
    source: &dyn Fn() -> BuildResult<FileStream>,
    dependencies: &dyn Fn() -> BuildResult<FileStream>,
  ) -> BuildResult<BuildReport> {
    let source = source().context("failed to create source stream")?;
    let dependencies = dependencies().context("failed to create dependency stream")?;
    let merged = merge_streams(source, dependencies);

    let bundle_type = &self.config.build.bundle_type;
    let targets = bundle_type.targets();
    if targets.is_empty() {
      tracing::warn!(%bundle_type, "unrecognized bundle type, no output will be written");
      return Ok(BuildReport::default());
    }

    let forks = fork_stream(merged, targets.len());
    let jobs: Vec<(OutputTarget, FileStream)> = targets.into_iter().zip(forks).collect();
    tracing::debug!(branches = jobs.len(), %bundle_type, "forked merged stream");

    let results: Vec<BuildResult<TargetReport>> = jobs
      .into_par_iter()
      .map(|(target, stream)| self.write_target(target, stream))
      .collect();

    let mut report = BuildReport::default();
    for result in results {
      report.targets.push(result?);
    }
    Ok(report)
  }

  fn write_target(&self, target: OutputTarget, stream: FileStream) -> BuildResult<TargetReport> {
    let directory = self.config.target_directory(target);
    let stream = match target {
      OutputTarget::Bundled => self
        .bundler
        .bundle(stream)
        .context("failed to bundle build output")?,
      OutputTarget::Unbundled => stream,
    };

    let files_written = write_stream(stream, &directory)
      .with_context(|| format!("failed to write {target} output"))?;
    tracing::info!(%target, directory = %directory.display(), files_written, "wrote build output");

    Ok(TargetReport {
      target,
      directory,
      files_written,
    })
  }

  /// Generate one service worker per requested output variant.
  ///
  /// Must run after the matching output has been written; nothing here checks that.
  pub fn service_worker(&self) -> BuildResult<Vec<PathBuf>> {
    let bundle_type = &self.config.build.bundle_type;
    let targets = bundle_type.targets();
    if targets.is_empty() {
      tracing::warn!(%bundle_type, "unrecognized bundle type, no service worker will be written");
      return Ok(Vec::new());
    }

    let results: Vec<BuildResult<PathBuf>> = targets
      .into_par_iter()
      .map(|target| {
        let build_root = self.config.target_directory(target);
        let request = ServiceWorkerRequest {
          project: self.project,
          build_root: &build_root,
          precache_config: &self.config.sw_precache_config,
          path: &self.config.service_worker_path,
          bundled: target == OutputTarget::Bundled,
        };
        self
          .service_worker
          .generate(&request)
          .with_context(|| format!("failed to generate {target} service worker"))
      })
      .collect();

    results.into_iter().collect()
  }

  /// Run the whole pipeline: split, rejoin, merge and write, then generate service workers.
  pub fn build(&self) -> BuildResult<BuildOutcome> {
    let output = self.merge(
      || Ok(self.rejoin(self.split_source()?)),
      || Ok(self.rejoin(self.split_dependencies()?)),
    );
    let report = output()?;
    let service_workers = self.service_worker()?;
    Ok(BuildOutcome {
      report,
      service_workers,
    })
  }

  /// Remove the build root directory and everything in it.
  pub fn clean(&self) -> BuildResult<()> {
    let root = self.config.root_path();
    if root.exists() {
      fs::remove_dir_all(&root).with_context(|| format!("failed to remove {}", root.display()))?;
      tracing::info!(path = %root.display(), "removed build output");
    }
    Ok(())
  }
}
