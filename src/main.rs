//! `site-pipeline` command line runner.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use site_pipeline::{
  BuildConfig, BundleType, Project, ProjectDescriptor, SiteBuilder, logging::init_logger,
};

/// Split, bundle and publish a static site with offline service workers.
#[derive(Parser, Debug)]
#[command(name = "site-pipeline", author, version)]
struct Cli {
  /// Configuration file (defaults to site.config.json in the current directory)
  #[arg(long, short = 'c', global = true)]
  config: Option<PathBuf>,

  /// Override the configured bundle type
  #[arg(long, global = true, value_enum)]
  bundle_type: Option<BundleTypeArg>,

  /// Enable debug output
  #[arg(long, short = 'v', global = true)]
  verbose: bool,

  /// Only report errors
  #[arg(long, short = 'q', global = true)]
  quiet: bool,

  /// Disable coloured output
  #[arg(long, global = true)]
  no_color: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Write the bundled and/or unbundled output, then generate service workers
  Build,
  /// Generate service workers for already written output
  ServiceWorker,
  /// Remove the build root directory
  Clean,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum BundleTypeArg {
  Bundled,
  Unbundled,
  Both,
}

impl From<BundleTypeArg> for BundleType {
  fn from(value: BundleTypeArg) -> Self {
    match value {
      BundleTypeArg::Bundled => BundleType::Bundled,
      BundleTypeArg::Unbundled => BundleType::Unbundled,
      BundleTypeArg::Both => BundleType::Both,
    }
  }
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_logger(cli.verbose, cli.quiet, cli.no_color);

  match run(cli) {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      eprintln!("Error: {err:#}");
      ExitCode::FAILURE
    }
  }
}

fn run(cli: Cli) -> Result<()> {
  let mut config = match &cli.config {
    Some(path) => BuildConfig::from_path(path)?,
    None => BuildConfig::discover(Path::new("."))?,
  };
  if let Some(bundle_type) = cli.bundle_type {
    config.build.bundle_type = bundle_type.into();
  }

  let project = load_project(&config)?;
  let builder = SiteBuilder::new(&config, &project);

  match cli.command {
    Command::Build => {
      let outcome = builder.build()?;
      for target in &outcome.report.targets {
        println!(
          "{}: {} files -> {}",
          target.target,
          target.files_written,
          target.directory.display()
        );
      }
      for worker in &outcome.service_workers {
        println!("service worker -> {}", worker.display());
      }
    }
    Command::ServiceWorker => {
      for worker in builder.service_worker()? {
        println!("service worker -> {}", worker.display());
      }
    }
    Command::Clean => builder.clean()?,
  }
  Ok(())
}

fn load_project(config: &BuildConfig) -> Result<Project> {
  let descriptor = config.project_descriptor_path();
  if descriptor.exists() {
    return Project::load(&descriptor)
      .with_context(|| format!("failed to load project from {}", descriptor.display()));
  }
  tracing::debug!(
    path = %descriptor.display(),
    "project descriptor not found, using defaults"
  );
  Ok(Project::new(
    config.base_dir.clone(),
    ProjectDescriptor::default(),
  ))
}
