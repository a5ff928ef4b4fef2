#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod asset_paths;
pub mod builder;
pub mod bundler;
pub mod config;
pub mod logging;
pub mod models;
pub mod project;
pub mod service_worker;
pub mod splitter;
pub mod stream;

pub use builder::{BuildOutcome, BuildResult, SiteBuilder};
pub use bundler::{Bundler, HtmlImportBundler};
pub use config::{BuildConfig, BundleType, ConfigError, OutputTarget};
pub use models::{BuildReport, PrecacheEntry, TargetReport};
pub use project::{Project, ProjectDescriptor};
pub use service_worker::{PrecacheServiceWorker, ServiceWorkerGenerator, ServiceWorkerRequest};
pub use splitter::HtmlSplitter;
pub use stream::{FileStream, SiteFile};
