//! Helpers for classifying and resolving references between files of a site.
//!
//! The bundler uses these to follow `href`/`src` attributes between documents and the
//! service worker generator uses them to turn on-disk paths into precache URLs.

mod filters;
mod resolve;

pub use filters::should_ignore_asset_reference;
pub use resolve::{relative_reference, resolve_reference, url_for_path};
