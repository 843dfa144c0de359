//! # apkmeta
//!
//! A library for extracting metadata from Android APK files: package
//! identity, version, permissions, certificate digests, architecture support
//! and the resolved display name and launcher icon.
//!
//! The heavy lifting is the compiled-resource decoding: the binary
//! `AndroidManifest.xml` chunk stream is transcoded into an element tree
//! ([`binary_xml::Manifest`]) and `resources.arsc` is decoded into a
//! queryable index ([`resources::ResourceTable`]) so label and icon
//! references can be resolved density-aware.
//!
//! # Examples
//!
//! ```no_run
//! use apkmeta::{ApkMetadata, ParseOptions};
//!
//! let options = ParseOptions {
//!     decode_icon: true,
//!     ..ParseOptions::default()
//! };
//! let meta = ApkMetadata::from_file("app.apk", &options).unwrap();
//! println!("{} {} ({})", meta.bundle_id, meta.version, meta.build);
//! ```

pub mod archive;
pub mod binary_xml;
mod chunk;
mod metadata;
pub mod resources;
pub mod signature;
pub mod types;

pub use types::{AbiPrefixes, ApkError, ApkMetadata, ApkResult, ParseOptions};

use std::path::Path;

/// Convenience wrapper: extract metadata with the given options.
pub fn parse_apk(path: impl AsRef<Path>, options: &ParseOptions) -> ApkResult<ApkMetadata> {
    ApkMetadata::from_file(path, options)
}
