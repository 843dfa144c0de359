//! Common types shared across the crate: the metadata record produced by a
//! parse, the options controlling it, and the error taxonomy.

use serde::Serialize;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Result alias used throughout the crate.
pub type ApkResult<T> = Result<T, ApkError>;

/// Errors surfaced by APK metadata extraction.
///
/// `Format`, `Truncated` and `Io` abort the whole extraction. `ResourceCycle`
/// and `NotFound` are fatal only for the specific resource being resolved;
/// the assembler treats a failed label/icon resolution as "absent".
/// `ToolUnavailable` degrades to empty signature digest fields.
#[derive(Debug)]
pub enum ApkError {
    /// Underlying file I/O failure.
    Io(io::Error),
    /// ZIP container failure.
    Zip(zip::result::ZipError),
    /// The input violates the expected structure (wrong extension, missing
    /// manifest, malformed chunk header, unbalanced nesting, bad pool index).
    Format(String),
    /// The stream ended in the middle of a declared chunk or value.
    Truncated(String),
    /// Resource reference indirection exceeded the maximum depth.
    ResourceCycle(u32),
    /// The resource id has no recorded entries.
    NotFound(u32),
    /// The external certificate tool is missing or exited non-zero.
    ToolUnavailable(String),
    /// Icon byte stream could not be decoded as an image.
    Image(String),
}

impl fmt::Display for ApkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApkError::Io(err) => write!(f, "I/O error: {err}"),
            ApkError::Zip(err) => write!(f, "ZIP error: {err}"),
            ApkError::Format(msg) => write!(f, "Malformed APK: {msg}"),
            ApkError::Truncated(msg) => write!(f, "Truncated input: {msg}"),
            ApkError::ResourceCycle(id) => {
                write!(f, "Resource reference cycle while resolving 0x{id:08x}")
            }
            ApkError::NotFound(id) => write!(f, "Resource 0x{id:08x} not found"),
            ApkError::ToolUnavailable(msg) => write!(f, "Certificate tool unavailable: {msg}"),
            ApkError::Image(msg) => write!(f, "Icon decode error: {msg}"),
        }
    }
}

impl std::error::Error for ApkError {}

impl From<io::Error> for ApkError {
    fn from(value: io::Error) -> Self {
        ApkError::Io(value)
    }
}

impl From<zip::result::ZipError> for ApkError {
    fn from(value: zip::result::ZipError) -> Self {
        ApkError::Zip(value)
    }
}

/// ABI directory prefixes used to classify native library entries.
///
/// The 32-bit default (`lib/armeabi`) deliberately covers both `armeabi` and
/// `armeabi-v7a` by prefix; callers wanting `x86` or other ABIs counted can
/// supply their own lists.
#[derive(Clone, Debug)]
pub struct AbiPrefixes {
    pub abi64: Vec<String>,
    pub abi32: Vec<String>,
}

impl Default for AbiPrefixes {
    fn default() -> Self {
        AbiPrefixes {
            abi64: vec!["lib/arm64-v8a".to_string()],
            abi32: vec!["lib/armeabi".to_string()],
        }
    }
}

/// Options controlling a metadata extraction run.
#[derive(Clone, Debug)]
pub struct ParseOptions {
    /// Path to the `keytool` binary. `None` leaves the signature digest
    /// fields empty.
    pub keytool_path: Option<PathBuf>,
    /// Decode the launcher icon bytes into an image. Off by default since
    /// image decoding is the most expensive part of a parse.
    pub decode_icon: bool,
    /// Requested pixel density for resource resolution.
    pub density: u16,
    /// ABI prefixes used for the architecture support flags.
    pub abi_prefixes: AbiPrefixes,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            keytool_path: None,
            decode_icon: false,
            density: 720,
            abi_prefixes: AbiPrefixes::default(),
        }
    }
}

/// The metadata record extracted from an APK.
#[derive(Debug, Default, Serialize)]
pub struct ApkMetadata {
    /// Resolved application display name (empty when unresolvable).
    pub name: String,
    /// Package name from the manifest root element.
    pub bundle_id: String,
    /// `versionName` manifest attribute.
    pub version: String,
    /// `versionCode` manifest attribute.
    pub build: i64,
    /// Decoded launcher icon, when requested and resolvable.
    #[serde(skip)]
    pub icon: Option<image::DynamicImage>,
    /// Archive size in bytes.
    pub size: u64,
    /// Certificate MD5 digest (lower-case hex, empty when unavailable).
    pub signature_md5: String,
    /// Certificate SHA1 digest.
    pub signature_sha1: String,
    /// Certificate SHA256 digest.
    pub signature_sha256: String,
    /// Whole-file MD5 digest.
    pub md5: String,
    /// `uses-permission` names in declaration order, duplicates preserved.
    pub uses_permissions: Vec<String>,
    /// Whether the APK runs on 64-bit devices.
    pub support_os64: bool,
    /// Whether the APK runs on 32-bit devices.
    pub support_os32: bool,
}
