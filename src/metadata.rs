//! The assembler: wires the archive scanner, manifest transcoder, resource
//! table and resolver together into one [`ApkMetadata`] record.
//!
//! Manifest and archive failures abort the extraction. Label, icon, hash and
//! signature are best-effort: their failures are logged and leave the
//! corresponding fields empty.

use crate::archive::{scan_native_entries, ApkArchive, MANIFEST_ENTRY, RESOURCE_TABLE_ENTRY};
use crate::binary_xml::{Manifest, TypedValue};
use crate::resources::{resolve, Configuration, ResourceId, ResourceTable};
use crate::signature::{file_md5, DigestExtractor, KeytoolExtractor, SignatureDigests};
use crate::types::{ApkMetadata, ApkResult, ParseOptions};
use log::{debug, warn};
use std::path::Path;

impl ApkMetadata {
    /// Extract the metadata record from an APK on disk.
    pub fn from_file(path: impl AsRef<Path>, options: &ParseOptions) -> ApkResult<Self> {
        let path = path.as_ref();
        let mut archive = ApkArchive::open(path)?;

        let names = archive.entry_names();
        let scan = scan_native_entries(&names, &options.abi_prefixes);
        let (support_os64, support_os32) = scan.support_flags();

        let manifest_bytes = archive.require_entry(MANIFEST_ENTRY)?;
        let manifest = Manifest::from_bytes(&manifest_bytes)?;

        let table = match archive.read_entry(RESOURCE_TABLE_ENTRY)? {
            Some(bytes) => Some(ResourceTable::from_bytes(&bytes)?),
            None => {
                debug!("no resource table entry; falling back to literal manifest strings");
                None
            }
        };

        let requested = Configuration::with_density(options.density);
        let name = resolve_label(&manifest, table.as_ref(), &requested);
        let icon = if options.decode_icon {
            decode_icon(&manifest, table.as_ref(), &requested, &mut archive)
        } else {
            None
        };

        let md5 = match file_md5(path) {
            Ok(digest) => digest,
            Err(err) => {
                warn!("whole-file digest failed: {err}");
                String::new()
            }
        };

        let digests = match &options.keytool_path {
            Some(tool) => match KeytoolExtractor::new(tool).extract(path) {
                Ok(digests) => digests,
                Err(err) => {
                    warn!("signature digest extraction failed: {err}");
                    SignatureDigests::default()
                }
            },
            None => SignatureDigests::default(),
        };

        Ok(ApkMetadata {
            name,
            bundle_id: manifest.package_name().unwrap_or_default().to_string(),
            version: manifest.version_name().unwrap_or_default().to_string(),
            build: manifest.version_code().unwrap_or_default(),
            icon,
            size: archive.size(),
            signature_md5: digests.md5,
            signature_sha1: digests.sha1,
            signature_sha256: digests.sha256,
            md5,
            uses_permissions: manifest.uses_permissions(),
            support_os64,
            support_os32,
        })
    }
}

/// Resolve the display name: a literal label is taken as-is; a resource
/// reference is resolved against the table when one is present. Anything
/// unresolvable yields the empty string.
fn resolve_label(
    manifest: &Manifest,
    table: Option<&ResourceTable>,
    requested: &Configuration,
) -> String {
    match manifest.label_value() {
        Some(TypedValue::String(text)) => text.clone(),
        Some(TypedValue::Reference(id)) => match table {
            Some(table) => match resolve(table, ResourceId::new(*id), requested) {
                Ok(value) => table.value_as_string(value).unwrap_or_default().to_string(),
                Err(err) => {
                    warn!("label resolution failed: {err}");
                    String::new()
                }
            },
            None => String::new(),
        },
        _ => String::new(),
    }
}

/// Resolve the icon attribute to an entry path, read that entry and decode
/// it. Every failure degrades to "no icon".
fn decode_icon(
    manifest: &Manifest,
    table: Option<&ResourceTable>,
    requested: &Configuration,
    archive: &mut ApkArchive,
) -> Option<image::DynamicImage> {
    let entry_path = match manifest.icon_value() {
        Some(TypedValue::String(path)) => path.clone(),
        Some(TypedValue::Reference(id)) => {
            let table = table?;
            match resolve(table, ResourceId::new(*id), requested) {
                Ok(value) => table.value_as_string(value)?.to_string(),
                Err(err) => {
                    warn!("icon resolution failed: {err}");
                    return None;
                }
            }
        }
        _ => return None,
    };

    let bytes = match archive.read_entry(&entry_path) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            warn!("icon entry {entry_path} not found in archive");
            return None;
        }
        Err(err) => {
            warn!("icon entry {entry_path} unreadable: {err}");
            return None;
        }
    };

    match image::load_from_memory(&bytes) {
        Ok(img) => Some(img),
        Err(err) => {
            warn!("icon decode failed for {entry_path}: {err}");
            None
        }
    }
}
