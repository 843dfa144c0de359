//! Read-only access to the APK container: entry enumeration, per-entry byte
//! reads, and the native-library scan backing the architecture flags.

use crate::types::{AbiPrefixes, ApkError, ApkResult};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use zip::read::ZipArchive;

/// Entry name of the compiled manifest inside every APK.
pub const MANIFEST_ENTRY: &str = "AndroidManifest.xml";

/// Entry name of the compiled resource table, absent in minimal archives.
pub const RESOURCE_TABLE_ENTRY: &str = "resources.arsc";

/// An opened APK. Entries are decompressed on demand; the file handle is
/// released when the value is dropped, on error paths included.
#[derive(Debug)]
pub struct ApkArchive {
    archive: ZipArchive<File>,
    size: u64,
}

impl ApkArchive {
    /// Open an APK for reading. The extension is checked before the file is
    /// opened, so a non-APK path never touches the archive reader.
    pub fn open(path: impl AsRef<Path>) -> ApkResult<Self> {
        let path = path.as_ref();
        check_extension(path)?;
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        let archive = ZipArchive::new(file)?;
        Ok(ApkArchive { archive, size })
    }

    /// Archive size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// All entry names, in central directory order.
    pub fn entry_names(&self) -> Vec<String> {
        self.archive.file_names().map(|s| s.to_string()).collect()
    }

    /// Read and decompress a single entry. `None` when the entry is absent.
    pub fn read_entry(&mut self, name: &str) -> ApkResult<Option<Vec<u8>>> {
        let mut entry = match self.archive.by_name(name) {
            Ok(entry) => entry,
            Err(zip::result::ZipError::FileNotFound) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data)?;
        Ok(Some(data))
    }

    /// Read an entry that must exist; absence is a format error.
    pub fn require_entry(&mut self, name: &str) -> ApkResult<Vec<u8>> {
        self.read_entry(name)?
            .ok_or_else(|| ApkError::Format(format!("{name} not found in archive")))
    }
}

fn check_extension(path: &Path) -> ApkResult<()> {
    let ok = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("apk"))
        .unwrap_or(false);
    if ok {
        Ok(())
    } else {
        Err(ApkError::Format(format!(
            "{} does not have the .apk extension",
            path.display()
        )))
    }
}

/// Result of scanning entry names for native code.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NativeScan {
    /// Any `.so` entry present, regardless of directory.
    pub has_native_code: bool,
    /// An entry exists under one of the 64-bit ABI prefixes.
    pub has_abi64: bool,
    /// An entry exists under one of the 32-bit ABI prefixes.
    pub has_abi32: bool,
}

impl NativeScan {
    /// Architecture support flags. A pure-interpreted archive (no native
    /// code anywhere) runs on any ABI, so both flags are set.
    pub fn support_flags(&self) -> (bool, bool) {
        if !self.has_native_code && !self.has_abi64 && !self.has_abi32 {
            (true, true)
        } else {
            (self.has_abi64, self.has_abi32)
        }
    }
}

/// Classify entry names against the configured ABI directory prefixes.
pub fn scan_native_entries<S: AsRef<str>>(names: &[S], prefixes: &AbiPrefixes) -> NativeScan {
    let mut scan = NativeScan::default();
    for name in names {
        let name = name.as_ref();
        if name.ends_with(".so") {
            scan.has_native_code = true;
        }
        if prefixes.abi64.iter().any(|p| name.starts_with(p.as_str())) {
            scan.has_abi64 = true;
        }
        if prefixes.abi32.iter().any(|p| name.starts_with(p.as_str())) {
            scan.has_abi32 = true;
        }
    }
    scan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(names: &[&str]) -> (bool, bool) {
        scan_native_entries(names, &AbiPrefixes::default()).support_flags()
    }

    #[test]
    fn no_native_code_supports_both_architectures() {
        assert_eq!(flags(&["AndroidManifest.xml"]), (true, true));
    }

    #[test]
    fn arm64_library_sets_only_the_64_bit_flag() {
        assert_eq!(
            flags(&["AndroidManifest.xml", "lib/arm64-v8a/libx.so"]),
            (true, false)
        );
    }

    #[test]
    fn armeabi_v7a_library_sets_only_the_32_bit_flag() {
        assert_eq!(
            flags(&["AndroidManifest.xml", "lib/armeabi-v7a/libx.so"]),
            (false, true)
        );
    }

    #[test]
    fn stray_native_code_clears_the_pure_interpreted_fallback() {
        // A .so outside any known ABI directory means the archive does carry
        // native code, so neither flag may fall back to true.
        assert_eq!(
            flags(&["AndroidManifest.xml", "assets/plugin.so"]),
            (false, false)
        );
    }

    #[test]
    fn wrong_extension_fails_before_open() {
        // The path does not exist; a Format error proves no open was attempted.
        match ApkArchive::open("/nonexistent/bundle.zip") {
            Err(ApkError::Format(msg)) => assert!(msg.contains(".apk")),
            other => panic!("expected format error, got {other:?}"),
        }
    }
}
