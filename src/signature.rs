//! Certificate digest extraction via the external `keytool` binary, plus the
//! whole-file content digest.
//!
//! Both operations are best-effort from the assembler's point of view:
//! failures degrade to empty digest fields rather than failing the parse.

use crate::types::{ApkError, ApkResult};
use std::fs;
use std::path::Path;
use std::process::Command;

/// Certificate digests scraped from `keytool -printcert` output,
/// normalized to lower-case hex with separators stripped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SignatureDigests {
    pub md5: String,
    pub sha1: String,
    pub sha256: String,
}

/// Narrow seam over the external tool so tests can substitute a fake.
pub trait DigestExtractor {
    fn extract(&self, apk_path: &Path) -> ApkResult<SignatureDigests>;
}

/// Extractor backed by the JDK `keytool` binary.
///
/// The invocation can block on an unresponsive process; callers wanting a
/// bound should wrap the call in their own timeout policy.
pub struct KeytoolExtractor {
    tool: std::path::PathBuf,
}

impl KeytoolExtractor {
    pub fn new(tool: impl Into<std::path::PathBuf>) -> Self {
        KeytoolExtractor { tool: tool.into() }
    }
}

impl DigestExtractor for KeytoolExtractor {
    fn extract(&self, apk_path: &Path) -> ApkResult<SignatureDigests> {
        let output = Command::new(&self.tool)
            .arg("-printcert")
            .arg("-jarfile")
            .arg(apk_path)
            .output()
            .map_err(|err| ApkError::ToolUnavailable(err.to_string()))?;
        if !output.status.success() {
            return Err(ApkError::ToolUnavailable(format!(
                "{} exited with {}",
                self.tool.display(),
                output.status
            )));
        }
        let text = String::from_utf8_lossy(&output.stdout);
        Ok(parse_printcert_output(&text))
    }
}

/// Scrape the digest lines out of `keytool -printcert` text output.
pub fn parse_printcert_output(text: &str) -> SignatureDigests {
    let mut digests = SignatureDigests::default();
    for line in text.lines() {
        if let Some((_, rest)) = line.split_once("MD5:") {
            digests.md5 = normalize_digest(rest);
        } else if let Some((_, rest)) = line.split_once("SHA256:") {
            digests.sha256 = normalize_digest(rest);
        } else if let Some((_, rest)) = line.split_once("SHA1:") {
            digests.sha1 = normalize_digest(rest);
        }
    }
    digests
}

/// Lower-case a digest and strip whitespace and colon separators.
pub fn normalize_digest(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// MD5 of the whole archive file, as 32 lower-case hex digits.
pub fn file_md5(path: &Path) -> ApkResult<String> {
    let bytes = fs::read(path)?;
    Ok(format!("{:x}", md5::compute(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_digest_lines() {
        assert_eq!(normalize_digest("  AB:CD:EF:01"), "abcdef01");
        assert_eq!(normalize_digest("ab cd"), "abcd");
    }

    #[test]
    fn scrapes_all_three_digest_lines() {
        let text = "Owner: CN=demo\n\
                    Certificate fingerprints:\n\
                    \t MD5:  AB:CD:EF:01\n\
                    \t SHA1: 11:22:33:44\n\
                    \t SHA256: AA:BB:CC:DD\n\
                    Signature algorithm name: SHA256withRSA\n";
        let digests = parse_printcert_output(text);
        assert_eq!(digests.md5, "abcdef01");
        assert_eq!(digests.sha1, "11223344");
        assert_eq!(digests.sha256, "aabbccdd");
    }

    #[test]
    fn sha256_line_is_not_mistaken_for_sha1() {
        let digests = parse_printcert_output("SHA256: AA:BB\n");
        assert_eq!(digests.sha256, "aabb");
        assert!(digests.sha1.is_empty());
    }

    #[test]
    fn missing_tool_reports_unavailable() {
        let extractor = KeytoolExtractor::new("/nonexistent/keytool");
        match extractor.extract(Path::new("x.apk")) {
            Err(ApkError::ToolUnavailable(_)) => {}
            other => panic!("expected tool-unavailable, got {other:?}"),
        }
    }

    struct FakeExtractor;

    impl DigestExtractor for FakeExtractor {
        fn extract(&self, _apk_path: &Path) -> ApkResult<SignatureDigests> {
            Ok(SignatureDigests {
                md5: "00".into(),
                sha1: "11".into(),
                sha256: "22".into(),
            })
        }
    }

    #[test]
    fn extractor_trait_is_substitutable() {
        let fake: &dyn DigestExtractor = &FakeExtractor;
        let digests = fake.extract(Path::new("x.apk")).unwrap();
        assert_eq!(digests.sha256, "22");
    }
}
