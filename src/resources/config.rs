//! The configuration qualifier set attached to each resource variant.
//!
//! Only density participates in best-match selection, but the leading
//! qualifier fields are decoded so specificity tie-breaks see them. The
//! on-disk structure is self-sized; trailing fields this crate does not
//! model are skipped by the declared size.

use crate::chunk::BinaryReader;
use crate::types::{ApkError, ApkResult};

/// Bytes of the configuration we actually decode (size word included).
const DECODED_PREFIX: usize = 16;

/// A resource configuration: the qualifier axes a variant is keyed on.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Configuration {
    pub mcc: u16,
    pub mnc: u16,
    pub language: [u8; 2],
    pub country: [u8; 2],
    pub orientation: u8,
    pub touchscreen: u8,
    pub density: u16,
}

impl Configuration {
    /// A configuration qualified only by density.
    pub fn with_density(density: u16) -> Self {
        Configuration {
            density,
            ..Configuration::default()
        }
    }

    /// Parse a configuration block, consuming exactly its declared size.
    pub(crate) fn parse(reader: &mut BinaryReader<'_>) -> ApkResult<Self> {
        let start = reader.position();
        let size = reader.read_u32()? as usize;
        if size < DECODED_PREFIX {
            return Err(ApkError::Format(format!(
                "configuration block too small ({size} bytes)"
            )));
        }
        let mcc = reader.read_u16()?;
        let mnc = reader.read_u16()?;
        let language = [reader.read_u8()?, reader.read_u8()?];
        let country = [reader.read_u8()?, reader.read_u8()?];
        let orientation = reader.read_u8()?;
        let touchscreen = reader.read_u8()?;
        let density = reader.read_u16()?;
        reader.seek(start + size)?;
        Ok(Configuration {
            mcc,
            mnc,
            language,
            country,
            orientation,
            touchscreen,
            density,
        })
    }

    /// The unqualified "default" variant, valid as a fallback for any request.
    pub fn is_default(&self) -> bool {
        self.specificity() == 0
    }

    /// Number of qualifier axes this configuration declares. Used to break
    /// ties between otherwise equally ranked variants.
    pub fn specificity(&self) -> u32 {
        let mut count = 0;
        if self.mcc != 0 {
            count += 1;
        }
        if self.mnc != 0 {
            count += 1;
        }
        if self.language != [0, 0] {
            count += 1;
        }
        if self.country != [0, 0] {
            count += 1;
        }
        if self.orientation != 0 {
            count += 1;
        }
        if self.touchscreen != 0 {
            count += 1;
        }
        if self.density != 0 {
            count += 1;
        }
        count
    }
}
