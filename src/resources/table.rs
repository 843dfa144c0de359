//! Decoder for the compiled resource table chunk stream (`resources.arsc`).
//!
//! The stream is one table chunk wrapping a global value string pool and one
//! or more package chunks. Each package carries two local pools (type names,
//! key names) followed by type-spec and type chunks; each type chunk declares
//! a configuration and an offset-addressed entry array. Decoding flattens all
//! of it into an id → variant-list index that is immutable afterwards.

use crate::chunk::{BinaryReader, ChunkHeader, StringPool, NO_ENTRY_INDEX, RES_STRING_POOL_TYPE};
use crate::resources::config::Configuration;
use crate::resources::ResourceId;
use crate::types::{ApkError, ApkResult};
use bitflags::bitflags;
use log::{debug, warn};
use std::collections::BTreeMap;

const RES_TABLE_TYPE: u16 = 0x0002;
const RES_TABLE_PACKAGE_TYPE: u16 = 0x0200;
const RES_TABLE_TYPE_TYPE: u16 = 0x0201;
const RES_TABLE_TYPE_SPEC_TYPE: u16 = 0x0202;

const NO_ENTRY_OFFSET16: u16 = 0xFFFF;

bitflags! {
    /// Flags on a resource entry header.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub(crate) struct EntryFlags: u16 {
        /// The entry is a map of name/value pairs rather than a single value.
        const COMPLEX = 0x0001;
        /// The entry is public and may be referenced by other packages.
        const PUBLIC = 0x0002;
        /// The entry may be overridden by a non-weak entry of the same name.
        const WEAK = 0x0004;
        /// Compact form: type and data packed into the entry header itself.
        const COMPACT = 0x0008;
    }
}

bitflags! {
    /// Flags on a type chunk.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    struct TypeFlags: u8 {
        const SPARSE = 0x01;
        /// Entry offsets are 16-bit words scaled by 4.
        const OFFSET16 = 0x02;
    }
}

/// A raw typed value inside the resource table. String-typed values index
/// the table's global string pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResValue {
    pub data_type: u8,
    pub data: u32,
}

impl ResValue {
    fn parse(reader: &mut BinaryReader<'_>) -> ApkResult<Self> {
        let size = reader.read_u16()?;
        if size != 8 {
            return Err(ApkError::Format(format!(
                "resource value size must be 8, got {size}"
            )));
        }
        reader.read_u8()?; // res0
        let data_type = reader.read_u8()?;
        let data = reader.read_u32()?;
        Ok(ResValue { data_type, data })
    }
}

/// One decoded entry in the table, recorded under a resource id together
/// with the configuration of the type chunk it came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TableEntry {
    /// A single typed value.
    Simple { key: u32, value: ResValue },
    /// A map value (styles, arrays, attribute definitions). Kept for
    /// completeness; map entries do not resolve to strings or icons.
    Complex {
        key: u32,
        parent: u32,
        values: Vec<(u32, ResValue)>,
    },
}

impl TableEntry {
    pub fn simple_value(&self) -> Option<ResValue> {
        match self {
            TableEntry::Simple { value, .. } => Some(*value),
            TableEntry::Complex { .. } => None,
        }
    }
}

/// The decoded resource table: every entry of every package, indexed by
/// resource id, with variants kept in declaration order.
#[derive(Debug)]
pub struct ResourceTable {
    strings: StringPool,
    entries: BTreeMap<u32, Vec<(Configuration, TableEntry)>>,
}

impl ResourceTable {
    /// Decode a compiled resource table from the raw bytes of the
    /// `resources.arsc` entry.
    pub fn from_bytes(bytes: &[u8]) -> ApkResult<Self> {
        let mut reader = BinaryReader::new(bytes);
        let table_header = reader.read_chunk_header()?;
        if table_header.chunk_type != RES_TABLE_TYPE {
            return Err(ApkError::Format(
                "resource table does not start with a table chunk".to_string(),
            ));
        }
        let package_count = reader.read_u32()?;
        let table_end = table_header.end();
        reader.seek(table_header.body())?;

        let mut strings: Option<StringPool> = None;
        let mut entries: BTreeMap<u32, Vec<(Configuration, TableEntry)>> = BTreeMap::new();
        let mut packages_seen = 0u32;

        while reader.position() < table_end {
            let chunk_header = reader.read_chunk_header()?;
            let chunk_end = chunk_header.end();
            match chunk_header.chunk_type {
                RES_STRING_POOL_TYPE => {
                    if strings.is_some() {
                        return Err(ApkError::Format(
                            "resource table declares a second global string pool".to_string(),
                        ));
                    }
                    strings = Some(StringPool::parse(&mut reader, &chunk_header)?);
                }
                RES_TABLE_PACKAGE_TYPE => {
                    packages_seen += 1;
                    parse_package(&mut reader, &chunk_header, &mut entries)?;
                }
                other => {
                    warn!("skipping unknown resource table chunk type 0x{other:04x}");
                }
            }
            reader.seek(chunk_end)?;
        }

        if packages_seen < package_count {
            return Err(ApkError::Truncated(format!(
                "table declares {package_count} packages but only {packages_seen} present"
            )));
        }

        debug!(
            "decoded resource table: {} packages, {} resource ids",
            packages_seen,
            entries.len()
        );
        Ok(ResourceTable {
            strings: strings.unwrap_or_else(StringPool::empty),
            entries,
        })
    }

    /// All recorded variants for a resource id, in declaration order.
    pub fn variants(&self, id: ResourceId) -> Option<&[(Configuration, TableEntry)]> {
        self.entries.get(&id.raw()).map(|v| v.as_slice())
    }

    /// Look up a value string from the table's global pool.
    pub fn string(&self, idx: u32) -> Option<&str> {
        self.strings.get(idx)
    }

    /// Render a resolved simple value as the string it denotes, if it is
    /// string-typed (e.g. a `res/...` file path for drawables).
    pub fn value_as_string(&self, value: ResValue) -> Option<&str> {
        if value.data_type == crate::binary_xml::TYPE_STRING {
            self.string(value.data)
        } else {
            None
        }
    }

    /// Test-only construction from pre-built variant lists.
    #[cfg(test)]
    pub(crate) fn from_variants(
        variants: Vec<(u32, Vec<(Configuration, TableEntry)>)>,
    ) -> Self {
        ResourceTable {
            strings: StringPool::empty(),
            entries: variants.into_iter().collect(),
        }
    }
}

/// Decode one package chunk: its header, the two local string pools, and all
/// contained type-spec/type chunks.
fn parse_package(
    reader: &mut BinaryReader<'_>,
    header: &ChunkHeader,
    entries: &mut BTreeMap<u32, Vec<(Configuration, TableEntry)>>,
) -> ApkResult<()> {
    let package_id = reader.read_u32()?;
    if package_id > 0xFF {
        return Err(ApkError::Format(format!(
            "package id 0x{package_id:x} exceeds eight bits"
        )));
    }
    // 128 UTF-16 code units of package name plus the pool offsets sit in the
    // remainder of the header; none of them are needed for the index.
    reader.seek(header.body())?;

    let package_end = header.end();
    let mut pools_seen = 0;

    while reader.position() < package_end {
        let chunk_header = reader.read_chunk_header()?;
        let chunk_end = chunk_header.end();
        match chunk_header.chunk_type {
            RES_STRING_POOL_TYPE => {
                // Type-name pool then key-name pool; both are only needed for
                // symbolic dumps, not for id-addressed resolution.
                pools_seen += 1;
                if pools_seen > 2 {
                    return Err(ApkError::Format(
                        "package declares more than two local string pools".to_string(),
                    ));
                }
            }
            RES_TABLE_TYPE_SPEC_TYPE => {
                let id = reader.read_u8()?;
                if id == 0 {
                    return Err(ApkError::Format("type spec with id 0".to_string()));
                }
            }
            RES_TABLE_TYPE_TYPE => {
                parse_type_chunk(reader, &chunk_header, package_id as u8, entries)?;
            }
            other => {
                warn!("skipping unknown package sub-chunk type 0x{other:04x}");
            }
        }
        reader.seek(chunk_end)?;
    }
    Ok(())
}

/// Decode one type chunk: configuration, entry offset array, entries.
fn parse_type_chunk(
    reader: &mut BinaryReader<'_>,
    header: &ChunkHeader,
    package_id: u8,
    entries: &mut BTreeMap<u32, Vec<(Configuration, TableEntry)>>,
) -> ApkResult<()> {
    let type_id = reader.read_u8()?;
    if type_id == 0 {
        return Err(ApkError::Format("type chunk with id 0".to_string()));
    }
    let flags = TypeFlags::from_bits_truncate(reader.read_u8()?);
    reader.read_u16()?; // reserved
    let entry_count = reader.read_u32()?;
    let entries_start = reader.read_u32()?;
    let config = Configuration::parse(reader)?;

    if flags.contains(TypeFlags::SPARSE) {
        // Sparse encoding is only emitted for very large packages; none of
        // the archives this crate targets use it.
        warn!("skipping sparse type chunk (type id {type_id})");
        return Ok(());
    }

    // Offsets follow the declared header, one per entry.
    reader.seek(header.body())?;
    let mut offsets = Vec::with_capacity(entry_count as usize);
    if flags.contains(TypeFlags::OFFSET16) {
        for _ in 0..entry_count {
            let raw = reader.read_u16()?;
            offsets.push(if raw == NO_ENTRY_OFFSET16 {
                NO_ENTRY_INDEX
            } else {
                u32::from(raw) * 4
            });
        }
    } else {
        for _ in 0..entry_count {
            offsets.push(reader.read_u32()?);
        }
    }

    let entries_base = header.start + entries_start as usize;
    let chunk_end = header.end();

    for (index, offset) in offsets.into_iter().enumerate() {
        if offset == NO_ENTRY_INDEX {
            continue;
        }
        let position = entries_base + offset as usize;
        if position >= chunk_end {
            return Err(ApkError::Format(format!(
                "entry offset {offset} points outside its type chunk"
            )));
        }
        reader.seek(position)?;
        let entry = parse_entry(reader)?;
        let id = ResourceId::from_parts(package_id, type_id, index as u16);
        entries
            .entry(id.raw())
            .or_default()
            .push((config.clone(), entry));
    }
    Ok(())
}

fn parse_entry(reader: &mut BinaryReader<'_>) -> ApkResult<TableEntry> {
    let size_or_key = reader.read_u16()?;
    let flags_raw = reader.read_u16()?;
    let flags = EntryFlags::from_bits_truncate(flags_raw);

    if flags.contains(EntryFlags::COMPACT) {
        // Compact form packs the value type into the flag word and the data
        // into the key slot.
        let data = reader.read_u32()?;
        return Ok(TableEntry::Simple {
            key: u32::from(size_or_key),
            value: ResValue {
                data_type: (flags_raw >> 8) as u8,
                data,
            },
        });
    }

    let key = reader.read_u32()?;
    if flags.contains(EntryFlags::COMPLEX) {
        let parent = reader.read_u32()?;
        let count = reader.read_u32()?;
        let mut values = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name = reader.read_u32()?;
            let value = ResValue::parse(reader)?;
            values.push((name, value));
        }
        Ok(TableEntry::Complex {
            key,
            parent,
            values,
        })
    } else {
        let value = ResValue::parse(reader)?;
        Ok(TableEntry::Simple { key, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fixtures;

    #[test]
    fn rejects_stream_without_table_chunk() {
        let bytes = fixtures::string_pool_chunk(&["a"]);
        match ResourceTable::from_bytes(&bytes) {
            Err(ApkError::Format(_)) => {}
            other => panic!("expected format error, got {other:?}"),
        }
    }

    #[test]
    fn decodes_simple_entries_under_composed_ids() {
        let table_bytes = fixtures::TableBuilder::new(&["Demo App", "res/ic.png"])
            .package(0x7F, |pkg| {
                pkg.type_chunk(0x01, Configuration::default(), &[Some(fixtures::simple_string_entry(0))]);
                pkg.type_chunk(0x01, Configuration::with_density(320), &[Some(fixtures::simple_string_entry(1))]);
            })
            .build();

        let table = ResourceTable::from_bytes(&table_bytes).unwrap();
        let id = ResourceId::from_parts(0x7F, 0x01, 0);
        let variants = table.variants(id).expect("entry recorded");
        assert_eq!(variants.len(), 2);
        assert!(variants[0].0.is_default());
        assert_eq!(variants[1].0.density, 320);
        let value = variants[0].1.simple_value().unwrap();
        assert_eq!(table.value_as_string(value), Some("Demo App"));
    }

    #[test]
    fn absent_offsets_are_not_recorded() {
        let table_bytes = fixtures::TableBuilder::new(&["only"])
            .package(0x7F, |pkg| {
                pkg.type_chunk(
                    0x01,
                    Configuration::default(),
                    &[None, Some(fixtures::simple_string_entry(0)), None],
                );
            })
            .build();

        let table = ResourceTable::from_bytes(&table_bytes).unwrap();
        assert!(table.variants(ResourceId::from_parts(0x7F, 0x01, 0)).is_none());
        assert!(table.variants(ResourceId::from_parts(0x7F, 0x01, 1)).is_some());
        assert!(table.variants(ResourceId::from_parts(0x7F, 0x01, 2)).is_none());
    }

    #[test]
    fn unknown_package_resolves_to_nothing() {
        let table_bytes = fixtures::TableBuilder::new(&["x"])
            .package(0x7F, |pkg| {
                pkg.type_chunk(0x01, Configuration::default(), &[Some(fixtures::simple_string_entry(0))]);
            })
            .build();
        let table = ResourceTable::from_bytes(&table_bytes).unwrap();
        assert!(table.variants(ResourceId::from_parts(0x01, 0x01, 0)).is_none());
        assert!(table.variants(ResourceId::from_parts(0x7F, 0x02, 0)).is_none());
    }
}
