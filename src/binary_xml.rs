//! Decoder for the compact chunk-based binary encoding of
//! `AndroidManifest.xml`.
//!
//! The stream is a sequence of length-prefixed chunks: one document chunk
//! wrapping a string pool, an optional attribute resource map, and interleaved
//! namespace/element chunks. Decoding produces an [`XmlElement`] tree whose
//! attribute and child ordering matches the stream verbatim.

use crate::chunk::{BinaryReader, StringPool, RES_STRING_POOL_TYPE};
use crate::types::{ApkError, ApkResult};
use log::{debug, warn};

const RES_XML_TYPE: u16 = 0x0003;
const RES_XML_RESOURCE_MAP_TYPE: u16 = 0x0180;
const RES_XML_START_NAMESPACE_TYPE: u16 = 0x0100;
const RES_XML_END_NAMESPACE_TYPE: u16 = 0x0101;
const RES_XML_START_ELEMENT_TYPE: u16 = 0x0102;
const RES_XML_END_ELEMENT_TYPE: u16 = 0x0103;
const RES_XML_CDATA_TYPE: u16 = 0x0104;

pub(crate) const TYPE_NULL: u8 = 0x00;
pub(crate) const TYPE_REFERENCE: u8 = 0x01;
pub(crate) const TYPE_STRING: u8 = 0x03;
pub(crate) const TYPE_FLOAT: u8 = 0x04;
pub(crate) const TYPE_DIMENSION: u8 = 0x05;
pub(crate) const TYPE_INT_DEC: u8 = 0x10;
pub(crate) const TYPE_INT_HEX: u8 = 0x11;
pub(crate) const TYPE_INT_BOOLEAN: u8 = 0x12;

/// Typed attribute values carried by the manifest tree.
#[derive(Clone, Debug, PartialEq)]
pub enum TypedValue {
    String(String),
    Boolean(bool),
    Integer(i64),
    Hex(u32),
    Float(f32),
    /// A dimension such as `12.0dip`, decoded from the packed complex form.
    Dimension(f32, &'static str),
    /// A reference into the resource table, to be resolved against it.
    Reference(u32),
}

impl TypedValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TypedValue::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_reference_id(&self) -> Option<u32> {
        match self {
            TypedValue::Reference(id) => Some(*id),
            _ => None,
        }
    }

    /// Integral view: typed integers directly, decimal strings parsed.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            TypedValue::Integer(value) => Some(*value),
            TypedValue::Hex(value) => Some(i64::from(*value)),
            TypedValue::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    }
}

/// A single attribute attached to an element.
#[derive(Clone, Debug, PartialEq)]
pub struct XmlAttribute {
    pub namespace_prefix: Option<String>,
    pub namespace_uri: Option<String>,
    /// Resource id of the attribute name, when the document carried a
    /// resource map (framework attributes like `android:name`).
    pub resource_id: Option<u32>,
    pub name: String,
    pub value: TypedValue,
}

/// DOM-style element node. Attribute and child order is the stream order.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct XmlElement {
    pub namespace_prefix: Option<String>,
    pub namespace_uri: Option<String>,
    pub tag: String,
    pub attributes: Vec<XmlAttribute>,
    pub children: Vec<XmlElement>,
    pub text: Option<String>,
}

impl XmlElement {
    pub fn new(tag: impl Into<String>) -> Self {
        XmlElement {
            tag: tag.into(),
            ..XmlElement::default()
        }
    }

    /// Look up an attribute by qualified name (`android:label`) or plain name.
    pub fn attribute_value(&self, name: &str) -> Option<&TypedValue> {
        let (namespace, local) = match name.split_once(':') {
            Some((ns, local)) => (Some(ns), local),
            None => (None, name),
        };
        self.attributes
            .iter()
            .find(|attr| attr.name == local && attr.namespace_prefix.as_deref() == namespace)
            .map(|attr| &attr.value)
    }

    /// Look up an attribute by local name, ignoring its namespace. Manifest
    /// fields like `versionCode` appear both bare and android-qualified in
    /// the wild.
    pub fn attribute_any_ns(&self, local: &str) -> Option<&TypedValue> {
        self.attributes
            .iter()
            .find(|attr| attr.name == local)
            .map(|attr| &attr.value)
    }

    pub fn find_child(&self, tag: &str) -> Option<&XmlElement> {
        self.children.iter().find(|child| child.tag == tag)
    }

    pub fn children_named<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |child| child.tag == tag)
    }
}

#[derive(Clone, Debug)]
struct NamespaceFrame {
    prefix: Option<String>,
    uri: Option<String>,
}

fn resolve_prefix(namespaces: &[NamespaceFrame], uri: Option<&str>) -> Option<String> {
    uri.and_then(|target| {
        namespaces
            .iter()
            .rev()
            .find(|frame| frame.uri.as_deref() == Some(target))
            .and_then(|frame| frame.prefix.clone())
    })
}

/// Decode an attribute's typed value. A valid raw string index wins over the
/// typed representation, mirroring how the encoder stores both.
pub(crate) fn decode_value(
    strings: &StringPool,
    raw_value_idx: u32,
    data_type: u8,
    data: u32,
) -> ApkResult<TypedValue> {
    if let Some(raw) = strings.get(raw_value_idx) {
        return Ok(TypedValue::String(raw.to_string()));
    }

    match data_type {
        TYPE_NULL => Ok(TypedValue::String(String::new())),
        TYPE_STRING => strings
            .require(data)
            .map(|s| TypedValue::String(s.to_string())),
        TYPE_REFERENCE => Ok(TypedValue::Reference(data)),
        TYPE_INT_BOOLEAN => Ok(TypedValue::Boolean(data != 0)),
        TYPE_INT_DEC => Ok(TypedValue::Integer(i64::from(data as i32))),
        TYPE_INT_HEX => Ok(TypedValue::Hex(data)),
        TYPE_FLOAT => Ok(TypedValue::Float(f32::from_bits(data))),
        TYPE_DIMENSION => Ok(decode_dimension(data)),
        _ => Ok(TypedValue::Hex(data)),
    }
}

fn decode_dimension(data: u32) -> TypedValue {
    let mantissa = (data & 0xFFFF_FF00) as i32;
    let radix_shift = match (data >> 4) & 0x3 {
        0 => 8,
        1 => 15,
        2 => 23,
        _ => 31,
    };
    let value = mantissa as f32 / (1u64 << radix_shift) as f32;
    let unit = match data & 0xF {
        0 => "px",
        1 => "dip",
        2 => "sp",
        3 => "pt",
        4 => "in",
        5 => "mm",
        _ => "?",
    };
    TypedValue::Dimension(value, unit)
}

/// A decoded `AndroidManifest.xml` document.
#[derive(Clone, Debug)]
pub struct Manifest {
    root: XmlElement,
}

impl Manifest {
    /// Decode a binary manifest chunk stream.
    pub fn from_bytes(bytes: &[u8]) -> ApkResult<Self> {
        let mut reader = BinaryReader::new(bytes);
        let xml_header = reader.read_chunk_header()?;
        if xml_header.chunk_type != RES_XML_TYPE {
            return Err(ApkError::Format(
                "binary XML does not start with a document chunk".to_string(),
            ));
        }

        let xml_end = xml_header.end();
        reader.seek(xml_header.body())?;

        let mut resource_map = Vec::new();
        let mut string_pool: Option<StringPool> = None;
        let mut namespaces: Vec<NamespaceFrame> = Vec::new();
        let mut element_stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        while reader.position() < xml_end {
            let chunk_header = reader.read_chunk_header()?;
            let chunk_end = chunk_header.end();
            match chunk_header.chunk_type {
                RES_STRING_POOL_TYPE => {
                    if string_pool.is_some() {
                        return Err(ApkError::Format(
                            "document declares a second string pool".to_string(),
                        ));
                    }
                    string_pool = Some(StringPool::parse(&mut reader, &chunk_header)?);
                }
                RES_XML_RESOURCE_MAP_TYPE => {
                    let mut ids = Vec::new();
                    while reader.position() < chunk_end {
                        ids.push(reader.read_u32()?);
                    }
                    resource_map = ids;
                }
                RES_XML_START_NAMESPACE_TYPE => {
                    let pool = require_pool(&string_pool, "namespace")?;
                    reader.read_u32()?; // line number
                    reader.read_u32()?; // comment
                    let prefix_idx = reader.read_u32()?;
                    let uri_idx = reader.read_u32()?;
                    let prefix = pool.get(prefix_idx).map(|s| s.to_string());
                    let uri = pool.get(uri_idx).map(|s| s.to_string());
                    namespaces.push(NamespaceFrame { prefix, uri });
                }
                RES_XML_END_NAMESPACE_TYPE => {
                    reader.read_u32()?;
                    reader.read_u32()?;
                    reader.read_u32()?;
                    reader.read_u32()?;
                    if namespaces.pop().is_none() {
                        return Err(ApkError::Format(
                            "namespace end without matching start".to_string(),
                        ));
                    }
                }
                RES_XML_START_ELEMENT_TYPE => {
                    let pool = require_pool(&string_pool, "element")?;
                    let element =
                        read_start_element(&mut reader, pool, &namespaces, &resource_map)?;
                    element_stack.push(element);
                }
                RES_XML_END_ELEMENT_TYPE => {
                    reader.read_u32()?;
                    reader.read_u32()?;
                    reader.read_u32()?;
                    reader.read_u32()?;
                    match element_stack.pop() {
                        Some(element) => {
                            if let Some(parent) = element_stack.last_mut() {
                                parent.children.push(element);
                            } else if root.is_none() {
                                root = Some(element);
                            } else {
                                return Err(ApkError::Format(
                                    "multiple root elements in manifest".to_string(),
                                ));
                            }
                        }
                        None => {
                            return Err(ApkError::Format(
                                "element end without matching start".to_string(),
                            ));
                        }
                    }
                }
                RES_XML_CDATA_TYPE => {
                    let pool = require_pool(&string_pool, "cdata")?;
                    read_cdata(&mut reader, pool, &mut element_stack)?;
                }
                other => {
                    // Unknown chunk type: skip by declared size.
                    warn!("skipping unknown binary XML chunk type 0x{other:04x}");
                }
            }
            reader.seek(chunk_end)?;
        }

        if !element_stack.is_empty() {
            return Err(ApkError::Truncated(
                "stream ended with unclosed elements".to_string(),
            ));
        }
        if !namespaces.is_empty() {
            return Err(ApkError::Truncated(
                "stream ended with unclosed namespace scopes".to_string(),
            ));
        }

        let root =
            root.ok_or_else(|| ApkError::Format("manifest has no root element".to_string()))?;
        debug!("decoded manifest root <{}>", root.tag);
        Ok(Manifest { root })
    }

    pub fn root(&self) -> &XmlElement {
        &self.root
    }

    pub fn package_name(&self) -> Option<&str> {
        self.root.attribute_any_ns("package").and_then(|v| v.as_str())
    }

    pub fn version_name(&self) -> Option<&str> {
        self.root
            .attribute_any_ns("versionName")
            .and_then(|v| v.as_str())
    }

    pub fn version_code(&self) -> Option<i64> {
        self.root
            .attribute_any_ns("versionCode")
            .and_then(|v| v.as_integer())
    }

    pub fn application(&self) -> Option<&XmlElement> {
        self.root.find_child("application")
    }

    /// The application label attribute, either a literal string or a
    /// resource reference.
    pub fn label_value(&self) -> Option<&TypedValue> {
        self.application()
            .and_then(|app| app.attribute_any_ns("label"))
    }

    /// The application icon attribute, normally a resource reference.
    pub fn icon_value(&self) -> Option<&TypedValue> {
        self.application()
            .and_then(|app| app.attribute_any_ns("icon"))
    }

    /// `uses-permission` name attributes in declaration order, duplicates
    /// preserved.
    pub fn uses_permissions(&self) -> Vec<String> {
        self.root
            .children_named("uses-permission")
            .filter_map(|node| node.attribute_any_ns("name"))
            .filter_map(|value| value.as_str())
            .map(|s| s.to_string())
            .collect()
    }
}

fn require_pool<'a>(pool: &'a Option<StringPool>, what: &str) -> ApkResult<&'a StringPool> {
    pool.as_ref().ok_or_else(|| {
        ApkError::Format(format!("{what} chunk encountered before string pool"))
    })
}

fn read_start_element(
    reader: &mut BinaryReader<'_>,
    pool: &StringPool,
    namespaces: &[NamespaceFrame],
    resource_map: &[u32],
) -> ApkResult<XmlElement> {
    reader.read_u32()?; // line number
    reader.read_u32()?; // comment index
    let ns_idx = reader.read_u32()?;
    let name_idx = reader.read_u32()?;
    reader.read_u16()?; // attributeStart
    reader.read_u16()?; // attributeSize
    let attr_count = reader.read_u16()? as usize;
    reader.read_u16()?; // idIndex
    reader.read_u16()?; // classIndex
    reader.read_u16()?; // styleIndex

    let tag = pool.require(name_idx)?.to_string();
    let namespace_uri = pool.get(ns_idx).map(|s| s.to_string());
    let namespace_prefix = resolve_prefix(namespaces, namespace_uri.as_deref());

    let mut element = XmlElement::new(tag);
    element.namespace_prefix = namespace_prefix;
    element.namespace_uri = namespace_uri;

    let mut attributes = Vec::with_capacity(attr_count);
    for _ in 0..attr_count {
        let attr_ns_idx = reader.read_u32()?;
        let attr_name_idx = reader.read_u32()?;
        let raw_value_idx = reader.read_u32()?;
        let value_size = reader.read_u16()?;
        reader.read_u8()?; // res0
        let data_type = reader.read_u8()?;
        let data = reader.read_u32()?;
        if value_size != 8 {
            return Err(ApkError::Format(
                "attribute value size must be 8".to_string(),
            ));
        }
        let name = pool.require(attr_name_idx)?.to_string();
        let namespace_uri = pool.get(attr_ns_idx).map(|s| s.to_string());
        let namespace_prefix = resolve_prefix(namespaces, namespace_uri.as_deref());
        let value = decode_value(pool, raw_value_idx, data_type, data)?;
        let resource_id = resource_map
            .get(attr_name_idx as usize)
            .copied()
            .filter(|id| *id != 0);
        attributes.push(XmlAttribute {
            namespace_prefix,
            namespace_uri,
            resource_id,
            name,
            value,
        });
    }
    element.attributes = attributes;
    Ok(element)
}

fn read_cdata(
    reader: &mut BinaryReader<'_>,
    pool: &StringPool,
    element_stack: &mut [XmlElement],
) -> ApkResult<()> {
    reader.read_u32()?; // line number
    reader.read_u32()?; // comment
    let data_idx = reader.read_u32()?;
    let value_size = reader.read_u16()?;
    reader.read_u8()?;
    let data_type = reader.read_u8()?;
    let data = reader.read_u32()?;
    if value_size != 8 {
        return Err(ApkError::Format("CDATA value size must be 8".to_string()));
    }
    let text = pool.get(data_idx).map(|s| s.to_string()).or_else(|| {
        if data_type == TYPE_STRING {
            pool.get(data).map(|s| s.to_string())
        } else {
            None
        }
    });
    if let (Some(text), Some(current)) = (text, element_stack.last_mut()) {
        current.text = Some(text);
    }
    Ok(())
}
