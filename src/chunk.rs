//! Low-level primitives shared by the binary XML transcoder and the resource
//! table decoder: a little-endian cursor over a byte slice, the common chunk
//! header, and the interned string pool chunk.

use crate::types::{ApkError, ApkResult};

/// Chunk type tag for a string pool (`RES_STRING_POOL_TYPE`).
pub(crate) const RES_STRING_POOL_TYPE: u16 = 0x0001;

/// Sentinel index meaning "no string" / "no entry".
pub(crate) const NO_ENTRY_INDEX: u32 = 0xFFFF_FFFF;

const STRING_FLAG_UTF8: u32 = 0x0000_0100;

/// Header common to every chunk in the stream: a 16-bit type tag, the size of
/// the header itself and the total size including payload.
#[derive(Debug)]
pub(crate) struct ChunkHeader {
    pub(crate) chunk_type: u16,
    pub(crate) header_size: u16,
    pub(crate) chunk_size: u32,
    pub(crate) start: usize,
}

impl ChunkHeader {
    pub(crate) fn end(&self) -> usize {
        self.start + self.chunk_size as usize
    }

    /// Offset just past the declared header, where the chunk body begins.
    pub(crate) fn body(&self) -> usize {
        self.start + self.header_size as usize
    }
}

/// Cursor over an in-memory chunk stream. All reads are little-endian;
/// running off the end is a truncated-input error.
pub(crate) struct BinaryReader<'a> {
    pub(crate) data: &'a [u8],
    pos: usize,
}

impl<'a> BinaryReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        BinaryReader { data, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub(crate) fn read_u8(&mut self) -> ApkResult<u8> {
        if self.pos + 1 > self.data.len() {
            return Err(ApkError::Truncated("unexpected end of chunk stream".to_string()));
        }
        let value = self.data[self.pos];
        self.pos += 1;
        Ok(value)
    }

    pub(crate) fn read_u16(&mut self) -> ApkResult<u16> {
        if self.pos + 2 > self.data.len() {
            return Err(ApkError::Truncated("unexpected end of chunk stream".to_string()));
        }
        let value = u16::from_le_bytes([self.data[self.pos], self.data[self.pos + 1]]);
        self.pos += 2;
        Ok(value)
    }

    pub(crate) fn read_u32(&mut self) -> ApkResult<u32> {
        if self.pos + 4 > self.data.len() {
            return Err(ApkError::Truncated("unexpected end of chunk stream".to_string()));
        }
        let value = u32::from_le_bytes([
            self.data[self.pos],
            self.data[self.pos + 1],
            self.data[self.pos + 2],
            self.data[self.pos + 3],
        ]);
        self.pos += 4;
        Ok(value)
    }

    pub(crate) fn seek(&mut self, offset: usize) -> ApkResult<()> {
        if offset > self.data.len() {
            return Err(ApkError::Truncated(
                "attempted to seek past end of chunk stream".to_string(),
            ));
        }
        self.pos = offset;
        Ok(())
    }

    /// Read and validate the next chunk header. The declared size must cover
    /// the header and must not run past the remaining stream.
    pub(crate) fn read_chunk_header(&mut self) -> ApkResult<ChunkHeader> {
        let start = self.position();
        if self.remaining() < 8 {
            return Err(ApkError::Truncated("truncated chunk header".to_string()));
        }
        let chunk_type = self.read_u16()?;
        let header_size = self.read_u16()?;
        let chunk_size = self.read_u32()?;
        if chunk_size < header_size as u32 || header_size < 8 {
            return Err(ApkError::Format(format!(
                "invalid chunk sizing (header {header_size}, total {chunk_size})"
            )));
        }
        let end = start
            .checked_add(chunk_size as usize)
            .ok_or_else(|| ApkError::Format("chunk size overflow".to_string()))?;
        if end > self.data.len() {
            return Err(ApkError::Truncated(
                "chunk extends past end of stream".to_string(),
            ));
        }
        Ok(ChunkHeader {
            chunk_type,
            header_size,
            chunk_size,
            start,
        })
    }
}

/// A decoded string pool chunk. Source strings are UTF-8 or UTF-16 depending
/// on the pool flags; both normalize to `String`.
#[derive(Debug)]
pub(crate) struct StringPool {
    strings: Vec<String>,
}

impl StringPool {
    pub(crate) fn empty() -> Self {
        StringPool { strings: Vec::new() }
    }

    /// Parse a pool given its already-read chunk header. Leaves the reader
    /// position unspecified; callers seek to the chunk end afterwards.
    pub(crate) fn parse(reader: &mut BinaryReader<'_>, header: &ChunkHeader) -> ApkResult<Self> {
        let string_count = reader.read_u32()? as usize;
        let style_count = reader.read_u32()? as usize;
        let flags = reader.read_u32()?;
        let strings_start = reader.read_u32()? as usize;
        let _styles_start = reader.read_u32()?;

        let is_utf8 = (flags & STRING_FLAG_UTF8) != 0;

        let mut string_offsets = Vec::with_capacity(string_count);
        for _ in 0..string_count {
            string_offsets.push(reader.read_u32()? as usize);
        }
        for _ in 0..style_count {
            reader.read_u32()?; // style offsets, unused
        }

        let strings_base = header.start + strings_start;
        let chunk_end = header.end();

        let mut strings = Vec::with_capacity(string_count);
        for offset in string_offsets {
            let absolute = strings_base + offset;
            let text = if is_utf8 {
                read_utf8_string(reader.data, absolute, chunk_end)?
            } else {
                read_utf16_string(reader.data, absolute, chunk_end)?
            };
            strings.push(text);
        }

        Ok(StringPool { strings })
    }

    pub(crate) fn get(&self, idx: u32) -> Option<&str> {
        if idx == NO_ENTRY_INDEX {
            return None;
        }
        self.strings.get(idx as usize).map(|s| s.as_str())
    }

    /// Like [`get`](Self::get) but an out-of-range index is a format error
    /// rather than an absent value.
    pub(crate) fn require(&self, idx: u32) -> ApkResult<&str> {
        self.get(idx).ok_or_else(|| {
            ApkError::Format(format!("string pool index {idx} out of range"))
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.strings.len()
    }
}

fn read_utf8_string(data: &[u8], offset: usize, limit: usize) -> ApkResult<String> {
    let mut cursor = offset;
    if cursor >= limit {
        return Err(ApkError::Format(
            "string offset exceeds chunk bounds".to_string(),
        ));
    }
    // UTF-8 strings carry two length prefixes: character count then byte count.
    let (_char_len, len_bytes) = read_utf8_length(data, cursor, limit)?;
    cursor += len_bytes;
    let (byte_len, byte_len_size) = read_utf8_length(data, cursor, limit)?;
    cursor += byte_len_size;
    if cursor + byte_len > limit {
        return Err(ApkError::Format("UTF-8 string exceeds chunk bounds".to_string()));
    }
    let slice = &data[cursor..cursor + byte_len];
    let text = std::str::from_utf8(slice).map_err(|err| ApkError::Format(err.to_string()))?;
    cursor += byte_len;
    if cursor >= limit {
        return Err(ApkError::Format("missing UTF-8 terminator".to_string()));
    }
    Ok(text.to_string())
}

fn read_utf16_string(data: &[u8], offset: usize, limit: usize) -> ApkResult<String> {
    let mut cursor = offset;
    let (char_count, header_bytes) = read_utf16_length(data, cursor, limit)?;
    cursor += header_bytes;
    let byte_len = char_count * 2;
    if cursor + byte_len > limit {
        return Err(ApkError::Format("UTF-16 string exceeds chunk bounds".to_string()));
    }
    let mut units = Vec::with_capacity(char_count);
    for chunk in data[cursor..cursor + byte_len].chunks_exact(2) {
        units.push(u16::from_le_bytes([chunk[0], chunk[1]]));
    }
    cursor += byte_len;
    if cursor + 2 > limit {
        return Err(ApkError::Format("missing UTF-16 terminator".to_string()));
    }
    let terminator = u16::from_le_bytes([data[cursor], data[cursor + 1]]);
    if terminator != 0 {
        return Err(ApkError::Format("UTF-16 string missing terminator".to_string()));
    }
    String::from_utf16(&units).map_err(|err| ApkError::Format(err.to_string()))
}

fn read_utf8_length(data: &[u8], offset: usize, limit: usize) -> ApkResult<(usize, usize)> {
    if offset >= limit {
        return Err(ApkError::Format("invalid UTF-8 length offset".to_string()));
    }
    let first = data[offset];
    if (first & 0x80) == 0 {
        Ok((first as usize, 1))
    } else {
        if offset + 1 >= limit {
            return Err(ApkError::Format("truncated UTF-8 length".to_string()));
        }
        let second = data[offset + 1];
        let length = (((first & 0x7F) as usize) << 8) | second as usize;
        Ok((length, 2))
    }
}

fn read_utf16_length(data: &[u8], offset: usize, limit: usize) -> ApkResult<(usize, usize)> {
    if offset + 2 > limit {
        return Err(ApkError::Format("invalid UTF-16 length offset".to_string()));
    }
    let first = u16::from_le_bytes([data[offset], data[offset + 1]]);
    if (first & 0x8000) == 0 {
        Ok((first as usize, 2))
    } else {
        if offset + 4 > limit {
            return Err(ApkError::Format("truncated UTF-16 length".to_string()));
        }
        let second = u16::from_le_bytes([data[offset + 2], data[offset + 3]]);
        let length = (((first & 0x7FFF) as usize) << 16) | second as usize;
        Ok((length, 4))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ApkError;

    fn pool_chunk(strings: &[&str]) -> Vec<u8> {
        crate::tests::fixtures::string_pool_chunk(strings)
    }

    #[test]
    fn rejects_header_larger_than_chunk() {
        // type=0x0001, header_size=16 but total size 8
        let data = [0x01, 0x00, 0x10, 0x00, 0x08, 0x00, 0x00, 0x00];
        let mut reader = BinaryReader::new(&data);
        match reader.read_chunk_header() {
            Err(ApkError::Format(_)) => {}
            other => panic!("expected format error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_chunk_past_end_of_stream() {
        // declared total size 64 with only 8 bytes present
        let data = [0x01, 0x00, 0x08, 0x00, 0x40, 0x00, 0x00, 0x00];
        let mut reader = BinaryReader::new(&data);
        match reader.read_chunk_header() {
            Err(ApkError::Truncated(_)) => {}
            other => panic!("expected truncated error, got {other:?}"),
        }
    }

    #[test]
    fn decodes_utf16_pool_strings() {
        let chunk = pool_chunk(&["manifest", "package", "été"]);
        let mut reader = BinaryReader::new(&chunk);
        let header = reader.read_chunk_header().unwrap();
        let pool = StringPool::parse(&mut reader, &header).unwrap();
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.get(0), Some("manifest"));
        assert_eq!(pool.get(2), Some("été"));
        assert_eq!(pool.get(NO_ENTRY_INDEX), None);
        assert!(pool.require(3).is_err());
    }
}
