//! Generic ISO-BMFF box walking, generalizing the teacher's
//! `walk_boxes`/`walk_boxes_mut` pattern into a byte-level reader/writer
//! pair usable without an ffmpeg-backed container (spec.md §4.B).

use std::io::{Cursor, Read, Seek, SeekFrom};

use crate::error::{MuxError, Result};

/// One box header as found while walking a byte range: four-letter
/// type, and the absolute offsets of its header-end (payload start)
/// and end within the buffer it was read from.
#[derive(Debug, Clone, Copy)]
pub struct BoxHeader {
    pub box_type: [u8; 4],
    pub payload_start: u64,
    pub payload_end: u64,
}

impl BoxHeader {
    pub fn type_str(&self) -> &str {
        std::str::from_utf8(&self.box_type).unwrap_or("????")
    }

    pub fn is(&self, fourcc: &[u8; 4]) -> bool {
        &self.box_type == fourcc
    }
}

/// Reads box headers sequentially out of an in-memory buffer, handling
/// the 32-bit and 64-bit (`size == 1`) size forms.
pub struct BoxReader<'a> {
    data: &'a [u8],
    pos: u64,
    end: u64,
}

impl<'a> BoxReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            end: data.len() as u64,
        }
    }

    pub fn slice(data: &'a [u8], start: u64, end: u64) -> Self {
        Self { data, pos: start, end }
    }

    /// Reads the next box header, advancing past its payload so the
    /// following call returns the sibling box.
    pub fn next(&mut self) -> Result<Option<BoxHeader>> {
        if self.pos + 8 > self.end {
            return Ok(None);
        }
        let base = self.pos as usize;
        let mut size = u32::from_be_bytes(self.data[base..base + 4].try_into().unwrap()) as u64;
        let box_type: [u8; 4] = self.data[base + 4..base + 8].try_into().unwrap();
        let mut header_len = 8u64;

        if size == 1 {
            if self.pos + 16 > self.end {
                return Err(MuxError::MalformedBox("truncated 64-bit size".to_string()).into());
            }
            size = u64::from_be_bytes(self.data[base + 8..base + 16].try_into().unwrap());
            header_len = 16;
        } else if size == 0 {
            size = self.end - self.pos;
        }

        if size < header_len || self.pos + size > self.end {
            return Err(MuxError::MalformedBox(format!(
                "box {:?} has invalid size {size}",
                String::from_utf8_lossy(&box_type)
            ))
            .into());
        }

        let payload_start = self.pos + header_len;
        let payload_end = self.pos + size;
        self.pos = payload_end;

        Ok(Some(BoxHeader {
            box_type,
            payload_start,
            payload_end,
        }))
    }

    pub fn payload(&self, header: &BoxHeader) -> &'a [u8] {
        &self.data[header.payload_start as usize..header.payload_end as usize]
    }

    /// Returns a reader scoped to `header`'s payload, for descending
    /// into a container box (`moov`, `trak`, `mdia`, `moof`, `traf`, ...).
    pub fn into_child(&self, header: &BoxHeader) -> BoxReader<'a> {
        BoxReader::slice(self.data, header.payload_start, header.payload_end)
    }
}

/// Finds the first direct child box of `buf` matching `fourcc`.
pub fn find_box<'a>(buf: &'a [u8], fourcc: &[u8; 4]) -> Result<Option<(&'a [u8], BoxHeader)>> {
    let mut reader = BoxReader::new(buf);
    while let Some(header) = reader.next()? {
        if header.is(fourcc) {
            return Ok(Some((reader.payload(&header), header)));
        }
    }
    Ok(None)
}

/// Collects all direct children of `buf` matching `fourcc`, in order.
pub fn find_all_boxes<'a>(buf: &'a [u8], fourcc: &[u8; 4]) -> Result<Vec<(&'a [u8], BoxHeader)>> {
    let mut out = Vec::new();
    let mut reader = BoxReader::new(buf);
    while let Some(header) = reader.next()? {
        if header.is(fourcc) {
            out.push((reader.payload(&header), header));
        }
    }
    Ok(out)
}

/// Accumulates box payloads and wraps them with a 32-bit size/type
/// header on write, mirroring how the teacher's muxer assembles output
/// buffers by hand rather than through a container library.
pub struct BoxWriter {
    buf: Vec<u8>,
}

impl BoxWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn i32(&mut self, v: i32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    /// Writes `fourcc` as a 4-byte tag (box type or sub-identifier).
    pub fn fourcc(&mut self, fourcc: &[u8; 4]) -> &mut Self {
        self.buf.extend_from_slice(fourcc);
        self
    }

    /// Wraps the bytes written by `body` in a box of type `fourcc` with
    /// a correct 32-bit size prefix.
    pub fn wrap_box(fourcc: &[u8; 4], body: Vec<u8>) -> Vec<u8> {
        let mut out = Vec::with_capacity(body.len() + 8);
        out.extend_from_slice(&((body.len() + 8) as u32).to_be_bytes());
        out.extend_from_slice(fourcc);
        out.extend_from_slice(&body);
        out
    }

    /// Wraps `children`, already-encoded sibling boxes, inside a
    /// container box of type `fourcc`.
    pub fn wrap_container(fourcc: &[u8; 4], children: &[Vec<u8>]) -> Vec<u8> {
        let body: Vec<u8> = children.iter().flat_map(|c| c.iter().copied()).collect();
        Self::wrap_box(fourcc, body)
    }
}

impl Default for BoxWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads a big-endian integer field out of a cursor, translating I/O
/// errors into [`MuxError::MalformedBox`].
pub fn read_u32(cursor: &mut Cursor<&[u8]>) -> Result<u32> {
    let mut bytes = [0u8; 4];
    cursor
        .read_exact(&mut bytes)
        .map_err(|e| MuxError::MalformedBox(e.to_string()))?;
    Ok(u32::from_be_bytes(bytes))
}

pub fn read_u64(cursor: &mut Cursor<&[u8]>) -> Result<u64> {
    let mut bytes = [0u8; 8];
    cursor
        .read_exact(&mut bytes)
        .map_err(|e| MuxError::MalformedBox(e.to_string()))?;
    Ok(u64::from_be_bytes(bytes))
}

pub fn read_u16(cursor: &mut Cursor<&[u8]>) -> Result<u16> {
    let mut bytes = [0u8; 2];
    cursor
        .read_exact(&mut bytes)
        .map_err(|e| MuxError::MalformedBox(e.to_string()))?;
    Ok(u16::from_be_bytes(bytes))
}

pub fn read_u8(cursor: &mut Cursor<&[u8]>) -> Result<u8> {
    let mut bytes = [0u8; 1];
    cursor
        .read_exact(&mut bytes)
        .map_err(|e| MuxError::MalformedBox(e.to_string()))?;
    Ok(bytes[0])
}

pub fn skip(cursor: &mut Cursor<&[u8]>, n: i64) -> Result<()> {
    cursor
        .seek(SeekFrom::Current(n))
        .map_err(|e| MuxError::MalformedBox(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_sibling_boxes() {
        let mut buf = Vec::new();
        buf.extend(BoxWriter::wrap_box(b"ftyp", vec![1, 2, 3, 4]));
        buf.extend(BoxWriter::wrap_box(b"moov", vec![9, 9]));

        let mut reader = BoxReader::new(&buf);
        let h1 = reader.next().unwrap().unwrap();
        assert_eq!(h1.type_str(), "ftyp");
        let h2 = reader.next().unwrap().unwrap();
        assert_eq!(h2.type_str(), "moov");
        assert!(reader.next().unwrap().is_none());
    }

    #[test]
    fn rejects_truncated_box() {
        let buf = vec![0, 0, 0, 200, b'f', b't', b'y', b'p'];
        let mut reader = BoxReader::new(&buf);
        assert!(reader.next().is_err());
    }

    #[test]
    fn find_box_descends_into_children() {
        let inner = BoxWriter::wrap_box(b"mvhd", vec![1]);
        let moov_buf = BoxWriter::wrap_box(b"moov", inner);
        let (moov_payload, _) = find_box(&moov_buf, b"moov").unwrap().unwrap();
        let (payload, header) = find_box(moov_payload, b"mvhd").unwrap().unwrap();
        assert_eq!(payload, &[1][..]);
        assert_eq!(header.type_str(), "mvhd");
    }
}
