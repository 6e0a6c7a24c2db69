//! Byte codec for fixed-layout little-endian records
//!
//! Every packet on both protocols has the shape
//! `[header][id][length: u16 LE][payload]`. [`PacketWriter`] builds that
//! shape from heterogeneous parts and patches the length once the payload is
//! complete; [`ByteReader`] walks a received buffer field by field.
//!
//! Strings are Latin-1 and NUL terminated on the wire. Characters outside
//! Latin-1 are written as `?`.

use crate::error::ProtocolError;
use crate::{MAX_PACKET_SIZE, MIN_PACKET_SIZE};

/// A single byte-producing value appended to a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Part<'a> {
    /// Literal byte
    Byte(u8),
    /// Little-endian u16
    U16(u16),
    /// Little-endian u32
    U32(u32),
    /// Raw byte sequence, copied as is
    Bytes(&'a [u8]),
    /// NUL-terminated Latin-1 string
    CString(&'a str),
}

impl Part<'_> {
    fn write_to(&self, out: &mut Vec<u8>) {
        match *self {
            Part::Byte(b) => out.push(b),
            Part::U16(v) => out.extend_from_slice(&v.to_le_bytes()),
            Part::U32(v) => out.extend_from_slice(&v.to_le_bytes()),
            Part::Bytes(bytes) => out.extend_from_slice(bytes),
            Part::CString(s) => {
                out.extend(latin1_bytes(s));
                out.push(0);
            }
        }
    }
}

/// Encode a packet from a list of parts
///
/// Fails when the resulting packet does not fit the u16 length field.
pub fn encode(header: u8, id: u8, parts: &[Part<'_>]) -> Result<Vec<u8>, ProtocolError> {
    parts
        .iter()
        .fold(PacketWriter::new(header, id), |writer, part| writer.part(*part))
        .finish()
}

/// Builder for a single framed packet
#[derive(Debug, Clone)]
pub struct PacketWriter {
    buf: Vec<u8>,
}

impl PacketWriter {
    pub fn new(header: u8, id: u8) -> Self {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(&[header, id, 0, 0]);
        Self { buf }
    }

    pub fn part(mut self, part: Part<'_>) -> Self {
        part.write_to(&mut self.buf);
        self
    }

    pub fn u8(self, value: u8) -> Self {
        self.part(Part::Byte(value))
    }

    pub fn u16(self, value: u16) -> Self {
        self.part(Part::U16(value))
    }

    /// Big-endian u16, used for port numbers inside sockaddr blocks
    pub fn u16_be(mut self, value: u16) -> Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn u32(self, value: u32) -> Self {
        self.part(Part::U32(value))
    }

    pub fn bytes(self, bytes: &[u8]) -> Self {
        self.part(Part::Bytes(bytes))
    }

    pub fn cstring(self, s: &str) -> Self {
        self.part(Part::CString(s))
    }

    /// Patch the length field and return the encoded packet
    pub fn finish(mut self) -> Result<Vec<u8>, ProtocolError> {
        let len = self.buf.len();

        if len > MAX_PACKET_SIZE {
            return Err(ProtocolError::PacketTooLarge {
                max: MAX_PACKET_SIZE,
                actual: len,
            });
        }
        if len < MIN_PACKET_SIZE {
            return Err(ProtocolError::PacketTooSmall {
                expected: MIN_PACKET_SIZE,
                actual: len,
            });
        }

        self.buf[2..4].copy_from_slice(&(len as u16).to_le_bytes());
        Ok(self.buf)
    }
}

/// Cursor over a received buffer
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn skip(&mut self, n: usize) -> Result<(), ProtocolError> {
        self.bytes(n).map(|_| ())
    }

    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        let end = self.pos + n;
        if end > self.data.len() {
            return Err(ProtocolError::PacketTooSmall {
                expected: end,
                actual: self.data.len(),
            });
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn array<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.array::<1>()?[0])
    }

    pub fn u16(&mut self) -> Result<u16, ProtocolError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn u16_be(&mut self) -> Result<u16, ProtocolError> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    pub fn u32(&mut self) -> Result<u32, ProtocolError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn u64(&mut self) -> Result<u64, ProtocolError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    /// Read the raw bytes of a NUL-terminated field, consuming the terminator
    pub fn cstring_bytes(&mut self) -> Result<&'a [u8], ProtocolError> {
        let rest = self.remaining();
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(ProtocolError::UnterminatedString(self.pos))?;
        self.pos += nul + 1;
        Ok(&rest[..nul])
    }

    /// Read a NUL-terminated Latin-1 string, consuming the terminator
    pub fn cstring(&mut self) -> Result<String, ProtocolError> {
        self.cstring_bytes().map(latin1_string)
    }

    /// Like [`cstring`](Self::cstring) but tolerates a missing terminator at
    /// the end of the buffer, which some servers omit on trailing fields.
    pub fn cstring_lossy(&mut self) -> String {
        let rest = self.remaining();
        match rest.iter().position(|&b| b == 0) {
            Some(nul) => {
                self.pos += nul + 1;
                latin1_string(&rest[..nul])
            }
            None => {
                self.pos = self.data.len();
                latin1_string(rest)
            }
        }
    }
}

/// Latin-1 encode a string, replacing anything outside the range with `?`
pub fn latin1_bytes(s: &str) -> impl Iterator<Item = u8> + '_ {
    s.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
}

pub fn latin1_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Number of bytes `s` occupies on the wire, terminator excluded
pub fn wire_len(s: &str) -> usize {
    s.chars().count()
}

/// Truncate `s` to at most `max` wire bytes
pub fn truncate_wire(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Render a buffer as space separated hex for trace logging
pub fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_assigns_length() {
        let packet = encode(0xFF, 0x0E, &[Part::CString("hi")]).unwrap();
        assert_eq!(packet, vec![0xFF, 0x0E, 0x07, 0x00, b'h', b'i', 0]);
    }

    #[test]
    fn test_encode_flattens_mixed_parts() {
        let packet = encode(
            0xF7,
            0x01,
            &[
                Part::Byte(9),
                Part::U16(0x0102),
                Part::U32(0x03040506),
                Part::Bytes(&[0xAA, 0xBB]),
            ],
        )
        .unwrap();

        assert_eq!(
            packet,
            vec![0xF7, 0x01, 13, 0, 9, 0x02, 0x01, 0x06, 0x05, 0x04, 0x03, 0xAA, 0xBB]
        );
    }

    #[test]
    fn test_encode_rejects_oversized_packet() {
        let big = vec![1u8; MAX_PACKET_SIZE];
        let result = encode(0xFF, 0x0E, &[Part::Bytes(&big)]);
        assert!(matches!(result, Err(ProtocolError::PacketTooLarge { .. })));
    }

    #[test]
    fn test_reader_fields() {
        let data = [0x01, 0x02, 0x00, 0x03, 0x00, 0x00, 0x00, b'a', b'b', 0, 0xFF];
        let mut reader = ByteReader::new(&data);

        assert_eq!(reader.u8().unwrap(), 1);
        assert_eq!(reader.u16().unwrap(), 2);
        assert_eq!(reader.u32().unwrap(), 3);
        assert_eq!(reader.cstring().unwrap(), "ab");
        assert_eq!(reader.remaining(), &[0xFF]);
        assert!(reader.u16().is_err());
    }

    #[test]
    fn test_reader_unterminated_string() {
        let mut reader = ByteReader::new(b"abc");
        assert_eq!(reader.cstring(), Err(ProtocolError::UnterminatedString(0)));
        assert_eq!(reader.cstring_lossy(), "abc");
        assert!(reader.is_empty());
    }

    #[test]
    fn test_latin1_roundtrip() {
        let name = "Jörg";
        let bytes: Vec<u8> = latin1_bytes(name).collect();
        assert_eq!(bytes.len(), 4);
        assert_eq!(latin1_string(&bytes), name);
        assert_eq!(latin1_bytes("日").collect::<Vec<_>>(), vec![b'?']);
    }

    #[test]
    fn test_truncate_wire() {
        assert_eq!(truncate_wire("abcdef", 3), "abc");
        assert_eq!(truncate_wire("ab", 3), "ab");
        assert_eq!(truncate_wire("äöü", 2), "äö");
    }
}
