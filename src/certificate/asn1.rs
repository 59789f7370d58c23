// src/certificate/asn1.rs
//! Minimal DER reader that keeps absolute byte offsets.
//!
//! Circuits prove facts about byte ranges inside signed data, so every value
//! read here remembers where its header and content start in the original
//! buffer. Every length prefix is treated as untrusted: a length that points
//! past the enclosing element is an error, never a panic.

use std::fmt;

pub const TAG_BOOLEAN: u32 = 0x01;
pub const TAG_INTEGER: u32 = 0x02;
pub const TAG_BIT_STRING: u32 = 0x03;
pub const TAG_OCTET_STRING: u32 = 0x04;
pub const TAG_NULL: u32 = 0x05;
pub const TAG_OID: u32 = 0x06;
pub const TAG_UTF8_STRING: u32 = 0x0C;
pub const TAG_PRINTABLE_STRING: u32 = 0x13;
pub const TAG_T61_STRING: u32 = 0x14;
pub const TAG_IA5_STRING: u32 = 0x16;
pub const TAG_UTC_TIME: u32 = 0x17;
pub const TAG_GENERALIZED_TIME: u32 = 0x18;
pub const TAG_BMP_STRING: u32 = 0x1E;
pub const TAG_SEQUENCE: u32 = 0x30;
pub const TAG_SET: u32 = 0x31;

/// Tag of a context-specific constructed element, `[n]`.
pub const fn context(n: u32) -> u32 {
    0xA0 | n
}

/// Where and why decoding stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerError {
    pub offset: usize,
    pub reason: String,
}

impl DerError {
    pub fn new(offset: usize, reason: impl Into<String>) -> Self {
        DerError {
            offset,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for DerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at offset {}", self.reason, self.offset)
    }
}

/// One decoded tag-length-value element.
#[derive(Debug, Clone, Copy)]
pub struct Tlv<'a> {
    buf: &'a [u8],
    pub tag: u32,
    /// Offset of the first tag byte.
    pub start: usize,
    /// Offset of the first content byte.
    pub content_start: usize,
    /// Offset one past the last content byte.
    pub end: usize,
}

impl<'a> Tlv<'a> {
    pub fn content(&self) -> &'a [u8] {
        &self.buf[self.content_start..self.end]
    }

    /// Header and content exactly as encoded.
    pub fn raw(&self) -> &'a [u8] {
        &self.buf[self.start..self.end]
    }

    pub fn len(&self) -> usize {
        self.end - self.content_start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.content_start
    }

    /// Reader over the children of a constructed element.
    pub fn children(&self) -> DerReader<'a> {
        DerReader {
            buf: self.buf,
            pos: self.content_start,
            end: self.end,
        }
    }

    /// Reader over a BIT STRING payload that itself holds DER, skipping the
    /// unused-bits byte.
    pub fn bit_string_children(&self) -> Result<DerReader<'a>, DerError> {
        let (pos, _) = self.bit_string_payload()?;
        Ok(DerReader {
            buf: self.buf,
            pos,
            end: self.end,
        })
    }

    /// Offset and bytes of a BIT STRING payload. Only whole-byte strings are
    /// accepted, which is all that keys and signatures use.
    pub fn bit_string_payload(&self) -> Result<(usize, &'a [u8]), DerError> {
        self.expect_tag(TAG_BIT_STRING)?;
        match self.content().first() {
            Some(0) => Ok((self.content_start + 1, &self.buf[self.content_start + 1..self.end])),
            Some(n) => Err(DerError::new(
                self.content_start,
                format!("bit string with {} unused bits", n),
            )),
            None => Err(DerError::new(self.content_start, "empty bit string")),
        }
    }

    pub fn expect_tag(&self, tag: u32) -> Result<(), DerError> {
        if self.tag == tag {
            Ok(())
        } else {
            Err(DerError::new(
                self.start,
                format!("expected tag 0x{:02x}, found 0x{:02x}", tag, self.tag),
            ))
        }
    }

    /// Decodes a string type that is valid ASCII/UTF-8.
    pub fn as_string(&self) -> Result<String, DerError> {
        match self.tag {
            TAG_UTF8_STRING | TAG_PRINTABLE_STRING | TAG_T61_STRING | TAG_IA5_STRING
            | TAG_UTC_TIME | TAG_GENERALIZED_TIME => String::from_utf8(self.content().to_vec())
                .map_err(|_| DerError::new(self.content_start, "string is not valid UTF-8")),
            TAG_BMP_STRING => {
                let units: Vec<u16> = self
                    .content()
                    .chunks(2)
                    .map(|c| u16::from_be_bytes([c[0], *c.get(1).unwrap_or(&0)]))
                    .collect();
                String::from_utf16(&units)
                    .map_err(|_| DerError::new(self.content_start, "invalid BMP string"))
            }
            other => Err(DerError::new(
                self.start,
                format!("tag 0x{:02x} is not a string type", other),
            )),
        }
    }

    /// Small non-negative INTEGER (versions, data group numbers).
    pub fn as_small_uint(&self) -> Result<u64, DerError> {
        self.expect_tag(TAG_INTEGER)?;
        let content = self.content();
        if content.is_empty() || content.len() > 8 || content[0] & 0x80 != 0 {
            return Err(DerError::new(self.content_start, "integer out of range"));
        }
        Ok(content.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
    }
}

/// Sequential reader over a window of a DER buffer.
#[derive(Debug, Clone)]
pub struct DerReader<'a> {
    buf: &'a [u8],
    pos: usize,
    end: usize,
}

impl<'a> DerReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        DerReader {
            buf,
            pos: 0,
            end: buf.len(),
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.end
    }

    /// Tag of the next element without consuming it.
    pub fn peek_tag(&self) -> Option<u32> {
        self.read_tag(self.pos).ok().map(|(tag, _)| tag)
    }

    pub fn read(&mut self) -> Result<Tlv<'a>, DerError> {
        let start = self.pos;
        if start >= self.end {
            return Err(DerError::new(start, "unexpected end of data"));
        }
        let (tag, after_tag) = self.read_tag(start)?;
        let (len, content_start) = self.read_length(after_tag)?;
        let end = content_start
            .checked_add(len)
            .filter(|end| *end <= self.end)
            .ok_or_else(|| {
                DerError::new(
                    start,
                    format!("length {} overruns the enclosing element", len),
                )
            })?;
        self.pos = end;
        Ok(Tlv {
            buf: self.buf,
            tag,
            start,
            content_start,
            end,
        })
    }

    pub fn expect(&mut self, tag: u32) -> Result<Tlv<'a>, DerError> {
        let tlv = self.read()?;
        tlv.expect_tag(tag)?;
        Ok(tlv)
    }

    /// Consumes the next element only if it carries `tag`.
    pub fn read_optional(&mut self, tag: u32) -> Result<Option<Tlv<'a>>, DerError> {
        if self.peek_tag() == Some(tag) {
            self.read().map(Some)
        } else {
            Ok(None)
        }
    }

    fn byte_at(&self, offset: usize) -> Result<u8, DerError> {
        if offset >= self.end {
            return Err(DerError::new(offset, "unexpected end of data"));
        }
        Ok(self.buf[offset])
    }

    fn read_tag(&self, offset: usize) -> Result<(u32, usize), DerError> {
        let first = self.byte_at(offset)?;
        let mut tag = u32::from(first);
        let mut next = offset + 1;
        if first & 0x1F == 0x1F {
            // high-tag-number form, used by ICAO data group templates (5F1F, 7F61)
            loop {
                let b = self.byte_at(next)?;
                tag = (tag << 8) | u32::from(b);
                next += 1;
                if b & 0x80 == 0 {
                    break;
                }
                if next - offset > 3 {
                    return Err(DerError::new(offset, "tag number too large"));
                }
            }
        }
        Ok((tag, next))
    }

    fn read_length(&self, offset: usize) -> Result<(usize, usize), DerError> {
        let first = self.byte_at(offset)?;
        if first < 0x80 {
            return Ok((usize::from(first), offset + 1));
        }
        let count = usize::from(first & 0x7F);
        if count == 0 {
            return Err(DerError::new(offset, "indefinite length is not DER"));
        }
        if count > 4 {
            return Err(DerError::new(offset, "length field too large"));
        }
        let mut len = 0usize;
        for i in 0..count {
            len = (len << 8) | usize::from(self.byte_at(offset + 1 + i)?);
        }
        Ok((len, offset + 1 + count))
    }
}

/// Strips the sign byte an ASN.1 INTEGER carries when its high bit is set.
pub fn strip_integer_padding(content: &[u8]) -> &[u8] {
    match content {
        [0, rest @ ..] if !rest.is_empty() => rest,
        _ => content,
    }
}
