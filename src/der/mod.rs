// amppki: certificate request intake and release
// Copyright 2026 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Tiny DER reader.
//!
//! https://www.itu.int/rec/T-REC-X.690
//!
//! This is a structural reader over tag-length-value encodings, not an ASN.1
//! library. It never copies: every element is a window into the input buffer
//! identified by its offset, and descending into a constructed element yields
//! a new reader over that element's content. Only low tag numbers and definite
//! lengths (up to 4 length bytes, minimally encoded) are accepted, and every
//! length is checked against the bytes actually remaining.

/// Maximum nesting depth a reader will descend into.
pub const MAX_DEPTH: usize = 16;

/// Error is the failures that can occur while reading DER data.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("unexpected end of data")]
    UnexpectedEof,
    #[error("unsupported tag: {0:#04x}")]
    UnsupportedTag(u8),
    #[error("indefinite length encoding")]
    IndefiniteLength,
    #[error("non-canonical length encoding")]
    NonCanonicalLength,
    #[error("length does not fit in {0} bytes")]
    LengthOverflow(usize),
    #[error("unexpected tag: {got:?}, want {want:?}")]
    UnexpectedTag { want: Tag, got: Tag },
    #[error("element is not constructed: {0:?}")]
    NotConstructed(Tag),
    #[error("unexpected trailing bytes")]
    TrailingBytes,
    #[error("nesting depth exceeds maximum of {0}")]
    MaxDepthExceeded(usize),
}

/// Result type used by the DER reader.
pub type Result<T> = std::result::Result<T, Error>;

/// Tag is the closed set of identifiers the reader distinguishes. Anything
/// else in the universal or application classes is carried as `Other`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tag {
    Integer,
    BitString,
    OctetString,
    Null,
    ObjectIdentifier,
    Sequence,
    Set,
    ContextSpecific { number: u8, constructed: bool },
    Other(u8),
}

impl Tag {
    /// from_byte classifies an identifier octet.
    pub fn from_byte(byte: u8) -> Result<Tag> {
        // High tag numbers spill into subsequent octets, nothing we read uses them
        if byte & 0x1f == 0x1f {
            return Err(Error::UnsupportedTag(byte));
        }
        Ok(match byte {
            0x02 => Tag::Integer,
            0x03 => Tag::BitString,
            0x04 => Tag::OctetString,
            0x05 => Tag::Null,
            0x06 => Tag::ObjectIdentifier,
            0x30 => Tag::Sequence,
            0x31 => Tag::Set,
            b if b & 0xc0 == 0x80 => Tag::ContextSpecific {
                number: b & 0x1f,
                constructed: b & 0x20 != 0,
            },
            b => Tag::Other(b),
        })
    }

    /// is_constructed reports whether elements with this tag carry nested
    /// elements rather than a primitive value.
    pub fn is_constructed(&self) -> bool {
        match self {
            Tag::Sequence | Tag::Set => true,
            Tag::ContextSpecific { constructed, .. } => *constructed,
            Tag::Other(b) => b & 0x20 != 0,
            _ => false,
        }
    }
}

/// Element is a single decoded TLV, borrowed from the input buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Element<'a> {
    tag: Tag,
    offset: usize,
    raw: &'a [u8],
    header_len: usize,
    depth: usize,
}

impl<'a> Element<'a> {
    /// tag returns the element's identifier.
    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// offset returns the position of the element's first byte within the
    /// outermost buffer.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// raw returns the complete encoding of the element, header included.
    pub fn raw(&self) -> &'a [u8] {
        self.raw
    }

    /// content returns the element's value bytes, header excluded.
    pub fn content(&self) -> &'a [u8] {
        &self.raw[self.header_len..]
    }

    /// expect checks the element's tag.
    pub fn expect(self, tag: Tag) -> Result<Self> {
        if self.tag != tag {
            return Err(Error::UnexpectedTag {
                want: tag,
                got: self.tag,
            });
        }
        Ok(self)
    }

    /// children creates a reader over the nested elements of a constructed
    /// element.
    pub fn children(&self) -> Result<Reader<'a>> {
        if !self.tag.is_constructed() {
            return Err(Error::NotConstructed(self.tag));
        }
        if self.depth >= MAX_DEPTH {
            return Err(Error::MaxDepthExceeded(MAX_DEPTH));
        }
        Ok(Reader {
            data: self.content(),
            pos: 0,
            base: self.offset + self.header_len,
            depth: self.depth + 1,
        })
    }
}

/// Reader walks a sequence of sibling elements.
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    base: usize,
    depth: usize,
}

impl<'a> Reader<'a> {
    // new creates a reader around a data blob.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            base: 0,
            depth: 0,
        }
    }

    // is_empty reports whether all sibling elements have been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    // finish terminates reading and returns an error if trailing bytes remain.
    pub fn finish(self) -> Result<()> {
        if !self.is_empty() {
            return Err(Error::TrailingBytes);
        }
        Ok(())
    }

    // read decodes the next sibling element.
    pub fn read(&mut self) -> Result<Element<'a>> {
        let start = self.pos;

        let tag = Tag::from_byte(self.read_bytes(1)?[0])?;
        let len = self.read_length()?;
        let header_len = self.pos - start;
        self.read_bytes(len)?;

        Ok(Element {
            tag,
            offset: self.base + start,
            raw: &self.data[start..self.pos],
            header_len,
            depth: self.depth,
        })
    }

    // read_expect decodes the next sibling element and checks its tag.
    pub fn read_expect(&mut self, tag: Tag) -> Result<Element<'a>> {
        self.read()?.expect(tag)
    }

    // peek_tag returns the tag of the next element without consuming it.
    pub fn peek_tag(&self) -> Result<Tag> {
        match self.data.get(self.pos) {
            Some(&byte) => Tag::from_byte(byte),
            None => Err(Error::UnexpectedEof),
        }
    }

    // skip consumes the given number of sibling elements.
    pub fn skip(&mut self, count: usize) -> Result<()> {
        for _ in 0..count {
            self.read()?;
        }
        Ok(())
    }

    // read_length decodes a definite, minimally encoded length.
    fn read_length(&mut self) -> Result<usize> {
        let first = self.read_bytes(1)?[0];
        if first < 0x80 {
            return Ok(first as usize);
        }
        if first == 0x80 {
            return Err(Error::IndefiniteLength);
        }
        // Long form: the low bits count the big-endian length octets
        let count = (first & 0x7f) as usize;
        if count > 4 {
            return Err(Error::LengthOverflow(4));
        }
        let bytes = self.read_bytes(count)?;
        if bytes[0] == 0 {
            return Err(Error::NonCanonicalLength);
        }
        let len = bytes.iter().fold(0usize, |acc, &b| (acc << 8) | b as usize);
        if len < 0x80 {
            return Err(Error::NonCanonicalLength);
        }
        Ok(len)
    }

    // read_bytes retrieves a slice of the buffer, moving the cursor forward.
    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        // Ensure there's still enough data left in the buffer
        let end = self.pos.checked_add(len).ok_or(Error::UnexpectedEof)?;
        if end > self.data.len() {
            return Err(Error::UnexpectedEof);
        }
        let bytes = &self.data[self.pos..end];
        self.pos = end;

        Ok(bytes)
    }
}

/// parse decodes a buffer holding exactly one element.
pub fn parse(data: &[u8]) -> Result<Element<'_>> {
    let mut reader = Reader::new(data);
    let element = reader.read()?;
    reader.finish()?;
    Ok(element)
}
