//! Minimal tag-length-value codec for small persisted records.
//!
//! Wire layout of one element:
//!
//! ```text
//! control (1 byte) = tag control (upper 3 bits) | element type (lower 5 bits)
//! tag              = 0..8 bytes, shape chosen by tag control
//! length           = 0..8 bytes, strings only
//! value            = little-endian payload
//! ```
//!
//! The writer only emits anonymous and context tags. The reader understands
//! every tag form so that it can step over fields written by newer schemas.

/// Element type codes (lower 5 bits of the control byte).
mod element {
    pub const INT_1: u8 = 0x00;
    pub const INT_8: u8 = 0x03;
    pub const UINT_1: u8 = 0x04;
    pub const UINT_8: u8 = 0x07;
    pub const BOOL_FALSE: u8 = 0x08;
    pub const BOOL_TRUE: u8 = 0x09;
    pub const FLOAT_4: u8 = 0x0A;
    pub const FLOAT_8: u8 = 0x0B;
    pub const UTF8_1: u8 = 0x0C;
    pub const UTF8_8: u8 = 0x0F;
    pub const BYTES_1: u8 = 0x10;
    pub const BYTES_8: u8 = 0x13;
    pub const NULL: u8 = 0x14;
    pub const STRUCTURE: u8 = 0x15;
    pub const ARRAY: u8 = 0x16;
    pub const LIST: u8 = 0x17;
    pub const END_OF_CONTAINER: u8 = 0x18;
}

const TAG_CONTROL_ANONYMOUS: u8 = 0x00;
const TAG_CONTROL_CONTEXT: u8 = 0x20;

/// Per-field worst case: control byte, context tag, 2-byte length.
const FIELD_OVERHEAD: usize = 4;
/// Container control byte plus end-of-container byte.
const CONTAINER_OVERHEAD: usize = 2;

/// Upper bound on the encoded size of a structure whose fields have the
/// given payload sizes.
#[must_use]
pub const fn estimate_struct_overhead(field_sizes: &[usize]) -> usize {
    let mut total = CONTAINER_OVERHEAD;
    let mut i = 0;
    while i < field_sizes.len() {
        total += field_sizes[i] + FIELD_OVERHEAD;
        i += 1;
    }
    total
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TlvError {
    #[error("buffer too small: need {needed} bytes, capacity {capacity}")]
    BufferTooSmall { needed: usize, capacity: usize },
    #[error("record truncated")]
    UnexpectedEnd,
    #[error("unknown element type 0x{0:02x}")]
    InvalidElementType(u8),
    #[error("end-of-container marker carries a tag")]
    InvalidEndOfContainer,
    #[error("expected tag {expected:?}, found {found:?}")]
    UnexpectedTag { expected: Tag, found: Tag },
    #[error("expected {expected:?} element, found {found:?}")]
    WrongType {
        expected: ElementType,
        found: ElementType,
    },
    #[error("integer value does not fit the requested width")]
    IntegerOverflow,
    #[error("container nesting is unbalanced")]
    UnbalancedContainer,
    #[error("not positioned on a container")]
    NotAContainer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Anonymous,
    Context(u8),
    CommonProfile(u32),
    ImplicitProfile(u32),
    FullyQualified { vendor: u16, profile: u16, tag: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    SignedInt,
    UnsignedInt,
    Bool,
    Float,
    Utf8String,
    ByteString,
    Null,
    Structure,
    Array,
    List,
}

impl ElementType {
    #[must_use]
    pub const fn is_container(self) -> bool {
        matches!(self, Self::Structure | Self::Array | Self::List)
    }

    const fn container_code(self) -> Option<u8> {
        match self {
            Self::Structure => Some(element::STRUCTURE),
            Self::Array => Some(element::ARRAY),
            Self::List => Some(element::LIST),
            _ => None,
        }
    }
}

/// One decoded element. Only unsigned integers keep their value; other
/// payloads are consumed and dropped. Step into containers with
/// [`TlvReader::enter_container`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Element {
    tag: Tag,
    element_type: ElementType,
    value: Option<u64>,
}

impl Element {
    #[must_use]
    pub fn tag(&self) -> Tag {
        self.tag
    }

    #[must_use]
    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn expect_tag(&self, expected: Tag) -> Result<&Self, TlvError> {
        if self.tag == expected {
            Ok(self)
        } else {
            Err(TlvError::UnexpectedTag {
                expected,
                found: self.tag,
            })
        }
    }

    pub fn expect_type(&self, expected: ElementType) -> Result<&Self, TlvError> {
        if self.element_type == expected {
            Ok(self)
        } else {
            Err(self.wrong_type(expected))
        }
    }

    pub fn get_u64(&self) -> Result<u64, TlvError> {
        self.value
            .ok_or_else(|| self.wrong_type(ElementType::UnsignedInt))
    }

    pub fn get_u8(&self) -> Result<u8, TlvError> {
        u8::try_from(self.get_u64()?).map_err(|_| TlvError::IntegerOverflow)
    }

    fn wrong_type(&self, expected: ElementType) -> TlvError {
        TlvError::WrongType {
            expected,
            found: self.element_type,
        }
    }
}

/// Writes elements into a caller-provided fixed buffer.
#[derive(Debug)]
pub struct TlvWriter<'buf> {
    buf: &'buf mut [u8],
    len: usize,
    depth: usize,
}

impl<'buf> TlvWriter<'buf> {
    pub fn new(buf: &'buf mut [u8]) -> Self {
        Self { buf, len: 0, depth: 0 }
    }

    /// The encoded bytes. Fails if a container is still open.
    pub fn finish(self) -> Result<&'buf [u8], TlvError> {
        if self.depth != 0 {
            return Err(TlvError::UnbalancedContainer);
        }
        Ok(&self.buf[..self.len])
    }

    pub fn start_container(&mut self, tag: Tag, container: ElementType) -> Result<(), TlvError> {
        let code = container.container_code().ok_or(TlvError::NotAContainer)?;
        self.put_header(tag, code)?;
        self.depth += 1;
        Ok(())
    }

    pub fn end_container(&mut self) -> Result<(), TlvError> {
        if self.depth == 0 {
            return Err(TlvError::UnbalancedContainer);
        }
        self.put_raw(&[element::END_OF_CONTAINER])?;
        self.depth -= 1;
        Ok(())
    }

    /// Unsigned integer in the smallest width that holds `value`.
    pub fn put_u64(&mut self, tag: Tag, value: u64) -> Result<(), TlvError> {
        let (width_code, width) = if value <= u64::from(u8::MAX) {
            (0, 1)
        } else if value <= u64::from(u16::MAX) {
            (1, 2)
        } else if value <= u64::from(u32::MAX) {
            (2, 4)
        } else {
            (3, 8)
        };
        self.put_header(tag, element::UINT_1 + width_code)?;
        self.put_raw(&value.to_le_bytes()[..width])
    }

    pub fn put_u8(&mut self, tag: Tag, value: u8) -> Result<(), TlvError> {
        self.put_u64(tag, u64::from(value))
    }

    fn put_header(&mut self, tag: Tag, element_code: u8) -> Result<(), TlvError> {
        match tag {
            Tag::Anonymous => self.put_raw(&[TAG_CONTROL_ANONYMOUS | element_code]),
            Tag::Context(number) => self.put_raw(&[TAG_CONTROL_CONTEXT | element_code, number]),
            // Profile tags are read-only here; nothing we persist uses them.
            Tag::CommonProfile(_) | Tag::ImplicitProfile(_) | Tag::FullyQualified { .. } => {
                Err(TlvError::UnexpectedTag {
                    expected: Tag::Anonymous,
                    found: tag,
                })
            }
        }
    }

    fn put_raw(&mut self, bytes: &[u8]) -> Result<(), TlvError> {
        let needed = self.len + bytes.len();
        if needed > self.buf.len() {
            return Err(TlvError::BufferTooSmall {
                needed,
                capacity: self.buf.len(),
            });
        }
        self.buf[self.len..needed].copy_from_slice(bytes);
        self.len = needed;
        Ok(())
    }
}

/// Forward-only reader over an encoded record.
#[derive(Debug)]
pub struct TlvReader<'a> {
    data: &'a [u8],
    pos: usize,
    depth: usize,
    /// The last element returned was a container that was not entered.
    unentered_container: bool,
}

enum Decoded {
    Element(Element),
    EndOfContainer,
}

impl<'a> TlvReader<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            depth: 0,
            unentered_container: false,
        }
    }

    /// Advance to the next element at the current nesting level.
    ///
    /// Returns `Ok(None)` at the end of the data (top level) or at the end of
    /// the current container. A container that was returned but not entered
    /// is skipped whole.
    pub fn next(&mut self) -> Result<Option<Element>, TlvError> {
        if self.unentered_container {
            self.unentered_container = false;
            self.skip_to_container_end()?;
        }
        if self.pos == self.data.len() {
            return if self.depth == 0 {
                Ok(None)
            } else {
                Err(TlvError::UnexpectedEnd)
            };
        }

        let start = self.pos;
        match self.decode()? {
            Decoded::Element(element) => {
                self.unentered_container = element.element_type.is_container();
                Ok(Some(element))
            }
            Decoded::EndOfContainer => {
                if self.depth == 0 {
                    return Err(TlvError::UnbalancedContainer);
                }
                // Stay on the end marker: the container is exhausted.
                self.pos = start;
                Ok(None)
            }
        }
    }

    /// Step into the container element most recently returned by `next`.
    pub fn enter_container(&mut self) -> Result<(), TlvError> {
        if !self.unentered_container {
            return Err(TlvError::NotAContainer);
        }
        self.unentered_container = false;
        self.depth += 1;
        Ok(())
    }

    fn skip_to_container_end(&mut self) -> Result<(), TlvError> {
        let mut nested = 0usize;
        loop {
            if self.pos == self.data.len() {
                return Err(TlvError::UnexpectedEnd);
            }
            match self.decode()? {
                Decoded::Element(element) if element.element_type.is_container() => nested += 1,
                Decoded::Element(_) => {}
                Decoded::EndOfContainer if nested == 0 => return Ok(()),
                Decoded::EndOfContainer => nested -= 1,
            }
        }
    }

    fn decode(&mut self) -> Result<Decoded, TlvError> {
        let control = self.take_u8()?;
        let tag_control = control >> 5;
        let code = control & 0x1f;

        if code == element::END_OF_CONTAINER {
            if tag_control != 0 {
                return Err(TlvError::InvalidEndOfContainer);
            }
            return Ok(Decoded::EndOfContainer);
        }

        let tag = self.take_tag(tag_control)?;
        let (element_type, value) = match code {
            element::INT_1..=element::INT_8 => {
                self.take(1usize << (code - element::INT_1))?;
                (ElementType::SignedInt, None)
            }
            element::UINT_1..=element::UINT_8 => {
                let width = 1usize << (code - element::UINT_1);
                (ElementType::UnsignedInt, Some(self.take_le(width)?))
            }
            element::BOOL_FALSE | element::BOOL_TRUE => (ElementType::Bool, None),
            element::FLOAT_4 => {
                self.take(4)?;
                (ElementType::Float, None)
            }
            element::FLOAT_8 => {
                self.take(8)?;
                (ElementType::Float, None)
            }
            element::UTF8_1..=element::UTF8_8 => {
                self.skip_string(code - element::UTF8_1)?;
                (ElementType::Utf8String, None)
            }
            element::BYTES_1..=element::BYTES_8 => {
                self.skip_string(code - element::BYTES_1)?;
                (ElementType::ByteString, None)
            }
            element::NULL => (ElementType::Null, None),
            element::STRUCTURE => (ElementType::Structure, None),
            element::ARRAY => (ElementType::Array, None),
            element::LIST => (ElementType::List, None),
            other => return Err(TlvError::InvalidElementType(other)),
        };

        Ok(Decoded::Element(Element {
            tag,
            element_type,
            value,
        }))
    }

    fn take_tag(&mut self, tag_control: u8) -> Result<Tag, TlvError> {
        Ok(match tag_control {
            0 => Tag::Anonymous,
            1 => Tag::Context(self.take_u8()?),
            2 => Tag::CommonProfile(self.take_le(2)? as u32),
            3 => Tag::CommonProfile(self.take_le(4)? as u32),
            4 => Tag::ImplicitProfile(self.take_le(2)? as u32),
            5 => Tag::ImplicitProfile(self.take_le(4)? as u32),
            6 | 7 => {
                let vendor = self.take_le(2)? as u16;
                let profile = self.take_le(2)? as u16;
                let tag_width = if tag_control == 6 { 2 } else { 4 };
                let tag = self.take_le(tag_width)? as u32;
                Tag::FullyQualified {
                    vendor,
                    profile,
                    tag,
                }
            }
            _ => unreachable!("tag control is three bits"),
        })
    }

    fn skip_string(&mut self, width_code: u8) -> Result<(), TlvError> {
        let len = self.take_le(1usize << width_code)?;
        let len = usize::try_from(len).map_err(|_| TlvError::UnexpectedEnd)?;
        self.take(len)?;
        Ok(())
    }

    fn take_u8(&mut self) -> Result<u8, TlvError> {
        Ok(self.take(1)?[0])
    }

    fn take_le(&mut self, width: usize) -> Result<u64, TlvError> {
        let bytes = self.take(width)?;
        let mut raw = [0u8; 8];
        raw[..width].copy_from_slice(bytes);
        Ok(u64::from_le_bytes(raw))
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], TlvError> {
        let end = self.pos.checked_add(len).ok_or(TlvError::UnexpectedEnd)?;
        let bytes = self.data.get(self.pos..end).ok_or(TlvError::UnexpectedEnd)?;
        self.pos = end;
        Ok(bytes)
    }
}
