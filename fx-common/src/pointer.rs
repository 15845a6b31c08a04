//! Binary pointer model
//!
//! A binary pointer references a byte range inside one of the packed output
//! buffers instead of embedding the bytes in the descriptor tree.
//!
//! # Wire format
//! ```text
//! [20, [bufferIndex, byteOffset, byteLength]]          opaque bytes
//! [20, [bufferIndex, byteOffset, byteLength, "f32"]]   typed elements
//! ```
//!
//! The leading `20` is the fixed value-type tag for binary data. The element
//! code is one of `i8`, `u8`, `i16`, `u16`, `i32`, `u32`, `f32`; when it is
//! absent (or `null`) the range is reconstructed as a raw byte copy.

use std::fmt;

use serde::de::{self, IgnoredAny, SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Value-type tag identifying a binary pointer tuple.
pub const BINARY_TAG: u32 = 20;

/// Element type of a typed pointer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
}

impl ElementType {
    /// Size of one element in bytes
    pub const fn size(self) -> usize {
        match self {
            ElementType::I8 | ElementType::U8 => 1,
            ElementType::I16 | ElementType::U16 => 2,
            ElementType::I32 | ElementType::U32 | ElementType::F32 => 4,
        }
    }

    /// Wire code (e.g. `"f32"`)
    pub const fn code(self) -> &'static str {
        match self {
            ElementType::I8 => "i8",
            ElementType::U8 => "u8",
            ElementType::I16 => "i16",
            ElementType::U16 => "u16",
            ElementType::I32 => "i32",
            ElementType::U32 => "u32",
            ElementType::F32 => "f32",
        }
    }

    /// Parse a wire code
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "i8" => Some(ElementType::I8),
            "u8" => Some(ElementType::U8),
            "i16" => Some(ElementType::I16),
            "u16" => Some(ElementType::U16),
            "i32" => Some(ElementType::I32),
            "u32" => Some(ElementType::U32),
            "f32" => Some(ElementType::F32),
            _ => None,
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Reference to a byte range inside a packed buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BinaryPointer {
    /// Index into the packed-buffer array (`data` is always 0, `bins[i]` is `i`)
    pub buffer_index: u32,
    pub byte_offset: u32,
    pub byte_length: u32,
    /// `None` means opaque bytes
    pub element_type: Option<ElementType>,
}

impl BinaryPointer {
    pub fn new(
        buffer_index: u32,
        byte_offset: u32,
        byte_length: u32,
        element_type: Option<ElementType>,
    ) -> Self {
        Self {
            buffer_index,
            byte_offset,
            byte_length,
            element_type,
        }
    }

    /// Byte range covered by this pointer
    pub fn range(&self) -> std::ops::Range<usize> {
        let start = self.byte_offset as usize;
        start..start + self.byte_length as usize
    }

    /// Number of elements (`None` for opaque pointers)
    pub fn element_count(&self) -> Option<usize> {
        self.element_type
            .map(|ty| self.byte_length as usize / ty.size())
    }

    /// Try to read a pointer out of an arbitrary JSON value.
    ///
    /// Returns `None` for anything that is not a well-formed pointer tuple.
    pub fn from_json(value: &Value) -> Option<Self> {
        BinaryPointer::deserialize(value).ok()
    }

    /// Encode as a JSON value in wire format
    pub fn to_json(&self) -> Value {
        let mut content = vec![
            Value::from(self.buffer_index),
            Value::from(self.byte_offset),
            Value::from(self.byte_length),
        ];
        if let Some(ty) = self.element_type {
            content.push(Value::from(ty.code()));
        }
        Value::Array(vec![Value::from(BINARY_TAG), Value::Array(content)])
    }
}

struct PointerContent<'a>(&'a BinaryPointer);

impl Serialize for PointerContent<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let pointer = self.0;
        let len = if pointer.element_type.is_some() { 4 } else { 3 };
        let mut tuple = serializer.serialize_tuple(len)?;
        tuple.serialize_element(&pointer.buffer_index)?;
        tuple.serialize_element(&pointer.byte_offset)?;
        tuple.serialize_element(&pointer.byte_length)?;
        if let Some(ty) = pointer.element_type {
            tuple.serialize_element(ty.code())?;
        }
        tuple.end()
    }
}

impl Serialize for BinaryPointer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&BINARY_TAG)?;
        tuple.serialize_element(&PointerContent(self))?;
        tuple.end()
    }
}

struct Content(BinaryPointer);

impl<'de> Deserialize<'de> for Content {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ContentVisitor;

        impl<'de> Visitor<'de> for ContentVisitor {
            type Value = Content;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("[bufferIndex, byteOffset, byteLength, elementType?]")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Content, A::Error> {
                let buffer_index: u32 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let byte_offset: u32 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                let byte_length: u32 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(2, &self))?;
                let element_type = seq.next_element::<Option<ElementType>>()?.flatten();
                if seq.next_element::<IgnoredAny>()?.is_some() {
                    return Err(de::Error::invalid_length(5, &self));
                }
                Ok(Content(BinaryPointer {
                    buffer_index,
                    byte_offset,
                    byte_length,
                    element_type,
                }))
            }
        }

        deserializer.deserialize_seq(ContentVisitor)
    }
}

impl<'de> Deserialize<'de> for BinaryPointer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PointerVisitor;

        impl<'de> Visitor<'de> for PointerVisitor {
            type Value = BinaryPointer;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "a binary pointer [{BINARY_TAG}, [...]]")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<BinaryPointer, A::Error> {
                let tag: u32 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                if tag != BINARY_TAG {
                    return Err(de::Error::invalid_value(
                        de::Unexpected::Unsigned(tag.into()),
                        &self,
                    ));
                }
                let Content(pointer) = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                if seq.next_element::<IgnoredAny>()?.is_some() {
                    return Err(de::Error::invalid_length(3, &self));
                }
                Ok(pointer)
            }
        }

        deserializer.deserialize_seq(PointerVisitor)
    }
}

/// A descriptor field that is either a binary pointer or a value that was
/// never pointer-encoded.
///
/// The `Inline` variant keeps pre-existing data (e.g. plain arrays in a
/// partially migrated descriptor tree) exactly as it was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BinaryValue {
    Pointer(BinaryPointer),
    Inline(Value),
}

impl BinaryValue {
    /// Classify a JSON value
    pub fn from_json(value: Value) -> Self {
        match BinaryPointer::from_json(&value) {
            Some(pointer) => BinaryValue::Pointer(pointer),
            None => BinaryValue::Inline(value),
        }
    }

    pub fn as_pointer(&self) -> Option<&BinaryPointer> {
        match self {
            BinaryValue::Pointer(pointer) => Some(pointer),
            BinaryValue::Inline(_) => None,
        }
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, BinaryValue::Pointer(_))
    }
}

impl From<BinaryPointer> for BinaryValue {
    fn from(pointer: BinaryPointer) -> Self {
        BinaryValue::Pointer(pointer)
    }
}
