//! Reconstruction of binary pointers
//!
//! Typed pointers become zero-copy views borrowing the packed buffer; opaque
//! pointers become an owned copy of their byte range. Values that were never
//! pointer-encoded are handed back unchanged.

use std::ops::Range;

use serde_json::Value;

use crate::error::ReconstructError;
use crate::pointer::{BinaryPointer, BinaryValue};
use crate::typed::{PackedBuffer, TypedView, TypedViewMut};

/// Result of reconstructing a descriptor field
#[derive(Debug, Clone, PartialEq)]
pub enum Reconstructed<'a> {
    /// Zero-copy view over the packed buffer
    Typed(TypedView<'a>),
    /// Copy of an opaque byte range
    Bytes(Vec<u8>),
    /// Value that was not a binary pointer, returned as-is
    Inline(&'a Value),
}

impl<'a> Reconstructed<'a> {
    pub fn as_typed(&self) -> Option<&TypedView<'a>> {
        match self {
            Reconstructed::Typed(view) => Some(view),
            _ => None,
        }
    }

    /// Bytes of a typed view or an opaque copy
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Reconstructed::Typed(view) => Some(view.as_bytes()),
            Reconstructed::Bytes(bytes) => Some(bytes),
            Reconstructed::Inline(_) => None,
        }
    }

    pub fn as_inline(&self) -> Option<&'a Value> {
        match self {
            Reconstructed::Inline(value) => Some(value),
            _ => None,
        }
    }
}

/// Reconstruct a descriptor field.
pub fn reconstruct<'a>(
    buffers: &'a [PackedBuffer],
    value: &'a BinaryValue,
) -> Result<Reconstructed<'a>, ReconstructError> {
    match value {
        BinaryValue::Pointer(pointer) => reconstruct_pointer(buffers, pointer),
        BinaryValue::Inline(value) => Ok(Reconstructed::Inline(value)),
    }
}

/// Reconstruct an untyped JSON value.
///
/// Anything that is not shaped like `[20, [index, offset, length, type?]]`
/// is returned unchanged.
pub fn reconstruct_json<'a>(
    buffers: &'a [PackedBuffer],
    value: &'a Value,
) -> Result<Reconstructed<'a>, ReconstructError> {
    match BinaryPointer::from_json(value) {
        Some(pointer) => reconstruct_pointer(buffers, &pointer),
        None => Ok(Reconstructed::Inline(value)),
    }
}

/// Reconstruct a pointer as a typed view or opaque byte copy
pub fn reconstruct_pointer<'a>(
    buffers: &'a [PackedBuffer],
    pointer: &BinaryPointer,
) -> Result<Reconstructed<'a>, ReconstructError> {
    let (index, range) = locate(buffers, pointer)?;
    let bytes = &buffers[index].as_bytes()[range];

    match pointer.element_type {
        Some(element_type) => Ok(Reconstructed::Typed(TypedView::new(element_type, bytes))),
        None => Ok(Reconstructed::Bytes(bytes.to_vec())),
    }
}

/// Mutable typed view over the packed buffer.
///
/// Writes through the returned view change the packed bytes in place.
pub fn reconstruct_mut<'a>(
    buffers: &'a mut [PackedBuffer],
    pointer: &BinaryPointer,
) -> Result<TypedViewMut<'a>, ReconstructError> {
    let element_type = pointer.element_type.ok_or(ReconstructError::Untyped)?;
    let (index, range) = locate(buffers, pointer)?;
    let bytes = &mut buffers[index].as_bytes_mut()[range];
    Ok(TypedViewMut::new(element_type, bytes))
}

/// Borrow the raw bytes a pointer covers, ignoring its element type
pub(crate) fn pointer_bytes<'a>(
    buffers: &'a [PackedBuffer],
    pointer: &BinaryPointer,
) -> Result<&'a [u8], ReconstructError> {
    let (index, range) = locate(buffers, pointer)?;
    Ok(&buffers[index].as_bytes()[range])
}

/// Validate a pointer against the loaded buffers
fn locate(
    buffers: &[PackedBuffer],
    pointer: &BinaryPointer,
) -> Result<(usize, Range<usize>), ReconstructError> {
    let index = pointer.buffer_index as usize;
    let buffer = buffers.get(index).ok_or(ReconstructError::UnknownBuffer {
        index: pointer.buffer_index,
        count: buffers.len(),
    })?;

    let range = pointer.range();
    if range.end > buffer.len() {
        return Err(ReconstructError::OutOfBounds {
            index: pointer.buffer_index,
            offset: pointer.byte_offset,
            length: pointer.byte_length,
            available: buffer.len(),
        });
    }

    if let Some(element_type) = pointer.element_type {
        let size = element_type.size();
        if pointer.byte_length as usize % size != 0 {
            return Err(ReconstructError::LengthNotMultiple {
                length: pointer.byte_length,
                element_type,
            });
        }
        if pointer.byte_offset as usize % size != 0 {
            return Err(ReconstructError::Misaligned {
                offset: pointer.byte_offset,
                element_type,
            });
        }
    }

    Ok((index, range))
}
