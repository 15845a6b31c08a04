//! Pointer remapping
//!
//! Callers describe ranges relative to their own buffer list
//! (`buffer_index` = position in that list). Remapping lays the buffers out
//! with a [`BufferRegistry`], concatenates them, and rewrites each range to
//! point into the single packed output (always output buffer 0).

use std::sync::Arc;

use crate::error::PackError;
use crate::pointer::{BinaryPointer, ElementType};
use crate::registry::{BinarySource, BufferRegistry, TYPED_ALIGNMENT, to_u32};
use crate::typed::PackedBuffer;

/// Range relative to a caller's buffer list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PointerRequest {
    pub buffer_index: u32,
    pub byte_offset: u32,
    /// Defaults to the rest of the source buffer
    pub byte_length: Option<u32>,
    pub element_type: Option<ElementType>,
}

impl PointerRequest {
    /// Whole-buffer request
    pub fn whole(buffer_index: u32) -> Self {
        Self {
            buffer_index,
            ..Self::default()
        }
    }
}

impl From<BinaryPointer> for PointerRequest {
    fn from(pointer: BinaryPointer) -> Self {
        Self {
            buffer_index: pointer.buffer_index,
            byte_offset: pointer.byte_offset,
            byte_length: Some(pointer.byte_length),
            element_type: pointer.element_type,
        }
    }
}

/// Packed output plus one pointer per request
#[derive(Debug, Clone, PartialEq)]
pub struct Remapped {
    pub data: PackedBuffer,
    pub pointers: Vec<BinaryPointer>,
}

/// Remap with typed-data alignment; see [`remap_aligned`].
///
/// Whole-buffer pointers carry the source buffer's element type, so only
/// opaque byte sources produce the untyped `(i, 0, len)` wire form.
pub fn remap<B: BinarySource>(
    buffers: &[Arc<B>],
    requests: Option<&[PointerRequest]>,
) -> Result<Remapped, PackError> {
    remap_aligned(buffers, requests, TYPED_ALIGNMENT)
}

/// Lay out `buffers`, concatenate them and resolve `requests` against the
/// packed output.
///
/// Without requests, one whole-buffer pointer per buffer is produced, carrying
/// that buffer's own element type. Caller state is never modified.
pub fn remap_aligned<B: BinarySource>(
    buffers: &[Arc<B>],
    requests: Option<&[PointerRequest]>,
    alignment: usize,
) -> Result<Remapped, PackError> {
    let registry = layout(buffers, alignment);

    let pointers = match requests {
        Some(requests) => requests
            .iter()
            .map(|request| resolve(buffers, &registry, request))
            .collect::<Result<Vec<_>, _>>()?,
        None => buffers
            .iter()
            .enumerate()
            .map(|(index, buffer)| {
                let request = PointerRequest {
                    element_type: buffer.element_type(),
                    ..PointerRequest::whole(to_u32(index)?)
                };
                resolve(buffers, &registry, &request)
            })
            .collect::<Result<Vec<_>, _>>()?,
    };

    Ok(Remapped {
        data: registry.concat(),
        pointers,
    })
}

/// Overwrite `pointers` in place so they reference the packed output.
///
/// All pointers are validated before any of them is modified, so a failing
/// call leaves the caller's pointers untouched.
pub fn remap_in_place<B: BinarySource>(
    buffers: &[Arc<B>],
    pointers: &mut [BinaryPointer],
) -> Result<PackedBuffer, PackError> {
    let registry = layout(buffers, TYPED_ALIGNMENT);

    let resolved = pointers
        .iter()
        .map(|pointer| resolve(buffers, &registry, &PointerRequest::from(*pointer)))
        .collect::<Result<Vec<_>, _>>()?;

    for (pointer, remapped) in pointers.iter_mut().zip(resolved) {
        *pointer = remapped;
    }

    Ok(registry.concat())
}

fn layout<B: BinarySource>(buffers: &[Arc<B>], alignment: usize) -> BufferRegistry<B> {
    let mut registry = BufferRegistry::with_alignment(alignment);
    for buffer in buffers {
        registry.register(buffer);
    }
    registry
}

fn resolve<B: BinarySource>(
    buffers: &[Arc<B>],
    registry: &BufferRegistry<B>,
    request: &PointerRequest,
) -> Result<BinaryPointer, PackError> {
    let buffer = buffers
        .get(request.buffer_index as usize)
        .ok_or(PackError::UnknownBufferIndex {
            index: request.buffer_index,
            count: buffers.len(),
        })?;

    let available = buffer.as_bytes().len();
    let offset = u64::from(request.byte_offset);
    let length = match request.byte_length {
        Some(length) => u64::from(length),
        None => (available as u64).saturating_sub(offset),
    };
    if offset + length > available as u64 {
        return Err(PackError::PointerOutOfRange {
            index: request.buffer_index,
            offset,
            length,
            available,
        });
    }

    let base = registry
        .offset_of(buffer)
        .ok_or(PackError::UnregisteredBuffer)?;

    Ok(BinaryPointer::new(
        0,
        to_u32(base + request.byte_offset as usize)?,
        to_u32(length as usize)?,
        request.element_type,
    ))
}
