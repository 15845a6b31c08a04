//! Buffer registry and concatenation
//!
//! The registry assigns every distinct source buffer an offset in a virtual
//! layout. Identity is the `Arc` allocation: registering the same `Arc` twice
//! returns the first offset, while two equal-content buffers in separate
//! allocations are stored twice.
//!
//! # Layout
//! ```text
//! offset    = align_up(running, A)
//! running   = align_up(offset + byte_length, A)
//! ```
//! `A` is [`TYPED_ALIGNMENT`] (4) for typed data. Opaque payloads such as
//! encoded cube-map faces may use an alignment of 1 so they pack contiguously.

use std::sync::Arc;

use hashbrown::HashMap;

use crate::error::PackError;
use crate::pointer::{BinaryPointer, ElementType};
use crate::typed::{PackedBuffer, TypedArray};

/// Alignment of every buffer start inside a typed-data blob
pub const TYPED_ALIGNMENT: usize = 4;

/// Anything the registry can lay out
pub trait BinarySource {
    fn as_bytes(&self) -> &[u8];

    fn element_type(&self) -> Option<ElementType> {
        None
    }
}

impl BinarySource for TypedArray {
    fn as_bytes(&self) -> &[u8] {
        TypedArray::as_bytes(self)
    }

    fn element_type(&self) -> Option<ElementType> {
        TypedArray::element_type(self)
    }
}

impl BinarySource for Vec<u8> {
    fn as_bytes(&self) -> &[u8] {
        self
    }
}

/// One registered buffer and its place in the layout
#[derive(Debug, Clone)]
pub struct RegistryEntry<B> {
    pub buffer: Arc<B>,
    pub offset: usize,
    pub byte_length: usize,
}

impl<B: BinarySource> RegistryEntry<B> {
    pub fn element_type(&self) -> Option<ElementType> {
        self.buffer.element_type()
    }
}

/// Identity-deduplicating layout of source buffers.
///
/// Holds a clone of every registered `Arc`, so an identity can never be
/// reused by a different allocation while the registry is alive.
#[derive(Debug)]
pub struct BufferRegistry<B> {
    alignment: usize,
    entries: Vec<RegistryEntry<B>>,
    lookup: HashMap<usize, usize>,
    running_offset: usize,
}

impl<B: BinarySource> Default for BufferRegistry<B> {
    fn default() -> Self {
        Self::new()
    }
}

fn identity<B>(buffer: &Arc<B>) -> usize {
    Arc::as_ptr(buffer).cast::<()>() as usize
}

pub(crate) fn to_u32(value: usize) -> Result<u32, PackError> {
    u32::try_from(value).map_err(|_| PackError::LayoutOverflow(value))
}

impl<B: BinarySource> BufferRegistry<B> {
    /// Registry for typed data (4-byte aligned starts)
    pub fn new() -> Self {
        Self::with_alignment(TYPED_ALIGNMENT)
    }

    /// Registry with a custom alignment (clamped to at least 1)
    pub fn with_alignment(alignment: usize) -> Self {
        Self {
            alignment: alignment.max(1),
            entries: Vec::new(),
            lookup: HashMap::new(),
            running_offset: 0,
        }
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Register a buffer, returning its offset in the layout.
    ///
    /// Idempotent per identity: the second call for the same `Arc` returns
    /// the stored offset and does not grow the layout.
    pub fn register(&mut self, buffer: &Arc<B>) -> usize {
        let key = identity(buffer);
        if let Some(&index) = self.lookup.get(&key) {
            return self.entries[index].offset;
        }

        let byte_length = buffer.as_bytes().len();
        let offset = self.running_offset.next_multiple_of(self.alignment);
        self.running_offset = (offset + byte_length).next_multiple_of(self.alignment);

        tracing::trace!(offset, byte_length, "registered buffer");

        self.lookup.insert(key, self.entries.len());
        self.entries.push(RegistryEntry {
            buffer: Arc::clone(buffer),
            offset,
            byte_length,
        });
        offset
    }

    pub fn entry(&self, buffer: &Arc<B>) -> Option<&RegistryEntry<B>> {
        self.lookup
            .get(&identity(buffer))
            .map(|&index| &self.entries[index])
    }

    pub fn offset_of(&self, buffer: &Arc<B>) -> Option<usize> {
        self.entry(buffer).map(|entry| entry.offset)
    }

    /// Entries in registration order
    pub fn entries(&self) -> &[RegistryEntry<B>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Aligned total size of the layout
    pub fn byte_length(&self) -> usize {
        self.running_offset
    }

    /// Pointer covering a whole registered buffer inside output buffer 0
    pub fn pointer_for(&self, buffer: &Arc<B>) -> Result<BinaryPointer, PackError> {
        let entry = self.entry(buffer).ok_or(PackError::UnregisteredBuffer)?;
        Ok(BinaryPointer::new(
            0,
            to_u32(entry.offset)?,
            to_u32(entry.byte_length)?,
            entry.element_type(),
        ))
    }

    /// Materialize the layout into one zero-filled buffer.
    ///
    /// Every entry has a fixed offset, so copy order does not affect output.
    pub fn concat(&self) -> PackedBuffer {
        let mut packed = PackedBuffer::zeroed(self.running_offset);
        let bytes = packed.as_bytes_mut();
        for entry in &self.entries {
            let end = entry.offset + entry.byte_length;
            bytes[entry.offset..end].copy_from_slice(entry.buffer.as_bytes());
        }
        packed
    }
}
