//! Typed source arrays, packed buffers and typed views
//!
//! Source data enters the packer as [`TypedArray`]s shared through `Arc`;
//! the `Arc` allocation is the buffer's identity for deduplication.
//!
//! Packed output lives in a [`PackedBuffer`], which is backed by 32-bit words
//! so that any 4-aligned offset can be viewed as `f32`/`u32`/`i32` in place.
//! [`TypedView`] and [`TypedViewMut`] borrow from the packed buffer; writing
//! through a mutable view edits the packed bytes directly.

use std::sync::Arc;

use bytemuck::Pod;

use crate::pointer::ElementType;

/// Scalar types that can back a typed pointer
pub trait Element: Pod {
    const ELEMENT_TYPE: ElementType;
}

macro_rules! impl_element {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl Element for $ty {
            const ELEMENT_TYPE: ElementType = ElementType::$variant;
        })*
    };
}

impl_element! {
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    f32 => F32,
}

/// Owned source array handed to the packers.
///
/// Bytes are stored in native (little-endian on all supported targets) order.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedArray {
    element_type: Option<ElementType>,
    bytes: Vec<u8>,
}

impl TypedArray {
    /// Copy a slice of elements
    pub fn new<T: Element>(values: &[T]) -> Self {
        Self {
            element_type: Some(T::ELEMENT_TYPE),
            bytes: bytemuck::cast_slice(values).to_vec(),
        }
    }

    /// Opaque bytes with no element interpretation
    pub fn opaque(bytes: Vec<u8>) -> Self {
        Self {
            element_type: None,
            bytes,
        }
    }

    /// Wrap in an `Arc` so the array can be shared between descriptors
    pub fn shared<T: Element>(values: &[T]) -> Arc<Self> {
        Arc::new(Self::new(values))
    }

    pub fn element_type(&self) -> Option<ElementType> {
        self.element_type
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// Number of elements (bytes for opaque arrays)
    pub fn len(&self) -> usize {
        let size = self.element_type.map_or(1, ElementType::size);
        self.bytes.len() / size
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Copy out as elements of `T`; `None` when `T` does not match
    pub fn to_vec<T: Element>(&self) -> Option<Vec<T>> {
        if self.element_type != Some(T::ELEMENT_TYPE) {
            return None;
        }
        Some(bytemuck::pod_collect_to_vec(&self.bytes))
    }
}

/// Contiguous packed output buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackedBuffer {
    words: Vec<u32>,
    len: usize,
}

impl PackedBuffer {
    /// Zero-filled buffer of `len` bytes
    pub fn zeroed(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(4)],
            len,
        }
    }

    /// Copy bytes loaded from disk or the network
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut buffer = Self::zeroed(bytes.len());
        buffer.as_bytes_mut().copy_from_slice(bytes);
        buffer
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        let bytes: &[u8] = bytemuck::cast_slice(&self.words);
        &bytes[..self.len]
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut self.words);
        &mut bytes[..self.len]
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

/// Read-only typed view over a packed buffer region
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TypedView<'a> {
    element_type: ElementType,
    bytes: &'a [u8],
}

impl<'a> TypedView<'a> {
    /// Caller guarantees the region is aligned and a whole number of elements
    pub(crate) fn new(element_type: ElementType, bytes: &'a [u8]) -> Self {
        Self {
            element_type,
            bytes,
        }
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len() / self.element_type.size()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Underlying packed bytes (not a copy)
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Borrow as `&[T]`; `None` when `T` does not match the element type
    pub fn as_slice<T: Element>(&self) -> Option<&'a [T]> {
        if T::ELEMENT_TYPE != self.element_type {
            return None;
        }
        bytemuck::try_cast_slice(self.bytes).ok()
    }

    pub fn to_vec<T: Element>(&self) -> Option<Vec<T>> {
        self.as_slice().map(<[T]>::to_vec)
    }
}

/// Mutable typed view; writes land in the packed buffer
#[derive(Debug, PartialEq)]
pub struct TypedViewMut<'a> {
    element_type: ElementType,
    bytes: &'a mut [u8],
}

impl<'a> TypedViewMut<'a> {
    pub(crate) fn new(element_type: ElementType, bytes: &'a mut [u8]) -> Self {
        Self {
            element_type,
            bytes,
        }
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len() / self.element_type.size()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice_mut<T: Element>(&mut self) -> Option<&mut [T]> {
        if T::ELEMENT_TYPE != self.element_type {
            return None;
        }
        bytemuck::try_cast_slice_mut(&mut *self.bytes).ok()
    }

    /// Consume the view, keeping the borrow of the packed buffer
    pub fn into_slice_mut<T: Element>(self) -> Option<&'a mut [T]> {
        if T::ELEMENT_TYPE != self.element_type {
            return None;
        }
        bytemuck::try_cast_slice_mut(self.bytes).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_array_bytes() {
        let array = TypedArray::new(&[1u16, 2, 3]);
        assert_eq!(array.element_type(), Some(ElementType::U16));
        assert_eq!(array.byte_len(), 6);
        assert_eq!(array.len(), 3);
        assert_eq!(array.to_vec::<u16>(), Some(vec![1, 2, 3]));
        assert_eq!(array.to_vec::<i16>(), None);
    }

    #[test]
    fn test_opaque_array() {
        let array = TypedArray::opaque(vec![9; 7]);
        assert_eq!(array.element_type(), None);
        assert_eq!(array.len(), 7);
        assert!(array.to_vec::<u8>().is_none());
    }

    #[test]
    fn test_packed_buffer_keeps_exact_length() {
        let buffer = PackedBuffer::from_bytes(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(buffer.len(), 6);
        assert_eq!(buffer.as_bytes(), &[1, 2, 3, 4, 5, 6]);
        assert_eq!(buffer.as_bytes().as_ptr() as usize % 4, 0);
    }

    #[test]
    fn test_view_element_mismatch() {
        let buffer = PackedBuffer::from_bytes(bytemuck::cast_slice(&[1.5f32, 2.5][..]));
        let view = TypedView::new(ElementType::F32, buffer.as_bytes());
        assert_eq!(view.len(), 2);
        assert_eq!(view.as_slice::<f32>(), Some(&[1.5f32, 2.5][..]));
        assert!(view.as_slice::<u32>().is_none());
    }
}
