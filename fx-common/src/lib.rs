//! Binary packing for effect geometry and texture resources
//!
//! This crate turns in-memory vertex/index buffers, 2D images and cube-map
//! mipmap chains into one compact binary payload plus a JSON descriptor tree,
//! and reconstructs typed views from that payload without copying.
//!
//! Shared between:
//! - `fx-export` (asset pipeline, writes `.fxbin` archives)
//! - runtimes that read archives back and upload their contents
//!
//! # Modules
//!
//! - [`pointer`] - Binary pointer wire format (`[20, [buffer, offset, length, type]]`)
//! - [`typed`] - Typed source arrays, word-aligned packed buffers and views
//! - [`registry`] - Identity-deduplicating buffer registry and concatenation
//! - [`remap`] - Rewriting caller pointers into packed-buffer pointers
//! - [`geometry`] - Geometry packer and unpacker
//! - [`texture`] - Texture packer (2D images and cube maps) and unpacker
//! - [`reconstruct`] - Zero-copy reconstruction of pointers
//! - [`archive`] - Single-file `.fxbin` container

pub mod archive;
mod error;
pub mod geometry;
pub mod pointer;
pub mod reconstruct;
pub mod registry;
pub mod remap;
pub mod texture;
pub mod typed;

/// Literal version tag written into every descriptor tree and archive.
pub const FORMAT_VERSION: &str = "1.0";

pub use error::{ArchiveError, FetchError, PackError, ReconstructError};

pub use archive::{ArchiveFormat, ArchiveKind, FX_ARCHIVE_FORMAT, FxArchive};
pub use geometry::{
    AliasAttribute, Attribute, Geometry, GeometryBundle, GeometryDescriptor, GeometrySource,
    RawAttribute, UnpackedGeometry, pack_geometries, unpack_geometry,
};
pub use pointer::{BINARY_TAG, BinaryPointer, BinaryValue, ElementType};
pub use reconstruct::{Reconstructed, reconstruct, reconstruct_json, reconstruct_mut};
pub use registry::{BinarySource, BufferRegistry, RegistryEntry, TYPED_ALIGNMENT};
pub use remap::{PointerRequest, Remapped, remap, remap_aligned, remap_in_place};
pub use texture::{
    CubeTextureDescriptor, ImageFetcher, ImageSource, ImageTextureDescriptor, TEXTURE_2D,
    TEXTURE_CUBE_MAP, TextureBundle, TextureDescriptor, TextureInput, TextureSource,
    UnpackedTexture, pack_textures, unpack_textures,
};
pub use typed::{Element, PackedBuffer, TypedArray, TypedView, TypedViewMut};
