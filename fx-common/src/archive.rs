//! Packed resource archive (`.fxbin`)
//!
//! One file per packing call: magic bytes followed by a bitcode-encoded
//! [`FxArchive`] holding the JSON descriptor tree and every binary buffer.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  Magic: "FXPK" (4 bytes)                      │
//! ├──────────────────────────────────────────────┤
//! │  FxArchive (bitcode)                          │
//! │  ├── version: String      "1.0"               │
//! │  ├── kind: ArchiveKind    geometry | texture  │
//! │  ├── descriptor: String   JSON tree           │
//! │  ├── buffers: Vec<Vec<u8>> data / cube bins   │
//! │  └── images: Vec<Vec<u8>>  2D image bytes     │
//! └──────────────────────────────────────────────┘
//! ```

use std::fmt;

use bitcode::{Decode, Encode};

use crate::FORMAT_VERSION;
use crate::error::ArchiveError;
use crate::geometry::GeometryBundle;
use crate::texture::TextureBundle;
use crate::typed::PackedBuffer;

/// Archive file format constants
#[derive(Debug, Clone, Copy)]
pub struct ArchiveFormat {
    /// File extension without dot
    pub extension: &'static str,
    /// Magic bytes at the start of every archive
    pub magic: &'static [u8; 4],
    /// Descriptor format version
    pub version: &'static str,
}

pub const FX_ARCHIVE_FORMAT: ArchiveFormat = ArchiveFormat {
    extension: "fxbin",
    magic: b"FXPK",
    version: FORMAT_VERSION,
};

/// What an archive contains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum ArchiveKind {
    Geometry,
    Texture,
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveKind::Geometry => f.write_str("geometry"),
            ArchiveKind::Texture => f.write_str("texture"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct FxArchive {
    pub version: String,
    pub kind: ArchiveKind,
    /// JSON descriptor tree
    pub descriptor: String,
    /// Geometry: exactly one data buffer. Texture: one bin per cube map.
    pub buffers: Vec<Vec<u8>>,
    /// Texture: deduplicated 2D images. Geometry: empty.
    pub images: Vec<Vec<u8>>,
}

impl FxArchive {
    /// Serialize with magic header
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = FX_ARCHIVE_FORMAT.magic.to_vec();
        bytes.extend(bitcode::encode(self));
        bytes
    }

    /// Deserialize and validate
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ArchiveError> {
        let magic = FX_ARCHIVE_FORMAT.magic;
        if bytes.len() < magic.len() || &bytes[..magic.len()] != magic {
            return Err(ArchiveError::BadMagic { expected: "FXPK" });
        }

        let archive: FxArchive = bitcode::decode(&bytes[magic.len()..])
            .map_err(|e| ArchiveError::Decode(e.to_string()))?;
        archive.validate()?;
        Ok(archive)
    }

    pub fn validate(&self) -> Result<(), ArchiveError> {
        if self.version != FX_ARCHIVE_FORMAT.version {
            return Err(ArchiveError::UnsupportedVersion {
                found: self.version.clone(),
                expected: FX_ARCHIVE_FORMAT.version,
            });
        }
        if self.kind == ArchiveKind::Geometry && self.buffers.len() != 1 {
            return Err(ArchiveError::BufferCount(self.buffers.len()));
        }
        Ok(())
    }

    /// Total size of every stored buffer and image
    pub fn payload_len(&self) -> usize {
        self.buffers.iter().chain(&self.images).map(Vec::len).sum()
    }

    fn expect_kind(&self, expected: ArchiveKind) -> Result<(), ArchiveError> {
        if self.kind != expected {
            return Err(ArchiveError::WrongKind {
                found: self.kind,
                expected,
            });
        }
        Ok(())
    }
}

impl GeometryBundle {
    pub fn to_archive(&self) -> Result<FxArchive, ArchiveError> {
        Ok(FxArchive {
            version: self.version.clone(),
            kind: ArchiveKind::Geometry,
            descriptor: self.descriptor_json()?,
            buffers: vec![self.data.to_vec()],
            images: Vec::new(),
        })
    }

    pub fn from_archive(archive: &FxArchive) -> Result<Self, ArchiveError> {
        archive.expect_kind(ArchiveKind::Geometry)?;
        let [data] = archive.buffers.as_slice() else {
            return Err(ArchiveError::BufferCount(archive.buffers.len()));
        };
        GeometryBundle::from_descriptor_json(&archive.descriptor, PackedBuffer::from_bytes(data))
    }
}

impl TextureBundle {
    pub fn to_archive(&self) -> Result<FxArchive, ArchiveError> {
        Ok(FxArchive {
            version: self.version.clone(),
            kind: ArchiveKind::Texture,
            descriptor: self.descriptor_json()?,
            buffers: self.bins.iter().map(PackedBuffer::to_vec).collect(),
            images: self.images.clone(),
        })
    }

    pub fn from_archive(archive: &FxArchive) -> Result<Self, ArchiveError> {
        archive.expect_kind(ArchiveKind::Texture)?;
        let bins = archive
            .buffers
            .iter()
            .map(|bin| PackedBuffer::from_bytes(bin))
            .collect();
        TextureBundle::from_descriptor_json(&archive.descriptor, archive.images.clone(), bins)
    }
}
