//! Error types for packing, reconstruction, fetching and archives.

use crate::pointer::ElementType;

/// Failure while building a packed layout.
///
/// Every variant aborts the whole packing call; no partial output is produced.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    /// A pointer referenced a buffer index the caller never supplied
    #[error("unknown buffer index {index} ({count} buffers supplied)")]
    UnknownBufferIndex { index: u32, count: usize },

    /// A pointer sub-range does not fit inside its source buffer
    #[error("pointer range {offset}+{length} exceeds buffer {index} ({available} bytes)")]
    PointerOutOfRange {
        index: u32,
        offset: u64,
        length: u64,
        available: usize,
    },

    /// A pointer was requested for a buffer that was never registered
    #[error("buffer was not registered before pointer resolution")]
    UnregisteredBuffer,

    /// An alias attribute names no raw attribute of its geometry
    #[error("geometry {geometry}: attribute '{attribute}' aliases unknown attribute '{data_source}'")]
    UnknownAliasSource {
        geometry: usize,
        attribute: String,
        data_source: String,
    },

    /// Offsets or lengths no longer fit the 32-bit pointer fields
    #[error("packed layout too large for 32-bit pointers ({0} bytes)")]
    LayoutOverflow(usize),

    /// A texture descriptor has neither an image source nor a cube shape
    #[error("texture {index}: unsupported source shape ({reason})")]
    UnsupportedTextureSource { index: usize, reason: String },

    /// An image or cube face could not be fetched
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A fetch task panicked or was cancelled by the runtime
    #[error("fetch task failed: {0}")]
    FetchTask(String),
}

/// Failure while turning a pointer back into bytes or a typed view.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconstructError {
    #[error("pointer references buffer {index} but only {count} buffers are loaded")]
    UnknownBuffer { index: u32, count: usize },

    #[error("pointer range {offset}+{length} exceeds buffer {index} ({available} bytes)")]
    OutOfBounds {
        index: u32,
        offset: u32,
        length: u32,
        available: usize,
    },

    /// Byte length is not a whole number of elements
    #[error("malformed pointer: {length} bytes is not a multiple of {element_type:?} size")]
    LengthNotMultiple {
        length: u32,
        element_type: ElementType,
    },

    #[error("pointer offset {offset} is not aligned for {element_type:?}")]
    Misaligned {
        offset: u32,
        element_type: ElementType,
    },

    #[error("pointer carries no element type; cannot build a typed view")]
    Untyped,

    #[error("texture references image {index} but only {count} images are loaded")]
    UnknownImage { index: u32, count: usize },
}

/// Failure produced by an image fetch collaborator.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("no image available for '{0}'")]
    NotFound(String),

    #[error("failed to read '{url}'")]
    Io {
        url: String,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "http")]
    #[error("request for '{url}' failed")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unsupported url '{0}'")]
    UnsupportedUrl(String),

    #[error("failed to rasterize image")]
    Rasterize(#[from] image::ImageError),
}

/// Failure while reading or writing an `.fxbin` archive.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("invalid archive magic bytes (expected {expected:?})")]
    BadMagic { expected: &'static str },

    #[error("failed to decode archive: {0}")]
    Decode(String),

    #[error("unsupported format version '{found}' (expected '{expected}')")]
    UnsupportedVersion { found: String, expected: &'static str },

    #[error("archive holds {found} data, expected {expected}")]
    WrongKind {
        found: crate::ArchiveKind,
        expected: crate::ArchiveKind,
    },

    #[error("geometry archive must hold exactly one data buffer, found {0}")]
    BufferCount(usize),

    #[error("invalid descriptor JSON")]
    Json(#[from] serde_json::Error),
}
