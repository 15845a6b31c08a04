//! fx-export library
//!
//! Manifest loading, geometry/texture input parsing and archive writing, for
//! use by the `fx-export` binary and by other build tools.

pub mod geometry_file;
pub mod inspect;
pub mod manifest;
pub mod pack;

pub use geometry_file::{DataRef, GeometryFile, InlineArray};
pub use manifest::{FxManifest, ManifestContext, load_manifest};
pub use pack::{CheckReport, PackReport, check, pack};
