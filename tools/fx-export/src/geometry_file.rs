//! Geometry input files
//!
//! ```json
//! {
//!   "buffers": { "corners": { "f32": [0, 0, 1, 0, 1, 1, 0, 1] } },
//!   "geometries": [
//!     {
//!       "attributes": {
//!         "aPosition": { "data": "corners", "size": 2 },
//!         "aUV": { "dataSource": "aPosition", "size": 2 }
//!       },
//!       "indices": { "data": { "u16": [0, 1, 2, 2, 3, 0] } },
//!       "drawCount": 6
//!     }
//!   ]
//! }
//! ```
//!
//! Attribute data is either inline (`{ "<type>": [...] }`) or the name of an
//! entry in `buffers`. Every geometry naming the same buffer shares one
//! source array, so the packer stores it once.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use fx_common::{Geometry, GeometrySource, TypedArray};
use serde::Deserialize;

/// Inline typed array, keyed by element type
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InlineArray {
    I8(Vec<i8>),
    U8(Vec<u8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    F32(Vec<f32>),
}

impl InlineArray {
    pub fn to_typed(&self) -> TypedArray {
        match self {
            InlineArray::I8(values) => TypedArray::new(values),
            InlineArray::U8(values) => TypedArray::new(values),
            InlineArray::I16(values) => TypedArray::new(values),
            InlineArray::U16(values) => TypedArray::new(values),
            InlineArray::I32(values) => TypedArray::new(values),
            InlineArray::U32(values) => TypedArray::new(values),
            InlineArray::F32(values) => TypedArray::new(values),
        }
    }
}

/// Attribute data slot in a geometry file
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DataRef {
    Named(String),
    Inline(InlineArray),
}

#[derive(Debug, Deserialize)]
pub struct GeometryFile {
    #[serde(default)]
    pub buffers: BTreeMap<String, InlineArray>,
    pub geometries: Vec<Geometry<DataRef>>,
}

impl GeometryFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read geometry file: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid geometry file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Failed to parse geometry JSON")
    }

    /// Resolve every data slot to a shared source array
    pub fn into_sources(self) -> Result<Vec<GeometrySource>> {
        let shared: BTreeMap<&str, Arc<TypedArray>> = self
            .buffers
            .iter()
            .map(|(name, array)| (name.as_str(), Arc::new(array.to_typed())))
            .collect();

        self.geometries
            .iter()
            .enumerate()
            .map(|(index, geometry)| {
                geometry
                    .try_map_data(|data| match data {
                        DataRef::Named(name) => shared
                            .get(name.as_str())
                            .cloned()
                            .with_context(|| format!("unknown buffer '{name}'")),
                        DataRef::Inline(array) => Ok(Arc::new(array.to_typed())),
                    })
                    .with_context(|| format!("geometry {index}"))
            })
            .collect()
    }
}
