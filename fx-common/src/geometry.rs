//! Geometry packer and unpacker
//!
//! Geometry descriptors are generic over the type held in attribute `data`
//! slots, so the same structure describes every stage:
//!
//! - [`GeometrySource`] - `Arc<TypedArray>` (input to the packer)
//! - [`GeometryDescriptor`] - [`BinaryValue`] (packed, JSON-serializable)
//! - [`UnpackedGeometry`] - [`Reconstructed`] views into the packed buffer
//!
//! # Visiting order
//!
//! Buffers are registered geometry by geometry; inside a geometry `indices`
//! comes first, then raw attributes in ascending name order. This order fixes
//! the byte offsets in the packed blob.
//!
//! Alias attributes (`dataSource`) reference another attribute's buffer and
//! own no bytes, so they are never registered.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::FORMAT_VERSION;
use crate::error::{ArchiveError, PackError, ReconstructError};
use crate::pointer::BinaryValue;
use crate::reconstruct::{Reconstructed, reconstruct};
use crate::registry::BufferRegistry;
use crate::typed::{PackedBuffer, TypedArray};

/// `GL_TRIANGLES`
pub const MODE_TRIANGLES: u32 = 4;

fn default_mode() -> u32 {
    MODE_TRIANGLES
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Geometry description with attribute data of type `D`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Geometry<D> {
    #[serde(default = "BTreeMap::new")]
    pub attributes: BTreeMap<String, Attribute<D>>,

    /// Index buffer (`index` is accepted as a legacy key)
    #[serde(alias = "index", skip_serializing_if = "Option::is_none")]
    pub indices: Option<RawAttribute<D>>,

    #[serde(default)]
    pub draw_start: u32,

    #[serde(default)]
    pub draw_count: u32,

    /// Primitive mode (GL enum)
    #[serde(default = "default_mode")]
    pub mode: u32,
}

/// Vertex attribute: owns a buffer or aliases another attribute's buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Attribute<D> {
    Raw(RawAttribute<D>),
    Alias(AliasAttribute),
}

/// Attribute owning its data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAttribute<D> {
    pub data: D,

    /// Components per vertex
    #[serde(default)]
    pub size: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stride: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub normalize: bool,
}

/// Interleaved view into another attribute's buffer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasAttribute {
    /// Name of the attribute whose buffer is shared
    pub data_source: String,

    pub size: u32,

    #[serde(default)]
    pub offset: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stride: Option<u32>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub normalize: bool,
}

/// Geometry as handed to the packer
pub type GeometrySource = Geometry<Arc<TypedArray>>;

/// Packed geometry (attribute data replaced by binary pointers)
pub type GeometryDescriptor = Geometry<BinaryValue>;

/// Geometry reconstructed against loaded buffers
pub type UnpackedGeometry<'a> = Geometry<Reconstructed<'a>>;

impl<D> RawAttribute<D> {
    pub fn new(data: D, size: u32) -> Self {
        Self {
            data,
            size,
            stride: None,
            offset: None,
            normalize: false,
        }
    }

    fn try_map<'s, E, Err>(
        &'s self,
        f: &mut impl FnMut(&'s D) -> Result<E, Err>,
    ) -> Result<RawAttribute<E>, Err> {
        Ok(RawAttribute {
            data: f(&self.data)?,
            size: self.size,
            stride: self.stride,
            offset: self.offset,
            normalize: self.normalize,
        })
    }
}

impl<D> Attribute<D> {
    pub fn raw(data: D, size: u32) -> Self {
        Attribute::Raw(RawAttribute::new(data, size))
    }

    pub fn alias(data_source: impl Into<String>, size: u32, offset: u32) -> Self {
        Attribute::Alias(AliasAttribute {
            data_source: data_source.into(),
            size,
            offset,
            stride: None,
            normalize: false,
        })
    }

    pub fn as_raw(&self) -> Option<&RawAttribute<D>> {
        match self {
            Attribute::Raw(raw) => Some(raw),
            Attribute::Alias(_) => None,
        }
    }
}

impl<D> Geometry<D> {
    /// Empty triangle-list geometry
    pub fn new() -> Self {
        Self {
            attributes: BTreeMap::new(),
            indices: None,
            draw_start: 0,
            draw_count: 0,
            mode: MODE_TRIANGLES,
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, attribute: Attribute<D>) -> Self {
        self.attributes.insert(name.into(), attribute);
        self
    }

    pub fn with_indices(mut self, indices: RawAttribute<D>) -> Self {
        self.indices = Some(indices);
        self
    }

    pub fn with_draw_range(mut self, draw_start: u32, draw_count: u32) -> Self {
        self.draw_start = draw_start;
        self.draw_count = draw_count;
        self
    }

    /// Data slots in visiting order: indices, then raw attributes by name
    pub fn data_slots(&self) -> impl Iterator<Item = &D> {
        self.indices
            .iter()
            .map(|indices| &indices.data)
            .chain(self.attributes.values().filter_map(|a| a.as_raw()).map(|raw| &raw.data))
    }

    /// Convert every data slot, keeping all structural metadata.
    ///
    /// Slots are visited in the documented order; alias attributes are copied
    /// unchanged.
    pub fn try_map_data<'s, E, Err>(
        &'s self,
        mut f: impl FnMut(&'s D) -> Result<E, Err>,
    ) -> Result<Geometry<E>, Err> {
        let indices = match &self.indices {
            Some(indices) => Some(indices.try_map(&mut f)?),
            None => None,
        };

        let mut attributes = BTreeMap::new();
        for (name, attribute) in &self.attributes {
            let mapped = match attribute {
                Attribute::Raw(raw) => Attribute::Raw(raw.try_map(&mut f)?),
                Attribute::Alias(alias) => Attribute::Alias(alias.clone()),
            };
            attributes.insert(name.clone(), mapped);
        }

        Ok(Geometry {
            attributes,
            indices,
            draw_start: self.draw_start,
            draw_count: self.draw_count,
            mode: self.mode,
        })
    }
}

impl<D> Default for Geometry<D> {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of packing a geometry list
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryBundle {
    pub version: String,
    /// Packed buffer every pointer references (buffer index 0)
    pub data: PackedBuffer,
    pub geometries: Vec<GeometryDescriptor>,
}

#[derive(Serialize)]
struct GeometryManifestRef<'a> {
    version: &'a str,
    geometries: &'a [GeometryDescriptor],
}

#[derive(Deserialize)]
struct GeometryManifest {
    version: String,
    geometries: Vec<GeometryDescriptor>,
}

impl GeometryBundle {
    /// Descriptor tree as JSON (`{ version, geometries }`; data travels separately)
    pub fn descriptor_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&GeometryManifestRef {
            version: &self.version,
            geometries: &self.geometries,
        })
    }

    /// Rebuild a bundle from its JSON descriptor tree and packed data
    pub fn from_descriptor_json(json: &str, data: PackedBuffer) -> Result<Self, ArchiveError> {
        let manifest: GeometryManifest = serde_json::from_str(json)?;
        if manifest.version != FORMAT_VERSION {
            return Err(ArchiveError::UnsupportedVersion {
                found: manifest.version,
                expected: FORMAT_VERSION,
            });
        }
        Ok(Self {
            version: manifest.version,
            data,
            geometries: manifest.geometries,
        })
    }

    /// Reconstruct every geometry against this bundle's data
    pub fn unpack(&self) -> Result<Vec<UnpackedGeometry<'_>>, ReconstructError> {
        let buffers = std::slice::from_ref(&self.data);
        self.geometries
            .iter()
            .map(|geometry| unpack_geometry(geometry, buffers))
            .collect()
    }
}

/// Pack a list of geometries into one deduplicated buffer.
///
/// Every distinct source buffer (by `Arc` identity) is stored once across the
/// whole list; geometries sharing a buffer get identical pointers.
pub fn pack_geometries(sources: &[GeometrySource]) -> Result<GeometryBundle, PackError> {
    for (index, source) in sources.iter().enumerate() {
        check_aliases(index, source)?;
    }

    let mut registry = BufferRegistry::new();
    let mut slots = 0usize;
    for source in sources {
        for data in source.data_slots() {
            registry.register(data);
            slots += 1;
        }
    }

    let data = registry.concat();

    let geometries = sources
        .iter()
        .map(|source| {
            source.try_map_data(|data| registry.pointer_for(data).map(BinaryValue::Pointer))
        })
        .collect::<Result<Vec<_>, _>>()?;

    tracing::info!(
        geometries = sources.len(),
        slots,
        unique_buffers = registry.len(),
        bytes = data.len(),
        "packed geometries"
    );

    Ok(GeometryBundle {
        version: FORMAT_VERSION.to_string(),
        data,
        geometries,
    })
}

/// Every alias must name a raw attribute of the same geometry
fn check_aliases<D>(index: usize, geometry: &Geometry<D>) -> Result<(), PackError> {
    for (name, attribute) in &geometry.attributes {
        let Attribute::Alias(alias) = attribute else {
            continue;
        };
        let resolved = geometry
            .attributes
            .get(&alias.data_source)
            .is_some_and(|target| target.as_raw().is_some());
        if !resolved {
            return Err(PackError::UnknownAliasSource {
                geometry: index,
                attribute: name.clone(),
                data_source: alias.data_source.clone(),
            });
        }
    }
    Ok(())
}

/// Reconstruct one packed geometry.
///
/// Pointer slots become views into `buffers`; inline values pass through.
pub fn unpack_geometry<'a>(
    descriptor: &'a GeometryDescriptor,
    buffers: &'a [PackedBuffer],
) -> Result<UnpackedGeometry<'a>, ReconstructError> {
    descriptor.try_map_data(|value| reconstruct(buffers, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pointer::{BinaryPointer, ElementType};
    use crate::registry::TYPED_ALIGNMENT;
    use serde_json::json;

    fn quad() -> GeometrySource {
        Geometry::new()
            .with_attribute("aPoint", Attribute::raw(TypedArray::shared(&[1.0f32, 2.0, 3.0, 4.0]), 2))
            .with_indices(RawAttribute::new(TypedArray::shared(&[0u8, 1, 2, 2, 3, 0]), 1))
            .with_draw_range(0, 6)
    }

    fn view_f32(geometry: &UnpackedGeometry<'_>, name: &str) -> Vec<f32> {
        let raw = geometry.attributes[name].as_raw().unwrap();
        raw.data.as_typed().unwrap().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_indices_registered_before_attributes() {
        let bundle = pack_geometries(&[quad()]).unwrap();

        // indices: 6 bytes at 0 padded to 8, aPoint: 16 bytes at 8
        assert_eq!(bundle.data.len(), 24);

        let descriptor = &bundle.geometries[0];
        assert_eq!(
            descriptor.indices.as_ref().unwrap().data,
            BinaryValue::Pointer(BinaryPointer::new(0, 0, 6, Some(ElementType::U8)))
        );
        assert_eq!(
            descriptor.attributes["aPoint"].as_raw().unwrap().data,
            BinaryValue::Pointer(BinaryPointer::new(0, 8, 16, Some(ElementType::F32)))
        );
    }

    #[test]
    fn test_attributes_visited_by_name() {
        let geometry = Geometry::new()
            .with_attribute("zeta", Attribute::raw(TypedArray::shared(&[1u8]), 1))
            .with_attribute("alpha", Attribute::raw(TypedArray::shared(&[2u8]), 1));
        let bundle = pack_geometries(&[geometry]).unwrap();

        let offset = |name: &str| {
            bundle.geometries[0].attributes[name]
                .as_raw()
                .and_then(|raw| raw.data.as_pointer())
                .map(|pointer| pointer.byte_offset)
        };
        assert_eq!(offset("alpha"), Some(0));
        assert_eq!(offset("zeta"), Some(4));
    }

    #[test]
    fn test_round_trip() {
        let source = quad().with_attribute("aUV", Attribute::alias("aPoint", 2, 8));
        let bundle = pack_geometries(std::slice::from_ref(&source)).unwrap();
        let unpacked = bundle.unpack().unwrap();
        let geometry = &unpacked[0];

        assert_eq!(view_f32(geometry, "aPoint"), vec![1.0, 2.0, 3.0, 4.0]);
        let indices = geometry.indices.as_ref().unwrap();
        assert_eq!(
            indices.data.as_typed().unwrap().to_vec::<u8>(),
            Some(vec![0, 1, 2, 2, 3, 0])
        );
        assert_eq!(indices.size, 1);
        assert_eq!(geometry.draw_count, 6);
        assert_eq!(geometry.mode, MODE_TRIANGLES);
        assert_eq!(
            geometry.attributes["aUV"],
            Attribute::alias("aPoint", 2, 8)
        );
    }

    #[test]
    fn test_shared_buffers_are_stored_once() {
        let geometry = quad();
        let bundle = pack_geometries(&[geometry.clone(), geometry]).unwrap();
        assert_eq!(bundle.data.len(), 24);

        let unpacked = bundle.unpack().unwrap();
        let first = unpacked[0].indices.as_ref().unwrap().data.as_typed().unwrap();
        let second = unpacked[1].indices.as_ref().unwrap().data.as_typed().unwrap();
        assert_eq!(first.as_bytes().as_ptr(), second.as_bytes().as_ptr());
        assert_eq!(first.to_vec::<u8>(), second.to_vec::<u8>());
    }

    #[test]
    fn test_shared_buffer_with_different_layout() {
        let shared = TypedArray::shared(&[0.0f32; 12]);
        let positions = Geometry::new().with_attribute("aPos", Attribute::raw(Arc::clone(&shared), 3));
        let mut interleaved = RawAttribute::new(Arc::clone(&shared), 2);
        interleaved.stride = Some(16);
        let other = Geometry::new().with_attribute("aPos", Attribute::Raw(interleaved));

        let bundle = pack_geometries(&[positions, other]).unwrap();
        assert_eq!(bundle.data.len(), 48);

        let sizes: Vec<_> = bundle
            .geometries
            .iter()
            .map(|g| g.attributes["aPos"].as_raw().unwrap().size)
            .collect();
        assert_eq!(sizes, vec![3, 2]);
        assert_eq!(
            bundle.geometries[1].attributes["aPos"].as_raw().unwrap().stride,
            Some(16)
        );
    }

    #[test]
    fn test_buffer_starts_are_aligned() {
        let geometries: Vec<GeometrySource> = (1..6u8)
            .map(|n| {
                let values: Vec<u8> = (0..n).collect();
                Geometry::new().with_attribute("a", Attribute::raw(TypedArray::shared(&values), 1))
            })
            .collect();
        let bundle = pack_geometries(&geometries).unwrap();

        for geometry in &bundle.geometries {
            let pointer = geometry.attributes["a"].as_raw().unwrap().data.as_pointer().unwrap();
            assert_eq!(pointer.byte_offset as usize % TYPED_ALIGNMENT, 0);
        }
        // 1..=5 bytes each padded to 4 or 8
        assert_eq!(bundle.data.len(), 4 + 4 + 4 + 4 + 8);
    }

    #[test]
    fn test_missing_indices_stay_absent() {
        let geometry = Geometry::new().with_attribute("a", Attribute::raw(TypedArray::shared(&[1i16]), 1));
        let bundle = pack_geometries(&[geometry]).unwrap();
        assert!(bundle.geometries[0].indices.is_none());

        let json: serde_json::Value = serde_json::from_str(&bundle.descriptor_json().unwrap()).unwrap();
        assert!(json["geometries"][0].get("indices").is_none());
    }

    #[test]
    fn test_descriptor_json_shape() {
        let bundle = pack_geometries(&[quad()]).unwrap();
        let json: serde_json::Value = serde_json::from_str(&bundle.descriptor_json().unwrap()).unwrap();

        assert_eq!(json["version"], "1.0");
        assert_eq!(json["geometries"][0]["indices"]["data"], json!([20, [0, 0, 6, "u8"]]));
        assert_eq!(
            json["geometries"][0]["attributes"]["aPoint"]["data"],
            json!([20, [0, 8, 16, "f32"]])
        );
        assert_eq!(json["geometries"][0]["drawCount"], 6);
    }

    #[test]
    fn test_legacy_index_key() {
        let bundle = pack_geometries(&[quad()]).unwrap();
        let legacy = json!({
            "version": "1.0",
            "geometries": [{
                "attributes": {},
                "index": { "data": [20, [0, 0, 6, "u8"]] },
                "drawCount": 6
            }]
        });

        let restored =
            GeometryBundle::from_descriptor_json(&legacy.to_string(), bundle.data.clone()).unwrap();
        let unpacked = restored.unpack().unwrap();
        let from_legacy = unpacked[0].indices.as_ref().unwrap().data.as_typed().unwrap();

        let current = bundle.unpack().unwrap();
        let from_current = current[0].indices.as_ref().unwrap().data.as_typed().unwrap();
        assert_eq!(from_legacy.to_vec::<u8>(), from_current.to_vec::<u8>());
    }

    #[test]
    fn test_descriptor_without_indices() {
        let descriptor: GeometryDescriptor = serde_json::from_value(json!({
            "attributes": { "a": { "data": [20, [0, 0, 4, "f32"]], "size": 1 } },
            "drawCount": 1
        }))
        .unwrap();
        assert!(descriptor.indices.is_none());
        assert_eq!(descriptor.mode, MODE_TRIANGLES);

        let restored = GeometryBundle::from_descriptor_json(
            r#"{"version":"1.0","geometries":[{"attributes":{}}]}"#,
            PackedBuffer::default(),
        )
        .unwrap();
        assert!(restored.geometries[0].indices.is_none());
    }

    #[test]
    fn test_alias_to_missing_attribute_is_rejected() {
        let dangling = quad().with_attribute("aUV", Attribute::alias("aMissing", 2, 0));
        let err = pack_geometries(&[quad(), dangling]).unwrap_err();
        assert!(matches!(
            err,
            PackError::UnknownAliasSource { geometry: 1, ref attribute, ref data_source }
                if attribute == "aUV" && data_source == "aMissing"
        ));

        let chained = quad()
            .with_attribute("aUV", Attribute::alias("aPoint", 2, 0))
            .with_attribute("aUV2", Attribute::alias("aUV", 2, 0));
        assert!(matches!(
            pack_geometries(&[chained]),
            Err(PackError::UnknownAliasSource { geometry: 0, .. })
        ));
    }

    #[test]
    fn test_inline_attribute_passes_through() {
        let descriptor: GeometryDescriptor = serde_json::from_value(json!({
            "attributes": {
                "aColor": { "data": [0.5, 0.5, 0.5], "size": 3 },
                "aUV": { "dataSource": "aColor", "size": 2, "offset": 4 }
            }
        }))
        .unwrap();

        let unpacked = unpack_geometry(&descriptor, &[]).unwrap();
        let color = unpacked.attributes["aColor"].as_raw().unwrap();
        assert_eq!(color.data.as_inline(), Some(&json!([0.5, 0.5, 0.5])));
        assert!(matches!(unpacked.attributes["aUV"], Attribute::Alias(_)));
    }

    #[test]
    fn test_descriptor_json_round_trip() {
        let bundle = pack_geometries(&[quad()]).unwrap();
        let json = bundle.descriptor_json().unwrap();
        let restored = GeometryBundle::from_descriptor_json(&json, bundle.data.clone()).unwrap();
        assert_eq!(restored, bundle);
    }

    #[test]
    fn test_rejects_unknown_version() {
        let json = r#"{"version":"2.0","geometries":[]}"#;
        assert!(matches!(
            GeometryBundle::from_descriptor_json(json, PackedBuffer::default()),
            Err(ArchiveError::UnsupportedVersion { .. })
        ));
    }
}
