//! Texture packer and unpacker
//!
//! 2D textures reference a shared `images[]` table; the same URL (or the same
//! in-memory allocation) always lands in one slot. Cube maps get a private
//! bin each: every face of every mipmap level is concatenated into that bin
//! and the descriptor keeps one pointer per face.
//!
//! All fetches for a call are issued before any layout work starts, and the
//! layout is computed in input order once every fetch has resolved.

mod fetch;
mod jobs;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use hashbrown::HashMap;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::FORMAT_VERSION;
use crate::error::{ArchiveError, PackError, ReconstructError};
use crate::pointer::BinaryPointer;
use crate::reconstruct::pointer_bytes;
use crate::registry::to_u32;
use crate::remap::{Remapped, remap_aligned};
use crate::typed::PackedBuffer;

#[cfg(feature = "http")]
pub use fetch::HttpFetcher;
pub use fetch::{AssetFetcher, FetchFuture, FileFetcher, ImageFetcher, MemoryFetcher, rasterize_png};

use jobs::FetchRegistry;

/// `GL_TEXTURE_2D`
pub const TEXTURE_2D: u32 = 3553;

/// `GL_TEXTURE_CUBE_MAP`
pub const TEXTURE_CUBE_MAP: u32 = 34067;

/// Faces per cube-map level (+X, -X, +Y, -Y, +Z, -Z)
pub const CUBE_FACES: usize = 6;

/// Cube faces are opaque encoded images and are packed back to back
const CUBE_ALIGNMENT: usize = 1;

/// Where the bytes of one image come from
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Resolved through the [`ImageFetcher`]
    Url(String),
    /// Already-encoded image file bytes
    Encoded(Arc<Vec<u8>>),
    /// Decoded pixels, encoded to PNG during packing
    Pixels(Arc<RgbaImage>),
}

impl ImageSource {
    pub fn url(url: impl Into<String>) -> Self {
        ImageSource::Url(url.into())
    }

    pub fn encoded(bytes: Vec<u8>) -> Self {
        ImageSource::Encoded(Arc::new(bytes))
    }

    pub fn pixels(image: RgbaImage) -> Self {
        ImageSource::Pixels(Arc::new(image))
    }

    fn from_face(value: &Value) -> Option<Self> {
        match value {
            Value::String(url) => Some(Self::url(url.as_str())),
            Value::Object(face) => face.get("url").and_then(Value::as_str).map(Self::url),
            _ => None,
        }
    }
}

/// Image data of one texture
#[derive(Debug, Clone)]
pub enum TextureSource {
    Image(ImageSource),
    /// Mipmap levels in order, each with six faces
    Cube { mipmaps: Vec<[ImageSource; CUBE_FACES]> },
}

/// One texture handed to [`pack_textures`]
#[derive(Debug, Clone)]
pub struct TextureInput {
    pub source: TextureSource,
    /// Sampler and format parameters, copied to the descriptor untouched
    pub params: Map<String, Value>,
}

impl TextureInput {
    pub fn image(source: ImageSource) -> Self {
        Self {
            source: TextureSource::Image(source),
            params: Map::new(),
        }
    }

    pub fn cube(mipmaps: Vec<[ImageSource; CUBE_FACES]>) -> Self {
        Self {
            source: TextureSource::Cube { mipmaps },
            params: Map::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Parse a texture from its JSON form.
    ///
    /// Accepted shapes:
    /// - `{ "image": "url", ... }` (`"url"` is accepted as a legacy key)
    /// - `{ "target": 34067, "mipmaps": [[face; 6], ...], ... }`
    /// - `{ "cube": [face; 6], ... }` (single-level shorthand)
    ///
    /// Faces are URL strings or `{ "url": ... }` objects. Everything else in
    /// the object is kept as a parameter.
    pub fn from_value(index: usize, value: &Value) -> Result<Self, PackError> {
        let unsupported = |reason: &str| PackError::UnsupportedTextureSource {
            index,
            reason: reason.to_string(),
        };

        let mut params = value
            .as_object()
            .cloned()
            .ok_or_else(|| unsupported("texture must be an object"))?;

        if params.contains_key("mipmaps") && params.contains_key("cube") {
            return Err(unsupported("both mipmaps and cube given"));
        }

        if let Some(levels) = params.remove("mipmaps") {
            if let Some(target) = params.remove("target")
                && target.as_u64() != Some(u64::from(TEXTURE_CUBE_MAP))
            {
                return Err(unsupported("mipmaps are only supported for cube-map targets"));
            }
            params.remove("sourceType");

            let levels = levels
                .as_array()
                .ok_or_else(|| unsupported("mipmaps must be an array of levels"))?;
            if levels.is_empty() {
                return Err(unsupported("cube texture has no mipmap levels"));
            }
            let mipmaps = levels
                .iter()
                .map(|level| {
                    parse_faces(level)
                        .ok_or_else(|| unsupported("each mipmap level needs six faces"))
                })
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Self {
                source: TextureSource::Cube { mipmaps },
                params,
            });
        }

        if let Some(faces) = params.remove("cube") {
            let faces = parse_faces(&faces).ok_or_else(|| unsupported("cube needs six faces"))?;
            params.remove("target");
            return Ok(Self {
                source: TextureSource::Cube {
                    mipmaps: vec![faces],
                },
                params,
            });
        }

        let image = match params.remove("image") {
            Some(image) => image,
            None => match params.remove("url") {
                Some(url) => {
                    tracing::warn!(index, "texture uses legacy 'url' key; use 'image'");
                    url
                }
                None => return Err(unsupported("no image or cube source")),
            },
        };
        let source = ImageSource::from_face(&image)
            .ok_or_else(|| unsupported("image must be a URL string or {url}"))?;

        Ok(Self {
            source: TextureSource::Image(source),
            params,
        })
    }
}

fn parse_faces(value: &Value) -> Option<[ImageSource; CUBE_FACES]> {
    let faces = value.as_array()?;
    if faces.len() != CUBE_FACES {
        return None;
    }
    let faces = faces
        .iter()
        .map(ImageSource::from_face)
        .collect::<Option<Vec<_>>>()?;
    faces.try_into().ok()
}

/// Packed 2D texture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageTextureDescriptor {
    /// Index into the bundle's `images`
    pub source: u32,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Cube,
}

/// Packed cube-map texture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CubeTextureDescriptor {
    pub target: u32,
    pub source_type: SourceType,
    /// One pointer per face per level, all into this texture's bin
    pub mipmaps: Vec<[BinaryPointer; CUBE_FACES]>,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl CubeTextureDescriptor {
    /// Bin shared by every face pointer
    pub fn bin_index(&self) -> Option<u32> {
        self.mipmaps.first().map(|level| level[0].buffer_index)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TextureDescriptor {
    Cube(CubeTextureDescriptor),
    Image(ImageTextureDescriptor),
}

/// Texture resolved against a bundle's images and bins
#[derive(Debug, Clone, PartialEq)]
pub enum UnpackedTexture<'a> {
    Image {
        bytes: &'a [u8],
        params: &'a Map<String, Value>,
    },
    Cube {
        mipmaps: Vec<[&'a [u8]; CUBE_FACES]>,
        params: &'a Map<String, Value>,
    },
}

/// Result of packing a texture list
#[derive(Debug, Clone, PartialEq)]
pub struct TextureBundle {
    pub version: String,
    /// Deduplicated 2D image bytes
    pub images: Vec<Vec<u8>>,
    /// One concatenated face bin per cube texture
    pub bins: Vec<PackedBuffer>,
    pub textures: Vec<TextureDescriptor>,
}

#[derive(Serialize)]
struct TextureManifestRef<'a> {
    version: &'a str,
    textures: &'a [TextureDescriptor],
}

#[derive(Deserialize)]
struct TextureManifest {
    version: String,
    textures: Vec<TextureDescriptor>,
}

impl TextureBundle {
    /// Descriptor tree as JSON (`{ version, textures }`)
    pub fn descriptor_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&TextureManifestRef {
            version: &self.version,
            textures: &self.textures,
        })
    }

    /// Rebuild a bundle from its JSON descriptor tree, images and bins
    pub fn from_descriptor_json(
        json: &str,
        images: Vec<Vec<u8>>,
        bins: Vec<PackedBuffer>,
    ) -> Result<Self, ArchiveError> {
        let manifest: TextureManifest = serde_json::from_str(json)?;
        if manifest.version != FORMAT_VERSION {
            return Err(ArchiveError::UnsupportedVersion {
                found: manifest.version,
                expected: FORMAT_VERSION,
            });
        }
        Ok(Self {
            version: manifest.version,
            images,
            bins,
            textures: manifest.textures,
        })
    }

    pub fn unpack(&self) -> Result<Vec<UnpackedTexture<'_>>, ReconstructError> {
        unpack_textures(&self.textures, &self.images, &self.bins)
    }
}

/// Resolve packed descriptors to image bytes and per-face byte slices
pub fn unpack_textures<'a>(
    textures: &'a [TextureDescriptor],
    images: &'a [Vec<u8>],
    bins: &'a [PackedBuffer],
) -> Result<Vec<UnpackedTexture<'a>>, ReconstructError> {
    textures
        .iter()
        .map(|texture| match texture {
            TextureDescriptor::Image(image) => {
                let bytes = images
                    .get(image.source as usize)
                    .ok_or(ReconstructError::UnknownImage {
                        index: image.source,
                        count: images.len(),
                    })?;
                Ok(UnpackedTexture::Image {
                    bytes,
                    params: &image.params,
                })
            }
            TextureDescriptor::Cube(cube) => {
                let mut mipmaps = Vec::with_capacity(cube.mipmaps.len());
                for level in &cube.mipmaps {
                    let mut faces: [&'a [u8]; CUBE_FACES] = [&[] as &[u8]; CUBE_FACES];
                    for (face, pointer) in faces.iter_mut().zip(level) {
                        *face = pointer_bytes(bins, pointer)?;
                    }
                    mipmaps.push(faces);
                }
                Ok(UnpackedTexture::Cube {
                    mipmaps,
                    params: &cube.params,
                })
            }
        })
        .collect()
}

enum Plan {
    Image(usize),
    Cube(Vec<[usize; CUBE_FACES]>),
}

/// Pack a list of textures.
///
/// Every image and face is fetched concurrently through `fetcher`; a single
/// failure fails the whole call. Layout starts only after all fetches have
/// resolved and follows input order.
pub async fn pack_textures(
    inputs: &[TextureInput],
    fetcher: Arc<dyn ImageFetcher>,
) -> Result<TextureBundle, PackError> {
    let mut registry = FetchRegistry::new();
    let mut plans = Vec::with_capacity(inputs.len());

    for (index, input) in inputs.iter().enumerate() {
        let plan = match &input.source {
            TextureSource::Image(source) => Plan::Image(registry.schedule(source)),
            TextureSource::Cube { mipmaps } if mipmaps.is_empty() => {
                return Err(PackError::UnsupportedTextureSource {
                    index,
                    reason: "cube texture has no mipmap levels".to_string(),
                });
            }
            TextureSource::Cube { mipmaps } => {
                let mut levels = Vec::with_capacity(mipmaps.len());
                for level in mipmaps {
                    let mut jobs = [0usize; CUBE_FACES];
                    for (job, face) in jobs.iter_mut().zip(level) {
                        *job = registry.schedule(face);
                    }
                    levels.push(jobs);
                }
                Plan::Cube(levels)
            }
        };
        plans.push(plan);
    }

    let jobs = registry.len();
    let results = registry.run(fetcher).await?;

    let mut images = Vec::new();
    let mut image_slots: HashMap<usize, u32> = HashMap::new();
    let mut bins = Vec::new();
    let mut textures = Vec::with_capacity(inputs.len());

    for (input, plan) in inputs.iter().zip(plans) {
        match plan {
            Plan::Image(job) => {
                let source = match image_slots.get(&job) {
                    Some(&slot) => slot,
                    None => {
                        let slot = to_u32(images.len())?;
                        images.push(results[job].as_ref().clone());
                        image_slots.insert(job, slot);
                        slot
                    }
                };
                textures.push(TextureDescriptor::Image(ImageTextureDescriptor {
                    source,
                    params: input.params.clone(),
                }));
            }
            Plan::Cube(levels) => {
                let bin_index = to_u32(bins.len())?;
                let faces: Vec<Arc<Vec<u8>>> = levels
                    .iter()
                    .flatten()
                    .map(|&job| Arc::clone(&results[job]))
                    .collect();

                let Remapped { data, pointers } = remap_aligned(&faces, None, CUBE_ALIGNMENT)?;
                let mipmaps: Vec<[BinaryPointer; CUBE_FACES]> = pointers
                    .chunks_exact(CUBE_FACES)
                    .map(|level| {
                        std::array::from_fn(|face| BinaryPointer {
                            buffer_index: bin_index,
                            ..level[face]
                        })
                    })
                    .collect();

                tracing::debug!(
                    bin = bin_index,
                    levels = levels.len(),
                    bytes = data.len(),
                    "packed cube map"
                );

                bins.push(data);
                textures.push(TextureDescriptor::Cube(CubeTextureDescriptor {
                    target: TEXTURE_CUBE_MAP,
                    source_type: SourceType::Cube,
                    mipmaps,
                    params: input.params.clone(),
                }));
            }
        }
    }

    tracing::info!(
        textures = inputs.len(),
        jobs,
        images = images.len(),
        bins = bins.len(),
        "packed textures"
    );

    Ok(TextureBundle {
        version: FORMAT_VERSION.to_string(),
        images,
        bins,
        textures,
    })
}
