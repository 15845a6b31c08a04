//! Inspect command: human-readable archive summary

use std::fmt::Write;
use std::path::Path;

use anyhow::{Context, Result};
use fx_common::{
    ArchiveKind, Attribute, FxArchive, GeometryBundle, Reconstructed, TextureBundle,
    UnpackedTexture,
};

pub fn load_archive(path: &Path) -> Result<FxArchive> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read archive: {}", path.display()))?;
    FxArchive::from_bytes(&bytes).with_context(|| format!("Invalid archive: {}", path.display()))
}

fn describe(data: &Reconstructed<'_>) -> String {
    match data {
        Reconstructed::Typed(view) => format!("{} x {}", view.len(), view.element_type()),
        Reconstructed::Bytes(bytes) => format!("{} bytes", bytes.len()),
        Reconstructed::Inline(_) => "inline".to_string(),
    }
}

/// Summarize an archive; with `descriptor`, append the pretty-printed JSON tree
pub fn summarize(archive: &FxArchive, descriptor: bool) -> Result<String> {
    let mut out = String::new();
    writeln!(out, "Kind: {} (version {})", archive.kind, archive.version)?;
    writeln!(out, "Payload: {} bytes", archive.payload_len())?;

    match archive.kind {
        ArchiveKind::Geometry => {
            let bundle = GeometryBundle::from_archive(archive)?;
            let geometries = bundle.unpack()?;
            writeln!(out, "Data buffer: {} bytes", bundle.data.len())?;
            writeln!(out, "Geometries: {}", geometries.len())?;
            for (index, geometry) in geometries.iter().enumerate() {
                writeln!(
                    out,
                    "  [{index}] mode {} draw {}+{}",
                    geometry.mode, geometry.draw_start, geometry.draw_count
                )?;
                if let Some(indices) = &geometry.indices {
                    writeln!(out, "    indices: {}", describe(&indices.data))?;
                }
                for (name, attribute) in &geometry.attributes {
                    match attribute {
                        Attribute::Raw(raw) => {
                            writeln!(out, "    {name}: {} (size {})", describe(&raw.data), raw.size)?
                        }
                        Attribute::Alias(alias) => writeln!(
                            out,
                            "    {name}: -> {} (size {}, offset {})",
                            alias.data_source, alias.size, alias.offset
                        )?,
                    }
                }
            }
        }
        ArchiveKind::Texture => {
            let bundle = TextureBundle::from_archive(archive)?;
            let textures = bundle.unpack()?;
            writeln!(out, "Images: {}", bundle.images.len())?;
            writeln!(out, "Cube bins: {}", bundle.bins.len())?;
            writeln!(out, "Textures: {}", textures.len())?;
            for (index, texture) in textures.iter().enumerate() {
                match texture {
                    UnpackedTexture::Image { bytes, .. } => {
                        writeln!(out, "  [{index}] 2D, {} bytes", bytes.len())?
                    }
                    UnpackedTexture::Cube { mipmaps, .. } => {
                        let bytes: usize = mipmaps.iter().flatten().map(|face| face.len()).sum();
                        writeln!(
                            out,
                            "  [{index}] cube, {} levels, {bytes} bytes",
                            mipmaps.len()
                        )?
                    }
                }
            }
        }
    }

    if descriptor {
        let tree: serde_json::Value = serde_json::from_str(&archive.descriptor)?;
        writeln!(out, "{}", serde_json::to_string_pretty(&tree)?)?;
    }

    Ok(out)
}
