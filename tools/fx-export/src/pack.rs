//! Pack command: manifest -> `.fxbin` archives

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use fx_common::texture::{AssetFetcher, FileFetcher, ImageFetcher};
use fx_common::{
    FX_ARCHIVE_FORMAT, FxArchive, GeometrySource, ImageSource, TextureInput, TextureSource,
    pack_geometries, pack_textures,
};

use crate::geometry_file::GeometryFile;
use crate::manifest::ManifestContext;

/// What a pack run produced
#[derive(Debug, Default)]
pub struct PackReport {
    pub geometry_archive: Option<PathBuf>,
    pub texture_archive: Option<PathBuf>,
    pub geometries: usize,
    pub geometry_bytes: usize,
    pub textures: usize,
    pub images: usize,
    pub bins: usize,
}

/// What a check run found
#[derive(Debug, Default)]
pub struct CheckReport {
    pub geometries: usize,
    pub textures: usize,
    pub remote_urls: usize,
}

/// Load every geometry file named in the manifest
pub fn load_geometries(ctx: &ManifestContext) -> Result<Vec<GeometrySource>> {
    let mut sources = Vec::new();
    for path in ctx.geometry_paths() {
        let file = GeometryFile::load(&path)?;
        let loaded = file
            .into_sources()
            .with_context(|| format!("Invalid geometry file: {}", path.display()))?;
        tracing::debug!(path = %path.display(), geometries = loaded.len(), "loaded geometry file");
        sources.extend(loaded);
    }
    Ok(sources)
}

/// Load every texture file named in the manifest.
///
/// Texture indices in errors count across all files, in manifest order.
pub fn load_textures(ctx: &ManifestContext) -> Result<Vec<TextureInput>> {
    let mut inputs = Vec::new();
    for path in ctx.texture_paths() {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read texture file: {}", path.display()))?;
        let values: Vec<serde_json::Value> = serde_json::from_str(&content)
            .with_context(|| format!("Texture file must be a JSON array: {}", path.display()))?;

        for value in &values {
            let input = TextureInput::from_value(inputs.len(), value)
                .with_context(|| format!("Invalid texture in {}", path.display()))?;
            inputs.push(input);
        }
    }
    Ok(inputs)
}

fn image_urls(input: &TextureInput) -> Vec<&str> {
    let sources: Vec<&ImageSource> = match &input.source {
        TextureSource::Image(source) => vec![source],
        TextureSource::Cube { mipmaps } => mipmaps.iter().flatten().collect(),
    };
    sources
        .into_iter()
        .filter_map(|source| match source {
            ImageSource::Url(url) => Some(url.as_str()),
            _ => None,
        })
        .collect()
}

fn is_remote(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn build_fetcher(ctx: &ManifestContext) -> Result<Arc<dyn ImageFetcher>> {
    let fetcher = AssetFetcher::local(ctx.asset_root());

    #[cfg(feature = "http")]
    let fetcher = if ctx.manifest.assets.allow_http {
        fetcher.with_http(
            fx_common::texture::HttpFetcher::new().context("Failed to create HTTP client")?,
        )
    } else {
        fetcher
    };

    Ok(Arc::new(fetcher))
}

fn write_archive(path: &Path, archive: &FxArchive) -> Result<()> {
    let bytes = archive.to_bytes();
    std::fs::write(path, &bytes)
        .with_context(|| format!("Failed to write archive: {}", path.display()))?;
    tracing::info!("Wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

/// Archive path for one kind of output
pub fn archive_path(output_dir: &Path, name: &str, kind: &str) -> PathBuf {
    output_dir.join(format!("{name}.{kind}.{}", FX_ARCHIVE_FORMAT.extension))
}

/// Pack every asset in the manifest and write the archives
pub fn pack(ctx: &ManifestContext, output_override: Option<&Path>) -> Result<PackReport> {
    let output_dir = ctx.output_dir(output_override);
    let name = &ctx.manifest.package.name;
    let mut report = PackReport::default();

    let geometries = load_geometries(ctx)?;
    let textures = load_textures(ctx)?;

    if !geometries.is_empty() || !textures.is_empty() {
        std::fs::create_dir_all(&output_dir).with_context(|| {
            format!("Failed to create output directory: {}", output_dir.display())
        })?;
    }

    if !geometries.is_empty() {
        let bundle = pack_geometries(&geometries).context("Failed to pack geometries")?;
        let path = archive_path(&output_dir, name, "geometry");
        write_archive(&path, &bundle.to_archive()?)?;

        report.geometries = bundle.geometries.len();
        report.geometry_bytes = bundle.data.len();
        report.geometry_archive = Some(path);
    }

    if !textures.is_empty() {
        let fetcher = build_fetcher(ctx)?;
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to create async runtime")?;
        let bundle = rt
            .block_on(pack_textures(&textures, fetcher))
            .context("Failed to pack textures")?;

        let path = archive_path(&output_dir, name, "textures");
        write_archive(&path, &bundle.to_archive()?)?;

        report.textures = bundle.textures.len();
        report.images = bundle.images.len();
        report.bins = bundle.bins.len();
        report.texture_archive = Some(path);
    }

    Ok(report)
}

/// Validate the manifest and every input without writing anything
pub fn check(ctx: &ManifestContext) -> Result<CheckReport> {
    let geometries = load_geometries(ctx)?;
    let textures = load_textures(ctx)?;

    let files = FileFetcher::new(ctx.asset_root());
    let mut remote_urls = 0;
    for (index, input) in textures.iter().enumerate() {
        for url in image_urls(input) {
            if is_remote(url) {
                if !ctx.manifest.assets.allow_http {
                    anyhow::bail!("Texture {index}: '{url}' is remote but assets.allow_http is false");
                }
                remote_urls += 1;
                continue;
            }
            let path = files.resolve(url);
            if !path.is_file() {
                anyhow::bail!("Texture {index}: image not found: {}", path.display());
            }
        }
    }

    Ok(CheckReport {
        geometries: geometries.len(),
        textures: textures.len(),
        remote_urls,
    })
}
