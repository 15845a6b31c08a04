//! fxpack.toml manifest parsing

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// fxpack.toml manifest structure
#[derive(Debug, Deserialize)]
pub struct FxManifest {
    pub package: PackageSection,
    #[serde(default)]
    pub assets: AssetsSection,
}

/// Package metadata section
#[derive(Debug, Deserialize)]
pub struct PackageSection {
    /// Base name of the written archives
    pub name: String,

    /// Output directory, relative to the manifest.
    /// Default: "build"
    #[serde(default = "default_output")]
    pub output: String,
}

fn default_output() -> String {
    "build".to_string()
}

/// Asset inputs
#[derive(Debug, Default, Deserialize)]
pub struct AssetsSection {
    /// Directory texture URLs are resolved against, relative to the manifest.
    /// Default: the manifest directory
    #[serde(default)]
    pub root: Option<String>,

    /// Allow `http(s)://` texture URLs.
    /// Default: false
    #[serde(default)]
    pub allow_http: bool,

    /// Geometry JSON files
    #[serde(default)]
    pub geometries: Vec<String>,

    /// Texture JSON files (each an array of texture objects)
    #[serde(default)]
    pub textures: Vec<String>,
}

impl FxManifest {
    /// Load manifest from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse manifest from string
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse fxpack.toml")
    }

    /// Validate manifest fields
    pub fn validate(&self) -> Result<()> {
        let name = &self.package.name;
        if name.is_empty() {
            anyhow::bail!("package.name cannot be empty in fxpack.toml");
        }
        if name.contains(['/', '\\']) {
            anyhow::bail!("Invalid package.name '{}' in fxpack.toml (must not contain path separators)", name);
        }

        if self.assets.geometries.is_empty() && self.assets.textures.is_empty() {
            tracing::warn!("fxpack.toml declares no geometries or textures; nothing will be packed");
        }

        #[cfg(not(feature = "http"))]
        if self.assets.allow_http {
            anyhow::bail!("assets.allow_http requires fx-export to be built with the 'http' feature");
        }

        Ok(())
    }
}

/// Loaded manifest plus the directory it lives in
pub struct ManifestContext {
    pub manifest: FxManifest,
    pub project_dir: PathBuf,
}

impl ManifestContext {
    /// Directory texture URLs are resolved against
    pub fn asset_root(&self) -> PathBuf {
        match &self.manifest.assets.root {
            Some(root) => self.project_dir.join(root),
            None => self.project_dir.clone(),
        }
    }

    /// Output directory, unless overridden on the command line
    pub fn output_dir(&self, override_dir: Option<&Path>) -> PathBuf {
        match override_dir {
            Some(dir) => dir.to_path_buf(),
            None => self.project_dir.join(&self.manifest.package.output),
        }
    }

    pub fn geometry_paths(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.manifest
            .assets
            .geometries
            .iter()
            .map(|path| self.project_dir.join(path))
    }

    pub fn texture_paths(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.manifest
            .assets
            .textures
            .iter()
            .map(|path| self.project_dir.join(path))
    }
}

pub fn load_manifest(manifest_path: &Path) -> Result<ManifestContext> {
    let manifest = FxManifest::load(manifest_path)?;
    manifest.validate()?;

    let project_dir = manifest_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();

    Ok(ManifestContext {
        manifest,
        project_dir,
    })
}
