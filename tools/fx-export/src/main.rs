//! fx-export - effect resource export tool
//!
//! Packs geometry and texture inputs listed in `fxpack.toml` into `.fxbin`
//! archives and inspects existing archives.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use fx_export::{inspect, manifest, pack};

#[derive(Parser)]
#[command(name = "fx-export")]
#[command(about = "Effect resource export tool")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack assets from a manifest file
    Pack {
        /// Path to fxpack.toml manifest
        #[arg(default_value = "fxpack.toml")]
        manifest: PathBuf,

        /// Output directory (overrides manifest)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate manifest and inputs without writing archives
    Check {
        /// Path to fxpack.toml manifest
        #[arg(default_value = "fxpack.toml")]
        manifest: PathBuf,
    },

    /// Print a summary of an archive
    Inspect {
        /// Input .fxbin file
        archive: PathBuf,

        /// Also print the descriptor tree
        #[arg(short, long)]
        descriptor: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Pack { manifest, output } => {
            tracing::info!("Packing assets from {:?}", manifest);
            let ctx = manifest::load_manifest(&manifest)?;
            let report = pack::pack(&ctx, output.as_deref())?;
            tracing::info!(
                "Packed {} geometries ({} bytes), {} textures ({} images, {} cube bins)",
                report.geometries,
                report.geometry_bytes,
                report.textures,
                report.images,
                report.bins
            );
        }

        Commands::Check { manifest } => {
            tracing::info!("Checking manifest {:?}", manifest);
            let ctx = manifest::load_manifest(&manifest)?;
            let report = pack::check(&ctx)?;
            tracing::info!(
                "Manifest is valid: {} geometries, {} textures ({} remote images)",
                report.geometries,
                report.textures,
                report.remote_urls
            );
        }

        Commands::Inspect {
            archive,
            descriptor,
        } => {
            let loaded = inspect::load_archive(&archive)?;
            print!("{}", inspect::summarize(&loaded, descriptor)?);
        }
    }

    Ok(())
}
