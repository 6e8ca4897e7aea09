use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use filmstrip_core::encode::encode_jpeg;
use filmstrip_core::identity::RAW_EXTENSIONS;
use filmstrip_core::{
    config, Bitmap, CancellationToken, ColorLabel, Engine, FileIdentity, FlagStatus,
    InMemoryCatalog, LabelUpdate, TargetSize,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "filmstrip")]
#[command(about = "Photo metadata and thumbnail pipeline", long_about = None)]
struct Cli {
    /// Path to a config file (TOML, YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print metadata as JSON
    Meta {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Write a thumbnail as JPEG
    Thumb {
        path: PathBuf,
        /// Output file
        #[arg(short, long)]
        out: PathBuf,
        /// Bounding box edge in pixels
        #[arg(short, long, default_value_t = 256)]
        size: u32,
        #[arg(short, long, default_value_t = 85)]
        quality: u8,
    },
    /// Write the largest embedded preview as JPEG
    Preview {
        path: PathBuf,
        #[arg(short, long)]
        out: PathBuf,
        #[arg(short, long, default_value_t = 90)]
        quality: u8,
    },
    /// Warm the thumbnail cache for files and directories
    Prefetch {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[arg(short, long, default_value_t = 256)]
        size: u32,
    },
    /// Set rating, color label or flag
    Label {
        path: PathBuf,
        /// Star rating 0-5
        #[arg(short, long, value_parser = clap::value_parser!(u8).range(0..=5))]
        rating: Option<u8>,
        /// Color label name, or "none" to clear
        #[arg(long, value_parser = parse_color)]
        color: Option<ColorChoice>,
        /// pick, reject or none
        #[arg(long, value_parser = parse_flag)]
        flag: Option<FlagStatus>,
    },
    /// Drop every cached thumbnail
    ClearCache,
}

/// A color label to set, or `None` to clear it.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ColorChoice(Option<ColorLabel>);

fn parse_color(value: &str) -> Result<ColorChoice, String> {
    if value.eq_ignore_ascii_case("none") {
        return Ok(ColorChoice(None));
    }
    ColorLabel::parse(value)
        .map(|label| ColorChoice(Some(label)))
        .ok_or_else(|| format!("unknown color label '{value}'"))
}

fn parse_flag(value: &str) -> Result<FlagStatus, String> {
    FlagStatus::parse(value).ok_or_else(|| format!("unknown flag '{value}'"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref()).context("load config")?;
    let engine = Engine::from_config(cfg, Arc::new(InMemoryCatalog::new())).context("start engine")?;

    match cli.command {
        Commands::Meta { paths } => run_meta(&engine, &paths),
        Commands::Thumb {
            path,
            out,
            size,
            quality,
        } => {
            let identity = FileIdentity::new(&path);
            let bitmap = engine
                .thumbnail(&identity, TargetSize::square(size), &CancellationToken::new())
                .with_context(|| format!("thumbnail {}", path.display()))?;
            write_jpeg(&bitmap, quality, &out)
        }
        Commands::Preview { path, out, quality } => {
            let bitmap = engine
                .preview(&FileIdentity::new(&path))
                .with_context(|| format!("preview {}", path.display()))?;
            write_jpeg(&bitmap, quality, &out)
        }
        Commands::Prefetch { paths, size } => {
            let identities = collect_files(&paths)?;
            let summary = engine.prefetch(&identities, TargetSize::square(size));
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Commands::Label {
            path,
            rating,
            color,
            flag,
        } => {
            let update = LabelUpdate {
                rating,
                color_label: color.map(|choice| choice.0),
                favorite: None,
                flag_status: flag,
            };
            if update.is_empty() {
                bail!("nothing to change: pass --rating, --color or --flag");
            }
            let identity = FileIdentity::new(&path);
            engine
                .write_labels(&identity, &update)
                .with_context(|| format!("label {}", path.display()))?;
            let record = engine.metadata(&identity)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        Commands::ClearCache => {
            engine.clear_all_caches();
            info!("Cache cleared");
            Ok(())
        }
    }
}

fn run_meta(engine: &Engine, paths: &[PathBuf]) -> Result<()> {
    let identities: Vec<FileIdentity> = paths.iter().map(FileIdentity::new).collect();
    let records = engine.metadata_batch(&identities, &CancellationToken::new())?;

    let mut out = serde_json::Map::new();
    for identity in &identities {
        let value = match records.get(identity.path()) {
            Some(record) => serde_json::to_value(record)?,
            None => serde_json::Value::Null,
        };
        out.insert(identity.path().display().to_string(), value);
    }
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn write_jpeg(bitmap: &Bitmap, quality: u8, out: &Path) -> Result<()> {
    let bytes = encode_jpeg(bitmap, quality).context("encode jpeg")?;
    std::fs::write(out, bytes).with_context(|| format!("write {}", out.display()))?;
    info!(out = %out.display(), width = bitmap.width, height = bitmap.height, "Wrote JPEG");
    Ok(())
}

/// Files named directly, plus the image files directly inside named directories.
fn collect_files(paths: &[PathBuf]) -> Result<Vec<FileIdentity>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(path)
                .with_context(|| format!("read dir {}", path.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_image(p))
                .collect();
            entries.sort();
            files.extend(entries.into_iter().map(FileIdentity::new));
        } else {
            files.push(FileIdentity::new(path));
        }
    }
    Ok(files)
}

fn is_image(path: &Path) -> bool {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    RAW_EXTENSIONS.contains(&ext.as_str())
        || matches!(ext.as_str(), "jpg" | "jpeg" | "png" | "tif" | "tiff" | "webp")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_label_arguments() {
        let cli = Cli::try_parse_from([
            "filmstrip", "label", "a.cr2", "--rating", "3", "--color", "red", "--flag", "pick",
        ])
        .unwrap();
        match cli.command {
            Commands::Label {
                rating, color, flag, ..
            } => {
                assert_eq!(rating, Some(3));
                assert_eq!(color, Some(ColorChoice(Some(ColorLabel::Red))));
                assert_eq!(flag, Some(FlagStatus::Pick));
            }
            _ => panic!("expected label"),
        }
    }

    #[test]
    fn test_label_rejects_out_of_range_rating() {
        assert!(Cli::try_parse_from(["filmstrip", "label", "a.cr2", "--rating", "6"]).is_err());
        assert!(Cli::try_parse_from(["filmstrip", "label", "a.cr2", "--color", "teal"]).is_err());
    }

    #[test]
    fn test_color_none_clears() {
        assert_eq!(parse_color("none"), Ok(ColorChoice(None)));
        assert_eq!(parse_color("Grey"), Ok(ColorChoice(Some(ColorLabel::Gray))));
    }

    #[test]
    fn test_collect_files_expands_directories() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.jpg", "a.NEF", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let files = collect_files(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<String> = files.iter().map(|f| f.file_name()).collect();
        assert_eq!(names, vec!["a.NEF", "b.jpg"]);
    }

    #[test]
    fn test_thumb_defaults() {
        let cli = Cli::try_parse_from(["filmstrip", "thumb", "a.jpg", "--out", "t.jpg"]).unwrap();
        match cli.command {
            Commands::Thumb { size, quality, .. } => {
                assert_eq!(size, 256);
                assert_eq!(quality, 85);
            }
            _ => panic!("expected thumb"),
        }
    }
}
