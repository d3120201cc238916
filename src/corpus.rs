use anyhow::{Context, Result};
use image::{ImageFormat, RgbImage};
use std::path::{Path, PathBuf};

/// Lists the decodable-looking files directly inside `root`, sorted by path.
///
/// Files are picked by extension; subdirectories are not descended into.
pub fn list_images(root: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        std::fs::read_dir(root).with_context(|| format!("listing {}", root.display()))?;

    let mut images = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("listing {}", root.display()))?
            .path();
        if !path.is_file() {
            continue;
        }
        if ImageFormat::from_path(&path).is_ok() {
            images.push(path);
        } else {
            log::debug!("ignoring {}", path.display());
        }
    }

    images.sort();
    Ok(images)
}

pub fn load_image(path: &Path) -> Result<RgbImage> {
    let image = image::open(path).with_context(|| format!("decoding {}", path.display()))?;
    Ok(image.to_rgb8())
}
