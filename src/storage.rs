use anyhow::{Context, Result};
use image::RgbImage;
use std::path::{Path, PathBuf};

/// Destination for accepted crops.
///
/// Indices are 1-based: `image_index` is the position of the source in the
/// corpus, `crop_index` the position of the crop among that image's accepted
/// crops.
pub trait CropSink {
    fn save_crop(&mut self, image_index: usize, crop_index: usize, crop: &RgbImage) -> Result<()>;

    /// Whether diagnostic overlays should be produced at all.
    fn wants_debug(&self) -> bool {
        false
    }

    fn save_debug(&mut self, _image_index: usize, _overlay: &RgbImage) -> Result<()> {
        Ok(())
    }
}

pub fn crop_file_name(image_index: usize, crop_index: usize) -> String {
    format!("_{}_{}.jpg", image_index, crop_index)
}

pub fn debug_file_name(image_index: usize) -> String {
    format!("_{}_debug.jpg", image_index)
}

/// Writes crops as JPEG files into a directory.
pub struct CropWriter {
    save_dir: PathBuf,
    debug_dir: Option<PathBuf>,
}

impl CropWriter {
    /// Creates the save directory (and debug directory, if any) when missing.
    pub fn create(save_dir: &Path, debug_dir: Option<&Path>) -> Result<Self> {
        std::fs::create_dir_all(save_dir)
            .with_context(|| format!("creating {}", save_dir.display()))?;
        if let Some(dir) = debug_dir {
            std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        Ok(Self {
            save_dir: save_dir.to_path_buf(),
            debug_dir: debug_dir.map(Path::to_path_buf),
        })
    }

    pub fn crop_path(&self, image_index: usize, crop_index: usize) -> PathBuf {
        self.save_dir.join(crop_file_name(image_index, crop_index))
    }
}

impl CropSink for CropWriter {
    fn save_crop(&mut self, image_index: usize, crop_index: usize, crop: &RgbImage) -> Result<()> {
        let path = self.crop_path(image_index, crop_index);
        crop.save(&path)
            .with_context(|| format!("writing {}", path.display()))
    }

    fn wants_debug(&self) -> bool {
        self.debug_dir.is_some()
    }

    fn save_debug(&mut self, image_index: usize, overlay: &RgbImage) -> Result<()> {
        let Some(dir) = &self.debug_dir else {
            return Ok(());
        };
        let path = dir.join(debug_file_name(image_index));
        overlay
            .save(&path)
            .with_context(|| format!("writing {}", path.display()))
    }
}
