use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::DynamicImage;

use super::{FrameSource, SourceStats};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Still images from a directory, in file-name order.
///
/// Files that fail to decode are skipped with a warning so one bad file does
/// not end the stream.
pub struct ImageDirSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    next: usize,
    stats: SourceStats,
}

impl ImageDirSource {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)
            .with_context(|| format!("failed to list {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && has_image_extension(path))
            .collect();
        files.sort();
        log::info!("image source {}: {} file(s)", dir.display(), files.len());
        Ok(Self {
            dir,
            files,
            next: 0,
            stats: SourceStats::default(),
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for ImageDirSource {
    fn describe(&self) -> String {
        format!("image directory {}", self.dir.display())
    }

    fn next_frame(&mut self) -> Result<Option<DynamicImage>> {
        while let Some(path) = self.files.get(self.next) {
            self.next += 1;
            match image::open(path) {
                Ok(image) => {
                    self.stats.frames_read += 1;
                    return Ok(Some(image));
                }
                Err(err) => {
                    self.stats.frames_skipped += 1;
                    log::warn!("skipping {}: {}", path.display(), err);
                }
            }
        }
        Ok(None)
    }

    fn stats(&self) -> SourceStats {
        self.stats.clone()
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
