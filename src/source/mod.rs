//! Producer-side frame sources.
//!
//! A source yields decoded frames in order until it is exhausted. Sources only
//! read local paths; they never fetch URLs.

mod dir;
#[cfg(feature = "ingest-file-ffmpeg")]
mod video_ffmpeg;

use std::path::Path;

use anyhow::{anyhow, Result};
use image::DynamicImage;

pub use dir::ImageDirSource;
#[cfg(feature = "ingest-file-ffmpeg")]
pub use video_ffmpeg::VideoFileSource;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_read: u64,
    pub frames_skipped: u64,
}

pub trait FrameSource {
    /// Human-readable origin, for logs.
    fn describe(&self) -> String;

    /// Next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<DynamicImage>>;

    fn stats(&self) -> SourceStats;
}

/// Pick a source for a local path: a directory of images, or a video file
/// when FFmpeg support is compiled in.
pub fn open_source(path: &str) -> Result<Box<dyn FrameSource>> {
    if !is_local_path(path) {
        return Err(anyhow!(
            "frame sources only support local paths (no URL schemes): {}",
            path
        ));
    }
    let path = Path::new(path);
    if path.is_dir() {
        return Ok(Box::new(ImageDirSource::open(path)?));
    }
    if !path.is_file() {
        return Err(anyhow!("{} does not exist", path.display()));
    }
    #[cfg(feature = "ingest-file-ffmpeg")]
    {
        Ok(Box::new(VideoFileSource::open(path)?))
    }
    #[cfg(not(feature = "ingest-file-ffmpeg"))]
    {
        Err(anyhow!(
            "video input {} requires the ingest-file-ffmpeg feature",
            path.display()
        ))
    }
}

fn is_local_path(path: &str) -> bool {
    !path.trim().is_empty() && !path.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_rejected() {
        assert!(open_source("rtsp://camera/stream").is_err());
        assert!(open_source("  ").is_err());
    }

    #[test]
    fn directories_open_as_image_sources() {
        let dir = tempfile::tempdir().unwrap();
        let source = open_source(dir.path().to_str().unwrap()).unwrap();
        assert!(source.describe().contains(dir.path().to_str().unwrap()));
    }

    #[test]
    fn missing_paths_fail() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.mp4");
        assert!(open_source(missing.to_str().unwrap()).is_err());
    }
}
