use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use image::RgbImage;

use crate::codec::FrameCodec;

const PLATES_DIR: &str = "plates";
const FULL_IMAGES_DIR: &str = "full_images";

/// Where the two images of one record were written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub plate_image: PathBuf,
    pub full_image: PathBuf,
}

/// Index-addressed image storage for plate records.
///
/// Files are named `plates/{plate}_{index}.jpg` and
/// `full_images/full_image_{plate}_{index}.jpg`. The index is a process-wide
/// atomic counter seeded from the files already present, so concurrent
/// sessions never collide.
pub struct ArtifactStore {
    plates_dir: PathBuf,
    full_images_dir: PathBuf,
    next_index: AtomicU64,
    codec: FrameCodec,
}

impl ArtifactStore {
    pub fn open(root: impl AsRef<Path>, codec: FrameCodec) -> Result<Self> {
        let root = root.as_ref();
        let plates_dir = root.join(PLATES_DIR);
        let full_images_dir = root.join(FULL_IMAGES_DIR);
        std::fs::create_dir_all(&plates_dir)
            .with_context(|| format!("failed to create {}", plates_dir.display()))?;
        std::fs::create_dir_all(&full_images_dir)
            .with_context(|| format!("failed to create {}", full_images_dir.display()))?;
        let existing = std::fs::read_dir(&plates_dir)
            .with_context(|| format!("failed to list {}", plates_dir.display()))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .count() as u64;
        Ok(Self {
            plates_dir,
            full_images_dir,
            next_index: AtomicU64::new(existing),
            codec,
        })
    }

    /// Encode and write the crop and the full frame under a fresh index.
    pub fn write(&self, plate: &str, crop: &RgbImage, full: &RgbImage) -> Result<ArtifactPaths> {
        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        let plate_image = self.plates_dir.join(format!("{}_{}.jpg", plate, index));
        let full_image = self
            .full_images_dir
            .join(format!("full_image_{}_{}.jpg", plate, index));

        let crop_bytes = self.codec.encode_rgb(crop)?;
        let full_bytes = self.codec.encode_rgb(full)?;
        std::fs::write(&plate_image, crop_bytes)
            .with_context(|| format!("failed to write {}", plate_image.display()))?;
        let paths = ArtifactPaths {
            plate_image,
            full_image,
        };
        if let Err(err) = std::fs::write(&paths.full_image, full_bytes) {
            self.discard(&paths);
            return Err(err)
                .with_context(|| format!("failed to write {}", paths.full_image.display()));
        }
        Ok(paths)
    }

    /// Best-effort removal of images whose record was never written.
    pub fn discard(&self, paths: &ArtifactPaths) {
        for path in [&paths.plate_image, &paths.full_image] {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => log::warn!("failed to remove orphan {}: {}", path.display(), err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn writes_index_addressed_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path(), FrameCodec::default()).unwrap();
        let crop = RgbImage::new(40, 12);
        let full = RgbImage::new(80, 60);

        let first = store.write("ABC1234", &crop, &full).unwrap();
        let second = store.write("ABC1234", &crop, &full).unwrap();

        assert_eq!(first.plate_image, dir.path().join("plates/ABC1234_0.jpg"));
        assert_eq!(
            first.full_image,
            dir.path().join("full_images/full_image_ABC1234_0.jpg")
        );
        assert_eq!(second.plate_image, dir.path().join("plates/ABC1234_1.jpg"));
        assert!(first.plate_image.is_file());
        assert!(second.full_image.is_file());
        let reread = image::open(&first.plate_image).unwrap();
        assert_eq!((reread.width(), reread.height()), (40, 12));
    }

    #[test]
    fn index_continues_after_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = ArtifactStore::open(dir.path(), FrameCodec::default()).unwrap();
            let img = RgbImage::new(4, 4);
            store.write("AAA1111", &img, &img).unwrap();
            store.write("BBB2222", &img, &img).unwrap();
        }
        let store = ArtifactStore::open(dir.path(), FrameCodec::default()).unwrap();
        let img = RgbImage::new(4, 4);
        let paths = store.write("CCC3333", &img, &img).unwrap();
        assert_eq!(paths.plate_image, dir.path().join("plates/CCC3333_2.jpg"));
    }

    #[test]
    fn discard_removes_both_images_and_tolerates_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path(), FrameCodec::default()).unwrap();
        let img = RgbImage::new(4, 4);
        let paths = store.write("ABC1234", &img, &img).unwrap();
        std::fs::remove_file(&paths.full_image).unwrap();

        store.discard(&paths);
        assert!(!paths.plate_image.exists());
        assert!(!paths.full_image.exists());
    }

    #[test]
    fn concurrent_writers_get_distinct_indices() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ArtifactStore::open(dir.path(), FrameCodec::default()).unwrap());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let img = RgbImage::new(4, 4);
                    (0..5)
                        .map(|_| store.write("ABC1234", &img, &img).unwrap().plate_image)
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut seen = HashSet::new();
        for handle in handles {
            for path in handle.join().unwrap() {
                assert!(seen.insert(path));
            }
        }
        assert_eq!(seen.len(), 20);
    }
}
