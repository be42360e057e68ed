use anyhow::Result;
use image::RgbImage;

use crate::frame::Region;

/// Plate detector capability.
///
/// # Sharing
///
/// One detector handle serves every session, so `detect` takes `&self` and
/// implementations must be `Send + Sync`. A backend that needs scratch state
/// per call keeps it on the stack or behind its own lock.
pub trait PlateDetector: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Propose plate-like regions in `image`.
    ///
    /// Order is backend-defined and treated by callers as priority. An empty
    /// result means nothing plate-like was found. Errors are reserved for
    /// failures of the capability itself.
    fn detect(&self, image: &RgbImage) -> Result<Vec<Region>>;

    /// Optional warm-up hook.
    fn warm_up(&self) -> Result<()> {
        Ok(())
    }
}
