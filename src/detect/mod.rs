mod adapter;
mod backend;
mod backends;
pub mod postprocess;

pub use adapter::DetectionAdapter;
pub use backend::PlateDetector;
pub use backends::StubDetector;

#[cfg(feature = "backend-tract")]
pub use backends::TractDetector;
