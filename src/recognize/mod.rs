mod adapter;
mod backend;
mod backends;
pub mod ctc;

pub use adapter::RecognitionAdapter;
pub use backend::{RecognitionGuess, TextRecognizer};
pub use backends::StubRecognizer;

#[cfg(feature = "backend-tract")]
pub use backends::TractRecognizer;
