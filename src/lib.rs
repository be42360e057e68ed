//! Plate Stream
//!
//! Streaming license-plate recognition. A producer sends JPEG frames over a
//! TCP stream; the service answers every frame, in order, with the plate it
//! found (if any), and records newly seen plates.
//!
//! # Per-frame pipeline
//!
//! 1. **Decode** the transmitted JPEG and stretch its contrast.
//! 2. **Detect** candidate plate regions (one detector call per frame).
//! 3. **Recognize** text in each region, in detector order.
//! 4. **Validate** each guess against the traditional (`LLLNNNN`) and
//!    Mercosul (`LLLNLNN`) grammars after confusion correction. The first
//!    valid guess wins.
//! 5. **Persist** the winner unless the same plate was recorded within the
//!    dedup window.
//! 6. **Respond** with status, text, type, artifact paths, images and a
//!    timestamp.
//!
//! # Module Structure
//!
//! - `wire`, `session`, `server`, `client`: transport and stream lifecycle
//! - `codec`, `frame`: images, frames and regions
//! - `detect`, `recognize`: capability traits, adapters and backends
//! - `plate`, `selector`: grammar validation and per-frame selection
//! - `persist`, `response`, `pipeline`: recording and answering
//! - `source`: producer-side frame sources
//! - `config`, `error`: configuration and the failure taxonomy

pub mod client;
pub mod codec;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod persist;
pub mod pipeline;
pub mod plate;
pub mod recognize;
pub mod response;
pub mod selector;
pub mod server;
pub mod session;
pub mod source;
pub mod wire;

pub use client::PlateClient;
pub use codec::FrameCodec;
pub use config::ServerConfig;
pub use error::{PipelineError, PipelineResult};
pub use frame::{Frame, Region};
pub use persist::{PlateRecord, PlateStore, SqlitePlateStore};
pub use pipeline::FramePipeline;
pub use plate::{CorrectionMode, NormalizedPlate, PlateKind, PlateValidator};
pub use selector::{CandidateSelector, Selection};
pub use server::{build_pipeline, PlateServer, ServerHandle};
pub use session::{SessionState, StreamingSession};
pub use wire::{PlateResponse, ResponseStatus};
