//! Durable recording of winning plates.
//!
//! The session that owns a stream is the only writer for that stream. Each
//! winning plate goes through `PersistencePolicy`; when it passes, the crop and
//! the processed frame are written by `ArtifactStore` and a `PlateRecord` is
//! appended to the shared `PlateStore`. Failures are reported to the caller
//! and never prevent the frame's response.

mod artifacts;
mod policy;
mod store;

use std::sync::Arc;
use std::time::Instant;

use chrono::Local;
use image::RgbImage;

pub use artifacts::{ArtifactPaths, ArtifactStore};
pub use policy::{DedupState, PersistencePolicy, DEFAULT_DEDUP_WINDOW};
pub use store::{InMemoryPlateStore, PlateRecord, PlateStore, RecordId, SqlitePlateStore};

use crate::error::PipelineError;
use crate::selector::Selection;

/// What happened to a winning plate.
#[derive(Debug)]
pub enum PersistOutcome {
    /// Running without a store.
    Disabled,
    /// Same plate recorded too recently.
    Deduplicated,
    Recorded { id: RecordId, paths: ArtifactPaths },
    Failed(PipelineError),
}

struct Backing {
    store: Arc<dyn PlateStore>,
    artifacts: Arc<ArtifactStore>,
}

/// Shared, stateless part of persistence. Dedup state is passed in by the
/// session that owns it.
#[derive(Clone)]
pub struct Persister {
    policy: PersistencePolicy,
    backing: Option<Arc<Backing>>,
}

impl Persister {
    pub fn new(
        policy: PersistencePolicy,
        store: Arc<dyn PlateStore>,
        artifacts: Arc<ArtifactStore>,
    ) -> Self {
        Self {
            policy,
            backing: Some(Arc::new(Backing { store, artifacts })),
        }
    }

    /// Degraded mode: every plate is reported back but nothing is written.
    pub fn disabled(policy: PersistencePolicy) -> Self {
        Self {
            policy,
            backing: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backing.is_some()
    }

    pub fn policy(&self) -> &PersistencePolicy {
        &self.policy
    }

    /// Apply the write rule to one winning plate.
    ///
    /// `state` is updated only after the record is durably appended. Images
    /// written for a record the store rejected are removed again.
    pub fn persist(
        &self,
        state: &mut DedupState,
        selection: &Selection,
        full_image: &RgbImage,
        now: Instant,
    ) -> PersistOutcome {
        let Some(backing) = self.backing.as_ref() else {
            return PersistOutcome::Disabled;
        };
        let text = selection.plate.text();
        if !self.policy.should_persist(state, text, now) {
            return PersistOutcome::Deduplicated;
        }

        let paths = match backing.artifacts.write(text, &selection.crop, full_image) {
            Ok(paths) => paths,
            Err(err) => return PersistOutcome::Failed(PipelineError::StoreWrite(format!("{:#}", err))),
        };
        let record = PlateRecord {
            plate: text.to_string(),
            kind: selection.plate.kind(),
            recorded_at: Local::now(),
            plate_image_path: paths.plate_image.display().to_string(),
            full_image_path: paths.full_image.display().to_string(),
            ocr_confidence: selection.ocr_confidence,
        };
        match backing.store.append(&record) {
            Ok(id) => {
                state.mark_persisted(text, now);
                PersistOutcome::Recorded { id, paths }
            }
            Err(err) => {
                backing.artifacts.discard(&paths);
                PersistOutcome::Failed(PipelineError::StoreWrite(format!("{:#}", err)))
            }
        }
    }
}
