//! Per-frame processing: decode, enhance, select, persist, respond.
//!
//! `FramePipeline` is shared by every session; the only per-stream state it
//! touches is the `DedupState` handed in by the caller.

use std::time::Instant;

use chrono::Local;

use crate::codec::{enhance, FrameCodec};
use crate::frame::Frame;
use crate::persist::{DedupState, PersistOutcome, Persister};
use crate::response::ResponseAssembler;
use crate::selector::CandidateSelector;
use crate::wire::PlateResponse;

/// What happened to one frame, beyond the response itself.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub matched: bool,
    pub persisted: bool,
    pub failed: bool,
}

pub struct FramePipeline {
    codec: FrameCodec,
    selector: CandidateSelector,
    persister: Persister,
    assembler: ResponseAssembler,
}

impl FramePipeline {
    pub fn new(codec: FrameCodec, selector: CandidateSelector, persister: Persister) -> Self {
        Self {
            codec,
            selector,
            persister,
            assembler: ResponseAssembler::new(codec),
        }
    }

    pub fn selector(&self) -> &CandidateSelector {
        &self.selector
    }

    pub fn persister(&self) -> &Persister {
        &self.persister
    }

    /// Turn one transmitted image into exactly one response. Never fails:
    /// frame-level errors become an error response.
    pub fn process(
        &self,
        seq: u64,
        image_bytes: &[u8],
        dedup: &mut DedupState,
    ) -> (PlateResponse, FrameReport) {
        let mut report = FrameReport::default();
        let decoded = match self.codec.decode(image_bytes) {
            Ok(image) => image,
            Err(err) => {
                log::warn!("frame {}: {}", seq, err);
                report.failed = true;
                return (self.assembler.error(&err, None, &Local::now()), report);
            }
        };
        let frame = Frame::new(seq, enhance(&decoded));
        let at = frame.received_at;

        let selection = match self.selector.select(&frame) {
            Ok(Some(selection)) => selection,
            Ok(None) => {
                log::debug!("frame {}: no plate detected", seq);
                return (self.assembler.no_match(frame.image(), &at), report);
            }
            Err(err) => {
                log::warn!("frame {}: {}", seq, err);
                report.failed = true;
                return (self.assembler.error(&err, Some(frame.image()), &at), report);
            }
        };
        report.matched = true;

        let outcome = self
            .persister
            .persist(dedup, &selection, frame.image(), Instant::now());
        let paths = match outcome {
            PersistOutcome::Recorded { id, paths } => {
                log::info!(
                    "recorded {} plate {} as #{} ({})",
                    selection.plate.kind(),
                    selection.plate.text(),
                    id,
                    paths.plate_image.display()
                );
                report.persisted = true;
                Some(paths)
            }
            PersistOutcome::Deduplicated => {
                log::debug!("frame {}: {} seen recently, not recorded", seq, selection.plate.text());
                None
            }
            PersistOutcome::Disabled => None,
            PersistOutcome::Failed(err) => {
                log::warn!("frame {}: {}", seq, err);
                None
            }
        };

        let response = self
            .assembler
            .matched(&selection, frame.into_image(), paths.as_ref(), &at);
        (response, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{DetectionAdapter, PlateDetector, StubDetector};
    use crate::frame::Region;
    use crate::persist::{
        ArtifactStore, InMemoryPlateStore, PersistencePolicy, PlateRecord, PlateStore, RecordId,
    };
    use crate::plate::PlateValidator;
    use crate::recognize::{RecognitionAdapter, RecognitionGuess, StubRecognizer};
    use crate::wire::ResponseStatus;
    use anyhow::anyhow;
    use image::{DynamicImage, RgbImage};
    use std::sync::Arc;

    struct BrokenDetector;

    impl PlateDetector for BrokenDetector {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn detect(&self, _image: &RgbImage) -> anyhow::Result<Vec<Region>> {
            Err(anyhow!("session lost"))
        }
    }

    struct RejectingStore;

    impl PlateStore for RejectingStore {
        fn probe(&self) -> anyhow::Result<()> {
            Ok(())
        }
        fn append(&self, _record: &PlateRecord) -> anyhow::Result<RecordId> {
            Err(anyhow!("database is locked"))
        }
        fn count(&self) -> anyhow::Result<u64> {
            Ok(0)
        }
    }

    fn pipeline(
        detector: impl PlateDetector + 'static,
        recognizer: StubRecognizer,
        persister: Persister,
    ) -> FramePipeline {
        let selector = CandidateSelector::new(
            DetectionAdapter::new(Arc::new(detector)),
            RecognitionAdapter::new(Arc::new(recognizer)),
            PlateValidator::default(),
        );
        FramePipeline::new(FrameCodec::default(), selector, persister)
    }

    fn jpeg_frame() -> Vec<u8> {
        FrameCodec::default()
            .encode(&DynamicImage::ImageRgb8(RgbImage::new(320, 240)))
            .unwrap()
    }

    #[test]
    fn undecodable_frame_yields_error_response() {
        let pipeline = pipeline(
            StubDetector::empty(),
            StubRecognizer::new(),
            Persister::disabled(PersistencePolicy::default()),
        );
        let (response, report) = pipeline.process(0, b"garbage", &mut DedupState::new());
        assert_eq!(response.status, ResponseStatus::Error);
        assert!(response.error.starts_with("decode error"));
        assert!(response.full_image.is_empty());
        assert!(report.failed);
    }

    #[test]
    fn frame_without_plate_yields_no_match() {
        let pipeline = pipeline(
            StubDetector::empty(),
            StubRecognizer::new(),
            Persister::disabled(PersistencePolicy::default()),
        );
        let (response, report) = pipeline.process(0, &jpeg_frame(), &mut DedupState::new());
        assert_eq!(response.status, ResponseStatus::NoMatch);
        assert!(response.characters.is_empty());
        assert_eq!(report, FrameReport::default());
    }

    #[test]
    fn matched_plate_is_recorded_once_per_window() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryPlateStore::new());
        let artifacts = Arc::new(ArtifactStore::open(dir.path(), FrameCodec::default()).unwrap());
        let persister = Persister::new(PersistencePolicy::default(), store.clone(), artifacts);
        let pipeline = pipeline(
            StubDetector::new(vec![Region::new(100, 100, 300, 160, 0.9)]),
            StubRecognizer::new().with_fallback(vec![RecognitionGuess::new("HJK-7393", 0.92)]),
            persister,
        );
        let mut dedup = DedupState::new();
        let frame = jpeg_frame();

        let (first, report) = pipeline.process(0, &frame, &mut dedup);
        assert_eq!(first.status, ResponseStatus::Matched);
        assert_eq!(first.characters, "HJK7393");
        assert_eq!(first.plate_type, "traditional");
        assert!(first.plate_folder.ends_with("HJK7393_0.jpg"));
        assert!(report.persisted);

        let (second, report) = pipeline.process(1, &frame, &mut dedup);
        assert_eq!(second.characters, "HJK7393");
        assert!(second.plate_folder.is_empty());
        assert!(report.matched && !report.persisted);
        assert_eq!(store.records().len(), 1);
    }

    #[test]
    fn detector_failure_yields_error_response_with_the_frame() {
        let pipeline = pipeline(
            BrokenDetector,
            StubRecognizer::new(),
            Persister::disabled(PersistencePolicy::default()),
        );
        let (response, report) = pipeline.process(0, &jpeg_frame(), &mut DedupState::new());
        assert_eq!(response.status, ResponseStatus::Error);
        assert!(response.error.starts_with("model inference error"));
        assert!(response.characters.is_empty());
        assert!(!response.full_image.is_empty());
        assert!(report.failed && !report.matched);
    }

    #[test]
    fn store_failure_still_answers_matched() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = Arc::new(ArtifactStore::open(dir.path(), FrameCodec::default()).unwrap());
        let persister =
            Persister::new(PersistencePolicy::default(), Arc::new(RejectingStore), artifacts);
        let pipeline = pipeline(
            StubDetector::new(vec![Region::new(100, 100, 300, 160, 0.9)]),
            StubRecognizer::new().with_fallback(vec![RecognitionGuess::new("ABC1234", 0.9)]),
            persister,
        );
        let mut dedup = DedupState::new();

        let (response, report) = pipeline.process(0, &jpeg_frame(), &mut dedup);
        assert_eq!(response.status, ResponseStatus::Matched);
        assert_eq!(response.characters, "ABC1234");
        assert!(response.plate_folder.is_empty());
        assert!(response.error.is_empty());
        assert!(report.matched && !report.persisted && !report.failed);
        assert!(dedup.last_plate().is_none());
        assert_eq!(std::fs::read_dir(dir.path().join("plates")).unwrap().count(), 0);
    }
}
