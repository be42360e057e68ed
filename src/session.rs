//! One producer connection, from first frame to close.
//!
//! A session reads a request, answers it, and only then reads the next one, so
//! responses pair with requests by position. End of input and idle timeout
//! close the session gracefully; any transport fault closes it at once.

use std::fmt;
use std::io::{Read, Write};

use anyhow::{anyhow, Result};

use crate::error::PipelineError;
use crate::persist::DedupState;
use crate::pipeline::FramePipeline;
use crate::wire::{read_message, write_message, FrameRequest, Incoming};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Closing,
    Closed,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (SessionState::Open, SessionState::Closing)
                | (SessionState::Open, SessionState::Closed)
                | (SessionState::Closing, SessionState::Closed)
        )
    }
}

/// Why a session ended.
#[derive(Debug)]
pub enum SessionEnd {
    /// The producer half-closed its write side.
    EndOfStream,
    /// Nothing arrived within the idle timeout.
    IdleTimeout,
    /// The connection or its framing broke.
    Transport(PipelineError),
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEnd::EndOfStream => write!(f, "end of stream"),
            SessionEnd::IdleTimeout => write!(f, "idle timeout"),
            SessionEnd::Transport(err) => write!(f, "{}", err),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames: u64,
    pub plates_matched: u64,
    pub records_persisted: u64,
    pub errors: u64,
}

pub struct StreamingSession {
    id: u64,
    state: SessionState,
    dedup: DedupState,
    stats: SessionStats,
}

impl StreamingSession {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            state: SessionState::Open,
            dedup: DedupState::new(),
            stats: SessionStats::default(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn transition(&mut self, next: SessionState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(anyhow!(
                "session {}: illegal transition {:?} -> {:?}",
                self.id,
                self.state,
                next
            ));
        }
        self.state = next;
        Ok(())
    }

    /// Serve `stream` until it ends. The caller is expected to have set the
    /// idle timeout as the stream's read timeout.
    pub fn run<S: Read + Write>(
        &mut self,
        stream: &mut S,
        pipeline: &FramePipeline,
    ) -> Result<SessionEnd> {
        if self.state != SessionState::Open {
            return Err(anyhow!("session {} is not open", self.id));
        }
        let end = self.serve(stream, pipeline);
        match &end {
            SessionEnd::Transport(err) => {
                log::warn!("session {}: closed on transport fault: {}", self.id, err);
            }
            other => {
                self.transition(SessionState::Closing)?;
                log::debug!("session {}: closing on {}", self.id, other);
            }
        }
        self.transition(SessionState::Closed)?;
        log::info!(
            "session {} closed ({}): {} frames, {} plates, {} recorded, {} errors",
            self.id,
            end,
            self.stats.frames,
            self.stats.plates_matched,
            self.stats.records_persisted,
            self.stats.errors
        );
        Ok(end)
    }

    fn serve<S: Read + Write>(&mut self, stream: &mut S, pipeline: &FramePipeline) -> SessionEnd {
        loop {
            let payload = match read_message(stream) {
                Ok(Incoming::Message(payload)) => payload,
                Ok(Incoming::EndOfStream) => return SessionEnd::EndOfStream,
                Ok(Incoming::Idle) => return SessionEnd::IdleTimeout,
                Err(err) => return SessionEnd::Transport(err),
            };
            let request = match FrameRequest::decode(&payload) {
                Ok(request) => request,
                Err(err) => return SessionEnd::Transport(err),
            };

            let seq = self.stats.frames;
            let (response, report) = pipeline.process(seq, &request.image, &mut self.dedup);
            self.stats.frames += 1;
            self.stats.plates_matched += u64::from(report.matched);
            self.stats.records_persisted += u64::from(report.persisted);
            self.stats.errors += u64::from(report.failed);

            let sent = response
                .encode()
                .and_then(|bytes| write_message(stream, &bytes));
            if let Err(err) = sent {
                return SessionEnd::Transport(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FrameCodec;
    use crate::detect::{DetectionAdapter, StubDetector};
    use crate::persist::{PersistencePolicy, Persister};
    use crate::plate::PlateValidator;
    use crate::recognize::{RecognitionAdapter, StubRecognizer};
    use crate::selector::CandidateSelector;
    use crate::wire::{PlateResponse, ResponseStatus};
    use image::{DynamicImage, RgbImage};
    use std::io::{Cursor, ErrorKind};
    use std::sync::Arc;

    /// Scripted input, captured output. Reads past the script either report
    /// EOF or a timeout.
    struct Duplex {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
        idle_at_end: bool,
    }

    impl Read for Duplex {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = self.input.read(buf)?;
            if n == 0 && self.idle_at_end && !buf.is_empty() {
                return Err(std::io::Error::new(ErrorKind::WouldBlock, "timed out"));
            }
            Ok(n)
        }
    }

    impl Write for Duplex {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.output.write(buf)
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn pipeline() -> FramePipeline {
        let selector = CandidateSelector::new(
            DetectionAdapter::new(Arc::new(StubDetector::empty())),
            RecognitionAdapter::new(Arc::new(StubRecognizer::new())),
            PlateValidator::default(),
        );
        FramePipeline::new(
            FrameCodec::default(),
            selector,
            Persister::disabled(PersistencePolicy::default()),
        )
    }

    fn request(image: Vec<u8>) -> Vec<u8> {
        let mut out = Vec::new();
        write_message(&mut out, &FrameRequest { image }.encode().unwrap()).unwrap();
        out
    }

    fn good_frame() -> Vec<u8> {
        FrameCodec::default()
            .encode(&DynamicImage::ImageRgb8(RgbImage::new(64, 48)))
            .unwrap()
    }

    fn responses(output: Vec<u8>) -> Vec<PlateResponse> {
        let mut reader = Cursor::new(output);
        let mut out = Vec::new();
        while let Incoming::Message(payload) = read_message(&mut reader).unwrap() {
            out.push(PlateResponse::decode(&payload).unwrap());
        }
        out
    }

    #[test]
    fn one_response_per_request_in_order() {
        let mut input = request(good_frame());
        input.extend(request(b"not an image".to_vec()));
        input.extend(request(good_frame()));
        let mut stream = Duplex {
            input: Cursor::new(input),
            output: Vec::new(),
            idle_at_end: false,
        };
        let mut session = StreamingSession::new(1);
        let end = session.run(&mut stream, &pipeline()).unwrap();

        assert!(matches!(end, SessionEnd::EndOfStream));
        assert_eq!(session.state(), SessionState::Closed);
        let statuses: Vec<_> = responses(stream.output).into_iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![ResponseStatus::NoMatch, ResponseStatus::Error, ResponseStatus::NoMatch]
        );
        assert_eq!(session.stats().frames, 3);
        assert_eq!(session.stats().errors, 1);
    }

    #[test]
    fn idle_timeout_closes_gracefully() {
        let mut stream = Duplex {
            input: Cursor::new(request(good_frame())),
            output: Vec::new(),
            idle_at_end: true,
        };
        let mut session = StreamingSession::new(2);
        let end = session.run(&mut stream, &pipeline()).unwrap();
        assert!(matches!(end, SessionEnd::IdleTimeout));
        assert_eq!(responses(stream.output).len(), 1);
    }

    #[test]
    fn truncated_request_ends_session_without_response() {
        let mut input = request(good_frame());
        let mut broken = request(good_frame());
        broken.truncate(broken.len() / 2);
        input.extend(broken);
        let mut stream = Duplex {
            input: Cursor::new(input),
            output: Vec::new(),
            idle_at_end: false,
        };
        let mut session = StreamingSession::new(3);
        let end = session.run(&mut stream, &pipeline()).unwrap();
        assert!(matches!(end, SessionEnd::Transport(_)));
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(responses(stream.output).len(), 1);
    }

    #[test]
    fn closed_is_terminal() {
        let mut session = StreamingSession::new(4);
        session.transition(SessionState::Closing).unwrap();
        assert!(session.transition(SessionState::Open).is_err());
        session.transition(SessionState::Closed).unwrap();
        assert!(session.transition(SessionState::Closing).is_err());
        assert!(session.transition(SessionState::Open).is_err());
    }

    #[test]
    fn closed_session_cannot_run_again() {
        let mut session = StreamingSession::new(5);
        let mut stream = Duplex {
            input: Cursor::new(Vec::new()),
            output: Vec::new(),
            idle_at_end: false,
        };
        session.run(&mut stream, &pipeline()).unwrap();
        assert!(session.run(&mut stream, &pipeline()).is_err());
    }
}
