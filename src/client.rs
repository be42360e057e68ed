//! Producer side of the streaming protocol.

use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::wire::{read_message, write_message, FrameRequest, Incoming, PlateResponse};

const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(60);

/// One open stream to the inference service.
///
/// `exchange` is strictly request/response, so the n-th response always
/// belongs to the n-th frame.
pub struct PlateClient {
    stream: TcpStream,
    sent: u64,
}

impl PlateClient {
    /// Connect to the service. Failure here is fatal for the producer.
    pub fn connect<A: ToSocketAddrs + std::fmt::Debug>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(&addr)
            .with_context(|| format!("failed to connect to plate server at {:?}", addr))?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(DEFAULT_RESPONSE_TIMEOUT))?;
        Ok(Self { stream, sent: 0 })
    }

    pub fn set_response_timeout(&self, timeout: Duration) -> Result<()> {
        self.stream.set_read_timeout(Some(timeout))?;
        Ok(())
    }

    /// Frames sent so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Send one encoded frame and wait for its response.
    pub fn exchange(&mut self, image: Vec<u8>) -> Result<PlateResponse> {
        let payload = FrameRequest { image }.encode()?;
        write_message(&mut self.stream, &payload)
            .with_context(|| format!("failed to send frame {}", self.sent))?;
        self.sent += 1;
        match read_message(&mut self.stream)? {
            Incoming::Message(bytes) => Ok(PlateResponse::decode(&bytes)?),
            Incoming::EndOfStream => Err(anyhow!(
                "server closed the stream before answering frame {}",
                self.sent - 1
            )),
            Incoming::Idle => Err(anyhow!(
                "timed out waiting for the response to frame {}",
                self.sent - 1
            )),
        }
    }

    /// Signal end of stream and wait for the server to close its side.
    pub fn finish(mut self) -> Result<()> {
        self.stream
            .shutdown(Shutdown::Write)
            .context("failed to half-close stream")?;
        match read_message(&mut self.stream)? {
            Incoming::EndOfStream => Ok(()),
            Incoming::Message(_) => Err(anyhow!("unexpected data after the last response")),
            Incoming::Idle => Err(anyhow!("server did not close the stream")),
        }
    }
}
