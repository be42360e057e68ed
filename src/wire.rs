//! Stream framing and message encoding.
//!
//! Every message on the connection is a little-endian `u32` payload length
//! followed by the payload. Payloads start with a 4-byte magic so a producer
//! talking to the wrong port fails loudly instead of streaming garbage.
//!
//! Request:  `FRM1 | image`
//! Response: `PRS1 | status:u8 | characters | plate_type | plate_folder |
//!            full_image_folder | plate_image | full_image | timestamp | error`
//!
//! Variable fields are `u32` length + bytes. Strings are UTF-8.

use std::io::{ErrorKind, Read, Write};

use crate::error::{PipelineError, PipelineResult};

const REQUEST_MAGIC: &[u8; 4] = b"FRM1";
const RESPONSE_MAGIC: &[u8; 4] = b"PRS1";

/// Largest accepted message. Must fit a 10 MB encoded frame plus headers.
pub const MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

/// Largest accepted string field.
const MAX_TEXT_LEN: usize = 4096;

/// One frame sent by the producer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameRequest {
    pub image: Vec<u8>,
}

/// Explicit per-frame outcome, so "no plate" and "frame failed" are
/// distinguishable without inspecting empty fields.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResponseStatus {
    Matched,
    #[default]
    NoMatch,
    Error,
}

impl ResponseStatus {
    fn as_byte(self) -> u8 {
        match self {
            ResponseStatus::Matched => 0,
            ResponseStatus::NoMatch => 1,
            ResponseStatus::Error => 2,
        }
    }

    fn from_byte(value: u8) -> PipelineResult<Self> {
        match value {
            0 => Ok(ResponseStatus::Matched),
            1 => Ok(ResponseStatus::NoMatch),
            2 => Ok(ResponseStatus::Error),
            other => Err(PipelineError::Transport(format!(
                "unknown response status {}",
                other
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResponseStatus::Matched => "matched",
            ResponseStatus::NoMatch => "no_match",
            ResponseStatus::Error => "error",
        }
    }
}

/// One response per consumed frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlateResponse {
    pub status: ResponseStatus,
    pub characters: String,
    pub plate_type: String,
    pub plate_folder: String,
    pub full_image_folder: String,
    pub plate_image: Vec<u8>,
    pub full_image: Vec<u8>,
    pub timestamp: String,
    pub error: String,
}

impl FrameRequest {
    pub fn encode(&self) -> PipelineResult<Vec<u8>> {
        let mut out = Vec::with_capacity(self.image.len() + 8);
        out.extend_from_slice(REQUEST_MAGIC);
        write_bytes(&mut out, &self.image);
        check_size(out.len())?;
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> PipelineResult<Self> {
        let mut cursor = 0usize;
        expect_magic(bytes, &mut cursor, REQUEST_MAGIC)?;
        let image = read_vec_bounded(bytes, &mut cursor, MAX_MESSAGE_BYTES)?;
        expect_end(bytes, cursor)?;
        Ok(Self { image })
    }
}

impl PlateResponse {
    pub fn encode(&self) -> PipelineResult<Vec<u8>> {
        let mut out =
            Vec::with_capacity(self.plate_image.len() + self.full_image.len() + 128);
        out.extend_from_slice(RESPONSE_MAGIC);
        out.push(self.status.as_byte());
        write_bytes(&mut out, self.characters.as_bytes());
        write_bytes(&mut out, self.plate_type.as_bytes());
        write_bytes(&mut out, self.plate_folder.as_bytes());
        write_bytes(&mut out, self.full_image_folder.as_bytes());
        write_bytes(&mut out, &self.plate_image);
        write_bytes(&mut out, &self.full_image);
        write_bytes(&mut out, self.timestamp.as_bytes());
        write_bytes(&mut out, self.error.as_bytes());
        check_size(out.len())?;
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> PipelineResult<Self> {
        let mut cursor = 0usize;
        expect_magic(bytes, &mut cursor, RESPONSE_MAGIC)?;
        let status = ResponseStatus::from_byte(read_u8(bytes, &mut cursor)?)?;
        let characters = read_string_bounded(bytes, &mut cursor, MAX_TEXT_LEN)?;
        let plate_type = read_string_bounded(bytes, &mut cursor, MAX_TEXT_LEN)?;
        let plate_folder = read_string_bounded(bytes, &mut cursor, MAX_TEXT_LEN)?;
        let full_image_folder = read_string_bounded(bytes, &mut cursor, MAX_TEXT_LEN)?;
        let plate_image = read_vec_bounded(bytes, &mut cursor, MAX_MESSAGE_BYTES)?;
        let full_image = read_vec_bounded(bytes, &mut cursor, MAX_MESSAGE_BYTES)?;
        let timestamp = read_string_bounded(bytes, &mut cursor, MAX_TEXT_LEN)?;
        let error = read_string_bounded(bytes, &mut cursor, MAX_TEXT_LEN)?;
        expect_end(bytes, cursor)?;
        Ok(Self {
            status,
            characters,
            plate_type,
            plate_folder,
            full_image_folder,
            plate_image,
            full_image,
            timestamp,
            error,
        })
    }
}

/// Result of waiting for the next message on a stream.
#[derive(Debug, PartialEq, Eq)]
pub enum Incoming {
    Message(Vec<u8>),
    /// The peer closed its write side at a message boundary.
    EndOfStream,
    /// The read timeout elapsed before any byte of a new message arrived.
    Idle,
}

/// Write one length-prefixed message and flush.
pub fn write_message<W: Write>(writer: &mut W, payload: &[u8]) -> PipelineResult<()> {
    check_size(payload.len())?;
    writer.write_all(&(payload.len() as u32).to_le_bytes())?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

/// Read one length-prefixed message.
///
/// A clean EOF or a read timeout before the first header byte is reported as
/// `EndOfStream`/`Idle`. Anything that breaks off mid-message is a transport
/// error.
pub fn read_message<R: Read>(reader: &mut R) -> PipelineResult<Incoming> {
    let mut header = [0u8; 4];
    let mut filled = 0usize;
    while filled < header.len() {
        match reader.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(Incoming::EndOfStream),
            Ok(0) => {
                return Err(PipelineError::Transport(
                    "stream closed inside message header".to_string(),
                ))
            }
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if filled == 0 && is_timeout(&err) => return Ok(Incoming::Idle),
            Err(err) => return Err(err.into()),
        }
    }

    let len = u32::from_le_bytes(header) as usize;
    check_size(len)?;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).map_err(|err| {
        PipelineError::Transport(format!("stream closed inside message body: {}", err))
    })?;
    Ok(Incoming::Message(payload))
}

fn is_timeout(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

fn check_size(len: usize) -> PipelineResult<()> {
    if len > MAX_MESSAGE_BYTES {
        return Err(PipelineError::Transport(format!(
            "message length {} exceeds maximum {}",
            len, MAX_MESSAGE_BYTES
        )));
    }
    Ok(())
}

fn malformed() -> PipelineError {
    PipelineError::Transport("malformed message encoding".to_string())
}

fn expect_magic(bytes: &[u8], cursor: &mut usize, magic: &[u8; 4]) -> PipelineResult<()> {
    if read_slice(bytes, cursor, 4)? != magic {
        return Err(PipelineError::Transport(format!(
            "unexpected message magic (want {})",
            String::from_utf8_lossy(magic)
        )));
    }
    Ok(())
}

fn expect_end(bytes: &[u8], cursor: usize) -> PipelineResult<()> {
    if cursor != bytes.len() {
        return Err(PipelineError::Transport(format!(
            "{} trailing bytes after message",
            bytes.len() - cursor
        )));
    }
    Ok(())
}

fn read_u8(bytes: &[u8], cursor: &mut usize) -> PipelineResult<u8> {
    Ok(read_slice(bytes, cursor, 1)?[0])
}

fn read_u32(bytes: &[u8], cursor: &mut usize) -> PipelineResult<u32> {
    let slice = read_slice(bytes, cursor, 4)?;
    Ok(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

fn read_slice<'a>(bytes: &'a [u8], cursor: &mut usize, len: usize) -> PipelineResult<&'a [u8]> {
    let end = cursor.checked_add(len).ok_or_else(malformed)?;
    if end > bytes.len() {
        return Err(malformed());
    }
    let out = &bytes[*cursor..end];
    *cursor = end;
    Ok(out)
}

fn read_vec_bounded(bytes: &[u8], cursor: &mut usize, max_len: usize) -> PipelineResult<Vec<u8>> {
    let len = read_u32(bytes, cursor)? as usize;
    if len > max_len {
        return Err(PipelineError::Transport(format!(
            "field length {} exceeds maximum allowed {}",
            len, max_len
        )));
    }
    Ok(read_slice(bytes, cursor, len)?.to_vec())
}

fn read_string_bounded(bytes: &[u8], cursor: &mut usize, max_len: usize) -> PipelineResult<String> {
    let raw = read_vec_bounded(bytes, cursor, max_len)?;
    String::from_utf8(raw).map_err(|_| malformed())
}

fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_response() -> PlateResponse {
        PlateResponse {
            status: ResponseStatus::Matched,
            characters: "ABC1D23".to_string(),
            plate_type: "mercosul".to_string(),
            plate_folder: "plates/ABC1D23_4.jpg".to_string(),
            full_image_folder: "full_images/full_image_ABC1D23_4.jpg".to_string(),
            plate_image: vec![1, 2, 3],
            full_image: vec![9; 64],
            timestamp: "2024-05-01_12-00-00".to_string(),
            error: String::new(),
        }
    }

    #[test]
    fn response_survives_framing() {
        let response = sample_response();
        let mut buf = Vec::new();
        write_message(&mut buf, &response.encode().unwrap()).unwrap();

        let mut reader = Cursor::new(buf);
        let Incoming::Message(payload) = read_message(&mut reader).unwrap() else {
            panic!("expected a message");
        };
        assert_eq!(PlateResponse::decode(&payload).unwrap(), response);
        assert_eq!(read_message(&mut reader).unwrap(), Incoming::EndOfStream);
    }

    #[test]
    fn truncated_body_is_a_transport_error() {
        let request = FrameRequest {
            image: vec![7; 32],
        };
        let mut buf = Vec::new();
        write_message(&mut buf, &request.encode().unwrap()).unwrap();
        buf.truncate(buf.len() - 5);

        let err = read_message(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, PipelineError::Transport(_)));
    }

    #[test]
    fn oversized_length_is_rejected_before_allocation() {
        let header = ((MAX_MESSAGE_BYTES + 1) as u32).to_le_bytes();
        let err = read_message(&mut Cursor::new(header.to_vec())).unwrap_err();
        assert!(matches!(err, PipelineError::Transport(_)));
    }

    #[test]
    fn ten_megabyte_frames_fit() {
        let request = FrameRequest {
            image: vec![0xAB; 10 * 1024 * 1024],
        };
        let encoded = request.encode().unwrap();
        assert_eq!(FrameRequest::decode(&encoded).unwrap(), request);
    }

    #[test]
    fn request_and_response_magic_are_not_interchangeable() {
        let response = sample_response().encode().unwrap();
        assert!(FrameRequest::decode(&response).is_err());
        let request = FrameRequest { image: vec![1] }.encode().unwrap();
        assert!(PlateResponse::decode(&request).is_err());
    }
}
