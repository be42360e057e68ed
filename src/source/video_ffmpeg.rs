//! Video file source using FFmpeg.
//!
//! Frames are decoded in memory and converted to RGB24; nothing is written to
//! disk.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;
use image::{DynamicImage, RgbImage};

use super::{FrameSource, SourceStats};

pub struct VideoFileSource {
    path: String,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    eof_sent: bool,
    stats: SourceStats,
}

impl VideoFileSource {
    pub fn open(path: &Path) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(path)
            .with_context(|| format!("failed to open video '{}' with ffmpeg", path.display()))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("{} has no video track", path.display()))?;
        let stream_index = input_stream.index();
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;
        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        Ok(Self {
            path: path.display().to_string(),
            input,
            stream_index,
            decoder,
            scaler,
            eof_sent: false,
            stats: SourceStats::default(),
        })
    }

    fn receive(&mut self) -> Result<Option<DynamicImage>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }
        let mut rgb = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&decoded, &mut rgb)
            .context("scale frame to RGB")?;
        self.stats.frames_read += 1;
        Ok(Some(DynamicImage::ImageRgb8(frame_to_image(&rgb)?)))
    }
}

impl FrameSource for VideoFileSource {
    fn describe(&self) -> String {
        format!("video file {}", self.path)
    }

    fn next_frame(&mut self) -> Result<Option<DynamicImage>> {
        // Drain frames the decoder already holds before feeding it more.
        if let Some(image) = self.receive()? {
            return Ok(Some(image));
        }
        if self.eof_sent {
            return Ok(None);
        }
        loop {
            let next = {
                let mut packets = self.input.packets();
                packets
                    .next()
                    .map(|(stream, packet)| (stream.index(), packet))
            };
            let Some((index, packet)) = next else {
                break;
            };
            if index != self.stream_index {
                continue;
            }
            self.decoder
                .send_packet(&packet)
                .context("send packet to ffmpeg decoder")?;
            if let Some(image) = self.receive()? {
                return Ok(Some(image));
            }
        }
        self.decoder.send_eof().context("flush ffmpeg decoder")?;
        self.eof_sent = true;
        self.receive()
    }

    fn stats(&self) -> SourceStats {
        self.stats.clone()
    }
}

fn frame_to_image(frame: &ffmpeg::frame::Video) -> Result<RgbImage> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0) as usize;
    let data = frame.data(0);

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(
            data.get(start..start + row_bytes)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }
    RgbImage::from_raw(width, height, pixels)
        .ok_or_else(|| anyhow!("ffmpeg frame buffer does not match {}x{}", width, height))
}
