//! plate_stream - stream frames to a plate_server and report what it sees
//!
//! Reads frames from a directory of images or a video file, resizes and
//! JPEG-encodes them, sends them one at a time, and logs each response.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::time::{Duration, Instant};

use plate_stream::codec::{DEFAULT_CANVAS_HEIGHT, DEFAULT_CANVAS_WIDTH, DEFAULT_JPEG_QUALITY};
use plate_stream::source::open_source;
use plate_stream::{FrameCodec, PlateClient, ResponseStatus};

#[derive(Parser, Debug)]
#[command(author, version, about = "Stream frames to a plate recognition server")]
struct Args {
    /// Directory of images or a video file (video needs ingest-file-ffmpeg).
    #[arg(long, env = "PLATE_INPUT")]
    input: String,

    /// Server address.
    #[arg(long, env = "PLATE_SERVER_ADDR", default_value = "127.0.0.1:5001")]
    server: String,

    /// Frames per second to send at. 0 sends as fast as responses arrive.
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,

    #[arg(long, default_value_t = DEFAULT_CANVAS_WIDTH)]
    width: u32,

    #[arg(long, default_value_t = DEFAULT_CANVAS_HEIGHT)]
    height: u32,

    /// JPEG quality (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY)]
    quality: u8,

    /// Seconds to wait for each response.
    #[arg(long, default_value_t = 60)]
    response_timeout_secs: u64,
}

#[derive(Default)]
struct Tally {
    matched: u64,
    no_match: u64,
    errors: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if args.width == 0 || args.height == 0 {
        return Err(anyhow!("--width and --height must be greater than zero"));
    }

    let codec = FrameCodec::new(args.width, args.height, args.quality);
    let mut source = open_source(&args.input)?;
    let mut client = PlateClient::connect(args.server.as_str())?;
    client.set_response_timeout(Duration::from_secs(args.response_timeout_secs.max(1)))?;
    log::info!("streaming {} to {}", source.describe(), args.server);

    let frame_interval = if args.fps == 0 {
        Duration::ZERO
    } else {
        Duration::from_secs_f64(1.0 / f64::from(args.fps))
    };
    let mut tally = Tally::default();
    let started = Instant::now();

    while let Some(image) = source.next_frame()? {
        if args.max_frames.is_some_and(|max| client.sent() >= max) {
            break;
        }
        let frame_started = Instant::now();
        let seq = client.sent();
        let encoded = codec.encode(&image)?;
        let response = client.exchange(encoded)?;
        match response.status {
            ResponseStatus::Matched => {
                tally.matched += 1;
                let recorded = if response.plate_folder.is_empty() {
                    String::new()
                } else {
                    format!(", recorded at {}", response.plate_folder)
                };
                log::info!(
                    "frame {}: {} plate {} at {}{}",
                    seq,
                    response.plate_type,
                    response.characters,
                    response.timestamp,
                    recorded
                );
            }
            ResponseStatus::NoMatch => {
                tally.no_match += 1;
                log::debug!("frame {}: no plate", seq);
            }
            ResponseStatus::Error => {
                tally.errors += 1;
                log::warn!("frame {}: server error: {}", seq, response.error);
            }
        }
        if let Some(rest) = frame_interval.checked_sub(frame_started.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    let sent = client.sent();
    client.finish()?;
    let stats = source.stats();
    log::info!(
        "sent {} frames in {:.1}s: {} matched, {} without plate, {} errors ({} unreadable input files skipped)",
        sent,
        started.elapsed().as_secs_f64(),
        tally.matched,
        tally.no_match,
        tally.errors,
        stats.frames_skipped
    );
    Ok(())
}
