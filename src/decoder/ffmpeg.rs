use ac_ffmpeg::codec::Decoder;
use ac_ffmpeg::codec::video::{VideoDecoder, VideoFrame};
use ac_ffmpeg::packet::PacketMut;
use ac_ffmpeg::time::{TimeBase, Timestamp as FfTimestamp};
use anyhow::{Result, anyhow};
use bytes::BytesMut;

use super::{ControlResponse, DecoderDriver, DecoderEngine, DecoderEntry, EngineCommand, Received};
use crate::pipeline::params::ImageParams;
use crate::pipeline::types::{CodecParams, CodedPacket, DecodedFrame, Timestamp};

const FAMILY: &str = "ffmpeg";

/// Packet and frame timestamps are exchanged in microseconds
fn time_base() -> TimeBase {
    TimeBase::new(1, 1_000_000)
}

/// Software decoders offered through FFmpeg
const CODECS: &[(&str, &str)] = &[
    ("h264", "H.264 / AVC"),
    ("hevc", "H.265 / HEVC"),
    ("vp9", "Google VP9"),
    ("av1", "AOMedia AV1"),
    ("mpeg2video", "MPEG-2 video"),
];

#[derive(Debug, Default)]
pub struct FfmpegDriver;

impl FfmpegDriver {
    pub fn new() -> Self {
        Self
    }
}

impl DecoderDriver for FfmpegDriver {
    fn name(&self) -> &str {
        FAMILY
    }

    fn decoders(&self) -> Vec<DecoderEntry> {
        CODECS
            .iter()
            .map(|(codec, desc)| DecoderEntry::new(FAMILY, *codec, *codec, *desc))
            .collect()
    }

    fn create(&self) -> Box<dyn DecoderEngine> {
        Box::new(FfmpegEngine::new())
    }
}

/// Map the outcome of `take()`; a decoder error means no further progress
fn received_from<E: std::fmt::Display>(
    result: std::result::Result<Option<VideoFrame>, E>,
    draining: bool,
) -> Received {
    match result {
        Ok(Some(frame)) => Received::frame(FfmpegEngine::to_frame(frame)),
        Ok(None) if draining => Received::exhausted(),
        Ok(None) => Received::pending(),
        Err(e) => {
            log::warn!("FfmpegEngine: take() error: {}", e);
            Received::exhausted()
        }
    }
}

/// Video decoder engine backed by FFmpeg.
///
/// FFmpeg picks hardware acceleration on its own where the build supports it
/// (DXVA2/D3D11VA on Windows, VideoToolbox on macOS, VAAPI/VDPAU on Linux).
pub struct FfmpegEngine {
    decoder: Option<VideoDecoder>,
    decoder_name: String,
    draining: bool,
}

// The decoder context is only touched from the thread that owns the engine.
unsafe impl Send for FfmpegEngine {}

impl FfmpegEngine {
    pub fn new() -> Self {
        Self {
            decoder: None,
            decoder_name: String::new(),
            draining: false,
        }
    }

    fn open(name: &str) -> Result<VideoDecoder> {
        VideoDecoder::builder(name)
            .and_then(|b| b.time_base(time_base()).build())
            .map_err(|e| anyhow!("failed to open {}: {}", name, e))
    }

    fn to_frame(frame: VideoFrame) -> DecodedFrame {
        let mut data = BytesMut::new();
        for plane in frame.planes().iter() {
            data.extend_from_slice(plane.data());
        }

        let params = ImageParams::new(frame.width() as u32, frame.height() as u32);
        let pts = frame
            .pts()
            .as_micros()
            .map(|us| Timestamp::from_secs(us as f64 / 1_000_000.0));

        DecodedFrame::new(data.freeze(), pts, None, params)
    }
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn to_ff(ts: Option<Timestamp>) -> FfTimestamp {
    match ts {
        Some(ts) => FfTimestamp::from_micros((ts.as_secs() * 1_000_000.0).round() as i64),
        None => FfTimestamp::null(),
    }
}

impl DecoderEngine for FfmpegEngine {
    fn init(&mut self, _codec: &CodecParams, decoder: &str) -> Result<()> {
        self.decoder = Some(Self::open(decoder)?);
        self.decoder_name = decoder.to_string();
        self.draining = false;
        Ok(())
    }

    fn send_packet(&mut self, packet: Option<&CodedPacket>) -> bool {
        let Some(decoder) = self.decoder.as_mut() else {
            return false;
        };

        let Some(packet) = packet else {
            if !self.draining {
                if let Err(e) = decoder.try_flush() {
                    if e.is_again() {
                        return false;
                    }
                    log::warn!("FfmpegEngine: flush failed: {}", e);
                }
                self.draining = true;
            }
            return true;
        };

        let ff_packet = PacketMut::from(&packet.data[..])
            .with_time_base(time_base())
            .with_pts(to_ff(packet.pts))
            .with_dts(to_ff(packet.dts))
            .freeze();

        match decoder.try_push(ff_packet) {
            Ok(()) => true,
            Err(e) if e.is_again() => false,
            Err(e) => {
                // A corrupt packet is skipped; retrying it would never succeed.
                log::warn!("FfmpegEngine: failed to push packet: {}", e);
                true
            }
        }
    }

    fn receive_frame(&mut self) -> Received {
        let Some(decoder) = self.decoder.as_mut() else {
            return Received::exhausted();
        };

        received_from(decoder.take(), self.draining)
    }

    fn control(&mut self, cmd: EngineCommand) -> ControlResponse {
        match cmd {
            EngineCommand::Reset => {
                if self.decoder.is_none() {
                    return ControlResponse::Unsupported;
                }
                match Self::open(&self.decoder_name) {
                    Ok(decoder) => {
                        self.decoder = Some(decoder);
                        self.draining = false;
                        ControlResponse::Done
                    }
                    Err(e) => {
                        log::error!("FfmpegEngine: reset failed: {}", e);
                        ControlResponse::Unsupported
                    }
                }
            }
            // Frame skipping and reorder depth are not exposed by the bindings.
            EngineCommand::SetFrameDrop(_) | EngineCommand::GetBFrameDelay => {
                ControlResponse::Unsupported
            }
        }
    }

    fn uninit(&mut self) {
        self.decoder = None;
        self.draining = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_error_stops_progress() {
        let received = received_from::<&str>(Err("decoder failed"), false);
        assert!(received.frame.is_none());
        assert!(!received.progress);

        let received = received_from::<&str>(Ok(None), false);
        assert!(received.progress);
        assert!(!received_from::<&str>(Ok(None), true).progress);
    }

    #[test]
    fn test_uninitialized_engine_is_exhausted() {
        let mut engine = FfmpegEngine::new();
        assert!(!engine.receive_frame().progress);
    }
}
