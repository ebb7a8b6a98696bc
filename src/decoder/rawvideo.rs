//! Passthrough engine for uncompressed video
//!
//! Every packet already is a picture, so decoding just wraps the payload
//! into a frame. Useful on its own for raw streams and as the always
//! available fallback backend.

use anyhow::{Result, bail};
use std::collections::VecDeque;

use super::{ControlResponse, DecoderDriver, DecoderEngine, DecoderEntry, EngineCommand, FrameDrop, Received};
use crate::pipeline::params::ImageParams;
use crate::pipeline::types::{CodecParams, CodedPacket, DecodedFrame};

pub const RAWVIDEO: &str = "rawvideo";

/// Frames held before `send_packet` starts refusing input
const QUEUE_CAPACITY: usize = 4;

#[derive(Debug, Clone, Copy, Default)]
pub struct RawVideoDriver;

impl DecoderDriver for RawVideoDriver {
    fn name(&self) -> &str {
        RAWVIDEO
    }

    fn decoders(&self) -> Vec<DecoderEntry> {
        vec![DecoderEntry::new(
            RAWVIDEO,
            RAWVIDEO,
            RAWVIDEO,
            "uncompressed video passthrough",
        )]
    }

    fn create(&self) -> Box<dyn DecoderEngine> {
        Box::new(RawVideoEngine::new())
    }
}

#[derive(Debug, Default)]
pub struct RawVideoEngine {
    params: Option<ImageParams>,
    queue: VecDeque<DecodedFrame>,
    framedrop: FrameDrop,
    draining: bool,
}

impl RawVideoEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.params.is_some()
    }
}

impl DecoderEngine for RawVideoEngine {
    fn init(&mut self, codec: &CodecParams, decoder: &str) -> Result<()> {
        if codec.codec != RAWVIDEO || decoder != RAWVIDEO {
            bail!("rawvideo cannot decode {} with {}", codec.codec, decoder);
        }
        if codec.width == 0 || codec.height == 0 {
            bail!("rawvideo needs the frame size from the container");
        }
        self.params = Some(ImageParams::new(codec.width, codec.height));
        self.queue.clear();
        self.draining = false;
        Ok(())
    }

    fn send_packet(&mut self, packet: Option<&CodedPacket>) -> bool {
        let Some(params) = self.params else {
            return false;
        };

        let Some(packet) = packet else {
            self.draining = true;
            return true;
        };

        if self.queue.len() >= QUEUE_CAPACITY {
            return false;
        }

        self.draining = false;
        if self.framedrop != FrameDrop::Hard {
            self.queue.push_back(DecodedFrame::new(
                packet.data.clone(),
                packet.pts,
                packet.dts,
                params,
            ));
        }
        true
    }

    fn receive_frame(&mut self) -> Received {
        match self.queue.pop_front() {
            Some(frame) => Received::frame(frame),
            None if self.draining || self.params.is_none() => Received::exhausted(),
            None => Received::pending(),
        }
    }

    fn control(&mut self, cmd: EngineCommand) -> ControlResponse {
        match cmd {
            EngineCommand::Reset => {
                self.queue.clear();
                self.draining = false;
                ControlResponse::Done
            }
            EngineCommand::SetFrameDrop(framedrop) => {
                self.framedrop = framedrop;
                ControlResponse::Done
            }
            EngineCommand::GetBFrameDelay => ControlResponse::BFrameDelay(0),
        }
    }

    fn uninit(&mut self) {
        self.params = None;
        self.queue.clear();
        self.draining = false;
    }
}
