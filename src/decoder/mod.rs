//! Video decoder engines
//!
//! The pipeline drives every backend through [`DecoderEngine`]. Backends are
//! announced by a [`DecoderDriver`], which lists the decoders it provides and
//! creates engine instances. The list of drivers is handed to the pipeline
//! explicitly; there is no global registry.

#[cfg(feature = "ffmpeg")]
mod ffmpeg;
pub mod rawvideo;
mod select;

use anyhow::Result;
use std::sync::Arc;

use crate::pipeline::types::{CodecParams, CodedPacket, DecodedFrame};

#[cfg(feature = "ffmpeg")]
pub use ffmpeg::{FfmpegDriver, FfmpegEngine};
pub use rawvideo::{RawVideoDriver, RawVideoEngine};
pub use select::select_decoders;

/// Framedrop directive passed to the engine before each packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameDrop {
    #[default]
    None,
    /// The engine may skip non-reference frames to catch up
    Soft,
    /// The packet lies before the start cut; it should produce no frame at all
    Hard,
}

/// Out-of-band commands understood by engines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCommand {
    /// Flush all internal state, as after a seek
    Reset,
    SetFrameDrop(FrameDrop),
    /// Query the number of frames the decoder delays output by
    GetBFrameDelay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlResponse {
    Done,
    Unsupported,
    BFrameDelay(i32),
}

/// Result of polling an engine for output
#[derive(Debug)]
pub struct Received {
    pub frame: Option<DecodedFrame>,
    /// `false` means the engine is exhausted until it gets more input or a reset
    pub progress: bool,
}

impl Received {
    pub fn frame(frame: DecodedFrame) -> Self {
        Self {
            frame: Some(frame),
            progress: true,
        }
    }

    /// No frame yet, but the engine is still working
    pub fn pending() -> Self {
        Self {
            frame: None,
            progress: true,
        }
    }

    /// Nothing left to output
    pub fn exhausted() -> Self {
        Self {
            frame: None,
            progress: false,
        }
    }
}

/// A decoder backend instance
pub trait DecoderEngine: Send {
    /// Open `decoder` for `codec`
    fn init(&mut self, codec: &CodecParams, decoder: &str) -> Result<()>;

    /// Stage a packet; `None` asks the engine to drain.
    ///
    /// Returns `false` if the packet was not accepted and must be sent again
    /// after output has been collected.
    fn send_packet(&mut self, packet: Option<&CodedPacket>) -> bool;

    /// Poll for a decoded frame
    fn receive_frame(&mut self) -> Received;

    fn control(&mut self, cmd: EngineCommand) -> ControlResponse;

    /// Release all decoder resources
    fn uninit(&mut self);
}

/// One decoder a driver can provide
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderEntry {
    /// Driver name
    pub family: String,
    /// Codec handled
    pub codec: String,
    /// Decoder name within the family
    pub decoder: String,
    pub desc: String,
}

impl DecoderEntry {
    pub fn new(
        family: impl Into<String>,
        codec: impl Into<String>,
        decoder: impl Into<String>,
        desc: impl Into<String>,
    ) -> Self {
        Self {
            family: family.into(),
            codec: codec.into(),
            decoder: decoder.into(),
            desc: desc.into(),
        }
    }
}

impl std::fmt::Display for DecoderEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} - {}", self.family, self.decoder, self.desc)
    }
}

/// Factory for one decoder backend family
pub trait DecoderDriver: Send + Sync {
    fn name(&self) -> &str;

    /// Decoders this driver provides
    fn decoders(&self) -> Vec<DecoderEntry>;

    /// Create an uninitialized engine
    fn create(&self) -> Box<dyn DecoderEngine>;
}

/// Every decoder offered by `drivers`, in driver order
pub fn decoder_list(drivers: &[Arc<dyn DecoderDriver>]) -> Vec<DecoderEntry> {
    drivers.iter().flat_map(|d| d.decoders()).collect()
}

pub fn find_driver<'a>(
    drivers: &'a [Arc<dyn DecoderDriver>],
    family: &str,
) -> Option<&'a Arc<dyn DecoderDriver>> {
    drivers.iter().find(|d| d.name() == family)
}

/// Drivers compiled into this build, in preference order
pub fn default_drivers() -> Vec<Arc<dyn DecoderDriver>> {
    let mut drivers: Vec<Arc<dyn DecoderDriver>> = Vec::new();
    #[cfg(feature = "ffmpeg")]
    drivers.push(Arc::new(FfmpegDriver::new()));
    drivers.push(Arc::new(RawVideoDriver));
    drivers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_drivers_include_rawvideo() {
        let drivers = default_drivers();
        assert!(find_driver(&drivers, "rawvideo").is_some());
        assert!(find_driver(&drivers, "nonexistent").is_none());

        let list = decoder_list(&drivers);
        assert!(list.iter().any(|e| e.codec == "rawvideo"));
    }

    #[test]
    fn test_entry_display() {
        let e = DecoderEntry::new("rawvideo", "rawvideo", "rawvideo", "passthrough");
        assert_eq!(e.to_string(), "rawvideo:rawvideo - passthrough");
    }
}
