//! Core types for the decode pipeline

use bytes::Bytes;
use std::sync::Arc;

use super::params::{ColorParams, ImageParams, Spherical, StereoMode};

/// Presentation/decode time in seconds
///
/// "Unset" is expressed as `Option<Timestamp>::None` everywhere, so zero and
/// negative values are legitimate times.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Timestamp {
    secs: f64,
}

impl Timestamp {
    /// Create a timestamp from seconds
    pub fn from_secs(secs: f64) -> Self {
        Self { secs }
    }

    /// Create a timestamp from milliseconds
    pub fn from_millis(millis: i64) -> Self {
        Self {
            secs: millis as f64 / 1000.0,
        }
    }

    /// Seconds value
    pub fn as_secs(&self) -> f64 {
        self.secs
    }

    /// Shift this timestamp by `secs` (may be negative)
    pub fn offset(&self, secs: f64) -> Self {
        Self {
            secs: self.secs + secs,
        }
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}s", self.secs)
    }
}

/// Stream-level codec description, shared by every packet of a segment
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CodecParams {
    /// Codec identifier, e.g. "h264" or "rawvideo"
    pub codec: String,
    /// Container frame rate, if known
    pub fps: Option<f64>,
    /// Timestamps follow the AVI convention (decode order, needs B-frame delay compensation)
    pub avi_dts: bool,
    /// Container pixel aspect ratio (width part), 0 if unknown
    pub par_w: u32,
    /// Container pixel aspect ratio (height part), 0 if unknown
    pub par_h: u32,
    /// Coded width, used by engines that cannot probe the bitstream
    pub width: u32,
    /// Coded height
    pub height: u32,
    /// Container rotation in degrees
    pub rotate: u32,
    /// Stereo layout signalled by the container
    pub stereo_mode: StereoMode,
    /// Color description signalled by the container
    pub color: ColorParams,
    /// Spherical video metadata signalled by the container
    pub spherical: Spherical,
}

impl CodecParams {
    /// Minimal descriptor for `codec`
    pub fn new(codec: impl Into<String>) -> Self {
        Self {
            codec: codec.into(),
            ..Default::default()
        }
    }

    /// Set the container frame rate
    pub fn with_fps(mut self, fps: f64) -> Self {
        self.fps = Some(fps);
        self
    }

    /// Set the coded dimensions
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Valid (positive) container frame rate
    pub fn frame_rate(&self) -> Option<f64> {
        self.fps.filter(|fps| *fps > 0.0)
    }
}

/// Coded packet as produced by the demuxer
#[derive(Clone)]
pub struct CodedPacket {
    /// Coded payload
    pub data: Bytes,
    /// Presentation timestamp
    pub pts: Option<Timestamp>,
    /// Decode timestamp
    pub dts: Option<Timestamp>,
    /// Packet duration in seconds, if known
    pub duration: Option<f64>,
    /// Whether the packet carries segment information
    pub segmented: bool,
    /// Segment start (unset = unbounded)
    pub start: Option<Timestamp>,
    /// Segment end (unset = unbounded)
    pub end: Option<Timestamp>,
    /// Codec of the segment this packet belongs to; `None` inherits the active codec
    pub codec: Option<Arc<CodecParams>>,
    /// Whether this is a keyframe
    pub keyframe: bool,
    /// Source stream index
    pub stream: usize,
}

impl CodedPacket {
    /// Create a plain (non-segmented) packet
    pub fn new(data: impl Into<Bytes>, pts: Option<Timestamp>, dts: Option<Timestamp>) -> Self {
        Self {
            data: data.into(),
            pts,
            dts,
            duration: None,
            segmented: false,
            start: None,
            end: None,
            codec: None,
            keyframe: false,
            stream: 0,
        }
    }

    /// Mark this packet as belonging to the segment `[start, end)` of `codec`
    pub fn with_segment(
        mut self,
        start: Option<Timestamp>,
        end: Option<Timestamp>,
        codec: Option<Arc<CodecParams>>,
    ) -> Self {
        self.segmented = true;
        self.start = start;
        self.end = end;
        self.codec = codec;
        self
    }

    /// Mark this packet as a keyframe
    pub fn keyframe(mut self) -> Self {
        self.keyframe = true;
        self
    }

    /// pts if set, dts otherwise
    pub fn pdts(&self) -> Option<Timestamp> {
        self.pts.or(self.dts)
    }

    /// Get the size of the packet payload in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

impl std::fmt::Debug for CodedPacket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut debug = f.debug_struct("CodedPacket");
        debug
            .field("pts", &self.pts)
            .field("dts", &self.dts)
            .field("keyframe", &self.keyframe)
            .field("stream", &self.stream)
            .field("size", &self.size());

        if self.segmented {
            debug
                .field("start", &self.start)
                .field("end", &self.end)
                .field("codec", &self.codec.as_ref().map(|c| c.codec.as_str()));
        }

        debug.finish()
    }
}

/// Decoded picture as produced by a decoder engine
#[derive(Clone)]
pub struct DecodedFrame {
    /// Opaque image data
    pub data: Bytes,
    /// Presentation timestamp (native on output of the engine, reconciled on delivery)
    pub pts: Option<Timestamp>,
    /// Decode timestamp reported by the engine
    pub dts: Option<Timestamp>,
    /// Image parameters
    pub params: ImageParams,
}

impl DecodedFrame {
    /// Create a new decoded frame
    pub fn new(
        data: impl Into<Bytes>,
        pts: Option<Timestamp>,
        dts: Option<Timestamp>,
        params: ImageParams,
    ) -> Self {
        Self {
            data: data.into(),
            pts,
            dts,
            params,
        }
    }

    /// Get the size of the frame data in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

impl std::fmt::Debug for DecodedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedFrame")
            .field("pts", &self.pts)
            .field("dts", &self.dts)
            .field("width", &self.params.w)
            .field("height", &self.params.h)
            .field("size", &self.size())
            .finish()
    }
}
