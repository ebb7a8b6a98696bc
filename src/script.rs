//! Synthetic stream scripts
//!
//! A script describes a stream as a list of segments; each segment expands
//! into evenly spaced packets of one codec. More than one segment (or an
//! explicit start/end) produces segmented packets, so scripts exercise the
//! segment switching of the pipeline.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use vidflow::pipeline::types::{CodecParams, CodedPacket, Timestamp};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentScript {
    pub codec: String,
    pub width: u32,
    pub height: u32,
    /// Container frame rate; also the packet spacing
    pub fps: Option<f64>,
    pub frames: u32,
    /// pts of the first packet, in seconds
    pub first_pts: f64,
    pub start: Option<f64>,
    pub end: Option<f64>,
    pub avi_dts: bool,
    /// Emit packets without pts (dts only)
    pub missing_pts: bool,
    /// Every n-th packet is a keyframe; 0 marks only the first
    pub keyframe_interval: u32,
}

impl Default for SegmentScript {
    fn default() -> Self {
        Self {
            codec: "rawvideo".to_string(),
            width: 4,
            height: 4,
            fps: Some(25.0),
            frames: 25,
            first_pts: 0.0,
            start: None,
            end: None,
            avi_dts: false,
            missing_pts: false,
            keyframe_interval: 12,
        }
    }
}

impl SegmentScript {
    fn codec_params(&self) -> CodecParams {
        let mut codec = CodecParams::new(self.codec.clone()).with_size(self.width, self.height);
        codec.fps = self.fps;
        codec.avi_dts = self.avi_dts;
        codec
    }

    fn frame_time(&self) -> f64 {
        match self.fps {
            Some(fps) if fps > 0.0 => 1.0 / fps,
            _ => 1.0 / 25.0,
        }
    }

    /// Payload size of one uncompressed 4:2:0 picture
    fn payload_size(&self) -> usize {
        (self.width as usize * self.height as usize * 3).div_ceil(2)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamScript {
    pub segments: Vec<SegmentScript>,
}

impl StreamScript {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading stream script {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    /// Two one-second rawvideo segments, the second with a larger picture
    pub fn demo() -> Self {
        Self {
            segments: vec![
                SegmentScript {
                    start: Some(0.0),
                    end: Some(1.0),
                    ..Default::default()
                },
                SegmentScript {
                    width: 8,
                    height: 8,
                    first_pts: 1.0,
                    start: Some(1.0),
                    end: Some(2.0),
                    ..Default::default()
                },
            ],
        }
    }

    /// Expand the script into the codec of the first segment and all packets
    pub fn packets(&self) -> Result<(Arc<CodecParams>, Vec<CodedPacket>)> {
        let Some(first) = self.segments.first() else {
            bail!("stream script has no segments");
        };
        let initial = Arc::new(first.codec_params());
        let segmented =
            self.segments.len() > 1 || self.segments.iter().any(|s| s.start.is_some() || s.end.is_some());

        let mut packets = Vec::new();
        for (n, segment) in self.segments.iter().enumerate() {
            let codec = if n == 0 {
                Arc::clone(&initial)
            } else {
                Arc::new(segment.codec_params())
            };
            let frame_time = segment.frame_time();

            for i in 0..segment.frames {
                let time = Some(Timestamp::from_secs(segment.first_pts + i as f64 * frame_time));
                let pts = if segment.missing_pts { None } else { time };
                let mut packet = CodedPacket::new(vec![i as u8; segment.payload_size()], pts, time);
                packet.duration = Some(frame_time);

                if segmented {
                    packet = packet.with_segment(
                        segment.start.map(Timestamp::from_secs),
                        segment.end.map(Timestamp::from_secs),
                        Some(Arc::clone(&codec)),
                    );
                }

                let keyframe = match segment.keyframe_interval {
                    0 => i == 0,
                    interval => i % interval == 0,
                };
                if keyframe {
                    packet = packet.keyframe();
                }
                packets.push(packet);
            }
        }

        Ok((initial, packets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_expands_to_segmented_packets() {
        let (codec, packets) = StreamScript::demo().packets().unwrap();
        assert_eq!(codec.codec, "rawvideo");
        assert_eq!((codec.width, codec.height), (4, 4));
        assert_eq!(packets.len(), 50);
        assert!(packets.iter().all(|p| p.segmented));

        let last = packets.last().unwrap();
        assert_eq!(last.start, Some(Timestamp::from_secs(1.0)));
        assert_eq!(last.codec.as_ref().unwrap().width, 8);
        assert_eq!(last.size(), 96);
        assert!(packets[0].keyframe && packets[12].keyframe && !packets[1].keyframe);
    }

    #[test]
    fn test_single_unbounded_segment_is_plain() {
        let script: StreamScript =
            serde_json::from_str(r#"{"segments": [{"frames": 3, "missing_pts": true}]}"#).unwrap();
        let (_, packets) = script.packets().unwrap();
        assert_eq!(packets.len(), 3);
        assert!(packets.iter().all(|p| !p.segmented && p.pts.is_none()));
        assert_eq!(packets[2].dts, Some(Timestamp::from_secs(0.08)));
    }

    #[test]
    fn test_empty_script_is_rejected() {
        assert!(StreamScript::default().packets().is_err());
    }
}
