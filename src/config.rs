use crate::pipeline::params::StereoMode;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which aspect ratio source wins when both bitstream and container carry one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AspectMethod {
    #[default]
    Bitstream,
    Container,
}

/// Decoder options, as set by the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderOptions {
    /// Use decoder timestamps; when off every pts is synthesized from the frame rate
    pub correct_pts: bool,
    /// Frame rate assumed when the container does not provide one
    pub fallback_fps: f64,
    pub aspect_method: AspectMethod,
    /// User aspect override; 0 forces square pixels
    pub movie_aspect: Option<f64>,
    /// User rotation added to the container rotation; `None` disables rotation
    pub video_rotate: Option<u32>,
    pub stereo_out: StereoMode,
    /// Decoder selection, e.g. "rawvideo,-ffmpeg:h264"
    pub video_decoders: Option<String>,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        DecoderOptions {
            correct_pts: true,
            fallback_fps: 25.0,
            aspect_method: AspectMethod::Bitstream,
            movie_aspect: None,
            video_rotate: Some(0),
            stereo_out: StereoMode::Mono,
            video_decoders: None,
        }
    }
}

impl DecoderOptions {
    /// Load options from a JSON file; missing keys keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading decoder options from {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Frame rate used for timestamp synthesis
    pub fn effective_fps(&self, container_fps: Option<f64>) -> f64 {
        match container_fps {
            Some(fps) if fps > 0.0 => fps,
            _ if self.fallback_fps > 0.0 => self.fallback_fps,
            _ => 25.0,
        }
    }
}

/// Returns a version as specified in Cargo.toml
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn app_name() -> &'static str {
    env!("CARGO_PKG_NAME")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let opts = DecoderOptions::from_json(r#"{ "correct_pts": false, "movie_aspect": 1.5 }"#).unwrap();
        assert!(!opts.correct_pts);
        assert_eq!(opts.movie_aspect, Some(1.5));
        assert_eq!(opts.fallback_fps, 25.0);
        assert_eq!(opts.video_rotate, Some(0));
        assert_eq!(opts.aspect_method, AspectMethod::Bitstream);
    }

    #[test]
    fn test_enum_names() {
        let opts = DecoderOptions::from_json(
            r#"{ "aspect_method": "container", "stereo_out": "side_by_side_left_first", "video_rotate": null }"#,
        )
        .unwrap();
        assert_eq!(opts.aspect_method, AspectMethod::Container);
        assert_eq!(opts.stereo_out, StereoMode::SideBySideLeftFirst);
        assert_eq!(opts.video_rotate, None);
    }

    #[test]
    fn test_effective_fps() {
        let opts = DecoderOptions::default();
        assert_eq!(opts.effective_fps(Some(30.0)), 30.0);
        assert_eq!(opts.effective_fps(Some(0.0)), 25.0);
        assert_eq!(opts.effective_fps(None), 25.0);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(DecoderOptions::from_json_file("/nonexistent/vidflow.json").is_err());
    }
}
