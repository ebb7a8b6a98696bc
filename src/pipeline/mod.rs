//! Video decode pipeline
//!
//! The pipeline is organized around a single controller:
//! - `VideoPipeline` owns the decoder engine and sequences packet feeding,
//!   frame retrieval, segment switches and framedrop
//! - `TimestampReconciler` turns decoder timestamps into one trusted pts
//! - `SegmentTracker` follows edit-list boundaries in the packet stream
//! - `ParamsCache` derives output image parameters from decoder output
//! - `DecodeStage` drives a pipeline on a tokio task
//! - `PipelineHealth` tracks counters readable from other threads

pub mod controller;
pub mod health;
pub mod params;
pub mod segment;
pub mod stage;
pub mod state;
pub mod timestamps;
pub mod types;

pub use controller::VideoPipeline;
pub use health::{HealthSummary, PipelineHealth};
pub use params::ImageParams;
pub use stage::{DecodeStage, PipelineStage};
pub use state::DataState;
pub use types::{CodecParams, CodedPacket, DecodedFrame, Timestamp};
