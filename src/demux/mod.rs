//! Demuxer side of the pipeline
//!
//! The pipeline pulls coded packets through [`DemuxerFeed`]. Reads never
//! block: when nothing is buffered the feed answers `NoPacketYet` and signals
//! the driving thread once data arrives.

pub mod channel;

pub use channel::{ChannelDemuxer, PacketSender, packet_channel};

use crate::pipeline::types::CodedPacket;

/// Outcome of a non-blocking packet read
#[derive(Debug)]
pub enum ReadResult {
    Packet(CodedPacket),
    /// Nothing buffered yet; a wake-up follows when data arrives
    NoPacketYet,
    /// The stream has ended
    Eof,
}

/// Source of coded packets for one stream
pub trait DemuxerFeed: Send {
    fn try_read_packet(&mut self) -> ReadResult;
}
