//! Channel-backed demuxer feed
//!
//! A producer task pushes packets through a [`PacketSender`]; the pipeline
//! reads them with [`ChannelDemuxer::try_read_packet`]. Every send (and the
//! final drop of a sender) raises the shared [`Notify`], which is the wake-up
//! the driving thread waits on after a `Wait` state.

use anyhow::{Result, anyhow};
use std::sync::Arc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{Notify, mpsc};

use super::{DemuxerFeed, ReadResult};
use crate::pipeline::types::CodedPacket;

/// Create a connected sender/feed pair buffering up to `capacity` packets
pub fn packet_channel(capacity: usize) -> (PacketSender, ChannelDemuxer) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let wakeup = Arc::new(Notify::new());
    (
        PacketSender {
            tx,
            wakeup: WakeOnDrop(Arc::clone(&wakeup)),
        },
        ChannelDemuxer { rx, wakeup },
    )
}

/// Producer half; dropping every clone ends the stream
#[derive(Clone)]
pub struct PacketSender {
    tx: mpsc::Sender<CodedPacket>,
    // Declared after `tx`: the channel is closed by the time the reader wakes.
    wakeup: WakeOnDrop,
}

/// Raises the wake-up when the owning sender goes away, since the reader
/// may be waiting for the EOF this causes
#[derive(Clone)]
struct WakeOnDrop(Arc<Notify>);

impl Drop for WakeOnDrop {
    fn drop(&mut self) {
        self.0.notify_one();
    }
}

impl PacketSender {
    /// Queue a packet, waiting while the buffer is full
    pub async fn send(&self, packet: CodedPacket) -> Result<()> {
        self.tx
            .send(packet)
            .await
            .map_err(|_| anyhow!("demuxer feed closed"))?;
        self.wakeup.0.notify_one();
        Ok(())
    }
}

/// Consumer half, read by the pipeline
pub struct ChannelDemuxer {
    rx: mpsc::Receiver<CodedPacket>,
    wakeup: Arc<Notify>,
}

impl ChannelDemuxer {
    /// Signal raised when new data (or EOF) becomes available
    pub fn wakeup(&self) -> Arc<Notify> {
        Arc::clone(&self.wakeup)
    }
}

impl DemuxerFeed for ChannelDemuxer {
    fn try_read_packet(&mut self) -> ReadResult {
        match self.rx.try_recv() {
            Ok(packet) => ReadResult::Packet(packet),
            Err(TryRecvError::Empty) => ReadResult::NoPacketYet,
            Err(TryRecvError::Disconnected) => ReadResult::Eof,
        }
    }
}
