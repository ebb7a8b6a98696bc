//! Stream recording
//!
//! Every packet successfully sent to the decoder is also handed to an
//! attached recorder. Recording is fire-and-forget: failures are logged and
//! stop the recorder, they never reach the pipeline.

use anyhow::{Context, Result};
use log::{error, info};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::pipeline::types::CodedPacket;

/// Sink for coded packets
pub trait PacketRecorder: Send {
    fn feed_packet(&mut self, packet: &CodedPacket);
}

/// Appends packet payloads to a file, producing an elementary stream dump
pub struct StreamDump {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    packets: u64,
    bytes: u64,
}

impl StreamDump {
    /// Create (or truncate) the dump file
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)
            .with_context(|| format!("creating stream dump {}", path.display()))?;
        info!("StreamDump: recording to {}", path.display());
        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            packets: 0,
            bytes: 0,
        })
    }

    pub fn is_saving(&self) -> bool {
        self.writer.is_some()
    }

    pub fn stats(&self) -> (u64, u64) {
        (self.packets, self.bytes)
    }

    /// Flush and close the file
    pub fn stop(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                error!("StreamDump: flushing {} failed: {}", self.path.display(), e);
            }
            info!(
                "StreamDump: finished ({} packets, {} bytes)",
                self.packets, self.bytes
            );
        }
    }
}

impl PacketRecorder for StreamDump {
    fn feed_packet(&mut self, packet: &CodedPacket) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };

        match writer.write_all(&packet.data) {
            Ok(()) => {
                self.packets += 1;
                self.bytes += packet.size() as u64;
            }
            Err(e) => {
                error!("StreamDump: write to {} failed: {}", self.path.display(), e);
                self.writer = None;
            }
        }
    }
}

impl Drop for StreamDump {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::Timestamp;

    #[test]
    fn test_dump_appends_payloads() {
        let path = std::env::temp_dir().join(format!("vidflow-dump-{}.bin", std::process::id()));
        let mut dump = StreamDump::create(&path).unwrap();
        assert!(dump.is_saving());

        dump.feed_packet(&CodedPacket::new(vec![1u8, 2], Some(Timestamp::from_secs(0.0)), None));
        dump.feed_packet(&CodedPacket::new(vec![3u8], None, None));
        assert_eq!(dump.stats(), (2, 3));

        dump.stop();
        assert!(!dump.is_saving());
        // feeding after stop is ignored
        dump.feed_packet(&CodedPacket::new(vec![4u8], None, None));
        assert_eq!(dump.stats(), (2, 3));

        assert_eq!(std::fs::read(&path).unwrap(), vec![1u8, 2, 3]);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_create_in_missing_dir_fails() {
        assert!(StreamDump::create("/nonexistent-dir/vidflow/dump.bin").is_err());
    }
}
