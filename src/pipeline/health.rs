//! Health counters for the decode pipeline
//!
//! Counters are cumulative for the lifetime of the pipeline (resets and
//! segment switches do not clear them) and can be read from any thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}

/// Health metrics for one decode pipeline
///
/// All fields use atomic operations for thread-safe access.
pub struct PipelineHealth {
    /// Frames returned by the decoder engine
    pub frames_decoded: AtomicU64,

    /// Frames handed to the caller
    pub frames_delivered: AtomicU64,

    /// Decoded frames thrown away for lying outside the segment or start cut
    pub frames_discarded: AtomicU64,

    /// Frames the decoder skipped while soft framedrop was active
    pub decoder_drops: AtomicU64,

    /// Packets accepted by the decoder engine
    pub packets_sent: AtomicU64,

    /// Packets the engine refused and that had to be sent again
    pub send_retries: AtomicU64,

    pub segment_switches: AtomicU64,

    /// Decoder engines created because the codec changed at a segment boundary
    pub decoder_reinits: AtomicU64,

    /// Frames whose pts had to be made up
    pub synthesized_pts: AtomicU64,

    /// Coded bytes accepted by the decoder engine
    pub bytes_sent: AtomicU64,

    /// Unix microseconds of the last delivered frame
    pub last_frame_time: AtomicU64,
}

impl PipelineHealth {
    pub fn new() -> Self {
        Self {
            frames_decoded: AtomicU64::new(0),
            frames_delivered: AtomicU64::new(0),
            frames_discarded: AtomicU64::new(0),
            decoder_drops: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
            send_retries: AtomicU64::new(0),
            segment_switches: AtomicU64::new(0),
            decoder_reinits: AtomicU64::new(0),
            synthesized_pts: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            last_frame_time: AtomicU64::new(now_micros()),
        }
    }

    pub fn record_decoded(&self, synthesized: bool) {
        self.frames_decoded.fetch_add(1, Ordering::Relaxed);
        if synthesized {
            self.synthesized_pts.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_delivered(&self) {
        self.last_frame_time.store(now_micros(), Ordering::Relaxed);
        self.frames_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discarded(&self) {
        self.frames_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decoder_drop(&self) {
        self.decoder_drops.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a packet accepted by the engine
    pub fn record_packet(&self, size: usize) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(size as u64, Ordering::Relaxed);
    }

    pub fn record_send_retry(&self) {
        self.send_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_segment_switch(&self, reinit: bool) {
        self.segment_switches.fetch_add(1, Ordering::Relaxed);
        if reinit {
            self.decoder_reinits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded.load(Ordering::Relaxed)
    }

    pub fn frames_delivered(&self) -> u64 {
        self.frames_delivered.load(Ordering::Relaxed)
    }

    pub fn frames_discarded(&self) -> u64 {
        self.frames_discarded.load(Ordering::Relaxed)
    }

    pub fn decoder_drops(&self) -> u64 {
        self.decoder_drops.load(Ordering::Relaxed)
    }

    pub fn packets_sent(&self) -> u64 {
        self.packets_sent.load(Ordering::Relaxed)
    }

    pub fn send_retries(&self) -> u64 {
        self.send_retries.load(Ordering::Relaxed)
    }

    pub fn segment_switches(&self) -> u64 {
        self.segment_switches.load(Ordering::Relaxed)
    }

    pub fn decoder_reinits(&self) -> u64 {
        self.decoder_reinits.load(Ordering::Relaxed)
    }

    pub fn synthesized_pts(&self) -> u64 {
        self.synthesized_pts.load(Ordering::Relaxed)
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    /// Decoder drops as a percentage of all frames the decoder dealt with
    pub fn frame_drop_rate(&self) -> f64 {
        let drops = self.decoder_drops();
        let total = self.frames_decoded() + drops;
        if total == 0 {
            return 0.0;
        }
        (drops as f64 / total as f64) * 100.0
    }

    /// Check if no frame was delivered for longer than `threshold`
    pub fn is_stalled(&self, threshold: Duration) -> bool {
        let last_frame = self.last_frame_time.load(Ordering::Relaxed);
        now_micros().saturating_sub(last_frame) > threshold.as_micros() as u64
    }

    pub fn summary(&self) -> HealthSummary {
        HealthSummary {
            frames_decoded: self.frames_decoded(),
            frames_delivered: self.frames_delivered(),
            frames_discarded: self.frames_discarded(),
            decoder_drops: self.decoder_drops(),
            packets_sent: self.packets_sent(),
            send_retries: self.send_retries(),
            segment_switches: self.segment_switches(),
            decoder_reinits: self.decoder_reinits(),
            synthesized_pts: self.synthesized_pts(),
            bytes_sent: self.bytes_sent(),
            frame_drop_rate: self.frame_drop_rate(),
        }
    }
}

impl Default for PipelineHealth {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of health metrics
#[derive(Debug, Clone)]
pub struct HealthSummary {
    pub frames_decoded: u64,
    pub frames_delivered: u64,
    pub frames_discarded: u64,
    pub decoder_drops: u64,
    pub packets_sent: u64,
    pub send_retries: u64,
    pub segment_switches: u64,
    pub decoder_reinits: u64,
    pub synthesized_pts: u64,
    pub bytes_sent: u64,
    pub frame_drop_rate: f64,
}

impl std::fmt::Display for HealthSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Health: {} packets ({} bytes, {} retries), {} frames decoded, {} delivered, {} discarded, {} drops ({:.2}%), {} segment switches ({} reinits), {} synthesized pts",
            self.packets_sent,
            self.bytes_sent,
            self.send_retries,
            self.frames_decoded,
            self.frames_delivered,
            self.frames_discarded,
            self.decoder_drops,
            self.frame_drop_rate,
            self.segment_switches,
            self.decoder_reinits,
            self.synthesized_pts
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_counters() {
        let health = PipelineHealth::new();

        health.record_packet(1000);
        health.record_packet(500);
        health.record_send_retry();
        health.record_decoded(false);
        health.record_decoded(true);
        health.record_delivered();
        health.record_discarded();

        assert_eq!(health.packets_sent(), 2);
        assert_eq!(health.bytes_sent(), 1500);
        assert_eq!(health.send_retries(), 1);
        assert_eq!(health.frames_decoded(), 2);
        assert_eq!(health.synthesized_pts(), 1);
        assert_eq!(health.frames_delivered(), 1);
        assert_eq!(health.frames_discarded(), 1);
        assert_eq!(health.frame_drop_rate(), 0.0);

        health.record_decoder_drop();
        health.record_decoder_drop();
        assert_eq!(health.decoder_drops(), 2);
        assert!((health.frame_drop_rate() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_segment_switch_counters() {
        let health = PipelineHealth::new();
        health.record_segment_switch(false);
        health.record_segment_switch(true);

        let summary = health.summary();
        assert_eq!(summary.segment_switches, 2);
        assert_eq!(summary.decoder_reinits, 1);
        assert!(summary.to_string().contains("2 segment switches (1 reinits)"));
    }

    #[test]
    fn test_stall_detection() {
        let health = PipelineHealth::new();
        assert!(!health.is_stalled(Duration::from_secs(1)));

        health.record_delivered();
        std::thread::sleep(Duration::from_millis(150));
        assert!(health.is_stalled(Duration::from_millis(100)));
    }
}
