//! Timestamp reconciliation
//!
//! Turns the pts/dts pair a decoder reports for each frame into a single
//! presentation timestamp. Decoders and containers regularly get timestamps
//! wrong, so this keeps monotonicity statistics for both and falls back to
//! dts, or to synthesized timestamps, when pts cannot be trusted.

use log::warn;

use super::types::Timestamp;

/// Number of frames observed before packet timestamps are trusted
pub const PROBE_FRAMES: u32 = 10;

/// Whether packet timestamps can be relied on (used for hard framedrop)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokenPts {
    /// Still observing; holds the number of frames left before deciding
    Probing(u32),
    /// A problem was seen; stays broken until the probe restarts
    Broken,
    /// Probe window passed without problems
    Fine,
}

impl BrokenPts {
    pub fn probing() -> Self {
        BrokenPts::Probing(PROBE_FRAMES)
    }

    fn advance(self) -> Self {
        match self {
            BrokenPts::Probing(left) if left <= 1 => BrokenPts::Fine,
            BrokenPts::Probing(left) => BrokenPts::Probing(left - 1),
            other => other,
        }
    }

    /// Only a completed, clean probe counts as trustworthy
    pub fn is_trusted(&self) -> bool {
        matches!(self, BrokenPts::Fine)
    }
}

/// Result of reconciling one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reconciled {
    pub pts: Timestamp,
    /// The value was made up from the frame rate instead of taken from the decoder
    pub synthesized: bool,
}

/// Per-stream timestamp state
#[derive(Debug, Clone)]
pub struct TimestampReconciler {
    codec_pts: Option<Timestamp>,
    codec_dts: Option<Timestamp>,
    pts_problems: u64,
    dts_problems: u64,
    broken_pts: BrokenPts,
    missing_pts_warnings: u32,
    decoded_pts: Option<Timestamp>,
    first_packet_pts: Option<Timestamp>,
}

impl Default for TimestampReconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl TimestampReconciler {
    pub fn new() -> Self {
        Self {
            codec_pts: None,
            codec_dts: None,
            pts_problems: 0,
            dts_problems: 0,
            broken_pts: BrokenPts::probing(),
            missing_pts_warnings: 0,
            decoded_pts: None,
            first_packet_pts: None,
        }
    }

    /// Account for a packet about to be sent to the decoder
    ///
    /// The first packet seen establishes the synthesis base, whether or not
    /// it ends up being dropped.
    pub fn note_packet(&mut self, pts: Option<Timestamp>, dts: Option<Timestamp>) {
        if pts.is_none() {
            self.broken_pts = BrokenPts::Broken;
        }
        if self.first_packet_pts.is_none() {
            self.first_packet_pts = pts.or(dts);
        }
    }

    /// Pick the presentation timestamp for a decoded frame
    ///
    /// `fps` is the frame rate used when a timestamp has to be synthesized.
    pub fn reconcile(
        &mut self,
        pts: Option<Timestamp>,
        dts: Option<Timestamp>,
        correct_pts: bool,
        fps: f64,
    ) -> Reconciled {
        // pts is reordered, dts is not; both should be monotonic.
        if let Some(pts) = pts {
            if self.codec_pts.is_some_and(|last| pts < last) {
                self.pts_problems += 1;
            }
            self.codec_pts = Some(pts);
        }

        if let Some(dts) = dts {
            if self.codec_dts.is_some_and(|last| dts <= last) {
                self.dts_problems += 1;
            }
            self.codec_dts = Some(dts);
        }

        self.broken_pts = self.broken_pts.advance();
        if self.pts_problems > 0 {
            self.broken_pts = BrokenPts::Broken;
        }

        let mut chosen = pts;
        if (self.pts_problems > self.dts_problems || pts.is_none()) && dts.is_some() {
            chosen = dts;
        }

        let (pts, synthesized) = match chosen {
            Some(pts) if correct_pts => (pts, false),
            _ => (self.synthesize(correct_pts, fps), true),
        };

        self.decoded_pts = Some(pts);
        Reconciled { pts, synthesized }
    }

    fn synthesize(&mut self, correct_pts: bool, fps: f64) -> Timestamp {
        if correct_pts && self.missing_pts_warnings <= 1 {
            warn!("Timestamps: no video PTS, making something up using {} FPS", fps);
            if self.missing_pts_warnings == 1 {
                warn!("Timestamps: ignoring further missing PTS warnings");
            }
            self.missing_pts_warnings += 1;
        }

        match self.decoded_pts {
            Some(last) => last.offset(1.0 / fps),
            None => self.first_packet_pts.unwrap_or_default(),
        }
    }

    /// Forget per-segment state; the broken-pts decision is kept
    pub fn reset(&mut self) {
        let broken_pts = self.broken_pts;
        *self = Self::new();
        self.broken_pts = broken_pts;
    }

    /// Start a new probe window (new decoder or full reset)
    pub fn restart_probe(&mut self) {
        self.broken_pts = BrokenPts::probing();
    }

    pub fn pts_problem_count(&self) -> u64 {
        self.pts_problems
    }

    pub fn dts_problem_count(&self) -> u64 {
        self.dts_problems
    }

    pub fn broken_pts(&self) -> BrokenPts {
        self.broken_pts
    }

    pub fn decoded_pts(&self) -> Option<Timestamp> {
        self.decoded_pts
    }

    pub fn codec_pts(&self) -> Option<Timestamp> {
        self.codec_pts
    }

    pub fn codec_dts(&self) -> Option<Timestamp> {
        self.codec_dts
    }

    pub fn first_packet_pts(&self) -> Option<Timestamp> {
        self.first_packet_pts
    }

    pub fn missing_pts_warnings(&self) -> u32 {
        self.missing_pts_warnings
    }
}

/// Undo the B-frame delay baked into AVI-style decode-order timestamps
///
/// Only ever moves the timestamp earlier; a negative delay is treated as none.
pub fn compensate_bframe_delay(pts: Timestamp, delay: i32, fps: f64) -> Timestamp {
    pts.offset(-(delay.max(0) as f64) / fps)
}
