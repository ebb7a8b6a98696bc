//! Segment (edit list) tracking
//!
//! A segmented packet whose bounds or codec differ from the active segment
//! starts a new segment. Its first packet is held back until the current
//! segment has drained, then the decoder either continues (same codec) or is
//! replaced (different codec).

use std::sync::Arc;

use super::types::{CodecParams, CodedPacket, Timestamp};

/// Where the tracker is in a segment transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SegmentPhase {
    /// No boundary pending
    #[default]
    None,
    /// The next segment's first packet is held
    Queued,
    /// The decoder is being reset or replaced for the next segment
    Switching,
}

/// Valid presentation window of a segment; unset bounds are unbounded
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SegmentBounds {
    pub start: Option<Timestamp>,
    pub end: Option<Timestamp>,
}

impl SegmentBounds {
    pub fn new(start: Option<Timestamp>, end: Option<Timestamp>) -> Self {
        Self { start, end }
    }

    /// Check if `pts` lies before the segment start
    pub fn is_before_start(&self, pts: Timestamp) -> bool {
        self.start.is_some_and(|start| pts < start)
    }

    /// Check if `pts` lies at or after the segment end
    pub fn is_past_end(&self, pts: Timestamp) -> bool {
        self.end.is_some_and(|end| pts >= end)
    }
}

/// How the decoder must be handled when the next segment starts
#[derive(Debug, Clone)]
pub enum SwitchKind {
    /// Same codec: reset per-segment state, keep the engine
    Continue,
    /// Different codec: tear the engine down and initialize a new one
    Reinit(Arc<CodecParams>),
}

/// A segment transition in progress
#[derive(Debug)]
pub struct SegmentSwitch {
    /// First packet of the new segment, to be fed next
    pub packet: CodedPacket,
    pub bounds: SegmentBounds,
    pub kind: SwitchKind,
}

/// Segment state of one stream
#[derive(Debug, Default)]
pub struct SegmentTracker {
    bounds: SegmentBounds,
    queued: Option<CodedPacket>,
    phase: SegmentPhase,
}

/// `None` on a packet means "inherits the active codec"
fn same_codec(codec: Option<&Arc<CodecParams>>, active: &Arc<CodecParams>) -> bool {
    match codec {
        None => true,
        Some(codec) => Arc::ptr_eq(codec, active) || **codec == **active,
    }
}

impl SegmentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if `packet` starts a segment other than the active one
    pub fn is_new_segment(&self, packet: &CodedPacket, active: &Arc<CodecParams>) -> bool {
        packet.segmented
            && (packet.start != self.bounds.start
                || packet.end != self.bounds.end
                || !same_codec(packet.codec.as_ref(), active))
    }

    /// Hold the first packet of the next segment
    ///
    /// Only one segment can be queued; the caller must not read further
    /// packets while one is held.
    pub fn queue(&mut self, packet: CodedPacket) {
        debug_assert!(self.queued.is_none(), "segment already queued");
        self.queued = Some(packet);
        self.phase = SegmentPhase::Queued;
    }

    pub fn has_queued(&self) -> bool {
        self.queued.is_some()
    }

    /// Start switching to the queued segment, if any
    pub fn begin_switch(&mut self, active: &Arc<CodecParams>) -> Option<SegmentSwitch> {
        let packet = self.queued.take()?;
        self.phase = SegmentPhase::Switching;

        let kind = match &packet.codec {
            Some(codec) if !same_codec(Some(codec), active) => SwitchKind::Reinit(Arc::clone(codec)),
            _ => SwitchKind::Continue,
        };

        Some(SegmentSwitch {
            bounds: SegmentBounds::new(packet.start, packet.end),
            packet,
            kind,
        })
    }

    /// Adopt the new segment's bounds
    pub fn complete_switch(&mut self, bounds: SegmentBounds) {
        self.bounds = bounds;
        self.phase = SegmentPhase::None;
    }

    pub fn bounds(&self) -> SegmentBounds {
        self.bounds
    }

    pub fn phase(&self) -> SegmentPhase {
        self.phase
    }

    /// Drop any queued segment and forget the active bounds
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
