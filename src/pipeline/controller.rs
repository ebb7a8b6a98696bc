//! Video decode pipeline controller
//!
//! [`VideoPipeline`] pulls coded packets from a [`DemuxerFeed`], pushes them
//! into a [`DecoderEngine`], and keeps at most one decoded frame ready for the
//! caller. Frames leave with a reconciled pts and derived image parameters;
//! frames outside the active segment or before the start cut are discarded.
//!
//! The controller never blocks. `do_work()` reports `Wait` when the demuxer
//! has nothing buffered, and the caller is expected to sleep on the feed's
//! wake-up signal before calling again.

use anyhow::{Result, bail};
use log::{debug, error, info, warn};
use std::sync::Arc;

use super::health::PipelineHealth;
use super::params::{ImageParams, ParamsCache};
use super::segment::{SegmentBounds, SegmentPhase, SegmentTracker, SwitchKind};
use super::state::DataState;
use super::timestamps::{TimestampReconciler, compensate_bframe_delay};
use super::types::{CodecParams, CodedPacket, DecodedFrame, Timestamp};
use crate::config::DecoderOptions;
use crate::decoder::{
    ControlResponse, DecoderDriver, DecoderEngine, EngineCommand, FrameDrop, decoder_list,
    find_driver, select_decoders,
};
use crate::demux::{DemuxerFeed, ReadResult};
use crate::recorder::PacketRecorder;

/// Packets this far before the start cut are hard-dropped
const HARD_DROP_EPSILON: f64 = 0.005;

/// The later of the hr-seek start and the segment start
pub fn effective_start(
    start_pts: Option<Timestamp>,
    segment_start: Option<Timestamp>,
) -> Option<Timestamp> {
    match (start_pts, segment_start) {
        (Some(cut), Some(seg)) if seg > cut => Some(seg),
        (None, seg) => seg,
        (cut, _) => cut,
    }
}

/// Framedrop directive for the next packet
///
/// Hard drop only happens when packet timestamps have been confirmed
/// trustworthy, and regardless of whether framedrop is enabled.
pub fn framedrop_directive(
    packet_pts: Option<Timestamp>,
    start: Option<Timestamp>,
    framedrop_enabled: bool,
    pts_trusted: bool,
) -> FrameDrop {
    if let (Some(pts), Some(start)) = (packet_pts, start)
        && pts_trusted
        && pts.as_secs() < start.as_secs() - HARD_DROP_EPSILON
    {
        return FrameDrop::Hard;
    }

    if framedrop_enabled {
        FrameDrop::Soft
    } else {
        FrameDrop::None
    }
}

/// Decode pipeline for one video stream
pub struct VideoPipeline {
    codec: Arc<CodecParams>,
    drivers: Vec<Arc<dyn DecoderDriver>>,
    demuxer: Box<dyn DemuxerFeed>,
    opts: DecoderOptions,
    health: Arc<PipelineHealth>,

    engine: Option<Box<dyn DecoderEngine>>,
    decoder_desc: Option<String>,
    recorder: Option<Box<dyn PacketRecorder>>,

    current_frame: Option<DecodedFrame>,
    pending_packet: Option<CodedPacket>,
    segments: SegmentTracker,
    timestamps: TimestampReconciler,
    params: ParamsCache,

    start_pts: Option<Timestamp>,
    framedrop_enabled: bool,
    may_decoder_framedrop: bool,
    dropped_frames: u64,
    state: DataState,
}

impl VideoPipeline {
    /// Create a pipeline with no decoder attached
    ///
    /// Call [`select_and_init_decoder`](Self::select_and_init_decoder) before
    /// driving it; until then `do_work()` reports `Eof`.
    pub fn new(
        codec: Arc<CodecParams>,
        drivers: Vec<Arc<dyn DecoderDriver>>,
        demuxer: Box<dyn DemuxerFeed>,
        opts: DecoderOptions,
        health: Arc<PipelineHealth>,
    ) -> Self {
        Self {
            codec,
            drivers,
            demuxer,
            opts,
            health,
            engine: None,
            decoder_desc: None,
            recorder: None,
            current_frame: None,
            pending_packet: None,
            segments: SegmentTracker::new(),
            timestamps: TimestampReconciler::new(),
            params: ParamsCache::new(),
            start_pts: None,
            framedrop_enabled: false,
            may_decoder_framedrop: false,
            dropped_frames: 0,
            state: DataState::Again,
        }
    }

    /// Create a pipeline and open the best decoder for `codec`
    pub fn open(
        codec: Arc<CodecParams>,
        drivers: Vec<Arc<dyn DecoderDriver>>,
        demuxer: Box<dyn DemuxerFeed>,
        opts: DecoderOptions,
        health: Arc<PipelineHealth>,
    ) -> Result<Self> {
        let mut pipeline = Self::new(Arc::clone(&codec), drivers, demuxer, opts, health);
        pipeline.select_and_init_decoder(codec)?;
        Ok(pipeline)
    }

    /// Try every decoder candidate for `codec` in order; the first one that
    /// initializes wins.
    ///
    /// Any attached engine is released first. On failure the pipeline is
    /// left without a decoder.
    pub fn select_and_init_decoder(&mut self, codec: Arc<CodecParams>) -> Result<()> {
        if let Some(mut engine) = self.engine.take() {
            debug!("VideoPipeline: uninit video");
            engine.uninit();
        }
        self.codec = codec;
        self.decoder_desc = None;
        self.reset_segment_state();
        // A reinit for a segment switch keeps the switch in progress.
        if self.segments.phase() != SegmentPhase::Switching {
            self.segments.clear();
        }
        self.timestamps.restart_probe();

        let candidates = select_decoders(
            &decoder_list(&self.drivers),
            &self.codec.codec,
            self.opts.video_decoders.as_deref(),
        );
        debug!("VideoPipeline: codec list for '{}':", self.codec.codec);
        for entry in &candidates {
            debug!("VideoPipeline:     {}", entry);
        }

        let mut tried = Vec::new();
        for entry in &candidates {
            let Some(driver) = find_driver(&self.drivers, &entry.family) else {
                continue;
            };
            debug!("VideoPipeline: opening video decoder {}", entry.decoder);
            tried.push(format!("{}:{}", entry.family, entry.decoder));

            let mut engine = driver.create();
            match engine.init(&self.codec, &entry.decoder) {
                Ok(()) => {
                    let desc = format!("{} ({})", entry.decoder, entry.desc);
                    info!("VideoPipeline: selected video codec: {}", desc);
                    self.engine = Some(engine);
                    self.decoder_desc = Some(desc);
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        "VideoPipeline: video decoder init failed for {}: {:#}",
                        entry.decoder, e
                    );
                }
            }
        }

        error!(
            "VideoPipeline: failed to initialize a video decoder for codec '{}'",
            self.codec.codec
        );
        self.state = DataState::Eof;
        if tried.is_empty() {
            bail!("no video decoder available for codec '{}'", self.codec.codec);
        }
        bail!(
            "failed to initialize a video decoder for codec '{}' (tried {})",
            self.codec.codec,
            tried.join(", ")
        )
    }

    /// Advance the pipeline by one step and report the resulting state
    pub fn do_work(&mut self) -> DataState {
        if self.engine.is_none() {
            self.state = DataState::Eof;
            return self.state;
        }
        self.read_frame();
        if self.current_frame.is_none() {
            self.feed_packet();
            if self.state.is_waiting() {
                return self.state;
            }
            // Retry right away so a frame produced by this packet is not
            // delayed by a whole iteration.
            self.read_frame();
        }
        self.state
    }

    /// Take the ready frame, if any
    ///
    /// Returns `Ok` with the frame, `Again` if the frame of the last `Ok` was
    /// already taken, or the last state otherwise.
    pub fn get_frame(&mut self) -> (Option<DecodedFrame>, DataState) {
        if let Some(frame) = self.current_frame.take() {
            self.health.record_delivered();
            return (Some(frame), DataState::Ok);
        }
        if self.state.is_ok() {
            return (None, DataState::Again);
        }
        (None, self.state)
    }

    /// Drop all buffered data and state, as after a seek
    pub fn reset(&mut self) {
        debug!("VideoPipeline: reset");
        self.reset_segment_state();
        self.segments.clear();
        self.timestamps.restart_probe();
        self.dropped_frames = 0;
        if self.engine.is_none() {
            self.state = DataState::Eof;
        }
    }

    /// Frames before `start_pts` are dropped (hr-seek)
    pub fn set_start_pts(&mut self, start_pts: Option<Timestamp>) {
        self.start_pts = start_pts;
    }

    pub fn set_framedrop_enabled(&mut self, enabled: bool) {
        self.framedrop_enabled = enabled;
    }

    /// Parameters as last reported by the decoder, before any fixups
    pub fn get_decoder_format(&self) -> ImageParams {
        self.params.decoder_format()
    }

    /// Recompute the output parameters on the next frame
    pub fn reset_params(&mut self) {
        self.params.invalidate();
    }

    /// Receive a copy of every packet the decoder accepts
    pub fn attach_recorder(&mut self, recorder: Box<dyn PacketRecorder>) {
        self.recorder = Some(recorder);
    }

    pub fn detach_recorder(&mut self) -> Option<Box<dyn PacketRecorder>> {
        self.recorder.take()
    }

    /// Frames the decoder skipped due to soft framedrop
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    /// "decoder (description)" of the active decoder
    pub fn decoder_description(&self) -> Option<&str> {
        self.decoder_desc.as_deref()
    }

    pub fn has_decoder(&self) -> bool {
        self.engine.is_some()
    }

    pub fn codec(&self) -> &Arc<CodecParams> {
        &self.codec
    }

    pub fn state(&self) -> DataState {
        self.state
    }

    pub fn segment_bounds(&self) -> SegmentBounds {
        self.segments.bounds()
    }

    pub fn segment_phase(&self) -> SegmentPhase {
        self.segments.phase()
    }

    pub fn timestamps(&self) -> &TimestampReconciler {
        &self.timestamps
    }

    pub fn start_pts(&self) -> Option<Timestamp> {
        self.start_pts
    }

    pub fn has_pending_packet(&self) -> bool {
        self.pending_packet.is_some()
    }

    pub fn health(&self) -> &Arc<PipelineHealth> {
        &self.health
    }

    /// Everything that belongs to the current segment goes; the engine, the
    /// segment tracker and the broken-pts decision stay.
    fn reset_segment_state(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.control(EngineCommand::Reset);
        }
        self.timestamps.reset();
        self.params.clear();
        self.start_pts = None;
        self.may_decoder_framedrop = false;
        self.current_frame = None;
        self.pending_packet = None;
        self.state = DataState::Again;
    }

    fn feed_packet(&mut self) {
        if self.current_frame.is_some() || self.engine.is_none() {
            return;
        }

        if self.pending_packet.is_none() && !self.segments.has_queued() {
            match self.demuxer.try_read_packet() {
                ReadResult::Packet(packet) => self.pending_packet = Some(packet),
                ReadResult::NoPacketYet => {
                    self.state = DataState::Wait;
                    return;
                }
                // Nothing pending: the engine gets a drain request below.
                ReadResult::Eof => {}
            }
        }

        if let Some(packet) = self.pending_packet.take_if(|p| {
            !self.segments.has_queued() && self.segments.is_new_segment(p, &self.codec)
        }) {
            debug!(
                "VideoPipeline: new segment at {:?}, draining current one",
                packet.pdts()
            );
            self.segments.queue(packet);
        }

        let start = effective_start(self.start_pts, self.segments.bounds().start);
        let framedrop = framedrop_directive(
            self.pending_packet.as_ref().and_then(|p| p.pts),
            start,
            self.framedrop_enabled,
            self.timestamps.broken_pts().is_trusted(),
        );

        if self.send_packet(framedrop) {
            if let Some(packet) = self.pending_packet.take() {
                if let Some(recorder) = self.recorder.as_mut() {
                    recorder.feed_packet(&packet);
                }
                self.health.record_packet(packet.size());
            }
            self.may_decoder_framedrop = framedrop == FrameDrop::Soft;
        } else if self.pending_packet.is_some() {
            self.health.record_send_retry();
        }

        self.state = DataState::Again;
    }

    fn send_packet(&mut self, framedrop: FrameDrop) -> bool {
        let Some(engine) = self.engine.as_mut() else {
            return false;
        };
        engine.control(EngineCommand::SetFrameDrop(framedrop));

        let Some(packet) = self.pending_packet.as_mut() else {
            return engine.send_packet(None);
        };

        self.timestamps.note_packet(packet.pts, packet.dts);

        // Decoders want a dts; the recorder must not see the made-up one.
        let dts_replaced = packet.dts.is_none() && !self.codec.avi_dts;
        if dts_replaced {
            packet.dts = packet.pts;
        }
        let accepted = engine.send_packet(Some(&*packet));
        if dts_replaced {
            packet.dts = None;
        }
        accepted
    }

    fn read_frame(&mut self) {
        if self.current_frame.is_some() {
            return;
        }
        let Some(engine) = self.engine.as_mut() else {
            return;
        };

        let received = engine.receive_frame();
        let progress = received.progress || received.frame.is_some();
        let frame = received.frame.map(|f| self.finish_frame(f));

        self.state = if !progress {
            DataState::Eof
        } else if frame.is_none() {
            if self.may_decoder_framedrop {
                self.dropped_frames += 1;
                self.health.record_decoder_drop();
            }
            DataState::Again
        } else {
            DataState::Ok
        };
        self.may_decoder_framedrop = false;

        let mut segment_ended = self.state.is_eof();

        if let Some(frame) = frame {
            match frame.pts {
                Some(pts) => {
                    let bounds = self.segments.bounds();
                    segment_ended = bounds.is_past_end(pts);
                    let before_cut = self.start_pts.is_some_and(|cut| pts < cut);
                    if segment_ended || before_cut || bounds.is_before_start(pts) {
                        self.health.record_discarded();
                        self.state = DataState::Again;
                    } else {
                        self.current_frame = Some(frame);
                    }
                }
                None => self.current_frame = Some(frame),
            }
        }

        if segment_ended && self.segments.has_queued() {
            self.switch_segment();
        }
    }

    /// Reconcile the timestamp and attach the derived image parameters
    fn finish_frame(&mut self, mut frame: DecodedFrame) -> DecodedFrame {
        let fps = self.opts.effective_fps(self.codec.frame_rate());
        let reconciled = self
            .timestamps
            .reconcile(frame.pts, frame.dts, self.opts.correct_pts, fps);
        self.health.record_decoded(reconciled.synthesized);

        frame.params = self.params.apply(&frame.params, &self.codec, &self.opts);

        let mut pts = reconciled.pts;
        if self.codec.avi_dts
            && self.opts.correct_pts
            && let Some(fps) = self.codec.frame_rate()
        {
            let delay = match self
                .engine
                .as_mut()
                .map(|e| e.control(EngineCommand::GetBFrameDelay))
            {
                Some(ControlResponse::BFrameDelay(delay)) => delay,
                _ => -1,
            };
            pts = compensate_bframe_delay(pts, delay, fps);
        }

        frame.pts = Some(pts);
        frame
    }

    fn switch_segment(&mut self) {
        let Some(switch) = self.segments.begin_switch(&self.codec) else {
            return;
        };

        let reinit = matches!(switch.kind, SwitchKind::Reinit(_));
        info!(
            "VideoPipeline: switching to segment {:?}..{:?}{}",
            switch.bounds.start,
            switch.bounds.end,
            if reinit { " (new codec)" } else { "" }
        );

        match switch.kind {
            SwitchKind::Continue => self.reset_segment_state(),
            SwitchKind::Reinit(codec) => {
                if let Err(e) = self.select_and_init_decoder(codec) {
                    // Stuck mid-switch until the next reset().
                    error!("VideoPipeline: segment switch failed: {:#}", e);
                    self.state = DataState::Eof;
                    return;
                }
            }
        }
        self.health.record_segment_switch(reinit);

        self.segments.complete_switch(switch.bounds);
        self.pending_packet = Some(switch.packet);
        self.state = DataState::Again;
    }
}
