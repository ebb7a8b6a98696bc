//! Scripted decoder engine and demuxer used by the pipeline tests

use anyhow::{Result, bail};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::decoder::{
    ControlResponse, DecoderDriver, DecoderEngine, DecoderEntry, EngineCommand, FrameDrop, Received,
};
use crate::demux::{DemuxerFeed, ReadResult};
use crate::pipeline::params::ImageParams;
use crate::pipeline::types::{CodecParams, CodedPacket, DecodedFrame, Timestamp};
use crate::recorder::PacketRecorder;

pub fn ts(secs: f64) -> Option<Timestamp> {
    Some(Timestamp::from_secs(secs))
}

pub fn packet(pts: f64) -> CodedPacket {
    CodedPacket::new(vec![0u8; 8], ts(pts), None)
}

/// How a scripted engine behaves
#[derive(Debug, Clone)]
pub struct Behavior {
    /// Decoder names whose init fails
    pub failing: Vec<String>,
    /// Output frames carry no pts
    pub strip_pts: bool,
    /// Soft framedrop makes the engine skip every frame
    pub drop_soft: bool,
    /// Answer to `GetBFrameDelay`; `None` means unsupported
    pub bframe_delay: Option<i32>,
    /// Number of packet sends refused up front
    pub refuse_first: usize,
    /// Image parameters attached to every frame
    pub params: ImageParams,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            failing: Vec::new(),
            strip_pts: false,
            drop_soft: false,
            bframe_delay: None,
            refuse_first: 0,
            params: ImageParams::new(16, 16),
        }
    }
}

/// Everything the engines of one driver were asked to do
#[derive(Debug, Default)]
pub struct EngineLog {
    /// (codec, decoder) of every successful init
    pub inits: Vec<(String, String)>,
    pub failed_inits: Vec<String>,
    pub uninits: usize,
    pub controls: Vec<EngineCommand>,
    /// pts/dts of every accepted packet; `None` for drain requests
    pub sent: Vec<Option<(Option<Timestamp>, Option<Timestamp>)>>,
    pub refused: usize,
}

impl EngineLog {
    pub fn resets(&self) -> usize {
        self.controls
            .iter()
            .filter(|c| **c == EngineCommand::Reset)
            .count()
    }

    pub fn framedrops(&self) -> Vec<FrameDrop> {
        self.controls
            .iter()
            .filter_map(|c| match c {
                EngineCommand::SetFrameDrop(fd) => Some(*fd),
                _ => None,
            })
            .collect()
    }
}

pub type SharedLog = Arc<Mutex<EngineLog>>;

/// Engine that turns every packet into one frame carrying its timestamps
pub struct ScriptedEngine {
    behavior: Behavior,
    log: SharedLog,
    open: bool,
    queue: VecDeque<DecodedFrame>,
    framedrop: FrameDrop,
    draining: bool,
}

impl DecoderEngine for ScriptedEngine {
    fn init(&mut self, codec: &CodecParams, decoder: &str) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        if self.behavior.failing.iter().any(|d| d == decoder) {
            log.failed_inits.push(decoder.to_string());
            bail!("{} refuses to open", decoder);
        }
        log.inits.push((codec.codec.clone(), decoder.to_string()));
        self.open = true;
        Ok(())
    }

    fn send_packet(&mut self, packet: Option<&CodedPacket>) -> bool {
        let mut log = self.log.lock().unwrap();
        let Some(packet) = packet else {
            log.sent.push(None);
            self.draining = true;
            return true;
        };
        if log.refused < self.behavior.refuse_first {
            log.refused += 1;
            return false;
        }
        log.sent.push(Some((packet.pts, packet.dts)));
        self.draining = false;

        let skip = match self.framedrop {
            FrameDrop::Hard => true,
            FrameDrop::Soft => self.behavior.drop_soft,
            FrameDrop::None => false,
        };
        if !skip {
            let pts = if self.behavior.strip_pts { None } else { packet.pts };
            self.queue.push_back(DecodedFrame::new(
                packet.data.clone(),
                pts,
                packet.dts,
                self.behavior.params,
            ));
        }
        true
    }

    fn receive_frame(&mut self) -> Received {
        match self.queue.pop_front() {
            Some(frame) => Received::frame(frame),
            None if self.draining || !self.open => Received::exhausted(),
            None => Received::pending(),
        }
    }

    fn control(&mut self, cmd: EngineCommand) -> ControlResponse {
        self.log.lock().unwrap().controls.push(cmd);
        match cmd {
            EngineCommand::Reset => {
                self.queue.clear();
                self.draining = false;
                ControlResponse::Done
            }
            EngineCommand::SetFrameDrop(fd) => {
                self.framedrop = fd;
                ControlResponse::Done
            }
            EngineCommand::GetBFrameDelay => match self.behavior.bframe_delay {
                Some(delay) => ControlResponse::BFrameDelay(delay),
                None => ControlResponse::Unsupported,
            },
        }
    }

    fn uninit(&mut self) {
        self.log.lock().unwrap().uninits += 1;
        self.open = false;
        self.queue.clear();
    }
}

/// Driver offering scripted decoders
pub struct ScriptedDriver {
    name: String,
    entries: Vec<DecoderEntry>,
    behavior: Behavior,
    pub log: SharedLog,
}

impl ScriptedDriver {
    /// `decoders` lists (codec, decoder) pairs
    pub fn new(name: &str, decoders: &[(&str, &str)], behavior: Behavior) -> Self {
        Self {
            name: name.to_string(),
            entries: decoders
                .iter()
                .map(|(codec, decoder)| {
                    DecoderEntry::new(name, *codec, *decoder, format!("scripted {}", decoder))
                })
                .collect(),
            behavior,
            log: SharedLog::default(),
        }
    }
}

impl DecoderDriver for ScriptedDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn decoders(&self) -> Vec<DecoderEntry> {
        self.entries.clone()
    }

    fn create(&self) -> Box<dyn DecoderEngine> {
        Box::new(ScriptedEngine {
            behavior: self.behavior.clone(),
            log: Arc::clone(&self.log),
            open: false,
            queue: VecDeque::new(),
            framedrop: FrameDrop::None,
            draining: false,
        })
    }
}

enum Step {
    Packet(CodedPacket),
    Gap,
}

/// Demuxer replaying a script; a gap answers `NoPacketYet` once, the end of
/// the script answers `Eof`. Clones share the script so tests can append.
#[derive(Clone, Default)]
pub struct ScriptedDemuxer {
    steps: Arc<Mutex<VecDeque<Step>>>,
    reads: Arc<Mutex<usize>>,
}

impl ScriptedDemuxer {
    pub fn new(packets: Vec<CodedPacket>) -> Self {
        let demuxer = Self::default();
        for p in packets {
            demuxer.push(p);
        }
        demuxer
    }

    pub fn push(&self, packet: CodedPacket) {
        self.steps.lock().unwrap().push_back(Step::Packet(packet));
    }

    pub fn push_gap(&self) {
        self.steps.lock().unwrap().push_back(Step::Gap);
    }

    pub fn reads(&self) -> usize {
        *self.reads.lock().unwrap()
    }
}

impl DemuxerFeed for ScriptedDemuxer {
    fn try_read_packet(&mut self) -> ReadResult {
        *self.reads.lock().unwrap() += 1;
        match self.steps.lock().unwrap().pop_front() {
            Some(Step::Packet(p)) => ReadResult::Packet(p),
            Some(Step::Gap) => ReadResult::NoPacketYet,
            None => ReadResult::Eof,
        }
    }
}

/// Recorder keeping copies of everything it was fed
#[derive(Clone, Default)]
pub struct CollectingRecorder {
    pub packets: Arc<Mutex<Vec<CodedPacket>>>,
}

impl PacketRecorder for CollectingRecorder {
    fn feed_packet(&mut self, packet: &CodedPacket) {
        self.packets.lock().unwrap().push(packet.clone());
    }
}
