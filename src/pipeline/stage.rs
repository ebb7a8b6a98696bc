//! Pipeline stage trait and the async decode driver
//!
//! [`DecodeStage`] is the driving thread of a [`VideoPipeline`]: it calls
//! `do_work()` in a loop, forwards ready frames, yields on `Again` and sleeps
//! on the demuxer's wake-up signal on `Wait`.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, mpsc};

use super::controller::VideoPipeline;
use super::health::PipelineHealth;
use super::state::DataState;
use super::types::DecodedFrame;

/// Trait for pipeline stages that process media data
#[async_trait]
pub trait PipelineStage: Send {
    /// Run the stage until its input ends or its output closes
    async fn run(&mut self) -> Result<()>;

    /// Get the name of this stage for logging
    fn name(&self) -> &'static str;
}

/// Drives a [`VideoPipeline`] on a tokio task
pub struct DecodeStage {
    pipeline: VideoPipeline,
    wakeup: Arc<Notify>,
    output_tx: Option<mpsc::Sender<DecodedFrame>>,
    stall_threshold: Duration,
}

impl DecodeStage {
    /// `wakeup` must be raised by the demuxer feed whenever data (or EOF)
    /// becomes available
    pub fn new(pipeline: VideoPipeline, wakeup: Arc<Notify>) -> Self {
        Self {
            pipeline,
            wakeup,
            output_tx: None,
            stall_threshold: Duration::from_secs(5),
        }
    }

    /// How long to wait for input before complaining about a stall
    pub fn with_stall_threshold(mut self, threshold: Duration) -> Self {
        self.stall_threshold = threshold;
        self
    }

    /// Get the output channel for decoded frames
    pub fn take_output(&mut self, capacity: usize) -> mpsc::Receiver<DecodedFrame> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.output_tx = Some(tx);
        rx
    }

    pub fn pipeline(&self) -> &VideoPipeline {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut VideoPipeline {
        &mut self.pipeline
    }
}

/// Sleep until the demuxer signals new data
async fn wait_for_input(wakeup: &Notify, health: &PipelineHealth, stall_threshold: Duration) {
    loop {
        match tokio::time::timeout(stall_threshold, wakeup.notified()).await {
            Ok(()) => return,
            Err(_) => {
                if health.is_stalled(stall_threshold) {
                    warn!("DecodeStage: no input for {:?}, still waiting", stall_threshold);
                }
            }
        }
    }
}

#[async_trait]
impl PipelineStage for DecodeStage {
    async fn run(&mut self) -> Result<()> {
        let output_tx = self
            .output_tx
            .take()
            .ok_or_else(|| anyhow!("No output channel"))?;

        info!(
            "DecodeStage: started ({})",
            self.pipeline.decoder_description().unwrap_or("no decoder")
        );

        let mut frames = 0u64;
        loop {
            self.pipeline.do_work();
            let (frame, state) = self.pipeline.get_frame();

            match state {
                DataState::Ok => {
                    let Some(frame) = frame else { continue };
                    frames += 1;
                    if output_tx.send(frame).await.is_err() {
                        info!("DecodeStage: output channel closed");
                        break;
                    }
                }
                DataState::Again => tokio::task::yield_now().await,
                DataState::Wait => {
                    wait_for_input(&self.wakeup, self.pipeline.health(), self.stall_threshold)
                        .await
                }
                DataState::Eof => break,
            }
        }

        info!(
            "DecodeStage: finished ({} frames, {} dropped by decoder)",
            frames,
            self.pipeline.dropped_frames()
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "DecodeStage"
    }
}
