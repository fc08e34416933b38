//! VAD worker: wraps the voice-activity model and turns raw per-chunk
//! probabilities into the statistics the coordinator's endpointing needs.
//!
//! Audio arrives as 512-sample 16 kHz mono frames on a channel (the media
//! pump does the resampling). Model inference itself is external, behind
//! [`VadModel`].

use std::collections::VecDeque;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use cb_domain::config::VadConfig;
use cb_domain::event::{Event, VadSample};
use cb_domain::Result;

use crate::bus::EventBus;
use crate::worker::Shutdown;

/// Probabilities kept for the rolling statistics windows.
const PROB_BUFFER_WINDOW: usize = 50;

/// Probability below which a chunk counts as silence in the ratios.
const SILENCE_THRESHOLD: f32 = 0.05;

/// Voice-activity model (Silero or equivalent), one inference per
/// 512-sample chunk.
pub trait VadModel: Send + 'static {
    fn predict(&mut self, frame: &[f32]) -> Result<f32>;
    fn reset(&mut self);
}

/// Energy-based fallback model for when no neural VAD is wired in.
/// Maps frame RMS onto a pseudo-probability (RMS ≈ 0.3 is very loud
/// speech); good enough to drive the activation windows in quiet rooms.
#[derive(Default)]
pub struct EnergyVad;

impl VadModel for EnergyVad {
    fn predict(&mut self, frame: &[f32]) -> Result<f32> {
        if frame.is_empty() {
            return Ok(0.0);
        }
        let sum_sq: f32 = frame.iter().map(|s| s * s).sum();
        let rms = (sum_sq / frame.len() as f32).sqrt();
        Ok((rms / 0.3).min(1.0))
    }

    fn reset(&mut self) {}
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Worker
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct VadWorker {
    model: Box<dyn VadModel>,
    config: VadConfig,
    probs: VecDeque<f32>,
    consecutive_active: u32,
    activated: bool,
}

impl VadWorker {
    pub fn new(model: Box<dyn VadModel>, config: VadConfig) -> Self {
        Self {
            model,
            config,
            probs: VecDeque::with_capacity(PROB_BUFFER_WINDOW),
            consecutive_active: 0,
            activated: false,
        }
    }

    /// Consume frames until the channel closes or the session shuts down.
    pub fn spawn(
        mut self,
        mut frames: mpsc::Receiver<Vec<f32>>,
        bus: EventBus,
        mut shutdown: Shutdown,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    maybe_frame = frames.recv() => {
                        let Some(frame) = maybe_frame else { break };
                        if let Err(e) = self.on_chunk(&frame, &bus) {
                            tracing::warn!(error = %e, "vad inference failed");
                        }
                    }
                    _ = shutdown.wait() => break,
                }
            }
            self.model.reset();
            tracing::debug!("vad worker stopped");
        })
    }

    fn on_chunk(&mut self, frame: &[f32], bus: &EventBus) -> Result<()> {
        let speech_prob = self.model.predict(frame)?;

        if self.probs.len() == PROB_BUFFER_WINDOW {
            self.probs.pop_front();
        }
        self.probs.push_back(speech_prob);

        bus.publish(Event::VadData(self.sample(speech_prob)));

        // activation: a run of consecutive speech-like chunks
        if speech_prob >= self.config.activation_prob {
            self.consecutive_active += 1;
            if self.consecutive_active >= self.config.activation_chunks && !self.activated {
                self.activated = true;
                tracing::debug!(speech_prob, "vad activated");
                bus.publish(Event::VadStart);
            }
        } else {
            self.consecutive_active = 0;
        }

        // deactivation: a full window that is quiet on average
        if self.activated
            && self.probs.len() >= self.config.deactivation_window
            && self.tail_mean(self.config.deactivation_window) <= self.config.deactivation_mean
        {
            self.activated = false;
            self.consecutive_active = 0;
            tracing::debug!("vad deactivated");
            bus.publish(Event::VadEnd);
        }

        Ok(())
    }

    fn sample(&self, speech_prob: f32) -> VadSample {
        VadSample {
            speech_prob,
            mean_prob: self.tail_mean(5),
            silence_ratio_short: self.silence_ratio(5),
            silence_ratio_long: self.silence_ratio(20),
        }
    }

    fn tail_mean(&self, window: usize) -> f32 {
        let n = window.min(self.probs.len());
        if n == 0 {
            return 0.0;
        }
        self.probs.iter().rev().take(n).sum::<f32>() / n as f32
    }

    /// Fraction of the last `window` chunks below the silence threshold.
    /// Returns 0 until at least half a window of data exists.
    fn silence_ratio(&self, window: usize) -> f32 {
        if self.probs.len() * 2 < window {
            return 0.0;
        }
        let n = window.min(self.probs.len());
        let silent = self
            .probs
            .iter()
            .rev()
            .take(n)
            .filter(|&&p| p < SILENCE_THRESHOLD)
            .count();
        silent as f32 / n as f32
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
