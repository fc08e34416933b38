//! TTS worker: turns sentence units into paced Opus packets on the
//! outbound track, with turn-number fencing at every step.
//!
//! Requests queue as `(turn, text)` and a single task pops them in order.
//! A request whose turn fell behind the fence is discarded before any
//! vendor call. While a synthesis stream is draining, the fence is checked
//! per network chunk and again per framed segment, so a barge-in cuts the
//! audio within one packet:
//!
//! ```text
//! IDLE --tts_request--> QUEUED --pop-if-fresh--> SYNTHESIZING --segments--> PLAYING --drain--> IDLE
//!                          |                          |                        |
//!                          +--------stale-fence-------+------------------------+--> DROPPED
//! ```

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::mpsc;

use cb_domain::event::{Event, StopReason};
use cb_domain::Result;
use cb_media::ogg::OggPageReader;
use cb_media::opus;
use cb_media::track::{OutboundTrack, TrackSignal};
use cb_media::TRANSPORT_SAMPLE_RATE;
use cb_providers::SpeechSynthesizer;

use crate::bus::EventBus;
use crate::worker::{Shutdown, Worker};

pub struct TtsWorker {
    queue: mpsc::UnboundedSender<(u64, String)>,
    track: Arc<OutboundTrack>,
    bus: EventBus,
}

impl TtsWorker {
    /// Create the worker, its outbound track, and the background tasks
    /// (request queue + speech-signal forwarding).
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        bus: EventBus,
        shutdown: Shutdown,
    ) -> Self {
        let (track, signals) = OutboundTrack::new();
        let track = Arc::new(track);
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();

        spawn_queue_task(
            synthesizer,
            track.clone(),
            queue_rx,
            shutdown.clone(),
        );
        spawn_signal_task(signals, bus.clone(), shutdown);

        Self {
            queue: queue_tx,
            track,
            bus,
        }
    }

    /// The packet source the transport pulls from.
    pub fn track(&self) -> Arc<OutboundTrack> {
        self.track.clone()
    }
}

#[async_trait::async_trait]
impl Worker for TtsWorker {
    fn name(&self) -> &'static str {
        "tts"
    }

    fn subscriptions(&self) -> &'static [&'static str] {
        &["tts_request", "tts_abort"]
    }

    async fn on_event(&mut self, event: Arc<Event>) -> Result<()> {
        match &*event {
            Event::TtsRequest { text, turn } => {
                let _ = self.queue.send((*turn, text.clone()));
            }
            Event::TtsAbort { turn } => {
                // everything at or below the aborted turn is now stale
                self.track.set_fence(turn + 1);
                self.track.take_speech_active();
                tracing::debug!(turn, "tts abort, fence raised");
                self.bus.publish(Event::TtsSpeechStopped {
                    reason: StopReason::Abort,
                });
            }
            _ => {}
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Queue task
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn spawn_queue_task(
    synthesizer: Arc<dyn SpeechSynthesizer>,
    track: Arc<OutboundTrack>,
    mut queue: mpsc::UnboundedReceiver<(u64, String)>,
    mut shutdown: Shutdown,
) {
    tokio::spawn(async move {
        loop {
            let (turn, text) = tokio::select! {
                item = queue.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
                _ = shutdown.wait() => break,
            };

            if turn < track.fence() {
                tracing::debug!(turn, fence = track.fence(), "dropping stale tts request");
                continue;
            }

            if let Err(e) = synthesize(&*synthesizer, &track, turn, &text).await {
                tracing::warn!(turn, error = %e, "tts synthesis failed");
            }
        }
        tracing::debug!("tts queue task stopped");
    });
}

/// Run one synthesis stream through the page reader into the track.
async fn synthesize(
    synthesizer: &dyn SpeechSynthesizer,
    track: &OutboundTrack,
    turn: u64,
    text: &str,
) -> Result<()> {
    // trailing newline improves the vendor's phrasing of short inputs
    let input = format!("{text}\n");
    let mut stream = synthesizer.synthesize(&input).await?;
    let mut reader = OggPageReader::new();

    while let Some(chunk) = stream.next().await {
        if turn < track.fence() {
            tracing::debug!(turn, "abandoning synthesis stream behind fence");
            return Ok(());
        }
        let chunk = chunk?;
        reader.push(&chunk, |segment, meta| {
            if turn < track.fence() {
                return;
            }
            match opus::packet_sample_count(segment, meta.sample_rate) {
                Ok(samples) => {
                    let duration = samples as f64 / meta.sample_rate as f64;
                    let pts_count = (duration * TRANSPORT_SAMPLE_RATE as f64).round() as u64;
                    track.push(turn, duration, pts_count, segment.to_vec());
                }
                Err(e) => tracing::warn!(error = %e, "unframeable segment skipped"),
            }
        });
    }
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Signal task
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Forward pull-side speech transitions onto the bus.
fn spawn_signal_task(
    mut signals: mpsc::UnboundedReceiver<TrackSignal>,
    bus: EventBus,
    mut shutdown: Shutdown,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                maybe_signal = signals.recv() => {
                    let Some(signal) = maybe_signal else { break };
                    match signal {
                        TrackSignal::SpeechStarted => bus.publish(Event::TtsSpeechStarted),
                        TrackSignal::SpeechStopped => bus.publish(Event::TtsSpeechStopped {
                            reason: StopReason::End,
                        }),
                    }
                }
                _ = shutdown.wait() => break,
            }
        }
    });
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
