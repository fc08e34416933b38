//! Per-peer session assembly: one bus, one set of workers, two media
//! pumps, and a data-channel handler per negotiated peer.

use std::sync::Arc;

use tokio::sync::mpsc;

use cb_domain::chat::ChatLog;
use cb_domain::event::Event;
use cb_domain::Result;
use cb_media::pcm::{stereo_to_mono_f32, Downsampler, FrameChunker};
use cb_pipeline::coordinator::Coordinator;
use cb_pipeline::llm::LlmWorker;
use cb_pipeline::stt::SttWorker;
use cb_pipeline::tools::ToolsHandler;
use cb_pipeline::tts::TtsWorker;
use cb_pipeline::vad::VadWorker;
use cb_pipeline::{spawn_worker, EventBus, Shutdown};

use crate::rtc::{PeerSession, SessionDescription};
use crate::state::AppState;

/// A running conversation session. Dropping it does not stop the workers;
/// signal `shutdown` for that (the session does it itself when the
/// inbound track ends).
pub struct Session {
    pub peer_id: String,
    pub bus: EventBus,
    pub shutdown: Shutdown,
}

/// Negotiate the peer and wire the full pipeline for it.
pub async fn start(state: &AppState, offer: SessionDescription) -> Result<(SessionDescription, Session)> {
    let bus = EventBus::new();
    let shutdown = Shutdown::new();

    // ── TTS + outbound track (the transport pulls from it) ───────────
    let tts = TtsWorker::new(state.tts.clone(), bus.clone(), shutdown.clone());
    let track = tts.track();
    let _ = spawn_worker(tts, &bus, shutdown.clone());

    // ── Transport negotiation ────────────────────────────────────────
    let (answer, peer) = state.transport.negotiate(offer, track).await?;
    let peer_id = peer.peer_id.clone();
    tracing::info!(peer_id, "session starting");

    // ── LLM worker ───────────────────────────────────────────────────
    let _ = spawn_worker(
        LlmWorker::new(state.llm.clone(), bus.clone()),
        &bus,
        shutdown.clone(),
    );

    // ── STT worker ───────────────────────────────────────────────────
    let (stt_audio_tx, stt_audio_rx) = mpsc::channel::<Vec<u8>>(256);
    let _ = SttWorker::new(state.stt.clone(), state.config.storage.clone()).spawn(
        stt_audio_rx,
        bus.clone(),
        shutdown.clone(),
    );

    // ── VAD worker ───────────────────────────────────────────────────
    let (vad_tx, vad_rx) = mpsc::channel::<Vec<f32>>(256);
    let _ = VadWorker::new(state.vad_models.create(), state.config.vad.clone()).spawn(
        vad_rx,
        bus.clone(),
        shutdown.clone(),
    );

    // ── Coordinator ──────────────────────────────────────────────────
    let tools = Arc::new(ToolsHandler::new(state.config.storage.context_path.clone()));
    let chat_log = Some(ChatLog::new(state.config.storage.db_path.clone()));
    let _ = spawn_worker(
        Coordinator::new(bus.clone(), tools, chat_log, state.config.turns.clone()),
        &bus,
        shutdown.clone(),
    );

    spawn_audio_pump(peer, bus.clone(), stt_audio_tx, vad_tx, shutdown.clone());

    Ok((
        answer,
        Session {
            peer_id,
            bus,
            shutdown,
        },
    ))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pumps
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fan inbound audio out to STT (raw bytes) and VAD (16 kHz mono
/// 512-sample frames), and service the data channel. Ends the session
/// when the inbound track closes.
fn spawn_audio_pump(
    mut peer: PeerSession,
    bus: EventBus,
    stt_audio: mpsc::Sender<Vec<u8>>,
    vad_frames: mpsc::Sender<Vec<f32>>,
    shutdown: Shutdown,
) {
    tokio::spawn(async move {
        let mut downsampler = Downsampler::for_vad();
        let mut chunker = FrameChunker::for_vad();
        let mut wait_shutdown = shutdown.clone();
        let mut data_open = true;

        loop {
            tokio::select! {
                maybe_frame = peer.inbound_audio.recv() => {
                    let Some(frame) = maybe_frame else {
                        tracing::info!(peer_id = peer.peer_id, "inbound track ended");
                        break;
                    };

                    let mut bytes = Vec::with_capacity(frame.len() * 2);
                    for sample in &frame {
                        bytes.extend_from_slice(&sample.to_le_bytes());
                    }
                    if stt_audio.send(bytes).await.is_err() {
                        tracing::warn!("stt audio sink closed");
                    }

                    let mono = stereo_to_mono_f32(&frame);
                    for chunk in chunker.push(&downsampler.push(&mono)) {
                        if vad_frames.send(chunk).await.is_err() {
                            tracing::warn!("vad frame sink closed");
                        }
                    }
                }
                maybe_msg = peer.data_in.recv(), if data_open => {
                    match maybe_msg {
                        Some(message) => {
                            handle_data_message(&message, &peer.data_out, &bus).await
                        }
                        None => data_open = false,
                    }
                }
                _ = wait_shutdown.wait() => break,
            }
        }

        shutdown.signal();
    });
}

/// Data-channel command handling: `ping…` echoes `pong…`, `save_audio`
/// snapshots the STT buffer, `f3` forces a barge-in, everything else is
/// republished for handler extensibility.
async fn handle_data_message(message: &str, data_out: &mpsc::Sender<String>, bus: &EventBus) {
    if let Some(suffix) = message.strip_prefix("ping") {
        let _ = data_out.send(format!("pong{suffix}")).await;
        return;
    }
    match message {
        "save_audio" => bus.publish(Event::SttSave),
        other => bus.publish(Event::RtcMessage {
            payload: other.to_string(),
        }),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
