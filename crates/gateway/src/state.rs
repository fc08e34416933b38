//! Shared application state handed to API handlers.
//!
//! Everything here is immutable after startup — per-session mutable state
//! (bus, chat context, fences) is created in [`crate::session`] for each
//! negotiated peer.

use std::sync::Arc;

use cb_domain::config::Config;
use cb_pipeline::vad::{EnergyVad, VadModel};
use cb_providers::{LlmProvider, SpeechRecognizer, SpeechSynthesizer};

use crate::rtc::PeerTransport;

/// Creates one VAD model per session (the model carries inference state).
pub trait VadModelFactory: Send + Sync {
    fn create(&self) -> Box<dyn VadModel>;
}

/// Factory for the built-in energy fallback model. A neural model (Silero
/// behind [`VadModel`]) plugs in through the same trait.
pub struct EnergyVadFactory;

impl VadModelFactory for EnergyVadFactory {
    fn create(&self) -> Box<dyn VadModel> {
        Box::new(EnergyVad)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub llm: Arc<dyn LlmProvider>,
    pub tts: Arc<dyn SpeechSynthesizer>,
    pub stt: Arc<dyn SpeechRecognizer>,
    pub vad_models: Arc<dyn VadModelFactory>,
    pub transport: Arc<dyn PeerTransport>,
}
