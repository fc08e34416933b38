//! The conversation pipeline: event bus, stage workers, endpointing, and
//! the coordinator that ties them together per session.

pub mod bus;
pub mod cancel;
pub mod chunker;
pub mod coordinator;
pub mod endpoint;
pub mod llm;
pub mod stt;
pub mod tools;
pub mod tts;
pub mod vad;
pub mod worker;

pub use bus::EventBus;
pub use coordinator::Coordinator;
pub use worker::{spawn_worker, Shutdown, Worker};
