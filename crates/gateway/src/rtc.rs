//! Transport boundary.
//!
//! The WebRTC stack itself (ICE, DTLS, RTP) is an external collaborator.
//! The gateway only needs three things from a negotiated peer: inbound
//! 48 kHz stereo PCM frames, a place to pull outbound Opus packets from
//! (it is handed the session's [`OutboundTrack`]), and a text data
//! channel. [`LoopbackTransport`] implements the contract in-process for
//! tests and local development.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use cb_domain::Result;
use cb_media::track::OutboundTrack;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Signaling types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// SDP offer/answer as exchanged over `POST /offer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDescription {
    pub sdp: String,
    #[serde(rename = "type")]
    pub kind: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Peer session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Handles for one negotiated peer. The inbound channel closing means the
/// remote audio track ended.
pub struct PeerSession {
    pub peer_id: String,
    /// Interleaved stereo 16-bit PCM at 48 kHz, one frame per message.
    pub inbound_audio: mpsc::Receiver<Vec<i16>>,
    /// Text messages from the peer's data channel.
    pub data_in: mpsc::Receiver<String>,
    /// Text messages to the peer's data channel.
    pub data_out: mpsc::Sender<String>,
}

/// A transport able to negotiate peers. The outbound track is handed over
/// so the transport can pull packets at real time.
#[async_trait::async_trait]
pub trait PeerTransport: Send + Sync {
    async fn negotiate(
        &self,
        offer: SessionDescription,
        outbound: Arc<OutboundTrack>,
    ) -> Result<(SessionDescription, PeerSession)>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Loopback transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Remote-side handles for a loopback peer, for driving a session from
/// tests or a local harness.
pub struct LoopbackPeer {
    pub answer: SessionDescription,
    pub audio_in: mpsc::Sender<Vec<i16>>,
    pub data_to_server: mpsc::Sender<String>,
    pub data_from_server: mpsc::Receiver<String>,
    pub outbound: Arc<OutboundTrack>,
}

/// In-process transport: whatever is pushed into the peer handles shows
/// up in the session, and the outbound track is exposed for pulling.
pub struct LoopbackTransport {
    peers: parking_lot::Mutex<Vec<LoopbackPeer>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self {
            peers: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Take the remote-side handles of the most recent negotiation.
    pub fn take_peer(&self) -> Option<LoopbackPeer> {
        self.peers.lock().pop()
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PeerTransport for LoopbackTransport {
    async fn negotiate(
        &self,
        offer: SessionDescription,
        outbound: Arc<OutboundTrack>,
    ) -> Result<(SessionDescription, PeerSession)> {
        let peer_id = format!("PC_{}", &uuid::Uuid::new_v4().simple().to_string()[..5]);
        tracing::info!(peer_id, offer_kind = %offer.kind, "loopback peer negotiated");

        let (audio_tx, audio_rx) = mpsc::channel(256);
        let (data_in_tx, data_in_rx) = mpsc::channel(64);
        let (data_out_tx, data_out_rx) = mpsc::channel(64);

        let answer = SessionDescription {
            sdp: format!("v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=loopback {peer_id}\r\n"),
            kind: "answer".into(),
        };

        self.peers.lock().push(LoopbackPeer {
            answer: answer.clone(),
            audio_in: audio_tx,
            data_to_server: data_in_tx,
            data_from_server: data_out_rx,
            outbound,
        });

        Ok((
            answer,
            PeerSession {
                peer_id,
                inbound_audio: audio_rx,
                data_in: data_in_rx,
                data_out: data_out_tx,
            },
        ))
    }
}
