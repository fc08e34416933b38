//! Outbound audio track: a turn-fenced packet queue pulled by the
//! transport at real time.
//!
//! The TTS worker pushes framed Opus packets tagged with their turn
//! number; the transport pulls. Every pull first discards packets whose
//! tag fell behind the fence, then returns either a live packet or a
//! 20 ms silence filler, so the pts clock keeps advancing at wall-clock
//! rate through aborts and idle stretches.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::opus::{SILENCE_DURATION, SILENCE_PACKET};
use crate::TRANSPORT_SAMPLE_RATE;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Packet types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A timed media packet handed to the transport.
#[derive(Debug, Clone)]
pub struct AudioPacket {
    pub payload: Vec<u8>,
    pub pts: u64,
    pub dts: u64,
    /// Time base as (numerator, denominator): 1/48000.
    pub time_base: (u32, u32),
    /// Wall-clock duration in seconds.
    pub duration: f64,
    /// False for silence filler.
    pub is_speech: bool,
}

/// Speech-activity transitions observed at the pull side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSignal {
    SpeechStarted,
    SpeechStopped,
}

struct QueuedPacket {
    turn: u64,
    duration: f64,
    pts_count: u64,
    payload: Vec<u8>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// OutboundTrack
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct TrackState {
    queue: VecDeque<QueuedPacket>,
    next_pts: u64,
    speech_active: bool,
    /// Wall-clock pacing anchor: when playback started and how many
    /// seconds of media have been handed out since.
    pace_start: Option<Instant>,
    pace_elapsed: f64,
}

pub struct OutboundTrack {
    state: Mutex<TrackState>,
    /// Turn fence: packets tagged below this are stale and never played.
    fence: AtomicU64,
    signals: tokio::sync::mpsc::UnboundedSender<TrackSignal>,
}

impl OutboundTrack {
    /// Returns the track and the receiver for speech-activity signals.
    pub fn new() -> (Self, tokio::sync::mpsc::UnboundedReceiver<TrackSignal>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let track = Self {
            state: Mutex::new(TrackState {
                queue: VecDeque::new(),
                next_pts: 0,
                speech_active: false,
                pace_start: None,
                pace_elapsed: 0.0,
            }),
            fence: AtomicU64::new(0),
            signals: tx,
        };
        (track, rx)
    }

    pub fn fence(&self) -> u64 {
        self.fence.load(Ordering::Acquire)
    }

    /// Raise the fence and drop every queued packet tagged below it.
    /// The fence never moves backwards.
    pub fn set_fence(&self, turn: u64) {
        let mut current = self.fence.load(Ordering::Acquire);
        while current < turn {
            match self
                .fence
                .compare_exchange(current, turn, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => break,
                Err(seen) => current = seen,
            }
        }
        let floor = self.fence.load(Ordering::Acquire);
        let mut state = self.state.lock();
        let before = state.queue.len();
        state.queue.retain(|p| p.turn >= floor);
        let dropped = before - state.queue.len();
        if dropped > 0 {
            tracing::debug!(floor, dropped, "dropped stale packets at fence");
        }
    }

    /// Clear the speech-active flag without emitting a signal. Used by the
    /// abort path, which publishes its own stopped event with the abort
    /// reason. Returns whether the flag was set.
    pub fn take_speech_active(&self) -> bool {
        let mut state = self.state.lock();
        std::mem::replace(&mut state.speech_active, false)
    }

    /// Enqueue one synthesized packet.
    pub fn push(&self, turn: u64, duration: f64, pts_count: u64, payload: Vec<u8>) {
        if turn < self.fence() {
            tracing::debug!(turn, fence = self.fence(), "stale packet not enqueued");
            return;
        }
        self.state.lock().queue.push_back(QueuedPacket {
            turn,
            duration,
            pts_count,
            payload,
        });
    }

    pub fn queued_len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Produce the next packet immediately (no pacing). Stale packets are
    /// drained, speech-activity transitions are signalled, and `next_pts`
    /// advances by exactly the packet's pts count.
    pub fn next_packet(&self) -> AudioPacket {
        let floor = self.fence();
        let mut state = self.state.lock();

        while state
            .queue
            .front()
            .is_some_and(|packet| packet.turn < floor)
        {
            state.queue.pop_front();
        }

        let (payload, duration, pts_count, is_speech) = match state.queue.pop_front() {
            Some(packet) => (packet.payload, packet.duration, packet.pts_count, true),
            None => {
                let pts_count = (SILENCE_DURATION * TRANSPORT_SAMPLE_RATE as f64).round() as u64;
                (SILENCE_PACKET.to_vec(), SILENCE_DURATION, pts_count, false)
            }
        };

        if is_speech && !state.speech_active {
            state.speech_active = true;
            let _ = self.signals.send(TrackSignal::SpeechStarted);
        } else if !is_speech && state.speech_active {
            state.speech_active = false;
            let _ = self.signals.send(TrackSignal::SpeechStopped);
        }

        let pts = state.next_pts;
        state.next_pts += pts_count;

        AudioPacket {
            payload,
            pts,
            dts: pts,
            time_base: (1, TRANSPORT_SAMPLE_RATE),
            duration,
            is_speech,
        }
    }

    /// Real-time pull: returns the next packet no earlier than its slot in
    /// the wall-clock schedule. The transport drives this in a loop.
    pub async fn recv(&self) -> AudioPacket {
        let wait = {
            let mut state = self.state.lock();
            let now = Instant::now();
            let start = *state.pace_start.get_or_insert(now);
            let due = start + Duration::from_secs_f64(state.pace_elapsed);
            due.saturating_duration_since(now)
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }

        let packet = self.next_packet();
        self.state.lock().pace_elapsed += packet.duration;
        packet
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_queue_yields_silence() {
        let (track, _rx) = OutboundTrack::new();
        let packet = track.next_packet();
        assert!(!packet.is_speech);
        assert_eq!(packet.payload, SILENCE_PACKET.to_vec());
        assert_eq!(packet.pts, 0);

        let next = track.next_packet();
        assert_eq!(next.pts, 960); // round(0.02 * 48000)
    }

    #[test]
    fn pts_advances_by_packet_pts_count() {
        let (track, _rx) = OutboundTrack::new();
        track.push(1, 0.06, 2880, vec![1]);
        track.push(1, 0.02, 960, vec![2]);

        assert_eq!(track.next_packet().pts, 0);
        assert_eq!(track.next_packet().pts, 2880);
        assert_eq!(track.next_packet().pts, 3840); // silence after drain
    }

    #[test]
    fn fence_drops_stale_packets_on_pull() {
        let (track, _rx) = OutboundTrack::new();
        track.push(3, 0.02, 960, vec![3]);
        track.push(3, 0.02, 960, vec![3]);
        track.set_fence(4);

        let packet = track.next_packet();
        assert!(!packet.is_speech, "stale audio must never be played");
    }

    #[test]
    fn fence_rejects_late_pushes() {
        let (track, _rx) = OutboundTrack::new();
        track.set_fence(4);
        track.push(3, 0.02, 960, vec![3]);
        assert_eq!(track.queued_len(), 0);
        track.push(4, 0.02, 960, vec![4]);
        assert_eq!(track.queued_len(), 1);
    }

    #[test]
    fn fence_never_moves_backwards() {
        let (track, _rx) = OutboundTrack::new();
        track.set_fence(5);
        track.set_fence(3);
        assert_eq!(track.fence(), 5);
    }

    #[test]
    fn speech_transitions_signalled() {
        let (track, mut rx) = OutboundTrack::new();
        track.push(1, 0.02, 960, vec![1]);

        let live = track.next_packet();
        assert!(live.is_speech);
        assert_eq!(rx.try_recv().unwrap(), TrackSignal::SpeechStarted);

        let silence = track.next_packet();
        assert!(!silence.is_speech);
        assert_eq!(rx.try_recv().unwrap(), TrackSignal::SpeechStopped);

        // steady silence: no further signals
        track.next_packet();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn take_speech_active_suppresses_stop_signal() {
        let (track, mut rx) = OutboundTrack::new();
        track.push(1, 0.02, 960, vec![1]);
        track.next_packet();
        let _ = rx.try_recv(); // started

        assert!(track.take_speech_active());
        track.next_packet(); // silence, but flag already cleared
        assert!(rx.try_recv().is_err());
        assert!(!track.take_speech_active());
    }

    #[test]
    fn pts_monotonic_through_abort() {
        let (track, _rx) = OutboundTrack::new();
        track.push(2, 0.02, 960, vec![2]);
        let first = track.next_packet();
        track.set_fence(3);
        let second = track.next_packet();
        assert!(second.pts > first.pts);
        assert_eq!(second.pts, first.pts + 960);
    }

    #[tokio::test(start_paused = true)]
    async fn recv_paces_to_wall_clock() {
        let (track, _rx) = OutboundTrack::new();
        let start = tokio::time::Instant::now();
        // first pull is immediate, second waits for the first packet's slot
        track.recv().await;
        track.recv().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(19), "elapsed: {elapsed:?}");
    }
}
