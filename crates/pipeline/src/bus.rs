//! The session event bus: typed pub/sub with a single dispatch loop.
//!
//! `publish` is a non-blocking enqueue; one task drains the queue and fans
//! each event out to the subscribers registered for its kind plus the
//! wildcard subscribers. Events of the same kind are therefore observed in
//! publish order by every subscriber; across kinds nothing is promised —
//! the turn fence is the only cross-kind ordering primitive.
//!
//! Subscribers receive `Arc<Event>` on their own unbounded channel, so a
//! slow subscriber lags on its own queue and a dropped one is pruned at
//! the next send. Nothing a subscriber does can poison the loop.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use cb_domain::event::Event;

/// Kinds too chatty to log per event.
const QUIET_KINDS: &[&str] = &[
    "on_vad_data",
    "on_speech_interim",
    "on_speech_final",
    "tts_abort",
    "llm_abort",
];

type Subscribers = Mutex<HashMap<&'static str, Vec<mpsc::UnboundedSender<Arc<Event>>>>>;

struct BusInner {
    queue: mpsc::UnboundedSender<Arc<Event>>,
    subscribers: Arc<Subscribers>,
}

/// Cheaply cloneable handle to one session's bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Create the bus and spawn its dispatch loop.
    pub fn new() -> Self {
        let (queue_tx, mut queue_rx) = mpsc::unbounded_channel::<Arc<Event>>();
        let subscribers: Arc<Subscribers> = Arc::new(Mutex::new(HashMap::new()));

        let subs = subscribers.clone();
        tokio::spawn(async move {
            while let Some(event) = queue_rx.recv().await {
                let kind = event.kind();
                if !QUIET_KINDS.contains(&kind) {
                    tracing::debug!(kind, "dispatch");
                }
                let mut subs = subs.lock();
                for key in [kind, "*"] {
                    if let Some(senders) = subs.get_mut(key) {
                        senders.retain(|tx| tx.send(event.clone()).is_ok());
                    }
                }
            }
        });

        Self {
            inner: Arc::new(BusInner {
                queue: queue_tx,
                subscribers,
            }),
        }
    }

    /// Register for the given event kinds. The receiver sees events of
    /// those kinds in publish order.
    pub fn subscribe(&self, kinds: &[&'static str]) -> mpsc::UnboundedReceiver<Arc<Event>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subs = self.inner.subscribers.lock();
        for &kind in kinds {
            subs.entry(kind).or_default().push(tx.clone());
        }
        rx
    }

    /// Register for every event (tracing, tests).
    pub fn subscribe_all(&self) -> mpsc::UnboundedReceiver<Arc<Event>> {
        self.subscribe(&["*"])
    }

    /// Enqueue an event. Never blocks; if the dispatch loop is gone the
    /// event is dropped silently (session teardown).
    pub fn publish(&self, event: Event) {
        let _ = self.inner.queue.send(Arc::new(event));
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_kind_preserves_publish_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe(&["tts_request"]);

        for i in 0..10 {
            bus.publish(Event::TtsRequest {
                text: i.to_string(),
                turn: i,
            });
        }

        for i in 0..10 {
            let event = rx.recv().await.unwrap();
            match &*event {
                Event::TtsRequest { turn, .. } => assert_eq!(*turn, i),
                other => panic!("unexpected: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn subscribers_only_see_their_kinds() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe(&["llm_abort"]);

        bus.publish(Event::TtsAbort { turn: 1 });
        bus.publish(Event::LlmAbort { turn: 2 });

        let event = rx.recv().await.unwrap();
        assert!(matches!(&*event, Event::LlmAbort { turn: 2 }));
    }

    #[tokio::test]
    async fn wildcard_sees_everything() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe_all();

        bus.publish(Event::VadStart);
        bus.publish(Event::TtsSpeechStarted);

        assert!(matches!(&*rx.recv().await.unwrap(), Event::VadStart));
        assert!(matches!(&*rx.recv().await.unwrap(), Event::TtsSpeechStarted));
    }

    #[tokio::test]
    async fn dropped_subscriber_does_not_poison_the_bus() {
        let bus = EventBus::new();
        let dead = bus.subscribe(&["tts_request"]);
        drop(dead);
        let mut alive = bus.subscribe(&["tts_request"]);

        bus.publish(Event::TtsRequest {
            text: "still here".into(),
            turn: 1,
        });

        let event = alive.recv().await.unwrap();
        assert!(matches!(&*event, Event::TtsRequest { .. }));
    }

    #[tokio::test]
    async fn fan_out_to_multiple_subscribers() {
        let bus = EventBus::new();
        let mut a = bus.subscribe(&["on_vad_start"]);
        let mut b = bus.subscribe(&["on_vad_start"]);

        bus.publish(Event::VadStart);

        assert!(matches!(&*a.recv().await.unwrap(), Event::VadStart));
        assert!(matches!(&*b.recv().await.unwrap(), Event::VadStart));
    }
}
