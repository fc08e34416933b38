//! Worker harness: lifecycle, subscription, and the event loop shared by
//! every pipeline stage.
//!
//! A worker declares the event kinds it wants and gets a task that feeds
//! it events until the session shuts down. Handler errors are logged
//! (debug for expected cancellations, warn otherwise) and the loop keeps
//! going — one bad event must not take a stage down.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use cb_domain::event::Event;
use cb_domain::Result;

use crate::bus::EventBus;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Shutdown signal
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Session-wide shutdown signal. Clone freely; `signal()` releases every
/// waiter, including ones that subscribe later.
#[derive(Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    pub fn signal(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_signalled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when shutdown is signalled.
    pub async fn wait(&mut self) {
        while !*self.rx.borrow() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Worker trait + spawn
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One pipeline stage driven by bus events. Stages with their own inner
/// tasks (TTS queue, LLM call) spawn those from their constructor and tie
/// them to the same [`Shutdown`].
#[async_trait::async_trait]
pub trait Worker: Send + 'static {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Event kinds this worker subscribes to.
    fn subscriptions(&self) -> &'static [&'static str];

    async fn on_event(&mut self, event: Arc<Event>) -> Result<()>;
}

/// Subscribe the worker and run its event loop until shutdown.
pub fn spawn_worker<W: Worker>(
    mut worker: W,
    bus: &EventBus,
    shutdown: Shutdown,
) -> JoinHandle<()> {
    let mut events = bus.subscribe(worker.subscriptions());
    let mut shutdown = shutdown;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                maybe_event = events.recv() => {
                    let Some(event) = maybe_event else { break };
                    if let Err(e) = worker.on_event(event).await {
                        if e.is_cancelled() {
                            tracing::debug!(worker = worker.name(), "handler cancelled");
                        } else {
                            tracing::warn!(worker = worker.name(), error = %e, "handler failed");
                        }
                    }
                }
                _ = shutdown.wait() => break,
            }
        }
        tracing::debug!(worker = worker.name(), "worker stopped");
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use cb_domain::Error;

    struct Echo {
        bus: EventBus,
        fail_on_first: bool,
    }

    #[async_trait::async_trait]
    impl Worker for Echo {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn subscriptions(&self) -> &'static [&'static str] {
            &["rtc_message"]
        }

        async fn on_event(&mut self, event: Arc<Event>) -> Result<()> {
            if self.fail_on_first {
                self.fail_on_first = false;
                return Err(Error::Other("boom".into()));
            }
            if let Event::RtcMessage { payload } = &*event {
                self.bus.publish(Event::TtsRequest {
                    text: payload.clone(),
                    turn: 0,
                });
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn worker_receives_and_emits() {
        let bus = EventBus::new();
        let shutdown = Shutdown::new();
        let mut out = bus.subscribe(&["tts_request"]);

        let _ = spawn_worker(
            Echo {
                bus: bus.clone(),
                fail_on_first: false,
            },
            &bus,
            shutdown.clone(),
        );

        bus.publish(Event::RtcMessage {
            payload: "hi".into(),
        });

        let event = out.recv().await.unwrap();
        assert!(matches!(&*event, Event::TtsRequest { text, .. } if text == "hi"));
        shutdown.signal();
    }

    #[tokio::test]
    async fn handler_error_does_not_stop_the_worker() {
        let bus = EventBus::new();
        let shutdown = Shutdown::new();
        let mut out = bus.subscribe(&["tts_request"]);

        let _ = spawn_worker(
            Echo {
                bus: bus.clone(),
                fail_on_first: true,
            },
            &bus,
            shutdown.clone(),
        );

        bus.publish(Event::RtcMessage { payload: "a".into() }); // fails
        bus.publish(Event::RtcMessage { payload: "b".into() }); // succeeds

        let event = out.recv().await.unwrap();
        assert!(matches!(&*event, Event::TtsRequest { text, .. } if text == "b"));
        shutdown.signal();
    }

    #[tokio::test]
    async fn shutdown_stops_the_loop() {
        let bus = EventBus::new();
        let shutdown = Shutdown::new();
        let handle = spawn_worker(
            Echo {
                bus: bus.clone(),
                fail_on_first: false,
            },
            &bus,
            shutdown.clone(),
        );

        shutdown.signal();
        handle.await.unwrap();
    }
}
