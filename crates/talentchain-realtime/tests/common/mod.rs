//! In-memory transport for driving the hub in tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use talentchain_realtime::{Connector, RealtimeError, TransportEvent, TransportLink};
use tokio::sync::mpsc;
use url::Url;

#[derive(Default)]
struct State {
    urls: Vec<Url>,
    refuse: bool,
    delay: Option<Duration>,
}

/// Connector whose opens succeed or fail on demand.
pub struct MockConnector {
    state: Arc<Mutex<State>>,
    accepted: mpsc::UnboundedSender<MockRemote>,
}

/// Server side of the mock: observes opens and gets one remote per link.
pub struct MockServer {
    state: Arc<Mutex<State>>,
    accepted: mpsc::UnboundedReceiver<MockRemote>,
}

/// Server end of one open link.
pub struct MockRemote {
    pub frames: mpsc::UnboundedReceiver<String>,
    pub events: mpsc::UnboundedSender<TransportEvent>,
}

pub fn mock() -> (MockConnector, MockServer) {
    let state = Arc::new(Mutex::new(State::default()));
    let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
    (
        MockConnector {
            state: state.clone(),
            accepted: accepted_tx,
        },
        MockServer {
            state,
            accepted: accepted_rx,
        },
    )
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, url: &Url) -> Result<TransportLink, RealtimeError> {
        let (refuse, delay) = {
            let mut state = self.state.lock();
            state.urls.push(url.clone());
            (state.refuse, state.delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if refuse {
            return Err(RealtimeError::Transport("connection refused".to_string()));
        }

        let (outbound, frames) = mpsc::unbounded_channel();
        let (events, inbound) = mpsc::unbounded_channel();
        let _ = self.accepted.send(MockRemote { frames, events });
        Ok(TransportLink { outbound, inbound })
    }
}

impl MockServer {
    /// Number of open attempts, successful or not.
    pub fn attempts(&self) -> usize {
        self.state.lock().urls.len()
    }

    /// URLs of all open attempts.
    pub fn urls(&self) -> Vec<Url> {
        self.state.lock().urls.clone()
    }

    /// Make subsequent opens fail.
    pub fn refuse(&self, refuse: bool) {
        self.state.lock().refuse = refuse;
    }

    /// Make subsequent opens take `delay` before completing.
    pub fn delay(&self, delay: Option<Duration>) {
        self.state.lock().delay = delay;
    }

    /// Next successfully opened link, if one is ready.
    pub fn try_accept(&mut self) -> Option<MockRemote> {
        self.accepted.try_recv().ok()
    }

    /// Wait for the next successfully opened link.
    pub async fn accept(&mut self) -> MockRemote {
        tokio::time::timeout(Duration::from_secs(5), self.accepted.recv())
            .await
            .expect("no connection opened")
            .expect("connector dropped")
    }
}

impl MockRemote {
    /// Push a text frame to the client.
    pub fn push(&self, text: &str) {
        self.events
            .send(TransportEvent::Message(text.to_string()))
            .expect("client dropped link");
    }

    /// Close the link from the server side.
    pub fn close(&self) {
        let _ = self.events.send(TransportEvent::Closed);
    }

    /// Report a transport error without closing.
    pub fn fail(&self, message: &str) {
        let _ = self.events.send(TransportEvent::Error(message.to_string()));
    }

    /// Next frame the client sent, parsed.
    pub fn try_frame(&mut self) -> Option<serde_json::Value> {
        self.frames
            .try_recv()
            .ok()
            .map(|text| serde_json::from_str(&text).expect("client sent invalid json"))
    }

    /// Whether the client dropped its end of the link.
    pub fn is_dropped(&mut self) -> bool {
        matches!(
            self.frames.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        )
    }
}

/// Give spawned tasks a chance to run without advancing time.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}
