//! Scripted broker used by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use hydrobox::mqtt::{
    BrokerLink, BrokerTransport, ConnectionError, ConnectionManager, ConnectionState,
    PublishFailure, Qos, SessionOptions,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct Attempt {
    pub at: Instant,
    pub options: SessionOptions,
}

#[derive(Debug, Clone, Copy)]
enum Ack {
    After(Duration),
    Never,
}

#[derive(Default)]
struct TransportState {
    failures_left: u32,
    open_delay: Option<Duration>,
    attempts: Vec<Attempt>,
    links: Vec<Arc<MockLink>>,
    acks: HashMap<String, Ack>,
}

/// Transport whose handshakes fail a scripted number of times before succeeding.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<TransportState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(times: u32) -> Self {
        let transport = Self::new();
        transport.fail_next(times);
        transport
    }

    pub fn fail_next(&self, times: u32) {
        self.state.lock().unwrap().failures_left = times;
    }

    pub fn delay_open(&self, delay: Duration) {
        self.state.lock().unwrap().open_delay = Some(delay);
    }

    pub fn ack_after(&self, topic: &str, delay: Duration) {
        self.state
            .lock()
            .unwrap()
            .acks
            .insert(topic.to_string(), Ack::After(delay));
    }

    pub fn never_ack(&self, topic: &str) {
        self.state
            .lock()
            .unwrap()
            .acks
            .insert(topic.to_string(), Ack::Never);
    }

    pub fn attempts(&self) -> Vec<Attempt> {
        self.state.lock().unwrap().attempts.clone()
    }

    pub fn links(&self) -> Vec<Arc<MockLink>> {
        self.state.lock().unwrap().links.clone()
    }

    pub fn manager(&self) -> ConnectionManager {
        ConnectionManager::new(self.clone())
    }
}

#[async_trait]
impl BrokerTransport for MockTransport {
    async fn open(&self, options: &SessionOptions) -> Result<Arc<dyn BrokerLink>, ConnectionError> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.attempts.push(Attempt {
                at: Instant::now(),
                options: options.clone(),
            });
            state.open_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(ConnectionError::Unreachable {
                addr: options.addr(),
                reason: "connection refused".to_string(),
            });
        }

        let link = Arc::new(MockLink {
            client_id: options.client_id.clone(),
            acks: state.acks.clone(),
            published: Mutex::new(Vec::new()),
            closed: CancellationToken::new(),
            close_calls: AtomicUsize::new(0),
        });
        state.links.push(link.clone());
        Ok(link)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub payload: String,
    pub qos: Qos,
}

pub struct MockLink {
    client_id: String,
    acks: HashMap<String, Ack>,
    published: Mutex<Vec<Published>>,
    closed: CancellationToken,
    close_calls: AtomicUsize,
}

impl MockLink {
    pub fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// The broker ends the session on its own.
    pub fn drop_from_broker(&self) {
        self.closed.cancel();
    }

    pub fn id(&self) -> &str {
        &self.client_id
    }
}

#[async_trait]
impl BrokerLink for MockLink {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: Qos) -> Result<(), PublishFailure> {
        if self.closed.is_cancelled() {
            return Err(PublishFailure::Rejected("session closed".to_string()));
        }
        self.published.lock().unwrap().push(Published {
            topic: topic.to_string(),
            payload: String::from_utf8_lossy(&payload).into_owned(),
            qos,
        });

        match self.acks.get(topic).copied() {
            Some(Ack::Never) => std::future::pending::<()>().await,
            Some(Ack::After(delay)) => tokio::time::sleep(delay).await,
            None => {}
        }
        Ok(())
    }

    async fn closed(&self) {
        self.closed.cancelled().await
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.cancel();
    }
}

/// Waits until the manager reports `wanted`, failing the test after `within`.
pub async fn wait_for_state(manager: &ConnectionManager, wanted: ConnectionState, within: Duration) {
    let mut rx = manager.subscribe();
    let reached = tokio::time::timeout(within, rx.wait_for(|s| *s == wanted))
        .await
        .map(|r| r.is_ok())
        .unwrap_or(false);
    assert!(reached, "state {} not reached within {:?}", wanted, within);
}

/// Polls `condition` every 10ms until it holds, failing the test after `within`.
pub async fn eventually(within: Duration, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + within;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met within {:?}", within);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
