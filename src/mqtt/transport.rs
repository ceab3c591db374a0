//! Broker transport seam
//!
//! The connection manager only needs two things from the outside world: a way to open
//! a session, and a session that can publish and tell when it has died. Both are traits
//! so the manager can run against a scripted broker in tests; [`RumqttTransport`] is the
//! production implementation on top of `rumqttc`.
//!
//! # Acknowledgement tracking
//!
//! `rumqttc` hands out packet ids inside its event loop, after the request has been
//! queued on the client. The link therefore keeps a FIFO of waiting publishers. A request
//! is queued with the non-blocking `try_publish` while the tracker lock is held, and its
//! waiter is pushed under that same lock, so the FIFO and the client channel always hold
//! the same requests in the same order. A full channel is a rejected publish. Every
//! `Outgoing::Publish(pkid)` event belongs to the oldest waiting entry. The entry is then
//! parked under its pkid until the matching `PubAck` (or `PubComp`) arrives.

use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::SessionOptions;
use super::error::{ConnectionError, PublishFailure};

// How long `close` waits for the DISCONNECT packet to leave before cutting the socket
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Delivery guarantee requested for a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Qos {
    AtMostOnce,
    #[default]
    AtLeastOnce,
    ExactlyOnce,
}

impl From<Qos> for rumqttc::QoS {
    fn from(qos: Qos) -> Self {
        match qos {
            Qos::AtMostOnce => rumqttc::QoS::AtMostOnce,
            Qos::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
            Qos::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
        }
    }
}

impl fmt::Display for Qos {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Qos::AtMostOnce => write!(f, "at-most-once"),
            Qos::AtLeastOnce => write!(f, "at-least-once"),
            Qos::ExactlyOnce => write!(f, "exactly-once"),
        }
    }
}

/// Opens broker sessions.
#[async_trait]
pub trait BrokerTransport: Send + Sync + 'static {
    /// Performs the full handshake; returns only once the broker accepted the session.
    async fn open(&self, options: &SessionOptions) -> Result<Arc<dyn BrokerLink>, ConnectionError>;
}

/// One established broker session.
#[async_trait]
pub trait BrokerLink: Send + Sync {
    fn client_id(&self) -> &str;

    /// Sends one message and resolves once the broker acknowledged it at `qos`.
    /// Never retained.
    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: Qos)
        -> Result<(), PublishFailure>;

    /// Resolves when the session is gone, whichever side ended it.
    async fn closed(&self);

    /// Ends the session. Safe to call more than once.
    async fn close(&self);
}

/// [`BrokerTransport`] backed by `rumqttc` over plain TCP.
#[derive(Debug, Clone)]
pub struct RumqttTransport {
    request_capacity: usize,
}

impl Default for RumqttTransport {
    fn default() -> Self {
        Self {
            request_capacity: 32,
        }
    }
}

impl RumqttTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BrokerTransport for RumqttTransport {
    async fn open(&self, options: &SessionOptions) -> Result<Arc<dyn BrokerLink>, ConnectionError> {
        let addr = options.addr();
        debug!("Opening broker session: {:?}", options);

        let mut mqtt_options =
            MqttOptions::new(options.client_id.clone(), options.host.clone(), options.port);
        mqtt_options
            .set_keep_alive(options.keep_alive)
            .set_clean_session(options.clean_session);
        if let Some((user, pw)) = &options.credentials {
            mqtt_options.set_credentials(user.clone(), pw.clone());
        }

        let (client, mut eventloop) = AsyncClient::new(mqtt_options, self.request_capacity);

        match tokio::time::timeout(options.connect_timeout, await_connack(&mut eventloop, &addr))
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(ConnectionError::Timeout(options.connect_timeout.as_secs())),
        }

        info!("Broker session established with {} as {}", addr, options.client_id);

        let tracker = Arc::new(Mutex::new(AckTracker::default()));
        let closed = CancellationToken::new();
        tokio::spawn(drive_event_loop(
            eventloop,
            tracker.clone(),
            closed.clone(),
            options.client_id.clone(),
        ));

        Ok(Arc::new(RumqttLink {
            client_id: options.client_id.clone(),
            client,
            tracker,
            closed,
        }))
    }
}

async fn await_connack(eventloop: &mut EventLoop, addr: &str) -> Result<(), ConnectionError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return if ack.code == ConnectReturnCode::Success {
                    Ok(())
                } else {
                    Err(ConnectionError::Refused(format!("{:?}", ack.code)))
                };
            }
            Ok(event) => debug!("Handshake event from {}: {:?}", addr, event),
            Err(e) => return Err(handshake_error(addr, e)),
        }
    }
}

// rumqttc reports a refused CONNACK as a poll error
fn handshake_error(addr: &str, error: rumqttc::ConnectionError) -> ConnectionError {
    match error {
        rumqttc::ConnectionError::ConnectionRefused(code) => {
            ConnectionError::Refused(format!("{:?}", code))
        }
        other => ConnectionError::Unreachable {
            addr: addr.to_string(),
            reason: other.to_string(),
        },
    }
}

struct PendingPublish {
    qos: Qos,
    done: oneshot::Sender<Result<(), PublishFailure>>,
}

#[derive(Default)]
struct AckTracker {
    // Publishes handed to the client, waiting for their packet id
    queued: VecDeque<PendingPublish>,
    // Publishes on the wire, waiting for the broker
    in_flight: HashMap<u16, PendingPublish>,
}

impl AckTracker {
    fn on_outgoing(&mut self, pkid: u16) {
        let Some(pending) = self.queued.pop_front() else {
            warn!("Outgoing publish {} has no waiting sender", pkid);
            return;
        };
        if pending.qos == Qos::AtMostOnce {
            let _ = pending.done.send(Ok(()));
        } else {
            self.in_flight.insert(pkid, pending);
        }
    }

    fn on_ack(&mut self, pkid: u16) {
        match self.in_flight.remove(&pkid) {
            Some(pending) => {
                let _ = pending.done.send(Ok(()));
            }
            None => debug!("Ack for unknown packet id {}", pkid),
        }
    }

    fn fail_all(&mut self, reason: &str) {
        for pending in self.queued.drain(..).chain(self.in_flight.drain().map(|(_, p)| p)) {
            let _ = pending
                .done
                .send(Err(PublishFailure::Rejected(reason.to_string())));
        }
    }
}

fn lock(tracker: &Mutex<AckTracker>) -> MutexGuard<'_, AckTracker> {
    tracker.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn drive_event_loop(
    mut eventloop: EventLoop,
    tracker: Arc<Mutex<AckTracker>>,
    closed: CancellationToken,
    client_id: String,
) {
    debug!("Event loop driver started for {}", client_id);

    let reason = loop {
        let event = tokio::select! {
            _ = closed.cancelled() => break "connection closed".to_string(),
            event = eventloop.poll() => event,
        };

        match event {
            Ok(Event::Outgoing(Outgoing::Publish(pkid))) => lock(&tracker).on_outgoing(pkid),
            Ok(Event::Incoming(Packet::PubAck(ack))) => lock(&tracker).on_ack(ack.pkid),
            Ok(Event::Incoming(Packet::PubComp(comp))) => lock(&tracker).on_ack(comp.pkid),
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                info!("Session {} sent DISCONNECT", client_id);
                break "connection closed".to_string();
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("Broker closed session {}", client_id);
                break "broker closed the connection".to_string();
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Session {} lost: {}", client_id, e);
                break e.to_string();
            }
        }
    };

    lock(&tracker).fail_all(&reason);
    closed.cancel();
    debug!("Event loop driver stopped for {}", client_id);
}

struct RumqttLink {
    client_id: String,
    client: AsyncClient,
    tracker: Arc<Mutex<AckTracker>>,
    closed: CancellationToken,
}

#[async_trait]
impl BrokerLink for RumqttLink {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: Qos,
    ) -> Result<(), PublishFailure> {
        if self.closed.is_cancelled() {
            return Err(PublishFailure::Rejected("connection closed".to_string()));
        }

        let (done, ack) = oneshot::channel();
        {
            // Request and waiter enter together under the tracker lock, with no await in
            // between, so a caller dropped mid-publish cannot desync the FIFO
            let mut tracker = lock(&self.tracker);
            if let Err(e) = self.client.try_publish(topic, qos.into(), false, payload) {
                warn!("Publish to {} not queued on {}: {}", topic, self.client_id, e);
                return Err(PublishFailure::Rejected(e.to_string()));
            }
            tracker.queued.push_back(PendingPublish { qos, done });
        }

        ack.await
            .unwrap_or_else(|_| Err(PublishFailure::Rejected("connection closed".to_string())))
    }

    async fn closed(&self) {
        self.closed.cancelled().await
    }

    async fn close(&self) {
        if self.closed.is_cancelled() {
            return;
        }
        if let Err(e) = self.client.disconnect().await {
            debug!("Disconnect request for {} not queued: {}", self.client_id, e);
        }
        let _ = tokio::time::timeout(CLOSE_GRACE, self.closed.cancelled()).await;
        self.closed.cancel();
    }
}
