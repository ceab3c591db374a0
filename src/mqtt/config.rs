//! Broker settings
//!
//! [`BrokerConfig`] is what the user configures; [`SessionOptions`] is what one
//! connection attempt actually uses, with a fresh client id every time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 1883;

/// Broker connection settings, as stored in the `[broker]` table of the config file.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    /// First segment of the generated client id
    pub client_prefix: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u64,
    /// Fixed pause between connection attempts
    pub retry_interval_ms: u64,
    /// Upper bound for one session handshake
    pub connect_timeout_secs: u64,
    /// Upper bound for the broker acknowledgement of a publish
    pub ack_timeout_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            client_prefix: "hydrobox".to_string(),
            username: None,
            password: None,
            keep_alive_secs: 30,
            retry_interval_ms: 2500,
            connect_timeout_secs: 10,
            ack_timeout_ms: 5000,
        }
    }
}

impl fmt::Display for BrokerConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.credentials() {
            Some((user, _)) => write!(f, "{}@{}:{}", user, self.host, self.port),
            None => write!(f, "{}:{}", self.host, self.port),
        }
    }
}

impl BrokerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_credentials(mut self, user: impl Into<String>, pw: impl Into<String>) -> Self {
        self.username = Some(user.into());
        self.password = Some(pw.into());
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Username and password, only when both are present and non-blank.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let user = self.username.as_deref().filter(|u| !u.trim().is_empty())?;
        let pw = self.password.as_deref().filter(|p| !p.trim().is_empty())?;
        Some((user, pw))
    }

    /// Builds the options for one connection attempt with a freshly generated client id.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            host: self.host.clone(),
            port: self.port,
            client_id: next_client_id(&self.client_prefix),
            credentials: self
                .credentials()
                .map(|(u, p)| (u.to_string(), p.to_string())),
            keep_alive: Duration::from_secs(self.keep_alive_secs),
            connect_timeout: self.connect_timeout(),
            clean_session: true,
        }
    }
}

/// Everything a transport needs to open one broker session.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub credentials: Option<(String, String)>,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
    pub clean_session: bool,
}

impl SessionOptions {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// Keeps the password out of logs
impl fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SessionOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("client_id", &self.client_id)
            .field("user", &self.credentials.as_ref().map(|(u, _)| u))
            .field("keep_alive", &self.keep_alive)
            .field("clean_session", &self.clean_session)
            .finish()
    }
}

static LAST_ID_MILLIS: AtomicI64 = AtomicI64::new(0);

/// `<prefix>-<platform>-<epoch millis>`, strictly increasing within the process so two
/// attempts never reuse an id even when they fall into the same millisecond.
pub fn next_client_id(prefix: &str) -> String {
    let now = chrono::Utc::now().timestamp_millis();
    let mut last = LAST_ID_MILLIS.load(Ordering::Relaxed);
    let millis = loop {
        let candidate = now.max(last + 1);
        match LAST_ID_MILLIS.compare_exchange_weak(
            last,
            candidate,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break candidate,
            Err(actual) => last = actual,
        }
    };
    format!("{}-{}-{}", prefix, std::env::consts::OS, millis)
}
