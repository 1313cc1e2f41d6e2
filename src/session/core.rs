//! Shared relay session state and behavior.
//!
//! Both transports extend the same base: a session identified by an opaque
//! relay-issued ID, an ack-gated outbound buffer, monotonic read/write byte
//! counters, and one backoff state shared by the read and write paths. The
//! concrete transports supply `resume_read`/`send_write`; everything else
//! (handshake, write queuing, success/error classification, retry
//! scheduling, teardown) lives here.

use std::sync::Arc;

use parking_lot::Mutex;
use reqwest::{StatusCode, Url};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::buffer::AckBuffer;
use crate::core::constants::{RETRY_NOTICE_GRACE, RETRY_NOTICE_THRESHOLD};
use crate::core::{CloseReason, StreamError};
use crate::stream::{RelayOptions, StreamEvent};

use super::backoff::Backoff;

/// Session lifecycle phase.
///
/// Backing off is not a phase of its own: it is tracked by the backoff
/// state and only suppresses new attempts while the session stays `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    /// No handshake attempted, or the last handshake failed.
    Unopened,
    /// Handshake request in flight.
    Opening,
    /// Session established; transfer active.
    Open,
    /// Stream terminated.
    Closed,
}

/// Mutable session state. Guarded by one mutex; lock sections are
/// synchronous and never held across an await point.
#[derive(Debug)]
pub(crate) struct SessionState {
    /// Opaque session token issued by the relay. `None` until established
    /// and again after the relay reports the session gone.
    pub session_id: Option<String>,
    /// Lifecycle phase.
    pub phase: Phase,
    /// Total bytes received from the relay and delivered to the consumer.
    pub read_count: u64,
    /// Total bytes the relay has acknowledged receiving from us.
    pub write_count: u64,
    /// Outbound bytes awaiting acknowledgment.
    pub outbound: AckBuffer,
    /// Shared retry state for both request paths.
    pub backoff: Backoff,
    /// Pending one-shot retry timer, if any.
    pub backoff_timer: Option<JoinHandle<()>>,
    /// A read request is in flight.
    pub read_busy: bool,
    /// A write request (or socket drain) is in flight.
    pub write_busy: bool,
}

/// Immutable session environment plus the guarded state.
pub(crate) struct SessionCore {
    pub config: RelayOptions,
    pub http: reqwest::Client,
    pub events: mpsc::UnboundedSender<StreamEvent>,
    pub state: Mutex<SessionState>,
}

impl SessionCore {
    pub(crate) fn new(
        config: RelayOptions,
        http: reqwest::Client,
        events: mpsc::UnboundedSender<StreamEvent>,
    ) -> Self {
        Self {
            config,
            http,
            events,
            state: Mutex::new(SessionState {
                session_id: None,
                phase: Phase::Unopened,
                read_count: 0,
                write_count: 0,
                outbound: AckBuffer::new(),
                backoff: Backoff::new(),
                backoff_timer: None,
                read_busy: false,
                write_busy: false,
            }),
        }
    }

    /// Build a relay endpoint URL relative to the configured base.
    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, StreamError> {
        self.config
            .relay_server
            .join(path)
            .map_err(|e| StreamError::Endpoint(e.to_string()))
    }

    /// Establish the relay session.
    ///
    /// Issues `GET /proxy?host=..&port=..` (credentials ride in the HTTP
    /// client's cookie jar); a 200 body is the opaque session ID. Failure
    /// is reported to the caller and the session remains unopened.
    pub(crate) async fn handshake(&self) -> Result<(), StreamError> {
        self.state.lock().phase = Phase::Opening;

        let mut url = self.endpoint("proxy")?;
        url.query_pairs_mut()
            .append_pair("host", &self.config.host)
            .append_pair("port", &self.config.port.to_string());

        let result = self.request_session(url).await;
        match result {
            Ok(session_id) => {
                info!(session = %session_id, "relay session established");
                let mut st = self.state.lock();
                st.session_id = Some(session_id);
                st.phase = Phase::Open;
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "relay handshake failed");
                self.state.lock().phase = Phase::Unopened;
                Err(err)
            }
        }
    }

    async fn request_session(&self, url: Url) -> Result<String, StreamError> {
        let response = self.http.get(url).send().await.map_err(|e| {
            StreamError::Handshake {
                status: None,
                detail: e.to_string(),
            }
        })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status != StatusCode::OK {
            return Err(StreamError::Handshake {
                status: Some(status.as_u16()),
                detail: body,
            });
        }

        Ok(body.trim().to_string())
    }
}

/// The transport-specific half of a relay session.
///
/// `resume_read` and `send_write` are entry points, not loops: each call
/// either issues one attempt or is a no-op (busy, backing off, closed).
/// Request completions feed back through [`SessionOps::on_request_success`]
/// and [`SessionOps::on_request_error`], which re-invoke these entry points
/// as connectivity allows.
pub(crate) trait RelayTransport: Send + Sync + Sized + 'static {
    /// The shared session base.
    fn session(&self) -> &SessionCore;

    /// Ensure inbound delivery is active: issue the next read poll, or for
    /// the socket transport, (re)connect.
    fn resume_read(self: Arc<Self>);

    /// Transmit queued outbound bytes if any and the path is idle.
    fn send_write(self: Arc<Self>);

    /// Transport-specific teardown (abort socket tasks, etc.). Called once
    /// when the stream closes; in-flight HTTP requests are left to complete
    /// and be discarded.
    fn halt(&self);
}

/// Shared session behavior over any [`RelayTransport`].
pub(crate) trait SessionOps: RelayTransport {
    /// Queue bytes for transmission. No-op on empty input; unless backing
    /// off, kicks the write path.
    fn async_write(self: Arc<Self>, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let backing_off = {
            let mut st = self.session().state.lock();
            if st.phase == Phase::Closed {
                return;
            }
            st.outbound.write(data);
            st.backoff.is_scheduled()
        };
        if !backing_off {
            self.send_write();
        }
    }

    /// A request completed successfully; `is_read` says which path.
    ///
    /// Resets backoff. If a retry timer was pending, success is proof that
    /// connectivity is back: the timer is cancelled and its expiry action
    /// (re-attempt both paths) runs immediately. Otherwise only the
    /// completed path is re-driven.
    fn on_request_success(self: Arc<Self>, is_read: bool) {
        let pending_timer = {
            let mut st = self.session().state.lock();
            if st.phase != Phase::Open {
                return;
            }
            st.backoff.reset();
            st.backoff_timer.take()
        };

        if let Some(timer) = pending_timer {
            timer.abort();
            debug!("request succeeded during backoff; resuming both paths");
            Arc::clone(&self).resume_read();
            self.send_write();
        } else if is_read {
            self.resume_read();
        } else {
            self.send_write();
        }
    }

    /// A request failed with a recoverable transport error.
    ///
    /// Ignored before a session exists or while a retry is already
    /// scheduled. Otherwise computes the next backoff delay, rewinds the
    /// outbound buffer so unacknowledged bytes will be retransmitted, and
    /// arms a one-shot timer that re-attempts both paths.
    fn on_request_error(self: Arc<Self>, is_read: bool) {
        let (delay, delay_ms) = {
            let mut st = self.session().state.lock();
            if st.session_id.is_none() || st.backoff.is_scheduled() || st.phase != Phase::Open {
                return;
            }
            st.outbound.rewind();
            let delay = st.backoff.begin();
            (delay, st.backoff.delay_ms())
        };

        warn!(
            path = if is_read { "read" } else { "write" },
            delay_ms,
            "relay request failed; backing off"
        );

        if delay >= RETRY_NOTICE_THRESHOLD {
            let _ = self.session().events.send(StreamEvent::Retrying {
                duration: delay + RETRY_NOTICE_GRACE,
            });
        }

        let this = Arc::clone(&self);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let reattempt = {
                let mut st = this.session().state.lock();
                st.backoff.timer_fired();
                st.backoff_timer = None;
                st.phase == Phase::Open
            };
            if reattempt {
                Arc::clone(&this).resume_read();
                this.send_write();
            }
        });
        self.session().state.lock().backoff_timer = Some(timer);
    }

    /// Terminate the stream.
    ///
    /// Idempotent. A `Gone` close also invalidates the session ID so no
    /// retry can reuse it. The consumer is notified with a final
    /// [`StreamEvent::Closed`].
    fn close_with(self: Arc<Self>, reason: CloseReason) {
        let timer = {
            let mut st = self.session().state.lock();
            if st.phase == Phase::Closed {
                return;
            }
            st.phase = Phase::Closed;
            if reason == CloseReason::Gone {
                st.session_id = None;
            }
            st.backoff.reset();
            st.backoff_timer.take()
        };
        if let Some(timer) = timer {
            timer.abort();
        }

        info!(%reason, "relay stream closed");
        self.halt();
        let _ = self.session().events.send(StreamEvent::Closed { reason });
    }
}

impl<T: RelayTransport> SessionOps for T {}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_options() -> RelayOptions {
        RelayOptions::new(
            Url::parse("http://127.0.0.1:1/").unwrap(),
            "localhost",
            22,
        )
    }

    fn test_core() -> (SessionCore, mpsc::UnboundedReceiver<StreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let core = SessionCore::new(test_options(), reqwest::Client::new(), tx);
        (core, rx)
    }

    #[test]
    fn test_initial_state() {
        let (core, _rx) = test_core();
        let st = core.state.lock();
        assert_eq!(st.phase, Phase::Unopened);
        assert!(st.session_id.is_none());
        assert_eq!(st.read_count, 0);
        assert_eq!(st.write_count, 0);
        assert!(st.outbound.is_empty());
    }

    #[test]
    fn test_endpoint_join() {
        let (core, _rx) = test_core();
        let url = core.endpoint("read").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:1/read");
    }

    #[tokio::test]
    async fn test_handshake_failure_leaves_unopened() {
        // Nothing listens on port 1; the request itself fails.
        let (core, _rx) = test_core();
        let err = core.handshake().await.unwrap_err();
        assert!(matches!(err, StreamError::Handshake { status: None, .. }));
        assert_eq!(core.state.lock().phase, Phase::Unopened);
        assert!(core.state.lock().session_id.is_none());
    }
}
